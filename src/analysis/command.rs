// src/analysis/command.rs
// Parses `/vigil` commands out of PR comments

const COMMAND_PREFIX: &str = "/vigil";

/// A recognized `/vigil` subcommand. Callers are responsible for filtering
/// bot-authored comments and comments not attached to a pull request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Analyze,
    GenerateTests,
    Help,
}

impl Command {
    /// Parse a comment body. Almost all comments are not commands, so
    /// anything unrecognized is None rather than an error.
    pub fn parse(body: &str) -> Option<Command> {
        let mut tokens = body.split_whitespace();
        if !tokens.next()?.eq_ignore_ascii_case(COMMAND_PREFIX) {
            return None;
        }
        match tokens.next()?.to_lowercase().as_str() {
            "analyze" => Some(Command::Analyze),
            "generate-tests" => Some(Command::GenerateTests),
            "help" => Some(Command::Help),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Command::Analyze => "analyze",
            Command::GenerateTests => "generate-tests",
            Command::Help => "help",
        }
    }
}

/// Response body for `/vigil help`
pub fn help_text() -> String {
    [
        "## Vigil commands",
        "",
        "| Command | Effect |",
        "|---|---|",
        "| `/vigil analyze` | Run a risk analysis on this pull request |",
        "| `/vigil generate-tests` | Open a companion PR with generated tests |",
        "| `/vigil help` | Show this message |",
    ]
    .join("\n")
}
