// src/llm/schema.rs
// Capability wire shapes, prompt assembly, and hardened response parsing

use crate::analysis::types::{AnalysisRequest, AnalysisResult, TestScenario};
use crate::github::CommitFile;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Maximum diff size to send to the capability (in bytes)
const MAX_DIFF_SIZE: usize = 50_000;

/// Placeholder fragments that mean the capability elided code instead of
/// returning complete file contents
const PLACEHOLDER_MARKERS: [&str; 4] = [
    "// rest of",
    "// unchanged",
    "/* ... */",
    "// existing code",
];

// ============================================================================
// Fix and test-generation payloads
// ============================================================================

/// One complete file in a generated fix
#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
pub struct FixFile {
    pub path: String,
    /// Complete new contents; partial files are rejected
    pub content: String,
    /// "create" or "modify"
    pub change_type: String,
}

/// A generated fix for failing companion-change checks
#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
pub struct FixPayload {
    pub explanation: String,
    pub files: Vec<FixFile>,
    #[serde(default = "default_confidence")]
    pub confidence: f32,
}

fn default_confidence() -> f32 {
    0.8
}

impl FixPayload {
    /// A fix is usable when it has at least one file and none of the files
    /// elide code with placeholders.
    pub fn is_usable(&self) -> bool {
        if self.files.is_empty() {
            return false;
        }
        for file in &self.files {
            let trimmed = file.content.trim();
            if trimmed.is_empty() || trimmed == "..." {
                return false;
            }
            let lower = trimmed.to_lowercase();
            if PLACEHOLDER_MARKERS.iter().any(|m| lower.contains(m)) {
                return false;
            }
        }
        true
    }
}

/// One generated test file
#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
pub struct TestFile {
    pub path: String,
    pub content: String,
}

/// Wrapper the capability responds with for test generation
#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
pub struct TestGenResponse {
    pub files: Vec<TestFile>,
}

// ============================================================================
// Response boundary policy
// ============================================================================

/// Normalizes a capability result where it enters the pipeline. A `block`
/// with no critical/high finding is downgraded to `attention` unless the
/// deployment explicitly trusts capability blocks; out-of-range scores are
/// clamped.
pub fn enforce_result_policy(result: &mut AnalysisResult, trust_capability_block: bool) {
    use crate::analysis::types::MergeRecommendation;

    result.risk_score = result.risk_score.min(100);

    if result.merge_recommendation == MergeRecommendation::Block
        && !result.has_blocking_findings()
        && !trust_capability_block
    {
        warn!(
            risk_level = %result.risk_level,
            "Capability recommended block without critical/high findings; downgrading to attention"
        );
        result.merge_recommendation = MergeRecommendation::Attention;
    }
}

// ============================================================================
// Prompt assembly
// ============================================================================

pub const ANALYSIS_SYSTEM_PROMPT: &str = "\
You are Vigil, a senior engineer reviewing a pull request for merge risk.\n\
Judge product impact, not style. Findings are discrete risks; gaps are \
missing or ambiguous requirements/coverage; scenarios are tests the change \
should have. risk_score is 0-100 where 100 is worst.\n\
Respond with a single JSON object matching this schema, no prose around it:";

pub const FIX_SYSTEM_PROMPT: &str = "\
You are Vigil, fixing generated tests whose CI checks failed.\n\
Work only from the diagnostics and the original test files. Return every \
touched file IN FULL; never elide code with placeholders like '// rest of \
file'. If the failure cannot be fixed by editing these files, return an \
empty files array.\n\
Respond with a single JSON object matching this schema, no prose around it:";

pub const TESTGEN_SYSTEM_PROMPT: &str = "\
You are Vigil, writing automated tests for a pull request.\n\
Generate complete, runnable test files in the repository's language and \
test conventions, one file per area under test. Cover the provided \
scenarios first.\n\
Respond with a single JSON object matching this schema, no prose around it:";

/// System prompt plus the JSON schema the response must satisfy
pub fn with_schema<T: schemars::JsonSchema>(system: &str) -> String {
    let schema = schemars::schema_for!(T);
    let schema_json =
        serde_json::to_string_pretty(&schema).unwrap_or_else(|_| "{}".to_string());
    format!("{system}\n\n{schema_json}")
}

pub fn analysis_user_prompt(request: &AnalysisRequest, hints: &[String]) -> String {
    let mut prompt = format!(
        "Pull request {} — \"{}\" (action: {})\n\n",
        request.change,
        request.title,
        request.action.as_str()
    );

    if !request.body.is_empty() {
        prompt.push_str(&format!("Description:\n{}\n\n", request.body));
    }

    if !hints.is_empty() {
        prompt.push_str("Context:\n");
        for hint in hints {
            prompt.push_str(&format!("- {hint}\n"));
        }
        prompt.push('\n');
    }

    prompt.push_str(&format!("```diff\n{}\n```", truncate_diff(&request.diff)));
    prompt
}

pub fn fix_user_prompt(diagnostics: &str, artifacts: &[CommitFile]) -> String {
    let mut prompt = format!("CI diagnostics:\n```\n{}\n```\n\n", diagnostics.trim());
    prompt.push_str("Original test files:\n");
    for artifact in artifacts {
        prompt.push_str(&format!("--- {} ---\n{}\n\n", artifact.path, artifact.content));
    }
    prompt
}

pub fn testgen_user_prompt(request: &AnalysisRequest, scenarios: &[TestScenario]) -> String {
    let mut prompt = format!(
        "Pull request {} — \"{}\"\n\n",
        request.change, request.title
    );

    if !scenarios.is_empty() {
        prompt.push_str("Scenarios to cover:\n");
        for scenario in scenarios {
            prompt.push_str(&format!("- {}: {}\n", scenario.name, scenario.description));
        }
        prompt.push('\n');
    }

    prompt.push_str(&format!("```diff\n{}\n```", truncate_diff(&request.diff)));
    prompt
}

fn truncate_diff(diff: &str) -> String {
    if diff.len() <= MAX_DIFF_SIZE {
        return diff.to_string();
    }
    let kept = clip(diff, MAX_DIFF_SIZE);
    format!(
        "{}...\n\n[Diff truncated - {} more bytes]",
        kept,
        diff.len() - kept.len()
    )
}

/// Longest prefix of `s` that fits in `max` bytes, cut on a char boundary
fn clip(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

// ============================================================================
// Hardened response parsing
// ============================================================================

/// Parse JSON out of capability output. Tries, in order: direct parse,
/// markdown fence stripping, first balanced `{...}`/`[...]` extraction.
pub fn parse_capability_json<T: DeserializeOwned>(content: &str) -> Result<T, String> {
    let trimmed = content.trim();

    if let Ok(v) = serde_json::from_str::<T>(trimmed) {
        return Ok(v);
    }

    let stripped = strip_code_fences(trimmed);
    if stripped != trimmed {
        if let Ok(v) = serde_json::from_str::<T>(stripped) {
            return Ok(v);
        }
    }

    if let Some(extracted) = extract_json_block(trimmed) {
        if let Ok(v) = serde_json::from_str::<T>(extracted) {
            return Ok(v);
        }
    }

    Err(format!(
        "Capability output is not parseable JSON. Content start: {}",
        clip(trimmed, 200)
    ))
}

fn strip_code_fences(s: &str) -> &str {
    let trimmed = s.trim();

    if let Some(rest) = trimmed.strip_prefix("```json") {
        if let Some(json) = rest.strip_suffix("```") {
            return json.trim();
        }
    }
    if let Some(rest) = trimmed.strip_prefix("```") {
        if let Some(json) = rest.strip_suffix("```") {
            return json.trim();
        }
    }

    trimmed
}

/// First balanced `{...}` or `[...]` block, string- and escape-aware
fn extract_json_block(s: &str) -> Option<&str> {
    let (open_char, close_char, start) = {
        let brace_pos = s.find('{');
        let bracket_pos = s.find('[');

        match (brace_pos, bracket_pos) {
            (Some(b), Some(k)) if b < k => ('{', '}', b),
            (Some(_), Some(k)) => ('[', ']', k),
            (Some(b), None) => ('{', '}', b),
            (None, Some(k)) => ('[', ']', k),
            (None, None) => return None,
        }
    };

    let bytes = s.as_bytes();
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escape_next = false;

    for i in start..bytes.len() {
        let ch = bytes[i] as char;

        if escape_next {
            escape_next = false;
            continue;
        }
        if ch == '\\' && in_string {
            escape_next = true;
            continue;
        }
        if ch == '"' {
            in_string = !in_string;
            continue;
        }
        if in_string {
            continue;
        }

        if ch == open_char {
            depth += 1;
        } else if ch == close_char {
            depth -= 1;
            if depth == 0 {
                return Some(&s[start..=i]);
            }
        }
    }

    None
}
