// src/analysis/dependencies.rs
// Flags dependency-manifest changes that deserve a human look

use crate::analysis::types::{ChangedFile, DependencyAudit};
use once_cell::sync::Lazy;
use regex::Regex;

const MANIFEST_NAMES: [&str; 16] = [
    "Cargo.toml",
    "Cargo.lock",
    "package.json",
    "package-lock.json",
    "yarn.lock",
    "pnpm-lock.yaml",
    "go.mod",
    "go.sum",
    "requirements.txt",
    "pyproject.toml",
    "poetry.lock",
    "Gemfile",
    "Gemfile.lock",
    "pom.xml",
    "build.gradle",
    "composer.json",
];

/// Lockfiles and the manifest each one is generated from
const LOCKFILE_PAIRS: [(&str, &str); 7] = [
    ("Cargo.lock", "Cargo.toml"),
    ("package-lock.json", "package.json"),
    ("yarn.lock", "package.json"),
    ("pnpm-lock.yaml", "package.json"),
    ("go.sum", "go.mod"),
    ("poetry.lock", "pyproject.toml"),
    ("Gemfile.lock", "Gemfile"),
];

static GIT_OR_PATH_DEP_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"\b(git|path)\s*=\s*""#).expect("valid regex"));
static WILDCARD_VERSION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"[=:]\s*"\*""#).expect("valid regex"));

/// Always returns an audit; an empty one means nothing noteworthy changed.
pub fn analyze_dependency_changes(files: &[ChangedFile], diff: &str) -> DependencyAudit {
    let manifests: Vec<&ChangedFile> = files
        .iter()
        .filter(|f| MANIFEST_NAMES.contains(&file_name(&f.path)))
        .collect();

    let mut alerts = Vec::new();

    for manifest in &manifests {
        let added = added_lines(manifest, diff);
        if added
            .iter()
            .any(|line| GIT_OR_PATH_DEP_RE.is_match(line) || line.contains("git+"))
        {
            alerts.push(format!("{}: adds a git or path dependency", manifest.path));
        }
        if added.iter().any(|line| WILDCARD_VERSION_RE.is_match(line)) {
            alerts.push(format!(
                "{}: pins a dependency to a wildcard version",
                manifest.path
            ));
        }
        if added.iter().any(|line| line.contains("http://")) {
            alerts.push(format!(
                "{}: references an insecure http:// source",
                manifest.path
            ));
        }
    }

    let changed_names: Vec<&str> = manifests.iter().map(|m| file_name(&m.path)).collect();
    for (lock, source) in LOCKFILE_PAIRS {
        if changed_names.contains(&lock) && !changed_names.contains(&source) {
            alerts.push(format!("{lock}: lockfile changed without its manifest"));
        }
    }

    DependencyAudit {
        manifests_changed: manifests.iter().map(|m| m.path.clone()).collect(),
        alerts,
    }
}

/// Added lines from the file's own patch, falling back to its section of the
/// full diff when the host omitted the per-file patch.
fn added_lines<'a>(file: &'a ChangedFile, diff: &'a str) -> Vec<&'a str> {
    if let Some(patch) = &file.patch {
        return collect_added(patch);
    }
    diff.split("diff --git ")
        .find(|section| {
            section
                .lines()
                .next()
                .is_some_and(|header| header.contains(&file.path))
        })
        .map(collect_added)
        .unwrap_or_default()
}

fn collect_added(hunk: &str) -> Vec<&str> {
    hunk.lines()
        .filter(|line| line.starts_with('+') && !line.starts_with("+++"))
        .map(|line| &line[1..])
        .collect()
}

fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}
