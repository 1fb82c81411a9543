// src/analysis/coverage.rs
// Path-heuristic estimate of how much of a change is exercised by tests.
// No code is executed; this only reads the changed-file listing.

use crate::analysis::types::{ChangedFile, CoverageSignal};

const SOURCE_EXTENSIONS: [&str; 19] = [
    "rs", "go", "py", "js", "jsx", "ts", "tsx", "java", "kt", "rb", "c", "cc", "cpp", "h", "hpp",
    "cs", "swift", "php", "scala",
];

/// Names that say nothing about the module they belong to; for these the
/// parent directory is the meaningful stem.
const ANONYMOUS_STEMS: [&str; 5] = ["mod", "lib", "main", "index", "__init__"];

/// None when the change touches no code at all (docs, CI config, assets).
pub fn analyze_coverage(files: &[ChangedFile]) -> Option<CoverageSignal> {
    let mut source_paths: Vec<&str> = Vec::new();
    let mut test_paths: Vec<String> = Vec::new();

    for file in files {
        // Deleted code needs no new tests
        if file.status == "removed" {
            continue;
        }
        if is_test_path(&file.path) {
            test_paths.push(file.path.to_lowercase());
        } else if is_source_path(&file.path) {
            source_paths.push(&file.path);
        }
    }

    if source_paths.is_empty() && test_paths.is_empty() {
        return None;
    }

    let covered_files = source_paths
        .iter()
        .filter(|path| has_companion_test(path, &test_paths))
        .count();

    Some(CoverageSignal {
        source_files_changed: source_paths.len(),
        test_files_changed: test_paths.len(),
        covered_files,
    })
}

fn is_source_path(path: &str) -> bool {
    extension(path)
        .map(|ext| SOURCE_EXTENSIONS.contains(&ext))
        .unwrap_or(false)
}

fn is_test_path(path: &str) -> bool {
    let lower = path.to_lowercase();
    if lower
        .split('/')
        .any(|seg| matches!(seg, "tests" | "test" | "__tests__" | "spec" | "specs"))
    {
        return true;
    }
    let name = file_name(&lower);
    name.starts_with("test_")
        || name.contains("_test.")
        || name.contains(".test.")
        || name.contains(".spec.")
}

/// A source file counts as covered when some test file touched in the same
/// change mentions its stem.
fn has_companion_test(source_path: &str, test_paths: &[String]) -> bool {
    let stem = meaningful_stem(source_path).to_lowercase();
    if stem.len() < 3 {
        return false;
    }
    test_paths.iter().any(|test| test.contains(&stem))
}

/// "src/billing/invoice.rs" -> "invoice"; "src/billing/mod.rs" -> "billing"
fn meaningful_stem(path: &str) -> &str {
    let mut segments = path.rsplit('/');
    let name = segments.next().unwrap_or(path);
    let stem = name.split('.').next().unwrap_or(name);
    if ANONYMOUS_STEMS.contains(&stem) {
        segments.next().unwrap_or(stem)
    } else {
        stem
    }
}

fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

fn extension(path: &str) -> Option<&str> {
    file_name(path).rsplit_once('.').map(|(_, ext)| ext)
}
