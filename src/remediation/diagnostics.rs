// src/remediation/diagnostics.rs
// CI failure diagnostics with graceful fallback

use crate::analysis::types::{CheckAnnotation, CheckFailure};
use crate::github::ChangeHost;
use tracing::{debug, warn};

/// Job logs can run to megabytes; the failure almost always prints at the tail
const MAX_LOG_TAIL: usize = 20_000;

/// Collect the best available diagnostics for a failed check: structured
/// annotations first, then the check's own output, then the raw job log.
/// Returns an empty string when nothing is available; fetch errors at one
/// level fall through to the next.
pub async fn collect_diagnostics(host: &dyn ChangeHost, failure: &CheckFailure) -> String {
    match host
        .list_check_annotations(&failure.repo, failure.credential, failure.check_run_id)
        .await
    {
        Ok(annotations) if !annotations.is_empty() => {
            debug!(count = annotations.len(), "Using check annotations as diagnostics");
            return format_annotations(&failure.check_name, &annotations);
        }
        Ok(_) => {}
        Err(e) => warn!("Annotation fetch failed, falling back: {e:#}"),
    }

    match host
        .fetch_check_output(&failure.repo, failure.credential, failure.check_run_id)
        .await
    {
        Ok(Some(output)) if !output.trim().is_empty() => {
            debug!("Using check output as diagnostics");
            return output;
        }
        Ok(_) => {}
        Err(e) => warn!("Check output fetch failed, falling back: {e:#}"),
    }

    // For workflow checks the check_run id doubles as the Actions job id
    match host
        .fetch_job_log(&failure.repo, failure.credential, failure.check_run_id)
        .await
    {
        Ok(Some(log)) if !log.trim().is_empty() => {
            debug!(bytes = log.len(), "Using job log tail as diagnostics");
            return tail(&log, MAX_LOG_TAIL).to_string();
        }
        Ok(_) => {}
        Err(e) => warn!("Job log fetch failed: {e:#}"),
    }

    String::new()
}

fn format_annotations(check_name: &str, annotations: &[CheckAnnotation]) -> String {
    let mut out = format!(
        "Check '{}' failed with {} annotation(s):\n",
        check_name,
        annotations.len()
    );
    for annotation in annotations {
        out.push_str(&format!(
            "{}:{}: {}\n",
            annotation.path, annotation.start_line, annotation.message
        ));
    }
    out
}

/// Last `max` bytes of `s`, cut on a char boundary
fn tail(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut start = s.len() - max;
    while !s.is_char_boundary(start) {
        start += 1;
    }
    &s[start..]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_annotations_render_as_path_line_message() {
        let annotations = vec![
            CheckAnnotation {
                path: "tests/billing.rs".to_string(),
                start_line: 14,
                message: "assertion failed: totals match".to_string(),
            },
            CheckAnnotation {
                path: "tests/billing.rs".to_string(),
                start_line: 30,
                message: "expected 2 invoices, got 1".to_string(),
            },
        ];

        let text = format_annotations("ci/test", &annotations);
        assert!(text.contains("Check 'ci/test' failed with 2 annotation(s)"));
        assert!(text.contains("tests/billing.rs:14: assertion failed: totals match"));
        assert!(text.contains("tests/billing.rs:30: expected 2 invoices, got 1"));
    }

    #[test]
    fn test_tail_keeps_the_end() {
        let log = "a".repeat(100) + "FAILURE AT END";
        let cut = tail(&log, 20);
        assert_eq!(cut.len(), 20);
        assert!(cut.ends_with("FAILURE AT END"));

        let short = "short log";
        assert_eq!(tail(short, 20), short);
    }

    #[test]
    fn test_tail_respects_char_boundaries() {
        let log = "日本語のログ出力".repeat(10);
        let cut = tail(&log, 25);
        assert!(cut.len() <= 25);
        // Must still be valid UTF-8 addressable text
        assert!(cut.chars().count() > 0);
    }
}
