// src/analysis/report.rs
// Composes the PR comment and risk labels from one analysis record

use crate::analysis::command::Command;
use crate::analysis::error::AnalysisError;
use crate::analysis::health::recommendation_notice;
use crate::analysis::types::{
    AnalysisRecord, CoverageSignal, DependencyAudit, Finding, Gap, MergeRecommendation,
    TestScenario,
};

/// The single visible comment for one run. Sections with nothing to say are
/// omitted entirely; a partial comment is never produced.
pub fn format_analysis_comment(record: &AnalysisRecord) -> String {
    let mut output = String::new();

    output.push_str("## Vigil Risk Analysis\n\n");

    let (label, reason) = recommendation_notice(record.result.merge_recommendation);
    output.push_str(&format!("**{}** — {}\n\n", label, reason));

    output.push_str(&format!(
        "Risk: **{}** ({}/100) · Health: **{}** ({}/100, {})\n\n",
        record.result.risk_level,
        record.result.risk_score,
        record.health.status.as_str(),
        record.health.score,
        record.health.trend.as_str(),
    ));

    if !record.result.summary.is_empty() {
        output.push_str(&record.result.summary);
        output.push_str("\n\n");
    }

    if !record.result.findings.is_empty() {
        output.push_str(&format_findings_section(&record.result.findings));
    }

    output.push_str(&format_test_section(
        &record.result.gaps,
        &record.result.scenarios,
        record.coverage.as_ref(),
    ));

    if let Some(ref audit) = record.dependencies {
        output.push_str(&format_dependency_section(audit));
    }

    output.push_str("---\n");
    output.push_str(
        "*Was this analysis useful? React with 👍 or 👎, or run `/vigil help` for commands.*\n",
    );

    output
}

fn format_findings_section(findings: &[Finding]) -> String {
    let mut output = format!("### Findings ({})\n", findings.len());

    for finding in findings {
        output.push_str(&format!(
            "- **{}** [{}] {}",
            finding.level, finding.area, finding.description
        ));
        if !finding.mitigation.is_empty() {
            output.push_str(&format!(" — mitigation: {}", finding.mitigation));
        }
        output.push('\n');
    }
    output.push('\n');

    output
}

fn format_test_section(
    gaps: &[Gap],
    scenarios: &[TestScenario],
    coverage: Option<&CoverageSignal>,
) -> String {
    if gaps.is_empty() && scenarios.is_empty() && coverage.is_none() {
        return String::new();
    }

    let mut output = String::from("### Test coverage\n");

    if let Some(signal) = coverage {
        if signal.source_files_changed > 0 {
            output.push_str(&format!(
                "- {} of {} changed source files have companion test updates ({} test files touched)\n",
                signal.covered_files, signal.source_files_changed, signal.test_files_changed
            ));
        } else {
            output.push_str("- No source files changed\n");
        }
    }

    for gap in gaps {
        output.push_str(&format!("- **{}** gap: {}\n", gap.severity, gap.description));
    }

    if !scenarios.is_empty() {
        output.push_str("\n**Suggested scenarios**\n");
        for scenario in scenarios {
            output.push_str(&format!("- {}: {}\n", scenario.name, scenario.description));
        }
    }
    output.push('\n');

    output
}

fn format_dependency_section(audit: &DependencyAudit) -> String {
    if audit.manifests_changed.is_empty() {
        return String::new();
    }

    let mut output = String::from("### Dependency changes\n");
    output.push_str(&format!(
        "- Manifests touched: {}\n",
        audit.manifests_changed.join(", ")
    ));
    for alert in &audit.alerts {
        output.push_str(&format!("- ⚠ {}\n", alert));
    }
    output.push('\n');

    output
}

/// Labels derived from the same record as the comment — never from two
/// different runs.
pub fn risk_labels(record: &AnalysisRecord) -> Vec<String> {
    let mut labels = vec![
        format!("vigil:risk:{}", record.result.risk_level),
        record.health.status_label(),
    ];
    if record.result.merge_recommendation == MergeRecommendation::Block {
        labels.push("vigil:blocked".to_string());
    }
    labels
}

/// Best-effort comment posted when a full-mode run dies
pub fn format_error_comment(error: &AnalysisError) -> String {
    format!(
        "## Vigil Risk Analysis\n\n\
         The analysis could not be completed (phase: {}).\n\n\
         ```\n{}\n```\n\n\
         *Vigil will run again on the next push, or on `/vigil analyze`.*\n",
        error.phase().as_str(),
        error
    )
}

/// Posted immediately when a `/vigil` command is accepted
pub fn format_ack_comment(command: Command) -> String {
    match command {
        Command::Analyze => {
            "🔍 Vigil is analyzing this pull request. Results will appear here shortly."
                .to_string()
        }
        Command::GenerateTests => {
            "🧪 Vigil is generating tests for this pull request. A companion PR will be linked here when ready."
                .to_string()
        }
        Command::Help => crate::analysis::command::help_text(),
    }
}
