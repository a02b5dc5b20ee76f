use crate::graph::{TreeNode, build_tree};
use crate::render::render_tree;
use arachne_scanner::{CrawlFailure, VisitationLedger};
use serde::Serialize;
use std::fs;
use std::path::Path;

const DIVIDER: &str = "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFormat {
    Text,
    Json,
}

impl ReportFormat {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "text" | "txt" => Some(ReportFormat::Text),
            "json" => Some(ReportFormat::Json),
            _ => None,
        }
    }
}

/// Everything a report needs, gathered once from a finalized ledger.
#[derive(Debug, Clone, Serialize)]
pub struct ReportData {
    pub root: String,
    pub max_depth: usize,
    pub claimed: usize,
    pub tree: TreeNode,
    pub failures: Vec<CrawlFailure>,
}

impl ReportData {
    pub fn from_ledger(root: &str, max_depth: usize, ledger: &VisitationLedger) -> Self {
        Self {
            root: root.to_string(),
            max_depth,
            claimed: ledger.claimed_count(),
            tree: build_tree(root, &ledger.edge_map()),
            failures: ledger.failures(),
        }
    }
}

pub fn generate_text_report(data: &ReportData) -> String {
    let mut report = String::new();
    report.push_str(&format!(
        "# Hierarchy of {} (depth {})\n\n",
        data.root, data.max_depth
    ));
    report.push_str(&render_tree(&data.tree));
    report.push('\n');
    report.push_str(DIVIDER);
    report.push_str("\n\n# Summary:\n");
    report.push_str(&format!("  Identifiers claimed: {}\n", data.claimed));
    report.push_str(&format!("  Nodes in tree: {}\n", data.tree.node_count()));
    report.push_str(&format!("  Failures: {}\n", data.failures.len()));

    for failure in &data.failures {
        report.push_str(&format!("    ✗ {}: {}\n", failure.url, failure.error));
    }

    report
}

pub fn generate_json_report(data: &ReportData) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(data)
}

pub fn generate_report(
    data: &ReportData,
    format: ReportFormat,
) -> Result<String, serde_json::Error> {
    match format {
        ReportFormat::Text => Ok(generate_text_report(data)),
        ReportFormat::Json => generate_json_report(data),
    }
}

pub fn save_report(content: &str, path: &Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, content)
}
