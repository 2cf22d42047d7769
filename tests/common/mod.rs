//! Shared fixtures for the integration tests

#![allow(dead_code)]

use chrono::{TimeZone, Utc};
use incident_kb_search::config::Config;
use incident_kb_search::models::Document;
use incident_kb_search::ranking::InMemoryIndex;
use incident_kb_search::search::SearchService;
use std::collections::HashMap;
use std::sync::Arc;

fn entry(
    id: &str,
    title: &str,
    problem: &str,
    solution: &str,
    category: &str,
    tags: &[&str],
    usage: (u64, u64, u64),
    updated_day: u32,
) -> Document {
    let mut doc = Document::new(id, title, problem, solution, category)
        .with_tags(tags.to_vec())
        .with_usage(usage.0, usage.1, usage.2);
    let updated = Utc.with_ymd_and_hms(2026, 9, updated_day, 8, 0, 0).unwrap();
    doc.created_at = updated;
    doc.updated_at = updated;
    doc
}

/// A small mainframe knowledge base
pub fn knowledge_base() -> Vec<Document> {
    vec![
        entry(
            "kb-1",
            "VSAM S0C7 Error Resolution",
            "Batch job abends with S0C7 data exception while reading a VSAM KSDS",
            "Check packed decimal fields in the copybook and initialize the record area",
            "VSAM",
            &["vsam", "abend", "s0c7"],
            (40, 18, 2),
            1,
        ),
        entry(
            "kb-2",
            "DB2 SQLCODE -911 deadlock or timeout",
            "Transaction rolled back because of a deadlock on a tablespace",
            "Commit more frequently and review lock escalation",
            "DB2",
            &["db2", "deadlock", "sqlcode"],
            (25, 10, 5),
            20,
        ),
        entry(
            "kb-3",
            "JCL error IEF450I job abended",
            "Step ended with a system abend S0C4",
            "Review the STEPLIB concatenation and the program load module",
            "JCL",
            &["jcl", "abend"],
            (12, 6, 6),
            10,
        ),
        entry(
            "kb-4",
            "CICS transaction ASRA abend",
            "Program check in a CICS transaction",
            "Use CEDF to trace the failing program and check the database call",
            "CICS",
            &["cics", "asra"],
            (8, 3, 1),
            25,
        ),
        entry(
            "kb-5",
            "Printer queue stalled",
            "Output stays on the JES spool",
            "Restart the external writer and purge held output",
            "JES",
            &["jes", "sysout"],
            (3, 1, 0),
            5,
        ),
        entry(
            "kb-6",
            "Dataset space allocation SB37",
            "Job fails with SB37 out of space on a dataset",
            "Increase secondary extents or move the database unload to a larger volume",
            "Storage",
            &["sms", "space"],
            (30, 20, 1),
            15,
        ),
    ]
}

/// Search service over [`knowledge_base`] with background tasks off
pub fn test_service() -> (SearchService, Arc<InMemoryIndex>) {
    let mut config = Config::default();
    config.search.background_sweep = false;
    SearchService::in_memory(&config, knowledge_base())
}

/// Helper function to parse Prometheus exposition format
/// Returns a map of metric lines for easy assertion
pub fn parse_prometheus_output(output: &str) -> HashMap<String, Vec<String>> {
    let mut metrics = HashMap::new();
    let mut current_metric = String::new();

    for line in output.lines() {
        let line = line.trim();

        // Skip empty lines
        if line.is_empty() {
            continue;
        }

        // HELP and TYPE comments
        if line.starts_with("# HELP") || line.starts_with("# TYPE") {
            let parts: Vec<&str> = line.split_whitespace().collect();
            if parts.len() >= 3 {
                current_metric = parts[2].to_string();
                metrics
                    .entry(current_metric.clone())
                    .or_insert_with(Vec::new)
                    .push(line.to_string());
            }
        }
        // Metric values
        else if !line.starts_with('#') && !current_metric.is_empty() {
            metrics
                .entry(current_metric.clone())
                .or_insert_with(Vec::new)
                .push(line.to_string());
        }
    }

    metrics
}
