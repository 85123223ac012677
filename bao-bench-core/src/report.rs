//! End-of-run report
//!
//! Built once from the aggregator after the attack, then rendered as a text
//! table or JSON. Nothing in a `Report` changes after construction.

use bao_bench_config::{ReportConfig, ReportFormat};
use bao_bench_http::HttpMethod;
use chrono::{DateTime, Utc};
use comfy_table::{presets::UTF8_FULL, Cell, CellAlignment, Color, Table};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use thiserror::Error;
use uuid::Uuid;

use crate::aggregator::{Aggregator, TypeSummary};
use crate::attack::AttackSummary;
use crate::lifecycle::CleanupSummary;

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("failed to serialize report: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to write report: {0}")]
    Io(#[from] std::io::Error),
}

/// One provisioned definition and its share of the traffic
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetEntry {
    pub index: usize,
    pub name: String,
    pub test_type: String,
    pub weight: u32,
    pub probability: f64,
    pub method: HttpMethod,
    pub path_prefix: String,
}

/// Run parameters echoed into the report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunMetadata {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub address: String,
    pub rate: f64,
    pub workers: u32,
}

impl RunMetadata {
    pub fn new(address: impl Into<String>, rate: f64, workers: u32) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            address: address.into(),
            rate,
            workers,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    #[serde(flatten)]
    pub metadata: RunMetadata,
    pub finished_at: DateTime<Utc>,
    pub attack_seconds: f64,
    pub drain_seconds: f64,
    pub requests_sent: u64,
    pub missed_permits: u64,
    pub abandoned: u32,
    pub stopped_early: bool,
    pub targets: Vec<TargetEntry>,
    pub per_type: BTreeMap<String, TypeSummary>,
    pub overall: TypeSummary,
    pub cleanup: CleanupSummary,
    pub warnings: Vec<String>,
}

impl Report {
    pub fn new(
        metadata: RunMetadata,
        aggregator: &Aggregator,
        attack: &AttackSummary,
        targets: Vec<TargetEntry>,
        cleanup: CleanupSummary,
    ) -> Self {
        let (per_type, overall) = aggregator.summarize(attack.attack_duration);

        let mut warnings = cleanup.warnings();
        if attack.abandoned > 0 {
            warnings.push(format!(
                "{} request(s) were still in flight after the grace period and were abandoned",
                attack.abandoned
            ));
        }
        if attack.missed_permits > 0 {
            warnings.push(format!(
                "{} request(s) were skipped because all workers were busy; consider more workers",
                attack.missed_permits
            ));
        }

        Self {
            metadata,
            finished_at: Utc::now(),
            attack_seconds: attack.attack_duration.as_secs_f64(),
            drain_seconds: attack.drain_duration.as_secs_f64(),
            requests_sent: attack.requests_sent,
            missed_permits: attack.missed_permits,
            abandoned: attack.abandoned,
            stopped_early: attack.stopped_early,
            targets,
            per_type,
            overall,
            cleanup,
            warnings,
        }
    }

    pub fn render(&self, format: ReportFormat) -> Result<String, ReportError> {
        match format {
            ReportFormat::Text => Ok(self.render_text()),
            ReportFormat::Json => Ok(serde_json::to_string_pretty(self)?),
        }
    }

    /// Write to the configured file, or stdout
    pub fn write(&self, config: &ReportConfig) -> Result<(), ReportError> {
        let mut rendered = self.render(config.format)?;
        if !rendered.ends_with('\n') {
            rendered.push('\n');
        }
        match config.output {
            Some(ref path) => {
                std::fs::write(path, rendered)?;
                tracing::info!(path = %path.display(), "report written");
            }
            None => {
                let mut stdout = std::io::stdout().lock();
                stdout.write_all(rendered.as_bytes())?;
                stdout.flush()?;
            }
        }
        Ok(())
    }

    pub fn render_text(&self) -> String {
        let mut output = String::new();

        output.push_str(&format!(
            "Run {} against {}\n",
            self.metadata.run_id, self.metadata.address
        ));
        output.push_str(&format!(
            "  Started: {}  Attack: {:.2}s  Drain: {:.2}s  Target rate: {} req/s  Workers: {}{}\n\n",
            self.metadata.started_at.format("%Y-%m-%d %H:%M:%S UTC"),
            self.attack_seconds,
            self.drain_seconds,
            self.metadata.rate,
            self.metadata.workers,
            if self.stopped_early { "  (stopped early)" } else { "" }
        ));

        if !self.targets.is_empty() {
            output.push_str(&self.targets_table().to_string());
            output.push('\n');
        }

        output.push_str(&self.results_table().to_string());
        output.push('\n');

        let failing: Vec<_> = self
            .per_type
            .iter()
            .filter(|(_, summary)| !summary.errors.is_empty())
            .collect();
        if !failing.is_empty() {
            output.push_str("\nFailures by class:\n");
            for (test_type, summary) in failing {
                let classes: Vec<String> = summary
                    .errors
                    .iter()
                    .map(|(class, count)| format!("{}={}", class, count))
                    .collect();
                output.push_str(&format!("  {}: {}\n", test_type, classes.join(", ")));
            }
        }

        output.push_str(&format!(
            "\nCleanup: {}/{} succeeded",
            self.cleanup.succeeded, self.cleanup.attempted
        ));
        if self.cleanup.already_absent > 0 {
            output.push_str(&format!(" ({} already removed)", self.cleanup.already_absent));
        }
        output.push('\n');

        if !self.warnings.is_empty() {
            output.push_str("\nWarnings:\n");
            for warning in &self.warnings {
                output.push_str(&format!("  - {}\n", warning));
            }
        }

        output
    }

    fn targets_table(&self) -> Table {
        let mut table = Table::new();
        table.load_preset(UTF8_FULL);
        table.set_header(vec!["#", "Name", "Type", "Weight", "Share", "Request"]);

        for target in &self.targets {
            table.add_row(vec![
                Cell::new(target.index),
                Cell::new(&target.name),
                Cell::new(&target.test_type),
                Cell::new(target.weight).set_alignment(CellAlignment::Right),
                Cell::new(format!("{:.1}%", target.probability * 100.0))
                    .set_alignment(CellAlignment::Right),
                Cell::new(format!("{} {}", target.method, target.path_prefix)),
            ]);
        }
        table
    }

    fn results_table(&self) -> Table {
        let mut table = Table::new();
        table.load_preset(UTF8_FULL);
        table.set_header(vec![
            "Type", "Requests", "Success", "Req/s", "OK/s", "Mean", "p50", "p90", "p95", "p99",
            "Max", "Bytes in",
        ]);

        for (test_type, summary) in &self.per_type {
            table.add_row(summary_row(Cell::new(test_type), summary));
        }
        table.add_row(summary_row(Cell::new("TOTAL").fg(Color::Cyan), &self.overall));
        table
    }
}

fn summary_row(label: Cell, summary: &TypeSummary) -> Vec<Cell> {
    let success = format!("{:.2}%", summary.success_rate * 100.0);
    let success_cell = if summary.requests == 0 {
        Cell::new("-")
    } else if summary.failures == 0 {
        Cell::new(success).fg(Color::Green)
    } else {
        Cell::new(success).fg(Color::Red)
    };

    let ms = |value: f64| Cell::new(format!("{:.2}ms", value)).set_alignment(CellAlignment::Right);
    let latency = &summary.latency;

    vec![
        label,
        Cell::new(summary.requests).set_alignment(CellAlignment::Right),
        success_cell,
        Cell::new(format!("{:.1}", summary.request_rate)).set_alignment(CellAlignment::Right),
        Cell::new(format!("{:.1}", summary.throughput)).set_alignment(CellAlignment::Right),
        ms(latency.mean_ms),
        ms(latency.p50_ms),
        ms(latency.p90_ms),
        ms(latency.p95_ms),
        ms(latency.p99_ms),
        ms(latency.max_ms),
        Cell::new(summary.bytes_in).set_alignment(CellAlignment::Right),
    ]
}
