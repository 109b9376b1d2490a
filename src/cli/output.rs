//! Output formatting for CLI commands.
//!
//! Every formatter returns a `String`; `main` decides where it goes.

use colored::Colorize;
use serde::Serialize;
use std::fmt::Write;
use tabled::{Table, Tabled};

use crate::client::TenantStats;
use crate::config::{ConfigHasher, ValidationResult};
use crate::planner::{ActionType, DiffType};
use crate::reconciler::{DriftReport, PlannedRun, ReconciliationResult, RefreshReport};
use crate::state::ProviderState;

use super::commands::OutputFormat;

/// Output formatter for CLI.
#[derive(Debug)]
pub struct OutputFormatter {
    /// Output format.
    format: OutputFormat,
}

/// Plan action row for table display.
#[derive(Tabled)]
struct PlanActionRow {
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "Action")]
    action: String,
    #[tabled(rename = "Resource")]
    resource: String,
    #[tabled(rename = "Reason")]
    reason: String,
}

/// Managed resource row.
#[derive(Tabled)]
struct ResourceRow {
    #[tabled(rename = "Address")]
    address: String,
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Spec")]
    spec: String,
    #[tabled(rename = "Updated")]
    updated: String,
}

/// Distributor statistics row.
#[derive(Tabled)]
struct StatsRow {
    #[tabled(rename = "Tenant")]
    user: String,
    #[tabled(rename = "Series")]
    series: u64,
    #[tabled(rename = "Ingest rate")]
    ingest_rate: String,
    #[tabled(rename = "API rate")]
    api_ingest_rate: String,
    #[tabled(rename = "Rule rate")]
    rule_ingest_rate: String,
}

impl OutputFormatter {
    /// Creates a new output formatter.
    #[must_use]
    pub const fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Returns the output format.
    #[must_use]
    pub const fn format(&self) -> OutputFormat {
        self.format
    }

    /// Formats a plan for display.
    #[must_use]
    pub fn format_plan(&self, run: &PlannedRun, detailed: bool) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(&PlanJson::from(run)).unwrap_or_default(),
            OutputFormat::Text => Self::format_plan_text(run, detailed),
        }
    }

    fn format_plan_text(run: &PlannedRun, detailed: bool) -> String {
        let mut output = Self::format_refresh_text(&run.refresh);

        if run.plan.is_empty() {
            let _ = writeln!(
                output,
                "{} No changes. Remote objects match the manifest.",
                "✓".green()
            );
            return output;
        }

        output.push_str("\nPlan\n\n");

        let rows: Vec<PlanActionRow> = run
            .plan
            .actions
            .iter()
            .enumerate()
            .map(|(i, a)| PlanActionRow {
                index: i + 1,
                action: Self::format_action_type(a.action_type),
                resource: a.address.clone(),
                reason: Self::truncate(&a.reason, 48),
            })
            .collect();
        output.push_str(&Table::new(rows).to_string());
        output.push('\n');

        if detailed {
            let hasher = ConfigHasher::new();
            output.push('\n');
            for diff in run.diff.actionable_diffs() {
                let short = |h: Option<&String>| {
                    h.map_or_else(|| String::from("-"), |h| hasher.short_hash(h))
                };
                let _ = writeln!(
                    output,
                    "   {} {} -> {}",
                    diff.address,
                    short(diff.old_hash.as_ref()),
                    short(diff.new_hash.as_ref())
                );
            }
        }

        let _ = writeln!(
            output,
            "\nPlan: {} to create, {} to update, {} to replace, {} to destroy",
            run.diff.creates().to_string().green(),
            run.diff.updates().to_string().yellow(),
            run.diff.replaces().to_string().yellow(),
            run.diff.deletes().to_string().red()
        );

        output
    }

    /// Formats a refresh report.
    #[must_use]
    pub fn format_refresh(&self, report: &RefreshReport) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(report).unwrap_or_default(),
            OutputFormat::Text => {
                let text = Self::format_refresh_text(report);
                if text.is_empty() {
                    format!(
                        "{} Refreshed {} resource(s), no changes found.\n",
                        "✓".green(),
                        report.unchanged
                    )
                } else {
                    text
                }
            }
        }
    }

    fn format_refresh_text(report: &RefreshReport) -> String {
        let mut output = String::new();
        for address in &report.vanished {
            let _ = writeln!(
                output,
                "{} {address} was deleted outside mimirform and has been removed from state",
                "⚠".yellow()
            );
        }
        for address in &report.drifted {
            let _ = writeln!(output, "{} {address} has changed outside mimirform", "⚠".yellow());
        }
        output
    }

    /// Formats a drift report.
    #[must_use]
    pub fn format_drift(&self, report: &DriftReport) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(report).unwrap_or_default(),
            OutputFormat::Text => {
                if report.is_converged() {
                    return format!("{} No drift detected - state is converged.\n", "✓".green());
                }
                let mut output = String::new();
                if report.has_drift {
                    let _ = writeln!(output, "{} Drift detected:\n", "⚠".yellow());
                    for resource in &report.drifted_resources {
                        let _ = writeln!(output, "   ~ {resource}");
                    }
                    for resource in &report.vanished_resources {
                        let _ = writeln!(output, "   - {resource} (deleted remotely)");
                    }
                }
                if !report.pending_changes.is_empty() {
                    let _ = writeln!(output, "\nPending changes:");
                    for change in &report.pending_changes {
                        let _ = writeln!(output, "   {change}");
                    }
                }
                let _ = writeln!(
                    output,
                    "\n{}/{} declared resources need attention.",
                    report.drifted_resources.len()
                        + report.vanished_resources.len()
                        + report.pending_changes.len(),
                    report.total_resources
                );
                output
            }
        }
    }

    /// Formats an apply or destroy result.
    #[must_use]
    pub fn format_reconciliation(&self, result: &ReconciliationResult, operation: &str) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(result).unwrap_or_default(),
            OutputFormat::Text => {
                let status = if result.success {
                    format!("{} {operation} complete", "✓".green())
                } else {
                    format!("{} {operation} failed", "✗".red())
                };

                let mut output = Self::format_refresh_text(&result.refresh);
                let _ = writeln!(output, "{status}\n");
                let _ = writeln!(output, "   Created: {}", result.created);
                let _ = writeln!(output, "   Updated: {}", result.updated);
                let _ = writeln!(output, "   Replaced: {}", result.replaced);
                let _ = writeln!(output, "   Deleted: {}", result.deleted);
                let _ = writeln!(output, "   Unchanged: {}", result.unchanged);

                if !result.errors.is_empty() {
                    let _ = write!(output, "\n{} Errors:\n", "⚠".yellow());
                    for error in &result.errors {
                        let _ = writeln!(output, "   - {error}");
                    }
                }

                output
            }
        }
    }

    /// Formats a state summary.
    #[must_use]
    pub fn format_state(&self, state: &ProviderState) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(state).unwrap_or_default(),
            OutputFormat::Text => {
                let mut output = String::from("\nState\n\n");

                let _ = writeln!(output, "   Version: {}", state.version);
                let _ = writeln!(output, "   Last updated: {}", state.last_updated);
                let _ = writeln!(output, "   Resources: {}", state.len());

                if !state.is_empty() {
                    output.push('\n');
                    output.push_str(&Self::resource_table(state));
                    output.push('\n');
                }

                if !state.history.is_empty() {
                    let _ = writeln!(output, "\n   Recent history ({}):", state.history.len());
                    for entry in state.history.iter().rev().take(5) {
                        let status = if entry.success { "✓".green() } else { "✗".red() };
                        let _ = writeln!(
                            output,
                            "     {status} {} - {} ({})",
                            entry.timestamp.format("%Y-%m-%d %H:%M"),
                            entry.operation,
                            entry.resources.join(", ")
                        );
                    }
                }

                output
            }
        }
    }

    /// Formats the list of managed addresses.
    #[must_use]
    pub fn format_state_list(&self, state: &ProviderState) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(&state.addresses()).unwrap_or_default(),
            OutputFormat::Text => {
                let mut output = String::new();
                for address in state.addresses() {
                    let _ = writeln!(output, "{address}");
                }
                output
            }
        }
    }

    fn resource_table(state: &ProviderState) -> String {
        let hasher = ConfigHasher::new();
        let rows: Vec<ResourceRow> = state
            .resources
            .values()
            .map(|r| ResourceRow {
                address: r.address.clone(),
                id: r.id.clone(),
                spec: if r.is_drifted() {
                    "drifted".yellow().to_string()
                } else {
                    hasher.short_hash(&r.spec_hash)
                },
                updated: r.updated_at.format("%Y-%m-%d %H:%M").to_string(),
            })
            .collect();
        Table::new(rows).to_string()
    }

    /// Formats a validation result.
    #[must_use]
    pub fn format_validation(&self, result: &ValidationResult, show_warnings: bool) -> String {
        match self.format {
            OutputFormat::Json => {
                let json = serde_json::json!({
                    "valid": result.is_valid(),
                    "errors": result.errors.iter().map(ToString::to_string).collect::<Vec<_>>(),
                    "warnings": result.warnings,
                });
                serde_json::to_string_pretty(&json).unwrap_or_default()
            }
            OutputFormat::Text => {
                let mut output = String::new();
                if result.is_valid() {
                    let _ = writeln!(output, "{} Manifest is valid.", "✓".green());
                } else {
                    let _ = writeln!(
                        output,
                        "{} Manifest has {} error(s):",
                        "✗".red(),
                        result.error_count()
                    );
                    for error in &result.errors {
                        let _ = writeln!(output, "   - {error}");
                    }
                }
                if show_warnings && !result.warnings.is_empty() {
                    let _ = writeln!(output, "\n{} Warnings:", "⚠".yellow());
                    for warning in &result.warnings {
                        let _ = writeln!(output, "   - {warning}");
                    }
                }
                output
            }
        }
    }

    /// Formats distributor statistics.
    #[must_use]
    pub fn format_stats(&self, stats: &[TenantStats]) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(stats).unwrap_or_default(),
            OutputFormat::Text => {
                if stats.is_empty() {
                    return String::from("No tenants reported by the distributor.\n");
                }
                let rows: Vec<StatsRow> = stats
                    .iter()
                    .map(|s| StatsRow {
                        user: s.user.clone(),
                        series: s.series,
                        ingest_rate: format!("{:.2}", s.ingest_rate),
                        api_ingest_rate: format!("{:.2}", s.api_ingest_rate),
                        rule_ingest_rate: format!("{:.2}", s.rule_ingest_rate),
                    })
                    .collect();
                format!("{}\n", Table::new(rows))
            }
        }
    }

    /// Formats any object: pretty JSON, or YAML for text output.
    #[must_use]
    pub fn format_object<T: Serialize + ?Sized>(&self, value: &T) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(value).unwrap_or_default(),
            OutputFormat::Text => serde_yaml::to_string(value).unwrap_or_default(),
        }
    }

    /// Formats a status message.
    #[must_use]
    pub fn message(&self, kind: MessageKind, message: &str) -> String {
        match self.format {
            OutputFormat::Json => {
                let json = serde_json::json!({ "status": kind.as_str(), "message": message });
                serde_json::to_string_pretty(&json).unwrap_or_default()
            }
            OutputFormat::Text => {
                let marker = match kind {
                    MessageKind::Success => "✓".green(),
                    MessageKind::Warning => "⚠".yellow(),
                    MessageKind::Error => "✗".red(),
                };
                format!("{marker} {message}")
            }
        }
    }

    fn format_action_type(action_type: ActionType) -> String {
        match action_type {
            ActionType::Create => "+create".green().to_string(),
            ActionType::Update => "~update".yellow().to_string(),
            ActionType::Delete => "-delete".red().to_string(),
        }
    }

    /// Truncates a string to at most `max_len` characters.
    fn truncate(s: &str, max_len: usize) -> String {
        if s.chars().count() <= max_len {
            s.to_string()
        } else {
            let head: String = s.chars().take(max_len.saturating_sub(3)).collect();
            format!("{head}...")
        }
    }
}

/// Kind of a one-line status message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    /// Operation succeeded.
    Success,
    /// Something needs attention.
    Warning,
    /// Operation failed.
    Error,
}

impl MessageKind {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }
}

#[derive(Serialize)]
struct PlanJson<'a> {
    creates: usize,
    updates: usize,
    replaces: usize,
    deletes: usize,
    unchanged: usize,
    refresh: &'a RefreshReport,
    actions: &'a [crate::planner::PlannedAction],
    drifted: Vec<&'a str>,
}

impl<'a> From<&'a PlannedRun> for PlanJson<'a> {
    fn from(run: &'a PlannedRun) -> Self {
        Self {
            creates: run.diff.creates(),
            updates: run.diff.updates(),
            replaces: run.diff.replaces(),
            deletes: run.diff.deletes(),
            unchanged: run.diff.unchanged(),
            refresh: &run.refresh,
            actions: &run.plan.actions,
            drifted: run
                .diff
                .diffs
                .iter()
                .filter(|d| d.diff_type == DiffType::Drift)
                .map(|d| d.address.as_str())
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ValidationError;

    #[test]
    fn test_truncate() {
        assert_eq!(OutputFormatter::truncate("short", 10), "short");
        assert_eq!(OutputFormatter::truncate("abcdefghijkl", 8), "abcde...");
    }

    #[test]
    fn test_validation_json() {
        let result = ValidationResult {
            errors: vec![ValidationError {
                field: String::from("provider.uri"),
                message: String::from("missing"),
            }],
            warnings: vec![String::from("w")],
        };
        let text = OutputFormatter::new(OutputFormat::Json).format_validation(&result, false);
        let json: serde_json::Value = serde_json::from_str(&text).expect("json");
        assert_eq!(json["valid"], false);
        assert_eq!(json["errors"][0], "provider.uri: missing");
    }

    #[test]
    fn test_stats_table() {
        let stats = vec![TenantStats {
            user: String::from("tenant-1"),
            series: 42,
            ingest_rate: 1.5,
            api_ingest_rate: 1.0,
            rule_ingest_rate: 0.5,
        }];
        let text = OutputFormatter::new(OutputFormat::Text).format_stats(&stats);
        assert!(text.contains("tenant-1"));
        assert!(text.contains("1.50"));
    }

    #[test]
    fn test_object_text_is_yaml() {
        let value = serde_json::json!({"name": "cpu"});
        let text = OutputFormatter::new(OutputFormat::Text).format_object(&value);
        assert_eq!(text, "name: cpu\n");
    }
}
