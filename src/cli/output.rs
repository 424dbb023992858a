//! Output formatting for CLI commands.
//!
//! This module provides formatting utilities for displaying
//! information to the user in various formats.

use colored::Colorize;
use std::fmt::Write;
use tabled::{Table, Tabled};

use crate::config::{TenantConfig, ValidationResult};
use crate::planner::{ReconciliationPlan, ReconciliationReport};
use crate::reconciler::DriftReport;
use crate::resource::{FieldValue, Resource, ResourceKind};
use crate::state::RunRecord;

use super::commands::OutputFormat;

/// Output formatter for CLI.
#[derive(Debug)]
pub struct OutputFormatter {
    /// Output format.
    format: OutputFormat,
}

/// Plan operation row for table display.
#[derive(Tabled)]
struct PlanOperationRow {
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "Action")]
    action: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Details")]
    details: String,
}

/// Remote resource row for table display.
#[derive(Tabled)]
struct ResourceRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Description")]
    description: String,
}

/// Run history row for table display.
#[derive(Tabled)]
struct HistoryRow {
    #[tabled(rename = "When")]
    when: String,
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "Result")]
    result: String,
    #[tabled(rename = "+/~/-")]
    changes: String,
    #[tabled(rename = "Plan")]
    fingerprint: String,
}

impl OutputFormatter {
    /// Creates a new output formatter.
    #[must_use]
    pub const fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Formats a reconciliation plan for display.
    #[must_use]
    pub fn format_plan(&self, plan: &ReconciliationPlan, detailed: bool) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(plan).unwrap_or_default(),
            OutputFormat::Text => Self::format_plan_text(plan, detailed),
        }
    }

    /// Formats a plan as text.
    fn format_plan_text(plan: &ReconciliationPlan, detailed: bool) -> String {
        let mut output = String::new();

        let _ = writeln!(
            output,
            "\n{} plan (fingerprint {})",
            capitalize(&plan.kind.to_string()),
            short(&plan.fingerprint)
        );

        if plan.is_empty() && !plan.has_conflicts() {
            let _ = writeln!(
                output,
                "{} No changes required - {} resources are up to date.",
                "✓".green(),
                plan.kind
            );
            return output;
        }

        let mut rows = Vec::new();
        for resource in &plan.creates {
            rows.push(PlanOperationRow {
                index: rows.len() + 1,
                action: "+create".green().to_string(),
                name: resource.key.clone(),
                details: truncate(&field_names(resource), 50),
            });
        }
        for update in &plan.updates {
            rows.push(PlanOperationRow {
                index: rows.len() + 1,
                action: "~update".yellow().to_string(),
                name: update.key.clone(),
                details: truncate(&update.patch.to_string(), 50),
            });
        }
        for delete in &plan.deletes {
            rows.push(PlanOperationRow {
                index: rows.len() + 1,
                action: "-delete".red().to_string(),
                name: delete.key.clone(),
                details: delete.remote_id.clone(),
            });
        }

        if !rows.is_empty() {
            output.push_str(&Table::new(rows).to_string());
            output.push('\n');
        }

        if detailed && !plan.updates.is_empty() {
            output.push_str("\nField changes:\n");
            for update in &plan.updates {
                let _ = writeln!(output, "  {}:", update.key);
                for change in &update.changes {
                    let old = change
                        .old_value
                        .as_ref()
                        .map_or_else(|| String::from("(unset)"), display_value);
                    let _ = writeln!(
                        output,
                        "    {}: {} -> {}",
                        change.field,
                        old.red(),
                        display_value(&change.new_value).green()
                    );
                }
            }
        }

        if plan.has_conflicts() {
            let _ = write!(output, "\n{} Conflicts (left untouched):\n", "⚠".yellow());
            for conflict in &plan.conflicts {
                let _ = writeln!(output, "   - {conflict}");
            }
        }

        let _ = write!(
            output,
            "\nPlan: {} to create, {} to update, {} to delete, {} unchanged\n",
            plan.creates.len().to_string().green(),
            plan.updates.len().to_string().yellow(),
            plan.deletes.len().to_string().red(),
            plan.unchanged.len()
        );

        output
    }

    /// Formats guardrail violations that require confirmation.
    #[must_use]
    pub fn format_violations(&self, violations: &[String]) -> String {
        match self.format {
            OutputFormat::Json => {
                let json = serde_json::json!({ "guardrail_violations": violations });
                serde_json::to_string_pretty(&json).unwrap_or_default()
            }
            OutputFormat::Text => {
                let mut output = format!("\n{} Guardrail violations:\n", "⚠".yellow());
                for violation in violations {
                    let _ = writeln!(output, "   - {violation}");
                }
                output
            }
        }
    }

    /// Formats a reconciliation report.
    #[must_use]
    pub fn format_report(&self, report: &ReconciliationReport) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(report).unwrap_or_default(),
            OutputFormat::Text => {
                let status = if report.has_failures() {
                    format!("{} {} reconciliation finished with failures", "✗".red(), report.kind)
                } else if !report.skipped.is_empty() {
                    format!("{} {} reconciliation interrupted", "⚠".yellow(), report.kind)
                } else {
                    format!("{} {} reconciliation successful", "✓".green(), report.kind)
                };

                let mut output = format!("{status}\n\n");
                let _ = writeln!(output, "   Created: {}", report.creates_succeeded);
                let _ = writeln!(output, "   Updated: {}", report.updates_succeeded);
                let _ = writeln!(output, "   Deleted: {}", report.deletes_succeeded);
                let _ = writeln!(output, "   Unchanged: {}", report.unchanged);
                if !report.conflicts.is_empty() {
                    let _ = writeln!(output, "   Conflicts: {}", report.conflicts.join(", "));
                }

                if report.has_failures() {
                    let _ = write!(output, "\n{} Failures:\n", "✗".red());
                    for failure in &report.failures {
                        let _ = writeln!(output, "   - {failure}");
                    }
                }

                if !report.skipped.is_empty() {
                    let _ = write!(output, "\n{} Not issued:\n", "⚠".yellow());
                    for skipped in &report.skipped {
                        let _ = writeln!(
                            output,
                            "   - {} '{}' ({})",
                            skipped.operation, skipped.key, skipped.reason
                        );
                    }
                }

                output
            }
        }
    }

    /// Formats a drift report.
    #[must_use]
    pub fn format_drift(&self, report: &DriftReport) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(report).unwrap_or_default(),
            OutputFormat::Text => {
                if report.is_converged() {
                    format!(
                        "{} No {} drift detected - state is converged.\n",
                        "✓".green(),
                        report.kind
                    )
                } else {
                    let mut output = format!("{} {} drift detected:\n\n", "⚠".yellow(), capitalize(&report.kind.to_string()));
                    for resource in &report.drifted_resources {
                        let _ = writeln!(output, "   - {resource}");
                    }
                    let _ = write!(
                        output,
                        "\n{} of {} declared resources differ from the tenant.\n",
                        report.drifted_resources.len(),
                        report.desired_count
                    );
                    output
                }
            }
        }
    }

    /// Formats a list of remote resources.
    #[must_use]
    pub fn format_resources(&self, kind: ResourceKind, resources: &[Resource]) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(resources).unwrap_or_default(),
            OutputFormat::Text => {
                if resources.is_empty() {
                    return format!("No {kind} resources found.\n");
                }

                let mut sorted: Vec<&Resource> = resources.iter().collect();
                sorted.sort_by(|a, b| a.key.cmp(&b.key));

                let rows: Vec<ResourceRow> = sorted
                    .into_iter()
                    .map(|r| ResourceRow {
                        name: r.key.clone(),
                        id: r.remote_id.clone().unwrap_or_default(),
                        description: truncate(r.description().unwrap_or(""), 40),
                    })
                    .collect();

                let mut output = Table::new(rows).to_string();
                let _ = write!(output, "\n{} {kind} resource(s)\n", resources.len());
                output
            }
        }
    }

    /// Formats recorded runs.
    #[must_use]
    pub fn format_history(&self, runs: &[&RunRecord]) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(runs).unwrap_or_default(),
            OutputFormat::Text => {
                if runs.is_empty() {
                    return String::from("No runs recorded yet.\n");
                }

                let rows: Vec<HistoryRow> = runs
                    .iter()
                    .map(|run| HistoryRow {
                        when: run.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
                        kind: run.kind.to_string(),
                        result: if run.failed > 0 {
                            format!("{} failed", run.failed).red().to_string()
                        } else if run.skipped > 0 {
                            format!("{} skipped", run.skipped).yellow().to_string()
                        } else {
                            "ok".green().to_string()
                        },
                        changes: format!("{}/{}/{}", run.created, run.updated, run.deleted),
                        fingerprint: short(&run.fingerprint),
                    })
                    .collect();

                let mut output = Table::new(rows).to_string();
                output.push('\n');
                output
            }
        }
    }

    /// Formats a validation summary.
    #[must_use]
    pub fn format_validation(&self, config: &TenantConfig, result: &ValidationResult) -> String {
        match self.format {
            OutputFormat::Json => {
                let json = serde_json::json!({
                    "valid": result.is_valid(),
                    "domain": config.tenant.domain,
                    "apps": config.apps.as_ref().map(Vec::len),
                    "roles": config.roles.as_ref().map(Vec::len),
                    "warnings": result.warnings,
                });
                serde_json::to_string_pretty(&json).unwrap_or_default()
            }
            OutputFormat::Text => {
                let mut output = format!("{} Tenant file is valid\n", "✓".green());

                if !result.warnings.is_empty() {
                    let _ = write!(output, "\n{} Warnings:\n", "⚠".yellow());
                    for warning in &result.warnings {
                        let _ = writeln!(output, "   - {warning}");
                    }
                }

                output.push_str("\nSummary:\n");
                let _ = writeln!(output, "   Domain: {}", config.tenant.domain);
                for kind in ResourceKind::ALL {
                    let count = config
                        .entries(kind)
                        .map_or_else(|| String::from("unmanaged"), |e| e.len().to_string());
                    let _ = writeln!(output, "   {}: {count}", kind.section());
                }
                let _ = writeln!(output, "   Concurrency: {}", config.tenant.concurrency);
                output
            }
        }
    }

    /// Formats a success message.
    #[must_use]
    pub fn success(&self, message: &str) -> String {
        self.message("success", "✓".green().to_string(), message)
    }

    /// Formats an error message.
    #[must_use]
    pub fn error(&self, message: &str) -> String {
        self.message("error", "✗".red().to_string(), message)
    }

    /// Formats a warning message.
    #[must_use]
    pub fn warning(&self, message: &str) -> String {
        self.message("warning", "⚠".yellow().to_string(), message)
    }

    fn message(&self, status: &str, symbol: String, message: &str) -> String {
        match self.format {
            OutputFormat::Json => {
                let json = serde_json::json!({ "status": status, "message": message });
                serde_json::to_string_pretty(&json).unwrap_or_default()
            }
            OutputFormat::Text => format!("{symbol} {message}"),
        }
    }
}

/// Renders a field value compactly.
fn display_value(value: &FieldValue) -> String {
    match value {
        FieldValue::String(s) => format!("\"{s}\""),
        other => truncate(&other.to_string(), 60),
    }
}

/// Lists the declared fields of a resource.
fn field_names(resource: &Resource) -> String {
    resource.fields.keys().map(String::as_str).collect::<Vec<_>>().join(", ")
}

/// Truncates a string to a maximum number of characters.
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{kept}...")
    }
}

/// First 8 characters of a hash.
fn short(hash: &str) -> String {
    hash.chars().take(8).collect()
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    chars.next().map_or_else(String::new, |first| {
        first.to_uppercase().chain(chars).collect()
    })
}
