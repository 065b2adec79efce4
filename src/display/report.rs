//! Terminal summaries for update runs, restores and modules

use crate::backup::{RestoreReport, TrimReport};
use crate::update::{ModuleOutcome, ModuleState, ModuleStatus, RunStatus, StepStatus, UpdateRun};

fn step(status: StepStatus) -> &'static str {
    match status {
        StepStatus::NotRun => "not run",
        StepStatus::Skipped => "skipped",
        StepStatus::Succeeded => "ok",
        StepStatus::Failed => "FAILED",
    }
}

fn module_status(status: ModuleStatus) -> &'static str {
    match status {
        ModuleStatus::Updated => "updated",
        ModuleStatus::NoChange => "up to date",
        ModuleStatus::Skipped => "skipped",
        ModuleStatus::Failed => "FAILED",
    }
}

/// Format an update run for the terminal
pub fn format_update_run(run: &UpdateRun) -> String {
    let mut output = String::new();

    let headline = match run.status {
        RunStatus::Success => "Update complete",
        RunStatus::PartialFailure => "Update finished with failures",
        RunStatus::Failed => "Update aborted",
    };
    output.push_str(&format!("{}\n", headline));
    output.push_str(&format!("{}\n", "=".repeat(headline.len())));

    let mut backup_line = format!("Backup:  {}", step(run.backup.status));
    if let Some(archive) = &run.backup.archive {
        backup_line.push_str(&format!(" ({})", archive));
    }
    match run.backup.uploaded {
        Some(true) => backup_line.push_str(", uploaded"),
        Some(false) => backup_line.push_str(", upload failed"),
        None => {}
    }
    output.push_str(&backup_line);
    output.push('\n');
    if let Some(error) = &run.backup.error {
        output.push_str(&format!("         {}\n", error));
    }

    let mut core_line = format!("Core:    {}", step(run.core.status));
    match (&run.core.before, &run.core.after) {
        (Some(before), Some(after)) if before != after => {
            core_line.push_str(&format!(" ({} -> {})", before, after))
        }
        (Some(version), _) => core_line.push_str(&format!(" ({})", version)),
        _ => {}
    }
    output.push_str(&core_line);
    output.push('\n');
    if let Some(error) = &run.core.error {
        output.push_str(&format!("         {}\n", error));
    }
    if let Some(rollback) = &run.core.rollback {
        if rollback.succeeded {
            output.push_str(&format!("         restored from {}\n", rollback.archive));
        } else {
            output.push_str(&format!(
                "         restore from {} FAILED: {}\n",
                rollback.archive,
                rollback.error.as_deref().unwrap_or("unknown error")
            ));
        }
    }

    if !run.modules.is_empty() {
        output.push('\n');
        output.push_str(&format_module_outcomes(&run.modules));
        output.push('\n');
    }

    if !run.trimmed.is_empty() {
        output.push_str(&format!("Removed {} old backup(s)\n", run.trimmed.len()));
    }
    if let Some(reason) = &run.abort_reason {
        output.push_str(&format!("\nReason: {}\n", reason));
    }

    output.trim_end().to_string()
}

/// Format per-module results followed by a count line
pub fn format_module_outcomes(modules: &[ModuleOutcome]) -> String {
    if modules.is_empty() {
        return "No modules found.".to_string();
    }

    let name_width = modules
        .iter()
        .map(|m| m.name.len())
        .max()
        .unwrap_or(6)
        .max(6);

    let mut output = String::new();
    for module in modules {
        let mut line = format!(
            "  {:<name_width$}  {:<10}",
            module.name,
            module_status(module.status),
            name_width = name_width
        );
        if let (Some(before), Some(after)) = (&module.before, &module.after) {
            if before != after {
                line.push_str(&format!("  {} -> {}", short_rev(before), short_rev(after)));
            }
        }
        if let Some(reason) = &module.reason {
            line.push_str(&format!("  {}", reason));
        }
        output.push_str(line.trim_end());
        output.push('\n');
    }

    let failed = modules.iter().filter(|m| m.is_failed()).count();
    let updated = modules
        .iter()
        .filter(|m| m.status == ModuleStatus::Updated)
        .count();
    output.push_str(&format!(
        "\n{} updated, {} failed, {} checked",
        updated,
        failed,
        modules.len()
    ));
    output
}

/// Format the result of a restore
pub fn format_restore_report(report: &RestoreReport) -> String {
    if report.declined {
        return format!("Restore of {} cancelled; nothing was changed.", report.archive);
    }

    let mut output = format!("Restored from {}\n", report.archive);
    for label in &report.restored {
        output.push_str(&format!("  {:<12} restored\n", label));
    }
    for label in &report.filtered {
        output.push_str(&format!("  {:<12} skipped\n", label));
    }
    for label in &report.unknown {
        output.push_str(&format!("  {:<12} unknown label, not restored\n", label));
    }
    for failure in &report.failed {
        output.push_str(&format!("  {:<12} FAILED: {}\n", failure.label, failure.error));
    }

    if let Some(sanitize) = &report.sanitize {
        if let Some(original) = &sanitize.original_home {
            output.push_str(&format!(
                "\nRewrote {} -> {}: {} replacement(s) in {} file(s)\n",
                original, sanitize.current_home, sanitize.replacements, sanitize.files_rewritten
            ));
        }
        for (home, count) in &sanitize.remaining {
            output.push_str(&format!("  warning: {} reference(s) to {} remain\n", count, home));
        }
    }

    output.trim_end().to_string()
}

/// Format modules with their checked-out revision
pub fn format_module_list(states: &[ModuleState]) -> String {
    if states.is_empty() {
        return "No modules found.".to_string();
    }

    let name_width = states
        .iter()
        .map(|s| s.module.name.len())
        .max()
        .unwrap_or(4)
        .max(4);

    let mut output = String::new();
    output.push_str(&format!(
        "{:<name_width$}  {:<12}  {}\n",
        "Name",
        "Revision",
        "Status",
        name_width = name_width
    ));
    output.push_str(&format!(
        "{:-<name_width$}  {:-<12}  {:-<10}\n",
        "",
        "",
        "",
        name_width = name_width
    ));

    for state in states {
        let revision = state.revision.as_deref().map(short_rev).unwrap_or("?");
        let status = if state.module.excluded {
            "excluded"
        } else {
            match state.dirty {
                Some(true) => "modified",
                Some(false) => "clean",
                None => "unknown",
            }
        };
        output.push_str(&format!(
            "{:<name_width$}  {:<12}  {}\n",
            state.module.name,
            revision,
            status,
            name_width = name_width
        ));
    }

    output.push_str(&format!("\nTotal: {} module(s)", states.len()));
    output
}

/// Format a retention pass
pub fn format_trim(trim: &TrimReport) -> String {
    let mut output = format!("Deleted {} local backup(s).", trim.local_deleted.len());
    if !trim.remote_deleted.is_empty() {
        output.push_str(&format!(
            "\nDeleted {} remote backup(s).",
            trim.remote_deleted.len()
        ));
    }
    if let Some(error) = &trim.remote_error {
        output.push_str(&format!("\nwarning: remote cleanup failed: {}", error));
    }
    output
}

fn short_rev(rev: &str) -> &str {
    rev.get(..10).unwrap_or(rev)
}
