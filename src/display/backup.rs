//! Archive display formatting
//!
//! Formats backup archives for terminal output in list and detail views.

use chrono::{Duration, Local, NaiveDateTime};

use crate::backup::{ArchiveInspection, BackupArchive, PlanAction, SyncMode};

/// Format a list of archives, newest first, as a table
pub fn format_archive_list(archives: &[BackupArchive], verbose: bool) -> String {
    if archives.is_empty() {
        return "No backups found.".to_string();
    }

    let now = Local::now().naive_local();
    let name_width = archives
        .iter()
        .map(|a| a.file_name.len())
        .max()
        .unwrap_or(4)
        .max(4);

    let mut output = String::new();
    output.push_str(&format!(
        "{:<3}  {:<name_width$}  {:>10}  {:>6}  {}\n",
        "#",
        "File",
        "Size",
        "Age",
        "Encrypted",
        name_width = name_width,
    ));
    output.push_str(&format!(
        "{:-<3}  {:-<name_width$}  {:->10}  {:->6}  {:-<9}\n",
        "",
        "",
        "",
        "",
        "",
        name_width = name_width,
    ));

    for (i, archive) in archives.iter().enumerate() {
        output.push_str(&format!(
            "{:<3}  {:<name_width$}  {:>10}  {:>6}  {}\n",
            i + 1,
            archive.file_name,
            format_size(archive.size_bytes),
            format_age(now, archive.created_at),
            if archive.encrypted { "yes" } else { "" },
            name_width = name_width,
        ));
        if verbose {
            output.push_str(&format!(
                "     created {}  {}\n",
                archive.created_at.format("%Y-%m-%d %H:%M:%S"),
                archive.path.display()
            ));
        }
    }

    output.push_str(&format!("\nTotal: {} backup(s)", archives.len()));
    output
}

/// Format what an archive contains and where each label would go
pub fn format_inspection(inspection: &ArchiveInspection) -> String {
    let archive = &inspection.archive;
    let mut output = String::new();

    output.push_str("Backup Details\n");
    output.push_str("==============\n");
    output.push_str(&format!("File:      {}\n", archive.path.display()));
    output.push_str(&format!("Size:      {}\n", format_size(archive.size_bytes)));
    output.push_str(&format!(
        "Created:   {}\n",
        archive.created_at.format("%Y-%m-%d %H:%M:%S")
    ));
    output.push_str(&format!(
        "Encrypted: {}\n",
        if archive.encrypted { "yes" } else { "no" }
    ));
    output.push_str(&format!("Format:    {:?}\n", inspection.plan.format));
    output.push('\n');

    output.push_str("Contents:\n");
    for entry in &inspection.plan.entries {
        let line = match &entry.action {
            PlanAction::Apply { target, mode } => format!(
                "  {:<12} -> {} ({})",
                entry.label,
                target.display(),
                match mode {
                    SyncMode::Mirror => "replace",
                    SyncMode::Additive => "merge",
                }
            ),
            PlanAction::Filtered => format!("  {:<12}    not selected", entry.label),
            PlanAction::Unknown => format!("  {:<12}    unknown label", entry.label),
        };
        output.push_str(&line);
        output.push('\n');
    }

    if !inspection.home_candidates.is_empty() {
        output.push_str("\nHome directories referenced:\n");
        for (home, count) in &inspection.home_candidates {
            output.push_str(&format!("  {:<30} {}\n", home, count));
        }
    }

    output.trim_end().to_string()
}

/// Format an age as the largest whole unit
pub fn format_age(now: NaiveDateTime, then: NaiveDateTime) -> String {
    format_duration(now.signed_duration_since(then))
}

fn format_duration(duration: Duration) -> String {
    let total_seconds = duration.num_seconds().max(0);

    if total_seconds < 60 {
        return format!("{}s", total_seconds);
    }

    let minutes = total_seconds / 60;
    if minutes < 60 {
        return format!("{}m", minutes);
    }

    let hours = minutes / 60;
    if hours < 24 {
        return format!("{}h", hours);
    }

    let days = hours / 24;
    if days < 30 {
        return format!("{}d", days);
    }

    format!("{}mo", days / 30)
}

/// Format a file size in human-readable form
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}
