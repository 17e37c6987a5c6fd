use caseflow_cli::commands;
use caseflow_config::ReconcileSettings;
use caseflow_core::ProjectStats;
use caseflow_reconcile::{DispatchReport, RecountOutcome};
use caseflow_storage::{DocumentStore, SqliteStore};
use colored::*;
use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, ContentArrangement, Table};
use std::path::Path;
use std::sync::Arc;

fn stats_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Project", "Features", "Stories", "Test cases"]);
    table
}

fn stats_row(project_id: &str, stats: &ProjectStats) -> Vec<String> {
    vec![
        project_id.to_string(),
        stats.feature_count.to_string(),
        stats.story_count.to_string(),
        stats.test_case_count.to_string(),
    ]
}

pub async fn recount(
    store: Arc<SqliteStore>,
    settings: &ReconcileSettings,
    tenant: &str,
    project: Option<&str>,
) -> anyhow::Result<()> {
    let store: Arc<dyn DocumentStore> = store;
    let outcomes = commands::recount(store, settings, tenant, project).await?;

    if outcomes.is_empty() {
        println!("{}", format!("No projects found in tenant '{}'", tenant).yellow());
        return Ok(());
    }

    let mut table = stats_table();
    let mut missing = Vec::new();
    for outcome in &outcomes {
        match outcome {
            RecountOutcome::Updated { project_id, stats } => {
                table.add_row(stats_row(project_id, stats));
            }
            RecountOutcome::ProjectMissing { project_id } => missing.push(project_id.as_str()),
        }
    }

    println!("{}", table);
    for project_id in missing {
        println!("{}", format!("Project '{}' not found, skipped", project_id).yellow());
    }
    println!("Recounted: {} project(s)", outcomes.len().to_string().cyan());
    Ok(())
}

pub async fn cleanup(store: Arc<SqliteStore>, tenant: &str, test_case: &str) -> anyhow::Result<()> {
    let cleaned = commands::cleanup(store, tenant, test_case).await?;
    if cleaned == 0 {
        println!("{}", format!("Test case '{}' is in no test plan", test_case).dimmed());
    } else {
        println!(
            "{} Removed '{}' from {} test plan(s)",
            "✓".green(),
            test_case,
            cleaned
        );
    }
    Ok(())
}

pub async fn replay(
    store: Arc<SqliteStore>,
    settings: &ReconcileSettings,
    file: &Path,
) -> anyhow::Result<()> {
    let change = commands::read_change(file)?;
    match commands::replay(store, settings, &change).await? {
        Some(report) => print_report(&report),
        None => println!(
            "{}",
            format!("Nothing to reconcile for this {} change", change.collection).dimmed()
        ),
    }
    Ok(())
}

fn print_report(report: &DispatchReport) {
    println!(
        "{} {} of test case {} (tenant {})",
        "Dispatched".blue().bold(),
        report.kind,
        report.test_case_id,
        report.tenant_id
    );
    if report.short_circuited {
        println!("{}", "Ancestry unchanged, recount skipped".dimmed());
    }
    if report.plans_cleaned > 0 {
        println!("Test plans cleaned: {}", report.plans_cleaned.to_string().cyan());
    }
    if let Some(reason) = &report.unresolved {
        println!("{}", format!("Project unresolvable: {}", reason).yellow());
    }
    if !report.recounts.is_empty() {
        let mut table = stats_table();
        for outcome in &report.recounts {
            match outcome.stats() {
                Some(stats) => table.add_row(stats_row(outcome.project_id(), &stats)),
                None => table.add_row(vec![
                    outcome.project_id().to_string(),
                    "missing".to_string(),
                    "-".to_string(),
                    "-".to_string(),
                ]),
            };
        }
        println!("{}", table);
    }
}

pub async fn stats(store: Arc<SqliteStore>, tenant: &str, project: &str) -> anyhow::Result<()> {
    let record = commands::stored_project(store, tenant, project).await?;

    let mut table = stats_table();
    table.add_row(stats_row(&record.id, &record.stats));
    println!("{}", table);

    match record.updated_at {
        Some(at) => println!("Last recount: {}", at.to_rfc3339().dimmed()),
        None => println!("{}", "Never recounted".dimmed()),
    }
    Ok(())
}
