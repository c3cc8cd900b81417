use uuid::Uuid;

/// Print a run, its step log and its delivered leads.
pub(crate) async fn run_status(pool: &sqlx::PgPool, id: Uuid) -> anyhow::Result<()> {
    let run = match leadhound_db::get_run(pool, id).await {
        Ok(run) => run,
        Err(leadhound_db::DbError::NotFound) => anyhow::bail!("run {id} not found"),
        Err(e) => return Err(e.into()),
    };

    let configuration = run
        .lead_tier
        .as_deref()
        .map(|tier| format!("tier {tier}"))
        .or_else(|| run.time_window.as_deref().map(|w| format!("window {w}")))
        .unwrap_or_else(|| "-".to_string());

    println!("run {} [{}]", run.public_id, run.status);
    println!("  platform:  {}", run.platform);
    println!("  config:    {configuration}");
    println!(
        "  leads:     {} of {} (max age {} days)",
        run.lead_count, run.target_count, run.max_age_days
    );
    if let Some(error) = &run.error_message {
        println!("  error:     {error}");
    }
    if let Some(warnings) = run.warnings.as_array().filter(|w| !w.is_empty()) {
        println!("  warnings:");
        for warning in warnings.iter().filter_map(|w| w.as_str()) {
            println!("    - {warning}");
        }
    }

    let steps = leadhound_db::list_run_steps(pool, run.id, "").await?;
    if !steps.is_empty() {
        println!();
        println!("| Step | Completed | Result |");
        println!("|------|-----------|--------|");
        for step in &steps {
            println!(
                "| {} | {} | {} |",
                step.step_name,
                step.completed_at.format("%Y-%m-%d %H:%M:%S"),
                step.result
            );
        }
    }

    let leads = leadhound_db::list_leads(pool, run.id).await?;
    if !leads.is_empty() {
        println!();
        println!("| Relevance | Intent | Title | URL |");
        println!("|-----------|--------|-------|-----|");
        for lead in &leads {
            let relevance = lead
                .relevance
                .map_or_else(|| "-".to_string(), |r| r.to_string());
            let intent = lead.intent.as_deref().unwrap_or("-");
            let title = lead.title.replace('|', "\\|");
            println!("| {relevance} | {intent} | {title} | {} |", lead.url);
        }
    }

    Ok(())
}
