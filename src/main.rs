use anyhow::Context;
use place_rank_tracker::{init_tracing, run, AppConfig};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let config = AppConfig::from_env();
    let report = run(&config)
        .await
        .with_context(|| format!("rank collection into {} failed", config.history_path.display()))?;

    info!(
        records = report.outcome.records.len(),
        ranked = report.outcome.ranked_count(),
        failed_keywords = ?report.outcome.failed_keywords,
        total_rows = report.append.existing_rows + report.append.appended_rows,
        "daily run complete"
    );
    Ok(())
}
