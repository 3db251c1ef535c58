mod config;
mod errors;
mod fetcher;
mod history;
mod journal;
mod matcher;
mod normalize;
mod pacing;
mod runner;
mod search;
mod tables;

use std::sync::Arc;

use once_cell::sync::OnceCell;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub use config::{AppConfig, PacingPolicy, RetryPolicy};
pub use errors::{AppError, AppResult};
pub use fetcher::{EndpointSettings, HttpEndpoint, PageSource};
pub use history::{AppendSummary, HistoryStore};
pub use journal::RunJournal;
pub use matcher::{find_rank, Rank};
pub use normalize::{normalize, normalize_text, SearchResultEntry};
pub use pacing::Pacer;
pub use runner::{kst_now, DailyRunner, RankRecord, RunOutcome, HISTORY_COLUMNS};
pub use search::{KeywordSearch, MultiEndpointSearch};
pub use tables::{
    group_by_keyword, load_keywords, load_places, KeywordAssociation, Place, PlaceDirectory,
};

#[derive(Debug, Clone)]
pub struct RunReport {
    pub outcome: RunOutcome,
    pub append: AppendSummary,
}

pub fn init_tracing() {
    static INIT: OnceCell<()> = OnceCell::new();
    let _ = INIT.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("info,place_rank_tracker=debug"));
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    });
}

pub async fn run(config: &AppConfig) -> AppResult<RunReport> {
    let places = PlaceDirectory::new(load_places(&config.places_path)?)?;
    let associations = load_keywords(&config.keywords_path)?;
    info!(
        places = places.len(),
        associations = associations.len(),
        "loaded input tables"
    );

    let pacer = Arc::new(Pacer::new(config.pacing.clone()));
    let search = MultiEndpointSearch::from_config(config, Arc::clone(&pacer))?;
    let mut runner = DailyRunner::new(Arc::new(search), pacer, config.max_results);
    if config.journal_enabled {
        match RunJournal::new(config.journal_dir()) {
            Ok(journal) => runner = runner.with_journal(journal),
            Err(err) => warn!(?err, "run journal unavailable; continuing without it"),
        }
    }

    let outcome = runner.run_once(&places, &associations).await?;
    let append = HistoryStore::new(&config.history_path).append(&outcome.records)?;
    Ok(RunReport { outcome, append })
}
