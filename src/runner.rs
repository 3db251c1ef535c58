use std::sync::Arc;

use chrono::{DateTime, FixedOffset, Offset, Utc};
use serde::{de, Deserialize, Deserializer, Serialize};
use tracing::{info, warn};

use crate::errors::{AppError, AppResult};
use crate::journal::RunJournal;
use crate::matcher::{find_rank, Rank};
use crate::pacing::Pacer;
use crate::search::KeywordSearch;
use crate::tables::{group_by_keyword, KeywordAssociation, PlaceDirectory};

pub const HISTORY_COLUMNS: [&str; 6] = [
    "timestamp_kst",
    "date_kst",
    "place_id",
    "place_name",
    "keyword",
    "rank",
];

const KST_OFFSET_SECS: i32 = 9 * 3600;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankRecord {
    pub timestamp_kst: String,
    pub date_kst: String,
    pub place_id: String,
    pub place_name: String,
    pub keyword: String,
    #[serde(default, deserialize_with = "deserialize_rank")]
    pub rank: Option<Rank>,
}

// Older stores carry ranks as floats ("3.0") whenever a column had blanks.
fn deserialize_rank<'de, D>(deserializer: D) -> Result<Option<Rank>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    let raw = match raw.as_deref().map(str::trim) {
        None | Some("") => return Ok(None),
        Some(raw) => raw,
    };

    let value = match raw.parse::<u32>() {
        Ok(value) => value,
        Err(_) => {
            let float = raw
                .parse::<f64>()
                .map_err(|_| <D::Error as de::Error>::custom(format!("rank {raw:?} is not a number")))?;
            if float.fract() != 0.0 || float < 1.0 || float > f64::from(u32::MAX) {
                return Err(de::Error::custom(format!(
                    "rank {raw:?} is not a positive whole number"
                )));
            }
            float as u32
        }
    };
    Rank::new(value)
        .map(Some)
        .ok_or_else(|| de::Error::custom("rank must be at least 1"))
}

#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub captured_at: DateTime<FixedOffset>,
    pub records: Vec<RankRecord>,
    pub failed_keywords: Vec<String>,
}

impl RunOutcome {
    pub fn ranked_count(&self) -> usize {
        self.records.iter().filter(|record| record.rank.is_some()).count()
    }
}

pub fn kst_now() -> DateTime<FixedOffset> {
    let offset = FixedOffset::east_opt(KST_OFFSET_SECS).unwrap_or_else(|| Utc.fix());
    Utc::now().with_timezone(&offset)
}

pub struct DailyRunner {
    search: Arc<dyn KeywordSearch>,
    pacer: Arc<Pacer>,
    max_results: usize,
    journal: Option<RunJournal>,
}

impl DailyRunner {
    pub fn new(search: Arc<dyn KeywordSearch>, pacer: Arc<Pacer>, max_results: usize) -> Self {
        Self {
            search,
            pacer,
            max_results,
            journal: None,
        }
    }

    pub fn with_journal(mut self, journal: RunJournal) -> Self {
        self.journal = Some(journal);
        self
    }

    pub async fn run_once(
        &self,
        places: &PlaceDirectory,
        associations: &[KeywordAssociation],
    ) -> AppResult<RunOutcome> {
        self.run_at(places, associations, kst_now()).await
    }

    pub async fn run_at(
        &self,
        places: &PlaceDirectory,
        associations: &[KeywordAssociation],
        captured_at: DateTime<FixedOffset>,
    ) -> AppResult<RunOutcome> {
        let grouped = group_by_keyword(associations);
        for (keyword, place_ids) in &grouped {
            if let Some(place_id) = place_ids.iter().find(|id| places.get(id).is_none()) {
                return Err(AppError::UnknownPlace {
                    keyword: keyword.clone(),
                    place_id: place_id.clone(),
                });
            }
        }

        let timestamp_kst = captured_at.format("%Y-%m-%d %H:%M:%S").to_string();
        let date_kst = captured_at.format("%Y-%m-%d").to_string();
        info!(keywords = grouped.len(), %timestamp_kst, "starting rank collection");
        self.journal_event(
            "run_started",
            serde_json::json!({ "keywords": grouped.len(), "timestamp_kst": timestamp_kst }),
        );

        let mut records = Vec::with_capacity(associations.len());
        let mut failed_keywords = Vec::new();
        for (keyword, place_ids) in &grouped {
            self.pacer.pause_between_keywords().await;

            let results = match self.search.search(keyword, self.max_results).await {
                Ok(results) => results,
                Err(err) => {
                    warn!(?err, keyword = %keyword, "keyword search failed; recording unranked");
                    self.journal_event(
                        "keyword_failed",
                        serde_json::json!({ "keyword": keyword, "error": error_chain(&err) }),
                    );
                    failed_keywords.push(keyword.clone());
                    Vec::new()
                }
            };

            for place_id in place_ids {
                let place = places.get(place_id).ok_or_else(|| AppError::UnknownPlace {
                    keyword: keyword.clone(),
                    place_id: place_id.clone(),
                })?;
                let rank = find_rank(&results, &place.place_id, &place.place_name);
                records.push(RankRecord {
                    timestamp_kst: timestamp_kst.clone(),
                    date_kst: date_kst.clone(),
                    place_id: place.place_id.clone(),
                    place_name: place.place_name.clone(),
                    keyword: keyword.clone(),
                    rank,
                });
            }
        }

        let outcome = RunOutcome {
            captured_at,
            records,
            failed_keywords,
        };
        info!(
            records = outcome.records.len(),
            ranked = outcome.ranked_count(),
            failed_keywords = outcome.failed_keywords.len(),
            "rank collection finished"
        );
        self.journal_event(
            "run_completed",
            serde_json::json!({
                "records": outcome.records.len(),
                "ranked": outcome.ranked_count(),
                "failed_keywords": outcome.failed_keywords,
            }),
        );
        Ok(outcome)
    }

    fn journal_event(&self, name: &str, payload: serde_json::Value) {
        if let Some(journal) = &self.journal {
            if let Err(err) = journal.record(name, payload) {
                warn!(?err, event = name, "failed to write run journal");
            }
        }
    }
}

fn error_chain(err: &AppError) -> String {
    let mut message = err.to_string();
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = std::error::Error::source(cause);
    }
    message
}
