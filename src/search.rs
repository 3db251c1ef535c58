use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::config::AppConfig;
use crate::errors::{AppError, AppResult};
use crate::fetcher::{EndpointSettings, HttpEndpoint, PageSource};
use crate::normalize::{normalize, SearchResultEntry};
use crate::pacing::Pacer;

#[async_trait]
pub trait KeywordSearch: Send + Sync {
    async fn search(&self, keyword: &str, max_results: usize) -> AppResult<Vec<SearchResultEntry>>;
}

pub struct MultiEndpointSearch {
    sources: Vec<Arc<dyn PageSource>>,
    page_size: usize,
    pacer: Arc<Pacer>,
}

impl MultiEndpointSearch {
    pub fn new(sources: Vec<Arc<dyn PageSource>>, page_size: usize, pacer: Arc<Pacer>) -> Self {
        Self {
            sources,
            page_size: page_size.max(1),
            pacer,
        }
    }

    pub fn from_config(config: &AppConfig, pacer: Arc<Pacer>) -> AppResult<Self> {
        if config.endpoints.is_empty() {
            return Err(AppError::Config("no search endpoints configured".into()));
        }
        let settings = EndpointSettings::from_config(config);
        let mut sources: Vec<Arc<dyn PageSource>> = Vec::with_capacity(config.endpoints.len());
        for url in &config.endpoints {
            sources.push(Arc::new(HttpEndpoint::new(url.clone(), settings.clone())?));
        }
        Ok(Self::new(sources, config.page_size, pacer))
    }

    async fn fetch_with_fallback(
        &self,
        keyword: &str,
        page: usize,
    ) -> AppResult<Vec<serde_json::Value>> {
        let mut last_err = None;
        for source in &self.sources {
            match source.fetch_page(keyword, page).await {
                Ok(entries) => return Ok(entries),
                Err(err) => {
                    warn!(?err, endpoint = source.label(), keyword, page, "endpoint failed");
                    last_err = Some(err);
                }
            }
        }
        let source = last_err
            .unwrap_or_else(|| AppError::Config("no search endpoints configured".into()));
        Err(AppError::Search {
            keyword: keyword.to_string(),
            page,
            source: Box::new(source),
        })
    }
}

#[async_trait]
impl KeywordSearch for MultiEndpointSearch {
    async fn search(&self, keyword: &str, max_results: usize) -> AppResult<Vec<SearchResultEntry>> {
        let max_pages = max_results.div_ceil(self.page_size).max(1);
        let mut results = Vec::new();

        for page in 1..=max_pages {
            if page > 1 {
                self.pacer.pause_between_pages().await;
            }

            let raw_entries = self.fetch_with_fallback(keyword, page).await?;
            if raw_entries.is_empty() {
                debug!(keyword, page, "empty page; stopping pagination");
                break;
            }

            for raw in &raw_entries {
                results.push(normalize(raw));
                if results.len() >= max_results {
                    return Ok(results);
                }
            }
        }

        Ok(results)
    }
}
