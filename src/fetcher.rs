use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use rand::{rngs::StdRng, Rng, SeedableRng};
use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::config::{AppConfig, RetryPolicy};
use crate::errors::{AppError, AppResult};

const RETRY_STATUS: &[u16] = &[429, 500, 502, 503, 504];
const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/122.0.0.0 Safari/537.36";

/// An empty page means the keyword has no further results.
#[async_trait]
pub trait PageSource: Send + Sync {
    fn label(&self) -> &str;

    async fn fetch_page(&self, keyword: &str, page: usize) -> AppResult<Vec<Value>>;
}

#[derive(Clone, Debug)]
pub struct EndpointSettings {
    pub caller: String,
    pub page_size: usize,
    pub request_timeout: Duration,
    pub retry: RetryPolicy,
}

impl EndpointSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            caller: config.caller.clone(),
            page_size: config.page_size,
            request_timeout: config.request_timeout,
            retry: config.retry.clone(),
        }
    }
}

pub struct HttpEndpoint {
    http: Client,
    url: String,
    settings: EndpointSettings,
    jitter_rng: Mutex<StdRng>,
}

impl HttpEndpoint {
    pub fn new(url: impl Into<String>, settings: EndpointSettings) -> AppResult<Self> {
        let http = Client::builder()
            .default_headers(browser_headers())
            .timeout(settings.request_timeout)
            .build()?;
        Ok(Self {
            http,
            url: url.into(),
            settings,
            jitter_rng: Mutex::new(StdRng::from_entropy()),
        })
    }

    async fn request_page(&self, keyword: &str, page: usize) -> AppResult<Vec<Value>> {
        let params = [
            ("caller", self.settings.caller.clone()),
            ("query", keyword.to_string()),
            ("type", "all".to_string()),
            ("page", page.to_string()),
            ("displayCount", self.settings.page_size.to_string()),
            ("lang", "ko".to_string()),
        ];
        let response = self.http.get(&self.url).query(&params).send().await?;

        let status = response.status().as_u16();
        if RETRY_STATUS.contains(&status) {
            return Err(AppError::Throttled { status });
        }
        let response = response.error_for_status()?;

        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_ascii_lowercase();
        if !content_type.contains("json") {
            return Err(AppError::Blocked { content_type });
        }

        let body: SearchResponse = response.json().await?;
        Ok(body.into_entries())
    }

    fn retry_delay(&self, err: &AppError, attempt: u32) -> Duration {
        let retry = &self.settings.retry;
        if err.is_throttle() {
            retry.backoff_delay(attempt, self.jitter(retry.backoff_jitter))
        } else {
            retry.error_delay(self.jitter(retry.error_jitter))
        }
    }

    fn jitter(&self, bound: Duration) -> Duration {
        let bound_ms = bound.as_millis() as u64;
        if bound_ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(self.jitter_rng.lock().gen_range(0..=bound_ms))
    }
}

#[async_trait]
impl PageSource for HttpEndpoint {
    fn label(&self) -> &str {
        &self.url
    }

    async fn fetch_page(&self, keyword: &str, page: usize) -> AppResult<Vec<Value>> {
        let max_attempts = self.settings.retry.max_attempts.max(1);
        let mut last_err = None;
        for attempt in 0..max_attempts {
            match self.request_page(keyword, page).await {
                Ok(entries) => {
                    debug!(endpoint = %self.url, keyword, page, count = entries.len(), "page fetched");
                    return Ok(entries);
                }
                Err(err) => {
                    if attempt + 1 < max_attempts {
                        let delay = self.retry_delay(&err, attempt);
                        warn!(
                            ?err,
                            endpoint = %self.url,
                            keyword,
                            page,
                            attempt = attempt + 1,
                            "search request failed; retrying after {:?}",
                            delay
                        );
                        sleep(delay).await;
                    }
                    last_err = Some(err);
                }
            }
        }

        let source = last_err
            .unwrap_or_else(|| AppError::Config("no request attempts were made".into()));
        Err(AppError::Fetch {
            endpoint: self.url.clone(),
            keyword: keyword.to_string(),
            page,
            attempts: max_attempts,
            source: Box::new(source),
        })
    }
}

fn browser_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(header::USER_AGENT, HeaderValue::from_static(BROWSER_USER_AGENT));
    headers.insert(
        header::ACCEPT,
        HeaderValue::from_static("application/json, text/plain, */*"),
    );
    headers.insert(
        header::ACCEPT_LANGUAGE,
        HeaderValue::from_static("ko-KR,ko;q=0.9,en-US;q=0.8,en;q=0.7"),
    );
    headers.insert(header::REFERER, HeaderValue::from_static("https://map.naver.com/"));
    headers.insert(header::CONNECTION, HeaderValue::from_static("close"));
    headers
}

#[derive(Debug, Default, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    result: Option<SearchResult>,
}

#[derive(Debug, Default, Deserialize)]
struct SearchResult {
    #[serde(default)]
    place: Option<PlaceBlock>,
}

#[derive(Debug, Default, Deserialize)]
struct PlaceBlock {
    #[serde(default)]
    list: Option<Vec<Value>>,
}

impl SearchResponse {
    fn into_entries(self) -> Vec<Value> {
        self.result
            .and_then(|result| result.place)
            .and_then(|place| place.list)
            .unwrap_or_default()
    }
}
