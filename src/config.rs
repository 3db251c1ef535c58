use std::path::PathBuf;
use std::time::Duration;
use std::{env, io};

use tracing::debug;

const DEFAULT_ENDPOINTS: &[&str] = &[
    "https://map.naver.com/p/api/search",
    "https://map.naver.com/v5/api/search",
];
const DEFAULT_MAX_RESULTS: usize = 120;
const DEFAULT_PAGE_SIZE: usize = 40;
const MAX_BACKOFF_EXPONENT: u32 = 16;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub places_path: PathBuf,
    pub keywords_path: PathBuf,
    pub history_path: PathBuf,
    pub journal_enabled: bool,
    pub endpoints: Vec<String>,
    pub caller: String,
    pub max_results: usize,
    pub page_size: usize,
    pub request_timeout: Duration,
    pub retry: RetryPolicy,
    pub pacing: PacingPolicy,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_backoff: Duration,
    pub max_backoff: Duration,
    pub backoff_jitter: Duration,
    pub error_pause: Duration,
    pub error_jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 7,
            base_backoff: Duration::from_millis(2_000),
            max_backoff: Duration::from_secs(60),
            backoff_jitter: Duration::from_millis(1_500),
            error_pause: Duration::from_millis(1_500),
            error_jitter: Duration::from_millis(1_000),
        }
    }
}

impl RetryPolicy {
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
            backoff_jitter: Duration::ZERO,
            error_pause: Duration::ZERO,
            error_jitter: Duration::ZERO,
        }
    }

    /// `base * 2^attempt + jitter`, capped. `attempt` is zero-based.
    pub fn backoff_delay(&self, attempt: u32, jitter: Duration) -> Duration {
        let exponent = attempt.min(MAX_BACKOFF_EXPONENT);
        let scaled = self.base_backoff.saturating_mul(1 << exponent);
        scaled.saturating_add(jitter).min(self.max_backoff)
    }

    pub fn error_delay(&self, jitter: Duration) -> Duration {
        self.error_pause.saturating_add(jitter)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PacingPolicy {
    pub min: Duration,
    pub max: Duration,
}

impl Default for PacingPolicy {
    fn default() -> Self {
        Self {
            min: Duration::from_millis(2_500),
            max: Duration::from_millis(5_000),
        }
    }
}

impl PacingPolicy {
    pub fn none() -> Self {
        Self {
            min: Duration::ZERO,
            max: Duration::ZERO,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        load_dotenv_if_applicable();
        let retry_defaults = RetryPolicy::default();
        let pacing_defaults = PacingPolicy::default();
        let pacing_min = parse_millis("PACING_MIN_MS", pacing_defaults.min);
        let pacing_max = parse_millis("PACING_MAX_MS", pacing_defaults.max).max(pacing_min);

        Self {
            places_path: parse_path("PLACES_CSV", "config/places.csv"),
            keywords_path: parse_path("KEYWORDS_CSV", "config/keywords.csv"),
            history_path: parse_path("HISTORY_CSV", "data/rank_history.csv"),
            journal_enabled: parse_bool("RUN_JOURNAL_ENABLED", true),
            endpoints: parse_list("SEARCH_ENDPOINTS", DEFAULT_ENDPOINTS),
            caller: env::var("SEARCH_CALLER")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| "pcweb".to_string()),
            max_results: parse_usize("SEARCH_MAX_RESULTS", DEFAULT_MAX_RESULTS).max(1),
            page_size: parse_usize("SEARCH_PAGE_SIZE", DEFAULT_PAGE_SIZE).max(1),
            request_timeout: Duration::from_secs(parse_u64("REQUEST_TIMEOUT_SECS", 25).max(1)),
            retry: RetryPolicy {
                max_attempts: parse_u32("RETRY_MAX_ATTEMPTS", retry_defaults.max_attempts).max(1),
                base_backoff: parse_millis("RETRY_BASE_BACKOFF_MS", retry_defaults.base_backoff),
                max_backoff: parse_millis("RETRY_MAX_BACKOFF_MS", retry_defaults.max_backoff),
                backoff_jitter: parse_millis("RETRY_JITTER_MS", retry_defaults.backoff_jitter),
                error_pause: parse_millis("RETRY_ERROR_PAUSE_MS", retry_defaults.error_pause),
                error_jitter: parse_millis("RETRY_ERROR_JITTER_MS", retry_defaults.error_jitter),
            },
            pacing: PacingPolicy {
                min: pacing_min,
                max: pacing_max,
            },
        }
    }

    pub fn journal_dir(&self) -> PathBuf {
        match self.history_path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }
}

fn load_dotenv_if_applicable() {
    if !should_load_dotenv() {
        debug!("skipping .env load outside dev mode");
        return;
    }

    if let Err(err) = dotenvy::dotenv() {
        match &err {
            dotenvy::Error::Io(io_err) if io_err.kind() == io::ErrorKind::NotFound => {}
            _ => debug!(?err, "unable to load .env file"),
        }
    }
}

fn should_load_dotenv() -> bool {
    cfg!(debug_assertions) || parse_bool("ALLOW_DOTENV", false)
}

fn parse_bool(key: &str, default: bool) -> bool {
    env::var(key)
        .map(|v| matches!(v.trim(), "1" | "true" | "TRUE" | "True"))
        .unwrap_or(default)
}

fn parse_u64(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(default)
}

fn parse_usize(key: &str, default: usize) -> usize {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<usize>().ok())
        .unwrap_or(default)
}

fn parse_u32(key: &str, default: u32) -> u32 {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<u32>().ok())
        .unwrap_or(default)
}

fn parse_millis(key: &str, default: Duration) -> Duration {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(default)
}

fn parse_path(key: &str, default: &str) -> PathBuf {
    env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(default))
}

fn parse_list(key: &str, default: &[&str]) -> Vec<String> {
    let parsed: Vec<String> = env::var(key)
        .ok()
        .map(|v| {
            v.split(',')
                .map(|item| item.trim().to_string())
                .filter(|item| !item.is_empty())
                .collect()
        })
        .unwrap_or_default();
    if parsed.is_empty() {
        default.iter().map(|item| item.to_string()).collect()
    } else {
        parsed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_overrides_from_env() {
        env::set_var("SEARCH_ENDPOINTS", " https://a.example/search , ,https://b.example/search");
        env::set_var("HISTORY_CSV", "out/history.csv");
        env::set_var("RETRY_MAX_ATTEMPTS", "0");
        env::set_var("SEARCH_MAX_RESULTS", "not-a-number");
        env::set_var("PACING_MIN_MS", "900");
        env::set_var("PACING_MAX_MS", "100");

        let config = AppConfig::from_env();

        assert_eq!(
            config.endpoints,
            vec!["https://a.example/search", "https://b.example/search"]
        );
        assert_eq!(config.history_path, PathBuf::from("out/history.csv"));
        assert_eq!(config.journal_dir(), PathBuf::from("out"));
        assert_eq!(config.retry.max_attempts, 1);
        assert_eq!(config.max_results, DEFAULT_MAX_RESULTS);
        assert_eq!(config.page_size, DEFAULT_PAGE_SIZE);
        assert_eq!(config.pacing.min, Duration::from_millis(900));
        assert_eq!(config.pacing.max, Duration::from_millis(900));
    }

    #[test]
    fn backoff_grows_and_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff_delay(0, Duration::ZERO), Duration::from_secs(2));
        assert_eq!(policy.backoff_delay(2, Duration::ZERO), Duration::from_secs(8));
        assert_eq!(
            policy.backoff_delay(3, Duration::from_millis(500)),
            Duration::from_millis(16_500)
        );
        assert_eq!(policy.backoff_delay(5, Duration::ZERO), Duration::from_secs(60));
        assert_eq!(policy.backoff_delay(u32::MAX, Duration::ZERO), Duration::from_secs(60));
    }

    #[test]
    fn immediate_policy_never_waits() {
        let policy = RetryPolicy::immediate(0);
        assert_eq!(policy.max_attempts, 1);
        assert_eq!(policy.backoff_delay(4, Duration::ZERO), Duration::ZERO);
        assert_eq!(policy.error_delay(Duration::ZERO), Duration::ZERO);
    }
}
