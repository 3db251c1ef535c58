use std::time::Duration;

use parking_lot::Mutex;
use rand::{rngs::StdRng, Rng, SeedableRng};
use tokio::time::sleep;
use tracing::trace;

use crate::config::PacingPolicy;

pub struct Pacer {
    policy: PacingPolicy,
    rng: Mutex<StdRng>,
}

impl Pacer {
    pub fn new(policy: PacingPolicy) -> Self {
        Self::with_rng(policy, StdRng::from_entropy())
    }

    pub fn with_rng(policy: PacingPolicy, rng: StdRng) -> Self {
        Self {
            policy,
            rng: Mutex::new(rng),
        }
    }

    pub fn keyword_delay(&self) -> Duration {
        self.sample(self.policy.min, self.policy.max)
    }

    pub fn page_delay(&self) -> Duration {
        self.sample(self.policy.min / 2, self.policy.max / 2)
    }

    pub async fn pause_between_keywords(&self) {
        let delay = self.keyword_delay();
        trace!(?delay, "pacing before keyword");
        sleep(delay).await;
    }

    pub async fn pause_between_pages(&self) {
        let delay = self.page_delay();
        trace!(?delay, "pacing before page");
        sleep(delay).await;
    }

    fn sample(&self, min: Duration, max: Duration) -> Duration {
        if max <= min {
            return min;
        }
        let low = min.as_millis() as u64;
        let high = max.as_millis() as u64;
        Duration::from_millis(self.rng.lock().gen_range(low..=high))
    }
}
