use crate::model::LinkChangeGroup;
use std::time::{Duration, Instant};

/// One rung of the deferral ladder: groups at this age are retried
/// `max_retries` times per eligible pass before aging further, and passes
/// only pick them up every `interval`.
#[derive(Debug, Clone, Copy)]
pub struct AgeBucket {
    pub interval: Duration,
    pub max_retries: u32,
}

const DEFAULT_BUCKETS: [AgeBucket; 3] = [
    AgeBucket {
        interval: Duration::from_secs(5 * 60),
        max_retries: 12,
    },
    AgeBucket {
        interval: Duration::from_secs(24 * 60 * 60),
        max_retries: 7,
    },
    AgeBucket {
        interval: Duration::from_secs(7 * 24 * 60 * 60),
        max_retries: 2,
    },
];

/// Retry schedule for deferred link change groups.
///
/// Age 0 groups are picked up on every pass. Deeper ages are only eligible
/// once their bucket interval has elapsed since the last pass that covered
/// them; covering a deep bucket refreshes every shallower one as well.
pub struct TranslationAging {
    buckets: Vec<AgeBucket>,
    last_covered: Vec<Instant>,
}

impl TranslationAging {
    pub fn new() -> Self {
        Self::with_buckets(DEFAULT_BUCKETS.to_vec())
    }

    pub fn with_buckets(buckets: Vec<AgeBucket>) -> Self {
        assert!(!buckets.is_empty(), "at least one age bucket is required");
        let now = Instant::now();
        let last_covered = vec![now; buckets.len()];
        Self {
            buckets,
            last_covered,
        }
    }

    pub fn deepest_age(&self) -> u32 {
        (self.buckets.len() - 1) as u32
    }

    /// Deepest age eligible for translation in a pass starting now.
    pub fn max_age_for_translation(&mut self, now: Instant) -> u32 {
        for idx in (1..self.buckets.len()).rev() {
            if now.duration_since(self.last_covered[idx]) >= self.buckets[idx].interval {
                for shallower in 0..=idx {
                    self.last_covered[shallower] = now;
                }
                return idx as u32;
            }
        }
        self.last_covered[0] = now;
        0
    }

    /// Records one failed translation attempt, aging the group once its
    /// retries at the current age are spent.
    pub fn record_deferral(&self, group: &mut LinkChangeGroup) {
        let age = group.age();
        let retries = group.retries_at_age() + 1;
        let bucket = &self.buckets[age.min(self.deepest_age()) as usize];
        if retries >= bucket.max_retries && age < self.deepest_age() {
            group.set_aging(age + 1, 0);
        } else {
            group.set_aging(age, retries);
        }
    }
}

impl Default for TranslationAging {
    fn default() -> Self {
        Self::new()
    }
}
