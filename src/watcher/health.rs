//! RPC endpoint health bookkeeping and prioritization.
//!
//! Every fetch writes here (latency probes, failure reports) and every fetch
//! reads here (priority ordering). Writes are brief and happen under a
//! dedicated lock; the lock is never held across a network call.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use rand::seq::SliceRandom;

/// How long a URL stays deprioritized after an observed failure.
pub const COOLDOWN: Duration = Duration::from_secs(5 * 60);

/// Rolling latency history kept per URL.
pub const LATENCY_HISTORY_CAP: usize = 15;

/// One latency measurement. Failure is its own state, distinguishable from
/// both absence and any valid duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Probe {
    Latency(Duration),
    Failed,
}

#[derive(Debug, Clone, Default)]
pub struct UrlHealth {
    pub last: Option<Probe>,
    pub history: VecDeque<Probe>,
    pub cooldown_until: Option<Instant>,
}

impl UrlHealth {
    pub fn cooling(&self, now: Instant) -> bool {
        self.cooldown_until.map(|until| now < until).unwrap_or(false)
    }

    pub fn cooldown_remaining(&self, now: Instant) -> Option<Duration> {
        self.cooldown_until
            .and_then(|until| until.checked_duration_since(now))
    }
}

#[derive(Debug, Default)]
pub struct RpcHealth {
    inner: Mutex<HashMap<String, UrlHealth>>,
}

impl RpcHealth {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a measurement to the URL's rolling history.
    pub fn record_probe(&self, url: &str, probe: Probe) {
        let mut inner = self.inner.lock().expect("health lock");
        let entry = inner.entry(url.to_string()).or_default();
        entry.last = Some(probe);
        entry.history.push_back(probe);
        while entry.history.len() > LATENCY_HISTORY_CAP {
            entry.history.pop_front();
        }
    }

    /// Put every reported URL into cooldown for the next five minutes.
    pub fn mark_failed(&self, urls: &[String]) {
        if urls.is_empty() {
            return;
        }
        let until = Instant::now() + COOLDOWN;
        let mut inner = self.inner.lock().expect("health lock");
        for url in urls {
            inner.entry(url.clone()).or_default().cooldown_until = Some(until);
        }
    }

    /// Operator action: forget every active cooldown.
    pub fn clear_cooldowns(&self) {
        let mut inner = self.inner.lock().expect("health lock");
        for entry in inner.values_mut() {
            entry.cooldown_until = None;
        }
    }

    /// Copy of the table for display.
    pub fn snapshot(&self) -> HashMap<String, UrlHealth> {
        self.inner.lock().expect("health lock").clone()
    }

    /// Produce a permutation of `urls` in attempt order:
    ///
    /// 1. healthy with a measured latency, ascending;
    /// 2. healthy but not yet measured;
    /// 3. healthy with a failed last measurement;
    /// 4. cooling, randomized.
    ///
    /// A shuffle before the stable sort keeps equal-latency URLs from
    /// starving each other. Total over any input; empty in, empty out.
    pub fn prioritized(&self, urls: &[String]) -> Vec<String> {
        let inner = self.inner.lock().expect("health lock");
        let now = Instant::now();
        let mut rng = rand::thread_rng();

        let (mut healthy, mut cooling): (Vec<String>, Vec<String>) = urls
            .iter()
            .cloned()
            .partition(|url| !inner.get(url).map(|h| h.cooling(now)).unwrap_or(false));

        healthy.shuffle(&mut rng);
        healthy.sort_by(|a, b| {
            let pa = inner.get(a).and_then(|h| h.last);
            let pb = inner.get(b).and_then(|h| h.last);
            match (pa, pb) {
                (Some(Probe::Latency(da)), Some(Probe::Latency(db))) => da.cmp(&db),
                (Some(Probe::Latency(_)), _) => std::cmp::Ordering::Less,
                (_, Some(Probe::Latency(_))) => std::cmp::Ordering::Greater,
                // Unknown before failed.
                (Some(Probe::Failed), None) => std::cmp::Ordering::Greater,
                (None, Some(Probe::Failed)) => std::cmp::Ordering::Less,
                _ => std::cmp::Ordering::Equal,
            }
        });

        cooling.shuffle(&mut rng);
        healthy.extend(cooling);
        healthy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn urls(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn prioritized_orders_buckets() {
        let health = RpcHealth::new();
        health.record_probe("rpc_slow", Probe::Latency(Duration::from_millis(100)));
        health.record_probe("rpc_fast", Probe::Latency(Duration::from_millis(10)));
        health.record_probe("rpc_error", Probe::Failed);
        health.mark_failed(&urls(&["rpc_cooldown"]));

        let input = urls(&["rpc_slow", "rpc_cooldown", "rpc_error", "rpc_fast", "rpc_unknown"]);
        let got = health.prioritized(&input);

        assert_eq!(
            got,
            urls(&["rpc_fast", "rpc_slow", "rpc_unknown", "rpc_error", "rpc_cooldown"])
        );
    }

    #[test]
    fn cooling_never_precedes_healthy() {
        let health = RpcHealth::new();
        health.mark_failed(&urls(&["a", "b"]));
        let input = urls(&["a", "b", "c"]);
        let got = health.prioritized(&input);
        assert_eq!(got[0], "c");
        assert_eq!(got.len(), 3);
    }

    #[test]
    fn empty_input_yields_empty_output() {
        let health = RpcHealth::new();
        assert!(health.prioritized(&[]).is_empty());
    }

    #[test]
    fn clear_cooldowns_restores_url() {
        let health = RpcHealth::new();
        health.mark_failed(&urls(&["a"]));
        let input = urls(&["a", "b"]);
        assert_eq!(health.prioritized(&input)[1], "a");

        health.clear_cooldowns();
        // With no measurements both are in the healthy bucket; just check
        // that `a` is no longer pinned to the back deterministically.
        let snap = health.snapshot();
        assert!(snap["a"].cooldown_until.is_none());
    }

    #[test]
    fn history_is_bounded() {
        let health = RpcHealth::new();
        for i in 0..LATENCY_HISTORY_CAP + 10 {
            health.record_probe("a", Probe::Latency(Duration::from_millis(i as u64)));
        }
        let snap = health.snapshot();
        assert_eq!(snap["a"].history.len(), LATENCY_HISTORY_CAP);
        // Oldest entries were evicted.
        assert_eq!(
            snap["a"].history.front(),
            Some(&Probe::Latency(Duration::from_millis(10)))
        );
    }

    #[test]
    fn failed_probe_is_distinct_from_absence() {
        let health = RpcHealth::new();
        health.record_probe("a", Probe::Failed);
        let snap = health.snapshot();
        assert_eq!(snap["a"].last, Some(Probe::Failed));
        assert!(!snap.contains_key("b"));
    }
}
