// Per-key delayed tasks.
//
// Each key has at most one pending value. Pushing again replaces the value
// and restarts the key's timer; a value becomes ready once its key has been
// quiet for the whole window.

use std::collections::HashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};

const DEFAULT_DEBOUNCE_MS: u64 = 1_000;
const MIN_DEBOUNCE_MS: u64 = 50;
const MAX_DEBOUNCE_MS: u64 = 60_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebounceConfig {
    pub window: Duration,
}

impl Default for DebounceConfig {
    fn default() -> Self {
        Self { window: Duration::from_millis(DEFAULT_DEBOUNCE_MS) }
    }
}

impl DebounceConfig {
    /// Window in milliseconds, clamped to [50, 60000].
    pub fn with_millis(ms: u64) -> Self {
        Self { window: Duration::from_millis(ms.clamp(MIN_DEBOUNCE_MS, MAX_DEBOUNCE_MS)) }
    }
}

struct Pending<V> {
    value: V,
    last_seen: Instant,
}

pub struct Debouncer<K, V> {
    config: DebounceConfig,
    pending: HashMap<K, Pending<V>>,
}

impl<K: Eq + Hash + Clone, V> Debouncer<K, V> {
    pub fn new(config: DebounceConfig) -> Self {
        Self { config, pending: HashMap::new() }
    }

    /// Schedule `value` for `key`, replacing any pending value and
    /// restarting the key's timer.
    pub fn push(&mut self, key: K, value: V) {
        self.push_at(key, value, Instant::now());
    }

    pub fn push_at(&mut self, key: K, value: V, now: Instant) {
        self.pending.insert(key, Pending { value, last_seen: now });
    }

    /// Remove and return every entry whose window has elapsed.
    pub fn drain_ready(&mut self) -> Vec<(K, V)> {
        self.drain_ready_at(Instant::now())
    }

    pub fn drain_ready_at(&mut self, now: Instant) -> Vec<(K, V)> {
        let window = self.config.window;
        let ready_keys: Vec<K> = self
            .pending
            .iter()
            .filter(|(_, pending)| now.saturating_duration_since(pending.last_seen) >= window)
            .map(|(key, _)| key.clone())
            .collect();

        ready_keys
            .into_iter()
            .filter_map(|key| self.pending.remove(&key).map(|pending| (key, pending.value)))
            .collect()
    }

    /// Drop a single pending entry. Returns whether one existed.
    pub fn cancel(&mut self, key: &K) -> bool {
        self.pending.remove(key).is_some()
    }

    /// Drop every pending entry, returning how many were cancelled.
    pub fn cancel_all(&mut self) -> usize {
        let cancelled = self.pending.len();
        self.pending.clear();
        cancelled
    }

    /// When the earliest pending entry becomes ready.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.values().map(|pending| pending.last_seen + self.config.window).min()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn debouncer(ms: u64) -> Debouncer<&'static str, u32> {
        Debouncer::new(DebounceConfig::with_millis(ms))
    }

    fn ms(value: u64) -> Duration {
        Duration::from_millis(value)
    }

    // ── DebounceConfig ───────────────────────────────────────────────

    #[test]
    fn default_window_is_one_second() {
        assert_eq!(DebounceConfig::default().window, ms(1_000));
    }

    #[test]
    fn window_is_clamped() {
        assert_eq!(DebounceConfig::with_millis(5).window, ms(50));
        assert_eq!(DebounceConfig::with_millis(300).window, ms(300));
        assert_eq!(DebounceConfig::with_millis(3_600_000).window, ms(60_000));
    }

    // ── Scheduling ───────────────────────────────────────────────────

    #[test]
    fn entry_becomes_ready_after_quiet_window() {
        let mut d = debouncer(200);
        let t0 = Instant::now();
        d.push_at("a.md", 1, t0);

        assert!(d.drain_ready_at(t0 + ms(199)).is_empty());
        assert_eq!(d.drain_ready_at(t0 + ms(200)), vec![("a.md", 1)]);
        assert_eq!(d.next_deadline(), None);
        assert!(d.drain_ready_at(t0 + ms(500)).is_empty());
    }

    #[test]
    fn burst_on_one_key_collapses_to_last_value() {
        let mut d = debouncer(200);
        let t0 = Instant::now();
        for (offset, value) in [(0, 1), (50, 2), (150, 3)] {
            d.push_at("a.md", value, t0 + ms(offset));
        }

        assert_eq!(d.next_deadline(), Some(t0 + ms(350)));
        assert!(d.drain_ready_at(t0 + ms(300)).is_empty(), "timer restarts on each push");
        assert_eq!(d.drain_ready_at(t0 + ms(350)), vec![("a.md", 3)]);
    }

    #[test]
    fn keys_are_independent() {
        let mut d = debouncer(100);
        let t0 = Instant::now();
        d.push_at("a.md", 1, t0);
        d.push_at("b.md", 2, t0 + ms(60));

        assert_eq!(d.next_deadline(), Some(t0 + ms(100)));
        assert_eq!(d.drain_ready_at(t0 + ms(100)), vec![("a.md", 1)]);
        assert_eq!(d.next_deadline(), Some(t0 + ms(160)));
        assert_eq!(d.drain_ready_at(t0 + ms(160)), vec![("b.md", 2)]);
        assert!(d.next_deadline().is_none());
    }

    // ── Cancellation ─────────────────────────────────────────────────

    #[test]
    fn cancel_drops_pending_entries() {
        let mut d = debouncer(100);
        let t0 = Instant::now();
        d.push_at("a.md", 1, t0);
        d.push_at("b.md", 2, t0);
        d.push_at("c.md", 3, t0);

        assert!(d.cancel(&"a.md"));
        assert!(!d.cancel(&"a.md"));
        assert_eq!(d.cancel_all(), 2);
        assert!(d.drain_ready_at(t0 + ms(1_000)).is_empty());
    }

    #[test]
    fn drain_on_empty_debouncer_is_empty() {
        let mut d = debouncer(100);
        assert!(d.drain_ready().is_empty());
        assert!(d.next_deadline().is_none());
    }
}
