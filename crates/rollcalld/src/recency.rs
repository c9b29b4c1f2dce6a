use chrono::NaiveDate;
use std::collections::HashMap;

/// Process-local cache of the last date each identity was marked present.
///
/// Purely an optimization to skip redundant ledger calls while the daemon is
/// running: the ledger re-checks on every write, so this cache is never a
/// source of truth and losing it on restart costs at most one extra no-op
/// ledger call per identity. Bounded by the number of identities seen this
/// process lifetime.
#[derive(Default)]
pub struct RecencyCache {
    last_marked: HashMap<String, NaiveDate>,
}

impl RecencyCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the cache knows `identity` was already marked on `today`.
    pub fn already_marked(&self, identity: &str, today: NaiveDate) -> bool {
        self.last_marked.get(identity) == Some(&today)
    }

    /// Remember that `identity` is marked for `today`, superseding any
    /// earlier date.
    pub fn record(&mut self, identity: &str, today: NaiveDate) {
        self.last_marked.insert(identity.to_string(), today);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 1, d).unwrap()
    }

    #[test]
    fn test_unknown_identity_not_marked() {
        let cache = RecencyCache::new();
        assert!(!cache.already_marked("S100", date(20)));
    }

    #[test]
    fn test_record_then_hit() {
        let mut cache = RecencyCache::new();
        cache.record("S100", date(20));
        assert!(cache.already_marked("S100", date(20)));
        assert!(!cache.already_marked("S200", date(20)));
    }

    #[test]
    fn test_day_rollover_misses() {
        let mut cache = RecencyCache::new();
        cache.record("S100", date(20));
        // Yesterday's entry must not satisfy today's check.
        assert!(!cache.already_marked("S100", date(21)));

        cache.record("S100", date(21));
        assert!(cache.already_marked("S100", date(21)));
        // The newer date supersedes the old entry.
        assert!(!cache.already_marked("S100", date(20)));
    }
}
