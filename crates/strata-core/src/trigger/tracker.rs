//! Per-entity query usage tracking.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Rolling query counters for one entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryTracker {
    pub entity_id: String,
    pub query_count: u32,
    pub first_query_at: DateTime<Utc>,
    pub last_query_at: DateTime<Utc>,
    pub cache_hits: u32,
    pub cache_misses: u32,
}

impl QueryTracker {
    /// Tracker seeded with a first query.
    pub fn new(entity_id: impl Into<String>, cache_hit: bool, at: DateTime<Utc>) -> Self {
        Self {
            entity_id: entity_id.into(),
            query_count: 1,
            first_query_at: at,
            last_query_at: at,
            cache_hits: u32::from(cache_hit),
            cache_misses: u32::from(!cache_hit),
        }
    }

    /// hits / (hits + misses); zero before any query.
    pub fn cache_hit_rate(&self) -> f64 {
        let total = self.cache_hits + self.cache_misses;
        if total == 0 {
            0.0
        } else {
            self.cache_hits as f64 / total as f64
        }
    }

    /// Whether the window that started at the first query still covers `now`.
    pub fn in_window(&self, now: DateTime<Utc>, window: Duration) -> bool {
        now - self.first_query_at <= window
    }

    /// Count a query. A stale window restarts the counters from this query.
    ///
    /// Timestamps never move backwards; late arrivals keep the latest time.
    pub fn record(&mut self, cache_hit: bool, at: DateTime<Utc>, window: Duration) {
        if !self.in_window(at, window) {
            *self = Self::new(std::mem::take(&mut self.entity_id), cache_hit, at);
            return;
        }
        self.query_count = self.query_count.saturating_add(1);
        if cache_hit {
            self.cache_hits = self.cache_hits.saturating_add(1);
        } else {
            self.cache_misses = self.cache_misses.saturating_add(1);
        }
        self.last_query_at = self.last_query_at.max(at);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker(count: u32, hits: u32, misses: u32, first: DateTime<Utc>) -> QueryTracker {
        QueryTracker {
            entity_id: "e".to_string(),
            query_count: count,
            first_query_at: first,
            last_query_at: first,
            cache_hits: hits,
            cache_misses: misses,
        }
    }

    #[test]
    fn test_hit_rate() {
        let now = Utc::now();
        assert!((tracker(15, 10, 5, now).cache_hit_rate() - 0.6667).abs() < 1e-3);
        assert_eq!(tracker(0, 0, 0, now).cache_hit_rate(), 0.0);
    }

    #[test]
    fn test_stale_window_resets_to_one() {
        let now = Utc::now();
        let mut t = tracker(40, 30, 10, now - Duration::hours(30));
        t.record(true, now, Duration::hours(24));
        assert_eq!(t.query_count, 1);
        assert_eq!(t.cache_hits, 1);
        assert_eq!(t.cache_misses, 0);
        assert_eq!(t.first_query_at, now);
        assert_eq!(t.entity_id, "e");
    }

    #[test]
    fn test_accumulates_inside_window() {
        let now = Utc::now();
        let mut t = QueryTracker::new("e", false, now - Duration::hours(2));
        t.record(true, now - Duration::hours(1), Duration::hours(24));
        t.record(true, now, Duration::hours(24));
        assert_eq!(t.query_count, 3);
        assert_eq!(t.cache_hits, 2);
        assert_eq!(t.cache_misses, 1);
        assert_eq!(t.last_query_at, now);
    }

    #[test]
    fn test_out_of_order_timestamp_stays_monotonic() {
        let now = Utc::now();
        let mut t = QueryTracker::new("e", true, now - Duration::hours(3));
        t.record(true, now, Duration::hours(24));
        t.record(false, now - Duration::hours(1), Duration::hours(24));
        assert_eq!(t.last_query_at, now);
        assert_eq!(t.query_count, 3);
    }
}
