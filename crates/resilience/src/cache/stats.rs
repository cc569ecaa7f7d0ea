use serde::{Deserialize, Serialize};

/// Point-in-time cache counters.
///
/// `hits`, `misses` and `evictions` only ever grow. `entries` is the number
/// of keys currently held, including expired keys nobody has touched yet.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: u64,
    pub evictions: u64,
    /// `hits / (hits + misses)`, or 0 when there were no lookups.
    pub hit_ratio: f64,
}

impl CacheStats {
    pub(crate) fn new(hits: u64, misses: u64, entries: u64, evictions: u64) -> Self {
        let lookups = hits + misses;
        let hit_ratio = if lookups == 0 {
            0.0
        } else {
            hits as f64 / lookups as f64
        };

        Self {
            hits,
            misses,
            entries,
            evictions,
            hit_ratio,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_ratio_is_zero_without_lookups() {
        let stats = CacheStats::new(0, 0, 4, 0);
        assert_eq!(stats.hit_ratio, 0.0);
    }

    #[test]
    fn test_hit_ratio() {
        let stats = CacheStats::new(3, 1, 2, 1);
        assert!((stats.hit_ratio - 0.75).abs() < f64::EPSILON);
    }
}
