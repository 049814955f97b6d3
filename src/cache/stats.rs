use serde::{Deserialize, Serialize};

/// Counters for render cache activity
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    /// Lookups that found nothing usable, stale entries included
    pub misses: u64,
    /// Misses caused by an expired entry
    pub stale: u64,
    pub writes: u64,
}

impl CacheStats {
    pub fn lookups(&self) -> u64 {
        self.hits + self.misses
    }

    pub fn hit_rate(&self) -> f64 {
        let total = self.lookups();
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_rate() {
        let stats = CacheStats {
            hits: 80,
            misses: 20,
            stale: 5,
            writes: 20,
        };

        assert_eq!(stats.lookups(), 100);
        assert_eq!(stats.hit_rate(), 0.8);
        assert_eq!(CacheStats::default().hit_rate(), 0.0);
    }

    #[test]
    fn test_serializes_for_reports() {
        let stats = CacheStats {
            hits: 1,
            ..Default::default()
        };
        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["hits"], 1);
        assert_eq!(json["stale"], 0);
    }
}
