//! Per-frame renderer statistics

use crate::lod::LodLevel;

/// Counters reset at `begin_frame` and snapshotted at `end_frame`
#[derive(Clone, Copy, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct FrameStats {
    pub submitted: u64,
    pub culled: u64,
    /// Every draw issued this frame, batched or not
    pub draw_calls: u64,
    pub batch_count: u64,
    /// Draws issued from CPU-merged batches
    pub batched_draw_calls: u64,
    pub instanced_draw_calls: u64,
    pub instanced_instances: u64,
    /// Draws that lost batching eligibility at issue time
    pub fallback_draw_calls: u64,
    pub fallback_batches: u64,
    pub batched_triangles: u64,
    pub batched_vertices: u64,
    pub worker_processed: u64,
    pub worker_max_queue_depth: u64,
    pub worker_wait_time_ms: f64,
    pub lod_instancing_groups: u64,
    pub lod_instancing_instances: u64,
    pub lod_instancing_draw_calls: u64,
    pub lod_deferred_instances: u64,
    /// Visible item count per level Lod0..Lod3, then culled
    pub lod_level_counts: [u64; 5],
}

impl FrameStats {
    pub fn count_lod(&mut self, level: LodLevel) {
        let index = level.index().unwrap_or(4);
        self.lod_level_counts[index] += 1;
    }

    /// Draws accounted to a specific path never exceed the total
    pub fn invariant_holds(&self) -> bool {
        self.draw_calls
            >= self.batched_draw_calls + self.instanced_draw_calls + self.fallback_draw_calls
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lod_counting() {
        let mut stats = FrameStats::default();
        stats.count_lod(LodLevel::Lod0);
        stats.count_lod(LodLevel::Lod0);
        stats.count_lod(LodLevel::Culled);
        assert_eq!(stats.lod_level_counts[0], 2);
        assert_eq!(stats.lod_level_counts[4], 1);
    }

    #[test]
    fn test_stats_serialize_for_capture() {
        let stats = FrameStats {
            draw_calls: 3,
            instanced_instances: 200,
            ..Default::default()
        };
        let json = serde_json::to_string(&stats).unwrap();
        let restored: FrameStats = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, stats);
    }

    #[test]
    fn test_invariant() {
        let mut stats = FrameStats::default();
        stats.draw_calls = 10;
        stats.instanced_draw_calls = 4;
        stats.fallback_draw_calls = 6;
        assert!(stats.invariant_holds());
        stats.fallback_draw_calls = 7;
        assert!(!stats.invariant_holds());
    }
}
