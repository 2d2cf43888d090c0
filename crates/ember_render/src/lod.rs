//! Level-of-detail selection
//!
//! Discrete levels LOD0..LOD3 plus Culled, chosen from camera distance
//! against ascending thresholds. The first update always applies; after
//! that the default policy switches whenever the computed level differs,
//! with an optional strict mode that additionally requires the distance
//! to clear the boundary by `transition_distance`.

use ember_asset::{Material, Mesh, Model};
use ember_math::{Aabb, Vec3};
use std::sync::Arc;

/// Discrete detail level, ordered coarse-ward
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[derive(serde::Serialize, serde::Deserialize)]
pub enum LodLevel {
    #[default]
    Lod0,
    Lod1,
    Lod2,
    Lod3,
    Culled,
}

impl LodLevel {
    pub const COUNT: usize = 4;

    pub fn index(&self) -> Option<usize> {
        match self {
            Self::Lod0 => Some(0),
            Self::Lod1 => Some(1),
            Self::Lod2 => Some(2),
            Self::Lod3 => Some(3),
            Self::Culled => None,
        }
    }

    pub fn from_index(index: usize) -> Self {
        match index {
            0 => Self::Lod0,
            1 => Self::Lod1,
            2 => Self::Lod2,
            3 => Self::Lod3,
            _ => Self::Culled,
        }
    }
}

/// How per-level textures resolve
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum TextureLodStrategy {
    /// Every level uses LOD0's textures
    #[default]
    Inherit,
    /// Levels bind their own texture set when present
    PerLevel,
}

/// Assets one level draws with; unset fields fall back to LOD0
#[derive(Clone, Debug, Default)]
pub struct LodAssets {
    pub mesh: Option<Arc<Mesh>>,
    pub model: Option<Arc<Model>>,
    pub material: Option<Arc<Material>>,
}

/// Distance thresholds and per-level assets
#[derive(Clone, Debug)]
pub struct LodConfig {
    /// Ascending; `distance < thresholds[i]` selects level i
    pub distance_thresholds: [f32; 4],
    /// Extra distance a strict switch must clear past the boundary
    pub transition_distance: f32,
    /// Scales the bounds extent subtracted from the center distance
    pub bounding_box_scale: f32,
    pub levels: [LodAssets; 4],
    pub texture_strategy: TextureLodStrategy,
    /// Off by default: switch on any level difference. On: require the
    /// boundary to be cleared by `transition_distance`.
    pub strict_hysteresis: bool,
    pub enabled: bool,
}

impl Default for LodConfig {
    fn default() -> Self {
        Self {
            distance_thresholds: [50.0, 150.0, 500.0, 1000.0],
            transition_distance: 5.0,
            bounding_box_scale: 1.0,
            levels: Default::default(),
            texture_strategy: TextureLodStrategy::default(),
            strict_hysteresis: false,
            enabled: true,
        }
    }
}

impl LodConfig {
    /// Level for a distance: the smallest threshold the distance is
    /// under, `Culled` past the last.
    pub fn calculate_lod(&self, distance: f32) -> LodLevel {
        for (i, threshold) in self.distance_thresholds.iter().enumerate() {
            if distance < *threshold {
                return LodLevel::from_index(i);
            }
        }
        LodLevel::Culled
    }

    /// Mesh for a level, falling back to LOD0's mesh
    pub fn resolve_mesh(&self, level: LodLevel) -> Option<Arc<Mesh>> {
        let index = level.index()?;
        self.levels[index]
            .mesh
            .clone()
            .or_else(|| self.levels[0].mesh.clone())
    }

    /// Material for a level, falling back to LOD0's material
    pub fn resolve_material(&self, level: LodLevel) -> Option<Arc<Material>> {
        let index = level.index()?;
        self.levels[index]
            .material
            .clone()
            .or_else(|| self.levels[0].material.clone())
    }
}

/// Distance used for selection: to the bounds surface when bounds are
/// given, to the position otherwise.
pub fn selection_distance(
    camera_pos: Vec3,
    entity_pos: Vec3,
    bounds: Option<&Aabb>,
    bounding_box_scale: f32,
) -> f32 {
    match bounds {
        Some(aabb) if !aabb.is_empty() => {
            let center_distance = aabb.center().distance(camera_pos);
            (center_distance - aabb.max_extent() * bounding_box_scale * 0.5).max(0.0)
        }
        _ => entity_pos.distance(camera_pos),
    }
}

/// Per-entity LOD runtime state
#[derive(Clone, Debug)]
pub struct LodComponent {
    pub config: LodConfig,
    current: LodLevel,
    last_distance: f32,
    switch_count: u32,
    first_update_done: bool,
}

impl LodComponent {
    pub fn new(config: LodConfig) -> Self {
        Self {
            config,
            current: LodLevel::Lod0,
            last_distance: 0.0,
            switch_count: 0,
            first_update_done: false,
        }
    }

    pub fn current(&self) -> LodLevel {
        self.current
    }

    pub fn last_distance(&self) -> f32 {
        self.last_distance
    }

    pub fn switch_count(&self) -> u32 {
        self.switch_count
    }

    /// Apply a new distance sample; returns true when the level switched
    pub fn update(&mut self, distance: f32) -> bool {
        self.last_distance = distance;
        if !self.config.enabled {
            return false;
        }
        let candidate = self.config.calculate_lod(distance);
        if !self.first_update_done {
            self.first_update_done = true;
            let changed = candidate != self.current;
            self.current = candidate;
            if changed {
                self.switch_count += 1;
            }
            return changed;
        }
        if candidate == self.current {
            return false;
        }
        if self.config.strict_hysteresis && !self.clears_boundary(candidate, distance) {
            return false;
        }
        self.current = candidate;
        self.switch_count += 1;
        true
    }

    /// Strict mode: the distance must pass the boundary threshold by more
    /// than `transition_distance` in the direction of the switch.
    fn clears_boundary(&self, candidate: LodLevel, distance: f32) -> bool {
        let margin = self.config.transition_distance;
        if candidate > self.current {
            // Moving away: boundary is the current level's outer threshold
            let boundary_index = self.current.index().unwrap_or(3);
            distance > self.config.distance_thresholds[boundary_index] + margin
        } else {
            // Moving closer: boundary is the candidate's outer threshold
            match candidate.index() {
                Some(index) => distance < self.config.distance_thresholds[index] - margin,
                None => true,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> LodConfig {
        LodConfig {
            distance_thresholds: [50.0, 150.0, 500.0, 1000.0],
            ..Default::default()
        }
    }

    #[test]
    fn test_threshold_selection() {
        let c = config();
        assert_eq!(c.calculate_lod(10.0), LodLevel::Lod0);
        assert_eq!(c.calculate_lod(100.0), LodLevel::Lod1);
        assert_eq!(c.calculate_lod(300.0), LodLevel::Lod2);
        assert_eq!(c.calculate_lod(700.0), LodLevel::Lod3);
        assert_eq!(c.calculate_lod(1500.0), LodLevel::Culled);
    }

    #[test]
    fn test_monotone_in_distance() {
        let c = config();
        let mut last = LodLevel::Lod0;
        for step in 0..200 {
            let level = c.calculate_lod(step as f32 * 10.0);
            assert!(level >= last, "level regressed at distance {}", step * 10);
            last = level;
        }
    }

    #[test]
    fn test_first_update_always_applies() {
        let mut lod = LodComponent::new(config());
        assert!(lod.update(700.0));
        assert_eq!(lod.current(), LodLevel::Lod3);
        assert_eq!(lod.switch_count(), 1);
    }

    #[test]
    fn test_switch_on_difference() {
        let mut lod = LodComponent::new(config());
        lod.update(10.0);
        assert!(!lod.update(20.0));
        assert!(lod.update(100.0));
        assert_eq!(lod.current(), LodLevel::Lod1);
    }

    #[test]
    fn test_strict_hysteresis_holds_near_boundary() {
        let mut cfg = config();
        cfg.strict_hysteresis = true;
        cfg.transition_distance = 5.0;
        let mut lod = LodComponent::new(cfg);
        lod.update(45.0);
        assert_eq!(lod.current(), LodLevel::Lod0);
        // Just over the 50.0 boundary but within the margin: hold
        assert!(!lod.update(52.0));
        assert_eq!(lod.current(), LodLevel::Lod0);
        // Clearly past the margin: switch
        assert!(lod.update(60.0));
        assert_eq!(lod.current(), LodLevel::Lod1);
        // Coming back: must drop below 50 - 5
        assert!(!lod.update(47.0));
        assert!(lod.update(44.0));
        assert_eq!(lod.current(), LodLevel::Lod0);
    }

    #[test]
    fn test_disabled_never_switches() {
        let mut cfg = config();
        cfg.enabled = false;
        let mut lod = LodComponent::new(cfg);
        assert!(!lod.update(5000.0));
        assert_eq!(lod.current(), LodLevel::Lod0);
    }

    #[test]
    fn test_bounds_distance() {
        let aabb = Aabb {
            min: Vec3::new(-5.0, -5.0, -5.0),
            max: Vec3::new(5.0, 5.0, 5.0),
        };
        let d = selection_distance(Vec3::new(100.0, 0.0, 0.0), Vec3::ZERO, Some(&aabb), 1.0);
        assert_eq!(d, 95.0);
        // Inside the scaled bounds clamps to zero
        let near = selection_distance(Vec3::new(2.0, 0.0, 0.0), Vec3::ZERO, Some(&aabb), 1.0);
        assert_eq!(near, 0.0);
    }
}
