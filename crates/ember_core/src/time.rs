//! Frame timing

use std::time::Instant;

/// Tracks per-frame delta time and a smoothed FPS estimate
#[derive(Debug)]
pub struct FrameTimer {
    last_tick: Instant,
    delta_seconds: f32,
    smoothed_fps: f32,
    frame_count: u64,
}

impl FrameTimer {
    pub fn new() -> Self {
        Self {
            last_tick: Instant::now(),
            delta_seconds: 0.0,
            smoothed_fps: 0.0,
            frame_count: 0,
        }
    }

    /// Advance to the next frame; returns the delta in seconds
    pub fn tick(&mut self) -> f32 {
        let now = Instant::now();
        self.delta_seconds = now.duration_since(self.last_tick).as_secs_f32();
        self.last_tick = now;
        self.frame_count += 1;

        if self.delta_seconds > 0.0 {
            let instant_fps = 1.0 / self.delta_seconds;
            // Exponential moving average keeps the HUD readable
            self.smoothed_fps = if self.smoothed_fps == 0.0 {
                instant_fps
            } else {
                self.smoothed_fps * 0.95 + instant_fps * 0.05
            };
        }
        self.delta_seconds
    }

    #[inline]
    pub fn delta_seconds(&self) -> f32 {
        self.delta_seconds
    }

    #[inline]
    pub fn fps(&self) -> f32 {
        self.smoothed_fps
    }

    #[inline]
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }
}

impl Default for FrameTimer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tick_advances() {
        let mut timer = FrameTimer::new();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let dt = timer.tick();
        assert!(dt > 0.0);
        assert_eq!(timer.frame_count(), 1);
        assert!(timer.fps() > 0.0);
    }
}
