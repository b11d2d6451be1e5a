use serde::Serialize;

const FPS_WINDOW_MS: u64 = 1_000;

/// Counts frames in fixed one-second windows.
#[derive(Debug, Clone, Default)]
pub struct FpsCounter {
    window_start_ms: Option<u64>,
    frames: u32,
    fps: u32,
}

impl FpsCounter {
    pub fn fps(&self) -> u32 {
        self.fps
    }

    /// Records one frame. Returns the new rate whenever a window closes.
    pub fn frame(&mut self, now_ms: u64) -> Option<u32> {
        let start = *self.window_start_ms.get_or_insert(now_ms);
        self.frames = self.frames.saturating_add(1);
        if now_ms.saturating_sub(start) < FPS_WINDOW_MS {
            return None;
        }
        self.fps = self.frames;
        self.frames = 0;
        self.window_start_ms = Some(now_ms);
        Some(self.fps)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct EngineStats {
    pub active: usize,
    pub lingering: usize,
    pub hidden: usize,
    pub pool: usize,
    pub catalog: usize,
    pub fps: u32,
    pub admitted: u64,
    pub rejected: u64,
}

#[cfg(test)]
mod tests {
    use super::{EngineStats, FpsCounter};

    #[test]
    fn reports_frames_per_closed_window() {
        let mut counter = FpsCounter::default();
        for frame in 0..60u64 {
            assert_eq!(counter.frame(frame * 16), None);
        }
        assert_eq!(counter.frame(1_000), Some(61));
        assert_eq!(counter.fps(), 61);
        assert_eq!(counter.frame(1_016), None);
        assert_eq!(counter.frame(2_000), Some(2));
    }

    #[test]
    fn stats_serialize_for_log_output() {
        let stats = EngineStats {
            active: 3,
            fps: 60,
            ..EngineStats::default()
        };
        let value = serde_json::to_value(stats).expect("stats serialize");
        assert_eq!(value["active"], 3);
        assert_eq!(value["fps"], 60);
    }
}
