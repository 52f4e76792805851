//! FFmpeg progress parsing.

use serde::{Deserialize, Serialize};

/// Progress information parsed from FFmpeg's `-progress` output.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RemuxProgress {
    /// Current frame number
    pub frame: u64,
    /// Current processing FPS
    pub fps: f64,
    /// Output timestamp in milliseconds
    pub out_time_ms: i64,
    /// Processing speed relative to realtime (e.g. 30.0 for a remux)
    pub speed: f64,
    /// Whether FFmpeg reported the final progress block
    pub is_complete: bool,
}

impl RemuxProgress {
    /// Progress percentage given the title duration in seconds.
    pub fn percentage(&self, total_duration_secs: f64) -> f64 {
        if total_duration_secs <= 0.0 {
            return 0.0;
        }
        ((self.out_time_ms as f64 / 1000.0 / total_duration_secs) * 100.0).min(100.0)
    }

    /// Estimated seconds remaining, if the speed is known.
    pub fn eta_seconds(&self, total_duration_secs: f64) -> Option<f64> {
        if self.speed <= 0.0 || self.out_time_ms <= 0 {
            return None;
        }
        let remaining_secs = total_duration_secs - self.out_time_ms as f64 / 1000.0;
        if remaining_secs <= 0.0 {
            return Some(0.0);
        }
        Some(remaining_secs / self.speed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percentage() {
        let progress = RemuxProgress {
            out_time_ms: 5_000,
            ..Default::default()
        };

        assert!((progress.percentage(10.0) - 50.0).abs() < 0.01);
        assert!((progress.percentage(5.0) - 100.0).abs() < 0.01);
        assert_eq!(progress.percentage(0.0), 0.0);
    }

    #[test]
    fn test_eta() {
        let progress = RemuxProgress {
            out_time_ms: 5_000,
            speed: 2.0,
            ..Default::default()
        };

        let eta = progress.eta_seconds(10.0).unwrap();
        assert!((eta - 2.5).abs() < 0.01);
    }
}
