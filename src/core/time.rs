//! Time conversions for Maya caches.
//!
//! Maya stores all times in ticks of 1/6000 second. The decoder works in
//! seconds and buckets every sample into a frame of fixed width.

/// Seconds, as used throughout the decoder.
pub type Chrono = f64;

/// Maya ticks per second.
pub const TICKS_PER_SECOND: f64 = 6000.0;

/// Convert ticks to seconds.
#[inline]
pub fn ticks_to_seconds(ticks: f64) -> Chrono {
    ticks / TICKS_PER_SECOND
}

/// Convert seconds to ticks, rounded to the nearest whole tick.
#[inline]
pub fn seconds_to_ticks(seconds: Chrono) -> i64 {
    (seconds * TICKS_PER_SECOND).round() as i64
}

/// Frame bucket for a sample taken at `time`.
///
/// Samples are centred on their frame: anything within half a frame of
/// `start + k * time_per_frame` lands in frame `k`. The result is negative for
/// samples before the channel start.
#[inline]
pub fn frame_index(time: Chrono, time_per_frame: Chrono, channel_start: Chrono) -> i64 {
    ((time + time_per_frame / 2.0 - channel_start) / time_per_frame).floor() as i64
}

/// Timestamp of a per-frame data file named `...Frame<frame>Tick<tick>.mc`.
#[inline]
pub fn frame_file_time(frame: u32, tick: u32, time_per_frame: Chrono) -> Chrono {
    frame as Chrono * time_per_frame + ticks_to_seconds(tick as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tick_conversion() {
        assert_eq!(ticks_to_seconds(6000.0), 1.0);
        assert_eq!(ticks_to_seconds(250.0), 250.0 / 6000.0);
        assert_eq!(seconds_to_ticks(1.0 / 24.0), 250);
        assert_eq!(seconds_to_ticks(-0.5), -3000);
    }

    #[test]
    fn test_frame_index_centering() {
        let dt = 1.0 / 24.0;
        assert_eq!(frame_index(0.0, dt, 0.0), 0);
        assert_eq!(frame_index(dt * 0.49, dt, 0.0), 0);
        assert_eq!(frame_index(dt * 0.51, dt, 0.0), 1);
        assert_eq!(frame_index(10.0 * dt, dt, 0.0), 10);
        assert_eq!(frame_index(10.0 * dt, dt, 2.0 * dt), 8);
    }

    #[test]
    fn test_frame_index_before_start() {
        let dt = 1.0 / 24.0;
        assert_eq!(frame_index(0.0, dt, 2.0 * dt), -2);
    }

    #[test]
    fn test_frame_file_time() {
        let dt = 250.0 / 6000.0;
        assert!((frame_file_time(12, 0, dt) - 12.0 * dt).abs() < 1e-12);
        assert!((frame_file_time(5, 3000, dt) - (5.0 * dt + 0.5)).abs() < 1e-12);
    }
}
