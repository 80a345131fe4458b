//! Per-key rate limiting for feed emissions.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::Utc;

/// Current wall-clock time as fractional epoch seconds, at microsecond
/// resolution.
pub fn epoch_seconds() -> f64 {
    Utc::now().timestamp_micros() as f64 / 1e6
}

/// Tracks the last permitted emission per logical stream key and, for the
/// pose sub-stream, per robot id.
///
/// Pure bookkeeping: no I/O, no clock access of its own. The maps are
/// mutex-guarded so the listener worker can update them while a diagnostic
/// reader inspects them; state lives for the session and resets on restart.
#[derive(Debug, Default)]
pub struct ChangeFeedThrottle {
    streams: Mutex<HashMap<String, f64>>,
    poses: Mutex<HashMap<String, f64>>,
}

impl ChangeFeedThrottle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a snapshot keyed by `stream_key` may be emitted at `now`.
    /// Emitting records `now` as the key's last emission; suppression leaves
    /// the recorded timestamp untouched.
    pub fn should_emit(&self, stream_key: &str, now: f64, min_interval_s: f64) -> bool {
        Self::check(&self.streams, stream_key, now, min_interval_s)
    }

    /// Pose variant, keyed per robot so one robot's stream never starves
    /// another's.
    pub fn should_emit_pose(&self, robot_id: &str, now: f64, min_interval_s: f64) -> bool {
        Self::check(&self.poses, robot_id, now, min_interval_s)
    }

    /// Last permitted emission for a stream key, if any.
    pub fn last_emit(&self, stream_key: &str) -> Option<f64> {
        match self.streams.lock() {
            Ok(map) => map.get(stream_key).copied(),
            Err(_) => None,
        }
    }

    /// Last permitted pose emission for a robot, if any.
    pub fn last_pose_emit(&self, robot_id: &str) -> Option<f64> {
        match self.poses.lock() {
            Ok(map) => map.get(robot_id).copied(),
            Err(_) => None,
        }
    }

    fn check(map: &Mutex<HashMap<String, f64>>, key: &str, now: f64, min_interval_s: f64) -> bool {
        if min_interval_s <= 0.0 {
            return true;
        }

        let mut map = match map.lock() {
            Ok(map) => map,
            // Poisoned map: fail open rather than silently drop events.
            Err(_) => return true,
        };

        match map.get(key) {
            // First sighting of a key always passes; the boundary case
            // `now - last == min_interval_s` passes too.
            Some(&last) if now - last < min_interval_s => false,
            _ => {
                map.insert(key.to_string(), now);
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cold_start_then_boundary() {
        let throttle = ChangeFeedThrottle::new();
        let t0 = 1_000.0;

        assert!(throttle.should_emit("events", t0, 1.0));
        assert!(!throttle.should_emit("events", t0 + 0.5, 1.0));
        assert!(throttle.should_emit("events", t0 + 1.0, 1.0));
    }

    #[test]
    fn test_suppression_leaves_timestamp_unchanged() {
        let throttle = ChangeFeedThrottle::new();
        let t0 = 1_000.0;

        assert!(throttle.should_emit("tasks", t0, 1.0));
        assert!(!throttle.should_emit("tasks", t0 + 0.9, 1.0));
        assert_eq!(throttle.last_emit("tasks"), Some(t0));

        // Interval measured from the last *emission*, not the last attempt.
        assert!(throttle.should_emit("tasks", t0 + 1.0, 1.0));
        assert_eq!(throttle.last_emit("tasks"), Some(t0 + 1.0));
    }

    #[test]
    fn test_zero_interval_disables_throttling() {
        let throttle = ChangeFeedThrottle::new();
        for i in 0..10 {
            assert!(throttle.should_emit("robots", 1_000.0 + i as f64 * 0.001, 0.0));
        }
        assert!(throttle.should_emit("robots", 1_000.0, -1.0));
    }

    #[test]
    fn test_pose_keys_are_independent_per_robot() {
        let throttle = ChangeFeedThrottle::new();
        let t0 = 1_000.0;

        assert!(throttle.should_emit_pose("agv-1", t0, 1.0));
        assert!(!throttle.should_emit_pose("agv-1", t0 + 0.2, 1.0));
        // A different robot is unaffected by agv-1's recent emission.
        assert!(throttle.should_emit_pose("agv-2", t0 + 0.2, 1.0));
    }

    #[test]
    fn test_stream_and_pose_maps_do_not_alias() {
        let throttle = ChangeFeedThrottle::new();
        let t0 = 1_000.0;

        assert!(throttle.should_emit("agv-1", t0, 1.0));
        // Same key through the pose map still cold-starts.
        assert!(throttle.should_emit_pose("agv-1", t0 + 0.1, 1.0));
    }
}
