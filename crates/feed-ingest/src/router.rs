//! Classification and throttle policy for incoming change events.

use std::sync::Arc;

use crate::throttle::ChangeFeedThrottle;
use crate::types::{ChangeEvent, Pose, StreamKey};

/// Routing decision for one incoming event or snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Forward,
    Suppress,
}

/// Consumer interested in routed pose updates, such as the map trace.
pub trait PoseSink: Send {
    fn push_pose(&mut self, robot_id: &str, pose: Pose);
}

/// Applies throttle policy to classified change events.
///
/// Pose-like events are rate-limited per robot; everything else is
/// low-frequency and high-importance, so it bypasses throttling entirely.
/// The router holds no state of its own beyond the shared throttle — any
/// number of routers may share one throttle per fleet.
#[derive(Clone)]
pub struct EventRouter {
    throttle: Arc<ChangeFeedThrottle>,
    pose_interval_s: f64,
    snapshot_interval_s: f64,
}

impl EventRouter {
    pub fn new(
        throttle: Arc<ChangeFeedThrottle>,
        pose_interval_s: f64,
        snapshot_interval_s: f64,
    ) -> Self {
        Self {
            throttle,
            pose_interval_s,
            snapshot_interval_s,
        }
    }

    /// Decide whether a single added event reaches downstream consumers.
    pub fn route(&self, event: &ChangeEvent, now: f64) -> Action {
        if !event.is_pose_like() {
            return Action::Forward;
        }
        if self
            .throttle
            .should_emit_pose(event.robot_id(), now, self.pose_interval_s)
        {
            Action::Forward
        } else {
            Action::Suppress
        }
    }

    /// Decide whether a refreshed full snapshot is worth a repaint. Keyed by
    /// collection name, at UI-refresh cadence, purely to avoid repaint
    /// storms when many documents change at once.
    pub fn route_snapshot(&self, key: StreamKey, now: f64) -> Action {
        if self
            .throttle
            .should_emit(key.collection(), now, self.snapshot_interval_s)
        {
            Action::Forward
        } else {
            Action::Suppress
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn event(data: Value) -> ChangeEvent {
        match data {
            Value::Object(map) => ChangeEvent::new("doc-1", map),
            _ => panic!("test document must be an object"),
        }
    }

    fn router(pose_interval_s: f64) -> EventRouter {
        EventRouter::new(
            Arc::new(ChangeFeedThrottle::new()),
            pose_interval_s,
            0.05,
        )
    }

    #[test]
    fn test_non_pose_events_always_forward() {
        let router = router(1.0);
        let status = event(json!({"robot_id": "agv-1", "status": "error"}));
        let partial = event(json!({"robot_id": "agv-1", "pose": {"x": 1.0}}));

        for i in 0..5 {
            let now = 1_000.0 + i as f64 * 0.01;
            assert_eq!(router.route(&status, now), Action::Forward);
            assert_eq!(router.route(&partial, now), Action::Forward);
        }
    }

    #[test]
    fn test_pose_events_are_throttled_per_robot() {
        let router = router(1.0);
        let one = event(json!({"robot_id": "agv-1", "pose": {"x": 1.0, "y": 2.0}}));
        let two = event(json!({"robot_id": "agv-2", "pose": {"x": 3.0, "y": 4.0}}));
        let t0 = 1_000.0;

        assert_eq!(router.route(&one, t0), Action::Forward);
        assert_eq!(router.route(&one, t0 + 0.5), Action::Suppress);
        assert_eq!(router.route(&two, t0 + 0.5), Action::Forward);
        assert_eq!(router.route(&one, t0 + 1.0), Action::Forward);
    }

    #[test]
    fn test_zero_interval_forwards_every_pose() {
        let router = router(0.0);
        let pose = event(json!({"robot_id": "agv-1", "pose": {"x": 1.0, "y": 2.0}}));

        for i in 0..5 {
            assert_eq!(router.route(&pose, 1_000.0 + i as f64 * 0.001), Action::Forward);
        }
    }

    #[test]
    fn test_snapshot_routing_keys_by_collection() {
        let router = router(1.0);
        let t0 = 1_000.0;

        assert_eq!(router.route_snapshot(StreamKey::Robots, t0), Action::Forward);
        assert_eq!(
            router.route_snapshot(StreamKey::Robots, t0 + 0.01),
            Action::Suppress
        );
        // A different collection has its own cadence.
        assert_eq!(router.route_snapshot(StreamKey::Tasks, t0 + 0.01), Action::Forward);
        assert_eq!(
            router.route_snapshot(StreamKey::Robots, t0 + 0.05),
            Action::Forward
        );
    }

    #[test]
    fn test_routers_share_one_throttle() {
        let throttle = Arc::new(ChangeFeedThrottle::new());
        let a = EventRouter::new(throttle.clone(), 1.0, 0.05);
        let b = EventRouter::new(throttle, 1.0, 0.05);
        let pose = event(json!({"robot_id": "agv-1", "pose": {"x": 1.0, "y": 2.0}}));
        let t0 = 1_000.0;

        assert_eq!(a.route(&pose, t0), Action::Forward);
        // The second router sees the emission recorded by the first.
        assert_eq!(b.route(&pose, t0 + 0.5), Action::Suppress);
    }
}
