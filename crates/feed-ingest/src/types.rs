use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Robot position/orientation carried by pose-bearing events.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub x: f64,
    pub y: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub yaw: Option<f64>,
}

/// Logical streams served by the document store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamKey {
    Robots,
    Tasks,
    Events,
    Interactions,
}

impl StreamKey {
    pub const ALL: [StreamKey; 4] = [
        StreamKey::Robots,
        StreamKey::Tasks,
        StreamKey::Events,
        StreamKey::Interactions,
    ];

    /// Collection name in the document store.
    pub fn collection(&self) -> &'static str {
        match self {
            StreamKey::Robots => "robots",
            StreamKey::Tasks => "tasks",
            StreamKey::Events => "events",
            StreamKey::Interactions => "interaction",
        }
    }

    /// Timestamp fields tried in order when fetching recent documents.
    pub fn order_fields(&self) -> &'static [&'static str] {
        match self {
            StreamKey::Robots => &["updated_at", "ts"],
            StreamKey::Tasks => &["created_at", "started_at", "finished_at", "ts"],
            StreamKey::Events | StreamKey::Interactions => &["ts", "created_at"],
        }
    }

    /// Default snapshot/watch result limit. Events are append-only and
    /// noisy, so they get the largest window.
    pub fn default_limit(&self) -> usize {
        match self {
            StreamKey::Robots => 20,
            StreamKey::Tasks => 200,
            StreamKey::Events => 300,
            StreamKey::Interactions => 200,
        }
    }
}

/// One document as delivered by the change feed. The payload is kept as raw
/// JSON; typed accessors cover the fields the router cares about.
///
/// Immutable once received; lives for one dispatch cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    pub doc_id: String,
    pub data: Map<String, Value>,
}

impl ChangeEvent {
    pub fn new(doc_id: impl Into<String>, data: Map<String, Value>) -> Self {
        Self {
            doc_id: doc_id.into(),
            data,
        }
    }

    /// Owning robot id, with `"_"` standing in when the field is missing or
    /// empty so throttle keys stay well-formed.
    pub fn robot_id(&self) -> &str {
        self.data
            .get("robot_id")
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .unwrap_or("_")
    }

    /// An event is pose-like when its `pose` field is a mapping carrying
    /// both `x` and `y` keys. Only the keys matter here; numeric parsing is
    /// left to [`ChangeEvent::pose`].
    pub fn is_pose_like(&self) -> bool {
        match self.data.get("pose") {
            Some(Value::Object(pose)) => pose.contains_key("x") && pose.contains_key("y"),
            _ => false,
        }
    }

    /// Numeric pose, when present and well-formed.
    pub fn pose(&self) -> Option<Pose> {
        let pose = self.data.get("pose")?.as_object()?;
        Some(Pose {
            x: pose.get("x")?.as_f64()?,
            y: pose.get("y")?.as_f64()?,
            yaw: pose.get("yaw").and_then(Value::as_f64),
        })
    }

    /// Event timestamp as recorded by the producer (epoch seconds or ms).
    pub fn ts(&self) -> Option<f64> {
        self.data.get("ts").and_then(Value::as_f64)
    }
}

/// Itemized change inside a watch notification.
#[derive(Debug, Clone)]
pub enum FeedDelta {
    Added(ChangeEvent),
    Modified(ChangeEvent),
    Removed(String),
}

/// One notification from a live watch: the refreshed snapshot plus the
/// deltas that produced it.
#[derive(Debug, Clone)]
pub struct FeedNotification {
    pub key: StreamKey,
    pub snapshot: Vec<ChangeEvent>,
    pub deltas: Vec<FeedDelta>,
}

/// Messages the feed worker hands to the UI layer.
#[derive(Debug, Clone)]
pub enum FeedUpdate {
    /// Refreshed rows for one collection, already throttled to repaint
    /// cadence.
    Snapshot {
        key: StreamKey,
        rows: Vec<ChangeEvent>,
    },
    /// Single added event that passed the router.
    EventAdded(ChangeEvent),
    /// Outbound write landed.
    WriteOk { doc_id: String },
    /// Outbound write failed; never retried automatically, the caller
    /// decides whether to resubmit.
    WriteFailed { doc_id: String, error: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(data: Value) -> ChangeEvent {
        let Value::Object(map) = data else {
            panic!("test document must be an object");
        };
        ChangeEvent::new("doc-1", map)
    }

    #[test]
    fn test_pose_like_requires_both_keys() {
        assert!(event(json!({"pose": {"x": 1.0, "y": 2.0}})).is_pose_like());
        assert!(!event(json!({"pose": {"x": 1.0}})).is_pose_like());
        assert!(!event(json!({"pose": [1.0, 2.0]})).is_pose_like());
        assert!(!event(json!({"status": "error"})).is_pose_like());
    }

    #[test]
    fn test_pose_parses_optional_yaw() {
        let with_yaw = event(json!({"pose": {"x": 1.0, "y": 2.0, "yaw": 0.5}}));
        assert_eq!(
            with_yaw.pose(),
            Some(Pose {
                x: 1.0,
                y: 2.0,
                yaw: Some(0.5)
            })
        );

        let without_yaw = event(json!({"pose": {"x": 1.0, "y": 2.0}}));
        assert_eq!(without_yaw.pose().map(|p| p.yaw), Some(None));
    }

    #[test]
    fn test_robot_id_falls_back_to_placeholder() {
        assert_eq!(event(json!({"robot_id": "agv-7"})).robot_id(), "agv-7");
        assert_eq!(event(json!({"robot_id": ""})).robot_id(), "_");
        assert_eq!(event(json!({})).robot_id(), "_");
    }

    #[test]
    fn test_order_fields_cover_every_stream() {
        for key in StreamKey::ALL {
            assert!(!key.order_fields().is_empty());
            assert!(key.default_limit() > 0);
        }
    }
}
