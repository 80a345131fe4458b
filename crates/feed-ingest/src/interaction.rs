//! Audit records for operator-issued commands.
//!
//! Every manual command or task request gets one durable record, written
//! once through the outbound queue and never mutated. The record id doubles
//! as the document id.

use chrono::Utc;
use serde_json::{json, Map, Value};

/// Identity fields stamped into every audit record.
#[derive(Debug, Clone)]
pub struct OperatorIdentity {
    pub source: String,
    pub user_id: String,
    pub robot_id: String,
}

impl Default for OperatorIdentity {
    fn default() -> Self {
        Self {
            source: "hmi_console".to_string(),
            user_id: "operator_01".to_string(),
            robot_id: "agv1".to_string(),
        }
    }
}

/// Builds audit records for operator interactions.
#[derive(Debug, Clone)]
pub struct InteractionLogger {
    identity: OperatorIdentity,
}

impl InteractionLogger {
    pub fn new(identity: OperatorIdentity) -> Self {
        Self { identity }
    }

    pub fn identity(&self) -> &OperatorIdentity {
        &self.identity
    }

    /// Unique id for one interaction: a microsecond-resolution timestamp
    /// composed with user, kind, and robot. Sub-millisecond repeats of the
    /// same kind are the only collision risk at manual control rates.
    pub fn new_id(&self, kind: &str) -> String {
        let stamp = Utc::now().format("%Y%m%d_%H%M%S_%6f");
        format!(
            "it_{stamp}_{}_{}_{}",
            self.identity.user_id, kind, self.identity.robot_id
        )
    }

    /// Record for a control interaction: the operator's raw input, the
    /// parsed command, and the publish outcome.
    pub fn control_record(
        &self,
        interaction_id: &str,
        input_mode: &str,
        raw_input: &str,
        parsed: Value,
        result: &str,
        error: Option<&str>,
    ) -> Map<String, Value> {
        let ts_ms = Utc::now().timestamp_millis();
        let mut doc = Map::new();
        doc.insert("interaction_id".into(), json!(interaction_id));
        doc.insert("input_mode".into(), json!(input_mode));
        doc.insert("source".into(), json!(self.identity.source));
        doc.insert("user_id".into(), json!(self.identity.user_id));
        doc.insert("raw_input".into(), json!(raw_input));
        doc.insert("parsed".into(), parsed);
        doc.insert("result".into(), json!(result));
        doc.insert("error".into(), error.map_or(Value::Null, |e| json!(e)));
        doc.insert("ts".into(), json!(ts_ms));
        // No linked task yet, so the link timestamp is the record's own.
        doc.insert("linked_at".into(), json!(ts_ms));
        doc
    }

    /// Record for a plain publish such as a task request; `raw_input`
    /// carries the topic and payload as structured data.
    pub fn publish_record(
        &self,
        interaction_id: &str,
        input_mode: &str,
        raw_input: Value,
        result: &str,
        error: Option<&str>,
    ) -> Map<String, Value> {
        let ts_ms = Utc::now().timestamp_millis();
        let mut doc = Map::new();
        doc.insert("interaction_id".into(), json!(interaction_id));
        doc.insert("input_mode".into(), json!(input_mode));
        doc.insert("raw_input".into(), raw_input);
        doc.insert("parsed".into(), Value::Null);
        doc.insert("result".into(), json!(result));
        doc.insert("error".into(), error.map_or(Value::Null, |e| json!(e)));
        doc.insert("source".into(), json!(self.identity.source));
        doc.insert("user_id".into(), json!(self.identity.user_id));
        doc.insert("robot_id".into(), json!(self.identity.robot_id));
        doc.insert("ts".into(), json!(ts_ms));
        doc
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    fn logger() -> InteractionLogger {
        InteractionLogger::new(OperatorIdentity {
            source: "hmi_console".into(),
            user_id: "rpi_hmi_01".into(),
            robot_id: "agv1".into(),
        })
    }

    #[test]
    fn test_id_carries_every_component() {
        let id = logger().new_id("button");

        assert!(id.starts_with("it_"));
        assert!(id.ends_with("_rpi_hmi_01_button_agv1"));
        // it_YYYYMMDD_HHMMSS_ffffff_<user>_<kind>_<robot>
        let stamp = &id[3..id.len() - "_rpi_hmi_01_button_agv1".len()];
        assert_eq!(stamp.len(), 8 + 1 + 6 + 1 + 6);
    }

    #[test]
    fn test_consecutive_ids_differ() {
        let logger = logger();
        let first = logger.new_id("button");
        thread::sleep(Duration::from_millis(2));
        let second = logger.new_id("button");
        assert_ne!(first, second);
    }

    #[test]
    fn test_control_record_shape() {
        let logger = logger();
        let id = logger.new_id("button");
        let parsed = serde_json::json!({"mode": "move", "value": "fwd"});
        let doc = logger.control_record(&id, "button", "fwd", parsed.clone(), "sent", None);

        assert_eq!(doc["interaction_id"], serde_json::json!(id));
        assert_eq!(doc["input_mode"], serde_json::json!("button"));
        assert_eq!(doc["parsed"], parsed);
        assert_eq!(doc["result"], serde_json::json!("sent"));
        assert_eq!(doc["error"], Value::Null);
        assert_eq!(doc["ts"], doc["linked_at"]);
    }

    #[test]
    fn test_control_record_keeps_failure_reason() {
        let logger = logger();
        let id = logger.new_id("button");
        let doc = logger.control_record(
            &id,
            "button",
            "fwd",
            Value::Null,
            "fail",
            Some("MQTT_DISCONNECTED"),
        );

        assert_eq!(doc["result"], serde_json::json!("fail"));
        assert_eq!(doc["error"], serde_json::json!("MQTT_DISCONNECTED"));
    }

    #[test]
    fn test_publish_record_shape() {
        let logger = logger();
        let id = logger.new_id("task_request");
        let raw = serde_json::json!({"topic": "/task/request", "payload": {"goal": "Room_A"}});
        let doc = logger.publish_record(&id, "task_request", raw.clone(), "sent", None);

        assert_eq!(doc["raw_input"], raw);
        assert_eq!(doc["parsed"], Value::Null);
        assert_eq!(doc["robot_id"], serde_json::json!("agv1"));
        assert!(doc["ts"].is_i64());
    }
}
