//! Outbound command gateway and its audit trail.
//!
//! Every control interaction is auditable: the gateway builds the wire
//! payload, attempts delivery, and returns the audit record to persist
//! regardless of the outcome.

use anyhow::{Result, bail};
use chrono::Utc;
use clap::Args;
use serde_json::{Map, Value, json};
use thiserror::Error;
use tracing::{info, warn};

use feed_ingest::{InteractionLogger, OperatorIdentity};

use crate::telemetry;

/// Error code recorded in the audit trail when the fleet link is down,
/// matching what downstream dashboards already filter on.
const DISCONNECTED_CODE: &str = "MQTT_DISCONNECTED";

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("command link is not connected")]
    NotConnected,
    #[error("failed to publish to {topic}: {reason}")]
    Publish { topic: String, reason: String },
}

/// Transport used to push commands at robots, typically an MQTT link.
pub trait CommandBus: Send {
    fn connected(&self) -> bool;

    fn publish(&mut self, topic: &str, payload: &Value) -> Result<(), CommandError>;
}

/// One drive command addressed to a robot.
#[derive(Clone, Debug)]
pub struct ControlCommand {
    pub robot_id: String,
    pub mode: String,
    pub direction: Option<String>,
    pub value: f64,
    /// Operator slider position, 0-100.
    pub speed_percent: u32,
}

impl ControlCommand {
    pub fn topic(&self) -> String {
        format!("/robot/{}/cmd", self.robot_id)
    }

    /// Wire payload; speed is rescaled from the 0-100 slider to 0-1.
    pub fn payload(&self) -> Value {
        json!({
            "mode": self.mode,
            "direction": self.direction,
            "value": self.value,
            "speed": f64::from(self.speed_percent) / 100.0,
            "ts": Utc::now().timestamp_millis(),
        })
    }
}

/// Result of one gateway dispatch: the audit record is produced whether or
/// not the command made it out.
pub struct CommandOutcome {
    pub interaction_id: String,
    pub record: Map<String, Value>,
    pub delivered: bool,
}

pub struct CommandGateway {
    bus: Box<dyn CommandBus>,
    logger: InteractionLogger,
}

impl CommandGateway {
    pub fn new(bus: Box<dyn CommandBus>, identity: OperatorIdentity) -> Self {
        Self {
            bus,
            logger: InteractionLogger::new(identity),
        }
    }

    /// Publish a control command and build its audit record. Delivery
    /// failures are recorded, never retried here.
    pub fn send_control(&mut self, command: &ControlCommand, input_mode: &str) -> CommandOutcome {
        let interaction_id = self.logger.new_id("control");
        let raw_input = command
            .direction
            .clone()
            .unwrap_or_else(|| command.mode.clone());
        let topic = command.topic();
        let payload = command.payload();

        let (result, error, delivered) = if !self.bus.connected() {
            warn!("Command link down; auditing {interaction_id} as failed");
            ("fail", Some(DISCONNECTED_CODE.to_string()), false)
        } else {
            match self.bus.publish(&topic, &payload) {
                Ok(()) => {
                    info!("Control command sent to {topic}: {raw_input}");
                    ("sent", None, true)
                }
                Err(err) => {
                    warn!("Publish to {topic} failed: {err}");
                    ("fail", Some(err.to_string()), false)
                }
            }
        };

        let record = self.logger.control_record(
            &interaction_id,
            input_mode,
            &raw_input,
            payload,
            result,
            error.as_deref(),
        );

        CommandOutcome {
            interaction_id,
            record,
            delivered,
        }
    }

    /// Publish a task request and build its audit record. A down link is
    /// its own result value here, not a failure code; dashboards count the
    /// two differently.
    pub fn send_task(&mut self, topic: &str, payload: &Value) -> CommandOutcome {
        let interaction_id = self.logger.new_id("task_request");
        let raw_input = json!({ "topic": topic, "payload": payload });

        let (result, error, delivered) = if !self.bus.connected() {
            warn!("Command link down; task publish skipped");
            (
                "mqtt_disconnected",
                Some("MQTT not connected".to_string()),
                false,
            )
        } else {
            match self.bus.publish(topic, payload) {
                Ok(()) => {
                    info!("Task request sent to {topic}");
                    ("sent", None, true)
                }
                Err(err) => {
                    warn!("Task publish to {topic} failed: {err}");
                    ("fail", Some(err.to_string()), false)
                }
            }
        };

        let record = self.logger.publish_record(
            &interaction_id,
            "task_request",
            raw_input,
            result,
            error.as_deref(),
        );

        CommandOutcome {
            interaction_id,
            record,
            delivered,
        }
    }
}

/// Command bus that logs publishes instead of hitting a broker. Stands in
/// for the fleet link in the demo wiring and the `send` subcommand.
pub struct LoggingCommandBus {
    connected: bool,
}

impl LoggingCommandBus {
    pub fn new(connected: bool) -> Self {
        Self { connected }
    }
}

impl CommandBus for LoggingCommandBus {
    fn connected(&self) -> bool {
        self.connected
    }

    fn publish(&mut self, topic: &str, payload: &Value) -> Result<(), CommandError> {
        if !self.connected {
            return Err(CommandError::NotConnected);
        }
        info!("publish {topic}: {payload}");
        Ok(())
    }
}

/// CLI flags accepted by the `send` subcommand.
#[derive(Debug, Args)]
pub struct SendArgs {
    /// Robot targeted by the command.
    #[arg(long = "robot", value_name = "ID", default_value = "agv1")]
    pub robot_id: String,
    /// Drive mode forwarded to the robot.
    #[arg(long = "mode", value_name = "MODE", default_value = "manual")]
    pub mode: String,
    /// Direction token (forward, back, left, right, stop).
    #[arg(long = "direction", value_name = "DIR")]
    pub direction: Option<String>,
    /// Magnitude applied to the direction.
    #[arg(long = "value", value_name = "N", default_value_t = 1.0)]
    pub value: f64,
    /// Speed slider position (0-100).
    #[arg(long = "speed", value_name = "PERCENT", default_value_t = 40)]
    pub speed: u32,
    /// Source tag stamped onto the audit record.
    #[arg(long = "operator-source", value_name = "TAG", default_value = "hmi_console")]
    pub operator_source: String,
    /// Operator user id stamped onto the audit record.
    #[arg(long = "operator", value_name = "USER_ID", default_value = "operator_01")]
    pub operator_user_id: String,
    /// Pretend the command link is down to exercise failure auditing.
    #[arg(long = "offline", action = clap::ArgAction::SetTrue)]
    pub offline: bool,
}

/// Encode, deliver, and audit one control command, printing the audit
/// record to stdout.
pub fn run_send(args: SendArgs) -> Result<()> {
    telemetry::init_logging(false);

    let identity = OperatorIdentity {
        source: args.operator_source,
        user_id: args.operator_user_id,
        robot_id: args.robot_id.clone(),
    };
    let command = ControlCommand {
        robot_id: args.robot_id,
        mode: args.mode,
        direction: args.direction,
        value: args.value,
        speed_percent: args.speed.min(100),
    };

    let mut gateway = CommandGateway::new(Box::new(LoggingCommandBus::new(!args.offline)), identity);
    let outcome = gateway.send_control(&command, "cli");

    println!(
        "{}",
        serde_json::to_string_pretty(&Value::Object(outcome.record))?
    );

    if !outcome.delivered {
        bail!("command {} was not delivered", outcome.interaction_id);
    }
    Ok(())
}
