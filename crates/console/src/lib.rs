//! Operator console runtime for a small AGV fleet.
//!
//! Glues the detection crate and the feed-ingest crate into one binary: a
//! camera-to-preview vision pipeline, a live document feed with pose
//! throttling, and an audited control-command path. The [`demo`] module
//! wires everything to synthetic sources so the whole loop runs with no
//! hardware attached.

pub mod cli;
pub mod command;
pub mod config;
pub mod demo;
pub mod telemetry;
pub mod vision;
