//! Lambda Telemetry Workspace - end-to-end tests for invocation metadata.
//!
//! This is a virtual package that provides workspace-level integration tests.
//! The actual functionality is provided by the workspace member crates:
//!
//! - `lambda-telemetry-metadata`: Assembles and merges static, dynamic and
//!   required metadata for the log, metric and trace channels
//! - `lambda-telemetry-example`: Example Lambda handlers and runtimes for each
//!   channel, plus the sample invocation harness
