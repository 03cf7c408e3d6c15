//! Scenario-based tests for the release workflow

mod helpers;

mod dry_run;
mod fan_out;
mod publish_errors;
mod release_tag;
mod stage_gate;
mod trigger_gate;
mod upload_gating;
