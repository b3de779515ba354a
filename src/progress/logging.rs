//! Logging-based progress handler

use super::{ConsolidationEvent, ProgressHandler};
use tracing::{debug, info, warn};

/// Handler that logs progress events using tracing
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingHandler;

impl ProgressHandler for LoggingHandler {
    fn on_progress(&self, event: &ConsolidationEvent) {
        match event {
            ConsolidationEvent::Started { resources } => {
                info!(resources, "Starting consolidation");
            }
            ConsolidationEvent::GroupStarted {
                stack_type,
                resources,
            } => {
                debug!(stack = %stack_type, resources, "Processing stack group");
            }
            ConsolidationEvent::GroupMerged {
                stack_type,
                services,
                elapsed,
            } => {
                info!(
                    stack = %stack_type,
                    services,
                    elapsed_ms = elapsed.as_millis(),
                    "Stack merged"
                );
            }
            ConsolidationEvent::FallbackUsed { stack_type, reason } => {
                warn!(stack = %stack_type, reason = %reason, "Using default stack");
            }
            ConsolidationEvent::PassthroughAdded { count } => {
                debug!(count, "Passthrough resources added");
            }
            ConsolidationEvent::Completed {
                stacks,
                passthrough,
                total_time,
            } => {
                info!(
                    stacks,
                    passthrough,
                    total_time_ms = total_time.as_millis(),
                    "Consolidation complete"
                );
            }
        }
    }
}
