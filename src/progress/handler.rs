//! Progress handler trait and events

use crate::model::StackType;
use std::time::Duration;

/// Events emitted while a consolidation run progresses
#[derive(Debug, Clone, PartialEq)]
pub enum ConsolidationEvent {
    /// Run started with the given number of accepted resources
    Started { resources: usize },

    /// A stack-type group is about to be processed
    GroupStarted {
        stack_type: StackType,
        resources: usize,
    },

    /// A merger produced the group's stack
    GroupMerged {
        stack_type: StackType,
        services: usize,
        elapsed: Duration,
    },

    /// The registry's default stack replaced the merger output
    FallbackUsed { stack_type: StackType, reason: String },

    /// Resources kept as individual units
    PassthroughAdded { count: usize },

    Completed {
        stacks: usize,
        passthrough: usize,
        total_time: Duration,
    },
}

/// Receives progress events; implementations must be cheap and must not block
pub trait ProgressHandler: Send + Sync {
    fn on_progress(&self, event: &ConsolidationEvent);
}

/// No-op handler that ignores all events
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpHandler;

impl ProgressHandler for NoOpHandler {
    fn on_progress(&self, _event: &ConsolidationEvent) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingHandler {
        count: Arc<AtomicUsize>,
    }

    impl ProgressHandler for CountingHandler {
        fn on_progress(&self, _event: &ConsolidationEvent) {
            self.count.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_noop_handler() {
        NoOpHandler.on_progress(&ConsolidationEvent::Started { resources: 3 });
    }

    #[test]
    fn test_progress_events() {
        let count = Arc::new(AtomicUsize::new(0));
        let handler = CountingHandler {
            count: count.clone(),
        };

        handler.on_progress(&ConsolidationEvent::Started { resources: 2 });
        handler.on_progress(&ConsolidationEvent::GroupStarted {
            stack_type: StackType::Cache,
            resources: 2,
        });
        handler.on_progress(&ConsolidationEvent::Completed {
            stacks: 1,
            passthrough: 0,
            total_time: Duration::from_millis(4),
        });

        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_event_debug() {
        let event = ConsolidationEvent::PassthroughAdded { count: 4 };
        let debug_str = format!("{:?}", event);
        assert!(debug_str.contains("PassthroughAdded"));
        assert!(debug_str.contains("count: 4"));
    }
}
