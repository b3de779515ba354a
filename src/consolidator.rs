//! Consolidation orchestration
//!
//! Groups mapped resources by classified stack type, dispatches every group to its merger,
//! keeps passthrough resources as individual units and computes the summary metadata.
//! Only empty input and cancellation abort a run; every other failure degrades to the
//! registry's default stack plus a warning.

use crate::classifier::ResourceClassifier;
use crate::error::{ConsolidationError, MergeError};
use crate::merger::{DisabledStackPolicy, MergeContext, MergeOptions, MergerRegistry};
use crate::model::{ConsolidatedResult, ConsolidationMetadata, MappingResult, Stack, StackType};
use crate::ordering::order_stacks;
use crate::progress::{ConsolidationEvent, ProgressHandler};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub struct Consolidator {
    registry: Arc<MergerRegistry>,
    classifier: ResourceClassifier,
    progress_handler: Option<Arc<dyn ProgressHandler>>,
    cancel: CancellationToken,
}

impl Default for Consolidator {
    fn default() -> Self {
        Self::new(Arc::new(MergerRegistry::with_defaults()))
    }
}

impl Consolidator {
    pub fn new(registry: Arc<MergerRegistry>) -> Self {
        Self {
            registry,
            classifier: ResourceClassifier::with_defaults(),
            progress_handler: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_classifier(mut self, classifier: ResourceClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn with_progress(mut self, handler: Arc<dyn ProgressHandler>) -> Self {
        self.progress_handler = Some(handler);
        self
    }

    /// Cancelling the token aborts the run before the next stack group.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn registry(&self) -> &Arc<MergerRegistry> {
        &self.registry
    }

    pub fn classifier(&self) -> &ResourceClassifier {
        &self.classifier
    }

    fn emit(&self, event: ConsolidationEvent) {
        if let Some(handler) = &self.progress_handler {
            handler.on_progress(&event);
        }
    }

    pub async fn consolidate(
        &self,
        results: &[MappingResult],
        opts: &MergeOptions,
    ) -> Result<ConsolidatedResult, ConsolidationError> {
        let start = Instant::now();
        let ctx = MergeContext::with_cancellation(self.cancel.clone());
        let mut output = ConsolidatedResult {
            warnings: opts.fallback_warnings.clone(),
            ..Default::default()
        };

        let mut accepted = Vec::with_capacity(results.len());
        for result in results {
            if result.source_type.trim().is_empty() {
                warn!(resource = %result.source_name, "Skipping resource without a source type");
                output.warnings.push(format!(
                    "skipped resource '{}': empty source type",
                    result.source_name
                ));
            } else {
                accepted.push(result);
            }
        }
        if accepted.is_empty() {
            warn!(input = results.len(), "No resources could be mapped");
            return Err(ConsolidationError::NoResources);
        }

        info!(resources = accepted.len(), "Starting consolidation");
        self.emit(ConsolidationEvent::Started {
            resources: accepted.len(),
        });

        let groups = self.group(&accepted, opts, &mut output.warnings);

        let mut stacks = Vec::new();
        for (stack_type, group) in &groups {
            if ctx.is_cancelled() {
                warn!(stack = %stack_type, "Consolidation cancelled");
                return Err(ConsolidationError::Cancelled);
            }

            debug!(stack = %stack_type, resources = group.len(), "Processing stack group");
            self.emit(ConsolidationEvent::GroupStarted {
                stack_type: *stack_type,
                resources: group.len(),
            });

            if *stack_type == StackType::Passthrough {
                for result in group {
                    output.warnings.extend(
                        result
                            .warnings
                            .iter()
                            .map(|w| format!("{}: {}", result.source_name, w)),
                    );
                    push_unique(&mut output.manual_steps, result.manual_steps.iter().cloned());
                }
                output.passthrough.extend(group.iter().cloned());
                self.emit(ConsolidationEvent::PassthroughAdded { count: group.len() });
                continue;
            }

            let stack = self
                .merge_group(&ctx, *stack_type, group, opts, &mut output.warnings)
                .await?;
            output
                .warnings
                .extend(stack.warnings.iter().map(|w| format!("{}: {}", stack.name, w)));
            push_unique(&mut output.manual_steps, stack.manual_steps.iter().cloned());
            stacks.push(stack);
        }

        if ctx.is_cancelled() {
            return Err(ConsolidationError::Cancelled);
        }

        let order = order_stacks(stacks);
        for warning in order.warnings() {
            warn!(warning = %warning, "Stack ordering");
            output.warnings.push(warning);
        }
        output.stacks = order.stacks;
        output.metadata = metadata(&accepted, &groups, &output);

        info!(
            stacks = output.stacks.len(),
            passthrough = output.passthrough.len(),
            ratio = output.metadata.consolidation_ratio,
            "Consolidation complete"
        );
        self.emit(ConsolidationEvent::Completed {
            stacks: output.stacks.len(),
            passthrough: output.passthrough.len(),
            total_time: start.elapsed(),
        });

        Ok(output)
    }

    /// Buckets resources by stack type in stack-type order, applying the disabled-stack policy.
    fn group(
        &self,
        accepted: &[&MappingResult],
        opts: &MergeOptions,
        warnings: &mut Vec<String>,
    ) -> BTreeMap<StackType, Vec<MappingResult>> {
        let mut groups: BTreeMap<StackType, Vec<MappingResult>> = BTreeMap::new();
        let mut excluded: BTreeMap<StackType, usize> = BTreeMap::new();

        for result in accepted {
            let classification = self.classifier.classify_result(result);
            debug!(
                resource = %result.source_name,
                resource_type = %result.source_type,
                stack = %classification.stack_type,
                rule = ?classification.rule,
                "Classified resource"
            );

            let mut stack_type = classification.stack_type;
            if stack_type.is_consolidated()
                && !opts.is_enabled(stack_type)
                && opts.disabled_policy == DisabledStackPolicy::Exclude
            {
                *excluded.entry(stack_type).or_default() += 1;
                stack_type = StackType::Passthrough;
            }
            groups.entry(stack_type).or_default().push((*result).clone());
        }

        for (stack_type, count) in excluded {
            warnings.push(format!(
                "{} stack disabled; {} resources kept as passthrough",
                stack_type, count
            ));
        }
        groups
    }

    async fn merge_group(
        &self,
        ctx: &MergeContext,
        stack_type: StackType,
        group: &[MappingResult],
        opts: &MergeOptions,
        warnings: &mut Vec<String>,
    ) -> Result<Stack, ConsolidationError> {
        let started = Instant::now();

        if !opts.is_enabled(stack_type) {
            debug!(stack = %stack_type, "Stack type not enabled; using default stack");
            return Ok(self.fallback(stack_type, group, opts, "stack type not enabled"));
        }

        let Some(merger) = self.registry.get(stack_type) else {
            debug!(stack = %stack_type, "No merger registered; using default stack");
            return Ok(self.fallback(stack_type, group, opts, "no merger registered"));
        };

        if !merger.can_merge(group) {
            warn!(stack = %stack_type, resources = group.len(), "Merger declined group");
            warnings.push(format!(
                "{} merger declined {} resources; using default stack",
                stack_type,
                group.len()
            ));
            return Ok(self.fallback(stack_type, group, opts, "merger declined"));
        }

        match merger.merge(ctx, group, opts).await {
            Ok(stack) => {
                self.emit(ConsolidationEvent::GroupMerged {
                    stack_type,
                    services: stack.service_count(),
                    elapsed: started.elapsed(),
                });
                Ok(stack)
            }
            Err(MergeError::Cancelled) => Err(ConsolidationError::Cancelled),
            Err(e) => {
                warn!(stack = %stack_type, error = %e, "Merger failed; using default stack");
                warnings.push(format!("{} merger failed: {}; using default stack", stack_type, e));
                Ok(self.fallback(stack_type, group, opts, &e.to_string()))
            }
        }
    }

    fn fallback(
        &self,
        stack_type: StackType,
        group: &[MappingResult],
        opts: &MergeOptions,
        reason: &str,
    ) -> Stack {
        self.emit(ConsolidationEvent::FallbackUsed {
            stack_type,
            reason: reason.to_string(),
        });
        self.registry.create_default_stack(stack_type, group, opts)
    }
}

fn push_unique(target: &mut Vec<String>, items: impl IntoIterator<Item = String>) {
    for item in items {
        if !target.contains(&item) {
            target.push(item);
        }
    }
}

fn metadata(
    accepted: &[&MappingResult],
    groups: &BTreeMap<StackType, Vec<MappingResult>>,
    output: &ConsolidatedResult,
) -> ConsolidationMetadata {
    let mut meta = ConsolidationMetadata {
        total_resources: accepted.len(),
        total_stacks: output.stacks.len(),
        passthrough_count: output.passthrough.len(),
        ..Default::default()
    };

    let stack_services: usize = output.stacks.iter().map(Stack::service_count).sum();
    meta.total_services = stack_services + output.passthrough.len();
    meta.consolidation_ratio = ConsolidationMetadata::ratio(meta.total_resources, meta.total_services);

    for result in accepted {
        let provider = result
            .provider()
            .map(|p| p.as_str().to_string())
            .unwrap_or_else(|| "unknown".to_string());
        *meta.by_provider.entry(provider).or_default() += 1;

        let category = result
            .category()
            .map(|c| c.as_str().to_string())
            .unwrap_or_else(|| "unknown".to_string());
        *meta.by_category.entry(category).or_default() += 1;
    }
    for (stack_type, group) in groups {
        meta.by_stack_type
            .insert(stack_type.as_str().to_string(), group.len());
    }
    meta
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::merger::MockMerger;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingHandler {
        events: Mutex<Vec<ConsolidationEvent>>,
    }

    impl ProgressHandler for RecordingHandler {
        fn on_progress(&self, event: &ConsolidationEvent) {
            self.events
                .lock()
                .unwrap_or_else(|p| p.into_inner())
                .push(event.clone());
        }
    }

    fn failing_cache_merger() -> MockMerger {
        let mut mock = MockMerger::new();
        mock.expect_stack_type().return_const(StackType::Cache);
        mock.expect_can_merge().return_const(true);
        mock.expect_merge()
            .returning(|_, _, _| Err(MergeError::invalid("cache", "boom")));
        mock
    }

    #[tokio::test]
    async fn test_empty_input_fails() {
        let consolidator = Consolidator::default();
        let err = consolidator
            .consolidate(&[], &MergeOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ConsolidationError::NoResources));

        let err = consolidator
            .consolidate(&[MappingResult::new(" ", "blank")], &MergeOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ConsolidationError::NoResources));
    }

    #[tokio::test]
    async fn test_blank_type_skipped_with_warning() {
        let results = vec![
            MappingResult::new("", "blank"),
            MappingResult::new("aws_s3_bucket", "assets"),
        ];
        let result = Consolidator::default()
            .consolidate(&results, &MergeOptions::default())
            .await
            .unwrap();
        assert_eq!(result.metadata.total_resources, 1);
        assert!(result.warnings.iter().any(|w| w.contains("skipped resource 'blank'")));
    }

    #[tokio::test]
    async fn test_failing_merger_falls_back() {
        let registry = Arc::new(MergerRegistry::with_defaults());
        registry.register(Arc::new(failing_cache_merger()));

        let result = Consolidator::new(registry)
            .consolidate(
                &[MappingResult::new("aws_elasticache_cluster", "sessions")],
                &MergeOptions::default(),
            )
            .await
            .unwrap();

        let stack = result.stack(StackType::Cache).unwrap();
        assert_eq!(stack.metadata["synthesis"], "default");
        assert!(result
            .warnings
            .iter()
            .any(|w| w.starts_with("cache merger failed:") && w.ends_with("; using default stack")));
    }

    #[tokio::test]
    async fn test_declining_merger_falls_back() {
        let mut mock = MockMerger::new();
        mock.expect_stack_type().return_const(StackType::Cache);
        mock.expect_can_merge().return_const(false);
        mock.expect_merge().never();

        let registry = Arc::new(MergerRegistry::with_defaults());
        registry.register(Arc::new(mock));

        let result = Consolidator::new(registry)
            .consolidate(
                &[MappingResult::new("aws_elasticache_cluster", "sessions")],
                &MergeOptions::default(),
            )
            .await
            .unwrap();
        assert!(result.has_stack(StackType::Cache));
        assert!(result.warnings.iter().any(|w| w.contains("declined")));
    }

    #[tokio::test]
    async fn test_cancelled_before_first_group() {
        let token = CancellationToken::new();
        token.cancel();
        let err = Consolidator::default()
            .with_cancellation(token)
            .consolidate(
                &[MappingResult::new("aws_s3_bucket", "assets")],
                &MergeOptions::default(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ConsolidationError::Cancelled));
    }

    #[tokio::test]
    async fn test_disabled_stack_policies() {
        let results = vec![
            MappingResult::new("aws_s3_bucket", "assets"),
            MappingResult::new("aws_sqs_queue", "jobs"),
        ];
        let consolidator = Consolidator::default();

        let opts = MergeOptions::new().with_enabled_stacks([StackType::Storage]);
        let result = consolidator.consolidate(&results, &opts).await.unwrap();
        let messaging = result.stack(StackType::Messaging).unwrap();
        assert_eq!(messaging.metadata["synthesis"], "default");
        assert!(result.passthrough.is_empty());

        let opts = opts.excluding_disabled();
        let result = consolidator.consolidate(&results, &opts).await.unwrap();
        assert!(!result.has_stack(StackType::Messaging));
        assert_eq!(result.passthrough.len(), 1);
        assert!(result
            .warnings
            .iter()
            .any(|w| w == "messaging stack disabled; 1 resources kept as passthrough"));
    }

    #[tokio::test]
    async fn test_fallback_warnings_copied() {
        let opts = MergeOptions::new().with_database_engine_name("oracle");
        let result = Consolidator::default()
            .consolidate(&[MappingResult::new("aws_db_instance", "orders")], &opts)
            .await
            .unwrap();
        assert_eq!(result.warnings[0], "unknown database engine 'oracle'; using postgres");
    }

    #[tokio::test]
    async fn test_metadata_counts() {
        let results = vec![
            MappingResult::new("aws_db_instance", "orders"),
            MappingResult::new("aws_db_instance", "billing"),
            MappingResult::new("google_sql_database_instance", "users"),
            MappingResult::new("aws_vpc", "main"),
        ];
        let opts = MergeOptions::new().with_support_services(false);
        let result = Consolidator::default().consolidate(&results, &opts).await.unwrap();

        let meta = &result.metadata;
        assert_eq!(meta.total_resources, 4);
        assert_eq!(meta.total_stacks, 1);
        assert_eq!(meta.passthrough_count, 1);
        assert_eq!(meta.total_services, 2);
        assert_eq!(meta.consolidation_ratio, 2.0);
        assert_eq!(meta.by_provider["aws"], 3);
        assert_eq!(meta.by_provider["gcp"], 1);
        assert_eq!(meta.by_stack_type["database"], 3);
        assert_eq!(meta.by_stack_type["passthrough"], 1);
    }

    #[tokio::test]
    async fn test_progress_events_in_order() {
        let handler = Arc::new(RecordingHandler::default());
        let results = vec![
            MappingResult::new("aws_s3_bucket", "assets"),
            MappingResult::new("aws_vpc", "main"),
        ];
        Consolidator::default()
            .with_progress(handler.clone())
            .consolidate(&results, &MergeOptions::default())
            .await
            .unwrap();

        let events = handler.events.lock().unwrap();
        assert!(matches!(events[0], ConsolidationEvent::Started { resources: 2 }));
        assert!(events
            .iter()
            .any(|e| matches!(e, ConsolidationEvent::GroupMerged { stack_type: StackType::Storage, .. })));
        assert!(events
            .iter()
            .any(|e| matches!(e, ConsolidationEvent::PassthroughAdded { count: 1 })));
        assert!(matches!(events.last(), Some(ConsolidationEvent::Completed { stacks: 1, passthrough: 1, .. })));
    }
}
