//! Resource classification into stack types.
//!
//! Resolution order is fixed:
//!
//! 1. explicit passthrough type
//! 2. explicit type override
//! 3. category default
//! 4. passthrough fallback
//!
//! All tables are exact-key lookups. The classifier holds no state beyond its tables, so
//! `classify` is a pure function of them.

use crate::model::{MappingResult, StackType};
use crate::taxonomy::{Category, ResourceType};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Which tier decided a classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClassificationRule {
    ExplicitPassthrough,
    TypeOverride,
    CategoryDefault,
    Fallback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub stack_type: StackType,
    pub rule: ClassificationRule,
}

impl Classification {
    fn new(stack_type: StackType, rule: ClassificationRule) -> Self {
        Self { stack_type, rule }
    }
}

/// Categories whose members are never consolidated unless a type override says otherwise
const STRUCTURAL_CATEGORIES: &[Category] = &[
    Category::Compute,
    Category::Container,
    Category::Kubernetes,
    Category::Iam,
    Category::Networking,
    Category::LoadBalancer,
];

/// Types that sit in a consolidating category but cannot be folded safely
const UNMERGEABLE_TYPES: &[ResourceType] = &[
    ResourceType::AwsRedshiftCluster,
    ResourceType::GoogleSpannerInstance,
    ResourceType::AzurermMssqlServer,
    ResourceType::AzurermMssqlDatabase,
    ResourceType::AwsMskCluster,
    ResourceType::AwsKinesisFirehoseDeliveryStream,
    ResourceType::GoogleMemcacheInstance,
];

const TYPE_OVERRIDES: &[(ResourceType, StackType)] = &[
    (ResourceType::AwsLambdaFunction, StackType::Compute),
    (ResourceType::GoogleCloudfunctionsFunction, StackType::Compute),
    (ResourceType::GoogleCloudfunctions2Function, StackType::Compute),
    (ResourceType::GoogleCloudRunService, StackType::Compute),
    (ResourceType::GoogleCloudRunV2Service, StackType::Compute),
    (ResourceType::AzurermFunctionApp, StackType::Compute),
    (ResourceType::AzurermLinuxFunctionApp, StackType::Compute),
    (ResourceType::AzurermWindowsFunctionApp, StackType::Compute),
    (ResourceType::AwsSsmParameter, StackType::Secrets),
];

const CATEGORY_DEFAULTS: &[(Category, StackType)] = &[
    (Category::SqlDatabase, StackType::Database),
    (Category::Cache, StackType::Cache),
    (Category::Queue, StackType::Messaging),
    (Category::PubSub, StackType::Messaging),
    (Category::Stream, StackType::Messaging),
    (Category::EventBus, StackType::Messaging),
    (Category::Identity, StackType::Auth),
    (Category::ObjectStorage, StackType::Storage),
    (Category::Secrets, StackType::Secrets),
    (Category::KeyManagement, StackType::Secrets),
    (Category::Monitoring, StackType::Observability),
    (Category::Logging, StackType::Observability),
    (Category::Compute, StackType::Passthrough),
    (Category::Container, StackType::Passthrough),
    (Category::Kubernetes, StackType::Passthrough),
    (Category::BlockStorage, StackType::Passthrough),
    (Category::FileStorage, StackType::Passthrough),
    (Category::NoSqlDatabase, StackType::Passthrough),
    (Category::Configuration, StackType::Passthrough),
    (Category::Iam, StackType::Passthrough),
    (Category::Networking, StackType::Passthrough),
    (Category::LoadBalancer, StackType::Passthrough),
    (Category::Dns, StackType::Passthrough),
    (Category::Cdn, StackType::Passthrough),
    (Category::ApiGateway, StackType::Passthrough),
    (Category::Search, StackType::Passthrough),
    (Category::Analytics, StackType::Passthrough),
    (Category::Workflow, StackType::Passthrough),
];

#[derive(Debug, Clone, Default)]
pub struct ResourceClassifier {
    passthrough_types: HashSet<String>,
    type_overrides: HashMap<String, StackType>,
    category_defaults: HashMap<Category, StackType>,
}

impl ResourceClassifier {
    /// Empty classifier: everything falls back to passthrough.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_defaults() -> Self {
        let mut classifier = Self::new();

        for (category, stack_type) in CATEGORY_DEFAULTS {
            classifier.category_defaults.insert(*category, *stack_type);
        }

        for (resource_type, stack_type) in TYPE_OVERRIDES {
            classifier
                .type_overrides
                .insert(resource_type.as_str().to_string(), *stack_type);
        }

        for resource_type in ResourceType::all_variants() {
            let structural = STRUCTURAL_CATEGORIES.contains(&resource_type.category());
            let overridden = classifier.type_overrides.contains_key(resource_type.as_str());
            if structural && !overridden {
                classifier
                    .passthrough_types
                    .insert(resource_type.as_str().to_string());
            }
        }

        for resource_type in UNMERGEABLE_TYPES {
            classifier
                .passthrough_types
                .insert(resource_type.as_str().to_string());
        }

        classifier
    }

    pub fn mark_passthrough(mut self, type_id: impl Into<String>) -> Self {
        self.passthrough_types.insert(type_id.into());
        self
    }

    pub fn override_type(mut self, type_id: impl Into<String>, stack_type: StackType) -> Self {
        self.type_overrides.insert(type_id.into(), stack_type);
        self
    }

    pub fn set_category_default(mut self, category: Category, stack_type: StackType) -> Self {
        self.category_defaults.insert(category, stack_type);
        self
    }

    pub fn remove_category_default(mut self, category: Category) -> Self {
        self.category_defaults.remove(&category);
        self
    }

    /// Classifies a type identifier or a category label.
    pub fn classify(&self, type_or_category: &str) -> StackType {
        self.explain(type_or_category).stack_type
    }

    pub fn explain(&self, type_or_category: &str) -> Classification {
        let category = ResourceType::from_type_str(type_or_category)
            .map(|t| t.category())
            .or_else(|| Category::from_name(type_or_category));
        self.resolve(type_or_category, category)
    }

    /// Classifies a mapped resource; an unknown type falls back to the result's category hint.
    pub fn classify_result(&self, result: &MappingResult) -> Classification {
        self.resolve(&result.source_type, result.category())
    }

    pub fn classify_category(&self, category: Category) -> StackType {
        self.category_defaults
            .get(&category)
            .copied()
            .unwrap_or(StackType::Passthrough)
    }

    pub fn is_passthrough_type(&self, type_id: &str) -> bool {
        self.passthrough_types.contains(type_id)
    }

    fn resolve(&self, type_id: &str, category: Option<Category>) -> Classification {
        if self.passthrough_types.contains(type_id) {
            return Classification::new(
                StackType::Passthrough,
                ClassificationRule::ExplicitPassthrough,
            );
        }

        if let Some(stack_type) = self.type_overrides.get(type_id) {
            return Classification::new(*stack_type, ClassificationRule::TypeOverride);
        }

        if let Some(stack_type) = category.and_then(|c| self.category_defaults.get(&c)) {
            return Classification::new(*stack_type, ClassificationRule::CategoryDefault);
        }

        Classification::new(StackType::Passthrough, ClassificationRule::Fallback)
    }
}

/// Outcome of comparing the classifier's domain with the full taxonomy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoverageReport {
    pub total_types: usize,
    pub resolved_types: usize,
    /// Types only reachable through the passthrough fallback
    pub missing: Vec<ResourceType>,
    pub by_stack_type: Vec<(StackType, usize)>,
}

impl CoverageReport {
    pub fn missing_count(&self) -> usize {
        self.missing.len()
    }

    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }
}

/// Audits every catalog entry against the classifier tables.
///
/// A type counts as missing when no explicit rule or category default resolves it.
pub fn audit_coverage(classifier: &ResourceClassifier) -> CoverageReport {
    let mut missing = Vec::new();
    let mut counts: HashMap<StackType, usize> = HashMap::new();

    for resource_type in ResourceType::all_variants() {
        let classification = classifier.explain(resource_type.as_str());
        if classification.rule == ClassificationRule::Fallback {
            missing.push(*resource_type);
        }
        *counts.entry(classification.stack_type).or_insert(0) += 1;
    }

    let by_stack_type = StackType::all_variants()
        .iter()
        .map(|st| (*st, counts.get(st).copied().unwrap_or(0)))
        .collect();

    let total_types = ResourceType::all_variants().len();
    CoverageReport {
        total_types,
        resolved_types: total_types - missing.len(),
        missing,
        by_stack_type,
    }
}

/// Number of catalog types without a resolvable stack type under the default tables.
pub fn coverage_gaps() -> usize {
    audit_coverage(&ResourceClassifier::with_defaults()).missing_count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use yare::parameterized;

    #[parameterized(
        rds = { "aws_db_instance", StackType::Database },
        cloud_sql = { "google_sql_database_instance", StackType::Database },
        azure_pg = { "azurerm_postgresql_flexible_server", StackType::Database },
        elasticache = { "aws_elasticache_cluster", StackType::Cache },
        sqs = { "aws_sqs_queue", StackType::Messaging },
        sns = { "aws_sns_topic", StackType::Messaging },
        kinesis = { "aws_kinesis_stream", StackType::Messaging },
        event_bus = { "aws_cloudwatch_event_bus", StackType::Messaging },
        cognito = { "aws_cognito_user_pool", StackType::Auth },
        s3 = { "aws_s3_bucket", StackType::Storage },
        secrets_manager = { "aws_secretsmanager_secret", StackType::Secrets },
        kms = { "aws_kms_key", StackType::Secrets },
        ssm = { "aws_ssm_parameter", StackType::Secrets },
        lambda = { "aws_lambda_function", StackType::Compute },
        cloud_run = { "google_cloud_run_service", StackType::Compute },
        alarm = { "aws_cloudwatch_metric_alarm", StackType::Observability },
        log_group = { "aws_cloudwatch_log_group", StackType::Observability },
        ec2 = { "aws_instance", StackType::Passthrough },
        vpc = { "aws_vpc", StackType::Passthrough },
        iam = { "aws_iam_role", StackType::Passthrough },
        eks = { "aws_eks_cluster", StackType::Passthrough },
        dynamodb = { "aws_dynamodb_table", StackType::Passthrough },
        unknown = { "oci_core_instance", StackType::Passthrough },
    )]
    fn test_default_classification(type_id: &str, expected: StackType) {
        let classifier = ResourceClassifier::with_defaults();
        assert_eq!(classifier.classify(type_id), expected);
    }

    #[test]
    fn test_resolution_tiers() {
        let classifier = ResourceClassifier::with_defaults();

        assert_eq!(
            classifier.explain("aws_iam_role").rule,
            ClassificationRule::ExplicitPassthrough
        );
        assert_eq!(
            classifier.explain("aws_lambda_function").rule,
            ClassificationRule::TypeOverride
        );
        assert_eq!(
            classifier.explain("aws_sqs_queue").rule,
            ClassificationRule::CategoryDefault
        );
        assert_eq!(
            classifier.explain("something_else").rule,
            ClassificationRule::Fallback
        );
    }

    #[test]
    fn test_explicit_passthrough_beats_override_and_category() {
        let classifier = ResourceClassifier::with_defaults()
            .override_type("aws_redshift_cluster", StackType::Database);

        assert_eq!(classifier.classify("aws_redshift_cluster"), StackType::Passthrough);
        assert_eq!(classifier.classify("aws_msk_cluster"), StackType::Passthrough);
    }

    #[test]
    fn test_override_beats_category() {
        let classifier = ResourceClassifier::with_defaults()
            .override_type("aws_sns_topic", StackType::Observability);
        assert_eq!(classifier.classify("aws_sns_topic"), StackType::Observability);
    }

    #[test]
    fn test_classify_by_category_label() {
        let classifier = ResourceClassifier::with_defaults();
        assert_eq!(classifier.classify("cache"), StackType::Cache);
        assert_eq!(classifier.classify("object-storage"), StackType::Storage);
        assert_eq!(classifier.classify("networking"), StackType::Passthrough);
    }

    #[test]
    fn test_classify_result_uses_category_hint() {
        let classifier = ResourceClassifier::with_defaults();
        let hinted = MappingResult::new("aws_future_queue", "q").with_category(Category::Queue);
        let bare = MappingResult::new("aws_future_queue", "q");

        assert_eq!(
            classifier.classify_result(&hinted),
            Classification::new(StackType::Messaging, ClassificationRule::CategoryDefault)
        );
        assert_eq!(
            classifier.classify_result(&bare),
            Classification::new(StackType::Passthrough, ClassificationRule::Fallback)
        );
    }

    #[test]
    fn test_default_coverage_is_complete() {
        let report = audit_coverage(&ResourceClassifier::with_defaults());
        assert!(report.is_complete(), "missing: {:?}", report.missing);
        assert_eq!(report.resolved_types, report.total_types);
        assert_eq!(coverage_gaps(), 0);
    }

    #[test]
    fn test_coverage_reports_removed_category() {
        let classifier =
            ResourceClassifier::with_defaults().remove_category_default(Category::Dns);
        let report = audit_coverage(&classifier);

        assert_eq!(report.missing_count(), crate::taxonomy::types_in_category(Category::Dns).len());
        assert!(report.missing.contains(&ResourceType::AwsRoute53Zone));
    }

    #[test]
    fn test_empty_classifier_reports_every_type() {
        let report = audit_coverage(&ResourceClassifier::new());
        assert_eq!(report.missing_count(), report.total_types);
    }
}
