//! Classifier coverage and resolution-order tests

use skyfold::classifier::coverage_gaps;
use skyfold::{audit_coverage, ClassificationRule, ResourceClassifier, ResourceType, StackType};
use yare::parameterized;

#[test]
fn test_every_catalog_type_resolves() {
    let classifier = ResourceClassifier::with_defaults();
    let report = audit_coverage(&classifier);

    assert!(report.is_complete(), "unresolved types: {:?}", report.missing);
    assert_eq!(report.missing_count(), 0);
    assert_eq!(report.total_types, ResourceType::all_variants().len());
    assert_eq!(coverage_gaps(), 0);
}

#[test]
fn test_audit_reports_gaps_for_empty_tables() {
    let report = audit_coverage(&ResourceClassifier::new());
    assert_eq!(report.missing_count(), report.total_types);
}

#[parameterized(
    rds = { "aws_db_instance", StackType::Database },
    cloud_sql = { "google_sql_database_instance", StackType::Database },
    elasticache = { "aws_elasticache_cluster", StackType::Cache },
    sqs = { "aws_sqs_queue", StackType::Messaging },
    pubsub = { "google_pubsub_topic", StackType::Messaging },
    kinesis = { "aws_kinesis_stream", StackType::Messaging },
    cognito = { "aws_cognito_user_pool", StackType::Auth },
    s3 = { "aws_s3_bucket", StackType::Storage },
    blob = { "azurerm_storage_container", StackType::Storage },
    secrets_manager = { "aws_secretsmanager_secret", StackType::Secrets },
    kms = { "aws_kms_key", StackType::Secrets },
    ssm_parameter = { "aws_ssm_parameter", StackType::Secrets },
    lambda = { "aws_lambda_function", StackType::Compute },
    cloud_run = { "google_cloud_run_service", StackType::Compute },
    alarm = { "aws_cloudwatch_metric_alarm", StackType::Observability },
    log_group = { "aws_cloudwatch_log_group", StackType::Observability },
    ec2 = { "aws_instance", StackType::Passthrough },
    eks = { "aws_eks_cluster", StackType::Passthrough },
    iam_role = { "aws_iam_role", StackType::Passthrough },
    vpc = { "aws_vpc", StackType::Passthrough },
    load_balancer = { "aws_lb", StackType::Passthrough },
    redshift = { "aws_redshift_cluster", StackType::Passthrough },
    dynamodb = { "aws_dynamodb_table", StackType::Passthrough },
    unknown = { "aws_quantum_annealer", StackType::Passthrough },
)]
fn test_default_classification(type_id: &str, expected: StackType) {
    assert_eq!(ResourceClassifier::with_defaults().classify(type_id), expected);
}

#[test]
fn test_category_labels_classify() {
    let classifier = ResourceClassifier::with_defaults();
    assert_eq!(classifier.classify("sql_database"), StackType::Database);
    assert_eq!(classifier.classify("networking"), StackType::Passthrough);
}

#[test]
fn test_explicit_passthrough_wins_over_everything() {
    let classifier = ResourceClassifier::with_defaults()
        .override_type("aws_db_instance", StackType::Cache)
        .mark_passthrough("aws_db_instance");

    let classification = classifier.explain("aws_db_instance");
    assert_eq!(classification.stack_type, StackType::Passthrough);
    assert_eq!(classification.rule, ClassificationRule::ExplicitPassthrough);
}

#[test]
fn test_type_override_wins_over_category_default() {
    let classification = ResourceClassifier::with_defaults().explain("aws_lambda_function");
    assert_eq!(classification.stack_type, StackType::Compute);
    assert_eq!(classification.rule, ClassificationRule::TypeOverride);
}

#[test]
fn test_unknown_type_uses_fallback_rule() {
    let classification = ResourceClassifier::with_defaults().explain("aws_quantum_annealer");
    assert_eq!(classification.rule, ClassificationRule::Fallback);
}
