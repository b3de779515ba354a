//! Monitoring and logging resources folded into a metrics, logs, dashboards and alerting quartet
//!
//! The quartet is infrastructure: it is emitted whole however many sources there are. Alarms
//! become alert rule stubs whose expression must be completed by hand.

use super::common::{self, NameAllocator};
use super::{MergeContext, MergeOptions, Merger};
use crate::error::MergeError;
use crate::model::{HealthCheck, MappingResult, Service, Stack, StackType, Volume};
use crate::taxonomy::{Category, ResourceType};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use tracing::debug;

pub const PROMETHEUS_CONFIG: &str = "observability/prometheus.yml";
pub const ALERT_RULES: &str = "observability/rules/alerts.yml";
pub const LOKI_CONFIG: &str = "observability/loki.yml";
pub const ALERTMANAGER_CONFIG: &str = "observability/alertmanager.yml";
pub const DATASOURCES: &str = "observability/grafana/provisioning/datasources/datasources.yml";
pub const DASHBOARD_PROVIDER: &str = "observability/grafana/provisioning/dashboards/dashboards.yml";
pub const DASHBOARDS_DIR: &str = "observability/grafana/dashboards";

/// Expression that never fires; stands in until the real one is written
pub const PLACEHOLDER_EXPR: &str = "vector(0) > 1";
pub const DEFAULT_RETENTION_DAYS: u64 = 31;

pub struct ObservabilityMerger;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRule {
    pub alert: String,
    pub expr: String,
    #[serde(rename = "for")]
    pub for_duration: String,
    pub labels: BTreeMap<String, String>,
    pub annotations: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleGroup {
    pub name: String,
    pub rules: Vec<AlertRule>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleFile {
    pub groups: Vec<RuleGroup>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Alarm,
    Dashboard,
    LogStore,
    Other,
}

fn kind_of(result: &MappingResult) -> Kind {
    match result.resource_type() {
        Some(ResourceType::AwsCloudwatchMetricAlarm)
        | Some(ResourceType::GoogleMonitoringAlertPolicy)
        | Some(ResourceType::AzurermMonitorMetricAlert) => Kind::Alarm,
        Some(ResourceType::AwsCloudwatchDashboard) | Some(ResourceType::GoogleMonitoringDashboard) => {
            Kind::Dashboard
        }
        _ if result.attribute_str("metric_name").is_some() => Kind::Alarm,
        _ if result.category() == Some(Category::Logging) => Kind::LogStore,
        _ => Kind::Other,
    }
}

/// PascalCase alert name; Prometheus names must start with a letter.
fn alert_name(raw: &str) -> String {
    let name: String = common::normalize_name(raw)
        .split('-')
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect();
    if name.starts_with(|c: char| c.is_ascii_digit()) {
        format!("Alert{}", name)
    } else {
        name
    }
}

/// Source metric identity, e.g. `AWS/EC2:CPUUtilization`.
fn source_metric(result: &MappingResult) -> String {
    let metric = result
        .attribute_str("metric_name")
        .or_else(|| result.attribute_str("metric"))
        .or_else(|| result.attribute_str("filter"))
        .unwrap_or("unknown");
    match result.attribute_str("namespace") {
        Some(namespace) => format!("{}:{}", namespace, metric),
        None => metric.to_string(),
    }
}

fn alert_rule(result: &MappingResult, name: String) -> AlertRule {
    let seconds = match (result.attribute_u64("period"), result.attribute_u64("evaluation_periods")) {
        (Some(period), Some(periods)) => period.saturating_mul(periods),
        (Some(period), None) => period,
        _ => 300,
    };

    let mut labels = BTreeMap::new();
    labels.insert(
        "severity".to_string(),
        result.attribute_str("severity").unwrap_or("warning").to_lowercase(),
    );

    let mut annotations = BTreeMap::new();
    annotations.insert("summary".to_string(), format!("Migrated alarm {}", result.source_name));
    annotations.insert("source_metric".to_string(), source_metric(result));
    if let (Some(op), Some(threshold)) = (
        result.attribute_str("comparison_operator"),
        result.attribute("threshold"),
    ) {
        annotations.insert("source_condition".to_string(), format!("{} {}", op, threshold));
    }

    AlertRule {
        alert: name,
        expr: PLACEHOLDER_EXPR.to_string(),
        for_duration: format!("{}s", seconds),
        labels,
        annotations,
    }
}

fn retention_days(result: &MappingResult) -> Option<u64> {
    result
        .attribute_u64("retention_in_days")
        .or_else(|| result.attribute_u64("retention_days"))
}

fn to_yaml<T: Serialize>(artifact: &str, value: &T) -> Result<String, MergeError> {
    serde_yaml::to_string(value).map_err(|e| MergeError::render(artifact, e))
}

fn prometheus_config(alertmanager: &str) -> serde_json::Value {
    json!({
        "global": { "scrape_interval": "15s", "evaluation_interval": "15s" },
        "rule_files": ["/etc/prometheus/rules/*.yml"],
        "alerting": {
            "alertmanagers": [{ "static_configs": [{ "targets": [format!("{}:9093", alertmanager)] }] }]
        },
        "scrape_configs": [
            { "job_name": "prometheus", "static_configs": [{ "targets": ["localhost:9090"] }] }
        ]
    })
}

fn loki_config(retention_hours: u64) -> serde_json::Value {
    json!({
        "auth_enabled": false,
        "server": { "http_listen_port": 3100 },
        "common": {
            "path_prefix": "/loki",
            "replication_factor": 1,
            "ring": { "kvstore": { "store": "inmemory" } },
            "storage": { "filesystem": { "chunks_directory": "/loki/chunks", "rules_directory": "/loki/rules" } }
        },
        "schema_config": {
            "configs": [{
                "from": "2024-01-01",
                "store": "tsdb",
                "object_store": "filesystem",
                "schema": "v13",
                "index": { "prefix": "index_", "period": "24h" }
            }]
        },
        "compactor": { "working_directory": "/loki/compactor", "retention_enabled": true, "delete_request_store": "filesystem" },
        "limits_config": { "retention_period": format!("{}h", retention_hours) }
    })
}

fn alertmanager_config() -> serde_json::Value {
    json!({
        "route": { "receiver": "default", "group_by": ["alertname"], "group_wait": "30s", "repeat_interval": "4h" },
        "receivers": [{ "name": "default" }]
    })
}

fn datasources(prometheus: &str, loki: &str) -> serde_json::Value {
    json!({
        "apiVersion": 1,
        "datasources": [
            { "name": "Prometheus", "type": "prometheus", "access": "proxy", "url": format!("http://{}:9090", prometheus), "isDefault": true },
            { "name": "Loki", "type": "loki", "access": "proxy", "url": format!("http://{}:3100", loki) }
        ]
    })
}

fn dashboard_provider() -> serde_json::Value {
    json!({
        "apiVersion": 1,
        "providers": [{
            "name": "migrated",
            "type": "file",
            "options": { "path": "/var/lib/grafana/dashboards" }
        }]
    })
}

#[async_trait]
impl Merger for ObservabilityMerger {
    fn stack_type(&self) -> StackType {
        StackType::Observability
    }

    fn can_merge(&self, results: &[MappingResult]) -> bool {
        common::any_applicable(
            results,
            |t| matches!(t.category(), Category::Monitoring | Category::Logging),
            &["monitoring", "monitor", "alarm", "alert", "log", "logs", "logging", "metric", "dashboard"],
        )
    }

    async fn merge(
        &self,
        ctx: &MergeContext,
        results: &[MappingResult],
        opts: &MergeOptions,
    ) -> Result<Stack, MergeError> {
        ctx.check()?;
        if results.is_empty() {
            return Err(MergeError::NoMatchingResources {
                stack_type: StackType::Observability,
            });
        }

        let mut stack = common::new_stack(StackType::Observability, results, opts)
            .with_description("Metrics, logs, dashboards and alerting");
        let network = common::stack_network(opts, StackType::Observability);
        let prometheus = opts.prefixed("prometheus");
        let loki = opts.prefixed("loki");
        let grafana = opts.prefixed("grafana");
        let alertmanager = opts.prefixed("alertmanager");

        let mut alert_names = NameAllocator::with_separator("_");
        let mut dashboard_names = NameAllocator::new();
        let mut rules = Vec::new();
        let mut longest_retention: Option<u64> = None;

        for result in results {
            match kind_of(result) {
                Kind::Alarm => {
                    let name = alert_names.allocate(&alert_name(&result.source_name));
                    stack.set_metadata(format!("alert.{}", result.source_name), name.clone());
                    rules.push(alert_rule(result, name));
                }
                Kind::Dashboard => {
                    let name = dashboard_names.allocate(&common::normalize_name(&result.source_name));
                    let dashboard = json!({
                        "title": result.source_name,
                        "uid": name,
                        "tags": ["migrated"],
                        "panels": [],
                        "schemaVersion": 39
                    });
                    let path = format!("{}/{}.json", DASHBOARDS_DIR, name);
                    let body = serde_json::to_string_pretty(&dashboard)
                        .map_err(|e| MergeError::render(&path, e))?;
                    stack.add_config(path, body);
                }
                Kind::LogStore => {
                    if let Some(days) = retention_days(result) {
                        longest_retention = Some(longest_retention.map_or(days, |d| d.max(days)));
                    }
                }
                Kind::Other => {}
            }
        }
        debug!(alerts = rules.len(), "Converted alarms to alert rules");

        if !rules.is_empty() {
            stack.add_warning(format!(
                "{} alert rules use the placeholder expression '{}' and never fire until completed",
                rules.len(),
                PLACEHOLDER_EXPR
            ));
        }
        let retention = longest_retention.unwrap_or(DEFAULT_RETENTION_DAYS);
        stack.set_metadata("alerts", rules.len().to_string());
        stack.set_metadata("log_retention_days", retention.to_string());

        let rule_file = RuleFile {
            groups: vec![RuleGroup {
                name: "migrated-alarms".to_string(),
                rules,
            }],
        };
        stack.add_config(ALERT_RULES, to_yaml(ALERT_RULES, &rule_file)?);
        stack.add_config(PROMETHEUS_CONFIG, to_yaml(PROMETHEUS_CONFIG, &prometheus_config(&alertmanager))?);
        stack.add_config(LOKI_CONFIG, to_yaml(LOKI_CONFIG, &loki_config(retention.saturating_mul(24)))?);
        stack.add_config(ALERTMANAGER_CONFIG, to_yaml(ALERTMANAGER_CONFIG, &alertmanager_config())?);
        stack.add_config(DATASOURCES, to_yaml(DATASOURCES, &datasources(&prometheus, &loki))?);
        stack.add_config(DASHBOARD_PROVIDER, to_yaml(DASHBOARD_PROVIDER, &dashboard_provider())?);

        stack.add_service(
            Service::new(&prometheus, "prom/prometheus:v2.51.0")
                .with_port("9090:9090")
                .with_volume(format!("./{}:/etc/prometheus/prometheus.yml:ro", PROMETHEUS_CONFIG))
                .with_volume("./observability/rules:/etc/prometheus/rules:ro")
                .with_volume(format!("{}-data:/prometheus", prometheus))
                .with_network(&network)
                .with_healthcheck(HealthCheck::shell("wget -qO- http://localhost:9090/-/ready")),
        );
        stack.add_service(
            Service::new(&loki, "grafana/loki:2.9.6")
                .with_command(["-config.file=/etc/loki/loki.yml"])
                .with_port("3100:3100")
                .with_volume(format!("./{}:/etc/loki/loki.yml:ro", LOKI_CONFIG))
                .with_volume(format!("{}-data:/loki", loki))
                .with_network(&network),
        );
        stack.add_service(
            Service::new(&grafana, "grafana/grafana:10.4.1")
                .with_port("3000:3000")
                .with_env("GF_SECURITY_ADMIN_PASSWORD", "${GRAFANA_PASSWORD:-changeme}")
                .with_volume("./observability/grafana/provisioning:/etc/grafana/provisioning:ro")
                .with_volume(format!("./{}:/var/lib/grafana/dashboards:ro", DASHBOARDS_DIR))
                .with_network(&network)
                .depends_on(&prometheus, "service_started")
                .depends_on(&loki, "service_started"),
        );
        stack.add_service(
            Service::new(&alertmanager, "prom/alertmanager:v0.27.0")
                .with_port("9093:9093")
                .with_volume(format!("./{}:/etc/alertmanager/alertmanager.yml:ro", ALERTMANAGER_CONFIG))
                .with_network(&network),
        );
        stack.add_volume(Volume::named(format!("{}-data", prometheus)));
        stack.add_volume(Volume::named(format!("{}-data", loki)));

        common::absorb_sources(&mut stack, results);

        stack.add_manual_step(format!(
            "Complete every alert expression in {}; the source metric is kept in the source_metric annotation",
            ALERT_RULES
        ));
        stack.add_manual_step("Expose Prometheus metrics from services and ship their logs to Loki");
        stack.add_manual_step("Configure Alertmanager receivers to match the source notification targets");
        Ok(stack)
    }
}
