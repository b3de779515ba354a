//! Per-resource input produced by the external resource mapper

use crate::taxonomy::{Category, Provider, ResourceType};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// A single source resource mapped into its intermediate, container-oriented form.
///
/// Consolidation never rewrites a `MappingResult`; passthrough copies are carried forward
/// unchanged apart from appended warnings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MappingResult {
    /// Exact infrastructure-as-code type identifier, e.g. `aws_sqs_queue`
    pub source_type: String,
    /// Resource name as declared in the source
    pub source_name: String,
    /// Provider-side identifier (ARN, self link, resource id)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_id: Option<String>,
    /// Category hint for types missing from the catalog
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_category: Option<Category>,
    /// Raw source attributes (engine, retention, password policy, ...)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<Service>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volumes: Vec<Volume>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub networks: Vec<Network>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub configs: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub scripts: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub policies: Vec<PolicyStatement>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub manual_steps: Vec<String>,
}

impl MappingResult {
    pub fn new(source_type: impl Into<String>, source_name: impl Into<String>) -> Self {
        Self {
            source_type: source_type.into(),
            source_name: source_name.into(),
            ..Default::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.source_id = Some(id.into());
        self
    }

    pub fn with_category(mut self, category: Category) -> Self {
        self.source_category = Some(category);
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn with_service(mut self, service: Service) -> Self {
        self.service = Some(service);
        self
    }

    pub fn with_policy(mut self, statement: PolicyStatement) -> Self {
        self.policies.push(statement);
        self
    }

    pub fn with_config(mut self, name: impl Into<String>, body: impl Into<String>) -> Self {
        self.configs.insert(name.into(), body.into());
        self
    }

    pub fn with_script(mut self, name: impl Into<String>, body: impl Into<String>) -> Self {
        self.scripts.insert(name.into(), body.into());
        self
    }

    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warnings.push(warning.into());
        self
    }

    pub fn with_manual_step(mut self, step: impl Into<String>) -> Self {
        self.manual_steps.push(step.into());
        self
    }

    /// Catalog entry for the source type, if the type is known.
    pub fn resource_type(&self) -> Option<ResourceType> {
        ResourceType::from_type_str(&self.source_type)
    }

    /// Catalog provider, falling back to the type identifier prefix.
    pub fn provider(&self) -> Option<Provider> {
        self.resource_type()
            .map(|t| t.provider())
            .or_else(|| Provider::from_type_prefix(&self.source_type))
    }

    /// Catalog category, falling back to the explicit hint.
    pub fn category(&self) -> Option<Category> {
        self.resource_type()
            .map(|t| t.category())
            .or(self.source_category)
    }

    pub fn attribute(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    pub fn attribute_str(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).and_then(Value::as_str)
    }

    /// Numeric attribute, accepting numbers and numeric strings.
    pub fn attribute_u64(&self, key: &str) -> Option<u64> {
        match self.attributes.get(key)? {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn attribute_bool(&self, key: &str) -> Option<bool> {
        match self.attributes.get(key)? {
            Value::Bool(b) => Some(*b),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// String list attribute; a single string is treated as a one-element list.
    pub fn attribute_list(&self, key: &str) -> Vec<String> {
        match self.attributes.get(key) {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
            Some(Value::String(s)) => vec![s.clone()],
            _ => Vec::new(),
        }
    }

    /// Environment hint from the synthesized service, if any.
    pub fn env(&self, key: &str) -> Option<&str> {
        self.service
            .as_ref()
            .and_then(|s| s.environment.get(key))
            .map(String::as_str)
    }

    pub fn source_resource(&self) -> SourceResource {
        SourceResource {
            resource_type: self.source_type.clone(),
            name: self.source_name.clone(),
            id: self.source_id.clone(),
            provider: self.provider(),
            category: self.category(),
        }
    }
}

/// Reference to an original resource folded into a stack
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceResource {
    pub resource_type: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<Provider>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<Category>,
}

/// Single-container service description
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Service {
    pub name: String,
    pub image: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub command: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub entrypoint: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub environment: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volumes: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub networks: Vec<String>,
    /// Service name -> compose condition (`service_started`, `service_healthy`, ...)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub depends_on: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub healthcheck: Option<HealthCheck>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restart: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deploy: Option<Deploy>,
    #[serde(default)]
    pub read_only: bool,
}

impl Service {
    pub fn new(name: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            image: image.into(),
            restart: Some("unless-stopped".to_string()),
            ..Default::default()
        }
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.environment.insert(key.into(), value.into());
        self
    }

    pub fn with_port(mut self, port: impl Into<String>) -> Self {
        self.ports.push(port.into());
        self
    }

    pub fn with_volume(mut self, mount: impl Into<String>) -> Self {
        self.volumes.push(mount.into());
        self
    }

    pub fn with_network(mut self, network: impl Into<String>) -> Self {
        let network = network.into();
        if !self.networks.contains(&network) {
            self.networks.push(network);
        }
        self
    }

    pub fn with_command<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.command = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_entrypoint<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.entrypoint = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    pub fn with_healthcheck(mut self, healthcheck: HealthCheck) -> Self {
        self.healthcheck = Some(healthcheck);
        self
    }

    pub fn depends_on(mut self, service: impl Into<String>, condition: impl Into<String>) -> Self {
        self.depends_on.insert(service.into(), condition.into());
        self
    }

    pub fn with_restart(mut self, policy: Option<&str>) -> Self {
        self.restart = policy.map(str::to_string);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthCheck {
    pub test: Vec<String>,
    pub interval: String,
    pub timeout: String,
    pub retries: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_period: Option<String>,
}

impl HealthCheck {
    /// `CMD-SHELL` check with compose-style defaults.
    pub fn shell(command: impl Into<String>) -> Self {
        Self {
            test: vec!["CMD-SHELL".to_string(), command.into()],
            interval: "10s".to_string(),
            timeout: "5s".to_string(),
            retries: 5,
            start_period: None,
        }
    }

    pub fn with_start_period(mut self, period: impl Into<String>) -> Self {
        self.start_period = Some(period.into());
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deploy {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<Resources>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resources {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limits: Option<ResourceSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reservations: Option<ResourceSpec>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpus: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Volume {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub driver: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

impl Volume {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            driver: None,
            labels: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Network {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub driver: Option<String>,
    #[serde(default)]
    pub internal: bool,
}

impl Network {
    pub fn bridge(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            driver: Some("bridge".to_string()),
            internal: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Effect {
    #[serde(alias = "allow", alias = "ALLOW")]
    Allow,
    #[serde(alias = "deny", alias = "DENY")]
    Deny,
}

/// One statement of a source access policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyStatement {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sid: Option<String>,
    pub effect: Effect,
    #[serde(default)]
    pub actions: Vec<String>,
    #[serde(default)]
    pub resources: Vec<String>,
}

impl PolicyStatement {
    pub fn allow<I, S>(actions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            sid: None,
            effect: Effect::Allow,
            actions: actions.into_iter().map(Into::into).collect(),
            resources: Vec::new(),
        }
    }

    pub fn deny<I, S>(actions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            effect: Effect::Deny,
            ..Self::allow(actions)
        }
    }

    pub fn with_sid(mut self, sid: impl Into<String>) -> Self {
        self.sid = Some(sid.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_known_type_resolves_provider_and_category() {
        let result = MappingResult::new("aws_sqs_queue", "orders");
        assert_eq!(result.resource_type(), Some(ResourceType::AwsSqsQueue));
        assert_eq!(result.provider(), Some(Provider::Aws));
        assert_eq!(result.category(), Some(Category::Queue));
    }

    #[test]
    fn test_unknown_type_uses_hints() {
        let result = MappingResult::new("google_future_cache", "c").with_category(Category::Cache);
        assert_eq!(result.resource_type(), None);
        assert_eq!(result.provider(), Some(Provider::Gcp));
        assert_eq!(result.category(), Some(Category::Cache));
    }

    #[test]
    fn test_attribute_accessors() {
        let result = MappingResult::new("aws_sqs_queue", "q")
            .with_attribute("message_retention_seconds", "345600")
            .with_attribute("fifo_queue", true)
            .with_attribute("callback_urls", json!(["https://a", "https://b"]))
            .with_attribute("engine", "postgres");

        assert_eq!(result.attribute_u64("message_retention_seconds"), Some(345_600));
        assert_eq!(result.attribute_bool("fifo_queue"), Some(true));
        assert_eq!(result.attribute_list("callback_urls").len(), 2);
        assert_eq!(result.attribute_list("engine"), vec!["postgres".to_string()]);
        assert_eq!(result.attribute_str("missing"), None);
    }

    #[test]
    fn test_env_hint() {
        let result = MappingResult::new("aws_db_instance", "orders")
            .with_service(Service::new("orders", "postgres:16").with_env("POSTGRES_DB", "orders_db"));
        assert_eq!(result.env("POSTGRES_DB"), Some("orders_db"));
        assert_eq!(result.env("MYSQL_DATABASE"), None);
    }

    #[test]
    fn test_mapping_result_deserializes_with_defaults() {
        let result: MappingResult = serde_json::from_value(json!({
            "source_type": "aws_secretsmanager_secret",
            "source_name": "db-password",
            "policies": [{ "effect": "Allow", "actions": ["secretsmanager:GetSecretValue"] }]
        }))
        .unwrap();

        assert_eq!(result.policies.len(), 1);
        assert_eq!(result.policies[0].effect, Effect::Allow);
        assert!(result.service.is_none());
        assert!(result.configs.is_empty());
    }

    #[test]
    fn test_service_builder() {
        let service = Service::new("redis", "redis:7-alpine")
            .with_port("6379:6379")
            .with_network("cache")
            .with_network("cache")
            .depends_on("init", "service_completed_successfully");

        assert_eq!(service.networks, vec!["cache".to_string()]);
        assert_eq!(service.restart.as_deref(), Some("unless-stopped"));
        assert_eq!(
            service.depends_on.get("init").map(String::as_str),
            Some("service_completed_successfully")
        );
    }
}
