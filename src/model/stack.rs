//! Consolidation output: stacks and the consolidated result

use super::mapping::{MappingResult, Network, Service, SourceResource, Volume};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

crate::define_label_enum! {
    /// Target stack a resource is consolidated into.
    ///
    /// Declaration order doubles as the stable ordering used when dependencies do not decide.
    StackType {
        Database => "database" : "Database",
        Cache => "cache" : "Cache",
        Messaging => "messaging" : "Messaging",
        Auth => "auth" : "Auth" | "identity",
        Storage => "storage" : "Storage",
        Secrets => "secrets" : "Secrets",
        Compute => "compute" : "Compute" | "functions",
        Observability => "observability" : "Observability" | "monitoring",
        Passthrough => "passthrough" : "Passthrough",
    }
}

impl StackType {
    /// Consolidated stack types get merged; passthrough resources stay individual.
    pub fn is_consolidated(&self) -> bool {
        !matches!(self, StackType::Passthrough)
    }

    pub fn consolidated() -> impl Iterator<Item = StackType> {
        Self::all_variants()
            .iter()
            .copied()
            .filter(StackType::is_consolidated)
    }
}

/// A synthesized, deployable unit built from one or more source resources
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stack {
    pub stack_type: StackType,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub services: Vec<Service>,
    /// Relative file path -> file body
    #[serde(default)]
    pub configs: BTreeMap<String, String>,
    #[serde(default)]
    pub scripts: BTreeMap<String, String>,
    #[serde(default)]
    pub volumes: Vec<Volume>,
    #[serde(default)]
    pub networks: Vec<Network>,
    #[serde(default)]
    pub depends_on: BTreeSet<StackType>,
    #[serde(default)]
    pub source_resources: Vec<SourceResource>,
    #[serde(default)]
    pub warnings: Vec<String>,
    #[serde(default)]
    pub manual_steps: Vec<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl Stack {
    pub fn new(stack_type: StackType, name: impl Into<String>) -> Self {
        Self {
            stack_type,
            name: name.into(),
            description: String::new(),
            services: Vec::new(),
            configs: BTreeMap::new(),
            scripts: BTreeMap::new(),
            volumes: Vec::new(),
            networks: Vec::new(),
            depends_on: BTreeSet::new(),
            source_resources: Vec::new(),
            warnings: Vec::new(),
            manual_steps: Vec::new(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn add_service(&mut self, service: Service) {
        self.services.push(service);
    }

    pub fn add_config(&mut self, path: impl Into<String>, body: impl Into<String>) {
        self.configs.insert(path.into(), body.into());
    }

    pub fn add_script(&mut self, path: impl Into<String>, body: impl Into<String>) {
        self.scripts.insert(path.into(), body.into());
    }

    /// Adds a volume unless one with the same name exists.
    pub fn add_volume(&mut self, volume: Volume) {
        if !self.volumes.iter().any(|v| v.name == volume.name) {
            self.volumes.push(volume);
        }
    }

    /// Adds a network unless one with the same name exists.
    pub fn add_network(&mut self, network: Network) {
        if !self.networks.iter().any(|n| n.name == network.name) {
            self.networks.push(network);
        }
    }

    pub fn add_dependency(&mut self, stack_type: StackType) {
        if stack_type != self.stack_type {
            self.depends_on.insert(stack_type);
        }
    }

    pub fn add_source(&mut self, result: &MappingResult) {
        self.source_resources.push(result.source_resource());
    }

    pub fn add_warning(&mut self, warning: impl Into<String>) {
        let warning = warning.into();
        if !self.warnings.contains(&warning) {
            self.warnings.push(warning);
        }
    }

    pub fn add_manual_step(&mut self, step: impl Into<String>) {
        let step = step.into();
        if !self.manual_steps.contains(&step) {
            self.manual_steps.push(step);
        }
    }

    pub fn set_metadata(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.metadata.insert(key.into(), value.into());
    }

    pub fn service(&self, name: &str) -> Option<&Service> {
        self.services.iter().find(|s| s.name == name)
    }

    pub fn service_count(&self) -> usize {
        self.services.len()
    }
}

/// Summary numbers for reporting. Never drives generation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConsolidationMetadata {
    pub total_resources: usize,
    pub total_stacks: usize,
    pub total_services: usize,
    pub passthrough_count: usize,
    /// Source resources per generated service, never below 1.0
    pub consolidation_ratio: f64,
    #[serde(default)]
    pub by_provider: BTreeMap<String, usize>,
    #[serde(default)]
    pub by_category: BTreeMap<String, usize>,
    #[serde(default)]
    pub by_stack_type: BTreeMap<String, usize>,
}

impl ConsolidationMetadata {
    pub fn ratio(total_resources: usize, total_services: usize) -> f64 {
        if total_services == 0 {
            return 1.0;
        }
        (total_resources as f64 / total_services as f64).max(1.0)
    }
}

/// The terminal artifact of one consolidation run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConsolidatedResult {
    /// Dependency ordered: every stack follows the stacks it depends on
    pub stacks: Vec<Stack>,
    pub passthrough: Vec<MappingResult>,
    pub warnings: Vec<String>,
    pub manual_steps: Vec<String>,
    pub metadata: ConsolidationMetadata,
}

impl ConsolidatedResult {
    pub fn stack(&self, stack_type: StackType) -> Option<&Stack> {
        self.stacks.iter().find(|s| s.stack_type == stack_type)
    }

    pub fn has_stack(&self, stack_type: StackType) -> bool {
        self.stack(stack_type).is_some()
    }

    pub fn stack_names(&self) -> Vec<&str> {
        self.stacks.iter().map(|s| s.name.as_str()).collect()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stack_type_labels() {
        assert_eq!(StackType::Database.to_string(), "database");
        assert_eq!(StackType::from_name("identity"), Some(StackType::Auth));
        assert_eq!(StackType::from_name("Observability"), Some(StackType::Observability));
        assert_eq!(StackType::from_name("mainframe"), None);
    }

    #[test]
    fn test_consolidated_stack_types() {
        let types: Vec<_> = StackType::consolidated().collect();
        assert_eq!(types.len(), 8);
        assert!(!types.contains(&StackType::Passthrough));
    }

    #[test]
    fn test_stack_deduplicates_volumes_and_steps() {
        let mut stack = Stack::new(StackType::Cache, "cache");
        stack.add_volume(Volume::named("redis-data"));
        stack.add_volume(Volume::named("redis-data"));
        stack.add_manual_step("Rotate credentials");
        stack.add_manual_step("Rotate credentials");
        stack.add_dependency(StackType::Cache);
        stack.add_dependency(StackType::Database);

        assert_eq!(stack.volumes.len(), 1);
        assert_eq!(stack.manual_steps.len(), 1);
        assert_eq!(
            stack.depends_on.iter().copied().collect::<Vec<_>>(),
            vec![StackType::Database]
        );
    }

    #[test]
    fn test_ratio_never_below_one() {
        assert_eq!(ConsolidationMetadata::ratio(10, 2), 5.0);
        assert_eq!(ConsolidationMetadata::ratio(1, 4), 1.0);
        assert_eq!(ConsolidationMetadata::ratio(3, 0), 1.0);
    }

    #[test]
    fn test_result_serializes_to_yaml_and_json() {
        let mut result = ConsolidatedResult::default();
        result.stacks.push(Stack::new(StackType::Storage, "storage"));

        let yaml = result.to_yaml().unwrap();
        assert!(yaml.contains("stack_type: storage"));

        let json = result.to_json().unwrap();
        let back: ConsolidatedResult = serde_json::from_str(&json).unwrap();
        assert_eq!(back, result);
    }
}
