//! Stack mergers
//!
//! A merger folds every resource classified into one stack type into a single [`Stack`].
//! Mergers are pure: each receives its own slice of the input and shares no mutable state,
//! so groups can be merged independently of one another.
//!
//! Shared behaviour lives in [`common`] as free functions; each merger implements
//! [`Merger`] directly.

use crate::error::MergeError;
use crate::model::{MappingResult, Stack, StackType};
use async_trait::async_trait;
use std::collections::BTreeSet;
use tokio_util::sync::CancellationToken;

pub mod auth;
pub mod cache;
pub mod common;
pub mod compute;
pub mod database;
pub mod messaging;
pub mod observability;
pub mod registry;
pub mod secrets;
pub mod storage;

pub use auth::AuthMerger;
pub use cache::CacheMerger;
pub use compute::ComputeMerger;
pub use database::DatabaseMerger;
pub use messaging::MessagingMerger;
pub use observability::ObservabilityMerger;
pub use registry::{MergerRegistry, StackDefinition, SupportService};
pub use secrets::SecretsMerger;
pub use storage::StorageMerger;

/// Strategy turning a group of same-kind resources into one stack
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Merger: Send + Sync {
    fn stack_type(&self) -> StackType;

    /// Quick applicability check over the group
    fn can_merge(&self, results: &[MappingResult]) -> bool;

    async fn merge(
        &self,
        ctx: &MergeContext,
        results: &[MappingResult],
        opts: &MergeOptions,
    ) -> Result<Stack, MergeError>;
}

/// Per-run context handed to mergers
#[derive(Debug, Clone, Default)]
pub struct MergeContext {
    cancel: CancellationToken,
}

impl MergeContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cancellation(cancel: CancellationToken) -> Self {
        Self { cancel }
    }

    pub fn token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn check(&self) -> Result<(), MergeError> {
        if self.is_cancelled() {
            Err(MergeError::Cancelled)
        } else {
            Ok(())
        }
    }
}

crate::define_label_enum! {
    /// Target engine for the consolidated database stack
    DatabaseEngine {
        Postgres => "postgres" : "PostgreSQL" | "postgresql" | "pg",
        Mysql => "mysql" : "MySQL",
        Mariadb => "mariadb" : "MariaDB",
    }
}

impl Default for DatabaseEngine {
    fn default() -> Self {
        DatabaseEngine::Postgres
    }
}

impl DatabaseEngine {
    /// Parses an engine name, falling back to PostgreSQL with a warning.
    pub fn parse_or_default(name: &str) -> (Self, Option<String>) {
        match Self::from_name(name.trim().to_lowercase().as_str()) {
            Some(engine) => (engine, None),
            None => (
                Self::default(),
                Some(format!(
                    "unknown database engine '{}'; using {}",
                    name,
                    Self::default()
                )),
            ),
        }
    }
}

crate::define_label_enum! {
    /// Broker model for the messaging stack. Only the queue/exchange model exists today.
    MessagingBroker {
        RabbitMq => "rabbitmq" : "RabbitMQ",
    }
}

impl Default for MessagingBroker {
    fn default() -> Self {
        MessagingBroker::RabbitMq
    }
}

impl MessagingBroker {
    pub fn parse_or_default(name: &str) -> (Self, Option<String>) {
        match Self::from_name(name.trim().to_lowercase().as_str()) {
            Some(broker) => (broker, None),
            None => (
                Self::default(),
                Some(format!(
                    "unknown messaging broker '{}'; using {}",
                    name,
                    Self::default()
                )),
            ),
        }
    }
}

/// What happens to stack types left out of `enabled_stacks`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DisabledStackPolicy {
    /// Still consolidated, but only through the registry's default stack
    #[default]
    DefaultSynthesis,
    /// Not consolidated at all; resources are kept as passthrough units
    Exclude,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MergeOptions {
    /// Stack types processed by their mergers; empty means all
    pub enabled_stacks: BTreeSet<StackType>,
    pub disabled_policy: DisabledStackPolicy,
    pub database_engine: DatabaseEngine,
    pub messaging_broker: MessagingBroker,
    /// Prepended to every generated stack and service name
    pub name_prefix: String,
    /// Emit optional sidecars such as connection poolers and web UIs
    pub include_support_services: bool,
    /// Warnings produced while resolving unrecognised option values
    pub fallback_warnings: Vec<String>,
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self {
            enabled_stacks: BTreeSet::new(),
            disabled_policy: DisabledStackPolicy::default(),
            database_engine: DatabaseEngine::default(),
            messaging_broker: MessagingBroker::default(),
            name_prefix: String::new(),
            include_support_services: true,
            fallback_warnings: Vec::new(),
        }
    }
}

impl MergeOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_enabled_stacks<I>(mut self, stacks: I) -> Self
    where
        I: IntoIterator<Item = StackType>,
    {
        self.enabled_stacks = stacks.into_iter().collect();
        self
    }

    /// Resolves stack names; unknown names are dropped with a warning.
    pub fn with_enabled_stack_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for name in names {
            let name = name.as_ref().trim();
            if name.is_empty() {
                continue;
            }
            match StackType::from_name(&name.to_lowercase()) {
                Some(stack_type) => {
                    self.enabled_stacks.insert(stack_type);
                }
                None => self
                    .fallback_warnings
                    .push(format!("unknown stack type '{}' ignored", name)),
            }
        }
        self
    }

    pub fn excluding_disabled(mut self) -> Self {
        self.disabled_policy = DisabledStackPolicy::Exclude;
        self
    }

    pub fn with_database_engine(mut self, engine: DatabaseEngine) -> Self {
        self.database_engine = engine;
        self
    }

    pub fn with_database_engine_name(mut self, name: &str) -> Self {
        let (engine, warning) = DatabaseEngine::parse_or_default(name);
        self.database_engine = engine;
        self.fallback_warnings.extend(warning);
        self
    }

    pub fn with_messaging_broker_name(mut self, name: &str) -> Self {
        let (broker, warning) = MessagingBroker::parse_or_default(name);
        self.messaging_broker = broker;
        self.fallback_warnings.extend(warning);
        self
    }

    pub fn with_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.name_prefix = prefix.into();
        self
    }

    pub fn with_support_services(mut self, include: bool) -> Self {
        self.include_support_services = include;
        self
    }

    pub fn is_enabled(&self, stack_type: StackType) -> bool {
        self.enabled_stacks.is_empty() || self.enabled_stacks.contains(&stack_type)
    }

    /// Applies the name prefix.
    pub fn prefixed(&self, name: &str) -> String {
        let prefix = self.name_prefix.trim_matches('-');
        if prefix.is_empty() {
            name.to_string()
        } else {
            format!("{}-{}", prefix, name)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options() {
        let opts = MergeOptions::default();
        assert!(opts.is_enabled(StackType::Database));
        assert_eq!(opts.database_engine, DatabaseEngine::Postgres);
        assert!(opts.include_support_services);
        assert_eq!(opts.prefixed("redis"), "redis");
    }

    #[test]
    fn test_name_prefix() {
        let opts = MergeOptions::new().with_name_prefix("prod");
        assert_eq!(opts.prefixed("redis"), "prod-redis");
    }

    #[test]
    fn test_enabled_stacks_restrict() {
        let opts = MergeOptions::new().with_enabled_stacks([StackType::Cache]);
        assert!(opts.is_enabled(StackType::Cache));
        assert!(!opts.is_enabled(StackType::Database));
    }

    #[test]
    fn test_unknown_engine_falls_back_with_warning() {
        let opts = MergeOptions::new().with_database_engine_name("oracle");
        assert_eq!(opts.database_engine, DatabaseEngine::Postgres);
        assert_eq!(opts.fallback_warnings.len(), 1);
        assert!(opts.fallback_warnings[0].contains("oracle"));

        let opts = MergeOptions::new().with_database_engine_name("MariaDB");
        assert_eq!(opts.database_engine, DatabaseEngine::Mariadb);
        assert!(opts.fallback_warnings.is_empty());
    }

    #[test]
    fn test_unknown_broker_falls_back_with_warning() {
        let opts = MergeOptions::new().with_messaging_broker_name("kafka");
        assert_eq!(opts.messaging_broker, MessagingBroker::RabbitMq);
        assert_eq!(opts.fallback_warnings.len(), 1);
    }

    #[test]
    fn test_enabled_stack_names() {
        let opts = MergeOptions::new().with_enabled_stack_names(["database", "queue", " cache "]);
        assert_eq!(opts.enabled_stacks.len(), 2);
        assert_eq!(opts.fallback_warnings, vec!["unknown stack type 'queue' ignored"]);
    }

    #[test]
    fn test_context_cancellation() {
        let token = CancellationToken::new();
        let ctx = MergeContext::with_cancellation(token.clone());
        assert!(ctx.check().is_ok());
        token.cancel();
        assert!(matches!(ctx.check(), Err(MergeError::Cancelled)));
    }
}
