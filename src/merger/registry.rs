use super::common;
use super::{
    AuthMerger, CacheMerger, ComputeMerger, DatabaseEngine, DatabaseMerger, MergeOptions, Merger,
    MessagingMerger, ObservabilityMerger, SecretsMerger, StorageMerger,
};
use crate::model::{HealthCheck, MappingResult, Service, Stack, StackType, Volume};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::debug;

/// Token in support-service environment values replaced by the prefixed primary service name
pub const PRIMARY_HOST: &str = "{primary}";

/// Optional sidecar emitted next to a stack's primary service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupportService {
    pub name: String,
    pub image: String,
    pub ports: Vec<String>,
    /// Values may reference the primary service through [`PRIMARY_HOST`]
    pub environment: BTreeMap<String, String>,
    pub description: String,
}

impl SupportService {
    pub fn new(name: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            image: image.into(),
            ports: Vec::new(),
            environment: BTreeMap::new(),
            description: String::new(),
        }
    }

    pub fn with_port(mut self, port: impl Into<String>) -> Self {
        self.ports.push(port.into());
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.environment.insert(key.into(), value.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// Static data used to synthesize a stack when no merger can
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackDefinition {
    pub stack_type: StackType,
    pub description: String,
    /// Name of the primary service before prefixing
    pub service_name: String,
    pub image: String,
    /// Compose style `host:container` mappings
    pub ports: Vec<String>,
    pub environment: BTreeMap<String, String>,
    /// Container path of the primary data volume
    pub data_path: Option<String>,
    pub healthcheck: Option<String>,
    pub depends_on: Vec<StackType>,
    pub support_services: Vec<SupportService>,
}

impl StackDefinition {
    pub fn new(
        stack_type: StackType,
        service_name: impl Into<String>,
        image: impl Into<String>,
    ) -> Self {
        Self {
            stack_type,
            description: String::new(),
            service_name: service_name.into(),
            image: image.into(),
            ports: Vec::new(),
            environment: BTreeMap::new(),
            data_path: None,
            healthcheck: None,
            depends_on: Vec::new(),
            support_services: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_port(mut self, port: impl Into<String>) -> Self {
        self.ports.push(port.into());
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.environment.insert(key.into(), value.into());
        self
    }

    pub fn with_data_path(mut self, path: impl Into<String>) -> Self {
        self.data_path = Some(path.into());
        self
    }

    pub fn with_healthcheck(mut self, command: impl Into<String>) -> Self {
        self.healthcheck = Some(command.into());
        self
    }

    pub fn depends_on(mut self, stack_type: StackType) -> Self {
        self.depends_on.push(stack_type);
        self
    }

    pub fn with_support(mut self, support: SupportService) -> Self {
        self.support_services.push(support);
        self
    }

    /// Primary service for this definition, prefixed and attached to the stack network.
    pub fn primary_service(&self, opts: &MergeOptions) -> Service {
        let name = opts.prefixed(&self.service_name);
        let mut service = Service::new(&name, &self.image)
            .with_network(common::stack_network(opts, self.stack_type));
        for port in &self.ports {
            service = service.with_port(port);
        }
        for (key, value) in &self.environment {
            service = service.with_env(key, value);
        }
        if let Some(path) = &self.data_path {
            service = service.with_volume(format!("{}-data:{}", name, path));
        }
        if let Some(check) = &self.healthcheck {
            service = service.with_healthcheck(HealthCheck::shell(check));
        }
        service
    }

    pub fn primary_volume(&self, opts: &MergeOptions) -> Option<Volume> {
        self.data_path
            .as_ref()
            .map(|_| Volume::named(format!("{}-data", opts.prefixed(&self.service_name))))
    }

    /// Sidecars, each depending on the primary service.
    pub fn support_services(&self, opts: &MergeOptions) -> Vec<Service> {
        let primary = opts.prefixed(&self.service_name);
        self.support_services
            .iter()
            .map(|support| {
                let mut service = Service::new(opts.prefixed(&support.name), &support.image)
                    .with_network(common::stack_network(opts, self.stack_type))
                    .depends_on(&primary, "service_started");
                for port in &support.ports {
                    service = service.with_port(port);
                }
                for (key, value) in &support.environment {
                    service = service.with_env(key, value.replace(PRIMARY_HOST, &primary));
                }
                service
            })
            .collect()
    }
}

/// Mergers and stack definitions keyed by stack type.
///
/// Constructed once and shared by `Arc`; both tables sit behind a reader/writer lock so
/// mergers can be registered after startup through a shared reference.
pub struct MergerRegistry {
    mergers: RwLock<HashMap<StackType, Arc<dyn Merger>>>,
    definitions: RwLock<HashMap<StackType, StackDefinition>>,
}

impl Default for MergerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MergerRegistry {
    pub fn new() -> Self {
        Self {
            mergers: RwLock::new(HashMap::new()),
            definitions: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_defaults() -> Self {
        let registry = Self::with_default_definitions();

        for stack_type in StackType::consolidated() {
            let merger: Arc<dyn Merger> = match stack_type {
                StackType::Database => Arc::new(DatabaseMerger),
                StackType::Cache => Arc::new(CacheMerger),
                StackType::Messaging => Arc::new(MessagingMerger),
                StackType::Auth => Arc::new(AuthMerger),
                StackType::Storage => Arc::new(StorageMerger),
                StackType::Secrets => Arc::new(SecretsMerger),
                StackType::Compute => Arc::new(ComputeMerger),
                StackType::Observability => Arc::new(ObservabilityMerger),
                StackType::Passthrough => continue,
            };
            registry.register(merger);
        }

        registry
    }

    /// Definitions only, no mergers: every stack goes through default synthesis.
    pub fn with_default_definitions() -> Self {
        let registry = Self::new();
        for definition in default_definitions() {
            registry.register_definition(definition);
        }
        registry
    }

    fn mergers_read(&self) -> RwLockReadGuard<'_, HashMap<StackType, Arc<dyn Merger>>> {
        self.mergers.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn mergers_write(&self) -> RwLockWriteGuard<'_, HashMap<StackType, Arc<dyn Merger>>> {
        self.mergers.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn definitions_read(&self) -> RwLockReadGuard<'_, HashMap<StackType, StackDefinition>> {
        self.definitions
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Registers a merger for its stack type, returning the one it replaces.
    pub fn register(&self, merger: Arc<dyn Merger>) -> Option<Arc<dyn Merger>> {
        let stack_type = merger.stack_type();
        debug!(stack_type = %stack_type, "Registering merger");
        self.mergers_write().insert(stack_type, merger)
    }

    pub fn unregister(&self, stack_type: StackType) -> Option<Arc<dyn Merger>> {
        self.mergers_write().remove(&stack_type)
    }

    pub fn register_definition(&self, definition: StackDefinition) -> Option<StackDefinition> {
        self.definitions
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(definition.stack_type, definition)
    }

    pub fn get(&self, stack_type: StackType) -> Option<Arc<dyn Merger>> {
        self.mergers_read().get(&stack_type).cloned()
    }

    pub fn get_definition(&self, stack_type: StackType) -> Option<StackDefinition> {
        self.definitions_read().get(&stack_type).cloned()
    }

    /// Definition used for default synthesis. A non-default database engine in `opts` selects
    /// the built-in definition for that engine.
    pub fn resolve_definition(&self, stack_type: StackType, opts: &MergeOptions) -> Option<StackDefinition> {
        match stack_type {
            StackType::Database if opts.database_engine != DatabaseEngine::default() => {
                Some(database_definition(opts.database_engine))
            }
            _ => self.get_definition(stack_type),
        }
    }

    /// Stack types with a registered merger, in stack-type order.
    pub fn merger_types(&self) -> Vec<StackType> {
        let mut types: Vec<_> = self.mergers_read().keys().copied().collect();
        types.sort();
        types
    }

    /// Generic synthesis: primary service plus declared support services, every source
    /// attached and its files merged verbatim.
    pub fn create_default_stack(
        &self,
        stack_type: StackType,
        results: &[MappingResult],
        opts: &MergeOptions,
    ) -> Stack {
        let mut stack = common::new_stack(stack_type, results, opts);
        stack.set_metadata("synthesis", "default");

        match self.resolve_definition(stack_type, opts) {
            Some(definition) => {
                stack.description = definition.description.clone();
                stack.add_service(definition.primary_service(opts));
                if let Some(volume) = definition.primary_volume(opts) {
                    stack.add_volume(volume);
                }
                if opts.include_support_services {
                    for service in definition.support_services(opts) {
                        stack.add_service(service);
                    }
                }
                for dependency in &definition.depends_on {
                    stack.add_dependency(*dependency);
                }
            }
            None => stack.add_warning(format!(
                "no stack definition for {}; resources attached without services",
                stack_type
            )),
        }

        common::absorb_sources(&mut stack, results);
        stack.add_manual_step(format!(
            "Review the generic {} stack: source settings were not translated",
            stack_type
        ));
        stack
    }
}

pub fn database_definition(engine: DatabaseEngine) -> StackDefinition {
    match engine {
        DatabaseEngine::Postgres => StackDefinition::new(StackType::Database, "postgres", "postgres:16-alpine")
            .with_description("Consolidated relational database server")
            .with_port("5432:5432")
            .with_env("POSTGRES_USER", "postgres")
            .with_env("POSTGRES_PASSWORD", "${POSTGRES_PASSWORD:-changeme}")
            .with_data_path("/var/lib/postgresql/data")
            .with_healthcheck("pg_isready -U postgres")
            .with_support(
                SupportService::new("pgbouncer", "edoburu/pgbouncer:1.22.1")
                    .with_port("6432:6432")
                    .with_env("DB_HOST", PRIMARY_HOST)
                    .with_env("POOL_MODE", "transaction")
                    .with_description("Connection pooler"),
            ),
        DatabaseEngine::Mysql => StackDefinition::new(StackType::Database, "mysql", "mysql:8.0")
            .with_description("Consolidated relational database server")
            .with_port("3306:3306")
            .with_env("MYSQL_ROOT_PASSWORD", "${MYSQL_ROOT_PASSWORD:-changeme}")
            .with_data_path("/var/lib/mysql")
            .with_healthcheck("mysqladmin ping -h localhost"),
        DatabaseEngine::Mariadb => StackDefinition::new(StackType::Database, "mariadb", "mariadb:11")
            .with_description("Consolidated relational database server")
            .with_port("3306:3306")
            .with_env("MARIADB_ROOT_PASSWORD", "${MARIADB_ROOT_PASSWORD:-changeme}")
            .with_data_path("/var/lib/mysql")
            .with_healthcheck("healthcheck.sh --connect --innodb_initialized"),
    }
}

fn default_definitions() -> Vec<StackDefinition> {
    vec![
        database_definition(DatabaseEngine::Postgres),
        StackDefinition::new(StackType::Cache, "redis", "redis:7-alpine")
            .with_description("Consolidated Redis cache")
            .with_port("6379:6379")
            .with_data_path("/data")
            .with_healthcheck("redis-cli ping")
            .with_support(
                SupportService::new("redis-commander", "rediscommander/redis-commander:latest")
                    .with_port("8081:8081")
                    .with_env("REDIS_HOSTS", format!("local:{}:6379", PRIMARY_HOST))
                    .with_description("Redis web UI"),
            ),
        StackDefinition::new(
            StackType::Messaging,
            "rabbitmq",
            "rabbitmq:3.13-management-alpine",
        )
        .with_description("Consolidated message broker")
        .with_port("5672:5672")
        .with_port("15672:15672")
        .with_data_path("/var/lib/rabbitmq")
        .with_healthcheck("rabbitmq-diagnostics -q ping"),
        StackDefinition::new(StackType::Auth, "keycloak", "quay.io/keycloak/keycloak:24.0")
            .with_description("Consolidated identity provider")
            .with_port("8180:8080")
            .with_env("KEYCLOAK_ADMIN", "admin")
            .with_env("KEYCLOAK_ADMIN_PASSWORD", "${KEYCLOAK_ADMIN_PASSWORD:-changeme}")
            .with_env("KC_DB", "postgres")
            .depends_on(StackType::Database),
        StackDefinition::new(StackType::Storage, "minio", "minio/minio:latest")
            .with_description("Consolidated S3-compatible object storage")
            .with_port("9000:9000")
            .with_port("9001:9001")
            .with_env("MINIO_ROOT_USER", "minioadmin")
            .with_env("MINIO_ROOT_PASSWORD", "${MINIO_ROOT_PASSWORD:-changeme}")
            .with_data_path("/data")
            .with_healthcheck("mc ready local"),
        StackDefinition::new(StackType::Secrets, "vault", "hashicorp/vault:1.15")
            .with_description("Consolidated secrets store")
            .with_port("8200:8200")
            .with_env("VAULT_ADDR", "http://127.0.0.1:8200")
            .with_data_path("/vault/file")
            .with_healthcheck("vault status -address=http://127.0.0.1:8200 || [ $? -eq 2 ]"),
        StackDefinition::new(StackType::Compute, "faas-gateway", "ghcr.io/openfaas/gateway:0.27.5")
            .with_description("Function runtime gateway")
            .with_port("8080:8080")
            .with_env("basic_auth", "true"),
        StackDefinition::new(StackType::Observability, "prometheus", "prom/prometheus:v2.51.0")
            .with_description("Metrics, logs, dashboards and alerting")
            .with_port("9090:9090")
            .with_data_path("/prometheus")
            .with_support(SupportService::new("loki", "grafana/loki:2.9.6").with_port("3100:3100"))
            .with_support(
                SupportService::new("grafana", "grafana/grafana:10.4.1")
                    .with_port("3000:3000")
                    .with_env("GF_SECURITY_ADMIN_PASSWORD", "${GRAFANA_PASSWORD:-changeme}"),
            )
            .with_support(
                SupportService::new("alertmanager", "prom/alertmanager:v0.27.0")
                    .with_port("9093:9093"),
            ),
    ]
}
