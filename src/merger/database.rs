//! Relational databases folded into one server with a logical database per source

use super::common::{self, NameAllocator};
use super::{DatabaseEngine, MergeContext, MergeOptions, Merger};
use crate::error::MergeError;
use crate::model::{HealthCheck, MappingResult, Service, Stack, StackType, Volume};
use crate::taxonomy::{Category, ResourceType};
use async_trait::async_trait;
use tracing::debug;

/// Longest identifier both PostgreSQL (63) and MySQL (64) accept
const MAX_IDENTIFIER_LEN: usize = 63;

const NAME_HINTS: &[&str] = &["POSTGRES_DB", "MYSQL_DATABASE", "MARIADB_DATABASE", "DB_NAME", "DATABASE_NAME"];

pub const INIT_SCRIPT: &str = "init/01-create-databases.sql";
pub const MIGRATE_SCRIPT: &str = "scripts/migrate-databases.sh";

pub struct DatabaseMerger;

/// Engine family a source speaks, as far as dialect compatibility goes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EngineFamily {
    Postgres,
    Mysql,
    Other,
}

impl EngineFamily {
    fn of_target(engine: DatabaseEngine) -> Self {
        match engine {
            DatabaseEngine::Postgres => EngineFamily::Postgres,
            DatabaseEngine::Mysql | DatabaseEngine::Mariadb => EngineFamily::Mysql,
        }
    }

    fn parse(raw: &str) -> Self {
        let raw = raw.to_lowercase();
        if raw.contains("postgres") {
            EngineFamily::Postgres
        } else if raw.contains("mysql") || raw.contains("mariadb") || raw == "aurora" {
            EngineFamily::Mysql
        } else {
            EngineFamily::Other
        }
    }
}

/// Source engine name: explicit attribute first, then the type identifier itself.
fn source_engine(result: &MappingResult) -> Option<String> {
    if let Some(engine) = result
        .attribute_str("engine")
        .or_else(|| result.attribute_str("database_version"))
    {
        return Some(engine.to_lowercase());
    }
    let engine = match result.resource_type()? {
        ResourceType::AzurermPostgresqlServer
        | ResourceType::AzurermPostgresqlFlexibleServer
        | ResourceType::GoogleAlloydbCluster => "postgres",
        ResourceType::AzurermMysqlServer | ResourceType::AzurermMysqlFlexibleServer => "mysql",
        ResourceType::AzurermMariadbServer => "mariadb",
        _ => return None,
    };
    Some(engine.to_string())
}

fn logical_name(result: &MappingResult) -> String {
    let raw = common::env_hint(result, NAME_HINTS)
        .or_else(|| result.attribute_str("db_name"))
        .or_else(|| result.attribute_str("database_name"))
        .unwrap_or(&result.source_name);
    common::normalize_identifier(raw, MAX_IDENTIFIER_LEN)
}

struct EngineProfile {
    service: &'static str,
    image: &'static str,
    port: u16,
    data_path: &'static str,
    database_env: &'static str,
    healthcheck: &'static str,
}

fn profile(engine: DatabaseEngine) -> EngineProfile {
    match engine {
        DatabaseEngine::Postgres => EngineProfile {
            service: "postgres",
            image: "postgres:16-alpine",
            port: 5432,
            data_path: "/var/lib/postgresql/data",
            database_env: "POSTGRES_DB",
            healthcheck: "pg_isready -U postgres",
        },
        DatabaseEngine::Mysql => EngineProfile {
            service: "mysql",
            image: "mysql:8.0",
            port: 3306,
            data_path: "/var/lib/mysql",
            database_env: "MYSQL_DATABASE",
            healthcheck: "mysqladmin ping -h localhost",
        },
        DatabaseEngine::Mariadb => EngineProfile {
            service: "mariadb",
            image: "mariadb:11",
            port: 3306,
            data_path: "/var/lib/mysql",
            database_env: "MARIADB_DATABASE",
            healthcheck: "healthcheck.sh --connect --innodb_initialized",
        },
    }
}

fn primary_service(engine: DatabaseEngine, first_db: &str, opts: &MergeOptions) -> Service {
    let p = profile(engine);
    let name = opts.prefixed(p.service);
    let mut service = Service::new(&name, p.image)
        .with_port(format!("{}:{}", p.port, p.port))
        .with_env(p.database_env, first_db)
        .with_volume(format!("{}-data:{}", name, p.data_path))
        .with_volume("./init:/docker-entrypoint-initdb.d:ro")
        .with_network(common::stack_network(opts, StackType::Database))
        .with_healthcheck(HealthCheck::shell(p.healthcheck).with_start_period("30s"));

    service = match engine {
        DatabaseEngine::Postgres => service
            .with_env("POSTGRES_USER", "postgres")
            .with_env("POSTGRES_PASSWORD", "${POSTGRES_PASSWORD:-changeme}"),
        DatabaseEngine::Mysql => {
            service.with_env("MYSQL_ROOT_PASSWORD", "${MYSQL_ROOT_PASSWORD:-changeme}")
        }
        DatabaseEngine::Mariadb => {
            service.with_env("MARIADB_ROOT_PASSWORD", "${MARIADB_ROOT_PASSWORD:-changeme}")
        }
    };
    service
}

fn pooler_service(primary: &str, opts: &MergeOptions) -> Service {
    Service::new(opts.prefixed("pgbouncer"), "edoburu/pgbouncer:1.22.1")
        .with_port("6432:6432")
        .with_env("DB_HOST", primary)
        .with_env("DB_USER", "postgres")
        .with_env("DB_PASSWORD", "${POSTGRES_PASSWORD:-changeme}")
        .with_env("LISTEN_PORT", "6432")
        .with_env("POOL_MODE", "transaction")
        .with_env("MAX_CLIENT_CONN", "200")
        .with_network(common::stack_network(opts, StackType::Database))
        .depends_on(primary, "service_healthy")
}

/// Idempotent creation of every database after the first.
fn init_script(engine: DatabaseEngine, databases: &[String]) -> String {
    let mut sql = String::from("-- Creates logical databases consolidated into this server.\n");
    sql.push_str("-- The first database is created by the server from its environment.\n\n");
    for db in databases.iter().skip(1) {
        match engine {
            DatabaseEngine::Postgres => sql.push_str(&format!(
                "SELECT 'CREATE DATABASE \"{db}\"' WHERE NOT EXISTS (SELECT FROM pg_database WHERE datname = '{db}')\\gexec\n"
            )),
            DatabaseEngine::Mysql | DatabaseEngine::Mariadb => {
                sql.push_str(&format!("CREATE DATABASE IF NOT EXISTS `{db}`;\n"))
            }
        }
    }
    sql
}

fn source_url_var(db: &str) -> String {
    format!("SOURCE_{}_URL", db.to_uppercase())
}

fn migration_script(engine: DatabaseEngine, service: &str, pairs: &[(String, String)]) -> String {
    let mut script = common::script_header("Copies data from the source databases into the consolidated server");
    script.push_str("TARGET_HOST=\"${TARGET_HOST:-localhost}\"\n\n");

    for (source, db) in pairs {
        let var = source_url_var(db);
        script.push_str(&format!("# {} -> {}\n", source, db));
        script.push_str(&format!(
            "if [ -z \"${{{var}:-}}\" ]; then\n  echo \"skipping {db}: {var} not set\" >&2\nelse\n"
        ));
        match engine {
            DatabaseEngine::Postgres => script.push_str(&format!(
                "  pg_dump --no-owner --no-acl \"${var}\" | psql -h \"$TARGET_HOST\" -U postgres -d {db}\n"
            )),
            DatabaseEngine::Mysql | DatabaseEngine::Mariadb => script.push_str(&format!(
                "  mysqldump --single-transaction --routines \"${var}\" | mysql -h \"$TARGET_HOST\" -u root -p\"${{DB_ROOT_PASSWORD:?}}\" {db}\n"
            )),
        }
        script.push_str("fi\n\n");
    }
    script.push_str(&format!("echo \"migration into {} finished\"\n", service));
    script
}

#[async_trait]
impl Merger for DatabaseMerger {
    fn stack_type(&self) -> StackType {
        StackType::Database
    }

    fn can_merge(&self, results: &[MappingResult]) -> bool {
        common::any_applicable(
            results,
            |t| t.category() == Category::SqlDatabase,
            &["db", "database", "sql", "rds", "postgres", "postgresql", "mysql", "mariadb"],
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
                stack_type: StackType::Database,
            });
        }

        let engine = opts.database_engine;
        let target_family = EngineFamily::of_target(engine);
        let mut stack = common::new_stack(StackType::Database, results, opts)
            .with_description(format!("{} server hosting {} logical databases", engine.name(), results.len()));

        let mut names = NameAllocator::with_separator("_");
        let mut pairs = Vec::with_capacity(results.len());
        for result in results {
            let db = names.allocate(&logical_name(result));

            if let Some(source) = source_engine(result) {
                let family = EngineFamily::parse(&source);
                if family != target_family {
                    stack.add_warning(format!(
                        "{}: source engine {} differs from target {}; schema and SQL dialect need manual conversion",
                        result.source_name, source, engine
                    ));
                }
            }
            stack.set_metadata(format!("database.{}", result.source_name), db.clone());
            pairs.push((result.source_name.clone(), db));
        }
        let databases: Vec<String> = pairs.iter().map(|(_, db)| db.clone()).collect();
        debug!(engine = %engine, databases = databases.len(), "Merged database group");

        let primary = primary_service(engine, &databases[0], opts);
        let primary_name = primary.name.clone();
        stack.add_volume(Volume::named(format!("{}-data", primary_name)));
        stack.add_service(primary);

        if engine == DatabaseEngine::Postgres && opts.include_support_services {
            stack.add_service(pooler_service(&primary_name, opts));
        }

        if databases.len() > 1 {
            stack.add_config(INIT_SCRIPT, init_script(engine, &databases));
        }
        stack.add_script(MIGRATE_SCRIPT, migration_script(engine, &primary_name, &pairs));

        stack.set_metadata("engine", engine.as_str());
        stack.set_metadata("databases", databases.join(","));

        common::absorb_sources(&mut stack, results);

        stack.add_manual_step(format!(
            "Set a strong password for {} before the first start; the generated default is a placeholder",
            primary_name
        ));
        stack.add_manual_step(format!(
            "Export each source database and run {} with the SOURCE_<DB>_URL variables set",
            MIGRATE_SCRIPT
        ));
        stack.add_manual_step(format!(
            "Point application connection strings at {}:{} and rotate the source credentials",
            primary_name,
            profile(engine).port
        ));
        Ok(stack)
    }
}
