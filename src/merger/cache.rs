//! Cache resources folded into one Redis server, one logical database index each

use super::common::{self, NameAllocator};
use super::{MergeContext, MergeOptions, Merger};
use crate::error::MergeError;
use crate::model::{HealthCheck, MappingResult, Service, Stack, StackType, Volume};
use crate::taxonomy::Category;
use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

/// Logical databases a stock Redis server exposes. A platform limit, not a setting.
pub const REDIS_DB_LIMIT: usize = 16;

pub const CONFIG_PATH: &str = "redis/redis.conf";
pub const PARTITIONS_PATH: &str = "redis/partitions.json";

pub struct CacheMerger;

#[derive(Debug, Serialize)]
struct Partition {
    source: String,
    name: String,
    index: usize,
    url: String,
}

/// Index of the `position`-th cache, wrapping past the platform limit.
pub fn partition_index(position: usize) -> usize {
    position % REDIS_DB_LIMIT
}

fn memory_mb(result: &MappingResult) -> Option<u64> {
    result
        .attribute_u64("memory_size_gb")
        .map(|gb| gb.saturating_mul(1024))
        .or_else(|| result.attribute_u64("memory_mb"))
}

fn redis_conf(max_memory_mb: Option<u64>) -> String {
    let mut conf = String::new();
    conf.push_str(&format!("databases {}\n", REDIS_DB_LIMIT));
    conf.push_str("appendonly yes\n");
    conf.push_str("appendfsync everysec\n");
    conf.push_str("maxmemory-policy allkeys-lru\n");
    if let Some(mb) = max_memory_mb {
        conf.push_str(&format!("maxmemory {}mb\n", mb));
    }
    conf
}

#[async_trait]
impl Merger for CacheMerger {
    fn stack_type(&self) -> StackType {
        StackType::Cache
    }

    fn can_merge(&self, results: &[MappingResult]) -> bool {
        common::any_applicable(
            results,
            |t| t.category() == Category::Cache,
            &["cache", "redis", "elasticache", "memorydb", "valkey"],
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
                stack_type: StackType::Cache,
            });
        }

        let mut stack = common::new_stack(StackType::Cache, results, opts)
            .with_description(format!("Redis server partitioning {} caches", results.len()));
        let redis = opts.prefixed("redis");

        let mut names = NameAllocator::new();
        let mut partitions = Vec::with_capacity(results.len());
        for (position, result) in results.iter().enumerate() {
            let index = partition_index(position);
            let name = names.allocate(&common::normalize_name(&result.source_name));

            if let Some(engine) = result.attribute_str("engine") {
                if !engine.eq_ignore_ascii_case("redis") && !engine.eq_ignore_ascii_case("valkey") {
                    stack.add_warning(format!(
                        "{}: source engine {} is not Redis compatible; clients need a Redis driver",
                        result.source_name, engine
                    ));
                }
            }

            stack.set_metadata(format!("cache.{}", name), index.to_string());
            partitions.push(Partition {
                source: result.source_name.clone(),
                url: format!("redis://{}:6379/{}", redis, index),
                name,
                index,
            });
        }

        if results.len() > REDIS_DB_LIMIT {
            stack.add_warning(format!(
                "{} cache resources: count exceeds Redis DB limit of {}; indices wrap and some caches share a logical database",
                results.len(),
                REDIS_DB_LIMIT
            ));
        }
        debug!(caches = results.len(), "Assigned Redis logical databases");

        let total_memory: Option<u64> = results
            .iter()
            .filter_map(memory_mb)
            .fold(None, |acc, mb| Some(acc.unwrap_or(0u64).saturating_add(mb)));

        let service = Service::new(&redis, "redis:7-alpine")
            .with_command([
                "redis-server",
                "/usr/local/etc/redis/redis.conf",
                "--requirepass",
                "${REDIS_PASSWORD:-changeme}",
            ])
            .with_port("6379:6379")
            .with_volume(format!("{}-data:/data", redis))
            .with_volume(format!("./{}:/usr/local/etc/redis/redis.conf:ro", CONFIG_PATH))
            .with_network(common::stack_network(opts, StackType::Cache))
            .with_healthcheck(HealthCheck::shell("redis-cli -a \"$REDIS_PASSWORD\" ping"));
        stack.add_volume(Volume::named(format!("{}-data", redis)));
        stack.add_service(service);

        if opts.include_support_services {
            let hosts = partitions
                .iter()
                .map(|p| format!("{}:{}:6379:{}", p.name, redis, p.index))
                .collect::<Vec<_>>()
                .join(",");
            stack.add_service(
                Service::new(opts.prefixed("redis-commander"), "rediscommander/redis-commander:latest")
                    .with_port("8081:8081")
                    .with_env("REDIS_HOSTS", hosts)
                    .with_network(common::stack_network(opts, StackType::Cache))
                    .depends_on(&redis, "service_healthy"),
            );
        }

        stack.add_config(CONFIG_PATH, redis_conf(total_memory));
        let partitions_json = serde_json::to_string_pretty(&partitions)
            .map_err(|e| MergeError::render(PARTITIONS_PATH, e))?;
        stack.add_config(PARTITIONS_PATH, partitions_json);
        stack.set_metadata("partitions", results.len().min(REDIS_DB_LIMIT).to_string());

        common::absorb_sources(&mut stack, results);

        stack.add_manual_step(format!(
            "Point each client at its logical database from {} (SELECT <index>)",
            PARTITIONS_PATH
        ));
        stack.add_manual_step("Cache contents are not migrated; expect a cold cache after cutover");
        stack.add_manual_step("Set REDIS_PASSWORD and rotate any source auth tokens");
        Ok(stack)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caches(n: usize) -> Vec<MappingResult> {
        (0..n)
            .map(|i| MappingResult::new("aws_elasticache_cluster", format!("cache-{}", i)))
            .collect()
    }

    async fn merge(results: &[MappingResult]) -> Stack {
        CacheMerger
            .merge(&MergeContext::new(), results, &MergeOptions::default())
            .await
            .unwrap()
    }

    #[test]
    fn test_partition_index_wraps() {
        assert_eq!(partition_index(0), 0);
        assert_eq!(partition_index(15), 15);
        assert_eq!(partition_index(16), 0);
        assert_eq!(partition_index(19), 3);
    }

    #[tokio::test]
    async fn test_sixteen_caches_no_warning() {
        let stack = merge(&caches(16)).await;
        assert!(stack.warnings.is_empty());
        assert_eq!(stack.metadata["cache.cache-15"], "15");
    }

    #[tokio::test]
    async fn test_twenty_caches_wrap_with_warning() {
        let stack = merge(&caches(20)).await;
        assert_eq!(stack.warnings.len(), 1);
        assert!(stack.warnings[0].contains("exceeds Redis DB limit"));
        assert_eq!(stack.metadata["cache.cache-16"], "0");
        assert_eq!(stack.metadata["cache.cache-19"], "3");
        for (key, value) in &stack.metadata {
            if key.starts_with("cache.") {
                assert!(value.parse::<usize>().unwrap() < REDIS_DB_LIMIT);
            }
        }
    }

    #[tokio::test]
    async fn test_services_and_configs() {
        let results = vec![
            MappingResult::new("google_redis_instance", "sessions").with_attribute("memory_size_gb", 1),
            MappingResult::new("azurerm_redis_cache", "sessions"),
        ];
        let stack = merge(&results).await;

        assert!(stack.service("redis").is_some());
        let commander = stack.service("redis-commander").unwrap();
        assert_eq!(
            commander.environment["REDIS_HOSTS"],
            "sessions:redis:6379:0,sessions-2:redis:6379:1"
        );
        assert!(stack.configs[CONFIG_PATH].contains("maxmemory 1024mb"));
        assert!(stack.configs[PARTITIONS_PATH].contains("redis://redis:6379/1"));
    }

    #[tokio::test]
    async fn test_huge_memory_sizes_saturate() {
        let results = vec![
            MappingResult::new("aws_elasticache_cluster", "a").with_attribute("memory_size_gb", u64::MAX),
            MappingResult::new("aws_elasticache_cluster", "b").with_attribute("memory_mb", u64::MAX),
        ];
        let stack = merge(&results).await;
        assert!(stack.configs[CONFIG_PATH].contains(&format!("maxmemory {}mb", u64::MAX)));
    }

    #[tokio::test]
    async fn test_memcached_source_warns() {
        let results =
            vec![MappingResult::new("aws_elasticache_cluster", "legacy").with_attribute("engine", "memcached")];
        let stack = merge(&results).await;
        assert!(stack.warnings[0].contains("not Redis compatible"));
    }

    #[test]
    fn test_can_merge() {
        assert!(CacheMerger.can_merge(&caches(1)));
        assert!(!CacheMerger.can_merge(&[MappingResult::new("aws_sqs_queue", "q")]));
    }
}
