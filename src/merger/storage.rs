//! Object storage buckets and containers folded into one S3-compatible server

use super::common::{self, NameAllocator};
use super::{MergeContext, MergeOptions, Merger};
use crate::error::MergeError;
use crate::model::{HealthCheck, MappingResult, Service, Stack, StackType, Volume};
use crate::taxonomy::{Category, Provider};
use async_trait::async_trait;
use tracing::debug;

pub const MIN_BUCKET_LEN: usize = 3;
pub const MAX_BUCKET_LEN: usize = 63;
const BUCKET_PAD: &str = "-bucket";

pub const INIT_SCRIPT: &str = "scripts/init-buckets.sh";
pub const MIGRATE_SCRIPT: &str = "scripts/migrate-storage.sh";

pub struct StorageMerger;

/// Normalised bucket name within the platform's length limits, before de-duplication.
pub fn bucket_name(raw: &str) -> String {
    let mut name = common::normalize_name(raw);
    if name.len() > MAX_BUCKET_LEN {
        name.truncate(MAX_BUCKET_LEN);
        name = name.trim_end_matches('-').to_string();
    }
    if name.len() < MIN_BUCKET_LEN {
        name.push_str(BUCKET_PAD);
    }
    name
}

fn source_bucket(result: &MappingResult) -> &str {
    result
        .attribute_str("bucket")
        .or_else(|| result.attribute_str("name"))
        .unwrap_or(&result.source_name)
}

#[derive(Debug, Clone)]
struct Bucket<'a> {
    name: String,
    source: &'a MappingResult,
}

fn init_script(minio: &str, buckets: &[Bucket<'_>]) -> String {
    let mut script = common::posix_script_header("Creates buckets on the storage server; safe to re-run");
    script.push_str(&format!("MINIO_URL=\"${{MINIO_URL:-http://{}:9000}}\"\n\n", minio));
    script.push_str("attempt=0\n");
    script.push_str("until mc alias set local \"$MINIO_URL\" \"$MINIO_ROOT_USER\" \"$MINIO_ROOT_PASSWORD\" >/dev/null 2>&1; do\n");
    script.push_str("  attempt=$((attempt + 1))\n");
    script.push_str("  [ \"$attempt\" -ge 30 ] && { echo \"storage server not ready\" >&2; exit 1; }\n");
    script.push_str("  sleep 2\ndone\n\n");

    for bucket in buckets {
        let target = format!("local/{}", bucket.name);
        script.push_str(&format!("mc mb --ignore-existing {}\n", target));
        if bucket.source.attribute_bool("versioning").unwrap_or(false) {
            script.push_str(&format!("mc version enable {}\n", target));
        }
        if bucket.source.attribute_bool("public").unwrap_or(false) {
            script.push_str(&format!("mc anonymous set download {}\n", target));
        }
        if let Some(days) = bucket.source.attribute_u64("expiration_days") {
            script.push_str(&format!(
                "mc ilm rule ls {target} 2>/dev/null | grep -q 'Expiration' || mc ilm rule add --expire-days {days} {target}\n"
            ));
        }
    }
    script.push_str("\necho \"buckets ready\"\n");
    script
}

fn source_alias(provider: Provider) -> (&'static str, String) {
    match provider {
        Provider::Aws => (
            "s3",
            "mc alias set s3 https://s3.amazonaws.com \"${AWS_ACCESS_KEY_ID:?}\" \"${AWS_SECRET_ACCESS_KEY:?}\"".to_string(),
        ),
        Provider::Gcp => (
            "gcs",
            "mc alias set gcs https://storage.googleapis.com \"${GCS_HMAC_ACCESS_ID:?}\" \"${GCS_HMAC_SECRET:?}\"".to_string(),
        ),
        Provider::Azure => ("azure", String::new()),
    }
}

/// Mirror commands grouped by originating provider.
fn migration_script(buckets: &[Bucket<'_>]) -> String {
    let mut script = common::script_header("Mirrors source buckets into the storage server");
    script.push_str("mc alias set local \"${MINIO_URL:-http://localhost:9000}\" \"${MINIO_ROOT_USER:?}\" \"${MINIO_ROOT_PASSWORD:?}\"\n\n");

    let mut providers: Vec<Option<Provider>> = buckets.iter().map(|b| b.source.provider()).collect();
    providers.sort();
    providers.dedup();

    for provider in providers {
        let group: Vec<&Bucket<'_>> = buckets.iter().filter(|b| b.source.provider() == provider).collect();
        match provider {
            Some(Provider::Azure) => {
                script.push_str("# --- Azure ---\n");
                for bucket in group {
                    let source = source_bucket(bucket.source);
                    script.push_str(&format!(
                        "azcopy copy \"https://${{AZURE_STORAGE_ACCOUNT:?}}.blob.core.windows.net/{}?${{AZURE_SAS:?}}\" ./staging/{} --recursive\n",
                        source, bucket.name
                    ));
                    script.push_str(&format!("mc mirror --overwrite ./staging/{} local/{}\n", bucket.name, bucket.name));
                }
            }
            Some(p) => {
                let (alias, setup) = source_alias(p);
                script.push_str(&format!("# --- {} ---\n{}\n", p.name(), setup));
                for bucket in group {
                    script.push_str(&format!(
                        "mc mirror --overwrite {}/{} local/{}\n",
                        alias,
                        source_bucket(bucket.source),
                        bucket.name
                    ));
                }
            }
            None => {
                script.push_str("# --- unknown provider ---\n");
                for bucket in group {
                    script.push_str(&format!(
                        "echo \"copy {} into local/{} manually\"\n",
                        bucket.source.source_name, bucket.name
                    ));
                }
            }
        }
        script.push('\n');
    }
    script
}

#[async_trait]
impl Merger for StorageMerger {
    fn stack_type(&self) -> StackType {
        StackType::Storage
    }

    fn can_merge(&self, results: &[MappingResult]) -> bool {
        common::any_applicable(
            results,
            |t| t.category() == Category::ObjectStorage,
            &["bucket", "s3", "blob", "gcs", "storage"],
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
                stack_type: StackType::Storage,
            });
        }

        let mut stack = common::new_stack(StackType::Storage, results, opts)
            .with_description(format!("S3-compatible storage with {} buckets", results.len()));

        let mut names = NameAllocator::new();
        let buckets: Vec<Bucket<'_>> = results
            .iter()
            .map(|result| Bucket {
                name: names.allocate_clamped(&bucket_name(source_bucket(result)), MAX_BUCKET_LEN),
                source: result,
            })
            .collect();
        for bucket in &buckets {
            stack.set_metadata(format!("bucket.{}", bucket.source.source_name), bucket.name.clone());
        }
        debug!(buckets = buckets.len(), "Derived bucket names");

        let minio = opts.prefixed("minio");
        let network = common::stack_network(opts, StackType::Storage);
        stack.add_service(
            Service::new(&minio, "minio/minio:latest")
                .with_command(["server", "/data", "--console-address", ":9001"])
                .with_port("9000:9000")
                .with_port("9001:9001")
                .with_env("MINIO_ROOT_USER", "minioadmin")
                .with_env("MINIO_ROOT_PASSWORD", "${MINIO_ROOT_PASSWORD:-changeme}")
                .with_volume(format!("{}-data:/data", minio))
                .with_network(&network)
                .with_healthcheck(HealthCheck::shell("mc ready local")),
        );
        stack.add_service(
            Service::new(opts.prefixed("minio-init"), "minio/mc:latest")
                .with_entrypoint(["/bin/sh", "/init-buckets.sh"])
                .with_env("MINIO_ROOT_USER", "minioadmin")
                .with_env("MINIO_ROOT_PASSWORD", "${MINIO_ROOT_PASSWORD:-changeme}")
                .with_volume(format!("./{}:/init-buckets.sh:ro", INIT_SCRIPT))
                .with_network(&network)
                .with_restart(Some("no"))
                .depends_on(&minio, "service_healthy"),
        );
        stack.add_volume(Volume::named(format!("{}-data", minio)));

        stack.add_script(INIT_SCRIPT, init_script(&minio, &buckets));
        stack.add_script(MIGRATE_SCRIPT, migration_script(&buckets));

        common::absorb_sources(&mut stack, results);

        stack.add_manual_step(format!(
            "Run {} with source credentials exported; large buckets may need several passes",
            MIGRATE_SCRIPT
        ));
        stack.add_manual_step("Switch SDK endpoints to the storage server and enable path-style addressing");
        stack.add_manual_step("Recreate bucket policies and CORS rules; they are not translated");
        Ok(stack)
    }
}
