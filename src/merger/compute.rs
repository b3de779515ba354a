//! Serverless functions folded into one function runtime with a shared gateway

use super::common::{self, NameAllocator};
use super::{MergeContext, MergeOptions, Merger};
use crate::error::MergeError;
use crate::model::{Deploy, MappingResult, ResourceSpec, Resources, Service, Stack, StackType};
use async_trait::async_trait;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::debug;

pub const STACK_FILE: &str = "functions/stack.yml";
pub const PROMETHEUS_CONFIG: &str = "functions/prometheus.yml";
pub const DEPLOY_SCRIPT: &str = "scripts/deploy-functions.sh";

const FALLBACK_TEMPLATE: &str = "dockerfile";

pub struct ComputeMerger;

crate::define_label_enum! {
    /// Function language runtime
    Runtime {
        Python => "python" : "Python" | "python3",
        Node => "node" : "Node.js" | "nodejs" | "javascript",
        Go => "go" : "Go" | "golang",
        Java => "java" : "Java",
        Dotnet => "dotnet" : ".NET" | "csharp" | "dotnetcore",
        Ruby => "ruby" : "Ruby",
    }
}

impl Runtime {
    /// Function template the runtime builds with.
    pub fn template(&self) -> &'static str {
        match self {
            Runtime::Python => "python3-http",
            Runtime::Node => "node20",
            Runtime::Go => "golang-http",
            Runtime::Java => "java11",
            Runtime::Dotnet => "csharp-httprequest",
            Runtime::Ruby => "ruby-http",
        }
    }

    /// Parses a runtime label such as `python3.12`, `nodejs20.x` or `go1.x`.
    ///
    /// The leading alphabetic run must name a runtime exactly, so `gotenberg` is not Go.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim().to_lowercase();
        let lead: String = raw.chars().take_while(|c| c.is_ascii_alphabetic()).collect();
        Self::from_name(&lead)
    }

    /// Runtime implied by a container image reference such as `registry:5000/lambda/python:3.12`.
    pub fn from_image(image: &str) -> Option<Self> {
        let reference = image.split('@').next().unwrap_or(image);
        let last = reference.rsplit('/').next().unwrap_or(reference);
        let repo = last.split(':').next().unwrap_or(last);
        Self::parse(repo)
    }
}

/// Source runtime: explicit attribute, then environment hints, then the image name.
pub fn detect_runtime(result: &MappingResult) -> Option<Runtime> {
    result
        .attribute_str("runtime")
        .and_then(Runtime::parse)
        .or_else(|| {
            common::env_hint(result, &["FUNCTIONS_WORKER_RUNTIME", "RUNTIME", "LANGUAGE"])
                .and_then(Runtime::parse)
        })
        .or_else(|| {
            result
                .service
                .as_ref()
                .and_then(|s| Runtime::from_image(&s.image))
        })
}

/// Limits carried over from the source; memory in MB becomes a compose memory string.
fn resources_for(result: &MappingResult) -> Option<Resources> {
    if let Some(deploy) = result.service.as_ref().and_then(|s| s.deploy.as_ref()) {
        if let Some(resources) = &deploy.resources {
            return Some(resources.clone());
        }
    }
    let memory = result
        .attribute_u64("memory_size")
        .or_else(|| result.attribute_u64("available_memory_mb"))?;
    Some(Resources {
        limits: Some(ResourceSpec {
            cpus: None,
            memory: Some(format!("{}M", memory)),
        }),
        reservations: None,
    })
}

#[derive(Debug, Serialize)]
struct FunctionSpec {
    lang: String,
    handler: String,
    image: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    environment: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    limits: Option<ResourceSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    requests: Option<ResourceSpec>,
    labels: BTreeMap<String, String>,
    readonly_root_filesystem: bool,
}

#[derive(Debug, Serialize)]
struct ProviderSpec {
    name: String,
    gateway: String,
}

#[derive(Debug, Serialize)]
struct StackFile {
    version: String,
    provider: ProviderSpec,
    functions: BTreeMap<String, FunctionSpec>,
}

fn prometheus_config(gateway: &str) -> String {
    format!(
        "global:\n  scrape_interval: 15s\nscrape_configs:\n  - job_name: gateway\n    static_configs:\n      - targets: ['{}:8082']\n",
        gateway
    )
}

fn deploy_script(templates: &[&str]) -> String {
    let mut script = common::script_header("Builds and deploys every function to the gateway");
    script.push_str("export OPENFAAS_URL=\"${OPENFAAS_URL:-http://127.0.0.1:8080}\"\n");
    script.push_str("faas-cli login --password \"${OPENFAAS_PASSWORD:?}\"\n");
    for template in templates {
        if *template != FALLBACK_TEMPLATE {
            script.push_str(&format!("faas-cli template store pull {}\n", template));
        }
    }
    script.push_str(&format!("faas-cli up -f {}\n", STACK_FILE));
    script
}

#[async_trait]
impl Merger for ComputeMerger {
    fn stack_type(&self) -> StackType {
        StackType::Compute
    }

    fn can_merge(&self, results: &[MappingResult]) -> bool {
        common::any_applicable(
            results,
            |t| t.is_serverless(),
            &["function", "functions", "lambda", "faas", "serverless"],
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
                stack_type: StackType::Compute,
            });
        }

        let mut stack = common::new_stack(StackType::Compute, results, opts)
            .with_description(format!("Function runtime hosting {} functions", results.len()));
        let network = common::stack_network(opts, StackType::Compute);
        let gateway = opts.prefixed("faas-gateway");
        let nats = opts.prefixed("faas-nats");
        let prometheus = opts.prefixed("faas-prometheus");

        let mut names = NameAllocator::new();
        for reserved in [&gateway, &nats, &prometheus] {
            names.reserve(reserved.as_str());
        }

        let mut functions = BTreeMap::new();
        let mut templates: Vec<&'static str> = Vec::new();
        for result in results {
            let name = names.allocate(&opts.prefixed(&common::normalize_name(&result.source_name)));
            let runtime = detect_runtime(result);
            let template = match runtime {
                Some(runtime) => runtime.template(),
                None => {
                    stack.add_warning(format!(
                        "{}: runtime not detected; built from its own Dockerfile",
                        result.source_name
                    ));
                    FALLBACK_TEMPLATE
                }
            };
            if !templates.contains(&template) {
                templates.push(template);
            }

            let environment = result
                .service
                .as_ref()
                .map(|s| s.environment.clone())
                .unwrap_or_default();
            let resources = resources_for(result);
            let image = format!("functions/{}:latest", name);

            let mut service = Service::new(&name, &image)
                .with_network(&network)
                .with_label("com.openfaas.function", &name)
                .with_label("skyfold.runtime", template)
                .with_env("exec_timeout", "60s")
                .depends_on(&gateway, "service_started");
            if let Some(timeout) = result.attribute_u64("timeout") {
                service = service.with_env("exec_timeout", format!("{}s", timeout));
            }
            for (key, value) in &environment {
                service = service.with_env(key, value);
            }
            service.read_only = true;
            service.deploy = resources.clone().map(|resources| Deploy {
                resources: Some(resources),
            });
            stack.add_service(service);

            stack.set_metadata(format!("function.{}", result.source_name), name.clone());
            stack.set_metadata(format!("runtime.{}", name), template);

            let mut labels = BTreeMap::new();
            labels.insert("com.openfaas.scale.min".to_string(), "1".to_string());
            functions.insert(
                name.clone(),
                FunctionSpec {
                    lang: template.to_string(),
                    handler: format!("./{}", name),
                    image,
                    environment,
                    limits: resources.as_ref().and_then(|r| r.limits.clone()),
                    requests: resources.and_then(|r| r.reservations),
                    labels,
                    readonly_root_filesystem: true,
                },
            );
        }
        debug!(functions = functions.len(), "Mapped functions to templates");

        // shared event bus and metrics, once per stack
        stack.add_service(
            Service::new(&nats, "nats-streaming:0.25.6")
                .with_command(["--store", "memory", "--cluster_id", "faas-cluster"])
                .with_network(&network),
        );
        stack.add_service(
            Service::new(&prometheus, "prom/prometheus:v2.51.0")
                .with_volume(format!("./{}:/etc/prometheus/prometheus.yml:ro", PROMETHEUS_CONFIG))
                .with_network(&network),
        );
        stack.add_service(
            Service::new(&gateway, "ghcr.io/openfaas/gateway:0.27.5")
                .with_port("8080:8080")
                .with_env("faas_nats_address", &nats)
                .with_env("basic_auth", "true")
                .with_network(&network)
                .depends_on(&nats, "service_started"),
        );

        let stack_file = StackFile {
            version: "1.0".to_string(),
            provider: ProviderSpec {
                name: "openfaas".to_string(),
                gateway: "http://127.0.0.1:8080".to_string(),
            },
            functions,
        };
        let yaml = serde_yaml::to_string(&stack_file).map_err(|e| MergeError::render(STACK_FILE, e))?;
        stack.add_config(STACK_FILE, yaml);
        stack.add_config(PROMETHEUS_CONFIG, prometheus_config(&gateway));
        stack.add_script(DEPLOY_SCRIPT, deploy_script(&templates));

        common::absorb_sources(&mut stack, results);

        stack.add_manual_step("Copy each function's source into its handler directory before deploying");
        stack.add_manual_step("Recreate event triggers (queues, schedules, HTTP routes) against the gateway");
        stack.add_manual_step("Functions run with a read-only filesystem; move any writes to /tmp or object storage");
        Ok(stack)
    }
}
