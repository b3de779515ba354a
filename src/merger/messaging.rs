//! Queues, topics, event buses and streams folded into one broker topology
//!
//! | Source | Broker object |
//! |---|---|
//! | queue | durable queue |
//! | pub/sub topic | topic exchange + `<name>-default` queue bound with `#` |
//! | event bus | headers exchange |
//! | event rule / trigger | queue bound to its bus |
//! | stream | stream queue with `x-max-age` |
//!
//! A dead-letter exchange, its queue and a policy routing every other queue into it are
//! always present.

use super::common::{self, NameAllocator};
use super::{MergeContext, MergeOptions, Merger};
use crate::error::MergeError;
use crate::model::{HealthCheck, MappingResult, Service, Stack, StackType, Volume};
use crate::taxonomy::{Category, ResourceType};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use tracing::debug;

pub const DEFINITIONS_PATH: &str = "rabbitmq/definitions.json";
pub const CONF_PATH: &str = "rabbitmq/rabbitmq.conf";
pub const PLUGINS_PATH: &str = "rabbitmq/enabled_plugins";
pub const MIGRATE_SCRIPT: &str = "scripts/migrate-messaging.sh";

pub const DEAD_LETTER_EXCHANGE: &str = "dlx";
pub const DEAD_LETTER_QUEUE: &str = "dlq";

const VHOST: &str = "/";
const DEFAULT_STREAM_RETENTION: &str = "7D";

pub struct MessagingMerger;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeDef {
    pub name: String,
    pub vhost: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub durable: bool,
    pub auto_delete: bool,
    pub internal: bool,
    pub arguments: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueDef {
    pub name: String,
    pub vhost: String,
    pub durable: bool,
    pub auto_delete: bool,
    pub arguments: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BindingDef {
    pub source: String,
    pub vhost: String,
    pub destination: String,
    pub destination_type: String,
    pub routing_key: String,
    pub arguments: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyDef {
    pub vhost: String,
    pub name: String,
    pub pattern: String,
    #[serde(rename = "apply-to")]
    pub apply_to: String,
    pub definition: Map<String, Value>,
    pub priority: i32,
}

/// Broker definitions document, importable at broker start
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Topology {
    pub vhosts: Vec<Value>,
    pub exchanges: Vec<ExchangeDef>,
    pub queues: Vec<QueueDef>,
    pub bindings: Vec<BindingDef>,
    pub policies: Vec<PolicyDef>,
}

impl Topology {
    pub fn exchange(&self, name: &str) -> Option<&ExchangeDef> {
        self.exchanges.iter().find(|e| e.name == name)
    }

    pub fn queue(&self, name: &str) -> Option<&QueueDef> {
        self.queues.iter().find(|q| q.name == name)
    }

    fn add_exchange(&mut self, name: &str, kind: &str) {
        self.exchanges.push(ExchangeDef {
            name: name.to_string(),
            vhost: VHOST.to_string(),
            kind: kind.to_string(),
            durable: true,
            auto_delete: false,
            internal: false,
            arguments: Map::new(),
        });
    }

    fn add_queue(&mut self, name: &str, arguments: Map<String, Value>) {
        self.queues.push(QueueDef {
            name: name.to_string(),
            vhost: VHOST.to_string(),
            durable: true,
            auto_delete: false,
            arguments,
        });
    }

    fn bind(&mut self, exchange: &str, queue: &str, routing_key: &str, arguments: Map<String, Value>) {
        self.bindings.push(BindingDef {
            source: exchange.to_string(),
            vhost: VHOST.to_string(),
            destination: queue.to_string(),
            destination_type: "queue".to_string(),
            routing_key: routing_key.to_string(),
            arguments,
        });
    }

    fn add_dead_lettering(&mut self) {
        self.add_exchange(DEAD_LETTER_EXCHANGE, "fanout");
        self.add_queue(DEAD_LETTER_QUEUE, Map::new());
        self.bind(DEAD_LETTER_EXCHANGE, DEAD_LETTER_QUEUE, "", Map::new());

        let mut definition = Map::new();
        definition.insert("dead-letter-exchange".to_string(), json!(DEAD_LETTER_EXCHANGE));
        self.policies.push(PolicyDef {
            vhost: VHOST.to_string(),
            name: "dead-letter".to_string(),
            pattern: format!("^(?!{}$).*", DEAD_LETTER_QUEUE),
            apply_to: "queues".to_string(),
            definition,
            priority: 0,
        });
    }
}

/// How a single source resource lands in the broker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shape {
    Queue,
    Topic,
    Bus,
    Rule,
    Stream,
    /// A whole managed broker or namespace; it has no topology of its own
    Namespace,
}

fn shape_of(result: &MappingResult) -> Shape {
    match result.resource_type() {
        Some(ResourceType::AwsMqBroker)
        | Some(ResourceType::AzurermServicebusNamespace)
        | Some(ResourceType::AzurermEventhubNamespace) => Shape::Namespace,
        Some(ResourceType::AwsCloudwatchEventRule) | Some(ResourceType::GoogleEventarcTrigger) => {
            Shape::Rule
        }
        _ => match result.category() {
            Some(Category::PubSub) => Shape::Topic,
            Some(Category::EventBus) => Shape::Bus,
            Some(Category::Stream) => Shape::Stream,
            _ => Shape::Queue,
        },
    }
}

fn queue_arguments(result: &MappingResult) -> Map<String, Value> {
    let mut args = Map::new();
    if let Some(seconds) = result.attribute_u64("message_retention_seconds") {
        args.insert("x-message-ttl".to_string(), json!(seconds.saturating_mul(1000)));
    }
    if result.attribute_bool("fifo_queue").unwrap_or(false) {
        args.insert("x-single-active-consumer".to_string(), json!(true));
    }
    if let Some(max) = result.attribute_u64("max_receive_count") {
        args.insert("x-delivery-limit".to_string(), json!(max));
        args.insert("x-queue-type".to_string(), json!("quorum"));
    }
    args
}

/// Stream retention as a broker max-age: hours, then days, then the default.
fn stream_max_age(result: &MappingResult) -> String {
    if let Some(hours) = result.attribute_u64("retention_period") {
        format!("{}h", hours)
    } else if let Some(days) = result
        .attribute_u64("message_retention")
        .or_else(|| result.attribute_u64("retention_days"))
    {
        format!("{}D", days)
    } else {
        DEFAULT_STREAM_RETENTION.to_string()
    }
}

/// Builds the broker topology from every source resource, in input order.
pub fn build_topology(results: &[MappingResult], stack: &mut Stack) -> Topology {
    let mut topology = Topology {
        vhosts: vec![json!({ "name": VHOST })],
        ..Default::default()
    };
    let mut exchanges = NameAllocator::new();
    let mut queues = NameAllocator::new();
    exchanges.reserve(DEAD_LETTER_EXCHANGE);
    queues.reserve(DEAD_LETTER_QUEUE);

    // rules bind to buses declared anywhere in the group
    let mut bus_names: BTreeMap<String, String> = BTreeMap::new();
    let mut rules = Vec::new();

    for result in results {
        let base = common::normalize_name(&result.source_name);
        match shape_of(result) {
            Shape::Queue => {
                let name = queues.allocate(&base);
                if result.attribute_u64("delay_seconds").unwrap_or(0) > 0 {
                    stack.add_warning(format!(
                        "{}: delivery delay has no broker equivalent without the delayed-message plugin",
                        result.source_name
                    ));
                }
                topology.add_queue(&name, queue_arguments(result));
                stack.set_metadata(format!("queue.{}", result.source_name), name);
            }
            Shape::Topic => {
                let exchange = exchanges.allocate(&base);
                let queue = queues.allocate(&format!("{}-default", exchange));
                topology.add_exchange(&exchange, "topic");
                topology.add_queue(&queue, Map::new());
                topology.bind(&exchange, &queue, "#", Map::new());
                stack.set_metadata(format!("exchange.{}", result.source_name), exchange);
            }
            Shape::Bus => {
                let exchange = exchanges.allocate(&base);
                topology.add_exchange(&exchange, "headers");
                bus_names.insert(result.source_name.clone(), exchange.clone());
                stack.set_metadata(format!("exchange.{}", result.source_name), exchange);
            }
            Shape::Stream => {
                let name = queues.allocate(&base);
                let mut args = Map::new();
                args.insert("x-queue-type".to_string(), json!("stream"));
                args.insert("x-max-age".to_string(), json!(stream_max_age(result)));
                topology.add_queue(&name, args);
                stack.set_metadata(format!("stream.{}", result.source_name), name);
            }
            Shape::Rule => rules.push(result),
            Shape::Namespace => {
                stack.add_warning(format!(
                    "{}: managed broker namespace folded into the shared broker; its entities must be declared explicitly",
                    result.source_name
                ));
            }
        }
    }

    for result in rules {
        let bus = result
            .attribute_str("event_bus_name")
            .unwrap_or("default")
            .to_string();
        let exchange = match bus_names.get(&bus) {
            Some(exchange) => exchange.clone(),
            None => {
                let exchange = exchanges.allocate(&common::normalize_name(&bus));
                topology.add_exchange(&exchange, "headers");
                bus_names.insert(bus.clone(), exchange.clone());
                exchange
            }
        };
        let queue = queues.allocate(&common::normalize_name(&result.source_name));
        topology.add_queue(&queue, Map::new());

        let mut args = Map::new();
        args.insert("x-match".to_string(), json!("any"));
        if let Some(source) = result.attribute_str("event_source") {
            args.insert("source".to_string(), json!(source));
        }
        topology.bind(&exchange, &queue, "", args);
        stack.add_warning(format!(
            "{}: event pattern translated to header matching only; review the binding arguments",
            result.source_name
        ));
        stack.set_metadata(format!("queue.{}", result.source_name), queue);
    }

    topology.add_dead_lettering();
    topology
}

fn rabbitmq_conf() -> String {
    let mut conf = String::new();
    conf.push_str("load_definitions = /etc/rabbitmq/definitions.json\n");
    conf.push_str("management.tcp.port = 15672\n");
    conf.push_str("stream.listeners.tcp.1 = 5552\n");
    conf.push_str("vm_memory_high_watermark.relative = 0.6\n");
    conf
}

fn migration_script(broker: &str, results: &[MappingResult], topology: &Topology) -> String {
    let mut script = common::script_header("Verifies the broker topology and lists source entities to drain");
    script.push_str(&format!("BROKER_HOST=\"${{BROKER_HOST:-{}}}\"\n", broker));
    script.push_str("RABBITMQ_USER=\"${RABBITMQ_USER:-admin}\"\n");
    script.push_str("RABBITMQ_PASS=\"${RABBITMQ_PASS:?set RABBITMQ_PASS}\"\n\n");
    script.push_str("admin() {\n  rabbitmqadmin -H \"$BROKER_HOST\" -u \"$RABBITMQ_USER\" -p \"$RABBITMQ_PASS\" \"$@\"\n}\n\n");

    script.push_str("# Drain these source entities before switching producers:\n");
    for result in results {
        script.push_str(&format!("#   {} ({})\n", result.source_name, result.source_type));
    }
    script.push('\n');

    for queue in &topology.queues {
        script.push_str(&format!(
            "admin list queues name | grep -qx {} || {{ echo \"missing queue {}\" >&2; exit 1; }}\n",
            common::shell_quote(&queue.name),
            queue.name
        ));
    }
    for exchange in &topology.exchanges {
        script.push_str(&format!(
            "admin list exchanges name | grep -qx {} || {{ echo \"missing exchange {}\" >&2; exit 1; }}\n",
            common::shell_quote(&exchange.name),
            exchange.name
        ));
    }
    script.push_str("\necho \"broker topology verified\"\n");
    script
}

#[async_trait]
impl Merger for MessagingMerger {
    fn stack_type(&self) -> StackType {
        StackType::Messaging
    }

    fn can_merge(&self, results: &[MappingResult]) -> bool {
        common::any_applicable(
            results,
            |t| {
                matches!(
                    t.category(),
                    Category::Queue | Category::PubSub | Category::Stream | Category::EventBus
                )
            },
            &["queue", "topic", "sqs", "sns", "pubsub", "stream", "kinesis", "eventbus", "servicebus", "eventhub"],
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
                stack_type: StackType::Messaging,
            });
        }

        let mut stack = common::new_stack(StackType::Messaging, results, opts)
            .with_description("Single message broker replacing queues, topics, buses and streams");
        let broker = opts.prefixed("rabbitmq");

        let topology = build_topology(results, &mut stack);
        debug!(
            exchanges = topology.exchanges.len(),
            queues = topology.queues.len(),
            "Built broker topology"
        );

        let definitions = serde_json::to_string_pretty(&topology)
            .map_err(|e| MergeError::render(DEFINITIONS_PATH, e))?;
        stack.add_config(DEFINITIONS_PATH, definitions);
        stack.add_config(CONF_PATH, rabbitmq_conf());
        stack.add_config(PLUGINS_PATH, "[rabbitmq_management,rabbitmq_stream].\n");
        stack.add_script(MIGRATE_SCRIPT, migration_script(&broker, results, &topology));

        let service = Service::new(&broker, "rabbitmq:3.13-management-alpine")
            .with_port("5672:5672")
            .with_port("15672:15672")
            .with_port("5552:5552")
            .with_env("RABBITMQ_DEFAULT_USER", "admin")
            .with_env("RABBITMQ_DEFAULT_PASS", "${RABBITMQ_PASS:-changeme}")
            .with_volume(format!("{}-data:/var/lib/rabbitmq", broker))
            .with_volume(format!("./{}:/etc/rabbitmq/definitions.json:ro", DEFINITIONS_PATH))
            .with_volume(format!("./{}:/etc/rabbitmq/rabbitmq.conf:ro", CONF_PATH))
            .with_volume(format!("./{}:/etc/rabbitmq/enabled_plugins:ro", PLUGINS_PATH))
            .with_network(common::stack_network(opts, StackType::Messaging))
            .with_healthcheck(HealthCheck::shell("rabbitmq-diagnostics -q ping").with_start_period("20s"));
        stack.add_volume(Volume::named(format!("{}-data", broker)));
        stack.add_service(service);

        stack.set_metadata("broker", opts.messaging_broker.as_str());
        stack.set_metadata("exchanges", topology.exchanges.len().to_string());
        stack.set_metadata("queues", topology.queues.len().to_string());

        common::absorb_sources(&mut stack, results);

        stack.add_manual_step("Drain in-flight messages from every source queue and subscription before cutover");
        stack.add_manual_step(format!(
            "Switch producers and consumers to AMQP at amqp://{}:5672 (streams on port 5552)",
            broker
        ));
        stack.add_manual_step("Set RABBITMQ_PASS and rotate the source access keys");
        Ok(stack)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn merge(results: &[MappingResult]) -> Stack {
        MessagingMerger
            .merge(&MergeContext::new(), results, &MergeOptions::default())
            .await
            .unwrap()
    }

    fn topology(stack: &Stack) -> Topology {
        serde_json::from_str(&stack.configs[DEFINITIONS_PATH]).unwrap()
    }

    #[tokio::test]
    async fn test_queue_and_topic() {
        let results = vec![
            MappingResult::new("aws_sqs_queue", "orders-q"),
            MappingResult::new("aws_sns_topic", "orders-topic"),
        ];
        let stack = merge(&results).await;
        let topo = topology(&stack);

        let queue = topo.queue("orders-q").unwrap();
        assert!(queue.durable);
        assert_eq!(topo.exchange("orders-topic").unwrap().kind, "topic");
        assert!(topo.queue("orders-topic-default").is_some());
        assert!(topo.bindings.iter().any(|b| b.source == "orders-topic"
            && b.destination == "orders-topic-default"
            && b.routing_key == "#"));
    }

    #[tokio::test]
    async fn test_dead_lettering_always_present() {
        let stack = merge(&[MappingResult::new("aws_sqs_queue", "jobs")]).await;
        let topo = topology(&stack);
        assert!(topo.exchange(DEAD_LETTER_EXCHANGE).is_some());
        assert!(topo.queue(DEAD_LETTER_QUEUE).is_some());
        assert_eq!(topo.policies.len(), 1);
        assert_eq!(topo.policies[0].definition["dead-letter-exchange"], json!("dlx"));
    }

    #[tokio::test]
    async fn test_bus_and_stream() {
        let results = vec![
            MappingResult::new("aws_cloudwatch_event_bus", "events"),
            MappingResult::new("aws_kinesis_stream", "clicks").with_attribute("retention_period", 48),
            MappingResult::new("azurerm_eventhub", "telemetry").with_attribute("message_retention", 3),
        ];
        let stack = merge(&results).await;
        let topo = topology(&stack);

        assert_eq!(topo.exchange("events").unwrap().kind, "headers");
        let clicks = topo.queue("clicks").unwrap();
        assert_eq!(clicks.arguments["x-queue-type"], json!("stream"));
        assert_eq!(clicks.arguments["x-max-age"], json!("48h"));
        assert_eq!(topo.queue("telemetry").unwrap().arguments["x-max-age"], json!("3D"));
    }

    #[tokio::test]
    async fn test_queue_attributes_translate() {
        let results = vec![MappingResult::new("aws_sqs_queue", "payments.fifo")
            .with_attribute("message_retention_seconds", 60)
            .with_attribute("fifo_queue", true)];
        let stack = merge(&results).await;
        let queue = topology(&stack).queue("payments-fifo").cloned().unwrap();
        assert_eq!(queue.arguments["x-message-ttl"], json!(60_000));
        assert_eq!(queue.arguments["x-single-active-consumer"], json!(true));
    }

    #[tokio::test]
    async fn test_huge_retention_saturates() {
        let results = vec![MappingResult::new("aws_sqs_queue", "archive")
            .with_attribute("message_retention_seconds", u64::MAX)];
        let stack = merge(&results).await;
        let queue = topology(&stack).queue("archive").cloned().unwrap();
        assert_eq!(queue.arguments["x-message-ttl"], json!(u64::MAX));
    }

    #[tokio::test]
    async fn test_rule_binds_to_declared_bus() {
        let results = vec![
            MappingResult::new("aws_cloudwatch_event_rule", "on-signup").with_attribute("event_bus_name", "app-bus"),
            MappingResult::new("aws_cloudwatch_event_bus", "app-bus"),
        ];
        let stack = merge(&results).await;
        let topo = topology(&stack);
        assert_eq!(topo.exchanges.iter().filter(|e| e.name.starts_with("app-bus")).count(), 1);
        assert!(topo
            .bindings
            .iter()
            .any(|b| b.source == "app-bus" && b.destination == "on-signup"));
    }

    #[tokio::test]
    async fn test_duplicate_names_get_suffixes() {
        let results = vec![
            MappingResult::new("aws_sqs_queue", "events"),
            MappingResult::new("azurerm_servicebus_queue", "events"),
            MappingResult::new("aws_sqs_queue", "dlq"),
        ];
        let topo = topology(&merge(&results).await);
        assert!(topo.queue("events").is_some());
        assert!(topo.queue("events-2").is_some());
        assert!(topo.queue("dlq-2").is_some());
    }
}
