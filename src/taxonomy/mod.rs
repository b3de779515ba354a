//! Resource taxonomy: providers, categories and the closed catalog of resource types.
//!
//! Pure lookup tables. Every [`ResourceType`] belongs to exactly one [`Provider`] and one
//! [`Category`]; the catalog macro makes an uncategorised entry unrepresentable.

#[macro_use]
pub mod enum_macro;

pub mod resource_type;

pub use resource_type::ResourceType;

crate::define_label_enum! {
    /// Cloud provider a resource type originates from
    Provider {
        Aws => "aws" : "AWS" | "amazon",
        Gcp => "gcp" : "GCP" | "google",
        Azure => "azure" : "Azure" | "azurerm",
    }
}

impl Provider {
    /// Last-resort provider guess from a type identifier prefix.
    ///
    /// Only for identifiers missing from the catalog; known types answer through
    /// [`ResourceType::provider`].
    pub fn from_type_prefix(type_id: &str) -> Option<Self> {
        if type_id.starts_with("aws_") {
            Some(Provider::Aws)
        } else if type_id.starts_with("google_") {
            Some(Provider::Gcp)
        } else if type_id.starts_with("azurerm_") || type_id.starts_with("azuread_") {
            Some(Provider::Azure)
        } else {
            None
        }
    }
}

crate::define_label_enum! {
    /// Functional category of a resource type
    Category {
        Compute => "compute" : "Compute",
        Container => "container" : "Container",
        Kubernetes => "kubernetes" : "Kubernetes",
        ObjectStorage => "object_storage" : "Object Storage" | "object-storage",
        BlockStorage => "block_storage" : "Block Storage" | "block-storage",
        FileStorage => "file_storage" : "File Storage" | "file-storage",
        SqlDatabase => "sql_database" : "SQL Database" | "sql-database",
        NoSqlDatabase => "nosql_database" : "NoSQL Database" | "nosql-database",
        Cache => "cache" : "Cache",
        Queue => "queue" : "Queue",
        PubSub => "pubsub" : "Pub/Sub",
        Stream => "stream" : "Stream",
        EventBus => "event_bus" : "Event Bus" | "event-bus",
        Secrets => "secrets" : "Secrets",
        KeyManagement => "key_management" : "Key Management" | "key-management",
        Configuration => "configuration" : "Configuration",
        Identity => "identity" : "Identity",
        Iam => "iam" : "IAM",
        Networking => "networking" : "Networking",
        LoadBalancer => "load_balancer" : "Load Balancer" | "load-balancer",
        Dns => "dns" : "DNS",
        Cdn => "cdn" : "CDN",
        ApiGateway => "api_gateway" : "API Gateway" | "api-gateway",
        Monitoring => "monitoring" : "Monitoring",
        Logging => "logging" : "Logging",
        Search => "search" : "Search",
        Analytics => "analytics" : "Analytics",
        Workflow => "workflow" : "Workflow",
    }
}

/// Resolves a type identifier to its catalog entry.
pub fn lookup(type_id: &str) -> Option<ResourceType> {
    ResourceType::from_type_str(type_id)
}

/// All catalog entries belonging to a category.
pub fn types_in_category(category: Category) -> Vec<ResourceType> {
    ResourceType::all_variants()
        .iter()
        .copied()
        .filter(|t| t.category() == category)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_provider_serialization() {
        assert_eq!(serde_json::to_string(&Provider::Aws).unwrap(), "\"aws\"");
        let parsed: Provider = serde_json::from_str("\"azurerm\"").unwrap();
        assert_eq!(parsed, Provider::Azure);
    }

    #[test]
    fn test_category_from_name_aliases() {
        assert_eq!(Category::from_name("sql_database"), Some(Category::SqlDatabase));
        assert_eq!(Category::from_name("sql-database"), Some(Category::SqlDatabase));
        assert_eq!(Category::from_name("SQL Database"), Some(Category::SqlDatabase));
        assert_eq!(Category::from_name("warp_drive"), None);
    }

    #[test]
    fn test_provider_from_type_prefix() {
        assert_eq!(Provider::from_type_prefix("aws_new_thing"), Some(Provider::Aws));
        assert_eq!(Provider::from_type_prefix("google_x"), Some(Provider::Gcp));
        assert_eq!(Provider::from_type_prefix("azurerm_x"), Some(Provider::Azure));
        assert_eq!(Provider::from_type_prefix("oci_core_instance"), None);
    }

    #[test]
    fn test_type_identifiers_are_unique() {
        let mut seen = HashSet::new();
        for t in ResourceType::all_variants() {
            assert!(seen.insert(t.as_str()), "duplicate type id {}", t);
        }
    }

    #[test]
    fn test_type_prefix_matches_provider() {
        for t in ResourceType::all_variants() {
            assert_eq!(
                Provider::from_type_prefix(t.as_str()),
                Some(t.provider()),
                "{} declares the wrong provider",
                t
            );
        }
    }

    #[test]
    fn test_every_provider_is_represented() {
        for provider in Provider::all_variants() {
            assert!(ResourceType::all_variants()
                .iter()
                .any(|t| t.provider() == *provider));
        }
    }

    #[test]
    fn test_types_in_category() {
        let caches = types_in_category(Category::Cache);
        assert!(caches.contains(&ResourceType::AwsElasticacheCluster));
        assert!(caches.contains(&ResourceType::GoogleRedisInstance));
        assert!(caches.contains(&ResourceType::AzurermRedisCache));
        assert!(caches.iter().all(|t| t.category() == Category::Cache));
    }

    #[test]
    fn test_lookup() {
        assert_eq!(lookup("aws_sqs_queue"), Some(ResourceType::AwsSqsQueue));
        assert_eq!(lookup("aws_sqs"), None);
    }
}
