//! Data model shared by the classifier, mergers and consolidator

pub mod mapping;
pub mod stack;

pub use mapping::{
    Deploy, Effect, HealthCheck, MappingResult, Network, PolicyStatement, ResourceSpec, Resources,
    Service, SourceResource, Volume,
};
pub use stack::{ConsolidatedResult, ConsolidationMetadata, Stack, StackType};
