//! skyfold - consolidates mapped cloud resources into self-hosted deployment stacks
//!
//! The input is a flat list of [`MappingResult`]s, one per cloud resource, produced by an
//! external resource mapper. The [`Consolidator`] classifies every resource into a
//! [`StackType`], folds each group into one [`Stack`] through its [`Merger`], and returns a
//! dependency-ordered [`ConsolidatedResult`] for downstream generators.
//!
//! # Example
//!
//! ```no_run
//! use skyfold::{Consolidator, MappingResult, MergeOptions, StackType};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let results = vec![
//!     MappingResult::new("aws_db_instance", "orders"),
//!     MappingResult::new("google_sql_database_instance", "users"),
//!     MappingResult::new("aws_vpc", "main"),
//! ];
//!
//! let consolidated = Consolidator::default()
//!     .consolidate(&results, &MergeOptions::default())
//!     .await?;
//!
//! assert!(consolidated.has_stack(StackType::Database));
//! println!("{}", consolidated.to_yaml()?);
//! # Ok(())
//! # }
//! ```
//!
//! # Project Structure
//!
//! - [`taxonomy`]: providers, categories and the closed resource-type catalog
//! - [`classifier`]: resource to stack-type resolution and the coverage audit
//! - [`merger`]: the merger trait, registry and the eight stack mergers
//! - [`consolidator`]: orchestration of a consolidation run
//! - [`ordering`]: dependency ordering of stacks

pub mod classifier;
pub mod config;
pub mod consolidator;
pub mod error;
pub mod merger;
pub mod model;
pub mod ordering;
pub mod progress;
pub mod taxonomy;
pub mod util;

pub use classifier::{audit_coverage, Classification, ClassificationRule, CoverageReport, ResourceClassifier};
pub use config::{ConfigError, ConsolidatorConfig};
pub use consolidator::Consolidator;
pub use error::{ConsolidationError, MergeError};
pub use merger::{
    DatabaseEngine, DisabledStackPolicy, MergeContext, MergeOptions, Merger, MergerRegistry,
    MessagingBroker, StackDefinition, SupportService,
};
pub use model::{
    ConsolidatedResult, ConsolidationMetadata, MappingResult, Service, Stack, StackType,
};
pub use ordering::{order_stacks, StackOrder};
pub use progress::{ConsolidationEvent, LoggingHandler, NoOpHandler, ProgressHandler};
pub use taxonomy::{Category, Provider, ResourceType};
pub use util::{init_default, init_from_env, init_logging, LoggingConfig};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
