//! The declarative ETL pipeline: Pipeline Model (C5), TOML Parser (C6),
//! Transform Engine (C7) and Loader (C8).

pub mod loader;
pub mod model;
pub mod toml_parser;
pub mod transform;

pub use loader::{load_table, StoreOutcome};
pub use model::{
    DataLink, DataSource, DbDefinition, InsertionProfile, PipelineDefinition, ResultFormat, Source,
};
pub use toml_parser::parse_pipeline_toml;
pub use transform::{recursive_get, transform_named, transform_positional, ErrorHandling, KeyPath};
