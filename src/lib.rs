//! # jobcan-di
//!
//! Resumable ETL integrator that harvests Jobcan workflow data into SQLite.
//!
//! ## Overview
//!
//! jobcan-di walks the Jobcan workflow API in a fixed order — basic data,
//! form outlines, then form details — and mirrors every record into a local
//! SQLite database. A run can be interrupted at any point: progress is
//! write-through persisted after every item, so the next invocation resumes
//! exactly where the last one left off instead of starting over.
//!
//! ## Quick Start
//!
//! ```no_run
//! use jobcan_di::cmd::Cli;
//! use clap::Parser;
//!
//! #[tokio::main]
//! async fn main() -> jobcan_di::Result<()> {
//!     Cli::parse().run().await
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! HTTP Fetcher → Gateway → Domain Store (SQLite)
//!                   ^
//!            Status Model / Temp Store (resumption)
//! ```
//!
//! - **Rate Limiter / HTTP Fetcher**: throttled, classified GETs against the
//!   Jobcan API.
//! - **Gateway**: paginates one endpoint at a time, archives raw responses,
//!   and hands each item to the Domain Store.
//! - **Domain Store**: per-entity SQLite schema and `create_tables` /
//!   `update` / `retrieve` operations.
//! - **Status Model / Temp Store**: the on-disk cursor and in-flight form
//!   outline state that make a run resumable.
//! - **Integrator**: the top-level driver that walks the stages in order.

// Public API exports
pub use errors::{JdiError, Result};

// Public modules
pub mod api_type;
pub mod cmd;
pub mod config;
pub mod csv_import;
pub mod domain;
pub mod errors;
pub mod gateway;
pub mod http;
pub mod integrator;
pub mod log;
pub mod pipeline;
pub mod rate_limiter;
pub mod schema;
pub mod sink;
pub mod status;
pub mod temp_store;
