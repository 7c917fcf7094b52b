//! Domain Store: one module per Jobcan entity, each exposing
//! `create_tables`/`update`/`retrieve` over a `serde_json::Value` shaped
//! like the corresponding API response. Grounded on the `jobcan_di.database`
//! package; see DESIGN.md for the per-endpoint depth decisions.

pub mod companies;
pub mod fix_journal;
pub mod forms;
pub mod groups;
pub mod json_ext;
pub mod positions;
pub mod projects;
pub mod requests;
pub mod users;

use sqlx::SqlitePool;

use crate::errors::Result;

/// Registers every table this crate knows about, basic-data and request
/// schemas alike, so foreign keys resolve regardless of fetch order.
pub async fn create_all_tables(pool: &SqlitePool) -> Result<()> {
    users::create_tables(pool).await?;
    groups::create_tables(pool).await?;
    positions::create_tables(pool).await?;
    projects::create_tables(pool).await?;
    companies::create_tables(pool).await?;
    forms::create_tables(pool).await?;
    fix_journal::create_tables(pool).await?;
    requests::create_tables(pool).await?;
    Ok(())
}
