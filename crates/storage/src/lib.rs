//! PostgreSQL implementation of the engine's store contracts.
//!
//! [`PgStore`] implements every trait in `heatwatch_core::store` over a
//! shared `PgPool`. Queries are plain runtime SQL bound with `query_as`;
//! rows land in `FromRow` structs and are converted into core types, with
//! unparseable enum columns surfacing as `StoreError::Decode`.

pub mod db;
mod error;
mod pg;
mod rows;

pub use db::init_pg_pool;
pub use pg::PgStore;
