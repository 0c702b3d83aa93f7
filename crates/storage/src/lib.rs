//! Persistence for cohorts, forms, field values and memberships.
//!
//! [`CohortStore`] is the seam the engine talks to. [`PgCohortStore`] backs it
//! with PostgreSQL; [`MemoryStore`] keeps everything in process for local runs
//! and tests.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod store;

pub use error::StorageError;
pub use memory::MemoryStore;
pub use postgres::PgCohortStore;
pub use store::CohortStore;
