//! Pure domain logic for geo-grid rank tracking.
//!
//! Nothing in this crate touches the database or spawns processes. Grid
//! geometry, origin resolution, rank normalization, retry timing and the
//! measurement wire protocol all live here so they can be tested in
//! isolation and shared by the `db` and `worker` crates.

pub mod error;
pub mod grid;
pub mod measure;
pub mod origin;
pub mod rank;
pub mod request;
pub mod retry;
pub mod types;
