//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async methods that take
//! a pool (or a held connection, for callers that pin one per run) as the
//! first argument.

pub mod business_repo;
pub mod origin_zone_repo;
pub mod point_repo;
pub mod run_repo;

pub use business_repo::BusinessRepo;
pub use origin_zone_repo::OriginZoneRepo;
pub use point_repo::GeoGridPointRepo;
pub use run_repo::GeoGridRunRepo;
