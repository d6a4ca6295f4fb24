//! Row types and DTOs for the geo-grid tables.

pub mod business;
pub mod origin_zone;
pub mod point;
pub mod run;
pub mod status;
