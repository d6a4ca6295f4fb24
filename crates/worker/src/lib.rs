//! Geo-grid sweep orchestrator.
//!
//! A sweep takes the process lock, loads every queued or running run and
//! measures its unranked grid points through a bounded pool of isolated
//! rank-resolver tasks, writing results through the schema-tolerant
//! [`geogrid_db::persistence::PointWriter`].

pub mod config;
pub mod error;
pub mod executor;
pub mod launch;
pub mod lifecycle;
pub mod lock;
pub mod orchestrator;
pub mod planner;
pub mod pool;
pub mod sequential;
pub mod shutdown;
pub mod sink;
