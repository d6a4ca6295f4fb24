//! Measurement task wire protocol.
//!
//! The orchestrator hands each isolated measurement task a
//! [`MeasureRequest`] as JSON on stdin, the rank-resolver collaborator
//! answers with a [`ResolverOutput`] on stdout, and the task reports back
//! to the dispatcher with a [`TaskOutcome`].

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::grid::Coordinates;
use crate::rank::rank_from_json;
use crate::types::DbId;

/// A grid point waiting to be measured.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointTarget {
    pub point_id: DbId,
    pub row_idx: i32,
    pub col_idx: i32,
    pub coords: Coordinates,
}

/// Collaborator settings forwarded with every request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeasureConfig {
    pub proxy: Option<String>,
    pub business_id: DbId,
    pub business_name: String,
}

/// Input for one rank measurement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeasureRequest {
    pub run_id: DbId,
    pub point_id: DbId,
    pub keyword: String,
    pub origin: Coordinates,
    pub config: MeasureConfig,
}

/// What the rank-resolver collaborator prints on success.
///
/// Only `rank` is part of the required contract; the rest are optional
/// artifacts persisted alongside the point.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResolverOutput {
    pub rank: Value,
    pub place_id: Option<String>,
    pub payload: Option<Value>,
    pub capture_path: Option<String>,
    pub search_url: Option<String>,
    pub landing_url: Option<String>,
}

/// Optional capture artifacts for a measured point.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Artifacts {
    pub capture_path: Option<String>,
    pub search_url: Option<String>,
    pub landing_url: Option<String>,
}

impl Artifacts {
    pub fn is_empty(&self) -> bool {
        self.capture_path.is_none() && self.search_url.is_none() && self.landing_url.is_none()
    }
}

/// A normalized measurement ready to persist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    /// Positive rank, or `None` when the business was not found.
    pub rank: Option<i32>,
    pub place_id: Option<String>,
    /// Structured result payload stored as-is.
    pub payload: Value,
    pub artifacts: Artifacts,
}

impl From<ResolverOutput> for Measurement {
    fn from(output: ResolverOutput) -> Self {
        let rank = rank_from_json(&output.rank);
        let payload = output
            .payload
            .unwrap_or_else(|| serde_json::json!({ "rank": output.rank }));
        Self {
            rank,
            place_id: output.place_id,
            payload,
            artifacts: Artifacts {
                capture_path: output.capture_path,
                search_url: output.search_url,
                landing_url: output.landing_url,
            },
        }
    }
}

/// Message a measurement task sends back to the dispatcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase", rename_all_fields = "camelCase")]
pub enum TaskOutcome {
    Done {
        point_id: DbId,
        measurement: Measurement,
    },
    Error {
        point_id: DbId,
        message: String,
    },
}

impl TaskOutcome {
    pub fn point_id(&self) -> DbId {
        match self {
            Self::Done { point_id, .. } | Self::Error { point_id, .. } => *point_id,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
