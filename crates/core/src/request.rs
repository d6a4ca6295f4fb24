//! Run creation requests and their validation.

use serde::Deserialize;

use crate::error::CoreError;
use crate::grid::{Coordinates, MAX_GRID_DIMENSION};
use crate::origin::OriginRequest;
use crate::types::DbId;

/// Maximum length of a tracked keyword.
const MAX_KEYWORD_LEN: usize = 255;

/// Input for creating a new rank sweep.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateRunRequest {
    pub business_id: DbId,
    pub keyword: String,
    pub grid_rows: u32,
    pub grid_cols: u32,
    pub radius_miles: Option<f64>,
    pub origin_lat: Option<f64>,
    pub origin_lng: Option<f64>,
    /// Preferred origin zone name.
    pub zone_name: Option<String>,
}

impl CreateRunRequest {
    /// Validate the request before anything is resolved or written.
    ///
    /// Rules:
    /// - Keyword must not be blank and must not exceed `MAX_KEYWORD_LEN`.
    /// - Rows and columns must be in `1..=MAX_GRID_DIMENSION`.
    /// - A supplied radius must be finite and positive.
    /// - Override coordinates come as a valid pair or not at all.
    pub fn validate(&self) -> Result<(), CoreError> {
        let keyword = self.keyword.trim();
        if keyword.is_empty() {
            return Err(CoreError::Validation("Keyword must not be empty".to_string()));
        }
        if keyword.len() > MAX_KEYWORD_LEN {
            return Err(CoreError::Validation(format!(
                "Keyword must not exceed {MAX_KEYWORD_LEN} characters"
            )));
        }
        for (label, value) in [("rows", self.grid_rows), ("cols", self.grid_cols)] {
            if !(1..=MAX_GRID_DIMENSION).contains(&value) {
                return Err(CoreError::Validation(format!(
                    "Grid {label} must be between 1 and {MAX_GRID_DIMENSION}, got {value}"
                )));
            }
        }
        if let Some(radius) = self.radius_miles {
            if !radius.is_finite() || radius <= 0.0 {
                return Err(CoreError::Validation(format!(
                    "Radius must be a positive number of miles, got {radius}"
                )));
            }
        }
        match (self.origin_lat, self.origin_lng) {
            (None, None) => {}
            (lat, lng) if Coordinates::from_parts(lat, lng).is_some() => {}
            _ => {
                return Err(CoreError::Validation(
                    "Origin override needs a valid latitude and longitude".to_string(),
                ))
            }
        }
        Ok(())
    }

    /// Origin resolver input derived from this request.
    pub fn origin_request(&self) -> OriginRequest {
        OriginRequest {
            override_coords: Coordinates::from_parts(self.origin_lat, self.origin_lng),
            override_radius: self.radius_miles,
            zone_name: self.zone_name.clone(),
            keyword: self.keyword.trim().to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn valid() -> CreateRunRequest {
        CreateRunRequest {
            business_id: 1,
            keyword: "massage".into(),
            grid_rows: 5,
            grid_cols: 5,
            radius_miles: Some(3.0),
            origin_lat: None,
            origin_lng: None,
            zone_name: None,
        }
    }

    #[test]
    fn valid_request_passes() {
        assert!(valid().validate().is_ok());
    }

    #[test]
    fn blank_keyword_rejected() {
        let req = CreateRunRequest {
            keyword: "   ".into(),
            ..valid()
        };
        assert_matches!(req.validate(), Err(CoreError::Validation(_)));
    }

    #[test]
    fn grid_dimensions_bounded() {
        for (rows, cols) in [(0, 5), (5, 0), (MAX_GRID_DIMENSION + 1, 5)] {
            let req = CreateRunRequest {
                grid_rows: rows,
                grid_cols: cols,
                ..valid()
            };
            assert!(req.validate().is_err(), "{rows}x{cols} should be rejected");
        }
    }

    #[test]
    fn non_positive_radius_rejected() {
        let req = CreateRunRequest {
            radius_miles: Some(0.0),
            ..valid()
        };
        assert!(req.validate().is_err());
    }

    #[test]
    fn half_override_rejected() {
        let req = CreateRunRequest {
            origin_lat: Some(34.0),
            ..valid()
        };
        assert!(req.validate().is_err());
    }

    #[test]
    fn origin_request_carries_override() {
        let req = CreateRunRequest {
            origin_lat: Some(34.0),
            origin_lng: Some(-112.0),
            keyword: " massage ".into(),
            ..valid()
        };
        let origin = req.origin_request();
        assert_eq!(origin.override_coords, Some(Coordinates::new(34.0, -112.0)));
        assert_eq!(origin.override_radius, Some(3.0));
        assert_eq!(origin.keyword, "massage");
    }
}
