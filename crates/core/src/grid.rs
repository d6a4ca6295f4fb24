//! Grid geometry for rank sweeps.
//!
//! Turns an origin, a radius and grid dimensions into the concrete set of
//! sampling coordinates. The grid is centered on the origin, spans the full
//! diameter along its longer axis, and is corrected for longitude
//! compression at the origin's latitude.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Spacing used when the radius is missing, non-finite, or not positive.
pub const DEFAULT_SPACING_MILES: f64 = 3.0;

/// Radius used when the caller supplies an origin without one.
pub const DEFAULT_RADIUS_MILES: f64 = 3.0;

/// Statute miles per degree of latitude.
pub const MILES_PER_DEGREE_LAT: f64 = 69.0;

/// Coordinates are rounded to this many decimal places (~0.11 m).
pub const COORDINATE_DECIMALS: i32 = 6;

/// Largest grid edge accepted by request validation.
pub const MAX_GRID_DIMENSION: u32 = 25;

/// Below this, `cos(lat)` is treated as zero and longitude steps collapse.
const COS_EPSILON: f64 = 1e-12;

// ---------------------------------------------------------------------------
// Coordinates
// ---------------------------------------------------------------------------

/// A WGS84 latitude/longitude pair in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinates {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Both components are finite and inside the valid degree ranges.
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lng)
    }

    /// Build coordinates from nullable columns, rejecting invalid values.
    pub fn from_parts(lat: Option<f64>, lng: Option<f64>) -> Option<Self> {
        let coords = Self::new(lat?, lng?);
        coords.is_valid().then_some(coords)
    }
}

// ---------------------------------------------------------------------------
// Grid points
// ---------------------------------------------------------------------------

/// One generated sample location, addressed by its row/column in the grid.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GridPoint {
    pub row_idx: i32,
    pub col_idx: i32,
    pub lat: f64,
    pub lng: f64,
}

/// Inputs for a grid build.
#[derive(Debug, Clone, Copy)]
pub struct GridSpec {
    pub origin: Coordinates,
    pub radius_miles: f64,
    pub rows: u32,
    pub cols: u32,
}

/// Result of a grid build: the spacing actually used plus every point in
/// row-major order.
#[derive(Debug, Clone)]
pub struct GridPlan {
    pub spacing_miles: f64,
    pub points: Vec<GridPoint>,
}

/// Compute the distance in miles between adjacent grid points.
///
/// The grid spans the full diameter along each axis, so spacing is
/// `diameter / (n - 1)` per axis (or the whole diameter for a single
/// row/column) and the larger of the two axes wins. Invalid radii fall back
/// to [`DEFAULT_SPACING_MILES`].
pub fn compute_spacing(radius_miles: f64, rows: u32, cols: u32) -> f64 {
    if !radius_miles.is_finite() || radius_miles <= 0.0 {
        return DEFAULT_SPACING_MILES;
    }
    let diameter = radius_miles * 2.0;
    let axis = |n: u32| {
        if n > 1 {
            diameter / f64::from(n - 1)
        } else {
            diameter
        }
    };
    axis(rows).max(axis(cols))
}

/// Build the grid described by `spec`.
///
/// Returns exactly `rows * cols` points in row-major order. Both dimensions
/// must be at least 1 and the origin must be valid.
pub fn build_grid(spec: &GridSpec) -> Result<GridPlan, CoreError> {
    if spec.rows == 0 || spec.cols == 0 {
        return Err(CoreError::Configuration(format!(
            "Grid dimensions must be at least 1x1, got {}x{}",
            spec.rows, spec.cols
        )));
    }
    if !spec.origin.is_valid() {
        return Err(CoreError::Configuration(format!(
            "Grid origin ({}, {}) is not a valid coordinate",
            spec.origin.lat, spec.origin.lng
        )));
    }

    let spacing_miles = compute_spacing(spec.radius_miles, spec.rows, spec.cols);
    let points = points_with_spacing(spec.origin, spacing_miles, spec.rows, spec.cols);
    Ok(GridPlan {
        spacing_miles,
        points,
    })
}

/// Lay out `rows * cols` points around `origin` at a fixed spacing.
///
/// Row 0 is the northernmost row and column 0 the westernmost column. At
/// latitudes where `cos(lat)` vanishes the longitude step becomes zero and
/// every column shares the origin's longitude; real business addresses never
/// sit at the poles.
pub fn points_with_spacing(
    origin: Coordinates,
    spacing_miles: f64,
    rows: u32,
    cols: u32,
) -> Vec<GridPoint> {
    let lat_step = spacing_miles / MILES_PER_DEGREE_LAT;
    let cos_lat = origin.lat.to_radians().cos();
    let lng_step = if cos_lat.abs() < COS_EPSILON {
        0.0
    } else {
        lat_step / cos_lat
    };

    let row_center = f64::from(rows.saturating_sub(1)) / 2.0;
    let col_center = f64::from(cols.saturating_sub(1)) / 2.0;

    let mut points = Vec::with_capacity(rows as usize * cols as usize);
    for row in 0..rows {
        let lat = origin.lat + (row_center - f64::from(row)) * lat_step;
        for col in 0..cols {
            let lng = origin.lng + (f64::from(col) - col_center) * lng_step;
            points.push(GridPoint {
                row_idx: row as i32,
                col_idx: col as i32,
                lat: round_coordinate(lat),
                lng: round_coordinate(lng),
            });
        }
    }
    points
}

/// Round a coordinate to [`COORDINATE_DECIMALS`] places.
pub fn round_coordinate(value: f64) -> f64 {
    let factor = 10f64.powi(COORDINATE_DECIMALS);
    (value * factor).round() / factor
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    fn spec(rows: u32, cols: u32, radius: f64) -> GridSpec {
        GridSpec {
            origin: Coordinates::new(34.6, -112.3),
            radius_miles: radius,
            rows,
            cols,
        }
    }

    // -- compute_spacing ------------------------------------------------------

    #[test]
    fn spacing_three_by_three_over_three_miles() {
        assert!((compute_spacing(3.0, 3, 3) - 3.0).abs() < 1e-12);
    }

    #[test]
    fn spacing_single_row_uses_full_diameter() {
        assert!((compute_spacing(2.5, 1, 1) - 5.0).abs() < 1e-12);
    }

    #[test]
    fn spacing_takes_larger_axis() {
        // rows: 6 / 6 = 1.0, cols: 6 / 2 = 3.0
        assert!((compute_spacing(3.0, 7, 3) - 3.0).abs() < 1e-12);
    }

    #[test]
    fn spacing_invalid_radius_falls_back() {
        for radius in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            assert_eq!(compute_spacing(radius, 5, 5), DEFAULT_SPACING_MILES);
        }
    }

    #[test]
    fn spacing_non_decreasing_in_radius() {
        for (rows, cols) in [(1, 1), (3, 3), (5, 7), (13, 13)] {
            let mut previous = 0.0;
            for step in 1..=40 {
                let radius = f64::from(step) * 0.25;
                let spacing = compute_spacing(radius, rows, cols);
                assert!(spacing >= previous, "{rows}x{cols} radius {radius}");
                previous = spacing;
            }
        }
    }

    // -- build_grid -----------------------------------------------------------

    #[test]
    fn three_by_three_centers_on_origin() {
        let plan = build_grid(&spec(3, 3, 3.0)).unwrap();
        assert_eq!(plan.points.len(), 9);
        assert!((plan.spacing_miles - 3.0).abs() < 1e-12);

        let center = plan
            .points
            .iter()
            .find(|p| p.row_idx == 1 && p.col_idx == 1)
            .unwrap();
        assert_eq!(center.lat, 34.6);
        assert_eq!(center.lng, -112.3);
    }

    #[test]
    fn point_count_and_unique_cells() {
        for rows in 1..=7 {
            for cols in 1..=7 {
                let plan = build_grid(&spec(rows, cols, 4.0)).unwrap();
                assert_eq!(plan.points.len(), (rows * cols) as usize);
                let cells: HashSet<(i32, i32)> =
                    plan.points.iter().map(|p| (p.row_idx, p.col_idx)).collect();
                assert_eq!(cells.len(), plan.points.len());
            }
        }
    }

    #[test]
    fn row_zero_is_north_and_col_zero_is_west() {
        let plan = build_grid(&spec(3, 3, 3.0)).unwrap();
        let first = plan.points[0];
        assert!(first.lat > 34.6);
        assert!(first.lng < -112.3);
        let lat_step = 3.0 / MILES_PER_DEGREE_LAT;
        assert!((first.lat - round_coordinate(34.6 + lat_step)).abs() < 1e-9);
    }

    #[test]
    fn longitude_step_is_latitude_corrected() {
        let plan = build_grid(&spec(1, 3, 3.0)).unwrap();
        let west = plan.points[0];
        let east = plan.points[2];
        let lat_span = 2.0 * 6.0 / MILES_PER_DEGREE_LAT;
        let lng_span = east.lng - west.lng;
        assert!(lng_span > lat_span, "longitude span should widen away from the equator");
    }

    #[test]
    fn coordinates_rounded_to_six_places() {
        let plan = build_grid(&spec(5, 5, 3.7)).unwrap();
        for p in &plan.points {
            assert_eq!(p.lat, round_coordinate(p.lat));
            assert_eq!(p.lng, round_coordinate(p.lng));
        }
    }

    #[test]
    fn zero_dimension_rejected() {
        assert!(build_grid(&spec(0, 3, 3.0)).is_err());
        assert!(build_grid(&spec(3, 0, 3.0)).is_err());
    }

    #[test]
    fn invalid_origin_rejected() {
        let mut s = spec(3, 3, 3.0);
        s.origin = Coordinates::new(f64::NAN, 0.0);
        assert!(build_grid(&s).is_err());
    }

    #[test]
    fn polar_origin_collapses_longitude() {
        let points = points_with_spacing(Coordinates::new(90.0, 10.0), 3.0, 1, 3);
        assert!(points.iter().all(|p| p.lng == 10.0));
    }

    #[test]
    fn from_parts_requires_both_components() {
        assert!(Coordinates::from_parts(Some(1.0), None).is_none());
        assert!(Coordinates::from_parts(Some(91.0), Some(0.0)).is_none());
        assert_eq!(
            Coordinates::from_parts(Some(1.0), Some(2.0)),
            Some(Coordinates::new(1.0, 2.0))
        );
    }
}
