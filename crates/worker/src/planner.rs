//! Turning a request or a stored run into concrete grid points.
//!
//! [`plan_run`] is the caller-side entry point: it validates a request,
//! resolves the origin and writes the run with its full grid in one
//! transaction. [`ensure_grid`] is used by the sweep for runs that were
//! stored without points.

use geogrid_core::error::CoreError;
use geogrid_core::grid::{build_grid, GridSpec, DEFAULT_RADIUS_MILES, MAX_GRID_DIMENSION};
use geogrid_core::origin::{resolve_origin, OriginRequest, ResolvedOrigin};
use geogrid_core::request::CreateRunRequest;
use geogrid_core::types::DbId;
use geogrid_db::models::run::{CreateGeoGridRun, GeoGridRun, RunOrigin};
use geogrid_db::repositories::{BusinessRepo, GeoGridPointRepo, GeoGridRunRepo, OriginZoneRepo};
use geogrid_db::DbPool;
use sqlx::{Connection, PgConnection};

use crate::error::OrchestratorError;

/// Grid state of a run after [`ensure_grid`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GridState {
    /// Points were already stored.
    Existing(i64),
    /// Points were built and inserted now.
    Built(u64),
    /// A dimension is zero; there is nothing to measure.
    Empty,
}

/// Validate `request`, resolve its origin and store the run with all of
/// its points.
///
/// Nothing is written if validation or origin resolution fails.
pub async fn plan_run(pool: &DbPool, request: &CreateRunRequest) -> Result<GeoGridRun, OrchestratorError> {
    request.validate()?;

    let mut tx = pool.begin().await?;
    let origin = resolve_for_business(&mut tx, request.business_id, &request.origin_request()).await?;

    let plan = build_grid(&GridSpec {
        origin: origin.coords,
        radius_miles: origin.radius_miles,
        rows: request.grid_rows,
        cols: request.grid_cols,
    })?;

    let run = GeoGridRunRepo::create(
        &mut *tx,
        &CreateGeoGridRun {
            business_id: request.business_id,
            keyword: request.keyword.trim().to_string(),
            origin_lat: Some(origin.coords.lat),
            origin_lng: Some(origin.coords.lng),
            radius_miles: Some(origin.radius_miles),
            grid_rows: request.grid_rows as i32,
            grid_cols: request.grid_cols as i32,
            spacing_miles: Some(plan.spacing_miles),
        },
    )
    .await?;
    let inserted = GeoGridPointRepo::insert_grid(&mut *tx, run.id, &plan.points).await?;
    tx.commit().await?;

    tracing::info!(
        run_id = run.id,
        business_id = run.business_id,
        points = inserted,
        spacing_miles = plan.spacing_miles,
        source = ?origin.source,
        "Geo-grid run planned",
    );
    Ok(run)
}

/// Make sure a stored run has its grid.
///
/// A run without points gets them built from its stored origin. A run with
/// no stored origin has it resolved now, and the result is written back so
/// later sweeps see the same center.
pub async fn ensure_grid(conn: &mut PgConnection, run: &GeoGridRun) -> Result<GridState, OrchestratorError> {
    let existing = GeoGridPointRepo::count_for_run(&mut *conn, run.id).await?;
    if existing > 0 {
        return Ok(GridState::Existing(existing));
    }

    let Some((rows, cols)) = grid_dimensions(run.grid_rows, run.grid_cols)? else {
        return Ok(GridState::Empty);
    };

    let mut tx = conn.begin().await?;

    let (origin, radius_miles, resolved) = match run.origin() {
        Some(coords) => (coords, run.radius_miles.unwrap_or(DEFAULT_RADIUS_MILES), false),
        None => {
            let request = OriginRequest {
                override_radius: run.radius_miles,
                keyword: run.keyword.clone(),
                ..Default::default()
            };
            let origin = resolve_for_business(&mut tx, run.business_id, &request).await?;
            (origin.coords, origin.radius_miles, true)
        }
    };

    let plan = build_grid(&GridSpec {
        origin,
        radius_miles,
        rows,
        cols,
    })?;
    let inserted = GeoGridPointRepo::insert_grid(&mut *tx, run.id, &plan.points).await?;

    if resolved {
        let run_origin = RunOrigin {
            coords: origin,
            radius_miles,
            spacing_miles: plan.spacing_miles,
        };
        GeoGridRunRepo::set_origin(&mut *tx, run.id, &run_origin).await?;
    } else {
        GeoGridRunRepo::set_spacing(&mut *tx, run.id, plan.spacing_miles).await?;
    }
    tx.commit().await?;

    tracing::info!(
        run_id = run.id,
        points = inserted,
        spacing_miles = plan.spacing_miles,
        resolved_origin = resolved,
        "Grid built for run",
    );
    Ok(GridState::Built(inserted))
}

/// Resolve the origin for a business from its zones and destination.
async fn resolve_for_business(
    conn: &mut PgConnection,
    business_id: DbId,
    request: &OriginRequest,
) -> Result<ResolvedOrigin, OrchestratorError> {
    let business = BusinessRepo::find_by_id(&mut *conn, business_id)
        .await?
        .ok_or(CoreError::NotFound {
            entity: "business",
            id: business_id,
        })?;

    let zones = if request.override_coords.is_some() {
        Vec::new()
    } else {
        OriginZoneRepo::resolver_zones(&mut *conn, business_id).await?
    };

    resolve_origin(request, &zones, business.destination()).ok_or_else(|| {
        CoreError::Configuration(format!(
            "No origin for business {business_id}: no override, no zone with coordinates and no destination"
        ))
        .into()
    })
}

/// Stored dimensions as grid sizes. `None` means an empty grid.
fn grid_dimensions(rows: i32, cols: i32) -> Result<Option<(u32, u32)>, CoreError> {
    let (Ok(r), Ok(c)) = (u32::try_from(rows), u32::try_from(cols)) else {
        return Err(CoreError::Configuration(format!(
            "Grid dimensions must not be negative, got {rows}x{cols}"
        )));
    };
    if r == 0 || c == 0 {
        return Ok(None);
    }
    if r > MAX_GRID_DIMENSION || c > MAX_GRID_DIMENSION {
        return Err(CoreError::Configuration(format!(
            "Grid dimensions must not exceed {MAX_GRID_DIMENSION}, got {rows}x{cols}"
        )));
    }
    Ok(Some((r, c)))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn zero_dimension_is_empty_grid() {
        assert_eq!(grid_dimensions(0, 5).unwrap(), None);
        assert_eq!(grid_dimensions(5, 0).unwrap(), None);
    }

    #[test]
    fn negative_dimension_is_configuration_error() {
        assert_matches!(grid_dimensions(-1, 3), Err(CoreError::Configuration(_)));
    }

    #[test]
    fn oversized_dimension_is_configuration_error() {
        assert_matches!(grid_dimensions(3, 26), Err(CoreError::Configuration(_)));
    }

    #[test]
    fn valid_dimensions_pass_through() {
        assert_eq!(grid_dimensions(3, 5).unwrap(), Some((3, 5)));
    }
}
