//! Integration tests for schema-tolerant point writes.
//!
//! Older layouts are simulated by altering the migrated table inside the
//! per-test database. Require `DATABASE_URL`.

use assert_matches::assert_matches;
use chrono::Utc;
use geogrid_core::grid::Coordinates;
use geogrid_core::measure::Artifacts;
use geogrid_db::models::point::{PointKey, PointUpsert};
use geogrid_db::persistence::{PersistenceError, PointWriter, SchemaLevel};
use serde_json::json;
use sqlx::PgPool;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

async fn seed_run(pool: &PgPool) -> i64 {
    let business_id: i64 =
        sqlx::query_scalar("INSERT INTO businesses (name) VALUES ('Desert Spa') RETURNING id")
            .fetch_one(pool)
            .await
            .unwrap();
    sqlx::query_scalar(
        "INSERT INTO geo_grid_runs (business_id, keyword, grid_rows, grid_cols) \
         VALUES ($1, 'massage', 3, 3) RETURNING id",
    )
    .bind(business_id)
    .fetch_one(pool)
    .await
    .unwrap()
}

fn cell(run_id: i64, rank: Option<i32>) -> PointUpsert {
    PointUpsert {
        key: PointKey::Cell {
            run_id,
            row_idx: 0,
            col_idx: 2,
            coords: Coordinates::new(34.643478, -112.247336),
        },
        rank_pos: rank,
        place_id: Some("ChIJ-spa".to_string()),
        payload: json!({ "rank": rank }),
        measured_at: Utc::now(),
        artifacts: Artifacts {
            capture_path: Some("/captures/0-2.png".to_string()),
            search_url: None,
            landing_url: None,
        },
    }
}

async fn rank_of(pool: &PgPool, id: i64) -> Option<i32> {
    sqlx::query_scalar("SELECT rank_pos FROM geo_grid_points WHERE id = $1")
        .bind(id)
        .fetch_one(pool)
        .await
        .unwrap()
}

// ---------------------------------------------------------------------------
// Current schema
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_upsert_same_cell_twice_updates_one_row(pool: PgPool) {
    let run_id = seed_run(&pool).await;
    let writer = PointWriter::new(pool.clone());

    let first = writer.upsert_point(&cell(run_id, Some(5))).await.unwrap();
    let second = writer.upsert_point(&cell(run_id, Some(3))).await.unwrap();
    assert_eq!(first, second);

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM geo_grid_points WHERE run_id = $1")
        .bind(run_id)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count, 1);
    assert_eq!(rank_of(&pool, first).await, Some(3));
    assert_eq!(writer.schema_level(), SchemaLevel::Full);

    let capture: Option<String> =
        sqlx::query_scalar("SELECT capture_path FROM geo_grid_points WHERE id = $1")
            .bind(first)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(capture.as_deref(), Some("/captures/0-2.png"));
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_missing_or_non_positive_rank_keeps_stored_rank(pool: PgPool) {
    let run_id = seed_run(&pool).await;
    let writer = PointWriter::new(pool.clone());

    let id = writer.upsert_point(&cell(run_id, None)).await.unwrap();
    assert_eq!(rank_of(&pool, id).await, None);

    writer.upsert_point(&cell(run_id, Some(0))).await.unwrap();
    assert_eq!(rank_of(&pool, id).await, None);

    let by_id = PointUpsert {
        key: PointKey::Id(id),
        ..cell(run_id, Some(7))
    };
    writer.upsert_point(&by_id).await.unwrap();
    assert_eq!(rank_of(&pool, id).await, Some(7));

    let not_found = PointUpsert {
        key: PointKey::Id(id),
        ..cell(run_id, None)
    };
    writer.upsert_point(&not_found).await.unwrap();
    assert_eq!(rank_of(&pool, id).await, Some(7));
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_update_of_missing_point_reports_not_found(pool: PgPool) {
    let run_id = seed_run(&pool).await;
    let writer = PointWriter::new(pool);
    let upsert = PointUpsert {
        key: PointKey::Id(999_999),
        ..cell(run_id, Some(1))
    };
    assert_matches!(
        writer.upsert_point(&upsert).await,
        Err(PersistenceError::PointNotFound(999_999))
    );
}

// ---------------------------------------------------------------------------
// Older layouts
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_falls_back_when_artifact_columns_missing(pool: PgPool) {
    sqlx::query(
        "ALTER TABLE geo_grid_points \
         DROP COLUMN capture_path, DROP COLUMN search_url, DROP COLUMN landing_url",
    )
    .execute(&pool)
    .await
    .unwrap();

    let run_id = seed_run(&pool).await;
    let writer = PointWriter::new(pool.clone());
    let id = writer.upsert_point(&cell(run_id, Some(4))).await.unwrap();

    assert_eq!(writer.schema_level(), SchemaLevel::CurrentPayload);
    assert_eq!(rank_of(&pool, id).await, Some(4));
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_falls_back_to_legacy_payload_column(pool: PgPool) {
    sqlx::query(
        "ALTER TABLE geo_grid_points \
         DROP COLUMN capture_path, DROP COLUMN search_url, DROP COLUMN landing_url",
    )
    .execute(&pool)
    .await
    .unwrap();
    sqlx::query("ALTER TABLE geo_grid_points RENAME COLUMN result_json TO results_json")
        .execute(&pool)
        .await
        .unwrap();

    let run_id = seed_run(&pool).await;
    let writer = PointWriter::new(pool.clone());
    let id = writer.upsert_point(&cell(run_id, Some(2))).await.unwrap();
    assert_eq!(writer.schema_level(), SchemaLevel::Legacy);

    let payload: serde_json::Value =
        sqlx::query_scalar("SELECT results_json FROM geo_grid_points WHERE id = $1")
            .bind(id)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(payload, json!({ "rank": 2 }));

    // Clones share the degraded level.
    assert_eq!(writer.clone().schema_level(), SchemaLevel::Legacy);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_exhausted_fallbacks_surface_original_error(pool: PgPool) {
    sqlx::query("ALTER TABLE geo_grid_points DROP COLUMN result_json")
        .execute(&pool)
        .await
        .unwrap();

    let run_id = seed_run(&pool).await;
    let writer = PointWriter::new(pool);
    let result = writer.upsert_point(&cell(run_id, Some(2))).await;

    assert_matches!(result, Err(PersistenceError::SchemaExhausted { .. }));
    assert_eq!(writer.schema_level(), SchemaLevel::Legacy);
}
