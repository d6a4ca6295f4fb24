//! Origin resolution for new rank sweeps.
//!
//! Picks the coordinates and radius a sweep is centered on. Explicit caller
//! overrides win outright; otherwise the business's origin zones are scored
//! against the requested zone name and keyword; otherwise the business's
//! own destination coordinates are used.

use serde::{Deserialize, Serialize};

use crate::grid::{Coordinates, DEFAULT_RADIUS_MILES};
use crate::types::DbId;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Bonus for a zone whose name equals the requested zone name.
pub const SCORE_NAME_MATCH: f64 = 1000.0;

/// Base score for a zone keyword equal to the request keyword.
pub const SCORE_KEYWORD_EXACT: f64 = 500.0;

/// Per-weight multiplier for an exact keyword match.
pub const SCORE_KEYWORD_EXACT_PER_WEIGHT: f64 = 50.0;

/// Base score for a zone keyword that contains, or is contained in, the
/// request keyword.
pub const SCORE_KEYWORD_PARTIAL: f64 = 200.0;

/// Per-weight multiplier for a partial keyword match.
pub const SCORE_KEYWORD_PARTIAL_PER_WEIGHT: f64 = 20.0;

// ---------------------------------------------------------------------------
// Zone types
// ---------------------------------------------------------------------------

/// A keyword attached to an origin zone.
///
/// Stored either as a bare string or as `{"term": ..., "weight": ...}`;
/// a missing weight counts as 1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawZoneKeyword")]
pub struct ZoneKeyword {
    pub term: String,
    pub weight: f64,
}

impl ZoneKeyword {
    pub fn new(term: impl Into<String>, weight: f64) -> Self {
        Self {
            term: term.into(),
            weight,
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawZoneKeyword {
    Term(String),
    Weighted {
        term: String,
        #[serde(default)]
        weight: Option<f64>,
    },
}

impl From<RawZoneKeyword> for ZoneKeyword {
    fn from(raw: RawZoneKeyword) -> Self {
        match raw {
            RawZoneKeyword::Term(term) => Self { term, weight: 1.0 },
            RawZoneKeyword::Weighted { term, weight } => Self {
                term,
                weight: weight.filter(|w| w.is_finite()).unwrap_or(1.0),
            },
        }
    }
}

/// A named, weighted coverage area for a business.
#[derive(Debug, Clone, PartialEq)]
pub struct OriginZone {
    pub id: DbId,
    pub name: String,
    pub canonical: Option<String>,
    pub zip: Option<String>,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub radius_mi: Option<f64>,
    pub weight: f64,
    pub keywords: Vec<ZoneKeyword>,
}

impl OriginZone {
    /// The zone's center, if both components are present and valid.
    pub fn coordinates(&self) -> Option<Coordinates> {
        Coordinates::from_parts(self.lat, self.lng)
    }
}

// ---------------------------------------------------------------------------
// Request / result
// ---------------------------------------------------------------------------

/// What the caller asked for.
#[derive(Debug, Clone, Default)]
pub struct OriginRequest {
    /// Explicit center; bypasses zone logic entirely.
    pub override_coords: Option<Coordinates>,
    /// Explicit radius, honoured for every source except a zone with its own
    /// radius.
    pub override_radius: Option<f64>,
    /// Zone name the caller prefers.
    pub zone_name: Option<String>,
    /// Tracked keyword.
    pub keyword: String,
}

/// Where a resolved origin came from.
#[derive(Debug, Clone, PartialEq)]
pub enum OriginSource {
    Override,
    Zone { zone_id: DbId, name: String },
    Business,
}

/// The effective sweep center.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedOrigin {
    pub coords: Coordinates,
    pub radius_miles: f64,
    pub source: OriginSource,
}

// ---------------------------------------------------------------------------
// Scoring
// ---------------------------------------------------------------------------

/// Score breakdown for one zone.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZoneScore {
    /// The zone's name equals the requested zone name.
    pub name_matched: bool,
    /// Aggregate score: name bonus + best keyword score + zone weight.
    pub total: f64,
}

impl ZoneScore {
    /// Ordering key. A name match dominates any keyword-only score so that a
    /// heavily weighted zone can never steal an explicitly requested one.
    fn outranks(&self, other: &ZoneScore) -> bool {
        (self.name_matched, self.total) > (other.name_matched, other.total)
    }
}

fn normalize(text: &str) -> String {
    text.trim().to_lowercase()
}

fn sanitize_weight(weight: f64) -> f64 {
    if weight.is_finite() && weight > 0.0 {
        weight
    } else {
        0.0
    }
}

/// Best keyword score of `zone` against `keyword` (0 when nothing matches).
pub fn keyword_score(zone: &OriginZone, keyword: &str) -> f64 {
    let wanted = normalize(keyword);
    if wanted.is_empty() {
        return 0.0;
    }
    zone.keywords
        .iter()
        .map(|entry| {
            let term = normalize(&entry.term);
            let weight = sanitize_weight(entry.weight);
            if term.is_empty() {
                0.0
            } else if term == wanted {
                SCORE_KEYWORD_EXACT + weight * SCORE_KEYWORD_EXACT_PER_WEIGHT
            } else if term.contains(&wanted) || wanted.contains(&term) {
                SCORE_KEYWORD_PARTIAL + weight * SCORE_KEYWORD_PARTIAL_PER_WEIGHT
            } else {
                0.0
            }
        })
        .fold(0.0, f64::max)
}

/// Score a single zone against the request.
pub fn score_zone(zone: &OriginZone, zone_name: Option<&str>, keyword: &str) -> ZoneScore {
    let name_matched = zone_name
        .map(normalize)
        .filter(|n| !n.is_empty())
        .is_some_and(|n| n == normalize(&zone.name));

    let mut total = keyword_score(zone, keyword) + sanitize_weight(zone.weight);
    if name_matched {
        total += SCORE_NAME_MATCH;
    }
    ZoneScore {
        name_matched,
        total,
    }
}

/// Index of the best-scoring zone; ties keep the earliest zone.
pub fn best_zone_index(zones: &[OriginZone], zone_name: Option<&str>, keyword: &str) -> Option<usize> {
    let mut best: Option<(usize, ZoneScore)> = None;
    for (idx, zone) in zones.iter().enumerate() {
        let score = score_zone(zone, zone_name, keyword);
        let replace = match &best {
            Some((_, current)) => score.outranks(current),
            None => true,
        };
        if replace {
            best = Some((idx, score));
        }
    }
    best.map(|(idx, _)| idx)
}

// ---------------------------------------------------------------------------
// Resolution
// ---------------------------------------------------------------------------

fn valid_radius(radius: Option<f64>) -> Option<f64> {
    radius.filter(|r| r.is_finite() && *r > 0.0)
}

/// Resolve the effective origin for a sweep.
///
/// Returns `None` when there is no override, no zone with usable
/// coordinates and no business fallback. Callers must treat that as a
/// configuration error and not retry.
pub fn resolve_origin(
    request: &OriginRequest,
    zones: &[OriginZone],
    business: Option<Coordinates>,
) -> Option<ResolvedOrigin> {
    let fallback_radius = valid_radius(request.override_radius).unwrap_or(DEFAULT_RADIUS_MILES);

    if let Some(coords) = request.override_coords.filter(Coordinates::is_valid) {
        return Some(ResolvedOrigin {
            coords,
            radius_miles: fallback_radius,
            source: OriginSource::Override,
        });
    }

    let chosen = best_zone_index(zones, request.zone_name.as_deref(), &request.keyword)
        .map(|idx| &zones[idx])
        .filter(|zone| zone.coordinates().is_some())
        .or_else(|| zones.iter().find(|zone| zone.coordinates().is_some()));

    if let Some(zone) = chosen {
        if let Some(coords) = zone.coordinates() {
            return Some(ResolvedOrigin {
                coords,
                radius_miles: valid_radius(zone.radius_mi).unwrap_or(fallback_radius),
                source: OriginSource::Zone {
                    zone_id: zone.id,
                    name: zone.name.clone(),
                },
            });
        }
    }

    business.filter(Coordinates::is_valid).map(|coords| ResolvedOrigin {
        coords,
        radius_miles: fallback_radius,
        source: OriginSource::Business,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
