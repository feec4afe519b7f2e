//! Filter points, the output of both aggregation stages.

use crate::asset::Asset;
use crate::pair::Pair;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Origin class of a price point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceType {
    Cex,
    Dex,
    Simulation,
}

impl std::fmt::Display for SourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cex => write!(f, "CEX"),
            Self::Dex => write!(f, "DEX"),
            Self::Simulation => write!(f, "SIMULATION"),
        }
    }
}

/// A single scalar price attributed to a market (Stage 1) or an asset (Stage 2).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterPoint {
    pub pair: Pair,
    pub source_type: SourceType,
    /// Venue the point originates from; empty for cross-market points.
    pub source: String,
    pub value: f64,
    /// Name of the producing filter, i.e. `lastprice` or `median`.
    pub name: String,
    pub time: DateTime<Utc>,
}

/// Drop every point older than `now - tolerance_seconds`.
///
/// Returns the surviving points and the number removed.
pub fn remove_old_points(
    points: Vec<FilterPoint>,
    tolerance_seconds: i64,
    now: DateTime<Utc>,
) -> (Vec<FilterPoint>, usize) {
    let cutoff = now - chrono::Duration::seconds(tolerance_seconds);
    let before = points.len();
    let kept: Vec<FilterPoint> = points.into_iter().filter(|p| p.time >= cutoff).collect();
    let removed = before - kept.len();
    (kept, removed)
}

/// Group filter points by their quote asset.
///
/// Returns groups in deterministic (asset identifier) order so downstream
/// key/value batches are stable.
pub fn group_by_quote_asset(points: Vec<FilterPoint>) -> Vec<(Asset, Vec<FilterPoint>)> {
    let mut groups: BTreeMap<String, (Asset, Vec<FilterPoint>)> = BTreeMap::new();
    for point in points {
        let asset = point.pair.quote_token.clone();
        groups
            .entry(asset.identifier())
            .or_insert_with(|| (asset, Vec::new()))
            .1
            .push(point);
    }
    groups.into_values().collect()
}

/// Values of a slice of filter points.
pub fn values(points: &[FilterPoint]) -> Vec<f64> {
    points.iter().map(|p| p.value).collect()
}

/// Most recent timestamp among the points.
pub fn latest_timestamp(points: &[FilterPoint]) -> DateTime<Utc> {
    points
        .iter()
        .map(|p| p.time)
        .max()
        .unwrap_or_else(Utc::now)
}
