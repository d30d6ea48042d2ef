//! Merge same-label fragments into as few connected polygons as possible.

use crate::config::ConsolidateConfig;
use crate::diagnostics::{ConsolidateReport, LabelOutcome};
use crate::geometry_utils::{symmetric_difference_area, union_all};
use crate::model::{Color, DistrictRow, DistrictTable, Label, Partition};
use geo::orient::{Direction, Orient};
use geo::{Area, BooleanOps, MultiPolygon};
use geo_buffer::buffer_polygon;
use log::{debug, info, warn};
use rayon::prelude::*;
use std::collections::BTreeMap;

pub(crate) fn offset(geom: &MultiPolygon<f64>, distance: f64) -> MultiPolygon<f64> {
    let oriented = geom.orient(Direction::Default);
    union_all(
        oriented
            .0
            .iter()
            .map(|poly| buffer_polygon(poly, distance))
            .collect(),
    )
}

/// Morphological closing (grow, then shrink by the same distance), unioned with
/// the input so no area is ever lost.
pub fn closing(geom: &MultiPolygon<f64>, tolerance: f64) -> MultiPolygon<f64> {
    let grown = offset(geom, tolerance);
    let closed = offset(&grown, -tolerance);
    closed.union(geom)
}

fn group_name(label: Option<&Label>) -> &str {
    label.map_or("unlabeled", Label::as_str)
}

/// Union one group's fragments and bridge the gaps between them with closings
/// of growing tolerance until `max_parts` is reached or the tolerance ceiling is
/// passed. Each closing starts from the previous result.
pub fn consolidate_label(
    label: Option<&Label>,
    fragments: Vec<MultiPolygon<f64>>,
    config: &ConsolidateConfig,
) -> (MultiPolygon<f64>, LabelOutcome) {
    let mut geom = union_all(fragments);
    let mut tolerance = config.start_tolerance;
    let mut last_tolerance = None;

    while geom.0.len() > config.max_parts && tolerance <= config.max_tolerance {
        debug!(
            "{}: {} parts, closing at tolerance {}",
            group_name(label),
            geom.0.len(),
            tolerance
        );
        geom = closing(&geom, tolerance);
        last_tolerance = Some(tolerance);
        tolerance *= config.growth_factor;
    }

    let parts = geom.0.len();
    let converged = parts <= config.max_parts;
    if !converged {
        warn!(
            "{} still has {} parts after closing at tolerance {:?}",
            group_name(label),
            parts,
            last_tolerance
        );
    }

    let outcome = LabelOutcome {
        label: label.cloned(),
        parts,
        last_tolerance,
        converged,
    };
    (geom, outcome)
}

/// One row per label, ordered by label, plus a trailing row (label `None`)
/// holding whatever is still unlabeled. Every row, the unlabeled one
/// included, goes through the same bridging.
pub fn consolidate(
    partition: &Partition,
    config: &ConsolidateConfig,
) -> (DistrictTable, ConsolidateReport) {
    let mut groups: BTreeMap<&Label, (Option<Color>, Vec<MultiPolygon<f64>>)> = BTreeMap::new();
    let mut unlabeled = Vec::new();

    for region in &partition.regions {
        match region.label.as_ref() {
            Some(label) => groups
                .entry(label)
                .or_insert_with(|| (region.color, Vec::new()))
                .1
                .push(region.geometry.clone()),
            None => unlabeled.push(region.geometry.clone()),
        }
    }

    let mut groups: Vec<(Option<&Label>, Option<Color>, Vec<MultiPolygon<f64>>)> = groups
        .into_iter()
        .map(|(label, (color, fragments))| (Some(label), color, fragments))
        .collect();
    if !unlabeled.is_empty() {
        groups.push((None, None, unlabeled));
    }

    let consolidated: Vec<(DistrictRow, LabelOutcome)> = groups
        .into_par_iter()
        .map(|(label, color, fragments)| {
            let (geometry, outcome) = consolidate_label(label, fragments, config);
            let row = DistrictRow {
                label: label.cloned(),
                color,
                geometry,
            };
            (row, outcome)
        })
        .collect();

    let mut report = ConsolidateReport::default();
    let mut rows = Vec::with_capacity(consolidated.len());
    for (row, outcome) in consolidated {
        rows.push(row);
        report.outcomes.push(outcome);
    }

    let before = union_all(partition.regions.iter().map(|r| r.geometry.clone()).collect());
    let after = union_all(rows.iter().map(|r| r.geometry.clone()).collect());
    report.area_symmetric_difference = symmetric_difference_area(&before, &after);

    info!(
        "Consolidated {} regions into {} rows ({} unconverged), area added {:.3} of {:.3}",
        partition.len(),
        rows.len(),
        report.unconverged().count(),
        report.area_symmetric_difference,
        before.unsigned_area()
    );

    (
        DistrictTable {
            crs: partition.crs,
            rows,
        },
        report,
    )
}
