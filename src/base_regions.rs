//! Base planar subdivision: polygonize the noded network, then fold slivers
//! into their neighbors.

use crate::config::SliverConfig;
use crate::crs::Crs;
use crate::diagnostics::{AbsorptionReport, UnresolvedSliver, area_discrepancy_is_significant};
use crate::error::{PartitionError, Result};
use crate::geometry_utils::{shared_boundary_length, symmetric_difference_area, union_all};
use crate::model::{Partition, Region};
use crate::polygonize::polygonize;
use crate::spatial_index::RegionIndex;
use geo::{Area, BooleanOps, Line, MultiPolygon};
use log::{debug, info, warn};
use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// Heap entry for an undersized polygon. Smallest area first, then lowest index.
#[derive(Debug, Clone, Copy)]
struct SliverEntry {
    area: f64,
    idx: usize,
}

impl PartialEq for SliverEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for SliverEntry {}

impl PartialOrd for SliverEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SliverEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed so BinaryHeap (a max-heap) pops the smallest sliver.
        other
            .area
            .total_cmp(&self.area)
            .then_with(|| other.idx.cmp(&self.idx))
    }
}

/// Neighbor sharing the longest stretch of boundary with `geom`, lowest index
/// on ties. Corner contact does not count.
fn best_neighbor(
    idx: usize,
    geom: &MultiPolygon<f64>,
    slots: &[Option<MultiPolygon<f64>>],
    index: &RegionIndex,
    tolerance: f64,
) -> Option<(usize, f64)> {
    let mut best: Option<(usize, f64)> = None;
    for candidate in index.candidates(geom, tolerance, idx) {
        let Some(other) = slots[candidate].as_ref() else {
            continue;
        };
        let shared = shared_boundary_length(geom, other, tolerance);
        if shared > 0.0 && best.is_none_or(|(_, len)| shared > len) {
            best = Some((candidate, shared));
        }
    }
    best
}

/// Merge every polygon smaller than `config.min_area` into the neighbor it
/// shares the most boundary with, smallest first.
///
/// Polygons without any edge-sharing neighbor stay where they are and are
/// reported as unresolved.
pub fn absorb_slivers(
    polygons: Vec<MultiPolygon<f64>>,
    config: &SliverConfig,
) -> (Vec<MultiPolygon<f64>>, AbsorptionReport) {
    let mut report = AbsorptionReport {
        polygons_in: polygons.len(),
        ..AbsorptionReport::default()
    };
    let before = union_all(polygons.clone());

    let mut index = RegionIndex::build(&polygons);
    let mut areas: Vec<f64> = polygons.iter().map(|p| p.unsigned_area()).collect();
    let mut slots: Vec<Option<MultiPolygon<f64>>> = polygons.into_iter().map(Some).collect();

    let mut heap: BinaryHeap<SliverEntry> = areas
        .iter()
        .enumerate()
        .filter(|&(_, &area)| area < config.min_area)
        .map(|(idx, &area)| SliverEntry { area, idx })
        .collect();

    let mut unresolved: Vec<usize> = Vec::new();
    let mut steps = 0;

    while let Some(SliverEntry { area, idx }) = heap.pop() {
        // Stale entry: already merged away, or grown since it was queued.
        if slots[idx].is_none() || areas[idx] != area {
            continue;
        }
        if steps >= config.max_steps {
            report.budget_exhausted = true;
            warn!(
                "Sliver absorption stopped after {} steps with slivers left",
                steps
            );
            break;
        }
        steps += 1;

        let Some(geom) = slots[idx].take() else {
            continue;
        };

        let Some((target, shared)) =
            best_neighbor(idx, &geom, &slots, &index, config.boundary_tolerance)
        else {
            debug!("Sliver {} (area {:.3}) has no edge neighbor", idx, area);
            slots[idx] = Some(geom);
            unresolved.push(idx);
            continue;
        };

        let Some(target_geom) = slots[target].take() else {
            slots[idx] = Some(geom);
            continue;
        };
        let merged = target_geom.union(&geom);
        debug!(
            "Absorbing sliver {} (area {:.3}) into {} (shared {:.3})",
            idx, area, target, shared
        );

        index.remove(idx);
        index.update(target, &merged);
        areas[target] = merged.unsigned_area();
        if areas[target] < config.min_area {
            heap.push(SliverEntry {
                area: areas[target],
                idx: target,
            });
        }
        slots[target] = Some(merged);
        report.merges += 1;
    }

    // Compact, remembering where each surviving slot ended up.
    let mut new_index = vec![usize::MAX; slots.len()];
    let mut survivors = Vec::with_capacity(slots.len());
    for (old, slot) in slots.into_iter().enumerate() {
        if let Some(geom) = slot {
            new_index[old] = survivors.len();
            survivors.push(geom);
        }
    }

    report.unresolved = unresolved
        .into_iter()
        .filter(|&old| new_index[old] != usize::MAX)
        .map(|old| UnresolvedSliver {
            index: new_index[old],
            area: areas[old],
        })
        .collect();

    let after = union_all(survivors.clone());
    report.area_symmetric_difference = symmetric_difference_area(&before, &after);
    if area_discrepancy_is_significant(report.area_symmetric_difference, before.unsigned_area()) {
        warn!(
            "Sliver absorption changed the covered area by {:.6}",
            report.area_symmetric_difference
        );
    }

    (survivors, report)
}

/// Polygonize noded segments into the base partition and absorb slivers.
pub fn build_base_regions(
    segments: &[Line<f64>],
    crs: Option<Crs>,
    config: &SliverConfig,
) -> Result<(Partition, AbsorptionReport)> {
    let polygons = polygonize(segments);
    if polygons.is_empty() {
        return Err(PartitionError::NoPolygonsProduced);
    }
    info!("Polygonized {} segments into {} polygons", segments.len(), polygons.len());

    let geoms = polygons
        .into_iter()
        .map(|p| MultiPolygon::new(vec![p]))
        .collect();
    let (geoms, report) = absorb_slivers(geoms, config);

    if geoms.is_empty() {
        return Err(PartitionError::NoCandidateRegions);
    }
    info!(
        "Base regions: {} after {} merges ({} unresolved slivers)",
        geoms.len(),
        report.merges,
        report.unresolved.len()
    );

    let regions = geoms.into_iter().map(Region::unlabeled).collect();
    Ok((Partition::new(crs, regions), report))
}
