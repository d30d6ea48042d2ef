use crate::config::ImputeConfig;
use crate::diagnostics::ImputeReport;
use crate::geometry_utils::boundaries_touch;
use crate::model::{Color, Label, Partition};
use crate::spatial_index::RegionIndex;
use log::{debug, info, warn};

/// Most common label among touching, labeled neighbors of region `idx`.
/// Ties go to the label seen first when visiting neighbors by ascending index.
fn majority_neighbor_label(
    partition: &Partition,
    index: &RegionIndex,
    idx: usize,
    tolerance: f64,
) -> Option<(Label, Option<Color>)> {
    let geom = &partition.regions[idx].geometry;
    // (label, count, color of the first neighbor carrying it), in first-seen order
    let mut counts: Vec<(&Label, usize, Option<Color>)> = Vec::new();

    for j in index.candidates(geom, tolerance, idx) {
        let neighbor = &partition.regions[j];
        let Some(label) = neighbor.label.as_ref() else {
            continue;
        };
        if !boundaries_touch(geom, &neighbor.geometry, tolerance) {
            continue;
        }
        match counts.iter_mut().find(|(l, _, _)| *l == label) {
            Some(entry) => entry.1 += 1,
            None => counts.push((label, 1, neighbor.color)),
        }
    }

    let mut best: Option<(&Label, usize, Option<Color>)> = None;
    for entry in counts {
        if best.is_none_or(|(_, n, _)| entry.1 > n) {
            best = Some(entry);
        }
    }
    best.map(|(label, _, color)| (label.clone(), color))
}

/// Give unlabeled regions the majority label of their touching neighbors.
///
/// One sweep in ascending index order over the partition itself, so a label
/// written early in the sweep is visible to regions visited later. Regions
/// with no labeled neighbor at their turn stay unlabeled.
pub fn impute_labels(partition: &mut Partition, config: &ImputeConfig) -> ImputeReport {
    let index = RegionIndex::build(partition.regions.iter().map(|r| &r.geometry));
    let mut report = ImputeReport::default();

    for idx in 0..partition.regions.len() {
        if partition.regions[idx].is_labeled() {
            continue;
        }

        match majority_neighbor_label(partition, &index, idx, config.touch_tolerance) {
            Some((label, color)) => {
                debug!("Region {} takes label {} from its neighbors", idx, label);
                let region = &mut partition.regions[idx];
                region.label = Some(label);
                region.color = color;
                report.imputed += 1;
            }
            None => report.unlabeled.push(idx),
        }
    }

    info!(
        "Imputed {} labels, {} regions still unlabeled",
        report.imputed,
        report.unlabeled.len()
    );
    if !report.unlabeled.is_empty() {
        warn!("Regions without a label after imputation: {:?}", report.unlabeled);
    }
    report
}
