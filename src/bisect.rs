//! Recursive bisection of islands until every piece holds one label at most.

use crate::config::BisectConfig;
use crate::crs::{reconcile, reproject_point};
use crate::diagnostics::BisectReport;
use crate::error::{PartitionError, Result};
use crate::geometry_utils::envelope_of;
use crate::model::{Color, Label, LabeledPoint, Partition, PointTable, Region};
use geo::{Area, BooleanOps, BoundingRect, Centroid, Contains, MultiPolygon, Polygon, Rect};
use log::{debug, info, warn};
use rayon::prelude::*;
use rstar::RTree;
use rstar::primitives::GeomWithData;

type PointEntry = GeomWithData<[f64; 2], usize>;

/// What a set of points says about the geometry holding them
#[derive(Debug, PartialEq)]
enum Classification {
    Empty,
    Single { label: Label, color: Option<Color> },
    Mixed,
}

fn classify(inside: &[usize], points: &[LabeledPoint]) -> Classification {
    let mut labels = inside.iter().filter_map(|&i| points[i].label.as_ref());
    let Some(first) = labels.next() else {
        return Classification::Empty;
    };
    if labels.any(|l| l != first) {
        return Classification::Mixed;
    }
    Classification::Single {
        label: first.clone(),
        color: points[inside[0]].color,
    }
}

fn leaf(geometry: MultiPolygon<f64>, class: Classification) -> Region {
    match class {
        Classification::Single { label, color } => Region {
            geometry,
            label: Some(label),
            color,
        },
        _ => Region::unlabeled(geometry),
    }
}

fn points_within(geom: &MultiPolygon<f64>, candidates: &[usize], points: &[LabeledPoint]) -> Vec<usize> {
    candidates
        .iter()
        .copied()
        .filter(|&i| geom.contains(&points[i].point))
        .collect()
}

/// Cut `geom` in two through its centroid, across its longer bounding box side.
///
/// Both halves come from the same clipping rectangle, so they share the cut
/// coordinates exactly.
pub fn split_at_centroid(geom: &MultiPolygon<f64>) -> Vec<Polygon<f64>> {
    let (Some(bbox), Some(c)) = (geom.bounding_rect(), geom.centroid()) else {
        return vec![];
    };
    let margin = bbox.width().max(bbox.height()) + 1.0;
    let (min, max) = (bbox.min(), bbox.max());

    let half = if bbox.width() >= bbox.height() {
        Rect::new((min.x - margin, min.y - margin), (c.x(), max.y + margin))
    } else {
        Rect::new((min.x - margin, min.y - margin), (max.x + margin, c.y()))
    };
    let half = MultiPolygon::new(vec![half.to_polygon()]);

    let mut pieces = geom.intersection(&half).0;
    pieces.extend(geom.difference(&half).0);
    pieces.retain(|p| p.unsigned_area() > 0.0);
    pieces
}

#[derive(Debug, Default)]
struct IslandOutcome {
    leaves: Vec<Region>,
    depth_drops: usize,
    dropped_area: f64,
    degenerate_leaves: usize,
    points_on_cuts: usize,
}

/// Split one multi-label island on an explicit work stack.
fn bisect_island(
    geom: MultiPolygon<f64>,
    inside: Vec<usize>,
    points: &[LabeledPoint],
    max_depth: usize,
) -> Result<IslandOutcome> {
    let mut outcome = IslandOutcome::default();
    let mut stack: Vec<(MultiPolygon<f64>, Vec<usize>, usize)> = vec![(geom, inside, 0)];

    while let Some((geom, inside, depth)) = stack.pop() {
        if depth >= max_depth {
            let area = geom.unsigned_area();
            warn!(
                "Depth ceiling {} reached with {} points of several labels; dropping area {:.3}",
                max_depth,
                inside.len(),
                area
            );
            outcome.depth_drops += 1;
            outcome.dropped_area += area;
            continue;
        }

        let pieces = split_at_centroid(&geom);
        match pieces.len() {
            0 => return Err(PartitionError::DegenerateSplit { depth }),
            1 => {
                debug!("Split at depth {} left a single piece", depth);
                outcome.degenerate_leaves += 1;
                outcome.leaves.push(Region::unlabeled(geom));
                continue;
            }
            _ => {}
        }

        let mut claimed = 0;
        for piece in pieces {
            let piece = MultiPolygon::new(vec![piece]);
            let piece_points = points_within(&piece, &inside, points);
            claimed += piece_points.len();
            match classify(&piece_points, points) {
                Classification::Mixed => stack.push((piece, piece_points, depth + 1)),
                class => outcome.leaves.push(leaf(piece, class)),
            }
        }

        // strict containment: a point on the cut belongs to neither half
        let lost = inside.len().saturating_sub(claimed);
        if lost > 0 {
            debug!("{} points fell on the cut at depth {}", lost, depth);
            outcome.points_on_cuts += lost;
        }
    }

    Ok(outcome)
}

/// Split every island so that each resulting leaf holds points of at most one
/// label. Leaves with one label take it, plus the color of their first point.
///
/// Islands are processed independently; leaves keep island order.
pub fn bisect(
    islands: &Partition,
    points: &PointTable,
    config: &BisectConfig,
) -> Result<(Partition, BisectReport)> {
    let transform = reconcile(islands.crs, "islands", points.crs, "points")?;

    let mut report = BisectReport {
        islands: islands.len(),
        ..BisectReport::default()
    };

    let mut labeled: Vec<LabeledPoint> = Vec::with_capacity(points.points.len());
    for p in &points.points {
        if p.label.is_none() {
            report.unlabeled_points += 1;
            continue;
        }
        let mut p = p.clone();
        if let Some((from, to)) = transform {
            p.point = reproject_point(p.point, from, to)?;
        }
        labeled.push(p);
    }
    if report.unlabeled_points > 0 {
        debug!("Ignoring {} points without a label", report.unlabeled_points);
    }

    let tree: RTree<PointEntry> = RTree::bulk_load(
        labeled
            .iter()
            .enumerate()
            .map(|(i, p)| PointEntry::new([p.point.x(), p.point.y()], i))
            .collect(),
    );

    let outcomes: Vec<IslandOutcome> = islands
        .regions
        .par_iter()
        .map(|island| {
            let mut candidates: Vec<usize> = match envelope_of(&island.geometry, 0.0) {
                Some(env) => tree.locate_in_envelope(&env).map(|e| e.data).collect(),
                None => vec![],
            };
            candidates.sort_unstable();
            let inside = points_within(&island.geometry, &candidates, &labeled);

            match classify(&inside, &labeled) {
                Classification::Mixed => {
                    bisect_island(island.geometry.clone(), inside, &labeled, config.max_depth)
                }
                class => Ok(IslandOutcome {
                    leaves: vec![leaf(island.geometry.clone(), class)],
                    ..IslandOutcome::default()
                }),
            }
        })
        .collect::<Result<Vec<_>>>()?;

    let mut leaves = Vec::new();
    for outcome in outcomes {
        report.depth_drops += outcome.depth_drops;
        report.dropped_area += outcome.dropped_area;
        report.degenerate_leaves += outcome.degenerate_leaves;
        report.points_on_cuts += outcome.points_on_cuts;
        leaves.extend(outcome.leaves);
    }
    report.leaves = leaves.len();

    info!(
        "Bisected {} islands into {} leaves ({} labeled)",
        report.islands,
        report.leaves,
        leaves.iter().filter(|r| r.is_labeled()).count()
    );
    if report.depth_drops > 0 {
        warn!(
            "{} branches dropped at the depth ceiling, area {:.3}",
            report.depth_drops, report.dropped_area
        );
    }
    if report.points_on_cuts > 0 {
        warn!(
            "{} labeled points lay on cut lines and label no leaf",
            report.points_on_cuts
        );
    }

    Ok((Partition::new(islands.crs, leaves), report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crs::{Crs, lat_lng_to_web_merc};
    use crate::geometry_utils::test_shapes::rect;
    use crate::geometry_utils::{symmetric_difference_area, union_all};

    fn islands(geoms: Vec<MultiPolygon<f64>>) -> Partition {
        Partition::new(
            Some(Crs::WEB_MERCATOR),
            geoms.into_iter().map(Region::unlabeled).collect(),
        )
    }

    fn points(points: Vec<LabeledPoint>) -> PointTable {
        PointTable {
            crs: Some(Crs::WEB_MERCATOR),
            points,
        }
    }

    #[test]
    fn test_unit_square_two_labels() {
        let (out, report) = bisect(
            &islands(vec![rect(0.0, 0.0, 1.0, 1.0)]),
            &points(vec![
                LabeledPoint::new(0.25, 0.5, "A"),
                LabeledPoint::new(0.75, 0.5, "B"),
            ]),
            &BisectConfig::default(),
        )
        .unwrap();

        assert_eq!(out.len(), 2, "one cut should be enough");
        assert_eq!(report.depth_drops, 0);
        for region in &out.regions {
            assert!((region.area() - 0.5).abs() < 1e-9);
            let label = region.label.as_ref().map(Label::as_str);
            let centroid = region.geometry.centroid().unwrap();
            if centroid.x() < 0.5 {
                assert_eq!(label, Some("A"));
            } else {
                assert_eq!(label, Some("B"));
            }
        }
    }

    #[test]
    fn test_empty_and_single_label_islands_pass_through() {
        let mut p = LabeledPoint::new(5.0, 5.0, "A");
        p.color = Some(Color(rgb::RGB::new(1, 2, 3)));

        let (out, _) = bisect(
            &islands(vec![rect(0.0, 0.0, 1.0, 1.0), rect(4.0, 4.0, 6.0, 6.0)]),
            &points(vec![p]),
            &BisectConfig::default(),
        )
        .unwrap();

        assert_eq!(out.len(), 2);
        assert_eq!(out.regions[0].label, None);
        assert_eq!(out.regions[1].label, Some(Label::new("A")));
        assert_eq!(out.regions[1].color, Some(Color(rgb::RGB::new(1, 2, 3))));
    }

    #[test]
    fn test_leaves_hold_one_label_and_cover_island() {
        let island = rect(0.0, 0.0, 10.0, 6.0);
        let pts = vec![
            LabeledPoint::new(1.0, 1.0, "A"),
            LabeledPoint::new(1.3, 1.2, "B"),
            LabeledPoint::new(8.0, 5.0, "A"),
            LabeledPoint::new(6.1, 2.2, "C"),
            LabeledPoint::new(6.4, 2.9, "A"),
        ];

        let (out, report) =
            bisect(&islands(vec![island.clone()]), &points(pts.clone()), &BisectConfig::default()).unwrap();
        assert_eq!(report.depth_drops, 0);

        for region in &out.regions {
            let labels: Vec<&Label> = pts
                .iter()
                .filter(|p| region.geometry.contains(&p.point))
                .filter_map(|p| p.label.as_ref())
                .collect();
            assert!(
                labels.windows(2).all(|w| w[0] == w[1]),
                "leaf holds several labels: {:?}",
                labels
            );
            if let Some(first) = labels.first() {
                assert_eq!(region.label.as_ref(), Some(*first));
            }
        }

        let covered = union_all(out.regions.iter().map(|r| r.geometry.clone()).collect());
        assert!(symmetric_difference_area(&covered, &island) < 1e-9);
    }

    #[test]
    fn test_depth_ceiling_drops_branch() {
        // Two labels almost on top of each other need many cuts.
        let config = BisectConfig { max_depth: 2 };
        let (out, report) = bisect(
            &islands(vec![rect(0.0, 0.0, 1.0, 1.0)]),
            &points(vec![
                LabeledPoint::new(0.3, 0.3, "A"),
                LabeledPoint::new(0.3001, 0.3001, "B"),
            ]),
            &config,
        )
        .unwrap();

        assert_eq!(report.depth_drops, 1);
        assert!(report.dropped_area > 0.0);
        let kept: f64 = out.regions.iter().map(Region::area).sum();
        assert!((kept + report.dropped_area - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_unlabeled_points_are_ignored() {
        let mut stray = LabeledPoint::new(0.75, 0.5, "B");
        stray.label = None;

        let (out, report) = bisect(
            &islands(vec![rect(0.0, 0.0, 1.0, 1.0)]),
            &points(vec![LabeledPoint::new(0.25, 0.5, "A"), stray]),
            &BisectConfig::default(),
        )
        .unwrap();

        assert_eq!(report.unlabeled_points, 1);
        assert_eq!(out.len(), 1);
        assert_eq!(out.regions[0].label, Some(Label::new("A")));
    }

    #[test]
    fn test_points_on_the_cut_are_counted() {
        // square bbox: the cut is the vertical line x = 0.5 through both points
        let (out, report) = bisect(
            &islands(vec![rect(0.0, 0.0, 1.0, 1.0)]),
            &points(vec![
                LabeledPoint::new(0.5, 0.3, "A"),
                LabeledPoint::new(0.5, 0.7, "B"),
            ]),
            &BisectConfig::default(),
        )
        .unwrap();

        assert_eq!(report.points_on_cuts, 2);
        assert_eq!(out.len(), 2);
        assert!(out.regions.iter().all(|r| !r.is_labeled()));
    }

    #[test]
    fn test_missing_crs_is_fatal() {
        let table = PointTable {
            crs: None,
            points: vec![],
        };
        let err = bisect(&islands(vec![rect(0.0, 0.0, 1.0, 1.0)]), &table, &BisectConfig::default())
            .unwrap_err();
        assert!(matches!(err, PartitionError::MissingCrs { input: "points" }));
    }

    #[test]
    fn test_points_are_reprojected_into_island_crs() {
        let (x, y) = lat_lng_to_web_merc(19.05, 47.5);
        let island = rect(x - 100.0, y - 100.0, x + 100.0, y + 100.0);
        let table = PointTable {
            crs: Some(Crs::WGS_84),
            points: vec![LabeledPoint::new(19.05, 47.5, "A")],
        };

        let (out, _) = bisect(&islands(vec![island]), &table, &BisectConfig::default()).unwrap();
        assert_eq!(out.regions[0].label, Some(Label::new("A")));
    }

    #[test]
    fn test_unknown_crs_pair_is_fatal() {
        let table = PointTable {
            crs: Some(Crs(23700)),
            points: vec![],
        };
        let err = bisect(&islands(vec![rect(0.0, 0.0, 1.0, 1.0)]), &table, &BisectConfig::default())
            .unwrap_err();
        assert!(matches!(err, PartitionError::CrsMismatch { .. }));
    }
}
