//! Stitching a street network to the outline of the area it serves.
//!
//! Streets rarely end exactly on the area outline, and some run alongside it a
//! few meters inside. Both leave thin open gaps or sliver faces once the
//! outline is added as line work. Nodes near the outline get a connector to it,
//! everything is clipped to the area, and line work in a strip along the inside
//! of the outline is swapped for short connectors onto the outline.

use crate::config::NetworkConfig;
use crate::consolidate::offset;
use crate::geometry_utils::boundary_segments;
use crate::noding::node_key;
use ahash::AHashSet;
use geo::{BooleanOps, Coord, Distance, Euclidean, Line, LineString, MultiLineString, MultiPolygon, Point};
use log::{debug, info};
use rstar::RTree;

type OutlineSegment = rstar::primitives::Line<[f64; 2]>;

/// Connectors shorter than this are noise from points already on the outline
const ON_OUTLINE: f64 = 1e-9;

/// Ring segments of an area, indexed for nearest-point lookups.
pub struct Outline {
    tree: RTree<OutlineSegment>,
    segments: Vec<Line<f64>>,
}

impl Outline {
    pub fn new(area: &MultiPolygon<f64>) -> Self {
        let segments = boundary_segments(area);
        let tree = RTree::bulk_load(
            segments
                .iter()
                .map(|l| OutlineSegment::new([l.start.x, l.start.y], [l.end.x, l.end.y]))
                .collect(),
        );
        Self { tree, segments }
    }

    /// Distance from `c` to the outline and the outline point it is measured to.
    pub fn nearest(&self, c: Coord<f64>) -> Option<(f64, Coord<f64>)> {
        let query = [c.x, c.y];
        let segment = self.tree.nearest_neighbor(&query)?;
        let [x, y] = segment.nearest_point(&query);
        let near = Coord { x, y };
        Some((Euclidean.distance(Point::from(c), Point::from(near)), near))
    }

    pub fn segments(&self) -> &[Line<f64>] {
        &self.segments
    }
}

/// A connector from every distinct node within `connect_distance` of the
/// outline to its nearest outline point, when longer than `min_segment_length`.
pub fn outline_connectors(
    segments: &[Line<f64>],
    outline: &Outline,
    config: &NetworkConfig,
) -> Vec<Line<f64>> {
    let mut seen = AHashSet::new();
    let mut connectors = Vec::new();

    for c in segments.iter().flat_map(|s| [s.start, s.end]) {
        if !seen.insert(node_key(c, config.snap_tolerance)) {
            continue;
        }
        match outline.nearest(c) {
            Some((d, near))
                if d <= config.boundary.connect_distance && d > config.min_segment_length =>
            {
                connectors.push(Line::new(c, near));
            }
            _ => {}
        }
    }

    connectors
}

/// Move every vertex within `tolerance` of the outline onto it.
fn snap_to_outline(lines: MultiLineString<f64>, outline: &Outline, tolerance: f64) -> MultiLineString<f64> {
    lines
        .into_iter()
        .map(|ls| {
            ls.into_iter()
                .map(|c| match outline.nearest(c) {
                    Some((d, near)) if d <= tolerance => near,
                    _ => c,
                })
                .collect::<LineString<f64>>()
        })
        .collect()
}

/// First and last coordinate of every line, skipping any within
/// `min_distance` of one already kept.
fn distinct_endpoints(lines: &MultiLineString<f64>, min_distance: f64) -> Vec<Coord<f64>> {
    let mut kept: RTree<[f64; 2]> = RTree::new();
    let mut endpoints = Vec::new();

    for ls in lines.iter() {
        let (Some(&first), Some(&last)) = (ls.0.first(), ls.0.last()) else {
            continue;
        };
        for c in [first, last] {
            let p = [c.x, c.y];
            if kept
                .locate_within_distance(p, min_distance * min_distance)
                .next()
                .is_none()
            {
                kept.insert(p);
                endpoints.push(c);
            }
        }
    }

    endpoints
}

/// Clip noded line work to `area` and tie it to the area outline.
///
/// Returns the clipped lines, the new connectors and the outline segments
/// themselves, not yet noded against each other.
pub fn stitch_to_area(
    segments: &[Line<f64>],
    area: &MultiPolygon<f64>,
    config: &NetworkConfig,
) -> Vec<Line<f64>> {
    let b = &config.boundary;
    let outline = Outline::new(area);

    let reach = outline_connectors(segments, &outline, config);
    let reach_count = reach.len();
    let lines: MultiLineString<f64> = segments
        .iter()
        .chain(reach.iter())
        .map(|l| LineString::from(*l))
        .collect();

    let clipped = area.clip(&lines, false);
    let snapped = snap_to_outline(clipped, &outline, b.snap_tolerance);

    // inside the core nothing is close enough to the outline to double it
    let core = offset(area, -b.strip_width);
    let in_strip = core.clip(&snapped, true);

    let mut joins = Vec::new();
    for c in distinct_endpoints(&in_strip, b.dedup_distance) {
        match outline.nearest(c) {
            Some((d, near)) if d > ON_OUTLINE && d <= b.join_tolerance => {
                joins.push(Line::new(c, near));
            }
            _ => {}
        }
    }
    debug!(
        "{} strip pieces along the outline, {} joins onto it",
        in_strip.0.len(),
        joins.len()
    );

    let cleaned = core.clip(&snapped, false);
    let mut stitched: Vec<Line<f64>> = cleaned.iter().flat_map(|ls| ls.lines()).collect();
    let cleaned_count = stitched.len();
    stitched.extend(joins);
    stitched.extend_from_slice(outline.segments());

    info!(
        "Stitched to area outline: {} reach connectors, {} interior segments, {} outline segments",
        reach_count,
        cleaned_count,
        outline.segments().len()
    );

    stitched
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry_utils::test_shapes::rect;
    use crate::model::LineNetwork;
    use crate::noding::prepare_network;
    use crate::polygonize::polygonize;
    use geo::{Area, coord};

    fn area_network(lines: Vec<LineString<f64>>, area: Option<MultiPolygon<f64>>) -> LineNetwork {
        LineNetwork {
            crs: None,
            lines,
            area,
        }
    }

    #[test]
    fn test_nearest_outline_point() {
        let outline = Outline::new(&rect(0.0, 0.0, 100.0, 100.0));
        let (d, near) = outline.nearest(coord! { x: 50.0, y: 95.0 }).unwrap();
        assert!((d - 5.0).abs() < 1e-9);
        assert!((near.x - 50.0).abs() < 1e-9 && (near.y - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_connectors_skip_far_and_touching_nodes() {
        let outline = Outline::new(&rect(0.0, 0.0, 1000.0, 1000.0));
        let segments = vec![
            // starts on the outline, ends 500 inside
            Line::new(coord! { x: 500.0, y: 0.0 }, coord! { x: 500.0, y: 500.0 }),
            Line::new(coord! { x: 500.0, y: 500.0 }, coord! { x: 500.0, y: 960.0 }),
        ];

        let connectors = outline_connectors(&segments, &outline, &NetworkConfig::default());
        assert_eq!(connectors.len(), 1);
        assert_eq!(connectors[0].start, coord! { x: 500.0, y: 960.0 });
        assert!((connectors[0].end.y - 1000.0).abs() < 1e-9);
    }

    #[test]
    fn test_dead_end_short_of_the_outline_splits_the_area() {
        let street = LineString::from(vec![(50.0, 0.0), (50.0, 95.0)]);
        let config = NetworkConfig::default();

        let unstitched = prepare_network(&area_network(vec![street.clone()], None), &config);
        assert!(polygonize(&unstitched).is_empty(), "a lone street encloses nothing");

        let stitched = prepare_network(
            &area_network(vec![street], Some(rect(0.0, 0.0, 100.0, 100.0))),
            &config,
        );
        let faces = polygonize(&stitched);
        assert_eq!(faces.len(), 2, "street plus outline should close two halves");
        for face in &faces {
            assert!((face.unsigned_area() - 5000.0).abs() < 1e-6, "got {}", face.unsigned_area());
        }
    }

    #[test]
    fn test_street_along_the_outline_leaves_no_sliver() {
        let lines = vec![
            // runs 5 inside the bottom edge
            LineString::from(vec![(20.0, 5.0), (80.0, 5.0)]),
            LineString::from(vec![(50.0, 0.0), (50.0, 100.0)]),
        ];

        let stitched = prepare_network(
            &area_network(lines, Some(rect(0.0, 0.0, 100.0, 100.0))),
            &NetworkConfig::default(),
        );
        let faces = polygonize(&stitched);
        assert_eq!(faces.len(), 2);
        assert!(faces.iter().all(|f| f.unsigned_area() > 1000.0));
    }

    #[test]
    fn test_lines_outside_the_area_are_dropped() {
        let lines = vec![
            LineString::from(vec![(50.0, -50.0), (50.0, 150.0)]),
            LineString::from(vec![(300.0, 0.0), (300.0, 100.0)]),
        ];

        let stitched = prepare_network(
            &area_network(lines, Some(rect(0.0, 0.0, 100.0, 100.0))),
            &NetworkConfig::default(),
        );
        let max_x = stitched.iter().flat_map(|l| [l.start.x, l.end.x]).fold(f64::MIN, f64::max);
        let min_y = stitched.iter().flat_map(|l| [l.start.y, l.end.y]).fold(f64::MAX, f64::min);
        assert!(max_x <= 100.0 + 1e-9);
        assert!(min_y >= -1e-9);
        assert_eq!(polygonize(&stitched).len(), 2);
    }
}
