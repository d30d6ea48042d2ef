//! Line network preparation: noding and dead-end extension.
//!
//! Polygonizing only finds loops in a network whose segments meet at shared
//! endpoints, so raw line work is split at every crossing first.

use crate::config::NetworkConfig;
use crate::model::LineNetwork;
use crate::stitch::stitch_to_area;
use ahash::{AHashMap, AHashSet};
use geo::algorithm::line_intersection::{LineIntersection, line_intersection};
use geo::{Coord, Line};
use log::{debug, info};
use rstar::{AABB, RTree, RTreeObject};

/// Quantized position used to decide whether two coordinates are the same node
pub type NodeKey = (i64, i64);

pub fn node_key(pos: Coord<f64>, quantize_factor: f64) -> NodeKey {
    (
        (pos.x / quantize_factor).round() as i64,
        (pos.y / quantize_factor).round() as i64,
    )
}

/// Hands out one canonical coordinate per quantized position
struct NodeSnapper {
    position_to_coord: AHashMap<NodeKey, Coord<f64>>,
    quantize_factor: f64,
}

impl NodeSnapper {
    fn new(quantize_factor: f64) -> Self {
        Self {
            position_to_coord: AHashMap::new(),
            quantize_factor,
        }
    }

    fn snap(&mut self, pos: Coord<f64>) -> (NodeKey, Coord<f64>) {
        let key = node_key(pos, self.quantize_factor);
        let coord = *self.position_to_coord.entry(key).or_insert(pos);
        (key, coord)
    }
}

struct SegmentEntry {
    idx: usize,
    line: Line<f64>,
}

impl RTreeObject for SegmentEntry {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        let (p1, p2) = self.line.points();
        AABB::from_corners([p1.x(), p1.y()], [p2.x(), p2.y()])
    }
}

fn segment_tree(segments: &[Line<f64>]) -> RTree<SegmentEntry> {
    RTree::bulk_load(
        segments
            .iter()
            .enumerate()
            .map(|(idx, line)| SegmentEntry { idx, line: *line })
            .collect(),
    )
}

fn line_envelope(line: &Line<f64>) -> AABB<[f64; 2]> {
    AABB::from_corners(
        [line.start.x, line.start.y],
        [line.end.x, line.end.y],
    )
}

/// Parameter of `p` along `seg` (0 at start, 1 at end).
fn param_along(seg: &Line<f64>, p: Coord<f64>) -> f64 {
    let d = seg.delta();
    let len2 = d.x * d.x + d.y * d.y;
    if len2 == 0.0 {
        return 0.0;
    }
    ((p.x - seg.start.x) * d.x + (p.y - seg.start.y) * d.y) / len2
}

/// Split every segment at every point where it meets another one.
///
/// Crossings, T-junctions and collinear overlaps all produce split points.
/// Endpoints closer than `snap_tolerance` collapse into one node, and
/// duplicate or zero-length pieces are dropped.
pub fn node_segments(segments: &[Line<f64>], snap_tolerance: f64) -> Vec<Line<f64>> {
    let segments: Vec<Line<f64>> = segments
        .iter()
        .copied()
        .filter(|l| l.start != l.end)
        .collect();

    let tree = segment_tree(&segments);
    let mut splits: Vec<Vec<Coord<f64>>> = vec![Vec::new(); segments.len()];

    for (i, seg) in segments.iter().enumerate() {
        for other in tree.locate_in_envelope_intersecting(&line_envelope(seg)) {
            // each unordered pair once
            if other.idx <= i {
                continue;
            }
            match line_intersection(*seg, other.line) {
                Some(LineIntersection::SinglePoint { intersection, .. }) => {
                    splits[i].push(intersection);
                    splits[other.idx].push(intersection);
                }
                Some(LineIntersection::Collinear { intersection }) => {
                    for p in [intersection.start, intersection.end] {
                        splits[i].push(p);
                        splits[other.idx].push(p);
                    }
                }
                None => {}
            }
        }
    }

    let mut snapper = NodeSnapper::new(snap_tolerance);
    let mut seen: AHashSet<(NodeKey, NodeKey)> = AHashSet::new();
    let mut noded = Vec::with_capacity(segments.len());

    for (seg, mut pts) in segments.iter().zip(splits) {
        pts.push(seg.start);
        pts.push(seg.end);
        pts.sort_by(|a, b| param_along(seg, *a).total_cmp(&param_along(seg, *b)));

        let snapped: Vec<(NodeKey, Coord<f64>)> = pts.into_iter().map(|p| snapper.snap(p)).collect();

        for pair in snapped.windows(2) {
            let (ka, a) = pair[0];
            let (kb, b) = pair[1];
            if ka == kb {
                continue;
            }
            let undirected = if ka < kb { (ka, kb) } else { (kb, ka) };
            if seen.insert(undirected) {
                noded.push(Line::new(a, b));
            }
        }
    }

    debug!(
        "Noded {} segments into {} pieces ({} distinct nodes)",
        segments.len(),
        noded.len(),
        snapper.position_to_coord.len()
    );

    noded
}

/// Cast a ray from every dangling end along its last segment and connect it to
/// the nearest line it hits within `max_extension`.
///
/// Returns only the new connector segments; node them together with the input.
pub fn dead_end_connectors(segments: &[Line<f64>], config: &NetworkConfig) -> Vec<Line<f64>> {
    let mut degree: AHashMap<NodeKey, usize> = AHashMap::new();
    for seg in segments {
        *degree.entry(node_key(seg.start, config.snap_tolerance)).or_insert(0) += 1;
        *degree.entry(node_key(seg.end, config.snap_tolerance)).or_insert(0) += 1;
    }

    let tree = segment_tree(segments);
    let mut connectors = Vec::new();

    for (i, seg) in segments.iter().enumerate() {
        for (end, inner) in [(seg.start, seg.end), (seg.end, seg.start)] {
            if degree.get(&node_key(end, config.snap_tolerance)) != Some(&1) {
                continue;
            }

            let d = end - inner;
            let n = (d.x * d.x + d.y * d.y).sqrt();
            if n == 0.0 {
                continue;
            }
            let far = Coord {
                x: end.x + d.x / n * config.max_extension,
                y: end.y + d.y / n * config.max_extension,
            };
            let ray = Line::new(end, far);

            let mut best: Option<(f64, Coord<f64>)> = None;
            for other in tree.locate_in_envelope_intersecting(&line_envelope(&ray)) {
                if other.idx == i {
                    continue;
                }
                let hits = match line_intersection(ray, other.line) {
                    Some(LineIntersection::SinglePoint { intersection, .. }) => vec![intersection],
                    Some(LineIntersection::Collinear { intersection }) => {
                        vec![intersection.start, intersection.end]
                    }
                    None => continue,
                };
                for hit in hits {
                    let s = param_along(&ray, hit) * config.max_extension;
                    if s <= config.min_ray_offset {
                        continue;
                    }
                    if best.is_none_or(|(best_s, _)| s < best_s) {
                        best = Some((s, hit));
                    }
                }
            }

            if let Some((s, hit)) = best {
                if s > config.min_segment_length {
                    connectors.push(Line::new(end, hit));
                }
            }
        }
    }

    connectors
}

/// Turn a raw network into noded segments ready for polygonizing. With an
/// area, the result is also clipped to it and closed along its outline.
pub fn prepare_network(network: &LineNetwork, config: &NetworkConfig) -> Vec<Line<f64>> {
    let raw: Vec<Line<f64>> = network.lines.iter().flat_map(|ls| ls.lines()).collect();
    let mut noded = node_segments(&raw, config.snap_tolerance);

    if config.extend_dead_ends {
        let connectors = dead_end_connectors(&noded, config);
        info!("Extending {} dead ends to the next line", connectors.len());
        if !connectors.is_empty() {
            noded.extend(connectors);
            noded = node_segments(&noded, config.snap_tolerance);
        }
    }

    if let Some(area) = &network.area {
        let stitched = stitch_to_area(&noded, area, config);
        noded = node_segments(&stitched, config.snap_tolerance);
    }

    info!(
        "Prepared network: {} line strings -> {} noded segments",
        network.lines.len(),
        noded.len()
    );
    noded
}
