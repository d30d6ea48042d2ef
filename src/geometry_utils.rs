use geo::{Area, BooleanOps, BoundingRect, Distance, Euclidean, Line, MultiPolygon, Point, Polygon};
use itertools::Itertools;
use rstar::{AABB, RTree, RTreeObject};

// --- Area / boolean helpers ---

/// Union of many multipolygons, reduced pairwise so each overlay stays small.
pub fn union_all(mut geoms: Vec<MultiPolygon<f64>>) -> MultiPolygon<f64> {
    geoms.retain(|g| !g.0.is_empty());
    if geoms.is_empty() {
        return MultiPolygon::new(vec![]);
    }

    while geoms.len() > 1 {
        let mut next = Vec::with_capacity(geoms.len().div_ceil(2));
        let mut iter = geoms.into_iter();
        while let Some(a) = iter.next() {
            match iter.next() {
                Some(b) => next.push(a.union(&b)),
                None => next.push(a),
            }
        }
        geoms = next;
    }

    geoms.pop().unwrap_or_else(|| MultiPolygon::new(vec![]))
}

/// Area of `a XOR b`. Zero when two coverings describe the same region.
pub fn symmetric_difference_area(a: &MultiPolygon<f64>, b: &MultiPolygon<f64>) -> f64 {
    a.xor(b).unsigned_area()
}

pub fn envelope_of(geom: &MultiPolygon<f64>, pad: f64) -> Option<AABB<[f64; 2]>> {
    let rect = geom.bounding_rect()?;
    Some(AABB::from_corners(
        [rect.min().x - pad, rect.min().y - pad],
        [rect.max().x + pad, rect.max().y + pad],
    ))
}

/// Every ring segment (exteriors and holes) of a multipolygon.
pub fn boundary_segments(geom: &MultiPolygon<f64>) -> Vec<Line<f64>> {
    geom.0
        .iter()
        .flat_map(|poly: &Polygon<f64>| {
            std::iter::once(poly.exterior())
                .chain(poly.interiors().iter())
                .flat_map(|ring| ring.lines())
        })
        .filter(|l| l.start != l.end)
        .collect()
}

// --- Segment index ---

struct SegmentEntry {
    line: Line<f64>,
}

impl RTreeObject for SegmentEntry {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_corners(
            [self.line.start.x, self.line.start.y],
            [self.line.end.x, self.line.end.y],
        )
    }
}

fn segment_tree(geom: &MultiPolygon<f64>) -> RTree<SegmentEntry> {
    RTree::bulk_load(
        boundary_segments(geom)
            .into_iter()
            .map(|line| SegmentEntry { line })
            .collect(),
    )
}

fn padded_envelope(line: &Line<f64>, pad: f64) -> AABB<[f64; 2]> {
    AABB::from_corners(
        [
            line.start.x.min(line.end.x) - pad,
            line.start.y.min(line.end.y) - pad,
        ],
        [
            line.start.x.max(line.end.x) + pad,
            line.start.y.max(line.end.y) + pad,
        ],
    )
}

// --- Exact adjacency predicates ---

/// Length of the stretch `a` and `b` run along together, within `tol`.
///
/// The ends of a shared stretch are always endpoints of `a` or `b` that lie on
/// both segments, so crossings and single touching points measure zero.
fn collinear_overlap(a: &Line<f64>, b: &Line<f64>, tol: f64) -> f64 {
    let on_both: Vec<Point<f64>> = [a.start_point(), a.end_point(), b.start_point(), b.end_point()]
        .into_iter()
        .filter(|p| Euclidean.distance(p, a) <= tol && Euclidean.distance(p, b) <= tol)
        .collect();

    on_both
        .iter()
        .tuple_combinations()
        .map(|(p, q)| Euclidean.distance(*p, *q))
        .fold(0.0, f64::max)
}

/// Length of boundary the two geometries have in common.
///
/// Measured as collinear overlap of their ring segments, so two polygons that
/// only meet at a corner share nothing.
pub fn shared_boundary_length(a: &MultiPolygon<f64>, b: &MultiPolygon<f64>, tol: f64) -> f64 {
    let tree = segment_tree(b);
    let mut total = 0.0;

    for seg in boundary_segments(a) {
        for other in tree.locate_in_envelope_intersecting(&padded_envelope(&seg, tol)) {
            total += collinear_overlap(&seg, &other.line, tol);
        }
    }
    total
}

/// True if the boundaries come within `tol` of each other (shared edge or point).
pub fn boundaries_touch(a: &MultiPolygon<f64>, b: &MultiPolygon<f64>, tol: f64) -> bool {
    let tree = segment_tree(b);

    boundary_segments(a).iter().any(|seg| {
        tree.locate_in_envelope_intersecting(&padded_envelope(seg, tol))
            .any(|other| Euclidean.distance(seg, &other.line) <= tol)
    })
}

#[cfg(test)]
pub(crate) mod test_shapes {
    use geo::{MultiPolygon, Rect, coord};

    pub fn rect(x0: f64, y0: f64, x1: f64, y1: f64) -> MultiPolygon<f64> {
        MultiPolygon::new(vec![
            Rect::new(coord! { x: x0, y: y0 }, coord! { x: x1, y: y1 }).to_polygon(),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::test_shapes::rect;
    use super::*;

    #[test]
    fn test_shared_boundary_full_edge() {
        let a = rect(0.0, 0.0, 1.0, 1.0);
        let b = rect(1.0, 0.0, 2.0, 1.0);
        let len = shared_boundary_length(&a, &b, 1e-9);
        assert!((len - 1.0).abs() < 1e-9, "expected 1.0, got {}", len);
    }

    #[test]
    fn test_shared_boundary_partial_edge() {
        let a = rect(0.0, 0.0, 1.0, 1.0);
        let b = rect(1.0, 0.5, 2.0, 3.0);
        let len = shared_boundary_length(&a, &b, 1e-9);
        assert!((len - 0.5).abs() < 1e-9, "expected 0.5, got {}", len);
    }

    #[test]
    fn test_corner_contact_shares_no_boundary_but_touches() {
        let a = rect(0.0, 0.0, 1.0, 1.0);
        let b = rect(1.0, 1.0, 2.0, 2.0);
        assert_eq!(shared_boundary_length(&a, &b, 1e-9), 0.0);
        assert!(boundaries_touch(&a, &b, 1e-9));
    }

    #[test]
    fn test_separate_shapes_do_not_touch() {
        let a = rect(0.0, 0.0, 1.0, 1.0);
        let b = rect(1.5, 0.0, 2.0, 1.0);
        assert!(!boundaries_touch(&a, &b, 1e-9));
        assert!(boundaries_touch(&a, &b, 0.6));
    }

    #[test]
    fn test_crossing_and_offset_segments_share_nothing() {
        let a = Line::new(geo::coord! { x: 0.0, y: 0.0 }, geo::coord! { x: 2.0, y: 0.0 });
        let crossing = Line::new(geo::coord! { x: 1.0, y: -1.0 }, geo::coord! { x: 1.0, y: 1.0 });
        let parallel = Line::new(geo::coord! { x: 0.0, y: 0.5 }, geo::coord! { x: 2.0, y: 0.5 });
        let reversed = Line::new(geo::coord! { x: 3.0, y: 1e-12 }, geo::coord! { x: 1.0, y: 0.0 });

        assert_eq!(collinear_overlap(&a, &crossing, 1e-9), 0.0);
        assert_eq!(collinear_overlap(&a, &parallel, 1e-9), 0.0);
        assert!((collinear_overlap(&a, &reversed, 1e-9) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_touch_tolerance_bridges_small_gaps() {
        let a = rect(0.0, 0.0, 1.0, 1.0);
        let b = rect(1.0 + 1e-7, 0.0, 2.0, 1.0);
        assert!(boundaries_touch(&a, &b, 1e-6));
        assert!(!boundaries_touch(&a, &b, 1e-8));
    }

    #[test]
    fn test_union_all_and_symmetric_difference() {
        let parts = vec![
            rect(0.0, 0.0, 1.0, 1.0),
            rect(1.0, 0.0, 2.0, 1.0),
            rect(2.0, 0.0, 3.0, 1.0),
        ];
        let merged = union_all(parts);
        assert!((merged.unsigned_area() - 3.0).abs() < 1e-9);
        assert_eq!(merged.0.len(), 1, "adjacent squares should merge into one part");

        let whole = rect(0.0, 0.0, 3.0, 1.0);
        assert!(symmetric_difference_area(&merged, &whole) < 1e-9);
    }
}
