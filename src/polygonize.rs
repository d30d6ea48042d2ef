//! Polygonize noded line work.
//!
//! Builds a planar half-edge graph from the segments, strips dangling edges
//! and cut edges, then walks every face:
//! 1. bounded faces come out clockwise and become polygon shells
//! 2. the outer boundary of each connected component comes out counter-clockwise
//!    and becomes a hole of the smallest shell that encloses it, if any

use ahash::AHashMap;
use geo::{Area, Contains, Coord, Line, LineString, Point, Polygon};
use log::debug;
use ordered_float::OrderedFloat;

/// A vertex in the planar graph
#[derive(Debug, Clone)]
struct GraphVertex {
    pos: Coord<f64>,
    /// Outgoing half-edges
    edges: Vec<usize>,
}

/// A half-edge in the planar graph
#[derive(Debug, Clone)]
struct HalfEdge {
    start: usize,
    end: usize,
    twin: usize,
    /// Next half-edge in face traversal
    next: Option<usize>,
    deleted: bool,
}

struct PlanarGraph {
    vertices: Vec<GraphVertex>,
    edges: Vec<HalfEdge>,
}

impl PlanarGraph {
    fn build(segments: &[Line<f64>]) -> Self {
        let mut vertices: Vec<GraphVertex> = Vec::new();
        let mut edges: Vec<HalfEdge> = Vec::new();
        let mut pos_to_vertex: AHashMap<(u64, u64), usize> = AHashMap::new();

        let mut vertex_for = |pos: Coord<f64>, vertices: &mut Vec<GraphVertex>| -> usize {
            *pos_to_vertex
                .entry((pos.x.to_bits(), pos.y.to_bits()))
                .or_insert_with(|| {
                    vertices.push(GraphVertex {
                        pos,
                        edges: Vec::new(),
                    });
                    vertices.len() - 1
                })
        };

        for seg in segments {
            let v1 = vertex_for(seg.start, &mut vertices);
            let v2 = vertex_for(seg.end, &mut vertices);
            if v1 == v2 {
                continue;
            }

            let e1 = edges.len();
            let e2 = e1 + 1;
            edges.push(HalfEdge {
                start: v1,
                end: v2,
                twin: e2,
                next: None,
                deleted: false,
            });
            edges.push(HalfEdge {
                start: v2,
                end: v1,
                twin: e1,
                next: None,
                deleted: false,
            });
            vertices[v1].edges.push(e1);
            vertices[v2].edges.push(e2);
        }

        Self { vertices, edges }
    }

    fn delete_edge(&mut self, e: usize) {
        let twin = self.edges[e].twin;
        self.edges[e].deleted = true;
        self.edges[twin].deleted = true;
    }

    fn active_edges(&self, v: usize) -> impl Iterator<Item = usize> + '_ {
        self.vertices[v]
            .edges
            .iter()
            .copied()
            .filter(|&e| !self.edges[e].deleted)
    }

    /// Iteratively remove dangling edges (vertices of degree one).
    fn prune_filaments(&mut self) -> usize {
        let mut removed = 0;
        let mut stack: Vec<usize> = (0..self.vertices.len()).collect();

        while let Some(v) = stack.pop() {
            let active: Vec<usize> = self.active_edges(v).collect();
            let [e] = active[..] else {
                continue;
            };
            let other = self.edges[e].end;
            self.delete_edge(e);
            removed += 1;
            stack.push(other);
        }
        removed
    }

    /// Link half-edges: an incoming edge continues with the next outgoing edge
    /// counter-clockwise from its own twin.
    fn link(&mut self) {
        for v in 0..self.vertices.len() {
            let pos = self.vertices[v].pos;
            let mut outgoing: Vec<usize> = self.active_edges(v).collect();
            if outgoing.is_empty() {
                continue;
            }

            outgoing.sort_by_key(|&e| {
                let end = self.vertices[self.edges[e].end].pos;
                OrderedFloat((end.y - pos.y).atan2(end.x - pos.x))
            });

            for i in 0..outgoing.len() {
                let twin = self.edges[outgoing[i]].twin;
                self.edges[twin].next = Some(outgoing[(i + 1) % outgoing.len()]);
            }
        }
    }

    /// Face cycles as lists of half-edge indices.
    fn faces(&self) -> Vec<Vec<usize>> {
        let mut used = vec![false; self.edges.len()];
        let mut faces = Vec::new();

        for start in 0..self.edges.len() {
            if used[start] || self.edges[start].deleted {
                continue;
            }

            let mut face = Vec::new();
            let mut current = start;
            loop {
                if used[current] {
                    break;
                }
                used[current] = true;
                face.push(current);

                match self.edges[current].next {
                    Some(next) if next == start => {
                        faces.push(face);
                        break;
                    }
                    Some(next) => current = next,
                    None => break,
                }
            }
        }
        faces
    }

    fn ring(&self, face: &[usize]) -> LineString<f64> {
        let mut coords: Vec<Coord<f64>> = face
            .iter()
            .map(|&e| self.vertices[self.edges[e].start].pos)
            .collect();
        if let Some(first) = coords.first().copied() {
            coords.push(first);
        }
        LineString::new(coords)
    }
}

/// Every bounded face of the arrangement formed by `segments`, which must
/// already be noded (segments meet only at endpoints).
pub fn polygonize(segments: &[Line<f64>]) -> Vec<Polygon<f64>> {
    let mut graph = PlanarGraph::build(segments);

    let faces = loop {
        let pruned = graph.prune_filaments();
        graph.link();
        let faces = graph.faces();

        // A cut edge is walked on both sides by the same face.
        let mut face_of = vec![usize::MAX; graph.edges.len()];
        for (f, face) in faces.iter().enumerate() {
            for &e in face {
                face_of[e] = f;
            }
        }
        let cut_edges: Vec<usize> = (0..graph.edges.len())
            .filter(|&e| {
                let he = &graph.edges[e];
                !he.deleted && e < he.twin && face_of[e] == face_of[he.twin]
            })
            .collect();

        debug!(
            "polygonize pass: {} filament edges pruned, {} cut edges, {} faces",
            pruned,
            cut_edges.len(),
            faces.len()
        );

        if cut_edges.is_empty() {
            break faces;
        }
        for e in cut_edges {
            graph.delete_edge(e);
        }
    };

    let mut shells: Vec<(Polygon<f64>, f64)> = Vec::new();
    let mut outer_rings: Vec<LineString<f64>> = Vec::new();

    for face in &faces {
        if face.len() < 3 {
            continue;
        }
        let ring = graph.ring(face);
        let signed = Polygon::new(ring.clone(), vec![]).signed_area();

        if signed < 0.0 {
            let mut shell = ring;
            shell.0.reverse();
            shells.push((Polygon::new(shell, vec![]), -signed));
        } else if signed > 0.0 {
            outer_rings.push(ring);
        }
    }

    let mut holes: Vec<Vec<LineString<f64>>> = vec![Vec::new(); shells.len()];
    for ring in outer_rings {
        let Some(probe) = ring.0.first().copied().map(Point::from) else {
            continue;
        };
        let enclosing = shells
            .iter()
            .enumerate()
            .filter(|(_, (shell, _))| shell.contains(&probe))
            .min_by_key(|(_, (_, area))| OrderedFloat(*area))
            .map(|(i, _)| i);

        if let Some(i) = enclosing {
            holes[i].push(ring);
        }
    }

    shells
        .into_iter()
        .zip(holes)
        .map(|((shell, _), interiors)| {
            let (exterior, _) = shell.into_inner();
            Polygon::new(exterior, interiors)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::coord;

    fn line(x0: f64, y0: f64, x1: f64, y1: f64) -> Line<f64> {
        Line::new(coord! { x: x0, y: y0 }, coord! { x: x1, y: y1 })
    }

    fn square(x0: f64, y0: f64, size: f64) -> Vec<Line<f64>> {
        let (x1, y1) = (x0 + size, y0 + size);
        vec![
            line(x0, y0, x1, y0),
            line(x1, y0, x1, y1),
            line(x1, y1, x0, y1),
            line(x0, y1, x0, y0),
        ]
    }

    #[test]
    fn test_single_square() {
        let polys = polygonize(&square(0.0, 0.0, 2.0));
        assert_eq!(polys.len(), 1);
        assert!((polys[0].unsigned_area() - 4.0).abs() < 1e-12);
        assert!(polys[0].signed_area() > 0.0, "shells are counter-clockwise");
    }

    #[test]
    fn test_grid_gives_cells() {
        // 2x2 grid of unit cells, already noded
        let mut segments = Vec::new();
        for i in 0..=2 {
            let c = i as f64;
            segments.push(line(0.0, c, 1.0, c));
            segments.push(line(1.0, c, 2.0, c));
            segments.push(line(c, 0.0, c, 1.0));
            segments.push(line(c, 1.0, c, 2.0));
        }

        let polys = polygonize(&segments);
        assert_eq!(polys.len(), 4);
        for p in &polys {
            assert!((p.unsigned_area() - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_dangles_are_ignored() {
        let mut segments = square(0.0, 0.0, 1.0);
        segments.push(line(1.0, 1.0, 3.0, 3.0));
        segments.push(line(0.0, 0.0, -1.0, 0.0));

        let polys = polygonize(&segments);
        assert_eq!(polys.len(), 1);
        assert!((polys[0].unsigned_area() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_nested_loop_becomes_hole() {
        let mut segments = square(0.0, 0.0, 10.0);
        segments.extend(square(4.0, 4.0, 2.0));

        let polys = polygonize(&segments);
        assert_eq!(polys.len(), 2);

        let outer = polys
            .iter()
            .find(|p| !p.interiors().is_empty())
            .expect("outer square should carry a hole");
        assert!((outer.unsigned_area() - 96.0).abs() < 1e-9);
    }

    #[test]
    fn test_bridged_loop_still_gets_a_hole() {
        // inner square tied to the outer one by a cut edge
        let mut segments = square(0.0, 0.0, 10.0);
        segments.extend(square(4.0, 4.0, 2.0));
        segments.push(line(0.0, 5.0, 4.0, 5.0));
        // node the outer and inner rings where the bridge lands
        let segments = crate::noding::node_segments(&segments, 1e-9);

        let polys = polygonize(&segments);
        assert_eq!(polys.len(), 2);
        let total: f64 = polys.iter().map(|p| p.unsigned_area()).sum();
        assert!((total - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_open_lines_produce_nothing() {
        let polys = polygonize(&[line(0.0, 0.0, 1.0, 0.0), line(1.0, 0.0, 1.0, 1.0)]);
        assert!(polys.is_empty());
    }
}
