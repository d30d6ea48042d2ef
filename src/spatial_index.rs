use crate::geometry_utils::envelope_of;
use geo::MultiPolygon;
use rstar::{AABB, RTree, RTreeObject};

/// R-tree entry for a region's bounding box
#[derive(Debug, Clone, PartialEq)]
pub struct RegionBboxEntry {
    pub idx: usize,
    min: [f64; 2],
    max: [f64; 2],
}

impl RegionBboxEntry {
    pub fn new(idx: usize, geom: &MultiPolygon<f64>) -> Option<Self> {
        let env = envelope_of(geom, 0.0)?;
        Some(Self {
            idx,
            min: env.lower(),
            max: env.upper(),
        })
    }
}

impl RTreeObject for RegionBboxEntry {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_corners(self.min, self.max)
    }
}

/// Bounding-box index over a list of region geometries, keyed by list index.
///
/// Candidates returned by [`RegionIndex::candidates`] are only bbox hits; callers
/// still apply an exact adjacency predicate.
pub struct RegionIndex {
    tree: RTree<RegionBboxEntry>,
    entries: Vec<Option<RegionBboxEntry>>,
}

impl RegionIndex {
    pub fn build<'a>(geoms: impl IntoIterator<Item = &'a MultiPolygon<f64>>) -> Self {
        let entries: Vec<Option<RegionBboxEntry>> = geoms
            .into_iter()
            .enumerate()
            .map(|(idx, g)| RegionBboxEntry::new(idx, g))
            .collect();

        let tree = RTree::bulk_load(entries.iter().flatten().cloned().collect());
        Self { tree, entries }
    }

    /// Indices of regions whose bbox intersects `geom`'s bbox padded by `pad`,
    /// ascending, excluding `exclude`.
    pub fn candidates(&self, geom: &MultiPolygon<f64>, pad: f64, exclude: usize) -> Vec<usize> {
        let Some(env) = envelope_of(geom, pad) else {
            return vec![];
        };

        let mut hits: Vec<usize> = self
            .tree
            .locate_in_envelope_intersecting(&env)
            .map(|e| e.idx)
            .filter(|&idx| idx != exclude)
            .collect();
        hits.sort_unstable();
        hits
    }

    pub fn remove(&mut self, idx: usize) {
        if let Some(Some(entry)) = self.entries.get_mut(idx).map(Option::take) {
            self.tree.remove(&entry);
        }
    }

    /// Replace the envelope stored for `idx` (after its geometry grew).
    pub fn update(&mut self, idx: usize, geom: &MultiPolygon<f64>) {
        self.remove(idx);
        if let Some(entry) = RegionBboxEntry::new(idx, geom) {
            self.tree.insert(entry.clone());
            if idx >= self.entries.len() {
                self.entries.resize(idx + 1, None);
            }
            self.entries[idx] = Some(entry);
        }
    }

    pub fn len(&self) -> usize {
        self.tree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry_utils::test_shapes::rect;

    #[test]
    fn test_candidates_are_bbox_hits_in_order() {
        let geoms = vec![
            rect(0.0, 0.0, 1.0, 1.0),
            rect(5.0, 5.0, 6.0, 6.0),
            rect(1.0, 0.0, 2.0, 1.0),
            rect(0.0, 1.0, 1.0, 2.0),
        ];
        let index = RegionIndex::build(&geoms);

        assert_eq!(index.candidates(&geoms[0], 0.0, 0), vec![2, 3]);
        assert!(index.candidates(&geoms[1], 0.0, 1).is_empty());
    }

    #[test]
    fn test_remove_and_update() {
        let geoms = vec![rect(0.0, 0.0, 1.0, 1.0), rect(1.0, 0.0, 2.0, 1.0)];
        let mut index = RegionIndex::build(&geoms);
        assert_eq!(index.len(), 2);

        index.remove(1);
        assert_eq!(index.len(), 1);
        assert!(index.candidates(&geoms[0], 0.0, 0).is_empty());

        index.update(0, &rect(0.0, 0.0, 2.0, 1.0));
        assert_eq!(index.len(), 1);
        assert_eq!(index.candidates(&rect(1.5, 0.0, 3.0, 1.0), 0.0, usize::MAX), vec![0]);
    }
}
