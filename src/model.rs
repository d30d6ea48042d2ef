use crate::crs::Crs;
use compact_str::CompactString;
use geo::{Area, LineString, MultiPolygon, Point};
use rgb::RGB;
use std::fmt;

/// Opaque group identifier, e.g. a voting district id.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Label(pub CompactString);

impl Label {
    pub fn new(value: impl AsRef<str>) -> Self {
        Label(CompactString::new(value))
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Label {
    fn from(value: &str) -> Self {
        Label::new(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Color(pub RGB<u8>);

impl Color {
    pub fn to_hex(&self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.0.r, self.0.g, self.0.b)
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LabeledPoint {
    pub point: Point<f64>,
    pub label: Option<Label>,
    pub color: Option<Color>,
}

impl LabeledPoint {
    pub fn new(x: f64, y: f64, label: impl Into<Label>) -> Self {
        Self {
            point: Point::new(x, y),
            label: Some(label.into()),
            color: None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PointTable {
    pub crs: Option<Crs>,
    pub points: Vec<LabeledPoint>,
}

/// Line work the base subdivision is carved from. Expected to be noded
/// before polygonizing; see [`crate::noding`].
#[derive(Debug, Clone, Default)]
pub struct LineNetwork {
    pub crs: Option<Crs>,
    pub lines: Vec<LineString<f64>>,
    /// Outline of the served area. When present the lines are clipped to it
    /// and stitched onto its boundary; see [`crate::stitch`].
    pub area: Option<MultiPolygon<f64>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Region {
    pub geometry: MultiPolygon<f64>,
    pub label: Option<Label>,
    pub color: Option<Color>,
}

impl Region {
    pub fn unlabeled(geometry: MultiPolygon<f64>) -> Self {
        Self {
            geometry,
            label: None,
            color: None,
        }
    }

    pub fn area(&self) -> f64 {
        self.geometry.unsigned_area()
    }

    pub fn is_labeled(&self) -> bool {
        self.label.is_some()
    }
}

/// Ordered collection of regions sharing one CRS.
#[derive(Debug, Clone, Default)]
pub struct Partition {
    pub crs: Option<Crs>,
    pub regions: Vec<Region>,
}

impl Partition {
    pub fn new(crs: Option<Crs>, regions: Vec<Region>) -> Self {
        Self { crs, regions }
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    pub fn total_area(&self) -> f64 {
        self.regions.iter().map(Region::area).sum()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DistrictRow {
    /// `None` only for the residual row holding regions nobody could label.
    pub label: Option<Label>,
    pub color: Option<Color>,
    pub geometry: MultiPolygon<f64>,
}

impl DistrictRow {
    pub fn parts(&self) -> usize {
        self.geometry.0.len()
    }
}

#[derive(Debug, Clone, Default)]
pub struct DistrictTable {
    pub crs: Option<Crs>,
    pub rows: Vec<DistrictRow>,
}

impl DistrictTable {
    pub fn row(&self, label: &Label) -> Option<&DistrictRow> {
        self.rows.iter().find(|r| r.label.as_ref() == Some(label))
    }
}
