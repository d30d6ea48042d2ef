use anyhow::{Context, Result, anyhow};
use geo_types::{Geometry as GeoGeometry, LineString, MultiPolygon, Polygon};
use geojson::{Feature, FeatureCollection, GeoJson, Geometry, JsonObject, Value};
use precinct::{Color, Crs, DistrictTable, Label, LabeledPoint, LineNetwork, PointTable};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use std::str::FromStr;

fn read_features(path: &Path) -> Result<Vec<Feature>> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    let geojson = GeoJson::from_str(&contents)
        .with_context(|| format!("parsing {}", path.display()))?;

    Ok(match geojson {
        GeoJson::FeatureCollection(collection) => collection.features,
        GeoJson::Feature(feature) => vec![feature],
        GeoJson::Geometry(geometry) => vec![Feature {
            bbox: None,
            geometry: Some(geometry),
            id: None,
            properties: None,
            foreign_members: None,
        }],
    })
}

fn polygon_rings(polygon: Polygon<f64>, lines: &mut Vec<LineString<f64>>) {
    let (exterior, interiors) = polygon.into_inner();
    lines.push(exterior);
    lines.extend(interiors);
}

/// Every line-like geometry in the file. Polygon rings count as lines.
pub fn read_network(path: &Path, crs: Crs) -> Result<LineNetwork> {
    let mut lines = Vec::new();
    let mut skipped = 0;

    for feature in read_features(path)? {
        let Some(geometry) = feature.geometry else {
            continue;
        };
        match GeoGeometry::<f64>::try_from(geometry)? {
            GeoGeometry::LineString(ls) => lines.push(ls),
            GeoGeometry::MultiLineString(mls) => lines.extend(mls.0),
            GeoGeometry::Line(line) => lines.push(LineString::from(line)),
            GeoGeometry::Polygon(polygon) => polygon_rings(polygon, &mut lines),
            GeoGeometry::MultiPolygon(mp) => {
                for polygon in mp.0 {
                    polygon_rings(polygon, &mut lines);
                }
            }
            _ => skipped += 1,
        }
    }

    if skipped > 0 {
        log::warn!("Skipped {} non-line features in {}", skipped, path.display());
    }
    log::info!("Read {} line strings from {}", lines.len(), path.display());

    Ok(LineNetwork {
        crs: Some(crs),
        lines,
        area: None,
    })
}

/// All polygon features of the file as one area outline.
pub fn read_area(path: &Path) -> Result<MultiPolygon<f64>> {
    let mut polygons = Vec::new();

    for feature in read_features(path)? {
        let Some(geometry) = feature.geometry else {
            continue;
        };
        match GeoGeometry::<f64>::try_from(geometry)? {
            GeoGeometry::Polygon(polygon) => polygons.push(polygon),
            GeoGeometry::MultiPolygon(mp) => polygons.extend(mp.0),
            _ => {}
        }
    }

    if polygons.is_empty() {
        return Err(anyhow!("no polygons in area file {}", path.display()));
    }
    log::info!("Read {} area polygons from {}", polygons.len(), path.display());
    Ok(MultiPolygon::new(polygons))
}

fn parse_hex_color(s: &str) -> Option<Color> {
    let hex = s.strip_prefix('#')?;
    if hex.len() != 6 {
        return None;
    }
    let channel = |i: usize| u8::from_str_radix(hex.get(i..i + 2)?, 16).ok();
    Some(Color(rgb::RGB::new(channel(0)?, channel(2)?, channel(4)?)))
}

fn property_label(properties: Option<&JsonObject>, key: &str) -> Option<Label> {
    match properties?.get(key)? {
        serde_json::Value::String(s) if !s.is_empty() => Some(Label::new(s)),
        serde_json::Value::Number(n) => Some(Label::new(n.to_string())),
        _ => None,
    }
}

/// Point features, labeled from `label_property`. An optional `color`
/// property (`#rrggbb`) is kept as the point's color.
pub fn read_points(path: &Path, label_property: &str, crs: Crs) -> Result<PointTable> {
    let mut points = Vec::new();

    for feature in read_features(path)? {
        let Some(geometry) = feature.geometry.as_ref() else {
            continue;
        };
        let Value::Point(coords) = &geometry.value else {
            continue;
        };
        let (Some(&x), Some(&y)) = (coords.first(), coords.get(1)) else {
            return Err(anyhow!("point with fewer than two coordinates in {}", path.display()));
        };

        let properties = feature.properties.as_ref();
        let color = properties
            .and_then(|p| p.get("color"))
            .and_then(|v| v.as_str())
            .and_then(parse_hex_color);

        points.push(LabeledPoint {
            point: geo_types::Point::new(x, y),
            label: property_label(properties, label_property),
            color,
        });
    }

    log::info!("Read {} points from {}", points.len(), path.display());
    Ok(PointTable {
        crs: Some(crs),
        points,
    })
}

pub fn write_districts(path: &Path, table: &DistrictTable) -> Result<()> {
    let features = table
        .rows
        .iter()
        .map(|row| {
            let mut properties = JsonObject::new();
            properties.insert(
                "label".to_string(),
                row.label
                    .as_ref()
                    .map(|l| l.as_str().into())
                    .unwrap_or(serde_json::Value::Null),
            );
            properties.insert(
                "color".to_string(),
                row.color
                    .map(|c| c.to_hex().into())
                    .unwrap_or(serde_json::Value::Null),
            );
            properties.insert("parts".to_string(), row.parts().into());

            Feature {
                bbox: None,
                geometry: Some(Geometry::new(Value::from(&row.geometry))),
                id: None,
                properties: Some(properties),
                foreign_members: None,
            }
        })
        .collect();

    let geojson = GeoJson::FeatureCollection(FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    });

    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    serde_json::to_writer(BufWriter::new(file), &geojson)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo_types::{Coord, polygon};
    use precinct::DistrictRow;
    use tempfile::tempdir;

    #[test]
    fn test_parse_hex_color() {
        assert_eq!(
            parse_hex_color("#0ea5e9"),
            Some(Color(rgb::RGB::new(14, 165, 233)))
        );
        assert_eq!(parse_hex_color("0ea5e9"), None);
        assert_eq!(parse_hex_color("#0ea5e"), None);
    }

    #[test]
    fn test_numeric_labels_become_strings() {
        let mut properties = JsonObject::new();
        properties.insert("district_id".to_string(), 12.into());
        assert_eq!(
            property_label(Some(&properties), "district_id"),
            Some(Label::new("12"))
        );
        assert_eq!(property_label(Some(&properties), "label"), None);
    }

    #[test]
    fn test_network_polygon_rings_become_lines() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("network.geojson");
        std::fs::write(
            &path,
            r#"{"type": "FeatureCollection", "features": [
                {"type": "Feature", "properties": {}, "geometry": {"type": "Polygon", "coordinates": [
                    [[0, 0], [10, 0], [10, 10], [0, 10], [0, 0]],
                    [[2, 2], [4, 2], [4, 4], [2, 2]]
                ]}},
                {"type": "Feature", "properties": {}, "geometry": {"type": "LineString", "coordinates": [[5, -1], [5, 11]]}},
                {"type": "Feature", "properties": {}, "geometry": {"type": "Point", "coordinates": [1, 1]}}
            ]}"#,
        )
        .unwrap();

        let network = read_network(&path, Crs::WEB_MERCATOR).unwrap();
        assert_eq!(network.crs, Some(Crs::WEB_MERCATOR));
        assert_eq!(network.lines.len(), 3, "shell, hole and street");
        assert_eq!(network.lines[0].0.len(), 5);
        assert_eq!(network.lines[1].0[1], Coord { x: 4.0, y: 2.0 });
        assert_eq!(network.lines[2].0, vec![Coord { x: 5.0, y: -1.0 }, Coord { x: 5.0, y: 11.0 }]);
        assert!(network.area.is_none());

        assert_eq!(read_area(&path).unwrap().0.len(), 1);
    }

    #[test]
    fn test_written_districts_parse_back() {
        let square = polygon![(x: 0.0, y: 0.0), (x: 1.0, y: 0.0), (x: 1.0, y: 1.0), (x: 0.0, y: 1.0)];
        let far = polygon![(x: 5.0, y: 0.0), (x: 6.0, y: 0.0), (x: 6.0, y: 1.0), (x: 5.0, y: 1.0)];
        let table = DistrictTable {
            crs: Some(Crs::WEB_MERCATOR),
            rows: vec![
                DistrictRow {
                    label: Some(Label::new("12")),
                    color: Some(Color(rgb::RGB::new(14, 165, 233))),
                    geometry: MultiPolygon::new(vec![square.clone(), far]),
                },
                DistrictRow {
                    label: None,
                    color: None,
                    geometry: MultiPolygon::new(vec![square]),
                },
            ],
        };

        let dir = tempdir().unwrap();
        let path = dir.path().join("districts.geojson");
        write_districts(&path, &table).unwrap();

        let features = read_features(&path).unwrap();
        assert_eq!(features.len(), 2);

        let first = features[0].properties.as_ref().unwrap();
        assert_eq!(first["label"], serde_json::json!("12"));
        assert_eq!(first["color"], serde_json::json!("#0ea5e9"));
        assert_eq!(first["parts"], serde_json::json!(2));
        let geometry = GeoGeometry::<f64>::try_from(features[0].geometry.clone().unwrap()).unwrap();
        let GeoGeometry::MultiPolygon(mp) = geometry else {
            panic!("expected a multipolygon, got {:?}", geometry);
        };
        assert_eq!(mp, table.rows[0].geometry);

        let residue = features[1].properties.as_ref().unwrap();
        assert!(residue["label"].is_null());
        assert!(residue["color"].is_null());
        assert_eq!(residue["parts"], serde_json::json!(1));
    }
}
