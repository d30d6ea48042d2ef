// ===========================================================================
// Coordinate reference systems and the reprojections the engine knows about
// ===========================================================================
use crate::error::{PartitionError, Result};
use geo::Point;
use std::fmt;

pub const EARTH_RADIUS: f64 = 6378137.0;

/// An EPSG code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Crs(pub u32);

impl Crs {
    pub const WGS_84: Crs = Crs(4326);
    pub const WEB_MERCATOR: Crs = Crs(3857);
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EPSG:{}", self.0)
    }
}

/// Convert lat/lng (EPSG:4326) to Web Mercator (EPSG:3857)
/// Input: (longitude, latitude) in degrees
/// Output: (x, y) in meters
pub fn lat_lng_to_web_merc(lon: f64, lat: f64) -> (f64, f64) {
    let x = EARTH_RADIUS * lon.to_radians();
    let y = EARTH_RADIUS * ((std::f64::consts::FRAC_PI_4 + lat.to_radians() / 2.0).tan()).ln();
    (x, y)
}

/// Convert Web Mercator (EPSG:3857) to lat/lng (EPSG:4326)
pub fn web_merc_to_lat_lng(x: f64, y: f64) -> (f64, f64) {
    let lon = (x / EARTH_RADIUS).to_degrees();
    let lat = (2.0 * (y / EARTH_RADIUS).exp().atan() - std::f64::consts::FRAC_PI_2).to_degrees();
    (lon, lat)
}

type Transform = fn(f64, f64) -> (f64, f64);

fn transform_for(from: Crs, to: Crs) -> Result<Transform> {
    match (from, to) {
        (Crs::WGS_84, Crs::WEB_MERCATOR) => Ok(lat_lng_to_web_merc as Transform),
        (Crs::WEB_MERCATOR, Crs::WGS_84) => Ok(web_merc_to_lat_lng as Transform),
        _ => Err(PartitionError::CrsMismatch { from, to }),
    }
}

/// Resolve the CRS shared by two inputs.
///
/// Both sides must carry a CRS. Returns `None` when they already agree, or the
/// `(from, to)` pair the second input has to be moved through.
pub fn reconcile(
    target: Option<Crs>,
    target_name: &'static str,
    other: Option<Crs>,
    other_name: &'static str,
) -> Result<Option<(Crs, Crs)>> {
    let target = target.ok_or(PartitionError::MissingCrs { input: target_name })?;
    let other = other.ok_or(PartitionError::MissingCrs { input: other_name })?;

    if target == other {
        return Ok(None);
    }

    // Fail early on pairs we have no transform for.
    transform_for(other, target)?;
    Ok(Some((other, target)))
}

pub fn reproject_point(point: Point<f64>, from: Crs, to: Crs) -> Result<Point<f64>> {
    if from == to {
        return Ok(point);
    }
    let f = transform_for(from, to)?;
    let (x, y) = f(point.x(), point.y());
    Ok(Point::new(x, y))
}
