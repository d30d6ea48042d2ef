use crate::model::{Color, Label, LabeledPoint};
use ahash::AHashMap;
use itertools::Itertools;
use rgb::RGB;

/// Golden ratio conjugate, used to step the hue so consecutive colors land far apart.
const GOLDEN_RATIO_CONJUGATE: f64 = 0.618033988749895;

const SATURATION: f64 = 0.60;
const VALUE_EVEN: f64 = 0.92;
const VALUE_ODD: f64 = 0.80;

fn hsv_to_rgb(h: f64, s: f64, v: f64) -> RGB<u8> {
    let sector = (h * 6.0).floor();
    let f = h * 6.0 - sector;
    let p = v * (1.0 - s);
    let q = v * (1.0 - s * f);
    let t = v * (1.0 - s * (1.0 - f));

    let (r, g, b) = match (sector as i64).rem_euclid(6) {
        0 => (v, t, p),
        1 => (q, v, p),
        2 => (p, v, t),
        3 => (p, q, v),
        4 => (t, p, v),
        _ => (v, p, q),
    };

    // truncation, not rounding, to stay byte-compatible with earlier exports
    RGB::new((r * 255.0) as u8, (g * 255.0) as u8, (b * 255.0) as u8)
}

/// `n` well separated colors.
///
/// Hue advances by the golden ratio conjugate each step and the value
/// alternates between two levels so large palettes still separate.
pub fn distinct_colors(n: usize) -> Vec<Color> {
    let mut h = 0.0f64;
    (0..n)
        .map(|i| {
            h = (h + GOLDEN_RATIO_CONJUGATE) % 1.0;
            let v = if i % 2 == 0 { VALUE_EVEN } else { VALUE_ODD };
            Color(hsv_to_rgb(h, SATURATION, v))
        })
        .collect()
}

/// Label -> color for a label set. Labels are sorted first, so the mapping only
/// depends on which labels exist, not on the order they were seen in.
pub fn color_map<'a>(labels: impl IntoIterator<Item = &'a Label>) -> AHashMap<Label, Color> {
    let unique: Vec<&Label> = labels.into_iter().sorted().dedup().collect();
    let palette = distinct_colors(unique.len());

    unique.into_iter().cloned().zip(palette).collect()
}

/// Fill in colors for points that don't have one yet.
pub fn assign_colors(points: &mut [LabeledPoint]) {
    let map = color_map(points.iter().filter_map(|p| p.label.as_ref()));

    for point in points.iter_mut() {
        if point.color.is_none() {
            point.color = point.label.as_ref().and_then(|l| map.get(l).copied());
        }
    }
}
