//! Satellite color palette.
//!
//! Eight hand-picked colorblind-safe colors (Okabe-Ito derived, tuned for
//! dark map backgrounds) indexed by satellite position. Constellations
//! larger than eight get algorithmic colors: golden-angle hue stepping in
//! HSL space with saturation 65–85 % and lightness 55–65 %, which keeps
//! neighboring indices visually distinct at any fleet size.

/// Base palette, hex form.
pub const SATELLITE_COLORS: [&str; 8] = [
    "#56B4E9", // sky blue
    "#E69F00", // orange
    "#CC79A7", // rose
    "#009E73", // teal
    "#F5C242", // amber
    "#0072B2", // deep blue
    "#D55E00", // vermillion
    "#999999", // gray
];

/// Base palette, RGBA form for CZML consumers.
pub const SATELLITE_COLORS_RGBA: [[u8; 4]; 8] = [
    [86, 180, 233, 255],
    [230, 159, 0, 255],
    [204, 121, 167, 255],
    [0, 158, 115, 255],
    [245, 194, 66, 255],
    [0, 114, 178, 255],
    [213, 94, 0, 255],
    [153, 153, 153, 255],
];

const GOLDEN_ANGLE_DEG: f64 = 137.508;
const EXTENDED_BASE_HUE: f64 = 200.0;

/// Color for a satellite by fleet index, any fleet size.
pub fn color_by_index(index: usize) -> String {
    if index < SATELLITE_COLORS.len() {
        return SATELLITE_COLORS[index].to_string();
    }
    let (h, s, l) = extended_hsl(index - SATELLITE_COLORS.len());
    let (r, g, b) = hsl_to_rgb(h, s, l);
    format!("#{r:02X}{g:02X}{b:02X}")
}

/// RGBA color for a satellite by fleet index.
pub fn rgba_by_index(index: usize) -> [u8; 4] {
    if index < SATELLITE_COLORS_RGBA.len() {
        return SATELLITE_COLORS_RGBA[index];
    }
    let (h, s, l) = extended_hsl(index - SATELLITE_COLORS_RGBA.len());
    let (r, g, b) = hsl_to_rgb(h, s, l);
    [r, g, b, 255]
}

/// Parse a `#RRGGBB` color into RGBA with the given alpha.
pub fn hex_to_rgba(hex: &str, alpha: u8) -> Option<[u8; 4]> {
    let hex = hex.strip_prefix('#').unwrap_or(hex);
    if hex.len() != 6 {
        return None;
    }
    let r = u8::from_str_radix(&hex[0..2], 16).ok()?;
    let g = u8::from_str_radix(&hex[2..4], 16).ok()?;
    let b = u8::from_str_radix(&hex[4..6], 16).ok()?;
    Some([r, g, b, alpha])
}

/// Same color with a different alpha.
pub fn with_alpha(rgba: [u8; 4], alpha: u8) -> [u8; 4] {
    [rgba[0], rgba[1], rgba[2], alpha]
}

/// Hue/saturation/lightness for the nth generated color.
fn extended_hsl(n: usize) -> (f64, f64, f64) {
    let hue = (EXTENDED_BASE_HUE + n as f64 * GOLDEN_ANGLE_DEG).rem_euclid(360.0);
    let saturation = 65.0 + (n % 3) as f64 * 10.0;
    let lightness = 55.0 + (n % 2) as f64 * 10.0;
    (hue, saturation, lightness)
}

fn hsl_to_rgb(h: f64, s: f64, l: f64) -> (u8, u8, u8) {
    let s = s / 100.0;
    let l = l / 100.0;
    let a = s * l.min(1.0 - l);
    let f = |n: f64| -> u8 {
        let k = (n + h / 30.0).rem_euclid(12.0);
        let color = l - a * (k - 3.0).min(9.0 - k).min(1.0).max(-1.0);
        (255.0 * color).round() as u8
    };
    (f(0.0), f(8.0), f(4.0))
}
