//! `android.graphics.Color` names and parsing.

use std::collections::HashMap;
use std::sync::OnceLock;

pub const BLACK: i32 = 0xFF00_0000_u32 as i32;
pub const DKGRAY: i32 = 0xFF44_4444_u32 as i32;
pub const GRAY: i32 = 0xFF88_8888_u32 as i32;
pub const LTGRAY: i32 = 0xFFCC_CCCC_u32 as i32;
pub const WHITE: i32 = 0xFFFF_FFFF_u32 as i32;
pub const RED: i32 = 0xFFFF_0000_u32 as i32;
pub const GREEN: i32 = 0xFF00_FF00_u32 as i32;
pub const BLUE: i32 = 0xFF00_00FF_u32 as i32;
pub const YELLOW: i32 = 0xFFFF_FF00_u32 as i32;
pub const CYAN: i32 = 0xFF00_FFFF_u32 as i32;
pub const MAGENTA: i32 = 0xFFFF_00FF_u32 as i32;

/// Names accepted by `Color.parseColor`. Earlier entries win when the
/// reverse mapping has several names for one value.
const NAMED: &[(&str, u32)] = &[
    ("black", 0xFF00_0000),
    ("darkgray", 0xFF44_4444),
    ("gray", 0xFF88_8888),
    ("lightgray", 0xFFCC_CCCC),
    ("white", 0xFFFF_FFFF),
    ("red", 0xFFFF_0000),
    ("green", 0xFF00_FF00),
    ("blue", 0xFF00_00FF),
    ("yellow", 0xFFFF_FF00),
    ("cyan", 0xFF00_FFFF),
    ("magenta", 0xFFFF_00FF),
    ("aqua", 0xFF00_FFFF),
    ("fuchsia", 0xFFFF_00FF),
    ("darkgrey", 0xFF44_4444),
    ("grey", 0xFF88_8888),
    ("lightgrey", 0xFFCC_CCCC),
    ("lime", 0xFF00_FF00),
    ("maroon", 0xFF80_0000),
    ("navy", 0xFF00_0080),
    ("olive", 0xFF80_8000),
    ("purple", 0xFF80_0080),
    ("silver", 0xFFC0_C0C0),
    ("teal", 0xFF00_8080),
];

/// Shades seen in real watch faces that read as one of the named colors.
const NEAR: &[(u32, &str)] = &[
    (0x0000_0000, "black"),
    (0xFF18_1818, "black"),
    (0xFF22_2222, "black"),
    (0xFF4F_4F4F, "black"),
    (0xFF33_3333, "darkgray"),
    (0xFFBB_BBBB, "lightgray"),
    (0xFFC9_C9C9, "lightgray"),
    (0xFFB6_B6B6, "lightgray"),
    (0xFFAA_AAAA, "lightgray"),
    (0xFF62_635E, "lightgray"),
    (0xFF42_4242, "lightgray"),
    (0xFF43_4358, "darknavy"),
];

/// Colors that keep an ambient-mode screen legible without burning power.
pub const DEFAULT_AMBIENT_ALLOWED: &[&str] = &[
    "black",
    "white",
    "gray",
    "grey",
    "lightgray",
    "lightgrey",
    "darkgray",
    "darkgrey",
];

fn names_by_value() -> &'static HashMap<u32, &'static str> {
    static MAP: OnceLock<HashMap<u32, &'static str>> = OnceLock::new();
    MAP.get_or_init(|| {
        let mut map = HashMap::new();
        for (name, value) in NAMED {
            map.entry(*value).or_insert(*name);
        }
        for (value, name) in NEAR {
            map.insert(*value, *name);
        }
        map
    })
}

/// Fully opaque colors, the only ones compared between modes.
pub fn is_opaque(color: i32) -> bool {
    (color as u32) >= 0xFF00_0000
}

/// Canonical name of `color`, or `#aarrggbb` when it has none.
pub fn color_name(color: i32) -> String {
    match names_by_value().get(&(color as u32)) {
        Some(name) => (*name).to_string(),
        None => format!("#{:08x}", color as u32),
    }
}

/// Mirror of `Color.parseColor`: `#RRGGBB`, `#AARRGGBB` or a color name.
pub fn parse_color(text: &str) -> Option<i32> {
    if let Some(hex) = text.strip_prefix('#') {
        let value = u32::from_str_radix(hex, 16).ok()?;
        return match hex.len() {
            6 => Some((value | 0xFF00_0000) as i32),
            8 => Some(value as i32),
            _ => None,
        };
    }
    let lower = text.to_ascii_lowercase();
    NAMED
        .iter()
        .find(|(name, _)| *name == lower)
        .map(|(_, value)| *value as i32)
}
