//! Tag colors
//!
//! Stateless lookup: each tag name gets a row of shades and each tag in that
//! name picks one by id. The same ids always map to the same color.

use crate::models::TagView;
use crate::types::{TagId, TagNameId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// `#rrggbb`
    pub fn to_hex(&self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

const fn rgb(hex: u32) -> Rgb {
    Rgb::new((hex >> 16) as u8, (hex >> 8) as u8, hex as u8)
}

/// Color for tags without a usable id
pub const EMPTY_TAG_COLOR: Rgb = rgb(0x64748b);

pub const TAG_SHADES: usize = 6;

/// One row per tag-name slot, one column per tag slot
pub const TAG_COLORS: [[Rgb; TAG_SHADES]; 8] = [
    // red
    [rgb(0xfca5a5), rgb(0xf87171), rgb(0xef4444), rgb(0xdc2626), rgb(0xb91c1c), rgb(0x991b1b)],
    // orange
    [rgb(0xfdba74), rgb(0xfb923c), rgb(0xf97316), rgb(0xea580c), rgb(0xc2410c), rgb(0x9a3412)],
    // amber
    [rgb(0xfcd34d), rgb(0xfbbf24), rgb(0xf59e0b), rgb(0xd97706), rgb(0xb45309), rgb(0x92400e)],
    // green
    [rgb(0x86efac), rgb(0x4ade80), rgb(0x22c55e), rgb(0x16a34a), rgb(0x15803d), rgb(0x166534)],
    // teal
    [rgb(0x5eead4), rgb(0x2dd4bf), rgb(0x14b8a6), rgb(0x0d9488), rgb(0x0f766e), rgb(0x115e59)],
    // sky
    [rgb(0x7dd3fc), rgb(0x38bdf8), rgb(0x0ea5e9), rgb(0x0284c7), rgb(0x0369a1), rgb(0x075985)],
    // violet
    [rgb(0xc4b5fd), rgb(0xa78bfa), rgb(0x8b5cf6), rgb(0x7c3aed), rgb(0x6d28d9), rgb(0x5b21b6)],
    // pink
    [rgb(0xf9a8d4), rgb(0xf472b6), rgb(0xec4899), rgb(0xdb2777), rgb(0xbe185d), rgb(0x9d174d)],
];

/// `TAG_COLORS[name_id mod rows][tag_id mod shades]`, total over negative ids
pub fn color_for(name_id: TagNameId, tag_id: TagId) -> Rgb {
    let row = name_id.rem_euclid(TAG_COLORS.len() as i64) as usize;
    let column = tag_id.rem_euclid(TAG_SHADES as i64) as usize;
    TAG_COLORS[row][column]
}

/// Color of an optional tag, e.g. a directory node that no tag ends at
pub fn color_for_tag(tag: Option<&TagView>) -> Rgb {
    tag.map_or(EMPTY_TAG_COLOR, |tag| color_for(tag.name_id, tag.id))
}
