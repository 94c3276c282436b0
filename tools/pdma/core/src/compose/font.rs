use font8x8::legacy::BASIC_LEGACY;

/// Width and height of one glyph cell in unscaled pixels.
pub const GLYPH_SIZE: u32 = 8;

/// Read-only 8x8 bitmask lookup. Each row byte has bit 0 as the leftmost
/// column.
pub trait GlyphTable {
    /// `None` for codes outside the table.
    fn glyph(&self, code: u8) -> Option<[u8; 8]>;
}

impl<G: GlyphTable + ?Sized> GlyphTable for &G {
    #[inline(always)]
    fn glyph(&self, code: u8) -> Option<[u8; 8]> {
        (**self).glyph(code)
    }
}

/// The public-domain 8x8 ASCII set, codes 0..=127.
#[derive(Copy, Clone, Debug, Default)]
pub struct Font8x8;

impl GlyphTable for Font8x8 {
    #[inline(always)]
    fn glyph(&self, code: u8) -> Option<[u8; 8]> {
        BASIC_LEGACY.get(code as usize).copied()
    }
}
