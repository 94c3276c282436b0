use alloc::vec::Vec;
use heapless::String;
use log::debug;

use super::font::{GlyphTable, GLYPH_SIZE};
use crate::cache::{CacheMaintenance, DmaBuffer, DmaRegion};
use crate::framebuffer::{Canvas, Rect};

/// Longest label the text region can carry.
pub const LABEL_CAPACITY: usize = 64;

/// Draw one glyph with its top-left corner at `(x, y)`. Every set bit
/// becomes a `scale`x`scale` block; pixels off the canvas are dropped.
pub fn draw_glyph(canvas: &mut Canvas<'_>, x: i64, y: i64, glyph: [u8; 8], color: u32, scale: u32) {
    let scale = scale as i64;
    let (width, height) = (canvas.width() as i64, canvas.height() as i64);
    for (row, bits) in glyph.iter().enumerate() {
        let by = y + row as i64 * scale;
        let (y0, y1) = (by.max(0), (by + scale).min(height));
        for col in 0..GLYPH_SIZE as i64 {
            if (bits >> col) & 1 == 0 {
                continue;
            }
            let bx = x + col * scale;
            let (x0, x1) = (bx.max(0), (bx + scale).min(width));
            for py in y0..y1 {
                for px in x0..x1 {
                    canvas.put_clipped(px, py, color);
                }
            }
        }
    }
}

/// Draw `text` left to right from `(x, y)`, one `8*scale` cell per
/// character. Characters the table does not have are skipped but still
/// take up their cell.
///
/// Returns the cell extent of the whole string.
pub fn draw_string<G: GlyphTable>(
    canvas: &mut Canvas<'_>,
    font: &G,
    x: i32,
    y: i32,
    text: &str,
    color: u32,
    scale: u32,
) -> Rect {
    let advance = GLYPH_SIZE as i64 * scale as i64;
    let mut cursor = x as i64;
    for c in text.chars() {
        let glyph = u8::try_from(c).ok().filter(|code| *code < 128).and_then(|code| font.glyph(code));
        if let Some(glyph) = glyph {
            draw_glyph(canvas, cursor, y as i64, glyph, color, scale);
        }
        cursor += advance;
    }
    let (width, height) = measure(text, scale);
    Rect::new(x, y, width, height)
}

/// Cell extent of `text` at `scale`.
pub fn measure(text: &str, scale: u32) -> (u32, u32) {
    let cells = text.chars().count() as u32;
    let cell = GLYPH_SIZE.saturating_mul(scale);
    (cells.saturating_mul(cell), cell)
}

/// A label produced fresh for every update.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TextLabel {
    pub text: String<LABEL_CAPACITY>,
    pub position: (i32, i32),
    pub color: u32,
    pub scale: u32,
}

impl TextLabel {
    /// `text` is cut at [`LABEL_CAPACITY`] bytes.
    pub fn new(text: &str, position: (i32, i32), color: u32, scale: u32) -> Self {
        let mut label = String::new();
        for c in text.chars() {
            if label.push(c).is_err() {
                break;
            }
        }
        Self { text: label, position, color, scale }
    }

    pub fn bounds(&self) -> Rect {
        let (width, height) = measure(&self.text, self.scale);
        Rect::new(self.position.0, self.position.1, width, height)
    }

    pub fn draw<G: GlyphTable>(&self, canvas: &mut Canvas<'_>, font: &G) -> Rect {
        draw_string(canvas, font, self.position.0, self.position.1, &self.text, self.color, self.scale)
    }
}

/// Decode a NUL-terminated text region. Bytes above 127 are dropped.
pub fn parse_text(bytes: &[u8]) -> String<LABEL_CAPACITY> {
    let mut text = String::new();
    for &b in bytes.iter().take_while(|b| **b != 0) {
        if b > 127 {
            continue;
        }
        if text.push(b as char).is_err() {
            break;
        }
    }
    text
}

/// The region another agent writes label text into.
pub struct TextSource<S = Vec<u8>> {
    region: DmaBuffer<S>,
}

impl TextSource<Vec<u8>> {
    pub fn zeroed(bus_addr: u32, len: usize) -> Self {
        Self { region: DmaBuffer::zeroed(bus_addr, len) }
    }
}

impl<S: AsRef<[u8]> + AsMut<[u8]>> TextSource<S> {
    pub fn new(region: DmaBuffer<S>) -> Self {
        Self { region }
    }

    /// Invalidate the region, then decode it.
    pub fn read<C: CacheMaintenance>(&mut self, cache: &mut C) -> String<LABEL_CAPACITY> {
        crate::cache::acquire(cache, &mut self.region);
        let text = parse_text(self.region.bytes());
        debug!(target: "text", "label source {:?}", text.as_str());
        text
    }

    pub fn region(&self) -> &DmaBuffer<S> {
        &self.region
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compose::Font8x8;
    use crate::framebuffer::FrameBuffer;
    use alloc::vec;

    struct Solid;

    impl GlyphTable for Solid {
        fn glyph(&self, code: u8) -> Option<[u8; 8]> {
            (code < 128).then_some([0xFF; 8])
        }
    }

    fn ink_bounds(frame: &FrameBuffer) -> Option<Rect> {
        let (mut x0, mut y0, mut x1, mut y1) = (u32::MAX, u32::MAX, 0, 0);
        for y in 0..frame.height() {
            for x in 0..frame.width() {
                if frame.get(x, y) != Some(0) {
                    x0 = x0.min(x);
                    y0 = y0.min(y);
                    x1 = x1.max(x + 1);
                    y1 = y1.max(y + 1);
                }
            }
        }
        (x0 != u32::MAX).then(|| Rect::new(x0 as i32, y0 as i32, x1 - x0, y1 - y0))
    }

    #[test]
    fn dog_label_box() {
        let mut frame = FrameBuffer::alloc(640, 480, 0);
        let cells = draw_string(&mut frame.canvas().unwrap(), &Solid, 300, 360, "Dog: 99%", 0xFFFF_FFFF, 4);
        assert_eq!(cells, Rect::new(300, 360, 256, 32));
        assert_eq!(ink_bounds(&frame), Some(cells));
    }

    #[test]
    fn real_font_stays_in_its_cells() {
        let mut frame = FrameBuffer::alloc(640, 480, 0);
        let cells = draw_string(&mut frame.canvas().unwrap(), &Font8x8, 300, 360, "Dog: 99%", 0xFFFF_FFFF, 4);
        let ink = ink_bounds(&frame).unwrap();
        assert!(cells.contains_rect(&ink));
        assert!(ink.width > 200);
    }

    #[test]
    fn redraw_is_idempotent() {
        let mut frame = FrameBuffer::alloc(200, 40, 0);
        draw_string(&mut frame.canvas().unwrap(), &Font8x8, 3, 4, "cat 42%", 0x00FF_00FF, 2);
        let first = frame.pixels().to_vec();
        draw_string(&mut frame.canvas().unwrap(), &Font8x8, 3, 4, "cat 42%", 0x00FF_00FF, 2);
        assert_eq!(frame.pixels(), &first[..]);
    }

    #[test]
    fn clipped_glyphs_stay_inside() {
        const CANARY: u32 = 0xDEAD_BEEF;
        let (w, h) = (20u32, 10u32);
        // one canary row above and below, canary columns either side
        let stride = w + 2;
        let mut words = vec![CANARY; (stride * (h + 2)) as usize];
        for y in 1..=h {
            let row = (y * stride + 1) as usize;
            words[row..row + w as usize].fill(0);
        }
        let start = (stride + 1) as usize;
        let mut canvas = Canvas::new(&mut words[start..], w, h, stride).unwrap();

        draw_string(&mut canvas, &Solid, 12, 6, "XYZ", 7, 2);
        draw_string(&mut canvas, &Solid, -9, -5, "AB", 7, 2);

        for y in 0..h + 2 {
            for x in 0..stride {
                let inside = (1..=h).contains(&y) && (1..=w).contains(&x);
                if !inside {
                    assert_eq!(words[(y * stride + x) as usize], CANARY, "({x}, {y})");
                }
            }
        }
        assert_eq!(words[(h * stride + w) as usize], 7);
    }

    #[test]
    fn out_of_table_characters_keep_their_cell() {
        let mut frame = FrameBuffer::alloc(64, 8, 0);
        let cells = draw_string(&mut frame.canvas().unwrap(), &Solid, 0, 0, "a\u{e9}b", 1, 1);
        assert_eq!(cells.width, 24);
        assert_eq!(frame.get(8, 0), Some(0));
        assert_eq!(frame.get(16, 0), Some(1));
    }

    #[test]
    fn text_region_parsing() {
        assert_eq!(parse_text(b"Dog: 99%\0garbage").as_str(), "Dog: 99%");
        assert_eq!(parse_text(&[b'c', 0xC3, b'a', 0xA9, b't']).as_str(), "cat");
        assert_eq!(parse_text(&[b'x'; 100]).len(), LABEL_CAPACITY);
    }

    #[test]
    fn label_truncates() {
        let long = "y".repeat(80);
        let label = TextLabel::new(&long, (0, 0), 1, 1);
        assert_eq!(label.text.len(), LABEL_CAPACITY);
        assert_eq!(label.bounds(), Rect::new(0, 0, 512, 8));
    }

    #[test]
    fn huge_scale_clips_and_saturates() {
        let mut frame = FrameBuffer::alloc(16, 16, 0);
        let cells = draw_string(&mut frame.canvas().unwrap(), &Solid, 0, 0, "ab", 1, u32::MAX);
        assert_eq!((cells.width, cells.height), (u32::MAX, u32::MAX));
        assert!(frame.pixels().iter().all(|&p| p == 1));
        assert_eq!(measure("ab", u32::MAX), (u32::MAX, u32::MAX));
    }
}
