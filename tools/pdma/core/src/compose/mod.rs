//! # Frame compositor
//!
//! Writes the still image and the classification label into the frame
//! while the CPU owns it:
//!
//! ```ignore
//! let compositor = Compositor::new(Layout::default());
//! compositor.compose(&mut frame.canvas()?, &image)?;   // clear + resize
//! compositor.update_label(&mut frame.canvas()?, "Dog: 99%");
//! frame.publish(&mut cache);
//! ```
//!
//! Pixels are opaque 32-bit values: no blending, no colour conversion.

mod font;
mod resize;
mod text;

pub use font::{Font8x8, GlyphTable, GLYPH_SIZE};
pub use resize::{nearest, resize_blit, BlitError, ImageError, SourceImage};
pub use text::{draw_glyph, draw_string, measure, parse_text, TextLabel, TextSource, LABEL_CAPACITY};

use log::info;

use crate::framebuffer::{Canvas, Rect};
use crate::layout::Layout;

pub struct Compositor {
    layout: Layout,
    font: Font8x8,
}

impl Compositor {
    pub fn new(layout: Layout) -> Self {
        Self { layout, font: Font8x8 }
    }

    #[inline(always)]
    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// Clear the frame to black and place `image` at the image position.
    pub fn compose(&self, canvas: &mut Canvas<'_>, image: &SourceImage) -> Result<Rect, BlitError> {
        canvas.clear(0);
        let placed = resize_blit(
            image,
            canvas,
            self.layout.image_pos,
            self.layout.target_width,
            self.layout.target_height,
        )?;
        info!(target: "compose", "{}x{} image placed at {:?}", image.width(), image.height(), placed);
        Ok(placed)
    }

    /// A label at the configured position, colour and scale.
    pub fn label(&self, text: &str) -> TextLabel {
        TextLabel::new(text, self.layout.text_pos, self.layout.text_color, self.layout.text_scale)
    }

    /// Blank the label band and draw `text` into it. Nothing of the previous
    /// label survives.
    pub fn update_label(&self, canvas: &mut Canvas<'_>, text: &str) -> Rect {
        canvas.fill_rect(self.layout.label_area(), 0);
        let label = self.label(text);
        info!(target: "compose", "label {:?}", label.text.as_str());
        label.draw(canvas, &self.font)
    }
}
