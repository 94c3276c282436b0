use alloc::vec::Vec;
use thiserror::Error;

use crate::framebuffer::{Canvas, Rect};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Error)]
pub enum ImageError {
    #[error("raw image needs a width/height header, got {0} words")]
    MissingHeader(usize),
    #[error("image has no pixels ({width}x{height})")]
    Empty { width: u32, height: u32 },
    #[error("{width}x{height} image needs {expected} pixels, got {actual}")]
    SizeMismatch { width: u32, height: u32, expected: usize, actual: usize },
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Error)]
pub enum BlitError {
    #[error("region {region:?} does not fit a {width}x{height} frame")]
    OutOfBounds { region: Rect, width: u32, height: u32 },
    #[error("target size is zero")]
    EmptyTarget,
}

/// A row-major image of opaque 32-bit pixels. Never empty.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceImage {
    width: u32,
    height: u32,
    pixels: Vec<u32>,
}

impl SourceImage {
    pub fn new(width: u32, height: u32, pixels: Vec<u32>) -> Result<Self, ImageError> {
        if width == 0 || height == 0 {
            return Err(ImageError::Empty { width, height });
        }
        let expected = width as usize * height as usize;
        if pixels.len() != expected {
            return Err(ImageError::SizeMismatch { width, height, expected, actual: pixels.len() });
        }
        Ok(Self { width, height, pixels })
    }

    /// Asset layout: `[width, height, pixel0, pixel1, ...]`. Trailing words
    /// past the last pixel are ignored.
    pub fn from_raw_words(words: &[u32]) -> Result<Self, ImageError> {
        let [width, height, pixels @ ..] = words else {
            return Err(ImageError::MissingHeader(words.len()));
        };
        let expected = *width as usize * *height as usize;
        if pixels.len() < expected {
            return Err(ImageError::SizeMismatch {
                width: *width,
                height: *height,
                expected,
                actual: pixels.len(),
            });
        }
        Self::new(*width, *height, pixels[..expected].to_vec())
    }

    pub fn from_fn(width: u32, height: u32, mut f: impl FnMut(u32, u32) -> u32) -> Result<Self, ImageError> {
        let mut pixels = Vec::with_capacity(width as usize * height as usize);
        for y in 0..height {
            for x in 0..width {
                pixels.push(f(x, y));
            }
        }
        Self::new(width, height, pixels)
    }

    #[inline(always)]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline(always)]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[inline(always)]
    pub fn pixels(&self) -> &[u32] {
        &self.pixels
    }

    #[inline(always)]
    pub fn get(&self, x: u32, y: u32) -> u32 {
        self.pixels[y as usize * self.width as usize + x as usize]
    }
}

/// `floor(dst * src_len / dst_len)` clamped to the last source index.
#[inline(always)]
pub fn nearest(dst: u32, src_len: u32, dst_len: u32) -> u32 {
    let src = dst as u64 * src_len as u64 / dst_len.max(1) as u64;
    (src as u32).min(src_len.saturating_sub(1))
}

/// Nearest-neighbour resize of `source` into the `target_w`x`target_h`
/// rectangle at `origin`. The rectangle must lie entirely on the canvas;
/// nothing is written otherwise.
pub fn resize_blit(
    source: &SourceImage,
    canvas: &mut Canvas<'_>,
    origin: (u32, u32),
    target_w: u32,
    target_h: u32,
) -> Result<Rect, BlitError> {
    if target_w == 0 || target_h == 0 {
        return Err(BlitError::EmptyTarget);
    }
    let region = Rect::new(origin.0 as i32, origin.1 as i32, target_w, target_h);
    if origin.0 > i32::MAX as u32 || origin.1 > i32::MAX as u32 || !canvas.bounds().contains_rect(&region) {
        return Err(BlitError::OutOfBounds { region, width: canvas.width(), height: canvas.height() });
    }

    for y in 0..target_h {
        let src_y = nearest(y, source.height, target_h);
        let row = &source.pixels[(src_y * source.width) as usize..][..source.width as usize];
        for x in 0..target_w {
            let src_x = nearest(x, source.width, target_w);
            canvas.put(origin.0 + x, origin.1 + y, row[src_x as usize]);
        }
    }
    Ok(region)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framebuffer::FrameBuffer;
    use alloc::vec;
    use rand::rngs::SmallRng;
    use rand::{Rng, SeedableRng};

    #[test]
    fn four_by_two_into_two_by_one() {
        let source = SourceImage::new(4, 2, vec![1, 2, 3, 4, 5, 6, 7, 8]).unwrap();
        let mut frame = FrameBuffer::alloc(2, 1, 0);
        resize_blit(&source, &mut frame.canvas().unwrap(), (0, 0), 2, 1).unwrap();
        assert_eq!(frame.pixels(), &[1, 3]);
    }

    #[test]
    fn upscale_repeats_pixels() {
        let source = SourceImage::new(2, 1, vec![0xA, 0xB]).unwrap();
        let mut frame = FrameBuffer::alloc(5, 2, 0);
        resize_blit(&source, &mut frame.canvas().unwrap(), (1, 1), 4, 1).unwrap();
        assert_eq!(frame.pixels(), &[0, 0, 0, 0, 0, 0, 0xA, 0xA, 0xB, 0xB]);
    }

    #[test]
    fn center_pixel_matches_ratio_mapping() {
        let mut rng = SmallRng::seed_from_u64(224);
        for _ in 0..200 {
            let (w, h) = (rng.gen_range(1..=300), rng.gen_range(1..=300));
            let (tw, th) = (rng.gen_range(1..=64), rng.gen_range(1..=64));
            let source = SourceImage::from_fn(w, h, |x, y| (y << 16) | x).unwrap();
            let mut frame = FrameBuffer::alloc(tw + 3, th + 2, 0);
            resize_blit(&source, &mut frame.canvas().unwrap(), (3, 2), tw, th).unwrap();

            let (cx, cy) = (tw / 2, th / 2);
            let expected = source.get((cx * w / tw).min(w - 1), (cy * h / th).min(h - 1));
            assert_eq!(frame.get(3 + cx, 2 + cy), Some(expected));
        }
    }

    #[test]
    fn region_must_fit() {
        let source = SourceImage::new(1, 1, vec![9]).unwrap();
        let mut frame = FrameBuffer::alloc(8, 8, 0);
        let err = resize_blit(&source, &mut frame.canvas().unwrap(), (5, 0), 4, 4);
        assert!(matches!(err, Err(BlitError::OutOfBounds { .. })));
        assert!(frame.pixels().iter().all(|&p| p == 0));
        assert_eq!(
            resize_blit(&source, &mut frame.canvas().unwrap(), (0, 0), 0, 4),
            Err(BlitError::EmptyTarget)
        );
    }

    #[test]
    fn raw_words() {
        let image = SourceImage::from_raw_words(&[2, 2, 1, 2, 3, 4, 99]).unwrap();
        assert_eq!((image.width(), image.height()), (2, 2));
        assert_eq!(image.pixels(), &[1, 2, 3, 4]);

        assert_eq!(SourceImage::from_raw_words(&[2]), Err(ImageError::MissingHeader(1)));
        assert!(matches!(
            SourceImage::from_raw_words(&[2, 2, 1, 2, 3]),
            Err(ImageError::SizeMismatch { expected: 4, actual: 3, .. })
        ));
        assert!(matches!(SourceImage::from_raw_words(&[0, 5]), Err(ImageError::Empty { .. })));
    }
}
