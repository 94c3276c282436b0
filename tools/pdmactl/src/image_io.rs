use std::fs;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use image::{Rgba, RgbaImage};
use pdma_core::compose::SourceImage;

/// `0xAARRGGBB`, alpha forced opaque.
pub fn pack(px: Rgba<u8>) -> u32 {
    let [r, g, b, _] = px.0;
    0xFF00_0000 | (r as u32) << 16 | (g as u32) << 8 | b as u32
}

pub fn unpack(px: u32) -> Rgba<u8> {
    Rgba([(px >> 16) as u8, (px >> 8) as u8, px as u8, 0xFF])
}

/// Raw word assets (`.raw`, `.bin`) or anything `image` can decode.
pub fn load_image(path: &Path) -> Result<SourceImage> {
    let raw = matches!(path.extension().and_then(|e| e.to_str()), Some("raw" | "bin"));
    if raw {
        let bytes = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
        let words: Vec<u32> = bytes
            .chunks_exact(4)
            .map(|w| u32::from_le_bytes([w[0], w[1], w[2], w[3]]))
            .collect();
        return SourceImage::from_raw_words(&words).map_err(|e| anyhow!("{}: {}", path.display(), e));
    }

    let img = image::open(path).with_context(|| format!("decoding {}", path.display()))?.to_rgba8();
    let pixels = img.pixels().map(|px| pack(*px)).collect();
    SourceImage::new(img.width(), img.height(), pixels).map_err(|e| anyhow!("{}: {}", path.display(), e))
}

/// Raw word layout of `image`, little endian.
pub fn raw_bytes(image: &SourceImage) -> Vec<u8> {
    [image.width(), image.height()]
        .iter()
        .chain(image.pixels())
        .flat_map(|w| w.to_le_bytes())
        .collect()
}

pub fn save_frame(path: &Path, pixels: &[u32], width: u32, height: u32) -> Result<()> {
    let img = RgbaImage::from_fn(width, height, |x, y| unpack(pixels[(y * width + x) as usize]));
    img.save(path).with_context(|| format!("writing {}", path.display()))
}
