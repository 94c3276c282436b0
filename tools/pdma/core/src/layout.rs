//! Board memory map and screen placement.

use crate::framebuffer::Rect;

/// Base of PS DDR as seen by the fabric.
pub const DDR_BASE: u32 = 0x0010_0000;

pub const H_RES_PIXELS: u32 = 1280;
pub const V_RES_LINES: u32 = 720;
pub const BYTES_PER_PIXEL: u32 = 4;
pub const H_STRIDE: u32 = H_RES_PIXELS * BYTES_PER_PIXEL;
pub const FRAME_SIZE: u32 = H_STRIDE * V_RES_LINES;

/// Classifier input size.
pub const TARGET_WIDTH: u32 = 224;
pub const TARGET_HEIGHT: u32 = 224;

pub const IMG_POS_X: u32 = 300;
pub const IMG_POS_Y: u32 = 248;
pub const TEXT_POS_X: i32 = (IMG_POS_X + TARGET_WIDTH + 200) as i32;
pub const TEXT_POS_Y: i32 = 360;
pub const TEXT_COLOR: u32 = 0xFFFF_FFFF;
pub const TEXT_SCALE: u32 = 4;

pub const FRAME_BASE: u32 = DDR_BASE + 0x1000_0000;
pub const TEXT_BASE: u32 = DDR_BASE + 0x1200_0000;
pub const TEXT_REGION_LEN: u32 = 64;
pub const RX_BUFFER_BASE: u32 = DDR_BASE + 0x0030_0000;
pub const TEST_PKT_LEN_BYTES: u32 = 32;

/// One frame store is enough: the engine parks on it.
pub const NUMBER_OF_FRAME_SETS: usize = 1;

/// Where everything lives. `Default` is the board.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Layout {
    pub h_res: u32,
    pub v_res: u32,
    pub bytes_per_pixel: u32,
    pub target_width: u32,
    pub target_height: u32,
    pub image_pos: (u32, u32),
    pub text_pos: (i32, i32),
    pub text_color: u32,
    pub text_scale: u32,
    pub frame_base: u32,
    pub text_base: u32,
    pub text_len: u32,
    pub rx_base: u32,
    pub packet_len: u32,
}

impl Default for Layout {
    fn default() -> Self {
        Self {
            h_res: H_RES_PIXELS,
            v_res: V_RES_LINES,
            bytes_per_pixel: BYTES_PER_PIXEL,
            target_width: TARGET_WIDTH,
            target_height: TARGET_HEIGHT,
            image_pos: (IMG_POS_X, IMG_POS_Y),
            text_pos: (TEXT_POS_X, TEXT_POS_Y),
            text_color: TEXT_COLOR,
            text_scale: TEXT_SCALE,
            frame_base: FRAME_BASE,
            text_base: TEXT_BASE,
            text_len: TEXT_REGION_LEN,
            rx_base: RX_BUFFER_BASE,
            packet_len: TEST_PKT_LEN_BYTES,
        }
    }
}

impl Layout {
    #[inline(always)]
    pub fn stride_bytes(&self) -> u32 {
        self.h_res * self.bytes_per_pixel
    }

    #[inline(always)]
    pub fn frame_size(&self) -> u32 {
        self.stride_bytes() * self.v_res
    }

    /// Byte offset of the image's top-left pixel inside the frame.
    #[inline(always)]
    pub fn image_offset(&self) -> u32 {
        self.image_pos.1 * self.stride_bytes() + self.image_pos.0 * self.bytes_per_pixel
    }

    /// MM2S reads straight out of the image rows in the frame.
    #[inline(always)]
    pub fn tx_base(&self) -> u32 {
        self.frame_base + self.image_offset()
    }

    /// The label area is a band from the label origin to the right edge,
    /// one scaled glyph tall.
    pub fn label_area(&self) -> Rect {
        let (x, y) = self.text_pos;
        let width = (self.h_res as i64 - x as i64).max(0) as u32;
        Rect::new(x, y, width, 8u32.saturating_mul(self.text_scale))
    }
}
