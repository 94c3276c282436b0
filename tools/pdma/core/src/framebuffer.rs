//! # Frame buffer
//!
//! One 32-bit-per-pixel frame that the CPU composes and the video engine
//! scans out. Ownership moves at the coherency boundary:
//!
//! ```ignore
//! let mut frame = FrameBuffer::alloc(1280, 720, FRAME_BASE);
//! frame.canvas()?.clear(0);          // CPU owns the frame
//! frame.publish(&mut cache);         // display pipeline owns it now
//! assert!(frame.canvas().is_err());
//!
//! // later: take it back, draw, and hand it over again on drop
//! let mut guard = frame.reacquire(&mut cache);
//! guard.canvas().put(0, 0, 0xFFFF_FFFF);
//! ```
//!
//! All pixel addressing goes through [`Canvas::index`].

use alloc::vec;
use alloc::vec::Vec;
use log::debug;
use thiserror::Error;

use crate::cache::{CacheMaintenance, DmaRegion, DmaSlice};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Owner {
    Cpu,
    Device,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("storage holds {actual} pixels, geometry needs {expected}")]
    StorageSize { expected: usize, actual: usize },
    #[error("stride {stride} is narrower than width {width}")]
    StrideTooSmall { stride: u32, width: u32 },
    #[error("frame is owned by the display pipeline")]
    DeviceOwned,
}

/// Axis-aligned rectangle in frame coordinates.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub const fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    #[inline(always)]
    pub fn right(&self) -> i64 {
        self.x as i64 + self.width as i64
    }

    #[inline(always)]
    pub fn bottom(&self) -> i64 {
        self.y as i64 + self.height as i64
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn contains_rect(&self, other: &Rect) -> bool {
        other.x >= self.x && other.y >= self.y && other.right() <= self.right() && other.bottom() <= self.bottom()
    }
}

pub struct FrameBuffer<S = Vec<u32>> {
    storage: S,
    width: u32,
    height: u32,
    stride: u32,
    bus_addr: u32,
    owner: Owner,
}

impl FrameBuffer<Vec<u32>> {
    /// Zeroed, tightly packed host-side frame standing in for `bus_addr`.
    pub fn alloc(width: u32, height: u32, bus_addr: u32) -> Self {
        Self {
            storage: vec![0; width as usize * height as usize],
            width,
            height,
            stride: width,
            bus_addr,
            owner: Owner::Cpu,
        }
    }
}

impl<S: AsRef<[u32]> + AsMut<[u32]>> FrameBuffer<S> {
    /// Wrap existing storage. `stride` is in pixels.
    pub fn new(storage: S, width: u32, height: u32, stride: u32, bus_addr: u32) -> Result<Self, FrameError> {
        if stride < width {
            return Err(FrameError::StrideTooSmall { stride, width });
        }
        let expected = stride as usize * height as usize;
        let actual = storage.as_ref().len();
        if actual < expected {
            return Err(FrameError::StorageSize { expected, actual });
        }
        Ok(Self { storage, width, height, stride, bus_addr, owner: Owner::Cpu })
    }

    #[inline(always)]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline(always)]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Stride in pixels.
    #[inline(always)]
    pub fn stride(&self) -> u32 {
        self.stride
    }

    #[inline(always)]
    pub fn owner(&self) -> Owner {
        self.owner
    }

    #[inline(always)]
    pub fn bounds(&self) -> Rect {
        Rect::new(0, 0, self.width, self.height)
    }

    /// The CPU's view of the pixels. Reading is always allowed; whether it
    /// reflects device writes depends on the last acquire.
    #[inline(always)]
    pub fn pixels(&self) -> &[u32] {
        self.storage.as_ref()
    }

    pub fn get(&self, x: u32, y: u32) -> Option<u32> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.pixels().get((y * self.stride + x) as usize).copied()
    }

    /// Write access, only while the CPU owns the frame.
    pub fn canvas(&mut self) -> Result<Canvas<'_>, FrameError> {
        match self.owner {
            Owner::Cpu => Ok(self.canvas_unchecked()),
            Owner::Device => Err(FrameError::DeviceOwned),
        }
    }

    fn canvas_unchecked(&mut self) -> Canvas<'_> {
        Canvas {
            width: self.width,
            height: self.height,
            stride: self.stride,
            pixels: self.storage.as_mut(),
        }
    }

    /// Clean the whole frame and hand it to the display pipeline.
    pub fn publish<C: CacheMaintenance>(&mut self, cache: &mut C) {
        crate::cache::publish(cache, &*self);
        self.owner = Owner::Device;
        debug!(target: "frame", "frame 0x{:08X} handed to display", self.bus_addr);
    }

    /// Invalidate the frame and take it back. The guard publishes it again
    /// when dropped.
    pub fn reacquire<'a, C: CacheMaintenance>(&'a mut self, cache: &'a mut C) -> FrameGuard<'a, S, C> {
        crate::cache::acquire(cache, self);
        self.owner = Owner::Cpu;
        debug!(target: "frame", "frame 0x{:08X} reacquired by cpu", self.bus_addr);
        FrameGuard { frame: self, cache }
    }

    /// `len` bytes starting `offset` bytes into the frame.
    pub fn slice(&self, offset: u32, len: u32) -> Option<DmaSlice<'_>> {
        let bytes = self.bytes();
        let end = offset.checked_add(len)? as usize;
        let window = bytes.get(offset as usize..end)?;
        Some(DmaSlice::new(self.bus_addr.checked_add(offset)?, window))
    }
}

impl<S: AsRef<[u32]> + AsMut<[u32]>> DmaRegion for FrameBuffer<S> {
    #[inline(always)]
    fn bus_addr(&self) -> u32 {
        self.bus_addr
    }

    #[inline(always)]
    fn bytes(&self) -> &[u8] {
        bytemuck::cast_slice(self.storage.as_ref())
    }

    #[inline(always)]
    fn bytes_mut(&mut self) -> &mut [u8] {
        bytemuck::cast_slice_mut(self.storage.as_mut())
    }
}

/// CPU-owned frame reacquired from the display pipeline.
pub struct FrameGuard<'a, S: AsRef<[u32]> + AsMut<[u32]>, C: CacheMaintenance> {
    frame: &'a mut FrameBuffer<S>,
    cache: &'a mut C,
}

impl<'a, S: AsRef<[u32]> + AsMut<[u32]>, C: CacheMaintenance> FrameGuard<'a, S, C> {
    #[inline(always)]
    pub fn canvas(&mut self) -> Canvas<'_> {
        self.frame.canvas_unchecked()
    }

    #[inline(always)]
    pub fn frame(&self) -> &FrameBuffer<S> {
        self.frame
    }
}

impl<'a, S: AsRef<[u32]> + AsMut<[u32]>, C: CacheMaintenance> Drop for FrameGuard<'a, S, C> {
    fn drop(&mut self) {
        self.frame.publish(self.cache);
    }
}

/// Bounds-checked 2D view over the pixels of a CPU-owned frame.
pub struct Canvas<'a> {
    pixels: &'a mut [u32],
    width: u32,
    height: u32,
    stride: u32,
}

impl<'a> Canvas<'a> {
    /// View over raw pixels; `stride` is in pixels.
    pub fn new(pixels: &'a mut [u32], width: u32, height: u32, stride: u32) -> Result<Self, FrameError> {
        if stride < width {
            return Err(FrameError::StrideTooSmall { stride, width });
        }
        let expected = stride as usize * height as usize;
        if pixels.len() < expected {
            return Err(FrameError::StorageSize { expected, actual: pixels.len() });
        }
        Ok(Self { pixels, width, height, stride })
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
    pub fn bounds(&self) -> Rect {
        Rect::new(0, 0, self.width, self.height)
    }

    /// The only place a pixel offset is computed.
    #[inline(always)]
    pub fn index(&self, x: u32, y: u32) -> usize {
        assert!(x < self.width && y < self.height, "pixel ({}, {}) outside {}x{}", x, y, self.width, self.height);
        y as usize * self.stride as usize + x as usize
    }

    #[inline(always)]
    pub fn get(&self, x: u32, y: u32) -> u32 {
        self.pixels[self.index(x, y)]
    }

    #[inline(always)]
    pub fn put(&mut self, x: u32, y: u32, color: u32) {
        let idx = self.index(x, y);
        self.pixels[idx] = color;
    }

    /// Write if `(x, y)` is on the canvas, drop it otherwise.
    #[inline(always)]
    pub fn put_clipped(&mut self, x: i64, y: i64, color: u32) -> bool {
        if x < 0 || y < 0 || x >= self.width as i64 || y >= self.height as i64 {
            return false;
        }
        self.put(x as u32, y as u32, color);
        true
    }

    /// Fill every visible pixel; stride padding is left alone.
    pub fn clear(&mut self, color: u32) {
        self.fill_rect(self.bounds(), color);
    }

    /// Fill the part of `rect` that lies on the canvas.
    pub fn fill_rect(&mut self, rect: Rect, color: u32) {
        let x0 = (rect.x as i64).clamp(0, self.width as i64) as u32;
        let y0 = (rect.y as i64).clamp(0, self.height as i64) as u32;
        let x1 = rect.right().clamp(0, self.width as i64) as u32;
        let y1 = rect.bottom().clamp(0, self.height as i64) as u32;
        if x0 >= x1 {
            return;
        }
        for y in y0..y1 {
            let start = self.index(x0, y);
            let end = self.index(x1 - 1, y) + 1;
            self.pixels[start..end].fill(color);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{SimBoard, SimParams};

    #[test]
    fn storage_must_cover_geometry() {
        let err = FrameBuffer::new(vec![0u32; 10], 4, 3, 4, 0).err();
        assert_eq!(err, Some(FrameError::StorageSize { expected: 12, actual: 10 }));
        let err = FrameBuffer::new(vec![0u32; 16], 4, 4, 3, 0).err();
        assert_eq!(err, Some(FrameError::StrideTooSmall { stride: 3, width: 4 }));
    }

    #[test]
    fn clear_leaves_stride_padding() {
        let mut frame = FrameBuffer::new(vec![7u32; 6 * 2], 4, 2, 6, 0).unwrap();
        frame.canvas().unwrap().clear(1);
        assert_eq!(frame.pixels(), &[1, 1, 1, 1, 7, 7, 1, 1, 1, 1, 7, 7]);
    }

    #[test]
    fn fill_rect_clips() {
        let mut frame = FrameBuffer::alloc(4, 4, 0);
        frame.canvas().unwrap().fill_rect(Rect::new(-2, 2, 4, 10), 9);
        assert_eq!(frame.get(0, 2), Some(9));
        assert_eq!(frame.get(1, 3), Some(9));
        assert_eq!(frame.get(2, 2), Some(0));
        assert_eq!(frame.get(0, 1), Some(0));
    }

    #[test]
    #[should_panic]
    fn index_rejects_out_of_range() {
        let mut frame = FrameBuffer::alloc(4, 4, 0);
        frame.canvas().unwrap().put(4, 0, 1);
    }

    #[test]
    fn published_frame_is_read_only_until_reacquired() {
        let board = SimBoard::new(SimParams::default());
        let mut cache = board.cache();
        let base = board.params().ddr_base;
        let mut frame = FrameBuffer::alloc(8, 2, base);

        frame.canvas().unwrap().put(3, 1, 0xAB);
        frame.publish(&mut cache);
        assert_eq!(frame.owner(), Owner::Device);
        assert_eq!(frame.canvas().err(), Some(FrameError::DeviceOwned));
        assert_eq!(board.ddr().borrow().read_u32(base + (8 + 3) * 4), Some(0xAB));

        {
            let mut guard = frame.reacquire(&mut cache);
            guard.canvas().put(4, 1, 0xCD);
        }
        assert_eq!(frame.owner(), Owner::Device);
        assert_eq!(board.ddr().borrow().read_u32(base + (8 + 4) * 4), Some(0xCD));
    }

    #[test]
    fn slice_is_bounds_checked() {
        let frame = FrameBuffer::alloc(4, 4, 0x1000);
        let slice = frame.slice(8, 16).unwrap();
        assert_eq!(slice.bus_addr(), 0x1008);
        assert_eq!(slice.bytes().len(), 16);
        assert!(frame.slice(60, 8).is_none());
    }

    #[test]
    fn slice_past_the_top_of_the_bus_is_refused() {
        let frame = FrameBuffer::alloc(4, 4, 0xFFFF_FFF0);
        assert_eq!(frame.slice(8, 8).map(|s| s.bus_addr()), Some(0xFFFF_FFF8));
        assert!(frame.slice(16, 4).is_none());
    }
}
