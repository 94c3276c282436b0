//! # Streaming-engine adapter
//!
//! The video DMA engine reads frame stores out of DDR and streams them to
//! the display on its own. This side only sets it up and pins it to a frame:
//!
//! ```ignore
//! let mut video = StreamingAdapter::new(vdma);
//! let config = video.configure(Geometry::from_layout(&layout), layout.stride_bytes(),
//!     Mode::Parking { frame_index: 0 }, &[layout.frame_base])?;
//! video.start(&config)?; // run, then park
//! ```
//!
//! Configuration is validated here before the engine sees it. Nothing is
//! retried.

mod mmio;

pub use mmio::{AxiVdma, AxiVdmaRegs, ControlFlags, FrameDelayStride, ParkPointer, StatusFlags};

use heapless::Vec;
use log::info;
use thiserror::Error;

use crate::layout::Layout;

/// Frame store slots the engine has address registers for.
pub const MAX_FRAME_STORES: usize = 16;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Error)]
pub enum EngineFault {
    #[error("engine rejected {what}")]
    Rejected { what: &'static str },
    #[error("engine still halted (status 0x{status:08X})")]
    StillHalted { status: u32 },
    #[error("engine reported errors (status 0x{status:08X})")]
    Errors { status: u32 },
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("geometry {0:?} has a zero dimension")]
    EmptyGeometry(Geometry),
    #[error("stride {stride} is below one line of {line_bytes} bytes")]
    StrideTooSmall { stride: u32, line_bytes: u32 },
    #[error("no frame store addresses")]
    NoFrameStores,
    #[error("{count} frame stores, engine has {max}")]
    TooManyFrameStores { count: usize, max: usize },
    #[error("park index {index} outside {count} frame stores")]
    OutOfRangeIndex { index: u8, count: usize },
    #[error("configuration rejected: {0}")]
    ConfigurationRejected(EngineFault),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Error)]
pub enum StartError {
    #[error("start requested for a configuration that was not applied")]
    NotConfigured,
    #[error("start rejected: {0}")]
    StartRejected(EngineFault),
    #[error("park rejected: {0}")]
    ParkRejected(EngineFault),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Geometry {
    /// Pixels per line.
    pub width: u32,
    /// Lines per frame.
    pub height: u32,
    pub bytes_per_pixel: u32,
}

impl Geometry {
    pub fn from_layout(layout: &Layout) -> Self {
        Self { width: layout.h_res, height: layout.v_res, bytes_per_pixel: layout.bytes_per_pixel }
    }

    #[inline(always)]
    pub fn line_bytes(&self) -> u32 {
        self.width.saturating_mul(self.bytes_per_pixel)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Mode {
    /// Output one frame store forever.
    Parking { frame_index: u8 },
    /// Cycle through every frame store.
    Circular,
}

/// What the engine's read channel is programmed with.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ReadSetup {
    /// Lines.
    pub vsize: u32,
    /// Bytes per line.
    pub hsize: u32,
    /// Bytes between line starts.
    pub stride: u32,
    pub circular: bool,
    pub frame_stores: u8,
}

/// A validated configuration, as applied to the engine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StreamingConfig {
    pub geometry: Geometry,
    pub stride: u32,
    pub mode: Mode,
    pub addresses: Vec<u32, MAX_FRAME_STORES>,
}

impl StreamingConfig {
    pub fn validate(geometry: Geometry, stride: u32, mode: Mode, addresses: &[u32]) -> Result<Self, ConfigError> {
        if geometry.width == 0 || geometry.height == 0 || geometry.bytes_per_pixel == 0 {
            return Err(ConfigError::EmptyGeometry(geometry));
        }
        let line_bytes = geometry.line_bytes();
        if stride < line_bytes {
            return Err(ConfigError::StrideTooSmall { stride, line_bytes });
        }
        if addresses.is_empty() {
            return Err(ConfigError::NoFrameStores);
        }
        let addresses = Vec::from_slice(addresses).map_err(|_| ConfigError::TooManyFrameStores {
            count: addresses.len(),
            max: MAX_FRAME_STORES,
        })?;
        if let Mode::Parking { frame_index } = mode {
            if frame_index as usize >= addresses.len() {
                return Err(ConfigError::OutOfRangeIndex { index: frame_index, count: addresses.len() });
            }
        }
        Ok(Self { geometry, stride, mode, addresses })
    }

    #[inline(always)]
    pub fn frame_count(&self) -> usize {
        self.addresses.len()
    }

    pub fn read_setup(&self) -> ReadSetup {
        ReadSetup {
            vsize: self.geometry.height,
            hsize: self.geometry.line_bytes(),
            stride: self.stride,
            circular: self.mode == Mode::Circular,
            frame_stores: self.addresses.len() as u8,
        }
    }
}

/// The contract the adapter needs from a streaming engine. Each call maps to
/// one programming step of the engine's read channel.
pub trait VideoEngine {
    fn configure_read(&mut self, setup: &ReadSetup) -> Result<(), EngineFault>;
    fn set_frame_stores(&mut self, addresses: &[u32]) -> Result<(), EngineFault>;
    fn start_read(&mut self) -> Result<(), EngineFault>;
    fn park_read(&mut self, frame_index: u8) -> Result<(), EngineFault>;
}

impl<E: VideoEngine + ?Sized> VideoEngine for &mut E {
    fn configure_read(&mut self, setup: &ReadSetup) -> Result<(), EngineFault> {
        (**self).configure_read(setup)
    }

    fn set_frame_stores(&mut self, addresses: &[u32]) -> Result<(), EngineFault> {
        (**self).set_frame_stores(addresses)
    }

    fn start_read(&mut self) -> Result<(), EngineFault> {
        (**self).start_read()
    }

    fn park_read(&mut self, frame_index: u8) -> Result<(), EngineFault> {
        (**self).park_read(frame_index)
    }
}

pub struct StreamingAdapter<E: VideoEngine> {
    engine: E,
    applied: Option<StreamingConfig>,
}

impl<E: VideoEngine> StreamingAdapter<E> {
    pub fn new(engine: E) -> Self {
        Self { engine, applied: None }
    }

    #[inline(always)]
    pub fn engine(&self) -> &E {
        &self.engine
    }

    #[inline(always)]
    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }

    pub fn release(self) -> E {
        self.engine
    }

    /// Validate and program the read channel. Nothing reaches the engine if
    /// validation fails.
    pub fn configure(
        &mut self,
        geometry: Geometry,
        stride: u32,
        mode: Mode,
        addresses: &[u32],
    ) -> Result<StreamingConfig, ConfigError> {
        let config = StreamingConfig::validate(geometry, stride, mode, addresses)?;
        self.applied = None;

        self.engine.configure_read(&config.read_setup()).map_err(ConfigError::ConfigurationRejected)?;
        self.engine.set_frame_stores(&config.addresses).map_err(ConfigError::ConfigurationRejected)?;

        info!(target: "video", "configured {}x{} stride {} {:?}, {} frame store(s)",
            geometry.width, geometry.height, stride, mode, config.frame_count());
        self.applied = Some(config.clone());
        Ok(config)
    }

    /// Start the engine, then pin it to the parked frame.
    pub fn start(&mut self, config: &StreamingConfig) -> Result<(), StartError> {
        if self.applied.as_ref() != Some(config) {
            return Err(StartError::NotConfigured);
        }
        self.engine.start_read().map_err(StartError::StartRejected)?;
        if let Mode::Parking { frame_index } = config.mode {
            self.engine.park_read(frame_index).map_err(StartError::ParkRejected)?;
            info!(target: "video", "running, parked on frame {}", frame_index);
        } else {
            info!(target: "video", "running, circular over {} frames", config.frame_count());
        }
        Ok(())
    }
}
