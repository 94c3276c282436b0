//! Driver core for a GPIO-mediated pseudo-DMA shim and the HDMI frame it feeds.
//!
//! The shim stands in for a real DMA engine: two AXI GPIO banks carry a
//! transfer descriptor out to programmable logic and a completion flag back.
//! Alongside it a video DMA engine continuously scans a frame buffer out to
//! the display, and the CPU composites an image and a text label into that
//! frame before handing it over.
//!
//! Everything that touches hardware goes through a trait ([`gpio::GpioBank`],
//! [`clock::TimeDaemon`], [`cache::CacheMaintenance`],
//! [`video::VideoEngine`]) so the same code drives MMIO on the board and the
//! [`sim`] models on a host.
#![no_std]
#![allow(clippy::single_match)]
extern crate alloc;

pub mod cache;
pub mod clock;
pub mod compose;
pub mod error;
pub mod framebuffer;
pub mod gpio;
pub mod layout;
pub mod regs;
pub mod session;
pub mod shim;
pub mod sim;
pub mod video;

pub use error::{Error, Stage, StageError};
pub use regs::{Direction, TransferDescriptor};
pub use shim::{Completion, ShimConfig, ShimConfigError, ShimDriver};
