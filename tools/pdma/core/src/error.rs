use core::fmt;

use thiserror::Error;

use crate::compose::{BlitError, ImageError};
use crate::framebuffer::FrameError;
use crate::regs::DescriptorError;
use crate::shim::ShimError;
use crate::video::{ConfigError, StartError};

/// Steps of a bring-up run, in the order they execute.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Stage {
    Compose,
    Label,
    Publish,
    ConfigureVideo,
    StartVideo,
    Mm2s,
    S2mm,
    Verify,
}

impl Stage {
    pub fn name(self) -> &'static str {
        match self {
            Stage::Compose => "compose",
            Stage::Label => "label",
            Stage::Publish => "publish",
            Stage::ConfigureVideo => "configure-video",
            Stage::StartVideo => "start-video",
            Stage::Mm2s => "mm2s",
            Stage::S2mm => "s2mm",
            Stage::Verify => "verify",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Error)]
pub enum Error {
    #[error(transparent)]
    Descriptor(#[from] DescriptorError),
    #[error(transparent)]
    Shim(#[from] ShimError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Start(#[from] StartError),
    #[error(transparent)]
    Blit(#[from] BlitError),
    #[error(transparent)]
    Image(#[from] ImageError),
    #[error(transparent)]
    Frame(#[from] FrameError),
    #[error("0x{address:08X}+{length} is outside its buffer")]
    OutsideBuffer { address: u32, length: u32 },
    #[error("loopback payload differs in {mismatches} bytes")]
    VerifyFailed { mismatches: usize },
}

/// An [`Error`] tagged with the stage that produced it.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Error)]
#[error("{stage} failed: {source}")]
pub struct StageError {
    pub stage: Stage,
    pub source: Error,
}

pub trait WithStage<T> {
    fn stage(self, stage: Stage) -> Result<T, StageError>;
}

impl<T, E: Into<Error>> WithStage<T> for Result<T, E> {
    #[inline(always)]
    fn stage(self, stage: Stage) -> Result<T, StageError> {
        self.map_err(|e| StageError { stage, source: e.into() })
    }
}
