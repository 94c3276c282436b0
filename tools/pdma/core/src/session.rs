//! # Bring-up sequence
//!
//! Runs the stages in order and stops at the first failure:
//!
//! | Stage             | What happens                                            |
//! |-------------------|---------------------------------------------------------|
//! | `compose`         | clear the frame, resize the image into place            |
//! | `label`           | acquire the text region, draw the label                 |
//! | `publish`         | clean the frame, display owns it from here              |
//! | `configure-video` | program geometry, stride and the frame store            |
//! | `start-video`     | run the engine, park it on the frame                    |
//! | `mm2s`            | send the first image bytes out of the frame             |
//! | `s2mm`            | receive them into the cleared RX buffer                 |
//! | `verify`          | compare TX and RX byte for byte                         |
//!
//! Retrying a timed-out transfer is decided here, never inside the driver.

use heapless::{String, Vec};
use log::{error, info, warn};

use crate::cache::{self, CacheMaintenance, DmaBuffer, DmaRegion};
use crate::clock::TimeDaemon;
use crate::compose::{Compositor, SourceImage, TextSource, LABEL_CAPACITY};
use crate::error::{Error, Stage, StageError, WithStage};
use crate::framebuffer::{FrameBuffer, Owner, Rect};
use crate::gpio::GpioBank;
use crate::layout::{Layout, NUMBER_OF_FRAME_SETS};
use crate::regs::{Direction, RegisterSnapshot, TransferDescriptor};
use crate::shim::ShimDriver;
use crate::video::{Geometry, Mode, StreamingAdapter, StreamingConfig, VideoEngine};

/// Mismatches kept for the report; the count covers all of them.
pub const MAX_REPORTED_MISMATCHES: usize = 10;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Mismatch {
    pub offset: usize,
    pub expected: u8,
    pub actual: u8,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Verification {
    pub count: usize,
    pub first: Vec<Mismatch, MAX_REPORTED_MISMATCHES>,
}

impl Verification {
    pub fn passed(&self) -> bool {
        self.count == 0
    }
}

/// Byte-for-byte comparison. A length difference counts every missing or
/// extra byte as a mismatch against zero.
pub fn verify(expected: &[u8], actual: &[u8]) -> Verification {
    let mut result = Verification::default();
    for offset in 0..expected.len().max(actual.len()) {
        let e = expected.get(offset).copied().unwrap_or(0);
        let a = actual.get(offset).copied().unwrap_or(0);
        let missing = offset >= expected.len() || offset >= actual.len();
        if e != a || missing {
            result.count += 1;
            let _ = result.first.push(Mismatch { offset, expected: e, actual: a });
        }
    }
    result
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct StageReport {
    pub stage: Stage,
    pub passed: bool,
    pub elapsed_ms: u64,
}

#[derive(Clone, Debug, Default)]
pub struct Report {
    pub stages: Vec<StageReport, 8>,
    pub failure: Option<StageError>,
    pub label: String<LABEL_CAPACITY>,
    pub verification: Verification,
    /// Shim registers after the last stage that touched them.
    pub snapshot: RegisterSnapshot,
}

impl Report {
    pub fn passed(&self) -> bool {
        self.failure.is_none()
    }
}

/// Owns every driver a run needs. Buffers are passed in per call so the
/// board can hand over its fixed regions and a host can use heap memory.
pub struct Session<O: GpioBank, I: GpioBank, T: TimeDaemon, C: CacheMaintenance, E: VideoEngine> {
    shim: ShimDriver<O, I, T>,
    cache: C,
    video: StreamingAdapter<E>,
    compositor: Compositor,
    layout: Layout,
    retries: u32,
}

impl<O, I, T, C, E> Session<O, I, T, C, E>
where
    O: GpioBank,
    I: GpioBank,
    T: TimeDaemon,
    C: CacheMaintenance,
    E: VideoEngine,
{
    pub fn new(shim: ShimDriver<O, I, T>, cache: C, engine: E, layout: Layout) -> Self {
        Self {
            shim,
            cache,
            video: StreamingAdapter::new(engine),
            compositor: Compositor::new(layout),
            layout,
            retries: 0,
        }
    }

    /// Extra attempts for a timed-out transfer.
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    #[inline(always)]
    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    #[inline(always)]
    pub fn shim(&self) -> &ShimDriver<O, I, T> {
        &self.shim
    }

    #[inline(always)]
    pub fn shim_mut(&mut self) -> &mut ShimDriver<O, I, T> {
        &mut self.shim
    }

    #[inline(always)]
    pub fn cache(&self) -> &C {
        &self.cache
    }

    #[inline(always)]
    pub fn video(&self) -> &StreamingAdapter<E> {
        &self.video
    }

    /// Clear the frame and place the image. The frame must be CPU-owned.
    pub fn compose<F>(&mut self, frame: &mut FrameBuffer<F>, image: &SourceImage) -> Result<Rect, StageError>
    where
        F: AsRef<[u32]> + AsMut<[u32]>,
    {
        let mut canvas = frame.canvas().stage(Stage::Compose)?;
        self.compositor.compose(&mut canvas, image).stage(Stage::Compose)
    }

    /// Invalidate and decode the text region.
    pub fn read_label<B>(&mut self, text: &mut TextSource<B>) -> String<LABEL_CAPACITY>
    where
        B: AsRef<[u8]> + AsMut<[u8]>,
    {
        text.read(&mut self.cache)
    }

    /// Redraw the label area with `label`. A frame already handed to the
    /// display is reacquired and handed back afterwards.
    pub fn draw_label<F>(&mut self, frame: &mut FrameBuffer<F>, label: &str) -> Result<Rect, StageError>
    where
        F: AsRef<[u32]> + AsMut<[u32]>,
    {
        let cells = match frame.owner() {
            Owner::Cpu => {
                let mut canvas = frame.canvas().stage(Stage::Label)?;
                self.compositor.update_label(&mut canvas, label)
            }
            Owner::Device => {
                let mut guard = frame.reacquire(&mut self.cache);
                self.compositor.update_label(&mut guard.canvas(), label)
            }
        };
        Ok(cells)
    }

    /// [`Session::read_label`], then [`Session::draw_label`].
    pub fn update_label<F, B>(
        &mut self,
        frame: &mut FrameBuffer<F>,
        text: &mut TextSource<B>,
    ) -> Result<String<LABEL_CAPACITY>, StageError>
    where
        F: AsRef<[u32]> + AsMut<[u32]>,
        B: AsRef<[u8]> + AsMut<[u8]>,
    {
        let label = self.read_label(text);
        self.draw_label(frame, &label)?;
        Ok(label)
    }

    pub fn publish<F>(&mut self, frame: &mut FrameBuffer<F>)
    where
        F: AsRef<[u32]> + AsMut<[u32]>,
    {
        frame.publish(&mut self.cache);
    }

    /// Program the engine for one parked frame store at the frame. The
    /// frame is published first if the CPU still owns it.
    pub fn configure_display<F>(&mut self, frame: &mut FrameBuffer<F>) -> Result<StreamingConfig, StageError>
    where
        F: AsRef<[u32]> + AsMut<[u32]>,
    {
        if frame.owner() == Owner::Cpu {
            self.publish(frame);
        }
        self.video
            .configure(
                Geometry::from_layout(&self.layout),
                self.layout.stride_bytes(),
                Mode::Parking { frame_index: 0 },
                &[frame.bus_addr(); NUMBER_OF_FRAME_SETS],
            )
            .stage(Stage::ConfigureVideo)
    }

    /// [`Session::configure_display`], then run and park.
    pub fn start_display<F>(&mut self, frame: &mut FrameBuffer<F>) -> Result<StreamingConfig, StageError>
    where
        F: AsRef<[u32]> + AsMut<[u32]>,
    {
        let config = self.configure_display(frame)?;
        self.video.start(&config).stage(Stage::StartVideo)?;
        Ok(config)
    }

    /// Send `packet_len` bytes from the top-left of the image in the frame.
    pub fn run_mm2s<F>(&mut self, frame: &FrameBuffer<F>) -> Result<TransferDescriptor, StageError>
    where
        F: AsRef<[u32]> + AsMut<[u32]>,
    {
        let (offset, length) = (self.layout.image_offset(), self.layout.packet_len);
        let tx = frame
            .slice(offset, length)
            .ok_or(Error::OutsideBuffer { address: frame.bus_addr().wrapping_add(offset), length })
            .stage(Stage::Mm2s)?;
        tx.publish(&mut self.cache);

        let desc = TransferDescriptor::new(tx.bus_addr(), length, Direction::ToStream).stage(Stage::Mm2s)?;
        self.transfer(&desc, Stage::Mm2s)?;
        Ok(desc)
    }

    /// Receive `packet_len` bytes into `rx`, which is cleared first.
    pub fn run_s2mm<B>(&mut self, rx: &mut DmaBuffer<B>) -> Result<TransferDescriptor, StageError>
    where
        B: AsRef<[u8]> + AsMut<[u8]>,
    {
        let length = self.layout.packet_len;
        if rx.byte_len() < length {
            return Err(Error::OutsideBuffer { address: rx.bus_addr(), length }).stage(Stage::S2mm);
        }
        // stale dirty lines must not be written back over the payload
        rx.fill(0);
        cache::publish(&mut self.cache, &*rx);

        let desc = TransferDescriptor::new(rx.bus_addr(), length, Direction::FromStream).stage(Stage::S2mm)?;
        self.transfer(&desc, Stage::S2mm)?;
        cache::acquire(&mut self.cache, rx);
        Ok(desc)
    }

    fn transfer(&mut self, desc: &TransferDescriptor, stage: Stage) -> Result<(), StageError> {
        let mut attempt = 0;
        loop {
            match self.shim.transfer(desc) {
                Ok(()) => return Ok(()),
                Err(e) if attempt < self.retries => {
                    attempt += 1;
                    warn!(target: "session", "{}: {}, retry {}/{}", stage, e, attempt, self.retries);
                }
                Err(e) => return Err(e).stage(stage),
            }
        }
    }

    /// Every stage in order. Stops at the first failure; the report says
    /// which one and what the shim registers looked like.
    pub fn run<F, B, R>(
        &mut self,
        frame: &mut FrameBuffer<F>,
        image: &SourceImage,
        text: &mut TextSource<B>,
        rx: &mut DmaBuffer<R>,
    ) -> Report
    where
        F: AsRef<[u32]> + AsMut<[u32]>,
        B: AsRef<[u8]> + AsMut<[u8]>,
        R: AsRef<[u8]> + AsMut<[u8]>,
    {
        let mut report = Report::default();
        let result = self.run_stages(frame, image, text, rx, &mut report);
        report.snapshot = self.shim.debug_status();
        match result {
            Ok(()) => info!(target: "session", "all stages passed"),
            Err(e) => {
                error!(target: "session", "{} (shim: {})", e, report.snapshot);
                report.failure = Some(e);
            }
        }
        report
    }

    fn run_stages<F, B, R>(
        &mut self,
        frame: &mut FrameBuffer<F>,
        image: &SourceImage,
        text: &mut TextSource<B>,
        rx: &mut DmaBuffer<R>,
        report: &mut Report,
    ) -> Result<(), StageError>
    where
        F: AsRef<[u32]> + AsMut<[u32]>,
        B: AsRef<[u8]> + AsMut<[u8]>,
        R: AsRef<[u8]> + AsMut<[u8]>,
    {
        let t = self.begin(Stage::Compose);
        let result = self.compose(frame, image).map(drop);
        self.end(report, Stage::Compose, t, result)?;

        let t = self.begin(Stage::Label);
        let result = self.update_label(frame, text).map(|label| report.label = label);
        self.end(report, Stage::Label, t, result)?;

        let t = self.begin(Stage::Publish);
        self.publish(frame);
        self.end(report, Stage::Publish, t, Ok(()))?;

        let t = self.begin(Stage::ConfigureVideo);
        let result = self.configure_display(frame);
        let config = self.end(report, Stage::ConfigureVideo, t, result)?;

        let t = self.begin(Stage::StartVideo);
        let result = self.video.start(&config).stage(Stage::StartVideo);
        self.end(report, Stage::StartVideo, t, result)?;

        let t = self.begin(Stage::Mm2s);
        let result = self.run_mm2s(frame).map(drop);
        self.end(report, Stage::Mm2s, t, result)?;

        let t = self.begin(Stage::S2mm);
        let result = self.run_s2mm(rx).map(drop);
        self.end(report, Stage::S2mm, t, result)?;

        let t = self.begin(Stage::Verify);
        report.verification = self.compare_loopback(frame, rx);
        let result = match report.verification.count {
            0 => Ok(()),
            mismatches => Err(Error::VerifyFailed { mismatches }).stage(Stage::Verify),
        };
        self.end(report, Stage::Verify, t, result)
    }

    /// The TX bytes in the frame against what landed in `rx`.
    pub fn compare_loopback<F, R>(&self, frame: &FrameBuffer<F>, rx: &DmaBuffer<R>) -> Verification
    where
        F: AsRef<[u32]> + AsMut<[u32]>,
        R: AsRef<[u8]> + AsMut<[u8]>,
    {
        let len = self.layout.packet_len;
        let expected = frame.slice(self.layout.image_offset(), len).map(|tx| tx.bytes()).unwrap_or(&[]);
        let received = rx.bytes();
        let result = verify(expected, &received[..(len as usize).min(received.len())]);
        for m in &result.first {
            warn!(target: "session", "byte {}: expected 0x{:02X}, got 0x{:02X}", m.offset, m.expected, m.actual);
        }
        result
    }

    fn begin(&self, stage: Stage) -> u64 {
        info!(target: "session", "== {} ==", stage);
        self.shim.clock().get_now_ms()
    }

    fn end<V>(
        &self,
        report: &mut Report,
        stage: Stage,
        started: u64,
        result: Result<V, StageError>,
    ) -> Result<V, StageError> {
        let elapsed_ms = self.shim.clock().get_now_ms().saturating_sub(started);
        let _ = report.stages.push(StageReport { stage, passed: result.is_ok(), elapsed_ms });
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_reports_first_ten() {
        let expected = [0u8; 32];
        let mut actual = [0u8; 32];
        for b in actual.iter_mut().skip(4).take(15) {
            *b = 0xFF;
        }
        let result = verify(&expected, &actual);
        assert_eq!(result.count, 15);
        assert_eq!(result.first.len(), MAX_REPORTED_MISMATCHES);
        assert_eq!(result.first[0], Mismatch { offset: 4, expected: 0, actual: 0xFF });
    }

    #[test]
    fn short_payload_counts_missing_bytes() {
        let result = verify(&[1, 2, 3, 4], &[1, 2]);
        assert_eq!(result.count, 2);
        assert!(verify(&[5; 8], &[5; 8]).passed());
    }
}
