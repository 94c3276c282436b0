#![no_std]
#![no_main]

extern crate alloc;

mod bsp;

use core::fmt::Write;
use core::panic::PanicInfo;
use core::slice;

use linked_list_allocator::LockedHeap;
use log::{error, info, LevelFilter};
use pdma_core::cache::{DataCache, DmaBuffer};
use pdma_core::compose::{SourceImage, TextSource};
use pdma_core::framebuffer::FrameBuffer;
use pdma_core::gpio::AxiGpio;
use pdma_core::layout::Layout;
use pdma_core::session::{Report, Session};
use pdma_core::video::AxiVdma;
use pdma_core::{ShimConfig, ShimDriver};

use crate::bsp::{BspClock, Uart};

// address map of the hardware design
const GPIO_OUT_BASE: usize = 0x4120_0000;
const GPIO_IN_BASE: usize = 0x4121_0000;
const VDMA_BASE: usize = 0x4300_0000;

const EXIT_FAILURE: i32 = 1;

/// How often the text region is re-read once the display is up.
const LABEL_POLL_MS: u32 = 500;

#[global_allocator]
static ALLOCATOR: LockedHeap = LockedHeap::empty();

// source image plus labels and report bookkeeping
const HEAP_SIZE: usize = 512 * 1024;
static mut HEAP: [u8; HEAP_SIZE] = [0; HEAP_SIZE];

/// Stand-in for the camera frame: a gradient the size of the target box.
fn test_pattern(layout: &Layout) -> Option<SourceImage> {
    let (w, h) = (layout.target_width, layout.target_height);
    SourceImage::from_fn(w, h, |x, y| 0xFF00_0000 | ((x * 255 / w) << 16) | ((y * 255 / h) << 8) | 0x80).ok()
}

fn log_report(report: &Report) {
    for stage in &report.stages {
        info!(target: "app", "{:<16} {:<4} {} ms", stage.stage, if stage.passed { "ok" } else { "FAIL" }, stage.elapsed_ms);
    }
    info!(target: "app", "label {:?}, shim {}", report.label.as_str(), report.snapshot);
    for m in &report.verification.first {
        error!(target: "app", "rx[{}] expected 0x{:02X} got 0x{:02X}", m.offset, m.expected, m.actual);
    }
}

#[no_mangle]
pub extern "C" fn main() -> i32 {
    unsafe {
        let heap = &raw mut HEAP;
        ALLOCATOR.lock().init(heap.cast::<u8>(), HEAP_SIZE);
    }
    bsp::init_logging(LevelFilter::Info);
    info!(target: "app", "pseudo-DMA bring-up");

    let layout = Layout::default();

    // SAFETY: the addresses come from the hardware design and nothing else
    // in this image touches these peripherals or DDR regions.
    let (shim, engine, mut frame, mut text, mut rx) = unsafe {
        let shim = ShimDriver::new(
            AxiGpio::output(GPIO_OUT_BASE),
            AxiGpio::input(GPIO_IN_BASE),
            BspClock,
            ShimConfig::default(),
        );
        let pixels = slice::from_raw_parts_mut(layout.frame_base as usize as *mut u32, (layout.frame_size() / 4) as usize);
        let frame = match FrameBuffer::new(pixels, layout.h_res, layout.v_res, layout.h_res, layout.frame_base) {
            Ok(frame) => frame,
            Err(e) => {
                error!(target: "app", "frame buffer: {}", e);
                return EXIT_FAILURE;
            }
        };
        let text_bytes = slice::from_raw_parts_mut(layout.text_base as usize as *mut u8, layout.text_len as usize);
        let rx_bytes = slice::from_raw_parts_mut(layout.rx_base as usize as *mut u8, layout.packet_len as usize);
        (
            shim,
            AxiVdma::new(VDMA_BASE),
            frame,
            TextSource::new(DmaBuffer::new(layout.text_base, text_bytes)),
            DmaBuffer::new(layout.rx_base, rx_bytes),
        )
    };

    let Some(image) = test_pattern(&layout) else {
        error!(target: "app", "empty test pattern");
        return EXIT_FAILURE;
    };

    let mut session = Session::new(shim, DataCache, engine, layout);
    let report = session.run(&mut frame, &image, &mut text, &mut rx);
    log_report(&report);
    if let Some(failure) = report.failure {
        error!(target: "app", "{}", failure);
        return EXIT_FAILURE;
    }
    info!(target: "app", "all stages passed, watching the text region");

    // the display engine runs on its own; follow the classifier output
    let mut shown = report.label;
    loop {
        session.shim_mut().clock_mut().sleep_ms(LABEL_POLL_MS);
        let label = session.read_label(&mut text);
        if label == shown {
            continue;
        }
        if let Err(e) = session.draw_label(&mut frame, &label) {
            error!(target: "app", "{}", e);
            return EXIT_FAILURE;
        }
        info!(target: "app", "label {:?}", label.as_str());
        shown = label;
    }
}

#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    let _ = writeln!(Uart, "!!! PANIC !!! {}", info);
    loop {
        core::hint::spin_loop();
    }
}
