mod image_io;

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use pdma_core::cache::{DmaBuffer, DmaRegion};
use pdma_core::compose::{Compositor, SourceImage, TextSource};
use pdma_core::framebuffer::FrameBuffer;
use pdma_core::layout::Layout;
use pdma_core::regs::{LengthControl, RegisterSnapshot};
use pdma_core::session::{Report, Session};
use pdma_core::sim::{SimBoard, SimParams};
use pdma_core::{Direction, ShimConfig, ShimDriver, TransferDescriptor};
use tracing::{info, warn, Level};
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Parser)]
#[command(name = "pdmactl")]
#[command(version, about = "Pseudo-DMA shim and HDMI frame tool", long_about = None)]
struct Cli {
    /// More log output (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the whole bring-up sequence against the simulated board
    Selftest {
        /// Image to place in the frame (PNG, or .raw/.bin words); a test pattern otherwise
        #[arg(long)]
        image: Option<PathBuf>,

        /// Text the classifier "wrote" into the text region
        #[arg(long, default_value = "Dog: 99%")]
        label: String,

        /// Completion budget per transfer
        #[arg(long, default_value_t = ShimConfig::DEFAULT_TIMEOUT_MS)]
        timeout_ms: u32,

        /// Start pulse width
        #[arg(long, default_value_t = ShimConfig::PULSE_DWELL_MS)]
        dwell_ms: u32,

        /// Delay between two reads of the done flag
        #[arg(long, default_value_t = ShimConfig::POLL_INTERVAL_MS)]
        poll_ms: u32,

        /// Simulated shim latency from start edge to done
        #[arg(long, default_value_t = 3)]
        latency_ms: u32,

        /// Stall the simulated stream sink for this long
        #[arg(long, default_value_t = 0)]
        stall_ms: u64,

        /// Extra attempts for a timed-out transfer
        #[arg(long, default_value_t = 0)]
        retries: u32,

        /// Loopback payload size in bytes
        #[arg(long, default_value_t = pdma_core::layout::TEST_PKT_LEN_BYTES)]
        packet_len: u32,

        /// Save what the display engine scans out
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Render a frame (image plus label) to a PNG
    Compose {
        /// Image to place in the frame; a test pattern otherwise
        #[arg(long)]
        image: Option<PathBuf>,

        #[arg(long, default_value = "Dog: 99%")]
        label: String,

        #[arg(short, long, default_value = "frame.png")]
        output: PathBuf,
    },

    /// Show the register words for a transfer
    Encode {
        #[arg(value_parser = parse_u32)]
        address: u32,

        #[arg(value_parser = parse_u32)]
        length: u32,

        #[arg(value_enum)]
        direction: Dir,
    },

    /// Explain raw register values from a status dump
    Decode {
        #[arg(value_parser = parse_u32)]
        address: u32,

        #[arg(value_parser = parse_u32)]
        len_ctrl: u32,

        #[arg(value_parser = parse_u32, default_value = "0")]
        status: u32,
    },
}

#[derive(Copy, Clone, ValueEnum)]
enum Dir {
    Mm2s,
    S2mm,
}

impl From<Dir> for Direction {
    fn from(d: Dir) -> Self {
        match d {
            Dir::Mm2s => Direction::ToStream,
            Dir::S2mm => Direction::FromStream,
        }
    }
}

/// Decimal or `0x` hex.
fn parse_u32(s: &str) -> Result<u32, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(&hex.replace('_', ""), 16),
        None => s.replace('_', "").parse(),
    };
    parsed.map_err(|e| format!("{s}: {e}"))
}

fn setup_logging(verbose: u8) {
    let level = match verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .compact()
        .finish()
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    match cli.command {
        Commands::Selftest { image, label, timeout_ms, dwell_ms, poll_ms, latency_ms, stall_ms, retries, packet_len, output } => {
            let config = ShimConfig::new(dwell_ms, poll_ms, timeout_ms)?;
            let params = SimParams { latency_ms, ..SimParams::default() };
            let layout = Layout { packet_len, ..Layout::default() };
            selftest(image, &label, config, params, layout, stall_ms, retries, output)
        }
        Commands::Compose { image, label, output } => compose(image, &label, &output),
        Commands::Encode { address, length, direction } => {
            let desc = TransferDescriptor::new(address, length, direction.into())?;
            let mut pulsed = desc.control_word();
            pulsed.set_start(true);
            println!("{} 0x{:08X}+{}", desc.direction().short_name(), desc.address(), desc.length());
            println!("  ch1 address   0x{:08X}", desc.address());
            println!("  ch2 idle      0x{:08X}", desc.control_word().0);
            println!("  ch2 start     0x{:08X}", pulsed.0);
            Ok(())
        }
        Commands::Decode { address, len_ctrl, status } => {
            let snapshot = RegisterSnapshot { address, len_ctrl, status };
            let desc = TransferDescriptor::decode(address, LengthControl(len_ctrl));
            println!("{snapshot}");
            println!("  {} 0x{:08X}+{}", desc.direction().short_name(), desc.address(), desc.length());
            println!("  start {}", if snapshot.start_asserted() { "ASSERTED" } else { "clear" });
            println!("  done  {}", snapshot.done());
            if snapshot.start_asserted() {
                warn!("start bit left asserted; the shim may re-trigger");
            }
            Ok(())
        }
    }
}

fn source_image(path: Option<PathBuf>, layout: &Layout) -> Result<SourceImage> {
    match path {
        Some(path) => image_io::load_image(&path),
        None => Ok(SourceImage::from_fn(layout.target_width, layout.target_height, |x, y| {
            0xFF00_0000 | ((x * 255 / layout.target_width) << 16) | ((y * 255 / layout.target_height) << 8) | 0x40
        })?),
    }
}

#[allow(clippy::too_many_arguments)]
fn selftest(
    image: Option<PathBuf>,
    label: &str,
    config: ShimConfig,
    params: SimParams,
    layout: Layout,
    stall_ms: u64,
    retries: u32,
    output: Option<PathBuf>,
) -> Result<()> {
    let image = source_image(image, &layout)?;
    let board = SimBoard::new(params);
    board.shim().borrow_mut().stall_until(stall_ms);

    let mut text_bytes = label.as_bytes().to_vec();
    text_bytes.push(0);
    if !board.ddr().borrow_mut().write(layout.text_base, &text_bytes) {
        bail!("text region 0x{:08X} is outside the simulated DDR", layout.text_base);
    }

    let shim = ShimDriver::new(board.gpio_out(), board.gpio_in(), board.clock(), config);
    let mut session = Session::new(shim, board.cache(), board.vdma(), layout).with_retries(retries);

    let mut frame = FrameBuffer::alloc(layout.h_res, layout.v_res, layout.frame_base);
    let mut text = TextSource::zeroed(layout.text_base, layout.text_len as usize);
    let mut rx = DmaBuffer::zeroed(layout.rx_base, layout.packet_len as usize);

    info!("running self test on the simulated board");
    let report = session.run(&mut frame, &image, &mut text, &mut rx);
    print_report(&report);

    let tx = frame.slice(layout.image_offset(), layout.packet_len);
    println!("tx crc32 0x{:08X}", crc32fast::hash(tx.map(|s| s.bytes()).unwrap_or(&[])));
    println!("rx crc32 0x{:08X}", crc32fast::hash(rx.bytes()));

    if let Some(path) = output {
        match session.video().engine().scanout() {
            Some(pixels) => {
                image_io::save_frame(&path, &pixels, layout.h_res, layout.v_res)?;
                println!("scanout written to {}", path.display());
            }
            None => warn!("display engine is not scanning out, nothing written"),
        }
    }

    if let Some(failure) = report.failure {
        bail!(failure);
    }
    Ok(())
}

fn print_report(report: &Report) {
    println!("{:<16} {:>6} {:>9}", "stage", "result", "time");
    for stage in &report.stages {
        let result = if stage.passed { "ok" } else { "FAIL" };
        println!("{:<16} {:>6} {:>6} ms", stage.stage, result, stage.elapsed_ms);
    }
    println!("label    {:?}", report.label.as_str());
    println!("shim     {}", report.snapshot);
    if report.verification.count > 0 {
        println!("{} mismatched byte(s), first {}:", report.verification.count, report.verification.first.len());
        for m in &report.verification.first {
            println!("  [{:3}] expected 0x{:02X} got 0x{:02X}", m.offset, m.expected, m.actual);
        }
    }
}

fn compose(image: Option<PathBuf>, label: &str, output: &PathBuf) -> Result<()> {
    let layout = Layout::default();
    let image = source_image(image, &layout)?;
    let compositor = Compositor::new(layout);

    let mut frame = FrameBuffer::alloc(layout.h_res, layout.v_res, layout.frame_base);
    let mut canvas = frame.canvas()?;
    compositor.compose(&mut canvas, &image)?;
    let cells = compositor.update_label(&mut canvas, label);
    info!("label cells {:?}", cells);

    image_io::save_frame(output, frame.pixels(), layout.h_res, layout.v_res)
        .with_context(|| format!("saving frame for {:?}", label))?;
    println!("{}x{} frame written to {}", layout.h_res, layout.v_res, output.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers() {
        assert_eq!(parse_u32("0x0040_0000"), Ok(0x0040_0000));
        assert_eq!(parse_u32("32"), Ok(32));
        assert!(parse_u32("0xZZ").is_err());
    }

    #[test]
    fn selftest_passes_on_defaults() {
        let layout = Layout::default();
        selftest(None, "Dog: 99%", ShimConfig::default(), SimParams::default(), layout, 0, 0, None).unwrap();
    }

    #[test]
    fn selftest_fails_on_stall() {
        let config = ShimConfig::default().with_timeout_ms(10);
        let err = selftest(None, "x", config, SimParams::default(), Layout::default(), u64::MAX, 1, None);
        assert!(err.is_err());
    }

    #[test]
    fn zero_dwell_flag_is_refused() {
        let cli = Cli::try_parse_from(["pdmactl", "selftest", "--dwell-ms", "0"]).unwrap();
        let Commands::Selftest { dwell_ms, poll_ms, timeout_ms, .. } = cli.command else {
            panic!("expected selftest");
        };
        assert!(ShimConfig::new(dwell_ms, poll_ms, timeout_ms).is_err());
    }

    #[test]
    fn compose_writes_png() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("frame.png");
        compose(None, "Dog: 99%", &out).unwrap();
        let img = image::open(&out).unwrap();
        assert_eq!((img.width(), img.height()), (1280, 720));
    }
}
