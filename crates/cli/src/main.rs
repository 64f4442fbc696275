use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use camrtp::session::now_micros;
use camrtp::{FrameOutcome, OutputSession, PixelFormat, RtpUrl, SendPolicy, StreamDescriptor};
use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt};

#[derive(Parser)]
#[command(
    name = "camrtp-send",
    about = "Stream a synthetic NV21 camera feed as H.264 over RTP"
)]
struct Args {
    /// Destination, e.g. rtp://192.168.1.20:5004?pkt_size=1200
    url: String,

    #[arg(long, default_value_t = 640)]
    width: u32,

    #[arg(long, default_value_t = 480)]
    height: u32,

    #[arg(long, default_value_t = 24)]
    fps: u32,

    /// Target bit rate in bits per second
    #[arg(long, default_value_t = 800_000)]
    bitrate: u32,

    /// Number of frames to send; 0 streams until killed
    #[arg(long, short = 'n', default_value_t = 0)]
    frames: u64,

    /// Also write the SDP to this file
    #[arg(long)]
    sdp: Option<PathBuf>,

    /// Fail a frame when any of its packets is not fully sent
    #[arg(long)]
    strict: bool,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let filter = if args.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    fmt().with_env_filter(filter).with_target(false).init();

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("camrtp-send: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> camrtp::Result<()> {
    let url = RtpUrl::parse(&args.url)?;
    let descriptor = StreamDescriptor::builder()
        .dimensions(args.width, args.height)
        .frame_rate(args.fps)
        .bit_rate(args.bitrate)
        .build()?;

    let policy = if args.strict {
        SendPolicy::Strict
    } else {
        SendPolicy::BestEffort
    };

    let mut session = OutputSession::builder(Arc::new(descriptor), url)
        .start_time_us(now_micros())
        .send_policy(policy)
        .open()?;

    let sdp = session.sdp();
    println!("{sdp}");
    if let Some(path) = &args.sdp {
        fs::write(path, &sdp)?;
        tracing::info!(path = %path.display(), "sdp written");
    }

    let period = Duration::from_secs(1) / args.fps.max(1);
    let mut frame = vec![0u8; PixelFormat::Nv21.frame_size(args.width, args.height)];
    let mut next = Instant::now();
    let mut index = 0u64;

    while args.frames == 0 || index < args.frames {
        fill_test_pattern(&mut frame, args.width, args.height, index);

        let submitted =
            session.submit_frame(&frame, now_micros(), PixelFormat::Nv21, args.width, args.height);
        match submitted {
            Ok(FrameOutcome::Sent(report)) if !report.is_complete() => {
                tracing::warn!(
                    frame = index,
                    short_writes = report.short_writes,
                    failed_writes = report.failed_writes,
                    "frame partially sent"
                );
            }
            Ok(_) => {}
            Err(e @ (camrtp::Error::SessionFailed | camrtp::Error::Encode(_))) => return Err(e),
            Err(e) => tracing::warn!(frame = index, error = %e, "frame dropped"),
        }

        index += 1;
        next += period;
        if let Some(wait) = next.checked_duration_since(Instant::now()) {
            thread::sleep(wait);
        }
    }

    let stats = session.stats().clone();
    session.close();
    tracing::info!(
        frames = stats.frames,
        packets = stats.packets,
        bytes_sent = stats.bytes_sent,
        delivery_ratio = stats.delivery_ratio(),
        "done"
    );
    Ok(())
}

/// Diagonal luma bars drifting one pixel per frame over a slowly cycling
/// chroma tint.
fn fill_test_pattern(frame: &mut [u8], width: u32, height: u32, index: u64) {
    let (w, h) = (width as usize, height as usize);
    let (luma, chroma) = frame.split_at_mut(w * h);
    let shift = index as usize;

    for (y, row) in luma.chunks_exact_mut(w).enumerate() {
        for (x, px) in row.iter_mut().enumerate() {
            *px = (((x + y + shift) / 16) % 2 * 160 + 48) as u8;
        }
    }

    let phase = (index % 256) as u8;
    for vu in chroma.chunks_exact_mut(2) {
        vu[0] = phase;
        vu[1] = 255 - phase;
    }
}
