use std::sync::Arc;
use std::thread;
use std::time::Duration;

use clap::Parser;
use playout::clock::MonotonicClock;
use playout::{AccessUnit, PipelineConfig, TickResult, TrackKind, TrackPipeline};
use rand::RngExt;

#[derive(Parser)]
#[command(
    name = "playout-sim",
    about = "Feeds a synthetic stream through the playout timing core"
)]
struct Args {
    /// Frame rate of the synthetic stream
    #[arg(long, default_value_t = 30)]
    fps: u32,

    /// Number of frames to generate
    #[arg(long, default_value_t = 120)]
    frames: u32,

    /// Maximum random timestamp jitter in microseconds
    #[arg(long, default_value_t = 0)]
    jitter_us: i64,

    /// Probability of swapping adjacent frames into decode order
    #[arg(long, default_value_t = 0.0)]
    reorder: f64,

    /// Duration inference window length
    #[arg(long, default_value_t = 10)]
    window: usize,

    /// Hand samples over as soon as they are ready, without pacing
    #[arg(long)]
    demux_only: bool,

    /// Immediate-release pacing instead of scheduled release times
    #[arg(long)]
    immediate: bool,
}

fn main() {
    tracing_subscriber::fmt::init();

    let args = Args::parse();

    let mut config = PipelineConfig::new(TrackKind::Video);
    config.inference.window_len = args.window;
    config.pacing.use_scheduled_release = !args.immediate;
    config.demux_only = args.demux_only;

    let pipeline = match TrackPipeline::new(config) {
        Ok(pipeline) => Arc::new(pipeline),
        Err(e) => {
            eprintln!("Failed to build pipeline: {}", e);
            return;
        }
    };
    let signal = pipeline.ready_signal();

    let interval_us = 1_000_000 / i64::from(args.fps.max(1));
    println!(
        "Simulating {} frames at {} fps (jitter {}us, reorder {})",
        args.frames, args.fps, args.jitter_us, args.reorder
    );

    let producer = {
        let pipeline = Arc::clone(&pipeline);
        let (frames, jitter_us, reorder) = (args.frames, args.jitter_us, args.reorder);
        thread::spawn(move || produce(&pipeline, frames, interval_us, jitter_us, reorder))
    };

    // Render loop. Playback position stays at zero until the first frame
    // goes out, then advances in real time anchored to that frame.
    let clock = MonotonicClock::new();
    let mut origin_us: Option<i64> = None;
    loop {
        let position_us = origin_us.map_or(0, |origin| clock.now_us() - origin);
        match pipeline.tick(&clock.state(position_us)) {
            TickResult::Render(sample) => {
                if origin_us.is_none() {
                    origin_us = Some(clock.now_us() - sample.pts_us());
                }
            }
            TickResult::RenderAt {
                release_time_ns,
                sample,
            } => {
                if origin_us.is_none() {
                    origin_us = Some(clock.now_us() - sample.pts_us());
                }
                // Stand in for a display sink that honors the deadline.
                let wait_ns = release_time_ns - clock.now_ns();
                if wait_ns > 0 {
                    thread::sleep(Duration::from_nanos(wait_ns as u64));
                }
            }
            TickResult::Dropped(sample) => {
                eprintln!("Dropped late frame at {}us", sample.pts_us());
            }
            TickResult::NotReady => thread::sleep(Duration::from_millis(2)),
            TickResult::Empty => {
                signal.wait_timeout(Duration::from_millis(50));
            }
            TickResult::Ended => break,
        }
    }

    producer.join().expect("producer thread");
    println!("Done: {}", pipeline.stats());
}

/// Generate the synthetic stream and feed it at twice realtime.
fn produce(pipeline: &TrackPipeline, frames: u32, interval_us: i64, jitter_us: i64, reorder: f64) {
    let mut rng = rand::rng();

    let mut timestamps: Vec<i64> = (0..i64::from(frames)).map(|i| i * interval_us).collect();
    if jitter_us > 0 {
        for pts in &mut timestamps {
            *pts = (*pts + rng.random_range(-jitter_us..=jitter_us)).max(0);
        }
    }
    if reorder > 0.0 {
        let mut i = 1;
        while i < timestamps.len() {
            if rng.random_range(0.0..1.0) < reorder {
                timestamps.swap(i - 1, i);
                i += 2;
            } else {
                i += 1;
            }
        }
    }

    let pace = Duration::from_micros((interval_us / 2).max(1) as u64);
    for (i, &pts) in timestamps.iter().enumerate() {
        let mut unit = AccessUnit::new(pts, vec![0u8; 1024]);
        if i % 30 == 0 {
            unit = unit.with_key_frame();
        }
        if let Err(e) = pipeline.ingest(unit) {
            eprintln!("Skipping frame at {}us: {}", pts, e);
        }
        thread::sleep(pace);
    }
    if let Err(e) = pipeline.ingest(AccessUnit::end_of_stream()) {
        eprintln!("Failed to end stream: {}", e);
    }
}
