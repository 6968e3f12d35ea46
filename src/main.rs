// src/main.rs

mod config;
mod counting;
mod detector;
mod download;
mod events;
mod lanes;
mod overlay;
mod tracker;
mod types;
mod video;

use anyhow::Result;
use clap::Parser;
use counting::CountingLedger;
use detector::YoloDetector;
use events::CsvEventSink;
use lanes::LaneLayout;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracker::CentroidTracker;
use tracing::{debug, error, info};
use types::{BoundingBox, Config};

#[derive(Parser, Debug)]
#[command(name = "lane-counter", about = "Per-lane vehicle counting from traffic video")]
struct Args {
    /// Path to the YAML configuration file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Process a single video instead of scanning video.input_dir
    #[arg(long)]
    input_video: Option<PathBuf>,

    /// Download the source video with yt-dlp before processing
    #[arg(long)]
    download_youtube: bool,

    #[arg(long, default_value = "https://www.youtube.com/watch?v=MNn9qKG2UFI")]
    youtube_url: String,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let config = Config::load(&args.config)?;

    tracing_subscriber::fmt()
        .with_env_filter(format!("lane_counter={},ort=warn", config.logging.level))
        .init();

    info!("🚗 Lane Vehicle Counter Starting");
    info!("✓ Configuration loaded from {}", args.config.display());
    info!(
        "Tracking thresholds: max_disappeared={}, max_distance={:.1}",
        config.tracking.max_disappeared, config.tracking.max_distance
    );

    let video_files = if args.download_youtube {
        vec![download::download_youtube(&args.youtube_url, ".")?]
    } else if let Some(path) = args.input_video {
        vec![path]
    } else {
        video::find_video_files(&config.video.input_dir)?
    };

    if video_files.is_empty() {
        error!("No video files found in {}", config.video.input_dir);
        return Ok(());
    }

    let mut detector = YoloDetector::new(&config)?;
    info!("✓ Vehicle detector ready");

    for (idx, video_path) in video_files.iter().enumerate() {
        info!("========================================");
        info!(
            "Processing video {}/{}: {}",
            idx + 1,
            video_files.len(),
            video_path.display()
        );
        info!("========================================");

        match process_video(video_path, &mut detector, &config) {
            Ok(stats) => {
                info!("✓ Video processed successfully!");
                info!("  Total frames: {}", stats.total_frames);
                info!("  Detections: {}", stats.total_detections);
                info!("  🔢 Unique vehicles: {}", stats.unique_vehicles);
                for (lane, count) in &stats.lane_totals {
                    info!("  Lane {}: {}", lane, count);
                }
                info!("  Events written: {}", stats.events_written);
                info!("  Processing speed: {:.1} FPS", stats.avg_fps);
            }
            Err(e) => {
                error!("Failed to process video: {:#}", e);
            }
        }
    }

    Ok(())
}

struct ProcessingStats {
    total_frames: u64,
    total_detections: usize,
    unique_vehicles: u64,
    lane_totals: BTreeMap<u32, u64>,
    events_written: usize,
    avg_fps: f64,
}

fn process_video(
    video_path: &Path,
    detector: &mut YoloDetector,
    config: &Config,
) -> Result<ProcessingStats> {
    let start_time = Instant::now();

    let mut reader = video::VideoReader::open(video_path)?;
    let layout = LaneLayout::new(
        &config.lanes,
        reader.width as usize,
        reader.height as usize,
    )?;
    let mut tracker = CentroidTracker::new(
        config.tracking.max_disappeared,
        config.tracking.max_distance,
    )?;
    let mut ledger = CountingLedger::new(layout.lane_count());

    std::fs::create_dir_all(&config.video.output_dir)?;
    let stem = video_path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("video");
    let csv_path =
        Path::new(&config.video.output_dir).join(format!("{}_vehicle_counts.csv", stem));
    let mut sink = CsvEventSink::create(&csv_path)?;

    let mut writer = video::create_writer(
        &config.video.output_dir,
        video_path,
        reader.width,
        reader.height,
        reader.fps,
        config.video.save_annotated,
    )?;

    let mut total_detections: usize = 0;
    let mut events_written: usize = 0;

    while let Some(frame) = reader.read_frame()? {
        let frame_index = reader.current_frame as u64;

        // A failed inference is a skipped frame, not a dead pipeline; the
        // tracker sees it as a frame with zero detections.
        let detections = match detector.detect(&frame) {
            Ok(detections) => detections,
            Err(e) => {
                debug!("Detection failed on frame {}: {}", frame_index, e);
                Vec::new()
            }
        };
        total_detections += detections.len();

        let boxes: Vec<BoundingBox> = detections.iter().map(|d| d.bbox).collect();
        let objects = tracker.update(&boxes, frame_index);

        for (&id, &centroid) in &objects {
            let candidate_lane = layout.classify(centroid);
            let Some(track) = tracker.track(id) else {
                continue;
            };
            if let Some(event) = ledger.observe(
                id,
                candidate_lane,
                track.frames_seen,
                track.first_frame,
                reader.fps,
            ) {
                info!(
                    "🆕 Vehicle {} counted in lane {} at {:.2}s (frame {})",
                    event.vehicle_id, event.lane, event.first_timestamp_seconds, event.first_frame
                );
                sink.write_event(&event)?;
                events_written += 1;
            }
        }

        if let Some(ref mut w) = writer {
            let annotated =
                overlay::draw_annotations(&frame, &detections, &objects, &ledger, &layout)?;
            use opencv::videoio::VideoWriterTrait;
            w.write(&annotated)?;
        }

        if frame_index % 50 == 0 {
            info!(
                "Progress: {:.1}% ({}/{}) | Active tracks: {} | Lane counts: {:?}",
                reader.progress(),
                reader.current_frame,
                reader.total_frames,
                tracker.active_count(),
                ledger.counts()
            );
        }
    }

    let duration = start_time.elapsed();
    let total_frames = reader.current_frame as u64;

    info!("📊 Processing finished.");
    info!("  Lane totals: {:?}", ledger.counts());

    Ok(ProcessingStats {
        total_frames,
        total_detections,
        unique_vehicles: tracker.total_registered(),
        lane_totals: ledger.counts().clone(),
        events_written,
        avg_fps: total_frames as f64 / duration.as_secs_f64().max(1e-9),
    })
}
