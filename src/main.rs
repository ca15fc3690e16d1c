// src/main.rs

mod broadcast;
mod calibration;
mod capture;
mod config;
mod counter;
mod crossing;
mod occupancy;
mod types;

use anyhow::{Context, Result};
use broadcast::CountBroadcaster;
use calibration::Calibration;
use capture::CaptureReader;
use counter::PeopleCounter;
use crossing::Direction;
use std::path::Path;
use tracing::{debug, error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let config = types::Config::load("config.yaml")?;

    tracing_subscriber::fmt()
        .with_env_filter(format!(
            "doorway_counter={},reqwest=warn",
            config.logging.level
        ))
        .init();

    info!("🚪 Doorway People Counter Starting");
    info!("✓ Configuration loaded");
    info!(
        "Trigger distance: {} mm (noise margin {} mm, near-field cutoff {} mm)",
        config.sensor.trigger_distance_mm,
        calibration::NOISE_MARGIN_MM,
        calibration::NEAR_FIELD_CUTOFF_MM
    );

    let mut broadcaster = if config.broadcast.enabled {
        let b = CountBroadcaster::new(&config.broadcast)?;
        info!(
            "📡 Broadcasting count updates to {} (board {})",
            config.broadcast.url, config.broadcast.board_id
        );
        Some(b)
    } else {
        info!("⚪ Count broadcast disabled in config");
        None
    };

    let captures = capture::find_capture_files(&config.capture.input_dir)?;
    if captures.is_empty() {
        error!("No capture files found in {}", config.capture.input_dir);
        return Ok(());
    }

    for (idx, capture_path) in captures.iter().enumerate() {
        info!("\n========================================");
        info!(
            "Processing capture {}/{}: {}",
            idx + 1,
            captures.len(),
            capture_path.display()
        );
        info!("========================================\n");

        match process_capture(capture_path, &config, &mut broadcaster).await {
            Ok(stats) => {
                info!("\n✓ Capture processed successfully!");
                info!("  Total frames: {}", stats.total_frames);
                info!(
                    "  Occupied cycles: {} ({:.1}%)",
                    stats.triggered_cycles,
                    100.0 * stats.triggered_cycles as f64 / stats.total_frames.max(1) as f64
                );
                info!("  ➡️  Entries: {}", stats.entries);
                info!("  ⬅️  Exits: {}", stats.exits);
                info!("  Peak occupancy: {}", stats.peak_count);
                info!("  Final occupancy: {}", stats.final_count);
                info!("  Count updates published: {}", stats.updates_published);
                info!("  Processing Speed: {:.1} FPS", stats.avg_fps);
            }
            Err(e) => {
                error!("Failed to process capture: {:#}", e);
            }
        }
    }

    if let Some(b) = &broadcaster {
        info!(
            "📡 Broadcast totals: {} delivered, {} failed",
            b.total_delivered(),
            b.total_failed()
        );
    }

    Ok(())
}

struct CaptureStats {
    total_frames: u64,
    triggered_cycles: u64,
    entries: usize,
    exits: usize,
    peak_count: u32,
    final_count: u32,
    updates_published: usize,
    avg_fps: f64,
}

async fn process_capture(
    capture_path: &Path,
    config: &types::Config,
    broadcaster: &mut Option<CountBroadcaster>,
) -> Result<CaptureStats> {
    use std::io::Write;
    use std::time::Instant;

    let start_time = Instant::now();

    let mut reader = CaptureReader::open(capture_path)?;

    // The first recorded frame is the baseline: captured with the doorway
    // confirmed empty, same as the sensor's startup scan.
    let baseline = reader
        .read_frame()?
        .context("capture has no baseline frame")?;
    info!("Starting calibration");
    let calibration = Calibration::from_baseline(&baseline, config.sensor.trigger_distance_mm)
        .context("calibration failed")?;
    info!("✓ Calibration finished");
    calibration.log_summary();

    let mut counter = PeopleCounter::new(calibration);

    let mut events_file = if config.capture.save_events {
        std::fs::create_dir_all(&config.capture.output_dir)?;
        let capture_name = capture_path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("capture");
        let jsonl_path = Path::new(&config.capture.output_dir)
            .join(format!("{}_crossings.jsonl", capture_name));
        let file = std::fs::File::create(&jsonl_path)?;
        info!("💾 Crossings will be written to: {}", jsonl_path.display());
        Some(file)
    } else {
        None
    };

    let mut total_frames: u64 = 0;
    let mut triggered_cycles: u64 = 0;
    let mut entries: usize = 0;
    let mut exits: usize = 0;
    let mut peak_count: u32 = 0;
    let mut updates_published: usize = 0;

    while let Some(frame) = reader.read_frame()? {
        total_frames += 1;
        let frame_id = reader.current_frame;
        let timestamp_ms = frame.timestamp_ms;

        let result = counter.process_frame(&frame, frame_id);

        if !result.activation.is_idle() {
            triggered_cycles += 1;
            debug!("Frame {}: zones {}", frame_id, result.activation);
        }

        if let Some(event) = &result.event {
            match event.direction {
                Direction::Entry => entries += 1,
                Direction::Exit => exits += 1,
            }
            peak_count = peak_count.max(event.count_after);

            if let Some(file) = &mut events_file {
                let json_line = serde_json::to_string(event)?;
                writeln!(file, "{}", json_line)?;
                file.flush()?;
                info!("💾 Crossing saved to JSONL");
            }
        }

        if let Some(count) = result.publish {
            if let Some(b) = broadcaster.as_mut() {
                if let Err(e) = b.publish(count, timestamp_ms).await {
                    error!("📡 Disabling broadcast: {:#}", e);
                    *broadcaster = None;
                } else {
                    updates_published += 1;
                }
            }
        }

        if total_frames % 100 == 0 {
            info!(
                "Progress: frame {} | occupancy {} | entries {} | exits {}",
                frame_id,
                counter.count(),
                entries,
                exits
            );
        }
    }

    if counter.count() > 0 {
        warn!(
            "Capture ended with {} person(s) still counted inside",
            counter.count()
        );
    }

    let duration = start_time.elapsed();
    let avg_fps = total_frames as f64 / duration.as_secs_f64().max(f64::EPSILON);

    info!("\n📊 Final Report:");
    info!("  ➡️  Entries: {}", entries);
    info!("  ⬅️  Exits: {}", exits);
    info!("  Final occupancy: {}", counter.count());

    Ok(CaptureStats {
        total_frames,
        triggered_cycles,
        entries,
        exits,
        peak_count,
        final_count: counter.count(),
        updates_published,
        avg_fps,
    })
}
