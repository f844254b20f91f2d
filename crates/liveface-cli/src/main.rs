//! `liveface` — operator diagnostics for the liveface service.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use liveface_core::{quality, Gallery, LandmarkExtractor, LivenessSession, RemoteInference};

#[derive(Parser)]
#[command(name = "liveface", version, about = "Liveface diagnostics")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the photo-screening quality metrics for one or more images.
    Quality {
        /// Image files to analyze.
        images: Vec<PathBuf>,
        /// Emit one JSON object per image instead of a table.
        #[arg(long)]
        json: bool,
    },
    /// Replay a directory of frames (sorted by name) through a fresh
    /// liveness session and print the per-frame verdicts.
    Replay {
        /// Directory of frame images.
        #[arg(long)]
        frames: PathBuf,
        /// Base URL of the inference sidecar.
        #[arg(long, default_value = "http://127.0.0.1:9000")]
        inference_url: String,
    },
    /// Validate that a gallery directory loads and list its identities.
    Gallery {
        /// Directory of labeled reference images.
        #[arg(long)]
        dir: PathBuf,
        /// Base URL of the inference sidecar.
        #[arg(long, default_value = "http://127.0.0.1:9000")]
        inference_url: String,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Quality { images, json } => run_quality(&images, json),
        Command::Replay {
            frames,
            inference_url,
        } => run_replay(&frames, &inference_url),
        Command::Gallery { dir, inference_url } => run_gallery(&dir, &inference_url),
    }
}

#[derive(serde::Serialize)]
struct QualityRecord<'a> {
    path: &'a str,
    laplacian_variance: f64,
    uniformity: f64,
    contrast: f64,
    looks_live: bool,
}

fn run_quality(images: &[PathBuf], json: bool) -> Result<()> {
    if images.is_empty() {
        bail!("no images given");
    }

    for path in images {
        let frame = image::open(path)
            .with_context(|| format!("failed to open {}", path.display()))?
            .to_rgb8();
        let metrics = quality::assess(&quality::luminance(&frame));

        if json {
            let display = path.display().to_string();
            let record = QualityRecord {
                path: &display,
                laplacian_variance: metrics.laplacian_variance,
                uniformity: metrics.uniformity,
                contrast: metrics.contrast,
                looks_live: metrics.looks_live(),
            };
            println!("{}", serde_json::to_string(&record)?);
        } else {
            println!(
                "{}: laplacian={:.1} uniformity={:.4} contrast={:.1} -> {}",
                path.display(),
                metrics.laplacian_variance,
                metrics.uniformity,
                metrics.contrast,
                if metrics.looks_live() { "live" } else { "not live" }
            );
        }
    }

    Ok(())
}

fn run_replay(frames_dir: &Path, inference_url: &str) -> Result<()> {
    let mut paths: Vec<PathBuf> = std::fs::read_dir(frames_dir)
        .with_context(|| format!("failed to read {}", frames_dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file())
        .collect();
    paths.sort();

    if paths.is_empty() {
        bail!("no frames found in {}", frames_dir.display());
    }

    let mut extractor = RemoteInference::new(inference_url);
    let mut session = LivenessSession::new();
    let mut rejections = 0u32;

    for path in &paths {
        let frame = match image::open(path) {
            Ok(img) => img.to_rgb8(),
            Err(err) => {
                println!("{}: skipped ({err})", path.display());
                continue;
            }
        };

        let landmarks = match extractor.extract(&frame) {
            Ok(landmarks) => landmarks,
            Err(err) => {
                println!("{}: extractor error, treated as no face ({err})", path.display());
                None
            }
        };

        let verdict = session.process_frame(&frame, landmarks.as_ref());
        if !verdict.live {
            rejections += 1;
        }
        match verdict.reason {
            Some(reason) => println!(
                "frame {:3} {}: NOT LIVE ({reason})",
                session.frame_count(),
                path.display()
            ),
            None => println!("frame {:3} {}: live", session.frame_count(), path.display()),
        }
    }

    println!();
    println!(
        "{} frames, {} blinks, {} rejected",
        session.frame_count(),
        session.blink_count(),
        rejections
    );

    Ok(())
}

fn run_gallery(dir: &Path, inference_url: &str) -> Result<()> {
    let mut encoder = RemoteInference::new(inference_url);
    let gallery = Gallery::load(dir, &mut encoder)
        .with_context(|| format!("failed to load gallery from {}", dir.display()))?;

    println!("{} identities:", gallery.len());
    for label in gallery.labels() {
        println!("  {label}");
    }

    Ok(())
}
