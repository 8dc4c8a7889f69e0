use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use serve_vision::intake::ImageSequenceSource;
#[cfg(feature = "onnx")]
use serve_vision::pipeline::services::inference::OnnxLoader;
use serve_vision::pipeline::services::inference::ModelLoader;
use serve_vision::pipeline::types::{CameraAngle, Handedness};
use serve_vision::{AppError, Configuration, CoordinatorBuilder, JsonFileSink, PersistenceSink};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Analyse a serve recorded as a directory of frames.
#[derive(Parser, Debug)]
#[command(name = "serve-vision", version)]
struct Cli {
    /// Directory of frame images, replayed in file-name order.
    frames_dir: PathBuf,
    #[arg(long)]
    config: Option<PathBuf>,
    /// Replay and analysis rate.
    #[arg(long)]
    fps: Option<u32>,
    /// Where the session snapshot is written.
    #[arg(long)]
    output: Option<PathBuf>,
    #[arg(long, value_enum)]
    camera_angle: Option<CameraAngle>,
    #[arg(long, value_enum)]
    handedness: Option<Handedness>,
}

fn init_logging(default_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[cfg(feature = "onnx")]
fn model_loader() -> Option<Arc<dyn ModelLoader>> {
    Some(Arc::new(OnnxLoader))
}

#[cfg(not(feature = "onnx"))]
fn model_loader() -> Option<Arc<dyn ModelLoader>> {
    None
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let cli = Cli::parse();
    let mut configuration = Configuration::load(cli.config.as_deref())?;
    if let Some(fps) = cli.fps {
        configuration.analysis.target_fps = fps;
    }
    if let Some(output) = cli.output {
        configuration.sink.output_dir = output;
    }
    if let Some(camera_angle) = cli.camera_angle {
        configuration.analysis.camera_angle = camera_angle;
    }
    if let Some(handedness) = cli.handedness {
        configuration.analysis.handedness = handedness;
    }
    configuration.validate()?;
    init_logging(&configuration.log_level);

    let source = ImageSequenceSource::open(&cli.frames_dir, configuration.analysis.target_fps)?;
    info!("Replaying {} frames from {}", source.len(), cli.frames_dir.display());

    let loader = configuration
        .inference
        .model_path
        .as_ref()
        .and_then(|_| model_loader());
    if loader.is_none() {
        if let Some(path) = configuration.inference.model_path.take() {
            warn!(
                "Built without the onnx feature, detecting without model {}",
                path.display()
            );
        }
    }

    let mut builder = CoordinatorBuilder::new(configuration.clone()).source(Box::new(source));
    if let Some(loader) = loader {
        builder = builder.model_loader(loader);
    }
    let mut coordinator = builder.build()?;
    let mut results = coordinator
        .take_results()
        .ok_or(AppError::Pipeline("Result channel unavailable".to_string()))?;

    let reporter = tokio::spawn(async move {
        while let Some(analysis) = results.recv().await {
            if let Some(report) = &analysis.biomechanics {
                info!(
                    "{:>8.2}s {:<14} score {:5.1}",
                    analysis.timestamp.as_secs_f32(),
                    report.phase,
                    report.similarity
                );
            }
        }
    });

    let stop = coordinator.stop_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted, stopping analysis");
            stop.cancel();
        }
    });

    let session = coordinator.join().await?;
    reporter.await?;

    if let Some(summary) = session.summary() {
        info!(
            "Analysed {} frames, mean score {:.1}",
            summary.samples, summary.mean_similarity
        );
    }

    let sink = JsonFileSink::new(configuration.sink.output_dir.clone());
    let path = sink.save(&session.snapshot()).await?;
    info!("Session written to {}", path.display());
    Ok(())
}
