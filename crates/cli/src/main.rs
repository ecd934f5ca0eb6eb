use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use std::thread;

use clap::Parser;
use serde::Serialize;

use facetrack_core::detection::domain::tracked_face::{Age, TrackedFace};
use facetrack_core::inference::domain::tensor_engine::BackendKind;
use facetrack_core::pipeline::capability::Capability;
use facetrack_core::pipeline::engine_session::{EngineConfig, EngineSession};
use facetrack_core::pipeline::session_logger::StdoutSessionLogger;
use facetrack_core::shared::error::FaceError;
use facetrack_core::shared::model_source::{DirectoryModelSource, ModelSource};
use facetrack_core::video::domain::frame_reader::FrameReader;
use facetrack_core::video::infrastructure::image_file_reader::ImageFileReader;

/// Face tracking and attribute analysis for images and image sequences.
///
/// Each input is a single image or a directory of frames processed in name
/// order, with faces tracked across frames.
#[derive(Parser)]
#[command(name = "facetrack")]
struct Cli {
    /// Image files or directories of frames.
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Model directory containing manifest.json (default: platform cache dir).
    #[arg(long)]
    models: Option<PathBuf>,

    /// Engine configuration JSON; flags below override it.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Inference backend: portable, npu or platform.
    #[arg(long)]
    backend: Option<BackendKind>,

    /// Maximum number of faces tracked at once.
    #[arg(long)]
    max_faces: Option<usize>,

    /// Run detection every Nth frame once all face slots are filled.
    #[arg(long)]
    detection_interval: Option<usize>,

    /// Enable mask detection.
    #[arg(long)]
    mask: bool,

    /// Enable RGB anti-spoofing.
    #[arg(long)]
    liveness: bool,

    /// Enable eyes-open interaction liveness.
    #[arg(long)]
    interaction: bool,

    /// Enable age estimation.
    #[arg(long)]
    age: bool,

    /// Enable gender classification.
    #[arg(long)]
    gender: bool,

    /// Intra-op threads per model.
    #[arg(long)]
    threads: Option<usize>,

    /// Independent engine instances; inputs are distributed across them.
    #[arg(long, default_value = "1")]
    workers: usize,

    /// Detect on every frame regardless of the interval.
    #[arg(long)]
    force_detect: bool,

    /// Print one JSON object per frame instead of a text summary.
    #[arg(long)]
    json: bool,
}

#[derive(Serialize)]
struct FrameRecord {
    source: PathBuf,
    frame: usize,
    faces: Vec<TrackedFace>,
}

type JobResult = (PathBuf, Result<Vec<FrameRecord>, String>);

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    validate(&cli)?;
    let config = build_config(&cli)?;

    let source: Arc<dyn ModelSource> = Arc::new(match &cli.models {
        Some(dir) => DirectoryModelSource::open(dir)?,
        None => DirectoryModelSource::open_default()?,
    });

    let mut failed = 0;
    if cli.workers <= 1 {
        let mut session = EngineSession::configure(source.as_ref(), config)?
            .with_logger(Box::new(StdoutSessionLogger::default()));
        for input in &cli.inputs {
            match process_input(&mut session, input, cli.force_detect) {
                Ok(records) => report(&records, cli.json)?,
                Err(e) => {
                    log::error!("{}: {e}", input.display());
                    failed += 1;
                }
            }
        }
        session.finish();
    } else {
        for (input, result) in run_workers(&cli, source, config)? {
            match result {
                Ok(records) => report(&records, cli.json)?,
                Err(e) => {
                    log::error!("{}: {e}", input.display());
                    failed += 1;
                }
            }
        }
    }

    if failed > 0 {
        return Err(format!("{failed} of {} inputs failed", cli.inputs.len()).into());
    }
    Ok(())
}

/// One session per worker over the shared model source; inputs are pulled
/// from a queue.
fn run_workers(
    cli: &Cli,
    source: Arc<dyn ModelSource>,
    config: EngineConfig,
) -> Result<Vec<JobResult>, Box<dyn std::error::Error>> {
    let (job_tx, job_rx) = crossbeam_channel::unbounded::<PathBuf>();
    let (result_tx, result_rx) = crossbeam_channel::unbounded::<JobResult>();
    for input in &cli.inputs {
        job_tx.send(input.clone())?;
    }
    drop(job_tx);

    let mut handles = Vec::with_capacity(cli.workers);
    for worker in 0..cli.workers {
        let source = Arc::clone(&source);
        let config = config.clone();
        let jobs = job_rx.clone();
        let results = result_tx.clone();
        let force_detect = cli.force_detect;
        handles.push(thread::spawn(move || -> Result<(), FaceError> {
            let mut session = EngineSession::configure(source.as_ref(), config)?;
            log::info!("Worker {worker} ready");
            for input in jobs {
                let outcome =
                    process_input(&mut session, &input, force_detect).map_err(|e| e.to_string());
                if results.send((input, outcome)).is_err() {
                    break;
                }
            }
            Ok(())
        }));
    }
    drop(result_tx);

    let results: Vec<JobResult> = result_rx.iter().collect();
    for handle in handles {
        match handle.join() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => return Err("worker thread panicked".into()),
        }
    }
    Ok(results)
}

fn process_input(
    session: &mut EngineSession,
    input: &Path,
    force_detect: bool,
) -> Result<Vec<FrameRecord>, FaceError> {
    let mut reader = ImageFileReader::new();
    let info = reader.open(input)?;
    log::info!(
        "Tracking {} ({} frames, {}x{})",
        input.display(),
        info.frame_count,
        info.width,
        info.height
    );

    let results = session.process_sequence(reader.frames(), force_detect);
    reader.close();
    Ok(results?
        .into_iter()
        .map(|r| FrameRecord {
            source: input.to_path_buf(),
            frame: r.frame,
            faces: r.faces,
        })
        .collect())
}

fn report(records: &[FrameRecord], json: bool) -> Result<(), Box<dyn std::error::Error>> {
    for record in records {
        if json {
            println!("{}", serde_json::to_string(record)?);
            continue;
        }
        println!(
            "{} #{}: {} face(s)",
            record.source.display(),
            record.frame,
            record.faces.len()
        );
        for face in &record.faces {
            println!("  {}", describe(face));
        }
    }
    Ok(())
}

fn describe(face: &TrackedFace) -> String {
    let b = &face.bounding_box;
    let a = &face.attributes;
    let mut text = format!(
        "track {} [{:.0}, {:.0}, {:.0}x{:.0}] score {:.2} {:?}",
        face.track_id, b.x, b.y, b.width, b.height, face.quality_score, face.track_state
    );
    if let Some(score) = a.mask_score {
        text.push_str(&format!(" mask={:?} ({score:.2})", a.mask));
    }
    if let Some(score) = a.rgb_liveness_score {
        text.push_str(&format!(" liveness={:?} ({score:.2})", a.rgb_liveness));
    }
    if let Age::Years(years) = a.age {
        text.push_str(&format!(" age={years:.0}"));
    }
    text.push_str(&format!(" gender={:?} eyes={:?}", a.gender, a.interaction_liveness));
    text
}

fn build_config(cli: &Cli) -> Result<EngineConfig, Box<dyn std::error::Error>> {
    let mut config = match &cli.config {
        Some(path) => EngineConfig::from_json_file(path)?,
        None => EngineConfig::default(),
    };
    if let Some(backend) = cli.backend {
        config.backend = backend;
    }
    if let Some(threads) = cli.threads {
        config.threads = Some(threads);
    }
    if let Some(max_faces) = cli.max_faces {
        config.tracker.max_detected_faces = max_faces;
    }
    if let Some(interval) = cli.detection_interval {
        config.tracker.detection_interval = interval;
    }
    for (flag, capability) in [
        (cli.mask, Capability::Mask),
        (cli.liveness, Capability::RgbLiveness),
        (cli.interaction, Capability::InteractionLiveness),
        (cli.age, Capability::Age),
        (cli.gender, Capability::Gender),
    ] {
        if flag {
            config.pipeline.enable(capability);
        }
    }
    config.tracker.validate()?;
    Ok(config)
}

fn validate(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    for input in &cli.inputs {
        if !input.exists() {
            return Err(format!("Input not found: {}", input.display()).into());
        }
    }
    if cli.workers == 0 {
        return Err("--workers must be at least 1".into());
    }
    if cli.threads == Some(0) {
        return Err("--threads must be at least 1".into());
    }
    Ok(())
}
