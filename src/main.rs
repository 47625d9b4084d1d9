use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;

use path_tracker_rs::batch::{run_source, SessionOutcome};
use path_tracker_rs::loader::{load_session_file, JsonDirectorySource};
use path_tracker_rs::storage::{JsonDirectorySink, TrajectorySink};
use path_tracker_rs::{PathTracker, TrackerConfig};

#[derive(Parser, Debug)]
#[command(name = "path_tracker")]
#[command(about = "Reconstruct device trajectories from recorded IMU sessions", long_about = None)]
struct Args {
    /// Session file (<id>.json or <id>.json.gz)
    #[arg(long, conflicts_with = "session_dir")]
    session: Option<PathBuf>,

    /// Directory of session files to process in parallel
    #[arg(long)]
    session_dir: Option<PathBuf>,

    /// Where <session_id>.trajectory.json files are written
    #[arg(long, default_value = "trajectories")]
    output_dir: PathBuf,

    /// JSON file with configuration overrides
    #[arg(long)]
    config: Option<PathBuf>,

    /// Assume every session ends where it started
    #[arg(long, default_value_t = false)]
    loop_closure: bool,

    /// Speed limit (m/s)
    #[arg(long)]
    max_velocity: Option<f64>,

    /// Vertical speed limit (m/s)
    #[arg(long)]
    max_vertical_velocity: Option<f64>,

    /// Rolling std below which a sample counts as stationary (m/s²)
    #[arg(long)]
    zupt_threshold: Option<f64>,

    /// Samples in the stationary detection window
    #[arg(long)]
    zupt_window: Option<usize>,

    /// Outlier threshold in multiples of the rolling MAD
    #[arg(long)]
    outlier_threshold: Option<f64>,

    /// Worker threads for --session-dir (default: available cores)
    #[arg(long)]
    workers: Option<usize>,
}

impl Args {
    fn tracker_config(&self) -> anyhow::Result<TrackerConfig> {
        let mut config = match &self.config {
            Some(path) => TrackerConfig::from_json_file(path)
                .with_context(|| format!("loading config {}", path.display()))?,
            None => TrackerConfig::default(),
        };
        if self.loop_closure {
            config.loop_closure = true;
        }
        if let Some(v) = self.max_velocity {
            config.max_velocity = v;
        }
        if let Some(v) = self.max_vertical_velocity {
            config.max_vertical_velocity = v;
        }
        if let Some(v) = self.zupt_threshold {
            config.zupt_threshold = v;
        }
        if let Some(v) = self.zupt_window {
            config.zupt_window = v;
        }
        if let Some(v) = self.outlier_threshold {
            config.outlier_threshold = v;
        }
        Ok(config)
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let tracker = PathTracker::new(args.tracker_config()?)?;
    let mut sink = JsonDirectorySink::new(&args.output_dir);

    let outcomes: Vec<SessionOutcome> = if let Some(dir) = args.session_dir.as_ref() {
        let workers = args.workers.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        });
        let source = JsonDirectorySource::new(dir);
        run_source(&tracker, &source, &mut sink, workers)?
    } else if let Some(path) = args.session.as_ref() {
        let session = load_session_file(path)
            .with_context(|| format!("loading session {}", path.display()))?;
        let result = tracker.process(&session);
        if let Ok(r) = &result {
            sink.replace(&r.trajectory)?;
        }
        vec![SessionOutcome {
            session_id: session.id().to_string(),
            result,
        }]
    } else {
        anyhow::bail!("Provide --session or --session-dir");
    };

    let summaries: Vec<_> = outcomes.iter().map(SessionOutcome::summary).collect();
    println!("{}", serde_json::to_string_pretty(&summaries)?);

    if outcomes.is_empty() {
        anyhow::bail!("No sessions found");
    }
    if outcomes.iter().all(|o| !o.is_ok()) {
        anyhow::bail!("All {} sessions failed", outcomes.len());
    }
    Ok(())
}
