use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context as _;
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use webreel::browser::chromium::{ChromiumEngine, ChromiumOptions};
use webreel::model::{BatchInput, requests_for_urls};
use webreel::report::{
    ConversionResponse, ResultsEntry, results_entries, results_path_for, write_results_file,
};
use webreel::{
    BatchOrchestrator, CaptureMode, DirStore, FfmpegEncoder, FrameRate, OnError, PipelineRunner,
    ReelConfig, SessionDeps,
};

#[derive(Parser, Debug)]
#[command(name = "webreel", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Capture a list of URLs into videos.
    Capture(CaptureArgs),
    /// Convert every live-page item of an editor document and write the rewritten document.
    Convert(ConvertArgs),
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ModeArg {
    Frames,
    Stream,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum PolicyArg {
    Abort,
    Continue,
}

#[derive(Parser, Debug)]
struct CommonArgs {
    /// JSON config file; missing fields take their defaults.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Capture mode.
    #[arg(long, value_enum)]
    mode: Option<ModeArg>,

    /// Batch error policy.
    #[arg(long, value_enum)]
    on_error: Option<PolicyArg>,

    /// Maximum captures running at once.
    #[arg(long)]
    concurrency: Option<usize>,

    /// Frames per second.
    #[arg(long)]
    fps: Option<u32>,

    /// Target duration in seconds.
    #[arg(long)]
    duration: Option<f64>,

    /// Show the browser window.
    #[arg(long, default_value_t = false)]
    headful: bool,
}

#[derive(Parser, Debug)]
struct CaptureArgs {
    /// URLs to capture.
    urls: Vec<String>,

    /// Batch input file (`{"urls": [...], "duration": n, "outputDir": "..."}`). Results are
    /// written to `conversion-results.json` next to it.
    #[arg(long = "in")]
    in_path: Option<PathBuf>,

    /// Output directory for finished videos.
    #[arg(long)]
    out: Option<PathBuf>,

    /// Also write the full batch report as JSON.
    #[arg(long)]
    report: Option<PathBuf>,

    #[command(flatten)]
    common: CommonArgs,
}

#[derive(Parser, Debug)]
struct ConvertArgs {
    /// Input document JSON.
    #[arg(long = "in")]
    in_path: PathBuf,

    /// Output document JSON.
    #[arg(long)]
    out: PathBuf,

    #[command(flatten)]
    common: CommonArgs,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.cmd {
        Command::Capture(args) => cmd_capture(args).await,
        Command::Convert(args) => cmd_convert(args).await,
    }
}

fn build_config(common: &CommonArgs, out_dir: Option<PathBuf>) -> anyhow::Result<ReelConfig> {
    let mut cfg = match &common.config {
        Some(path) => ReelConfig::from_path(path)?,
        None => ReelConfig::default(),
    };
    if let Some(mode) = common.mode {
        cfg.mode = match mode {
            ModeArg::Frames => CaptureMode::Frames,
            ModeArg::Stream => CaptureMode::Stream,
        };
    }
    if let Some(policy) = common.on_error {
        cfg.on_error = match policy {
            PolicyArg::Abort => OnError::Abort,
            PolicyArg::Continue => OnError::Continue,
        };
    }
    if let Some(n) = common.concurrency {
        cfg.max_concurrent = n;
    }
    if let Some(fps) = common.fps {
        cfg.frame_rate = FrameRate::new(fps)?;
    }
    if let Some(secs) = common.duration {
        cfg.default_duration_secs = secs;
    }
    if let Some(dir) = out_dir {
        cfg.output_dir = dir;
    }
    cfg.validate()?;

    for dir in [&cfg.output_dir, &cfg.work_dir] {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("create directory '{}'", dir.display()))?;
    }
    Ok(cfg)
}

async fn launch(
    cfg: &Arc<ReelConfig>,
    headful: bool,
) -> anyhow::Result<(Arc<ChromiumEngine>, BatchOrchestrator)> {
    let engine = Arc::new(
        ChromiumEngine::launch(ChromiumOptions {
            headless: !headful,
            ..ChromiumOptions::from_config(cfg)
        })
        .await?,
    );
    let deps = SessionDeps {
        engine: engine.clone(),
        encoder: Arc::new(FfmpegEncoder::from_config(cfg)),
        store: Arc::new(DirStore::from_config(&cfg.store)),
        config: cfg.clone(),
    };
    let orchestrator = BatchOrchestrator::from_config(Arc::new(PipelineRunner::new(deps)), cfg);
    Ok((engine, orchestrator))
}

async fn cmd_capture(args: CaptureArgs) -> anyhow::Result<()> {
    let input = args.in_path.as_deref().map(BatchInput::from_path).transpose()?;
    let mut urls = args.urls.clone();
    if let Some(input) = &input {
        urls.extend(input.urls.iter().cloned());
    }
    if urls.is_empty() {
        anyhow::bail!("no URLs given (pass URLs or --in <file>)");
    }

    let out_dir = args
        .out
        .clone()
        .or_else(|| input.as_ref().and_then(|i| i.output_dir.clone()));
    let cfg = Arc::new(build_config(&args.common, out_dir)?);
    let duration = args
        .common
        .duration
        .or_else(|| input.as_ref().and_then(|i| i.duration))
        .unwrap_or(cfg.default_duration_secs);
    let requests = requests_for_urls(&urls, duration, cfg.frame_rate)?;

    let (engine, orchestrator) = launch(&cfg, args.common.headful).await?;
    let outcome = orchestrator.run(&requests).await;
    engine.shutdown().await;

    if let Some(in_path) = &args.in_path {
        let rows = match &outcome {
            Ok(report) => results_entries(report),
            Err(e) => vec![ResultsEntry::aborted(e)],
        };
        write_results_file(&results_path_for(in_path), &rows)?;
    }
    if let (Some(path), Ok(report)) = (&args.report, &outcome) {
        let json = serde_json::to_string_pretty(report)?;
        std::fs::write(path, json).with_context(|| format!("write report '{}'", path.display()))?;
    }

    let response = ConversionResponse::from_outcome(&outcome);
    println!("{}", serde_json::to_string_pretty(&response)?);

    let report = outcome?;
    if !report.all_succeeded() {
        anyhow::bail!("{} of {} captures failed", report.failed, report.total);
    }
    Ok(())
}

async fn cmd_convert(args: ConvertArgs) -> anyhow::Result<()> {
    let text = std::fs::read_to_string(&args.in_path)
        .with_context(|| format!("read document '{}'", args.in_path.display()))?;
    let doc: serde_json::Value = serde_json::from_str(&text)
        .with_context(|| format!("parse document '{}'", args.in_path.display()))?;
    let cfg = Arc::new(build_config(&args.common, None)?);

    let (engine, orchestrator) = launch(&cfg, args.common.headful).await?;
    let conversion = webreel::convert_document(&doc, &orchestrator, &cfg).await;
    engine.shutdown().await;
    let conversion = conversion?;

    if let Some(parent) = args.out.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create output dir '{}'", parent.display()))?;
    }
    std::fs::write(&args.out, serde_json::to_string_pretty(&conversion.document)?)
        .with_context(|| format!("write document '{}'", args.out.display()))?;

    eprintln!(
        "wrote {} ({} of {} items converted)",
        args.out.display(),
        conversion.updated,
        conversion.report.total
    );
    Ok(())
}
