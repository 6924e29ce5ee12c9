//! depthlog: capture depth frames into an append-only MessagePack log

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use depthlog::capture::{FrameSource, SyntheticSource, V4l2DepthSource};
use depthlog::log::{LogEnd, LogReader, LogSummary};
use depthlog::{utils, Codec, Config, EncoderKind, Pipeline, SourceKind};

#[derive(Debug, Parser)]
#[command(name = "depthlog", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Capture depth frames until interrupted
    Record(RecordArgs),
    /// Summarize an existing frame log
    Inspect(InspectArgs),
}

#[derive(Debug, Args)]
struct RecordArgs {
    /// Depth device ordinal
    #[arg(short, long)]
    device: Option<u32>,

    /// Payload encoder
    #[arg(short, long, value_enum)]
    encoder: Option<EncoderKind>,

    /// Target capture rate; 0 accepts every frame
    #[arg(short, long)]
    fps: Option<u32>,

    /// TOML configuration file
    #[arg(short, long, env = "DEPTHLOG_CONFIG")]
    config: Option<PathBuf>,

    /// Log file path
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Append to an existing log instead of truncating it
    #[arg(long)]
    append: bool,

    /// Use the synthetic depth pattern instead of a device
    #[arg(long)]
    synthetic: bool,

    /// Stop after this many synthetic frames
    #[arg(long, requires = "synthetic")]
    frames: Option<u64>,
}

#[derive(Debug, Args)]
struct InspectArgs {
    /// Log file to scan
    path: PathBuf,

    /// Decode image payloads and check them against this geometry
    #[arg(long)]
    verify: bool,

    #[arg(long, default_value_t = 640)]
    width: u32,

    #[arg(long, default_value_t = 480)]
    height: u32,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize error handling and logging
    color_eyre::install()?;
    init_tracing();

    match Cli::parse().command {
        Command::Record(args) => record(args).await,
        Command::Inspect(args) => inspect(args),
    }
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("depthlog=info"));

    #[cfg(feature = "profiling")]
    {
        use tracing_subscriber::prelude::*;
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_timer(tracing_subscriber::fmt::time::uptime()))
            .with(tracing_tracy::TracyLayer::default())
            .init();
    }

    #[cfg(not(feature = "profiling"))]
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(tracing_subscriber::fmt::time::uptime())
        .init();
}

fn load_config(args: &RecordArgs) -> Result<Config> {
    let mut config = Config::load(args.config.as_deref())?;

    if let Some(device) = args.device {
        config.capture.device = device;
    }
    if let Some(encoder) = args.encoder {
        config.pipeline.encoder = Some(encoder);
    }
    if let Some(fps) = args.fps {
        config.capture.target_fps = fps;
    }
    if let Some(output) = &args.output {
        config.output.path = output.clone();
    }
    if args.append {
        config.output.truncate = false;
    }
    if args.synthetic {
        config.capture.source = SourceKind::Synthetic;
    }
    if args.frames.is_some() {
        config.capture.synthetic.frame_limit = args.frames;
    }

    config.validate()?;
    Ok(config)
}

async fn record(args: RecordArgs) -> Result<()> {
    info!("depthlog launching...");

    // Fail on config before touching any device
    let config = load_config(&args)?;
    let geometry = config.geometry();

    let source: Box<dyn FrameSource> = match config.capture.source {
        SourceKind::V4l2 => {
            let device = utils::select_device(config.capture.device)?;
            info!("Using depth device: {:?}", device);
            Box::new(V4l2DepthSource::open(&device, geometry)?)
        }
        SourceKind::Synthetic => Box::new(SyntheticSource::new(
            geometry,
            Duration::from_millis(config.capture.synthetic.interval_ms),
            config.capture.synthetic.frame_limit,
        )),
    };

    let pipeline = Pipeline::new(config)?;
    let cancel = pipeline.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received, shutting down streams...");
            cancel.cancel();
        }
    });

    let report = pipeline.run(source).await?;
    info!(
        "-- done! {} delivered, {} accepted, {} persisted, {} evicted, {} codec failures",
        report.capture.delivered,
        report.capture.accepted,
        report.worker.persisted,
        report.buffer.evicted,
        report.worker.codec_failures
    );
    Ok(())
}

fn inspect(args: InspectArgs) -> Result<()> {
    let reader = LogReader::open(&args.path)
        .map_err(|e| eyre!("cannot open {}: {}", args.path.display(), e))?;
    let codec = Codec::Image(depthlog::DepthGeometry::new(args.width, args.height));

    let mut undecodable = 0u64;
    let summary = LogSummary::scan(reader, |record| {
        if args.verify {
            if let Err(e) = codec.decode(&record.payload) {
                undecodable += 1;
                warn!("Record {} does not decode: {}", record.sensor_timestamp, e);
            }
        }
    });

    println!("file:       {}", args.path.display());
    println!("records:    {}", summary.records);
    if let (Some(first), Some(last)) = (summary.first_timestamp, summary.last_timestamp) {
        println!("timestamps: {} .. {}", first, last);
    }
    if let (Some(min), Some(max)) = (summary.min_payload, summary.max_payload) {
        println!("payload:    {} bytes total, {}..{} per record", summary.payload_bytes, min, max);
    }
    match &summary.end {
        LogEnd::Clean => println!("end:        clean"),
        LogEnd::Incomplete { offset, reason } => {
            println!("end:        incomplete record at byte {} ({})", offset, reason)
        }
        LogEnd::Io { offset, reason } => {
            return Err(eyre!("read failed at byte {}: {}", offset, reason));
        }
    }
    if args.verify {
        println!("undecodable: {}", undecodable);
        if undecodable > 0 {
            return Err(eyre!("{} records failed to decode", undecodable));
        }
    }
    Ok(())
}
