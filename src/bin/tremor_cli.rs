use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, watch};
use tracing_subscriber::EnvFilter;

use tremor_monitor::analysis::{DecisionTier, Extraction, Severity, TrainedModel};
use tremor_monitor::config::PipelineConfig;
use tremor_monitor::signal::{
    ReaderConnector, RingBuffer, SampleConnector, SampleLink, SyntheticConfig, SyntheticSource,
    TcpConnector,
};
use tremor_monitor::{
    ClassificationResult, ConnectionHealth, DisplayBuffer, FeatureVector, PipelineBuilder,
    PipelineHandle, PipelineReport,
};

#[derive(Parser, Debug)]
#[command(
    name = "tremor_cli",
    about = "Real-time EMG tremor classification pipeline"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the live pipeline and print each result as a JSON line
    Run(RunArgs),
    /// Extract features from the newest window of a recorded file
    Features {
        /// File of `raw,filtered` lines
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        config: Option<PathBuf>,
        /// Trained model (JSON) consulted below the model threshold
        #[arg(long)]
        model: Option<PathBuf>,
    },
    /// Validate a configuration file and print the effective configuration
    CheckConfig {
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[derive(Args, Debug)]
#[group(required = true, multiple = false)]
struct SourceArgs {
    /// Device exposed over TCP, e.g. 192.168.4.1:8080
    #[arg(long, value_name = "ADDR")]
    tcp: Option<String>,
    /// Read `raw,filtered` lines from standard input
    #[arg(long)]
    stdin: bool,
    /// Read `raw,filtered` lines from a file
    #[arg(long, value_name = "PATH")]
    file: Option<PathBuf>,
    /// Generate a tremor-like signal at FREQ Hz
    #[arg(long, value_name = "FREQ")]
    synthetic: Option<f64>,
}

#[derive(Args, Debug)]
struct RunArgs {
    #[command(flatten)]
    source: SourceArgs,
    /// Synthetic signal amplitude
    #[arg(long, default_value_t = 50.0)]
    amplitude: f64,
    /// Generate synthetic samples as fast as possible instead of in real time
    #[arg(long)]
    unpaced: bool,
    #[arg(long)]
    config: Option<PathBuf>,
    /// Trained model (JSON) consulted below the model threshold
    #[arg(long)]
    model: Option<PathBuf>,
    /// Base URL of the result sink; results are posted to {URL}/api/tremor
    #[arg(long)]
    sink_url: Option<String>,
    #[arg(long)]
    device_id: Option<String>,
    /// Stop after this many seconds
    #[arg(long, value_name = "SECONDS")]
    duration: Option<f64>,
    /// Print the final pipeline report as JSON to stderr
    #[arg(long)]
    summary: bool,
    /// Serve /health and /metrics on this address
    #[cfg(feature = "debug_http")]
    #[arg(long, value_name = "ADDR")]
    status_addr: Option<std::net::SocketAddr>,
}

fn main() -> ExitCode {
    init_logging();
    match run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err:?}");
            ExitCode::from(1)
        }
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run() -> Result<ExitCode> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Run(args) => run_live(args),
        Commands::Features {
            input,
            config,
            model,
        } => run_features(&input, config.as_deref(), model.as_deref()),
        Commands::CheckConfig { config } => run_check_config(config.as_deref()),
    }
}

fn load_config(path: Option<&Path>) -> Result<PipelineConfig> {
    match path {
        Some(path) => PipelineConfig::load_from_file(path)
            .with_context(|| format!("loading config {}", path.display())),
        None => Ok(PipelineConfig::default()),
    }
}

fn builder_with_model(config: PipelineConfig, model: Option<&Path>) -> Result<PipelineBuilder> {
    let builder = PipelineBuilder::new(config);
    match model {
        Some(path) => {
            let model = TrainedModel::load_from_file(path)
                .with_context(|| format!("loading model {}", path.display()))?;
            Ok(builder.classifier(model))
        }
        None => Ok(builder),
    }
}

fn run_live(args: RunArgs) -> Result<ExitCode> {
    let mut config = load_config(args.config.as_deref())?;
    if let Some(url) = args.sink_url.clone() {
        config.dispatch.sink_url = Some(url);
    }
    if let Some(device_id) = args.device_id.clone() {
        config.device_id = device_id;
    }
    if let Some(seconds) = args.duration {
        config.sampling.max_run_seconds = Some(seconds);
    }
    let sample_rate_hz = config.sampling.sample_rate_hz;
    let builder = builder_with_model(config, args.model.as_deref())?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("building tokio runtime")?;

    let source = &args.source;
    let spawned = if let Some(address) = &source.tcp {
        let link = TcpConnector::new(address.clone())
            .connect()
            .with_context(|| format!("connecting to {}", address))?;
        builder.spawn_threaded(link, runtime.handle())
    } else if source.stdin {
        let link = ReaderConnector::Stdin.connect()?;
        builder.spawn_threaded(link, runtime.handle())
    } else if let Some(path) = &source.file {
        let link = ReaderConnector::File(path.clone())
            .connect()
            .with_context(|| format!("opening {}", path.display()))?;
        builder.spawn(link, runtime.handle())
    } else {
        let frequency_hz = source.synthetic.unwrap_or(5.0);
        let link = SyntheticSource::new(SyntheticConfig {
            frequency_hz,
            amplitude: args.amplitude,
            sample_rate_hz,
            paced: !args.unpaced,
            ..SyntheticConfig::default()
        });
        builder.spawn(link, runtime.handle())
    };
    let handle = spawned.context("starting pipeline")?;

    #[cfg(feature = "debug_http")]
    if let Some(addr) = args.status_addr {
        tremor_monitor::http::spawn_status_server(&handle, addr, runtime.handle());
    }

    let report = runtime.block_on(supervise(handle));
    if args.summary {
        eprintln!("{}", serde_json::to_string_pretty(&report)?);
    }
    Ok(ExitCode::from(0))
}

async fn supervise(handle: PipelineHandle) -> PipelineReport {
    let printer = tokio::spawn(print_results(
        handle.subscribe_results(),
        handle.subscribe_health(),
    ));
    let stop = handle.stop_flag();
    let join = handle.join();
    tokio::pin!(join);

    let report = tokio::select! {
        report = &mut join => report,
        signal = tokio::signal::ctrl_c() => {
            match signal {
                Ok(()) => {
                    tracing::info!("[CLI] Ctrl-C received, stopping pipeline");
                    stop.stop();
                }
                Err(err) => tracing::warn!("[CLI] Cannot listen for Ctrl-C: {}", err),
            }
            join.await
        }
    };

    if let Ok(shown) = printer.await {
        tracing::debug!("[CLI] {} results in display buffer at exit", shown);
    }
    report
}

/// Print results as JSON lines and health transitions to stderr
async fn print_results(
    mut results: broadcast::Receiver<ClassificationResult>,
    mut health: watch::Receiver<ConnectionHealth>,
) -> usize {
    let mut display = DisplayBuffer::default();
    let mut health_open = true;

    loop {
        tokio::select! {
            received = results.recv() => match received {
                Ok(result) => {
                    match serde_json::to_string(&result) {
                        Ok(line) => println!("{line}"),
                        Err(err) => tracing::warn!("[CLI] Cannot encode result: {}", err),
                    }
                    display.push(result);
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!("[CLI] Output fell behind, {} results skipped", skipped);
                }
                Err(RecvError::Closed) => break,
            },
            changed = health.changed(), if health_open => match changed {
                Ok(()) => {
                    let state = *health.borrow_and_update();
                    eprintln!("[health] sink {}", state);
                    if display.observe_health(state) {
                        eprintln!("[health] connection lost, display cleared");
                    }
                }
                Err(_) => health_open = false,
            },
        }
    }
    display.len()
}

#[derive(Serialize)]
struct FeatureReport {
    input: String,
    samples_read: u64,
    malformed_lines: u64,
    window_len: usize,
    features: FeatureVector,
    decision: DecisionReport,
}

#[derive(Serialize)]
struct DecisionReport {
    label: Severity,
    confidence: f64,
    tier: DecisionTier,
    low_confidence: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    probabilities: Option<std::collections::BTreeMap<String, f64>>,
}

fn run_features(input: &Path, config: Option<&Path>, model: Option<&Path>) -> Result<ExitCode> {
    let config = load_config(config)?;
    let window_size = config.sampling.window_size;
    let mut builder = builder_with_model(config, model)?;
    let (extractor, engine) = builder.build_stages().context("building pipeline stages")?;

    let mut link = ReaderConnector::File(input.to_path_buf())
        .connect()
        .with_context(|| format!("opening {}", input.display()))?;
    let mut newest = RingBuffer::new(window_size);
    loop {
        match link.read_sample() {
            Some(sample) => newest.push(sample.filtered),
            None if link.is_exhausted() => break,
            None if link.stats().io_errors > 0 => {
                anyhow::bail!("reading {} failed", input.display())
            }
            None => {}
        }
    }
    let stats = link.stats();

    let window = newest.snapshot(window_size);
    match extractor.extract(&window) {
        Extraction::NotReady {
            available,
            required,
        } => {
            eprintln!(
                "Not enough data in {}: {} samples, need at least {}",
                input.display(),
                available,
                required
            );
            Ok(ExitCode::from(2))
        }
        Extraction::Ready(extracted) => {
            let decision = engine.classify(&extracted);
            let report = FeatureReport {
                input: input.display().to_string(),
                samples_read: stats.samples,
                malformed_lines: stats.malformed,
                window_len: extracted.window_len,
                features: extracted.vector,
                decision: DecisionReport {
                    label: decision.label,
                    confidence: decision.confidence,
                    tier: decision.tier,
                    low_confidence: decision.low_confidence,
                    probabilities: decision.probabilities,
                },
            };
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(ExitCode::from(0))
        }
    }
}

fn run_check_config(path: Option<&Path>) -> Result<ExitCode> {
    let config = load_config(path)?;
    config.validate().context("validating configuration")?;
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(ExitCode::from(0))
}
