use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use feedforward_core::progress::DEFAULT_CHAR_DELAY;
use feedforward_core::run::DEFAULT_OUTPUT_FILE;
use feedforward_core::{replay_document, run_forward, NetworkConfig, PacedWriter, ProgressSink};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "feedforward")]
#[command(about = "Forward pass through a randomly initialized network, dumped to JSON", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info", global = true)]
    log_level: String,

    /// Print progress messages without the per-character delay
    #[arg(long, global = true)]
    no_pace: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a custom network and run one forward pass
    Run {
        /// Units per layer, comma separated
        #[arg(long, value_delimiter = ',', allow_negative_numbers = true, default_value = "4,3,2")]
        layers: Vec<i64>,

        /// Input vector, comma separated
        #[arg(long, value_delimiter = ',', allow_negative_numbers = true, default_value = "0.1,0.4,0.2,0.3")]
        input: Vec<f64>,

        #[command(flatten)]
        opts: RunOpts,
    },

    /// Run the default 3-3-3 network
    Default {
        /// Input vector, comma separated
        #[arg(long, value_delimiter = ',', allow_negative_numbers = true, default_value = "0.1,0.3,0.2")]
        input: Vec<f64>,

        #[command(flatten)]
        opts: RunOpts,
    },

    /// Rebuild the network stored in a trace file and check it reproduces the trace
    Replay {
        /// Trace document written by `run` or `default`
        trace: PathBuf,
    },
}

#[derive(Args)]
struct RunOpts {
    /// Destination of the trace document (overwritten)
    #[arg(short, long, default_value = DEFAULT_OUTPUT_FILE)]
    output: PathBuf,

    /// JSON config file; flags below override its fields
    #[arg(long)]
    config: Option<PathBuf>,

    /// Seed for reproducible parameters (default: OS entropy)
    #[arg(long)]
    seed: Option<u64>,

    /// Mean of the initial parameter distribution
    #[arg(long, allow_negative_numbers = true)]
    mean: Option<f64>,

    /// Standard deviation of the initial parameter distribution
    #[arg(long)]
    std_dev: Option<f64>,
}

impl RunOpts {
    fn config(&self, layer_sizes: Option<Vec<i64>>) -> Result<NetworkConfig> {
        let mut config = match &self.config {
            Some(path) => NetworkConfig::from_json_file(path)
                .with_context(|| format!("loading config {}", path.display()))?,
            None => NetworkConfig::default(),
        };
        if let Some(sizes) = layer_sizes {
            config.layer_sizes = sizes;
        }
        if let Some(seed) = self.seed {
            config.seed = Some(seed);
        }
        if let Some(mean) = self.mean {
            config.init_mean = mean;
        }
        if let Some(std_dev) = self.std_dev {
            config.init_std_dev = std_dev;
        }
        config.validate()?;
        Ok(config)
    }

    /// Like [`RunOpts::config`] but always on the `[3, 3, 3]` shape; a config
    /// file only contributes its initialization fields.
    fn default_config(&self) -> Result<NetworkConfig> {
        self.config(Some(NetworkConfig::default().layer_sizes))
    }
}

fn parse_level(s: &str) -> Result<Level> {
    match s {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        _ => bail!("Invalid log level: {}", s),
    }
}

fn format_vector(values: &[f64]) -> String {
    let items: Vec<String> = values.iter().map(|v| v.to_string()).collect();
    format!("[{}]", items.join(", "))
}

fn forward(
    sink: &mut impl ProgressSink,
    heading: &str,
    config: &NetworkConfig,
    input: &[f64],
    output: &Path,
) -> Result<()> {
    let outcome = run_forward(config, input, output)?;
    sink.emit(heading)?;
    println!("{}", format_vector(outcome.trace.final_output()));
    outcome
        .persisted
        .with_context(|| format!("Unable to write {}", output.display()))?;
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(parse_level(&cli.log_level)?)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let delay = if cli.no_pace {
        Duration::ZERO
    } else {
        DEFAULT_CHAR_DELAY
    };
    let mut sink = PacedWriter::stdout(delay);

    match cli.command {
        Commands::Run { layers, input, opts } => {
            let config = opts.config(Some(layers))?;
            sink.emit("Starting Neural Network...")?;
            forward(
                &mut sink,
                "Output from custom network forward propagation: ",
                &config,
                &input,
                &opts.output,
            )?;
        }
        Commands::Default { input, opts } => {
            let config = opts.default_config()?;
            sink.emit("Starting Neural Network...")?;
            forward(
                &mut sink,
                "Output from forward propagation: ",
                &config,
                &input,
                &opts.output,
            )?;
        }
        Commands::Replay { trace } => {
            let report = replay_document(&trace)
                .with_context(|| format!("replaying {}", trace.display()))?;
            if report.matches() {
                println!(
                    "{}: {} layers reproduced exactly",
                    trace.display(),
                    report.recorded.layers.len()
                );
            } else {
                let layers = report.mismatched_layers();
                if layers.is_empty() {
                    bail!("{}: final output differs from replay", trace.display());
                }
                bail!(
                    "{}: layers {:?} differ from replay",
                    trace.display(),
                    layers
                );
            }
        }
    }
    Ok(())
}
