use std::io::{self, IsTerminal};
use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing::info;
use tracing_subscriber::EnvFilter;

use vstack::batch::run_batch;
use vstack::collect_groups;
use vstack::compositor::{FfmpegCompositor, FfmpegMode};
use vstack::config::{load_config, MergeConfig};
use vstack::confirm::{confirm, CONTINUE_PROMPT};
use vstack::observer::ConsoleObserver;

#[derive(Debug, Parser)]
#[command(name = "vstack")]
#[command(about = "Stack paired top/bottom trial videos into single slowed-down clips")]
#[command(version = concat!(env!("CARGO_PKG_VERSION"), " (", env!("VSTACK_GIT_HASH"), ")"))]
struct Cli {
    /// Log debug detail (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Group videos, confirm, then merge every complete pair
    Run {
        #[command(flatten)]
        config: ConfigArgs,
        /// Skip the confirmation prompt
        #[arg(short = 'y', long)]
        yes: bool,
        #[arg(long, value_enum, default_value_t = ModeArg::System)]
        ffmpeg: ModeArg,
    },
    /// Show the grouping without merging anything
    Plan {
        #[command(flatten)]
        config: ConfigArgs,
    },
    /// Print the effective configuration as YAML
    Config {
        #[command(flatten)]
        config: ConfigArgs,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ModeArg {
    System,
    Sidecar,
}

impl From<ModeArg> for FfmpegMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::System => FfmpegMode::System,
            ModeArg::Sidecar => FfmpegMode::Sidecar,
        }
    }
}

#[derive(Debug, Args)]
struct ConfigArgs {
    /// YAML configuration file; flags below override its values
    #[arg(short, long)]
    config: Option<PathBuf>,
    #[arg(short, long)]
    input: Option<PathBuf>,
    #[arg(short, long)]
    output: Option<PathBuf>,
    #[arg(long)]
    input_ext: Option<String>,
    #[arg(long)]
    output_ext: Option<String>,
    #[arg(long)]
    split_char: Option<String>,
    #[arg(long)]
    subject_marker: Option<String>,
    #[arg(long)]
    trial_marker: Option<String>,
    #[arg(long)]
    right_marker: Option<String>,
    #[arg(long)]
    left_marker: Option<String>,
    /// Enables cage-aware grouping of sided recordings
    #[arg(long)]
    cage_marker: Option<String>,
    #[arg(long)]
    top_marker: Option<String>,
    #[arg(long)]
    bottom_marker: Option<String>,
    #[arg(long)]
    name_separator: Option<String>,
    #[arg(long)]
    fps: Option<u32>,
    /// Playback speed relative to the source (0.1 = ten times slower)
    #[arg(long)]
    speed: Option<f64>,
    #[arg(long)]
    codec: Option<String>,
    #[arg(long)]
    margin_top: Option<u32>,
    #[arg(long)]
    margin_middle: Option<u32>,
    #[arg(long)]
    margin_bottom: Option<u32>,
    #[arg(long)]
    margin_left: Option<u32>,
    #[arg(long)]
    margin_right: Option<u32>,
}

impl ConfigArgs {
    fn resolve(self) -> Result<MergeConfig> {
        let mut config = match &self.config {
            Some(path) => load_config(path)?,
            None => MergeConfig::default(),
        };

        if let Some(value) = self.input {
            config.input_dir = value;
        }
        if let Some(value) = self.output {
            config.output_dir = value;
        }
        if let Some(value) = self.input_ext {
            config.input_extension = value;
        }
        if let Some(value) = self.output_ext {
            config.output_extension = value;
        }
        if let Some(value) = self.split_char {
            config.split_char = value;
        }
        if let Some(value) = self.subject_marker {
            config.subject_marker = value;
        }
        if let Some(value) = self.trial_marker {
            config.trial_marker = value;
        }
        if let Some(value) = self.right_marker {
            config.right_marker = value;
        }
        if let Some(value) = self.left_marker {
            config.left_marker = value;
        }
        if let Some(value) = self.top_marker {
            config.top_marker = value;
        }
        if let Some(value) = self.bottom_marker {
            config.bottom_marker = value;
        }
        if let Some(value) = self.name_separator {
            config.name_separator = value;
        }
        if let Some(value) = self.fps {
            config.fps = value;
        }
        if let Some(value) = self.speed {
            config.speed_factor = value;
        }
        if let Some(value) = self.codec {
            config.codec = value;
        }
        if let Some(value) = self.margin_top {
            config.margins.top = value;
        }
        if let Some(value) = self.margin_middle {
            config.margins.middle = value;
        }
        if let Some(value) = self.margin_bottom {
            config.margins.bottom = value;
        }
        if let Some(value) = self.margin_left {
            config.margins.left = value;
        }
        if let Some(value) = self.margin_right {
            config.margins.right = value;
        }
        if let Some(marker) = self.cage_marker {
            config.cage_marker = Some(marker);
        }

        Ok(config)
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Run {
            config,
            yes,
            ffmpeg,
        } => run_merge(config.resolve()?, yes, ffmpeg.into()),
        Commands::Plan { config } => run_plan(&config.resolve()?),
        Commands::Config { config } => {
            let config = config.resolve()?;
            config.validate()?;
            print!("{}", config.to_yaml()?);
            Ok(())
        }
    }
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .with_ansi(io::stderr().is_terminal())
        .init();
}

fn run_plan(config: &MergeConfig) -> Result<()> {
    let observer = ConsoleObserver::new();
    let grouping = collect_groups(config, &observer)?;
    if grouping.is_empty() {
        println!("No videos found to process. Exiting.");
        return Ok(());
    }

    println!("\nOrganization found:");
    grouping.report_summary(&observer);
    println!(
        "{} groups across {} subjects.",
        grouping.group_count(),
        grouping.subject_count()
    );
    Ok(())
}

fn run_merge(config: MergeConfig, assume_yes: bool, mode: FfmpegMode) -> Result<()> {
    let observer = ConsoleObserver::new();
    let grouping = collect_groups(&config, &observer)?;
    if grouping.is_empty() {
        println!("No videos found to process. Exiting.");
        return Ok(());
    }

    println!("\nOrganization found:");
    grouping.report_summary(&observer);

    if !assume_yes {
        let stdin = io::stdin();
        let mut input = stdin.lock();
        let mut prompt_out = io::stderr();
        if !confirm(&mut input, &mut prompt_out, CONTINUE_PROMPT)? {
            println!("Process aborted by the user.");
            return Ok(());
        }
    }

    let compositor = FfmpegCompositor::new(mode, &config);
    let summary = run_batch(&grouping, &config, &compositor, &observer)?;
    info!(
        "{} merged, {} already existed, {} skipped, {} failed",
        summary.merged, summary.already_existed, summary.unresolved, summary.failed
    );
    println!("\nDone!");
    Ok(())
}
