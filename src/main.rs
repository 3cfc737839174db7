//! tabata-track - Builds an interval-training track from two audio files.
//!
//! Takes an "active" clip from one file and a "rest" clip from another,
//! joins them, and loops the pair (eight times by default) into a single
//! MP3 using `ffmpeg`.
//!
//! # Usage
//!
//! ```bash
//! tabata-track --active workout.mp3 --rest breather.mp3
//! tabata-track --active a.mp3 --rest b.mp3 --active-interval 5-25 --rest-interval 0-10 --out ~/Music
//! ```
//!
//! Set `RUST_LOG=debug` to see the engine's own output.

use tabata_track::{
    BuildConfig, BuildOutcome, DirectorySink, Session, SourceFile, TimeInterval, TrackBuilder,
};

use anyhow::{bail, Context, Result};
use std::path::PathBuf;

/// Command-line options for the application.
struct CliOptions {
    active: PathBuf,
    rest: PathBuf,
    active_interval: Option<TimeInterval>,
    rest_interval: Option<TimeInterval>,
    /// Directory the finished track is saved into.
    out_dir: PathBuf,
    /// JSON build configuration.
    config: Option<PathBuf>,
    repetitions: Option<u32>,
    ffmpeg: Option<PathBuf>,
    no_bounds_check: bool,
}

fn print_help(program: &str) {
    eprintln!("tabata-track - Build an interval-training track from two audio files");
    eprintln!();
    eprintln!("Usage: {program} --active PATH --rest PATH [OPTIONS]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  -a, --active PATH            Source of the active clip");
    eprintln!("  -r, --rest PATH              Source of the rest clip");
    eprintln!("      --active-interval S-E    Active clip window in seconds (default 0-20)");
    eprintln!("      --rest-interval S-E      Rest clip window in seconds (default 0-10)");
    eprintln!("  -o, --out DIR                Output directory (default: current directory)");
    eprintln!("  -c, --config FILE            JSON build configuration");
    eprintln!("  -n, --repeat N               Number of active+rest loops (default 8)");
    eprintln!("      --ffmpeg PATH            ffmpeg executable (default: $TABATA_FFMPEG or PATH)");
    eprintln!("      --no-bounds-check        Skip checking intervals against file durations");
    eprintln!("  -h, --help                   Print this help message");
}

impl CliOptions {
    /// Parses command-line arguments.
    fn parse() -> Result<Self> {
        let args: Vec<String> = std::env::args().collect();
        let program = args.first().map_or("tabata-track", String::as_str);

        let mut active = None;
        let mut rest = None;
        let mut active_interval = None;
        let mut rest_interval = None;
        let mut out_dir = PathBuf::from(".");
        let mut config = None;
        let mut repetitions = None;
        let mut ffmpeg = None;
        let mut no_bounds_check = false;

        let mut iter = args.iter().skip(1);
        while let Some(arg) = iter.next() {
            let mut value = || {
                iter.next()
                    .cloned()
                    .with_context(|| format!("{arg} requires a value"))
            };
            match arg.as_str() {
                "--active" | "-a" => active = Some(PathBuf::from(value()?)),
                "--rest" | "-r" => rest = Some(PathBuf::from(value()?)),
                "--active-interval" => {
                    let interval = value()?.parse::<TimeInterval>();
                    active_interval = Some(interval.context("--active-interval")?);
                }
                "--rest-interval" => {
                    let interval = value()?.parse::<TimeInterval>();
                    rest_interval = Some(interval.context("--rest-interval")?);
                }
                "--out" | "-o" => out_dir = PathBuf::from(value()?),
                "--config" | "-c" => config = Some(PathBuf::from(value()?)),
                "--repeat" | "-n" => {
                    let raw = value()?;
                    repetitions = Some(
                        raw.parse::<u32>()
                            .with_context(|| format!("invalid repeat count: {raw}"))?,
                    );
                }
                "--ffmpeg" => ffmpeg = Some(PathBuf::from(value()?)),
                "--no-bounds-check" => no_bounds_check = true,
                "--help" | "-h" => {
                    print_help(program);
                    std::process::exit(0);
                }
                other => {
                    eprintln!("Unknown option: {other}");
                    eprintln!("Use --help for usage information");
                    std::process::exit(1);
                }
            }
        }

        let (Some(active), Some(rest)) = (active, rest) else {
            print_help(program);
            bail!("both --active and --rest are required");
        };

        Ok(Self {
            active,
            rest,
            active_interval,
            rest_interval,
            out_dir,
            config,
            repetitions,
            ffmpeg,
            no_bounds_check,
        })
    }

    /// Loads the configuration file (if any) and applies CLI overrides.
    fn build_config(&self) -> Result<BuildConfig> {
        let mut config = match &self.config {
            Some(path) => BuildConfig::load_from_file(path)?,
            None => BuildConfig::default(),
        };
        if let Some(n) = self.repetitions {
            config.repetitions = n;
        }
        if let Some(path) = &self.ffmpeg {
            config.engine_program = Some(path.clone());
        }
        if self.no_bounds_check {
            config.check_bounds = false;
        }
        config.validate().context("Invalid build configuration")?;
        Ok(config)
    }
}

/// Main entry point.
fn main() -> Result<()> {
    let cli = CliOptions::parse()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = cli.build_config()?;
    let builder = TrackBuilder::with_ffmpeg(config);

    let mut session = Session::new();
    session.attach_status(builder.status());
    session.set_active_file(
        SourceFile::open(&cli.active)
            .with_context(|| format!("Failed to read {}", cli.active.display()))?,
    );
    session.set_rest_file(
        SourceFile::open(&cli.rest)
            .with_context(|| format!("Failed to read {}", cli.rest.display()))?,
    );
    if let Some(interval) = cli.active_interval {
        session.set_active_interval(interval);
    }
    if let Some(interval) = cli.rest_interval {
        session.set_rest_interval(interval);
    }

    let mut sink = DirectorySink::new(&cli.out_dir);
    session.set_running(true);
    let result = session.build(&builder, &mut sink);
    session.set_running(false);

    match result.context("Track build failed")? {
        BuildOutcome::Downloaded { .. } => {
            let loops = builder.config().repetitions;
            for path in sink.saved() {
                eprintln!("Wrote {} ({} loops)", path.display(), loops);
            }
            Ok(())
        }
        BuildOutcome::InvalidOutput => bail!("engine returned no audio data; nothing was written"),
    }
}
