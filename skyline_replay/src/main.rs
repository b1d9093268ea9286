// CLI entry point for the Skyline replay tool.
//
// Reads a `channel:json` event log from a file or stdin, runs it through the
// city mirror, and prints a summary. See `replay.rs` for the two timing
// modes.
//
// Usage:
//   skyline-replay [OPTIONS]
//     --input <PATH>      Event log (default: stdin)
//     --config <PATH>     Mirror config JSON (default: built-in defaults)
//     --seed <N>          Override the config's PRNG seed
//     --gap-ms <MS>       Virtual time between log lines (default: 100)
//     --drain-ms <MS>     Virtual time to run after the log ends (default: 6000)
//     --live              Apply lines as they arrive, ticking in real time
//     --csv <PATH>        Write the chart buffers to a CSV file
//
// Log verbosity follows `RUST_LOG` (default `info`); logs go to stderr so
// the summary on stdout stays clean.

use std::fs::{self, File};
use std::io::{self, BufRead, BufReader};
use std::path::PathBuf;
use std::process::ExitCode;

use tracing_subscriber::EnvFilter;

use skyline_replay::csv::export_csv;
use skyline_replay::{ReplayConfig, ReplayError, run_live, run_virtual};
use skyline_sim::{EventReconciler, MirrorConfig, RecordingSurface};

#[derive(Debug, Default)]
struct Args {
    input: Option<PathBuf>,
    config: Option<PathBuf>,
    seed: Option<u64>,
    live: bool,
    csv: Option<PathBuf>,
    replay: ReplayConfig,
}

fn main() -> ExitCode {
    let args = parse_args();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("skyline-replay: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<(), ReplayError> {
    let mut config = match &args.config {
        Some(path) => {
            let json = fs::read_to_string(path).map_err(|source| ReplayError::Read {
                path: path.clone(),
                source,
            })?;
            MirrorConfig::from_json(&json)?
        }
        None => MirrorConfig::default(),
    };
    if let Some(seed) = args.seed {
        config.seed = seed;
    }
    let metrics = config.metrics.clone();

    let input: Box<dyn BufRead + Send> = match &args.input {
        Some(path) => {
            let file = File::open(path).map_err(|source| ReplayError::Read {
                path: path.clone(),
                source,
            })?;
            Box::new(BufReader::new(file))
        }
        None => Box::new(BufReader::new(io::stdin())),
    };

    let mut mirror = EventReconciler::new(config, RecordingSurface::new());
    let summary = if args.live {
        run_live(input, &mut mirror, &args.replay)?
    } else {
        run_virtual(input, &mut mirror, &args.replay)
    };
    print!("{summary}");
    println!("{} objects on screen", mirror.surface().live_count());

    if let Some(path) = &args.csv {
        let rows = export_csv(mirror.series(), &metrics, path)?;
        println!("wrote {rows} chart rows to {}", path.display());
    }
    Ok(())
}

/// Parse command-line arguments. Uses simple `std::env::args()` matching,
/// no clap dependency.
fn parse_args() -> Args {
    let mut args = Args::default();
    let argv: Vec<String> = std::env::args().collect();
    let mut i = 1;

    while i < argv.len() {
        match argv[i].as_str() {
            "--input" => {
                i += 1;
                args.input = Some(path_arg(&argv, i, "--input"));
            }
            "--config" => {
                i += 1;
                args.config = Some(path_arg(&argv, i, "--config"));
            }
            "--csv" => {
                i += 1;
                args.csv = Some(path_arg(&argv, i, "--csv"));
            }
            "--seed" => {
                i += 1;
                args.seed = Some(number_arg(&argv, i, "--seed"));
            }
            "--gap-ms" => {
                i += 1;
                args.replay.gap_ms = number_arg(&argv, i, "--gap-ms");
            }
            "--drain-ms" => {
                i += 1;
                args.replay.drain_ms = number_arg(&argv, i, "--drain-ms");
            }
            "--live" => args.live = true,
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            other => {
                eprintln!("Unknown argument: {other}");
                print_usage();
                std::process::exit(1);
            }
        }
        i += 1;
    }

    args
}

fn path_arg(argv: &[String], i: usize, flag: &str) -> PathBuf {
    argv.get(i).map(PathBuf::from).unwrap_or_else(|| {
        eprintln!("{flag} requires a path");
        std::process::exit(1);
    })
}

fn number_arg(argv: &[String], i: usize, flag: &str) -> u64 {
    argv.get(i).and_then(|s| s.parse().ok()).unwrap_or_else(|| {
        eprintln!("{flag} requires a non-negative integer");
        std::process::exit(1);
    })
}

fn print_usage() {
    println!("Usage: skyline-replay [OPTIONS]");
    println!();
    println!("Options:");
    println!("  --input <PATH>      Event log (default: stdin)");
    println!("  --config <PATH>     Mirror config JSON (default: built-in defaults)");
    println!("  --seed <N>          Override the config's PRNG seed");
    println!("  --gap-ms <MS>       Virtual time between log lines (default: 100)");
    println!("  --drain-ms <MS>     Virtual time to run after the log ends (default: 6000)");
    println!("  --live              Apply lines as they arrive, ticking in real time");
    println!("  --csv <PATH>        Write the chart buffers to a CSV file");
    println!("  --help, -h          Show this help");
}
