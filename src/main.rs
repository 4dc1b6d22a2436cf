use anyhow::bail;
use clap::Parser;
use hvac_sim::output::FileOutput;
use hvac_sim::{run_project, RunResults};
use std::ffi::OsStr;
use std::fs;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use tracing::{info, Level};
use tracing_subscriber::fmt::format::FmtSpan;

#[derive(Parser, Default, Debug)]
#[clap(author, version, about, long_about = None)]
struct HvacSimArgs {
    #[arg(help = "Path to the community configuration in .json format")]
    input_file: String,
    #[arg(help = "Path to the per-interval weather and PV series in .csv format")]
    weather_file: String,
    #[arg(
        long,
        short,
        help = "Directory for the result files (defaults to <input stem>__results)"
    )]
    output_dir: Option<PathBuf>,
    #[clap(
        long,
        default_value_t = false,
        help = "Run the day-ahead dispatch optimizer instead of the thermostat simulation"
    )]
    optimize: bool,
    #[clap(long, default_value_t = false, help = "Whether to log out spans")]
    log_spans: bool,
    #[clap(long, short, default_value_t = false, help = "Log at debug level")]
    verbose: bool,
}

fn main() -> anyhow::Result<()> {
    let args = HvacSimArgs::parse();

    // set up basic tracing
    let tracing_subscriber = {
        let level = if args.verbose {
            Level::DEBUG
        } else {
            Level::INFO
        };
        let mut builder = tracing_subscriber::fmt::fmt().with_max_level(level);

        if args.log_spans {
            builder = builder.with_span_events(FmtSpan::CLOSE);
        }

        builder.finish()
    };
    tracing::subscriber::set_global_default(tracing_subscriber)?;

    let input_path = Path::new(&args.input_file);
    let input_file_stem = input_path
        .file_stem()
        .and_then(OsStr::to_str)
        .unwrap_or("community");
    let output_path = args
        .output_dir
        .unwrap_or_else(|| input_path.with_file_name(format!("{input_file_stem}__results")));
    fs::create_dir_all(&output_path)?;
    info!(path = %output_path.display(), "writing results");

    let file_output = FileOutput::new(output_path, format!("{input_file_stem}__{{}}.csv"));

    let results = run_project(
        BufReader::new(File::open(input_path)?),
        BufReader::new(File::open(&args.weather_file)?),
        &file_output,
        args.optimize,
    )?;

    match results {
        RunResults::Simulation(results) if !results.failures.is_empty() => {
            bail!(
                "Simulation failed for {}",
                results
                    .failures
                    .keys()
                    .map(String::as_str)
                    .collect::<Vec<_>>()
                    .join(", ")
            )
        }
        RunResults::Dispatch(outcome) => match outcome.failure {
            Some(failure) => bail!(
                "Dispatch stopped at day {} after {} optimized days: {}",
                failure.day,
                outcome.days.len(),
                failure.error
            ),
            None => Ok(()),
        },
        RunResults::Simulation(_) => Ok(()),
    }
}
