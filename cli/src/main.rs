use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use parcelflow::bootstrap;
use parcelflow::commands;
use parcelflow_core::pipeline::WorkerOptions;
use parcelflow_core::{Center, Config, SimulatorConfig};

#[derive(Parser)]
#[command(name = "parcelflow")]
#[command(about = "Track parcels through a network of sorting centers", long_about = None)]
struct Cli {
    /// Configuration file (TOML)
    #[arg(short, long, default_value = "parcelflow.toml")]
    config: PathBuf,

    /// Console log level
    #[arg(short = 'l', long = "log_level", default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate simulated barcode-scan events
    Simulate {
        /// Total simulated running time (minutes, e.g. 1440 = 1 day)
        #[arg(short = 's', long = "simulated_run_time", default_value_t = 1440)]
        simulated_run_time: i64,

        /// Minutes over which package intakes are spread
        #[arg(short = 'i', long = "intake_run_time", default_value_t = 300)]
        intake_run_time: i64,

        /// Total number of packages to simulate
        #[arg(short = 'p', long = "package_count", default_value_t = 1)]
        package_count: u32,

        /// Number of packages to delay en route
        #[arg(short = 'd', long = "delayed_package_count", default_value_t = 0)]
        delayed_package_count: u32,

        /// Number of packages to lose en route (at most the delayed count)
        #[arg(long = "lost_package_count", default_value_t = 0)]
        lost_package_count: u32,

        /// RNG seed; identical seeds reproduce identical output
        #[arg(long)]
        seed: Option<u64>,

        /// Simulated epoch seconds of the first intake; defaults to now
        #[arg(long = "simulated_start_time")]
        simulated_start_time: Option<i64>,

        /// Run the simulation
        #[arg(short = 't', long)]
        test: bool,

        /// Emit JSON lines instead of debug formatting
        #[arg(short = 'j', long = "json_output")]
        json_output: bool,
    },

    /// Import a JSON-lines event file into the per-center input streams
    Import {
        /// Stream system endpoint
        #[arg(short, long, default_value = "tcp://127.0.0.1:9090")]
        uri: String,

        /// Scope holding the streams and tables
        #[arg(long)]
        scope: String,

        /// File to import; use - for stdin
        #[arg(short, long = "import_file")]
        import_file: String,

        /// Drop the scope's streams and tables first
        #[arg(long = "purge_scope")]
        purge_scope: bool,

        /// Delete the shared coordination keys first
        #[arg(long = "purge_coordination")]
        purge_coordination: bool,
    },

    /// Process all tracking events for one sorting center
    SortingCenter {
        /// Stream system endpoint
        #[arg(short, long, default_value = "tcp://127.0.0.1:9090")]
        uri: String,

        /// Scope holding the streams and tables
        #[arg(long)]
        scope: String,

        /// The sorting center code (A, B, C, or D)
        #[arg(short = 's', long = "sorting_center_code")]
        sorting_center_code: Center,

        /// Run the sorting center worker
        #[arg(short = 'r', long)]
        run: bool,

        /// Maximum number of events to process (testing aid)
        #[arg(short = 'm', long = "maximum_event_count")]
        maximum_event_count: Option<u64>,

        /// Log a progress line every N events
        #[arg(long = "mark_event_index_frequency", default_value_t = 0)]
        mark_event_index_frequency: u64,

        /// Keep waiting until at least one event arrives
        #[arg(short = 'w', long = "wait_for_events")]
        wait_for_events: bool,

        /// Have this worker report lost packages once its stream drains
        #[arg(long = "report_lost_packages")]
        report_lost_packages: bool,

        /// Extract events for only this package instead of running
        #[arg(short = 'p', long = "package_id")]
        package_id: Option<String>,
    },

    /// Tail the trouble stream and report lost, late, and delayed packages
    TroubleReporter {
        /// Stream system endpoint
        #[arg(short, long, default_value = "tcp://127.0.0.1:9090")]
        uri: String,

        /// Scope holding the streams and tables
        #[arg(long)]
        scope: String,

        /// Run the trouble reporter
        #[arg(short = 'r', long)]
        run: bool,

        /// Keep waiting until at least one event arrives
        #[arg(short = 'w', long = "wait_for_events")]
        wait_for_events: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    bootstrap::init_tracing(&cli.log_level);
    let config = Config::from_file_or_default(&cli.config);
    config.validate()?;

    match cli.command {
        Commands::Simulate {
            simulated_run_time,
            intake_run_time,
            package_count,
            delayed_package_count,
            lost_package_count,
            seed,
            simulated_start_time,
            test,
            json_output,
        } => {
            if !test {
                anyhow::bail!("pass --test to run the simulation");
            }
            let simulated_start_time = simulated_start_time.unwrap_or_else(wall_clock_seconds);
            let seed = seed.unwrap_or_else(|| rand::random());
            commands::simulate(
                SimulatorConfig {
                    simulated_run_time_mins: simulated_run_time,
                    intake_run_time_mins: intake_run_time,
                    package_count,
                    delayed_package_count,
                    lost_package_count,
                    simulated_start_time,
                    seed,
                },
                json_output,
            )?;
        }

        Commands::Import {
            uri,
            scope,
            import_file,
            purge_scope,
            purge_coordination,
        } => {
            let backends = bootstrap::connect(&config, Some(&uri))?;
            commands::import(&backends, &scope, &import_file, purge_scope, purge_coordination)
                .await?;
        }

        Commands::SortingCenter {
            uri,
            scope,
            sorting_center_code,
            run,
            maximum_event_count,
            mark_event_index_frequency,
            wait_for_events,
            report_lost_packages,
            package_id,
        } => {
            let backends = bootstrap::connect(&config, Some(&uri))?;
            if let Some(package_id) = package_id {
                commands::extract_package(
                    &backends,
                    &config,
                    &scope,
                    sorting_center_code,
                    &package_id,
                )
                .await?;
            } else if run {
                let options = WorkerOptions {
                    center: sorting_center_code,
                    scope,
                    wait_for_events,
                    maximum_event_count,
                    mark_event_index_frequency,
                    report_lost_packages,
                };
                commands::run_sorting_center(&backends, &config, options).await?;
            } else {
                anyhow::bail!("pass --run to process events, or --package_id to extract one package");
            }
        }

        Commands::TroubleReporter {
            uri,
            scope,
            run,
            wait_for_events,
        } => {
            if !run {
                anyhow::bail!("pass --run to start the trouble reporter");
            }
            let backends = bootstrap::connect(&config, Some(&uri))?;
            commands::run_trouble_reporter(&backends, &config, &scope, wait_for_events).await?;
        }
    }

    Ok(())
}

fn wall_clock_seconds() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
