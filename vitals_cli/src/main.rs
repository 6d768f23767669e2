use chrono::{DateTime, Local, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use vitals_core::aggregate::{daily_summary, DailySummary};
use vitals_core::config::PlatformKind;
use vitals_core::platform::health_connect::HealthConnect;
use vitals_core::platform::healthkit::HealthKit;
use vitals_core::simulator::{SimulatedHealthConnect, SimulatedHealthKit};
use vitals_core::*;

#[derive(Parser)]
#[command(name = "vitals")]
#[command(about = "Health data normalization and workout sessions", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Override data directory of the simulated store
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Backend to use (auto, health-connect, healthkit, unsupported)
    #[arg(long, global = true)]
    platform: Option<PlatformKind>,

    /// Load configuration from this file instead of the default path
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Permission identifier the simulated user declines (repeatable)
    #[arg(long, global = true)]
    deny: Vec<String>,

    /// Log at debug level
    #[arg(long, short, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the selected platform and whether health data is available
    Status,

    /// Request read and/or write access
    Permissions {
        /// Metric to read (repeatable)
        #[arg(long)]
        read: Vec<MetricKind>,

        /// Metric to write (repeatable)
        #[arg(long)]
        write: Vec<MetricKind>,

        /// Also ask for history beyond the default window
        #[arg(long)]
        full_history: bool,
    },

    /// Print records of one metric as JSON lines, newest first
    Read {
        kind: MetricKind,

        /// Last local day to include (defaults to today)
        #[arg(long)]
        date: Option<NaiveDate>,

        /// Number of days ending at --date
        #[arg(long, default_value_t = 1)]
        days: u32,
    },

    /// Write one record
    Write {
        #[command(subcommand)]
        record: WriteCommand,
    },

    /// Daily totals and the afternoon exercise heart rate, as JSON
    Summary {
        #[arg(long)]
        date: Option<NaiveDate>,
    },

    /// Run a live workout session and save it when it ends
    Session {
        #[arg(long)]
        activity: ActivityType,

        /// How long to keep the session open
        #[arg(long, default_value_t = 0)]
        seconds: u64,
    },

    /// Append every metric in a date range to a CSV file
    Export {
        #[arg(long)]
        out: PathBuf,

        #[arg(long)]
        date: Option<NaiveDate>,

        #[arg(long, default_value_t = 1)]
        days: u32,
    },
}

#[derive(Subcommand)]
enum WriteCommand {
    Steps {
        #[arg(long)]
        count: u64,
        #[arg(long)]
        start: DateTime<Utc>,
        #[arg(long)]
        end: DateTime<Utc>,
    },
    Weight {
        /// Kilograms
        #[arg(long)]
        kg: f64,
        #[arg(long)]
        at: Option<DateTime<Utc>>,
    },
    Height {
        /// Centimeters
        #[arg(long)]
        cm: f64,
        #[arg(long)]
        at: Option<DateTime<Utc>>,
    },
    Calories {
        /// Kilocalories
        #[arg(long)]
        kcal: f64,
        #[arg(long)]
        start: DateTime<Utc>,
        #[arg(long)]
        end: DateTime<Utc>,
    },
    HeartRate {
        #[arg(long)]
        bpm: f64,
        #[arg(long)]
        at: Option<DateTime<Utc>>,
    },
    Workout {
        #[arg(long)]
        activity: ActivityType,
        #[arg(long)]
        start: DateTime<Utc>,
        #[arg(long)]
        end: DateTime<Utc>,
        #[arg(long)]
        title: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.verbose {
        vitals_core::logging::init_with_level("debug");
    } else {
        vitals_core::logging::init();
    }

    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    if let Some(kind) = cli.platform {
        config.platform.kind = kind;
    }
    if let Some(dir) = &cli.data_dir {
        config.simulator.data_dir = dir.clone();
    }
    config.simulator.deny.extend(cli.deny.iter().cloned());

    let platform = config.platform.kind.resolve();
    let service = build_service(platform, &config)?;

    if !service.is_supported() {
        println!(
            "Health data is not available on this platform ({}).",
            std::env::consts::OS
        );
        return Ok(());
    }

    // Ctrl-C cancels whatever is in flight
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            trigger.cancel();
        }
    });

    match cli.command {
        Commands::Status => cmd_status(service.as_ref(), &config),
        Commands::Permissions {
            read,
            write,
            full_history,
        } => cmd_permissions(service.as_ref(), &read, &write, full_history, &cancel).await,
        Commands::Read { kind, date, days } => {
            cmd_read(service.as_ref(), kind, date, days, &cancel).await
        }
        Commands::Write { record } => cmd_write(service.as_ref(), record, &cancel).await,
        Commands::Summary { date } => cmd_summary(service.as_ref(), date, &cancel).await,
        Commands::Session { activity, seconds } => {
            cmd_session(service.as_ref(), activity, seconds, &cancel).await
        }
        Commands::Export { out, date, days } => {
            cmd_export(service.as_ref(), out, date, days, &cancel).await
        }
    }
}

fn build_service(platform: HostPlatform, config: &Config) -> Result<Arc<dyn HealthService>> {
    let sim = &config.simulator;
    select_service(
        platform,
        || {
            let store =
                SimulatedHealthConnect::open(&sim.data_dir)?.with_deny(sim.deny.iter().cloned());
            Ok(HealthConnect::new(Arc::new(store)))
        },
        || {
            let store =
                SimulatedHealthKit::open(&sim.data_dir)?.with_deny(sim.deny.iter().cloned());
            Ok(HealthKit::new(Arc::new(store)).with_live_sessions(sim.live_sessions))
        },
        ServiceSettings::from(config),
    )
}

fn cmd_status(service: &dyn HealthService, config: &Config) -> Result<()> {
    let platform = service.platform();
    println!("Platform: {} ({})", platform, platform.store_name());
    println!("Supported: {}", service.is_supported());
    println!("Data dir: {}", config.simulator.data_dir.display());
    println!("Session active: {}", service.is_workout_session_active());
    Ok(())
}

async fn cmd_permissions(
    service: &dyn HealthService,
    read: &[MetricKind],
    write: &[MetricKind],
    full_history: bool,
    cancel: &CancellationToken,
) -> Result<()> {
    let permissions: Vec<HealthPermission> = read
        .iter()
        .map(|kind| HealthPermission::read(kind.data_type()))
        .chain(
            write
                .iter()
                .map(|kind| HealthPermission::write(kind.data_type())),
        )
        .collect();

    if permissions.is_empty() {
        println!("Nothing to request. Use --read or --write.");
        return Ok(());
    }

    let result = service
        .request_permissions(&permissions, full_history, cancel)
        .await?;

    match &result.error {
        None => println!("✓ All permissions granted"),
        Some(PermissionError::MissingPermissions(denied)) => {
            println!("✗ Permissions denied:");
            for id in denied {
                println!("  - {}", id);
            }
        }
        Some(error) => println!("✗ {}", error),
    }
    Ok(())
}

fn day_range(date: Option<NaiveDate>, days: u32) -> Result<HealthTimeRange> {
    let last = date.unwrap_or_else(|| Local::now().date_naive());
    let first = last - chrono::Duration::days(i64::from(days.max(1)) - 1);
    let start = HealthTimeRange::for_local_day(first)?;
    let end = HealthTimeRange::for_local_day(last)?;
    HealthTimeRange::new(start.start(), end.end())
}

async fn cmd_read(
    service: &dyn HealthService,
    kind: MetricKind,
    date: Option<NaiveDate>,
    days: u32,
    cancel: &CancellationToken,
) -> Result<()> {
    let range = day_range(date, days)?;
    let records = service.read_records(kind, &range, cancel).await?;
    for record in &records {
        println!("{}", serde_json::to_string(record)?);
    }
    tracing::info!("Read {} {} records", records.len(), kind);
    Ok(())
}

fn now() -> DateTime<Utc> {
    Utc::now()
}

async fn cmd_write(
    service: &dyn HealthService,
    record: WriteCommand,
    cancel: &CancellationToken,
) -> Result<()> {
    const ORIGIN: &str = "vitals-cli";

    let record: HealthRecord = match record {
        WriteCommand::Steps { count, start, end } => Steps::new(ORIGIN, count, start, end).into(),
        WriteCommand::Weight { kg, at } => Weight::new(ORIGIN, kg, at.unwrap_or_else(now)).into(),
        WriteCommand::Height { cm, at } => Height::new(ORIGIN, cm, at.unwrap_or_else(now)).into(),
        WriteCommand::Calories { kcal, start, end } => {
            ActiveCaloriesBurned::new(ORIGIN, kcal, start, end).into()
        }
        WriteCommand::HeartRate { bpm, at } => {
            HeartRate::new(ORIGIN, bpm, at.unwrap_or_else(now)).into()
        }
        WriteCommand::Workout {
            activity,
            start,
            end,
            title,
        } => {
            let workout = Workout::new(ORIGIN, activity, start, end);
            let workout = match title {
                Some(title) => workout.with_title(title),
                None => workout,
            };
            workout.into()
        }
    };

    let kind = record.kind();
    if service.write_record(&record, cancel).await? {
        println!("✓ Wrote {} record", kind);
        Ok(())
    } else {
        Err(Error::Write(format!("{} record was not saved", kind)))
    }
}

async fn read_typed<M: HealthMetric>(
    service: &dyn HealthService,
    range: &HealthTimeRange,
    cancel: &CancellationToken,
) -> Result<Vec<M>> {
    let records: Vec<M> = service.get_health_data(range, cancel).await?;
    Ok(records)
}

async fn cmd_summary(
    service: &dyn HealthService,
    date: Option<NaiveDate>,
    cancel: &CancellationToken,
) -> Result<()> {
    let date = date.unwrap_or_else(|| Local::now().date_naive());
    let day = HealthTimeRange::for_local_day(date)?;

    let exercise = match (date.and_hms_opt(14, 0, 0), date.and_hms_opt(17, 0, 0)) {
        (Some(start), Some(end)) => HealthTimeRange::from_local(start, end)?,
        _ => return Err(Error::InvalidTimeRange(format!("no afternoon on {}", date))),
    };

    let steps: Vec<Steps> = read_typed(service, &day, cancel).await?;
    let calories: Vec<ActiveCaloriesBurned> = read_typed(service, &day, cancel).await?;
    let weights: Vec<Weight> = read_typed(service, &day, cancel).await?;
    let heart_rate: Vec<HeartRate> = read_typed(service, &day, cancel).await?;
    let workouts: Vec<Workout> = read_typed(service, &day, cancel).await?;

    let summary: DailySummary =
        daily_summary(&steps, &calories, &weights, &heart_rate, &exercise, workouts);
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

async fn cmd_session(
    service: &dyn HealthService,
    activity: ActivityType,
    seconds: u64,
    cancel: &CancellationToken,
) -> Result<()> {
    if !service.start_workout_session(activity, cancel).await? {
        println!(
            "✗ Could not start a {} session on {}",
            activity,
            service.platform().store_name()
        );
        return Ok(());
    }
    println!("Started {} session", activity);

    if seconds > 0 {
        // Ctrl-C ends the session early rather than discarding it
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_secs(seconds)) => {}
            _ = cancel.cancelled() => println!("Interrupted, ending session"),
        }
    }

    // A fresh token so an interrupt still saves the workout
    match service.end_workout_session(&CancellationToken::new()).await? {
        Some(workout) => {
            println!("✓ Workout saved");
            println!("{}", serde_json::to_string_pretty(&workout)?);
        }
        None => println!("✗ Workout could not be saved"),
    }
    Ok(())
}

async fn cmd_export(
    service: &dyn HealthService,
    out: PathBuf,
    date: Option<NaiveDate>,
    days: u32,
    cancel: &CancellationToken,
) -> Result<()> {
    let range = day_range(date, days)?;
    let mut records = Vec::new();
    for kind in MetricKind::ALL {
        records.extend(service.read_records(kind, &range, cancel).await?);
    }

    let count = write_csv(&records, &out)?;
    println!("✓ Exported {} records", count);
    println!("  CSV: {}", out.display());
    Ok(())
}
