use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use clap::{Args, Parser, Subcommand, ValueEnum};
use epic_archive::date_range::parse_date;
use epic_archive::handler::{self, InvocationContext};
use epic_archive::result::Outcome;
use epic_archive::{
    Collection, DateInputs, DownloadPlan, DownloadResult, EnvDefaults, ImageRecord,
    MetadataSource, Settings, StorageOptions,
};
use serde_json::json;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(version, about = "Download NASA EPIC imagery to local disk and/or S3")]
struct Cli {
    /// Settings file (TOML)
    #[arg(long, global = true, env = "EPIC_CONFIG")]
    config: Option<PathBuf>,

    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Download every image in a date range
    Download(DownloadArgs),
    /// Show image metadata for a date, or the most recent images
    Metadata(MetadataArgs),
    /// List every date with imagery available
    Dates {
        #[arg(long, default_value = "natural")]
        collection: Collection,
    },
    /// Run the serverless handler against a JSON event file
    Invoke {
        #[arg(long)]
        event: PathBuf,
        /// Execution time left to the invocation
        #[arg(long, default_value_t = 900)]
        remaining_secs: u64,
    },
    /// Write a settings file with the default values
    InitConfig { path: PathBuf },
}

#[derive(Args, Debug)]
struct DownloadArgs {
    /// First day (YYYY-MM-DD)
    #[arg(long, requires = "end_date")]
    start_date: Option<String>,
    /// Last day (YYYY-MM-DD)
    #[arg(long, requires = "start_date")]
    end_date: Option<String>,
    /// A single day (YYYY-MM-DD)
    #[arg(long, conflicts_with_all = ["start_date", "end_date"])]
    date: Option<String>,
    /// Last day as an offset from today
    #[arg(long, allow_negative_numbers = true)]
    days_back: Option<i64>,
    /// Days before the last day to include
    #[arg(long, allow_negative_numbers = true)]
    date_range_days: Option<i64>,
    #[arg(long, default_value = "natural")]
    collection: Collection,
    /// png, jpg or thumbs (defaults to the settings file)
    #[arg(long)]
    format: Option<String>,
    /// S3 bucket to upload to
    #[arg(long)]
    bucket: Option<String>,
    /// Local directory to write to
    #[arg(long)]
    local_dir: Option<PathBuf>,
    /// Skip S3 even when a bucket is given
    #[arg(long)]
    local_only: bool,
    /// Key prefix inside the bucket (defaults to the settings file)
    #[arg(long)]
    key_prefix: Option<String>,
    /// Write the full result as JSON
    #[arg(long)]
    report: Option<PathBuf>,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum OutputFormat {
    Table,
    Json,
}

#[derive(Args, Debug)]
struct MetadataArgs {
    /// Day to list (YYYY-MM-DD); omit for the most recent images
    #[arg(long)]
    date: Option<String>,
    #[arg(long, default_value = "natural")]
    collection: Collection,
    #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
    output: OutputFormat,
    /// Also save the metadata as JSON
    #[arg(long)]
    output_file: Option<PathBuf>,
}

fn init_tracing(verbose: bool) {
    let json_format = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let default_level = if verbose { "epic_archive=debug" } else { "epic_archive=info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    if json_format {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let settings = match &cli.config {
        Some(path) => Settings::read(path)
            .with_context(|| format!("reading settings from {}", path.display()))?,
        None => Settings::default(),
    };

    match cli.command {
        Command::Download(args) => download(args, &settings).await,
        Command::Metadata(args) => metadata(args, &settings).await,
        Command::Dates { collection } => {
            let client = settings.epic_client()?;
            let dates = client.fetch_available_dates(collection).await?;
            for date in &dates {
                println!("{date}");
            }
            println!("{} dates with {} imagery", dates.len(), collection);
            Ok(ExitCode::SUCCESS)
        }
        Command::Invoke {
            event,
            remaining_secs,
        } => {
            let content = std::fs::read_to_string(&event)
                .with_context(|| format!("reading event from {}", event.display()))?;
            let event: serde_json::Value = serde_json::from_str(&content)?;
            let ctx = InvocationContext {
                request_id: format!("local-{}", Utc::now().timestamp_millis()),
                remaining: Duration::from_secs(remaining_secs),
            };
            let env = EnvDefaults::from_env()?;
            let response = handler::handle(event, &ctx, &env, &settings).await;
            println!("{}", serde_json::to_string_pretty(&response)?);
            Ok(if response["statusCode"] == 200 {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        Command::InitConfig { path } => {
            Settings::default().write(&path)?;
            println!("Wrote default settings to {}", path.display());
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn download(args: DownloadArgs, settings: &Settings) -> Result<ExitCode> {
    let env = EnvDefaults::from_env()?;
    let (start_date, end_date) = match &args.date {
        Some(day) => (Some(day.clone()), Some(day.clone())),
        None => (args.start_date.clone(), args.end_date.clone()),
    };
    let inputs = DateInputs {
        start_date,
        end_date,
        days_back: args.days_back,
        date_range_days: args.date_range_days,
        env: env.dates,
    };

    let storage = StorageOptions {
        local_dir: args.local_dir.clone(),
        bucket: args.bucket.clone(),
        local_only: args.local_only,
        key_prefix: args
            .key_prefix
            .clone()
            .unwrap_or_else(|| settings.key_prefix.clone()),
    };
    storage.check()?;

    let format = args.format.as_deref().unwrap_or(&settings.format);
    let plan = DownloadPlan::resolve(&inputs, Utc::now().date_naive(), args.collection, format)?
        .with_archive_url(&settings.archive_url);

    let client = settings.epic_client()?;
    let targets = storage.build_targets(&settings.s3).await?;
    let result = plan.execute(&client, &client, &targets).await;

    print_result(&result);
    if let Some(path) = &args.report {
        result.write(path)?;
        println!("Report written to {}", path.display());
    }

    Ok(if result.summary().nothing_succeeded() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

fn print_result(result: &DownloadResult) {
    for item in &result.items {
        let (mark, detail) = match &item.outcome {
            Outcome::Success => ("ok", join_locations(item)),
            Outcome::Partial => (
                "partial",
                format!(
                    "{} ({})",
                    join_locations(item),
                    item.storage_errors
                        .iter()
                        .map(|e| e.to_string())
                        .collect::<Vec<_>>()
                        .join("; ")
                ),
            ),
            Outcome::Failure { stage, reason } => ("failed", format!("{stage}: {reason}")),
        };
        println!("{:<8} {:<32} {}", mark, item.image, detail);
    }
    for failure in &result.date_failures {
        println!("{:<8} {:<32} {}", "skipped", failure.date, failure.reason);
    }

    let summary = result.summary();
    println!(
        "\nCompleted {} {}: {} attempted, {} stored ({} partial), {} failed, {} dates skipped",
        result.collection,
        result.range,
        summary.total_attempted,
        summary.total_succeeded,
        summary.total_partial,
        summary.total_failed,
        summary.date_failures,
    );
}

fn join_locations(item: &epic_archive::result::ItemEntry) -> String {
    item.locations
        .iter()
        .map(|l| l.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

async fn metadata(args: MetadataArgs, settings: &Settings) -> Result<ExitCode> {
    let client = settings.epic_client()?;
    let date: Option<NaiveDate> = args
        .date
        .as_deref()
        .map(|d| parse_date("date", d))
        .transpose()?;

    let records = match date {
        Some(date) => client.fetch(args.collection, date).await?,
        None => client.fetch_recent(args.collection).await?,
    };
    let label = date.map_or_else(|| "most recent".to_string(), |d| d.to_string());

    if records.is_empty() {
        println!("No {} images found for {}", args.collection, label);
        return Ok(ExitCode::SUCCESS);
    }

    let document = json!({
        "metadata": records,
        "total_images": records.len(),
        "date": label,
        "collection": args.collection,
    });

    match args.output {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&document)?),
        OutputFormat::Table => print_metadata_table(&records, args.collection, &label),
    }

    if let Some(path) = &args.output_file {
        std::fs::write(path, serde_json::to_string_pretty(&document)?)?;
        println!("Metadata saved to {}", path.display());
    }
    Ok(ExitCode::SUCCESS)
}

fn print_metadata_table(records: &[ImageRecord], collection: Collection, label: &str) {
    println!("EPIC {} images - {}", collection.description(), label);
    println!("{:<32} {:<44} {:<18} {}", "Image", "Caption", "Lat/Lon", "Version");
    for record in records {
        let caption = if record.caption.chars().count() > 40 {
            format!("{}...", record.caption.chars().take(40).collect::<String>())
        } else {
            record.caption.clone()
        };
        let position = record
            .centroid_coordinates
            .map(|c| format!("{:.2}, {:.2}", c.lat, c.lon))
            .unwrap_or_default();
        println!(
            "{:<32} {:<44} {:<18} {}",
            record.image, caption, position, record.version
        );
    }
}
