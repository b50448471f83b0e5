//! Serverless entry point: a JSON event in, a JSON response out.
use crate::collection::Collection;
use crate::date_range::{DateInputs, DateRange};
use crate::download_plan::DownloadPlan;
use crate::error::ValidationError;
use crate::result::DownloadResult;
use crate::settings::{is_truthy, EnvDefaults, Settings, StorageOptions};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{error, info, warn};

pub const MAX_RECOMMENDED_DAYS: u64 = 3;
pub const ESTIMATED_SECONDS_PER_DAY: u64 = 45;

#[derive(Deserialize, Debug, Default, Clone, PartialEq)]
#[serde(default)]
pub struct EventParams {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    #[serde(deserialize_with = "lenient_int")]
    pub days_back: Option<i64>,
    #[serde(deserialize_with = "lenient_int")]
    pub date_range_days: Option<i64>,
    pub bucket: Option<String>,
    pub collection: Option<String>,
    pub local_dir: Option<String>,
    #[serde(deserialize_with = "lenient_bool")]
    pub local_only: Option<bool>,
    pub format: Option<String>,
    pub key_prefix: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Lenient<T> {
    Value(T),
    Text(String),
}

// Schedulers often send numbers and flags as strings.
fn lenient_int<'de, D: Deserializer<'de>>(d: D) -> Result<Option<i64>, D::Error> {
    match Option::<Lenient<i64>>::deserialize(d)? {
        None => Ok(None),
        Some(Lenient::Value(n)) => Ok(Some(n)),
        Some(Lenient::Text(s)) if s.trim().is_empty() => Ok(None),
        Some(Lenient::Text(s)) => s
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| serde::de::Error::custom(format!("'{s}' is not an integer"))),
    }
}

fn lenient_bool<'de, D: Deserializer<'de>>(d: D) -> Result<Option<bool>, D::Error> {
    Ok(match Option::<Lenient<bool>>::deserialize(d)? {
        None => None,
        Some(Lenient::Value(b)) => Some(b),
        Some(Lenient::Text(s)) => Some(is_truthy(&s)),
    })
}

#[derive(Debug, Clone)]
pub struct InvocationContext {
    pub request_id: String,
    pub remaining: Duration,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error(
    "date range too large ({days} days), may exceed the remaining {remaining_secs}s; \
     maximum recommended is {} days per invocation",
    MAX_RECOMMENDED_DAYS
)]
pub struct RangeTooLarge {
    pub days: u64,
    pub remaining_secs: u64,
}

/// A validated batch, ready to run.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub plan: DownloadPlan,
    pub storage: StorageOptions,
}

/// Merges event parameters over environment fallbacks and resolves the range.
pub fn prepare(
    event: &EventParams,
    env: &EnvDefaults,
    settings: &Settings,
    today: NaiveDate,
) -> Result<Invocation, ValidationError> {
    let collection: Collection = match event.collection.as_ref().or(env.collection.as_ref()) {
        Some(name) => name.parse()?,
        None => Collection::default(),
    };

    let inputs = DateInputs {
        start_date: event.start_date.clone(),
        end_date: event.end_date.clone(),
        days_back: event.days_back,
        date_range_days: event.date_range_days,
        env: env.dates.clone(),
    };

    let storage = StorageOptions {
        local_dir: event
            .local_dir
            .clone()
            .or_else(|| env.local_dir.clone())
            .map(PathBuf::from),
        bucket: event.bucket.clone().or_else(|| env.bucket.clone()),
        local_only: event.local_only.unwrap_or(env.local_only),
        key_prefix: event
            .key_prefix
            .clone()
            .unwrap_or_else(|| settings.key_prefix.clone()),
    };
    storage.check()?;

    let format = event.format.as_deref().unwrap_or(&settings.format);
    let plan = DownloadPlan::resolve(&inputs, today, collection, format)?
        .with_archive_url(&settings.archive_url);
    Ok(Invocation { plan, storage })
}

/// Warns when the range might outlive the invocation, and refuses ranges larger
/// than [`MAX_RECOMMENDED_DAYS`] in that situation.
pub fn check_deadline(range: DateRange, remaining: Duration) -> Result<(), RangeTooLarge> {
    let days = range.num_days();
    let estimated = days * ESTIMATED_SECONDS_PER_DAY;
    let budget = remaining.as_secs_f64() * 0.8;

    if (estimated as f64) <= budget {
        return Ok(());
    }
    warn!(
        days,
        estimated_secs = estimated,
        remaining_secs = remaining.as_secs(),
        "date range may exceed the invocation time limit"
    );
    if days > MAX_RECOMMENDED_DAYS {
        return Err(RangeTooLarge {
            days,
            remaining_secs: remaining.as_secs(),
        });
    }
    Ok(())
}

pub async fn handle(
    event: Value,
    ctx: &InvocationContext,
    env: &EnvDefaults,
    settings: &Settings,
) -> Value {
    let started_at = Utc::now();
    let clock = Instant::now();
    info!(request_id = %ctx.request_id, %event, "invocation started");

    match run(event, ctx, env, settings).await {
        Ok(result) => {
            let response = success_response(&result, ctx, started_at, clock.elapsed());
            info!(
                elapsed_secs = clock.elapsed().as_secs_f64(),
                images = result.summary().total_succeeded,
                "invocation finished"
            );
            response
        }
        Err(e) => {
            error!("invocation failed: {e:#}");
            error_response(&e, ctx, started_at, clock.elapsed())
        }
    }
}

async fn run(
    event: Value,
    ctx: &InvocationContext,
    env: &EnvDefaults,
    settings: &Settings,
) -> anyhow::Result<DownloadResult> {
    let params: EventParams = serde_json::from_value(event)?;
    let invocation = prepare(&params, env, settings, Utc::now().date_naive())?;
    check_deadline(invocation.plan.range(), ctx.remaining)?;

    let client = settings.epic_client()?;
    let targets = invocation.storage.build_targets(&settings.s3).await?;
    Ok(invocation.plan.execute(&client, &client, &targets).await)
}

fn timing(started_at: DateTime<Utc>, elapsed: Duration) -> Value {
    let elapsed_delta =
        chrono::Duration::from_std(elapsed).unwrap_or_else(|_| chrono::Duration::zero());
    let ended_at = started_at + elapsed_delta;
    json!({
        "execution_time_seconds": (elapsed.as_secs_f64() * 100.0).round() / 100.0,
        "start_time": started_at.to_rfc3339(),
        "end_time": ended_at.to_rfc3339(),
    })
}

pub fn success_response(
    result: &DownloadResult,
    ctx: &InvocationContext,
    started_at: DateTime<Utc>,
    elapsed: Duration,
) -> Value {
    let summary = result.summary();
    let success = !summary.nothing_succeeded();
    let message = if success {
        format!(
            "Downloaded {} {} images for {}",
            summary.total_succeeded, result.collection, result.range
        )
    } else {
        format!("No {} images were stored for {}", result.collection, result.range)
    };

    let mut details = timing(started_at, elapsed);
    details["request_id"] = json!(ctx.request_id);
    details["images_downloaded"] = json!(summary.total_succeeded);
    details["images_partial"] = json!(summary.total_partial);
    details["images_failed"] = json!(summary.total_failed);
    details["date_failures"] = json!(summary.date_failures);

    json!({
        "statusCode": 200,
        "success": success,
        "message": message,
        "details": details,
        "summary": summary,
        "result": result,
    })
}

pub fn error_response(
    err: &anyhow::Error,
    ctx: &InvocationContext,
    started_at: DateTime<Utc>,
    elapsed: Duration,
) -> Value {
    let error_type = if err.is::<ValidationError>() {
        "ValidationError"
    } else if err.is::<RangeTooLarge>() {
        "RangeTooLarge"
    } else if err.is::<serde_json::Error>() {
        "InvalidEvent"
    } else {
        "Error"
    };

    let mut details = timing(started_at, elapsed);
    details["request_id"] = json!(ctx.request_id);
    details["error_type"] = json!(error_type);
    details["error_message"] = json!(format!("{err:#}"));

    json!({
        "statusCode": 500,
        "success": false,
        "error": err.to_string(),
        "details": details,
    })
}
