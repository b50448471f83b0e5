use crate::error::ValidationError;
use chrono::{Days, NaiveDate};
use serde::Serialize;
use tracing::{debug, warn};

const DATE_FORMAT: &str = "%Y-%m-%d";
const DEFAULT_DAYS_BACK: i64 = 1;

/// An inclusive span of calendar days, `start <= end`.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, ValidationError> {
        Self::checked(start, end, "start_date", "end_date")
    }

    pub fn single(day: NaiveDate) -> Self {
        Self {
            start: day,
            end: day,
        }
    }

    fn checked(
        start: NaiveDate,
        end: NaiveDate,
        start_field: &'static str,
        end_field: &'static str,
    ) -> Result<Self, ValidationError> {
        if start > end {
            return Err(ValidationError::StartAfterEnd {
                start_field,
                end_field,
                start,
                end,
            });
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    pub fn num_days(&self) -> u64 {
        (self.end - self.start).num_days() as u64 + 1
    }

    /// Every day in the range, ascending.
    pub fn days(&self) -> impl Iterator<Item = NaiveDate> {
        let end = self.end;
        self.start.iter_days().take_while(move |day| *day <= end)
    }
}

/// `START_DATE`, `END_DATE` and `DAYS_BACK` as read from the process environment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvDates {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub days_back: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DateInputs {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub days_back: Option<i64>,
    pub date_range_days: Option<i64>,
    pub env: EnvDates,
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RangeSource {
    Explicit,
    Relative,
    Environment,
    Default,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedRange {
    pub range: DateRange,
    pub source: RangeSource,
}

/// Picks the date range from the highest-priority input that is present:
/// explicit dates, then relative offsets, then environment dates, then
/// `today - DAYS_BACK` (yesterday unless overridden).
pub fn resolve(inputs: &DateInputs, today: NaiveDate) -> Result<ResolvedRange, ValidationError> {
    let explicit = (present(&inputs.start_date), present(&inputs.end_date));
    if let Some(range) = explicit_pair(explicit, "start_date", "end_date")? {
        debug!(%range.start, %range.end, "using explicit date range");
        return Ok(ResolvedRange {
            range,
            source: RangeSource::Explicit,
        });
    }

    if inputs.days_back.is_some() || inputs.date_range_days.is_some() {
        let days_back = non_negative("days_back", inputs.days_back.unwrap_or(DEFAULT_DAYS_BACK))?;
        let span = non_negative("date_range_days", inputs.date_range_days.unwrap_or(0))?;
        let end = days_before(today, days_back, "days_back")?;
        let start = days_before(end, span, "date_range_days")?;
        debug!(days_back, span, %start, %end, "using relative date range");
        return Ok(ResolvedRange {
            range: DateRange::checked(start, end, "date_range_days", "days_back")?,
            source: RangeSource::Relative,
        });
    }

    let env = (present(&inputs.env.start_date), present(&inputs.env.end_date));
    if let Some(range) = explicit_pair(env, "START_DATE", "END_DATE")? {
        debug!(%range.start, %range.end, "using environment date range");
        return Ok(ResolvedRange {
            range,
            source: RangeSource::Environment,
        });
    }

    let days_back = non_negative("DAYS_BACK", inputs.env.days_back.unwrap_or(DEFAULT_DAYS_BACK))?;
    let day = days_before(today, days_back, "DAYS_BACK")?;
    debug!(%day, days_back, "using default date");
    Ok(ResolvedRange {
        range: DateRange::single(day),
        source: RangeSource::Default,
    })
}

pub fn parse_date(field: &'static str, value: &str) -> Result<NaiveDate, ValidationError> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT).map_err(|_| {
        ValidationError::MalformedDate {
            field,
            value: value.to_string(),
        }
    })
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}

fn explicit_pair(
    pair: (Option<&str>, Option<&str>),
    start_field: &'static str,
    end_field: &'static str,
) -> Result<Option<DateRange>, ValidationError> {
    match pair {
        (Some(start), Some(end)) => {
            let start = parse_date(start_field, start)?;
            let end = parse_date(end_field, end)?;
            DateRange::checked(start, end, start_field, end_field).map(Some)
        }
        (Some(_), None) => {
            warn!("{start_field} given without {end_field}, ignoring it");
            Ok(None)
        }
        (None, Some(_)) => {
            warn!("{end_field} given without {start_field}, ignoring it");
            Ok(None)
        }
        (None, None) => Ok(None),
    }
}

fn non_negative(field: &'static str, value: i64) -> Result<u64, ValidationError> {
    u64::try_from(value).map_err(|_| ValidationError::Negative { field, value })
}

fn days_before(
    day: NaiveDate,
    count: u64,
    field: &'static str,
) -> Result<NaiveDate, ValidationError> {
    day.checked_sub_days(Days::new(count))
        .ok_or(ValidationError::OutOfRange { field, value: count })
}

impl std::fmt::Display for DateRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.start == self.end {
            write!(f, "{}", self.start)
        } else {
            write!(f, "{} to {}", self.start, self.end)
        }
    }
}
