//! Date and time facts: the current date, and days left until an event.
//!
//! Everything is computed in local wall-clock time.

use async_trait::async_trait;
use chrono::{Local, NaiveDate, NaiveDateTime, NaiveTime};
use retrievalbot_core::error::ToolError;
use retrievalbot_core::tool::{Tool, ToolResult};

/// Long date, e.g. `Sunday, January 12, 2025`.
pub const LONG_DATE: &str = "%A, %B %-d, %Y";

/// Long date with short time, e.g. `Sunday, January 12, 2025 9:15 PM`.
pub const LONG_DATE_SHORT_TIME: &str = "%A, %B %-d, %Y %-I:%M %p";

/// Source of "now".
#[derive(Debug, Clone, Copy, Default)]
pub enum Clock {
    #[default]
    System,
    Fixed(NaiveDateTime),
}

impl Clock {
    pub fn now(&self) -> NaiveDateTime {
        match self {
            Self::System => Local::now().naive_local(),
            Self::Fixed(t) => *t,
        }
    }
}

pub struct CurrentDateTimeTool {
    clock: Clock,
}

impl CurrentDateTimeTool {
    pub fn new(clock: Clock) -> Self {
        Self { clock }
    }
}

#[async_trait]
impl Tool for CurrentDateTimeTool {
    fn name(&self) -> &str {
        "current_date_time"
    }

    fn description(&self) -> &str {
        "Get the current date, or the current date and time in the local time zone."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "format": {
                    "type": "string",
                    "enum": ["date", "datetime"],
                    "description": "'date' for the date only, 'datetime' to include the time (default: date)",
                    "default": "date"
                }
            }
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let pattern = match arguments["format"].as_str().unwrap_or("date") {
            "date" => LONG_DATE,
            "datetime" => LONG_DATE_SHORT_TIME,
            other => {
                return Err(ToolError::InvalidArguments(format!(
                    "Unknown format '{other}', expected 'date' or 'datetime'"
                )));
            }
        };

        Ok(ToolResult::ok(self.clock.now().format(pattern).to_string()))
    }
}

pub struct DaysUntilTool {
    clock: Clock,
    event_start: NaiveDateTime,
}

impl DaysUntilTool {
    pub fn new(clock: Clock, event_start: NaiveDateTime) -> Self {
        Self { clock, event_start }
    }
}

/// Accepts `YYYY-MM-DD`, `YYYY-MM-DDTHH:MM:SS`, or RFC 3339 (converted to local time).
fn parse_target(raw: &str) -> Result<NaiveDateTime, ToolError> {
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Local).naive_local());
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S") {
        return Ok(dt);
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map(|d| d.and_time(NaiveTime::MIN))
        .map_err(|_| ToolError::InvalidArguments(format!("Unrecognised date '{raw}'")))
}

#[async_trait]
impl Tool for DaysUntilTool {
    fn name(&self) -> &str {
        "days_until"
    }

    fn description(&self) -> &str {
        "Get the number of days (fractional) from now until a date. \
         Without a target, counts down to the start of Microsoft Build 2025."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "target": {
                    "type": "string",
                    "description": "Target date (YYYY-MM-DD or RFC 3339). Defaults to the Build 2025 start."
                }
            }
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let target = match arguments["target"].as_str() {
            Some(raw) => parse_target(raw)?,
            None => self.event_start,
        };

        let millis = (target - self.clock.now()).num_milliseconds();
        let days = millis as f64 / 86_400_000.0;

        Ok(ToolResult::ok(days.to_string()).with_data(serde_json::json!({ "days": days })))
    }
}
