//! `TIME` pseudo-type datums.
//!
//! A time is `{"$reql_type$": "TIME", "epoch_time": <seconds>, "timezone": "+HH:MM"}`.

use chrono::{
    DateTime, Datelike, FixedOffset, NaiveDate, NaiveDateTime, Offset, SecondsFormat, TimeZone, Timelike, Utc,
};
use serde_json::{json, Value};

use super::value::{as_number, as_str, number, pseudo_type, REQL_TYPE};
use super::{DriverError, Result};

pub fn is_time(value: &Value) -> bool {
    pseudo_type(value) == Some("TIME")
}

pub fn to_value(moment: &DateTime<FixedOffset>) -> Result<Value> {
    let epoch = moment.timestamp() as f64 + f64::from(moment.timestamp_subsec_nanos()) / 1e9;
    Ok(json!({
        REQL_TYPE: "TIME",
        "epoch_time": number(epoch)?,
        "timezone": format_offset(moment.offset()),
    }))
}

pub fn epoch(value: &Value) -> Result<f64> {
    if !is_time(value) {
        return Err(DriverError::Runtime(format!("Expected type PTYPE<TIME> but found {}.", value)));
    }
    value
        .get("epoch_time")
        .and_then(Value::as_f64)
        .ok_or_else(|| DriverError::Runtime("TIME is missing `epoch_time`.".to_string()))
}

pub fn datetime(value: &Value) -> Result<DateTime<FixedOffset>> {
    let seconds = epoch(value)?;
    let offset = match value.get("timezone").and_then(Value::as_str) {
        Some(timezone) => parse_offset(timezone)?,
        None => utc(),
    };
    from_epoch(seconds, offset)
}

fn utc() -> FixedOffset {
    Utc.fix()
}

pub fn from_epoch(seconds: f64, offset: FixedOffset) -> Result<DateTime<FixedOffset>> {
    let whole = seconds.floor();
    let nanos = ((seconds - whole) * 1e9).round() as u32;
    DateTime::from_timestamp(whole as i64, nanos.min(999_999_999))
        .map(|moment| moment.with_timezone(&offset))
        .ok_or_else(|| DriverError::Runtime(format!("Time out of range: {}", seconds)))
}

pub fn parse_offset(timezone: &str) -> Result<FixedOffset> {
    if timezone == "Z" {
        return Ok(utc());
    }
    let invalid = || DriverError::Runtime(format!("Invalid timezone string `{}`.", timezone));
    let (sign, rest) = match timezone.split_at_checked(1) {
        Some(("+", rest)) => (1, rest),
        Some(("-", rest)) => (-1, rest),
        _ => return Err(invalid()),
    };
    let (hours, minutes) = rest.split_once(':').unwrap_or((rest, "0"));
    let hours: i32 = hours.parse().map_err(|_| invalid())?;
    let minutes: i32 = minutes.parse().map_err(|_| invalid())?;
    if !(0..=23).contains(&hours) || !(0..=59).contains(&minutes) {
        return Err(invalid());
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60)).ok_or_else(invalid)
}

pub fn format_offset(offset: &FixedOffset) -> String {
    let seconds = offset.local_minus_utc();
    let sign = if seconds < 0 { '-' } else { '+' };
    let seconds = seconds.abs();
    format!("{}{:02}:{:02}", sign, seconds / 3600, (seconds % 3600) / 60)
}

pub fn now() -> Result<Value> {
    to_value(&Utc::now().fixed_offset())
}

/// `time(year, month, day[, hour, minute, second], timezone)`
pub fn time(args: &[Value]) -> Result<Value> {
    let (fields, offset) = match args.split_last() {
        Some((Value::String(timezone), fields)) => (fields, parse_offset(timezone)?),
        _ => (args, utc()),
    };
    let mut parts = [0.0f64; 6];
    if !(fields.len() == 3 || fields.len() == 6) {
        return Err(DriverError::Runtime(format!("Expected 3 or 6 date fields, found {}.", fields.len())));
    }
    for (slot, field) in parts.iter_mut().zip(fields) {
        *slot = as_number(field)?;
    }
    let [year, month, day, hour, minute, second] = parts;
    let invalid = || DriverError::Runtime("Invalid date or time fields.".to_string());
    let naive = NaiveDate::from_ymd_opt(year as i32, month as u32, day as u32)
        .and_then(|date| date.and_hms_opt(hour as u32, minute as u32, second.trunc() as u32))
        .ok_or_else(invalid)?;
    let local = offset.from_local_datetime(&naive).single().ok_or_else(invalid)?;
    let epoch = local.timestamp() as f64 + second.fract();
    to_value(&from_epoch(epoch, offset)?)
}

pub fn epoch_time(seconds: &Value) -> Result<Value> {
    to_value(&from_epoch(as_number(seconds)?, utc())?)
}

pub fn iso8601(text: &Value, default_timezone: Option<&Value>) -> Result<Value> {
    let text = as_str(text)?;
    if let Ok(moment) = DateTime::parse_from_rfc3339(text) {
        return to_value(&moment);
    }
    let naive = NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f")
        .map_err(|error| DriverError::Runtime(format!("Invalid ISO 8601 string `{}`: {}", text, error)))?;
    let offset = match default_timezone {
        Some(timezone) => parse_offset(as_str(timezone)?)?,
        None => {
            return Err(DriverError::Runtime(format!(
                "ISO 8601 string has no time zone, and no default time zone was provided: `{}`",
                text
            )))
        }
    };
    let moment = offset
        .from_local_datetime(&naive)
        .single()
        .ok_or_else(|| DriverError::Runtime(format!("Ambiguous local time `{}`", text)))?;
    to_value(&moment)
}

pub fn in_timezone(value: &Value, timezone: &Value) -> Result<Value> {
    let offset = parse_offset(as_str(timezone)?)?;
    to_value(&datetime(value)?.with_timezone(&offset))
}

pub fn shift(value: &Value, seconds: f64) -> Result<Value> {
    let moment = datetime(value)?;
    to_value(&from_epoch(epoch(value)? + seconds, *moment.offset())?)
}

pub fn to_iso8601(value: &Value) -> Result<Value> {
    Ok(Value::String(datetime(value)?.to_rfc3339_opts(SecondsFormat::Millis, false)))
}

pub fn date(value: &Value) -> Result<Value> {
    let moment = datetime(value)?;
    let midnight = moment
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .and_then(|naive| moment.offset().from_local_datetime(&naive).single())
        .ok_or_else(|| DriverError::Runtime("Cannot compute the date of this time.".to_string()))?;
    to_value(&midnight)
}

pub fn time_of_day(value: &Value) -> Result<Value> {
    let moment = datetime(value)?;
    let seconds = moment.num_seconds_from_midnight() as f64 + f64::from(moment.nanosecond()) / 1e9;
    number(seconds)
}

/// Calendar accessor selected by name: `year`, `month`, `day`, `dayOfWeek`,
/// `dayOfYear`, `hours`, `minutes` or `seconds`.
pub fn component(value: &Value, accessor: &str) -> Result<Value> {
    let moment = datetime(value)?;
    let component = match accessor {
        "year" => f64::from(moment.year()),
        "month" => f64::from(moment.month()),
        "day" => f64::from(moment.day()),
        "dayOfWeek" => f64::from(moment.weekday().number_from_monday()),
        "dayOfYear" => f64::from(moment.ordinal()),
        "hours" => f64::from(moment.hour()),
        "minutes" => f64::from(moment.minute()),
        "seconds" => f64::from(moment.second()) + f64::from(moment.nanosecond()) / 1e9,
        other => return Err(DriverError::Unsupported(format!("time accessor `{}`", other))),
    };
    number(component)
}

pub fn during(value: &Value, start: &Value, end: &Value, left_open: bool, right_closed: bool) -> Result<Value> {
    let (at, start, end) = (epoch(value)?, epoch(start)?, epoch(end)?);
    let after_start = if left_open { at > start } else { at >= start };
    let before_end = if right_closed { at <= end } else { at < end };
    Ok(Value::Bool(after_start && before_end))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_time_from_fields() {
        let moment = time(&[json!(1986), json!(11), json!(3), json!("Z")]).unwrap();
        assert_eq!(epoch(&moment).unwrap(), 531360000.0);
        assert_eq!(component(&moment, "year").unwrap(), json!(1986));
        assert_eq!(component(&moment, "dayOfWeek").unwrap(), json!(1));
    }

    #[test]
    fn timezones() {
        assert_eq!(format_offset(&parse_offset("-07:00").unwrap()), "-07:00");
        assert_eq!(format_offset(&parse_offset("Z").unwrap()), "+00:00");
        assert!(parse_offset("07:00").is_err());
        assert!(parse_offset("+999999:00").is_err());
        assert!(parse_offset("+05:75").is_err());
        assert_eq!(format_offset(&parse_offset("+23:59").unwrap()), "+23:59");

        let moment = epoch_time(&json!(0)).unwrap();
        let shifted = in_timezone(&moment, &json!("+02:00")).unwrap();
        assert_eq!(component(&shifted, "hours").unwrap(), json!(2));
        assert_eq!(epoch(&shifted).unwrap(), 0.0);
    }

    #[test]
    fn iso8601_round_trip() {
        let moment = iso8601(&json!("1986-11-03T08:30:00-07:00"), None).unwrap();
        assert_eq!(to_iso8601(&moment).unwrap(), json!("1986-11-03T08:30:00.000-07:00"));
        assert!(iso8601(&json!("1986-11-03T08:30:00"), None).is_err());
        assert!(iso8601(&json!("1986-11-03T08:30:00"), Some(&json!("Z"))).is_ok());
    }
}
