//! Date getters over RFC 3339 strings, `YYYY-MM-DD` dates (UTC midnight),
//! `YYYY-MM-DDTHH:MM:SS` local date-times, or epoch milliseconds. Unparseable
//! input yields `NaN`. Months count from 0 and days of the week from Sunday.

use chrono::{
    DateTime, Datelike, Local, NaiveDate, NaiveDateTime, TimeZone, Timelike, Utc,
};
use serde_json::Value;

use super::{arg, Module};
use crate::coerce::number_value;
use crate::evaluator::EvalError;

pub const MODULE: Module = Module {
    name: "date",
    functions: &[
        ("getFullYear", |args| local(args, |d| f64::from(d.year()))),
        ("getMonth", |args| local(args, |d| f64::from(d.month0()))),
        ("getDate", |args| local(args, |d| f64::from(d.day()))),
        ("getHours", |args| local(args, |d| f64::from(d.hour()))),
        ("getMin", |args| local(args, |d| f64::from(d.minute()))),
        ("getSec", |args| local(args, |d| f64::from(d.second()))),
        ("getMs", |args| local(args, |d| f64::from(d.timestamp_subsec_millis()))),
        ("getDay", |args| {
            local(args, |d| f64::from(d.weekday().num_days_from_sunday()))
        }),
        ("getTime", |args| utc(args, |d| d.timestamp_millis() as f64)),
        ("getNow", |_| Ok(number_value(Utc::now().timestamp_millis() as f64))),
        ("getUTCFullYear", |args| utc(args, |d| f64::from(d.year()))),
        ("getUTCMonth", |args| utc(args, |d| f64::from(d.month0()))),
        ("getUTCDate", |args| utc(args, |d| f64::from(d.day()))),
        ("getUTCHours", |args| utc(args, |d| f64::from(d.hour()))),
        ("getUTCMin", |args| utc(args, |d| f64::from(d.minute()))),
        ("getUTCSec", |args| utc(args, |d| f64::from(d.second()))),
        ("getUTCMs", |args| utc(args, |d| f64::from(d.timestamp_subsec_millis()))),
        ("getUTCDay", |args| {
            utc(args, |d| f64::from(d.weekday().num_days_from_sunday()))
        }),
        ("getTimezoneOffset", |args| {
            local(args, |d| f64::from(-d.offset().local_minus_utc() / 60))
        }),
    ],
};

/// Parse a date argument.
pub fn parse_date(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Number(n) => Utc.timestamp_millis_opt(n.as_f64()? as i64).single(),
        Value::String(s) => parse_date_str(s.trim()),
        _ => None,
    }
}

fn parse_date_str(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(date_time) = DateTime::parse_from_rfc3339(s) {
        return Some(date_time.with_timezone(&Utc));
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0).map(|dt| Utc.from_utc_datetime(&dt));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            return Local
                .from_local_datetime(&naive)
                .earliest()
                .map(|dt| dt.with_timezone(&Utc));
        }
    }
    s.parse::<i64>()
        .ok()
        .and_then(|millis| Utc.timestamp_millis_opt(millis).single())
}

fn utc(args: &[Value], get: fn(&DateTime<Utc>) -> f64) -> Result<Value, EvalError> {
    Ok(number_value(
        parse_date(arg(args, 0)).map_or(f64::NAN, |d| get(&d)),
    ))
}

fn local(args: &[Value], get: fn(&DateTime<Local>) -> f64) -> Result<Value, EvalError> {
    Ok(number_value(parse_date(arg(args, 0)).map_or(f64::NAN, |d| {
        get(&d.with_timezone(&Local))
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn call(name: &str, args: &[Value]) -> Value {
        MODULE.lookup(name).unwrap()(args).unwrap()
    }

    #[test]
    fn test_utc_getters() {
        let date = json!("2024-03-09T14:05:07.250Z");
        assert_eq!(call("getUTCFullYear", &[date.clone()]), json!(2024));
        assert_eq!(call("getUTCMonth", &[date.clone()]), json!(2));
        assert_eq!(call("getUTCDate", &[date.clone()]), json!(9));
        assert_eq!(call("getUTCHours", &[date.clone()]), json!(14));
        assert_eq!(call("getUTCMin", &[date.clone()]), json!(5));
        assert_eq!(call("getUTCSec", &[date.clone()]), json!(7));
        assert_eq!(call("getUTCMs", &[date.clone()]), json!(250));
        assert_eq!(call("getUTCDay", &[date]), json!(6));
    }

    #[test]
    fn test_date_only_is_utc_midnight() {
        assert_eq!(call("getTime", &[json!("1970-01-02")]), json!(86_400_000));
        assert_eq!(call("getUTCHours", &[json!("2024-01-01")]), json!(0));
    }

    #[test]
    fn test_epoch_millis() {
        assert_eq!(call("getUTCFullYear", &[json!(0)]), json!(1970));
        assert_eq!(call("getTime", &[json!("1000")]), json!(1000));
    }

    #[test]
    fn test_invalid_date_is_nan() {
        assert_eq!(call("getFullYear", &[json!("not a date")]), json!("NaN"));
        assert_eq!(call("getUTCDay", &[]), json!("NaN"));
    }

    #[test]
    fn test_now_is_recent() {
        let now = call("getNow", &[]).as_f64().unwrap();
        assert!(now > 1_600_000_000_000.0);
    }

    #[test]
    fn test_local_getters_agree_with_offset() {
        let offset = call("getTimezoneOffset", &[json!("2024-06-01T00:00:00Z")]);
        assert!(offset.is_number());
        assert_eq!(call("getFullYear", &[json!("2024-06-15T12:00:00Z")]), json!(2024));
    }
}
