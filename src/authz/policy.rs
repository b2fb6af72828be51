//! §4.8 condition evaluators. Each permission may carry a `conditions` map
//! (see [`crate::models::DynamicMap`]); every key present must evaluate true
//! for the permission to apply. Unknown keys are a configuration error, not a
//! silent pass, since a typo'd condition should never quietly grant access.

use std::net::IpAddr;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{Datelike, NaiveTime, Utc, Weekday};
use ipnetwork::IpNetwork;
use serde_json::Value;

use crate::cache::KernelCache;
use crate::error::AppError;
use crate::models::{DynamicMap, UserStatus};

#[derive(Debug, Clone)]
pub struct EvaluationContext {
    pub principal_id: String,
    pub principal_status: UserStatus,
    pub mfa_verified: bool,
    pub ip_address: Option<String>,
    pub resource_owner_id: Option<String>,
}

pub async fn evaluate(
    conditions: &DynamicMap,
    ctx: &EvaluationContext,
    cache: &Arc<dyn KernelCache>,
) -> Result<bool, AppError> {
    for (key, value) in conditions.0.iter() {
        let passes = match key.as_str() {
            "time_range" => eval_time_range(value)?,
            "ip_range" => eval_ip_range(value, ctx.ip_address.as_deref())?,
            "mfa_required" => !matches!(value, Value::Bool(true)) || ctx.mfa_verified,
            "user_status" => eval_user_status(value, ctx.principal_status),
            "resource_owner" => eval_resource_owner(value, ctx),
            "max_requests_per_hour" => eval_rate_limit(value, ctx, cache).await?,
            other => {
                return Err(AppError::Configuration(format!(
                    "unknown authorization condition: {other}"
                )))
            }
        };
        if !passes {
            return Ok(false);
        }
    }
    Ok(true)
}

const BUSINESS_DAYS: [Weekday; 5] = [Weekday::Mon, Weekday::Tue, Weekday::Wed, Weekday::Thu, Weekday::Fri];

fn parse_weekday(name: &str) -> Option<Weekday> {
    match name.to_lowercase().as_str() {
        "mon" | "monday" => Some(Weekday::Mon),
        "tue" | "tuesday" => Some(Weekday::Tue),
        "wed" | "wednesday" => Some(Weekday::Wed),
        "thu" | "thursday" => Some(Weekday::Thu),
        "fri" | "friday" => Some(Weekday::Fri),
        "sat" | "saturday" => Some(Weekday::Sat),
        "sun" | "sunday" => Some(Weekday::Sun),
        _ => None,
    }
}

fn in_time_window(start: NaiveTime, end: NaiveTime, now: NaiveTime) -> bool {
    if start <= end {
        now >= start && now <= end
    } else {
        now >= start || now <= end
    }
}

/// §4.8 `time_range` forms: `"24x7"` always passes; `"business_hours"` is
/// Mon-Fri 09:00-17:00; `"weekdays"` is Mon-Fri at any time; an object form
/// `{start, end, days}` (HH:MM, optional `days` array, default all days)
/// covers anything more specific.
fn eval_time_range(value: &Value) -> Result<bool, AppError> {
    let now = Utc::now();

    match value {
        Value::String(s) if s == "24x7" => Ok(true),
        Value::String(s) if s == "business_hours" => {
            let start = NaiveTime::from_hms_opt(9, 0, 0).unwrap();
            let end = NaiveTime::from_hms_opt(17, 0, 0).unwrap();
            Ok(BUSINESS_DAYS.contains(&now.weekday()) && in_time_window(start, end, now.time()))
        }
        Value::String(s) if s == "weekdays" => Ok(BUSINESS_DAYS.contains(&now.weekday())),
        Value::String(other) => Err(AppError::Configuration(format!("unknown time_range form: {other}"))),
        Value::Object(obj) => {
            let start = obj
                .get("start")
                .and_then(Value::as_str)
                .ok_or_else(|| AppError::Configuration("time_range.start is required".to_string()))?;
            let end = obj
                .get("end")
                .and_then(Value::as_str)
                .ok_or_else(|| AppError::Configuration("time_range.end is required".to_string()))?;

            let start = NaiveTime::parse_from_str(start, "%H:%M")
                .map_err(|_| AppError::Configuration("time_range.start must be HH:MM".to_string()))?;
            let end = NaiveTime::parse_from_str(end, "%H:%M")
                .map_err(|_| AppError::Configuration("time_range.end must be HH:MM".to_string()))?;

            let days_ok = match obj.get("days") {
                Some(Value::Array(days)) => {
                    let allowed: Vec<Weekday> = days.iter().filter_map(Value::as_str).filter_map(parse_weekday).collect();
                    allowed.is_empty() || allowed.contains(&now.weekday())
                }
                _ => true,
            };

            Ok(days_ok && in_time_window(start, end, now.time()))
        }
        _ => Err(AppError::Configuration("time_range condition must be a string or object".to_string())),
    }
}

fn is_internal_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => v4.is_loopback() || v4.is_private() || v4.is_link_local(),
        IpAddr::V6(v6) => v6.is_loopback() || (v6.segments()[0] & 0xfe00) == 0xfc00,
    }
}

/// §4.8 `ip_range` forms: `"any"` always passes; `"internal"` matches
/// RFC1918 private ranges plus loopback; an array of CIDR strings matches
/// against any of them.
fn eval_ip_range(value: &Value, actual_ip: Option<&str>) -> Result<bool, AppError> {
    let Some(actual_ip) = actual_ip else { return Ok(false) };
    let Ok(ip) = IpAddr::from_str(actual_ip) else { return Ok(false) };

    match value {
        Value::String(s) if s == "any" => Ok(true),
        Value::String(s) if s == "internal" => Ok(is_internal_ip(ip)),
        Value::String(other) => {
            let network = IpNetwork::from_str(other)
                .map_err(|_| AppError::Configuration(format!("invalid ip_range cidr: {other}")))?;
            Ok(network.contains(ip))
        }
        Value::Array(entries) => {
            for entry in entries {
                let Some(cidr) = entry.as_str() else { continue };
                let network = IpNetwork::from_str(cidr)
                    .map_err(|_| AppError::Configuration(format!("invalid ip_range cidr: {cidr}")))?;
                if network.contains(ip) {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        _ => Err(AppError::Configuration("ip_range condition must be a string or array".to_string())),
    }
}

fn eval_user_status(value: &Value, actual: UserStatus) -> bool {
    let expected = match value {
        Value::String(s) => s.as_str(),
        _ => return false,
    };
    let actual = format!("{actual:?}").to_lowercase();
    actual == expected.to_lowercase()
}

fn eval_resource_owner(value: &Value, ctx: &EvaluationContext) -> bool {
    if !matches!(value, Value::Bool(true)) {
        return true;
    }
    match &ctx.resource_owner_id {
        Some(owner) => owner == &ctx.principal_id,
        None => false,
    }
}

async fn eval_rate_limit(
    value: &Value,
    ctx: &EvaluationContext,
    cache: &Arc<dyn KernelCache>,
) -> Result<bool, AppError> {
    let limit = value
        .as_i64()
        .ok_or_else(|| AppError::Configuration("max_requests_per_hour must be an integer".to_string()))?;
    let key = format!("ratelimit:{}:hour", ctx.principal_id);
    let count = cache.increment(&key, 1, Some(std::time::Duration::from_secs(3600))).await?;
    Ok(count <= limit)
}
