//! Built-in functions callable from expressions.
//!
//! All built-ins are pure except `NOW`, which reads the firing's frozen
//! timestamp from the evaluation context. Unknown names are a runtime
//! error that fails the enclosing firing.

use chrono::{DateTime, Duration, NaiveDate, Utc};

use crate::context::EvaluationContext;
use crate::error::EvalError;
use crate::value::Value;

const MILLIS_PER_HOUR: i64 = 3_600_000;
const MILLIS_PER_DAY: i64 = 86_400_000;

/// Dispatches a built-in function call.
///
/// # Errors
/// `UnknownFunction` for names outside the table; `InvalidArguments` for
/// arity or type mismatches.
pub fn call(name: &str, args: &[Value], ctx: &EvaluationContext) -> Result<Value, EvalError> {
    match name {
        "NOW" => {
            require_arity(name, args, 0)?;
            Ok(Value::Timestamp(ctx.now))
        }
        "DATE" => {
            require_arity(name, args, 1)?;
            date(name, &args[0])
        }
        "DAYS" => {
            require_arity(name, args, 1)?;
            duration(name, &args[0], MILLIS_PER_DAY)
        }
        "HOURS" => {
            require_arity(name, args, 1)?;
            duration(name, &args[0], MILLIS_PER_HOUR)
        }
        "CONCAT" => {
            let mut out = String::new();
            for arg in args {
                out.push_str(&arg.to_plain_string());
            }
            Ok(Value::String(out))
        }
        "UPPER" => {
            require_arity(name, args, 1)?;
            case(name, &args[0], str::to_uppercase)
        }
        "LOWER" => {
            require_arity(name, args, 1)?;
            case(name, &args[0], str::to_lowercase)
        }
        "LENGTH" => {
            require_arity(name, args, 1)?;
            match &args[0] {
                Value::Null => Ok(Value::Int(0)),
                Value::String(s) => Ok(Value::Int(s.chars().count() as i64)),
                other => Err(type_error(name, "a string", other)),
            }
        }
        "ABS" => {
            require_arity(name, args, 1)?;
            match &args[0] {
                Value::Null => Ok(Value::Null),
                Value::Int(v) => Ok(Value::Int(v.abs())),
                Value::Float(v) => Ok(Value::Float(v.abs())),
                other => Err(type_error(name, "a number", other)),
            }
        }
        "ROUND" => {
            require_arity(name, args, 1)?;
            match &args[0] {
                Value::Null => Ok(Value::Null),
                Value::Int(v) => Ok(Value::Int(*v)),
                #[allow(clippy::cast_possible_truncation)]
                Value::Float(v) => Ok(Value::Int(v.round() as i64)),
                other => Err(type_error(name, "a number", other)),
            }
        }
        "MIN" => {
            require_arity(name, args, 2)?;
            extremum(name, &args[0], &args[1], true)
        }
        "MAX" => {
            require_arity(name, args, 2)?;
            extremum(name, &args[0], &args[1], false)
        }
        _ => Err(EvalError::UnknownFunction {
            name: name.to_string(),
        }),
    }
}

fn require_arity(name: &str, args: &[Value], expected: usize) -> Result<(), EvalError> {
    if args.len() == expected {
        Ok(())
    } else {
        Err(EvalError::InvalidArguments {
            function: name.to_string(),
            reason: format!("expected {expected} argument(s), got {}", args.len()),
        })
    }
}

fn type_error(name: &str, expected: &str, got: &Value) -> EvalError {
    EvalError::InvalidArguments {
        function: name.to_string(),
        reason: format!("expected {expected}, got {}", got.type_name()),
    }
}

fn date(name: &str, arg: &Value) -> Result<Value, EvalError> {
    let Value::String(text) = arg else {
        return Err(type_error(name, "an ISO-8601 string", arg));
    };

    if let Ok(ts) = DateTime::parse_from_rfc3339(text) {
        return Ok(Value::Timestamp(ts.with_timezone(&Utc)));
    }
    if let Ok(day) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        let midnight = day
            .and_hms_opt(0, 0, 0)
            .map(|naive| DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc));
        if let Some(ts) = midnight {
            return Ok(Value::Timestamp(ts));
        }
    }
    Err(EvalError::InvalidArguments {
        function: name.to_string(),
        reason: format!("'{text}' is not an ISO-8601 date"),
    })
}

#[allow(clippy::cast_possible_truncation)]
fn duration(name: &str, arg: &Value, unit_millis: i64) -> Result<Value, EvalError> {
    match arg {
        Value::Null => Ok(Value::Null),
        Value::Int(v) => Ok(Value::Duration(v.saturating_mul(unit_millis))),
        Value::Float(v) => Ok(Value::Duration((v * unit_millis as f64) as i64)),
        other => Err(type_error(name, "a number", other)),
    }
}

fn case(name: &str, arg: &Value, convert: impl Fn(&str) -> String) -> Result<Value, EvalError> {
    match arg {
        Value::Null => Ok(Value::Null),
        Value::String(s) => Ok(Value::String(convert(s))),
        other => Err(type_error(name, "a string", other)),
    }
}

fn extremum(name: &str, a: &Value, b: &Value, min: bool) -> Result<Value, EvalError> {
    if a.is_null() || b.is_null() {
        return Ok(Value::Null);
    }
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => Ok(Value::Int(if min { *x.min(y) } else { *x.max(y) })),
        _ => {
            let (Some(x), Some(y)) = (a.as_float(), b.as_float()) else {
                return Err(EvalError::InvalidArguments {
                    function: name.to_string(),
                    reason: format!("expected numbers, got {} and {}", a.type_name(), b.type_name()),
                });
            };
            Ok(Value::Float(if min { x.min(y) } else { x.max(y) }))
        }
    }
}

/// Converts a duration value to a `chrono::Duration` for timestamp math.
pub(crate) fn duration_millis(value: &Value) -> Option<Duration> {
    match value {
        Value::Duration(ms) => Some(Duration::milliseconds(*ms)),
        _ => None,
    }
}
