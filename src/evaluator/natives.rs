//! Host functions registered in the global table at evaluator startup.

use std::thread;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::environment::Globals;
use crate::evaluator::Evaluator;
use crate::value::{NativeFunction, RuntimeError, Value};

pub(super) fn install(globals: &Globals) {
    globals.register("print", Value::Native(NativeFunction::new_variadic("print", native_print)));
    globals.register("type", Value::Native(NativeFunction::new("type", 1, native_type)));
    globals.register("len", Value::Native(NativeFunction::new("len", 1, native_len)));
    globals.register("abs", Value::Native(NativeFunction::new("abs", 1, native_abs)));
    globals.register("min", Value::Native(NativeFunction::new("min", 2, native_min)));
    globals.register("max", Value::Native(NativeFunction::new("max", 2, native_max)));
    globals.register("time", Value::Native(NativeFunction::new("time", 0, native_time)));
    globals.register("sleep", Value::Native(NativeFunction::new("sleep", 1, native_sleep)));
    globals.register("str", Value::Native(NativeFunction::new("str", 1, native_str)));
}

fn native_print(_evaluator: &mut Evaluator, args: Vec<Value>) -> Result<Value, RuntimeError> {
    let rendered = args
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" ");
    println!("{rendered}");
    Ok(Value::Nil)
}

fn native_type(_evaluator: &mut Evaluator, args: Vec<Value>) -> Result<Value, RuntimeError> {
    Ok(Value::Type(args[0].type_tag()))
}

fn native_len(_evaluator: &mut Evaluator, args: Vec<Value>) -> Result<Value, RuntimeError> {
    match &args[0] {
        Value::Str(text) => Ok(Value::Number(text.chars().count() as f64)),
        Value::List(items) => Ok(Value::Number(items.len() as f64)),
        Value::Map(entries) => Ok(Value::Number(entries.len() as f64)),
        other => Err(RuntimeError::InvalidArgument {
            name: "len",
            message: format!("expected a string, list, or map, got {}", other.type_tag()),
        }),
    }
}

fn native_abs(_evaluator: &mut Evaluator, args: Vec<Value>) -> Result<Value, RuntimeError> {
    let n = expect_number(&args[0], "abs")?;
    Ok(Value::Number(n.abs()))
}

fn native_min(_evaluator: &mut Evaluator, args: Vec<Value>) -> Result<Value, RuntimeError> {
    let a = expect_number(&args[0], "min")?;
    let b = expect_number(&args[1], "min")?;
    Ok(Value::Number(a.min(b)))
}

fn native_max(_evaluator: &mut Evaluator, args: Vec<Value>) -> Result<Value, RuntimeError> {
    let a = expect_number(&args[0], "max")?;
    let b = expect_number(&args[1], "max")?;
    Ok(Value::Number(a.max(b)))
}

fn native_time(_evaluator: &mut Evaluator, _args: Vec<Value>) -> Result<Value, RuntimeError> {
    let elapsed = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|_| RuntimeError::InvalidArgument {
            name: "time",
            message: "system clock is before the Unix epoch".to_string(),
        })?;
    Ok(Value::Number(elapsed.as_millis() as f64))
}

fn native_sleep(_evaluator: &mut Evaluator, args: Vec<Value>) -> Result<Value, RuntimeError> {
    let seconds = expect_number(&args[0], "sleep")?;
    if !seconds.is_finite() || seconds < 0.0 {
        return Err(RuntimeError::InvalidArgument {
            name: "sleep",
            message: format!("expected a non-negative number of seconds, got {seconds}"),
        });
    }
    thread::sleep(Duration::from_secs_f64(seconds));
    Ok(Value::Nil)
}

fn native_str(_evaluator: &mut Evaluator, args: Vec<Value>) -> Result<Value, RuntimeError> {
    Ok(Value::string(args[0].to_string()))
}

fn expect_number(value: &Value, native: &'static str) -> Result<f64, RuntimeError> {
    match value {
        Value::Number(n) => Ok(*n),
        other => Err(RuntimeError::InvalidArgument {
            name: native,
            message: format!("expected a number, got {}", other.type_tag()),
        }),
    }
}
