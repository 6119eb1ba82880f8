//! Native functions every evaluator starts with. Hosts can replace any of
//! them through [`Evaluator::register_function`].

use crate::evaluator::{CallContext, Evaluator};
use crate::value::Value;

pub fn register_defaults(evaluator: &mut Evaluator) {
    evaluator.register_function("print", print);
    evaluator.register_function("log", log);
    evaluator.register_function("append", append);
    evaluator.register_function("len", len);
    evaluator.register_function("type", type_of);
    evaluator.register_function("keys", keys);
}

fn expect_args(name: &str, args: &[Value], count: usize) -> Result<(), String> {
    if args.len() == count {
        Ok(())
    } else {
        Err(format!(
            "{}() takes {} argument(s), got {}",
            name,
            count,
            args.len()
        ))
    }
}

fn print(context: &mut CallContext<'_>, args: &[Value]) -> Result<Value, String> {
    for arg in args {
        context.write_output(&arg.to_string());
    }
    Ok(Value::Null)
}

fn log(context: &mut CallContext<'_>, args: &[Value]) -> Result<Value, String> {
    for arg in args {
        context.log_line(&arg.to_string())?;
    }
    Ok(Value::Null)
}

/// Pushes in place, so every alias of the array sees the new element.
fn append(_: &mut CallContext<'_>, args: &[Value]) -> Result<Value, String> {
    expect_args("append", args, 2)?;
    match &args[0] {
        Value::Array(elements) => {
            elements.borrow_mut().push(args[1].clone());
            Ok(args[0].clone())
        }
        other => Err(format!(
            "append() expects an array as its first argument, got {}",
            other.type_name()
        )),
    }
}

fn len(_: &mut CallContext<'_>, args: &[Value]) -> Result<Value, String> {
    expect_args("len", args, 1)?;
    let length = match &args[0] {
        Value::String(s) => s.chars().count(),
        Value::Array(elements) => elements.borrow().len(),
        Value::Hash(hash) => hash.borrow().len(),
        other => return Err(format!("len() not supported for {}", other.type_name())),
    };
    i64::try_from(length)
        .map(Value::Integer)
        .map_err(|_| "len() result does not fit in an integer".to_string())
}

fn type_of(_: &mut CallContext<'_>, args: &[Value]) -> Result<Value, String> {
    expect_args("type", args, 1)?;
    Ok(Value::string(args[0].type_name()))
}

fn keys(_: &mut CallContext<'_>, args: &[Value]) -> Result<Value, String> {
    expect_args("keys", args, 1)?;
    match &args[0] {
        Value::Hash(hash) => Ok(Value::array(hash.borrow().keys().cloned().collect())),
        other => Err(format!("keys() expects a hash, got {}", other.type_name())),
    }
}
