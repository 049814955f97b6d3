use super::renderer::{display_value, is_truthy, number, to_number, type_name};
use crate::error::{Error, Result};
use chrono::format::{Item, StrftimeItems};
use chrono::{Local, TimeZone};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// A function callable from templates
pub type TemplateFunction = Arc<dyn Fn(&[Value]) -> Result<Value> + Send + Sync>;

/// Upper bound on the number of items `range()` may produce
const MAX_RANGE_ITEMS: usize = 100_000;

/// Named functions available to template expressions
#[derive(Clone)]
pub struct FunctionRegistry {
    functions: HashMap<String, TemplateFunction>,
}

impl FunctionRegistry {
    /// A registry with no functions at all
    pub fn empty() -> Self {
        Self {
            functions: HashMap::new(),
        }
    }

    /// A registry pre-populated with the built-in functions
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        registry.register_builtins();
        registry
    }

    /// Register (or replace) a function
    pub fn register<F>(&mut self, name: impl Into<String>, function: F)
    where
        F: Fn(&[Value]) -> Result<Value> + Send + Sync + 'static,
    {
        self.functions.insert(name.into(), Arc::new(function));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&TemplateFunction> {
        self.functions.get(name)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.functions.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Call a function by name
    pub fn call(&self, name: &str, args: &[Value]) -> Result<Value> {
        match self.functions.get(name) {
            Some(function) => function(args),
            None => Err(Error::render_failed(format!("unknown function '{}'", name))),
        }
    }

    fn register_builtins(&mut self) {
        // empty(value) - true for null, false, 0, "", [] and {}
        self.register("empty", |args| {
            Ok(Value::Bool(!args.first().map(is_truthy).unwrap_or(false)))
        });

        // isset(a, b, ...) - true when every argument is non-null
        self.register("isset", |args| {
            Ok(Value::Bool(
                !args.is_empty() && args.iter().all(|v| !v.is_null()),
            ))
        });

        // count(value) / len(value)
        let count: fn(&[Value]) -> Result<Value> = |args| {
            let len = match args.first() {
                None | Some(Value::Null) => 0,
                Some(Value::Array(arr)) => arr.len(),
                Some(Value::Object(map)) => map.len(),
                Some(Value::String(s)) => s.chars().count(),
                Some(_) => 1,
            };
            Ok(Value::from(len))
        };
        self.register("count", count);
        self.register("len", count);

        self.register("upper", |args| Ok(map_text(args, |s| s.to_uppercase())));
        self.register("lower", |args| Ok(map_text(args, |s| s.to_lowercase())));
        self.register("trim", |args| Ok(map_text(args, |s| s.trim().to_string())));

        // json(value) - compact JSON text
        self.register("json", |args| {
            let value = args.first().unwrap_or(&Value::Null);
            Ok(Value::String(serde_json::to_string(value)?))
        });

        // date(format = "%Y-%m-%d", timestamp = now) - strftime formatting
        self.register("date", |args| {
            let format = match args.first() {
                Some(Value::String(f)) => f.as_str(),
                Some(other) => {
                    return Err(Error::render_failed(format!(
                        "date() format must be a string, got {}",
                        type_name(other)
                    )))
                }
                None => "%Y-%m-%d",
            };

            let items: Vec<Item> = StrftimeItems::new(format).collect();
            if items.iter().any(|item| matches!(item, Item::Error)) {
                return Err(Error::render_failed(format!(
                    "invalid date format '{}'",
                    format
                )));
            }

            let moment = match args.get(1) {
                None | Some(Value::Null) => Local::now(),
                Some(value) => {
                    let seconds = to_number(value).ok_or_else(|| {
                        Error::render_failed("date() timestamp must be a number")
                    })?;
                    Local
                        .timestamp_opt(seconds as i64, 0)
                        .single()
                        .ok_or_else(|| {
                            Error::render_failed(format!("timestamp {} is out of range", seconds))
                        })?
                }
            };

            Ok(Value::String(
                moment.format_with_items(items.iter()).to_string(),
            ))
        });

        // range(stop) / range(start, stop) / range(start, stop, step), stop exclusive
        self.register("range", |args| {
            let numbers: Option<Vec<f64>> = args.iter().map(to_number).collect();
            let numbers = numbers
                .ok_or_else(|| Error::render_failed("range() arguments must be numbers"))?;

            let (start, stop, step) = match numbers.as_slice() {
                [] => return Ok(Value::Array(Vec::new())),
                [stop] => (0.0, *stop, 1.0),
                [start, stop] => (*start, *stop, 1.0),
                [start, stop, step, ..] => (*start, *stop, *step),
            };

            if step == 0.0 {
                return Err(Error::render_failed("range() step cannot be zero"));
            }

            let mut items = Vec::new();
            let mut current = start;
            while (step > 0.0 && current < stop) || (step < 0.0 && current > stop) {
                if items.len() >= MAX_RANGE_ITEMS {
                    return Err(Error::render_failed(format!(
                        "range() would produce more than {} items",
                        MAX_RANGE_ITEMS
                    )));
                }
                items.push(number(current));
                current += step;
            }
            Ok(Value::Array(items))
        });
    }
}

/// Apply a string transform to the first argument's display text
fn map_text(args: &[Value], f: impl Fn(&str) -> String) -> Value {
    match args.first() {
        None | Some(Value::Null) => Value::String(String::new()),
        Some(value) => Value::String(f(&display_value(value))),
    }
}

impl Default for FunctionRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionRegistry")
            .field("functions", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn call(name: &str, args: Vec<Value>) -> Result<Value> {
        FunctionRegistry::with_builtins().call(name, &args)
    }

    #[test]
    fn test_empty_and_isset() {
        assert_eq!(call("empty", vec![json!([])]).unwrap(), json!(true));
        assert_eq!(call("empty", vec![json!("0")]).unwrap(), json!(false));
        assert_eq!(call("empty", vec![]).unwrap(), json!(true));

        assert_eq!(call("isset", vec![json!(0), json!("")]).unwrap(), json!(true));
        assert_eq!(call("isset", vec![json!(1), json!(null)]).unwrap(), json!(false));
    }

    #[test]
    fn test_count_and_len() {
        assert_eq!(call("count", vec![json!([1, 2, 3])]).unwrap(), json!(3));
        assert_eq!(call("len", vec![json!("héllo")]).unwrap(), json!(5));
        assert_eq!(call("count", vec![json!({"a": 1})]).unwrap(), json!(1));
        assert_eq!(call("count", vec![]).unwrap(), json!(0));
    }

    #[test]
    fn test_string_functions() {
        assert_eq!(call("upper", vec![json!("abc")]).unwrap(), json!("ABC"));
        assert_eq!(call("lower", vec![json!("AbC")]).unwrap(), json!("abc"));
        assert_eq!(call("trim", vec![json!("  x ")]).unwrap(), json!("x"));
        assert_eq!(call("upper", vec![json!(12)]).unwrap(), json!("12"));
        assert_eq!(
            call("json", vec![json!({"a": [1, true]})]).unwrap(),
            json!(r#"{"a":[1,true]}"#)
        );
    }

    #[test]
    fn test_date_formatting() {
        let value = call("date", vec![json!("%Y"), json!(86_400 * 400)]).unwrap();
        assert_eq!(value, json!("1971"));

        assert!(matches!(
            call("date", vec![json!("%Q")]),
            Err(Error::RenderFailed(_))
        ));
        assert!(matches!(
            call("date", vec![json!(5)]),
            Err(Error::RenderFailed(_))
        ));
    }

    #[test]
    fn test_range() {
        assert_eq!(call("range", vec![json!(3)]).unwrap(), json!([0, 1, 2]));
        assert_eq!(
            call("range", vec![json!(1), json!(10), json!(4)]).unwrap(),
            json!([1, 5, 9])
        );
        assert_eq!(
            call("range", vec![json!(3), json!(0), json!(-1)]).unwrap(),
            json!([3, 2, 1])
        );
        assert!(call("range", vec![json!(0), json!(5), json!(0)]).is_err());
        assert!(call("range", vec![json!(1_000_000)]).is_err());
    }

    #[test]
    fn test_custom_function_and_unknown_name() {
        let mut registry = FunctionRegistry::empty();
        registry.register("double", |args| {
            let n = args.first().and_then(Value::as_f64).unwrap_or(0.0);
            Ok(number(n * 2.0))
        });

        assert_eq!(registry.call("double", &[json!(21)]).unwrap(), json!(42));
        assert!(matches!(
            registry.call("upper", &[json!("x")]),
            Err(Error::RenderFailed(msg)) if msg.contains("upper")
        ));
        assert_eq!(registry.names(), vec!["double"]);
    }
}
