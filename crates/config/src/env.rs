//! Environment variable expansion for config values.
//!
//! Supports `${NAME:default}` and `${NAME}` inside string values. When the
//! whole string is a single reference, the substituted text is type-coerced:
//!
//! - integer-parsable → integer
//! - float-parsable → float
//! - `true`/`false` (any case) → boolean
//! - `"..."`-quoted → the inner text, verbatim, as a string
//! - anything else → string
//!
//! References embedded in a longer string are substituted textually and the
//! result stays a string.

use std::env;
use std::sync::LazyLock;

use regex::Regex;
use serde_yaml::{Number, Value};

use crate::error::{ConfigError, Result};

/// Matches `${NAME}` or `${NAME:default}`.
static ENV_REF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::([^}]*))?\}").expect("valid env reference regex")
});

/// Matches a string consisting of exactly one reference.
static WHOLE_ENV_REF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\$\{([A-Za-z_][A-Za-z0-9_]*)(?::([^}]*))?\}$")
        .expect("valid env reference regex")
});

/// Expand every string in a YAML value tree in place.
pub fn expand_value(value: &mut Value) -> Result<()> {
    match value {
        Value::String(s) => {
            if let Some(expanded) = expand_str(s)? {
                *value = expanded;
            }
        }
        Value::Sequence(seq) => {
            for item in seq {
                expand_value(item)?;
            }
        }
        Value::Mapping(map) => {
            for (_, item) in map.iter_mut() {
                expand_value(item)?;
            }
        }
        Value::Tagged(tagged) => expand_value(&mut tagged.value)?,
        Value::Null | Value::Bool(_) | Value::Number(_) => {}
    }
    Ok(())
}

/// Expand one string. Returns `None` if it holds no reference.
pub fn expand_str(input: &str) -> Result<Option<Value>> {
    if let Some(caps) = WHOLE_ENV_REF.captures(input) {
        let text = resolve(&caps[1], caps.get(2).map(|m| m.as_str()))?;
        return Ok(Some(coerce(&text)));
    }

    if !ENV_REF.is_match(input) {
        return Ok(None);
    }

    let mut missing = None;
    let text = ENV_REF.replace_all(input, |caps: &regex::Captures| {
        match resolve(&caps[1], caps.get(2).map(|m| m.as_str())) {
            Ok(v) => v,
            Err(e) => {
                missing.get_or_insert(e);
                String::new()
            }
        }
    });
    if let Some(e) = missing {
        return Err(e);
    }
    Ok(Some(Value::String(text.into_owned())))
}

fn resolve(name: &str, default: Option<&str>) -> Result<String> {
    match env::var(name) {
        Ok(value) => Ok(value),
        Err(_) => default
            .map(str::to_string)
            .ok_or_else(|| ConfigError::MissingEnv {
                name: name.to_string(),
            }),
    }
}

/// Coerce substituted text into the most specific scalar.
pub fn coerce(text: &str) -> Value {
    if let Ok(i) = text.parse::<i64>() {
        return Value::Number(Number::from(i));
    }
    if let Ok(f) = text.parse::<f64>()
        && f.is_finite()
    {
        return Value::Number(Number::from(f));
    }
    if text.eq_ignore_ascii_case("true") {
        return Value::Bool(true);
    }
    if text.eq_ignore_ascii_case("false") {
        return Value::Bool(false);
    }
    if text.len() >= 2 && text.starts_with('"') && text.ends_with('"') {
        return Value::String(text[1..text.len() - 1].to_string());
    }
    Value::String(text.to_string())
}
