//! Placeholder substitution for command templates
//!
//! Templates reference setter values as `${key}` or `${key:format}` where
//! `format` is a printf-style spec such as `%d`, `%.1f` or `%05.2f`.
//! Substitution repeats until no placeholders remain, so a substituted value
//! may itself expand further. Referencing an unknown key is an error.

use crate::error::{HeliosError, Result};
use std::collections::HashMap;
use std::fmt;

/// Upper bound on substitution passes; guards against self-referencing values
pub const MAX_PASSES: usize = 16;

/// Largest width or precision accepted in a format spec
pub const MAX_WIDTH: usize = 1_000_000;

/// Runtime value bound to a placeholder key
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Str(s) => f.write_str(s),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

/// A `${key}` or `${key:format}` occurrence inside a template
#[derive(Debug, PartialEq)]
struct Placeholder<'a> {
    start: usize,
    end: usize,
    key: &'a str,
    format: Option<&'a str>,
}

fn is_key_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn is_format_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '%' || c == '.'
}

/// Try to read a placeholder starting at byte offset `start` (pointing at `$`)
fn placeholder_at(s: &str, start: usize) -> Option<Placeholder<'_>> {
    let rest = s[start..].strip_prefix("${")?;
    let key_len = rest.find(|c: char| !is_key_char(c))?;
    if key_len == 0 {
        return None;
    }
    let key = &rest[..key_len];
    let after_key = &rest[key_len..];

    if let Some(tail) = after_key.strip_prefix('}') {
        let end = s.len() - tail.len();
        return Some(Placeholder {
            start,
            end,
            key,
            format: None,
        });
    }

    let spec = after_key.strip_prefix(':')?;
    let spec_len = spec.find(|c: char| !is_format_char(c))?;
    if spec_len == 0 {
        return None;
    }
    let tail = spec[spec_len..].strip_prefix('}')?;
    Some(Placeholder {
        start,
        end: s.len() - tail.len(),
        key,
        format: Some(&spec[..spec_len]),
    })
}

fn find_placeholders(s: &str) -> Vec<Placeholder<'_>> {
    s.match_indices("${")
        .filter_map(|(idx, _)| placeholder_at(s, idx))
        .collect()
}

/// Whether `s` still contains a well-formed placeholder
pub fn has_placeholders(s: &str) -> bool {
    !find_placeholders(s).is_empty()
}

/// Check the format spec of every placeholder in `template` without values.
///
/// Lets a command template with an unusable format fail at configuration
/// time rather than on the first write.
pub fn check_template(template: &str) -> Result<()> {
    for p in find_placeholders(template) {
        if let Some(format) = p.format {
            parse_format(format)?;
        }
    }
    Ok(())
}

/// Substitute all placeholders in `template` from `values`
pub fn replace_formatted(template: &str, values: &HashMap<String, Value>) -> Result<String> {
    let mut current = template.to_string();

    for _ in 0..MAX_PASSES {
        let placeholders = find_placeholders(&current);
        if placeholders.is_empty() {
            return Ok(current);
        }

        let mut out = String::with_capacity(current.len());
        let mut pos = 0;
        for p in placeholders {
            // overlapping matches cannot occur: a placeholder never contains "${"
            out.push_str(&current[pos..p.start]);
            let value = values.get(p.key).ok_or_else(|| {
                HeliosError::parse(format!(
                    "could not find match for {}",
                    &current[p.start..p.end]
                ))
            })?;
            match p.format {
                Some(spec) => out.push_str(&sprintf(spec, value)?),
                None => out.push_str(&value.to_string()),
            }
            pos = p.end;
        }
        out.push_str(&current[pos..]);
        current = out;
    }

    Err(HeliosError::parse(format!(
        "placeholders in '{}' did not resolve after {} passes",
        template, MAX_PASSES
    )))
}

/// Convenience for the common single-parameter setter case
pub fn replace_one(template: &str, key: &str, value: impl Into<Value>) -> Result<String> {
    let mut values = HashMap::new();
    values.insert(key.to_string(), value.into());
    replace_formatted(template, &values)
}

#[derive(Debug, Default)]
struct Spec {
    left: bool,
    plus: bool,
    zero: bool,
    space: bool,
    width: Option<usize>,
    precision: Option<usize>,
    verb: char,
}

fn parse_spec(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> Result<Spec> {
    let mut spec = Spec::default();
    while let Some(&c) = chars.peek() {
        match c {
            '-' => spec.left = true,
            '+' => spec.plus = true,
            '0' => spec.zero = true,
            ' ' => spec.space = true,
            _ => break,
        }
        chars.next();
    }

    let width = take_count(chars);
    if !width.is_empty() {
        spec.width = Some(parse_count(&width, "width")?);
    }

    if chars.peek() == Some(&'.') {
        chars.next();
        let precision = take_count(chars);
        spec.precision = Some(if precision.is_empty() {
            0
        } else {
            parse_count(&precision, "precision")?
        });
    }

    spec.verb = chars
        .next()
        .ok_or_else(|| HeliosError::parse("format ends before verb"))?;
    if !matches!(spec.verb, 'd' | 'f' | 'F' | 'x' | 'X' | 't' | 's' | 'v') {
        return Err(HeliosError::parse(format!(
            "unknown format verb %{}",
            spec.verb
        )));
    }
    Ok(spec)
}

fn take_count(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> String {
    let mut digits = String::new();
    while let Some(&c) = chars.peek()
        && c.is_ascii_digit()
    {
        digits.push(c);
        chars.next();
    }
    digits
}

fn parse_count(digits: &str, what: &str) -> Result<usize> {
    match digits.parse::<usize>() {
        Ok(n) if n <= MAX_WIDTH => Ok(n),
        _ => Err(HeliosError::parse(format!(
            "format {} {} exceeds {}",
            what, digits, MAX_WIDTH
        ))),
    }
}

fn render(spec: &Spec, value: &Value) -> Result<String> {
    let body = match (spec.verb, value) {
        ('d', Value::Int(i)) => i.to_string(),
        ('d', Value::Float(x)) => (x.round() as i64).to_string(),
        ('f' | 'F', Value::Int(i)) => format!("{:.*}", spec.precision.unwrap_or(6), *i as f64),
        ('f' | 'F', Value::Float(x)) => format!("{:.*}", spec.precision.unwrap_or(6), x),
        ('x', Value::Int(i)) => format!("{:x}", i),
        ('X', Value::Int(i)) => format!("{:X}", i),
        ('t', Value::Bool(b)) => b.to_string(),
        ('s' | 'v', v) => {
            let s = v.to_string();
            match spec.precision {
                Some(p) if matches!(v, Value::Str(_)) => s.chars().take(p).collect(),
                _ => s,
            }
        }
        (verb, v) => {
            return Err(HeliosError::parse(format!(
                "format verb %{} not applicable to {:?}",
                verb, v
            )));
        }
    };

    let numeric = matches!(value, Value::Int(_) | Value::Float(_)) && spec.verb != 's';
    let mut body = body;
    if numeric && !body.starts_with('-') {
        if spec.plus {
            body.insert(0, '+');
        } else if spec.space {
            body.insert(0, ' ');
        }
    }

    let width = spec.width.unwrap_or(0);
    let len = body.chars().count();
    if len >= width {
        return Ok(body);
    }
    let pad = width - len;
    Ok(if spec.left {
        format!("{}{}", body, " ".repeat(pad))
    } else if spec.zero && numeric {
        let sign_len = usize::from(body.starts_with(['-', '+', ' ']));
        let (sign, digits) = body.split_at(sign_len);
        format!("{}{}{}", sign, "0".repeat(pad), digits)
    } else {
        format!("{}{}", " ".repeat(pad), body)
    })
}

/// Literal text around the single verb of a format
#[derive(Debug)]
struct Format {
    prefix: String,
    spec: Spec,
    suffix: String,
}

fn parse_format(format: &str) -> Result<Format> {
    let mut prefix = String::new();
    let mut suffix = String::new();
    let mut spec = None;
    let mut chars = format.chars().peekable();

    while let Some(c) = chars.next() {
        let out = if spec.is_some() {
            &mut suffix
        } else {
            &mut prefix
        };
        if c != '%' {
            out.push(c);
            continue;
        }
        if chars.peek() == Some(&'%') {
            chars.next();
            out.push('%');
            continue;
        }
        if spec.is_some() {
            return Err(HeliosError::parse(format!(
                "format '{}' has more than one verb",
                format
            )));
        }
        spec = Some(parse_spec(&mut chars)?);
    }

    let spec =
        spec.ok_or_else(|| HeliosError::parse(format!("format '{}' has no verb", format)))?;
    Ok(Format {
        prefix,
        spec,
        suffix,
    })
}

/// Format `value` according to a printf-style `format` containing one verb
pub fn sprintf(format: &str, value: &Value) -> Result<String> {
    let Format {
        prefix,
        spec,
        suffix,
    } = parse_format(format)?;
    Ok(format!("{}{}{}", prefix, render(&spec, value)?, suffix))
}
