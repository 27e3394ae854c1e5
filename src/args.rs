//! Rendering request arguments.
//!
//! A rendering request arrives in one of three shapes:
//!
//! - a `;`-delimited string, as written in templates and shortcodes:
//!   `"cssclass=small;userwidth=300;lazy"`
//! - an already structured [`RenderingArguments`] map
//! - a JSON value (a string or an object), as handed over by a host system
//!
//! All of them normalize to [`RenderingArguments`]. Values are never
//! interpreted here: `userwidth=300` stays the text `"300"`, and a token
//! without `=` becomes a bare [`ArgValue::Flag`].

use std::collections::BTreeMap;
use thiserror::Error;

/// Argument key holding the class token expression.
pub const CSS_CLASS_KEY: &str = "cssclass";
/// Alternative class key, consulted when [`CSS_CLASS_KEY`] is absent.
pub const CLASS_KEY: &str = "class";
/// Argument key holding the user-requested width.
pub const USER_WIDTH_KEY: &str = "userwidth";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ArgsError {
    #[error("Invalid rendering arguments: {0}")]
    InvalidArgument(String),
}

/// A single argument value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgValue {
    /// Token given without `=`, e.g. `lazy`.
    Flag,
    Text(String),
}

impl ArgValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            ArgValue::Text(s) => Some(s),
            ArgValue::Flag => None,
        }
    }
}

/// Normalized key/value arguments of one rendering request.
///
/// Keys are case-sensitive. Ordering is irrelevant to every consumer; a
/// `BTreeMap` keeps debug output stable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderingArguments(BTreeMap<String, ArgValue>);

impl RenderingArguments {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: ArgValue) {
        self.0.insert(key.into(), value);
    }

    /// Builder-style insert of a text value.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, ArgValue::Text(value.into()));
        self
    }

    pub fn get(&self, key: &str) -> Option<&ArgValue> {
        self.0.get(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<ArgValue> {
        self.0.remove(key)
    }

    /// Text value of `key`, if present and not a bare flag.
    pub fn text(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(ArgValue::as_text)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ArgValue)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The raw class token expression: `cssclass`, falling back to `class`.
    pub fn css_class(&self) -> Option<&str> {
        self.text(CSS_CLASS_KEY).or_else(|| self.text(CLASS_KEY))
    }

    /// The user-requested width, verbatim.
    pub fn user_width(&self) -> Option<&str> {
        self.text(USER_WIDTH_KEY)
    }
}

impl FromIterator<(String, ArgValue)> for RenderingArguments {
    fn from_iter<I: IntoIterator<Item = (String, ArgValue)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Loosely structured input accepted by [`parse`].
#[derive(Debug, Clone)]
pub enum ArgInput {
    Text(String),
    Map(RenderingArguments),
    Json(serde_json::Value),
}

impl From<&str> for ArgInput {
    fn from(s: &str) -> Self {
        ArgInput::Text(s.to_string())
    }
}

impl From<String> for ArgInput {
    fn from(s: String) -> Self {
        ArgInput::Text(s)
    }
}

impl From<RenderingArguments> for ArgInput {
    fn from(args: RenderingArguments) -> Self {
        ArgInput::Map(args)
    }
}

impl From<serde_json::Value> for ArgInput {
    fn from(value: serde_json::Value) -> Self {
        ArgInput::Json(value)
    }
}

/// Normalize a rendering request into [`RenderingArguments`].
///
/// Maps pass through unchanged. Only JSON input can fail: anything other
/// than a string or an object of scalars is an [`ArgsError::InvalidArgument`].
pub fn parse(input: ArgInput) -> Result<RenderingArguments, ArgsError> {
    match input {
        ArgInput::Map(args) => Ok(args),
        ArgInput::Text(s) => Ok(parse_str(&s)),
        ArgInput::Json(value) => parse_json(value),
    }
}

/// Parse a `key=value;flag;key2=value2` argument string.
///
/// Each token is split on its first `=`, so `title=a=b` yields the value
/// `"a=b"`. Empty tokens (a trailing `;`) are skipped.
pub fn parse_str(s: &str) -> RenderingArguments {
    s.split(';')
        .filter(|token| !token.is_empty())
        .map(|token| match token.split_once('=') {
            Some((key, value)) => (key.to_string(), ArgValue::Text(value.to_string())),
            None => (token.to_string(), ArgValue::Flag),
        })
        .collect()
}

fn parse_json(value: serde_json::Value) -> Result<RenderingArguments, ArgsError> {
    use serde_json::Value;

    match value {
        Value::String(s) => Ok(parse_str(&s)),
        Value::Object(map) => {
            let mut args = RenderingArguments::new();
            for (key, value) in map {
                match value {
                    Value::String(s) => args.insert(key, ArgValue::Text(s)),
                    Value::Number(n) => args.insert(key, ArgValue::Text(n.to_string())),
                    Value::Bool(true) => args.insert(key, ArgValue::Flag),
                    Value::Bool(false) | Value::Null => {}
                    Value::Array(_) | Value::Object(_) => {
                        return Err(ArgsError::InvalidArgument(format!(
                            "argument '{key}' must be a scalar"
                        )));
                    }
                }
            }
            Ok(args)
        }
        other => Err(ArgsError::InvalidArgument(format!(
            "expected a string or a mapping, got {}",
            json_type_name(&other)
        ))),
    }
}

fn json_type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "a mapping",
    }
}
