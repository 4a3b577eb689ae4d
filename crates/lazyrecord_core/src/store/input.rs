//! Inbound data accepted by inserts and field writes.
//!
//! # Responsibility
//! - Represent raw values, record references, nested data objects, lists and
//!   ADD/DELETE command lists in one type.
//! - Convert JSON payloads into that type.
//!
//! # Invariants
//! - A JSON array is a command list only when every element is an
//!   `["ADD"|"DELETE", value]` pair.

use crate::model::value::{Markup, Value};
use crate::store::record::Record;
use chrono::NaiveDateTime;
use std::collections::BTreeMap;

/// Raw input for a field write or an insert.
#[derive(Debug, Clone)]
pub enum Input {
    Value(Value),
    Record(Record),
    Data(Data),
    List(Vec<Input>),
    Commands(Vec<Command>),
}

/// One step of a command list applied to a relation.
#[derive(Debug, Clone)]
pub enum Command {
    Add(Input),
    Delete(Input),
}

impl Command {
    pub fn add(input: impl Into<Input>) -> Self {
        Self::Add(input.into())
    }

    pub fn delete(input: impl Into<Input>) -> Self {
        Self::Delete(input.into())
    }
}

/// Field name to input map, applied in field declaration order.
#[derive(Debug, Clone, Default)]
pub struct Data(BTreeMap<String, Input>);

impl Data {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`Data::insert`].
    pub fn field(mut self, name: impl Into<String>, input: impl Into<Input>) -> Self {
        self.insert(name, input);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, input: impl Into<Input>) {
        self.0.insert(name.into(), input.into());
    }

    pub fn get(&self, name: &str) -> Option<&Input> {
        self.0.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub(crate) fn take(&mut self, name: &str) -> Option<Input> {
        self.0.remove(name)
    }
}

/// Per-call insert options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InsertOptions {
    /// Trust string values written to `html` fields as markup.
    pub html: bool,
}

impl InsertOptions {
    pub fn trusted() -> Self {
        Self { html: true }
    }
}

impl Input {
    /// Builds a list input from any iterable of inputs.
    pub fn list<I: Into<Input>>(items: impl IntoIterator<Item = I>) -> Self {
        Self::List(items.into_iter().map(Into::into).collect())
    }

    pub fn is_empty_value(&self) -> bool {
        match self {
            Self::Value(Value::Undefined | Value::Null | Value::Bool(false)) => true,
            Self::List(items) => items.is_empty(),
            _ => false,
        }
    }

    pub(crate) fn kind_name(&self) -> &'static str {
        match self {
            Self::Value(_) => "value",
            Self::Record(_) => "record",
            Self::Data(_) => "data",
            Self::List(_) => "list",
            Self::Commands(_) => "command list",
        }
    }
}

impl From<Value> for Input {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

impl From<&str> for Input {
    fn from(value: &str) -> Self {
        Self::Value(value.into())
    }
}

impl From<String> for Input {
    fn from(value: String) -> Self {
        Self::Value(value.into())
    }
}

impl From<bool> for Input {
    fn from(value: bool) -> Self {
        Self::Value(value.into())
    }
}

impl From<i64> for Input {
    fn from(value: i64) -> Self {
        Self::Value(value.into())
    }
}

impl From<i32> for Input {
    fn from(value: i32) -> Self {
        Self::Value(value.into())
    }
}

impl From<f64> for Input {
    fn from(value: f64) -> Self {
        Self::Value(value.into())
    }
}

impl From<Markup> for Input {
    fn from(value: Markup) -> Self {
        Self::Value(value.into())
    }
}

impl From<NaiveDateTime> for Input {
    fn from(value: NaiveDateTime) -> Self {
        Self::Value(value.into())
    }
}

impl From<Record> for Input {
    fn from(value: Record) -> Self {
        Self::Record(value)
    }
}

impl From<&Record> for Input {
    fn from(value: &Record) -> Self {
        Self::Record(value.clone())
    }
}

impl From<Option<Record>> for Input {
    fn from(value: Option<Record>) -> Self {
        value.map_or(Self::Value(Value::Undefined), Self::Record)
    }
}

impl From<Data> for Input {
    fn from(value: Data) -> Self {
        Self::Data(value)
    }
}

impl From<Vec<Input>> for Input {
    fn from(value: Vec<Input>) -> Self {
        Self::List(value)
    }
}

impl From<Vec<Record>> for Input {
    fn from(value: Vec<Record>) -> Self {
        Self::list(value)
    }
}

impl From<Vec<Data>> for Input {
    fn from(value: Vec<Data>) -> Self {
        Self::list(value)
    }
}

impl From<Vec<Command>> for Input {
    fn from(value: Vec<Command>) -> Self {
        Self::Commands(value)
    }
}

impl From<serde_json::Value> for Input {
    fn from(value: serde_json::Value) -> Self {
        use serde_json::Value as Json;
        match value {
            Json::Null => Self::Value(Value::Null),
            Json::Bool(flag) => Self::Value(Value::Bool(flag)),
            Json::Number(number) => match number.as_i64() {
                Some(integer) => Self::Value(Value::Int(integer)),
                None => number
                    .as_f64()
                    .map_or(Self::Value(Value::Undefined), |float| {
                        Self::Value(Value::Float(float))
                    }),
            },
            Json::String(text) => Self::Value(Value::Str(text)),
            Json::Array(items) => match json_commands(&items) {
                Some(commands) => Self::Commands(commands),
                None => Self::List(items.into_iter().map(Self::from).collect()),
            },
            Json::Object(map) => Self::Data(Data(
                map.into_iter()
                    .map(|(name, item)| (name, Self::from(item)))
                    .collect(),
            )),
        }
    }
}

fn json_commands(items: &[serde_json::Value]) -> Option<Vec<Command>> {
    if items.is_empty() {
        return None;
    }
    items
        .iter()
        .map(|item| {
            let pair = item.as_array()?;
            if pair.len() != 2 {
                return None;
            }
            let payload = Input::from(pair[1].clone());
            match pair[0].as_str()? {
                "ADD" => Some(Command::Add(payload)),
                "DELETE" => Some(Command::Delete(payload)),
                _ => None,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{Command, Data, Input};
    use crate::model::value::Value;
    use serde_json::json;

    #[test]
    fn json_object_becomes_data_with_nested_values() {
        let input = Input::from(json!({ "id": 1, "body": "<p>hello</p>", "draft": null }));
        let Input::Data(data) = input else {
            panic!("object must become data");
        };
        assert_eq!(data.len(), 3);
        assert!(matches!(data.get("id"), Some(Input::Value(Value::Int(1)))));
        assert!(matches!(data.get("draft"), Some(Input::Value(Value::Null))));
    }

    #[test]
    fn json_command_pairs_become_command_list() {
        let input = Input::from(json!([["ADD", { "name": "John" }], ["DELETE", "Marc"]]));
        let Input::Commands(commands) = input else {
            panic!("pairs must become commands");
        };
        assert!(matches!(commands[0], Command::Add(Input::Data(_))));
        assert!(matches!(
            &commands[1],
            Command::Delete(Input::Value(Value::Str(name))) if name == "Marc"
        ));
    }

    #[test]
    fn mixed_json_array_stays_a_plain_list() {
        let input = Input::from(json!([["ADD", 1], 2]));
        assert!(matches!(input, Input::List(items) if items.len() == 2));
        assert!(matches!(Input::from(json!([])), Input::List(items) if items.is_empty()));
    }

    #[test]
    fn empty_values_cover_undefined_false_and_empty_list() {
        assert!(Input::Value(Value::Undefined).is_empty_value());
        assert!(Input::from(false).is_empty_value());
        assert!(Input::List(Vec::new()).is_empty_value());
        assert!(!Input::from(Data::new()).is_empty_value());
        assert!(!Input::from(0).is_empty_value());
    }
}
