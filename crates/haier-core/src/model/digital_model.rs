// ── Device digital model ──
//
// Server-maintained snapshot of one device: its alarms (opaque) and its
// ordered attribute list. Parsing is lenient: attribute entries that do not
// conform are dropped and logged, the rest of the model stays usable.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use super::attribute::Attribute;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DigitalModel {
    #[serde(default)]
    pub alarms: Vec<Value>,
    #[serde(default)]
    pub attributes: Vec<Attribute>,
}

impl DigitalModel {
    /// Build a model from raw JSON, dropping attributes that fail to parse.
    ///
    /// Fails only when the value is not an object or `alarms`/`attributes`
    /// are present but not arrays.
    pub fn from_value_lenient(value: &Value) -> Result<Self, String> {
        let Some(object) = value.as_object() else {
            return Err(format!("expected a model object, found {}", kind(value)));
        };

        let alarms = match object.get("alarms") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => items.clone(),
            Some(other) => return Err(format!("`alarms` must be an array, found {}", kind(other))),
        };

        let raw_attributes = match object.get("attributes") {
            None | Some(Value::Null) => &[][..],
            Some(Value::Array(items)) => items.as_slice(),
            Some(other) => {
                return Err(format!("`attributes` must be an array, found {}", kind(other)));
            }
        };

        let attributes = raw_attributes
            .iter()
            .enumerate()
            .filter_map(|(index, raw)| match Attribute::deserialize(raw) {
                Ok(attr) => Some(attr),
                Err(e) => {
                    let name = raw.get("name").and_then(Value::as_str).unwrap_or("<unnamed>");
                    warn!(
                        index,
                        name,
                        error = %e,
                        "dropping malformed attribute"
                    );
                    None
                }
            })
            .collect();

        Ok(Self { alarms, attributes })
    }

    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.name == name)
    }

    /// Overwrite the current value of `name`. Returns `false` if the model
    /// has no such attribute.
    pub fn set_value(&mut self, name: &str, value: &str) -> bool {
        match self.attributes.iter_mut().find(|a| a.name == name) {
            Some(attr) => {
                attr.current_value = Some(value.to_owned());
                true
            }
            None => false,
        }
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
