// ── Digital model attribute ──
//
// One named, typed property of a device. The serde shape matches the wire
// JSON so cached files look exactly like what the cloud sends.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Access flags of an attribute.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeFlags {
    #[serde(default)]
    pub readable: bool,
    #[serde(default)]
    pub writable: bool,
    #[serde(default)]
    pub invisible: bool,
}

/// A single property of a device's digital model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attribute {
    pub name: String,
    #[serde(default, rename = "desc")]
    pub description: String,
    #[serde(flatten)]
    pub flags: AttributeFlags,
    #[serde(
        default,
        rename = "value",
        deserialize_with = "opt_scalar",
        skip_serializing_if = "Option::is_none"
    )]
    pub current_value: Option<String>,
    #[serde(default, deserialize_with = "opt_scalar", skip_serializing_if = "Option::is_none")]
    pub default_value: Option<String>,
    pub value_range: ValueRange,
}

/// Value constraint of an attribute, tagged by `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ValueRange {
    #[serde(rename = "STEP")]
    Step {
        #[serde(rename = "dataStep")]
        data_step: StepRange,
    },
    #[serde(rename = "LIST")]
    List {
        #[serde(rename = "dataList", default)]
        data_list: Vec<ListItem>,
    },
    #[serde(rename = "DATE")]
    Date {
        #[serde(rename = "dataDate", default)]
        data_date: TemporalRange,
    },
    #[serde(rename = "TIME")]
    Time {
        #[serde(rename = "dataTime", default)]
        data_time: TemporalRange,
    },
}

/// Numeric range with a fixed step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepRange {
    #[serde(default)]
    pub data_type: String,
    #[serde(deserialize_with = "scalar")]
    pub step: String,
    #[serde(deserialize_with = "scalar")]
    pub min_value: String,
    #[serde(deserialize_with = "scalar")]
    pub max_value: String,
}

/// One allowed value of a `LIST` attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListItem {
    #[serde(deserialize_with = "scalar")]
    pub data: String,
    #[serde(default)]
    pub desc: String,
}

/// Bounds of a `DATE` or `TIME` attribute.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemporalRange {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(default, deserialize_with = "opt_scalar", skip_serializing_if = "Option::is_none")]
    pub min_value: Option<String>,
    #[serde(default, deserialize_with = "opt_scalar", skip_serializing_if = "Option::is_none")]
    pub max_value: Option<String>,
}

impl Attribute {
    /// The current value, falling back to the declared default.
    pub fn effective_value(&self) -> Option<&str> {
        self.current_value
            .as_deref()
            .or(self.default_value.as_deref())
    }

    /// Short label for the constraint kind.
    pub fn range_kind(&self) -> &'static str {
        match self.value_range {
            ValueRange::Step { .. } => "STEP",
            ValueRange::List { .. } => "LIST",
            ValueRange::Date { .. } => "DATE",
            ValueRange::Time { .. } => "TIME",
        }
    }
}

// The cloud is inconsistent about quoting numbers and booleans; accept any
// scalar and keep its textual form.
fn scalar_to_string(value: Value) -> Result<String, String> {
    match value {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        other => Err(format!("expected a scalar, found {other}")),
    }
}

fn scalar<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    scalar_to_string(Value::deserialize(deserializer)?).map_err(serde::de::Error::custom)
}

fn opt_scalar<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(None),
        other => scalar_to_string(other)
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}
