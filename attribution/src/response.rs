use serde::de::Error as _;
use serde::Deserialize;
use serde_json::Value;

use crate::sink::EventParams;

/// Attribution found by the match service. Every field is absent when nothing matched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct AttributionResult {
    #[serde(rename = "utm_source", default)]
    pub source: Option<String>,
    #[serde(rename = "utm_medium", default)]
    pub medium: Option<String>,
    #[serde(rename = "utm_campaign", default)]
    pub campaign: Option<String>,
}

impl AttributionResult {
    /// Parse a match response body. Only a JSON object is a valid answer.
    pub fn from_json(body: &str) -> serde_json::Result<Self> {
        match serde_json::from_str::<Value>(body)? {
            Value::Object(map) => serde_json::from_value(Value::Object(map)),
            other => Err(serde_json::Error::custom(format!(
                "expected a JSON object, got {}",
                json_kind(&other)
            ))),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.source.is_none() && self.medium.is_none() && self.campaign.is_none()
    }

    /// Each present field under both its `utm_` name and its bare name.
    pub fn to_params(&self) -> EventParams {
        let mut params = EventParams::new();
        for (field, value) in self.fields() {
            if let Some(value) = value {
                params.insert(format!("utm_{field}"), value.to_owned());
                params.insert(field.to_owned(), value.to_owned());
            }
        }
        params
    }

    pub(crate) fn fields(&self) -> [(&'static str, Option<&str>); 3] {
        [
            ("source", self.source.as_deref()),
            ("medium", self.medium.as_deref()),
            ("campaign", self.campaign.as_deref()),
        ]
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
