use std::fmt::{Display, Formatter};

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Value};

/// The unified failure of a fetch.
///
/// All variants are treated alike by the dashboard: shown once, after which
/// the affected sensor is no longer polled.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ErrorValue {
    /// The server answered with a status other than 200.
    #[error("{0}")]
    Status(u16),
    /// The server reported an error in its payload.
    #[error("{0}")]
    Application(String),
    /// The payload could not be decoded.
    #[error("{0}")]
    Parse(String),
    /// The request did not complete (connect failure, timeout).
    #[error("{0}")]
    Request(String),
}

impl ErrorValue {
    /// The error as the single-key mapping `{"ERROR": ...}`.
    pub fn to_json(&self) -> Value {
        match self {
            ErrorValue::Status(code) => json!({ "ERROR": code }),
            ErrorValue::Application(message)
            | ErrorValue::Parse(message)
            | ErrorValue::Request(message) => json!({ "ERROR": message }),
        }
    }
}

/// A scalar cell as sent by the server.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    #[default]
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

impl Display for Scalar {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Scalar::Null => Ok(()),
            Scalar::Bool(value) => write!(f, "{value}"),
            Scalar::Integer(value) => write!(f, "{value}"),
            Scalar::Float(value) => write!(f, "{value}"),
            Scalar::Text(value) => f.write_str(value),
        }
    }
}

/// One reading object of the `data` array, before assembly.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RawReading {
    #[serde(deserialize_with = "lenient_integer")]
    pub address: i64,
    pub gas: String,
    #[serde(deserialize_with = "lenient_float")]
    pub timestamp: f64,
    pub unit: String,
    #[serde(deserialize_with = "lenient_float")]
    pub float_value: f64,
    #[serde(default)]
    pub warmup1: Scalar,
    #[serde(default)]
    pub warmup2: Scalar,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrText {
    Integer(i64),
    Float(f64),
    Text(String),
}

fn lenient_integer<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    match NumberOrText::deserialize(deserializer)? {
        NumberOrText::Integer(value) => Ok(value),
        NumberOrText::Float(value) if value.fract() == 0.0 => Ok(value as i64),
        NumberOrText::Float(value) => Err(D::Error::custom(format!(
            "expected an integer, found {value}"
        ))),
        NumberOrText::Text(text) => text
            .trim()
            .parse()
            .map_err(|_| D::Error::custom(format!("invalid literal for an integer: {text:?}"))),
    }
}

fn lenient_float<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    match NumberOrText::deserialize(deserializer)? {
        NumberOrText::Integer(value) => Ok(value as f64),
        NumberOrText::Float(value) => Ok(value),
        NumberOrText::Text(text) => text
            .trim()
            .parse()
            .map_err(|_| D::Error::custom(format!("could not convert to a number: {text:?}"))),
    }
}

/// Interprets an HTTP response: the rows of the `data` array, or the error it carries.
pub fn parse_response(status: u16, body: &[u8]) -> Result<Vec<RawReading>, ErrorValue> {
    if status != 200 {
        return Err(ErrorValue::Status(status));
    }

    let document: Value =
        serde_json::from_slice(body).map_err(|e| ErrorValue::Parse(e.to_string()))?;

    if let Some(message) = document.get("Error") {
        let message = match message {
            Value::String(text) => text.clone(),
            other => other.to_string(),
        };
        return Err(ErrorValue::Application(message));
    }

    let data = document
        .get("data")
        .cloned()
        .ok_or_else(|| ErrorValue::Parse(String::from("response has no \"data\" field")))?;

    serde_json::from_value(data).map_err(|e| ErrorValue::Parse(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn non_200_status_is_an_error_carrying_the_code() {
        let error = parse_response(404, b"not found").unwrap_err();
        assert_eq!(error, ErrorValue::Status(404));
        assert_eq!(error.to_json(), json!({ "ERROR": 404 }));
        assert_eq!(error.to_string(), "404");
    }

    #[test]
    fn server_error_field_becomes_application_error() {
        let error = parse_response(200, br#"{"Error": "x"}"#).unwrap_err();
        assert_eq!(error, ErrorValue::Application("x".into()));
        assert_eq!(error.to_json(), json!({ "ERROR": "x" }));
    }

    #[test]
    fn error_field_wins_over_data() {
        let error = parse_response(200, br#"{"Error": "no table", "data": []}"#).unwrap_err();
        assert_eq!(error, ErrorValue::Application("no table".into()));
    }

    #[test]
    fn malformed_body_is_a_parse_error() {
        let error = parse_response(200, b"<html>").unwrap_err();
        assert!(matches!(error, ErrorValue::Parse(_)));
    }

    #[test]
    fn missing_data_is_a_parse_error() {
        let error = parse_response(200, br#"{"rows": []}"#).unwrap_err();
        assert!(matches!(error, ErrorValue::Parse(ref m) if m.contains("data")));
    }

    #[test]
    fn rows_are_returned_in_server_order() {
        let body = br#"{"data": [
            {"address": "1", "gas": "CO2", "timestamp": 1700000001.5, "unit": "ppm",
             "float_value": 415.2, "warmup1": 0, "warmup2": "done"},
            {"address": 1, "gas": "CO2", "timestamp": "1700000000", "unit": "ppm",
             "float_value": 410, "warmup1": 1, "warmup2": null}
        ]}"#;
        let rows = parse_response(200, body).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].address, 1);
        assert_eq!(rows[0].timestamp, 1700000001.5);
        assert_eq!(rows[0].warmup2, Scalar::Text("done".into()));
        assert_eq!(rows[1].timestamp, 1700000000.0);
        assert_eq!(rows[1].float_value, 410.0);
        assert_eq!(rows[1].warmup2, Scalar::Null);
    }

    #[test]
    fn undecodable_row_is_a_parse_error() {
        let body = br#"{"data": [{"address": "one", "gas": "CO2", "timestamp": 1,
            "unit": "ppm", "float_value": 1.0, "warmup1": 0, "warmup2": 0}]}"#;
        let error = parse_response(200, body).unwrap_err();
        assert!(matches!(error, ErrorValue::Parse(_)));
    }
}
