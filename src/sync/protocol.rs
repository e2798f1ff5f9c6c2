//! Wire shapes of the remote store protocol.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::SyncError;

/// Body of a `mode=set` call. `data` is the snapshot pre-serialized to a
/// JSON string, so the stored value comes back double-encoded.
#[derive(Debug, Serialize)]
pub(crate) struct SaveRequest<'a> {
  pub data: String,
  pub password: &'a str,
  #[serde(rename = "safeIP")]
  pub safe_ip: &'a str,
  #[serde(rename = "expiredTime")]
  pub expired_time: u64,
  pub uuid: &'a str,
}

/// Body of a `mode=get` call.
#[derive(Debug, Serialize)]
pub(crate) struct GetRequest<'a> {
  pub uuid: &'a str,
  pub password: &'a str,
  #[serde(rename = "shouldDelete")]
  pub should_delete: bool,
}

/// Envelope the endpoint answers with. Older deployments report success via
/// `status: "success"`, newer ones via `code: 200`; either counts.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct ApiResponse {
  pub status: Option<String>,
  pub code: Option<u64>,
  #[serde(default)]
  pub data: Option<Value>,
  pub message: Option<String>,
}

impl ApiResponse {
  pub fn is_success(&self) -> bool {
    self.status.as_deref() == Some("success") || self.code == Some(200)
  }
}

/// Unwrap the data field of a successful get.
///
/// The stored value is usually a JSON-encoded string (double-encoded by
/// save), but some records hold a structured value directly; accept both.
pub(crate) fn unwrap_data(data: Value) -> Result<Value, SyncError> {
  match data {
    Value::String(raw) => serde_json::from_str(&raw).map_err(SyncError::CorruptPayload),
    structured => Ok(structured),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn save_request_matches_the_wire_shape() {
    let request = SaveRequest {
      data: "{\"timers\":[]}".to_string(),
      password: "hunter2",
      safe_ip: "*.*.*.*",
      expired_time: 1000,
      uuid: "slot-1",
    };

    let encoded = serde_json::to_value(&request).unwrap();

    assert_eq!(
      encoded,
      json!({
        "data": "{\"timers\":[]}",
        "password": "hunter2",
        "safeIP": "*.*.*.*",
        "expiredTime": 1000,
        "uuid": "slot-1",
      })
    );
  }

  #[test]
  fn success_is_reported_by_either_status_or_code() {
    let by_status: ApiResponse = serde_json::from_str(r#"{"status":"success"}"#).unwrap();
    let by_code: ApiResponse = serde_json::from_str(r#"{"code":200}"#).unwrap();
    let neither: ApiResponse = serde_json::from_str(r#"{"status":"error","code":500}"#).unwrap();

    assert!(by_status.is_success());
    assert!(by_code.is_success());
    assert!(!neither.is_success());
  }

  #[test]
  fn double_encoded_data_is_unwrapped() {
    let data = Value::String("{\"timers\":[1,2]}".to_string());

    let value = unwrap_data(data).unwrap();

    assert_eq!(value, json!({ "timers": [1, 2] }));
  }

  #[test]
  fn structured_data_is_passed_through() {
    let data = json!({ "timers": [] });

    let value = unwrap_data(data.clone()).unwrap();

    assert_eq!(value, data);
  }

  #[test]
  fn garbage_data_is_a_corrupt_payload() {
    let data = Value::String("not json at all".to_string());

    assert!(matches!(
      unwrap_data(data),
      Err(SyncError::CorruptPayload(_))
    ));
  }
}
