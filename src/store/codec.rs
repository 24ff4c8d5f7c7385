//! JSON envelope for stored values and published messages

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::{Result, StoreError};

/// Encode a value for the backing store.
pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<String> {
  serde_json::to_string(value).map_err(StoreError::Serialize)
}

/// Decode a stored value. Anything that is not valid JSON comes back as the
/// raw string, so values written by non-JSON writers stay readable.
pub fn decode(raw: String) -> Value {
  match serde_json::from_str::<Value>(&raw) {
    Ok(value) => value,
    Err(_) => Value::String(raw),
  }
}

/// Decode a stored value into `T`, trying the JSON form first and the raw
/// string second.
pub fn decode_as<T: DeserializeOwned>(key: &str, raw: String) -> Result<T> {
  match serde_json::from_str::<T>(&raw) {
    Ok(value) => Ok(value),
    Err(json_err) => serde_json::from_value::<T>(Value::String(raw)).map_err(|_| {
      StoreError::Decode {
        key: key.to_string(),
        source: json_err,
      }
    }),
  }
}

/// Strict decode used for pub/sub payloads; no raw fallback.
pub fn decode_message(raw: &str) -> std::result::Result<Value, serde_json::Error> {
  serde_json::from_str(raw)
}
