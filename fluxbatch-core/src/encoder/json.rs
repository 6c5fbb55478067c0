use super::Encoder;
use crate::{BatchError, FieldValue, Message, Result, Timestamp};
use serde::Serialize;
use std::borrow::Cow;
use std::collections::BTreeMap;
use uuid::Uuid;

/// One JSON object per message, newline-terminated
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonEncoder;

impl JsonEncoder {
    pub const NAME: &'static str = "json";
}

#[derive(Serialize)]
struct JsonRecord<'a> {
    uuid: &'a Uuid,
    timestamp: Timestamp,
    #[serde(rename = "type")]
    msg_type: &'a str,
    logger: &'a str,
    hostname: &'a str,
    severity: i32,
    payload: Cow<'a, str>,
    fields: &'a BTreeMap<String, FieldValue>,
}

impl Encoder for JsonEncoder {
    fn encode(&self, message: &Message) -> Result<Vec<u8>> {
        let record = JsonRecord {
            uuid: &message.uuid,
            timestamp: message.timestamp,
            msg_type: &message.msg_type,
            logger: &message.logger,
            hostname: &message.hostname,
            severity: message.severity,
            payload: String::from_utf8_lossy(&message.payload),
            fields: &message.fields.0,
        };

        let mut out = serde_json::to_vec(&record).map_err(|e| BatchError::Encode(e.to_string()))?;
        out.push(b'\n');
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_line() {
        let msg = Message::new("GET /index.html").with_field("status", 200i64);
        let bytes = JsonEncoder.encode(&msg).unwrap();

        assert_eq!(bytes.last(), Some(&b'\n'));
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["payload"], "GET /index.html");
        assert_eq!(value["fields"]["status"]["Integer"], 200);
    }

    #[test]
    fn test_json_nan_field_is_null() {
        let msg = Message::new("x").with_field("ratio", f64::NAN);
        let value: serde_json::Value = serde_json::from_slice(&JsonEncoder.encode(&msg).unwrap()).unwrap();
        assert!(value["fields"]["ratio"]["Float"].is_null());
    }
}
