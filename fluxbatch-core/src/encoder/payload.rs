use super::Encoder;
use crate::{Message, Result};

/// Emits the message payload as-is, optionally newline-terminated
#[derive(Debug, Clone)]
pub struct PayloadEncoder {
    /// Append `\n` when the payload does not already end with one
    pub append_newlines: bool,
}

impl PayloadEncoder {
    pub const NAME: &'static str = "payload";
}

impl Default for PayloadEncoder {
    fn default() -> Self {
        Self {
            append_newlines: true,
        }
    }
}

impl Encoder for PayloadEncoder {
    fn encode(&self, message: &Message) -> Result<Vec<u8>> {
        let payload = &message.payload;
        if payload.is_empty() {
            return Ok(Vec::new());
        }

        let mut out = Vec::with_capacity(payload.len() + 1);
        out.extend_from_slice(payload);
        if self.append_newlines && !payload.ends_with(b"\n") {
            out.push(b'\n');
        }
        Ok(out)
    }
}
