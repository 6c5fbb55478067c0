use super::Encoder;
use crate::{BatchError, Message, Result};

/// Length-prefixed bincode serialization of the whole message
#[derive(Debug, Clone, Copy, Default)]
pub struct BincodeEncoder;

impl BincodeEncoder {
    pub const NAME: &'static str = "bincode";
}

impl Encoder for BincodeEncoder {
    fn encode(&self, message: &Message) -> Result<Vec<u8>> {
        let body = bincode::serialize(message).map_err(|e| BatchError::Encode(e.to_string()))?;

        // u32 LE length prefix keeps records separable inside a batch
        let len = u32::try_from(body.len())
            .map_err(|_| BatchError::Encode(format!("message too large: {} bytes", body.len())))?;
        let mut out = Vec::with_capacity(4 + body.len());
        out.extend_from_slice(&len.to_le_bytes());
        out.extend_from_slice(&body);
        Ok(out)
    }
}
