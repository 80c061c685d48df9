//! MessagePack envelope for wire messages.
//!
//! Messages are encoded as maps keyed by field name so that optional fields
//! can be added without breaking existing peers.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{Error, Result};
use crate::messaging::schemas::{AudioRequest, TranscriptionResponse};

fn encode<T: Serialize>(message: &T) -> Result<Vec<u8>> {
    Ok(rmp_serde::to_vec_named(message)?)
}

fn decode<T: DeserializeOwned>(bytes: &[u8], schema: &str) -> Result<T> {
    rmp_serde::from_slice(bytes)
        .map_err(|e| Error::Decode(format!("Failed to deserialize {schema}: {e}")))
}

pub fn encode_request(request: &AudioRequest) -> Result<Vec<u8>> {
    encode(request)
}

pub fn decode_request(bytes: &[u8]) -> Result<AudioRequest> {
    decode(bytes, "AudioRequest")
}

pub fn encode_response(response: &TranscriptionResponse) -> Result<Vec<u8>> {
    encode(response)
}

pub fn decode_response(bytes: &[u8]) -> Result<TranscriptionResponse> {
    decode(bytes, "TranscriptionResponse")
}
