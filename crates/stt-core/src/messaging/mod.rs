//! Wire messages exchanged over the request and response streams.

mod codec;
mod schemas;

pub use codec::{decode_request, decode_response, encode_request, encode_response};
pub use schemas::{AudioFormat, AudioRequest, ResponseStatus, TranscriptionResponse};
