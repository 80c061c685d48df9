//! Audio decoding and the admission pipeline that gates what reaches the engine

mod admission;
pub(crate) mod decode;

pub use admission::{AdmissionPolicy, AudioAdmission, StagedAudio};
pub use decode::{AudioDecoder, DecodedAudio, SymphoniaDecoder};
