//! Embedding blob codec: little-endian f32 bytes.

use rollcall_core::Embedding;
use thiserror::Error;

#[derive(Debug, Error)]
#[error("embedding blob length {0} is not a multiple of 4")]
pub struct CodecError(pub usize);

pub fn encode_embedding(embedding: &Embedding) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(embedding.values.len() * 4);
    for value in &embedding.values {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

pub fn decode_embedding(bytes: &[u8]) -> Result<Embedding, CodecError> {
    if bytes.len() % 4 != 0 {
        return Err(CodecError(bytes.len()));
    }
    let values = bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect();
    Ok(Embedding::new(values))
}
