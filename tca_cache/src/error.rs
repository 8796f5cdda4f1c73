use tca_engine::TcaError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("Failed to serialize payload: {0}")]
    Encode(#[from] bincode::error::EncodeError),

    #[error("Failed to deserialize chunk: {0}")]
    Decode(#[from] bincode::error::DecodeError),

    #[error("Compression I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Chunk {index} decompressed to {actual} bytes, expected {expected}")]
    SizeMismatch {
        index: usize,
        expected: u64,
        actual: u64,
    },

    #[error("Expected {expected} chunks, got {actual}")]
    ChunkCount { expected: usize, actual: usize },

    #[error("Cannot reassemble chunks: {0}")]
    Concat(String),
}

#[derive(Debug, Error)]
pub enum CacheError {
    /// The backing key/value service is unreachable or timed out.
    #[error("Cache backend unavailable: {0}")]
    Unavailable(String),

    #[error("Cache codec error: {0}")]
    Codec(#[from] CodecError),

    /// An entry with a different, overlapping span already lives under the key.
    #[error("Write conflict on {key}: existing span {existing}, incoming span {incoming}")]
    WriteConflict {
        key: String,
        existing: String,
        incoming: String,
    },
}

impl From<CacheError> for TcaError {
    fn from(e: CacheError) -> Self {
        match e {
            CacheError::Unavailable(msg) => TcaError::TransientInfra(format!("cache: {msg}")),
            CacheError::WriteConflict {
                key,
                existing,
                incoming,
            } => TcaError::CacheWriteConflict {
                key,
                message: format!("existing span {existing} overlaps incoming span {incoming}"),
            },
            CacheError::Codec(c) => TcaError::TransientInfra(format!("cache codec: {c}")),
        }
    }
}
