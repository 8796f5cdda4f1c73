//! Payload serialization: bincode, optional zlib, optional row-chunking.
//!
//! A payload whose serialized size exceeds `chunk_threshold_bytes` is split
//! into K roughly equal row slices and each slice is encoded on its own. The
//! decoder gets the K blobs plus their raw (pre-compression) sizes and fails
//! as a whole if any blob is damaged.

use std::io::{Read, Write};

use chrono::{DateTime, Utc};
use flate2::{Compression, read::ZlibDecoder, write::ZlibEncoder};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tca_engine::models::{MarketSeries, TradeTable};

use crate::error::CodecError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CodecConfig {
    pub chunk_threshold_bytes: usize,
    pub compress: bool,
    /// zlib level, 0-9.
    pub level: u32,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            chunk_threshold_bytes: 4 * 1024 * 1024,
            compress: true,
            level: 6,
        }
    }
}

/// A row-oriented value the cache can store.
pub trait Payload: Serialize + DeserializeOwned + Clone + Send + Sync {
    fn row_count(&self) -> usize;

    /// Splits into at most `parts` contiguous row slices, in order.
    fn split_rows(&self, parts: usize) -> Vec<Self>;

    /// Inverse of [`Payload::split_rows`].
    fn concat(parts: Vec<Self>) -> Result<Self, CodecError>;

    /// First and last timestamp covered, if any rows.
    fn time_span(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)>;
}

fn chunk_len(rows: usize, parts: usize) -> usize {
    rows.div_ceil(parts.max(1)).max(1)
}

impl Payload for MarketSeries {
    fn row_count(&self) -> usize {
        self.ticks.len()
    }

    fn split_rows(&self, parts: usize) -> Vec<Self> {
        if self.ticks.is_empty() {
            return vec![self.clone()];
        }
        self.ticks
            .chunks(chunk_len(self.ticks.len(), parts))
            .map(|c| MarketSeries::new(self.ticker.clone(), c.to_vec()))
            .collect()
    }

    fn concat(parts: Vec<Self>) -> Result<Self, CodecError> {
        let mut iter = parts.into_iter();
        let mut first = iter
            .next()
            .ok_or_else(|| CodecError::Concat("no market chunks".into()))?;
        for part in iter {
            if part.ticker != first.ticker {
                return Err(CodecError::Concat(format!(
                    "ticker mismatch: {} vs {}",
                    first.ticker, part.ticker
                )));
            }
            first.ticks.extend(part.ticks);
        }
        Ok(first)
    }

    fn time_span(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        Some((self.first_timestamp()?, self.last_timestamp()?))
    }
}

impl Payload for TradeTable {
    fn row_count(&self) -> usize {
        self.rows.len()
    }

    fn split_rows(&self, parts: usize) -> Vec<Self> {
        if self.rows.is_empty() {
            return vec![self.clone()];
        }
        self.rows
            .chunks(chunk_len(self.rows.len(), parts))
            .map(|c| TradeTable::new(self.kind, c.to_vec()))
            .collect()
    }

    fn concat(parts: Vec<Self>) -> Result<Self, CodecError> {
        let mut iter = parts.into_iter();
        let mut first = iter
            .next()
            .ok_or_else(|| CodecError::Concat("no trade chunks".into()))?;
        for part in iter {
            if part.kind != first.kind {
                return Err(CodecError::Concat(format!(
                    "kind mismatch: {} vs {}",
                    first.kind, part.kind
                )));
            }
            first.rows.extend(part.rows);
        }
        Ok(first)
    }

    fn time_span(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        Some((self.rows.first()?.timestamp, self.rows.last()?.timestamp))
    }
}

/// Output of [`PayloadCodec::encode`].
#[derive(Debug, Clone, PartialEq)]
pub struct Encoded {
    pub blobs: Vec<Vec<u8>>,
    /// Serialized size of each blob before compression.
    pub raw_sizes: Vec<u64>,
    pub compressed: bool,
}

impl Encoded {
    pub fn chunk_count(&self) -> usize {
        self.blobs.len()
    }
}

#[derive(Debug, Clone, Default)]
pub struct PayloadCodec {
    config: CodecConfig,
}

impl PayloadCodec {
    pub fn new(config: CodecConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CodecConfig {
        &self.config
    }

    pub fn encode<T: Payload>(&self, payload: &T) -> Result<Encoded, CodecError> {
        let whole = serialize(payload)?;
        let threshold = self.config.chunk_threshold_bytes.max(1);
        let rows = payload.row_count();

        let raws = if whole.len() <= threshold || rows <= 1 {
            vec![whole]
        } else {
            let k = whole.len().div_ceil(threshold).min(rows);
            payload
                .split_rows(k)
                .iter()
                .map(serialize)
                .collect::<Result<Vec<_>, _>>()?
        };

        let raw_sizes = raws.iter().map(|r| r.len() as u64).collect();
        let blobs = if self.config.compress {
            raws.iter()
                .map(|r| compress(r, self.config.level))
                .collect::<Result<Vec<_>, _>>()?
        } else {
            raws
        };

        Ok(Encoded {
            blobs,
            raw_sizes,
            compressed: self.config.compress,
        })
    }

    /// Reassembles a payload. Any damaged blob fails the whole decode.
    pub fn decode<T: Payload>(
        &self,
        blobs: &[Vec<u8>],
        raw_sizes: &[u64],
        compressed: bool,
    ) -> Result<T, CodecError> {
        if blobs.len() != raw_sizes.len() || blobs.is_empty() {
            return Err(CodecError::ChunkCount {
                expected: raw_sizes.len(),
                actual: blobs.len(),
            });
        }
        let mut parts = Vec::with_capacity(blobs.len());
        for (index, (blob, &expected)) in blobs.iter().zip(raw_sizes).enumerate() {
            let raw = if compressed {
                decompress(blob, expected)?
            } else {
                blob.clone()
            };
            if raw.len() as u64 != expected {
                return Err(CodecError::SizeMismatch {
                    index,
                    expected,
                    actual: raw.len() as u64,
                });
            }
            parts.push(deserialize::<T>(&raw)?);
        }
        T::concat(parts)
    }
}

/// bincode (serde mode, standard config).
pub fn serialize<T: Serialize>(value: &T) -> Result<Vec<u8>, CodecError> {
    Ok(bincode::serde::encode_to_vec(value, bincode::config::standard())?)
}

pub fn deserialize<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, CodecError> {
    let (value, _) = bincode::serde::decode_from_slice::<T, _>(bytes, bincode::config::standard())?;
    Ok(value)
}

fn compress(raw: &[u8], level: u32) -> Result<Vec<u8>, CodecError> {
    let mut enc = ZlibEncoder::new(Vec::new(), Compression::new(level.min(9)));
    enc.write_all(raw)?;
    Ok(enc.finish()?)
}

/// Inflates at most `expected + 1` bytes; anything longer fails the size check.
fn decompress(blob: &[u8], expected: u64) -> Result<Vec<u8>, CodecError> {
    let mut out = Vec::new();
    ZlibDecoder::new(blob)
        .take(expected.saturating_add(1))
        .read_to_end(&mut out)?;
    Ok(out)
}
