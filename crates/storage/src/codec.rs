//! Binary layout of a cache entry.
//!
//! ```text
//! +--------+----------------+-------------------+---------------------------+
//! | "GRST" | header len u32 | JSON header bytes | height*width f32 (LE)     |
//! +--------+----------------+-------------------+---------------------------+
//! ```
//!
//! The header carries the cache key, the raster shape and provenance.
//! Decoding checks every length, so a truncated or overwritten blob is
//! rejected instead of producing a misshapen raster.

use bytes::{BufMut, Bytes, BytesMut};
use chrono::{DateTime, Utc};
use goes_common::{Raster, RasterShape};
use serde::{Deserialize, Serialize};

use crate::error::{CacheError, CacheResult};

pub const MAGIC: &[u8; 4] = b"GRST";
pub const FORMAT_VERSION: u32 = 1;

/// Largest raster an entry may declare: a 0.5 km full-disk scene.
pub const MAX_ENTRY_PIXELS: usize = 21_696 * 21_696;

/// Header of a persisted entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntryMeta {
    pub format_version: u32,
    pub key: String,
    pub shape: RasterShape,
    pub fetch_timestamp: DateTime<Utc>,
    /// Archive object the raster was decoded from, when known.
    pub source_scene_id: Option<String>,
}

impl CacheEntryMeta {
    pub fn new(key: impl Into<String>, shape: RasterShape, source_scene_id: Option<String>) -> Self {
        Self {
            format_version: FORMAT_VERSION,
            key: key.into(),
            shape,
            fetch_timestamp: Utc::now(),
            source_scene_id,
        }
    }
}

/// A decoded entry.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub meta: CacheEntryMeta,
    pub raster: Raster,
}

pub fn encode_entry(meta: &CacheEntryMeta, raster: &Raster) -> CacheResult<Bytes> {
    if meta.shape != raster.shape() {
        return Err(CacheError::Codec(format!(
            "header shape {} does not match raster {}",
            meta.shape,
            raster.shape()
        )));
    }

    let header = serde_json::to_vec(meta).map_err(|e| CacheError::Codec(e.to_string()))?;
    let mut buf = BytesMut::with_capacity(8 + header.len() + raster.data().len() * 4);
    buf.put_slice(MAGIC);
    buf.put_u32_le(header.len() as u32);
    buf.put_slice(&header);
    for &v in raster.data() {
        buf.put_f32_le(v);
    }
    Ok(buf.freeze())
}

pub fn decode_entry(bytes: &[u8]) -> CacheResult<CacheEntry> {
    if bytes.len() < 8 || &bytes[..4] != MAGIC {
        return Err(CacheError::Codec("missing GRST magic".to_string()));
    }

    let header_len = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]) as usize;
    let header_end = 8usize
        .checked_add(header_len)
        .filter(|&end| end <= bytes.len())
        .ok_or_else(|| CacheError::Codec("header runs past end of blob".to_string()))?;

    let meta: CacheEntryMeta = serde_json::from_slice(&bytes[8..header_end])
        .map_err(|e| CacheError::Codec(format!("bad header: {}", e)))?;
    if meta.format_version != FORMAT_VERSION {
        return Err(CacheError::Codec(format!(
            "unsupported format version {}",
            meta.format_version
        )));
    }

    let expected = meta
        .shape
        .checked_len()
        .filter(|&n| n <= MAX_ENTRY_PIXELS)
        .and_then(|n| n.checked_mul(4))
        .ok_or_else(|| CacheError::Codec(format!("implausible raster shape {}", meta.shape)))?;

    let payload = &bytes[header_end..];
    if payload.len() != expected {
        return Err(CacheError::Codec(format!(
            "payload is {} bytes, shape {} needs {}",
            payload.len(),
            meta.shape,
            expected
        )));
    }

    let data = payload
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect();
    let raster = Raster::from_shape_vec(meta.shape, data);

    Ok(CacheEntry { meta, raster })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> (CacheEntryMeta, Raster) {
        let raster =
            Raster::new(RasterShape::new(2, 2), vec![280.5, f32::NAN, 0.0, -1.25]).unwrap();
        let meta = CacheEntryMeta::new(
            "east/full-disk/C13/x2/2019/03/01/1700.grst",
            raster.shape(),
            Some("OR_ABI-L2-CMIPF-M6C13_G16_s20190601700".to_string()),
        );
        (meta, raster)
    }

    #[test]
    fn test_decode_preserves_nan_and_zero() {
        let (meta, raster) = sample();
        let bytes = encode_entry(&meta, &raster).unwrap();
        let entry = decode_entry(&bytes).unwrap();

        assert_eq!(entry.meta, meta);
        assert!(entry.raster.bitwise_eq(&raster));
    }

    #[test]
    fn test_truncated_payload_rejected() {
        let (meta, raster) = sample();
        let bytes = encode_entry(&meta, &raster).unwrap();
        let truncated = &bytes[..bytes.len() - 3];
        assert!(matches!(decode_entry(truncated), Err(CacheError::Codec(_))));
    }

    #[test]
    fn test_garbage_rejected() {
        assert!(decode_entry(b"").is_err());
        assert!(decode_entry(b"not a cache entry").is_err());
        assert!(decode_entry(b"GRST\xff\xff\xff\xff{}").is_err());
    }

    fn blob_with_header(header: &str, payload_len: usize) -> Vec<u8> {
        let mut blob = MAGIC.to_vec();
        blob.extend_from_slice(&(header.len() as u32).to_le_bytes());
        blob.extend_from_slice(header.as_bytes());
        blob.extend(std::iter::repeat(0u8).take(payload_len));
        blob
    }

    #[test]
    fn test_overflowing_shape_rejected() {
        let header = format!(
            r#"{{"format_version":1,"key":"k","shape":{{"height":{},"width":16}},"fetch_timestamp":"2019-03-01T17:00:00Z","source_scene_id":null}}"#,
            1u64 << 62
        );
        let err = decode_entry(&blob_with_header(&header, 64)).unwrap_err();
        assert!(matches!(err, CacheError::Codec(msg) if msg.contains("implausible")));
    }

    #[test]
    fn test_oversized_shape_rejected() {
        let header = r#"{"format_version":1,"key":"k","shape":{"height":100000,"width":100000},"fetch_timestamp":"2019-03-01T17:00:00Z","source_scene_id":null}"#;
        assert!(matches!(decode_entry(&blob_with_header(header, 16)), Err(CacheError::Codec(_))));
    }

    #[test]
    fn test_shape_disagreement_rejected_on_encode() {
        let (mut meta, raster) = sample();
        meta.shape = RasterShape::new(4, 1);
        assert!(encode_entry(&meta, &raster).is_err());
    }
}
