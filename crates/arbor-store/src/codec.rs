//! Binary framing of part files.
//!
//! Layout (all integers big-endian):
//!
//! ```text
//! magic "ARBP" | version u32 | crc32 u32 | payload length u64 | zstd(payload)
//! ```
//!
//! `payload` is the bincode encoding of the part's entries. The part's name
//! is the content hash of `payload`, and the CRC covers the compressed bytes.

use arbor_types::{Entry, PartName};

use crate::error::{StoreError, StoreResult};

pub const PART_MAGIC: &[u8; 4] = b"ARBP";
pub const PART_VERSION: u32 = 1;
const HEADER_LEN: usize = 4 + 4 + 4 + 8;
const ZSTD_LEVEL: i32 = 3;

/// Bincode payload of a part's entries.
pub fn encode_payload(entries: &[Entry]) -> StoreResult<Vec<u8>> {
    bincode::serialize(entries).map_err(|e| StoreError::Serialization(e.to_string()))
}

/// Encode a part: returns its content name and the framed file bytes.
pub fn encode_part(entries: &[Entry]) -> StoreResult<(PartName, Vec<u8>)> {
    let payload = encode_payload(entries)?;
    let name = PartName::for_payload(&payload);
    let compressed = zstd::encode_all(&payload[..], ZSTD_LEVEL)?;

    let mut buf = Vec::with_capacity(HEADER_LEN + compressed.len());
    buf.extend_from_slice(PART_MAGIC);
    buf.extend_from_slice(&PART_VERSION.to_be_bytes());
    buf.extend_from_slice(&crc32fast::hash(&compressed).to_be_bytes());
    buf.extend_from_slice(&(payload.len() as u64).to_be_bytes());
    buf.extend_from_slice(&compressed);
    Ok((name, buf))
}

/// Decode framed part bytes, verifying framing, CRC and content hash.
pub fn decode_part(part: &PartName, data: &[u8]) -> StoreResult<Vec<Entry>> {
    let corrupt = |reason: String| StoreError::CorruptPart {
        part: *part,
        reason,
    };

    if data.len() < HEADER_LEN {
        return Err(corrupt("part data too short".into()));
    }
    if &data[0..4] != PART_MAGIC {
        return Err(corrupt(format!(
            "invalid magic: {}",
            String::from_utf8_lossy(&data[0..4])
        )));
    }
    let version = read_u32(&data[4..8]);
    if version != PART_VERSION {
        return Err(corrupt(format!("unsupported version {version}")));
    }
    let expected_crc = read_u32(&data[8..12]);
    let payload_len = read_u64(&data[12..20]);
    let compressed = &data[HEADER_LEN..];

    let actual_crc = crc32fast::hash(compressed);
    if actual_crc != expected_crc {
        return Err(corrupt(format!(
            "crc mismatch: expected {expected_crc:08x}, got {actual_crc:08x}"
        )));
    }

    let payload = zstd::decode_all(compressed).map_err(|e| corrupt(e.to_string()))?;
    if payload.len() as u64 != payload_len {
        return Err(corrupt(format!(
            "size mismatch: expected {payload_len}, got {}",
            payload.len()
        )));
    }

    let computed = PartName::for_payload(&payload);
    if computed != *part {
        return Err(StoreError::HashMismatch {
            expected: *part,
            computed,
        });
    }

    bincode::deserialize(&payload).map_err(|e| corrupt(e.to_string()))
}

fn read_u32(bytes: &[u8]) -> u32 {
    let mut arr = [0u8; 4];
    arr.copy_from_slice(bytes);
    u32::from_be_bytes(arr)
}

fn read_u64(bytes: &[u8]) -> u64 {
    let mut arr = [0u8; 8];
    arr.copy_from_slice(bytes);
    u64::from_be_bytes(arr)
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbor_types::EntryValue;

    fn sample() -> Vec<Entry> {
        vec![
            Entry::new("a", EntryValue::new("addr-a", "c1", 10).with_metadata("k", "v")),
            Entry::tombstone("b"),
            Entry::new("c", EntryValue::new("addr-c", "c3", 30)),
        ]
    }

    #[test]
    fn decode_recovers_entries() {
        let entries = sample();
        let (name, bytes) = encode_part(&entries).unwrap();
        assert_eq!(&bytes[0..4], PART_MAGIC);
        assert_eq!(decode_part(&name, &bytes).unwrap(), entries);
    }

    #[test]
    fn name_is_content_hash() {
        let entries = sample();
        let (a, _) = encode_part(&entries).unwrap();
        let (b, _) = encode_part(&entries).unwrap();
        assert_eq!(a, b);
        let (c, _) = encode_part(&entries[..2]).unwrap();
        assert_ne!(a, c);
    }

    #[test]
    fn flipped_byte_fails_crc() {
        let (name, mut bytes) = encode_part(&sample()).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        let err = decode_part(&name, &bytes).unwrap_err();
        assert!(matches!(err, StoreError::CorruptPart { .. }));
    }

    #[test]
    fn bad_magic() {
        let (name, mut bytes) = encode_part(&sample()).unwrap();
        bytes[0..4].copy_from_slice(b"NOPE");
        let err = decode_part(&name, &bytes).unwrap_err();
        assert!(err.to_string().contains("invalid magic"));
    }

    #[test]
    fn bad_version() {
        let (name, mut bytes) = encode_part(&sample()).unwrap();
        bytes[4..8].copy_from_slice(&9u32.to_be_bytes());
        let err = decode_part(&name, &bytes).unwrap_err();
        assert!(err.to_string().contains("unsupported version 9"));
    }

    #[test]
    fn too_short() {
        let name = PartName::from_hash([0; 32]);
        let err = decode_part(&name, b"ARBP").unwrap_err();
        assert!(matches!(err, StoreError::CorruptPart { .. }));
    }

    #[test]
    fn wrong_name_is_hash_mismatch() {
        let (_, bytes) = encode_part(&sample()).unwrap();
        let other = PartName::from_hash([7; 32]);
        let err = decode_part(&other, &bytes).unwrap_err();
        assert!(matches!(err, StoreError::HashMismatch { .. }));
    }
}
