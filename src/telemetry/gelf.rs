//! Minimal GELF 1.1 encoding over UDP.
//!
//! Only what the forwarder needs: one JSON document per event, split into chunks when it
//! does not fit in a single datagram. Payloads are sent uncompressed.

use anyhow::{bail, Context};
use serde_json::{Map, Value};

/// Magic bytes that prefix every chunked GELF datagram.
const CHUNK_MAGIC: [u8; 2] = [0x1e, 0x0f];
const CHUNK_HEADER_LEN: usize = 12;
/// GELF receivers drop messages split into more chunks than this.
pub const MAX_CHUNKS: usize = 128;
/// Safe datagram size for WAN links.
pub const WAN_CHUNK_SIZE: usize = 1420;

/// Syslog "informational" level.
pub const LEVEL_INFO: u8 = 6;

/// Build a GELF 1.1 document.
///
/// `fields` are the additional fields; each key gets the `_` prefix and `Null` values are
/// left out because GELF has no null.
pub fn encode_message(
    host: &str,
    short_message: &str,
    timestamp: f64,
    fields: Map<String, Value>,
) -> anyhow::Result<Vec<u8>> {
    let mut doc = Map::new();
    doc.insert("version".into(), "1.1".into());
    doc.insert("host".into(), host.into());
    doc.insert("short_message".into(), short_message.into());
    doc.insert("timestamp".into(), timestamp.into());
    doc.insert("level".into(), LEVEL_INFO.into());
    for (key, value) in fields {
        if value.is_null() || key == "id" {
            continue;
        }
        doc.insert(format!("_{key}"), value);
    }
    serde_json::to_vec(&Value::Object(doc)).context("could not serialize GELF message")
}

/// Split `payload` into datagrams of at most `chunk_size` bytes.
///
/// A payload that fits is returned unchanged as the only datagram.
pub fn into_datagrams(
    payload: Vec<u8>,
    chunk_size: usize,
    message_id: [u8; 8],
) -> anyhow::Result<Vec<Vec<u8>>> {
    if payload.len() <= chunk_size {
        return Ok(vec![payload]);
    }
    if chunk_size <= CHUNK_HEADER_LEN {
        bail!("chunk size {chunk_size} leaves no room for data");
    }

    let body = chunk_size - CHUNK_HEADER_LEN;
    let count = payload.len().div_ceil(body);
    if count > MAX_CHUNKS {
        bail!(
            "message of {} bytes needs {count} chunks (max {MAX_CHUNKS})",
            payload.len()
        );
    }

    Ok(payload
        .chunks(body)
        .enumerate()
        .map(|(seq, data)| {
            let mut datagram = Vec::with_capacity(CHUNK_HEADER_LEN + data.len());
            datagram.extend_from_slice(&CHUNK_MAGIC);
            datagram.extend_from_slice(&message_id);
            datagram.push(seq as u8);
            datagram.push(count as u8);
            datagram.extend_from_slice(data);
            datagram
        })
        .collect())
}

#[cfg(test)]
mod gelf_tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn message_has_prefixed_fields_and_no_nulls() {
        let mut fields = Map::new();
        fields.insert("match_id".into(), json!(4));
        fields.insert("game_time".into(), Value::Null);
        fields.insert("id".into(), json!("reserved"));
        let bytes = encode_message("box", "hello", 12.5, fields).unwrap();
        let doc: Value = serde_json::from_slice(&bytes).unwrap();

        assert_eq!(doc["version"], "1.1");
        assert_eq!(doc["host"], "box");
        assert_eq!(doc["short_message"], "hello");
        assert_eq!(doc["level"], 6);
        assert_eq!(doc["_match_id"], 4);
        assert!(doc.get("_game_time").is_none());
        assert!(doc.get("_id").is_none());
    }

    #[test]
    fn small_payload_is_not_chunked() {
        let datagrams = into_datagrams(b"{}".to_vec(), WAN_CHUNK_SIZE, [0; 8]).unwrap();
        assert_eq!(datagrams, vec![b"{}".to_vec()]);
    }

    #[test]
    fn large_payload_is_chunked_in_order() {
        let payload: Vec<u8> = (0..50u8).collect();
        let id = [1, 2, 3, 4, 5, 6, 7, 8];
        let datagrams = into_datagrams(payload.clone(), 32, id).unwrap();

        // 20 data bytes per chunk
        assert_eq!(datagrams.len(), 3);
        let mut joined = vec![];
        for (seq, datagram) in datagrams.iter().enumerate() {
            assert_eq!(&datagram[..2], &CHUNK_MAGIC);
            assert_eq!(&datagram[2..10], &id);
            assert_eq!(datagram[10] as usize, seq);
            assert_eq!(datagram[11], 3);
            joined.extend_from_slice(&datagram[12..]);
        }
        assert_eq!(joined, payload);
    }

    #[test]
    fn too_many_chunks_is_an_error() {
        let payload = vec![0u8; 20 * (MAX_CHUNKS + 1)];
        assert!(into_datagrams(payload, 32, [0; 8]).is_err());
    }
}
