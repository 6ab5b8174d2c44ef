//! TLV8: Apple's length-prefixed type-value byte encoding used for HAP
//! payloads (§1, "assumed available as a generic key/value byte codec").
//!
//! No entry may carry a value longer than 255 bytes on the wire; longer
//! values are split into consecutive entries sharing the same tag, which
//! [`decode`] reassembles transparently.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("truncated TLV8 stream: expected {expected} more bytes, got {got}")]
    Truncated { expected: usize, got: usize },
}

pub type Result<T> = std::result::Result<T, Error>;

/// One logical (tag, value) pair. `value` may be any length; chunking to the
/// wire's 255-byte-per-entry limit happens during [`encode`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlvItem {
    pub tag: u8,
    pub value: Vec<u8>,
}

impl TlvItem {
    pub fn new(tag: u8, value: impl Into<Vec<u8>>) -> Self {
        Self { tag, value: value.into() }
    }
}

/// An ordered list of TLV items. Order is preserved because some HAP
/// payloads (e.g. pair-setup M1) rely on it, and because `TlvItem`s of the
/// same tag but separated by a different tag are distinct logical entries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TlvList(pub Vec<TlvItem>);

impl TlvList {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn push(mut self, tag: u8, value: impl Into<Vec<u8>>) -> Self {
        self.0.push(TlvItem::new(tag, value));
        self
    }

    /// First value for `tag`, if present.
    pub fn get(&self, tag: u8) -> Option<&[u8]> {
        self.0.iter().find(|item| item.tag == tag).map(|item| item.value.as_slice())
    }
}

/// Encode a list of logical TLV entries, splitting any value longer than
/// 255 bytes into consecutive same-tag chunks per the HAP TLV8 rule.
pub fn encode(list: &TlvList) -> Vec<u8> {
    let mut out = Vec::new();
    for item in &list.0 {
        if item.value.is_empty() {
            out.push(item.tag);
            out.push(0);
            continue;
        }
        for chunk in item.value.chunks(255) {
            out.push(item.tag);
            out.push(chunk.len() as u8);
            out.extend_from_slice(chunk);
        }
    }
    out
}

/// Decode a TLV8 byte stream into logical entries, merging consecutive
/// same-tag chunks (the inverse of [`encode`]'s splitting). Per the TLV8
/// convention, any run of adjacent entries sharing a tag is one logical
/// value; producers that need two separate values of the same tag back to
/// back must interpose a different tag (HAP uses a zero-length separator
/// entry for lists of identically-shaped items).
pub fn decode(bytes: &[u8]) -> Result<TlvList> {
    let mut merged: Vec<TlvItem> = Vec::new();
    let mut pos = 0;
    while pos < bytes.len() {
        if pos + 2 > bytes.len() {
            return Err(Error::Truncated { expected: pos + 2, got: bytes.len() });
        }
        let tag = bytes[pos];
        let len = bytes[pos + 1] as usize;
        pos += 2;
        if pos + len > bytes.len() {
            return Err(Error::Truncated { expected: pos + len, got: bytes.len() });
        }
        let value = &bytes[pos..pos + len];
        pos += len;

        match merged.last_mut() {
            Some(prev) if prev.tag == tag => prev.value.extend_from_slice(value),
            _ => merged.push(TlvItem::new(tag, value.to_vec())),
        }
    }
    Ok(TlvList(merged))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_small_values() {
        let list = TlvList::new().push(1, vec![0x01]).push(6, vec![0x02]);
        let bytes = encode(&list);
        assert_eq!(bytes, vec![1, 1, 0x01, 6, 1, 0x02]);
        assert_eq!(decode(&bytes).unwrap(), list);
    }

    #[test]
    fn splits_and_reassembles_long_values() {
        let long = vec![0xAB; 400];
        let list = TlvList::new().push(9, long.clone());
        let bytes = encode(&list);
        // 255 + 2 header bytes, then 145 + 2 header bytes.
        assert_eq!(bytes.len(), 255 + 2 + 145 + 2);
        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded.0.len(), 1);
        assert_eq!(decoded.0[0].value, long);
    }

    #[test]
    fn exact_multiple_of_255_round_trips() {
        let long = vec![0x11; 510];
        let list = TlvList::new().push(3, long.clone());
        let bytes = encode(&list);
        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded.0.len(), 1);
        assert_eq!(decoded.0[0].value, long);
    }

    #[test]
    fn separator_tag_splits_adjacent_same_tag_entries() {
        // Two logical entries of the same tag, e.g. two pairings each
        // carrying an identifier under tag 1, must be separated by a
        // different tag (HAP uses a zero-length separator) or they merge.
        let bytes = vec![1, 1, 0xAA, 0xFF, 0, 1, 1, 0xBB];
        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded.0.len(), 3);
        assert_eq!(decoded.0[0].value, vec![0xAA]);
        assert_eq!(decoded.0[1], TlvItem::new(0xFF, vec![]));
        assert_eq!(decoded.0[2].value, vec![0xBB]);
    }

    #[test]
    fn adjacent_same_tag_without_separator_merges() {
        let bytes = vec![1, 1, 0xAA, 1, 1, 0xBB];
        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded.0.len(), 1);
        assert_eq!(decoded.0[0].value, vec![0xAA, 0xBB]);
    }

    #[test]
    fn truncated_stream_errors() {
        assert!(decode(&[1, 5, 0, 0]).is_err());
    }

    proptest::proptest! {
        #[test]
        fn round_trip_arbitrary_single_tag(tag: u8, value in proptest::collection::vec(proptest::prelude::any::<u8>(), 0..600)) {
            let list = TlvList::new().push(tag, value.clone());
            let bytes = encode(&list);
            let decoded = decode(&bytes).unwrap();
            proptest::prop_assert_eq!(decoded.0.len(), 1);
            proptest::prop_assert_eq!(&decoded.0[0].value, &value);
        }
    }
}
