//! ANS-104 data item encoding.
//!
//! AO messages travel as signed ANS-104 data items. Layout:
//!
//! ```text
//! signature type      u16 LE
//! signature           (512 bytes for Arweave keys)
//! owner               (512 bytes for Arweave keys)
//! target flag + 32 bytes
//! anchor flag + 32 bytes
//! tag count           u64 LE
//! tag byte length     u64 LE
//! tags                Avro array of {name: string, value: string}
//! data
//! ```
//!
//! The signature covers the SHA-384 deep hash of the unsigned fields.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use sha2::{Digest, Sha256, Sha384};

use crate::credential::Signer;
use crate::types::{OracleError, Tag};

const MAX_TAGS: usize = 128;
const MAX_TAG_NAME_BYTES: usize = 1024;
const MAX_TAG_VALUE_BYTES: usize = 3072;

/// Length of target and anchor fields.
pub const ID_LENGTH: usize = 32;

/// A signed, serialized data item ready to post.
#[derive(Debug, Clone)]
pub struct DataItem {
    pub id: String,
    pub bytes: Vec<u8>,
}

/// Unsigned fields of a data item.
pub struct DataItemBuilder<'a> {
    pub target: Option<[u8; ID_LENGTH]>,
    pub anchor: Option<[u8; ID_LENGTH]>,
    pub tags: &'a [Tag],
    pub data: &'a [u8],
}

impl DataItemBuilder<'_> {
    /// Sign and serialize the item with `signer`.
    pub fn sign(&self, signer: &dyn Signer) -> Result<DataItem, OracleError> {
        let tag_bytes = encode_tags(self.tags)?;
        let owner = signer.owner();
        let signature_type = signer.signature_type();

        let message = deep_hash(&Chunk::List(vec![
            Chunk::Blob(b"dataitem"),
            Chunk::Blob(b"1"),
            Chunk::Blob(signature_type.to_string().as_bytes()),
            Chunk::Blob(owner),
            Chunk::Blob(self.target.as_ref().map_or(&[][..], |t| &t[..])),
            Chunk::Blob(self.anchor.as_ref().map_or(&[][..], |a| &a[..])),
            Chunk::Blob(&tag_bytes),
            Chunk::Blob(self.data),
        ]));

        let signature = signer.sign(&message)?;

        let mut bytes = Vec::with_capacity(
            2 + signature.len() + owner.len() + 2 + 2 * ID_LENGTH + 16 + tag_bytes.len() + self.data.len(),
        );
        bytes.extend_from_slice(&signature_type.to_le_bytes());
        bytes.extend_from_slice(&signature);
        bytes.extend_from_slice(owner);
        push_optional(&mut bytes, self.target.as_ref());
        push_optional(&mut bytes, self.anchor.as_ref());
        bytes.extend_from_slice(&(self.tags.len() as u64).to_le_bytes());
        bytes.extend_from_slice(&(tag_bytes.len() as u64).to_le_bytes());
        bytes.extend_from_slice(&tag_bytes);
        bytes.extend_from_slice(self.data);

        Ok(DataItem { id: message_id(&signature), bytes })
    }
}

fn push_optional(buf: &mut Vec<u8>, field: Option<&[u8; ID_LENGTH]>) {
    match field {
        Some(value) => {
            buf.push(1);
            buf.extend_from_slice(value);
        }
        None => buf.push(0),
    }
}

/// Data item id: base64url SHA-256 of the signature.
pub fn message_id(signature: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(signature))
}

/// Decode a 43-char base64url id (process id, anchor) into raw bytes.
pub fn decode_id(id: &str) -> Result<[u8; ID_LENGTH], OracleError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(id)
        .map_err(|_| OracleError::Submission(format!("{id:?} is not a base64url id")))?;
    bytes
        .try_into()
        .map_err(|_| OracleError::Submission(format!("{id:?} does not decode to {ID_LENGTH} bytes")))
}

// ---------------------------------------------------------------------------
// Avro tag encoding
// ---------------------------------------------------------------------------

fn encode_long(buf: &mut Vec<u8>, n: i64) {
    let mut z = ((n << 1) ^ (n >> 63)) as u64;
    while z & !0x7f != 0 {
        buf.push(((z & 0x7f) | 0x80) as u8);
        z >>= 7;
    }
    buf.push(z as u8);
}

fn encode_string(buf: &mut Vec<u8>, s: &str) {
    encode_long(buf, s.len() as i64);
    buf.extend_from_slice(s.as_bytes());
}

/// Avro-encode tags as a single block followed by the end marker.
/// An empty tag list encodes to no bytes at all.
pub fn encode_tags(tags: &[Tag]) -> Result<Vec<u8>, OracleError> {
    if tags.len() > MAX_TAGS {
        return Err(OracleError::Submission(format!("too many tags: {} > {MAX_TAGS}", tags.len())));
    }
    if tags.is_empty() {
        return Ok(Vec::new());
    }

    let mut buf = Vec::new();
    encode_long(&mut buf, tags.len() as i64);
    for tag in tags {
        if tag.name.is_empty() || tag.name.len() > MAX_TAG_NAME_BYTES {
            return Err(OracleError::Submission(format!("invalid tag name {:?}", tag.name)));
        }
        if tag.value.is_empty() || tag.value.len() > MAX_TAG_VALUE_BYTES {
            return Err(OracleError::Submission(format!("invalid value for tag {}", tag.name)));
        }
        encode_string(&mut buf, &tag.name);
        encode_string(&mut buf, &tag.value);
    }
    encode_long(&mut buf, 0);
    Ok(buf)
}

// ---------------------------------------------------------------------------
// Deep hash
// ---------------------------------------------------------------------------

/// Input to [`deep_hash`].
pub enum Chunk<'a> {
    Blob(&'a [u8]),
    List(Vec<Chunk<'a>>),
}

fn sha384(parts: &[&[u8]]) -> [u8; 48] {
    let mut hasher = Sha384::new();
    for part in parts {
        hasher.update(part);
    }
    let mut out = [0u8; 48];
    out.copy_from_slice(&hasher.finalize());
    out
}

/// Arweave deep hash (SHA-384).
pub fn deep_hash(chunk: &Chunk<'_>) -> [u8; 48] {
    match chunk {
        Chunk::Blob(data) => {
            let tag = format!("blob{}", data.len());
            let head = sha384(&[tag.as_bytes()]);
            let body = sha384(&[*data]);
            sha384(&[head.as_slice(), body.as_slice()])
        }
        Chunk::List(items) => {
            let tag = format!("list{}", items.len());
            items.iter().fold(sha384(&[tag.as_bytes()]), |acc, item| {
                sha384(&[acc.as_slice(), deep_hash(item).as_slice()])
            })
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
