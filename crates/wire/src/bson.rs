//! Just enough BSON to issue administrative commands and read their replies.
//!
//! Only the element types commands are built from, and replies are read
//! for, are modelled. Elements of other types (object ids, timestamps,
//! binary, ...) are skipped when a reply is decoded.

use bytes::{Buf, BufMut, BytesMut};

use crate::error::{Error, Result};

const TYPE_DOUBLE: u8 = 0x01;
const TYPE_STRING: u8 = 0x02;
const TYPE_DOCUMENT: u8 = 0x03;
const TYPE_ARRAY: u8 = 0x04;
const TYPE_BINARY: u8 = 0x05;
const TYPE_UNDEFINED: u8 = 0x06;
const TYPE_OBJECT_ID: u8 = 0x07;
const TYPE_BOOLEAN: u8 = 0x08;
const TYPE_DATE_TIME: u8 = 0x09;
const TYPE_NULL: u8 = 0x0A;
const TYPE_INT32: u8 = 0x10;
const TYPE_TIMESTAMP: u8 = 0x11;
const TYPE_INT64: u8 = 0x12;
const TYPE_DECIMAL128: u8 = 0x13;
const TYPE_MIN_KEY: u8 = 0xFF;
const TYPE_MAX_KEY: u8 = 0x7F;

/// Smallest valid document: length prefix plus terminator.
const MIN_DOCUMENT_LEN: usize = 5;

/// A BSON value.
#[derive(Clone, Debug, PartialEq)]
pub enum Bson {
    /// Array, stored with its index keys.
    Array(Document),
    /// Boolean.
    Boolean(bool),
    /// Embedded document.
    Document(Document),
    /// 64-bit float.
    Double(f64),
    /// 32-bit integer.
    Int32(i32),
    /// 64-bit integer.
    Int64(i64),
    /// Null.
    Null,
    /// UTF-8 string.
    String(String),
}

impl Bson {
    const fn element_type(&self) -> u8 {
        match self {
            Self::Array(_) => TYPE_ARRAY,
            Self::Boolean(_) => TYPE_BOOLEAN,
            Self::Document(_) => TYPE_DOCUMENT,
            Self::Double(_) => TYPE_DOUBLE,
            Self::Int32(_) => TYPE_INT32,
            Self::Int64(_) => TYPE_INT64,
            Self::Null => TYPE_NULL,
            Self::String(_) => TYPE_STRING,
        }
    }

    /// Interprets the value the way the server reports command success.
    #[must_use]
    #[allow(clippy::float_cmp)]
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Boolean(b) => *b,
            Self::Double(d) => *d == 1.0,
            Self::Int32(i) => *i == 1,
            Self::Int64(i) => *i == 1,
            _ => false,
        }
    }
}

impl From<bool> for Bson {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<i32> for Bson {
    fn from(value: i32) -> Self {
        Self::Int32(value)
    }
}

impl From<i64> for Bson {
    fn from(value: i64) -> Self {
        Self::Int64(value)
    }
}

impl From<f64> for Bson {
    fn from(value: f64) -> Self {
        Self::Double(value)
    }
}

impl From<&str> for Bson {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<Document> for Bson {
    fn from(value: Document) -> Self {
        Self::Document(value)
    }
}

/// An ordered BSON document. Command documents are order sensitive: the
/// first key names the command.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Document {
    entries: Vec<(String, Bson)>,
}

impl Document {
    /// Creates an empty document.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Appends a key/value pair, returning the document for chaining.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Bson>) -> Self {
        self.insert(key, value);
        self
    }

    /// Appends a key/value pair, replacing any existing value for the key.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Bson>) {
        let key = key.into();
        let value = value.into();
        if let Some(entry) = self.entries.iter_mut().find(|(k, _)| *k == key) {
            entry.1 = value;
        } else {
            self.entries.push((key, value));
        }
    }

    /// Looks up a top-level value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Bson> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Looks up a top-level string value.
    #[must_use]
    pub fn get_str(&self, key: &str) -> Option<&str> {
        match self.get(key) {
            Some(Bson::String(s)) => Some(s),
            _ => None,
        }
    }

    /// Whether the document reports `ok: 1`.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.get("ok").is_some_and(Bson::is_truthy)
    }

    /// Appends the encoded document to `buf`.
    pub fn encode(&self, buf: &mut BytesMut) {
        let start = buf.len();
        buf.put_i32_le(0);

        for (key, value) in &self.entries {
            buf.put_u8(value.element_type());
            put_cstring(buf, key);
            encode_value(value, buf);
        }

        buf.put_u8(0);

        let len = i32::try_from(buf.len() - start).unwrap_or(i32::MAX);
        buf[start..start + 4].copy_from_slice(&len.to_le_bytes());
    }

    /// Decodes a single document occupying exactly `bytes`.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes are not a well-formed document.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let (document, used) = Self::decode_prefix(bytes)?;
        if used != bytes.len() {
            return Err(Error::MalformedDocument(format!(
                "{} trailing bytes after document",
                bytes.len() - used
            )));
        }
        Ok(document)
    }

    /// Decodes a document from the front of `bytes`, returning it along with
    /// the number of bytes it occupied.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes are not a well-formed document.
    pub fn decode_prefix(bytes: &[u8]) -> Result<(Self, usize)> {
        let len = declared_len(bytes)?;
        if bytes[len - 1] != 0 {
            return Err(Error::MalformedDocument("missing terminator".to_string()));
        }

        let mut body = &bytes[4..len - 1];
        let mut document = Self::new();

        while body.has_remaining() {
            let element_type = body.get_u8();
            let key = get_cstring(&mut body)?;
            if let Some(value) = decode_value(element_type, &mut body)? {
                document.entries.push((key, value));
            }
        }

        Ok((document, len))
    }
}

fn declared_len(bytes: &[u8]) -> Result<usize> {
    if bytes.len() < MIN_DOCUMENT_LEN {
        return Err(Error::MalformedDocument(format!(
            "document of {} bytes is too short",
            bytes.len()
        )));
    }

    let mut prefix = &bytes[..4];
    let len = usize::try_from(prefix.get_i32_le())
        .map_err(|_| Error::MalformedDocument("negative document length".to_string()))?;

    if len < MIN_DOCUMENT_LEN || len > bytes.len() {
        return Err(Error::MalformedDocument(format!(
            "declared length {len} does not fit in {} bytes",
            bytes.len()
        )));
    }

    Ok(len)
}

fn put_cstring(buf: &mut BytesMut, s: &str) {
    buf.put_slice(s.as_bytes());
    buf.put_u8(0);
}

fn get_cstring(buf: &mut &[u8]) -> Result<String> {
    let end = buf
        .iter()
        .position(|&b| b == 0)
        .ok_or_else(|| Error::MalformedDocument("unterminated key".to_string()))?;
    let s = std::str::from_utf8(&buf[..end])
        .map_err(|e| Error::MalformedDocument(format!("key is not utf-8: {e}")))?
        .to_string();
    buf.advance(end + 1);
    Ok(s)
}

fn encode_value(value: &Bson, buf: &mut BytesMut) {
    match value {
        Bson::Array(doc) | Bson::Document(doc) => doc.encode(buf),
        Bson::Boolean(b) => buf.put_u8(u8::from(*b)),
        Bson::Double(d) => buf.put_f64_le(*d),
        Bson::Int32(i) => buf.put_i32_le(*i),
        Bson::Int64(i) => buf.put_i64_le(*i),
        Bson::Null => {}
        Bson::String(s) => {
            buf.put_i32_le(i32::try_from(s.len() + 1).unwrap_or(i32::MAX));
            put_cstring(buf, s);
        }
    }
}

fn need(buf: &[u8], n: usize, what: &str) -> Result<()> {
    if buf.len() < n {
        return Err(Error::MalformedDocument(format!("truncated {what}")));
    }
    Ok(())
}

fn get_len(buf: &mut &[u8], what: &str) -> Result<usize> {
    need(buf, 4, what)?;
    usize::try_from(buf.get_i32_le())
        .map_err(|_| Error::MalformedDocument(format!("negative {what}")))
}

/// Skips `n` bytes of an element this module does not model.
fn skip(buf: &mut &[u8], n: usize, what: &str) -> Result<Option<Bson>> {
    need(buf, n, what)?;
    buf.advance(n);
    Ok(None)
}

fn decode_value(element_type: u8, buf: &mut &[u8]) -> Result<Option<Bson>> {
    let value = match element_type {
        TYPE_DOUBLE => {
            need(buf, 8, "double")?;
            Bson::Double(buf.get_f64_le())
        }
        TYPE_STRING => {
            let len = get_len(buf, "string length")?;
            if len == 0 {
                return Err(Error::MalformedDocument("empty string length".to_string()));
            }
            need(buf, len, "string")?;
            let s = std::str::from_utf8(&buf[..len - 1])
                .map_err(|e| Error::MalformedDocument(format!("string is not utf-8: {e}")))?
                .to_string();
            buf.advance(len);
            Bson::String(s)
        }
        TYPE_DOCUMENT | TYPE_ARRAY => {
            let (doc, used) = Document::decode_prefix(buf)?;
            buf.advance(used);
            if element_type == TYPE_ARRAY {
                Bson::Array(doc)
            } else {
                Bson::Document(doc)
            }
        }
        TYPE_BOOLEAN => {
            need(buf, 1, "boolean")?;
            Bson::Boolean(buf.get_u8() != 0)
        }
        TYPE_NULL => Bson::Null,
        TYPE_INT32 => {
            need(buf, 4, "int32")?;
            Bson::Int32(buf.get_i32_le())
        }
        TYPE_INT64 => {
            need(buf, 8, "int64")?;
            Bson::Int64(buf.get_i64_le())
        }
        TYPE_BINARY => {
            let len = get_len(buf, "binary length")?;
            return skip(buf, len + 1, "binary");
        }
        TYPE_OBJECT_ID => return skip(buf, 12, "object id"),
        TYPE_DATE_TIME | TYPE_TIMESTAMP => return skip(buf, 8, "datetime"),
        TYPE_DECIMAL128 => return skip(buf, 16, "decimal128"),
        TYPE_UNDEFINED | TYPE_MIN_KEY | TYPE_MAX_KEY => return Ok(None),
        other => {
            return Err(Error::MalformedDocument(format!(
                "unsupported element type {other:#04x}"
            )));
        }
    };

    Ok(Some(value))
}
