//! BSON document writer.
//!
//! All multi-byte integers are written in little-endian byte order. Sizes are
//! computed up front so that every length prefix is written before its body.

use std::io::Write;

use tracing::debug;

use crate::document::Document;
use crate::error::{BsonError, Result};
use crate::options::CodecOptions;
use crate::value::{BinarySubtype, Bson, ElementType};

/// Encodes BSON documents onto a byte sink.
pub struct BsonWriter<W> {
    stream: W,
    written: usize,
    options: CodecOptions,
}

impl<W: Write> BsonWriter<W> {
    pub fn new(stream: W) -> Self {
        Self::with_options(stream, CodecOptions::default())
    }

    pub fn with_options(stream: W, options: CodecOptions) -> Self {
        Self {
            stream,
            written: 0,
            options,
        }
    }

    pub fn into_inner(self) -> W {
        self.stream
    }

    /// Writes one top-level document and returns its encoded size.
    pub fn write(&mut self, document: &Document) -> Result<usize> {
        let size = calculate_size(document);
        debug!(size, "writing document");
        if size > self.options.max_message_size {
            return Err(BsonError::MessageTooLarge {
                size,
                max: self.options.max_message_size,
            });
        }
        self.written = 0;
        self.write_document(document)?;
        debug_assert_eq!(self.written, size);
        self.stream.flush()?;
        Ok(size)
    }

    fn write_document(&mut self, document: &Document) -> Result<()> {
        self.write_i32(calculate_size(document))?;
        for (key, value) in document {
            self.write_element(key, value)?;
        }
        self.write_bytes(&[0])
    }

    fn write_array(&mut self, items: &[Bson]) -> Result<()> {
        self.write_i32(array_size(items))?;
        for (index, value) in items.iter().enumerate() {
            self.write_element(&index.to_string(), value)?;
        }
        self.write_bytes(&[0])
    }

    fn write_element(&mut self, key: &str, value: &Bson) -> Result<()> {
        self.write_bytes(&[value.element_type().tag() as u8])?;
        self.write_cstring(key)?;
        self.write_value(value)
    }

    /// Writes the payload of `value`, without tag or key.
    pub fn write_value(&mut self, value: &Bson) -> Result<()> {
        match value {
            Bson::Null | Bson::MinKey | Bson::MaxKey => Ok(()),
            Bson::Boolean(b) => self.write_bytes(&[u8::from(*b)]),
            Bson::Int32(v) => self.write_bytes(&v.to_le_bytes()),
            Bson::Int64(v) => self.write_bytes(&v.to_le_bytes()),
            Bson::Double(v) => self.write_bytes(&v.to_le_bytes()),
            Bson::DateTime(date) => self.write_bytes(&date.timestamp_millis().to_le_bytes()),
            Bson::ObjectId(id) => self.write_bytes(&id.bytes()),
            Bson::String(s) | Bson::JavaScriptCode(s) => self.write_len_string(s),
            Bson::Document(d) => self.write_document(d),
            Bson::Array(items) => self.write_array(items),
            Bson::RegularExpression(regex) => {
                self.write_cstring(&regex.pattern)?;
                self.write_cstring(&regex.options)
            }
            Bson::JavaScriptCodeWithScope(cws) => {
                self.write_i32(calculate_size_value(value))?;
                self.write_len_string(&cws.code)?;
                self.write_document(&cws.scope)
            }
            Bson::Uuid(uuid) => {
                self.write_i32(16)?;
                self.write_bytes(&[u8::from(BinarySubtype::UuidOld)])?;
                self.write_bytes(&uuid.to_bytes_le())
            }
            Bson::Binary(binary) if binary.is_legacy_uuid() => Err(BsonError::Format(
                "a 16-byte subtype 3 binary reads back as a UUID; write it as Bson::Uuid".into(),
            )),
            Bson::Binary(binary) => {
                if binary.subtype == BinarySubtype::General {
                    self.write_i32(binary.bytes.len() + 4)?;
                    self.write_bytes(&[u8::from(binary.subtype)])?;
                    self.write_i32(binary.bytes.len())?;
                } else {
                    self.write_i32(binary.bytes.len())?;
                    self.write_bytes(&[u8::from(binary.subtype)])?;
                }
                self.write_bytes(&binary.bytes)
            }
        }
    }

    /// Writes `s` followed by a NUL byte. `s` must not itself contain NUL.
    pub fn write_cstring(&mut self, s: &str) -> Result<()> {
        if s.as_bytes().contains(&0) {
            return Err(BsonError::InvalidKey(s.to_owned()));
        }
        self.write_bytes(s.as_bytes())?;
        self.write_bytes(&[0])
    }

    fn write_len_string(&mut self, s: &str) -> Result<()> {
        self.write_i32(s.len() + 1)?;
        self.write_bytes(s.as_bytes())?;
        self.write_bytes(&[0])
    }

    fn write_i32(&mut self, value: usize) -> Result<()> {
        let value = i32::try_from(value)
            .map_err(|_| BsonError::Format(format!("length {value} does not fit in 32 bits")))?;
        self.write_bytes(&value.to_le_bytes())
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.stream.write_all(bytes)?;
        self.written += bytes.len();
        Ok(())
    }
}

/// Exact encoded length of `document`, including its size prefix and
/// terminator.
pub fn calculate_size(document: &Document) -> usize {
    4 + document
        .iter()
        .map(|(key, value)| element_size(key.len(), value))
        .sum::<usize>()
        + 1
}

fn array_size(items: &[Bson]) -> usize {
    4 + items
        .iter()
        .enumerate()
        .map(|(index, value)| element_size(decimal_len(index), value))
        .sum::<usize>()
        + 1
}

fn element_size(key_len: usize, value: &Bson) -> usize {
    1 + key_len + 1 + calculate_size_value(value)
}

fn decimal_len(mut n: usize) -> usize {
    let mut len = 1;
    while n >= 10 {
        n /= 10;
        len += 1;
    }
    len
}

/// Encoded length of the payload of `value`, without tag or key.
pub fn calculate_size_value(value: &Bson) -> usize {
    match value.element_type() {
        ElementType::Null | ElementType::Undefined | ElementType::MinKey | ElementType::MaxKey => 0,
        ElementType::Boolean => 1,
        ElementType::Int32 => 4,
        ElementType::Int64 | ElementType::Double | ElementType::DateTime => 8,
        ElementType::ObjectId => 12,
        _ => match value {
            Bson::String(s) | Bson::JavaScriptCode(s) => 4 + s.len() + 1,
            Bson::Document(d) => calculate_size(d),
            Bson::Array(items) => array_size(items),
            Bson::RegularExpression(regex) => regex.pattern.len() + 1 + regex.options.len() + 1,
            Bson::JavaScriptCodeWithScope(cws) => 4 + (4 + cws.code.len() + 1) + calculate_size(&cws.scope),
            Bson::Uuid(_) => 4 + 1 + 16,
            Bson::Binary(binary) if binary.subtype == BinarySubtype::General => 4 + 1 + 4 + binary.bytes.len(),
            Bson::Binary(binary) => 4 + 1 + binary.bytes.len(),
            _ => 0,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doc;
    use crate::value::Binary;

    fn encode(document: &Document) -> Vec<u8> {
        let mut writer = BsonWriter::new(Vec::new());
        writer.write(document).unwrap();
        writer.into_inner()
    }

    #[test]
    fn empty_document() {
        assert_eq!(encode(&Document::new()), [5, 0, 0, 0, 0]);
    }

    #[test]
    fn simple_string() {
        assert_eq!(
            encode(&doc! { "test" => "test" }),
            [0x14, 0, 0, 0, 0x02, b't', b'e', b's', b't', 0, 0x05, 0, 0, 0, b't', b'e', b's', b't', 0, 0]
        );
    }

    #[test]
    fn array_keys_are_indices() {
        let bytes = encode(&doc! { "a" => vec![1, 2] });
        assert_eq!(&bytes[7..11], &[0x13, 0, 0, 0]);
        assert_eq!(&bytes[11..14], &[0x10, b'0', 0]);
        assert_eq!(&bytes[18..21], &[0x10, b'1', 0]);
    }

    #[test]
    fn general_binary_has_inner_length() {
        let d = doc! { "b" => Binary { subtype: BinarySubtype::General, bytes: vec![1, 2] } };
        let bytes = encode(&d);
        assert_eq!(&bytes[7..18], &[6, 0, 0, 0, 0x00, 2, 0, 0, 0, 1, 2]);
    }

    #[test]
    fn size_matches_output() {
        let d = doc! {
            "n" => Bson::Null,
            "s" => "héllo",
            "arr" => vec![Bson::from("x"); 12],
            "code" => Bson::JavaScriptCodeWithScope(crate::value::CodeWithScope {
                code: "function() {}".into(),
                scope: doc! { "x" => 1i64 },
            }),
        };
        assert_eq!(calculate_size(&d), encode(&d).len());
    }

    #[test]
    fn rejects_nul_in_key() {
        let mut writer = BsonWriter::new(Vec::new());
        let err = writer.write(&doc! { "a\0b" => 1 }).unwrap_err();
        assert!(matches!(err, BsonError::InvalidKey(_)));
    }

    #[test]
    fn rejects_oversized_message() {
        let options = CodecOptions::default().with_max_message_size(8);
        let mut writer = BsonWriter::with_options(Vec::new(), options);
        let err = writer.write(&doc! { "name" => "too long" }).unwrap_err();
        assert!(matches!(err, BsonError::MessageTooLarge { max: 8, .. }));
        assert!(writer.into_inner().is_empty());
    }

    #[test]
    fn decimal_lengths() {
        assert_eq!(decimal_len(0), 1);
        assert_eq!(decimal_len(9), 1);
        assert_eq!(decimal_len(10), 2);
        assert_eq!(decimal_len(1234), 4);
    }
}
