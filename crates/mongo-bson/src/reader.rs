//! Streaming BSON document reader.
//!
//! BSON is a little-endian binary format. The reader tracks how many bytes it
//! has consumed so that each document's declared size can be verified.

use std::io::{self, Read};

use chrono::DateTime;
use tracing::{debug, trace};

use crate::document::Document;
use crate::error::{BsonError, Result};
use crate::object_id::ObjectId;
use crate::options::CodecOptions;
use crate::utf8::Utf8Carry;
use crate::value::{Binary, BinarySubtype, Bson, CodeWithScope, ElementType, Regex};

/// Decodes BSON documents from a byte stream.
pub struct BsonReader<R> {
    stream: R,
    position: usize,
    carry: Utf8Carry,
    options: CodecOptions,
}

impl<R: Read> BsonReader<R> {
    pub fn new(stream: R) -> Self {
        Self::with_options(stream, CodecOptions::default())
    }

    pub fn with_options(stream: R, options: CodecOptions) -> Self {
        Self {
            stream,
            position: 0,
            carry: Utf8Carry::with_capacity(options.read_buffer_size),
            options,
        }
    }

    /// Bytes consumed since the last call to [`read`](Self::read).
    pub fn position(&self) -> usize {
        self.position
    }

    pub fn into_inner(self) -> R {
        self.stream
    }

    /// Resets the position counter and decodes one top-level document.
    pub fn read(&mut self) -> Result<Document> {
        self.position = 0;
        self.read_document()
    }

    pub fn read_document(&mut self) -> Result<Document> {
        let start = self.position;
        let size = self.read_i32()?;
        if size < 5 {
            return Err(BsonError::Format(format!(
                "document size {size} is below the 5-byte minimum"
            )));
        }
        let size = size as usize;
        if start == 0 && size > self.options.max_message_size {
            return Err(BsonError::MessageTooLarge {
                size,
                max: self.options.max_message_size,
            });
        }

        let mut document = Document::new();
        while (self.position - start) + 1 < size {
            self.read_element(&mut document)?;
        }

        let terminator = self.read_u8()?;
        if terminator != 0 {
            return Err(BsonError::Format("document not null terminated".into()));
        }
        let consumed = self.position - start;
        if consumed != size {
            return Err(BsonError::Format(format!(
                "should have read {size} bytes from stream but read {consumed}"
            )));
        }
        Ok(document)
    }

    fn read_element(&mut self, document: &mut Document) -> Result<()> {
        let tag = self.read_u8()? as i8;
        let key = self.read_cstring()?;
        let element_type = ElementType::from_tag(tag).ok_or(BsonError::UnrecognizedType(tag))?;
        trace!(key = %key, ?element_type, "decoding element");
        let value = self.read_element_value(element_type)?;
        document.insert(key, value);
        Ok(())
    }

    fn read_element_value(&mut self, element_type: ElementType) -> Result<Bson> {
        Ok(match element_type {
            ElementType::Null | ElementType::Undefined => Bson::Null,
            ElementType::MinKey => Bson::MinKey,
            ElementType::MaxKey => Bson::MaxKey,
            ElementType::Boolean => Bson::Boolean(self.read_u8()? != 0),
            ElementType::Int32 => Bson::Int32(self.read_i32()?),
            ElementType::Int64 => Bson::Int64(self.read_i64()?),
            ElementType::Double => Bson::Double(f64::from_le_bytes(self.read_array::<8>()?)),
            ElementType::DateTime => {
                let millis = self.read_i64()?;
                let date = DateTime::from_timestamp_millis(millis).ok_or_else(|| {
                    BsonError::Format(format!("date {millis}ms is out of range"))
                })?;
                Bson::DateTime(date)
            }
            ElementType::ObjectId => Bson::ObjectId(ObjectId::from_bytes(self.read_array::<12>()?)),
            ElementType::String => Bson::String(self.read_len_string()?),
            ElementType::JavaScriptCode => Bson::JavaScriptCode(self.read_len_string()?),
            ElementType::Document => Bson::Document(self.read_document()?),
            ElementType::Array => Bson::Array(self.read_document()?.into_iter().map(|(_, v)| v).collect()),
            ElementType::RegularExpression => {
                let pattern = self.read_cstring()?;
                let options = self.read_cstring()?;
                Bson::RegularExpression(Regex { pattern, options })
            }
            ElementType::JavaScriptCodeWithScope => self.read_code_with_scope()?,
            ElementType::Binary => self.read_binary()?,
        })
    }

    fn read_code_with_scope(&mut self) -> Result<Bson> {
        let start = self.position;
        let size = self.read_i32()?;
        let code = self.read_len_string()?;
        let scope = self.read_document()?;
        let consumed = self.position - start;
        if usize::try_from(size).ok() != Some(consumed) {
            return Err(BsonError::Format(format!(
                "should have read {size} bytes from stream but read {consumed} in CodeWScope"
            )));
        }
        Ok(Bson::JavaScriptCodeWithScope(CodeWithScope { code, scope }))
    }

    fn read_binary(&mut self) -> Result<Bson> {
        let mut size = self.read_length("binary")?;
        let subtype = BinarySubtype::from(self.read_u8()?);
        if subtype == BinarySubtype::General {
            size = self.read_length("binary")?;
        }
        let bytes = self.read_bytes(size)?;
        Ok(Bson::from(Binary { subtype, bytes }))
    }

    /// Reads a NUL-terminated string through the scratch buffer.
    pub fn read_cstring(&mut self) -> Result<String> {
        let mut out = String::new();
        self.carry.reset();
        loop {
            let slot = self.carry.fill_slot();
            let mut filled = 0;
            let mut terminated = false;
            while filled < slot.len() {
                let byte = read_byte(&mut self.stream)?;
                self.position += 1;
                if byte == 0 {
                    terminated = true;
                    break;
                }
                slot[filled] = byte;
                filled += 1;
            }
            self.carry.commit(filled, &mut out)?;
            if terminated {
                break;
            }
            debug!(decoded = out.len(), "cstring exceeds scratch buffer, refilling");
        }
        self.carry.finish()?;
        Ok(out)
    }

    /// Reads a 4-byte length, that many UTF-8 bytes minus one, and the
    /// trailing NUL (discarded).
    pub fn read_len_string(&mut self) -> Result<String> {
        let length = self.read_i32()?;
        if length < 1 {
            return Err(BsonError::Format(format!(
                "string length {length} does not include its terminator"
            )));
        }
        let value = self.read_utf8(length as usize - 1)?;
        self.read_u8()?;
        Ok(value)
    }

    fn read_utf8(&mut self, length: usize) -> Result<String> {
        // The declared length is untrusted until the bytes arrive.
        let mut out = String::with_capacity(length.min(self.carry.capacity()));
        let mut total = 0;
        self.carry.reset();
        while total < length {
            let slot = self.carry.fill_slot();
            let wanted = slot.len().min(length - total);
            let read = fill(&mut self.stream, &mut slot[..wanted])?;
            if read == 0 {
                return Err(BsonError::UnexpectedEof);
            }
            total += read;
            self.position += read;
            self.carry.commit(read, &mut out)?;
            if total < length {
                debug!(total, length, carried = self.carry.carried(), "refilling string buffer");
            }
        }
        self.carry.finish()?;
        Ok(out)
    }

    fn read_length(&mut self, what: &str) -> Result<usize> {
        let length = self.read_i32()?;
        usize::try_from(length).map_err(|_| BsonError::Format(format!("negative {what} length {length}")))
    }

    fn read_bytes(&mut self, n: usize) -> Result<Vec<u8>> {
        let mut bytes = Vec::new();
        let read = (&mut self.stream).take(n as u64).read_to_end(&mut bytes)?;
        self.position += read;
        if read < n {
            return Err(BsonError::UnexpectedEof);
        }
        Ok(bytes)
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut bytes = [0u8; N];
        self.stream.read_exact(&mut bytes)?;
        self.position += N;
        Ok(bytes)
    }

    fn read_u8(&mut self) -> Result<u8> {
        let byte = read_byte(&mut self.stream)?;
        self.position += 1;
        Ok(byte)
    }

    fn read_i32(&mut self) -> Result<i32> {
        Ok(i32::from_le_bytes(self.read_array::<4>()?))
    }

    fn read_i64(&mut self) -> Result<i64> {
        Ok(i64::from_le_bytes(self.read_array::<8>()?))
    }
}

fn read_byte<R: Read>(stream: &mut R) -> Result<u8> {
    let mut byte = [0u8; 1];
    stream.read_exact(&mut byte)?;
    Ok(byte[0])
}

/// A single read, retried on interruption.
fn fill<R: Read>(stream: &mut R, buf: &mut [u8]) -> Result<usize> {
    loop {
        match stream.read(buf) {
            Ok(n) => return Ok(n),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doc;

    fn read(bytes: &[u8]) -> Result<Document> {
        BsonReader::new(bytes).read()
    }

    #[test]
    fn empty_document() {
        assert_eq!(read(&[5, 0, 0, 0, 0]).unwrap(), Document::new());
    }

    #[test]
    fn simple_string() {
        // {"test": "test"}
        let bytes = [
            0x15, 0, 0, 0, 0x02, b't', b'e', b's', b't', 0, 0x05, 0, 0, 0, b't', b'e', b's', b't', 0, 0,
        ];
        let mut bytes = bytes.to_vec();
        bytes[0] = bytes.len() as u8;
        assert_eq!(read(&bytes).unwrap(), doc! { "test" => "test" });
    }

    #[test]
    fn oversized_string_length_fails_at_end_of_input() {
        let bytes = [16, 0, 0, 0, 0x02, b's', 0, 0xff, 0xff, 0xff, 0x7f, b'a', b'b', b'c', 0, 0];
        assert!(matches!(read(&bytes), Err(BsonError::UnexpectedEof)));
    }

    #[test]
    fn undefined_reads_as_null() {
        let bytes = [8, 0, 0, 0, 0x06, b'u', 0, 0];
        assert_eq!(read(&bytes).unwrap(), doc! { "u" => Bson::Null });
    }

    #[test]
    fn min_and_max_key() {
        let bytes = [11, 0, 0, 0, 0xFF, b'a', 0, 0x7F, b'b', 0, 0];
        assert_eq!(read(&bytes).unwrap(), doc! { "a" => Bson::MinKey, "b" => Bson::MaxKey });
    }

    #[test]
    fn unterminated_document() {
        let err = read(&[5, 0, 0, 0, 1]).unwrap_err();
        assert!(matches!(err, BsonError::Format(ref m) if m.contains("not null terminated")));
    }

    #[test]
    fn size_mismatch() {
        // Declares 9 bytes but holds an 11-byte int32 element.
        let bytes = [9, 0, 0, 0, 0x10, b'a', 0, 1, 0, 0, 0, 0];
        let err = read(&bytes).unwrap_err();
        assert!(matches!(err, BsonError::Format(ref m) if m.contains("should have read 9 bytes")));
    }

    #[test]
    fn unknown_type() {
        let bytes = [8, 0, 0, 0, 0x13, b'a', 0, 0];
        assert!(matches!(read(&bytes), Err(BsonError::UnrecognizedType(0x13))));
    }

    #[test]
    fn truncated_input() {
        assert!(matches!(read(&[12, 0, 0, 0, 0x10, b'a', 0, 1]), Err(BsonError::UnexpectedEof)));
        assert!(matches!(read(&[12, 0]), Err(BsonError::UnexpectedEof)));
    }

    #[test]
    fn general_binary_uses_inner_length() {
        // {"b": Binary(General, [1, 2])}: outer 6, subtype 0, inner 2
        let bytes = [
            18, 0, 0, 0, 0x05, b'b', 0, 6, 0, 0, 0, 0x00, 2, 0, 0, 0, 1, 2, 0,
        ];
        let mut bytes = bytes.to_vec();
        bytes[0] = bytes.len() as u8;
        let d = read(&bytes).unwrap();
        assert_eq!(
            d.get("b"),
            Some(&Bson::Binary(Binary { subtype: BinarySubtype::General, bytes: vec![1, 2] }))
        );
    }

    #[test]
    fn position_tracks_consumed_bytes() {
        let mut reader = BsonReader::new(&[5u8, 0, 0, 0, 0, 9, 9][..]);
        reader.read().unwrap();
        assert_eq!(reader.position(), 5);
    }

    #[test]
    fn rejects_oversized_top_level_document() {
        let options = CodecOptions::default().with_max_message_size(4);
        let mut reader = BsonReader::with_options(&[5u8, 0, 0, 0, 0][..], options);
        assert!(matches!(reader.read(), Err(BsonError::MessageTooLarge { size: 5, max: 4 })));
    }
}
