//! BSON document model with a byte-exact streaming reader and writer.
//!
//! Documents are ordered maps of keys to [`Bson`] values. [`BsonReader`]
//! decodes from any [`std::io::Read`], verifying every declared size and
//! decoding strings through a small scratch buffer without splitting UTF-8
//! sequences. [`BsonWriter`] computes each size before emitting bytes and
//! refuses messages above [`CodecOptions::max_message_size`].
//!
//! # Example
//!
//! ```
//! use mongo_bson::{decode, doc, encode, Bson};
//!
//! let person = doc! { "FirstName" => "Jack", "Age" => 21 };
//! let bytes = encode(&person).unwrap();
//! assert_eq!(bytes.len(), mongo_bson::calculate_size(&person));
//!
//! let back = decode(&bytes).unwrap();
//! assert_eq!(back.get("Age"), Some(&Bson::Int32(21)));
//! assert_eq!(back, person);
//! ```

pub mod document;
pub mod error;
pub mod extjson;
pub mod object_id;
pub mod options;
pub mod reader;
pub mod utf8;
pub mod value;
pub mod writer;

pub use document::Document;
pub use error::{BsonError, Result};
pub use object_id::ObjectId;
pub use options::CodecOptions;
pub use reader::BsonReader;
pub use value::{Binary, BinarySubtype, Bson, CodeWithScope, ElementType, Regex};
pub use writer::{calculate_size, calculate_size_value, BsonWriter};

pub use chrono;
pub use uuid;

/// Encodes a document with the default options.
pub fn encode(document: &Document) -> Result<Vec<u8>> {
    let mut writer = BsonWriter::new(Vec::with_capacity(calculate_size(document)));
    writer.write(document)?;
    Ok(writer.into_inner())
}

/// Decodes one document from the start of `bytes` with the default options.
pub fn decode(bytes: &[u8]) -> Result<Document> {
    BsonReader::new(bytes).read()
}
