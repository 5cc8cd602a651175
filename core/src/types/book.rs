use anyhow::Result;
use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};

/// A book row referencing its author by id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Encode, Decode)]
pub struct Book {
    pub id: i64,
    pub author_id: i64,
    pub year: i32,
    pub pages: i32,
    pub title: String,
    pub genre: String,
}

impl Book {
    /// Fixture book for benchmark task number `code`, written by `author_id`.
    pub fn sample(code: usize, author_id: i64) -> Self {
        let n = i32::try_from(code).unwrap_or(i32::MAX);
        Self {
            id: 0,
            author_id,
            year: n,
            pages: n,
            title: format!("Title#{code}"),
            genre: format!("Genre#{code}"),
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        super::encode_record("book", self)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        super::decode_record("book", bytes)
    }
}
