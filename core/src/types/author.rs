use anyhow::Result;
use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};

/// An author row. `id` is assigned by the backend on create.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Encode, Decode)]
pub struct Author {
    pub id: i64,
    pub name: String,
    pub surname: String,
    pub birth_country: String,
}

impl Author {
    /// Fixture author for benchmark task number `code`.
    pub fn sample(code: usize) -> Self {
        Self {
            id: 0,
            name: format!("Author#{code}"),
            surname: format!("Surname#{code}"),
            birth_country: format!("BirthCountry#{code}"),
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        super::encode_record("author", self)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        super::decode_record("author", bytes)
    }
}
