//! Provisional names for files that do not have a canonical id yet.

use std::fmt;
use std::str::FromStr;

use portrait_core::constants::PROVISIONAL_NAME_BYTES;
use rand::RngCore;

use crate::error::StorageError;

/// Random hex token used as the file name of an original before its record exists.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProvisionalName(String);

impl ProvisionalName {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProvisionalName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ProvisionalName {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let valid = s.len() == PROVISIONAL_NAME_BYTES * 2
            && s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'));
        if !valid {
            return Err(StorageError::InvalidKey(format!(
                "not a provisional name: {}",
                s
            )));
        }
        Ok(ProvisionalName(s.to_string()))
    }
}

/// Generate a provisional name from the thread-local CSPRNG.
pub fn generate_provisional_name() -> ProvisionalName {
    let mut bytes = [0u8; PROVISIONAL_NAME_BYTES];
    rand::rng().fill_bytes(&mut bytes);
    ProvisionalName(hex::encode(bytes))
}
