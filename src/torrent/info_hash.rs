use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Errors building an [`InfoHash`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InfoHashError {
    /// Raw input was not exactly 20 bytes.
    #[error("info hash must be 20 bytes, got {0}")]
    InvalidLength(usize),

    /// Hex input was not 40 hex digits.
    #[error("invalid info hash hex: {0}")]
    InvalidHex(String),
}

/// The 20-byte SHA-1 identifier of a torrent, as sent to trackers.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InfoHash([u8; 20]);

impl InfoHash {
    pub const LEN: usize = 20;

    pub const fn new(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, InfoHashError> {
        <[u8; 20]>::try_from(bytes)
            .map(Self)
            .map_err(|_| InfoHashError::InvalidLength(bytes.len()))
    }

    pub fn from_hex(s: &str) -> Result<Self, InfoHashError> {
        if s.len() != Self::LEN * 2 || !s.is_ascii() {
            return Err(InfoHashError::InvalidHex(s.to_string()));
        }

        let mut bytes = [0u8; 20];
        for (i, byte) in bytes.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&s[i * 2..i * 2 + 2], 16)
                .map_err(|_| InfoHashError::InvalidHex(s.to_string()))?;
        }
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        self.0.iter().fold(String::with_capacity(40), |mut s, b| {
            use std::fmt::Write;
            let _ = write!(s, "{:02x}", b);
            s
        })
    }
}

impl From<[u8; 20]> for InfoHash {
    fn from(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for InfoHash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl FromStr for InfoHash {
    type Err = InfoHashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl fmt::Debug for InfoHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "InfoHash({})", self.to_hex())
    }
}

impl fmt::Display for InfoHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}
