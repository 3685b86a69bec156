//! Protocol parameters and their binary encoding.
//!
//! Parameters travel inside milestones as opaque bytes and are only decoded
//! when they are loaded or activated. The layout is little endian:
//!
//! | Field | Encoding |
//! |-------|----------|
//! | `version` | `u8` |
//! | `network_name` | `u8` length prefix + UTF-8 |
//! | `bech32_hrp` | `u8` length prefix + UTF-8 |
//! | `min_pow_score` | `u32` |
//! | `below_max_depth` | `u8` |
//! | `rent_structure.vbyte_cost` | `u32` |
//! | `rent_structure.vbyte_factor_data` | `u8` |
//! | `rent_structure.vbyte_factor_key` | `u8` |
//! | `token_supply` | `u64` |
//!
//! # Decoding modes
//!
//! [`DeserializationMode::NoValidation`] is used for bytes this node already
//! accepted and persisted. It tolerates trailing data and lossy strings and
//! skips semantic checks. [`DeserializationMode::PerformValidation`] is used
//! for bytes that have never been checked, such as a pending change becoming
//! active, and rejects anything malformed.

use serde::{Deserialize, Serialize};

/// Protocol version number carried by parameters and announcements.
pub type ProtocolVersion = u8;

const MAX_STRING_LENGTH: usize = u8::MAX as usize;
const MAX_BECH32_HRP_LENGTH: usize = 83;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeserializationMode {
    NoValidation,
    PerformValidation,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    #[error("unexpected end of data while reading {field}")]
    UnexpectedEof { field: &'static str },

    #[error("{field} is not valid UTF-8")]
    InvalidUtf8 { field: &'static str },

    #[error("{field} is {len} bytes, maximum is {max}")]
    TooLong {
        field: &'static str,
        len: usize,
        max: usize,
    },

    #[error("{0} trailing bytes after protocol parameters")]
    TrailingBytes(usize),

    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

pub type Result<T> = std::result::Result<T, CodecError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RentStructure {
    pub vbyte_cost: u32,
    pub vbyte_factor_data: u8,
    pub vbyte_factor_key: u8,
}

impl Default for RentStructure {
    fn default() -> Self {
        Self {
            vbyte_cost: 500,
            vbyte_factor_data: 1,
            vbyte_factor_key: 10,
        }
    }
}

/// The ruleset a node validates and processes the ledger under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolParameters {
    pub version: ProtocolVersion,
    pub network_name: String,
    pub bech32_hrp: String,
    pub min_pow_score: u32,
    pub below_max_depth: u8,
    pub token_supply: u64,
    #[serde(default)]
    pub rent_structure: RentStructure,
}

impl Default for ProtocolParameters {
    fn default() -> Self {
        Self {
            version: 2,
            network_name: "testnet".to_string(),
            bech32_hrp: "rms".to_string(),
            min_pow_score: 1000,
            below_max_depth: 15,
            token_supply: 1_813_620_509_061_365,
            rent_structure: RentStructure::default(),
        }
    }
}

impl ProtocolParameters {
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(
            1 + 1 + self.network_name.len() + 1 + self.bech32_hrp.len() + 4 + 1 + 6 + 8,
        );
        out.push(self.version);
        write_string(&mut out, "network_name", &self.network_name)?;
        write_string(&mut out, "bech32_hrp", &self.bech32_hrp)?;
        out.extend_from_slice(&self.min_pow_score.to_le_bytes());
        out.push(self.below_max_depth);
        out.extend_from_slice(&self.rent_structure.vbyte_cost.to_le_bytes());
        out.push(self.rent_structure.vbyte_factor_data);
        out.push(self.rent_structure.vbyte_factor_key);
        out.extend_from_slice(&self.token_supply.to_le_bytes());
        Ok(out)
    }

    pub fn from_bytes(bytes: &[u8], mode: DeserializationMode) -> Result<Self> {
        let mut reader = Reader::new(bytes, mode);

        let params = Self {
            version: reader.u8("version")?,
            network_name: reader.string("network_name")?,
            bech32_hrp: reader.string("bech32_hrp")?,
            min_pow_score: reader.u32("min_pow_score")?,
            below_max_depth: reader.u8("below_max_depth")?,
            rent_structure: RentStructure {
                vbyte_cost: reader.u32("rent_structure.vbyte_cost")?,
                vbyte_factor_data: reader.u8("rent_structure.vbyte_factor_data")?,
                vbyte_factor_key: reader.u8("rent_structure.vbyte_factor_key")?,
            },
            token_supply: reader.u64("token_supply")?,
        };

        if mode == DeserializationMode::PerformValidation {
            if reader.remaining() > 0 {
                return Err(CodecError::TrailingBytes(reader.remaining()));
            }
            params.validate()?;
        }

        Ok(params)
    }

    /// Semantic checks applied when decoding with validation.
    pub fn validate(&self) -> Result<()> {
        if self.version == 0 {
            return Err(invalid("version", "must be non-zero"));
        }
        if self.network_name.is_empty() {
            return Err(invalid("network_name", "must not be empty"));
        }
        if self.network_name.len() > MAX_STRING_LENGTH {
            return Err(CodecError::TooLong {
                field: "network_name",
                len: self.network_name.len(),
                max: MAX_STRING_LENGTH,
            });
        }
        if self.bech32_hrp.is_empty() {
            return Err(invalid("bech32_hrp", "must not be empty"));
        }
        if self.bech32_hrp.len() > MAX_BECH32_HRP_LENGTH {
            return Err(CodecError::TooLong {
                field: "bech32_hrp",
                len: self.bech32_hrp.len(),
                max: MAX_BECH32_HRP_LENGTH,
            });
        }
        if !self
            .bech32_hrp
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        {
            return Err(invalid(
                "bech32_hrp",
                "must contain only lowercase ASCII letters and digits",
            ));
        }
        if self.below_max_depth == 0 {
            return Err(invalid("below_max_depth", "must be non-zero"));
        }
        if self.token_supply == 0 {
            return Err(invalid("token_supply", "must be non-zero"));
        }
        Ok(())
    }
}

fn invalid(field: &'static str, reason: &str) -> CodecError {
    CodecError::Invalid {
        field,
        reason: reason.to_string(),
    }
}

fn write_string(out: &mut Vec<u8>, field: &'static str, value: &str) -> Result<()> {
    let len = value.len();
    if len > MAX_STRING_LENGTH {
        return Err(CodecError::TooLong {
            field,
            len,
            max: MAX_STRING_LENGTH,
        });
    }
    out.push(len as u8);
    out.extend_from_slice(value.as_bytes());
    Ok(())
}

struct Reader<'a> {
    bytes: &'a [u8],
    offset: usize,
    mode: DeserializationMode,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8], mode: DeserializationMode) -> Self {
        Self {
            bytes,
            offset: 0,
            mode,
        }
    }

    fn remaining(&self) -> usize {
        self.bytes.len() - self.offset
    }

    fn take(&mut self, len: usize, field: &'static str) -> Result<&'a [u8]> {
        if self.remaining() < len {
            return Err(CodecError::UnexpectedEof { field });
        }
        let slice = &self.bytes[self.offset..self.offset + len];
        self.offset += len;
        Ok(slice)
    }

    fn u8(&mut self, field: &'static str) -> Result<u8> {
        Ok(self.take(1, field)?[0])
    }

    fn u32(&mut self, field: &'static str) -> Result<u32> {
        let mut buf = [0u8; 4];
        buf.copy_from_slice(self.take(4, field)?);
        Ok(u32::from_le_bytes(buf))
    }

    fn u64(&mut self, field: &'static str) -> Result<u64> {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(self.take(8, field)?);
        Ok(u64::from_le_bytes(buf))
    }

    fn string(&mut self, field: &'static str) -> Result<String> {
        let len = self.u8(field)? as usize;
        let raw = self.take(len, field)?;
        match self.mode {
            DeserializationMode::NoValidation => Ok(String::from_utf8_lossy(raw).into_owned()),
            DeserializationMode::PerformValidation => std::str::from_utf8(raw)
                .map(str::to_string)
                .map_err(|_| CodecError::InvalidUtf8 { field }),
        }
    }
}
