//! Signed exchange format versions.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ExchangeError;
use crate::mice::MiEncoding;

/// Length of the magic prefix that opens every exchange.
pub const MAGIC_LEN: usize = 8;

/// Format version, carried in the magic prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Version {
    B1,
    B2,
    B3,
}

impl Version {
    pub const ALL: [Version; 3] = [Version::B1, Version::B2, Version::B3];

    pub fn magic(self) -> &'static [u8; MAGIC_LEN] {
        match self {
            Self::B1 => b"sxg1-b1\0",
            Self::B2 => b"sxg1-b2\0",
            Self::B3 => b"sxg1-b3\0",
        }
    }

    pub fn from_magic(magic: &[u8]) -> Option<Self> {
        Self::ALL.into_iter().find(|v| v.magic().as_slice() == magic)
    }

    /// Context string mixed into the signed message.
    pub fn signature_context(self) -> &'static str {
        match self {
            Self::B1 => "HTTP Exchange 1 b1",
            Self::B2 => "HTTP Exchange 1 b2",
            Self::B3 => "HTTP Exchange 1 b3",
        }
    }

    /// The only `integrity` parameter value this version accepts.
    pub fn integrity_identifier(self) -> &'static str {
        match self {
            Self::B1 => "mi-draft2",
            Self::B2 | Self::B3 => "digest/mi-sha256-03",
        }
    }

    pub fn mi_encoding(self) -> MiEncoding {
        match self {
            Self::B1 => MiEncoding::Draft02,
            Self::B2 | Self::B3 => MiEncoding::Draft03,
        }
    }

    /// b2 and later carry the fallback URL in the frame; b1 carries it in
    /// the request map of the header block.
    pub fn has_framed_url(self) -> bool {
        !matches!(self, Self::B1)
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            Self::B1 => "application/signed-exchange;v=b1",
            Self::B2 => "application/signed-exchange;v=b2",
            Self::B3 => "application/signed-exchange;v=b3",
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::B1 => "1b1",
            Self::B2 => "1b2",
            Self::B3 => "1b3",
        })
    }
}

impl FromStr for Version {
    type Err = ExchangeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "1b1" | "b1" => Ok(Self::B1),
            "1b2" | "b2" => Ok(Self::B2),
            "1b3" | "b3" => Ok(Self::B3),
            other => Err(ExchangeError::format(
                "version",
                format!("unknown version {other:?}"),
            )),
        }
    }
}
