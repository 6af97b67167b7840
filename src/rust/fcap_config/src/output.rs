//! Output file settings shared by the writer and the configuration.

use serde::{Deserialize, Serialize};

/// Oldest output file version that can be written.
pub const FILE_VERSION_MIN: u8 = 2;
/// Newest output file version that can be written.
pub const FILE_VERSION_MAX: u8 = 5;
/// Version written when the configuration doesn't say.
pub const FILE_VERSION_DEFAULT: u8 = 5;

/// Compression applied to the body of output files.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    /// Records are stored as-is
    None,
    /// zlib (deflate) blocks
    #[default]
    Zlib,
    /// LZO1X blocks. Recognised, but no LZO codec is linked into this
    /// build, so configuration validation rejects it.
    Lzo,
}

impl Compression {
    /// Identifier stored in the output file header.
    pub fn id(self) -> u8 {
        match self {
            Compression::None => 0,
            Compression::Zlib => 1,
            Compression::Lzo => 2,
        }
    }

    /// Inverse of [`Compression::id`].
    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            0 => Some(Compression::None),
            1 => Some(Compression::Zlib),
            2 => Some(Compression::Lzo),
            _ => None,
        }
    }

    /// Can this build write the method?
    pub fn is_available(self) -> bool {
        !matches!(self, Compression::Lzo)
    }

    /// Name as used in the configuration file.
    pub fn name(self) -> &'static str {
        match self {
            Compression::None => "none",
            Compression::Zlib => "zlib",
            Compression::Lzo => "lzo",
        }
    }
}

impl std::fmt::Display for Compression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
