//! Output files: a self-describing header followed by fixed-size flow
//! records, optionally compressed in independent zlib blocks.

mod header;
mod reader;
mod record;
mod writer;

pub use header::{FileHeader, FORMAT_FLOWCAP, MAGIC};
pub use reader::read_container;
pub use record::{FileRecord, RECORD_LEN};
pub use writer::{ContainerWriter, Summary};

use fcap_config::Compression;
use thiserror::Error;

/// Largest uncompressed block written in one piece.
pub const BLOCK_MAX: usize = 64 * 1024;

#[derive(Error, Debug)]
pub enum ContainerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Not an output file (magic {0:#010x})")]
    BadMagic(u32),
    #[error("Unsupported file version {0}")]
    UnsupportedVersion(u8),
    #[error("Unknown compression method {0}")]
    UnknownCompression(u8),
    #[error("Compression method '{0}' is not available in this build")]
    CompressionUnavailable(Compression),
    #[error("Name '{0}' is too long for a file header")]
    NameTooLong(String),
    #[error("Corrupt file: {0}")]
    Corrupt(String),
}
