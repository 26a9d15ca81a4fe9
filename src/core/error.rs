//! Error types for decoding and encoding

use thiserror::Error;

#[derive(Error, Debug)]
pub enum XcfError {
    #[error("Malformed header: {0}")]
    MalformedHeader(String),

    #[error("Unsupported format version token: {0:?}")]
    UnsupportedVersion(String),

    #[error("Unsupported pixel precision {precision} for format version {version}")]
    UnsupportedPrecision { version: u8, precision: u32 },

    #[error("Invalid base type: {0}")]
    InvalidBaseType(u32),

    #[error("Unknown compression mode: {0}")]
    UnknownCompression(u8),

    #[error("Invalid property list: {0}")]
    InvalidPropertyList(String),

    #[error("Invalid opacity: {0}")]
    InvalidOpacity(String),

    #[error("Invalid state for property {property}: {value}")]
    InvalidState { property: u32, value: u32 },

    #[error("Inconsistent data: {0}")]
    InconsistentData(String),

    #[error("Layer {0:?} is stacked above another layer but has no alpha channel")]
    MissingAlpha(String),

    #[error("Invalid group structure: {0}")]
    InvalidGroup(String),

    #[error("Invalid string at offset {offset}")]
    InvalidString { offset: u64 },

    #[error("String too long: {len} bytes (max: {max})")]
    StringTooLong { len: u64, max: u64 },

    #[error("Invalid parasite layout: {0}")]
    InvalidParasiteLayout(String),

    #[error("Unexpected end of stream at offset {offset}")]
    UnexpectedEof { offset: u64 },

    #[error("Pointer {0:#x} does not fit the 32-bit pointers of this format version")]
    PointerOverflow(u64),

    #[error("Invalid document: {0}")]
    InvalidDocument(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Tile worker failed: {0}")]
    Worker(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl XcfError {
    /// True for failures caused by a version or precision this crate does not read,
    /// as opposed to a corrupt stream.
    pub fn is_unsupported(&self) -> bool {
        matches!(
            self,
            XcfError::UnsupportedVersion(_) | XcfError::UnsupportedPrecision { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, XcfError>;
