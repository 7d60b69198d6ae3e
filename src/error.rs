//! Map I/O error types.
//!
//! # Error Classification
//!
//! Every failure in the engine is surfaced as a [`MapIoError`]. Errors fall
//! into a small number of families, exposed through [`MapIoError::kind`]:
//!
//! - **Io**: the file system refused a read or write
//! - **Structural**: the document is syntactically broken or has the wrong shape
//! - **Semantic**: the document is well-formed but carries values we cannot accept
//! - **Codec**: tile data could not be decoded or (de)compressed
//! - **Unsupported**: no registered format handles the request
//!
//! Nothing in this crate recovers silently from a semantic or codec error.
//! Recovery, where allowed, is opted into through
//! [`ReadOptions`](crate::config::ReadOptions).

use std::path::PathBuf;

use thiserror::Error;

/// Broad error family, useful for callers that only need to branch on the
/// kind of failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// File system failure.
    Io,
    /// Malformed document structure.
    Structural,
    /// Unacceptable values in a well-formed document.
    Semantic,
    /// Tile data decoding or compression failure.
    Codec,
    /// Unsupported format or operation.
    Unsupported,
}

/// Map I/O errors.
#[derive(Error, Debug)]
pub enum MapIoError {
    /// A required file does not exist.
    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),

    /// I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Syntax error reported by the underlying document parser.
    #[error("Parse error in {format} document: {message}")]
    Parse {
        /// Name of the format being parsed.
        format: &'static str,
        /// Parser message.
        message: String,
    },

    /// The document root does not look like a map or tileset.
    #[error("Unrecognized root structure: {0}")]
    UnrecognizedRoot(String),

    /// A required field is missing.
    #[error("Missing required field: {0}")]
    MissingField(String),

    /// A field has the wrong shape, arity or value.
    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue {
        /// Offending field.
        field: String,
        /// What was wrong with it.
        reason: String,
    },

    /// An enumerated value is not supported.
    #[error("Unsupported {what}: '{value}'")]
    UnsupportedValue {
        /// Kind of value (orientation, property type, compression, ...).
        what: &'static str,
        /// The rejected value.
        value: String,
    },

    /// A tile grid does not match the declared extent.
    #[error("Tile count mismatch: expected {expected} tiles, found {actual}")]
    TileCountMismatch {
        /// Tiles implied by the extent.
        expected: usize,
        /// Tiles actually decoded.
        actual: usize,
    },

    /// Decompressed tile data runs past the grid extent.
    #[error("Tile data exceeds the expected {expected} tiles")]
    TileDataOverflow {
        /// Tiles implied by the extent.
        expected: usize,
    },

    /// Two tilesets claim the same global tile identifier.
    #[error("Duplicate global tile identifier {0} across tilesets")]
    DuplicateTileId(i32),

    /// Map extent or tile size is not strictly positive, or a tile layer has
    /// the wrong dimensions.
    #[error("Invalid extent: {0}")]
    InvalidExtent(String),

    /// A component instance references an undefined component.
    #[error("Unknown component: '{0}'")]
    UnknownComponent(String),

    /// Compression failed.
    #[error("Compression error: {0}")]
    Compression(String),

    /// Decompression failed.
    #[error("Decompression error: {0}")]
    Decompression(String),

    /// Malformed base64 tile data.
    #[error("Base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),

    /// Decoded tile data is not a whole number of tile identifiers.
    #[error("Tile data length {0} is not a multiple of 4 bytes")]
    MisalignedTileData(usize),

    /// No registered format claims the extension.
    #[error("Unsupported format: '{0}'")]
    UnsupportedFormat(String),

    /// The format does not implement the requested operation.
    #[error("{format} format does not support {operation}")]
    UnsupportedOperation {
        /// Format name.
        format: &'static str,
        /// Rejected operation.
        operation: &'static str,
    },

    /// A grid position lies outside the grid.
    #[error("Position ({row}, {col}) is out of bounds")]
    OutOfBounds {
        /// Row index.
        row: usize,
        /// Column index.
        col: usize,
    },

    /// Configuration error.
    #[error("Config error: {0}")]
    Config(String),
}

/// Result type alias for map I/O operations
pub type Result<T> = std::result::Result<T, MapIoError>;

impl MapIoError {
    /// Classify the error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            MapIoError::FileNotFound(_) | MapIoError::Io(_) => ErrorKind::Io,
            MapIoError::Parse { .. }
            | MapIoError::UnrecognizedRoot(_)
            | MapIoError::MissingField(_)
            | MapIoError::InvalidValue { .. }
            | MapIoError::Config(_) => ErrorKind::Structural,
            MapIoError::UnsupportedValue { .. }
            | MapIoError::TileCountMismatch { .. }
            | MapIoError::TileDataOverflow { .. }
            | MapIoError::DuplicateTileId(_)
            | MapIoError::InvalidExtent(_)
            | MapIoError::UnknownComponent(_)
            | MapIoError::OutOfBounds { .. } => ErrorKind::Semantic,
            MapIoError::Compression(_)
            | MapIoError::Decompression(_)
            | MapIoError::Base64(_)
            | MapIoError::MisalignedTileData(_) => ErrorKind::Codec,
            MapIoError::UnsupportedFormat(_) | MapIoError::UnsupportedOperation { .. } => {
                ErrorKind::Unsupported
            },
        }
    }

    pub(crate) fn missing(field: impl Into<String>) -> Self {
        MapIoError::MissingField(field.into())
    }

    pub(crate) fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        MapIoError::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn unsupported(what: &'static str, value: impl Into<String>) -> Self {
        MapIoError::UnsupportedValue {
            what,
            value: value.into(),
        }
    }
}

impl From<serde_json::Error> for MapIoError {
    fn from(err: serde_json::Error) -> Self {
        MapIoError::Parse {
            format: "JSON",
            message: err.to_string(),
        }
    }
}

impl From<serde_yaml::Error> for MapIoError {
    fn from(err: serde_yaml::Error) -> Self {
        MapIoError::Parse {
            format: "YAML",
            message: err.to_string(),
        }
    }
}

impl From<quick_xml::Error> for MapIoError {
    fn from(err: quick_xml::Error) -> Self {
        MapIoError::Parse {
            format: "XML",
            message: err.to_string(),
        }
    }
}

impl From<toml::de::Error> for MapIoError {
    fn from(err: toml::de::Error) -> Self {
        MapIoError::Config(err.to_string())
    }
}
