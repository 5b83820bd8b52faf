//! Error types for MDF decoding.
//!
//! The taxonomy separates failures by blast radius:
//!
//! - [`FormatError`] — the file cannot be opened at all (bad identification
//!   block, unresolvable mandatory link, truncated block). Fatal to `open`.
//! - [`LayoutError`] — one channel group's record layout is unusable. Other
//!   groups in the same file remain decodable.
//! - [`ConversionError`] — a conversion block is malformed. Where possible
//!   this degrades to an identity conversion with a warning instead of being
//!   raised; it surfaces as an error only when a caller asks for the
//!   conversion itself.
//! - [`Error::CorruptionGuard`] — a link-traversal limit tripped, which means
//!   the block graph is suspected cyclic. Reported distinctly from
//!   [`FormatError`] so callers can tell "likely corrupt" from "wrong format".

use core::fmt;

/// Top-level error for all MDF operations.
#[derive(Debug)]
pub enum Error {
    /// An I/O error occurred while reading the file.
    Io(std::io::Error),

    /// The file structure is unreadable; the whole open operation failed.
    Format(FormatError),

    /// One channel group's record layout is invalid.
    Layout(LayoutError),

    /// A conversion block could not be parsed or applied.
    Conversion(ConversionError),

    /// A block-link traversal exceeded its hop limit or revisited an address.
    ///
    /// Well-formed files never trip this; it indicates a self-referential or
    /// absurdly long link chain, i.e. suspected corruption.
    CorruptionGuard {
        /// Address at which the guard tripped.
        address: u64,
        /// The hop limit in force, or the nesting cap for recursive walks.
        limit: usize,
    },

    /// A decode operation was cancelled through its [`crate::CancelToken`].
    Cancelled,

    /// The requested channel group index does not exist.
    GroupOutOfRange { index: usize, group_count: usize },

    /// The requested channel name does not exist in the group.
    ChannelNotFound { group: usize, name: String },
}

/// Failures that make the whole file unreadable.
#[derive(Debug)]
pub enum FormatError {
    /// Buffer shorter than a block's declared or minimum size.
    TooShortBuffer { actual: usize, expected: usize },

    /// The first 8 bytes are neither `"MDF     "` nor `"UnFinMF "`.
    UnknownIdentifier(String),

    /// The version string in the identification block could not be parsed.
    InvalidVersionString(String),

    /// The numeric version selects no known dialect (supported: 2.x–4.x).
    UnsupportedVersion(u16),

    /// A block's type tag did not match the tag the link promised.
    BlockIdMismatch {
        actual: String,
        expected: &'static str,
        address: u64,
    },

    /// A link points outside the file.
    LinkOutOfBounds { address: u64, file_len: usize },

    /// A declared block length is smaller than the type's minimum.
    BlockTooSmall {
        id: String,
        declared: u64,
        minimum: u64,
    },

    /// A compressed data block could not be inflated.
    Decompression(String),
}

/// Failures scoped to one channel group's record layout.
#[derive(Debug)]
pub enum LayoutError {
    /// A channel's bit range does not fit inside the record.
    ChannelOutOfRecord {
        channel: String,
        bit_end: u64,
        record_bits: u64,
    },

    /// The channel group declares a record length of zero.
    ZeroRecordLength { group: usize },

    /// A variable-length record's length prefix runs past its data block.
    InconsistentLengthPrefix { offset: usize, declared: usize },
}

/// Failures in conversion block parsing or resolution.
#[derive(Debug)]
pub enum ConversionError {
    /// The conversion block's payload disagrees with its declared counts.
    Malformed { address: u64, reason: String },

    /// The conversion subtype is not implemented.
    UnsupportedType { address: u64, cc_type: u16 },

    /// The algebraic formula text failed to parse.
    Formula(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "I/O error: {e}"),
            Error::Format(e) => write!(f, "format error: {e}"),
            Error::Layout(e) => write!(f, "layout error: {e}"),
            Error::Conversion(e) => write!(f, "conversion error: {e}"),
            Error::CorruptionGuard { address, limit } => write!(
                f,
                "traversal guard tripped at {address:#x} (limit {limit}): block graph is likely cyclic or corrupt"
            ),
            Error::Cancelled => write!(f, "decode cancelled"),
            Error::GroupOutOfRange { index, group_count } => {
                write!(
                    f,
                    "channel group {index} out of range ({group_count} groups)"
                )
            }
            Error::ChannelNotFound { group, name } => {
                write!(f, "channel {name:?} not found in group {group}")
            }
        }
    }
}

impl fmt::Display for FormatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FormatError::TooShortBuffer { actual, expected } => {
                write!(f, "need at least {expected} bytes, got {actual}")
            }
            FormatError::UnknownIdentifier(id) => {
                write!(
                    f,
                    r#"invalid file identifier: expected "MDF     ", found {id:?}"#
                )
            }
            FormatError::InvalidVersionString(s) => write!(f, "invalid version string: {s:?}"),
            FormatError::UnsupportedVersion(v) => {
                write!(f, "unsupported MDF version number {v}")
            }
            FormatError::BlockIdMismatch {
                actual,
                expected,
                address,
            } => write!(
                f,
                "block at {address:#x}: expected id {expected:?}, found {actual:?}"
            ),
            FormatError::LinkOutOfBounds { address, file_len } => {
                write!(f, "link {address:#x} outside file of {file_len} bytes")
            }
            FormatError::BlockTooSmall {
                id,
                declared,
                minimum,
            } => write!(
                f,
                "block {id:?} declares {declared} bytes, minimum is {minimum}"
            ),
            FormatError::Decompression(msg) => write!(f, "decompression failed: {msg}"),
        }
    }
}

impl fmt::Display for LayoutError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LayoutError::ChannelOutOfRecord {
                channel,
                bit_end,
                record_bits,
            } => write!(
                f,
                "channel {channel:?} ends at bit {bit_end}, record has {record_bits} bits"
            ),
            LayoutError::ZeroRecordLength { group } => {
                write!(f, "channel group {group} declares a zero-length record")
            }
            LayoutError::InconsistentLengthPrefix { offset, declared } => write!(
                f,
                "length prefix at byte {offset} declares {declared} bytes past end of data"
            ),
        }
    }
}

impl fmt::Display for ConversionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConversionError::Malformed { address, reason } => {
                write!(f, "conversion block at {address:#x} malformed: {reason}")
            }
            ConversionError::UnsupportedType { address, cc_type } => {
                write!(
                    f,
                    "conversion block at {address:#x}: unsupported type {cc_type}"
                )
            }
            ConversionError::Formula(msg) => write!(f, "formula: {msg}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<FormatError> for Error {
    fn from(err: FormatError) -> Self {
        Error::Format(err)
    }
}

impl From<LayoutError> for Error {
    fn from(err: LayoutError) -> Self {
        Error::Layout(err)
    }
}

impl From<ConversionError> for Error {
    fn from(err: ConversionError) -> Self {
        Error::Conversion(err)
    }
}

/// A specialized Result type for MDF operations.
pub type Result<T> = std::result::Result<T, Error>;
