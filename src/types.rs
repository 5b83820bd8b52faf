//! Shared value and result types exposed past the decode boundary.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// One decoded sample value.
///
/// Raw extraction produces integers, floats or byte payloads; applying a
/// conversion may turn a numeric raw value into a [`Value::Float`] or a
/// [`Value::String`]. String and byte-array channels bypass numeric
/// conversion entirely.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Unsigned integer (up to 64 bits).
    UnsignedInteger(u64),
    /// Signed integer (up to 64 bits).
    SignedInteger(i64),
    /// Floating point value (32 or 64 bit on disk, widened to f64).
    Float(f64),
    /// Text string (UTF-8, or converted from Latin-1 / UTF-16).
    String(String),
    /// Raw byte payload (byte-array channels, matrix channels, blobs).
    ByteArray(Vec<u8>),
}

impl Value {
    /// Numeric view of the value, if it has one.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::UnsignedInteger(v) => Some(*v as f64),
            Value::SignedInteger(v) => Some(*v as f64),
            Value::Float(v) => Some(*v),
            _ => None,
        }
    }

    /// String view of the value, if it is text.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns true for integer values, signed or unsigned.
    #[inline]
    pub fn is_integer(&self) -> bool {
        matches!(self, Value::UnsignedInteger(_) | Value::SignedInteger(_))
    }

    /// Returns true for string values.
    #[inline]
    pub fn is_string(&self) -> bool {
        matches!(self, Value::String(_))
    }
}

/// A degradation that happened while producing an otherwise successful
/// result.
///
/// No degradation is silent: every fallback applied during directory walking
/// or decoding is recorded on the result it affected (and logged at warn
/// level).
#[derive(Debug, Clone, PartialEq)]
pub enum Warning {
    /// A conversion block was malformed or of an unsupported subtype; the
    /// channel decodes with the identity conversion instead.
    ConversionFallback { channel: String, reason: String },

    /// The group has no master channel; a 0..n sample index was synthesized
    /// as the axis.
    MissingMaster { group: usize },

    /// The group declares more than one master channel; the first one wins.
    MultipleMasters { group: usize, picked: String },

    /// Records with an unknown record id were skipped while demultiplexing
    /// an unsorted data group.
    UnknownRecordId { group: usize, skipped: usize },

    /// The file identifier is `"UnFinMF "`; contents may be incomplete.
    UnfinalizedFile,

    /// An optional link could not be resolved and was ignored.
    UnresolvedOptionalLink { address: u64, what: &'static str },
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Warning::ConversionFallback { channel, reason } => {
                write!(f, "channel {channel:?}: conversion fell back to identity ({reason})")
            }
            Warning::MissingMaster { group } => {
                write!(f, "group {group}: no master channel, synthesized sample index")
            }
            Warning::MultipleMasters { group, picked } => {
                write!(f, "group {group}: multiple master channels, picked {picked:?}")
            }
            Warning::UnknownRecordId { group, skipped } => {
                write!(f, "group {group}: skipped {skipped} records with unknown record id")
            }
            Warning::UnfinalizedFile => write!(f, "file is unfinalized (UnFinMF)"),
            Warning::UnresolvedOptionalLink { address, what } => {
                write!(f, "ignored unresolvable {what} link at {address:#x}")
            }
        }
    }
}

/// The decoded output artifact for one channel: a fixed-length sequence of
/// physical values plus a reference to its master (time) axis.
///
/// `None` samples are the explicit "no data" marker — invalidation bit set,
/// extraction failure, or per-sample conversion failure (e.g. a rational
/// conversion dividing by zero). Invalid samples are never substituted with
/// zero.
#[derive(Debug, Clone)]
pub struct ChannelArray {
    /// Channel name.
    pub name: String,
    /// Physical unit, if the file declares one.
    pub unit: Option<String>,
    /// One entry per record, in on-disk record order.
    pub samples: Vec<Option<Value>>,
    /// The master (time/index) axis for this channel's group. `None` on the
    /// master array itself.
    pub master: Option<Arc<ChannelArray>>,
    /// Degradations that applied to this channel.
    pub warnings: Vec<Warning>,
}

impl ChannelArray {
    /// Number of samples (valid or not).
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// True when the array holds no samples.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Iterator over valid samples only.
    pub fn valid_samples(&self) -> impl Iterator<Item = &Value> {
        self.samples.iter().filter_map(|s| s.as_ref())
    }
}

/// All channels of one channel group, decoded together.
#[derive(Debug)]
pub struct DecodedGroup {
    /// The master axis, shared by every entry in `channels`.
    pub master: Arc<ChannelArray>,
    /// Channel name to decoded array, in no particular order.
    pub channels: std::collections::BTreeMap<String, ChannelArray>,
    /// Group-level degradations (missing master, skipped records, ...).
    pub warnings: Vec<Warning>,
}

/// Summary of one channel, as listed by [`crate::Mdf::channel_groups`].
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ChannelDescriptor {
    pub name: String,
    pub unit: Option<String>,
    pub bit_count: u32,
    /// True for the group's master (time) channel.
    pub is_master: bool,
    /// Dimension sizes for matrix channels, empty for scalars.
    pub array_dims: Vec<u64>,
}

/// Summary of one channel group, as listed by [`crate::Mdf::channel_groups`].
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ChannelGroupDescriptor {
    /// Index used by the decode operations.
    pub index: usize,
    /// Acquisition name, when the file declares one.
    pub name: Option<String>,
    /// Index of the owning data group.
    pub data_group: usize,
    /// Declared record (cycle) count.
    pub record_count: u64,
    /// Record data length in bytes, excluding record id and invalidation
    /// bytes.
    pub record_len: u32,
    pub channels: Vec<ChannelDescriptor>,
}

/// Cooperative cancellation flag for long decodes.
///
/// The decoder checks the token between records; a cancelled decode returns
/// [`crate::Error::Cancelled`] and discards all partial output.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Safe to call from another thread.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    /// True once [`cancel`](Self::cancel) has been called.
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}
