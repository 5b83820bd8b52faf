//! Decoder for ASAM MDF measurement files (versions 3.x and 4.x).
//!
//! The crate reads a measurement file's block graph, plans the record layout
//! of each channel group, and decodes records into typed per-channel sample
//! arrays with physical-unit conversions applied.
//!
//! ```no_run
//! use mdf_decode::Mdf;
//!
//! # fn main() -> mdf_decode::Result<()> {
//! let mdf = Mdf::open("measurement.mf4")?;
//! for group in mdf.channel_groups() {
//!     println!("group {}: {} records", group.index, group.record_count);
//! }
//! let speed = mdf.decode_channel(0, "EngineSpeed")?;
//! for (t, v) in speed
//!     .master
//!     .as_ref()
//!     .map(|m| m.samples.iter())
//!     .into_iter()
//!     .flatten()
//!     .zip(&speed.samples)
//! {
//!     println!("{t:?} -> {v:?}");
//! }
//! # Ok(())
//! # }
//! ```
//!
//! Decoding is tolerant by default: malformed conversions fall back to raw
//! values, missing masters get a synthesized index, and every such
//! degradation is reported as a [`Warning`] on the affected result. Structural
//! corruption (cyclic links, out-of-bounds offsets) fails fast instead.

#![forbid(unsafe_code)]

pub mod blocks;
pub mod conversion;
pub mod error;
pub mod parsing;
pub mod types;

mod mdf;

pub use blocks::{ByteOrder, DataType, Dialect};
pub use conversion::Conversion;
pub use error::{ConversionError, Error, FormatError, LayoutError, Result};
pub use mdf::{Mdf, MdfOptions};
pub use types::{
    CancelToken, ChannelArray, ChannelDescriptor, ChannelGroupDescriptor, DecodedGroup, Value,
    Warning,
};
