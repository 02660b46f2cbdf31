//! Node-based signal processing system
//!
//! This module provides the streaming nodes of the crate:
//! - **CsvEventSource**: streams bus events from a capture export
//! - **Decoders**: the command decoder core and its node wrapper
//!
//! Sinks (printers, writers) are application-specific and live with the
//! demo binaries.

pub mod csv_source;
pub mod decoders;

pub use csv_source::CsvEventSource;
