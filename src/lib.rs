//! SPI command-stream decoder with a streaming node-based API
//!
//! This library turns the byte-level output of an SPI analyzer into
//! semantically labeled command frames for a register/buffer-style
//! peripheral. Each command byte packs a 3-bit opcode in its high bits and
//! a 5-bit register address in its low bits; bytes are only meaningful
//! between an enable boundary and the next disable boundary.
//!
//! # Architecture
//!
//! - **CommandDecoder**: the opcode state machine, a pure transducer from
//!   bus events to command frames
//! - **CsvEventSource**: streams bus events from a logic-analyzer CSV export
//! - **Streaming Nodes**: thread-per-node execution with crossbeam channels
//! - **Scheduler**: manages node lifecycle and parallel execution
//!
//! # Example
//!
//! ```
//! use spicmd::{BusEvent, CommandDecoder};
//!
//! let mut decoder = CommandDecoder::new();
//! let _ = decoder.process(BusEvent::enable(0, 0));
//! let frame = decoder.process(BusEvent::byte(0x45, 10, 20));
//! assert!(frame.is_some());
//! ```

use thiserror::Error;

pub mod nodes;
pub mod runtime;

// Re-export the decoder core and its data types
pub use nodes::decoders::{
    AnalyzerSettings, ArgumentRadix, BusEvent, Command, CommandDecoder, CommandDecoderNode,
    CommandFrame, DecoderState, EventKind,
};

// Re-export the capture source
pub use nodes::CsvEventSource;

// Re-export streaming runtime components
pub use runtime::{
    ConnectionError, InputPort, OutputPort, Pipeline, PortDirection, PortSchema, ProcessNode,
    Scheduler, WorkError, WorkResult, register_type,
};

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Header parsing error: {0}")]
    ParseHeader(String),

    #[error("Line {line}: {reason}")]
    ParseRow { line: usize, reason: String },

    #[error("Line {line}: unknown event kind '{kind}'")]
    UnknownEventKind { line: usize, kind: String },
}

pub type Result<T> = std::result::Result<T, CaptureError>;
