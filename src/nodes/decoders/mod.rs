//! Protocol decoder nodes
//!
//! The command decoder core and the data types flowing through it.

pub mod command_decoder;
pub mod types;

// Re-export common types
pub use types::{AnalyzerSettings, ArgumentRadix, BusEvent, Command, CommandFrame, EventKind};

// Re-export the decoder
pub use command_decoder::{CommandDecoder, CommandDecoderNode, DecoderState};
