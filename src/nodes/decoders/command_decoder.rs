//! Command byte decoder - the opcode state machine
//!
//! Decodes the single-byte instruction set of a register/buffer-style SPI
//! peripheral. Each command byte carries a 3-bit opcode in bits 7..5 and a
//! 5-bit register address in bits 4..0:
//!
//!   000 RCR   read control register     (address)
//!   001 RBM   read buffer memory
//!   010 WCR   write control register    (address)
//!   011 WBM   write buffer memory
//!   100 BFS   bit field set             (address)
//!   101 BFC   bit field clear           (address)
//!   110       unrecognized, no frame
//!   111 SRC   system reset
//!
//! Bytes are interpreted only inside an enable/disable bracket; every byte
//! within a bracket stands alone as a fresh command byte. Bytes seen while
//! disabled, and bytes with the unrecognized opcode, are absorbed silently -
//! there is no error path, all 256 byte values are legal input.

use super::types::{BusEvent, Command, CommandFrame, EventKind};
use crate::runtime::node::{InputPort, OutputPort, ProcessNode, WorkError, WorkResult};
use std::collections::VecDeque;
use tracing::{debug, trace};

/// Decode state, driven by enable/disable boundaries
///
/// The instruction set is single-byte, so no per-opcode follow-up state is
/// needed; a multi-byte argument phase would slot in as a third variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecoderState {
    /// Outside an enable/disable bracket - bytes are ignored
    Disabled,
    /// Inside a bracket - the next byte is a command byte
    AwaitingOpcode,
}

/// The command decoder state machine
///
/// A pure, push-driven transducer: feed it one [`BusEvent`] at a time and
/// it emits at most one [`CommandFrame`] per event. Exactly one instance
/// exists per analysis run, owned by whoever drives it.
#[derive(Debug)]
pub struct CommandDecoder {
    state: DecoderState,
}

impl CommandDecoder {
    /// Create a decoder in the `Disabled` state
    pub fn new() -> Self {
        Self {
            state: DecoderState::Disabled,
        }
    }

    /// Current decode state
    pub fn state(&self) -> DecoderState {
        self.state
    }

    /// Consume one event, returning the decoded frame if the event was a
    /// recognized command byte inside an enable/disable bracket.
    ///
    /// `Enable` and `Disable` only move the state machine; `Disable` resets
    /// unconditionally, aborting any in-progress transaction.
    pub fn process(&mut self, event: BusEvent) -> Option<CommandFrame> {
        match event.kind {
            EventKind::Enable => {
                self.state = DecoderState::AwaitingOpcode;
                None
            }
            EventKind::Disable => {
                self.state = DecoderState::Disabled;
                None
            }
            EventKind::Byte(byte) => match self.state {
                DecoderState::Disabled => None,
                DecoderState::AwaitingOpcode => {
                    Self::dispatch(byte).map(|command| CommandFrame {
                        command,
                        start_time: event.start_time,
                        end_time: event.end_time,
                    })
                }
            },
        }
    }

    /// Classify one command byte. Returns None for the unrecognized opcode.
    fn dispatch(byte: u8) -> Option<Command> {
        let opcode = (byte >> 5) & 0b111;
        let addr = byte & 0b1_1111;
        match opcode {
            0b000 => Some(Command::ReadControlRegister { addr }),
            0b001 => Some(Command::ReadBufferMemory),
            0b010 => Some(Command::WriteControlRegister { addr }),
            0b011 => Some(Command::WriteBufferMemory),
            0b100 => Some(Command::BitFieldSet { addr }),
            0b101 => Some(Command::BitFieldClear { addr }),
            0b110 => None,
            0b111 => Some(Command::SystemReset),
            _ => unreachable!("opcode is masked to 3 bits"),
        }
    }
}

impl Default for CommandDecoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Streaming node wrapper around [`CommandDecoder`]
///
/// Input: bus events from an upstream byte analyzer.
/// Output: decoded command frames.
///
/// Each work() call consumes exactly one event, so the decoder sees a
/// strictly sequential stream and owns its state exclusively.
pub struct CommandDecoderNode {
    name: String,
    decoder: CommandDecoder,
    frames_emitted: u64,
}

impl CommandDecoderNode {
    pub fn new() -> Self {
        Self {
            name: "command_decoder".to_string(),
            decoder: CommandDecoder::new(),
            frames_emitted: 0,
        }
    }

    /// With custom name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

impl Default for CommandDecoderNode {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessNode for CommandDecoderNode {
    fn name(&self) -> &str {
        &self.name
    }

    fn num_inputs(&self) -> usize {
        1
    }

    fn num_outputs(&self) -> usize {
        1
    }

    fn input_schema(&self) -> Vec<crate::runtime::ports::PortSchema> {
        use crate::runtime::ports::{PortDirection, PortSchema};
        vec![PortSchema::new::<BusEvent>("events", 0, PortDirection::Input)]
    }

    fn output_schema(&self) -> Vec<crate::runtime::ports::PortSchema> {
        use crate::runtime::ports::{PortDirection, PortSchema};
        vec![PortSchema::new::<CommandFrame>(
            "commands",
            0,
            PortDirection::Output,
        )]
    }

    fn work(&mut self, inputs: &[InputPort], outputs: &[OutputPort]) -> WorkResult<usize> {
        let mut input_buffer = VecDeque::new();
        let mut input = inputs
            .first()
            .and_then(|port| port.get::<BusEvent>(&mut input_buffer))
            .ok_or_else(|| WorkError::NodeError("Missing input channel".to_string()))?;

        let output = outputs
            .first()
            .and_then(|port| port.get::<CommandFrame>())
            .ok_or_else(|| WorkError::NodeError("Missing output channel".to_string()))?;

        let event = match input.recv() {
            Ok(event) => event,
            Err(WorkError::Shutdown) => {
                // Upstream is done - pass end-of-stream on before stopping
                debug!(
                    "[{}] Input exhausted after {} frames",
                    self.name, self.frames_emitted
                );
                output.close();
                return Err(WorkError::Shutdown);
            }
            Err(e) => return Err(e),
        };

        match self.decoder.process(event) {
            Some(frame) => {
                debug!("[{}] {} -> {}", self.name, event, frame.command);
                output.send(frame)?;
                self.frames_emitted += 1;
                Ok(1)
            }
            None => {
                trace!(
                    "[{}] {} -> no frame (state {:?})",
                    self.name,
                    event,
                    self.decoder.state()
                );
                Ok(0)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::sender::ChannelMessage;
    use crate::runtime::{InputPort, OutputPort, Pipeline, Sender, Watchdog};
    use crossbeam_channel::bounded;
    use std::sync::{Arc, Mutex};

    fn frame(command: Command, start_time: u64, end_time: u64) -> CommandFrame {
        CommandFrame {
            command,
            start_time,
            end_time,
        }
    }

    // ── Pure decoder ─────────────────────────────────────────────

    #[test]
    fn test_starts_disabled() {
        let decoder = CommandDecoder::new();
        assert_eq!(decoder.state(), DecoderState::Disabled);
    }

    #[test]
    fn test_read_control_register() {
        let mut decoder = CommandDecoder::new();
        assert_eq!(decoder.process(BusEvent::enable(0, 0)), None);
        // opcode 000, address 0b00101
        assert_eq!(
            decoder.process(BusEvent::byte(0x05, 10, 20)),
            Some(frame(Command::ReadControlRegister { addr: 5 }, 10, 20))
        );
        assert_eq!(decoder.process(BusEvent::disable(30, 30)), None);
    }

    #[test]
    fn test_read_buffer_memory_ignores_address_bits() {
        let mut decoder = CommandDecoder::new();
        let _ = decoder.process(BusEvent::enable(0, 0));
        assert_eq!(
            decoder.process(BusEvent::byte(0x20, 1, 2)),
            Some(frame(Command::ReadBufferMemory, 1, 2))
        );
        // Same opcode with address bits set still decodes to RBM
        assert_eq!(
            decoder.process(BusEvent::byte(0x3A, 3, 4)),
            Some(frame(Command::ReadBufferMemory, 3, 4))
        );
    }

    #[test]
    fn test_system_reset_with_all_address_bits() {
        let mut decoder = CommandDecoder::new();
        let _ = decoder.process(BusEvent::enable(0, 0));
        // opcode 111, address bits all set - SRC carries no argument
        assert_eq!(
            decoder.process(BusEvent::byte(0xFF, 5, 6)),
            Some(frame(Command::SystemReset, 5, 6))
        );
    }

    #[test]
    fn test_unrecognized_opcode_produces_no_frame() {
        let mut decoder = CommandDecoder::new();
        let _ = decoder.process(BusEvent::enable(0, 0));
        // opcode 110
        assert_eq!(decoder.process(BusEvent::byte(0xC0, 1, 2)), None);
        assert_eq!(decoder.process(BusEvent::byte(0xDF, 3, 4)), None);
        // State is unchanged and the next byte still decodes
        assert_eq!(decoder.state(), DecoderState::AwaitingOpcode);
        assert_eq!(
            decoder.process(BusEvent::byte(0xE0, 5, 6)),
            Some(frame(Command::SystemReset, 5, 6))
        );
    }

    #[test]
    fn test_byte_while_disabled_is_ignored() {
        let mut decoder = CommandDecoder::new();
        assert_eq!(decoder.process(BusEvent::byte(0x05, 0, 1)), None);
        assert_eq!(decoder.state(), DecoderState::Disabled);
    }

    #[test]
    fn test_disable_resets_and_reenable_decodes_fresh() {
        let mut decoder = CommandDecoder::new();
        let _ = decoder.process(BusEvent::enable(0, 0));
        // opcode 010, address 0
        assert_eq!(
            decoder.process(BusEvent::byte(0x40, 1, 2)),
            Some(frame(Command::WriteControlRegister { addr: 0 }, 1, 2))
        );
        assert_eq!(decoder.process(BusEvent::disable(3, 3)), None);
        assert_eq!(decoder.state(), DecoderState::Disabled);
        assert_eq!(decoder.process(BusEvent::enable(4, 4)), None);
        // opcode 011 - no residue from the previous transaction
        assert_eq!(
            decoder.process(BusEvent::byte(0x60, 5, 6)),
            Some(frame(Command::WriteBufferMemory, 5, 6))
        );
    }

    #[test]
    fn test_every_byte_in_transaction_is_a_fresh_command() {
        let mut decoder = CommandDecoder::new();
        let _ = decoder.process(BusEvent::enable(0, 0));
        let first = decoder.process(BusEvent::byte(0x85, 1, 2));
        let second = decoder.process(BusEvent::byte(0xA3, 3, 4));
        assert_eq!(
            first,
            Some(frame(Command::BitFieldSet { addr: 5 }, 1, 2))
        );
        assert_eq!(
            second,
            Some(frame(Command::BitFieldClear { addr: 3 }, 3, 4))
        );
    }

    #[test]
    fn test_timestamps_pass_through_unchanged() {
        let mut decoder = CommandDecoder::new();
        let _ = decoder.process(BusEvent::enable(100, 100));
        let frame = decoder
            .process(BusEvent::byte(0x00, 123_456_789, 987_654_321))
            .unwrap();
        assert_eq!(frame.start_time, 123_456_789);
        assert_eq!(frame.end_time, 987_654_321);
    }

    #[test]
    fn test_all_256_byte_values_match_dispatch_table() {
        let mut decoder = CommandDecoder::new();
        let _ = decoder.process(BusEvent::enable(0, 0));

        for b in 0u16..=255 {
            let byte = b as u8;
            let opcode = (byte >> 5) & 0b111;
            let addr = byte & 0b1_1111;
            let result = decoder.process(BusEvent::byte(byte, 0, 1)).map(|f| f.command);

            let expected = match opcode {
                0b000 => Some(Command::ReadControlRegister { addr }),
                0b001 => Some(Command::ReadBufferMemory),
                0b010 => Some(Command::WriteControlRegister { addr }),
                0b011 => Some(Command::WriteBufferMemory),
                0b100 => Some(Command::BitFieldSet { addr }),
                0b101 => Some(Command::BitFieldClear { addr }),
                0b110 => None,
                _ => Some(Command::SystemReset),
            };
            assert_eq!(result, expected, "byte 0x{:02x}", byte);
            // Always ready for the next byte
            assert_eq!(decoder.state(), DecoderState::AwaitingOpcode);
        }
    }

    // ── Node through real channel ports ──────────────────────────

    #[test]
    fn test_node_decodes_event_stream() {
        let watchdog = Watchdog::new();
        let (event_tx, event_rx) = bounded::<ChannelMessage<BusEvent>>(64);
        let (frame_tx, frame_rx) = bounded::<ChannelMessage<CommandFrame>>(64);

        let inputs = vec![InputPort::new_with_watchdog(
            event_rx,
            &watchdog,
            "command_decoder",
            "events",
        )];
        let outputs = vec![OutputPort::new_with_watchdog(
            Sender::new(vec![frame_tx]),
            &watchdog,
            "command_decoder",
            "commands",
        )];

        let events = [
            BusEvent::byte(0x05, 0, 1), // before enable: dropped
            BusEvent::enable(2, 2),
            BusEvent::byte(0x45, 3, 4),  // WCR 0x5
            BusEvent::byte(0xC1, 5, 6),  // unrecognized: dropped
            BusEvent::byte(0xFF, 7, 8),  // SRC
            BusEvent::disable(9, 9),
            BusEvent::byte(0x20, 10, 11), // after disable: dropped
        ];
        for event in events {
            event_tx.send(ChannelMessage::Item(event)).unwrap();
        }
        event_tx.send(ChannelMessage::EndOfStream).unwrap();

        let mut node = CommandDecoderNode::new();
        let mut emitted = 0;
        loop {
            match node.work(&inputs, &outputs) {
                Ok(n) => emitted += n,
                Err(WorkError::Shutdown) => break,
                Err(e) => panic!("work error: {}", e),
            }
        }
        assert_eq!(emitted, 2);

        let first = match frame_rx.recv().unwrap() {
            ChannelMessage::Item(f) => f,
            ChannelMessage::EndOfStream => panic!("unexpected EOS"),
        };
        assert_eq!(
            first,
            frame(Command::WriteControlRegister { addr: 5 }, 3, 4)
        );
        let second = match frame_rx.recv().unwrap() {
            ChannelMessage::Item(f) => f,
            ChannelMessage::EndOfStream => panic!("unexpected EOS"),
        };
        assert_eq!(second, frame(Command::SystemReset, 7, 8));

        // Node closed its output on shutdown
        assert!(matches!(
            frame_rx.recv().unwrap(),
            ChannelMessage::EndOfStream
        ));
    }

    // ── End-to-end pipeline ──────────────────────────────────────

    struct ReplaySource {
        events: Vec<BusEvent>,
        pos: usize,
        done: bool,
    }

    impl ProcessNode for ReplaySource {
        fn name(&self) -> &str {
            "replay_source"
        }
        fn should_stop(&self) -> bool {
            self.done
        }
        fn num_inputs(&self) -> usize {
            0
        }
        fn num_outputs(&self) -> usize {
            1
        }
        fn output_schema(&self) -> Vec<crate::runtime::ports::PortSchema> {
            use crate::runtime::ports::{PortDirection, PortSchema};
            vec![PortSchema::new::<BusEvent>("events", 0, PortDirection::Output)]
        }
        fn work(&mut self, _inputs: &[InputPort], outputs: &[OutputPort]) -> WorkResult<usize> {
            let output = outputs[0]
                .get::<BusEvent>()
                .ok_or_else(|| WorkError::NodeError("Missing output channel".to_string()))?;
            if self.pos < self.events.len() {
                output.send(self.events[self.pos])?;
                self.pos += 1;
                Ok(1)
            } else {
                output.close();
                self.done = true;
                Ok(0)
            }
        }
    }

    struct CollectSink {
        frames: Arc<Mutex<Vec<CommandFrame>>>,
    }

    impl ProcessNode for CollectSink {
        fn name(&self) -> &str {
            "collect_sink"
        }
        fn num_inputs(&self) -> usize {
            1
        }
        fn num_outputs(&self) -> usize {
            0
        }
        fn input_schema(&self) -> Vec<crate::runtime::ports::PortSchema> {
            use crate::runtime::ports::{PortDirection, PortSchema};
            vec![PortSchema::new::<CommandFrame>(
                "commands",
                0,
                PortDirection::Input,
            )]
        }
        fn work(&mut self, inputs: &[InputPort], _outputs: &[OutputPort]) -> WorkResult<usize> {
            let mut buffer = VecDeque::new();
            let mut input = inputs[0]
                .get::<CommandFrame>(&mut buffer)
                .ok_or_else(|| WorkError::NodeError("Missing input channel".to_string()))?;
            let frame = input.recv()?;
            self.frames.lock().unwrap().push(frame);
            Ok(1)
        }
    }

    #[test]
    fn test_pipeline_end_to_end() {
        let events = vec![
            BusEvent::enable(0, 0),
            BusEvent::byte(0x40, 1, 2),  // WCR 0x0
            BusEvent::disable(3, 3),
            BusEvent::enable(4, 4),
            BusEvent::byte(0x60, 5, 6),  // WBM
            BusEvent::disable(7, 7),
        ];

        let collected = Arc::new(Mutex::new(Vec::new()));
        let sink = CollectSink {
            frames: Arc::clone(&collected),
        };

        let mut pipeline = Pipeline::new();
        pipeline
            .add_process(
                "source",
                ReplaySource {
                    events,
                    pos: 0,
                    done: false,
                },
            )
            .unwrap();
        pipeline
            .add_process("decoder", CommandDecoderNode::new())
            .unwrap();
        pipeline.add_process("sink", sink).unwrap();
        pipeline
            .connect("source", "events", "decoder", "events")
            .unwrap();
        pipeline
            .connect("decoder", "commands", "sink", "commands")
            .unwrap();

        let scheduler = pipeline.build().unwrap();
        scheduler.wait();

        let frames = collected.lock().unwrap();
        assert_eq!(
            *frames,
            vec![
                frame(Command::WriteControlRegister { addr: 0 }, 1, 2),
                frame(Command::WriteBufferMemory, 5, 6),
            ]
        );
    }
}
