//! CSV capture source
//!
//! Provides `CsvEventSource` - a runtime process node that reads a
//! logic-analyzer CSV export of byte-level bus events and streams them as
//! [`BusEvent`]s, one row per work() call.
//!
//! Expected file layout (header row required):
//!
//! ```text
//! kind,byte,start_time,end_time
//! enable,,1000,1000
//! byte,45,1020,1180
//! disable,,1200,1200
//! ```
//!
//! `kind` is `enable`, `disable`, or `byte`. The `byte` column is the
//! received byte in hex (bare or `0x`-prefixed) and must be empty for
//! boundary rows. Timestamps are the opaque integer values exported by the
//! analyzer; they are passed downstream unmodified.

use crate::nodes::decoders::BusEvent;
use crate::runtime::node::{InputPort, OutputPort, ProcessNode, WorkError, WorkResult};
use crate::{CaptureError, Result};
use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::path::Path;
use tracing::{debug, info};

const EXPECTED_HEADER: &str = "kind,byte,start_time,end_time";

/// Source node that streams bus events from a CSV capture export
///
/// 0 inputs, 1 output (`events`). Rows are parsed lazily; a malformed row
/// aborts the stream with a node error rather than being skipped, since a
/// corrupt capture is not something to decode around.
pub struct CsvEventSource {
    name: String,
    lines: Lines<BufReader<File>>,
    /// 1-based line number of the most recently read line
    line_no: usize,
    events_sent: u64,
    done: bool,
}

impl CsvEventSource {
    /// Open a capture file and validate its header row
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let mut lines = BufReader::new(file).lines();

        let header = lines
            .next()
            .transpose()?
            .ok_or_else(|| CaptureError::ParseHeader("empty capture file".to_string()))?;
        if header.trim().to_ascii_lowercase() != EXPECTED_HEADER {
            return Err(CaptureError::ParseHeader(format!(
                "expected '{}', got '{}'",
                EXPECTED_HEADER,
                header.trim()
            )));
        }

        info!("Opened capture {}", path.display());

        Ok(Self {
            name: "csv_source".to_string(),
            lines,
            line_no: 1,
            events_sent: 0,
            done: false,
        })
    }

    /// With custom name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Number of events streamed so far
    pub fn events_sent(&self) -> u64 {
        self.events_sent
    }
}

/// Parse one data row into a bus event.
///
/// `line_no` is used for error reporting only.
pub fn parse_event_row(line: &str, line_no: usize) -> Result<BusEvent> {
    let fields: Vec<&str> = line.split(',').collect();
    if fields.len() != 4 {
        return Err(CaptureError::ParseRow {
            line: line_no,
            reason: format!("expected 4 fields, got {}", fields.len()),
        });
    }

    let start_time: u64 = fields[2].trim().parse().map_err(|_| CaptureError::ParseRow {
        line: line_no,
        reason: format!("invalid start_time '{}'", fields[2].trim()),
    })?;
    let end_time: u64 = fields[3].trim().parse().map_err(|_| CaptureError::ParseRow {
        line: line_no,
        reason: format!("invalid end_time '{}'", fields[3].trim()),
    })?;

    let kind = fields[0].trim().to_ascii_lowercase();
    match kind.as_str() {
        "enable" => Ok(BusEvent::enable(start_time, end_time)),
        "disable" => Ok(BusEvent::disable(start_time, end_time)),
        "byte" => {
            let raw = fields[1].trim();
            let hex = raw.trim_start_matches("0x").trim_start_matches("0X");
            let value = u8::from_str_radix(hex, 16).map_err(|_| CaptureError::ParseRow {
                line: line_no,
                reason: format!("invalid byte value '{}'", raw),
            })?;
            Ok(BusEvent::byte(value, start_time, end_time))
        }
        _ => Err(CaptureError::UnknownEventKind {
            line: line_no,
            kind: fields[0].trim().to_string(),
        }),
    }
}

impl ProcessNode for CsvEventSource {
    fn name(&self) -> &str {
        &self.name
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
        let output = outputs
            .first()
            .and_then(|port| port.get::<BusEvent>())
            .ok_or_else(|| WorkError::NodeError("Missing output channel".to_string()))?;

        loop {
            let line = match self.lines.next() {
                Some(Ok(line)) => line,
                Some(Err(e)) => {
                    return Err(WorkError::NodeError(format!(
                        "read error at line {}: {}",
                        self.line_no + 1,
                        e
                    )));
                }
                None => {
                    debug!(
                        "[{}] Capture exhausted after {} events",
                        self.name, self.events_sent
                    );
                    output.close();
                    self.done = true;
                    return Ok(0);
                }
            };
            self.line_no += 1;

            if line.trim().is_empty() {
                continue;
            }

            let event = parse_event_row(&line, self.line_no)
                .map_err(|e| WorkError::NodeError(e.to_string()))?;
            output.send(event)?;
            self.events_sent += 1;
            return Ok(1);
        }
    }
}
