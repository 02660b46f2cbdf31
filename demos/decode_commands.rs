//! Example: decode an SPI command capture
//!
//! Reads a logic-analyzer CSV export of byte-level bus events, decodes the
//! command stream, and prints each decoded frame. Optionally writes the
//! frames to a CSV file.
//!
//! Capture format (see `CsvEventSource`):
//!   kind,byte,start_time,end_time
//!   enable,,1000,1000
//!   byte,45,1020,1180
//!   disable,,1200,1200
//!
//! Usage:
//!   cargo run --release --example decode_commands -- \
//!       --file capture.csv \
//!       -n 100 \
//!       --csv-output commands.csv \
//!       --label scanner --radix hex

use clap::Parser;
use spicmd::{
    AnalyzerSettings, ArgumentRadix, CommandDecoderNode, CommandFrame, CsvEventSource, InputPort,
    OutputPort, Pipeline, PortDirection, PortSchema, ProcessNode, WorkError, WorkResult,
};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the capture CSV file
    #[arg(short, long)]
    file: PathBuf,

    /// Number of command frames to print (0 = unlimited)
    #[arg(short, long, default_value = "0")]
    n: usize,

    /// CSV output file path (optional)
    #[arg(long)]
    csv_output: Option<PathBuf>,

    /// Label prefixed to decoded-frame log lines
    #[arg(long, default_value = "spicmd")]
    label: String,

    /// Log a progress line every N frames (0 = off, max 100)
    #[arg(long, default_value = "0")]
    progress_interval: u64,

    /// Radix for the address column in CSV output (hex or decimal)
    #[arg(long, default_value = "hex")]
    radix: ArgumentRadix,
}

/// Sink that prints decoded command frames
struct CommandPrinter {
    settings: AnalyzerSettings,
    count: usize,
    max_frames: usize,
}

impl CommandPrinter {
    fn new(settings: AnalyzerSettings, max_frames: usize) -> Self {
        Self {
            settings,
            count: 0,
            max_frames,
        }
    }
}

impl ProcessNode for CommandPrinter {
    fn name(&self) -> &str {
        "command_printer"
    }

    fn should_stop(&self) -> bool {
        self.max_frames > 0 && self.count >= self.max_frames
    }

    fn num_inputs(&self) -> usize {
        1
    }

    fn num_outputs(&self) -> usize {
        0
    }

    fn input_schema(&self) -> Vec<PortSchema> {
        vec![PortSchema::new::<CommandFrame>(
            "commands",
            0,
            PortDirection::Input,
        )]
    }

    fn work(&mut self, inputs: &[InputPort], _outputs: &[OutputPort]) -> WorkResult<usize> {
        let mut input_buffer = std::collections::VecDeque::new();
        let mut input = inputs
            .first()
            .and_then(|port| port.get::<CommandFrame>(&mut input_buffer))
            .ok_or_else(|| WorkError::NodeError("Missing input channel".to_string()))?;

        let frame = input.recv()?;
        self.count += 1;

        info!(
            "[{}] #{}: {} at [{}..{}]",
            self.settings.label, self.count, frame.command, frame.start_time, frame.end_time
        );

        let interval = self.settings.progress_interval;
        if interval > 0 && self.count % interval as usize == 0 {
            info!("[{}] Progress: {} frames decoded", self.settings.label, self.count);
        }

        Ok(1)
    }
}

/// Sink that writes decoded command frames to a CSV file
struct CsvFrameWriter {
    writer: BufWriter<File>,
    radix: ArgumentRadix,
    count: usize,
}

impl CsvFrameWriter {
    fn create(path: &PathBuf, radix: ArgumentRadix) -> Result<Self, std::io::Error> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        writeln!(writer, "command,arg,start_time,end_time")?;
        Ok(Self {
            writer,
            radix,
            count: 0,
        })
    }

    fn write_frame(&mut self, frame: &CommandFrame) -> Result<(), std::io::Error> {
        let arg = frame
            .command
            .addr()
            .map(|addr| self.radix.format(addr))
            .unwrap_or_default();
        writeln!(
            self.writer,
            "{},{},{},{}",
            frame.command.mnemonic(),
            arg,
            frame.start_time,
            frame.end_time
        )?;
        self.count += 1;
        Ok(())
    }
}

impl Drop for CsvFrameWriter {
    fn drop(&mut self) {
        if let Err(e) = self.writer.flush() {
            eprintln!("Error flushing CSV output on shutdown: {}", e);
        }
    }
}

impl ProcessNode for CsvFrameWriter {
    fn name(&self) -> &str {
        "csv_frame_writer"
    }

    fn num_inputs(&self) -> usize {
        1
    }

    fn num_outputs(&self) -> usize {
        0
    }

    fn input_schema(&self) -> Vec<PortSchema> {
        vec![PortSchema::new::<CommandFrame>(
            "commands",
            0,
            PortDirection::Input,
        )]
    }

    fn work(&mut self, inputs: &[InputPort], _outputs: &[OutputPort]) -> WorkResult<usize> {
        let mut input_buffer = std::collections::VecDeque::new();
        let mut input = inputs
            .first()
            .and_then(|port| port.get::<CommandFrame>(&mut input_buffer))
            .ok_or_else(|| WorkError::NodeError("Missing input channel".to_string()))?;

        let frame = match input.recv() {
            Ok(frame) => frame,
            Err(WorkError::Shutdown) => {
                info!("CSV output complete: {} frames", self.count);
                self.writer
                    .flush()
                    .map_err(|e| WorkError::NodeError(format!("Failed to flush CSV: {}", e)))?;
                return Err(WorkError::Shutdown);
            }
            Err(e) => return Err(e),
        };

        self.write_frame(&frame)
            .map_err(|e| WorkError::NodeError(format!("Failed to write frame: {}", e)))?;
        Ok(1)
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let settings = AnalyzerSettings::new(args.label.as_str(), args.progress_interval, args.radix);
    settings.log();

    info!("=== SPI Command Decode ===");
    info!("File: {}", args.file.display());
    if let Some(path) = &args.csv_output {
        info!("CSV output: {}", path.display());
    }

    let mut pipeline = Pipeline::new();

    let source = CsvEventSource::new(&args.file)?;
    pipeline.add_process("source", source)?;
    pipeline.add_process("decoder", CommandDecoderNode::new())?;
    pipeline.add_process("printer", CommandPrinter::new(settings.clone(), args.n))?;

    pipeline.connect("source", "events", "decoder", "events")?;
    // Decoded commands are low bandwidth - small buffers are plenty
    pipeline.connect_with_buffer("decoder", "commands", "printer", "commands", 1000)?;

    if let Some(path) = &args.csv_output {
        let writer = CsvFrameWriter::create(path, settings.radix)
            .map_err(|e| format!("Failed to create {}: {}", path.display(), e))?;
        pipeline.add_process("csv_writer", writer)?;
        pipeline.connect_with_buffer("decoder", "commands", "csv_writer", "commands", 1000)?;
    }

    info!("Building pipeline...");
    let scheduler = pipeline.build()?;

    info!("Running...");
    scheduler.wait();

    info!("Done!");

    Ok(())
}
