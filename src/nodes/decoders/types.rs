//! Common decoder types and enums

use std::fmt;
use std::str::FromStr;

/// Byte-level bus event delivered by an upstream SPI analyzer
///
/// Events arrive in chronological order. Timestamps are opaque,
/// monotonically non-decreasing values; the decoder relays them to output
/// frames unmodified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusEvent {
    /// What happened on the bus
    pub kind: EventKind,
    /// Timestamp at which the event started
    pub start_time: u64,
    /// Timestamp at which the event ended
    pub end_time: u64,
}

/// The three event kinds an upstream byte analyzer produces
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// Chip enable asserted - a command transaction begins
    Enable,
    /// Chip enable deasserted - the transaction ends
    Disable,
    /// One byte received on the data line during a transfer
    Byte(u8),
}

impl BusEvent {
    /// An enable-boundary event
    pub fn enable(start_time: u64, end_time: u64) -> Self {
        Self {
            kind: EventKind::Enable,
            start_time,
            end_time,
        }
    }

    /// A disable-boundary event
    pub fn disable(start_time: u64, end_time: u64) -> Self {
        Self {
            kind: EventKind::Disable,
            start_time,
            end_time,
        }
    }

    /// A byte-result event
    pub fn byte(value: u8, start_time: u64, end_time: u64) -> Self {
        Self {
            kind: EventKind::Byte(value),
            start_time,
            end_time,
        }
    }
}

impl fmt::Display for BusEvent {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.kind {
            EventKind::Enable => write!(f, "Enable[t={}]", self.start_time),
            EventKind::Disable => write!(f, "Disable[t={}]", self.start_time),
            EventKind::Byte(b) => write!(f, "Byte[0x{:02x}, t={}]", b, self.start_time),
        }
    }
}

/// A decoded peripheral command
///
/// The instruction set packs a 3-bit opcode in the high bits of each
/// command byte and a 5-bit register address in the low bits. Buffer-memory
/// and reset commands ignore the address field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Read a control register (opcode 000)
    ReadControlRegister { addr: u8 },
    /// Read from buffer memory (opcode 001)
    ReadBufferMemory,
    /// Write a control register (opcode 010)
    WriteControlRegister { addr: u8 },
    /// Write to buffer memory (opcode 011)
    WriteBufferMemory,
    /// Set bits in a control register (opcode 100)
    BitFieldSet { addr: u8 },
    /// Clear bits in a control register (opcode 101)
    BitFieldClear { addr: u8 },
    /// Soft reset of the peripheral (opcode 111)
    SystemReset,
}

impl Command {
    /// Short mnemonic used in display templates, CSV output, and log lines
    pub fn mnemonic(&self) -> &'static str {
        match self {
            Command::ReadControlRegister { .. } => "RCR",
            Command::ReadBufferMemory => "RBM",
            Command::WriteControlRegister { .. } => "WCR",
            Command::WriteBufferMemory => "WBM",
            Command::BitFieldSet { .. } => "BFS",
            Command::BitFieldClear { .. } => "BFC",
            Command::SystemReset => "SRC",
        }
    }

    /// Register address argument, for the commands that carry one
    pub fn addr(&self) -> Option<u8> {
        match self {
            Command::ReadControlRegister { addr }
            | Command::WriteControlRegister { addr }
            | Command::BitFieldSet { addr }
            | Command::BitFieldClear { addr } => Some(*addr),
            Command::ReadBufferMemory | Command::WriteBufferMemory | Command::SystemReset => None,
        }
    }
}

impl fmt::Display for Command {
    /// Fixed per-variant template: mnemonic, then the address in lowercase
    /// hex where one is carried (`RCR 0x5`, `RBM`, `SRC`).
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.addr() {
            Some(addr) => write!(f, "{} {:#x}", self.mnemonic(), addr),
            None => write!(f, "{}", self.mnemonic()),
        }
    }
}

/// A decoded command frame
///
/// Carries the command plus the timestamp span of the byte it was decoded
/// from, passed through from the triggering [`BusEvent`] without change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandFrame {
    pub command: Command,
    pub start_time: u64,
    pub end_time: u64,
}

impl fmt::Display for CommandFrame {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} [{}..{}]",
            self.command, self.start_time, self.end_time
        )
    }
}

/// How a register address is rendered in text output
///
/// Cosmetic only - never affects decode semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgumentRadix {
    /// Lowercase hexadecimal with `0x` prefix (default)
    Hex,
    /// Plain decimal
    Decimal,
}

impl ArgumentRadix {
    /// Render an address argument in this radix
    pub fn format(&self, addr: u8) -> String {
        match self {
            ArgumentRadix::Hex => format!("{:#x}", addr),
            ArgumentRadix::Decimal => format!("{}", addr),
        }
    }
}

impl FromStr for ArgumentRadix {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "hex" => Ok(ArgumentRadix::Hex),
            "decimal" | "dec" => Ok(ArgumentRadix::Decimal),
            other => Err(format!("unknown radix '{}' (expected hex or decimal)", other)),
        }
    }
}

/// User-facing analyzer customization
///
/// None of these affect what gets decoded - they control labels and output
/// rendering in the host layer only. `progress_interval` is clamped to
/// 0..=100; 0 disables progress logging.
#[derive(Debug, Clone)]
pub struct AnalyzerSettings {
    /// Free-text label prefixed to demo log lines
    pub label: String,
    /// Log a progress line every N decoded frames (0 = off, max 100)
    pub progress_interval: u64,
    /// Radix used for the address column in text output
    pub radix: ArgumentRadix,
}

impl AnalyzerSettings {
    pub const MAX_PROGRESS_INTERVAL: u64 = 100;

    pub fn new(label: impl Into<String>, progress_interval: u64, radix: ArgumentRadix) -> Self {
        Self {
            label: label.into(),
            progress_interval: progress_interval.min(Self::MAX_PROGRESS_INTERVAL),
            radix,
        }
    }

    /// Log the active settings once at startup.
    ///
    /// Called explicitly by the host entry point rather than from any
    /// constructor.
    pub fn log(&self) {
        tracing::info!(
            "Settings: label='{}', progress_interval={}, radix={:?}",
            self.label,
            self.progress_interval,
            self.radix
        );
    }
}

impl Default for AnalyzerSettings {
    fn default() -> Self {
        Self {
            label: "spicmd".to_string(),
            progress_interval: 0,
            radix: ArgumentRadix::Hex,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_templates() {
        assert_eq!(
            Command::ReadControlRegister { addr: 0x05 }.to_string(),
            "RCR 0x5"
        );
        assert_eq!(Command::ReadBufferMemory.to_string(), "RBM");
        assert_eq!(
            Command::WriteControlRegister { addr: 0x00 }.to_string(),
            "WCR 0x0"
        );
        assert_eq!(Command::WriteBufferMemory.to_string(), "WBM");
        assert_eq!(Command::BitFieldSet { addr: 0x1F }.to_string(), "BFS 0x1f");
        assert_eq!(Command::BitFieldClear { addr: 0x02 }.to_string(), "BFC 0x2");
        assert_eq!(Command::SystemReset.to_string(), "SRC");
    }

    #[test]
    fn test_addr_carried_only_by_register_commands() {
        assert_eq!(
            Command::ReadControlRegister { addr: 3 }.addr(),
            Some(3)
        );
        assert_eq!(Command::BitFieldClear { addr: 31 }.addr(), Some(31));
        assert_eq!(Command::ReadBufferMemory.addr(), None);
        assert_eq!(Command::WriteBufferMemory.addr(), None);
        assert_eq!(Command::SystemReset.addr(), None);
    }

    #[test]
    fn test_radix_formatting() {
        assert_eq!(ArgumentRadix::Hex.format(0x1F), "0x1f");
        assert_eq!(ArgumentRadix::Decimal.format(0x1F), "31");
    }

    #[test]
    fn test_radix_from_str() {
        assert_eq!("hex".parse::<ArgumentRadix>().unwrap(), ArgumentRadix::Hex);
        assert_eq!(
            "Decimal".parse::<ArgumentRadix>().unwrap(),
            ArgumentRadix::Decimal
        );
        assert!("octal".parse::<ArgumentRadix>().is_err());
    }

    #[test]
    fn test_settings_clamp_progress_interval() {
        let settings = AnalyzerSettings::new("scan", 5000, ArgumentRadix::Hex);
        assert_eq!(
            settings.progress_interval,
            AnalyzerSettings::MAX_PROGRESS_INTERVAL
        );
    }
}
