//! Line-oriented single-character command console.

/// Printed for any unrecognized command.
pub const HELP_TEXT: &str = "\
tempo commands:\r
  s  start logging\r
  x  stop logging\r
  r  reset host file transfer\r
";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleCommand {
    StartLogging,
    StopLogging,
    ResetTransfer,
    Help,
}

impl ConsoleCommand {
    pub fn from_byte(byte: u8) -> Self {
        match byte {
            b's' => Self::StartLogging,
            b'x' => Self::StopLogging,
            b'r' => Self::ResetTransfer,
            _ => Self::Help,
        }
    }
}

/// Turns a byte stream into commands: the first non-blank byte of each line
/// is the command, everything after it up to the line end is discarded.
#[derive(Debug)]
pub struct ConsoleReader {
    at_line_start: bool,
}

impl ConsoleReader {
    pub const fn new() -> Self {
        Self {
            at_line_start: true,
        }
    }

    pub fn push(&mut self, byte: u8) -> Option<ConsoleCommand> {
        match byte {
            b'\r' | b'\n' => {
                self.at_line_start = true;
                None
            }
            b' ' | b'\t' => None,
            _ if self.at_line_start => {
                self.at_line_start = false;
                Some(ConsoleCommand::from_byte(byte))
            }
            _ => None,
        }
    }
}

impl Default for ConsoleReader {
    fn default() -> Self {
        Self::new()
    }
}
