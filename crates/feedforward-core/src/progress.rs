use std::io::{self, Write};
use std::thread;
use std::time::Duration;

/// Per-character delay of the console typewriter effect.
pub const DEFAULT_CHAR_DELAY: Duration = Duration::from_millis(33);

/// Destination for human-readable status lines. Purely cosmetic: nothing in
/// the computation waits on it.
pub trait ProgressSink {
    fn emit(&mut self, message: &str) -> io::Result<()>;
}

/// Writes each message one character at a time, then a newline.
#[derive(Debug)]
pub struct PacedWriter<W> {
    out: W,
    delay: Duration,
}

impl<W: Write> PacedWriter<W> {
    pub fn new(out: W, delay: Duration) -> Self {
        Self { out, delay }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl PacedWriter<io::Stdout> {
    pub fn stdout(delay: Duration) -> Self {
        Self::new(io::stdout(), delay)
    }
}

impl<W: Write> ProgressSink for PacedWriter<W> {
    fn emit(&mut self, message: &str) -> io::Result<()> {
        let mut buf = [0u8; 4];
        for c in message.chars() {
            self.out.write_all(c.encode_utf8(&mut buf).as_bytes())?;
            if !self.delay.is_zero() {
                self.out.flush()?;
                thread::sleep(self.delay);
            }
        }
        writeln!(self.out)?;
        self.out.flush()
    }
}
