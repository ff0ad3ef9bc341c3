//! Console protocol: prompts, received messages, notices
//!
//! All terminal output funnels through one printer task so the receive
//! task and the send loop never interleave partial lines. Received
//! messages print above the prompt and the prompt is re-displayed.
//! Line reading re-prompts on empty input through a bounded loop with
//! an explicit attempt counter.

use std::io::Write;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::warn;

/// How many empty inputs are tolerated before a read gives up
pub const MAX_PROMPT_ATTEMPTS: u32 = 5;

// ----------------------------------------------------------------------------
// Console Output
// ----------------------------------------------------------------------------

/// One unit of terminal output
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleOutput {
    /// Printed as-is, no trailing newline
    Prompt(String),
    /// A non-self chat message, printed above a fresh prompt
    Received(String),
    /// A user-visible status line (reconnect notices and the like)
    Notice(String),
}

/// Cheap cloneable handle feeding the printer task
#[derive(Clone)]
pub struct Console {
    tx: mpsc::UnboundedSender<ConsoleOutput>,
}

impl Console {
    /// Console backed by a stdout printer task
    pub fn stdout() -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let printer = tokio::spawn(async move {
            let mut out = std::io::stdout();
            while let Some(item) = rx.recv().await {
                let result = match item {
                    ConsoleOutput::Prompt(text) => {
                        write!(out, "{}", text).and_then(|_| out.flush())
                    }
                    ConsoleOutput::Received(line) => {
                        write!(out, "\nReceived: {}\nEnter message: ", line)
                            .and_then(|_| out.flush())
                    }
                    ConsoleOutput::Notice(text) => {
                        writeln!(out, "{}", text).and_then(|_| out.flush())
                    }
                };
                if result.is_err() {
                    break;
                }
            }
        });
        (Self { tx }, printer)
    }

    /// Console writing into a channel instead of stdout (for tests)
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ConsoleOutput>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn prompt(&self, text: &str) {
        let _ = self.tx.send(ConsoleOutput::Prompt(text.to_string()));
    }

    pub fn received(&self, line: String) {
        let _ = self.tx.send(ConsoleOutput::Received(line));
    }

    pub fn notice<T: Into<String>>(&self, text: T) {
        let _ = self.tx.send(ConsoleOutput::Notice(text.into()));
    }
}

// ----------------------------------------------------------------------------
// Line Reader
// ----------------------------------------------------------------------------

/// Buffered line reader with bounded re-prompting on empty input
pub struct LineReader<R = BufReader<Stdin>> {
    lines: Lines<R>,
}

impl LineReader {
    pub fn stdin() -> Self {
        Self {
            lines: BufReader::new(tokio::io::stdin()).lines(),
        }
    }
}

impl<R: AsyncBufRead + Unpin> LineReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
        }
    }

    /// Prompt for and read one non-empty line
    ///
    /// Empty input re-prompts up to [`MAX_PROMPT_ATTEMPTS`] times; the
    /// attempt counter is explicit rather than recursive so exhausted
    /// patience cannot grow the stack. `None` means the input stream
    /// ended (or gave up), which callers treat as a graceful shutdown.
    pub async fn read_value(
        &mut self,
        console: &Console,
        prompt: &str,
    ) -> std::io::Result<Option<String>> {
        console.prompt(prompt);
        for attempt in 1..=MAX_PROMPT_ATTEMPTS {
            match self.lines.next_line().await? {
                None => return Ok(None),
                Some(line) => {
                    let trimmed = line.trim();
                    if !trimmed.is_empty() {
                        return Ok(Some(trimmed.to_string()));
                    }
                    if attempt < MAX_PROMPT_ATTEMPTS {
                        console.prompt("Error: Invalid value. Type something: ");
                    }
                }
            }
        }
        warn!(
            "no valid input after {} attempts, treating as end of input",
            MAX_PROMPT_ATTEMPTS
        );
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn skips_empty_lines_until_a_value_arrives() {
        let (console, mut outputs) = Console::channel();
        let mut reader = LineReader::new(BufReader::new(&b"\n   \nhello\n"[..]));

        let value = reader.read_value(&console, "Enter message: ").await.unwrap();
        assert_eq!(value.as_deref(), Some("hello"));

        assert_eq!(
            outputs.recv().await.unwrap(),
            ConsoleOutput::Prompt("Enter message: ".to_string())
        );
        // Two empty lines, two error re-prompts.
        assert_eq!(
            outputs.recv().await.unwrap(),
            ConsoleOutput::Prompt("Error: Invalid value. Type something: ".to_string())
        );
        assert_eq!(
            outputs.recv().await.unwrap(),
            ConsoleOutput::Prompt("Error: Invalid value. Type something: ".to_string())
        );
    }

    #[tokio::test]
    async fn gives_up_after_bounded_attempts() {
        let (console, _outputs) = Console::channel();
        let mut reader = LineReader::new(BufReader::new(&b"\n\n\n\n\n\n\n\n"[..]));

        let value = reader.read_value(&console, "Enter message: ").await.unwrap();
        assert_eq!(value, None);
    }

    #[tokio::test]
    async fn end_of_input_reads_as_none() {
        let (console, _outputs) = Console::channel();
        let mut reader = LineReader::new(BufReader::new(&b""[..]));

        let value = reader.read_value(&console, "Enter message: ").await.unwrap();
        assert_eq!(value, None);
    }
}
