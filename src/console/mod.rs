//! Line-oriented terminal I/O used by the session loop.
//!
//! [`StdConsole`] reads stdin through tokio so a pending prompt can be
//! raced against Ctrl-C.  [`ScriptedConsole`] feeds canned input and
//! captures output for tests and non-interactive runs.

use std::collections::VecDeque;
use std::io::Write as _;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Stdin};
use tracing::debug;

#[async_trait]
pub trait Console: Send {
    /// Show `prompt` and read one line without its trailing newline.
    /// `Ok(None)` means end of input.
    async fn read_line(&mut self, prompt: &str) -> anyhow::Result<Option<String>>;

    /// Print `text` followed by a newline.
    fn say(&mut self, text: &str);
}

// ── StdConsole ───────────────────────────────────────────────

/// Console over stdin/stdout.  The reader is generic so tests can feed
/// bytes directly.
pub struct StdConsole<R = BufReader<Stdin>> {
    reader: R,
    // Bytes of a line whose read was cancelled part-way.
    pending: Vec<u8>,
}

impl Default for StdConsole {
    fn default() -> Self {
        Self::new()
    }
}

impl StdConsole {
    pub fn new() -> Self {
        Self::from_reader(BufReader::new(tokio::io::stdin()))
    }
}

impl<R: AsyncBufRead + Unpin + Send> StdConsole<R> {
    pub fn from_reader(reader: R) -> Self {
        Self {
            reader,
            pending: Vec::new(),
        }
    }
}

#[async_trait]
impl<R: AsyncBufRead + Unpin + Send> Console for StdConsole<R> {
    async fn read_line(&mut self, prompt: &str) -> anyhow::Result<Option<String>> {
        loop {
            {
                let mut out = std::io::stdout().lock();
                write!(out, "{prompt}")?;
                out.flush()?;
            }
            // `read_until` keeps partial input in `pending` if cancelled.
            let n = self.reader.read_until(b'\n', &mut self.pending).await?;
            if n == 0 && self.pending.is_empty() {
                return Ok(None);
            }

            let bytes = std::mem::take(&mut self.pending);
            match String::from_utf8(bytes) {
                Ok(line) => {
                    let line = line.strip_suffix('\n').unwrap_or(&line);
                    return Ok(Some(line.strip_suffix('\r').unwrap_or(line).to_string()));
                }
                Err(_) => {
                    debug!("discarded non UTF-8 input line");
                    self.say("Input was not valid UTF-8; please try again.");
                }
            }
        }
    }

    fn say(&mut self, text: &str) {
        println!("{text}");
    }
}

// ── ScriptedConsole ──────────────────────────────────────────

/// What a [`ScriptedConsole`] does once its input queue is empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WhenExhausted {
    /// Report end of input.
    Eof,
    /// Never return, as if the user stopped typing.
    Hang,
}

/// Console driven by a fixed list of input lines.
///
/// Everything written (prompts included) is appended to a shared buffer
/// reachable through [`ScriptedConsole::transcript`], which outlives the
/// console itself.
pub struct ScriptedConsole {
    input: VecDeque<String>,
    output: Arc<Mutex<String>>,
    when_exhausted: WhenExhausted,
}

impl ScriptedConsole {
    pub fn new<I, S>(lines: I, when_exhausted: WhenExhausted) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            input: lines.into_iter().map(Into::into).collect(),
            output: Arc::new(Mutex::new(String::new())),
            when_exhausted,
        }
    }

    /// Handle to everything printed so far.
    pub fn transcript(&self) -> Arc<Mutex<String>> {
        self.output.clone()
    }

    fn push(&self, text: &str) {
        if let Ok(mut out) = self.output.lock() {
            out.push_str(text);
        }
    }
}

#[async_trait]
impl Console for ScriptedConsole {
    async fn read_line(&mut self, prompt: &str) -> anyhow::Result<Option<String>> {
        self.push(prompt);
        match self.input.pop_front() {
            Some(line) => {
                self.push(&line);
                self.push("\n");
                Ok(Some(line))
            }
            None => match self.when_exhausted {
                WhenExhausted::Eof => Ok(None),
                WhenExhausted::Hang => std::future::pending().await,
            },
        }
    }

    fn say(&mut self, text: &str) {
        self.push(text);
        self.push("\n");
    }
}
