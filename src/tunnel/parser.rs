//! Line-oriented scanning of the tunnel binary's combined output.
//!
//! The binary has no structured output, so two literal rules are applied per
//! line: the first `udp://<non-space>` token becomes the public URL (later
//! lines overwrite earlier ones), and the first line starting with `Error:`
//! becomes the reported error.

use regex::Regex;
use std::borrow::Cow;
use std::io::{BufRead, ErrorKind};
use std::sync::LazyLock;
use tracing::{debug, warn};

use super::status::StatusStore;

pub const ERROR_PREFIX: &str = "Error:";

static PUBLIC_URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"udp://\S+").expect("public url pattern is valid"));

/// Returns the first `udp://` endpoint in `line`, if any.
pub fn extract_public_url(line: &str) -> Option<&str> {
    PUBLIC_URL.find(line).map(|m| m.as_str())
}

/// Strips the line terminator and decodes lossily; invalid UTF-8 becomes
/// U+FFFD instead of aborting the read loop.
pub fn decode_line(raw: &[u8]) -> Cow<'_, str> {
    let raw = raw.strip_suffix(b"\n").unwrap_or(raw);
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    String::from_utf8_lossy(raw)
}

pub struct OutputParser {
    store: StatusStore,
}

impl OutputParser {
    pub fn new(store: StatusStore) -> Self {
        Self { store }
    }

    /// Applies one decoded line to the store in a single update.
    pub fn handle_line(&self, line: &str) {
        if line.is_empty() {
            return;
        }
        debug!(target: "unvdash::tunnel::output", "{}", line);

        let url = extract_public_url(line);
        let is_error = line.starts_with(ERROR_PREFIX);

        self.store.update(|status, logs| {
            logs.push(line.to_string());

            if let Some(url) = url {
                status.public_url = Some(url.to_string());
                status.online = true;
            }

            if is_error && status.error.is_empty() {
                status.error = line.to_string();
            }
        });
    }

    /// Reads `reader` to exhaustion and returns the number of lines seen.
    ///
    /// A final line without a trailing newline is still processed. Read
    /// errors other than interruptions end the loop as if the stream closed.
    pub fn consume<R: BufRead>(&self, mut reader: R) -> usize {
        let mut buf = Vec::with_capacity(256);
        let mut count = 0;

        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf) {
                Ok(0) => break,
                Ok(_) => {
                    count += 1;
                    self.handle_line(&decode_line(&buf));
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    warn!("Reading tunnel output failed: {}", e);
                    break;
                }
            }
        }

        count
    }
}
