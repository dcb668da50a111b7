//! Renders RESP responses.
//!
//! A [Response](Response) collects a complete reply in a single buffer, so that it can be written
//! to the socket at once. Each reply consists of exactly one element (a status, a bulk string or
//! an error). Writing none or more than one is reported as [OutputError](OutputError).
//!
//! # Examples
//! ```
//! # use ringcache::response::Response;
//! let mut response = Response::new();
//! response.bulk("Hello").unwrap();
//!
//! assert_eq!(response.complete_string().unwrap(), "$5\r\nHello\r\n");
//! ```
use bytes::{BufMut, BytesMut};
use thiserror::Error;

const DEFAULT_CAPACITY: usize = 8192;

/// Signals that a response couldn't be rendered.
#[derive(Debug, Error)]
pub enum OutputError {
    /// None or more than one element was written.
    #[error("invalid response: {0}")]
    Shape(&'static str),

    /// The rendered data isn't valid UTF-8 (only reported by **complete_string**).
    #[error("the response contains non UTF-8 data")]
    Encoding(#[from] std::str::Utf8Error),
}

/// Represents the result of [Response::complete](Response::complete) and friends.
pub type OutputResult = Result<(), OutputError>;

/// Collects the RESP representation of a reply.
pub struct Response {
    buffer: BytesMut,
    written: bool,
}

impl Default for Response {
    fn default() -> Self {
        Response::new()
    }
}

impl Response {
    /// Creates a response which expects exactly one element.
    pub fn new() -> Self {
        Response {
            buffer: BytesMut::with_capacity(DEFAULT_CAPACITY),
            written: false,
        }
    }

    fn element(&mut self) -> OutputResult {
        if self.written {
            return Err(OutputError::Shape("the response is already complete"));
        }
        self.written = true;

        Ok(())
    }

    fn header(&mut self, prefix: u8, value: impl ToString) {
        let value = value.to_string();
        self.buffer.reserve(value.len() + 3);
        self.buffer.put_u8(prefix);
        self.buffer.put_slice(value.as_bytes());
        self.buffer.put_slice(b"\r\n");
    }

    /// Writes "+OK".
    pub fn ok(&mut self) -> OutputResult {
        self.simple("OK")
    }

    /// Writes a simple string.
    ///
    /// Line breaks would corrupt the protocol and are replaced by spaces.
    pub fn simple(&mut self, string: impl AsRef<str>) -> OutputResult {
        self.element()?;
        self.header(b'+', string.as_ref().replace(['\r', '\n'], " "));

        Ok(())
    }

    /// Writes a binary safe bulk string.
    pub fn bulk(&mut self, data: impl AsRef<[u8]>) -> OutputResult {
        self.element()?;
        let data = data.as_ref();
        self.header(b'$', data.len());
        self.buffer.reserve(data.len() + 2);
        self.buffer.put_slice(data);
        self.buffer.put_slice(b"\r\n");

        Ok(())
    }

    /// Writes an error.
    ///
    /// By convention the message starts with an upper case error code like "CLIENT:".
    pub fn error(&mut self, message: impl AsRef<str>) -> OutputResult {
        self.element()?;
        self.header(b'-', message.as_ref().replace(['\r', '\n'], " "));

        Ok(())
    }

    /// Returns the rendered response after verifying that an element was written.
    pub fn complete(self) -> Result<BytesMut, OutputError> {
        if self.written {
            Ok(self.buffer)
        } else {
            Err(OutputError::Shape("the response is empty"))
        }
    }

    /// Returns the rendered response as string (mostly useful for tests).
    pub fn complete_string(self) -> Result<String, OutputError> {
        let buffer = self.complete()?;
        Ok(std::str::from_utf8(&buffer[..])?.to_owned())
    }
}
