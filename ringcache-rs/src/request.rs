//! Parses RESP requests as sent by peers and Redis clients.
//!
//! A request is an array of bulk strings. The first element is the command, all others are its
//! parameters:
//! ```text
//! *3\r\n$8\r\nPEER.GET\r\n$6\r\nscores\r\n$3\r\nTom\r\n
//! ```
//! The parser doesn't copy any data. It only records the ranges of the command and its parameters
//! within the buffer. As the connection buffer might contain a partial request, parsing yields
//! **Ok(None)** until the request is complete. Malformed input results in an **Err**.
use std::ops::Range;

use anyhow::{anyhow, Context, Result};
use bytes::{BufMut, Bytes, BytesMut};

const CRLF: &[u8] = b"\r\n";

/// Limits the number of elements a request may announce.
const MAX_ELEMENTS: usize = 1024;

/// Limits the length a single bulk string may announce.
const MAX_BULK_LENGTH: usize = 512 * 1024 * 1024;

/// Represents a parsed request.
///
/// # Examples
/// ```
/// # use ringcache::request::Request;
/// # use bytes::BytesMut;
/// let data = BytesMut::from("*3\r\n$8\r\nPEER.GET\r\n$6\r\nscores\r\n$3\r\nTom\r\n");
/// let request = Request::parse(&data).unwrap().unwrap();
///
/// assert_eq!(request.command(), "PEER.GET");
/// assert_eq!(request.parameter_count(), 2);
/// assert_eq!(request.str_parameter(1).unwrap(), "Tom");
/// assert_eq!(request.len(), data.len());
///
/// // A partial request is simply not ready yet...
/// assert_eq!(Request::parse(&BytesMut::from("*3\r\n$8\r\nPEER")).unwrap().is_none(), true);
/// ```
pub struct Request {
    len: usize,
    data: Bytes,
    command: Range<usize>,
    parameters: Vec<Range<usize>>,
}

/// Walks through a buffer which might contain a (partial) request.
struct Cursor<'a> {
    data: &'a [u8],
    offset: usize,
}

impl Cursor<'_> {
    /// Reads a number terminated by CRLF right after the given prefix character.
    fn read_length(&mut self, prefix: u8, what: &str) -> Result<Option<usize>> {
        let start = self.offset;
        match self.data.get(start) {
            None => return Ok(None),
            Some(byte) if *byte != prefix => {
                return Err(anyhow!(
                    "Expected {} ('{}') at position {}",
                    what,
                    prefix as char,
                    start
                ))
            }
            _ => (),
        }

        let mut length: usize = 0;
        let mut index = start + 1;
        loop {
            match self.data.get(index) {
                None => return Ok(None),
                Some(b'\r') if index > start + 1 => break,
                Some(digit) if digit.is_ascii_digit() => {
                    length = length
                        .checked_mul(10)
                        .and_then(|length| length.checked_add((digit - b'0') as usize))
                        .ok_or_else(|| anyhow!("Length at position {} is too large", start))?;
                }
                Some(_) => return Err(anyhow!("Malformed length at position {}", index)),
            }
            index += 1;
        }

        match self.data.get(index + 1) {
            None => Ok(None),
            Some(b'\n') => {
                self.offset = index + 2;
                Ok(Some(length))
            }
            Some(_) => Err(anyhow!("Expected a line feed at position {}", index + 1)),
        }
    }

    fn read_bulk_string(&mut self) -> Result<Option<Range<usize>>> {
        let length = match self.read_length(b'$', "a bulk string")? {
            Some(length) => length,
            None => return Ok(None),
        };

        if length > MAX_BULK_LENGTH {
            return Err(anyhow!(
                "Bulk string at position {} exceeds the maximum length",
                self.offset
            ));
        }

        let end = self
            .offset
            .checked_add(length)
            .ok_or_else(|| anyhow!("Bulk string at position {} is too large", self.offset))?;
        let range = self.offset..end;
        if self.data.len() < range.end + CRLF.len() {
            return Ok(None);
        }
        if &self.data[range.end..range.end + CRLF.len()] != CRLF {
            return Err(anyhow!(
                "Bulk string at position {} isn't terminated by CRLF",
                range.start
            ));
        }

        self.offset = range.end + CRLF.len();
        Ok(Some(range))
    }
}

impl Request {
    /// Tries to parse a request from the beginning of the given buffer.
    pub fn parse(data: &BytesMut) -> Result<Option<Request>> {
        if data.is_empty() {
            return Ok(None);
        }

        let mut cursor = Cursor {
            data: &data[..],
            offset: 0,
        };

        let count = match cursor.read_length(b'*', "an array")? {
            Some(0) => return Err(anyhow!("A request requires at least a command")),
            Some(count) if count > MAX_ELEMENTS => {
                return Err(anyhow!("A request must not contain more than {} elements", MAX_ELEMENTS))
            }
            Some(count) => count,
            None => return Ok(None),
        };

        let mut ranges = Vec::with_capacity(count);
        for _ in 0..count {
            match cursor.read_bulk_string()? {
                Some(range) => ranges.push(range),
                None => return Ok(None),
            }
        }

        let command = ranges.remove(0);
        let _ = std::str::from_utf8(&data[command.clone()])
            .context("The command name must be a valid UTF-8 string")?;

        Ok(Some(Request {
            len: cursor.offset,
            data: data.clone().freeze(),
            command,
            parameters: ranges,
        }))
    }

    /// Encodes the given command and parameters as RESP array of bulk strings.
    pub fn encode(command: &str, parameters: &[&[u8]]) -> BytesMut {
        let size = parameters
            .iter()
            .map(|parameter| parameter.len() + 16)
            .sum::<usize>()
            + command.len()
            + 32;

        let mut buffer = BytesMut::with_capacity(size);
        put_header(&mut buffer, b'*', parameters.len() + 1);
        put_bulk(&mut buffer, command.as_bytes());
        for parameter in parameters {
            put_bulk(&mut buffer, parameter);
        }

        buffer
    }

    /// Returns the command name.
    pub fn command(&self) -> &str {
        std::str::from_utf8(&self.data[self.command.clone()]).unwrap_or_default()
    }

    /// Returns the number of parameters (excluding the command itself).
    pub fn parameter_count(&self) -> usize {
        self.parameters.len()
    }

    /// Returns the parameter at the given index.
    pub fn parameter(&self, index: usize) -> Result<Bytes> {
        self.range(index).map(|range| self.data.slice(range))
    }

    /// Returns the parameter at the given index as string.
    pub fn str_parameter(&self, index: usize) -> Result<&str> {
        let range = self.range(index)?;
        std::str::from_utf8(&self.data[range])
            .with_context(|| format!("Parameter {} isn't a valid UTF-8 string", index))
    }

    fn range(&self, index: usize) -> Result<Range<usize>> {
        self.parameters.get(index).cloned().ok_or_else(|| {
            anyhow!(
                "Missing parameter {} (only {} are present)",
                index,
                self.parameters.len()
            )
        })
    }

    /// Returns the number of bytes occupied by this request within the input buffer.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Determines if the request is empty, which is never the case as a command is required.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

fn put_header(buffer: &mut BytesMut, prefix: u8, length: usize) {
    buffer.put_u8(prefix);
    buffer.put_slice(length.to_string().as_bytes());
    buffer.put_slice(CRLF);
}

fn put_bulk(buffer: &mut BytesMut, data: &[u8]) {
    put_header(buffer, b'$', data.len());
    buffer.put_slice(data);
    buffer.put_slice(CRLF);
}
