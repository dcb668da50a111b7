//! Provides the [PeerGetter](crate::peers::PeerGetter) which talks to other nodes via RESP.
//!
//! A [RespPeer](RespPeer) sends **PEER.GET group key** to the remote node and expects either a
//! bulk string (the value) or an error in return. It keeps a single connection open and re-uses
//! it for all requests. Requests to the same peer are therefore serialized. Once a transport
//! error or a timeout occurs, the connection is dropped and re-established by the next request.
use std::time::Duration;

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;

use crate::peers::PeerGetter;
use crate::request::Request;

const DEFAULT_BUFFER_SIZE: usize = 8192;

/// Represents a reply sent by a RESP server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// A simple string like "+OK".
    Simple(String),
    /// An error like "-SERVER: ...".
    Error(String),
    /// An integer like ":42".
    Integer(i64),
    /// A binary safe bulk string.
    Bulk(Vec<u8>),
    /// The null bulk string "$-1".
    Null,
}

impl Reply {
    /// Tries to parse a reply from the beginning of the given buffer.
    ///
    /// Returns the reply along with the number of bytes it occupies or **None** if the reply is
    /// still incomplete. Arrays aren't supported as peers never send them.
    pub fn parse(data: &[u8]) -> anyhow::Result<Option<(Reply, usize)>> {
        let line_end = match data.windows(2).position(|window| window == b"\r\n") {
            Some(line_end) => line_end,
            None => return Ok(None),
        };
        if line_end == 0 {
            return Err(anyhow!("Received an empty reply line"));
        }

        let line = std::str::from_utf8(&data[1..line_end]).context("Malformed reply line")?;
        let header_len = line_end + 2;
        let reply = match data[0] {
            b'+' => Reply::Simple(line.to_owned()),
            b'-' => Reply::Error(line.to_owned()),
            b':' => Reply::Integer(line.parse().context("Malformed integer reply")?),
            b'$' if line == "-1" => Reply::Null,
            b'$' => {
                let length: usize = line.parse().context("Malformed bulk length")?;
                let end = header_len
                    .checked_add(length)
                    .filter(|end| end.checked_add(2).is_some())
                    .ok_or_else(|| anyhow!("Bulk length {} is too large", length))?;
                if data.len() < end + 2 {
                    return Ok(None);
                }
                if &data[end..end + 2] != b"\r\n" {
                    return Err(anyhow!("Bulk reply isn't terminated by CRLF"));
                }

                return Ok(Some((Reply::Bulk(data[header_len..end].to_vec()), end + 2)));
            }
            other => return Err(anyhow!("Unsupported reply type: '{}'", other as char)),
        };

        Ok(Some((reply, header_len)))
    }
}

/// Fetches values from a remote node.
///
/// # Examples
/// ```no_run
/// # use ringcache::client::RespPeer;
/// # use ringcache::peers::PeerGetter;
/// # use std::time::Duration;
/// # #[tokio::main]
/// # async fn main() {
/// let peer = RespPeer::new("10.0.0.2:2410", Duration::from_secs(5));
/// let value = peer.get("scores", "Tom").await.unwrap();
/// # }
/// ```
pub struct RespPeer {
    address: String,
    timeout: Duration,
    connection: Mutex<Option<TcpStream>>,
}

impl RespPeer {
    /// Creates a getter for the node at the given address.
    ///
    /// No connection is established until the first request is sent.
    pub fn new(address: impl Into<String>, timeout: Duration) -> Self {
        RespPeer {
            address: address.into(),
            timeout,
            connection: Mutex::new(None),
        }
    }

    /// Returns the address of the remote node.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Sends the given command and awaits its reply.
    ///
    /// Transport errors and timeouts close the connection. Error replies leave it intact.
    pub async fn execute(&self, command: &str, parameters: &[&[u8]]) -> anyhow::Result<Reply> {
        let request = Request::encode(command, parameters);
        let mut connection = self.connection.lock().await;

        let result = match tokio::time::timeout(
            self.timeout,
            self.exchange(&mut connection, &request),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(anyhow!(
                "Peer {} didn't respond within {}",
                self.address,
                crate::fmt::format_duration(self.timeout)
            )),
        };

        if result.is_err() {
            *connection = None;
        }

        result
    }

    async fn exchange(
        &self,
        connection: &mut Option<TcpStream>,
        request: &[u8],
    ) -> anyhow::Result<Reply> {
        if connection.is_none() {
            let stream = TcpStream::connect(&self.address)
                .await
                .with_context(|| format!("Cannot connect to peer {}", self.address))?;
            let _ = stream.set_nodelay(true);
            log::debug!("Connected to peer {}.", self.address);
            *connection = Some(stream);
        }

        let stream = connection
            .as_mut()
            .ok_or_else(|| anyhow!("No connection to peer {}", self.address))?;
        stream.write_all(request).await?;
        stream.flush().await?;

        let mut buffer = BytesMut::with_capacity(DEFAULT_BUFFER_SIZE);
        loop {
            if let Some((reply, _)) = Reply::parse(&buffer)? {
                return Ok(reply);
            }

            if stream.read_buf(&mut buffer).await? == 0 {
                return Err(anyhow!("Peer {} closed the connection", self.address));
            }
        }
    }
}

#[async_trait]
impl PeerGetter for RespPeer {
    async fn get(&self, group: &str, key: &str) -> anyhow::Result<Vec<u8>> {
        match self
            .execute("PEER.GET", &[group.as_bytes(), key.as_bytes()])
            .await?
        {
            Reply::Bulk(data) => Ok(data),
            Reply::Error(message) => Err(anyhow!("Peer {} reported: {}", self.address, message)),
            other => Err(anyhow!(
                "Peer {} sent an unexpected reply: {:?}",
                self.address,
                other
            )),
        }
    }
}
