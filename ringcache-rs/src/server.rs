//! Provides the RESP server which answers clients and other peers.
//!
//! The server binds to **server.host** and **server.port** as given in the config (0.0.0.0:2410
//! by default) and starts one task per connection. If the address changes in the config, the
//! socket is re-opened on the new address without a restart.
//!
//! Each connection uses a single input buffer to read and parse requests. Responses are rendered
//! into a single buffer as well, so that each response is written with as few syscalls as
//! possible.
//!
//! # Commands
//! * **PING [message]**: replies with "PONG" or the given message.
//! * **QUIT**: closes the connection.
//! * **CACHE.GET group key**: returns the value of the key. If another peer owns the key, it is
//!   fetched from there.
//! * **PEER.GET group key**: returns the value of the key as known to this node. This is what
//!   peers send to each other, therefore this never contacts another peer.
//! * **CACHE.STATS [group]**: reports the statistics of all or the given group.
//! * **CACHE.PEERS**: lists the members of the cluster.
//!
//! Errors caused by the caller (unknown group, empty key, wrong number of parameters) start with
//! **CLIENT:**, errors of the data source or of a peer with **SERVER:**.
use std::fmt::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use bytes::{BufMut, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use crate::error::CacheError;
use crate::group::Group;
use crate::node::Node;
use crate::request::Request;
use crate::response::{OutputError, Response};
use crate::spawn;

/// Contains the port used if none is configured.
pub const DEFAULT_PORT: u16 = 2410;

const READ_WAIT_TIMEOUT: Duration = Duration::from_millis(500);
const CONNECT_WAIT_TIMEOUT: Duration = Duration::from_millis(500);
const DEFAULT_BUFFER_SIZE: usize = 8192;

/// Separates the sections of textual reports.
pub const SEPARATOR: &str =
    "-------------------------------------------------------------------------------\n";

/// Signals why a command couldn't be executed.
enum CommandError {
    /// The caller sent an invalid request.
    Client(String),
    /// The command failed on our side.
    Server(String),
    /// The response couldn't be rendered. The connection will be closed.
    Output(OutputError),
}

impl From<OutputError> for CommandError {
    fn from(error: OutputError) -> Self {
        CommandError::Output(error)
    }
}

impl From<CacheError> for CommandError {
    fn from(error: CacheError) -> Self {
        if error.is_client_error() {
            CommandError::Client(error.to_string())
        } else {
            CommandError::Server(error.to_string())
        }
    }
}

impl From<std::fmt::Error> for CommandError {
    fn from(error: std::fmt::Error) -> Self {
        CommandError::Server(error.to_string())
    }
}

type CommandResult = Result<(), CommandError>;

/// Accepts connections and dispatches their requests.
pub struct Server {
    running: AtomicBool,
    current_address: Mutex<Option<String>>,
}

impl Server {
    /// Creates a new server which is started via [event_loop](Server::event_loop).
    pub fn new() -> Arc<Self> {
        Arc::new(Server {
            running: AtomicBool::new(false),
            current_address: Mutex::new(None),
        })
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Returns the address the server is currently bound to.
    pub fn current_address(&self) -> Option<String> {
        self.current_address
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn set_current_address(&self, address: Option<String>) {
        *self
            .current_address
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = address;
    }

    fn address(node: &Node) -> String {
        node.config()
            .map(|config| {
                let handle = config.current();
                format!(
                    "{}:{}",
                    handle.query("server.host").as_str().unwrap_or("0.0.0.0"),
                    handle
                        .query("server.port")
                        .as_i64()
                        .filter(|port| *port > 0 && *port <= u16::MAX as i64)
                        .unwrap_or(DEFAULT_PORT as i64)
                )
            })
            .unwrap_or_else(|| format!("0.0.0.0:{}", DEFAULT_PORT))
    }

    /// Starts the event loop in a separate task.
    pub fn fork(server: &Arc<Server>, node: &Arc<Node>) {
        let server = server.clone();
        let node = node.clone();
        spawn!(async move {
            server.event_loop(&node).await;
        });
    }

    /// Starts the event loop in a separate task and waits until the socket is open.
    pub async fn fork_and_await(server: &Arc<Server>, node: &Arc<Node>) {
        Server::fork(server, node);

        while server.current_address().is_none() {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }

    /// Binds the server socket and accepts connections until the node is terminated.
    ///
    /// The address is re-read from the config each time the socket is (re-)opened.
    pub async fn event_loop(&self, node: &Arc<Node>) {
        let mut last_bind_error_reported: Option<Instant> = None;

        while node.is_running() {
            let address = Server::address(node);
            match TcpListener::bind(&address).await {
                Ok(listener) => {
                    log::info!("Opened server socket on {}...", &address);
                    self.running.store(true, Ordering::Release);
                    self.set_current_address(Some(address.clone()));
                    self.server_loop(node, &listener).await;
                    self.set_current_address(None);
                    self.running.store(false, Ordering::Release);
                    log::info!("Closing server socket on {}.", &address);
                }
                Err(error) => {
                    // Report this every 5s at most, as we retry every 500ms...
                    if last_bind_error_reported
                        .map(|reported| reported.elapsed() > Duration::from_secs(5))
                        .unwrap_or(true)
                    {
                        log::error!(
                            "Cannot open server address {}: {}. Retrying every 500ms...",
                            &address,
                            error
                        );
                        last_bind_error_reported = Some(Instant::now());
                    }
                    tokio::time::sleep(Duration::from_millis(500)).await;
                }
            }
        }
    }

    async fn server_loop(&self, node: &Arc<Node>, listener: &TcpListener) {
        let mut config_changed = node.config().map(|config| config.notifier());

        while node.is_running() && self.is_running() {
            tokio::select! {
                accepted = tokio::time::timeout(CONNECT_WAIT_TIMEOUT, listener.accept()) => {
                    match accepted {
                        Ok(Ok((stream, _))) => handle_new_connection(node.clone(), stream),
                        Ok(Err(error)) => {
                            log::error!("Failed to accept a connection: {}", error);
                            return;
                        }
                        Err(_) => (),
                    }
                }
                _ = wait_for_change(&mut config_changed) => {
                    if Some(Server::address(node)) != self.current_address() {
                        log::info!("Server address has changed. Restarting server socket...");
                        return;
                    }
                }
            }
        }
    }
}

/// Waits for the next config change or forever if there is no config.
async fn wait_for_change(notifier: &mut Option<crate::config::ChangeNotifier>) {
    match notifier {
        Some(notifier) => {
            if let Err(tokio::sync::broadcast::error::RecvError::Closed) = notifier.recv().await {
                futures::future::pending::<()>().await
            }
        }
        None => futures::future::pending::<()>().await,
    }
}

fn handle_new_connection(node: Arc<Node>, stream: TcpStream) {
    spawn!(async move {
        let _ = stream.set_nodelay(true);
        let peer_address = stream
            .peer_addr()
            .map(|address| address.to_string())
            .unwrap_or_else(|_| "<unknown>".to_owned());

        log::debug!("Opened connection from {}...", peer_address);
        if let Err(error) = resp_protocol_loop(&node, stream).await {
            log::debug!("An IO error occurred in connection {}: {}", peer_address, error);
        }
        log::debug!("Closing connection to {}...", peer_address);
    });
}

async fn resp_protocol_loop(node: &Arc<Node>, mut stream: TcpStream) -> anyhow::Result<()> {
    let mut input_buffer = BytesMut::with_capacity(DEFAULT_BUFFER_SIZE);
    let (mut reader, mut writer) = stream.split();

    while node.is_running() {
        match tokio::time::timeout(READ_WAIT_TIMEOUT, reader.read_buf(&mut input_buffer)).await {
            Ok(Ok(0)) => return Ok(()),
            Ok(Ok(_)) => {
                // A read might have delivered several pipelined requests...
                loop {
                    let request = match Request::parse(&input_buffer) {
                        Ok(Some(request)) => request,
                        Ok(None) => break,
                        Err(error) => {
                            let message =
                                format!("-CLIENT: A malformed RESP request was received: {:#}", error)
                                    .replace(['\r', '\n'], " ");
                            writer.write_all(message.as_bytes()).await?;
                            writer.write_all(b"\r\n").await?;
                            writer.flush().await?;
                            return Ok(());
                        }
                    };

                    log::debug!("Received {}", request.command());
                    let quit = request.command().eq_ignore_ascii_case("QUIT");
                    let response = dispatch(node, &request).await;
                    input_buffer = clear_input_buffer(input_buffer, request.len());

                    match response {
                        Ok(data) => {
                            writer.write_all(&data).await?;
                            writer.flush().await?;
                        }
                        Err(error) => {
                            let message = format!("-SERVER: {}", error).replace(['\r', '\n'], " ");
                            writer.write_all(message.as_bytes()).await?;
                            writer.write_all(b"\r\n").await?;
                            writer.flush().await?;
                            return Ok(());
                        }
                    }

                    if quit {
                        return Ok(());
                    }
                }
            }
            Ok(Err(error)) => {
                return Err(anyhow::anyhow!(
                    "An error occurred while reading from the client: {}",
                    error
                ));
            }
            Err(_) => (),
        }
    }

    Ok(())
}

fn clear_input_buffer(mut input_buffer: BytesMut, request_len: usize) -> BytesMut {
    if input_buffer.len() == request_len && input_buffer.capacity() <= DEFAULT_BUFFER_SIZE {
        input_buffer.clear();
        return input_buffer;
    }

    // Either trailing data is present or the buffer has grown for a large request, so we
    // continue with a fresh buffer of the default size...
    let mut next_buffer = BytesMut::with_capacity(DEFAULT_BUFFER_SIZE.max(input_buffer.len() - request_len));
    next_buffer.put_slice(&input_buffer[request_len..]);
    input_buffer.clear();

    next_buffer
}

/// Executes the given request and returns the rendered response.
///
/// Only an [OutputError](OutputError) is reported as error, all other failures are rendered as
/// RESP error.
async fn dispatch(node: &Arc<Node>, request: &Request) -> Result<BytesMut, OutputError> {
    let mut response = Response::new();
    let result = match request.command().to_ascii_uppercase().as_str() {
        "PING" => ping(request, &mut response),
        "QUIT" => response.ok().map_err(CommandError::from),
        "CACHE.GET" => get(node, request, &mut response, true).await,
        "PEER.GET" => get(node, request, &mut response, false).await,
        "CACHE.STATS" => stats(node, request, &mut response),
        "CACHE.PEERS" => peers(node, request, &mut response),
        _ => Err(CommandError::Client(format!(
            "Unknown command: {}",
            request.command()
        ))),
    };

    match result {
        Ok(()) => response.complete(),
        Err(CommandError::Output(error)) => Err(error),
        Err(CommandError::Client(message)) => error_response(format!("CLIENT: {}", message)),
        Err(CommandError::Server(message)) => error_response(format!("SERVER: {}", message)),
    }
}

fn error_response(message: String) -> Result<BytesMut, OutputError> {
    let mut response = Response::new();
    response.error(message)?;
    response.complete()
}

fn expect_parameters(request: &Request, min: usize, max: usize) -> CommandResult {
    let count = request.parameter_count();
    if count < min || count > max {
        Err(CommandError::Client(format!(
            "{} expects {} parameter(s) but {} were given",
            request.command(),
            if min == max {
                min.to_string()
            } else {
                format!("{} to {}", min, max)
            },
            count
        )))
    } else {
        Ok(())
    }
}

fn str_parameter(request: &Request, index: usize) -> Result<&str, CommandError> {
    request
        .str_parameter(index)
        .map_err(|error| CommandError::Client(format!("{:#}", error)))
}

fn ping(request: &Request, response: &mut Response) -> CommandResult {
    expect_parameters(request, 0, 1)?;
    match request.parameter(0) {
        Ok(message) => response.bulk(message)?,
        Err(_) => response.simple("PONG")?,
    }

    Ok(())
}

async fn get(
    node: &Arc<Node>,
    request: &Request,
    response: &mut Response,
    routed: bool,
) -> CommandResult {
    expect_parameters(request, 2, 2)?;
    let group = node.groups().require(str_parameter(request, 0)?)?;
    let key = str_parameter(request, 1)?;

    let value = if routed {
        group.get(key).await?
    } else {
        group.get_locally(key).await?
    };
    response.bulk(value.as_slice())?;

    Ok(())
}

fn stats(node: &Arc<Node>, request: &Request, response: &mut Response) -> CommandResult {
    expect_parameters(request, 0, 1)?;
    let groups: Vec<Arc<Group>> = match request.parameter_count() {
        0 => node
            .groups()
            .names()
            .iter()
            .filter_map(|name| node.groups().get(name))
            .collect(),
        _ => vec![node.groups().require(str_parameter(request, 0)?)?],
    };

    let mut report = String::new();
    writeln!(report, "{:<30} {:>20}", "Groups", groups.len())?;
    for group in groups {
        report.push_str(SEPARATOR);
        write!(report, "{}", group)?;
    }
    response.bulk(report)?;

    Ok(())
}

fn peers(node: &Arc<Node>, request: &Request, response: &mut Response) -> CommandResult {
    expect_parameters(request, 0, 0)?;
    let peers = node.peers();

    let mut report = String::new();
    writeln!(report, "{:<30} {:>20}", "Self", peers.self_address())?;
    writeln!(report, "{:<30} {:>20}", "Virtual nodes per peer", peers.replicas())?;
    report.push_str(SEPARATOR);
    for member in peers.members() {
        writeln!(report, "{}", member)?;
    }
    response.bulk(report)?;

    Ok(())
}
