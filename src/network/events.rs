//! Live event stream from the node
//!
//! One background thread owns the WebSocket and its connection state. It
//! subscribes to the watched addresses, keeps the link alive with pings,
//! reconnects with exponential backoff and forwards everything it hears as
//! `StreamEvent`s over a channel.

use crate::error::{Result, SendError};
use log::{debug, info, warn};
use serde_json::{json, Value};
use std::io::ErrorKind;
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tungstenite::http::Uri;
use tungstenite::stream::MaybeTlsStream;
use tungstenite::{HandshakeError, Message, WebSocket};

pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
pub const INITIAL_RECONNECT_DELAY: Duration = Duration::from_millis(500);
pub const MAX_RECONNECT_DELAY: Duration = Duration::from_secs(30);

// How long a blocking read waits before the loop checks pings and shutdown.
const READ_POLL: Duration = Duration::from_millis(250);
const SHUTDOWN_POLL: Duration = Duration::from_millis(50);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);
const WRITE_TIMEOUT: Duration = Duration::from_secs(5);

type Socket = WebSocket<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    StateChanged(ConnectionState),
    /// A message from the node. `channel` is the part of its type before
    /// the first `:`, e.g. `wallet` for `wallet:address_history`.
    Message {
        channel: String,
        kind: String,
        payload: Value,
    },
}

/// Parse one inbound text frame.
pub fn parse_message(text: &str) -> Result<StreamEvent> {
    let payload: Value = serde_json::from_str(text)?;
    let kind = payload
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| SendError::Serialization("Stream message has no type".to_string()))?
        .to_string();
    let channel = kind.split(':').next().unwrap_or_default().to_string();
    Ok(StreamEvent::Message {
        channel,
        kind,
        payload,
    })
}

pub fn subscribe_message(address: &str) -> String {
    json!({ "type": "subscribe_address", "address": address }).to_string()
}

pub fn ping_message() -> String {
    json!({ "type": "ping" }).to_string()
}

/// Reconnect delay that doubles after every failure up to a cap.
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    current: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Backoff::new(INITIAL_RECONNECT_DELAY, MAX_RECONNECT_DELAY)
    }
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Backoff {
        Backoff {
            initial,
            max,
            current: initial,
        }
    }

    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = (self.current * 2).min(self.max);
        delay
    }

    pub fn reset(&mut self) {
        self.current = self.initial;
    }
}

/// Handle to the background connection. Dropping it stops the thread.
pub struct EventStream {
    events: Receiver<StreamEvent>,
    shutdown: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl EventStream {
    pub fn connect(ws_url: &str, addresses: Vec<String>) -> Result<EventStream> {
        let (event_tx, event_rx) = mpsc::channel();
        let shutdown = Arc::new(AtomicBool::new(false));

        let connection = StreamConnection {
            url: ws_url.to_string(),
            addresses,
            state: ConnectionState::Disconnected,
            backoff: Backoff::default(),
            events: event_tx,
            shutdown: Arc::clone(&shutdown),
            listener_gone: false,
        };
        let handle = thread::Builder::new()
            .name("event-stream".to_string())
            .spawn(move || connection.run())?;

        Ok(EventStream {
            events: event_rx,
            shutdown,
            handle: Some(handle),
        })
    }

    pub fn recv(&self) -> Option<StreamEvent> {
        self.events.recv().ok()
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Option<StreamEvent> {
        match self.events.recv_timeout(timeout) {
            Ok(event) => Some(event),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }
}

impl Drop for EventStream {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("Event stream thread panicked");
            }
        }
    }
}

struct StreamConnection {
    url: String,
    addresses: Vec<String>,
    state: ConnectionState,
    backoff: Backoff,
    events: Sender<StreamEvent>,
    shutdown: Arc<AtomicBool>,
    listener_gone: bool,
}

impl StreamConnection {
    fn stopping(&self) -> bool {
        self.listener_gone || self.shutdown.load(Ordering::Relaxed)
    }

    fn run(mut self) {
        while !self.stopping() {
            self.set_state(ConnectionState::Connecting);
            match self.open() {
                Ok(socket) => {
                    info!("Connected to event stream {}", self.url);
                    self.backoff.reset();
                    self.set_state(ConnectionState::Connected);
                    if let Err(e) = self.serve(socket) {
                        warn!("Event stream connection lost: {e}");
                    }
                }
                Err(e) => warn!("Failed to connect to {}: {e}", self.url),
            }
            self.set_state(ConnectionState::Disconnected);

            if self.stopping() {
                break;
            }
            let delay = self.backoff.next_delay();
            debug!("Reconnecting in {delay:?}");
            self.sleep(delay);
        }
        debug!("Event stream stopped");
    }

    // The socket carries the poll timeout from the start, so a server that
    // never answers the upgrade cannot hold the thread past shutdown.
    fn open(&self) -> Result<Socket> {
        let stream = connect_tcp(&self.url)?;
        let deadline = Instant::now() + HANDSHAKE_TIMEOUT;
        let mut handshake = tungstenite::client_tls(self.url.as_str(), stream);
        loop {
            match handshake {
                Ok((socket, _)) => return Ok(socket),
                Err(HandshakeError::Failure(e)) => return Err(transport(e)),
                Err(HandshakeError::Interrupted(pending)) => {
                    if self.stopping() {
                        return Err(SendError::Transport(
                            "Event stream stopped during handshake".to_string(),
                        ));
                    }
                    if Instant::now() >= deadline {
                        return Err(SendError::Transport(format!(
                            "Handshake with {} timed out",
                            self.url
                        )));
                    }
                    handshake = pending.handshake();
                }
            }
        }
    }

    fn set_state(&mut self, state: ConnectionState) {
        if self.state == state {
            return;
        }
        self.state = state;
        self.emit(StreamEvent::StateChanged(state));
    }

    fn emit(&mut self, event: StreamEvent) {
        if self.events.send(event).is_err() {
            self.listener_gone = true;
        }
    }

    fn sleep(&self, delay: Duration) {
        let deadline = Instant::now() + delay;
        while !self.stopping() {
            let now = Instant::now();
            if now >= deadline {
                return;
            }
            thread::sleep(SHUTDOWN_POLL.min(deadline - now));
        }
    }

    fn serve(&mut self, mut socket: Socket) -> Result<()> {
        for address in &self.addresses {
            socket
                .send(Message::Text(subscribe_message(address)))
                .map_err(transport)?;
        }
        debug!("Subscribed to {} addresses", self.addresses.len());

        let mut last_ping = Instant::now();
        loop {
            if self.stopping() {
                let _ = socket.close(None);
                return Ok(());
            }
            if last_ping.elapsed() >= HEARTBEAT_INTERVAL {
                socket
                    .send(Message::Text(ping_message()))
                    .map_err(transport)?;
                last_ping = Instant::now();
            }

            match socket.read() {
                Ok(Message::Text(text)) => match parse_message(&text) {
                    Ok(event) => self.emit(event),
                    Err(e) => debug!("Ignoring stream message: {e}"),
                },
                Ok(Message::Close(_)) => return Ok(()),
                Ok(_) => {}
                Err(tungstenite::Error::Io(e))
                    if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {}
                Err(tungstenite::Error::ConnectionClosed) => return Ok(()),
                Err(e) => return Err(transport(e)),
            }
        }
    }
}

fn connect_tcp(url: &str) -> Result<TcpStream> {
    let uri: Uri = url
        .parse()
        .map_err(|e| SendError::Config(format!("Invalid stream URL {url}: {e}")))?;
    let host = uri
        .host()
        .ok_or_else(|| SendError::Config(format!("Stream URL {url} has no host")))?
        .trim_start_matches('[')
        .trim_end_matches(']');
    let port = uri.port_u16().unwrap_or(match uri.scheme_str() {
        Some("wss") => 443,
        _ => 80,
    });

    let mut last_error = None;
    for addr in (host, port).to_socket_addrs()? {
        match TcpStream::connect_timeout(&addr, CONNECT_TIMEOUT) {
            Ok(stream) => {
                stream.set_read_timeout(Some(READ_POLL))?;
                stream.set_write_timeout(Some(WRITE_TIMEOUT))?;
                return Ok(stream);
            }
            Err(e) => last_error = Some(e),
        }
    }
    Err(SendError::Transport(match last_error {
        Some(e) => format!("Failed to connect to {url}: {e}"),
        None => format!("No addresses found for {url}"),
    }))
}

fn transport(err: tungstenite::Error) -> SendError {
    SendError::Transport(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    #[test]
    fn test_parse_message_channel() {
        let event =
            parse_message(r#"{"type": "wallet:address_history", "history": {"tx_id": "00"}}"#)
                .unwrap();
        match event {
            StreamEvent::Message {
                channel,
                kind,
                payload,
            } => {
                assert_eq!(channel, "wallet");
                assert_eq!(kind, "wallet:address_history");
                assert_eq!(payload["history"]["tx_id"], "00");
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn test_parse_message_without_namespace() {
        let event = parse_message(r#"{"type": "pong"}"#).unwrap();
        assert!(matches!(event, StreamEvent::Message { ref channel, .. } if channel == "pong"));
    }

    #[test]
    fn test_parse_message_errors() {
        assert!(parse_message("not json").is_err());
        assert!(parse_message(r#"{"kind": "x"}"#).is_err());
        assert!(parse_message(r#"{"type": 5}"#).is_err());
    }

    #[test]
    fn test_outbound_messages() {
        let subscribe: Value = serde_json::from_str(&subscribe_message("WAddr")).unwrap();
        assert_eq!(subscribe["type"], "subscribe_address");
        assert_eq!(subscribe["address"], "WAddr");

        let ping: Value = serde_json::from_str(&ping_message()).unwrap();
        assert_eq!(ping["type"], "ping");
    }

    #[test]
    fn test_backoff_doubles_to_cap_and_resets() {
        let mut backoff = Backoff::default();
        let delays: Vec<u64> = (0..10)
            .map(|_| backoff.next_delay().as_millis() as u64)
            .collect();
        assert_eq!(
            delays,
            vec![500, 1000, 2000, 4000, 8000, 16000, 30000, 30000, 30000, 30000]
        );

        backoff.reset();
        assert_eq!(backoff.next_delay(), INITIAL_RECONNECT_DELAY);
    }

    #[test]
    fn test_subscribes_and_forwards_messages() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut ws = tungstenite::accept(stream).unwrap();
            let subscribe = match ws.read().unwrap() {
                Message::Text(text) => text,
                other => panic!("unexpected frame {other:?}"),
            };
            ws.send(Message::Text(
                r#"{"type": "wallet:address_history", "address": "WAddr"}"#.to_string(),
            ))
            .unwrap();
            subscribe
        });

        let stream =
            EventStream::connect(&format!("ws://127.0.0.1:{port}"), vec!["WAddr".to_string()])
                .unwrap();

        let timeout = Duration::from_secs(5);
        assert_eq!(
            stream.recv_timeout(timeout),
            Some(StreamEvent::StateChanged(ConnectionState::Connecting))
        );
        assert_eq!(
            stream.recv_timeout(timeout),
            Some(StreamEvent::StateChanged(ConnectionState::Connected))
        );
        match stream.recv_timeout(timeout) {
            Some(StreamEvent::Message { channel, payload, .. }) => {
                assert_eq!(channel, "wallet");
                assert_eq!(payload["address"], "WAddr");
            }
            other => panic!("unexpected event {other:?}"),
        }

        let subscribe: Value = serde_json::from_str(&server.join().unwrap()).unwrap();
        assert_eq!(subscribe["type"], "subscribe_address");
        assert_eq!(subscribe["address"], "WAddr");
    }

    #[test]
    fn test_unreachable_server_reports_disconnected() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let stream = EventStream::connect(&format!("ws://127.0.0.1:{port}"), vec![]).unwrap();

        let timeout = Duration::from_secs(5);
        assert_eq!(
            stream.recv_timeout(timeout),
            Some(StreamEvent::StateChanged(ConnectionState::Connecting))
        );
        assert_eq!(
            stream.recv_timeout(timeout),
            Some(StreamEvent::StateChanged(ConnectionState::Disconnected))
        );
    }

    #[test]
    fn test_stalled_handshake_does_not_block_drop() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        // Accept the connection but never answer the upgrade request
        thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            thread::sleep(Duration::from_secs(15));
            drop(stream);
        });

        let stream = EventStream::connect(&format!("ws://127.0.0.1:{port}"), vec![]).unwrap();
        assert_eq!(
            stream.recv_timeout(Duration::from_secs(5)),
            Some(StreamEvent::StateChanged(ConnectionState::Connecting))
        );
        thread::sleep(Duration::from_millis(300));

        let started = Instant::now();
        drop(stream);
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[test]
    fn test_connect_tcp_rejects_bad_url() {
        assert!(matches!(connect_tcp("not a url"), Err(SendError::Config(_))));
    }
}
