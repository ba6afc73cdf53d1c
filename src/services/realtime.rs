use crate::error::{KioskError, Result};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsWrite = SplitSink<WsStream, Message>;
type WsRead = SplitStream<WsStream>;

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// Outbound event channel to the register side
pub trait EventChannel: Send + Sync {
    fn emit(&self, event: &str, payload: Value) -> impl Future<Output = Result<()>> + Send;
}

/// Decoded Engine.IO / Socket.IO text frame
#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    /// Engine.IO handshake with session parameters
    Open(Value),
    Close,
    Ping,
    Pong,
    /// Namespace connect acknowledged
    Connect,
    ConnectError(String),
    Disconnect,
    Event { name: String, payload: Value },
    /// Anything this client does not act on
    Other(String),
}

/// `42["event",payload]`
pub fn encode_event(event: &str, payload: &Value) -> String {
    format!("42{}", Value::Array(vec![Value::String(event.to_string()), payload.clone()]))
}

pub fn parse_packet(text: &str) -> Result<Packet> {
    let mut chars = text.chars();
    let packet = match chars.next() {
        Some('0') => {
            let handshake = serde_json::from_str(chars.as_str())
                .map_err(|e| KioskError::Channel(format!("Invalid open packet: {}", e)))?;
            Packet::Open(handshake)
        }
        Some('1') => Packet::Close,
        Some('2') => Packet::Ping,
        Some('3') => Packet::Pong,
        Some('4') => parse_message(chars.as_str())?,
        Some(_) => Packet::Other(text.to_string()),
        None => return Err(KioskError::Channel("Empty packet".to_string())),
    };
    Ok(packet)
}

fn parse_message(body: &str) -> Result<Packet> {
    let mut chars = body.chars();
    let packet = match chars.next() {
        Some('0') => Packet::Connect,
        Some('1') => Packet::Disconnect,
        Some('2') => {
            // Optional ack id precedes the array
            let array = chars.as_str().trim_start_matches(|c: char| c.is_ascii_digit());
            let values: Vec<Value> = serde_json::from_str(array)
                .map_err(|e| KioskError::Channel(format!("Invalid event packet: {}", e)))?;
            let mut values = values.into_iter();
            let name = match values.next() {
                Some(Value::String(name)) => name,
                _ => return Err(KioskError::Channel("Event packet without a name".to_string())),
            };
            Packet::Event {
                name,
                payload: values.next().unwrap_or(Value::Null),
            }
        }
        Some('4') => Packet::ConnectError(chars.as_str().to_string()),
        _ => Packet::Other(format!("4{}", body)),
    };
    Ok(packet)
}

/// `ws://host:port` to the Socket.IO websocket endpoint
pub fn socket_io_endpoint(url: &str) -> String {
    format!("{}/socket.io/?EIO=4&transport=websocket", url.trim_end_matches('/'))
}

enum Command {
    Send(String),
    Close,
}

/// Socket.IO client over the websocket transport.
///
/// A background task owns the socket: it writes queued frames, answers
/// server pings and logs inbound events.
pub struct SocketIoChannel {
    commands: mpsc::UnboundedSender<Command>,
    task: JoinHandle<()>,
}

impl SocketIoChannel {
    pub async fn connect(url: &str) -> Result<Self> {
        let endpoint = socket_io_endpoint(url);
        let (stream, _) = tokio_tungstenite::connect_async(endpoint.as_str())
            .await
            .map_err(|e| KioskError::Channel(format!("Failed to connect to {}: {}", endpoint, e)))?;
        let (mut write, mut read) = stream.split();

        tokio::time::timeout(HANDSHAKE_TIMEOUT, handshake(&mut write, &mut read))
            .await
            .map_err(|_| KioskError::Channel("Handshake timed out".to_string()))??;
        info!(%endpoint, "realtime channel connected");

        let (commands, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run_connection(write, read, rx));
        Ok(Self { commands, task })
    }

    pub fn is_connected(&self) -> bool {
        !self.commands.is_closed() && !self.task.is_finished()
    }

    /// Leave the namespace and close the socket
    pub async fn close(self) {
        let _ = self.commands.send(Command::Close);
        let _ = self.task.await;
    }
}

impl EventChannel for SocketIoChannel {
    async fn emit(&self, event: &str, payload: Value) -> Result<()> {
        let frame = encode_event(event, &payload);
        debug!(event, "emit");
        self.commands
            .send(Command::Send(frame))
            .map_err(|_| KioskError::Channel("Connection closed".to_string()))
    }
}

async fn next_text(read: &mut WsRead) -> Result<String> {
    loop {
        match read.next().await {
            Some(Ok(Message::Text(text))) => return Ok(text.as_str().to_string()),
            Some(Ok(Message::Close(_))) | None => {
                return Err(KioskError::Channel("Closed during handshake".to_string()))
            }
            Some(Ok(_)) => continue,
            Some(Err(e)) => return Err(KioskError::Channel(e.to_string())),
        }
    }
}

async fn handshake(write: &mut WsWrite, read: &mut WsRead) -> Result<()> {
    match parse_packet(&next_text(read).await?)? {
        Packet::Open(params) => debug!(%params, "engine.io open"),
        other => {
            return Err(KioskError::Channel(format!("Expected open packet, got {:?}", other)));
        }
    }

    write
        .send(Message::Text("40".into()))
        .await
        .map_err(|e| KioskError::Channel(e.to_string()))?;

    loop {
        match parse_packet(&next_text(read).await?)? {
            Packet::Connect => return Ok(()),
            Packet::ConnectError(reason) => {
                return Err(KioskError::Channel(format!("Namespace refused: {}", reason)));
            }
            Packet::Ping => {
                write
                    .send(Message::Text("3".into()))
                    .await
                    .map_err(|e| KioskError::Channel(e.to_string()))?;
            }
            _ => {}
        }
    }
}

async fn run_connection(mut write: WsWrite, mut read: WsRead, mut rx: mpsc::UnboundedReceiver<Command>) {
    loop {
        tokio::select! {
            command = rx.recv() => {
                match command {
                    Some(Command::Send(frame)) => {
                        if let Err(e) = write.send(Message::Text(frame.into())).await {
                            warn!(error = %e, "realtime send failed");
                            break;
                        }
                    }
                    Some(Command::Close) | None => {
                        let _ = write.send(Message::Text("41".into())).await;
                        let _ = write.send(Message::Close(None)).await;
                        break;
                    }
                }
            }

            message = read.next() => {
                match message {
                    Some(Ok(Message::Text(text))) => match parse_packet(text.as_str()) {
                        Ok(Packet::Ping) => {
                            if let Err(e) = write.send(Message::Text("3".into())).await {
                                warn!(error = %e, "realtime pong failed");
                                break;
                            }
                        }
                        Ok(Packet::Event { name, payload }) => debug!(%name, %payload, "realtime event"),
                        Ok(Packet::Close) | Ok(Packet::Disconnect) => break,
                        Ok(_) => {}
                        Err(e) => warn!(error = %e, "unreadable realtime packet"),
                    },
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!(error = %e, "realtime receive failed");
                        break;
                    }
                }
            }
        }
    }
    info!("realtime channel closed");
}

/// Keeps emitted events in memory; stands in for the socket when
/// realtime is disabled.
#[derive(Clone, Default)]
pub struct RecordingChannel {
    events: Arc<Mutex<Vec<(String, Value)>>>,
}

impl RecordingChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<(String, Value)> {
        self.events.lock().clone()
    }
}

impl EventChannel for RecordingChannel {
    async fn emit(&self, event: &str, payload: Value) -> Result<()> {
        info!(event, %payload, "event recorded (realtime disabled)");
        self.events.lock().push((event.to_string(), payload));
        Ok(())
    }
}

/// Channel chosen at startup from the realtime config
pub enum KioskChannel {
    Socket(SocketIoChannel),
    Offline(RecordingChannel),
}

impl EventChannel for KioskChannel {
    async fn emit(&self, event: &str, payload: Value) -> Result<()> {
        match self {
            KioskChannel::Socket(channel) => channel.emit(event, payload).await,
            KioskChannel::Offline(channel) => channel.emit(event, payload).await,
        }
    }
}
