use crate::constants::{HTTP_TIMEOUT_MS, SOCKET_READ_TIMEOUT_MS};
use crate::error::TransportError;
use std::io::ErrorKind;
use std::net::TcpStream;
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};
use tungstenite::stream::MaybeTlsStream;
use tungstenite::{Message, WebSocket};
use url::Url;

#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Opened {
        generation: u64,
    },
    Frame {
        generation: u64,
        text: String,
    },
    Closed {
        generation: u64,
        reason: Option<String>,
    },
    PollResult {
        seq: u64,
        result: Result<String, String>,
    },
}

/// Side of the transports the controller drives. Implementations must not
/// block: results come back later as [`TransportEvent`]s.
pub trait Transport {
    fn connect(&mut self, generation: u64, url: Url);
    fn send(&mut self, generation: u64, text: String);
    fn close(&mut self, generation: u64);
    fn fetch(&mut self, seq: u64, url: Url);
}

enum SocketCommand {
    Send(String),
    Close,
}

pub struct ThreadTransport {
    events: Sender<TransportEvent>,
    socket: Option<(u64, Sender<SocketCommand>)>,
    http: reqwest::blocking::Client,
}

impl ThreadTransport {
    pub fn new(events: Sender<TransportEvent>) -> Result<Self, TransportError> {
        let http = reqwest::blocking::Client::builder()
            .timeout(Duration::from_millis(HTTP_TIMEOUT_MS))
            .build()?;
        Ok(Self {
            events,
            socket: None,
            http,
        })
    }
}

impl Transport for ThreadTransport {
    fn connect(&mut self, generation: u64, url: Url) {
        if let Some(previous) = self.socket.as_ref().map(|(g, _)| *g) {
            self.close(previous);
        }
        let (tx, rx) = mpsc::channel();
        self.socket = Some((generation, tx));
        let events = self.events.clone();
        thread::spawn(move || {
            let reason = match run_socket(generation, &url, &rx, &events) {
                Ok(reason) => reason,
                Err(e) => {
                    warn!(generation, error = %e, "socket failed");
                    Some(e.to_string())
                }
            };
            let _ = events.send(TransportEvent::Closed { generation, reason });
        });
    }

    fn send(&mut self, generation: u64, text: String) {
        match &self.socket {
            Some((current, tx)) if *current == generation => {
                if tx.send(SocketCommand::Send(text)).is_err() {
                    debug!(generation, "socket thread already gone, frame dropped");
                }
            }
            _ => debug!(generation, "no such socket, frame dropped"),
        }
    }

    fn close(&mut self, generation: u64) {
        if let Some((current, tx)) = self.socket.take() {
            if current == generation {
                let _ = tx.send(SocketCommand::Close);
            } else {
                self.socket = Some((current, tx));
            }
        }
    }

    fn fetch(&mut self, seq: u64, url: Url) {
        let client = self.http.clone();
        let events = self.events.clone();
        thread::spawn(move || {
            let result = fetch_snapshot(&client, url).map_err(|e| e.to_string());
            let _ = events.send(TransportEvent::PollResult { seq, result });
        });
    }
}

fn fetch_snapshot(client: &reqwest::blocking::Client, url: Url) -> Result<String, TransportError> {
    let response = client.get(url).send()?;
    let status = response.status();
    if !status.is_success() {
        return Err(TransportError::Status(status));
    }
    Ok(response.text()?)
}

fn set_read_timeout(socket: &mut WebSocket<MaybeTlsStream<TcpStream>>) -> std::io::Result<()> {
    let timeout = Some(Duration::from_millis(SOCKET_READ_TIMEOUT_MS));
    match socket.get_mut() {
        MaybeTlsStream::Plain(stream) => stream.set_read_timeout(timeout),
        MaybeTlsStream::Rustls(stream) => stream.get_ref().set_read_timeout(timeout),
        _ => Ok(()),
    }
}

/// Runs until the socket closes. `Ok(None)` means the close was requested
/// locally; `Ok(Some(reason))` means the peer went away.
fn run_socket(
    generation: u64,
    url: &Url,
    commands: &Receiver<SocketCommand>,
    events: &Sender<TransportEvent>,
) -> Result<Option<String>, TransportError> {
    let (mut socket, _response) = tungstenite::connect(url.as_str())?;
    set_read_timeout(&mut socket)?;
    info!(generation, url = %url, "socket open");
    if events.send(TransportEvent::Opened { generation }).is_err() {
        return Ok(None);
    }

    loop {
        loop {
            match commands.try_recv() {
                Ok(SocketCommand::Send(text)) => socket.send(Message::Text(text))?,
                Ok(SocketCommand::Close) | Err(TryRecvError::Disconnected) => {
                    let _ = socket.close(None);
                    let _ = socket.flush();
                    info!(generation, "socket closed locally");
                    return Ok(None);
                }
                Err(TryRecvError::Empty) => break,
            }
        }

        match socket.read() {
            Ok(Message::Text(text)) => {
                if events.send(TransportEvent::Frame { generation, text }).is_err() {
                    return Ok(None);
                }
            }
            Ok(Message::Close(frame)) => {
                let reason = frame
                    .map(|f| f.reason.to_string())
                    .filter(|r| !r.is_empty())
                    .unwrap_or_else(|| "closed by server".to_string());
                return Ok(Some(reason));
            }
            Ok(_) => {}
            Err(tungstenite::Error::Io(e))
                if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {}
            Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => {
                return Ok(Some("connection closed".to_string()));
            }
            Err(e) => return Err(e.into()),
        }
    }
}
