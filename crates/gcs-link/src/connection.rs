//! Vehicle connection: transports and the framed, serialized write path.

use std::io::{self, Read, Write};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serial::prelude::*;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpStream, UdpSocket};
use tokio::sync::{mpsc, Mutex, RwLock};

use gcs_core::{encode_frame, FrameHeader, Message};

use crate::error::LinkError;

/// Byte transport under a [`Connection`].
///
/// `recv` returns `Ok(0)` only when the transport has ended.
#[async_trait]
pub trait Link: Send + Sync {
    async fn send(&self, bytes: &[u8]) -> io::Result<()>;
    async fn recv(&self, buf: &mut [u8]) -> io::Result<usize>;
    fn describe(&self) -> String;
}

/// Parsed connection string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkAddress {
    /// Listen locally and reply to whoever talks first
    UdpIn(String),
    /// Send to a fixed peer
    UdpOut(String),
    /// TCP client
    Tcp(String),
    /// Serial port, e.g. a telemetry radio
    Serial { port: String, baud: u32 },
}

impl LinkAddress {
    /// Parse `udpin:host:port`, `udpout:host:port`, `udp:host:port` (same as
    /// udpin), `tcp:host:port` or `serial:port:baud`.
    pub fn parse(address: &str) -> Result<Self, LinkError> {
        let (scheme, endpoint) = address
            .split_once(':')
            .ok_or_else(|| LinkError::Connection(format!("invalid link address '{}'", address)))?;
        let scheme = scheme.to_ascii_lowercase();

        if scheme == "serial" {
            let (port, baud) = endpoint.rsplit_once(':').unwrap_or_default();
            let baud = baud.parse::<u32>().unwrap_or(0);
            if port.is_empty() || baud == 0 {
                return Err(LinkError::Connection(format!(
                    "link address '{}' is not serial:PORT:BAUD",
                    address
                )));
            }
            return Ok(LinkAddress::Serial {
                port: port.to_string(),
                baud,
            });
        }

        if endpoint.is_empty() || !endpoint.contains(':') {
            return Err(LinkError::Connection(format!(
                "link address '{}' is missing host:port",
                address
            )));
        }

        let endpoint = endpoint.to_string();
        match scheme.as_str() {
            "udpin" | "udp" => Ok(LinkAddress::UdpIn(endpoint)),
            "udpout" => Ok(LinkAddress::UdpOut(endpoint)),
            "tcp" => Ok(LinkAddress::Tcp(endpoint)),
            other => Err(LinkError::Connection(format!(
                "unsupported link scheme '{}'",
                other
            ))),
        }
    }
}

pub struct UdpLink {
    socket: UdpSocket,
    peer: RwLock<Option<SocketAddr>>,
    learn_peer: bool,
}

impl UdpLink {
    pub async fn bind(local: &str) -> io::Result<Self> {
        Ok(Self {
            socket: UdpSocket::bind(local).await?,
            peer: RwLock::new(None),
            learn_peer: true,
        })
    }

    pub async fn connect(remote: &str) -> io::Result<Self> {
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        socket.connect(remote).await?;
        let peer = socket.peer_addr()?;
        Ok(Self {
            socket,
            peer: RwLock::new(Some(peer)),
            learn_peer: false,
        })
    }
}

#[async_trait]
impl Link for UdpLink {
    async fn send(&self, bytes: &[u8]) -> io::Result<()> {
        let peer = *self.peer.read().await;
        match peer {
            Some(peer) => {
                self.socket.send_to(bytes, peer).await?;
                Ok(())
            }
            None => Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "no vehicle has contacted this endpoint yet",
            )),
        }
    }

    async fn recv(&self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            let (len, from) = self.socket.recv_from(buf).await?;
            if self.learn_peer {
                let mut peer = self.peer.write().await;
                if *peer != Some(from) {
                    tracing::info!("Vehicle endpoint is {}", from);
                    *peer = Some(from);
                }
            }
            if len > 0 {
                return Ok(len);
            }
        }
    }

    fn describe(&self) -> String {
        match self.socket.local_addr() {
            Ok(addr) if self.learn_peer => format!("udpin:{}", addr),
            Ok(addr) => format!("udpout:{}", addr),
            Err(_) => "udp".to_string(),
        }
    }
}

pub struct TcpLink {
    reader: Mutex<OwnedReadHalf>,
    writer: Mutex<OwnedWriteHalf>,
    peer: String,
}

impl TcpLink {
    pub async fn connect(remote: &str) -> io::Result<Self> {
        let stream = TcpStream::connect(remote).await?;
        stream.set_nodelay(true)?;
        let (reader, writer) = stream.into_split();
        Ok(Self {
            reader: Mutex::new(reader),
            writer: Mutex::new(writer),
            peer: remote.to_string(),
        })
    }
}

#[async_trait]
impl Link for TcpLink {
    async fn send(&self, bytes: &[u8]) -> io::Result<()> {
        self.writer.lock().await.write_all(bytes).await
    }

    async fn recv(&self, buf: &mut [u8]) -> io::Result<usize> {
        self.reader.lock().await.read(buf).await
    }

    fn describe(&self) -> String {
        format!("tcp:{}", self.peer)
    }
}

/// How long a blocking serial read waits before the port lock is released
/// for writers.
const SERIAL_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Serial port link. The port is blocking, so reads and writes run on the
/// blocking pool and share it through a lock; reads give the lock back every
/// poll interval.
pub struct SerialLink {
    port: Arc<std::sync::Mutex<serial::SystemPort>>,
    name: String,
    baud: u32,
}

impl SerialLink {
    pub async fn open(name: &str, baud: u32) -> io::Result<Self> {
        let path = name.to_string();
        let port = tokio::task::spawn_blocking(move || -> io::Result<serial::SystemPort> {
            let mut port = serial::open(&path)?;
            port.reconfigure(&|settings| {
                settings.set_baud_rate(serial::BaudRate::from_speed(baud as usize))?;
                settings.set_char_size(serial::Bits8);
                settings.set_parity(serial::ParityNone);
                settings.set_stop_bits(serial::Stop1);
                settings.set_flow_control(serial::FlowNone);
                Ok(())
            })?;
            port.set_timeout(SERIAL_POLL_INTERVAL)?;
            Ok(port)
        })
        .await
        .map_err(io::Error::other)??;

        Ok(Self {
            port: Arc::new(std::sync::Mutex::new(port)),
            name: name.to_string(),
            baud,
        })
    }
}

fn poisoned<T>(_: T) -> io::Error {
    io::Error::other("serial port lock poisoned")
}

#[async_trait]
impl Link for SerialLink {
    async fn send(&self, bytes: &[u8]) -> io::Result<()> {
        let port = Arc::clone(&self.port);
        let bytes = bytes.to_vec();
        tokio::task::spawn_blocking(move || {
            let mut port = port.lock().map_err(poisoned)?;
            port.write_all(&bytes)?;
            port.flush()
        })
        .await
        .map_err(io::Error::other)?
    }

    async fn recv(&self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            let port = Arc::clone(&self.port);
            let capacity = buf.len();
            let chunk = tokio::task::spawn_blocking(move || {
                let mut chunk = vec![0u8; capacity];
                let mut port = port.lock().map_err(poisoned)?;
                match port.read(&mut chunk) {
                    Ok(len) => {
                        chunk.truncate(len);
                        Ok(chunk)
                    }
                    Err(err) if err.kind() == io::ErrorKind::TimedOut => Ok(Vec::new()),
                    Err(err) => Err(err),
                }
            })
            .await
            .map_err(io::Error::other)??;

            // A quiet port is not the end of the link
            if !chunk.is_empty() {
                buf[..chunk.len()].copy_from_slice(&chunk);
                return Ok(chunk.len());
            }
        }
    }

    fn describe(&self) -> String {
        format!("serial:{}:{}", self.name, self.baud)
    }
}

/// In-process datagram link. Used for loopback setups and tests.
pub struct ChannelLink {
    tx: mpsc::UnboundedSender<Vec<u8>>,
    rx: Mutex<mpsc::UnboundedReceiver<Vec<u8>>>,
}

impl ChannelLink {
    /// Two connected ends: bytes sent on one are received on the other.
    pub fn pair() -> (ChannelLink, ChannelLink) {
        let (a_tx, a_rx) = mpsc::unbounded_channel();
        let (b_tx, b_rx) = mpsc::unbounded_channel();
        (
            ChannelLink {
                tx: a_tx,
                rx: Mutex::new(b_rx),
            },
            ChannelLink {
                tx: b_tx,
                rx: Mutex::new(a_rx),
            },
        )
    }
}

#[async_trait]
impl Link for ChannelLink {
    async fn send(&self, bytes: &[u8]) -> io::Result<()> {
        self.tx
            .send(bytes.to_vec())
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "channel peer dropped"))
    }

    async fn recv(&self, buf: &mut [u8]) -> io::Result<usize> {
        match self.rx.lock().await.recv().await {
            Some(datagram) => {
                // Oversized datagrams are truncated, as with UDP
                let len = datagram.len().min(buf.len());
                buf[..len].copy_from_slice(&datagram[..len]);
                Ok(len)
            }
            None => Ok(0),
        }
    }

    fn describe(&self) -> String {
        "channel".to_string()
    }
}

/// System/component identity this ground station sends as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SourceId {
    pub system_id: u8,
    pub component_id: u8,
}

impl Default for SourceId {
    /// GCS system 255, MAV_COMP_ID_MISSIONPLANNER
    fn default() -> Self {
        Self {
            system_id: 255,
            component_id: 190,
        }
    }
}

/// Transmit counters.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TxStats {
    pub frames_sent: u64,
    pub bytes_sent: u64,
    pub send_errors: u64,
    pub last_send_at: Option<DateTime<Utc>>,
}

struct TxState {
    sequence: u8,
    stats: TxStats,
}

/// One logical connection to a vehicle.
///
/// Writes are serialized: the sequence number is assigned and the frame
/// written while holding the transmit lock, so frames never interleave.
pub struct Connection {
    link: Arc<dyn Link>,
    source: SourceId,
    tx: Mutex<TxState>,
    established: AtomicBool,
}

impl Connection {
    pub async fn open(address: &LinkAddress, source: SourceId) -> Result<Self, LinkError> {
        let link: Arc<dyn Link> = match address {
            LinkAddress::UdpIn(local) => Arc::new(UdpLink::bind(local).await?),
            LinkAddress::UdpOut(remote) => Arc::new(UdpLink::connect(remote).await?),
            LinkAddress::Tcp(remote) => Arc::new(TcpLink::connect(remote).await?),
            LinkAddress::Serial { port, baud } => Arc::new(SerialLink::open(port, *baud).await?),
        };
        tracing::info!("Opened vehicle link {}", link.describe());
        Ok(Self::from_arc(link, source))
    }

    pub fn from_link(link: impl Link + 'static, source: SourceId) -> Self {
        Self::from_arc(Arc::new(link), source)
    }

    fn from_arc(link: Arc<dyn Link>, source: SourceId) -> Self {
        Self {
            link,
            source,
            tx: Mutex::new(TxState {
                sequence: 0,
                stats: TxStats::default(),
            }),
            established: AtomicBool::new(true),
        }
    }

    pub fn source(&self) -> SourceId {
        self.source
    }

    pub fn describe(&self) -> String {
        self.link.describe()
    }

    pub fn is_established(&self) -> bool {
        self.established.load(Ordering::Acquire)
    }

    /// Mark the connection closed. Later sends and reads fail.
    pub fn close(&self) {
        if self.established.swap(false, Ordering::AcqRel) {
            tracing::info!("Closed vehicle link {}", self.link.describe());
        }
    }

    /// Frame and transmit one message.
    pub async fn send_message(&self, message: &Message) -> Result<(), LinkError> {
        if !self.is_established() {
            return Err(LinkError::Connection("connection is closed".to_string()));
        }

        let mut tx = self.tx.lock().await;
        let header = FrameHeader {
            sequence: tx.sequence,
            system_id: self.source.system_id,
            component_id: self.source.component_id,
        };
        let frame = encode_frame(header, message)?;
        tx.sequence = tx.sequence.wrapping_add(1);

        match self.link.send(&frame).await {
            Ok(()) => {
                tx.stats.frames_sent += 1;
                tx.stats.bytes_sent += frame.len() as u64;
                tx.stats.last_send_at = Some(Utc::now());
                tracing::debug!(
                    "Sent message {} (seq {}, {} bytes)",
                    message.message_id(),
                    header.sequence,
                    frame.len()
                );
                Ok(())
            }
            Err(err) => {
                tx.stats.send_errors += 1;
                Err(LinkError::Connection(format!(
                    "failed to send message {}: {}",
                    message.message_id(),
                    err
                )))
            }
        }
    }

    /// Read raw bytes from the transport. `Ok(0)` means the transport ended.
    pub async fn read(&self, buf: &mut [u8]) -> Result<usize, LinkError> {
        if !self.is_established() {
            return Err(LinkError::Connection("connection is closed".to_string()));
        }
        Ok(self.link.recv(buf).await?)
    }

    pub async fn stats(&self) -> TxStats {
        self.tx.lock().await.stats.clone()
    }
}
