//! Transport handle: one owned duplex stream per connection generation.
//!
//! [`Transport::open`] dials the configured [`Endpoint`] and splits the stream.
//! The read half goes to the read loop; the write half stays here behind an
//! async mutex so requests are written one whole frame at a time.
//!
//! [`Transport::release`] is synchronous and idempotent so it can be called
//! from the signal task, the read loop's failure path and the command layer
//! in any order.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::anyhow;
use tokio::io::{AsyncRead, AsyncWrite, BufReader, ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info};

use super::client::ClientError;
use super::framing::write_message;

/// Any stream the client can speak the protocol over.
pub trait Duplex: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> Duplex for T {}

pub type BoxedStream = Box<dyn Duplex>;

/// Buffered read half handed to the read loop.
pub type FrameReader = BufReader<ReadHalf<BoxedStream>>;

type FrameWriter = WriteHalf<BoxedStream>;

/// Where the chat server listens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// `host:port`
    Tcp(String),
    /// `unix:/path/to.sock`
    #[cfg(unix)]
    Unix(PathBuf),
}

impl Endpoint {
    /// Open a fresh stream to this endpoint.
    pub async fn dial(&self) -> Result<BoxedStream, ClientError> {
        match self {
            Endpoint::Tcp(addr) => {
                let stream = TcpStream::connect(addr.as_str())
                    .await
                    .map_err(ClientError::ConnectionFailed)?;
                // Chat frames are tiny; don't let Nagle hold them back
                stream.set_nodelay(true).map_err(ClientError::ConnectionFailed)?;
                Ok(Box::new(stream))
            }
            #[cfg(unix)]
            Endpoint::Unix(path) => {
                let stream = tokio::net::UnixStream::connect(path)
                    .await
                    .map_err(ClientError::ConnectionFailed)?;
                Ok(Box::new(stream))
            }
        }
    }
}

impl FromStr for Endpoint {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(anyhow!("Server endpoint is empty"));
        }

        if let Some(path) = s.strip_prefix("unix:") {
            #[cfg(unix)]
            {
                if path.is_empty() {
                    return Err(anyhow!("Unix endpoint is missing a socket path"));
                }
                return Ok(Endpoint::Unix(PathBuf::from(path)));
            }
            #[cfg(not(unix))]
            {
                return Err(anyhow!(
                    "Unix socket endpoints are not supported on this platform: {}",
                    path
                ));
            }
        }

        if !s.contains(':') {
            return Err(anyhow!("Expected host:port, got '{}'", s));
        }
        Ok(Endpoint::Tcp(s.to_string()))
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Tcp(addr) => f.write_str(addr),
            #[cfg(unix)]
            Endpoint::Unix(path) => write!(f, "unix:{}", path.display()),
        }
    }
}

/// The live connection of one generation.
pub struct Transport {
    generation: u64,
    writer: Mutex<Option<FrameWriter>>,
    released: watch::Sender<bool>,
}

impl Transport {
    /// Dial `endpoint` and split the stream.
    ///
    /// Returns the handle (write side) and the buffered read side for the
    /// read loop.
    pub async fn open(
        endpoint: &Endpoint,
        generation: u64,
    ) -> Result<(Self, FrameReader), ClientError> {
        let stream = endpoint.dial().await?;
        info!(%endpoint, generation, "Connected to server");
        Ok(Self::from_stream(stream, generation))
    }

    /// Wrap an already-connected stream.
    pub fn from_stream(stream: BoxedStream, generation: u64) -> (Self, FrameReader) {
        let (read_half, write_half) = tokio::io::split(stream);
        let (released, _) = watch::channel(false);

        let transport = Self {
            generation,
            writer: Mutex::new(Some(write_half)),
            released,
        };
        (transport, BufReader::new(read_half))
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_released(&self) -> bool {
        *self.released.borrow()
    }

    /// Receiver that flips to `true` once the handle is released.
    pub fn subscribe_released(&self) -> watch::Receiver<bool> {
        self.released.subscribe()
    }

    /// Write one framed message.
    ///
    /// A release while the write is blocked (peer not reading) abandons it
    /// with [`ClientError::Offline`]; the half-written stream is dropped.
    pub async fn send(&self, body: &str) -> Result<(), ClientError> {
        let mut released = self.subscribe_released();
        if *released.borrow_and_update() {
            return Err(ClientError::Offline);
        }

        let write = async {
            let mut writer = self.writer.lock().await;
            let writer = writer.as_mut().ok_or(ClientError::Offline)?;
            write_message(writer, body)
                .await
                .map_err(|e| ClientError::Send(format!("{:#}", e)))
        };

        let written = tokio::select! {
            biased;
            _ = released.wait_for(|released| *released) => None,
            result = write => Some(result),
        };

        match written {
            Some(result) => result,
            None => {
                self.writer.lock().await.take();
                debug!(generation = self.generation, "Write abandoned: transport released");
                Err(ClientError::Offline)
            }
        }
    }

    /// Close the stream. Returns `true` only for the call that released it.
    ///
    /// Never blocks: if a write is in flight, that write notices the release,
    /// gives up and drops the write half itself.
    pub fn release(&self) -> bool {
        if self.released.send_replace(true) {
            return false;
        }

        if let Ok(mut writer) = self.writer.try_lock() {
            writer.take();
        }
        debug!(generation = self.generation, "Transport released");
        true
    }
}

impl fmt::Debug for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transport")
            .field("generation", &self.generation)
            .field("released", &self.is_released())
            .finish()
    }
}
