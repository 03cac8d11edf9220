//! Server network layer: TCP listener, per-connection read loops and writers.
//!
//! Each accepted connection gets a reader task that frames the byte stream into
//! newline-terminated payloads and a writer task that drains an unbounded
//! outbound queue. Everything else in the server talks to a connection through
//! a cloneable [`ConnectionHandle`], so sending never blocks the caller.

use crate::config::{DispatchMode, ServerConfig};
use crate::dispatcher;
use crate::game::Match;
use log::{debug, error, info, warn};
use shared::{Envelope, MAX_LINE_BYTES};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Notify};

#[derive(Debug, Error)]
pub enum SendError {
    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("connection to {0} is closed")]
    Closed(SocketAddr),
}

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Work queued for a connection's writer task.
#[derive(Debug)]
pub enum Outbound {
    /// Bytes written verbatim, already newline-terminated.
    Frame(Vec<u8>),
    Close,
}

/// Send side of one client connection.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    addr: SocketAddr,
    tx: mpsc::UnboundedSender<Outbound>,
    closed: Arc<Notify>,
}

impl ConnectionHandle {
    /// Creates a handle and the queue its writer drains.
    pub fn new(addr: SocketAddr) -> (Self, mpsc::UnboundedReceiver<Outbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = Self {
            addr,
            tx,
            closed: Arc::new(Notify::new()),
        };
        (handle, rx)
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Queues raw bytes for the peer. Fire-and-forget: no retry, no timeout.
    pub fn send_bytes(&self, bytes: Vec<u8>) -> Result<(), SendError> {
        debug!(
            "Sending message to client {}: {}",
            self.addr,
            String::from_utf8_lossy(&bytes).trim_end()
        );
        self.tx
            .send(Outbound::Frame(bytes))
            .map_err(|_| SendError::Closed(self.addr))
    }

    /// Serializes an envelope to its line form and queues it.
    pub fn send_message(&self, envelope: &Envelope) -> Result<(), SendError> {
        let line = envelope.to_line()?;
        self.send_bytes(line)
    }

    /// Asks the writer to shut down and the read loop to stop.
    pub fn close(&self) {
        let _ = self.tx.send(Outbound::Close);
        self.closed.notify_one();
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    fn closed_signal(&self) -> Arc<Notify> {
        Arc::clone(&self.closed)
    }
}

/// Bound listener plus what each connection needs to dispatch its messages.
pub struct Server {
    listener: TcpListener,
    game: Arc<Match>,
    dispatch: DispatchMode,
    reap_on_disconnect: bool,
}

impl Server {
    pub async fn bind(config: &ServerConfig, game: Arc<Match>) -> Result<Self, ServerError> {
        let addr = config.listen_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: addr.clone(),
                source,
            })?;
        info!("Server listening on {}", addr);

        Ok(Server {
            listener,
            game,
            dispatch: config.dispatch,
            reap_on_disconnect: config.reap_on_disconnect,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }

    /// Accepts connections forever, one reader task per connection.
    pub async fn run(self) -> Result<(), ServerError> {
        loop {
            match self.listener.accept().await {
                Ok((stream, addr)) => {
                    info!("New incoming connection from {}", addr);
                    tokio::spawn(handle_connection(
                        stream,
                        addr,
                        Arc::clone(&self.game),
                        self.dispatch,
                        self.reap_on_disconnect,
                    ));
                }
                Err(e) => {
                    error!("Error on incoming connection: {}", e);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
            }
        }
    }
}

/// Binds the configured address and serves until the process stops.
///
/// Only a bind failure is returned; per-connection errors are logged.
pub async fn listen(config: &ServerConfig, game: Arc<Match>) -> Result<(), ServerError> {
    Server::bind(config, game).await?.run().await
}

async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    game: Arc<Match>,
    dispatch: DispatchMode,
    reap_on_disconnect: bool,
) {
    let (read_half, write_half) = stream.into_split();
    let (conn, outbound) = ConnectionHandle::new(addr);
    tokio::spawn(run_writer(write_half, addr, outbound));

    let closed = conn.closed_signal();
    let mut reader = BufReader::new(read_half);
    let mut buffer = Vec::new();

    loop {
        // One byte past the limit is enough to tell an oversized line apart
        let budget = (MAX_LINE_BYTES + 1).saturating_sub(buffer.len()) as u64;
        let mut limited = (&mut reader).take(budget);

        tokio::select! {
            read = limited.read_until(b'\n', &mut buffer) => match read {
                Ok(0) => {
                    info!("Connection {} closed by peer", addr);
                    break;
                }
                Ok(_) if buffer.len() > MAX_LINE_BYTES => {
                    warn!(
                        "Closing {}: line exceeds {} bytes",
                        addr, MAX_LINE_BYTES
                    );
                    break;
                }
                Ok(_) => {
                    let payload = std::mem::take(&mut buffer);
                    debug!(
                        "Incoming message from {}: {}",
                        addr,
                        String::from_utf8_lossy(&payload).trim_end()
                    );
                    match dispatch {
                        DispatchMode::Ordered => dispatcher::handle_payload(&game, &conn, &payload),
                        DispatchMode::Concurrent => {
                            let game = Arc::clone(&game);
                            let conn = conn.clone();
                            tokio::spawn(async move {
                                dispatcher::handle_payload(&game, &conn, &payload);
                            });
                        }
                    }
                }
                Err(e) => {
                    warn!("Read error on {}: {}", addr, e);
                    break;
                }
            },
            _ = closed.notified() => {
                info!("Connection {} closed by server", addr);
                break;
            }
        }
    }

    if reap_on_disconnect {
        if let Some(id) = game.roster().lookup(None, Some(addr)) {
            info!("Reaping player {} after disconnect of {}", id, addr);
            game.remove(id);
        }
    }
    conn.close();
}

async fn run_writer(
    mut writer: OwnedWriteHalf,
    addr: SocketAddr,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
) {
    while let Some(message) = outbound.recv().await {
        match message {
            Outbound::Frame(bytes) => {
                if let Err(e) = writer.write_all(&bytes).await {
                    warn!("Failed to write to {}: {}", addr, e);
                }
            }
            Outbound::Close => break,
        }
    }

    if let Err(e) = writer.shutdown().await {
        debug!("Shutdown of {} failed: {}", addr, e);
    }
}
