//! TCP binding for text streams.
//!
//! [`TcpChannel`] opens one connection per round: connect, write one frame,
//! read one verdict line, close.  [`TcpReceiver`] binds once, accepts every
//! connection, and serves the rounds arriving on each one in order, all
//! against a single [`SharedReceiver`].  It keeps accepting for a linger
//! period after the final batch so a resend of the last round, whose `RR`
//! was lost or late, is re-acknowledged.  Frame layout lives in
//! [`crate::frame`]; this module owns only byte I/O.
//!
//! A connection-level failure (refused, reset, garbage reply) is a
//! [`TransportError`] and ends the transfer; only an expired deadline is
//! retried.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use tokio::time::{sleep, timeout};

use crate::channel::{Channel, Outcome};
use crate::error::TransportError;
use crate::frame::{self, Header, Transmission, Verdict, HEADER_LEN};
use crate::gbn_receiver::{GbnReceiver, SharedReceiver};

// ---------------------------------------------------------------------------
// Sender side
// ---------------------------------------------------------------------------

/// Sender-side channel to a [`TcpReceiver`] at `peer`.
#[derive(Debug, Clone)]
pub struct TcpChannel {
    peer: SocketAddr,
}

impl TcpChannel {
    pub fn new(peer: SocketAddr) -> Self {
        Self { peer }
    }
}

impl Channel<char> for TcpChannel {
    async fn transmit(
        &mut self,
        tx: Transmission<char>,
        deadline: Duration,
    ) -> Result<Outcome, TransportError> {
        let bytes = frame::encode(&tx)?;
        match timeout(deadline, round_trip(self.peer, &bytes)).await {
            Ok(Ok(verdict)) => Ok(Outcome::Verdict(verdict)),
            Ok(Err(e)) => Err(e),
            Err(_elapsed) => {
                // Dropping the round-trip future closes the connection.
                log::debug!("[tcp] round {} attempt {} timed out", tx.counter, tx.attempt);
                Ok(Outcome::TimedOut)
            }
        }
    }
}

async fn round_trip(peer: SocketAddr, bytes: &[u8]) -> Result<Verdict, TransportError> {
    let mut stream = TcpStream::connect(peer).await?;
    stream.write_all(bytes).await?;

    let mut reader = BufReader::new(stream);
    let mut line = String::new();
    if reader.read_line(&mut line).await? == 0 {
        return Err(TransportError::Closed);
    }
    Ok(line.parse::<Verdict>()?)
}

// ---------------------------------------------------------------------------
// Receiver side
// ---------------------------------------------------------------------------

/// How long a receiver keeps accepting after the final batch, by default.
pub const DEFAULT_LINGER: Duration = Duration::from_secs(2);

/// A listening receiver.
#[derive(Debug)]
pub struct TcpReceiver {
    /// Address actually bound (after the OS assigns an ephemeral port).
    pub local_addr: SocketAddr,
    listener: TcpListener,
    receiver: SharedReceiver<char>,
    linger: Duration,
}

impl TcpReceiver {
    /// Bind to `addr`; passing port 0 lets the OS choose.
    pub async fn bind(addr: SocketAddr, receiver: GbnReceiver<char>) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        log::info!("Receiver listening on {local_addr}");
        Ok(Self {
            local_addr,
            listener,
            receiver: SharedReceiver::new(receiver),
            linger: DEFAULT_LINGER,
        })
    }

    /// Keep accepting for `linger` after the final batch is accepted.
    /// Should cover at least one sender timeout.
    pub fn with_linger(mut self, linger: Duration) -> Self {
        self.linger = linger;
        self
    }

    /// Handle to the receiver state (for inspection while serving).
    pub fn receiver(&self) -> SharedReceiver<char> {
        self.receiver.clone()
    }

    /// Accept connections until the final batch has been accepted and the
    /// linger period has passed, then wait for open connections to close and
    /// return the message.
    pub async fn serve(self) -> Result<Vec<char>, TransportError> {
        let mut connections = JoinSet::new();

        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    let (stream, addr) = accepted?;
                    log::debug!("[tcp] connection from {addr}");
                    connections.spawn(handle_connection(stream, self.receiver.clone()));
                }
                _ = self.receiver.completed() => break,
            }
        }

        log::debug!("[tcp] final batch accepted; lingering for {:?}", self.linger);
        let linger = sleep(self.linger);
        tokio::pin!(linger);
        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    let (stream, addr) = accepted?;
                    log::debug!("[tcp] late connection from {addr}");
                    connections.spawn(handle_connection(stream, self.receiver.clone()));
                }
                _ = &mut linger => break,
            }
        }

        while let Some(joined) = connections.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(e)) => log::warn!("[tcp] connection ended with error: {e}"),
                Err(e) => log::warn!("[tcp] connection task failed: {e}"),
            }
        }

        Ok(self.receiver.message())
    }
}

/// Serve rounds on one connection until the peer closes it.
async fn handle_connection(
    stream: TcpStream,
    receiver: SharedReceiver<char>,
) -> Result<(), TransportError> {
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);

    loop {
        let mut head = [0u8; HEADER_LEN];
        match reader.read_exact(&mut head).await {
            Ok(_) => {}
            Err(e) if is_closed(&e) => return Ok(()),
            Err(e) => return Err(e.into()),
        }
        let header = Header::decode(&head);
        let mut payload = vec![0u8; header.payload_len as usize];
        reader.read_exact(&mut payload).await?;
        let tx = frame::decode_payload(header, &payload)?;

        match receiver.serve(tx).await {
            Some(verdict) => {
                let reply = format!("{}\n", verdict.token());
                if let Err(e) = write_half.write_all(reply.as_bytes()).await {
                    if is_closed(&e) {
                        return Ok(());
                    }
                    return Err(e.into());
                }
            }
            None => log::debug!(
                "[tcp] no verdict for round {} attempt {}",
                header.counter,
                header.attempt
            ),
        }
    }
}

fn is_closed(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::UnexpectedEof
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::BrokenPipe
    )
}
