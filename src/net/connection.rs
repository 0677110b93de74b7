//! Line-oriented client connection
//!
//! Every connection owns exactly one reader task. That task is the only code
//! that ever reads from the socket; it publishes each newline-terminated line
//! onto a private channel. Whichever stage currently owns the `Connection`
//! (the registrar, then the game worker) consumes lines from that channel, so
//! two logical readers can never race on the socket itself.

use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

/// Buffered lines per connection before the reader task applies backpressure
const LINE_BUFFER: usize = 32;

/// Result of a bounded read
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    /// A complete line arrived (trailing `\r` removed)
    Line(String),
    /// Nothing arrived within the limit
    TimedOut,
    /// End of stream or read failure
    Closed,
}

/// A client connection shared by the registration and gameplay stages
pub struct Connection {
    peer: String,
    lines: mpsc::Receiver<String>,
    writer: Box<dyn AsyncWrite + Send + Unpin>,
    reader_task: JoinHandle<()>,
}

impl Connection {
    /// Wrap an accepted TCP stream
    pub fn from_tcp(stream: TcpStream) -> Self {
        let peer = stream
            .peer_addr()
            .map(|addr| addr.to_string())
            .unwrap_or_else(|_| "unknown".to_string());
        let (reader, writer) = stream.into_split();
        Self::from_parts(reader, writer, peer)
    }

    /// Build a connection from any reader/writer pair (in-memory streams in tests)
    pub fn from_parts<R, W>(reader: R, writer: W, peer: impl Into<String>) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let peer = peer.into();
        let (tx, rx) = mpsc::channel(LINE_BUFFER);
        let reader_task = tokio::spawn(pump_lines(reader, tx, peer.clone()));

        Self {
            peer,
            lines: rx,
            writer: Box::new(writer),
            reader_task,
        }
    }

    /// Remote address, for logging
    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Wait for the next line; `None` means the stream has ended
    pub async fn next_line(&mut self) -> Option<String> {
        self.lines.recv().await
    }

    /// Wait at most `limit` for the next line
    pub async fn read_line_within(&mut self, limit: Duration) -> ReadOutcome {
        match tokio::time::timeout(limit, self.lines.recv()).await {
            Ok(Some(line)) => ReadOutcome::Line(line),
            Ok(None) => ReadOutcome::Closed,
            Err(_) => ReadOutcome::TimedOut,
        }
    }

    /// Send one line, appending the newline and flushing
    pub async fn send_line(&mut self, line: &str) -> std::io::Result<()> {
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await
    }

    /// Shut down the write side and stop the reader task
    pub async fn close(mut self) {
        if let Err(e) = self.writer.shutdown().await {
            debug!("Shutdown of {} failed: {}", self.peer, e);
        }
        debug!("Connection {} closed", self.peer);
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.reader_task.abort();
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection").field("peer", &self.peer).finish()
    }
}

async fn pump_lines<R>(reader: R, tx: mpsc::Sender<String>, peer: String)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let mut lines = BufReader::new(reader).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let line = line.strip_suffix('\r').unwrap_or(&line).to_string();
                trace!("{} -> {:?}", peer, line);
                if tx.send(line).await.is_err() {
                    // Connection dropped by its owner
                    break;
                }
            }
            Ok(None) => {
                debug!("{} reached end of stream", peer);
                break;
            }
            Err(e) => {
                debug!("{} read failed, treating as disconnect: {}", peer, e);
                break;
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::connection_pair;
    use super::*;

    #[tokio::test]
    async fn test_lines_are_delivered_in_order() {
        let (mut conn, mut client) = connection_pair("test");
        client.send("HELLO:ann").await;
        client.send("chance-it\r").await;

        assert_eq!(conn.next_line().await.as_deref(), Some("HELLO:ann"));
        assert_eq!(conn.next_line().await.as_deref(), Some("chance-it"));
    }

    #[tokio::test]
    async fn test_bounded_read_times_out() {
        let (mut conn, _client) = connection_pair("test");
        let outcome = conn.read_line_within(Duration::from_millis(20)).await;
        assert_eq!(outcome, ReadOutcome::TimedOut);
    }

    #[tokio::test]
    async fn test_timeout_does_not_lose_later_line() {
        let (mut conn, mut client) = connection_pair("test");
        assert_eq!(
            conn.read_line_within(Duration::from_millis(10)).await,
            ReadOutcome::TimedOut
        );
        client.send("n").await;
        assert_eq!(
            conn.read_line_within(Duration::from_secs(1)).await,
            ReadOutcome::Line("n".to_string())
        );
    }

    #[tokio::test]
    async fn test_end_of_stream_reports_closed() {
        let (mut conn, client) = connection_pair("test");
        drop(client);
        assert_eq!(
            conn.read_line_within(Duration::from_secs(1)).await,
            ReadOutcome::Closed
        );
        assert!(conn.next_line().await.is_none());
    }

    #[tokio::test]
    async fn test_send_and_close() {
        let (mut conn, mut client) = connection_pair("test");
        conn.send_line("Opponent: bob").await.unwrap();
        conn.close().await;

        assert_eq!(client.recv().await.as_deref(), Some("Opponent: bob"));
        assert_eq!(client.recv().await, None);
    }
}
