//! Connection acceptor shared by the registrar pool
//!
//! Every recycled registrar worker accepts its next client from the same
//! listener, so the number of in-flight registrations is bounded by the pool.

use crate::error::Result;
use crate::net::connection::Connection;
use anyhow::Context;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::{debug, info};

/// Listening endpoint for game clients
pub struct Acceptor {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl Acceptor {
    /// Bind the game listener
    pub async fn bind(addr: &str) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind game listener on {}", addr))?;
        let local_addr = listener.local_addr()?;
        info!("Game listener bound on {}", local_addr);
        Ok(Self {
            listener,
            local_addr,
        })
    }

    /// Address actually bound (resolves port 0)
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Wait for the next client
    pub async fn accept(&self) -> std::io::Result<Connection> {
        let (stream, addr) = self.listener.accept().await?;
        if let Err(e) = stream.set_nodelay(true) {
            debug!("Failed to set TCP_NODELAY for {}: {}", addr, e);
        }
        debug!("Accepted connection from {}", addr);
        Ok(Connection::from_tcp(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::net::TcpStream;

    #[tokio::test]
    async fn test_accept_reads_lines_over_tcp() {
        let acceptor = Acceptor::bind("127.0.0.1:0").await.unwrap();
        let addr = acceptor.local_addr();

        let client = tokio::spawn(async move {
            let mut stream = TcpStream::connect(addr).await.unwrap();
            stream.write_all(b"HELLO:tcp\r\n").await.unwrap();
            let mut lines = BufReader::new(stream).lines();
            lines.next_line().await.unwrap()
        });

        let mut conn = acceptor.accept().await.unwrap();
        assert_eq!(conn.next_line().await.as_deref(), Some("HELLO:tcp"));
        conn.send_line("ack").await.unwrap();

        assert_eq!(client.await.unwrap().as_deref(), Some("ack"));
    }
}
