//! TCP 전송 계층
//!
//! 파일 스트림 하나당 TCP 연결 하나. `Peer.id` 는 `host:port`.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, warn};

use crate::transport::{ByteStream, Peer, StreamListener, StreamOpener};

impl ByteStream for TcpStream {
    /// SO_LINGER=0 으로 닫아 상대에게 RST 를 보낸다
    #[allow(deprecated)]
    fn reset(self) {
        if let Err(e) = self.set_linger(Some(Duration::ZERO)) {
            debug!("SO_LINGER 설정 실패: {}", e);
        }
    }
}

/// TCP 스트림 opener
#[derive(Debug, Clone, Default)]
pub struct TcpOpener {
    nodelay: bool,
}

impl TcpOpener {
    pub fn new() -> Self {
        Self::default()
    }

    /// TCP_NODELAY 설정
    pub fn with_nodelay(mut self, nodelay: bool) -> Self {
        self.nodelay = nodelay;
        self
    }
}

impl StreamOpener for TcpOpener {
    type Stream = TcpStream;

    async fn open_stream(&self, peer: &Peer) -> io::Result<TcpStream> {
        let stream = TcpStream::connect(peer.id.as_str()).await?;
        if self.nodelay {
            stream.set_nodelay(true)?;
        }
        Ok(stream)
    }
}

/// TCP 인바운드 스트림 리스너
#[derive(Debug)]
pub struct TcpStreamListener {
    listener: TcpListener,
}

impl TcpStreamListener {
    pub async fn bind(addr: &str) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self { listener })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }
}

impl StreamListener for TcpStreamListener {
    type Stream = TcpStream;

    async fn accept(&mut self) -> Option<TcpStream> {
        loop {
            match self.listener.accept().await {
                Ok((stream, addr)) => {
                    debug!("인바운드 스트림: {}", addr);
                    return Some(stream);
                }
                Err(e) => {
                    // 개별 연결 실패는 리스너를 닫지 않음
                    warn!("연결 수락 실패: {}", e);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
            }
        }
    }
}
