//! 프로세스 내부 전송 계층
//!
//! `tokio::io::duplex` 쌍으로 스트림을 만들고, 한쪽은 여는 쪽에 반환하고
//! 다른 쪽은 리스너 채널로 넘긴다. reset 은 상대에게 ConnectionReset 으로 보인다.

use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, DuplexStream, ReadBuf};
use tokio::sync::mpsc;

use crate::transport::{ByteStream, Peer, StreamListener, StreamOpener};

/// 연결된 opener/listener 쌍 생성
///
/// `max_buf_size` 는 스트림 방향별 내부 버퍼 크기.
pub fn loopback(max_buf_size: usize) -> (LoopbackOpener, LoopbackListener) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        LoopbackOpener { tx, max_buf_size },
        LoopbackListener { rx },
    )
}

/// duplex 스트림 한쪽 끝
#[derive(Debug)]
pub struct LoopbackStream {
    inner: DuplexStream,
    reset: Arc<AtomicBool>,
}

impl LoopbackStream {
    fn pair(max_buf_size: usize) -> (Self, Self) {
        let (a, b) = tokio::io::duplex(max_buf_size);
        let reset = Arc::new(AtomicBool::new(false));
        (
            Self {
                inner: a,
                reset: reset.clone(),
            },
            Self { inner: b, reset },
        )
    }
}

impl AsyncRead for LoopbackStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let before = buf.filled().len();

        match Pin::new(&mut this.inner).poll_read(cx, buf) {
            // EOF 인데 상대가 reset 했으면 정상 종료가 아님
            Poll::Ready(Ok(()))
                if buf.filled().len() == before
                    && buf.remaining() > 0
                    && this.reset.load(Ordering::Acquire) =>
            {
                Poll::Ready(Err(io::Error::new(
                    io::ErrorKind::ConnectionReset,
                    "스트림이 리셋됨",
                )))
            }
            other => other,
        }
    }
}

impl AsyncWrite for LoopbackStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.get_mut().inner).poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }
}

impl ByteStream for LoopbackStream {
    fn reset(self) {
        self.reset.store(true, Ordering::Release);
    }
}

/// 루프백 스트림 opener (피어 식별자는 무시)
#[derive(Debug, Clone)]
pub struct LoopbackOpener {
    tx: mpsc::UnboundedSender<LoopbackStream>,
    max_buf_size: usize,
}

impl StreamOpener for LoopbackOpener {
    type Stream = LoopbackStream;

    async fn open_stream(&self, _peer: &Peer) -> io::Result<LoopbackStream> {
        let (local, remote) = LoopbackStream::pair(self.max_buf_size);
        self.tx.send(remote).map_err(|_| {
            io::Error::new(io::ErrorKind::ConnectionRefused, "루프백 리스너가 닫힘")
        })?;
        Ok(local)
    }
}

/// 루프백 인바운드 스트림 리스너
#[derive(Debug)]
pub struct LoopbackListener {
    rx: mpsc::UnboundedReceiver<LoopbackStream>,
}

impl StreamListener for LoopbackListener {
    type Stream = LoopbackStream;

    async fn accept(&mut self) -> Option<LoopbackStream> {
        self.rx.recv().await
    }
}
