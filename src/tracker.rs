//! 진행률 추적
//!
//! - Tracker: 공유 원자 카운터 (쓰기 1, 읽기 N)
//! - Tracked: 읽기/쓰기 스트림을 감싸 실제로 이동한 바이트만 카운트

use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

/// 누적 바이트 카운터 핸들
#[derive(Debug, Clone, Default)]
pub struct Tracker {
    synced: Arc<AtomicU64>,
}

impl Tracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// 지금까지 이동한 바이트 수
    pub fn synced_size(&self) -> u64 {
        self.synced.load(Ordering::Acquire)
    }

    fn add(&self, n: usize) {
        if n > 0 {
            self.synced.fetch_add(n as u64, Ordering::AcqRel);
        }
    }
}

/// 바이트 카운팅 스트림 래퍼
#[derive(Debug)]
pub struct Tracked<S> {
    inner: S,
    tracker: Tracker,
}

impl<S> Tracked<S> {
    pub fn new(inner: S, tracker: Tracker) -> Self {
        Self { inner, tracker }
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S: AsyncRead + Unpin> AsyncRead for Tracked<S> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let before = buf.filled().len();

        let result = Pin::new(&mut this.inner).poll_read(cx, buf);
        if let Poll::Ready(Ok(())) = result {
            this.tracker.add(buf.filled().len() - before);
        }
        result
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for Tracked<S> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();

        let result = Pin::new(&mut this.inner).poll_write(cx, buf);
        if let Poll::Ready(Ok(n)) = result {
            this.tracker.add(n);
        }
        result
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }
}
