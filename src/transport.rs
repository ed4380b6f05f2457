//! 스트림 전송 계층 추상화
//!
//! 코어는 구체적인 전송 방식을 모르고 두 가지 능력만 사용한다.
//! - StreamOpener: 피어로 새 스트림 열기 (송신측)
//! - StreamListener: 인바운드 스트림 받기 (수신측)

use std::fmt;
use std::future::Future;
use std::io;

use tokio::io::{AsyncRead, AsyncWrite};

/// 전송 계층이 제공하는 피어 식별자
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Peer {
    pub id: String,
}

impl Peer {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

impl fmt::Display for Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}

/// 파일 하나를 실어 나르는 양방향 바이트 스트림
///
/// 정상 종료는 `AsyncWriteExt::shutdown`, 에러 경로는 `reset`.
pub trait ByteStream: AsyncRead + AsyncWrite + Unpin + Send + 'static {
    /// 손실을 감수하는 비정상 종료. 상대는 정상 EOF 를 보지 않아야 한다.
    fn reset(self)
    where
        Self: Sized,
    {
        drop(self);
    }
}

impl ByteStream for tokio::io::DuplexStream {}

/// 피어로 스트림을 여는 능력
pub trait StreamOpener: Send + Sync + 'static {
    type Stream: ByteStream;

    fn open_stream(&self, peer: &Peer) -> impl Future<Output = io::Result<Self::Stream>> + Send;
}

/// 인바운드 스트림을 받는 능력
pub trait StreamListener: Send + 'static {
    type Stream: ByteStream;

    /// 다음 인바운드 스트림. 전송 계층이 닫히면 None
    fn accept(&mut self) -> impl Future<Output = Option<Self::Stream>> + Send;
}
