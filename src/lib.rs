//! # Bridge
//!
//! 스트림 하나당 파일 하나로 디렉터리 트리를 전송하는 엔진
//!
//! ## 핵심 특징
//! - **프레임**: 4바이트 LE 길이 + UTF-8 상대 경로 + 스트림 끝까지의 파일 내용
//! - **송신 워커 풀**: 최대 N개의 스트림만 동시에 열림
//! - **수신 핸들러**: 인바운드 스트림마다 핸들러, 세마포어로 상한 지정
//! - **이벤트**: 파일마다 Start → Done/Failed 순서 보장
//! - **진행률**: 원자 카운터 기반 Tracker, 어느 스레드에서든 조회 가능
//! - **전송 계층 분리**: StreamOpener / StreamListener 트레이트만 의존

pub mod config;
pub mod enumerate;
pub mod error;
pub mod event;
pub mod frame;
pub mod loopback;
pub mod receiver;
pub mod sender;
pub mod stats;
pub mod tcp;
pub mod tracker;
pub mod transport;

pub use config::Config;
pub use enumerate::{enumerate, FileDescriptor};
pub use error::{Error, FrameError, Result};
pub use event::{EventKind, EventReceiver, FileEvent};
pub use loopback::{loopback, LoopbackListener, LoopbackOpener, LoopbackStream};
pub use receiver::FileReceiver;
pub use sender::FileSender;
pub use stats::BatchStats;
pub use tcp::{TcpOpener, TcpStreamListener};
pub use tracker::{Tracked, Tracker};
pub use transport::{ByteStream, Peer, StreamListener, StreamOpener};

/// 길이 접두사 크기 (바이트, little-endian u32)
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// 기본 송신 워커 수
pub const DEFAULT_WORKERS: usize = 5;

/// 기본 최대 경로 길이 (바이트)
pub const DEFAULT_MAX_PATH_LEN: usize = 4096;
