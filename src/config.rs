//! 전송 설정

use std::path::PathBuf;

use crate::{DEFAULT_MAX_PATH_LEN, DEFAULT_WORKERS};

/// Bridge 전송 설정
#[derive(Debug, Clone)]
pub struct Config {
    /// 송신 워커 수 (동시에 열리는 스트림 상한)
    pub workers: usize,

    /// 수신측 동시 핸들러 상한
    /// 0이면 제한 없음
    pub max_concurrent_handlers: usize,

    /// 수신 이벤트 채널 버퍼 크기
    pub receiver_event_buffer: usize,

    /// 파일 복사 버퍼 크기 (바이트)
    pub copy_buffer_size: usize,

    /// 허용하는 최대 경로 길이 (바이트)
    pub max_path_len: usize,

    /// 송신할 루트 디렉터리
    pub source_root: PathBuf,

    /// 수신 파일을 저장할 루트 디렉터리
    pub output_root: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            max_concurrent_handlers: 16,
            receiver_event_buffer: 1024,
            copy_buffer_size: 64 * 1024,      // 64KB
            max_path_len: DEFAULT_MAX_PATH_LEN,
            source_root: PathBuf::from("."),
            output_root: PathBuf::from("."),
        }
    }
}

impl Config {
    /// 새 설정 생성
    pub fn new() -> Self {
        Self::default()
    }

    /// 송신 루트 지정
    pub fn with_source_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.source_root = root.into();
        self
    }

    /// 수신 루트 지정
    pub fn with_output_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.output_root = root.into();
        self
    }

    /// 워커 수 지정 (최소 1)
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// 수신 핸들러 상한 지정
    pub fn with_max_concurrent_handlers(mut self, limit: usize) -> Self {
        self.max_concurrent_handlers = limit;
        self
    }

    /// 저사양 기기용 설정
    pub fn low_spec() -> Self {
        Self {
            workers: 2,
            max_concurrent_handlers: 4,
            receiver_event_buffer: 256,
            copy_buffer_size: 16 * 1024,      // 16KB
            ..Self::default()
        }
    }

    /// 고성능 기기용 설정
    pub fn high_performance() -> Self {
        Self {
            workers: 16,
            max_concurrent_handlers: 64,
            receiver_event_buffer: 8192,
            copy_buffer_size: 256 * 1024,     // 256KB
            ..Self::default()
        }
    }
}
