//! 에러 타입 정의

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Bridge 전송 에러 타입
#[derive(Error, Debug)]
pub enum Error {
    #[error("디렉터리 열거 실패: {path:?}: {source}")]
    Enumeration {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("스트림 열기 실패: {0}")]
    StreamOpen(#[source] io::Error),

    #[error("프레임 헤더 쓰기 실패: {0}")]
    FrameWrite(#[source] io::Error),

    #[error("프레임 디코딩 실패: {0}")]
    FrameDecode(#[from] FrameError),

    #[error("로컬 파일 에러: {path:?}: {source}")]
    LocalFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("파일 내용 복사 실패: {0}")]
    Copy(#[source] io::Error),

    #[error("이미 시작된 전송")]
    AlreadyStarted,

    #[error("채널 에러")]
    ChannelError,
}

/// 프레임 헤더 인코딩/디코딩 에러
#[derive(Error, Debug)]
pub enum FrameError {
    #[error("길이 접두사 읽기 부족: {0}")]
    ShortLength(#[source] io::Error),

    #[error("경로 바이트 읽기 부족: expected {expected} bytes: {source}")]
    ShortPath {
        expected: usize,
        #[source]
        source: io::Error,
    },

    #[error("경로 길이 초과: {len} > {max}")]
    PathTooLong { len: usize, max: usize },

    #[error("UTF-8 이 아닌 경로")]
    InvalidUtf8,

    #[error("디렉터리 구분자가 없는 경로: {0}")]
    MissingSeparator(String),

    #[error("허용되지 않는 경로: {0}")]
    UnsafePath(String),
}

/// Result 타입 별칭
pub type Result<T> = std::result::Result<T, Error>;
