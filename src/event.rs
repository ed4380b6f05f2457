//! 파일 이벤트 정의
//!
//! 송신자/수신자가 외부(표시 계층)에 노출하는 유일한 계약.
//! 같은 파일의 이벤트는 Start → Done/Failed 순서를 지키고,
//! 서로 다른 파일의 이벤트는 자유롭게 섞인다.

use tokio::sync::mpsc;

use crate::{Error, Tracker};

/// 이벤트 수신 채널 타입
pub type EventReceiver = mpsc::Receiver<FileEvent>;

/// 이벤트 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// 파일 전송 시작
    Start,

    /// 전송 성공 (종료 이벤트)
    Done,

    /// 전송 실패 (종료 이벤트)
    Failed,
}

/// 파일 단위 수명 주기 이벤트
#[derive(Debug)]
pub struct FileEvent {
    pub kind: EventKind,

    /// 와이어 경로 (디코딩 전 실패면 빈 문자열)
    pub name: String,

    /// Start/Done 에 붙는 진행률 핸들
    pub tracker: Option<Tracker>,

    /// Failed 원인
    pub error: Option<Error>,
}

impl FileEvent {
    pub fn start(name: impl Into<String>, tracker: Tracker) -> Self {
        Self {
            kind: EventKind::Start,
            name: name.into(),
            tracker: Some(tracker),
            error: None,
        }
    }

    pub fn done(name: impl Into<String>, tracker: Tracker) -> Self {
        Self {
            kind: EventKind::Done,
            name: name.into(),
            tracker: Some(tracker),
            error: None,
        }
    }

    pub fn failed(name: impl Into<String>, error: Error) -> Self {
        Self {
            kind: EventKind::Failed,
            name: name.into(),
            tracker: None,
            error: Some(error),
        }
    }

    /// 종료 이벤트(Done/Failed) 여부
    pub fn is_terminal(&self) -> bool {
        matches!(self.kind, EventKind::Done | EventKind::Failed)
    }

    /// 현재까지 이동한 바이트 (트래커 없으면 0)
    pub fn synced_size(&self) -> u64 {
        self.tracker.as_ref().map(Tracker::synced_size).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_kinds() {
        let tracker = Tracker::new();
        assert!(!FileEvent::start("a/b", tracker.clone()).is_terminal());
        assert!(FileEvent::done("a/b", tracker).is_terminal());
        assert!(FileEvent::failed("a/b", Error::ChannelError).is_terminal());
    }

    #[test]
    fn test_failed_has_no_tracker() {
        let event = FileEvent::failed("", Error::ChannelError);
        assert_eq!(event.synced_size(), 0);
        assert!(event.error.is_some());
    }
}
