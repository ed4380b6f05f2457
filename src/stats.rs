//! 배치 전송 통계
//!
//! 이벤트 스트림을 소비하는 쪽에서 누적하는 요약 정보

use std::time::{Duration, Instant};

use crate::event::{EventKind, FileEvent};

/// 배치 단위 통계
#[derive(Debug, Clone)]
pub struct BatchStats {
    /// 시작 시간
    start_time: Instant,

    /// Start 이벤트 수
    pub started: u64,

    /// Done 이벤트 수
    pub completed: u64,

    /// Failed 이벤트 수
    pub failed: u64,

    /// 완료된 파일의 총 바이트
    pub total_bytes: u64,
}

impl BatchStats {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            started: 0,
            completed: 0,
            failed: 0,
            total_bytes: 0,
        }
    }

    /// 이벤트 하나 반영
    pub fn record(&mut self, event: &FileEvent) {
        match event.kind {
            EventKind::Start => self.started += 1,
            EventKind::Done => {
                self.completed += 1;
                self.total_bytes += event.synced_size();
            }
            EventKind::Failed => self.failed += 1,
        }
    }

    /// 종료 이벤트 수 (Done + Failed)
    pub fn terminal(&self) -> u64 {
        self.completed + self.failed
    }

    /// 경과 시간
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// 전체 처리율 (bytes/sec)
    pub fn overall_throughput(&self) -> f64 {
        let elapsed = self.elapsed().as_secs_f64();
        if elapsed == 0.0 {
            return 0.0;
        }
        self.total_bytes as f64 / elapsed
    }

    /// 통계 요약 문자열
    pub fn summary(&self) -> String {
        format!(
            "Elapsed: {:.2}s | Files: {} done, {} failed | Bytes: {} | Throughput: {:.2} MB/s",
            self.elapsed().as_secs_f64(),
            self.completed,
            self.failed,
            self.total_bytes,
            self.overall_throughput() / 1_000_000.0,
        )
    }
}

impl Default for BatchStats {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::{Tracked, Tracker};
    use crate::Error;
    use tokio::io::AsyncWriteExt;

    #[tokio::test]
    async fn test_record_counts_bytes_on_done() {
        let tracker = Tracker::new();
        let mut sink = Tracked::new(Vec::new(), tracker.clone());
        sink.write_all(&[0u8; 1500]).await.unwrap();

        let mut stats = BatchStats::new();
        stats.record(&FileEvent::start("a/x", tracker.clone()));
        stats.record(&FileEvent::done("a/x", tracker));
        stats.record(&FileEvent::failed("a/y", Error::ChannelError));

        assert_eq!(stats.started, 1);
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.terminal(), 2);
        assert_eq!(stats.total_bytes, 1500);
        assert!(stats.summary().contains("1 done, 1 failed"));
    }
}
