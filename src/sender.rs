//! 송신자
//!
//! - 배치 시작 전에 디렉터리 전체를 한 번 열거
//! - 고정 크기 워커 풀이 미리 채워진 작업 큐를 비움
//! - 파일마다 스트림 하나: 헤더 → 파일 내용 → 정상 종료

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crossbeam_channel::Receiver as JobReceiver;
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::event::{EventReceiver, FileEvent};
use crate::frame;
use crate::tracker::{Tracked, Tracker};
use crate::transport::{ByteStream, Peer, StreamOpener};
use crate::{enumerate, Config, Error, FileDescriptor, Result};

/// 파일 하나를 처리하는 워커
struct Worker<O: StreamOpener> {
    id: usize,
    opener: Arc<O>,
    peer: Peer,
    events: mpsc::Sender<FileEvent>,
    in_flight: Arc<DashMap<String, Tracker>>,
    copy_buffer_size: usize,
}

impl<O: StreamOpener> Worker<O> {
    async fn run(self, jobs: JobReceiver<FileDescriptor>) {
        // 큐는 미리 채워진 뒤 닫혀 있으므로 try_recv 로 충분
        while let Ok(fd) = jobs.try_recv() {
            let event = self.transfer(&fd).await;
            self.emit(event).await;
        }
        debug!("워커 {} 종료", self.id);
    }

    /// 파일 하나 전송 후 종료 이벤트 반환
    async fn transfer(&self, fd: &FileDescriptor) -> FileEvent {
        let mut stream = match self.opener.open_stream(&self.peer).await {
            Ok(s) => s,
            Err(e) => {
                warn!("스트림 열기 실패 {}: {}", fd.name, e);
                return FileEvent::failed(&fd.name, Error::StreamOpen(e));
            }
        };

        let header = match frame::encode(fd) {
            Ok(h) => h,
            Err(e) => {
                stream.reset();
                let e = io::Error::new(io::ErrorKind::InvalidInput, e);
                return FileEvent::failed(&fd.name, Error::FrameWrite(e));
            }
        };

        if let Err(e) = stream.write_all(&header).await {
            warn!("헤더 쓰기 실패 {}: {}", fd.name, e);
            stream.reset();
            return FileEvent::failed(&fd.name, Error::FrameWrite(e));
        }

        let file = match File::open(&fd.absolute_path).await {
            Ok(f) => f,
            Err(source) => {
                warn!("로컬 파일 열기 실패 {:?}: {}", fd.absolute_path, source);
                stream.reset();
                return FileEvent::failed(
                    &fd.name,
                    Error::LocalFile {
                        path: fd.absolute_path.clone(),
                        source,
                    },
                );
            }
        };

        let tracker = Tracker::new();
        self.in_flight.insert(fd.name.clone(), tracker.clone());
        self.emit(FileEvent::start(&fd.name, tracker.clone())).await;

        let mut reader = BufReader::with_capacity(
            self.copy_buffer_size,
            Tracked::new(file, tracker.clone()),
        );
        let result: io::Result<()> = async {
            tokio::io::copy_buf(&mut reader, &mut stream).await?;
            stream.shutdown().await
        }
        .await;

        self.in_flight.remove(&fd.name);

        match result {
            Ok(()) => {
                debug!(
                    "워커 {} 전송 완료: {} ({} bytes)",
                    self.id,
                    fd.name,
                    tracker.synced_size()
                );
                FileEvent::done(&fd.name, tracker)
            }
            Err(e) => {
                warn!("전송 중 실패 {}: {}", fd.name, e);
                stream.reset();
                FileEvent::failed(&fd.name, Error::Copy(e))
            }
        }
    }

    async fn emit(&self, event: FileEvent) {
        if self.events.send(event).await.is_err() {
            debug!("이벤트 수신자가 닫힘");
        }
    }
}

/// 디렉터리 트리 송신자
pub struct FileSender<O: StreamOpener> {
    /// 설정
    config: Config,

    /// 스트림 opener
    opener: Arc<O>,

    /// 대상 피어
    peer: Peer,

    /// 열거된 배치 (불변)
    files: Arc<Vec<FileDescriptor>>,

    /// start 전까지 보관하는 이벤트 송신측
    event_tx: Mutex<Option<mpsc::Sender<FileEvent>>>,

    /// 이벤트 수신측 (한 번만 꺼낼 수 있음)
    event_rx: Mutex<Option<EventReceiver>>,

    /// 전송 중인 파일의 진행률
    in_flight: Arc<DashMap<String, Tracker>>,

    /// 워커 태스크
    workers: Mutex<Vec<JoinHandle<()>>>,

    /// 시작 여부
    started: AtomicBool,
}

impl<O: StreamOpener> FileSender<O> {
    /// `config.source_root` 를 열거해 송신자 생성
    pub fn new(peer: Peer, opener: O, config: Config) -> Result<Self> {
        let files = enumerate(&config.source_root)?;
        Ok(Self::with_files(peer, opener, config, files))
    }

    /// 이미 열거된 파일 목록으로 송신자 생성
    pub fn with_files(peer: Peer, opener: O, config: Config, files: Vec<FileDescriptor>) -> Self {
        // 파일당 Start + 종료 이벤트 2개, 워커는 절대 막히지 않음
        let (event_tx, event_rx) = mpsc::channel((files.len() * 2).max(1));

        Self {
            config,
            opener: Arc::new(opener),
            peer,
            files: Arc::new(files),
            event_tx: Mutex::new(Some(event_tx)),
            event_rx: Mutex::new(Some(event_rx)),
            in_flight: Arc::new(DashMap::new()),
            workers: Mutex::new(Vec::new()),
            started: AtomicBool::new(false),
        }
    }

    /// 워커 풀을 띄우고 즉시 반환
    ///
    /// tokio 런타임 안에서 호출해야 한다.
    pub fn start(&self) -> Result<()> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(Error::AlreadyStarted);
        }

        let events = self.event_tx.lock().take().ok_or(Error::ChannelError)?;

        let (job_tx, job_rx) = crossbeam_channel::bounded(self.files.len().max(1));
        for fd in self.files.iter() {
            job_tx.send(fd.clone()).map_err(|_| Error::ChannelError)?;
        }
        drop(job_tx);

        let worker_count = self.config.workers.max(1);
        info!(
            "{} 로 파일 {}개 전송 시작 (워커 {})",
            self.peer,
            self.files.len(),
            worker_count
        );

        let mut handles = self.workers.lock();
        for id in 0..worker_count {
            let worker = Worker {
                id,
                opener: self.opener.clone(),
                peer: self.peer.clone(),
                events: events.clone(),
                in_flight: self.in_flight.clone(),
                copy_buffer_size: self.config.copy_buffer_size,
            };
            handles.push(tokio::spawn(worker.run(job_rx.clone())));
        }

        Ok(())
    }

    /// 이벤트 채널 꺼내기 (최초 1회만 Some)
    ///
    /// 모든 워커가 끝나면 채널이 닫힌다.
    pub fn receive_events(&self) -> Option<EventReceiver> {
        self.event_rx.lock().take()
    }

    /// 모든 워커 종료 대기
    pub async fn wait(&self) {
        let handles: Vec<_> = self.workers.lock().drain(..).collect();
        for handle in handles {
            if let Err(e) = handle.await {
                warn!("워커 태스크 비정상 종료: {}", e);
            }
        }
    }

    /// 배치 파일 목록
    pub fn files(&self) -> &[FileDescriptor] {
        &self.files
    }

    /// 전송 중인 파일과 현재까지 보낸 바이트
    pub fn in_flight(&self) -> Vec<(String, u64)> {
        self.in_flight
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().synced_size()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventKind;
    use crate::loopback::{loopback, LoopbackListener, LoopbackOpener, LoopbackStream};
    use crate::transport::StreamListener;
    use std::collections::HashMap;
    use std::fs;
    use std::sync::atomic::AtomicUsize;
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use std::time::Duration;
    use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, DuplexStream, ReadBuf};

    async fn collect(mut events: EventReceiver) -> Vec<FileEvent> {
        let mut all = Vec::new();
        while let Some(event) = events.recv().await {
            all.push(event);
        }
        all
    }

    /// 스트림마다 끝까지 읽어서 버림
    fn drain_all(mut listener: LoopbackListener) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(mut stream) = listener.accept().await {
                tokio::spawn(async move {
                    let mut sink = Vec::new();
                    let _ = stream.read_to_end(&mut sink).await;
                });
            }
        })
    }

    fn by_name(events: &[FileEvent]) -> HashMap<String, Vec<EventKind>> {
        let mut map: HashMap<String, Vec<EventKind>> = HashMap::new();
        for event in events {
            map.entry(event.name.clone()).or_default().push(event.kind);
        }
        map
    }

    struct RefusingOpener;

    impl StreamOpener for RefusingOpener {
        type Stream = LoopbackStream;

        async fn open_stream(&self, _peer: &Peer) -> io::Result<LoopbackStream> {
            Err(io::Error::new(io::ErrorKind::ConnectionRefused, "refused"))
        }
    }

    /// 동시에 진행 중인 open_stream 호출 수를 기록
    struct CountingOpener {
        inner: LoopbackOpener,
        current: Arc<AtomicUsize>,
        peak: Arc<AtomicUsize>,
    }

    impl StreamOpener for CountingOpener {
        type Stream = LoopbackStream;

        async fn open_stream(&self, peer: &Peer) -> io::Result<LoopbackStream> {
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(2)).await;
            self.current.fetch_sub(1, Ordering::SeqCst);
            self.inner.open_stream(peer).await
        }
    }

    /// 상대편이 이미 닫힌 스트림을 돌려줌
    struct ClosedPeerOpener;

    impl StreamOpener for ClosedPeerOpener {
        type Stream = DuplexStream;

        async fn open_stream(&self, _peer: &Peer) -> io::Result<DuplexStream> {
            let (local, remote) = tokio::io::duplex(64);
            drop(remote);
            Ok(local)
        }
    }

    /// `limit` 바이트까지만 받고 이후 쓰기는 실패하는 스트림
    struct BrokenAfter {
        written: usize,
        limit: usize,
        reset: Arc<AtomicBool>,
    }

    impl AsyncRead for BrokenAfter {
        fn poll_read(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    impl AsyncWrite for BrokenAfter {
        fn poll_write(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            let this = self.get_mut();
            let room = this.limit - this.written;
            if room == 0 {
                return Poll::Ready(Err(io::Error::new(io::ErrorKind::ConnectionAborted, "끊김")));
            }
            let n = room.min(buf.len());
            this.written += n;
            Poll::Ready(Ok(n))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    impl ByteStream for BrokenAfter {
        fn reset(self) {
            self.reset.store(true, Ordering::SeqCst);
        }
    }

    struct BrokenAfterOpener {
        limit: usize,
        reset: Arc<AtomicBool>,
    }

    impl StreamOpener for BrokenAfterOpener {
        type Stream = BrokenAfter;

        async fn open_stream(&self, _peer: &Peer) -> io::Result<BrokenAfter> {
            Ok(BrokenAfter {
                written: 0,
                limit: self.limit,
                reset: self.reset.clone(),
            })
        }
    }

    #[tokio::test]
    async fn test_single_file_wire_bytes() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("a");
        fs::create_dir(&root).unwrap();
        fs::write(root.join("b.txt"), b"xyz").unwrap();

        let (opener, mut listener) = loopback(1024);
        let config = Config::new().with_source_root(&root);
        let sender = FileSender::new(Peer::new("peer"), opener, config).unwrap();
        let events = sender.receive_events().unwrap();
        sender.start().unwrap();

        let mut stream = listener.accept().await.unwrap();
        let mut wire = Vec::new();
        stream.read_to_end(&mut wire).await.unwrap();

        let mut expected = vec![0x07, 0, 0, 0];
        expected.extend_from_slice(b"a/b.txt");
        expected.extend_from_slice(b"xyz");
        assert_eq!(wire, expected);

        let events = collect(events).await;
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].kind, EventKind::Start);
        assert_eq!(events[1].kind, EventKind::Done);
        assert_eq!(events[1].name, "a/b.txt");
        assert_eq!(events[1].synced_size(), 3);
    }

    #[tokio::test]
    async fn test_stream_open_failure_emits_only_failed() {
        let files: Vec<FileDescriptor> = (0..3)
            .map(|i| FileDescriptor {
                absolute_path: format!("/nonexistent/{i}").into(),
                name: format!("./{i}"),
                size: 0,
                is_regular: true,
            })
            .collect();

        let sender = FileSender::with_files(Peer::new("p"), RefusingOpener, Config::new(), files);
        let events = sender.receive_events().unwrap();
        sender.start().unwrap();

        let events = collect(events).await;
        assert_eq!(events.len(), 3);
        for event in &events {
            assert_eq!(event.kind, EventKind::Failed);
            assert!(matches!(event.error, Some(Error::StreamOpen(_))));
            assert!(event.tracker.is_none());
        }
        assert_eq!(by_name(&events).len(), 3);
    }

    #[tokio::test]
    async fn test_header_write_failure_emits_only_failed() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("a");
        fs::create_dir(&root).unwrap();
        fs::write(root.join("f"), b"payload").unwrap();

        let sender = FileSender::new(
            Peer::new("p"),
            ClosedPeerOpener,
            Config::new().with_source_root(&root),
        )
        .unwrap();
        let events = sender.receive_events().unwrap();
        sender.start().unwrap();

        let events = collect(events).await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, EventKind::Failed);
        assert_eq!(events[0].name, "a/f");
        assert!(matches!(events[0].error, Some(Error::FrameWrite(_))));
    }

    #[tokio::test]
    async fn test_copy_failure_resets_stream_after_start() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("a");
        fs::create_dir(&root).unwrap();
        fs::write(root.join("big"), vec![7u8; 256 * 1024]).unwrap();

        let reset = Arc::new(AtomicBool::new(false));
        let opener = BrokenAfterOpener {
            limit: 1024,
            reset: reset.clone(),
        };
        let sender = FileSender::new(Peer::new("p"), opener, Config::new().with_source_root(&root))
            .unwrap();
        let events = sender.receive_events().unwrap();
        sender.start().unwrap();

        let events = collect(events).await;
        let kinds: Vec<EventKind> = events.iter().map(|e| e.kind).collect();
        assert_eq!(kinds, vec![EventKind::Start, EventKind::Failed]);
        assert!(matches!(events[1].error, Some(Error::Copy(_))));
        assert!(reset.load(Ordering::SeqCst));
        assert!(sender.in_flight().is_empty());
    }

    #[tokio::test]
    async fn test_pool_bounds_concurrent_opens() {
        let tmp = tempfile::tempdir().unwrap();
        for i in 0..100 {
            fs::write(tmp.path().join(format!("f{i:03}")), vec![i as u8; 64]).unwrap();
        }

        let (inner, listener) = loopback(4096);
        let drain = drain_all(listener);
        let peak = Arc::new(AtomicUsize::new(0));
        let opener = CountingOpener {
            inner,
            current: Arc::new(AtomicUsize::new(0)),
            peak: peak.clone(),
        };

        let config = Config::new().with_source_root(tmp.path());
        let sender = FileSender::new(Peer::new("p"), opener, config).unwrap();
        let events = sender.receive_events().unwrap();
        sender.start().unwrap();

        let events = collect(events).await;
        sender.wait().await;
        drain.abort();

        assert!(peak.load(Ordering::SeqCst) <= 5);
        let done = events.iter().filter(|e| e.kind == EventKind::Done).count();
        assert_eq!(done, 100);
    }

    #[tokio::test]
    async fn test_exactly_one_terminal_event_per_file() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("src");
        fs::create_dir_all(root.join("sub")).unwrap();
        fs::write(root.join("keep1"), b"one").unwrap();
        fs::write(root.join("sub/keep2"), b"two").unwrap();
        fs::write(root.join("gone"), b"three").unwrap();

        let (opener, listener) = loopback(1024);
        let drain = drain_all(listener);
        let config = Config::new().with_source_root(&root).with_workers(2);
        let sender = FileSender::new(Peer::new("p"), opener, config).unwrap();
        assert_eq!(sender.files().len(), 3);

        // 열거 이후 사라진 파일
        fs::remove_file(root.join("gone")).unwrap();

        let events = sender.receive_events().unwrap();
        sender.start().unwrap();
        let events = collect(events).await;
        drain.abort();

        let kinds = by_name(&events);
        assert_eq!(kinds.len(), 3);
        assert_eq!(kinds["src/gone"], vec![EventKind::Failed]);
        assert_eq!(kinds["src/keep1"], vec![EventKind::Start, EventKind::Done]);
        assert_eq!(kinds["src/sub/keep2"], vec![EventKind::Start, EventKind::Done]);

        let gone = events.iter().find(|e| e.name == "src/gone").unwrap();
        assert!(matches!(gone.error, Some(Error::LocalFile { .. })));
    }

    #[tokio::test]
    async fn test_start_twice_is_rejected() {
        let sender = FileSender::with_files(Peer::new("p"), RefusingOpener, Config::new(), vec![]);
        sender.start().unwrap();
        assert!(matches!(sender.start(), Err(Error::AlreadyStarted)));

        // 빈 배치는 즉시 채널이 닫힘
        let events = collect(sender.receive_events().unwrap()).await;
        assert!(events.is_empty());
    }
}
