//! 수신자
//!
//! - 생성 즉시 인바운드 스트림 수락 시작
//! - 스트림마다 핸들러 태스크 하나, 세마포어로 동시 실행 수 제한
//! - 헤더 디코딩 → 디렉터리 생성 → 파일 생성 → 내용 복사

use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, Notify, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::event::{EventReceiver, FileEvent};
use crate::frame;
use crate::tracker::{Tracked, Tracker};
use crate::transport::{ByteStream, StreamListener};
use crate::{Config, Error};

/// 핸들러들이 공유하는 상태
struct HandlerContext {
    output_root: PathBuf,
    max_path_len: usize,
    copy_buffer_size: usize,
    events: mpsc::Sender<FileEvent>,
    in_flight: Arc<DashMap<String, Tracker>>,
}

impl HandlerContext {
    async fn emit(&self, event: FileEvent) {
        if self.events.send(event).await.is_err() {
            debug!("이벤트 수신자가 닫힘");
        }
    }

    /// 인바운드 스트림 하나 처리
    async fn handle<S: ByteStream>(&self, mut stream: S) {
        let path = match frame::read_header(&mut stream, self.max_path_len).await {
            Ok(p) => p,
            Err(e) => {
                warn!("프레임 헤더 디코딩 실패: {}", e);
                stream.reset();
                self.emit(FileEvent::failed("", e.into())).await;
                return;
            }
        };

        let (dir, file_name) = match frame::split_target(&path) {
            Ok((dir, file_name)) => (self.output_root.join(dir), file_name.to_string()),
            Err(e) => {
                warn!("대상 경로 거부 {}: {}", path, e);
                stream.reset();
                self.emit(FileEvent::failed(path, e.into())).await;
                return;
            }
        };

        if let Err(source) = tokio::fs::create_dir_all(&dir).await {
            warn!("디렉터리 생성 실패 {:?}: {}", dir, source);
            stream.reset();
            // 디렉터리 실패는 마지막 경로 조각 이름으로 보고
            self.emit(FileEvent::failed(file_name, Error::LocalFile { path: dir, source }))
                .await;
            return;
        }

        let target = self.output_root.join(&path);
        let created = File::create(&target).await;

        // 생성 결과와 무관하게 Start 먼저, 종료 이벤트는 항상 그 뒤
        let tracker = Tracker::new();
        self.emit(FileEvent::start(&path, tracker.clone())).await;

        let file = match created {
            Ok(f) => f,
            Err(source) => {
                warn!("파일 생성 실패 {:?}: {}", target, source);
                stream.reset();
                self.emit(FileEvent::failed(path, Error::LocalFile { path: target, source }))
                    .await;
                return;
            }
        };

        self.in_flight.insert(path.clone(), tracker.clone());

        let mut writer = Tracked::new(file, tracker.clone());
        let result: io::Result<()> = async {
            let mut reader = BufReader::with_capacity(self.copy_buffer_size, &mut stream);
            tokio::io::copy_buf(&mut reader, &mut writer).await?;
            writer.flush().await
        }
        .await;
        drop(writer);

        self.in_flight.remove(&path);

        match result {
            Ok(()) => {
                debug!("수신 완료: {} ({} bytes)", path, tracker.synced_size());
                self.emit(FileEvent::done(path, tracker)).await;
            }
            Err(e) => {
                warn!("수신 중 실패 {}: {}", path, e);
                stream.reset();
                if let Err(rm) = tokio::fs::remove_file(&target).await {
                    debug!("부분 파일 삭제 실패 {:?}: {}", target, rm);
                }
                self.emit(FileEvent::failed(path, Error::Copy(e))).await;
            }
        }
    }
}

/// 수락 루프: 정지 신호나 전송 계층 종료까지 스트림을 받아 핸들러 생성
async fn accept_loop<L: StreamListener>(
    mut listener: L,
    ctx: Arc<HandlerContext>,
    limit: Option<Arc<Semaphore>>,
    running: Arc<AtomicBool>,
    shutdown: Arc<Notify>,
) {
    loop {
        let stream = tokio::select! {
            _ = shutdown.notified() => break,
            accepted = listener.accept() => match accepted {
                Some(s) => s,
                None => {
                    info!("전송 계층이 닫힘, 수신 종료");
                    break;
                }
            },
        };

        // 상한에 도달하면 다음 스트림을 받지 않고 대기
        let permit = match &limit {
            Some(semaphore) => tokio::select! {
                _ = shutdown.notified() => {
                    stream.reset();
                    break;
                }
                acquired = semaphore.clone().acquire_owned() => match acquired {
                    Ok(p) => Some(p),
                    Err(_) => break,
                },
            },
            None => None,
        };

        let ctx = ctx.clone();
        tokio::spawn(async move {
            ctx.handle(stream).await;
            drop(permit);
        });
    }

    running.store(false, Ordering::SeqCst);
    debug!("수락 루프 종료");
}

/// 디렉터리 트리 수신자
pub struct FileReceiver {
    /// 이벤트 수신측 (한 번만 꺼낼 수 있음)
    event_rx: Mutex<Option<EventReceiver>>,

    /// 수신 중인 파일의 진행률
    in_flight: Arc<DashMap<String, Tracker>>,

    /// 실행 중 플래그
    running: Arc<AtomicBool>,

    /// 정지 신호
    shutdown: Arc<Notify>,

    /// 수락 루프 태스크
    accept_task: Mutex<Option<JoinHandle<()>>>,
}

impl FileReceiver {
    /// 수신자 생성 및 수락 시작
    ///
    /// tokio 런타임 안에서 호출해야 한다.
    pub fn new<L: StreamListener>(listener: L, config: Config) -> Self {
        let (event_tx, event_rx) = mpsc::channel(config.receiver_event_buffer.max(1));
        let in_flight = Arc::new(DashMap::new());
        let running = Arc::new(AtomicBool::new(true));
        let shutdown = Arc::new(Notify::new());

        let limit = (config.max_concurrent_handlers > 0)
            .then(|| Arc::new(Semaphore::new(config.max_concurrent_handlers)));

        let ctx = Arc::new(HandlerContext {
            output_root: config.output_root.clone(),
            max_path_len: config.max_path_len,
            copy_buffer_size: config.copy_buffer_size,
            events: event_tx,
            in_flight: in_flight.clone(),
        });

        info!(
            "수신 시작: {:?} (동시 핸들러 상한 {})",
            config.output_root, config.max_concurrent_handlers
        );

        let accept_task = tokio::spawn(accept_loop(
            listener,
            ctx,
            limit,
            running.clone(),
            shutdown.clone(),
        ));

        Self {
            event_rx: Mutex::new(Some(event_rx)),
            in_flight,
            running,
            shutdown,
            accept_task: Mutex::new(Some(accept_task)),
        }
    }

    /// 이벤트 채널 꺼내기 (최초 1회만 Some)
    ///
    /// 정지 후 진행 중이던 핸들러가 모두 끝나면 채널이 닫힌다.
    pub fn receive_events(&self) -> Option<EventReceiver> {
        self.event_rx.lock().take()
    }

    /// 수락 중단. 진행 중인 핸들러는 스스로 끝날 때까지 계속된다.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.shutdown.notify_one();
    }

    /// 수락 루프 종료 대기
    pub async fn join(&self) {
        let handle = self.accept_task.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!("수락 루프 비정상 종료: {}", e);
            }
        }
    }

    /// 실행 중 여부
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// 수신 중인 파일과 현재까지 쓴 바이트
    pub fn in_flight(&self) -> Vec<(String, u64)> {
        self.in_flight
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().synced_size()))
            .collect()
    }
}

impl Drop for FileReceiver {
    fn drop(&mut self) {
        self.shutdown.notify_one();
    }
}
