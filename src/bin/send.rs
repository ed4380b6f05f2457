//! Bridge 송신기 - 현재 디렉터리 트리를 피어로 전송
//!
//! 파일마다 TCP 연결 하나를 열고 최대 N개까지 동시에 전송한다.
//!
//! 사용법:
//!   cargo run --release --bin bridge-send -- --peer <ADDR> [OPTIONS]
//!
//! 예시:
//!   # 현재 디렉터리 전송
//!   cargo run --release --bin bridge-send -- --peer 192.168.0.10:9100
//!
//!   # 특정 디렉터리, 워커 8개
//!   cargo run --release --bin bridge-send -- -p 192.168.0.10:9100 -r ./photos -w 8

use std::path::PathBuf;
use std::time::Duration;

use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use bridge::{BatchStats, Config, EventKind, FileSender, Peer, TcpOpener};

/// 송신 설정
struct SendConfig {
    peer: Option<String>,
    nodelay: bool,
    config: Config,
}

impl Default for SendConfig {
    fn default() -> Self {
        Self {
            peer: None,
            nodelay: false,
            config: Config::default(),
        }
    }
}

fn parse_args() -> Result<SendConfig, String> {
    let args: Vec<String> = std::env::args().collect();
    let mut config = SendConfig::default();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--peer" | "-p" => {
                let value = args.get(i + 1).ok_or("--peer 에 주소 필요")?;
                config.peer = Some(value.clone());
                i += 1;
            }
            "--root" | "-r" => {
                let value = args.get(i + 1).ok_or("--root 에 경로 필요")?;
                config.config.source_root = PathBuf::from(value);
                i += 1;
            }
            "--workers" | "-w" => {
                let value = args.get(i + 1).ok_or("--workers 에 숫자 필요")?;
                let workers = value.parse().map_err(|_| format!("유효한 숫자 필요: {value}"))?;
                config.config = config.config.with_workers(workers);
                i += 1;
            }
            "--nodelay" => {
                config.nodelay = true;
            }
            "--help" | "-h" => {
                println!(
                    r#"Bridge Send - 디렉터리 트리 송신기

파일마다 스트림 하나로 디렉터리 트리를 전송한다.

사용법:
  cargo run --release --bin bridge-send -- --peer <ADDR> [OPTIONS]

옵션:
  -p, --peer <ADDR>      수신기 주소 host:port (필수)
  -r, --root <DIR>       전송할 디렉터리 (기본: .)
  -w, --workers <N>      동시 스트림 수 (기본: 5)
  --nodelay              TCP_NODELAY 사용
  -h, --help             이 도움말 출력
"#
                );
                std::process::exit(0);
            }
            other => {
                return Err(format!("알 수 없는 옵션: {other}"));
            }
        }
        i += 1;
    }

    Ok(config)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 로깅 설정
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let send_config = parse_args()?;
    let peer = Peer::new(send_config.peer.ok_or("--peer 가 필요함 (--help 참고)")?);

    info!("Bridge Send starting...");
    info!("Peer: {}", peer);
    info!("Root: {:?}", send_config.config.source_root);
    info!("Workers: {}", send_config.config.workers);

    let opener = TcpOpener::new().with_nodelay(send_config.nodelay);
    let sender = FileSender::new(peer, opener, send_config.config)?;
    let total_files = sender.files().len();
    let total_bytes: u64 = sender.files().iter().map(|f| f.size).sum();
    info!("Files: {} ({} bytes)", total_files, total_bytes);

    let mut events = sender
        .receive_events()
        .ok_or("이벤트 채널을 이미 가져감")?;
    sender.start()?;

    let mut stats = BatchStats::new();
    let mut ticker = tokio::time::interval(Duration::from_secs(1));
    ticker.tick().await;

    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                match event.kind {
                    EventKind::Start => info!("  Sending {}", event.name),
                    EventKind::Done => info!("  Sent    {} ({} bytes)", event.name, event.synced_size()),
                    EventKind::Failed => match &event.error {
                        Some(e) => warn!("  Failed  {}: {}", event.name, e),
                        None => warn!("  Failed  {}", event.name),
                    },
                }
                stats.record(&event);
            }
            _ = ticker.tick() => {
                for (name, synced) in sender.in_flight() {
                    info!("  ...     {} {} bytes", name, synced);
                }
                info!(
                    "Progress: {}/{} files",
                    stats.terminal(),
                    total_files
                );
            }
        }
    }

    sender.wait().await;
    info!("{}", stats.summary());

    if stats.failed > 0 {
        std::process::exit(1);
    }
    Ok(())
}
