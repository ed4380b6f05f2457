//! Bridge 수신기 - 인바운드 파일 스트림을 디렉터리에 저장
//!
//! Ctrl-C 를 받을 때까지 수신하고, 종료 시 요약을 출력한다.
//!
//! 사용법:
//!   cargo run --release --bin bridge-receive -- [OPTIONS]
//!
//! 예시:
//!   # 기본 수신
//!   cargo run --release --bin bridge-receive -- --bind 0.0.0.0:9100 --output ./incoming

use std::path::PathBuf;

use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use bridge::{BatchStats, Config, EventKind, FileEvent, FileReceiver, TcpStreamListener};

/// 수신 설정
struct ReceiveConfig {
    bind_addr: String,
    config: Config,
}

impl Default for ReceiveConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:9100".to_string(),
            config: Config::default(),
        }
    }
}

fn parse_args() -> Result<ReceiveConfig, String> {
    let args: Vec<String> = std::env::args().collect();
    let mut config = ReceiveConfig::default();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--bind" | "-b" => {
                let value = args.get(i + 1).ok_or("--bind 에 주소 필요")?;
                config.bind_addr = value.clone();
                i += 1;
            }
            "--output" | "-o" => {
                let value = args.get(i + 1).ok_or("--output 에 경로 필요")?;
                config.config.output_root = PathBuf::from(value);
                i += 1;
            }
            "--max-handlers" => {
                let value = args.get(i + 1).ok_or("--max-handlers 에 숫자 필요")?;
                let limit = value.parse().map_err(|_| format!("유효한 숫자 필요: {value}"))?;
                config.config = config.config.with_max_concurrent_handlers(limit);
                i += 1;
            }
            "--help" | "-h" => {
                println!(
                    r#"Bridge Receive - 디렉터리 트리 수신기

인바운드 스트림마다 파일 하나를 받아 저장한다.

사용법:
  cargo run --release --bin bridge-receive -- [OPTIONS]

옵션:
  -b, --bind <ADDR>       바인드 주소 (기본: 0.0.0.0:9100)
  -o, --output <DIR>      저장 디렉터리 (기본: .)
  --max-handlers <N>      동시 수신 상한, 0 = 무제한 (기본: 16)
  -h, --help              이 도움말 출력
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

fn log_event(event: &FileEvent) {
    match event.kind {
        EventKind::Start => info!("  Receiving {}", event.name),
        EventKind::Done => info!("  Received  {} ({} bytes)", event.name, event.synced_size()),
        EventKind::Failed => match &event.error {
            Some(e) => warn!("  Failed    {}: {}", event.name, e),
            None => warn!("  Failed    {}", event.name),
        },
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 로깅 설정
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let receive_config = parse_args()?;

    info!("Bridge Receive starting...");
    info!("Output: {:?}", receive_config.config.output_root);

    let listener = TcpStreamListener::bind(&receive_config.bind_addr).await?;
    info!("Listening on {}", listener.local_addr()?);

    let receiver = FileReceiver::new(listener, receive_config.config);
    let mut events = receiver
        .receive_events()
        .ok_or("이벤트 채널을 이미 가져감")?;

    let mut stats = BatchStats::new();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                log_event(&event);
                stats.record(&event);
            }
            _ = &mut ctrl_c => {
                info!("Shutting down...");
                receiver.stop();
                receiver.join().await;
                break;
            }
        }
    }

    // 진행 중이던 핸들러가 남긴 이벤트
    let in_flight = receiver.in_flight();
    if !in_flight.is_empty() {
        info!("Waiting for {} transfers in flight", in_flight.len());
    }
    while let Some(event) = events.recv().await {
        log_event(&event);
        stats.record(&event);
    }

    info!("{}", stats.summary());
    Ok(())
}
