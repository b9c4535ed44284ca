//! # loadpulse
//!
//! 부하 테스트 실시간 모니터링 CLI 진입점.
//! 설정 로드, 어댑터 와이어링, 모니터링 시작, 콘솔 요약 출력, 종료 처리.

mod lifecycle;
mod summary;

use anyhow::{anyhow, bail, Result};
use clap::Parser;
use loadpulse_core::config::AppConfig;
use loadpulse_core::config_manager::ConfigManager;
use loadpulse_core::error::CoreError;
use loadpulse_core::ports::push::PushConnector;
use loadpulse_core::ports::seed::SeedApi;
use loadpulse_monitor::SubscriptionCoordinator;
use loadpulse_network::connection::{ConnectionSettings, PushConnection};
use loadpulse_network::http_client::HttpSeedClient;
use loadpulse_network::ws_client::StompConnector;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::lifecycle::LifecycleManager;
use crate::summary::SummaryPrinter;

/// LOADPULSE 부하 테스트 모니터
///
/// STOMP/WebSocket으로 테스트 메트릭을 구독하고 콘솔에 요약한다.
#[derive(Parser, Debug)]
#[command(name = "loadpulse")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// 모니터링할 테스트 ID
    #[arg(required = true, value_name = "TEST_ID")]
    test_ids: Vec<String>,

    /// 대시보드 REST API URL (기본: 설정 파일)
    #[arg(long, short = 's')]
    server: Option<String>,

    /// STOMP WebSocket URL (기본: 설정 파일)
    #[arg(long)]
    ws_url: Option<String>,

    /// 설정 파일 경로 (기본: 플랫폼 설정 디렉토리의 config.json)
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// 로그 레벨 (trace, debug, info, warn, error)
    #[arg(long, short = 'l', default_value = "info")]
    log_level: String,

    /// 요약에 사용할 히스토리 윈도우 (분, 기본: 설정값)
    #[arg(long, short = 'w')]
    window: Option<u32>,

    /// 요약 출력 간격 (초)
    #[arg(long, default_value = "5")]
    print_interval: u64,

    /// CLI로 덮어쓴 설정을 설정 파일에 저장
    #[arg(long)]
    save_config: bool,
}

/// 설정 파일 열기: 파일 + 환경변수, 실패 시 None
fn open_config(path: Option<PathBuf>) -> Option<ConfigManager> {
    let manager = match path {
        Some(path) => ConfigManager::with_path(path),
        None => ConfigManager::new(),
    };
    match manager {
        Ok(manager) => {
            info!("설정 파일: {}", manager.config_path().display());
            Some(manager)
        }
        Err(e) => {
            warn!("설정 로드 실패, 기본 설정 사용: {e}");
            None
        }
    }
}

/// CLI 인자로 설정 오버라이드 후 검증
fn apply_overrides(mut config: AppConfig, args: &Args) -> Result<AppConfig, CoreError> {
    if let Some(ref server) = args.server {
        config.server.base_url = server.clone();
    }
    if let Some(ref ws_url) = args.ws_url {
        config.server.ws_url = ws_url.clone();
    }
    if let Some(window) = args.window {
        config.monitor.default_window_minutes = window;
    }
    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_filter = format!(
        "loadpulse={},loadpulse_core={},loadpulse_network={},loadpulse_monitor={}",
        args.log_level, args.log_level, args.log_level, args.log_level
    );
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log_filter)),
        )
        .init();

    info!("LOADPULSE 모니터 시작");

    let manager = open_config(args.config.clone());
    let base = manager
        .as_ref()
        .map(ConfigManager::get)
        .unwrap_or_else(AppConfig::default_config);
    let config = apply_overrides(base, &args).map_err(|e| anyhow!("설정 검증 실패: {e}"))?;

    if args.save_config {
        match &manager {
            Some(manager) => {
                manager
                    .update(config.clone())
                    .map_err(|e| anyhow!("설정 저장 실패: {e}"))?;
                info!("설정 저장: {}", manager.config_path().display());
            }
            None => warn!("설정 파일을 열 수 없어 저장하지 않음"),
        }
    }
    info!("REST: {}", config.server.base_url);
    info!("WebSocket: {}", config.server.ws_url);

    // ── 어댑터 생성 ──
    let connector: Arc<dyn PushConnector> =
        Arc::new(StompConnector::from_config(&config.transport));
    let connection = PushConnection::new(connector, ConnectionSettings::from_config(&config));
    connection.on_error(Arc::new(|e| warn!("푸시 채널: {e}")));
    info!("클라이언트 ID: {}", connection.client_id());

    let seed: Arc<dyn SeedApi> = Arc::new(HttpSeedClient::from_config(&config.server)?);
    let coordinator = Arc::new(SubscriptionCoordinator::new(
        connection,
        seed,
        config.monitor.clone(),
    ));

    // ── 라이프사이클 ──
    let lifecycle = Arc::new(LifecycleManager::new());
    let signal_lifecycle = lifecycle.clone();
    tokio::spawn(async move {
        signal_lifecycle.wait_for_signal().await;
    });

    let printer = SummaryPrinter::new(
        coordinator.view(),
        config.monitor.default_window_minutes,
        Duration::from_secs(args.print_interval.max(1)),
    );
    let printer_task = tokio::spawn(printer.run(lifecycle.clone()));

    // ── 모니터링 시작 ──
    let mut started = 0usize;
    for test_id in &args.test_ids {
        if lifecycle.is_shutting_down() {
            break;
        }
        let result = tokio::select! {
            result = coordinator.start_monitoring(test_id) => result,
            _ = lifecycle.wait_for_shutdown() => break,
        };
        match result {
            Ok(()) => {
                started += 1;
                info!("모니터링 중: {test_id}");
            }
            Err(e) => error!("모니터링 시작 실패 ({test_id}): {e}"),
        }
    }

    if started == 0 && !lifecycle.is_shutting_down() {
        coordinator.shutdown().await;
        printer_task.abort();
        bail!("모니터링을 시작한 테스트가 없습니다");
    }

    info!("LOADPULSE 실행 중 (Ctrl+C로 종료)");
    lifecycle.wait_for_shutdown().await;

    coordinator.shutdown().await;
    if let Err(e) = printer_task.await {
        if !e.is_cancelled() {
            error!("요약 출력 태스크 오류: {e}");
        }
    }

    info!("LOADPULSE 종료");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn args_parse_test_ids_and_flags() {
        let args = Args::try_parse_from([
            "loadpulse",
            "--ws-url",
            "ws://example:9000/ws",
            "--window",
            "10",
            "T1",
            "T2",
        ])
        .unwrap();
        assert_eq!(args.test_ids, vec!["T1", "T2"]);
        assert_eq!(args.print_interval, 5);
        assert_eq!(args.log_level, "info");
        assert!(!args.save_config);

        let config = apply_overrides(AppConfig::default_config(), &args).unwrap();
        assert_eq!(config.server.ws_url, "ws://example:9000/ws");
        assert_eq!(config.monitor.default_window_minutes, 10);
    }

    #[test]
    fn test_id_is_required() {
        assert!(Args::try_parse_from(["loadpulse"]).is_err());
    }

    #[test]
    fn invalid_override_is_rejected() {
        let args = Args::try_parse_from(["loadpulse", "--server", "ftp://nope", "T1"]).unwrap();
        let err = apply_overrides(AppConfig::default_config(), &args).unwrap_err();
        assert!(matches!(err, CoreError::Validation { .. }));
    }
}
