//! 콘솔 요약 출력.
//!
//! 주기마다 테스트별 한 줄 요약을 출력하고, 연결 상태/에러/테스트 상태 변경을 즉시 알린다.
//! 모니터링 중인 테스트가 모두 끝나면 종료 신호를 보낸다.

use loadpulse_monitor::{MonitorEvent, MonitorView, TestSnapshot};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::lifecycle::LifecycleManager;

/// 요약 출력기
pub struct SummaryPrinter {
    view: MonitorView,
    window_minutes: u32,
    interval: Duration,
}

impl SummaryPrinter {
    pub fn new(view: MonitorView, window_minutes: u32, interval: Duration) -> Self {
        Self {
            view,
            window_minutes,
            interval,
        }
    }

    /// 현재 모니터링 중인 테스트의 요약 줄
    pub fn render(&self) -> Vec<String> {
        self.view
            .monitored_tests()
            .iter()
            .filter_map(|id| self.view.snapshot(id))
            .map(|snapshot| {
                let windowed = self
                    .view
                    .metrics_history(&snapshot.test_id, Some(self.window_minutes))
                    .len();
                format_summary(&snapshot, self.window_minutes, windowed)
            })
            .collect()
    }

    /// 종료 신호 또는 모든 테스트 종료까지 출력
    pub async fn run(self, lifecycle: Arc<LifecycleManager>) {
        let mut shutdown = lifecycle.subscribe();
        let mut events = self.view.subscribe();
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut seen_any = !self.view.monitored_tests().is_empty();

        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = ticker.tick() => {
                    for line in self.render() {
                        println!("{line}");
                    }
                }
                event = events.recv() => match event {
                    Ok(MonitorEvent::ConnectionChanged(status)) => println!("[연결] {status}"),
                    Ok(MonitorEvent::ErrorChanged(Some(err))) => eprintln!("[에러] {err}"),
                    Ok(MonitorEvent::StatusChanged { test_id, status }) => {
                        println!("[{test_id}] 상태: {status}");
                    }
                    Ok(MonitorEvent::PhaseChanged { .. }) => {
                        if !self.view.monitored_tests().is_empty() {
                            seen_any = true;
                        } else if seen_any {
                            info!("모든 테스트 모니터링 종료");
                            lifecycle.shutdown();
                            break;
                        }
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => debug!("이벤트 {skipped}개 건너뜀"),
                    Err(RecvError::Closed) => break,
                },
            }
        }
    }
}

/// 테스트 한 줄 요약
pub fn format_summary(snapshot: &TestSnapshot, window_minutes: u32, windowed: usize) -> String {
    let status = snapshot
        .status
        .as_ref()
        .map(|s| format!("{} {:.0}%", s.status, s.progress))
        .unwrap_or_else(|| "-".to_string());

    let metrics = match &snapshot.current {
        Some(m) => format!(
            "tps {:.1} | avg {:.1}ms p95 {:.1}ms | users {} | err {:.2}%",
            m.tps,
            m.avg_response_time,
            m.p95_response_time,
            m.active_users,
            m.error_rate() * 100.0
        ),
        None => "메트릭 없음".to_string(),
    };

    format!(
        "[{}] {} | {} | {} | history {} ({}m: {})",
        snapshot.test_id,
        snapshot.phase,
        status,
        metrics,
        snapshot.history.len(),
        window_minutes,
        windowed
    )
}
