//! Status poller: the pull-based recovery path.
//!
//! On a fixed interval the poller asks the backend for the
//! authoritative phase status. While the job is running it does
//! nothing — granular progress arrives over the push channel. When the
//! pull reports a terminal status, the poller synthesizes the events
//! the channel may never have delivered (late subscription, page
//! reload) and stops. A fresh session can therefore reach a correct
//! terminal state without ever seeing a push event.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::backend::{JobStatus, StatusReport};
use crate::errors::BackendError;
use crate::progress::{PhaseKind, PipelineEvent, ProgressEvent};

/// Where the poller pulls status from. `HttpBackend` implements this
/// for research; tests substitute scripted sources.
#[async_trait]
pub trait StatusSource: Send + Sync + 'static {
    async fn fetch(&self, business_id: &str) -> Result<StatusReport, BackendError>;
}

/// Handle to a running poller task.
pub struct PollerHandle {
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: JoinHandle<()>,
}

impl PollerHandle {
    /// Cancel the poll timer and wait for the task to finish.
    pub async fn stop(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        let _ = self.handle.await;
    }
}

/// Recurring status pull for one phase of one business.
pub struct StatusPoller;

impl StatusPoller {
    /// Start polling. The first pull happens immediately (initial
    /// hydration), then every `interval` until a terminal status is
    /// seen or the handle is stopped.
    pub fn spawn(
        source: Arc<dyn StatusSource>,
        business_id: &str,
        phase: PhaseKind,
        step_ids: Vec<String>,
        interval: Duration,
        tx: mpsc::UnboundedSender<PipelineEvent>,
    ) -> PollerHandle {
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let business_id = business_id.to_string();
        let handle = tokio::spawn(run(
            source,
            business_id,
            phase,
            step_ids,
            interval,
            tx,
            shutdown_rx,
        ));
        PollerHandle {
            shutdown_tx: Some(shutdown_tx),
            handle,
        }
    }
}

/// Events a terminal status report expands into, or `None` while the
/// job is still running.
///
/// `Completed` becomes a full-completion event for every step — the
/// reducer back-fill makes this idempotent against whatever the push
/// channel already delivered. `Failed` becomes one error event on the
/// last step carrying the backend's message.
pub fn terminal_events(
    phase: PhaseKind,
    step_ids: &[String],
    report: &StatusReport,
) -> Option<Vec<PipelineEvent>> {
    match report.status {
        JobStatus::Completed => Some(
            step_ids
                .iter()
                .map(|id| PipelineEvent {
                    phase,
                    event: ProgressEvent::completed(id),
                })
                .collect(),
        ),
        JobStatus::Failed => {
            let message = report
                .error
                .clone()
                .unwrap_or_else(|| format!("{phase} failed"));
            step_ids.last().map(|id| {
                vec![PipelineEvent {
                    phase,
                    event: ProgressEvent::errored(id, &message),
                }]
            })
        }
        JobStatus::Pending | JobStatus::InProgress => None,
    }
}

async fn run(
    source: Arc<dyn StatusSource>,
    business_id: String,
    phase: PhaseKind,
    step_ids: Vec<String>,
    interval: Duration,
    tx: mpsc::UnboundedSender<PipelineEvent>,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = &mut shutdown_rx => break,
            _ = ticker.tick() => {}
        }

        let report = match source.fetch(&business_id).await {
            Ok(report) => report,
            Err(e) => {
                // Transport failures stay inside the poller; the next
                // tick retries.
                warn!(%business_id, %phase, error = %e, "status poll failed");
                continue;
            }
        };

        debug!(%business_id, %phase, status = ?report.status, "status poll");

        if let Some(events) = terminal_events(phase, &step_ids, &report) {
            info!(%business_id, %phase, status = ?report.status, "terminal status pulled; synthesizing step events");
            for event in events {
                if tx.send(event).is_err() {
                    break;
                }
            }
            break;
        }
    }
    debug!(%business_id, %phase, "status poller stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    struct ScriptedSource {
        reports: Mutex<VecDeque<Result<StatusReport, BackendError>>>,
    }

    impl ScriptedSource {
        fn new(reports: Vec<Result<StatusReport, BackendError>>) -> Arc<Self> {
            Arc::new(Self {
                reports: Mutex::new(reports.into()),
            })
        }
    }

    #[async_trait]
    impl StatusSource for ScriptedSource {
        async fn fetch(&self, _business_id: &str) -> Result<StatusReport, BackendError> {
            self.reports
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Ok(StatusReport {
                    status: JobStatus::InProgress,
                    error: None,
                }))
        }
    }

    fn research_ids() -> Vec<String> {
        vec![
            "init".to_string(),
            "google".to_string(),
            "social".to_string(),
            "analysis".to_string(),
        ]
    }

    #[test]
    fn running_statuses_expand_to_nothing() {
        for status in [JobStatus::Pending, JobStatus::InProgress] {
            let report = StatusReport {
                status,
                error: None,
            };
            assert!(terminal_events(PhaseKind::Research, &research_ids(), &report).is_none());
        }
    }

    #[test]
    fn completed_status_expands_to_one_completion_per_step() {
        let report = StatusReport {
            status: JobStatus::Completed,
            error: None,
        };
        let events = terminal_events(PhaseKind::Research, &research_ids(), &report).unwrap();
        assert_eq!(events.len(), 4);
        for (event, id) in events.iter().zip(research_ids()) {
            assert_eq!(event.phase, PhaseKind::Research);
            assert_eq!(event.event.step, id);
            assert_eq!(event.event.progress, 100);
        }
    }

    #[test]
    fn failed_status_expands_to_an_error_on_the_last_step() {
        let report = StatusReport {
            status: JobStatus::Failed,
            error: Some("research agent crashed".to_string()),
        };
        let events = terminal_events(PhaseKind::Research, &research_ids(), &report).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event.step, "analysis");
        assert!(events[0].event.is_error());
        assert_eq!(
            events[0].event.message.as_deref(),
            Some("research agent crashed")
        );
    }

    #[tokio::test]
    async fn poller_retries_past_fetch_errors_and_stops_on_terminal() {
        let source = ScriptedSource::new(vec![
            Err(BackendError::Status {
                url: "http://test".to_string(),
                code: 503,
                detail: "unavailable".to_string(),
            }),
            Ok(StatusReport {
                status: JobStatus::InProgress,
                error: None,
            }),
            Ok(StatusReport {
                status: JobStatus::Completed,
                error: None,
            }),
        ]);

        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = StatusPoller::spawn(
            source,
            "b-42",
            PhaseKind::Research,
            research_ids(),
            Duration::from_millis(5),
            tx,
        );

        let mut received = Vec::new();
        while let Some(event) = rx.recv().await {
            received.push(event);
        }
        // Channel closed because the poller task ended after terminal.
        assert_eq!(received.len(), 4);
        assert!(received.iter().all(|e| e.event.progress == 100));
        handle.stop().await;
    }

    #[tokio::test]
    async fn poller_stop_cancels_the_timer() {
        let source = ScriptedSource::new(vec![]);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = StatusPoller::spawn(
            source,
            "b-42",
            PhaseKind::Research,
            research_ids(),
            Duration::from_secs(3600),
            tx,
        );
        handle.stop().await;
        // Sender side dropped by the finished task.
        assert!(rx.recv().await.is_none());
    }
}
