//! Drives refreshes from the target's process events

use crate::factory::RefreshReport;
use crate::TeleVm;
use std::sync::Arc;
use tele_types::Epoch;
use thiserror::Error;
use tokio::sync::mpsc::{unbounded_channel, UnboundedSender};
use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, error, error_span, trace, warn, Instrument};

/// What the process controlling the target reports
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ProcessEvent {
    /// The target stopped, starting a new epoch
    Stopped(Epoch),
    Running,
    Terminated,
}

/// The refresh loop is no longer accepting events
#[derive(Debug, Error)]
#[error("the refresh loop has stopped")]
pub struct RefreshLoopClosed;

/// Refreshes every live mirror of a VM each time the target stops.
///
/// Refreshes run on the blocking pool one at a time; the report of the latest is published on
/// a watch channel. A refresh that can't get the VM lock publishes nothing.
#[derive(Debug)]
pub struct RefreshLoop {
    events: UnboundedSender<ProcessEvent>,
    reports: watch::Receiver<Option<Arc<RefreshReport>>>,
    task: JoinHandle<()>,
}

impl RefreshLoop {
    /// Starts the loop on the current runtime
    pub fn spawn(vm: Arc<TeleVm>) -> Self {
        let (events, mut receiver) = unbounded_channel::<ProcessEvent>();
        let (reporter, reports) = watch::channel(None);
        let task = tokio::spawn(
            async move {
                while let Some(event) = receiver.recv().await {
                    match event {
                        ProcessEvent::Stopped(epoch) => {
                            let vm = vm.clone();
                            match tokio::task::spawn_blocking(move || vm.refresh(epoch)).await {
                                Ok(Ok(report)) => {
                                    reporter.send_replace(Some(Arc::new(report)));
                                }
                                Ok(Err(e)) => warn!("no report for {epoch}: {e}"),
                                Err(e) => error!("refresh for {epoch} did not complete: {e}"),
                            }
                        }
                        ProcessEvent::Running => trace!("target resumed"),
                        ProcessEvent::Terminated => {
                            debug!("target terminated");
                            break;
                        }
                    }
                }
            }
            .instrument(error_span!("refresh-loop")),
        );
        Self {
            events,
            reports,
            task,
        }
    }

    /// Hands an event to the loop
    pub fn notify(&self, event: ProcessEvent) -> Result<(), RefreshLoopClosed> {
        self.events.send(event).map_err(|_| RefreshLoopClosed)
    }

    /// Subscribes to the reports of completed refreshes
    pub fn reports(&self) -> watch::Receiver<Option<Arc<RefreshReport>>> {
        self.reports.clone()
    }

    /// The report of the latest completed refresh
    pub fn latest(&self) -> Option<Arc<RefreshReport>> {
        self.reports.borrow().clone()
    }

    /// Stops the loop once every event already sent has been handled
    pub async fn shutdown(self) -> Result<(), JoinError> {
        let _ = self.events.send(ProcessEvent::Terminated);
        self.task.await
    }
}
