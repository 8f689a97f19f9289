//! Background export jobs
//!
//! An export runs on its own thread and reports through a channel so the
//! interactive loop never blocks on the render.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{unbounded, Receiver, TryRecvError};
use uuid::Uuid;

use super::{render_with_id, CancellationToken, RenderReport, RenderRequest, RenderStrategy};
use crate::error::{Result, WorthyError};

/// Messages sent from an export thread
#[derive(Debug)]
pub enum RenderEvent {
    /// New progress percentage (0..=100, non-decreasing)
    Progress(f64),
    Finished(RenderReport),
    /// The export failed or was cancelled (`WorthyError::Cancelled`)
    Failed(WorthyError),
}

impl RenderEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RenderEvent::Progress(_))
    }
}

/// Handle to a running export
pub struct ExportJob {
    id: Uuid,
    events: Receiver<RenderEvent>,
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
    finished: bool,
}

impl ExportJob {
    /// Start rendering `request` on a worker thread
    pub fn spawn(strategy: Arc<dyn RenderStrategy>, request: RenderRequest) -> Self {
        let id = Uuid::new_v4();
        let (tx, events) = unbounded();
        let cancel = CancellationToken::new();
        let worker_cancel = cancel.clone();

        let handle = thread::Builder::new()
            .name(format!("worthy-export-{}", id))
            .spawn(move || {
                let progress_tx = tx.clone();
                let mut on_progress = |p: f64| {
                    let _ = progress_tx.send(RenderEvent::Progress(p));
                };
                let event = match render_with_id(
                    strategy.as_ref(),
                    &request,
                    id,
                    &mut on_progress,
                    &worker_cancel,
                ) {
                    Ok(report) => RenderEvent::Finished(report),
                    Err(e) => RenderEvent::Failed(e),
                };
                let _ = tx.send(event);
            })
            .ok();

        Self {
            id,
            events,
            cancel,
            handle,
            finished: false,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Request cancellation; the worker stops at its next checkpoint
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// A terminal event has been received
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Drain pending events without blocking
    pub fn poll(&mut self) -> Vec<RenderEvent> {
        let mut out = Vec::new();
        loop {
            match self.events.try_recv() {
                Ok(event) => {
                    self.finished |= event.is_terminal();
                    out.push(event);
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    // The worker always sends a terminal event before exiting
                    if !self.finished {
                        self.finished = true;
                        let message = if self.handle.is_none() {
                            "export worker could not start"
                        } else {
                            "export worker stopped unexpectedly"
                        };
                        out.push(RenderEvent::Failed(WorthyError::render(message)));
                    }
                    break;
                }
            }
        }
        out
    }

    /// Block until the job ends, forwarding progress to `on_progress`
    pub fn wait(mut self, mut on_progress: impl FnMut(f64)) -> Result<RenderReport> {
        let outcome = loop {
            match self.events.recv() {
                Ok(RenderEvent::Progress(p)) => on_progress(p),
                Ok(RenderEvent::Finished(report)) => break Ok(report),
                Ok(RenderEvent::Failed(e)) => break Err(e),
                Err(_) => break Err(WorthyError::render("export worker stopped unexpectedly")),
            }
        };
        self.finished = true;
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
        outcome
    }
}

impl std::fmt::Debug for ExportJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExportJob")
            .field("id", &self.id)
            .field("finished", &self.finished)
            .finish()
    }
}
