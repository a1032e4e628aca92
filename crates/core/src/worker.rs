//! Background worker owning the controller.
//!
//! The caller keeps a responsive handle: it submits runs, polls the status
//! board and cancels, while every run executes on one dedicated thread.

use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::cancel::CancellationToken;
use crate::controller::{PipelineController, RunOutcome, RunRequest};
use crate::error::{PipelineError, Result};
use crate::progress::{StatusBoard, StatusSnapshot};

enum Job {
    Run {
        request: RunRequest,
        cancel: CancellationToken,
        reply: Sender<Result<RunOutcome>>,
    },
    Shutdown,
}

pub struct PipelineWorker {
    jobs: Sender<Job>,
    board: StatusBoard,
    busy: Arc<AtomicBool>,
    active: Mutex<Option<CancellationToken>>,
    handle: Option<JoinHandle<()>>,
}

impl PipelineWorker {
    pub fn spawn(controller: PipelineController) -> Result<Self> {
        let board = controller.status_board();
        let busy = Arc::new(AtomicBool::new(false));
        let (jobs, rx) = unbounded();

        let worker_busy = busy.clone();
        let handle = thread::Builder::new()
            .name("scansort-pipeline".into())
            .spawn(move || worker_loop(controller, rx, worker_busy))
            .map_err(|e| PipelineError::Worker(e.to_string()))?;

        Ok(Self {
            jobs,
            board,
            busy,
            active: Mutex::new(None),
            handle: Some(handle),
        })
    }

    /// Queue a run. Rejected without side effects when the request is
    /// incomplete or another run is still active.
    pub fn submit(&self, request: RunRequest) -> Result<RunTicket> {
        request.validate()?;
        if self
            .busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(PipelineError::Precondition("a run is already active".into()));
        }

        let cancel = CancellationToken::new();
        let (reply, result) = bounded(1);
        let job = Job::Run {
            request,
            cancel: cancel.clone(),
            reply,
        };
        if self.jobs.send(job).is_err() {
            self.busy.store(false, Ordering::SeqCst);
            return Err(PipelineError::Worker("pipeline thread has exited".into()));
        }

        self.set_active(Some(cancel.clone()));
        Ok(RunTicket { cancel, result })
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    /// Stop the active run, if any.
    pub fn cancel(&self) {
        if let Some(token) = self.active_token() {
            token.cancel();
        }
    }

    pub fn status(&self) -> StatusSnapshot {
        self.board.snapshot()
    }

    pub fn status_board(&self) -> StatusBoard {
        self.board.clone()
    }

    fn set_active(&self, token: Option<CancellationToken>) {
        match self.active.lock() {
            Ok(mut guard) => *guard = token,
            Err(poisoned) => *poisoned.into_inner() = token,
        }
    }

    fn active_token(&self) -> Option<CancellationToken> {
        match self.active.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl Drop for PipelineWorker {
    fn drop(&mut self) {
        if self.is_busy() {
            log::info!("[Worker] shutting down; stopping active run");
            self.cancel();
        }
        if self.jobs.send(Job::Shutdown).is_err() {
            log::debug!("[Worker] pipeline thread already gone");
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("[Worker] pipeline thread panicked");
            }
        }
    }
}

/// Clears the busy flag even if a run unwinds.
struct BusyGuard(Arc<AtomicBool>);

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

fn worker_loop(mut controller: PipelineController, jobs: Receiver<Job>, busy: Arc<AtomicBool>) {
    log::debug!("[Worker] pipeline thread started");
    for job in jobs.iter() {
        match job {
            Job::Run {
                request,
                cancel,
                reply,
            } => {
                let guard = BusyGuard(busy.clone());
                let result = controller.run(&request, &cancel);
                drop(guard);
                if reply.send(result).is_err() {
                    log::debug!("[Worker] run finished after its ticket was dropped");
                }
            }
            Job::Shutdown => break,
        }
    }
    log::debug!("[Worker] pipeline thread exiting");
}

/// Handle to one submitted run.
pub struct RunTicket {
    cancel: CancellationToken,
    result: Receiver<Result<RunOutcome>>,
}

impl RunTicket {
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// `None` while the run is still going. Yields the result once.
    pub fn try_result(&self) -> Option<Result<RunOutcome>> {
        match self.result.try_recv() {
            Ok(result) => Some(result),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Err(lost_result())),
        }
    }

    pub fn wait_timeout(&self, timeout: Duration) -> Option<Result<RunOutcome>> {
        match self.result.recv_timeout(timeout) {
            Ok(result) => Some(result),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => Some(Err(lost_result())),
        }
    }

    pub fn wait(self) -> Result<RunOutcome> {
        self.result.recv().map_err(|_| lost_result())?
    }
}

fn lost_result() -> PipelineError {
    PipelineError::Worker("pipeline thread exited without a result".into())
}
