// UI context marshaling
//
// Every mutation of the active dialog and every dialog notification runs on the single UI
// context. Callers on other threads block until the UI loop has run their action (the engine
// needs the returned disposition before it continues). Without a UI surface actions run inline.

use log::error;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::thread::{self, ThreadId};
use std::time::Duration;
use thiserror::Error;

type Job = Box<dyn FnOnce() + Send + 'static>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MarshalError {
    #[error("UI action panicked or the UI loop dropped it before completion")]
    ActionLost,
}

#[derive(Clone)]
pub struct UiMarshal {
    target: Option<UiTarget>,
}

#[derive(Clone)]
struct UiTarget {
    thread: ThreadId,
    jobs: Sender<Job>,
}

impl std::fmt::Debug for UiMarshal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UiMarshal")
            .field("ui_thread", &self.target.as_ref().map(|t| t.thread))
            .finish()
    }
}

impl UiMarshal {
    /// Marshal for a run without any UI surface: everything executes on the caller.
    pub fn inline() -> Self {
        Self { target: None }
    }

    /// Binds the calling thread as the UI context. The returned pump must be drained by that
    /// thread's loop.
    pub fn for_current_thread() -> (Self, UiPump) {
        let (tx, rx) = mpsc::channel::<Job>();
        let marshal = Self {
            target: Some(UiTarget {
                thread: thread::current().id(),
                jobs: tx,
            }),
        };
        (marshal, UiPump { jobs: rx })
    }

    pub fn has_ui_context(&self) -> bool {
        self.target.is_some()
    }

    pub fn is_ui_context(&self) -> bool {
        match &self.target {
            Some(target) => target.thread == thread::current().id(),
            None => true,
        }
    }

    /// Runs `action` on the UI context and returns its result.
    pub fn run<R, F>(&self, action: F) -> Result<R, MarshalError>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        let target = match &self.target {
            Some(target) if target.thread != thread::current().id() => target,
            _ => return Ok(action()),
        };

        let (reply_tx, reply_rx) = mpsc::sync_channel::<R>(1);
        let job: Job = Box::new(move || {
            let _ = reply_tx.send(action());
        });

        if let Err(mpsc::SendError(job)) = target.jobs.send(job) {
            // UI loop is gone (shell closed); nothing else can touch UI state any more.
            job();
        }

        reply_rx.recv().map_err(|_| MarshalError::ActionLost)
    }
}

/// Receiving end owned by the UI loop.
pub struct UiPump {
    jobs: Receiver<Job>,
}

impl UiPump {
    /// Runs every queued action; returns how many ran.
    pub fn pump(&self) -> usize {
        let mut ran = 0;
        loop {
            match self.jobs.try_recv() {
                Ok(job) => {
                    run_guarded(job);
                    ran += 1;
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => return ran,
            }
        }
    }

    /// Waits up to `timeout` for the first action, then drains the queue.
    pub fn pump_timeout(&self, timeout: Duration) -> usize {
        match self.jobs.recv_timeout(timeout) {
            Ok(job) => {
                run_guarded(job);
                1 + self.pump()
            }
            Err(_) => 0,
        }
    }
}

fn run_guarded(job: Job) {
    if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
        error!("[PHASE: shell] [STEP: marshal] UI action panicked; caller receives a default");
    }
}
