// Engine <-> shell adapter
//
// Nothing may unwind back into the engine: it treats an unhandled fault as a fatal abort of the
// whole install. Every engine-facing entry point is guarded and degrades to the default
// disposition.

use crate::engine::EngineEventSink;
use crate::models::message::{EngineMessage, MessageResult};
use crate::shell::ShellController;
use log::error;
use std::panic::{self, AssertUnwindSafe};

#[derive(Clone)]
pub struct EngineBridge {
    shell: ShellController,
}

impl EngineBridge {
    pub fn new(shell: ShellController) -> Self {
        Self { shell }
    }

    pub fn shell(&self) -> &ShellController {
        &self.shell
    }

    /// UI side: begin executing the install script.
    pub fn request_start(&self) {
        self.shell.start();
    }

    /// UI side: ask the engine to abort.
    pub fn request_cancel(&self) {
        self.shell.cancel();
    }

    fn guarded<R>(&self, step: &str, fallback: R, f: impl FnOnce() -> R) -> R {
        match panic::catch_unwind(AssertUnwindSafe(f)) {
            Ok(value) => value,
            Err(payload) => {
                let reason = panic_reason(payload.as_ref());
                error!(
                    "[PHASE: engine] [STEP: {}] Shell fault contained at engine boundary: {}",
                    step, reason
                );
                self.shell
                    .log()
                    .append(format!("Fault in {}: {}", step, reason));
                fallback
            }
        }
    }
}

impl EngineEventSink for EngineBridge {
    fn on_message(&self, message: EngineMessage) -> MessageResult {
        self.guarded("on_message", MessageResult::Ok, || {
            self.shell.process_message(message)
        })
    }

    fn on_execute_started(&self) {
        self.guarded("on_execute_started", (), || self.shell.on_execute_started())
    }

    fn on_execute_complete(&self) {
        self.guarded("on_execute_complete", (), || {
            self.shell.on_execute_complete()
        })
    }

    fn on_progress(&self, percent: i32) {
        let percent = percent.clamp(0, 100) as u8;
        self.guarded("on_progress", (), || self.shell.on_progress(percent))
    }
}

pub(crate) fn panic_reason(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
