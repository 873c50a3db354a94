// Shell controller
//
// Owns one run of the installer UI: which dialog is active, the run-state latches, progress
// aggregation and the dispatch of engine messages. `ShellController` is a cheap handle; clones
// share the run. Dialog state is only touched on the UI context (see `marshal`), the engine
// context only reads the latches and hands messages over.

pub mod dialog;
pub mod localize;
pub mod marshal;
pub mod progress;
pub mod run_log;
pub mod sequence;
pub mod surface;

use crate::config::ShellConfig;
use crate::engine::bridge::panic_reason;
use crate::engine::{
    ActionResult, ClientEvent, InstallerEngine, INSTALL_END_ERROR, INSTALL_END_USER_CANCEL,
    RUNTIME_DATA_SLOT,
};
use crate::models::message::{EngineMessage, InstallMessage, MessageRecord, MessageResult};
use crate::models::runtime_data::RuntimeData;
use crate::models::state::{RunState, ShellPhase};
use dialog::{
    DefaultMessageDialog, DialogCommand, DialogFactory, DialogView, ManagedDialog,
    MessageHandler, MountContext,
};
use localize::localize_text;
use log::{debug, error, info, warn};
use marshal::UiMarshal;
use progress::ProgressAccumulator;
use run_log::RunLog;
use sequence::{DialogId, DialogSequence, ManagedDialogs, RunMode};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, TryLockError};
use std::time::Duration;
use surface::{ShellSurface, Size};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("{0} record carries no status field")]
    MissingStatus(InstallMessage),
    #[error("fault while interpreting {kind} message: {reason}")]
    Fault { kind: InstallMessage, reason: String },
}

fn lock<T: ?Sized>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

type SharedDialog = Arc<Mutex<Box<dyn ManagedDialog>>>;
type SharedHandler = Arc<Mutex<Box<dyn MessageHandler>>>;
type DeferredCall = Box<dyn FnOnce(&mut dyn ManagedDialog, &ShellController) + Send>;

struct ActiveDialog {
    id: DialogId,
    title: String,
    dialog: SharedDialog,
}

struct ShellState {
    cursor: isize,
    active: Option<ActiveDialog>,
    user_interrupted: bool,
    error_detected: bool,
    custom_error_text: Option<String>,
    errors: Vec<String>,
    ui_culture: Option<u32>,
}

impl ShellState {
    fn new() -> Self {
        Self {
            cursor: -1,
            active: None,
            user_interrupted: false,
            error_detected: false,
            custom_error_text: None,
            errors: Vec::new(),
            ui_culture: None,
        }
    }
}

struct ShellInner {
    run_id: Uuid,
    engine: Arc<dyn InstallerEngine>,
    factory: Arc<dyn DialogFactory>,
    sequence: DialogSequence,
    mode: RunMode,
    surface: Option<Arc<dyn ShellSurface>>,
    marshal: UiMarshal,
    config: ShellConfig,
    log: RunLog,
    demo_mode: bool,

    started: AtomicBool,
    canceled: AtomicBool,
    finished: AtomicBool,
    finished_lock: Mutex<()>,
    finished_signal: Condvar,

    progress: Mutex<ProgressAccumulator>,
    state: Mutex<ShellState>,
    data: Mutex<RuntimeData>,
    message_handler: Mutex<SharedHandler>,
    deferred: Mutex<Vec<DeferredCall>>,
}

#[derive(Debug, Clone, Copy)]
enum NavTarget {
    Offset(isize),
    Index(isize),
    Last,
}

pub struct ShellBuilder {
    engine: Arc<dyn InstallerEngine>,
    factory: Arc<dyn DialogFactory>,
    dialogs: ManagedDialogs,
    surface: Option<(Arc<dyn ShellSurface>, UiMarshal)>,
    config: ShellConfig,
    log: RunLog,
    demo_mode: bool,
    message_handler: Box<dyn MessageHandler>,
}

impl ShellBuilder {
    pub fn dialogs(mut self, dialogs: ManagedDialogs) -> Self {
        self.dialogs = dialogs;
        self
    }

    /// Display surface plus the marshal bound to the thread that will run its loop.
    pub fn surface(mut self, surface: Arc<dyn ShellSurface>, marshal: UiMarshal) -> Self {
        self.surface = Some((surface, marshal));
        self
    }

    pub fn config(mut self, config: ShellConfig) -> Self {
        self.config = config;
        self
    }

    pub fn log(mut self, log: RunLog) -> Self {
        self.log = log;
        self
    }

    /// In demo mode `start` never reaches the engine; execution completes immediately.
    pub fn demo_mode(mut self, demo: bool) -> Self {
        self.demo_mode = demo;
        self
    }

    pub fn message_handler(mut self, handler: Box<dyn MessageHandler>) -> Self {
        self.message_handler = handler;
        self
    }

    pub fn build(self) -> ShellController {
        let is_installing = self.engine.is_installing();
        let is_repairing = self.engine.is_repairing();
        let sequence = DialogSequence::for_mode(&self.dialogs, is_installing, is_repairing);

        // No dialogs means nothing to show: the run is headless whatever surface was offered.
        let (surface, marshal) = match self.surface {
            Some((surface, marshal)) if !sequence.is_empty() => (Some(surface), marshal),
            _ => (None, UiMarshal::inline()),
        };

        let run_id = Uuid::new_v4();
        debug!(
            "[PHASE: shell] [STEP: build] Shell {} built: {} dialog(s), surface={}",
            run_id,
            sequence.count(),
            surface.is_some()
        );

        ShellController {
            inner: Arc::new(ShellInner {
                run_id,
                engine: self.engine,
                factory: self.factory,
                sequence,
                mode: RunMode::from_flags(is_installing, is_repairing),
                surface,
                marshal,
                progress: Mutex::new(ProgressAccumulator::new(self.config.progress_weight)),
                config: self.config,
                log: self.log,
                demo_mode: self.demo_mode,
                started: AtomicBool::new(false),
                canceled: AtomicBool::new(false),
                finished: AtomicBool::new(false),
                finished_lock: Mutex::new(()),
                finished_signal: Condvar::new(),
                state: Mutex::new(ShellState::new()),
                data: Mutex::new(RuntimeData::default()),
                message_handler: Mutex::new(Arc::new(Mutex::new(self.message_handler))),
                deferred: Mutex::new(Vec::new()),
            }),
        }
    }
}

#[derive(Clone)]
pub struct ShellController {
    inner: Arc<ShellInner>,
}

impl ShellController {
    pub fn builder(
        engine: Arc<dyn InstallerEngine>,
        factory: Arc<dyn DialogFactory>,
    ) -> ShellBuilder {
        ShellBuilder {
            engine,
            factory,
            dialogs: ManagedDialogs::stock(),
            surface: None,
            config: ShellConfig::default(),
            log: RunLog::new(),
            demo_mode: false,
            message_handler: Box::new(DefaultMessageDialog),
        }
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn run_id(&self) -> Uuid {
        self.inner.run_id
    }

    pub fn mode(&self) -> RunMode {
        self.inner.mode
    }

    pub fn sequence(&self) -> &DialogSequence {
        &self.inner.sequence
    }

    pub fn config(&self) -> &ShellConfig {
        &self.inner.config
    }

    pub fn engine(&self) -> &Arc<dyn InstallerEngine> {
        &self.inner.engine
    }

    pub fn surface(&self) -> Option<&Arc<dyn ShellSurface>> {
        self.inner.surface.as_ref()
    }

    pub fn log(&self) -> &RunLog {
        &self.inner.log
    }

    pub fn log_text(&self) -> String {
        self.inner.log.text()
    }

    pub fn is_demo(&self) -> bool {
        self.inner.demo_mode
    }

    pub fn is_started(&self) -> bool {
        self.inner.started.load(Ordering::SeqCst)
    }

    pub fn is_canceled(&self) -> bool {
        self.inner.canceled.load(Ordering::SeqCst)
    }

    pub fn is_finished(&self) -> bool {
        self.inner.finished.load(Ordering::SeqCst)
    }

    /// Replaces `[Key]` tokens through the engine's localization table.
    pub fn localize(&self, text: &str) -> String {
        let engine = &self.inner.engine;
        localize_text(text, &|key| engine.localize(key))
    }

    /// Culture id taken from the `ProductLanguage` property when the shell was shown.
    pub fn ui_culture(&self) -> Option<u32> {
        lock(&self.inner.state).ui_culture
    }

    pub fn current_index(&self) -> isize {
        lock(&self.inner.state).cursor
    }

    pub fn current_dialog(&self) -> Option<DialogId> {
        lock(&self.inner.state).active.as_ref().map(|a| a.id)
    }

    pub fn active_title(&self) -> Option<String> {
        lock(&self.inner.state)
            .active
            .as_ref()
            .map(|a| a.title.clone())
    }

    /// What the active dialog wants drawn. `None` without a dialog or while the dialog is busy
    /// handling a callback.
    pub fn active_view(&self) -> Option<DialogView> {
        let dialog = self.active_dialog()?;
        let view = match dialog.try_lock() {
            Ok(guard) => guard.view(),
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner().view(),
            Err(TryLockError::WouldBlock) => return None,
        };
        Some(view)
    }

    pub fn phase(&self) -> ShellPhase {
        ShellPhase::from_latches(
            self.is_started(),
            self.is_finished(),
            self.current_index() >= 0,
        )
    }

    pub fn run_state(&self) -> RunState {
        let state = lock(&self.inner.state);
        RunState {
            started: self.is_started(),
            canceled: self.is_canceled(),
            finished: self.is_finished(),
            user_interrupted: state.user_interrupted,
            error_detected: state.error_detected,
            custom_error_text: state.custom_error_text.clone(),
            errors: state.errors.clone(),
        }
    }

    /// Text a summary screen shows instead of the generic failure message.
    pub fn set_custom_error_text(&self, text: Option<String>) {
        lock(&self.inner.state).custom_error_text = text;
    }

    pub fn set_message_handler(&self, handler: Box<dyn MessageHandler>) {
        *lock(&self.inner.message_handler) = Arc::new(Mutex::new(handler));
    }

    pub fn runtime_data(&self) -> RuntimeData {
        lock(&self.inner.data).clone()
    }

    pub fn set_runtime_value(&self, key: impl Into<String>, value: impl Into<String>) {
        lock(&self.inner.data).set(key, value);
    }

    // ------------------------------------------------------------------
    // Show
    // ------------------------------------------------------------------

    /// Shows the shell and returns once the run is over. With a surface this must be called on
    /// the thread the surface's marshal is bound to.
    pub fn show_modal(&self) -> anyhow::Result<RunState> {
        info!(
            "[PHASE: shell] [STEP: show] Showing shell {} \
             (mode={:?}, dialogs={}, surface={}, demo={})",
            self.inner.run_id,
            self.inner.mode,
            self.inner.sequence.count(),
            self.inner.surface.is_some(),
            self.inner.demo_mode
        );

        self.read_ui_culture();
        self.restore_runtime_data();

        let initialized = self
            .inner
            .engine
            .invoke_client_handlers(ClientEvent::UiInitialized);
        if initialized == ActionResult::Failure {
            warn!(
                "[PHASE: shell] [STEP: show] {} handler failed; shell is not shown",
                ClientEvent::UiInitialized.as_str()
            );
            self.inner.log.append(format!(
                "{} returned {:?}; shell not shown",
                ClientEvent::UiInitialized.as_str(),
                initialized
            ));
            return Ok(self.run_state());
        }

        match self.inner.surface.clone() {
            Some(surface) => {
                let loaded = self.inner.engine.invoke_client_handlers(ClientEvent::UiLoaded);
                if loaded != ActionResult::Success {
                    warn!(
                        "[PHASE: shell] [STEP: show] {} returned {:?}",
                        ClientEvent::UiLoaded.as_str(),
                        loaded
                    );
                    self.inner.log.append(format!(
                        "{} returned {:?}",
                        ClientEvent::UiLoaded.as_str(),
                        loaded
                    ));
                }

                match initialized {
                    ActionResult::SkipRemainingActions => {
                        if self.inner.sequence.contains(DialogId::PROGRESS) {
                            self.go_to(DialogId::PROGRESS);
                        } else {
                            self.go_to_last();
                        }
                    }
                    ActionResult::UserExit => self.go_to_last(),
                    _ => self.go_next(),
                }

                surface.run_modal(self)?;
            }
            None => {
                self.start();
                self.wait_until_finished();
            }
        }

        let state = self.run_state();
        info!(
            "[PHASE: shell] [STEP: show] Shell {} closed (outcome={:?}, errors={})",
            self.inner.run_id,
            state.outcome(),
            state.errors.len()
        );
        Ok(state)
    }

    fn read_ui_culture(&self) {
        let culture = self
            .inner
            .engine
            .property("ProductLanguage")
            .and_then(|v| v.trim().parse::<u32>().ok())
            .filter(|lcid| *lcid != 0);
        if let Some(lcid) = culture {
            debug!("[PHASE: shell] [STEP: show] UI culture {}", lcid);
        }
        lock(&self.inner.state).ui_culture = culture;
    }

    fn restore_runtime_data(&self) {
        match self.inner.engine.read_store(RUNTIME_DATA_SLOT) {
            Ok(Some(serialized)) => match lock(&self.inner.data).merge_replace(&serialized) {
                Ok(count) => debug!(
                    "[PHASE: shell] [STEP: show] Restored {} runtime data value(s)",
                    count
                ),
                Err(e) => warn!(
                    "[PHASE: shell] [STEP: show] Ignoring unreadable runtime data: {}",
                    e
                ),
            },
            Ok(None) => {}
            Err(e) => warn!(
                "[PHASE: shell] [STEP: show] Runtime data not restored: {}",
                e
            ),
        }
    }

    fn wait_until_finished(&self) {
        let poll = Duration::from_millis(self.inner.config.headless_poll_ms.max(1));
        let mut guard = lock(&self.inner.finished_lock);
        while !self.is_finished() {
            guard = match self.inner.finished_signal.wait_timeout(guard, poll) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
    }

    fn latch_finished(&self) {
        if !self.inner.finished.swap(true, Ordering::SeqCst) {
            let _guard = lock(&self.inner.finished_lock);
            self.inner.finished_signal.notify_all();
            info!("[PHASE: shell] [STEP: finish] Run {} finished", self.inner.run_id);
        }
    }

    // ------------------------------------------------------------------
    // Navigation
    // ------------------------------------------------------------------

    pub fn go_next(&self) {
        self.navigate(NavTarget::Offset(1));
    }

    pub fn go_prev(&self) {
        self.navigate(NavTarget::Offset(-1));
    }

    /// Out-of-range indices are ignored.
    pub fn go_to_index(&self, index: isize) {
        self.navigate(NavTarget::Index(index));
    }

    /// Ignored when the dialog is not part of this run's sequence.
    pub fn go_to(&self, id: DialogId) {
        let index = self.inner.sequence.index_of(id);
        if index == -1 {
            debug!(
                "[PHASE: shell] [STEP: navigate] {} is not in the sequence; ignored",
                id
            );
            return;
        }
        self.navigate(NavTarget::Index(index));
    }

    pub fn go_to_last(&self) {
        self.navigate(NavTarget::Last);
    }

    fn navigate(&self, target: NavTarget) {
        let shell = self.clone();
        if let Err(e) = self
            .inner
            .marshal
            .run(move || shell.apply_navigation(target))
        {
            warn!("[PHASE: shell] [STEP: navigate] Navigation lost: {}", e);
        }
    }

    fn apply_navigation(&self, target: NavTarget) {
        if self.phase() == ShellPhase::Executing {
            debug!(
                "[PHASE: shell] [STEP: navigate] {:?} ignored while executing",
                target
            );
            return;
        }

        let current = self.current_index();
        let index = match target {
            NavTarget::Offset(delta) => current + delta,
            NavTarget::Index(index) => index,
            NavTarget::Last => self.inner.sequence.count() as isize - 1,
        };

        if !self.inner.sequence.in_range(index) {
            debug!(
                "[PHASE: shell] [STEP: navigate] {:?} resolves to {} (count={}); ignored",
                target,
                index,
                self.inner.sequence.count()
            );
            return;
        }

        self.activate(index);
    }

    fn activate(&self, index: isize) {
        let Some(id) = self.inner.sequence.get(index) else {
            return;
        };
        let Some(mut dialog) = self.inner.factory.create(id) else {
            warn!(
                "[PHASE: shell] [STEP: navigate] No dialog registered for {}; staying put",
                id
            );
            self.inner
                .log
                .append(format!("No dialog registered for {}", id));
            return;
        };

        let size = self
            .inner
            .surface
            .as_ref()
            .map(|s| s.client_size())
            .unwrap_or_else(|| Size::new(0, 0));
        let localizer = |text: &str| self.localize(text);
        dialog.mount(&MountContext {
            size,
            localizer: &localizer,
            state: self.run_state(),
        });
        let title = self.localize(&dialog.title());

        {
            let mut state = lock(&self.inner.state);
            state.cursor = index;
            state.active = Some(ActiveDialog {
                id,
                title: title.clone(),
                dialog: Arc::new(Mutex::new(dialog)),
            });
        }

        if let Some(surface) = &self.inner.surface {
            surface.set_title(&title);
            surface.dialog_changed(id);
        }
        info!(
            "[PHASE: shell] [STEP: navigate] Activated {} ({}/{})",
            id,
            index + 1,
            self.inner.sequence.count()
        );

        self.persist_runtime_data();
    }

    /// Advisory write: failures are logged and otherwise ignored.
    fn persist_runtime_data(&self) {
        let serialized = match lock(&self.inner.data).to_json() {
            Ok(serialized) => serialized,
            Err(e) => {
                warn!(
                    "[PHASE: shell] [STEP: persist] Runtime data not serializable: {}",
                    e
                );
                return;
            }
        };
        if let Err(e) = self
            .inner
            .engine
            .write_store(RUNTIME_DATA_SLOT, &serialized)
        {
            debug!(
                "[PHASE: shell] [STEP: persist] Advisory write skipped: {}",
                e
            );
            self.inner
                .log
                .append(format!("Runtime data not persisted: {}", e));
        }
    }

    fn active_dialog(&self) -> Option<SharedDialog> {
        lock(&self.inner.state)
            .active
            .as_ref()
            .map(|a| Arc::clone(&a.dialog))
    }

    /// Calls into the active dialog without holding the state lock, so the dialog may navigate.
    ///
    /// Dialog calls only ever run on the UI context, so a dialog that is already locked is one
    /// whose own callback is further up the stack. Such a re-entrant call is refused (`None`).
    fn with_active_dialog<R>(&self, f: impl FnOnce(&mut dyn ManagedDialog) -> R) -> Option<R> {
        let dialog = self.active_dialog()?;
        let result = {
            let mut guard = match dialog.try_lock() {
                Ok(guard) => guard,
                Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
                Err(TryLockError::WouldBlock) => {
                    debug!("[PHASE: shell] [STEP: dispatch] Re-entrant dialog call refused");
                    return None;
                }
            };
            f(&mut **guard)
        };
        self.run_deferred();
        Some(result)
    }

    /// Hands a notification to the active dialog. When that dialog is inside one of its own
    /// callbacks the notification is queued and delivered once the callback has returned.
    fn deliver<F>(&self, call: F)
    where
        F: FnOnce(&mut dyn ManagedDialog, &ShellController) + Send + 'static,
    {
        let Some(dialog) = self.active_dialog() else {
            return;
        };
        {
            let mut guard = match dialog.try_lock() {
                Ok(guard) => guard,
                Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
                Err(TryLockError::WouldBlock) => {
                    debug!("[PHASE: shell] [STEP: dispatch] Dialog busy; notification deferred");
                    lock(&self.inner.deferred).push(Box::new(call));
                    return;
                }
            };
            call(&mut **guard, self);
        }
        self.run_deferred();
    }

    /// One pass over the queue; anything deferred again waits for the next callback to return.
    fn run_deferred(&self) {
        let pending = std::mem::take(&mut *lock(&self.inner.deferred));
        for call in pending {
            self.deliver(call);
        }
    }

    fn notify_dialog<F>(&self, step: &'static str, call: F)
    where
        F: FnOnce(&mut dyn ManagedDialog, &ShellController) + Send + 'static,
    {
        if self.active_dialog().is_none() {
            return;
        }
        let shell = self.clone();
        if let Err(e) = self.inner.marshal.run(move || shell.deliver(call)) {
            warn!("[PHASE: shell] [STEP: {}] Dialog notification lost: {}", step, e);
        }
    }

    /// Routes a user gesture to the active dialog.
    pub fn send_command(&self, command: DialogCommand) {
        let shell = self.clone();
        let result = self.inner.marshal.run(move || {
            let handled = shell
                .with_active_dialog(|dialog| dialog.on_command(&shell, command))
                .is_some();
            if !handled && command == DialogCommand::Cancel {
                shell.cancel();
            }
        });
        if let Err(e) = result {
            warn!("[PHASE: shell] [STEP: command] {:?} lost: {}", command, e);
        }
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Starts executing the install script. Idempotent; never restarts a finished run. In demo
    /// mode the engine is left alone and the run completes at once.
    pub fn start(&self) {
        if self.is_finished() || self.is_canceled() {
            debug!("[PHASE: shell] [STEP: start] Run already over; start ignored");
            return;
        }
        if self.inner.started.swap(true, Ordering::SeqCst) {
            return;
        }

        info!(
            "[PHASE: shell] [STEP: start] Execution requested (demo={})",
            self.inner.demo_mode
        );
        if self.inner.demo_mode {
            self.on_execute_started();
            self.on_execute_complete();
        } else {
            self.inner.engine.start_execute();
        }
    }

    /// Before start this closes the shell outright; afterwards it asks the engine to abort and
    /// answers every further message with `Cancel`.
    pub fn cancel(&self) {
        if !self.is_started() {
            info!("[PHASE: shell] [STEP: cancel] Canceled before execution; closing");
            self.inner.canceled.store(true, Ordering::SeqCst);
            lock(&self.inner.state).user_interrupted = true;
            self.exit();
            return;
        }
        if self.is_finished() {
            debug!("[PHASE: shell] [STEP: cancel] Run already finished; cancel ignored");
            return;
        }
        if self.inner.canceled.swap(true, Ordering::SeqCst) {
            return;
        }

        info!("[PHASE: shell] [STEP: cancel] Cancel requested during execution");
        self.inner.log.append("Cancel requested by user");
        self.inner.engine.cancel_execute();
    }

    /// Closes the shell surface and ends the run.
    pub fn exit(&self) {
        self.latch_finished();
        if let Some(surface) = self.inner.surface.clone() {
            if let Err(e) = self.inner.marshal.run(move || surface.close()) {
                warn!("[PHASE: shell] [STEP: exit] Close lost: {}", e);
            }
        }
    }

    // ------------------------------------------------------------------
    // Engine events
    // ------------------------------------------------------------------

    pub fn on_execute_started(&self) {
        self.inner.engine.refresh_install_dir();
        self.notify_dialog("execute_started", |dialog, shell| {
            dialog.on_execute_started(shell)
        });
    }

    pub fn on_execute_complete(&self) {
        self.latch_finished();
        self.notify_dialog("execute_complete", |dialog, shell| {
            dialog.on_execute_complete(shell)
        });
    }

    pub fn on_progress(&self, percent: u8) {
        let percent = percent.min(100);
        self.notify_dialog("progress", move |dialog, shell| {
            dialog.on_progress(shell, percent)
        });
    }

    /// Engine message entry point. Blocks until the UI context has produced the disposition.
    pub fn process_message(&self, message: EngineMessage) -> MessageResult {
        let percent = {
            let mut progress = lock(&self.inner.progress);
            progress.process_message(message.kind, &message.record);
            progress.percent()
        };
        self.on_progress(percent);

        if message.kind.is_prompt() {
            self.inner
                .log
                .append(format!("{}: {}", message.kind, message.record));
            return self.prompt_user(message);
        }

        let kind = message.kind;
        let shell = self.clone();
        let classify = message.clone();
        let interpreted = self
            .inner
            .marshal
            .run(move || {
                panic::catch_unwind(AssertUnwindSafe(|| shell.interpret(&classify)))
                    .unwrap_or_else(|payload| {
                        Err(DispatchError::Fault {
                            kind,
                            reason: panic_reason(payload.as_ref()),
                        })
                    })
            })
            .unwrap_or_else(|e| {
                Err(DispatchError::Fault {
                    kind,
                    reason: e.to_string(),
                })
            });

        match interpreted {
            // The completion report itself reaches the dialog; only messages in between get
            // the cancel disposition.
            Ok(()) => {
                if self.is_canceled() && !self.is_finished() {
                    return MessageResult::Cancel;
                }
            }
            Err(e) => {
                error!("[PHASE: shell] [STEP: dispatch] {}", e);
                self.inner.log.append(e.to_string());
            }
        }

        self.forward_to_dialog(message)
    }

    /// UI context only.
    fn record_error(&self, record: &MessageRecord) {
        let text = record.to_string();
        warn!("[PHASE: shell] [STEP: dispatch] Engine error: {}", text);
        let mut state = lock(&self.inner.state);
        state.error_detected = true;
        state.errors.push(text);
    }

    /// UI context only: updates the run-state flags and the finished latch.
    fn interpret(&self, message: &EngineMessage) -> Result<(), DispatchError> {
        if message.kind == InstallMessage::Progress {
            return Ok(());
        }
        self.inner
            .log
            .append(format!("{}: {}", message.kind, message.record));

        match message.kind {
            InstallMessage::Info => {
                if self
                    .inner
                    .config
                    .is_user_cancel_text(&message.record.to_string())
                {
                    info!("[PHASE: shell] [STEP: dispatch] Engine reports a user cancel");
                    lock(&self.inner.state).user_interrupted = true;
                }
                Ok(())
            }
            InstallMessage::InstallEnd => {
                let status = message.record.last_field().map(|s| s.trim().to_string());
                {
                    let mut state = lock(&self.inner.state);
                    match status.as_deref() {
                        Some(INSTALL_END_ERROR) => state.error_detected = true,
                        Some(INSTALL_END_USER_CANCEL) => state.user_interrupted = true,
                        _ => {}
                    }
                }
                self.latch_finished();
                match status {
                    Some(status) => {
                        info!(
                            "[PHASE: shell] [STEP: dispatch] Install ended with status {}",
                            status
                        );
                        Ok(())
                    }
                    None => Err(DispatchError::MissingStatus(message.kind)),
                }
            }
            _ => Ok(()),
        }
    }

    fn prompt_user(&self, message: EngineMessage) -> MessageResult {
        let handler = Arc::clone(&*lock(&self.inner.message_handler));
        let shell = self.clone();
        let kind = message.kind;
        match self.inner.marshal.run(move || {
            if message.kind == InstallMessage::Error {
                shell.record_error(&message.record);
            }
            lock(&handler).handle(&shell, &message)
        }) {
            Ok(result) => {
                debug!(
                    "[PHASE: shell] [STEP: prompt] {} answered {}",
                    kind,
                    result.label()
                );
                result
            }
            Err(e) => {
                error!("[PHASE: shell] [STEP: prompt] {} prompt lost: {}", kind, e);
                MessageResult::Ok
            }
        }
    }

    fn forward_to_dialog(&self, message: EngineMessage) -> MessageResult {
        if self.active_dialog().is_none() {
            return MessageResult::Ok;
        }
        let shell = self.clone();
        self.inner
            .marshal
            .run(move || {
                shell
                    .with_active_dialog(|dialog| dialog.process_message(&shell, &message))
                    .unwrap_or(MessageResult::Ok)
            })
            .unwrap_or_else(|e| {
                warn!("[PHASE: shell] [STEP: dispatch] Dialog did not answer: {}", e);
                MessageResult::Ok
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::bridge::EngineBridge;
    use crate::engine::demo::DemoEngine;
    use crate::engine::EngineEventSink;
    use crate::models::message::MessageButtons;
    use crate::shell::dialog::DialogRegistry;
    use crate::shell::marshal::UiMarshal;
    use crate::shell::surface::Prompt;
    use std::sync::atomic::AtomicBool;
    use std::thread::{self, ThreadId};
    use std::time::Instant;

    // ----------------------------------------------------------------------
    // Test doubles
    // ----------------------------------------------------------------------

    #[derive(Default)]
    struct Journal {
        events: Mutex<Vec<String>>,
        progress: Mutex<Vec<u8>>,
        threads: Mutex<Vec<ThreadId>>,
    }

    impl Journal {
        fn events(&self) -> Vec<String> {
            self.events.lock().unwrap().clone()
        }

        fn push(&self, event: String) {
            self.threads.lock().unwrap().push(thread::current().id());
            self.events.lock().unwrap().push(event);
        }
    }

    struct Probe {
        id: DialogId,
        journal: Arc<Journal>,
        answer: MessageResult,
    }

    impl ManagedDialog for Probe {
        fn title(&self) -> String {
            format!("[ProductName] {}", self.id)
        }

        fn mount(&mut self, ctx: &MountContext<'_>) {
            self.journal.push(format!(
                "mount {} {}x{}",
                self.id, ctx.size.width, ctx.size.height
            ));
        }

        fn view(&self) -> DialogView {
            DialogView {
                heading: self.id.to_string(),
                ..DialogView::default()
            }
        }

        fn on_execute_started(&mut self, _shell: &ShellController) {
            self.journal.push(format!("started {}", self.id));
        }

        fn on_execute_complete(&mut self, _shell: &ShellController) {
            self.journal.push(format!("complete {}", self.id));
        }

        fn on_progress(&mut self, _shell: &ShellController, percent: u8) {
            self.journal.threads.lock().unwrap().push(thread::current().id());
            self.journal.progress.lock().unwrap().push(percent);
        }

        fn process_message(
            &mut self,
            _shell: &ShellController,
            message: &EngineMessage,
        ) -> MessageResult {
            self.journal.push(format!("message {} {}", self.id, message.kind));
            self.answer
        }
    }

    fn probe_registry(ids: &[DialogId], journal: &Arc<Journal>) -> DialogRegistry {
        ids.iter().fold(DialogRegistry::new(), |registry, id| {
            let id = *id;
            let journal = Arc::clone(journal);
            registry.register(id, move || {
                Box::new(Probe {
                    id,
                    journal: Arc::clone(&journal),
                    answer: MessageResult::Ok,
                })
            })
        })
    }

    #[derive(Default)]
    struct RecordingSurface {
        titles: Mutex<Vec<String>>,
        changes: Mutex<Vec<DialogId>>,
        prompts: Mutex<Vec<Prompt>>,
        answer: Option<MessageResult>,
        closed: AtomicBool,
    }

    impl ShellSurface for RecordingSurface {
        fn client_size(&self) -> Size {
            Size::new(80, 24)
        }

        fn set_title(&self, title: &str) {
            self.titles.lock().unwrap().push(title.to_string());
        }

        fn dialog_changed(&self, dialog: DialogId) {
            self.changes.lock().unwrap().push(dialog);
        }

        fn prompt(&self, prompt: &Prompt) -> Option<MessageResult> {
            self.prompts.lock().unwrap().push(prompt.clone());
            self.answer
        }

        fn close(&self) {
            self.closed.store(true, Ordering::SeqCst);
        }

        fn is_closed(&self) -> bool {
            self.closed.load(Ordering::SeqCst)
        }

        fn run_modal(&self, _shell: &ShellController) -> anyhow::Result<()> {
            Ok(())
        }
    }

    struct Fixture {
        engine: Arc<DemoEngine>,
        shell: ShellController,
        journal: Arc<Journal>,
    }

    fn headless_fixture(engine: DemoEngine, dialogs: &[DialogId]) -> Fixture {
        let engine = Arc::new(engine);
        let journal = Arc::new(Journal::default());
        let shell = ShellController::builder(
            engine.clone(),
            Arc::new(probe_registry(dialogs, &journal)),
        )
        .dialogs(ManagedDialogs::new(dialogs.to_vec(), dialogs.to_vec()))
        .build();
        Fixture {
            engine,
            shell,
            journal,
        }
    }

    fn four_dialogs() -> Vec<DialogId> {
        vec![
            DialogId::WELCOME,
            DialogId::LICENSE,
            DialogId::PROGRESS,
            DialogId::EXIT,
        ]
    }

    fn message(kind: InstallMessage, fields: &[&str]) -> EngineMessage {
        EngineMessage::new(kind, MessageRecord::new(fields.iter().copied()))
    }

    // ----------------------------------------------------------------------
    // Navigation
    // ----------------------------------------------------------------------

    #[test]
    fn next_walks_to_exit_and_stops_there() {
        let fx = headless_fixture(DemoEngine::new(RunMode::Install), &four_dialogs());
        assert_eq!(fx.shell.current_index(), -1);
        assert_eq!(fx.shell.phase(), ShellPhase::NotStarted);

        for _ in 0..4 {
            fx.shell.go_next();
        }
        assert_eq!(fx.shell.current_index(), 3);
        assert_eq!(fx.shell.current_dialog(), Some(DialogId::EXIT));
        assert_eq!(fx.shell.phase(), ShellPhase::Navigating);

        fx.shell.go_next();
        assert_eq!(fx.shell.current_index(), 3, "fifth go_next must be a no-op");
    }

    #[test]
    fn out_of_range_targets_leave_cursor_unchanged() {
        let fx = headless_fixture(DemoEngine::new(RunMode::Install), &four_dialogs());
        fx.shell.go_prev();
        assert_eq!(fx.shell.current_index(), -1);

        fx.shell.go_to_index(1);
        assert_eq!(fx.shell.current_dialog(), Some(DialogId::LICENSE));

        fx.shell.go_to_index(4);
        fx.shell.go_to_index(-1);
        fx.shell.go_to_index(isize::MAX);
        fx.shell.go_to(DialogId::MAINTENANCE_TYPE);
        assert_eq!(fx.shell.current_index(), 1);

        fx.shell.go_prev();
        assert_eq!(fx.shell.current_index(), 0);
        fx.shell.go_prev();
        assert_eq!(fx.shell.current_index(), 0);

        fx.shell.go_to_last();
        assert_eq!(fx.shell.current_dialog(), Some(DialogId::EXIT));
        fx.shell.go_to(DialogId::PROGRESS);
        assert_eq!(fx.shell.current_index(), 2);
    }

    #[test]
    fn unregistered_dialog_keeps_current_one() {
        let engine = Arc::new(DemoEngine::new(RunMode::Install));
        let journal = Arc::new(Journal::default());
        let shell = ShellController::builder(
            engine,
            Arc::new(probe_registry(&[DialogId::WELCOME], &journal)),
        )
        .dialogs(ManagedDialogs::new(
            vec![DialogId::WELCOME, DialogId::new("Custom")],
            vec![],
        ))
        .build();

        shell.go_next();
        shell.go_next();
        assert_eq!(shell.current_index(), 0);
        assert!(shell.log_text().contains("No dialog registered for Custom"));
    }

    #[test]
    fn navigation_is_frozen_while_executing() {
        let fx = headless_fixture(DemoEngine::new(RunMode::Install), &four_dialogs());
        fx.shell.go_to(DialogId::PROGRESS);
        fx.shell.start();
        assert_eq!(fx.shell.phase(), ShellPhase::Executing);

        fx.shell.go_next();
        fx.shell.go_prev();
        assert_eq!(fx.shell.current_index(), 2);

        fx.shell.on_execute_complete();
        assert_eq!(fx.shell.phase(), ShellPhase::Finished);
        fx.shell.go_next();
        assert_eq!(fx.shell.current_dialog(), Some(DialogId::EXIT));
    }

    #[test]
    fn activation_mounts_titles_and_notifies_surface() {
        let engine = Arc::new(DemoEngine::new(RunMode::Install));
        let journal = Arc::new(Journal::default());
        let surface = Arc::new(RecordingSurface::default());
        let (marshal, _pump) = UiMarshal::for_current_thread();
        let shell = ShellController::builder(
            engine,
            Arc::new(probe_registry(&four_dialogs(), &journal)),
        )
        .dialogs(ManagedDialogs::new(four_dialogs(), vec![]))
        .surface(surface.clone(), marshal)
        .build();

        shell.go_next();
        shell.go_next();

        assert_eq!(
            journal.events(),
            vec![
                "mount Welcome 80x24".to_string(),
                "mount License 80x24".to_string()
            ]
        );
        assert_eq!(
            *surface.titles.lock().unwrap(),
            vec![
                "Demo Product Welcome".to_string(),
                "Demo Product License".to_string()
            ]
        );
        assert_eq!(
            *surface.changes.lock().unwrap(),
            vec![DialogId::WELCOME, DialogId::LICENSE]
        );
        assert_eq!(shell.active_title().as_deref(), Some("Demo Product License"));
        assert_eq!(
            shell.active_view().map(|v| v.heading),
            Some("License".to_string())
        );
    }

    // ----------------------------------------------------------------------
    // Runtime data persistence
    // ----------------------------------------------------------------------

    #[test]
    fn navigation_persists_runtime_data_until_store_is_sealed() {
        let fx = headless_fixture(DemoEngine::new(RunMode::Install), &four_dialogs());
        fx.shell.set_runtime_value("INSTALLDIR", "/opt/demo");
        fx.shell.go_next();
        assert_eq!(
            fx.engine.stored(RUNTIME_DATA_SLOT).as_deref(),
            Some(r#"{"INSTALLDIR":"/opt/demo"}"#)
        );

        fx.shell.go_to(DialogId::PROGRESS);
        fx.shell.start();
        fx.shell.on_execute_complete();
        fx.shell.set_runtime_value("INSTALLDIR", "/opt/other");
        fx.shell.go_next();

        // The write was refused but navigation still happened.
        assert_eq!(fx.shell.current_dialog(), Some(DialogId::EXIT));
        assert_eq!(
            fx.engine.stored(RUNTIME_DATA_SLOT).as_deref(),
            Some(r#"{"INSTALLDIR":"/opt/demo"}"#)
        );
        assert!(fx.shell.log_text().contains("Runtime data not persisted"));
    }

    // ----------------------------------------------------------------------
    // Dispatch
    // ----------------------------------------------------------------------

    #[test]
    fn error_message_is_recorded_and_answered_ok() {
        let fx = headless_fixture(DemoEngine::new(RunMode::Install), &four_dialogs());
        let result = fx
            .shell
            .process_message(message(InstallMessage::Error, &["disk full"]));

        let state = fx.shell.run_state();
        assert_eq!(result, MessageResult::Ok);
        assert!(state.error_detected);
        assert_eq!(state.errors, vec!["disk full".to_string()]);
        assert!(fx.shell.log_text().contains("Error: disk full"));
    }

    #[test]
    fn custom_message_handler_overrides_answer() {
        struct AlwaysRetry;
        impl MessageHandler for AlwaysRetry {
            fn handle(
                &mut self,
                _shell: &ShellController,
                _message: &EngineMessage,
            ) -> MessageResult {
                MessageResult::Retry
            }
        }

        let fx = headless_fixture(DemoEngine::new(RunMode::Install), &four_dialogs());
        fx.shell.set_message_handler(Box::new(AlwaysRetry));
        let result = fx.shell.process_message(
            message(InstallMessage::Warning, &["file locked"])
                .with_buttons(MessageButtons::RetryCancel),
        );
        assert_eq!(result, MessageResult::Retry);
        assert!(!fx.shell.run_state().error_detected);
    }

    #[test]
    fn default_dialog_prompts_through_surface_with_localized_title() {
        let engine = Arc::new(DemoEngine::new(RunMode::Install));
        let surface = Arc::new(RecordingSurface {
            answer: Some(MessageResult::Cancel),
            ..RecordingSurface::default()
        });
        let (marshal, _pump) = UiMarshal::for_current_thread();
        let shell = ShellController::builder(engine, Arc::new(DialogRegistry::new()))
            .surface(surface.clone(), marshal)
            .build();

        let result = shell.process_message(
            message(InstallMessage::Warning, &["Close running apps"])
                .with_buttons(MessageButtons::OkCancel),
        );

        assert_eq!(result, MessageResult::Cancel);
        let prompts = surface.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 1);
        assert_eq!(prompts[0].title, "Installer Information");
        assert_eq!(prompts[0].text, "Close running apps");
    }

    #[test]
    fn install_end_status_sets_flags_and_finishes() {
        let ok = headless_fixture(DemoEngine::new(RunMode::Install), &four_dialogs());
        ok.shell
            .process_message(message(InstallMessage::InstallEnd, &["Demo Product", "0"]));
        let state = ok.shell.run_state();
        assert!(state.finished);
        assert!(!state.error_detected);
        assert!(!state.user_interrupted);

        let failed = headless_fixture(DemoEngine::new(RunMode::Install), &four_dialogs());
        failed
            .shell
            .process_message(message(InstallMessage::InstallEnd, &["Demo Product", "3"]));
        assert!(failed.shell.run_state().error_detected);
        assert!(failed.shell.is_finished());

        let interrupted = headless_fixture(DemoEngine::new(RunMode::Install), &four_dialogs());
        interrupted
            .shell
            .process_message(message(InstallMessage::InstallEnd, &["Demo Product", "2"]));
        assert!(interrupted.shell.run_state().user_interrupted);
        assert!(!interrupted.shell.run_state().error_detected);
    }

    #[test]
    fn other_status_keeps_earlier_flags() {
        let fx = headless_fixture(DemoEngine::new(RunMode::Install), &four_dialogs());
        fx.shell
            .process_message(message(InstallMessage::Error, &["disk full"]));
        fx.shell
            .process_message(message(InstallMessage::InstallEnd, &["Demo Product", "1"]));
        let state = fx.shell.run_state();
        assert!(state.error_detected);
        assert!(state.finished);
    }

    #[test]
    fn finished_latch_never_resets() {
        let fx = headless_fixture(DemoEngine::new(RunMode::Install), &four_dialogs());
        fx.shell
            .process_message(message(InstallMessage::InstallEnd, &["Demo Product", "1"]));
        fx.shell.on_execute_complete();
        fx.shell
            .process_message(message(InstallMessage::InstallEnd, &["Demo Product", "1"]));
        fx.shell.start();
        assert!(fx.shell.is_finished());
        assert!(!fx.shell.is_started(), "a finished run must not start");
        assert_eq!(fx.engine.start_count(), 0);
    }

    #[test]
    fn malformed_install_end_still_finishes_and_reaches_dialog() {
        let fx = headless_fixture(DemoEngine::new(RunMode::Install), &four_dialogs());
        fx.shell.go_next();
        let result = fx
            .shell
            .process_message(EngineMessage::new(
                InstallMessage::InstallEnd,
                MessageRecord::default(),
            ));

        assert_eq!(result, MessageResult::Ok);
        assert!(fx.shell.is_finished());
        assert!(fx.shell.log_text().contains("InstallEnd record carries no status field"));
        assert!(fx
            .journal
            .events()
            .contains(&"message Welcome InstallEnd".to_string()));
    }

    #[test]
    fn user_cancel_phrase_marks_interrupted() {
        let fx = headless_fixture(DemoEngine::new(RunMode::Install), &four_dialogs());
        fx.shell.process_message(message(
            InstallMessage::Info,
            &["Action ended: User cancelled installation."],
        ));
        assert!(fx.shell.run_state().user_interrupted);

        let plain = headless_fixture(DemoEngine::new(RunMode::Install), &four_dialogs());
        plain
            .shell
            .process_message(message(InstallMessage::Info, &["Action ended: InstallFiles."]));
        assert!(!plain.shell.run_state().user_interrupted);
    }

    #[test]
    fn messages_reach_active_dialog_and_progress_is_pushed() {
        let fx = headless_fixture(DemoEngine::new(RunMode::Install), &four_dialogs());
        fx.shell.go_to(DialogId::PROGRESS);
        fx.shell
            .process_message(message(InstallMessage::ActionStart, &["InstallFiles"]));
        fx.shell
            .process_message(message(InstallMessage::Progress, &["0", "50", "0", "0"]));
        fx.shell
            .process_message(message(InstallMessage::Progress, &["2", "50"]));

        let events = fx.journal.events();
        assert!(events.contains(&"message Progress ActionStart".to_string()));
        assert!(events.contains(&"message Progress Progress".to_string()));
        // First pass: 50 of (50 + 50 slack) ticks at weight 0.5.
        assert_eq!(fx.journal.progress.lock().unwrap().last(), Some(&25));
        assert!(!fx.shell.log_text().contains("Progress:"));
    }

    // ----------------------------------------------------------------------
    // Start / cancel
    // ----------------------------------------------------------------------

    #[test]
    fn cancel_before_start_is_terminal_without_starting_engine() {
        let fx = headless_fixture(DemoEngine::new(RunMode::Install), &four_dialogs());
        fx.shell.go_next();
        fx.shell.cancel();

        let state = fx.shell.run_state();
        assert!(state.finished);
        assert!(state.canceled);
        assert!(state.user_interrupted);
        assert!(!state.started);

        fx.shell.start();
        assert_eq!(fx.engine.start_count(), 0);
        assert_eq!(fx.engine.cancel_count(), 0);
    }

    #[test]
    fn cancel_closes_surface_before_start() {
        let engine = Arc::new(DemoEngine::new(RunMode::Install));
        let surface = Arc::new(RecordingSurface::default());
        let (marshal, _pump) = UiMarshal::for_current_thread();
        let shell = ShellController::builder(engine, Arc::new(DialogRegistry::new()))
            .surface(surface.clone(), marshal)
            .build();

        shell.cancel();
        assert!(surface.is_closed());
    }

    #[test]
    fn cancel_after_start_answers_cancel_until_end() {
        let fx = headless_fixture(DemoEngine::new(RunMode::Install), &four_dialogs());
        fx.shell.go_to(DialogId::PROGRESS);
        fx.shell.start();
        fx.shell.start();
        assert_eq!(fx.engine.start_count(), 1);

        fx.shell.cancel();
        fx.shell.cancel();
        assert_eq!(fx.engine.cancel_count(), 1);
        assert!(!fx.shell.is_finished());

        let answer = fx
            .shell
            .process_message(message(InstallMessage::ActionStart, &["InstallFiles"]));
        assert_eq!(answer, MessageResult::Cancel);

        // The completion report goes to the dialog; the cancel disposition ends with it.
        let answer = fx
            .shell
            .process_message(message(InstallMessage::InstallEnd, &["Demo Product", "2"]));
        assert_eq!(answer, MessageResult::Ok);
        let state = fx.shell.run_state();
        assert!(state.finished);
        assert!(state.user_interrupted);

        let answer = fx
            .shell
            .process_message(message(InstallMessage::ActionStart, &["Cleanup"]));
        assert_eq!(answer, MessageResult::Ok);
        assert!(fx
            .journal
            .events()
            .contains(&"message Progress ActionStart".to_string()));
    }

    struct Starter {
        journal: Arc<Journal>,
    }

    impl ManagedDialog for Starter {
        fn title(&self) -> String {
            "Starter".to_string()
        }

        fn view(&self) -> DialogView {
            DialogView::default()
        }

        fn on_command(&mut self, shell: &ShellController, command: DialogCommand) {
            self.journal.push(format!("command {:?}", command));
            shell.start();
            self.journal.push("command done".to_string());
        }

        fn on_execute_started(&mut self, _shell: &ShellController) {
            self.journal.push("started".to_string());
        }

        fn on_execute_complete(&mut self, _shell: &ShellController) {
            self.journal.push("complete".to_string());
        }
    }

    #[test]
    fn notifications_raised_inside_a_command_wait_for_it_to_return() {
        let journal = Arc::new(Journal::default());
        let registry = {
            let journal = Arc::clone(&journal);
            DialogRegistry::new().register(DialogId::READY, move || {
                Box::new(Starter {
                    journal: Arc::clone(&journal),
                })
            })
        };
        let shell = ShellController::builder(
            Arc::new(DemoEngine::new(RunMode::Install)),
            Arc::new(registry),
        )
        .dialogs(ManagedDialogs::new(vec![DialogId::READY], vec![]))
        .demo_mode(true)
        .build();
        shell.go_next();

        let (done_tx, done_rx) = std::sync::mpsc::channel();
        let commander = shell.clone();
        thread::spawn(move || {
            commander.send_command(DialogCommand::Next);
            let _ = done_tx.send(());
        });
        assert!(
            done_rx.recv_timeout(Duration::from_secs(3)).is_ok(),
            "command did not return"
        );

        assert_eq!(
            journal.events(),
            vec![
                "command Next".to_string(),
                "command done".to_string(),
                "started".to_string(),
                "complete".to_string(),
            ]
        );
        assert!(shell.is_finished());
    }

    #[test]
    fn engine_messages_change_run_state_only_on_the_ui_context() {
        let engine = Arc::new(DemoEngine::new(RunMode::Install));
        let (marshal, pump) = UiMarshal::for_current_thread();
        let shell = ShellController::builder(engine, Arc::new(DialogRegistry::new()))
            .dialogs(ManagedDialogs::new(vec![DialogId::WELCOME], vec![]))
            .surface(Arc::new(RecordingSurface::default()), marshal)
            .build();

        let sender = shell.clone();
        let engine_thread = thread::spawn(move || {
            sender.process_message(message(
                InstallMessage::Info,
                &["User canceled installation"],
            ));
            sender.process_message(message(InstallMessage::InstallEnd, &["Demo Product", "3"]));
        });

        thread::sleep(Duration::from_millis(100));
        let state = shell.run_state();
        assert!(!state.user_interrupted);
        assert!(!state.error_detected);
        assert!(!state.finished);

        let deadline = Instant::now() + Duration::from_secs(10);
        while !engine_thread.is_finished() {
            assert!(Instant::now() < deadline, "engine thread still blocked");
            pump.pump_timeout(Duration::from_millis(10));
        }
        engine_thread.join().unwrap();

        let state = shell.run_state();
        assert!(state.user_interrupted);
        assert!(state.error_detected);
        assert!(state.finished);
    }

    #[test]
    fn demo_mode_never_starts_the_engine() {
        let engine = Arc::new(DemoEngine::new(RunMode::Install));
        let shell = ShellController::builder(engine.clone(), Arc::new(DialogRegistry::new()))
            .demo_mode(true)
            .build();
        shell.start();
        assert!(shell.is_started());
        assert!(shell.is_finished());
        assert_eq!(engine.start_count(), 0);
    }

    #[test]
    fn execute_started_refreshes_install_dir_then_notifies() {
        let fx = headless_fixture(DemoEngine::new(RunMode::Install), &four_dialogs());
        fx.shell.go_to(DialogId::PROGRESS);
        fx.shell.on_execute_started();
        assert_eq!(fx.engine.install_dir_refreshes(), 1);
        assert!(fx.journal.events().contains(&"started Progress".to_string()));
    }

    // ----------------------------------------------------------------------
    // Show
    // ----------------------------------------------------------------------

    fn shown_with(engine: DemoEngine) -> (ShellController, Arc<RecordingSurface>) {
        let journal = Arc::new(Journal::default());
        let surface = Arc::new(RecordingSurface::default());
        let (marshal, _pump) = UiMarshal::for_current_thread();
        let shell = ShellController::builder(
            Arc::new(engine),
            Arc::new(probe_registry(&four_dialogs(), &journal)),
        )
        .dialogs(ManagedDialogs::new(four_dialogs(), vec![]))
        .surface(surface.clone(), marshal)
        .build();
        shell.show_modal().unwrap();
        (shell, surface)
    }

    #[test]
    fn show_starts_on_first_dialog() {
        let (shell, _) = shown_with(DemoEngine::new(RunMode::Install));
        assert_eq!(shell.current_index(), 0);
    }

    #[test]
    fn show_honours_client_handler_results() {
        let (skip, _) = shown_with(
            DemoEngine::new(RunMode::Install).with_client_handler(
                ClientEvent::UiInitialized,
                ActionResult::SkipRemainingActions,
            ),
        );
        assert_eq!(skip.current_dialog(), Some(DialogId::PROGRESS));

        let (exit, _) = shown_with(
            DemoEngine::new(RunMode::Install)
                .with_client_handler(ClientEvent::UiInitialized, ActionResult::UserExit),
        );
        assert_eq!(exit.current_dialog(), Some(DialogId::EXIT));

        let (failed, surface) = shown_with(
            DemoEngine::new(RunMode::Install)
                .with_client_handler(ClientEvent::UiInitialized, ActionResult::Failure),
        );
        assert_eq!(failed.current_index(), -1);
        assert!(surface.titles.lock().unwrap().is_empty());

        let (loaded_failure, _) = shown_with(
            DemoEngine::new(RunMode::Install)
                .with_client_handler(ClientEvent::UiLoaded, ActionResult::Failure),
        );
        assert_eq!(loaded_failure.current_index(), 0);
        assert!(loaded_failure.log_text().contains("UILoaded returned Failure"));
    }

    #[test]
    fn show_restores_runtime_data_and_culture() {
        let (shell, _) = shown_with(
            DemoEngine::new(RunMode::Install)
                .with_properties("ProductLanguage=1031")
                .with_store_value(RUNTIME_DATA_SLOT, r#"{"INSTALLDIR":"/srv/app"}"#),
        );
        assert_eq!(shell.ui_culture(), Some(1031));
        assert_eq!(shell.runtime_data().get("INSTALLDIR"), Some("/srv/app"));
    }

    #[test]
    fn headless_show_runs_engine_to_completion() {
        let engine = Arc::new(
            DemoEngine::new(RunMode::Headless).with_script(DemoEngine::standard_script()),
        );
        let shell = ShellController::builder(engine.clone(), Arc::new(DialogRegistry::new()))
            .surface(Arc::new(RecordingSurface::default()), UiMarshal::inline())
            .build();
        assert!(shell.surface().is_none(), "no dialogs means no surface");

        let bridge: Arc<dyn EngineEventSink> = Arc::new(EngineBridge::new(shell.clone()));
        engine.attach(&bridge);

        let state = shell.show_modal().unwrap();
        engine.join();

        assert!(state.started);
        assert!(state.finished);
        assert!(!state.error_detected);
        assert!(shell.log_text().contains("InstallEnd: Demo Product 1"));
    }

    // ----------------------------------------------------------------------
    // Cross-context behaviour
    // ----------------------------------------------------------------------

    #[test]
    fn engine_thread_events_run_on_ui_thread_in_order() {
        let engine = Arc::new(
            DemoEngine::new(RunMode::Install).with_script(DemoEngine::standard_script()),
        );
        let journal = Arc::new(Journal::default());
        let dialogs = vec![DialogId::PROGRESS, DialogId::EXIT];
        let surface = Arc::new(RecordingSurface::default());
        let (marshal, pump) = UiMarshal::for_current_thread();
        let shell = ShellController::builder(
            engine.clone(),
            Arc::new(probe_registry(&dialogs, &journal)),
        )
        .dialogs(ManagedDialogs::new(dialogs.clone(), vec![]))
        .surface(surface, marshal)
        .build();
        let bridge: Arc<dyn EngineEventSink> = Arc::new(EngineBridge::new(shell.clone()));
        engine.attach(&bridge);

        shell.go_next();
        shell.start();

        let deadline = Instant::now() + Duration::from_secs(10);
        while !journal.events().contains(&"complete Progress".to_string()) {
            assert!(Instant::now() < deadline, "engine did not complete");
            pump.pump_timeout(Duration::from_millis(10));
        }
        engine.join();

        let ui_thread = thread::current().id();
        assert!(journal.threads.lock().unwrap().iter().all(|t| *t == ui_thread));

        let events = journal.events();
        assert_eq!(events[1], "started Progress");
        assert_eq!(events.last().map(String::as_str), Some("complete Progress"));

        let progress = journal.progress.lock().unwrap().clone();
        assert!(progress.windows(2).all(|w| w[0] <= w[1]), "{:?}", progress);
        assert_eq!(progress.last(), Some(&100));

        let state = shell.run_state();
        assert!(state.finished);
        assert!(!state.user_interrupted);
    }
}
