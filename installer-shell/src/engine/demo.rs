// Scripted demo engine
//
// Stands in for a real installation engine: an in-memory property bag, localization table and
// store slot, and a scripted message stream replayed on its own thread when execution starts.

use crate::engine::{
    ActionResult, ClientEvent, EngineEventSink, InstallerEngine, StoreError, INSTALL_END_ERROR,
    INSTALL_END_SUCCESS, INSTALL_END_USER_CANCEL,
};
use crate::models::message::{
    EngineMessage, InstallMessage, MessageButtons, MessageIcon, MessageRecord, MessageResult,
};
use crate::shell::sequence::RunMode;
use log::{error, info, warn};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;

pub struct DemoEngine {
    mode: RunMode,
    properties: Mutex<HashMap<String, String>>,
    strings: HashMap<String, String>,
    store: Mutex<HashMap<String, String>>,
    seal_store_on_start: bool,
    store_sealed: AtomicBool,
    script: Vec<EngineMessage>,
    step_delay: Duration,
    handler_results: HashMap<ClientEvent, ActionResult>,
    sink: Mutex<Option<Weak<dyn EngineEventSink>>>,
    cancel_requested: Arc<AtomicBool>,
    starts: AtomicUsize,
    cancels: AtomicUsize,
    install_dir_refreshes: AtomicUsize,
    worker: Mutex<Option<JoinHandle<()>>>,
}

fn lock<T: ?Sized>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl DemoEngine {
    pub fn new(mode: RunMode) -> Self {
        let strings = [
            ("ProductName", "Demo Product"),
            ("ErrorDlg_Title", "Installer Information"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        Self {
            mode,
            properties: Mutex::new(HashMap::new()),
            strings,
            store: Mutex::new(HashMap::new()),
            seal_store_on_start: true,
            store_sealed: AtomicBool::new(false),
            script: Vec::new(),
            step_delay: Duration::ZERO,
            handler_results: HashMap::new(),
            sink: Mutex::new(None),
            cancel_requested: Arc::new(AtomicBool::new(false)),
            starts: AtomicUsize::new(0),
            cancels: AtomicUsize::new(0),
            install_dir_refreshes: AtomicUsize::new(0),
            worker: Mutex::new(None),
        }
    }

    /// Properties in `Name=Value;Name=Value` form.
    pub fn with_properties(self, spec: &str) -> Self {
        lock(&self.properties).extend(parse_properties(spec));
        self
    }

    pub fn with_string(mut self, key: &str, value: &str) -> Self {
        self.strings.insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_script(mut self, script: Vec<EngineMessage>) -> Self {
        self.script = script;
        self
    }

    pub fn with_step_delay(mut self, delay: Duration) -> Self {
        self.step_delay = delay;
        self
    }

    pub fn with_client_handler(mut self, event: ClientEvent, result: ActionResult) -> Self {
        self.handler_results.insert(event, result);
        self
    }

    /// Pre-seeds the store slot, as if written by an earlier stage.
    pub fn with_store_value(self, slot: &str, value: &str) -> Self {
        lock(&self.store).insert(slot.to_string(), value.to_string());
        self
    }

    /// Whether the store turns read-only once execution starts (the default).
    pub fn with_store_sealed_on_start(mut self, seal: bool) -> Self {
        self.seal_store_on_start = seal;
        self
    }

    /// Where scripted events are delivered. Held weakly; the caller keeps the sink alive.
    pub fn attach(&self, sink: &Arc<dyn EngineEventSink>) {
        *lock(&self.sink) = Some(Arc::downgrade(sink));
    }

    pub fn start_count(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn cancel_count(&self) -> usize {
        self.cancels.load(Ordering::SeqCst)
    }

    pub fn install_dir_refreshes(&self) -> usize {
        self.install_dir_refreshes.load(Ordering::SeqCst)
    }

    pub fn stored(&self, slot: &str) -> Option<String> {
        lock(&self.store).get(slot).cloned()
    }

    /// Waits for the script thread, if one was started.
    pub fn join(&self) {
        let handle = lock(&self.worker).take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                error!("[PHASE: engine] [STEP: execute] Demo script thread panicked");
            }
        }
    }

    /// Typical two-pass install: script generation, then file copy with action data.
    pub fn standard_script() -> Vec<EngineMessage> {
        let mut script = vec![
            msg(InstallMessage::ActionStart, &["InstallValidate", "Validating install", ""]),
            msg(InstallMessage::Progress, &["0", "100", "0", "0"]),
            msg(InstallMessage::Progress, &["2", "60"]),
            msg(InstallMessage::Progress, &["2", "90"]),
            msg(InstallMessage::Info, &["Action ended: InstallValidate. Return value 1."]),
            msg(InstallMessage::Progress, &["0", "200", "0", "0"]),
            msg(InstallMessage::ActionStart, &["InstallFiles", "Copying new files", "File: [1]"]),
            msg(InstallMessage::Progress, &["1", "20", "1"]),
        ];
        for file in ["app.exe", "core.dll", "ui.dll", "readme.txt", "license.rtf"] {
            script.push(msg(InstallMessage::ActionData, &[file]));
        }
        script.push(msg(InstallMessage::Progress, &["2", "50"]));
        script.push(msg(
            InstallMessage::ActionStart,
            &["WriteRegistryValues", "Writing system registry values", ""],
        ));
        script.push(msg(InstallMessage::Progress, &["2", "50"]));
        script.push(msg(InstallMessage::Info, &["Action ended: InstallFiles. Return value 1."]));
        script
    }

    /// Standard script with a retryable warning part way through.
    pub fn script_with_warning(text: &str) -> Vec<EngineMessage> {
        let mut script = Self::standard_script();
        let warning = EngineMessage::new(InstallMessage::Warning, MessageRecord::new([text]))
            .with_buttons(MessageButtons::RetryCancel)
            .with_icon(MessageIcon::Warning);
        script.insert(8, warning);
        script
    }
}

fn msg(kind: InstallMessage, fields: &[&str]) -> EngineMessage {
    EngineMessage::new(kind, MessageRecord::new(fields.iter().copied()))
}

/// Parses `Name=Value;Name=Value`; entries without `=` are skipped.
pub fn parse_properties(spec: &str) -> HashMap<String, String> {
    spec.split(';')
        .filter_map(|pair| {
            let (name, value) = pair.split_once('=')?;
            let name = name.trim();
            if name.is_empty() {
                return None;
            }
            Some((name.to_string(), value.trim().to_string()))
        })
        .collect()
}

impl InstallerEngine for DemoEngine {
    fn is_installing(&self) -> bool {
        self.mode == RunMode::Install
    }

    fn is_repairing(&self) -> bool {
        self.mode == RunMode::Modify
    }

    fn property(&self, name: &str) -> Option<String> {
        lock(&self.properties).get(name).cloned()
    }

    fn localize(&self, key: &str) -> Option<String> {
        self.strings
            .get(key)
            .cloned()
            .or_else(|| self.property(key))
    }

    fn start_execute(&self) {
        self.starts.fetch_add(1, Ordering::SeqCst);
        if self.seal_store_on_start {
            self.store_sealed.store(true, Ordering::SeqCst);
        }

        let sink = lock(&self.sink).as_ref().and_then(Weak::upgrade);
        let Some(sink) = sink else {
            warn!("[PHASE: engine] [STEP: execute] No event sink attached; nothing to execute");
            return;
        };

        let script = self.script.clone();
        let delay = self.step_delay;
        let cancel = Arc::clone(&self.cancel_requested);
        let spawned = thread::Builder::new()
            .name("demo-engine".to_string())
            .spawn(move || run_script(sink, script, delay, cancel));

        match spawned {
            Ok(handle) => *lock(&self.worker) = Some(handle),
            Err(e) => error!(
                "[PHASE: engine] [STEP: execute] Failed to spawn demo engine thread: {}",
                e
            ),
        }
    }

    fn cancel_execute(&self) {
        self.cancels.fetch_add(1, Ordering::SeqCst);
        self.cancel_requested.store(true, Ordering::SeqCst);
        info!("[PHASE: engine] [STEP: cancel] Cancel requested");
    }

    fn refresh_install_dir(&self) {
        self.install_dir_refreshes.fetch_add(1, Ordering::SeqCst);
    }

    fn read_store(&self, slot: &str) -> Result<Option<String>, StoreError> {
        Ok(lock(&self.store).get(slot).cloned())
    }

    fn write_store(&self, slot: &str, value: &str) -> Result<(), StoreError> {
        if self.store_sealed.load(Ordering::SeqCst) {
            return Err(StoreError::Rejected(
                "execution has started; the store is read-only".to_string(),
            ));
        }
        lock(&self.store).insert(slot.to_string(), value.to_string());
        Ok(())
    }

    fn invoke_client_handlers(&self, event: ClientEvent) -> ActionResult {
        self.handler_results
            .get(&event)
            .copied()
            .unwrap_or(ActionResult::Success)
    }
}

fn run_script(
    sink: Arc<dyn EngineEventSink>,
    script: Vec<EngineMessage>,
    delay: Duration,
    cancel: Arc<AtomicBool>,
) {
    info!(
        "[PHASE: engine] [STEP: execute] Demo script started ({} messages)",
        script.len()
    );
    sink.on_execute_started();

    let mut status = INSTALL_END_SUCCESS;
    for message in script {
        if cancel.load(Ordering::SeqCst) {
            status = INSTALL_END_USER_CANCEL;
            break;
        }
        match sink.on_message(message) {
            MessageResult::Cancel => {
                status = INSTALL_END_USER_CANCEL;
                break;
            }
            MessageResult::Abort => {
                status = INSTALL_END_ERROR;
                break;
            }
            _ => {}
        }
        if !delay.is_zero() {
            thread::sleep(delay);
        }
    }

    if status == INSTALL_END_USER_CANCEL {
        sink.on_message(msg(InstallMessage::Info, &["Action ended: User canceled installation."]));
    }
    sink.on_message(msg(InstallMessage::InstallEnd, &["Demo Product", status]));
    sink.on_execute_complete();
    info!("[PHASE: engine] [STEP: execute] Demo script finished (status={})", status);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
        answer: Mutex<Option<(InstallMessage, MessageResult)>>,
    }

    impl EngineEventSink for Recorder {
        fn on_message(&self, message: EngineMessage) -> MessageResult {
            lock(&self.events).push(format!("{}: {}", message.kind, message.record));
            match *lock(&self.answer) {
                Some((kind, result)) if kind == message.kind => result,
                _ => MessageResult::Ok,
            }
        }

        fn on_execute_started(&self) {
            lock(&self.events).push("started".to_string());
        }

        fn on_execute_complete(&self) {
            lock(&self.events).push("complete".to_string());
        }

        fn on_progress(&self, _percent: i32) {}
    }

    #[test]
    fn properties_parse_from_pairs() {
        let props = parse_properties("ProductLanguage=1033; INSTALLDIR = C:\\App ;junk;=x");
        assert_eq!(props.len(), 2);
        assert_eq!(props["ProductLanguage"], "1033");
        assert_eq!(props["INSTALLDIR"], "C:\\App");
    }

    #[test]
    fn localize_falls_back_to_properties() {
        let engine = DemoEngine::new(RunMode::Install).with_properties("Manufacturer=Acme");
        assert_eq!(engine.localize("ProductName").as_deref(), Some("Demo Product"));
        assert_eq!(engine.localize("Manufacturer").as_deref(), Some("Acme"));
        assert_eq!(engine.localize("Nope"), None);
    }

    #[test]
    fn script_runs_to_success_status() {
        let engine = DemoEngine::new(RunMode::Install)
            .with_script(vec![msg(InstallMessage::Info, &["hello"])]);
        let recorder = Arc::new(Recorder::default());
        let sink: Arc<dyn EngineEventSink> = recorder.clone();
        engine.attach(&sink);

        engine.start_execute();
        engine.join();

        let events = lock(&recorder.events).clone();
        assert_eq!(
            events,
            vec![
                "started".to_string(),
                "Info: hello".to_string(),
                "InstallEnd: Demo Product 1".to_string(),
                "complete".to_string(),
            ]
        );
    }

    #[test]
    fn cancel_answer_ends_with_user_cancel_status() {
        let engine = DemoEngine::new(RunMode::Install).with_script(DemoEngine::standard_script());
        let recorder = Arc::new(Recorder::default());
        *lock(&recorder.answer) = Some((InstallMessage::ActionStart, MessageResult::Cancel));
        let sink: Arc<dyn EngineEventSink> = recorder.clone();
        engine.attach(&sink);

        engine.start_execute();
        engine.join();

        let events = lock(&recorder.events).clone();
        let tail: Vec<&str> = events.iter().rev().take(3).map(String::as_str).collect();
        assert_eq!(tail[0], "complete");
        assert_eq!(tail[1], "InstallEnd: Demo Product 2");
        assert!(tail[2].contains("User canceled installation"));
    }

    #[test]
    fn aborted_warning_ends_with_error_status() {
        let engine = DemoEngine::new(RunMode::Install)
            .with_script(DemoEngine::script_with_warning("Could not reach the update server."));
        let recorder = Arc::new(Recorder::default());
        *lock(&recorder.answer) = Some((InstallMessage::Warning, MessageResult::Abort));
        let sink: Arc<dyn EngineEventSink> = recorder.clone();
        engine.attach(&sink);

        engine.start_execute();
        engine.join();

        let events = lock(&recorder.events).clone();
        assert!(events.contains(&"Warning: Could not reach the update server.".to_string()));
        assert!(!events.iter().any(|e| e.contains("WriteRegistryValues")));
        assert!(events.contains(&"InstallEnd: Demo Product 3".to_string()));
    }

    #[test]
    fn store_turns_read_only_once_started() {
        let engine = DemoEngine::new(RunMode::Modify);
        engine.write_store("slot", "{}").unwrap();
        assert_eq!(engine.stored("slot").as_deref(), Some("{}"));

        // No sink attached: nothing runs, but the stage has moved on.
        engine.start_execute();
        assert!(matches!(
            engine.write_store("slot", "{\"a\":\"1\"}"),
            Err(StoreError::Rejected(_))
        ));
        assert_eq!(engine.read_store("slot").unwrap().as_deref(), Some("{}"));
        assert!(engine.is_repairing());
        assert!(!engine.is_installing());
    }
}
