// Installation engine contract
//
// The engine is opaque to the shell: it reports its run mode, exposes a property bag, a
// localization table and one key/value store slot, and accepts start/cancel commands. Events
// flow the other way through `EngineEventSink` (implemented by `EngineBridge`).

pub mod bridge;
pub mod demo;

use crate::models::message::{EngineMessage, MessageResult};
use thiserror::Error;

/// Store slot holding the serialized runtime data between dialog transitions.
pub const RUNTIME_DATA_SLOT: &str = "SHELL_RUNTIME_DATA";

/// Final-field status of an InstallEnd record. The values belong to the engine protocol.
pub const INSTALL_END_SUCCESS: &str = "1";
pub const INSTALL_END_USER_CANCEL: &str = "2";
pub const INSTALL_END_ERROR: &str = "3";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("engine store rejected the write: {0}")]
    Rejected(String),
    #[error("engine store is unavailable")]
    Unavailable,
}

/// Client-side handler hooks the engine runs while the shell is being shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClientEvent {
    UiInitialized,
    UiLoaded,
}

impl ClientEvent {
    pub fn as_str(self) -> &'static str {
        match self {
            ClientEvent::UiInitialized => "UIInitialized",
            ClientEvent::UiLoaded => "UILoaded",
        }
    }
}

/// Result of a client handler, in the engine's action-result vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionResult {
    Success,
    Failure,
    UserExit,
    SkipRemainingActions,
    NotExecuted,
}

pub trait InstallerEngine: Send + Sync {
    fn is_installing(&self) -> bool;

    fn is_repairing(&self) -> bool;

    fn property(&self, name: &str) -> Option<String>;

    /// Localized string for `key`, if the package carries one.
    fn localize(&self, key: &str) -> Option<String>;

    /// Begins executing the install script. Events arrive on the engine's own context.
    fn start_execute(&self);

    /// Best-effort abort; the engine may ignore it.
    fn cancel_execute(&self);

    /// Re-reads the install directory the user may have changed.
    fn refresh_install_dir(&self) {}

    fn read_store(&self, slot: &str) -> Result<Option<String>, StoreError>;

    fn write_store(&self, slot: &str, value: &str) -> Result<(), StoreError>;

    fn invoke_client_handlers(&self, _event: ClientEvent) -> ActionResult {
        ActionResult::Success
    }
}

/// What the engine calls while executing.
pub trait EngineEventSink: Send + Sync {
    fn on_message(&self, message: EngineMessage) -> MessageResult;

    fn on_execute_started(&self);

    fn on_execute_complete(&self);

    fn on_progress(&self, percent: i32);
}
