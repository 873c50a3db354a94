// Dialog capability contract
//
// The controller only ever talks to dialogs through `ManagedDialog`. Which concrete family
// satisfies it (terminal dialogs, test doubles, ...) is decided when the shell is composed, by
// handing it a `DialogFactory`.

use crate::models::message::{EngineMessage, MessageResult};
use crate::models::state::RunState;
use crate::shell::sequence::DialogId;
use crate::shell::surface::{Prompt, Size};
use crate::shell::ShellController;
use std::collections::HashMap;
use std::sync::Arc;

/// User gesture routed to the active dialog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialogCommand {
    Back,
    Next,
    Cancel,
    /// Flip the dialog's checkbox, if it has one.
    Toggle,
    Up,
    Down,
}

/// What the shell surface draws for the active dialog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DialogView {
    pub heading: String,
    pub body: Vec<String>,
    pub progress: Option<u8>,
    pub back_enabled: bool,
    pub next_enabled: bool,
    pub cancel_enabled: bool,
    pub next_label: String,
}

impl Default for DialogView {
    fn default() -> Self {
        Self {
            heading: String::new(),
            body: Vec::new(),
            progress: None,
            back_enabled: true,
            next_enabled: true,
            cancel_enabled: true,
            next_label: "Next".to_string(),
        }
    }
}

/// Passed to a dialog when it is mounted into the shell.
pub struct MountContext<'a> {
    pub size: Size,
    pub localizer: &'a dyn Fn(&str) -> String,
    /// Run state at activation; summary dialogs read the outcome from it.
    pub state: RunState,
}

impl MountContext<'_> {
    pub fn localize(&self, text: &str) -> String {
        (self.localizer)(text)
    }
}

pub trait ManagedDialog: Send {
    /// Unlocalized title; the shell localizes it and shows it as the window title.
    fn title(&self) -> String;

    /// Size to the client area and localize content.
    fn mount(&mut self, _ctx: &MountContext<'_>) {}

    fn view(&self) -> DialogView;

    fn on_command(&mut self, shell: &ShellController, command: DialogCommand) {
        match command {
            DialogCommand::Back => shell.go_prev(),
            DialogCommand::Next => shell.go_next(),
            DialogCommand::Cancel => shell.cancel(),
            DialogCommand::Toggle | DialogCommand::Up | DialogCommand::Down => {}
        }
    }

    fn on_execute_started(&mut self, _shell: &ShellController) {}

    fn on_execute_complete(&mut self, _shell: &ShellController) {}

    fn on_progress(&mut self, _shell: &ShellController, _percent: u8) {}

    fn process_message(
        &mut self,
        _shell: &ShellController,
        _message: &EngineMessage,
    ) -> MessageResult {
        MessageResult::Ok
    }
}

pub trait DialogFactory: Send + Sync {
    fn create(&self, id: DialogId) -> Option<Box<dyn ManagedDialog>>;
}

type DialogConstructor = Arc<dyn Fn() -> Box<dyn ManagedDialog> + Send + Sync>;

/// Identity -> constructor table; the usual way to assemble a dialog family.
#[derive(Clone, Default)]
pub struct DialogRegistry {
    constructors: HashMap<DialogId, DialogConstructor>,
}

impl DialogRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(mut self, id: DialogId, constructor: F) -> Self
    where
        F: Fn() -> Box<dyn ManagedDialog> + Send + Sync + 'static,
    {
        self.constructors.insert(id, Arc::new(constructor));
        self
    }

    pub fn knows(&self, id: DialogId) -> bool {
        self.constructors.contains_key(&id)
    }
}

impl DialogFactory for DialogRegistry {
    fn create(&self, id: DialogId) -> Option<Box<dyn ManagedDialog>> {
        self.constructors.get(&id).map(|ctor| ctor())
    }
}

/// Answers Error/Warning/User prompts on behalf of the engine.
pub trait MessageHandler: Send {
    fn handle(&mut self, shell: &ShellController, message: &EngineMessage) -> MessageResult;
}

/// Plain modal message box through the shell surface.
#[derive(Debug, Default)]
pub struct DefaultMessageDialog;

impl MessageHandler for DefaultMessageDialog {
    fn handle(&mut self, shell: &ShellController, message: &EngineMessage) -> MessageResult {
        let prompt = Prompt {
            title: shell.localize(&shell.config().error_dialog_title),
            text: message.record.to_string(),
            buttons: message.buttons,
            icon: message.icon,
            default_button: message.default_button,
        };

        shell
            .surface()
            .and_then(|surface| surface.prompt(&prompt))
            .unwrap_or_else(|| prompt.default_choice())
    }
}
