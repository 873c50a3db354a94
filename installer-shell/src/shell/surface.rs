// Shell display surface contract
//
// The surface is the window the dialogs are mounted into. All methods are called on the UI
// context (through the marshal), except `run_modal` which *is* the UI context's loop.

use crate::models::message::{MessageButtons, MessageDefaultButton, MessageIcon, MessageResult};
use crate::shell::sequence::DialogId;
use crate::shell::ShellController;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Size {
    pub width: u16,
    pub height: u16,
}

impl Size {
    pub const fn new(width: u16, height: u16) -> Self {
        Self { width, height }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub title: String,
    pub text: String,
    pub buttons: MessageButtons,
    pub icon: MessageIcon,
    pub default_button: MessageDefaultButton,
}

impl Prompt {
    pub fn default_choice(&self) -> MessageResult {
        self.buttons.default_choice(self.default_button)
    }
}

pub trait ShellSurface: Send + Sync {
    /// Area a mounted dialog must fill.
    fn client_size(&self) -> Size;

    fn set_title(&self, title: &str);

    fn dialog_changed(&self, _dialog: DialogId) {}

    /// Modal message box. `None` when the surface cannot ask the user.
    fn prompt(&self, prompt: &Prompt) -> Option<MessageResult>;

    /// Ends the modal loop.
    fn close(&self);

    fn is_closed(&self) -> bool;

    /// Runs the UI loop until `close` is called.
    fn run_modal(&self, shell: &ShellController) -> anyhow::Result<()>;
}
