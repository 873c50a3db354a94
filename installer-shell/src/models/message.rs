// Engine message vocabulary
//
// The installation engine talks to the shell through a fixed set of message kinds plus a
// positional record. Field numbering follows the engine protocol: field 0 is the optional
// format template, data fields start at 1.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InstallMessage {
    FatalExit,
    Error,
    Warning,
    User,
    Info,
    FilesInUse,
    ResolveSource,
    OutOfDiskSpace,
    ActionStart,
    ActionData,
    Progress,
    CommonData,
    Initialize,
    Terminate,
    ShowDialog,
    RmFilesInUse,
    InstallStart,
    InstallEnd,
}

impl InstallMessage {
    /// Kinds that need a synchronous answer from the user before the engine proceeds.
    pub fn is_prompt(self) -> bool {
        matches!(
            self,
            InstallMessage::Error | InstallMessage::Warning | InstallMessage::User
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            InstallMessage::FatalExit => "FatalExit",
            InstallMessage::Error => "Error",
            InstallMessage::Warning => "Warning",
            InstallMessage::User => "User",
            InstallMessage::Info => "Info",
            InstallMessage::FilesInUse => "FilesInUse",
            InstallMessage::ResolveSource => "ResolveSource",
            InstallMessage::OutOfDiskSpace => "OutOfDiskSpace",
            InstallMessage::ActionStart => "ActionStart",
            InstallMessage::ActionData => "ActionData",
            InstallMessage::Progress => "Progress",
            InstallMessage::CommonData => "CommonData",
            InstallMessage::Initialize => "Initialize",
            InstallMessage::Terminate => "Terminate",
            InstallMessage::ShowDialog => "ShowDialog",
            InstallMessage::RmFilesInUse => "RmFilesInUse",
            InstallMessage::InstallStart => "InstallStart",
            InstallMessage::InstallEnd => "InstallEnd",
        }
    }
}

impl fmt::Display for InstallMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Disposition returned to the engine for a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageResult {
    None,
    Ok,
    Cancel,
    Abort,
    Retry,
    Ignore,
    Yes,
    No,
}

impl MessageResult {
    pub fn label(self) -> &'static str {
        match self {
            MessageResult::None => "",
            MessageResult::Ok => "OK",
            MessageResult::Cancel => "Cancel",
            MessageResult::Abort => "Abort",
            MessageResult::Retry => "Retry",
            MessageResult::Ignore => "Ignore",
            MessageResult::Yes => "Yes",
            MessageResult::No => "No",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MessageButtons {
    #[default]
    Ok,
    OkCancel,
    AbortRetryIgnore,
    YesNoCancel,
    YesNo,
    RetryCancel,
}

impl MessageButtons {
    /// Dispositions offered by this button set, in display order.
    pub fn choices(self) -> &'static [MessageResult] {
        match self {
            MessageButtons::Ok => &[MessageResult::Ok],
            MessageButtons::OkCancel => &[MessageResult::Ok, MessageResult::Cancel],
            MessageButtons::AbortRetryIgnore => &[
                MessageResult::Abort,
                MessageResult::Retry,
                MessageResult::Ignore,
            ],
            MessageButtons::YesNoCancel => {
                &[MessageResult::Yes, MessageResult::No, MessageResult::Cancel]
            }
            MessageButtons::YesNo => &[MessageResult::Yes, MessageResult::No],
            MessageButtons::RetryCancel => &[MessageResult::Retry, MessageResult::Cancel],
        }
    }

    /// The disposition of the default button, falling back to the first button.
    pub fn default_choice(self, default_button: MessageDefaultButton) -> MessageResult {
        let choices = self.choices();
        choices
            .get(default_button.index())
            .or_else(|| choices.first())
            .copied()
            .unwrap_or(MessageResult::Ok)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MessageIcon {
    #[default]
    None,
    Error,
    Question,
    Warning,
    Information,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MessageDefaultButton {
    #[default]
    Button1,
    Button2,
    Button3,
}

impl MessageDefaultButton {
    pub fn index(self) -> usize {
        match self {
            MessageDefaultButton::Button1 => 0,
            MessageDefaultButton::Button2 => 1,
            MessageDefaultButton::Button3 => 2,
        }
    }
}

/// Positional engine record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageRecord {
    template: Option<String>,
    fields: Vec<String>,
}

impl MessageRecord {
    pub fn new<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            template: None,
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }

    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.template = Some(template.into());
        self
    }

    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    /// 1-based field access; field 0 is the template.
    pub fn field(&self, index: usize) -> Option<&str> {
        if index == 0 {
            return self.template.as_deref();
        }
        self.fields.get(index - 1).map(String::as_str)
    }

    pub fn integer(&self, index: usize) -> Option<i64> {
        self.field(index).and_then(|v| v.trim().parse::<i64>().ok())
    }

    pub fn last_field(&self) -> Option<&str> {
        self.fields.last().map(String::as_str)
    }
}

impl fmt::Display for MessageRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.template {
            Some(template) => {
                let mut text = template.clone();
                for (i, value) in self.fields.iter().enumerate().rev() {
                    text = text.replace(&format!("[{}]", i + 1), value);
                }
                f.write_str(&text)
            }
            None => f.write_str(&self.fields.join(" ")),
        }
    }
}

/// One engine message as delivered to the shell and forwarded to dialogs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineMessage {
    pub kind: InstallMessage,
    pub record: MessageRecord,
    pub buttons: MessageButtons,
    pub icon: MessageIcon,
    pub default_button: MessageDefaultButton,
}

impl EngineMessage {
    pub fn new(kind: InstallMessage, record: MessageRecord) -> Self {
        Self {
            kind,
            record,
            buttons: MessageButtons::default(),
            icon: MessageIcon::default(),
            default_button: MessageDefaultButton::default(),
        }
    }

    pub fn with_buttons(mut self, buttons: MessageButtons) -> Self {
        self.buttons = buttons;
        self
    }

    pub fn with_icon(mut self, icon: MessageIcon) -> Self {
        self.icon = icon;
        self
    }

    pub fn with_default_button(mut self, default_button: MessageDefaultButton) -> Self {
        self.default_button = default_button;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_fields_are_one_based() {
        let rec = MessageRecord::new(["2", "15"]).with_template("[1] of [2]");
        assert_eq!(rec.field(0), Some("[1] of [2]"));
        assert_eq!(rec.field(1), Some("2"));
        assert_eq!(rec.integer(2), Some(15));
        assert_eq!(rec.field(3), None);
        assert_eq!(rec.last_field(), Some("15"));
    }

    #[test]
    fn record_display_uses_template_when_present() {
        let rec = MessageRecord::new(["C:\\app", "42"]).with_template("Copying [1] ([2] MB)");
        assert_eq!(rec.to_string(), "Copying C:\\app (42 MB)");
    }

    #[test]
    fn record_display_without_template_joins_fields() {
        assert_eq!(MessageRecord::new(["disk full"]).to_string(), "disk full");
        assert_eq!(MessageRecord::new(["a", "b"]).to_string(), "a b");
    }

    #[test]
    fn template_placeholder_ten_is_not_clobbered_by_one() {
        let fields: Vec<String> = (1..=10).map(|i| format!("v{}", i)).collect();
        let rec = MessageRecord::new(fields).with_template("[10]|[1]");
        assert_eq!(rec.to_string(), "v10|v1");
    }

    #[test]
    fn default_choice_falls_back_to_first_button() {
        assert_eq!(
            MessageButtons::YesNo.default_choice(MessageDefaultButton::Button2),
            MessageResult::No
        );
        assert_eq!(
            MessageButtons::Ok.default_choice(MessageDefaultButton::Button3),
            MessageResult::Ok
        );
    }

    #[test]
    fn only_error_warning_user_are_prompts() {
        assert!(InstallMessage::Error.is_prompt());
        assert!(InstallMessage::Warning.is_prompt());
        assert!(InstallMessage::User.is_prompt());
        assert!(!InstallMessage::Info.is_prompt());
        assert!(!InstallMessage::InstallEnd.is_prompt());
    }
}
