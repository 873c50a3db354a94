// Stock terminal dialogs: Welcome, License, MaintenanceType, Ready, Progress, Exit.

use crate::models::message::{EngineMessage, InstallMessage, MessageResult};
use crate::models::state::{RunOutcome, RunState};
use crate::shell::dialog::{DialogCommand, DialogRegistry, DialogView, ManagedDialog, MountContext};
use crate::shell::sequence::DialogId;
use crate::shell::ShellController;

const SETUP_TITLE: &str = "[ProductName] Setup";

const LICENSE_LINES: [&str; 9] = [
    "END-USER LICENSE AGREEMENT",
    "",
    "This is a placeholder license agreement for [ProductName].",
    "",
    "Packages replace this text with their own agreement. The installer only",
    "records whether it was accepted.",
    "",
    "Use PageUp/PageDown to scroll.",
    "",
];

/// Every stock dialog, keyed by its identity.
pub fn terminal_family() -> DialogRegistry {
    DialogRegistry::new()
        .register(DialogId::WELCOME, || Box::<WelcomeDialog>::default())
        .register(DialogId::LICENSE, || Box::<LicenseDialog>::default())
        .register(DialogId::MAINTENANCE_TYPE, || {
            Box::<MaintenanceTypeDialog>::default()
        })
        .register(DialogId::READY, || Box::<ReadyDialog>::default())
        .register(DialogId::PROGRESS, || Box::<ProgressDialog>::default())
        .register(DialogId::EXIT, || Box::<ExitDialog>::default())
}

#[derive(Debug, Default)]
pub struct WelcomeDialog {
    heading: String,
    body: Vec<String>,
}

impl ManagedDialog for WelcomeDialog {
    fn title(&self) -> String {
        SETUP_TITLE.to_string()
    }

    fn mount(&mut self, ctx: &MountContext<'_>) {
        self.heading = ctx.localize("Welcome to the [ProductName] Setup Wizard");
        self.body = vec![
            ctx.localize("The Setup Wizard will install [ProductName] on your computer."),
            String::new(),
            "Click Next to continue or Cancel to exit the Setup Wizard.".to_string(),
        ];
    }

    fn view(&self) -> DialogView {
        DialogView {
            heading: self.heading.clone(),
            body: self.body.clone(),
            back_enabled: false,
            ..DialogView::default()
        }
    }
}

#[derive(Debug, Default)]
pub struct LicenseDialog {
    lines: Vec<String>,
    accepted: bool,
}

impl LicenseDialog {
    pub fn accepted(&self) -> bool {
        self.accepted
    }
}

impl ManagedDialog for LicenseDialog {
    fn title(&self) -> String {
        SETUP_TITLE.to_string()
    }

    fn mount(&mut self, ctx: &MountContext<'_>) {
        self.lines = LICENSE_LINES.iter().map(|l| ctx.localize(l)).collect();
    }

    fn view(&self) -> DialogView {
        let check = if self.accepted { "[x]" } else { "[ ]" };
        let mut body = self.lines.clone();
        body.push(format!("{} I accept the terms in the License Agreement", check));
        body.push(String::new());
        body.push("Space toggles the checkbox.".to_string());
        DialogView {
            heading: "End-User License Agreement".to_string(),
            body,
            next_enabled: self.accepted,
            ..DialogView::default()
        }
    }

    fn on_command(&mut self, shell: &ShellController, command: DialogCommand) {
        match command {
            DialogCommand::Toggle => self.accepted = !self.accepted,
            DialogCommand::Next if !self.accepted => {}
            DialogCommand::Next => {
                shell.set_runtime_value("LicenseAccepted", "1");
                shell.go_next();
            }
            DialogCommand::Back => shell.go_prev(),
            DialogCommand::Cancel => shell.cancel(),
            DialogCommand::Up | DialogCommand::Down => {}
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaintenanceAction {
    Change,
    Repair,
    Remove,
}

impl MaintenanceAction {
    const ALL: [MaintenanceAction; 3] = [
        MaintenanceAction::Change,
        MaintenanceAction::Repair,
        MaintenanceAction::Remove,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            MaintenanceAction::Change => "Change",
            MaintenanceAction::Repair => "Repair",
            MaintenanceAction::Remove => "Remove",
        }
    }

    fn describe(self) -> &'static str {
        match self {
            MaintenanceAction::Change => "Change which program features are installed.",
            MaintenanceAction::Repair => "Repair errors in the most recent installation.",
            MaintenanceAction::Remove => "Remove [ProductName] from your computer.",
        }
    }
}

#[derive(Debug, Default)]
pub struct MaintenanceTypeDialog {
    selected: usize,
    descriptions: Vec<String>,
}

impl MaintenanceTypeDialog {
    pub fn selected(&self) -> MaintenanceAction {
        MaintenanceAction::ALL[self.selected.min(MaintenanceAction::ALL.len() - 1)]
    }
}

impl ManagedDialog for MaintenanceTypeDialog {
    fn title(&self) -> String {
        SETUP_TITLE.to_string()
    }

    fn mount(&mut self, ctx: &MountContext<'_>) {
        self.descriptions = MaintenanceAction::ALL
            .iter()
            .map(|a| ctx.localize(a.describe()))
            .collect();
    }

    fn view(&self) -> DialogView {
        let mut body = vec!["Select the operation you wish to perform.".to_string(), String::new()];
        for (i, action) in MaintenanceAction::ALL.iter().enumerate() {
            let mark = if i == self.selected { "(x)" } else { "( )" };
            body.push(format!("{} {}", mark, action.as_str()));
            if let Some(desc) = self.descriptions.get(i) {
                body.push(format!("    {}", desc));
            }
        }
        body.push(String::new());
        body.push("Use Up/Down to change the selection.".to_string());
        DialogView {
            heading: "Change, repair, or remove installation".to_string(),
            body,
            back_enabled: false,
            ..DialogView::default()
        }
    }

    fn on_command(&mut self, shell: &ShellController, command: DialogCommand) {
        match command {
            DialogCommand::Up => self.selected = self.selected.saturating_sub(1),
            DialogCommand::Down => {
                self.selected = (self.selected + 1).min(MaintenanceAction::ALL.len() - 1)
            }
            DialogCommand::Next => {
                shell.set_runtime_value("MaintenanceType", self.selected().as_str());
                shell.go_next();
            }
            DialogCommand::Back => shell.go_prev(),
            DialogCommand::Cancel => shell.cancel(),
            DialogCommand::Toggle => {}
        }
    }
}

#[derive(Debug, Default)]
pub struct ReadyDialog {
    heading: String,
}

impl ManagedDialog for ReadyDialog {
    fn title(&self) -> String {
        SETUP_TITLE.to_string()
    }

    fn mount(&mut self, ctx: &MountContext<'_>) {
        self.heading = ctx.localize("Ready to install [ProductName]");
    }

    fn view(&self) -> DialogView {
        DialogView {
            heading: self.heading.clone(),
            body: vec![
                "Click Install to begin the installation.".to_string(),
                "Click Back to review or change any of your installation settings.".to_string(),
                "Click Cancel to exit the wizard.".to_string(),
            ],
            next_label: "Install".to_string(),
            ..DialogView::default()
        }
    }

    fn on_command(&mut self, shell: &ShellController, command: DialogCommand) {
        match command {
            // Move first: navigation is frozen once execution has started. Without a dialog
            // to move to there is nothing to show the run on, so it is not started.
            DialogCommand::Next => {
                let from = shell.current_index();
                shell.go_next();
                if shell.current_index() != from {
                    shell.start();
                }
            }
            DialogCommand::Back => shell.go_prev(),
            DialogCommand::Cancel => shell.cancel(),
            _ => {}
        }
    }
}

#[derive(Debug, Default)]
pub struct ProgressDialog {
    heading: String,
    percent: u8,
    action: String,
    detail: String,
    action_template: Option<String>,
    complete: bool,
}

impl ProgressDialog {
    pub fn percent(&self) -> u8 {
        self.percent
    }
}

impl ManagedDialog for ProgressDialog {
    fn title(&self) -> String {
        SETUP_TITLE.to_string()
    }

    fn mount(&mut self, ctx: &MountContext<'_>) {
        self.heading = ctx.localize("Installing [ProductName]");
        self.action = "Please wait while the Setup Wizard prepares the installation.".to_string();
    }

    fn view(&self) -> DialogView {
        DialogView {
            heading: self.heading.clone(),
            body: vec![self.action.clone(), self.detail.clone()],
            progress: Some(self.percent),
            back_enabled: false,
            next_enabled: self.complete,
            cancel_enabled: !self.complete,
            ..DialogView::default()
        }
    }

    fn on_command(&mut self, shell: &ShellController, command: DialogCommand) {
        match command {
            DialogCommand::Next if self.complete => shell.go_next(),
            DialogCommand::Cancel if !self.complete => shell.cancel(),
            _ => {}
        }
    }

    fn on_progress(&mut self, _shell: &ShellController, percent: u8) {
        self.percent = percent;
    }

    fn on_execute_complete(&mut self, shell: &ShellController) {
        self.complete = true;
        shell.go_next();
    }

    fn process_message(
        &mut self,
        _shell: &ShellController,
        message: &EngineMessage,
    ) -> MessageResult {
        match message.kind {
            InstallMessage::ActionStart => {
                let description = message
                    .record
                    .field(2)
                    .filter(|d| !d.trim().is_empty())
                    .or_else(|| message.record.field(1))
                    .unwrap_or_default();
                self.action = description.to_string();
                self.action_template = message
                    .record
                    .field(3)
                    .filter(|t| !t.trim().is_empty())
                    .map(str::to_string);
                self.detail.clear();
            }
            InstallMessage::ActionData => {
                let record = match &self.action_template {
                    Some(template) => message.record.clone().with_template(template.clone()),
                    None => message.record.clone(),
                };
                self.detail = record.to_string();
            }
            _ => {}
        }
        MessageResult::Ok
    }
}

#[derive(Debug, Default)]
pub struct ExitDialog {
    heading: String,
    body: Vec<String>,
}

impl ExitDialog {
    fn summarize(state: &RunState, localize: &dyn Fn(&str) -> String) -> (String, Vec<String>) {
        match state.outcome() {
            RunOutcome::Failed => {
                let mut body = vec![state
                    .custom_error_text
                    .clone()
                    .unwrap_or_else(|| {
                        localize("[ProductName] Setup ended prematurely because of an error.")
                    })];
                if !state.errors.is_empty() {
                    body.push(String::new());
                    body.extend(state.errors.iter().map(|e| format!("  - {}", e)));
                }
                ("Setup failed".to_string(), body)
            }
            RunOutcome::Interrupted => (
                "Setup was interrupted".to_string(),
                vec![localize(
                    "[ProductName] setup was interrupted. Your system has not been modified.",
                )],
            ),
            RunOutcome::Succeeded | RunOutcome::Pending => (
                localize("Completed the [ProductName] Setup Wizard"),
                vec!["Click the Finish button to exit the Setup Wizard.".to_string()],
            ),
        }
    }
}

impl ManagedDialog for ExitDialog {
    fn title(&self) -> String {
        SETUP_TITLE.to_string()
    }

    fn mount(&mut self, ctx: &MountContext<'_>) {
        let (heading, body) = Self::summarize(&ctx.state, ctx.localizer);
        self.heading = heading;
        self.body = body;
    }

    fn view(&self) -> DialogView {
        DialogView {
            heading: self.heading.clone(),
            body: self.body.clone(),
            back_enabled: false,
            cancel_enabled: false,
            next_label: "Finish".to_string(),
            ..DialogView::default()
        }
    }

    fn on_command(&mut self, shell: &ShellController, command: DialogCommand) {
        if command == DialogCommand::Next {
            shell.exit();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::demo::DemoEngine;
    use crate::models::message::MessageRecord;
    use crate::shell::sequence::{ManagedDialogs, RunMode};
    use std::sync::{mpsc, Arc};
    use std::thread;
    use std::time::Duration;

    fn shell(mode: RunMode, demo: bool) -> ShellController {
        ShellController::builder(Arc::new(DemoEngine::new(mode)), Arc::new(terminal_family()))
            .demo_mode(demo)
            .build()
    }

    #[test]
    fn family_covers_every_stock_dialog() {
        let family = terminal_family();
        let stock = ManagedDialogs::stock();
        for id in stock.install.iter().chain(stock.modify.iter()) {
            assert!(family.knows(*id), "missing {}", id);
        }
    }

    #[test]
    fn license_blocks_next_until_accepted() {
        let shell = shell(RunMode::Install, false);
        shell.go_to(DialogId::LICENSE);

        shell.send_command(DialogCommand::Next);
        assert_eq!(shell.current_dialog(), Some(DialogId::LICENSE));
        assert_eq!(shell.active_view().map(|v| v.next_enabled), Some(false));

        shell.send_command(DialogCommand::Toggle);
        shell.send_command(DialogCommand::Next);
        assert_eq!(shell.current_dialog(), Some(DialogId::READY));
        assert_eq!(shell.runtime_data().get("LicenseAccepted"), Some("1"));
    }

    #[test]
    fn maintenance_choice_is_recorded() {
        let shell = shell(RunMode::Modify, false);
        shell.go_next();
        assert_eq!(shell.current_dialog(), Some(DialogId::MAINTENANCE_TYPE));

        shell.send_command(DialogCommand::Down);
        shell.send_command(DialogCommand::Next);
        assert_eq!(shell.runtime_data().get("MaintenanceType"), Some("Repair"));
        assert_eq!(shell.current_dialog(), Some(DialogId::READY));
    }

    #[test]
    fn demo_install_walks_through_to_successful_exit() {
        let shell = shell(RunMode::Install, true);
        shell.go_to(DialogId::READY);

        shell.send_command(DialogCommand::Next);
        assert_eq!(shell.current_dialog(), Some(DialogId::EXIT));
        let view = shell.active_view().unwrap();
        assert_eq!(view.heading, "Completed the Demo Product Setup Wizard");
        assert_eq!(view.next_label, "Finish");

        shell.send_command(DialogCommand::Next);
        assert!(shell.is_finished());
    }

    #[test]
    fn ready_as_last_dialog_does_not_start() {
        let shell = ShellController::builder(
            Arc::new(DemoEngine::new(RunMode::Install)),
            Arc::new(terminal_family()),
        )
        .dialogs(ManagedDialogs::new(
            vec![DialogId::WELCOME, DialogId::READY],
            vec![],
        ))
        .demo_mode(true)
        .build();
        shell.go_to(DialogId::READY);

        let (done_tx, done_rx) = mpsc::channel();
        let commander = shell.clone();
        thread::spawn(move || {
            commander.send_command(DialogCommand::Next);
            let _ = done_tx.send(());
        });
        assert!(done_rx.recv_timeout(Duration::from_secs(3)).is_ok());

        assert_eq!(shell.current_dialog(), Some(DialogId::READY));
        assert!(!shell.is_started());
        assert!(!shell.is_finished());
    }

    #[test]
    fn exit_summarizes_errors() {
        let shell = shell(RunMode::Install, false);
        shell.process_message(EngineMessage::new(
            InstallMessage::Error,
            MessageRecord::new(["disk full"]),
        ));
        shell.go_to(DialogId::EXIT);

        let view = shell.active_view().unwrap();
        assert_eq!(view.heading, "Setup failed");
        assert!(view.body.contains(&"  - disk full".to_string()));
    }

    #[test]
    fn exit_prefers_custom_error_text() {
        let shell = shell(RunMode::Install, false);
        shell.process_message(EngineMessage::new(
            InstallMessage::InstallEnd,
            MessageRecord::new(["Demo Product", "3"]),
        ));
        shell.set_custom_error_text(Some("Database upgrade failed.".to_string()));
        shell.go_to(DialogId::EXIT);

        let view = shell.active_view().unwrap();
        assert_eq!(view.body.first().map(String::as_str), Some("Database upgrade failed."));
    }

    #[test]
    fn progress_tracks_action_text() {
        let shell = shell(RunMode::Install, false);
        shell.go_to(DialogId::PROGRESS);
        shell.process_message(EngineMessage::new(
            InstallMessage::ActionStart,
            MessageRecord::new(["InstallFiles", "Copying new files", "File: [1]"]),
        ));
        shell.process_message(EngineMessage::new(
            InstallMessage::ActionData,
            MessageRecord::new(["core.dll"]),
        ));

        let view = shell.active_view().unwrap();
        assert_eq!(view.body, vec!["Copying new files".to_string(), "File: core.dll".to_string()]);
        assert_eq!(view.progress, Some(0));
        assert!(!view.next_enabled);
    }
}
