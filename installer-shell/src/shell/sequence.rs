// Dialog sequences
//
// A dialog identity says what a screen is, not how it is drawn; the dialog factory maps
// identities to concrete dialogs. The sequence for a run is fixed when the shell is shown.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DialogId(&'static str);

impl DialogId {
    pub const WELCOME: DialogId = DialogId("Welcome");
    pub const LICENSE: DialogId = DialogId("License");
    pub const MAINTENANCE_TYPE: DialogId = DialogId("MaintenanceType");
    pub const READY: DialogId = DialogId("Ready");
    pub const PROGRESS: DialogId = DialogId("Progress");
    pub const EXIT: DialogId = DialogId("Exit");

    pub const fn new(name: &'static str) -> Self {
        DialogId(name)
    }

    pub fn name(&self) -> &'static str {
        self.0
    }

    /// Stock identity by name, case-insensitive.
    pub fn stock(name: &str) -> Option<DialogId> {
        [
            DialogId::WELCOME,
            DialogId::LICENSE,
            DialogId::MAINTENANCE_TYPE,
            DialogId::READY,
            DialogId::PROGRESS,
            DialogId::EXIT,
        ]
        .into_iter()
        .find(|id| id.0.eq_ignore_ascii_case(name.trim()))
    }
}

impl fmt::Display for DialogId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// Whether the engine runs a fresh install or services an existing installation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Install,
    Modify,
    /// Neither installing nor repairing (e.g. silent uninstall); no dialogs are shown.
    Headless,
}

impl RunMode {
    pub fn from_flags(is_installing: bool, is_repairing: bool) -> Self {
        if is_installing {
            RunMode::Install
        } else if is_repairing {
            RunMode::Modify
        } else {
            RunMode::Headless
        }
    }
}

/// The two candidate lists a package declares.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ManagedDialogs {
    pub install: Vec<DialogId>,
    pub modify: Vec<DialogId>,
}

impl ManagedDialogs {
    pub fn new(install: Vec<DialogId>, modify: Vec<DialogId>) -> Self {
        Self { install, modify }
    }

    /// Welcome, License, Ready, Progress, Exit for installs; MaintenanceType, Ready, Progress,
    /// Exit for repair/modify.
    pub fn stock() -> Self {
        Self {
            install: vec![
                DialogId::WELCOME,
                DialogId::LICENSE,
                DialogId::READY,
                DialogId::PROGRESS,
                DialogId::EXIT,
            ],
            modify: vec![
                DialogId::MAINTENANCE_TYPE,
                DialogId::READY,
                DialogId::PROGRESS,
                DialogId::EXIT,
            ],
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DialogSequence {
    dialogs: Vec<DialogId>,
}

impl DialogSequence {
    pub fn new(dialogs: Vec<DialogId>) -> Self {
        Self { dialogs }
    }

    pub fn for_mode(candidates: &ManagedDialogs, is_installing: bool, is_repairing: bool) -> Self {
        match RunMode::from_flags(is_installing, is_repairing) {
            RunMode::Install => Self::new(candidates.install.clone()),
            RunMode::Modify => Self::new(candidates.modify.clone()),
            RunMode::Headless => Self::default(),
        }
    }

    pub fn count(&self) -> usize {
        self.dialogs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dialogs.is_empty()
    }

    /// Position of `id`, or -1 when the sequence does not contain it.
    pub fn index_of(&self, id: DialogId) -> isize {
        self.dialogs
            .iter()
            .position(|d| *d == id)
            .map(|i| i as isize)
            .unwrap_or(-1)
    }

    pub fn contains(&self, id: DialogId) -> bool {
        self.dialogs.contains(&id)
    }

    pub fn get(&self, index: isize) -> Option<DialogId> {
        if index < 0 {
            return None;
        }
        self.dialogs.get(index as usize).copied()
    }

    pub fn in_range(&self, index: isize) -> bool {
        index >= 0 && (index as usize) < self.dialogs.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = DialogId> + '_ {
        self.dialogs.iter().copied()
    }
}
