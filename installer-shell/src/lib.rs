// Installer UI shell
// Main library entry point

pub mod config;
pub mod engine;
pub mod models;
pub mod shell;
pub mod tui;
pub mod utils;

use crate::config::{ShellConfig, UiPreference};
use crate::engine::bridge::EngineBridge;
use crate::engine::demo::DemoEngine;
use crate::engine::EngineEventSink;
use crate::models::message::EngineMessage;
use crate::models::state::RunState;
use crate::shell::marshal::UiMarshal;
use crate::shell::sequence::{DialogId, ManagedDialogs, RunMode};
use crate::shell::ShellController;
use log::{error, info, warn};
use std::io::IsTerminal;
use std::sync::Arc;
use std::time::Duration;

/// Initialize logging system with dual format (JSON + human-readable)
fn init_logging(with_stdout: bool) -> Result<(), Box<dyn std::error::Error>> {
    let log_dir = utils::path_resolver::resolve_log_folder()?;
    std::fs::create_dir_all(&log_dir)?;

    let timestamp = chrono::Utc::now().format("%Y-%m-%d-%H%M%S");

    // JSON log file for structured parsing
    let json_log_file = log_dir.join(format!("installer-shell-{}.log", timestamp));

    // Human-readable log file (.txt)
    let txt_log_file = log_dir.join(format!("installer-shell-{}.txt", timestamp));

    // Configure dual-format logging:
    // - JSON format to .log file
    // - Human-readable format to .txt file
    // - Optional: human-readable to stdout (disabled for TUI to avoid corrupting the terminal UI)
    let mut dispatch = fern::Dispatch::new().level(log::LevelFilter::Debug);

    if with_stdout {
        dispatch = dispatch.chain(
            fern::Dispatch::new()
                .level(log::LevelFilter::Info)
                .format(move |out, message, record| {
                    let timestamp_local = chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f");
                    let message_str = format!("{}", message);
                    let (phase, step, cleaned_message) =
                        utils::logging::parse_log_metadata(&message_str);
                    let txt_line = utils::logging::format_human_readable_log(
                        &timestamp_local.to_string(),
                        record.level(),
                        record.target(),
                        &cleaned_message,
                        phase.as_deref(),
                        step.as_deref(),
                    );
                    out.finish(format_args!("{}", txt_line));
                })
                .chain(std::io::stdout()),
        );
    }

    dispatch = dispatch
        .chain(
            fern::Dispatch::new()
                .format(move |out, message, record| {
                    let timestamp_utc = chrono::Utc::now().to_rfc3339();
                    let message_str = format!("{}", message);
                    let (phase, step, cleaned_message) =
                        utils::logging::parse_log_metadata(&message_str);
                    let current = std::thread::current();
                    let json_line = utils::logging::format_json_log(
                        &timestamp_utc,
                        record.level(),
                        record.target(),
                        &cleaned_message,
                        phase.as_deref(),
                        step.as_deref(),
                        current.name(),
                    );
                    out.finish(format_args!("{}\n", json_line));
                })
                .chain(fern::log_file(json_log_file)?),
        )
        .chain(
            fern::Dispatch::new()
                .format(move |out, message, record| {
                    let timestamp_local = chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f");
                    let message_str = format!("{}", message);
                    let (phase, step, cleaned_message) =
                        utils::logging::parse_log_metadata(&message_str);
                    let txt_line = utils::logging::format_human_readable_log(
                        &timestamp_local.to_string(),
                        record.level(),
                        record.target(),
                        &cleaned_message,
                        phase.as_deref(),
                        step.as_deref(),
                    );
                    out.finish(format_args!("{}\n", txt_line));
                })
                .chain(fern::log_file(txt_log_file)?),
        );

    dispatch.apply()?;

    log::info!(
        "[PHASE: initialization] Logging initialized, log directory: {:?}",
        log_dir
    );
    Ok(())
}

fn start_logging(with_stdout: bool, what: &str) {
    if let Err(e) = init_logging(with_stdout) {
        eprintln!("Failed to initialize logging: {}", e);
    }

    info!(
        "[PHASE: initialization] {} starting at {}",
        what,
        chrono::Utc::now()
    );
    info!(
        "[PHASE: initialization] [STEP: deployment_folder] Deployment folder: {:?}",
        utils::path_resolver::resolve_deployment_folder()
    );
}

fn load_config() -> ShellConfig {
    match ShellConfig::load() {
        Ok(config) => config,
        Err(e) => {
            warn!(
                "[PHASE: initialization] [STEP: config] Invalid configuration, using defaults: {}",
                e
            );
            ShellConfig::default()
        }
    }
}

fn scripted_engine(
    mode: RunMode,
    config: &ShellConfig,
    script: Vec<EngineMessage>,
) -> Arc<DemoEngine> {
    Arc::new(
        DemoEngine::new(mode)
            .with_script(script)
            .with_step_delay(Duration::from_millis(config.demo_step_delay_ms)),
    )
}

/// Comma separated stock dialog names; unknown names are skipped.
pub fn parse_dialog_list(list: &str) -> Vec<DialogId> {
    list.split(',')
        .filter(|name| !name.trim().is_empty())
        .filter_map(|name| {
            let id = DialogId::stock(name);
            if id.is_none() {
                warn!(
                    "[PHASE: initialization] [STEP: play] Unknown dialog '{}' skipped",
                    name.trim()
                );
            }
            id
        })
        .collect()
}

/// Shows the terminal shell on the calling thread with the engine attached through a bridge.
fn run_terminal_shell(
    engine: Arc<DemoEngine>,
    dialogs: ManagedDialogs,
    config: ShellConfig,
    demo: bool,
) -> anyhow::Result<RunState> {
    let (marshal, pump) = UiMarshal::for_current_thread();
    let view = Arc::new(tui::TerminalShellView::interactive(pump));
    let shell = ShellController::builder(engine.clone(), Arc::new(tui::dialogs::terminal_family()))
        .dialogs(dialogs)
        .surface(view, marshal)
        .config(config)
        .demo_mode(demo)
        .build();

    let bridge: Arc<dyn EngineEventSink> = Arc::new(EngineBridge::new(shell.clone()));
    engine.attach(&bridge);

    let state = shell.show_modal()?;
    engine.join();
    report(&shell, &state);
    Ok(state)
}

fn report(shell: &ShellController, state: &RunState) {
    info!(
        "[PHASE: shell] [STEP: complete] Run {} ended: {:?} ({} log line(s))",
        shell.run_id(),
        state.outcome(),
        shell.log().len()
    );
}

fn exit_on_error(result: anyhow::Result<RunState>, step: &str) {
    if let Err(e) = result {
        error!("[PHASE: shell] [STEP: {}] Shell exited with error: {:?}", step, e);
        eprintln!("Installer error: {}", e);
        std::process::exit(1);
    }
}

/// Interactive terminal run against the scripted engine.
pub fn run_demo(mode: RunMode) {
    // Initialize logging (no stdout to avoid corrupting the TUI)
    start_logging(false, "Terminal demo shell");

    let config = load_config();
    // The warning exercises the prompt modal part way through the copy.
    let script = DemoEngine::script_with_warning("Could not reach the update server.");
    let engine = scripted_engine(mode, &config, script);
    exit_on_error(
        run_terminal_shell(engine, ManagedDialogs::stock(), config, false),
        "demo",
    );
}

/// Headless run: no dialogs, the shell starts execution at once and waits for the engine.
pub fn run_headless_demo() {
    start_logging(true, "Headless demo shell");

    let config = load_config();
    let engine = scripted_engine(RunMode::Install, &config, DemoEngine::standard_script());
    let shell = ShellController::builder(
        engine.clone(),
        Arc::new(tui::dialogs::terminal_family()),
    )
    .config(config)
    .build();

    let bridge: Arc<dyn EngineEventSink> = Arc::new(EngineBridge::new(shell.clone()));
    engine.attach(&bridge);

    let result = shell.show_modal();
    engine.join();
    if let Ok(state) = &result {
        report(&shell, state);
        println!("{}", shell.log_text());
    }
    exit_on_error(result, "headless");
}

/// Walks the given dialogs in the terminal without ever starting the engine.
pub fn run_play(list: &str, properties: Option<String>) {
    start_logging(false, "Terminal play shell");

    let properties = properties.unwrap_or_default();
    info!(
        "[PHASE: initialization] [STEP: play] Dialogs: {} Properties: {}",
        list,
        utils::logging::mask_property_list(&properties)
    );

    let ids = parse_dialog_list(list);
    if ids.is_empty() {
        eprintln!("Installer error: no known dialogs in '{}'", list);
        std::process::exit(2);
    }

    let config = load_config();
    let engine = Arc::new(DemoEngine::new(RunMode::Install).with_properties(&properties));
    exit_on_error(
        run_terminal_shell(engine, ManagedDialogs::new(ids.clone(), ids), config, true),
        "play",
    );
}

/// Non-interactive TUI smoke mode (for automated checks).
/// Renders a single frame to stdout and exits.
pub fn run_smoke(target: Option<String>) {
    // Initialize logging (no stdout: the frame itself goes there)
    start_logging(false, "Terminal smoke");

    let target = target.as_deref().unwrap_or("welcome");
    match tui::smoke(target) {
        Ok(frame) => print!("{}", frame),
        Err(e) => {
            error!(
                "[PHASE: tui] [STEP: smoke] TUI smoke exited with error: {:?}",
                e
            );
            eprintln!("Installer error: {}", e);
            std::process::exit(1);
        }
    }
}

/// No explicit mode: honour the configured UI preference.
pub fn run_default() {
    let preference = ShellConfig::load().map(|c| c.ui).unwrap_or_default();
    let interactive = std::io::stdin().is_terminal() && std::io::stdout().is_terminal();

    match preference {
        UiPreference::Tui => run_demo(RunMode::Install),
        UiPreference::Headless => run_headless_demo(),
        UiPreference::Auto if interactive => run_demo(RunMode::Install),
        UiPreference::Auto => run_headless_demo(),
    }
}
