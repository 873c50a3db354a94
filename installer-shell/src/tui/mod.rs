//! Terminal shell surface.
//!
//! - Centered "installer window" frame titled with the active dialog's title
//! - Dialog heading, body and (on the progress dialog) a gauge
//! - Bottom button row: [ Back ] [ Next ] [ Cancel ]
//! - Modal confirmation for Cancel and modal message boxes for engine prompts
//!
//! Note: Logging is file-only in TUI mode (stdout logging is disabled) to avoid corrupting the
//! terminal UI.

pub mod dialogs;

use crate::engine::demo::DemoEngine;
use crate::models::message::{EngineMessage, InstallMessage, MessageRecord, MessageResult};
use crate::shell::dialog::{DialogCommand, DialogView};
use crate::shell::marshal::{UiMarshal, UiPump};
use crate::shell::sequence::{DialogId, RunMode};
use crate::shell::surface::{Prompt, ShellSurface, Size};
use crate::shell::ShellController;
use anyhow::{anyhow, bail, Result};
use crossterm::event::{self, Event, KeyCode};
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use crossterm::ExecutableCommand;
use log::{info, warn};
use ratatui::backend::{CrosstermBackend, TestBackend};
use ratatui::layout::{Alignment, Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{Block, Borders, Gauge, Paragraph, Wrap};
use ratatui::Terminal;
use std::io::{self, Stdout};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

const WINDOW_WIDTH: u16 = 100;
const WINDOW_HEIGHT: u16 = 30;

type CrosstermTerminal = Terminal<CrosstermBackend<Stdout>>;

fn lock<T: ?Sized>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ButtonFocus {
    Back,
    Next,
    Cancel,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Modal {
    ConfirmCancel { yes: bool },
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct PromptState {
    prompt: Prompt,
    selected: usize,
}

#[derive(Debug, Clone)]
struct ViewState {
    title: String,
    focus: ButtonFocus,
    modal: Option<Modal>,
    prompt: Option<PromptState>,
    view: DialogView,
    scroll: u16,
}

impl Default for ViewState {
    fn default() -> Self {
        Self {
            title: "Setup".to_string(),
            focus: ButtonFocus::Next,
            modal: None,
            prompt: None,
            view: DialogView::default(),
            scroll: 0,
        }
    }
}

/// Terminal window the shell mounts its dialogs into.
pub struct TerminalShellView {
    state: Mutex<ViewState>,
    closed: AtomicBool,
    terminal: Mutex<Option<CrosstermTerminal>>,
    pump: Mutex<Option<UiPump>>,
    size: Size,
}

impl TerminalShellView {
    /// Surface for a real terminal; `pump` drains the marshal bound to the thread that will call
    /// `run_modal`.
    pub fn interactive(pump: UiPump) -> Self {
        let (cols, rows) = crossterm::terminal::size().unwrap_or((WINDOW_WIDTH, WINDOW_HEIGHT));
        let window = centered_window(Rect::new(0, 0, cols, rows), WINDOW_WIDTH, WINDOW_HEIGHT);
        Self::with_size(Some(pump), client_area(window))
    }

    /// Surface that never touches the terminal; used for smoke renders and tests.
    pub fn offscreen(size: Size) -> Self {
        Self::with_size(None, size)
    }

    fn with_size(pump: Option<UiPump>, size: Size) -> Self {
        Self {
            state: Mutex::new(ViewState::default()),
            closed: AtomicBool::new(false),
            terminal: Mutex::new(None),
            pump: Mutex::new(pump),
            size,
        }
    }

    pub fn title(&self) -> String {
        lock(&self.state).title.clone()
    }

    /// Pull the active dialog's view. Keeps the previous one while the dialog is busy.
    fn refresh(&self, shell: &ShellController) {
        if let Some(view) = shell.active_view() {
            lock(&self.state).view = view;
        }
    }

    fn snapshot(&self) -> ViewState {
        lock(&self.state).clone()
    }

    fn redraw(&self) -> Result<()> {
        let snapshot = self.snapshot();
        let mut terminal = lock(&self.terminal);
        if let Some(terminal) = terminal.as_mut() {
            terminal.draw(|f| draw(f.size(), f, &snapshot))?;
        }
        Ok(())
    }

    /// Render the active dialog into an in-memory buffer and return it as text, one line per row.
    pub fn render_text(&self, shell: &ShellController, width: u16, height: u16) -> Result<String> {
        self.refresh(shell);
        let snapshot = self.snapshot();

        let backend = TestBackend::new(width, height);
        let mut terminal = Terminal::new(backend)?;
        terminal.draw(|f| draw(f.size(), f, &snapshot))?;
        Ok(buffer_text(&terminal))
    }

    fn event_loop(&self, shell: &ShellController, pump: &UiPump) -> Result<()> {
        let tick_rate = Duration::from_millis(100);
        let mut last_tick = Instant::now();

        while !self.is_closed() {
            pump.pump();
            self.refresh(shell);
            self.redraw()?;

            let timeout = tick_rate
                .checked_sub(last_tick.elapsed())
                .unwrap_or_else(|| Duration::from_millis(0));

            if event::poll(timeout)? {
                if let Event::Key(key) = event::read()? {
                    self.handle_key(shell, key.code);
                }
            }

            if last_tick.elapsed() >= tick_rate {
                last_tick = Instant::now();
            }
        }

        // Answer anything still queued so no engine call is left waiting on a closed window.
        pump.pump();
        Ok(())
    }

    fn handle_key(&self, shell: &ShellController, code: KeyCode) {
        // The state lock is released before any shell call: dialogs call back into the surface.
        let modal = lock(&self.state).modal.clone();
        match modal {
            Some(Modal::ConfirmCancel { yes }) => self.handle_cancel_modal_key(shell, code, yes),
            None => self.handle_dialog_key(shell, code),
        }
    }

    fn handle_cancel_modal_key(&self, shell: &ShellController, code: KeyCode, yes: bool) {
        let confirmed = match code {
            KeyCode::Left | KeyCode::Right | KeyCode::Tab | KeyCode::BackTab => {
                lock(&self.state).modal = Some(Modal::ConfirmCancel { yes: !yes });
                return;
            }
            KeyCode::Char('y') | KeyCode::Char('Y') => true,
            KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => false,
            KeyCode::Enter => yes,
            _ => return,
        };

        lock(&self.state).modal = None;
        if confirmed {
            info!("[PHASE: tui] [STEP: cancel] User confirmed cancel");
            shell.send_command(DialogCommand::Cancel);
        }
    }

    fn handle_dialog_key(&self, shell: &ShellController, code: KeyCode) {
        let (view, focus) = {
            let state = lock(&self.state);
            (state.view.clone(), state.focus)
        };

        match code {
            KeyCode::Left | KeyCode::BackTab => self.move_focus(&view, -1),
            KeyCode::Right | KeyCode::Tab => self.move_focus(&view, 1),
            KeyCode::Char(' ') => shell.send_command(DialogCommand::Toggle),
            KeyCode::Up => shell.send_command(DialogCommand::Up),
            KeyCode::Down => shell.send_command(DialogCommand::Down),
            KeyCode::PageUp => {
                let mut state = lock(&self.state);
                state.scroll = state.scroll.saturating_sub(5);
            }
            KeyCode::PageDown => {
                let mut state = lock(&self.state);
                let max = view.body.len().saturating_sub(1) as u16;
                state.scroll = (state.scroll + 5).min(max);
            }
            KeyCode::Esc => self.request_cancel(&view),
            KeyCode::Enter => match focus {
                ButtonFocus::Back if view.back_enabled => shell.send_command(DialogCommand::Back),
                ButtonFocus::Next if view.next_enabled => shell.send_command(DialogCommand::Next),
                ButtonFocus::Cancel => self.request_cancel(&view),
                _ => {}
            },
            _ => {}
        }
    }

    fn request_cancel(&self, view: &DialogView) {
        if view.cancel_enabled {
            lock(&self.state).modal = Some(Modal::ConfirmCancel { yes: false });
        }
    }

    fn move_focus(&self, view: &DialogView, step: isize) {
        const ORDER: [ButtonFocus; 3] = [ButtonFocus::Back, ButtonFocus::Next, ButtonFocus::Cancel];
        let mut state = lock(&self.state);
        let current = ORDER.iter().position(|b| *b == state.focus).unwrap_or(1) as isize;
        for offset in 1..=ORDER.len() as isize {
            let slot = (current + step * offset).rem_euclid(ORDER.len() as isize);
            let candidate = ORDER[slot as usize];
            if button_enabled(view, candidate) {
                state.focus = candidate;
                return;
            }
        }
    }

    fn prompt_loop(
        &self,
        choices: &[MessageResult],
        fallback: MessageResult,
    ) -> Result<MessageResult> {
        loop {
            self.redraw()?;
            if !event::poll(Duration::from_millis(100))? {
                continue;
            }
            let Event::Key(key) = event::read()? else {
                continue;
            };

            let mut state = lock(&self.state);
            let Some(prompt) = state.prompt.as_mut() else {
                return Ok(fallback);
            };
            match key.code {
                KeyCode::Left | KeyCode::BackTab => {
                    prompt.selected = (prompt.selected + choices.len() - 1) % choices.len();
                }
                KeyCode::Right | KeyCode::Tab => {
                    prompt.selected = (prompt.selected + 1) % choices.len();
                }
                KeyCode::Enter => return Ok(choices[prompt.selected]),
                KeyCode::Esc if choices.contains(&MessageResult::Cancel) => {
                    return Ok(MessageResult::Cancel)
                }
                _ => {}
            }
        }
    }
}

impl ShellSurface for TerminalShellView {
    fn client_size(&self) -> Size {
        self.size
    }

    fn set_title(&self, title: &str) {
        lock(&self.state).title = title.to_string();
    }

    fn dialog_changed(&self, dialog: DialogId) {
        let mut state = lock(&self.state);
        state.focus = ButtonFocus::Next;
        state.scroll = 0;
        state.modal = None;
        info!("[PHASE: tui] [STEP: dialog] Showing {}", dialog);
    }

    fn prompt(&self, prompt: &Prompt) -> Option<MessageResult> {
        if lock(&self.terminal).is_none() {
            return None;
        }

        let choices = prompt.buttons.choices();
        let fallback = prompt.default_choice();
        if choices.is_empty() {
            return Some(fallback);
        }
        let selected = choices.iter().position(|c| *c == fallback).unwrap_or(0);
        lock(&self.state).prompt = Some(PromptState {
            prompt: prompt.clone(),
            selected,
        });

        let answer = self.prompt_loop(choices, fallback);
        lock(&self.state).prompt = None;

        match answer {
            Ok(answer) => {
                info!(
                    "[PHASE: tui] [STEP: prompt] '{}' answered {}",
                    prompt.title,
                    answer.label()
                );
                Some(answer)
            }
            Err(e) => {
                warn!("[PHASE: tui] [STEP: prompt] Prompt failed: {}", e);
                None
            }
        }
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn run_modal(&self, shell: &ShellController) -> Result<()> {
        let pump = lock(&self.pump)
            .take()
            .ok_or_else(|| anyhow!("Terminal view has no UI pump (offscreen or already shown)"))?;

        info!("[PHASE: tui] [STEP: start] Starting terminal shell");
        *lock(&self.terminal) = Some(setup_terminal()?);

        let result = self.event_loop(shell, &pump);

        if let Some(mut terminal) = lock(&self.terminal).take() {
            restore_terminal(&mut terminal)?;
        }
        result
    }
}

fn setup_terminal() -> Result<CrosstermTerminal> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    stdout.execute(EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let terminal = Terminal::new(backend)?;
    Ok(terminal)
}

fn restore_terminal(terminal: &mut CrosstermTerminal) -> Result<()> {
    disable_raw_mode()?;
    terminal.backend_mut().execute(LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    Ok(())
}

fn button_enabled(view: &DialogView, button: ButtonFocus) -> bool {
    match button {
        ButtonFocus::Back => view.back_enabled,
        ButtonFocus::Next => view.next_enabled,
        ButtonFocus::Cancel => view.cancel_enabled,
    }
}

fn centered_window(area: Rect, width: u16, height: u16) -> Rect {
    let w = width.min(area.width.saturating_sub(2)).max(60);
    let h = height.min(area.height.saturating_sub(2)).max(20);
    let x = area.x + (area.width.saturating_sub(w)) / 2;
    let y = area.y + (area.height.saturating_sub(h)) / 2;
    Rect {
        x,
        y,
        width: w,
        height: h,
    }
}

/// Space left to a dialog inside the frame, above the button row.
fn client_area(window: Rect) -> Size {
    Size::new(window.width.saturating_sub(2), window.height.saturating_sub(3))
}

fn draw(area: Rect, f: &mut ratatui::Frame<'_>, state: &ViewState) {
    let window_area = centered_window(area, WINDOW_WIDTH, WINDOW_HEIGHT).intersection(area);

    let outer_block = Block::default()
        .borders(Borders::ALL)
        .title(state.title.clone());
    f.render_widget(outer_block, window_area);

    let inner = window_area.inner(&ratatui::layout::Margin {
        vertical: 1,
        horizontal: 1,
    });
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(0), Constraint::Length(1)].as_ref())
        .split(inner);

    draw_dialog(f, rows[0], state);
    draw_buttons(f, rows[1], state);

    if let Some(Modal::ConfirmCancel { yes }) = &state.modal {
        draw_cancel_modal(f, window_area, *yes);
    }
    if let Some(prompt) = &state.prompt {
        draw_message_modal(f, window_area, prompt);
    }
}

fn draw_dialog(f: &mut ratatui::Frame<'_>, area: Rect, state: &ViewState) {
    let view = &state.view;
    let gauge_height = if view.progress.is_some() { 3 } else { 0 };
    let parts = Layout::default()
        .direction(Direction::Vertical)
        .constraints(
            [
                Constraint::Length(2),
                Constraint::Min(0),
                Constraint::Length(gauge_height),
            ]
            .as_ref(),
        )
        .split(area);

    let heading = Paragraph::new(Line::from(Span::styled(
        view.heading.clone(),
        Style::default().add_modifier(Modifier::BOLD),
    )));
    f.render_widget(heading, parts[0]);

    let body: Vec<Line> = view.body.iter().map(|l| Line::from(l.clone())).collect();
    let body = Paragraph::new(Text::from(body))
        .wrap(Wrap { trim: false })
        .scroll((state.scroll, 0));
    f.render_widget(body, parts[1]);

    if let Some(percent) = view.progress {
        let gauge = Gauge::default()
            .block(Block::default().borders(Borders::ALL).title("Progress"))
            .gauge_style(Style::default().fg(Color::Cyan).bg(Color::DarkGray))
            .percent(u16::from(percent.min(100)))
            .label(format!("{}%", percent));
        f.render_widget(gauge, parts[2]);
    }
}

fn draw_buttons(f: &mut ratatui::Frame<'_>, area: Rect, state: &ViewState) {
    let view = &state.view;
    let back = button_text("Back", state.focus == ButtonFocus::Back, view.back_enabled);
    let next = button_text(
        &view.next_label,
        state.focus == ButtonFocus::Next,
        view.next_enabled,
    );
    let cancel = button_text(
        "Cancel",
        state.focus == ButtonFocus::Cancel,
        view.cancel_enabled,
    );

    let line = Line::from(vec![back, Span::raw(" "), next, Span::raw(" "), cancel]);
    let p = Paragraph::new(Text::from(line)).alignment(Alignment::Right);
    f.render_widget(p, area);
}

fn button_text(label: &str, focused: bool, enabled: bool) -> Span<'static> {
    let mut style = Style::default();
    if !enabled {
        style = style.fg(Color::DarkGray);
    }
    if focused && enabled {
        style = style.add_modifier(Modifier::REVERSED);
    }
    Span::styled(format!("[ {} ]", label), style)
}

fn modal_area(window_area: Rect, width: u16, height: u16) -> Rect {
    let modal_w = width.min(window_area.width.saturating_sub(4)).max(40);
    let modal_h = height.min(window_area.height.saturating_sub(4)).max(7);
    let x = window_area.x + (window_area.width.saturating_sub(modal_w)) / 2;
    let y = window_area.y + (window_area.height.saturating_sub(modal_h)) / 2;
    Rect {
        x,
        y,
        width: modal_w,
        height: modal_h,
    }
    .intersection(window_area)
}

fn modal_buttons_area(area: Rect) -> Rect {
    Rect {
        x: area.x + 1,
        y: area.y + area.height.saturating_sub(2),
        width: area.width.saturating_sub(2),
        height: 1,
    }
}

fn draw_cancel_modal(f: &mut ratatui::Frame<'_>, window_area: Rect, yes_focused: bool) {
    let area = modal_area(window_area, 56, 7);

    let block = Block::default()
        .borders(Borders::ALL)
        .title("Cancel Setup?");
    let body = Paragraph::new(Text::from(vec![
        Line::from("Are you sure you want to cancel the installation?"),
        Line::from(""),
        Line::from(""),
    ]))
    .block(block)
    .wrap(Wrap { trim: false });
    f.render_widget(ratatui::widgets::Clear, area);
    f.render_widget(body, area);

    let yes = button_text("Yes, cancel", yes_focused, true);
    let no = button_text("No", !yes_focused, true);
    let line = Line::from(vec![yes, Span::raw(" "), no]);
    let p = Paragraph::new(Text::from(line)).alignment(Alignment::Right);
    f.render_widget(p, modal_buttons_area(area));
}

fn draw_message_modal(f: &mut ratatui::Frame<'_>, window_area: Rect, state: &PromptState) {
    let area = modal_area(window_area, 70, 10);

    let block = Block::default()
        .borders(Borders::ALL)
        .title(state.prompt.title.clone());
    let p = Paragraph::new(Text::from(state.prompt.text.clone()))
        .block(block)
        .wrap(Wrap { trim: false });
    f.render_widget(ratatui::widgets::Clear, area);
    f.render_widget(p, area);

    let mut spans = Vec::new();
    for (i, choice) in state.prompt.buttons.choices().iter().enumerate() {
        if i > 0 {
            spans.push(Span::raw(" "));
        }
        spans.push(button_text(choice.label(), i == state.selected, true));
    }
    let p = Paragraph::new(Text::from(Line::from(spans))).alignment(Alignment::Right);
    f.render_widget(p, modal_buttons_area(area));
}

fn buffer_text(terminal: &Terminal<TestBackend>) -> String {
    let buffer = terminal.backend().buffer();
    let mut out = String::new();
    for y in buffer.area.top()..buffer.area.bottom() {
        for x in buffer.area.left()..buffer.area.right() {
            out.push_str(buffer.get(x, y).symbol());
        }
        out.push('\n');
    }
    out
}

/// Non-interactive smoke mode: render a single frame of a stock dialog and return it as text.
/// Targets: welcome|license|maintenance|ready|progress|exit
pub fn smoke(target: &str) -> Result<String> {
    info!(
        "[PHASE: tui] [STEP: smoke] Rendering single-frame TUI smoke target={}",
        target
    );

    let t = target.trim().to_ascii_lowercase();
    let (mode, dialog) = match t.as_str() {
        "welcome" => (RunMode::Install, DialogId::WELCOME),
        "license" => (RunMode::Install, DialogId::LICENSE),
        "maintenance" | "maintenancetype" => (RunMode::Modify, DialogId::MAINTENANCE_TYPE),
        "ready" => (RunMode::Install, DialogId::READY),
        "progress" => (RunMode::Install, DialogId::PROGRESS),
        "exit" => (RunMode::Install, DialogId::EXIT),
        other => bail!("Unknown smoke target '{}'", other),
    };

    // Use an in-memory backend so this can be executed in CI/tooling without
    // manipulating the real terminal (no raw mode / alternate screen).
    let view = Arc::new(TerminalShellView::offscreen(client_area(Rect::new(
        0,
        0,
        WINDOW_WIDTH,
        WINDOW_HEIGHT,
    ))));
    let shell = ShellController::builder(
        Arc::new(DemoEngine::new(mode)),
        Arc::new(dialogs::terminal_family()),
    )
    .surface(view.clone(), UiMarshal::inline())
    .demo_mode(true)
    .build();

    if dialog == DialogId::EXIT {
        // Walk the demo run so the summary reflects a finished install.
        shell.go_to(DialogId::READY);
        shell.send_command(DialogCommand::Next);
    } else {
        shell.go_to(dialog);
    }

    if dialog == DialogId::PROGRESS {
        shell.process_message(EngineMessage::new(
            InstallMessage::ActionStart,
            MessageRecord::new(["InstallFiles", "Copying new files", "File: [1]"]),
        ));
        shell.process_message(EngineMessage::new(
            InstallMessage::ActionData,
            MessageRecord::new(["demo.dll"]),
        ));
        shell.on_progress(40);
    }

    view.render_text(&shell, WINDOW_WIDTH, WINDOW_HEIGHT)
}
