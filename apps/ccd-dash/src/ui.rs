use std::{
    collections::VecDeque,
    sync::mpsc::{Receiver, TryRecvError},
    time::Duration,
};

use anyhow::Result;
use ccd_client::ClientMetrics;
use ccd_ops::PollCounters;
use ccd_sync::UserAction;
use ccd_types::{
    events::{DashboardEvent, EventPayload},
    geometry::{DisplayRect, DisplaySize},
    view::{DashboardView, SelectionTarget},
};
use crossterm::{
    event::{
        self, DisableMouseCapture, EnableMouseCapture, Event as CEvent, KeyCode, KeyEvent,
        MouseButton, MouseEvent, MouseEventKind,
    },
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{
        canvas::{Canvas, Context, Rectangle},
        Block, Borders, List, ListItem, Paragraph,
    },
    Frame, Terminal,
};
use tokio::sync::mpsc::Sender;

const MAX_LOG_ENTRIES: usize = 120;

pub enum UiMessage {
    Event(DashboardEvent),
    Stats(PollCounters, ClientMetrics),
    Shutdown,
}

pub struct UiSettings {
    pub summary: String,
    pub exposure_time_s: f64,
    pub cooler_setpoint_c: f64,
}

/// Local UI state that never leaves the terminal thread.
struct UiState {
    view: DashboardView,
    stats: PollCounters,
    client: ClientMetrics,
    logs: VecDeque<String>,
    exposure_time_s: f64,
    cooler_setpoint_c: f64,
    /// Inner area of the preview pane from the last draw.
    preview_area: Rect,
    drag_start: Option<(f64, f64)>,
    drag_current: Option<(f64, f64)>,
}

impl UiState {
    fn new(settings: &UiSettings) -> Self {
        Self {
            view: DashboardView::default(),
            stats: PollCounters::default(),
            client: ClientMetrics::default(),
            logs: VecDeque::with_capacity(MAX_LOG_ENTRIES),
            exposure_time_s: settings.exposure_time_s,
            cooler_setpoint_c: settings.cooler_setpoint_c,
            preview_area: Rect::default(),
            drag_start: None,
            drag_current: None,
        }
    }

    fn push_log(&mut self, entry: String) {
        if self.logs.len() == MAX_LOG_ENTRIES {
            self.logs.pop_front();
        }
        self.logs.push_back(entry);
    }

    fn local_point(&self, column: u16, row: u16) -> Option<(f64, f64)> {
        let area = self.preview_area;
        let inside = column >= area.x
            && column < area.x + area.width
            && row >= area.y
            && row < area.y + area.height;
        inside.then(|| ((column - area.x) as f64, (row - area.y) as f64))
    }
}

pub fn run(
    receiver: Receiver<UiMessage>,
    actions: Sender<UserAction>,
    settings: UiSettings,
) -> Result<()> {
    enable_raw_mode()?;
    let mut stdout = std::io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;
    terminal.hide_cursor()?;

    let res = run_loop(&mut terminal, receiver, &actions, &settings);

    terminal.show_cursor()?;
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        DisableMouseCapture,
        LeaveAlternateScreen
    )?;
    let _ = actions.blocking_send(UserAction::Shutdown);
    res
}

fn run_loop<B: ratatui::backend::Backend>(
    terminal: &mut Terminal<B>,
    receiver: Receiver<UiMessage>,
    actions: &Sender<UserAction>,
    settings: &UiSettings,
) -> Result<()> {
    let mut state = UiState::new(settings);

    loop {
        loop {
            match receiver.try_recv() {
                Ok(UiMessage::Event(event)) => apply_event(&mut state, event),
                Ok(UiMessage::Stats(stats, client)) => {
                    state.stats = stats;
                    state.client = client;
                }
                Ok(UiMessage::Shutdown) | Err(TryRecvError::Disconnected) => return Ok(()),
                Err(TryRecvError::Empty) => break,
            }
        }

        let previous_area = state.preview_area;
        terminal.draw(|f| draw(f, &mut state, settings))?;
        if state.preview_area.width != previous_area.width
            || state.preview_area.height != previous_area.height
        {
            send(
                actions,
                UserAction::ResizePreview(DisplaySize::new(
                    state.preview_area.width as f64,
                    state.preview_area.height as f64,
                )),
            );
        }

        if event::poll(Duration::from_millis(100))? {
            match event::read()? {
                CEvent::Key(key) => {
                    if !handle_key(&mut state, key, actions) {
                        break;
                    }
                }
                CEvent::Mouse(mouse) => handle_mouse(&mut state, mouse, actions),
                _ => {}
            }
        }
    }

    Ok(())
}

fn send(actions: &Sender<UserAction>, action: UserAction) {
    if actions.blocking_send(action).is_err() {
        tracing::debug!("sync loop gone; dropping UI action");
    }
}

fn apply_event(state: &mut UiState, event: DashboardEvent) {
    let timestamp = event.timestamp.format("%H:%M:%S");
    match event.payload {
        EventPayload::View(view) => {
            if view.session.selecting.is_none() {
                state.drag_start = None;
                state.drag_current = None;
            }
            state.view = *view;
        }
        EventPayload::Command(command) => {
            let entry = match command.error {
                None => format!("[{timestamp}] {} ok", command.path),
                Some(err) => format!("[{timestamp}] {} FAILED: {err}", command.path),
            };
            state.push_log(entry);
        }
        EventPayload::Lifecycle(lifecycle) => state.push_log(format!(
            "[{timestamp}] {:?} {}",
            lifecycle.phase,
            lifecycle.details.unwrap_or_default()
        )),
    }
}

/// Returns `false` when the UI should close.
fn handle_key(state: &mut UiState, key: KeyEvent, actions: &Sender<UserAction>) -> bool {
    let selecting = state.view.session.selecting.is_some();
    let action = match key.code {
        KeyCode::Char('q') => return false,
        KeyCode::Esc if selecting => UserAction::CancelSelection,
        KeyCode::Esc => return false,
        KeyCode::Char('e') => UserAction::StartExposure,
        KeyCode::Char('c') => UserAction::ToggleContinuous,
        KeyCode::Char('k') => UserAction::StartCooler,
        KeyCode::Char('s') => UserAction::SaveImage,
        KeyCode::Char('a') => UserAction::ToggleAutoSave,
        KeyCode::Char('f') => UserAction::BeginSelection(SelectionTarget::Subframe),
        KeyCode::Char('r') => UserAction::BeginSelection(SelectionTarget::Roi),
        KeyCode::Char('F') => UserAction::ClearSubframe,
        KeyCode::Char('R') => UserAction::ClearRoi,
        KeyCode::Char('+') => {
            state.exposure_time_s *= 2.0;
            UserAction::SetExposureTime(state.exposure_time_s)
        }
        KeyCode::Char('-') => {
            state.exposure_time_s /= 2.0;
            UserAction::SetExposureTime(state.exposure_time_s)
        }
        KeyCode::Char(']') => {
            state.cooler_setpoint_c += 1.0;
            UserAction::SetCoolerSetpoint(state.cooler_setpoint_c)
        }
        KeyCode::Char('[') => {
            state.cooler_setpoint_c -= 1.0;
            UserAction::SetCoolerSetpoint(state.cooler_setpoint_c)
        }
        _ => return true,
    };
    send(actions, action);
    true
}

fn handle_mouse(state: &mut UiState, mouse: MouseEvent, actions: &Sender<UserAction>) {
    if state.view.session.selecting.is_none() {
        return;
    }
    let point = state.local_point(mouse.column, mouse.row);
    match mouse.kind {
        MouseEventKind::Down(MouseButton::Left) => {
            state.drag_start = point;
            state.drag_current = point;
        }
        MouseEventKind::Drag(MouseButton::Left) => {
            if point.is_some() {
                state.drag_current = point;
            }
        }
        MouseEventKind::Up(MouseButton::Left) => {
            let end = point.or(state.drag_current);
            if let (Some(start), Some(end)) = (state.drag_start.take(), end) {
                let rect = DisplayRect::new(start.0, start.1, end.0, end.1);
                send(actions, UserAction::CompleteSelection(rect));
            }
            state.drag_current = None;
        }
        _ => {}
    }
}

fn draw(f: &mut Frame, state: &mut UiState, settings: &UiSettings) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints(
            [
                Constraint::Length(3),
                Constraint::Min(10),
                Constraint::Length(8),
                Constraint::Length(1),
            ]
            .as_ref(),
        )
        .split(f.size());

    f.render_widget(header(state, settings), rows[0]);

    let body = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(55), Constraint::Percentage(45)].as_ref())
        .split(rows[1]);

    let preview_block = Block::default().borders(Borders::ALL).title(preview_title(state));
    state.preview_area = preview_block.inner(body[0]);
    f.render_widget(preview(state).block(preview_block), body[0]);
    f.render_widget(fields(state), body[1]);

    let items: Vec<ListItem> = state
        .logs
        .iter()
        .rev()
        .map(|entry| ListItem::new(entry.clone()))
        .collect();
    let list = List::new(items).block(Block::default().borders(Borders::ALL).title("Requests"));
    f.render_widget(list, rows[2]);

    f.render_widget(footer(state), rows[3]);
}

fn header<'a>(state: &UiState, settings: &'a UiSettings) -> Paragraph<'a> {
    let view = &state.view;
    let status = view
        .field("statusVal")
        .map(str::to_string)
        .unwrap_or_else(|| "waiting for camera".into());
    let capture_style = if view.capture_enabled {
        Style::default().fg(Color::Green)
    } else {
        Style::default().fg(Color::DarkGray)
    };
    let mut spans = vec![
        Span::styled(
            "CCD",
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        ),
        Span::raw("  "),
        Span::raw(status),
        Span::raw("  "),
        Span::styled("[e] capture", capture_style),
        Span::raw("  "),
        Span::styled(format!("[k] {}", view.cooler_label), Style::default().fg(Color::Yellow)),
        Span::raw("  "),
        Span::styled("server:", Style::default().fg(Color::Magenta)),
        Span::raw(" "),
        Span::raw(settings.summary.as_str()),
    ];
    if view.session.loading > 0 {
        spans.push(Span::styled(
            format!("  loading ({})", view.session.loading),
            Style::default().fg(Color::Yellow),
        ));
    }
    if view.session.connection_lost {
        spans.push(Span::styled(
            "  CONNECTION LOST",
            Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
        ));
    }
    Paragraph::new(Line::from(spans)).block(Block::default().borders(Borders::ALL).title("Status"))
}

fn preview_title(state: &UiState) -> String {
    match state.view.session.selecting {
        Some(SelectionTarget::Subframe) => "Preview - drag to select subframe, Esc cancels".into(),
        Some(SelectionTarget::Roi) => "Preview - drag to select ROI, Esc cancels".into(),
        None => "Preview".into(),
    }
}

fn preview(state: &UiState) -> Canvas<'_, impl Fn(&mut Context<'_>) + '_> {
    let width = state.preview_area.width.max(1) as f64;
    let height = state.preview_area.height.max(1) as f64;
    Canvas::default()
        .x_bounds([0.0, width])
        .y_bounds([0.0, height])
        .paint(move |ctx| {
            // Canvas y grows upwards; display y grows downwards.
            let mut draw_rect = |rect: DisplayRect, color: Color| {
                let rect = rect.normalized();
                ctx.draw(&Rectangle {
                    x: rect.x1,
                    y: height - rect.y2,
                    width: rect.x2 - rect.x1,
                    height: rect.y2 - rect.y1,
                    color,
                });
            };
            if let Some(rect) = state.view.subframe_overlay {
                draw_rect(rect, Color::Blue);
            }
            if let Some(rect) = state.view.roi_overlay {
                draw_rect(rect, Color::Green);
            }
            if let (Some(start), Some(end)) = (state.drag_start, state.drag_current) {
                draw_rect(DisplayRect::new(start.0, start.1, end.0, end.1), Color::Yellow);
            }
        })
}

fn fields(state: &UiState) -> List<'static> {
    let items: Vec<ListItem> = field_lines(state).into_iter().map(ListItem::new).collect();
    List::new(items).block(Block::default().borders(Borders::ALL).title("Camera"))
}

fn field_lines(state: &UiState) -> Vec<String> {
    let view = &state.view;
    let mut lines: Vec<String> = view
        .fields
        .iter()
        .map(|(key, value)| format!("{key}: {value}"))
        .collect();
    lines.push(format!(
        "exposure (+/-): {} s   setpoint ([/]): {} C",
        state.exposure_time_s, state.cooler_setpoint_c
    ));
    lines.push(format!(
        "continuous [c]: {}   autosave [a]: {}",
        if view.session.continuous { "on" } else { "off" },
        view.session.autosave.as_deref().unwrap_or("off")
    ));
    for (endpoint, url) in &view.image_urls {
        lines.push(format!("{endpoint:?}: {url}"));
    }
    lines
}

fn footer(state: &UiState) -> Paragraph<'static> {
    Paragraph::new(footer_text(state)).style(Style::default().fg(Color::DarkGray))
}

fn footer_text(state: &UiState) -> String {
    let stats = &state.stats;
    let client = &state.client;
    let latency = client
        .last_latency_ms
        .map(|ms| format!("{ms} ms"))
        .unwrap_or_else(|| "-".into());
    format!(
        "ticks {}  applied {}  dropped {}  failed {}  stale {}  |  http ok {} err {} last {}  |  [f/r] select  [F/R] clear  [s] save  [q] quit",
        stats.ticks,
        stats.applied,
        stats.dropped,
        stats.failed,
        stats.stale,
        client.successful_requests,
        client.failed_requests,
        latency
    )
}
