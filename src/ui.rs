// Terminal status board: one tab per laundry floor

use anyhow::Result;
use crossterm::{
    event::{self, Event, KeyCode, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use laundry_tracker::{FloorSummary, MachineStatus, MachineSummary, MachineType};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Paragraph, Row, Table, TableState},
    Frame, Terminal,
};
use std::io;
use std::time::{Duration, Instant};

/// Board is reloaded at least this often.
const REFRESH_EVERY: Duration = Duration::from_secs(5);

pub struct App {
    pub floors: Vec<FloorSummary>,
    pub current_floor: usize,
    pub state: TableState,
    pub show_detail: bool,
    pub last_error: Option<String>,
}

impl App {
    pub fn new(floors: Vec<FloorSummary>) -> Self {
        let mut app = Self {
            floors,
            current_floor: 0,
            state: TableState::default(),
            show_detail: false,
            last_error: None,
        };
        app.reset_selection();
        app
    }

    fn reset_selection(&mut self) {
        let has_rows = self.floor().map(|f| !f.machines.is_empty()).unwrap_or(false);
        self.state.select(if has_rows { Some(0) } else { None });
    }

    pub fn floor(&self) -> Option<&FloorSummary> {
        self.floors.get(self.current_floor)
    }

    pub fn selected_machine(&self) -> Option<&MachineSummary> {
        let floor = self.floor()?;
        self.state.selected().and_then(|i| floor.machines.get(i))
    }

    /// Swap in fresh data, keeping the same floor and row when they still exist.
    pub fn replace(&mut self, floors: Vec<FloorSummary>) {
        let floor_number = self.floor().map(|f| f.floor);
        let row = self.state.selected();

        self.floors = floors;
        self.last_error = None;
        self.current_floor = floor_number
            .and_then(|n| self.floors.iter().position(|f| f.floor == n))
            .unwrap_or(0);

        let rows = self.floor().map(|f| f.machines.len()).unwrap_or(0);
        match row {
            Some(i) if i < rows => self.state.select(Some(i)),
            _ => self.reset_selection(),
        }
    }

    pub fn toggle_detail(&mut self) {
        self.show_detail = !self.show_detail;
    }

    pub fn next_floor(&mut self) {
        if self.floors.is_empty() {
            return;
        }
        self.current_floor = (self.current_floor + 1) % self.floors.len();
        self.reset_selection();
    }

    pub fn previous_floor(&mut self) {
        if self.floors.is_empty() {
            return;
        }
        self.current_floor = if self.current_floor == 0 {
            self.floors.len() - 1
        } else {
            self.current_floor - 1
        };
        self.reset_selection();
    }

    pub fn next(&mut self) {
        let len = self.floor().map(|f| f.machines.len()).unwrap_or(0);
        if len == 0 {
            return;
        }
        let i = match self.state.selected() {
            Some(i) if i + 1 < len => i + 1,
            _ => 0,
        };
        self.state.select(Some(i));
    }

    pub fn previous(&mut self) {
        let len = self.floor().map(|f| f.machines.len()).unwrap_or(0);
        if len == 0 {
            return;
        }
        let i = match self.state.selected() {
            Some(0) | None => len - 1,
            Some(i) => i - 1,
        };
        self.state.select(Some(i));
    }
}

/// Run the board until `q`. `load` is called on start-up, on `r` and
/// every few seconds.
pub fn run_ui(app: &mut App, mut load: impl FnMut() -> Result<Vec<FloorSummary>>) -> Result<()> {
    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let res = run_app(&mut terminal, app, &mut load);

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    res
}

fn run_app<B: ratatui::backend::Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App,
    load: &mut impl FnMut() -> Result<Vec<FloorSummary>>,
) -> Result<()> {
    let mut last_load = Instant::now();

    loop {
        terminal.draw(|f| ui(f, app))?;

        let wait = REFRESH_EVERY.saturating_sub(last_load.elapsed());
        let mut reload = wait.is_zero();

        if event::poll(wait)? {
            if let Event::Key(key) = event::read()? {
                match key.code {
                    KeyCode::Char('q') | KeyCode::Esc => return Ok(()),
                    KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                        return Ok(())
                    }
                    KeyCode::Enter => app.toggle_detail(),
                    KeyCode::Char('r') => reload = true,
                    KeyCode::Tab | KeyCode::Right => app.next_floor(),
                    KeyCode::BackTab | KeyCode::Left => app.previous_floor(),
                    KeyCode::Down | KeyCode::Char('j') => app.next(),
                    KeyCode::Up | KeyCode::Char('k') => app.previous(),
                    _ => {}
                }
            }
        }

        if reload {
            match load() {
                Ok(floors) => app.replace(floors),
                Err(err) => app.last_error = Some(format!("{:#}", err)),
            }
            last_load = Instant::now();
        }
    }
}

fn ui(f: &mut Frame, app: &mut App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Floor tabs
            Constraint::Min(0),    // Machines
            Constraint::Length(3), // Status bar
        ])
        .split(f.size());

    render_header(f, chunks[0], app);

    if app.show_detail {
        let content_chunks = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
            .split(chunks[1]);

        render_table(f, content_chunks[0], app);
        render_detail_panel(f, content_chunks[1], app);
    } else {
        render_table(f, chunks[1], app);
    }

    render_status_bar(f, chunks[2], app);
}

fn status_color(status: MachineStatus) -> Color {
    match status {
        MachineStatus::Idle => Color::Green,
        MachineStatus::InUse => Color::Yellow,
        MachineStatus::Finishing => Color::Cyan,
        MachineStatus::Error => Color::Red,
    }
}

fn render_header(f: &mut Frame, area: Rect, app: &App) {
    let mut tab_spans = vec![];
    for (i, floor) in app.floors.iter().enumerate() {
        if i > 0 {
            tab_spans.push(Span::raw(" │ "));
        }

        let style = if i == app.current_floor {
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD | Modifier::UNDERLINED)
        } else {
            Style::default().fg(Color::DarkGray)
        };

        tab_spans.push(Span::styled(format!("Level {}", floor.floor), style));
    }

    if let Some(floor) = app.floor() {
        tab_spans.push(Span::raw("  |  "));
        tab_spans.push(Span::styled(
            format!("Washers free: {}", floor.available(MachineType::Washer)),
            Style::default().fg(Color::Green),
        ));
        tab_spans.push(Span::raw("  "));
        tab_spans.push(Span::styled(
            format!("Dryers free: {}", floor.available(MachineType::Dryer)),
            Style::default().fg(Color::Green),
        ));
    }

    let header = Paragraph::new(vec![Line::from(tab_spans)]).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Cyan))
            .title(" Laundry "),
    );

    f.render_widget(header, area);
}

fn render_table(f: &mut Frame, area: Rect, app: &mut App) {
    let header_cells = ["Machine", "Position", "Status", "Time left"].iter().map(|h| {
        Cell::from(*h).style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD))
    });
    let header = Row::new(header_cells)
        .style(Style::default().bg(Color::DarkGray))
        .height(1);

    let machines: Vec<MachineSummary> = app.floor().map(|f| f.machines.clone()).unwrap_or_default();
    let rows = machines.iter().map(|m| {
        let color = status_color(m.status);
        let time_left = if m.minutes_left > 0 {
            format!("{} min", m.minutes_left)
        } else {
            "-".to_string()
        };

        Row::new(vec![
            Cell::from(m.label.clone()),
            Cell::from(m.key.pos.to_string()),
            Cell::from(m.status.as_str()).style(Style::default().fg(color)),
            Cell::from(time_left),
        ])
        .height(1)
    });

    let title = app
        .floor()
        .map(|f| format!(" Level {} ", f.floor))
        .unwrap_or_else(|| " No machines ".to_string());

    let table = Table::new(
        rows,
        [
            Constraint::Length(12),
            Constraint::Length(10),
            Constraint::Length(12),
            Constraint::Length(10),
        ],
    )
    .header(header)
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White))
            .title(title),
    )
    .highlight_style(Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD))
    .highlight_symbol("→ ");

    f.render_stateful_widget(table, area, &mut app.state);
}

fn render_detail_panel(f: &mut Frame, area: Rect, app: &App) {
    let lines = match app.selected_machine() {
        Some(m) => vec![
            Line::from(Span::styled(
                m.label.clone(),
                Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
            )),
            Line::from(""),
            Line::from(format!("Key:      {}", m.key)),
            Line::from(format!("Type:     {}", m.machine_type)),
            Line::from(vec![
                Span::raw("Status:   "),
                Span::styled(m.status_text(), Style::default().fg(status_color(m.status))),
            ]),
        ],
        None => vec![Line::from("No machine selected")],
    };

    let panel = Paragraph::new(lines).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Cyan))
            .title(" Details "),
    );

    f.render_widget(panel, area);
}

fn render_status_bar(f: &mut Frame, area: Rect, app: &App) {
    let mut status_spans = vec![];

    match (&app.last_error, app.floor()) {
        (Some(err), _) => status_spans.push(Span::styled(
            format!(" Refresh failed: {} ", err),
            Style::default().fg(Color::Red),
        )),
        (None, Some(floor)) => status_spans.push(Span::styled(
            format!(" Updated {} ", floor.generated_at.format("%H:%M:%S")),
            Style::default().fg(Color::Cyan),
        )),
        (None, None) => {}
    }

    status_spans.push(Span::raw(" | "));
    status_spans.push(Span::styled("Enter", Style::default().fg(Color::Yellow)));
    status_spans.push(Span::raw(" Details | "));
    status_spans.push(Span::styled("Tab", Style::default().fg(Color::Yellow)));
    status_spans.push(Span::raw(" Floor | "));
    status_spans.push(Span::styled("↑/↓", Style::default().fg(Color::Yellow)));
    status_spans.push(Span::raw(" Nav | "));
    status_spans.push(Span::styled("r", Style::default().fg(Color::Yellow)));
    status_spans.push(Span::raw(" Refresh | "));
    status_spans.push(Span::styled("q", Style::default().fg(Color::Red)));
    status_spans.push(Span::raw(" Quit"));

    let status_bar = Paragraph::new(vec![Line::from(status_spans)]).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White)),
    );

    f.render_widget(status_bar, area);
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use laundry_tracker::notify::summarize;
    use laundry_tracker::{default_layout, Machine};

    fn board() -> App {
        let machines: Vec<Machine> = default_layout();
        App::new(summarize(&machines, Utc::now()))
    }

    #[test]
    fn test_starts_on_first_floor() {
        let app = board();
        assert_eq!(app.floor().unwrap().floor, 5);
        assert_eq!(app.selected_machine().unwrap().label, "Washer 1");
    }

    #[test]
    fn test_floor_navigation_wraps() {
        let mut app = board();

        app.previous_floor();
        assert_eq!(app.floor().unwrap().floor, 17);
        app.next_floor();
        assert_eq!(app.floor().unwrap().floor, 5);
    }

    #[test]
    fn test_row_navigation_wraps() {
        let mut app = board();

        app.previous();
        assert_eq!(app.selected_machine().unwrap().label, "Dryer 2");
        app.next();
        assert_eq!(app.selected_machine().unwrap().label, "Washer 1");
    }

    #[test]
    fn test_replace_keeps_position() {
        let mut app = board();
        app.next_floor();
        app.next();

        let machines: Vec<Machine> = default_layout().into_iter().filter(|m| m.floor != 5).collect();
        app.replace(summarize(&machines, Utc::now()));

        assert_eq!(app.floor().unwrap().floor, 8);
        assert_eq!(app.state.selected(), Some(1));
    }

    #[test]
    fn test_empty_board() {
        let mut app = App::new(vec![]);
        app.next();
        app.next_floor();
        assert!(app.selected_machine().is_none());
    }
}
