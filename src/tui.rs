use anyhow::Result;
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEvent, KeyEventKind},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{
    prelude::*,
    text::Line,
    widgets::{Block, Borders, Cell, Clear, Gauge, Paragraph, Row, Table},
};
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::error;

use crate::analysis::{ScanSnapshot, Screener};
use crate::filter_utils::{PageView, ResultFilter, total_pages};
use crate::indicators::{EmaPeriod, EmaScanResult, PriceRelation, percent_to_ema};
use crate::presets::ScanPreset;
use crate::results_table::{format_number, format_percent, format_timestamp};
use crate::scanner::ScanOrchestrator;

type ScanOutcome = Result<Option<ScanSnapshot>>;

// --- App State ---

struct App {
    screener: Arc<Screener>,
    orchestrator: Arc<ScanOrchestrator>,
    snapshot: ScanSnapshot,
    preset: ScanPreset,
    filter: ResultFilter,
    page: usize,
    page_size: usize,
    editing_search: bool,
    // set from spawn until the outcome comes back; covers preset loading,
    // which runs before the orchestrator reports a scan
    scan_pending: bool,
    status: String,
}

impl App {
    fn new(screener: Arc<Screener>, snapshot: ScanSnapshot) -> Self {
        let orchestrator = screener.orchestrator();
        let preset = screener.config.default_preset;
        let page_size = screener.config.scanner.page_size.max(1);
        Self {
            screener,
            orchestrator,
            snapshot,
            preset,
            filter: ResultFilter::default(),
            page: 1,
            page_size,
            editing_search: false,
            scan_pending: false,
            status: String::new(),
        }
    }

    /// Live results while a scan runs or after one ran this session,
    /// otherwise the last saved snapshot.
    fn results(&self) -> Vec<EmaScanResult> {
        let live = self.orchestrator.results();
        if live.is_empty() && !self.orchestrator.is_scanning() {
            self.snapshot.results.clone()
        } else {
            live
        }
    }

    fn is_busy(&self) -> bool {
        self.scan_pending || self.orchestrator.is_scanning()
    }

    fn set_snapshot(&mut self, outcome: ScanOutcome) {
        self.scan_pending = false;
        match outcome {
            Ok(Some(snapshot)) => {
                self.status = format!(
                    "{} symbols scanned for {}",
                    snapshot.results.len(),
                    snapshot.preset
                );
                self.snapshot = snapshot;
            }
            Ok(None) => self.status = "Scan skipped: nothing to scan or already running".to_string(),
            Err(e) => {
                error!("scan pipeline failed: {:#}", e);
                self.status = format!("Scan failed: {}", e);
            }
        }
    }

    fn start_scan(&mut self, tx: &mpsc::Sender<ScanOutcome>) {
        if self.is_busy() {
            return;
        }
        self.scan_pending = true;
        self.page = 1;
        self.status = format!("Scanning {}...", self.preset.description());

        let screener = Arc::clone(&self.screener);
        let preset = self.preset;
        let tx = tx.clone();
        tokio::spawn(async move {
            let outcome = screener
                .run_scan(preset)
                .await
                .map(|done| done.map(|(snapshot, _)| snapshot));
            let _ = tx.send(outcome).await;
        });
    }
}

// --- TUI ---

pub async fn run_tui(screener: Screener) -> Result<()> {
    let snapshot = screener.load_snapshot().await.unwrap_or_default();
    let app = App::new(Arc::new(screener), snapshot);

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let res = run_app(&mut terminal, app).await;

    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;
    res
}

async fn run_app<B: Backend>(terminal: &mut Terminal<B>, mut app: App) -> Result<()> {
    let (scan_tx, mut scan_rx) = mpsc::channel::<ScanOutcome>(1);

    if app.preset != ScanPreset::Custom {
        app.start_scan(&scan_tx);
    }

    loop {
        let results = app.results();
        let filtered = app.filter.apply(&results);
        app.page = app.page.clamp(1, total_pages(filtered.len(), app.page_size));
        terminal.draw(|f| ui(f, &app, &filtered))?;

        if let Ok(outcome) = scan_rx.try_recv() {
            app.set_snapshot(outcome);
        }

        if event::poll(Duration::from_millis(50))? {
            // Resize needs no handling: the next draw picks up the new size.
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press && !handle_key_event(key, &mut app, &scan_tx) {
                    return Ok(());
                }
            }
        }
    }
}

/// Returns `false` when the user asked to quit.
fn handle_key_event(key: KeyEvent, app: &mut App, tx: &mpsc::Sender<ScanOutcome>) -> bool {
    if app.editing_search {
        match key.code {
            KeyCode::Enter | KeyCode::Esc => app.editing_search = false,
            KeyCode::Backspace => {
                app.filter.search.pop();
            }
            KeyCode::Char(c) => app.filter.search.push(c),
            _ => {}
        }
        return true;
    }

    match key.code {
        KeyCode::Char('q') | KeyCode::Esc => return false,
        KeyCode::F(5) | KeyCode::Char('r') => app.start_scan(tx),
        KeyCode::Char('/') => app.editing_search = true,
        KeyCode::Tab => app.filter.relation = app.filter.relation.cycle(),
        KeyCode::Up => app.filter.period = app.filter.period.prev(),
        KeyCode::Down => app.filter.period = app.filter.period.next(),
        KeyCode::Left => app.page = app.page.saturating_sub(1).max(1),
        KeyCode::Right => app.page += 1,
        KeyCode::Char(c) if c.is_ascii_digit() => {
            let digit = c.to_digit(10).unwrap_or(0) as usize;
            if let Some(preset) = digit.checked_sub(1).and_then(|i| ScanPreset::ALL.get(i)) {
                if *preset != app.preset && !app.is_busy() {
                    app.preset = *preset;
                    if app.preset != ScanPreset::Custom {
                        app.start_scan(tx);
                    }
                }
            }
        }
        _ => {}
    }
    true
}

fn relation_style(relation: Option<PriceRelation>) -> Style {
    match relation {
        Some(PriceRelation::Above) => Style::default().fg(Color::Green),
        Some(PriceRelation::Below) => Style::default().fg(Color::Red),
        None => Style::default().fg(Color::DarkGray),
    }
}

fn ui(f: &mut Frame, app: &App, filtered: &[&EmaScanResult]) {
    let main_layout = Layout::horizontal([Constraint::Percentage(20), Constraint::Percentage(80)])
        .split(f.size());

    let right_chunks = Layout::vertical([
        Constraint::Length(3), // last updated + status
        Constraint::Length(3), // filters
        Constraint::Min(0),    // results
        Constraint::Length(1), // pagination
    ])
    .split(main_layout[1]);

    // Sidebar: presets and key help
    let sidebar_block = Block::default()
        .borders(Borders::ALL)
        .title("Presets")
        .title_alignment(Alignment::Center);
    let inner_sidebar_area = sidebar_block.inner(main_layout[0]);
    f.render_widget(sidebar_block, main_layout[0]);

    let sidebar_chunks = Layout::vertical([Constraint::Min(1), Constraint::Length(7)])
        .split(inner_sidebar_area);

    let preset_lines: Vec<Line> = ScanPreset::ALL
        .iter()
        .enumerate()
        .map(|(i, preset)| {
            let style = if *preset == app.preset {
                Style::default().fg(Color::Yellow).bg(Color::DarkGray)
            } else {
                Style::default()
            };
            Line::from(Span::styled(format!("{} {}", i + 1, preset), style))
        })
        .collect();
    f.render_widget(Paragraph::new(preset_lines), sidebar_chunks[0]);

    let help = vec![
        Line::from("F5/r  scan"),
        Line::from("/     search"),
        Line::from("Tab   above/below"),
        Line::from("↑↓    EMA period"),
        Line::from("←→    page"),
        Line::from("q     quit"),
    ];
    f.render_widget(
        Paragraph::new(help).style(Style::default().fg(Color::DarkGray)),
        sidebar_chunks[1],
    );

    // Header
    let time_str = format_timestamp(app.snapshot.last_updated_timestamp);
    f.render_widget(
        Paragraph::new(app.status.as_str()).block(
            Block::default()
                .borders(Borders::ALL)
                .title_alignment(Alignment::Center)
                .title(format!(
                    "{} | Last Updated: {}",
                    app.preset.description(),
                    time_str
                )),
        ),
        right_chunks[0],
    );

    // Filters
    let search_label = if app.editing_search {
        format!("Search: {}_", app.filter.search)
    } else if app.filter.search.is_empty() {
        "Search: (press /)".to_string()
    } else {
        format!("Search: {}", app.filter.search)
    };
    f.render_widget(
        Paragraph::new(format!(
            "{}   Filter: {} {}",
            search_label, app.filter.relation, app.filter.period
        ))
        .block(Block::default().borders(Borders::ALL)),
        right_chunks[1],
    );

    // Results
    let view = PageView::new(filtered, app.page_size, app.page);
    let selected = app.filter.period;

    let mut header_cells = vec![
        Cell::from("#"),
        Cell::from("Symbol"),
        Cell::from("Company"),
        Cell::from("Price"),
    ];
    header_cells.extend(EmaPeriod::ALL.iter().map(|p| Cell::from(p.to_string())));
    header_cells.push(Cell::from(format!("vs {}", selected)));
    let header = Row::new(header_cells).style(Style::default().bg(Color::DarkGray));

    let rows = view.items.iter().enumerate().map(|(i, result)| {
        let mut cells = vec![
            Cell::from(format!("{}", view.first_ordinal + i))
                .style(Style::default().fg(Color::DarkGray)),
            Cell::from(result.symbol.clone()).style(Style::default().fg(Color::Cyan)),
            Cell::from(result.company_name.clone()),
            Cell::from(format!("{:.2}", result.current_price)),
        ];
        cells.extend(EmaPeriod::ALL.iter().map(|p| {
            let mut style = relation_style(result.relation(*p));
            if *p == selected {
                style = style.add_modifier(Modifier::BOLD);
            }
            Cell::from(format_number(result.ema(*p))).style(style)
        }));
        cells.push(
            Cell::from(format_percent(percent_to_ema(
                result.current_price,
                result.ema(selected),
            )))
            .style(relation_style(result.relation(selected))),
        );
        Row::new(cells).height(1)
    });

    f.render_widget(
        Table::new(
            rows,
            [
                Constraint::Length(5),
                Constraint::Length(12),
                Constraint::Min(16),
                Constraint::Length(10),
                Constraint::Length(10),
                Constraint::Length(10),
                Constraint::Length(10),
                Constraint::Length(10),
                Constraint::Length(12),
            ],
        )
        .header(header)
        .block(Block::default().borders(Borders::ALL).title("EMA Scanner")),
        right_chunks[2],
    );

    f.render_widget(
        Paragraph::new(format!(
            "Showing {} - {} of {} results | Page {} of {}",
            view.first_ordinal, view.last_ordinal, view.total_items, view.page, view.total_pages
        ))
        .alignment(Alignment::Center),
        right_chunks[3],
    );

    if app.orchestrator.is_scanning() {
        let progress = app.orchestrator.progress();
        let area = centered_rect(60, 20, main_layout[1]);
        f.render_widget(Clear, area);
        f.render_widget(
            Gauge::default()
                .block(Block::default().title("Scanning").borders(Borders::ALL))
                .gauge_style(Style::default().fg(Color::Cyan))
                .ratio(progress.ratio().clamp(0.0, 1.0))
                .label(format!("{}/{}", progress.completed, progress.total)),
            area,
        );
    }
}

fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::vertical([
        Constraint::Percentage((100 - percent_y) / 2),
        Constraint::Percentage(percent_y),
        Constraint::Percentage((100 - percent_y) / 2),
    ])
    .split(r);
    Layout::horizontal([
        Constraint::Percentage((100 - percent_x) / 2),
        Constraint::Percentage(percent_x),
        Constraint::Percentage((100 - percent_x) / 2),
    ])
    .split(popup_layout[1])[1]
}
