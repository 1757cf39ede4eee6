mod board_app;

use std::io;
use std::time::Duration;

use board_app::{format_kickoff, format_minutes, format_score, truncate, AppState, ConnectionStatus};
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Paragraph, Row, Table},
    Frame, Terminal,
};

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> io::Result<()> {
    let base_url = std::env::var("API_URL").unwrap_or_else(|_| "http://localhost:3000".to_string());

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()
        .map_err(io::Error::other)?;

    let mut app = AppState::new(base_url);
    app.refresh(&client).await;

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = run_loop(&mut terminal, &mut app, &client).await;

    // Restore terminal regardless of result
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    result
}

// ---------------------------------------------------------------------------
// Main event loop
// ---------------------------------------------------------------------------

async fn run_loop(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut AppState,
    client: &reqwest::Client,
) -> io::Result<()> {
    let refresh_interval = Duration::from_secs(2);
    let mut last_tick = std::time::Instant::now();

    loop {
        terminal.draw(|f| render(f, app))?;

        let timeout = refresh_interval
            .checked_sub(last_tick.elapsed())
            .unwrap_or(Duration::ZERO);

        if event::poll(timeout)? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    match key.code {
                        KeyCode::Char('q') | KeyCode::Char('Q') => return Ok(()),
                        KeyCode::Char('r') | KeyCode::Char('R') => {
                            app.request_refresh(client).await;
                            app.refresh(client).await;
                            last_tick = std::time::Instant::now();
                        }
                        KeyCode::Char('g') | KeyCode::Char('G') => {
                            app.request_goal_test(client).await;
                            app.refresh(client).await;
                        }
                        KeyCode::Char('l') | KeyCode::Char('L') => app.cycle_league(client).await,
                        KeyCode::Left | KeyCode::Char('h') => app.shift_date(client, -1).await,
                        KeyCode::Right => app.shift_date(client, 1).await,
                        _ => {}
                    }
                }
            }
        }

        if last_tick.elapsed() >= refresh_interval {
            app.refresh(client).await;
            last_tick = std::time::Instant::now();
        }
    }
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

fn render(f: &mut Frame, app: &AppState) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // header
            Constraint::Min(0),    // fixtures
            Constraint::Length(1), // footer
        ])
        .split(f.area());

    render_header(f, app, chunks[0]);
    render_fixtures(f, app, chunks[1]);
    render_footer(f, app, chunks[2]);
}

fn mode_color(mode: &str) -> Color {
    match mode {
        "live" => Color::Green,
        "matchday" => Color::Yellow,
        _ => Color::DarkGray,
    }
}

fn render_header(f: &mut Frame, app: &AppState, area: Rect) {
    let (status_text, status_color) = match &app.status {
        ConnectionStatus::Connected => ("● connected".to_string(), Color::Green),
        ConnectionStatus::Connecting => ("◌ connecting".to_string(), Color::Yellow),
        ConnectionStatus::Error(e) => (format!("✗ {}", truncate(e, 40)), Color::Red),
    };

    let mode = if app.sync.mode.is_empty() { "—" } else { app.sync.mode.as_str() };
    let date = app
        .fixtures
        .date
        .map_or("—".to_string(), |d| d.format("%a %d %b").to_string());
    let kickoff = app
        .sync
        .context
        .as_ref()
        .and_then(|c| c.minutes_to_next_kickoff);
    let favorite = app
        .sync
        .favorite
        .name
        .clone()
        .or_else(|| app.sync.favorite.id.clone())
        .unwrap_or_else(|| "none".to_string());
    let sync_marker = if app.sync.in_flight { " ⟳" } else { "" };

    let spans = vec![
        Span::styled(
            " Fixture Board  ",
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
        ),
        Span::styled(status_text, Style::default().fg(status_color)),
        Span::raw("  │  "),
        Span::styled(
            format!("{mode}{sync_marker}"),
            Style::default().fg(mode_color(mode)).add_modifier(Modifier::BOLD),
        ),
        Span::styled(
            format!(" next poll {}s", app.sync.next_delay_secs),
            Style::default().fg(Color::DarkGray),
        ),
        Span::raw("  │  "),
        Span::styled(date, Style::default().fg(Color::White)),
        Span::raw("  │  "),
        Span::styled(app.league_label(), Style::default().fg(Color::White)),
        Span::raw("  │  "),
        Span::styled(
            format!("kickoff in {}", format_minutes(kickoff)),
            Style::default().fg(Color::White),
        ),
        Span::raw("  │  "),
        Span::styled(format!("★ {favorite}"), Style::default().fg(Color::Magenta)),
    ];

    let paragraph = Paragraph::new(Line::from(spans)).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::DarkGray)),
    );
    f.render_widget(paragraph, area);
}

fn render_fixtures(f: &mut Frame, app: &AppState, area: Rect) {
    let header_cells = ["Time", "Home", "Score", "Away", "State", "Status"]
        .iter()
        .map(|h| Cell::from(*h).style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)));
    let header = Row::new(header_cells).height(1);

    let rows: Vec<Row> = app
        .fixtures
        .fixtures
        .iter()
        .map(|fx| {
            let state_color = match fx.state.as_str() {
                "live" => Color::Green,
                "upcoming" => Color::White,
                _ => Color::DarkGray,
            };
            let status = if fx.status.is_empty() { fx.progress.as_str() } else { fx.status.as_str() };
            let score_cell = match &fx.flash {
                Some(flash) => Cell::from(format!("{} ⚽ {}", format_score(fx.home_score, fx.away_score), truncate(&flash.team, 12)))
                    .style(Style::default().fg(Color::Black).bg(Color::Yellow).add_modifier(Modifier::BOLD)),
                None => Cell::from(format_score(fx.home_score, fx.away_score))
                    .style(Style::default().fg(state_color).add_modifier(Modifier::BOLD)),
            };

            Row::new(vec![
                Cell::from(format_kickoff(fx.kickoff.as_deref())).style(Style::default().fg(Color::DarkGray)),
                Cell::from(truncate(&fx.home_team, 22)),
                score_cell,
                Cell::from(truncate(&fx.away_team, 22)),
                Cell::from(fx.state.clone()).style(Style::default().fg(state_color)),
                Cell::from(truncate(status, 12)).style(Style::default().fg(Color::DarkGray)),
            ])
        })
        .collect();

    let title = format!(" FIXTURES ({}) ", app.fixtures.fixtures.len());
    let table = Table::new(
        rows,
        [
            Constraint::Length(6),
            Constraint::Min(12),
            Constraint::Length(22),
            Constraint::Min(12),
            Constraint::Length(9),
            Constraint::Length(13),
        ],
    )
    .header(header)
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::DarkGray))
            .title(Span::styled(
                title,
                Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
            )),
    );

    f.render_widget(table, area);
}

fn render_footer(f: &mut Frame, app: &AppState, area: Rect) {
    let mut spans = vec![
        Span::styled(" [q] ", Style::default().fg(Color::Yellow)),
        Span::raw("quit  "),
        Span::styled("[r] ", Style::default().fg(Color::Yellow)),
        Span::raw("sync now  "),
        Span::styled("[←→] ", Style::default().fg(Color::Yellow)),
        Span::raw("date  "),
        Span::styled("[l] ", Style::default().fg(Color::Yellow)),
        Span::raw("league  "),
        Span::styled("[g] ", Style::default().fg(Color::Yellow)),
        Span::raw("test goal  "),
    ];
    match &app.notice {
        Some(notice) => spans.push(Span::styled(notice.clone(), Style::default().fg(Color::Cyan))),
        None => spans.push(Span::styled("auto-refresh: 2s", Style::default().fg(Color::DarkGray))),
    }
    f.render_widget(Paragraph::new(Line::from(spans)).style(Style::default().fg(Color::White)), area);
}
