use crate::ui::App;
use anyhow::Result;
use crossterm::{
    event::{self, Event, KeyCode, KeyModifiers},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use dns_traffic_analyzer::StatsSnapshot;
use dns_traffic_analyzer::dns::types::{rcode_name, type_name};
use dns_traffic_analyzer::pcap::PacketSource;
use ratatui::{
    Frame, Terminal,
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Paragraph, Row, Sparkline, Table, TableState},
};
use std::io;
use std::time::Duration;

pub async fn run_ui<S: PacketSource>(mut app: App<S>) -> Result<()> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let res = run_app(&mut terminal, &mut app);

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    if let Err(err) = res {
        eprintln!("Error: {err:?}");
    }

    Ok(())
}

fn run_app<B: ratatui::backend::Backend, S: PacketSource>(
    terminal: &mut Terminal<B>,
    app: &mut App<S>,
) -> Result<()>
where
    <B as ratatui::backend::Backend>::Error: Send + Sync + 'static,
{
    let mut table_state = TableState::default();

    loop {
        // One snapshot per frame keeps every panel on the same instant
        let snapshot = app.snapshot();
        let recent_len = snapshot.recent_queries.len();
        terminal.draw(|f| ui(f, app, &snapshot, &mut table_state))?;

        if event::poll(Duration::from_millis(250))?
            && let Event::Key(key) = event::read()?
        {
            match key.code {
                KeyCode::Char('q') => break,
                KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => break,
                KeyCode::Char('c') => app.toggle_capture(),
                KeyCode::Char('r') => {
                    app.reset_stats();
                    table_state.select(None);
                }
                KeyCode::Up | KeyCode::Char('k') => {
                    app.scroll_up();
                    table_state.select(Some(app.scroll_state));
                }
                KeyCode::Down | KeyCode::Char('j') => {
                    app.scroll_down(recent_len);
                    table_state.select(Some(app.scroll_state));
                }
                KeyCode::PageUp => {
                    app.page_up();
                    table_state.select(Some(app.scroll_state));
                }
                KeyCode::PageDown => {
                    app.page_down(recent_len);
                    table_state.select(Some(app.scroll_state));
                }
                KeyCode::Home => {
                    app.home();
                    table_state.select(Some(app.scroll_state));
                }
                KeyCode::End => {
                    app.end(recent_len);
                    table_state.select(Some(app.scroll_state));
                }
                _ => {}
            }
        }
    }

    Ok(())
}

fn ui<S: PacketSource>(
    f: &mut Frame,
    app: &App<S>,
    snapshot: &StatsSnapshot,
    table_state: &mut TableState,
) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Length(12),
            Constraint::Length(9),
            Constraint::Length(6),
            Constraint::Min(0),
            Constraint::Length(3),
        ])
        .split(f.area());

    render_header(f, chunks[0], app, snapshot);
    render_top_lists(f, chunks[1], snapshot);
    render_breakdowns(f, chunks[2], snapshot);
    render_time_series(f, chunks[3], snapshot);
    render_recent(f, chunks[4], snapshot, table_state);
    render_footer(f, chunks[5], app);
}

fn render_header<S: PacketSource>(f: &mut Frame, area: Rect, app: &App<S>, snapshot: &StatsSnapshot) {
    let capture = app.monitor.capture_state();
    let (state_text, state_color) = if capture.capturing {
        ("Capturing", Color::Green)
    } else {
        ("Idle", Color::Red)
    };

    let mut spans = vec![
        Span::styled("DNS Traffic Analyzer", Style::default().fg(Color::Cyan).bold()),
        Span::raw(" | "),
        Span::styled(
            format!("Interface: {}", app.interface),
            Style::default().fg(Color::White),
        ),
        Span::raw(" | "),
        Span::styled(state_text, Style::default().fg(state_color)),
        Span::raw(" | "),
        Span::styled(
            format!("Queries: {}", snapshot.total_queries),
            Style::default().fg(Color::Yellow),
        ),
    ];

    if let Some(err) = capture.last_error {
        spans.push(Span::raw(" | "));
        spans.push(Span::styled(err, Style::default().fg(Color::Red)));
    } else if let Some(message) = &app.status_message {
        spans.push(Span::raw(" | "));
        spans.push(Span::styled(message.clone(), Style::default().fg(Color::Gray)));
    }

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::White));

    let paragraph = Paragraph::new(Line::from(spans)).block(block);
    f.render_widget(paragraph, area);
}

fn render_top_lists(f: &mut Frame, area: Rect, snapshot: &StatsSnapshot) {
    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
        .split(area);

    let domains = snapshot
        .top_domains
        .iter()
        .map(|(domain, count)| (domain.clone(), *count));
    f.render_widget(count_table("Top Domains", "Domain", domains), columns[0]);

    let clients = snapshot
        .top_clients
        .iter()
        .map(|(ip, count)| (ip.to_string(), *count));
    f.render_widget(count_table("Top Clients", "Source IP", clients), columns[1]);
}

fn render_breakdowns(f: &mut Frame, area: Rect, snapshot: &StatsSnapshot) {
    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Ratio(1, 4); 4])
        .split(area);

    let by_type = snapshot
        .queries_by_type
        .iter()
        .map(|(qtype, count)| (type_name(*qtype), *count));
    f.render_widget(count_table("By Type", "Type", by_type), columns[0]);

    let by_protocol = snapshot
        .queries_by_protocol
        .iter()
        .map(|(proto, count)| (proto.clone(), *count));
    f.render_widget(count_table("By Protocol", "Proto", by_protocol), columns[1]);

    let by_port = snapshot
        .queries_by_port
        .iter()
        .map(|(port, count)| (port.to_string(), *count));
    f.render_widget(count_table("By Port", "Port", by_port), columns[2]);

    let by_rcode = snapshot
        .queries_by_rcode
        .iter()
        .map(|(rcode, count)| (rcode.clone(), *count));
    f.render_widget(count_table("By Rcode", "Rcode", by_rcode), columns[3]);
}

/// Two-column key/count table, largest counts first
fn count_table<'a>(
    title: &'a str,
    key_header: &'a str,
    entries: impl Iterator<Item = (String, u64)>,
) -> Table<'a> {
    let mut entries: Vec<(String, u64)> = entries.collect();
    entries.sort_by(|a, b| b.1.cmp(&a.1));

    let header = Row::new(
        [key_header, "Count"]
            .map(|h| Cell::from(h).style(Style::default().fg(Color::Yellow).bold())),
    )
    .style(Style::default().bg(Color::DarkGray))
    .height(1);

    let rows = entries
        .into_iter()
        .map(|(key, count)| Row::new(vec![Cell::from(key), Cell::from(count.to_string())]));

    Table::new(rows, [Constraint::Min(8), Constraint::Length(8)])
        .header(header)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(title)
                .border_style(Style::default().fg(Color::White)),
        )
}

fn render_time_series(f: &mut Frame, area: Rect, snapshot: &StatsSnapshot) {
    let counts: Vec<u64> = snapshot.queries_over_time.iter().map(|b| b.count).collect();

    // Newest buckets are the interesting ones when the panel is narrow
    let width = area.width.saturating_sub(2) as usize;
    let visible = &counts[counts.len().saturating_sub(width)..];

    let title = match (
        snapshot.queries_over_time.first(),
        snapshot.queries_over_time.last(),
    ) {
        (Some(first), Some(last)) => format!(
            "Queries per Minute [{} - {}]",
            first.timestamp.format("%H:%M"),
            last.timestamp.format("%H:%M")
        ),
        _ => "Queries per Minute".to_string(),
    };

    let sparkline = Sparkline::default()
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(title)
                .border_style(Style::default().fg(Color::White)),
        )
        .data(visible.iter().copied())
        .style(Style::default().fg(Color::Green));

    f.render_widget(sparkline, area);
}

fn render_recent(f: &mut Frame, area: Rect, snapshot: &StatsSnapshot, table_state: &mut TableState) {
    let header_cells = [
        "Time",
        "Source",
        "Dest",
        "Proto",
        "Port",
        "Domain",
        "Type",
        "Rcode",
        "Kind",
    ]
    .iter()
    .map(|h| Cell::from(*h).style(Style::default().fg(Color::Yellow).bold()));

    let header = Row::new(header_cells)
        .style(Style::default().bg(Color::DarkGray))
        .height(1);

    fn or_dash<T: ToString>(value: Option<T>) -> String {
        value.map_or_else(|| "-".to_string(), |v| v.to_string())
    }

    // Newest first
    let rows = snapshot.recent_queries.iter().rev().map(|event| {
        let cells = vec![
            Cell::from(event.timestamp.format("%H:%M:%S").to_string()),
            Cell::from(or_dash(event.source_address)),
            Cell::from(or_dash(event.dest_address)),
            Cell::from(event.transport.to_string()),
            Cell::from(or_dash(event.dest_port)),
            Cell::from(event.query_name.clone()),
            Cell::from(type_name(event.query_type)),
            Cell::from(or_dash(event.response_code.map(rcode_name))),
            Cell::from(if event.is_response { "response" } else { "query" }),
        ];
        Row::new(cells).height(1)
    });

    let table = Table::new(
        rows,
        [
            Constraint::Length(9),
            Constraint::Percentage(14),
            Constraint::Percentage(14),
            Constraint::Length(5),
            Constraint::Length(6),
            Constraint::Percentage(30),
            Constraint::Length(6),
            Constraint::Length(9),
            Constraint::Length(8),
        ],
    )
    .header(header)
    .block(
        Block::default()
            .borders(Borders::ALL)
            .title(format!("Recent Queries ({})", snapshot.recent_queries.len()))
            .border_style(Style::default().fg(Color::White)),
    )
    .row_highlight_style(
        Style::default()
            .bg(Color::DarkGray)
            .add_modifier(Modifier::BOLD),
    );

    f.render_stateful_widget(table, area, table_state);
}

fn render_footer<S: PacketSource>(f: &mut Frame, area: Rect, app: &App<S>) {
    let capture_action = if app.is_capturing() { " Stop" } else { " Start" };

    let help_text = Line::from(vec![
        Span::styled("q/Ctrl+C", Style::default().fg(Color::Cyan)),
        Span::raw(" Quit | "),
        Span::styled("c", Style::default().fg(Color::Cyan)),
        Span::raw(capture_action),
        Span::raw(" | "),
        Span::styled("r", Style::default().fg(Color::Cyan)),
        Span::raw(" Reset | "),
        Span::styled("↑↓/jk", Style::default().fg(Color::Cyan)),
        Span::raw(" Navigate"),
    ]);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::White));

    let paragraph = Paragraph::new(help_text).block(block);
    f.render_widget(paragraph, area);
}
