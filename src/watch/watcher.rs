//! Live state watcher (§4.6): polls the state file for a run and redraws a
//! per-spec table until cancelled or the user presses 'q'.
//!
//! Raw mode and the alternate screen are entered once up front and always
//! restored on the way out, including on error; there is no daemon socket
//! to subscribe to, so the whole thing is one poll-and-render loop.

use anyhow::{Context, Result};
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use crossterm::execute;
use crossterm::terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen};
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::widgets::{Block, Borders, Cell, Paragraph, Row, Table};
use ratatui::{Frame, Terminal};
use std::io::{self, Stdout};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::state::model::{RunState, SpecStatus};
use crate::state::store;
use crate::utils::format_elapsed;

const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Poll `dag_path`'s inline state and redraw a table until `cancel` is set
/// or the user quits with 'q'.
pub fn watch(dag_path: &Path, cancel: &Arc<AtomicBool>) -> Result<()> {
    enable_raw_mode().context("failed to enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen).context("failed to enter alternate screen")?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("failed to create terminal")?;

    let result = run_loop(&mut terminal, dag_path, cancel);

    disable_raw_mode().ok();
    execute!(terminal.backend_mut(), LeaveAlternateScreen).ok();
    terminal.show_cursor().ok();

    result
}

fn run_loop(
    terminal: &mut Terminal<CrosstermBackend<Stdout>>,
    dag_path: &Path,
    cancel: &Arc<AtomicBool>,
) -> Result<()> {
    while !cancel.load(Ordering::SeqCst) {
        let loaded = store::load(dag_path);
        terminal.draw(|frame| match &loaded {
            Ok(loaded) => match &loaded.state {
                Some(state) => render_table(frame, frame.area(), state),
                None => render_message(frame, frame.area(), "no run has started yet"),
            },
            Err(e) => render_message(frame, frame.area(), &format!("failed to read state: {e}")),
        })?;

        if event::poll(POLL_INTERVAL)? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press && key.code == KeyCode::Char('q') {
                    return Ok(());
                }
            }
        }
    }
    Ok(())
}

fn render_message(frame: &mut Frame, area: Rect, message: &str) {
    let block = Block::default().title(" weft watch ").borders(Borders::ALL);
    frame.render_widget(Paragraph::new(message).block(block), area);
}

/// Render the id/status/stage/elapsed/last-update table for one run.
pub fn render_table(frame: &mut Frame, area: Rect, state: &RunState) {
    let block = Block::default()
        .title(format!(" {} ({}) ", state.dag_id, state.status))
        .title_style(Style::default().add_modifier(Modifier::BOLD))
        .borders(Borders::ALL);

    let mut ids: Vec<&String> = state.specs.keys().collect();
    ids.sort();

    if ids.is_empty() {
        frame.render_widget(Paragraph::new("no specs").block(block), area);
        return;
    }

    let header = Row::new(vec!["Id", "Status", "Stage", "Elapsed", "Last update"])
        .style(Style::default().add_modifier(Modifier::BOLD))
        .bottom_margin(1);

    let now = chrono::Utc::now();
    let rows: Vec<Row> = ids
        .iter()
        .map(|id| {
            let spec = &state.specs[*id];
            let stage = spec.current_stage.as_deref().unwrap_or("-");
            let elapsed = match (spec.started_at, spec.completed_at) {
                (Some(start), Some(end)) => format_elapsed(end.signed_duration_since(start).num_seconds()),
                (Some(start), None) => format_elapsed(now.signed_duration_since(start).num_seconds()),
                (None, _) => "-".to_string(),
            };
            let last_update = spec
                .completed_at
                .or(spec.started_at)
                .map(|t| t.format("%H:%M:%S").to_string())
                .unwrap_or_else(|| "-".to_string());

            Row::new(vec![
                Cell::from((*id).clone()),
                Cell::from(status_label(spec.status)).style(status_style(spec.status)),
                Cell::from(stage.to_string()),
                Cell::from(elapsed),
                Cell::from(last_update),
            ])
        })
        .collect();

    let widths = [
        Constraint::Percentage(20),
        Constraint::Percentage(15),
        Constraint::Percentage(25),
        Constraint::Percentage(15),
        Constraint::Percentage(25),
    ];

    let table = Table::new(rows, widths).header(header).block(block);
    frame.render_widget(table, area);
}

fn status_label(status: SpecStatus) -> &'static str {
    match status {
        SpecStatus::Pending => "pending",
        SpecStatus::Running => "running",
        SpecStatus::Blocked => "blocked",
        SpecStatus::Completed => "completed",
        SpecStatus::Failed => "failed",
    }
}

fn status_style(status: SpecStatus) -> Style {
    let color = match status {
        SpecStatus::Pending => Color::Gray,
        SpecStatus::Running => Color::Yellow,
        SpecStatus::Blocked => Color::Magenta,
        SpecStatus::Completed => Color::Green,
        SpecStatus::Failed => Color::Red,
    };
    Style::default().fg(color)
}
