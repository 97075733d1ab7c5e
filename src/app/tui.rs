use std::collections::VecDeque;
use std::io::Stdout;
use std::time::{Duration, Instant};

use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Gauge, Paragraph, Wrap};
use tokio::sync::mpsc::UnboundedReceiver;

use super::error::AppError;
use super::frames::FrameSource;
use super::pipeline::{FrameOutcome, ScanPipeline};
use super::types::{Point, ScanReport, ScanUpdate};
use super::ui_utils::{polygon_summary, result_text_lines, verdict_style};

const WAITING: &str = "(waiting…)";

/// What the screen shows. Fed only through `apply` and the frame counters.
#[derive(Default)]
struct ScanView {
    last_qr: Option<String>,
    report: Option<ScanReport>,
    scoring: bool,
    polygon: Option<Vec<Point>>,
    frames_seen: usize,
    frames_with_code: usize,
    dispatched: usize,
    scored: usize,
    last_outcome: Option<FrameOutcome>,
    frames_done: bool,
    errors: VecDeque<String>,
    status_messages: VecDeque<String>,
}

impl ScanView {
    fn apply(&mut self, update: ScanUpdate) {
        match update {
            ScanUpdate::Detected { payload } => {
                self.push_status(format!("scoring {payload}"));
                self.last_qr = Some(payload);
                self.scoring = true;
            }
            ScanUpdate::Scored(report) => {
                self.push_status(format!(
                    "{} scored {}/100",
                    report.payload, report.result.score
                ));
                self.scoring = false;
                self.scored += 1;
                self.report = Some(report);
            }
            ScanUpdate::Failed { payload, error } => {
                self.scoring = false;
                self.push_error(format!("{payload}: {error}"));
            }
            ScanUpdate::Waiting => {
                self.last_qr = None;
                self.report = None;
                self.scoring = false;
                self.push_status("scan reset".to_string());
            }
        }
    }

    fn record_frame(&mut self, polygon: Option<&Vec<Point>>, outcome: FrameOutcome) {
        self.frames_seen += 1;
        if outcome != FrameOutcome::NoCode {
            self.frames_with_code += 1;
        }
        if let Some(points) = polygon {
            self.polygon = Some(points.clone());
        }
        let repeated = self.last_outcome == Some(outcome);
        self.last_outcome = Some(outcome);
        match outcome {
            FrameOutcome::Dispatched => self.dispatched += 1,
            FrameOutcome::QueueFull if !repeated => {
                self.push_error("scoring queue full".to_string())
            }
            FrameOutcome::WorkerStopped if !repeated => {
                self.push_error("scoring worker stopped".to_string())
            }
            _ => {}
        }
    }

    fn push_error(&mut self, error: String) {
        self.errors.push_front(error);
        while self.errors.len() > 10 {
            self.errors.pop_back();
        }
    }

    fn push_status(&mut self, message: String) {
        self.status_messages.push_front(message);
        while self.status_messages.len() > 20 {
            self.status_messages.pop_back();
        }
    }
}

pub fn draw_loop(
    terminal: &mut Terminal<CrosstermBackend<Stdout>>,
    session_label: &str,
    pipeline: &mut ScanPipeline,
    frames: &mut impl FrameSource,
    updates: &mut UnboundedReceiver<ScanUpdate>,
    frame_interval: Duration,
    auto_close: bool,
) -> Result<(), AppError> {
    let mut view = ScanView::default();
    let mut last_tick = Instant::now();

    loop {
        if !view.frames_done {
            match frames.next_frame() {
                Ok(Some(frame)) => {
                    let outcome = pipeline.on_frame(&frame, Instant::now());
                    view.record_frame(frame.polygon.as_ref(), outcome);
                }
                Ok(None) => {
                    view.frames_done = true;
                    view.push_status("frame source exhausted".to_string());
                }
                Err(err) => {
                    view.frames_done = true;
                    view.push_error(err.to_string());
                }
            }
        }

        pipeline.poll_completions();
        while let Ok(update) = updates.try_recv() {
            view.apply(update);
        }

        let finished = view.frames_done && !pipeline.state().is_scoring_in_flight();
        if finished && auto_close {
            break;
        }

        terminal.draw(|f| {
            let chunks = Layout::default()
                .direction(Direction::Vertical)
                .constraints([
                    Constraint::Length(3),
                    Constraint::Length(5),
                    Constraint::Length(3),
                    Constraint::Min(8),
                    Constraint::Length(6),
                ])
                .split(f.area());

            let phase = if view.scoring {
                "Scoring"
            } else if finished {
                "Finished (press q to quit)"
            } else {
                "Scanning (r reset, q quit)"
            };
            let header = Paragraph::new(Line::from(vec![
                Span::styled(
                    "Product QR Detector",
                    Style::default()
                        .fg(Color::Cyan)
                        .add_modifier(Modifier::BOLD),
                ),
                Span::styled("  |  ", Style::default().fg(Color::DarkGray)),
                Span::raw(session_label.to_string()),
                Span::styled("  |  ", Style::default().fg(Color::DarkGray)),
                Span::styled(phase, Style::default().fg(Color::Gray)),
            ]))
            .block(Block::default().borders(Borders::ALL).title("qrtrust"));
            f.render_widget(header, chunks[0]);

            let metric_label = Style::default().fg(Color::Gray);
            let scan_lines = vec![
                Line::from(vec![
                    Span::styled("Last QR: ", metric_label),
                    Span::raw(view.last_qr.clone().unwrap_or_else(|| WAITING.to_string())),
                ]),
                Line::from(vec![
                    Span::styled("Polygon: ", metric_label),
                    Span::raw(
                        view.polygon
                            .as_deref()
                            .map(polygon_summary)
                            .unwrap_or_else(|| "-".to_string()),
                    ),
                ]),
                Line::from(vec![
                    Span::styled("Frames ", metric_label),
                    Span::raw(view.frames_seen.to_string()),
                    Span::styled("  |  with code ", metric_label),
                    Span::raw(view.frames_with_code.to_string()),
                    Span::styled("  |  dispatched ", metric_label),
                    Span::raw(view.dispatched.to_string()),
                    Span::styled("  |  scored ", metric_label),
                    Span::raw(view.scored.to_string()),
                ]),
            ];
            f.render_widget(
                Paragraph::new(scan_lines)
                    .block(Block::default().borders(Borders::ALL).title("Scan"))
                    .wrap(Wrap { trim: true }),
                chunks[1],
            );

            let (gauge_label, ratio, gauge_style) = match view.report.as_ref() {
                Some(report) => (
                    format!(
                        "{} | {}/100",
                        report.result.label.headline(),
                        report.result.score
                    ),
                    f64::from(report.result.score) / 100.0,
                    verdict_style(report.result.label),
                ),
                None if view.scoring => (
                    "scoring…".to_string(),
                    0.0,
                    Style::default().fg(Color::Cyan),
                ),
                None => ("-".to_string(), 0.0, Style::default().fg(Color::Gray)),
            };
            f.render_widget(
                Gauge::default()
                    .block(Block::default().title("Prediction").borders(Borders::ALL))
                    .gauge_style(gauge_style.bg(Color::Black))
                    .ratio(ratio.clamp(0.0, 1.0))
                    .label(gauge_label),
                chunks[2],
            );

            let (reason_lines, reason_style) = match view.report.as_ref() {
                Some(report) => (
                    result_text_lines(&report.result)
                        .into_iter()
                        .skip(2)
                        .map(Line::from)
                        .chain(std::iter::once(Line::from(format!(
                            "Scored at: {}",
                            report.scored_at
                        ))))
                        .collect::<Vec<_>>(),
                    verdict_style(report.result.label),
                ),
                None => (
                    vec![Line::from("Reasons:"), Line::from("-")],
                    Style::default(),
                ),
            };
            f.render_widget(
                Paragraph::new(reason_lines)
                    .style(reason_style)
                    .block(Block::default().borders(Borders::ALL).title("Details"))
                    .wrap(Wrap { trim: false }),
                chunks[3],
            );

            let mut footer_lines = view
                .errors
                .iter()
                .take(2)
                .map(|e| Line::from(Span::styled(e.clone(), Style::default().fg(Color::Red))))
                .collect::<Vec<_>>();
            footer_lines.extend(
                view.status_messages
                    .iter()
                    .take(4usize.saturating_sub(footer_lines.len()))
                    .map(|m| Line::from(Span::styled(m.clone(), Style::default().fg(Color::Gray)))),
            );
            f.render_widget(
                Paragraph::new(footer_lines)
                    .block(Block::default().borders(Borders::ALL).title("Status"))
                    .wrap(Wrap { trim: true }),
                chunks[4],
            );
        })?;

        let timeout = frame_interval.saturating_sub(last_tick.elapsed());
        if event::poll(timeout)?
            && let Event::Key(key) = event::read()?
            && key.kind == KeyEventKind::Press
        {
            match key.code {
                KeyCode::Char('q') | KeyCode::Esc => break,
                KeyCode::Char('r') | KeyCode::Char('R') => pipeline.reset(),
                _ => {}
            }
        }
        if last_tick.elapsed() >= frame_interval {
            last_tick = Instant::now();
        }
    }

    Ok(())
}
