use std::io::{self, Write};
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::Parser;
use crossterm::event::{DisableMouseCapture, EnableMouseCapture};
use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio::time::MissedTickBehavior;

use super::error::AppError;
use super::frames::{FrameSource, ReplayFrames};
use super::logging::{LogTarget, init_tracing};
use super::pipeline::ScanPipeline;
use super::probe::ReqwestTransport;
use super::scoring::Scorer;
use super::trust::TrustTables;
use super::tui::draw_loop;
use super::types::{Cli, ScanUpdate, ScoreResult};
use super::ui_utils::result_text_lines;

pub async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let tui_mode = cli.frames.is_some() && !cli.no_tui;
    let log_target = match cli.log_file.as_deref() {
        Some(path) => LogTarget::File(path),
        None if tui_mode => LogTarget::Off,
        None => LogTarget::Stderr,
    };
    init_tracing(log_target)?;

    let tables = Arc::new(TrustTables::with_extra_shorteners(&cli.shorteners));
    tracing::debug!(
        trusted = tables.trusted_domains().len(),
        extra_shorteners = cli.shorteners.len(),
        "trust tables ready"
    );
    let transport = Arc::new(ReqwestTransport::new(
        cli.timeout(),
        cli.user_agent.as_deref(),
    )?);
    let scorer = Scorer::new(tables, transport);

    let Some(frames_path) = cli.frames.clone() else {
        let url = cli.url.as_deref().unwrap_or_default();
        return score_once(&scorer, url, cli.json).await;
    };

    let mut frames = ReplayFrames::open(&frames_path)?;
    let (updates_tx, mut updates_rx) = mpsc::unbounded_channel::<ScanUpdate>();
    let (mut pipeline, worker) = ScanPipeline::start(scorer, cli.cooldown(), updates_tx);
    tracing::info!(
        frames = %frames_path,
        cooldown_ms = cli.cooldown().as_millis() as u64,
        timeout_ms = cli.timeout().as_millis() as u64,
        "scan started"
    );

    let scan_result = if tui_mode {
        run_tui(
            &frames_path,
            &mut pipeline,
            &mut frames,
            &mut updates_rx,
            cli.frame_interval(),
            cli.auto_close,
        )
    } else {
        run_headless(
            &mut pipeline,
            &mut frames,
            &mut updates_rx,
            cli.frame_interval(),
            cli.json,
            &mut io::stdout(),
        )
        .await
    };

    // A job still waiting on the network is not worth holding the exit for.
    worker.abort();
    scan_result
}

async fn score_once(scorer: &Scorer, url: &str, json: bool) -> Result<(), AppError> {
    let result = scorer.score_url(url).await;
    let mut stdout = io::stdout().lock();
    if json {
        writeln!(stdout, "{}", serde_json::to_string_pretty(&result)?)?;
    } else {
        write_result(&mut stdout, url, &result)?;
    }
    Ok(())
}

fn write_result(out: &mut impl Write, payload: &str, result: &ScoreResult) -> io::Result<()> {
    writeln!(out, "Last QR: {payload}")?;
    for line in result_text_lines(result) {
        writeln!(out, "{line}")?;
    }
    Ok(())
}

async fn run_headless(
    pipeline: &mut ScanPipeline,
    frames: &mut impl FrameSource,
    updates: &mut UnboundedReceiver<ScanUpdate>,
    frame_interval: Duration,
    json: bool,
    out: &mut impl Write,
) -> Result<(), AppError> {
    let mut ticker = tokio::time::interval(frame_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut exhausted = false;
    let mut scored = 0usize;

    loop {
        ticker.tick().await;
        if !exhausted {
            match frames.next_frame()? {
                Some(frame) => {
                    pipeline.on_frame(&frame, Instant::now());
                }
                None => exhausted = true,
            }
        }

        pipeline.poll_completions();
        while let Ok(update) = updates.try_recv() {
            if matches!(update, ScanUpdate::Scored(_)) {
                scored += 1;
            }
            print_update(out, &update, json)?;
        }

        if exhausted && !pipeline.state().is_scoring_in_flight() {
            break;
        }
    }

    tracing::info!(
        scored,
        last = pipeline.state().last_seen_payload().unwrap_or("-"),
        "frames exhausted"
    );
    Ok(())
}

fn print_update(out: &mut impl Write, update: &ScanUpdate, json: bool) -> Result<(), AppError> {
    match update {
        ScanUpdate::Scored(report) if json => {
            writeln!(out, "{}", serde_json::to_string(report)?)?;
        }
        ScanUpdate::Scored(report) => {
            for line in result_text_lines(&report.result) {
                writeln!(out, "{line}")?;
            }
            writeln!(out)?;
        }
        _ if json => {}
        ScanUpdate::Detected { payload } => writeln!(out, "Last QR: {payload}")?,
        ScanUpdate::Failed { payload, error } => {
            writeln!(out, "Scan failed for {payload}: {error}")?
        }
        ScanUpdate::Waiting => writeln!(out, "Last QR: (waiting…)")?,
    }
    Ok(())
}

fn run_tui(
    session_label: &str,
    pipeline: &mut ScanPipeline,
    frames: &mut impl FrameSource,
    updates: &mut UnboundedReceiver<ScanUpdate>,
    frame_interval: Duration,
    auto_close: bool,
) -> Result<(), AppError> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;
    terminal.clear()?;

    let tui_result = draw_loop(
        &mut terminal,
        session_label,
        pipeline,
        frames,
        updates,
        frame_interval,
        auto_close,
    );

    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    tui_result
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::app::probe::fake::FakeTransport;
    use crate::app::types::Verdict;

    const AMAZON: &str = "https://www.amazon.in/dp/B0D12345IP";
    const FLIPKART: &str = "https://www.flipkart.com/phone/p/itm42";

    /// One code held for a few frames, a long stretch with no code, then a
    /// second code held until well after it is scored.
    fn two_scan_frames() -> ReplayFrames<Cursor<String>> {
        let mut input = format!("{{\"text\":\"{AMAZON}\",\"repeat\":5}}\n");
        input.push_str(&"\n".repeat(40));
        input.push_str(&format!("{{\"text\":\"{FLIPKART}\",\"repeat\":200}}\n"));
        ReplayFrames::new(Cursor::new(input))
    }

    async fn scan_headless(json: bool) -> (ScanPipeline, String) {
        let transport = FakeTransport::default()
            .live(AMAZON, 200)
            .live(FLIPKART, 200);
        let scorer = Scorer::new(Arc::new(TrustTables::default()), Arc::new(transport));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let (mut pipeline, _worker) = ScanPipeline::start(scorer, Duration::from_millis(5), tx);
        let mut frames = two_scan_frames();
        let mut out = Vec::new();

        let finished = tokio::time::timeout(
            Duration::from_secs(10),
            run_headless(
                &mut pipeline,
                &mut frames,
                &mut rx,
                Duration::from_millis(1),
                json,
                &mut out,
            ),
        )
        .await;
        assert!(matches!(finished, Ok(Ok(()))), "headless scan did not finish");
        (pipeline, String::from_utf8(out).expect("utf8"))
    }

    #[tokio::test]
    async fn headless_json_prints_each_scan_once_in_order() {
        let (pipeline, out) = scan_headless(true).await;

        let reports = out
            .lines()
            .map(|line| serde_json::from_str::<serde_json::Value>(line).expect("json line"))
            .collect::<Vec<_>>();
        assert_eq!(reports.len(), 2, "{out}");
        assert_eq!(reports[0]["payload"], AMAZON);
        assert_eq!(reports[0]["label"], "real");
        assert_eq!(reports[1]["payload"], FLIPKART);
        assert_eq!(reports[1]["score"], 50 + 20 + 12 + 10);

        assert!(!pipeline.state().is_scoring_in_flight());
        assert_eq!(pipeline.state().last_seen_payload(), Some(FLIPKART));
    }

    #[tokio::test]
    async fn headless_text_waits_for_the_last_result() {
        let (pipeline, out) = scan_headless(false).await;

        assert_eq!(out.matches("Prediction: ").count(), 2, "{out}");
        let first = out.find(&format!("Last QR: {AMAZON}")).expect("first scan");
        let second = out.find(&format!("Last QR: {FLIPKART}")).expect("second scan");
        assert!(first < second);
        // The final report is printed before the loop gives up.
        assert!(out.trim_end().ends_with(&format!("Resolved URL: {FLIPKART}")));
        assert!(!pipeline.state().is_scoring_in_flight());
    }

    #[test]
    fn text_output_lists_reasons_and_resolved_url() {
        let result = ScoreResult {
            label: Verdict::Fake,
            score: 15,
            reasons: vec![
                "Untrusted domain: aptronixindia.com".to_string(),
                "URL not reachable (blocked/404/timeout).".to_string(),
            ],
            resolved_url: "https://www.aptronixindia.com/iphone-15?".to_string(),
        };
        let mut out = Vec::new();
        write_result(&mut out, "https://www.aptronixindia.com/iphone-15?", &result)
            .expect("write");
        let text = String::from_utf8(out).expect("utf8");
        assert!(text.starts_with("Last QR: https://www.aptronixindia.com/iphone-15?\n"));
        assert!(text.contains("Prediction: Likely FAKE ❌"));
        assert!(text.contains("Score: 15/100"));
        assert!(text.contains("• Untrusted domain: aptronixindia.com"));
        assert!(text.contains("Resolved URL: https://www.aptronixindia.com/iphone-15?"));
    }
}
