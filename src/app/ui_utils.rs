use ratatui::style::{Color, Modifier, Style};

use super::types::{Point, ScoreResult, Verdict};

pub fn verdict_style(label: Verdict) -> Style {
    match label {
        Verdict::Real => Style::default()
            .fg(Color::Green)
            .add_modifier(Modifier::BOLD),
        Verdict::Uncertain => Style::default().fg(Color::Yellow),
        Verdict::Fake => Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
    }
}

/// Human-readable verdict block, shared by the headless printer and the TUI.
pub fn result_text_lines(result: &ScoreResult) -> Vec<String> {
    let mut lines = Vec::with_capacity(result.reasons.len() + 4);
    lines.push(format!("Prediction: {}", result.label.headline()));
    lines.push(format!("Score: {}/100", result.score));
    lines.push("Reasons:".to_string());
    lines.extend(result.reasons.iter().map(|reason| format!("• {reason}")));
    lines.push(format!("Resolved URL: {}", result.resolved_url));
    lines
}

pub fn polygon_summary(points: &[Point]) -> String {
    if points.is_empty() {
        return "-".to_string();
    }
    points
        .iter()
        .map(|p| format!("({:.0},{:.0})", p.x, p.y))
        .collect::<Vec<_>>()
        .join(" ")
}
