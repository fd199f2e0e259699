pub mod charting;

use itertools::Itertools;
use ratatui::{
    buffer::Buffer,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Axis, Chart, Dataset, GraphType, Paragraph, Widget, Wrap},
};
use unicode_width::UnicodeWidthStr;

use crate::app::App;
use crate::evaluation::EvaluationResult;
use crate::session::{Clock, SessionState};
use crate::time_series;

use self::charting::{compute_chart_params, format_countdown, format_label};

const HORIZONTAL_MARGIN: u16 = 5;
const VERTICAL_MARGIN: u16 = 2;

impl<C: Clock> Widget for &App<C> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        match self.session.evaluation() {
            Some(result) if self.session.has_finished() => render_results(self, result, area, buf),
            _ => render_typing(self, area, buf),
        }
    }
}

fn render_typing<C: Clock>(app: &App<C>, area: Rect, buf: &mut Buffer) {
    let session = &app.session;
    let reference = &session.definition().reference_text;

    let bold_style = Style::default().add_modifier(Modifier::BOLD);
    let green_bold_style = Style::default().patch(bold_style).fg(Color::Green);
    let red_bold_style = Style::default().patch(bold_style).fg(Color::Red);
    let dim_bold_style = Style::default()
        .patch(bold_style)
        .add_modifier(Modifier::DIM);
    let italic_style = Style::default().add_modifier(Modifier::ITALIC);

    let max_chars_per_line = area.width.saturating_sub(HORIZONTAL_MARGIN * 2).max(1);
    let prompt_occupied_lines = if reference.width() <= max_chars_per_line as usize {
        1
    } else {
        ((reference.width() as f64 / max_chars_per_line as f64).ceil() + 1.0) as u16
    };
    let padding = area.height.saturating_sub(prompt_occupied_lines + 4) / 2;

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .horizontal_margin(HORIZONTAL_MARGIN)
        .constraints([
            Constraint::Length(padding),
            Constraint::Length(2), // timer
            Constraint::Length(prompt_occupied_lines),
            Constraint::Length(padding),
            Constraint::Length(1), // legend
        ])
        .split(area);

    let widget = Paragraph::new(Line::from(prompt_spans(
        reference,
        &session.current_text(),
        session.caret(),
        [green_bold_style, red_bold_style, dim_bold_style],
    )))
    .alignment(if prompt_occupied_lines == 1 {
        Alignment::Center
    } else {
        Alignment::Left
    })
    .wrap(Wrap { trim: true });
    widget.render(chunks[2], buf);

    let timer_text = match session.remaining_ms() {
        Some(ms) => format_countdown(ms),
        None => format_countdown(session.definition().time_limit_ms()),
    };
    Paragraph::new(Span::styled(timer_text, dim_bold_style))
        .alignment(Alignment::Center)
        .render(chunks[1], buf);

    let legend = if session.state() == SessionState::NotStarted {
        format!(
            "{} · start typing to begin · (enter) submit / (esc)ape",
            session.definition().difficulty
        )
    } else {
        "(enter) submit / (esc)ape".to_string()
    };
    Paragraph::new(Span::styled(legend, italic_style)).render(chunks[4], buf);
}

/// Reference text colored against what has been typed so far, position by
/// position. The caret cell is underlined and typed overflow is shown in red.
fn prompt_spans(
    reference: &str,
    typed: &str,
    caret: usize,
    [correct_style, incorrect_style, pending_style]: [Style; 3],
) -> Vec<Span<'static>> {
    let typed: Vec<char> = typed.chars().collect();
    let reference: Vec<char> = reference.chars().collect();
    let len = reference.len().max(typed.len());

    (0..=len)
        .filter_map(|idx| {
            let (symbol, style) = match (reference.get(idx), typed.get(idx)) {
                (Some(&e), Some(&t)) if e == t => (e, correct_style),
                (_, Some(&t)) => (if t == ' ' { '·' } else { t }, incorrect_style),
                (Some(&e), None) => (e, pending_style),
                // one blank cell past the end so the caret stays visible
                (None, None) if idx == caret => (' ', pending_style),
                (None, None) => return None,
            };
            let style = if idx == caret {
                style.add_modifier(Modifier::UNDERLINED)
            } else {
                style
            };
            Some(Span::styled(symbol.to_string(), style))
        })
        .collect()
}

fn render_results<C: Clock>(app: &App<C>, result: &EvaluationResult, area: Rect, buf: &mut Buffer) {
    let bold_style = Style::default().add_modifier(Modifier::BOLD);
    let italic_style = Style::default().add_modifier(Modifier::ITALIC);
    let magenta_style = Style::default().fg(Color::Magenta);

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .horizontal_margin(HORIZONTAL_MARGIN)
        .vertical_margin(VERTICAL_MARGIN)
        .constraints([
            Constraint::Min(1),    // chart
            Constraint::Length(1), // stats
            Constraint::Length(1), // alignment breakdown
            Constraint::Length(1), // integrity flags
            Constraint::Length(1), // delivery
            Constraint::Length(1), // padding
            Constraint::Length(1), // legend
        ])
        .split(area);

    let tuples = time_series::coords(&result.speed_curve);
    let (overall_duration, highest_wpm) = compute_chart_params(&tuples, result.duration_seconds);
    let datasets = vec![Dataset::default()
        .marker(ratatui::symbols::Marker::Braille)
        .style(magenta_style)
        .graph_type(GraphType::Line)
        .data(&tuples)];

    let chart = Chart::new(datasets)
        .x_axis(
            Axis::default()
                .title("seconds")
                .bounds([0.0, overall_duration])
                .labels(vec![
                    Span::styled("0", bold_style),
                    Span::styled(format_label(overall_duration), bold_style),
                ]),
        )
        .y_axis(
            Axis::default()
                .title("wpm")
                .bounds([0.0, highest_wpm])
                .labels(vec![
                    Span::styled("0", bold_style),
                    Span::styled(format_label(highest_wpm), bold_style),
                ]),
        );
    chart.render(chunks[0], buf);

    let outcome = app.session.state();
    Paragraph::new(Span::styled(
        format!(
            "{:.1} wpm   {:.1}% acc   {:.2} score   {:.2} sd   ({})",
            result.wpm, result.accuracy, result.score, result.consistency, outcome
        ),
        bold_style,
    ))
    .alignment(Alignment::Center)
    .render(chunks[1], buf);

    if let Some(alignment) = app.session.alignment() {
        Paragraph::new(Span::styled(
            format!(
                "{} correct · {} incorrect · {} missing · {} extra · {} corrected",
                alignment.correct_count(),
                alignment.incorrect_count(),
                alignment.missing_count(),
                alignment.extra_count(),
                result.corrected_errors
            ),
            Style::default().fg(Color::Cyan).add_modifier(Modifier::ITALIC),
        ))
        .alignment(Alignment::Center)
        .render(chunks[2], buf);
    }

    let flags = if result.is_flagged() {
        Span::styled(
            format!("flagged: {}", result.integrity_flags.iter().join(", ")),
            Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
        )
    } else {
        Span::styled("no integrity flags", Style::default().fg(Color::Green))
    };
    Paragraph::new(flags)
        .alignment(Alignment::Center)
        .render(chunks[3], buf);

    if let Some(note) = &app.delivery_note {
        Paragraph::new(Span::styled(note.clone(), Style::default().fg(Color::Gray)))
            .alignment(Alignment::Center)
            .wrap(Wrap { trim: true })
            .render(chunks[4], buf);
    }

    Paragraph::new(Span::styled("(q)uit / (esc)ape", italic_style)).render(chunks[6], buf);
}
