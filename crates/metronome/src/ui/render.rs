use ratatui::{
    layout::{Constraint, Direction, Layout},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Gauge, List, ListItem, Paragraph},
};

use crate::model::{self, Model};

use super::app::{App, Field};

pub(crate) fn draw(f: &mut ratatui::Frame, app: &mut App) {
    // Copy out so the timer thread is never held up by a redraw.
    let model = model::lock(app.controller.model()).clone();
    let playing = app.controller.is_playing();
    let timer_running = app.controller.timer().is_running();

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(6),
            Constraint::Length(3),
            Constraint::Length(4),
            Constraint::Length(3),
            Constraint::Min(3),
            Constraint::Length(1),
        ])
        .split(f.area());

    let state = if playing {
        Span::styled("▶ playing", Style::default().fg(Color::Green).add_modifier(Modifier::BOLD))
    } else {
        Span::raw("■ stopped")
    };
    let metronome = Paragraph::new(vec![
        Line::from(vec![
            field_span(app, Field::Tempo, format!("{} BPM", model.tempo_bpm())),
            Span::raw("   "),
            field_span(app, Field::Interval, accent_label(model.accent_interval())),
        ]),
        Line::from(vec![
            Span::raw("accent "),
            field_span(app, Field::AccentFreq, format!("{} Hz", model.accent_freq_hz())),
            Span::raw("   beep "),
            field_span(app, Field::Freq, format!("{} Hz", model.freq_hz())),
        ]),
        Line::from(vec![state, Span::raw("   "), beat_span(app.last_beat)]),
    ])
    .block(Block::default().borders(Borders::ALL).title("Metronome"));
    f.render_widget(metronome, chunks[0]);

    let level = f64::from(model.volume());
    let volume = Gauge::default()
        .block(Block::default().borders(Borders::ALL).title("Volume"))
        .gauge_style(Style::default().fg(Color::Cyan))
        .ratio(level.clamp(0.0, 1.0))
        .label(format!("{:.0}%", level * 100.0));
    f.render_widget(volume, chunks[1]);

    f.render_widget(timer_widget(app, &model, timer_running), chunks[2]);

    let input = Paragraph::new(Line::from(vec![
        Span::styled(
            format!("{}: ", app.field.label()),
            Style::default().add_modifier(Modifier::BOLD),
        ),
        Span::raw(app.input.clone()),
        Span::styled("_", Style::default().add_modifier(Modifier::SLOW_BLINK)),
    ]))
    .block(Block::default().borders(Borders::ALL).title("Edit"));
    f.render_widget(input, chunks[3]);

    if app.logs_open {
        let height = usize::from(chunks[4].height.saturating_sub(2));
        let skip = app.logs.len().saturating_sub(height);
        let items: Vec<ListItem> = app
            .logs
            .iter()
            .skip(skip)
            .map(|line| ListItem::new(line.as_str()))
            .collect();
        let logs = List::new(items).block(Block::default().borders(Borders::ALL).title("Logs"));
        f.render_widget(logs, chunks[4]);
    } else {
        let status = Paragraph::new(app.status.as_str())
            .block(Block::default().borders(Borders::ALL).title("Status"));
        f.render_widget(status, chunks[4]);
    }

    let help = Paragraph::new(
        "space metronome  t timer  a alarm  +/- tempo  [/] volume  tab field  enter set  l loop  L logs  q quit",
    )
    .style(Style::default().fg(Color::DarkGray));
    f.render_widget(help, chunks[5]);
}

fn timer_widget<'a>(app: &App, model: &Model, running: bool) -> Paragraph<'a> {
    let remaining = model.timer();
    let time_style = if running {
        Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
    } else {
        Style::default()
    };
    let minutes = field_span(app, Field::Minutes, format!("{:02}", remaining.minutes()));
    let seconds = field_span(app, Field::Seconds, format!("{:02}", remaining.seconds()));
    let mut flags = Vec::new();
    if running {
        flags.push("running");
    }
    if model.is_looping() {
        flags.push("loop");
    }
    if app.alarm_playing {
        flags.push("ALARM");
    }
    Paragraph::new(vec![
        Line::from(vec![
            minutes.patch_style(time_style),
            Span::styled(":", time_style),
            seconds.patch_style(time_style),
        ]),
        Line::from(flags.join("  ")),
    ])
    .block(Block::default().borders(Borders::ALL).title("Timer"))
}

fn field_span(app: &App, field: Field, text: String) -> Span<'static> {
    if app.field == field {
        Span::styled(text, Style::default().add_modifier(Modifier::REVERSED))
    } else {
        Span::raw(text)
    }
}

fn beat_span(last_beat: Option<(u64, bool)>) -> Span<'static> {
    match last_beat {
        Some((index, true)) => Span::styled(
            format!("beat {index} ●"),
            Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
        ),
        Some((index, false)) => Span::raw(format!("beat {index} ○")),
        None => Span::raw("-"),
    }
}

fn accent_label(interval: u32) -> String {
    match interval {
        0 => "no accent".to_string(),
        1 => "accent every beat".to_string(),
        n => format!("accent every {n} beats"),
    }
}
