//! Frame rendering.  Reads [`UiState`], never mutates anything but the
//! picker's list scroll state.

use ratatui::{
    layout::{Constraint, Layout, Rect},
    style::{Modifier, Style},
    text::{Line, Span, Text},
    widgets::{Block, BorderType, List, ListItem, Paragraph, Wrap},
    Frame,
};
use stationbar_proto::Track;

use crate::app_state::{NarrativeView, StationPicker, UiState};
use crate::theme::{
    style_accent, style_border, style_default, style_muted, style_rating, style_secondary,
    style_selected_focused, C_CONNECTING, C_ERROR, C_TAG,
};
use crate::widgets::{popup, progress_bar};

const KEY_HINTS: &str = " e why · + like · - ban · t tired · n skip · space pause · s stations · q quit ";
const UP_NEXT_ROWS: u16 = 4;
const LOG_ROWS: u16 = 6;

pub fn draw(frame: &mut Frame, ui: &mut UiState) {
    let [history, now, next, log, hints] = Layout::vertical([
        Constraint::Min(3),
        Constraint::Length(6),
        Constraint::Length(UP_NEXT_ROWS + 2),
        Constraint::Length(LOG_ROWS + 2),
        Constraint::Length(1),
    ])
    .areas(frame.area());

    draw_history(frame, history, ui);
    draw_now_playing(frame, now, ui);
    draw_up_next(frame, next, ui);
    draw_log(frame, log, ui);
    frame.render_widget(Paragraph::new(Span::styled(KEY_HINTS, style_muted())), hints);

    if let Some(picker) = ui.picker.as_mut() {
        draw_picker(frame, picker);
    }
    if let Some(narrative) = ui.narrative.as_ref() {
        draw_narrative(frame, narrative);
    }
}

fn pane_block() -> Block<'static> {
    Block::bordered()
        .border_type(BorderType::Rounded)
        .border_style(style_border())
}

fn pane(title: &str) -> Block<'static> {
    pane_block().title(Span::styled(format!(" {} ", title), style_secondary()))
}

fn track_line(track: &Track) -> Line<'static> {
    Line::from(vec![
        Span::styled(track.title.clone(), style_rating(track.rating)),
        Span::styled(" · ", style_muted()),
        Span::styled(track.artist.clone(), style_secondary()),
    ])
}

fn draw_history(frame: &mut Frame, area: Rect, ui: &UiState) {
    let block = pane("Previously played");
    let rows = block.inner(area).height as usize;
    // Newest last, so the most recent tracks stay visible.
    let skip = ui.history.len().saturating_sub(rows);
    let items: Vec<ListItem> = ui
        .history
        .iter()
        .skip(skip)
        .map(|t| ListItem::new(track_line(t)))
        .collect();
    frame.render_widget(List::new(items).block(block), area);
}

fn draw_now_playing(frame: &mut Frame, area: Rect, ui: &UiState) {
    let mut title = vec![Span::styled(" Now playing ", style_secondary())];
    if ui.station.is_selected() {
        title.push(Span::styled(format!("on {} ", ui.station.name), style_accent()));
    }
    if ui.paused {
        title.push(Span::styled("(paused) ", Style::default().fg(C_CONNECTING)));
    }
    let block = pane_block().title(Line::from(title));
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let Some(track) = ui.now_playing.as_ref() else {
        let msg = if ui.station.is_selected() { "Loading…" } else { "Pick a station with s" };
        frame.render_widget(Paragraph::new(Span::styled(msg, style_muted())), inner);
        return;
    };

    let [text_area, bar_area] =
        Layout::vertical([Constraint::Length(3), Constraint::Length(1)]).areas(inner);
    let rated = style_rating(track.rating);
    let text = Text::from(vec![
        Line::from(Span::styled(track.title.clone(), rated.add_modifier(Modifier::BOLD))),
        Line::from(Span::styled(track.artist.clone(), rated)),
        Line::from(Span::styled(track.album.clone(), style_secondary())),
    ]);
    frame.render_widget(Paragraph::new(text), text_area);
    progress_bar::draw_progress(frame, bar_area, ui.progress);
}

fn draw_up_next(frame: &mut Frame, area: Rect, ui: &UiState) {
    let items: Vec<ListItem> = ui
        .up_next
        .iter()
        .take(UP_NEXT_ROWS as usize)
        .map(|t| ListItem::new(track_line(t)))
        .collect();
    frame.render_widget(List::new(items).block(pane("Up next")), area);
}

fn draw_log(frame: &mut Frame, area: Rect, ui: &UiState) {
    let lines: Vec<Line> = ui
        .log
        .iter()
        .rev()
        .take(LOG_ROWS as usize)
        .rev()
        .map(|l| {
            let style = if l.contains("[ERROR]") {
                Style::default().fg(C_ERROR)
            } else if l.contains("[WARN]") {
                Style::default().fg(C_CONNECTING)
            } else {
                style_secondary()
            };
            Line::from(Span::styled(l.clone(), style))
        })
        .collect();
    frame.render_widget(Paragraph::new(lines).block(pane("Log")), area);
}

fn draw_picker(frame: &mut Frame, picker: &mut StationPicker) {
    let inner = popup::draw_modal(frame, 60, 60, "Stations");

    if picker.loading {
        frame.render_widget(Paragraph::new(Span::styled("Loading stations…", style_muted())), inner);
        return;
    }
    if let Some(err) = picker.error.as_ref() {
        let text = Text::from(vec![
            Line::from(Span::styled(err.clone(), Style::default().fg(C_ERROR))),
            Line::from(Span::styled("r to retry · q to quit", style_muted())),
        ]);
        frame.render_widget(Paragraph::new(text).wrap(Wrap { trim: true }), inner);
        return;
    }

    let items: Vec<ListItem> = picker
        .stations
        .iter()
        .map(|s| ListItem::new(Span::styled(s.name.clone(), style_default())))
        .collect();
    let list = List::new(items)
        .highlight_style(style_selected_focused())
        .highlight_symbol("▶ ");
    frame.render_stateful_widget(list, inner, &mut picker.list);
}

fn draw_narrative(frame: &mut Frame, view: &NarrativeView) {
    let inner = popup::draw_modal(frame, 70, 50, "Why this track?");

    let text = match view {
        NarrativeView::Loading => Text::from(Span::styled("Asking…", style_muted())),
        NarrativeView::Failed(e) => Text::from(Span::styled(e.clone(), Style::default().fg(C_ERROR))),
        NarrativeView::Ready(n) => {
            let mut lines = vec![Line::from(Span::styled(n.paragraph.clone(), style_default()))];
            if !n.focus_traits.is_empty() {
                lines.push(Line::default());
                lines.extend(
                    n.focus_traits
                        .iter()
                        .map(|t| Line::from(Span::styled(format!("• {}", t), Style::default().fg(C_TAG)))),
                );
            }
            Text::from(lines)
        }
    };
    frame.render_widget(Paragraph::new(text).wrap(Wrap { trim: true }), inner);
}
