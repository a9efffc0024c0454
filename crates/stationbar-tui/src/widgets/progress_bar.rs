//! Smooth Unicode progress bar widget.

use ratatui::{
    layout::Rect,
    style::Style,
    text::{Line, Span},
    widgets::Paragraph,
    Frame,
};
use stationbar_proto::model::fmt_duration;
use stationbar_proto::PlaybackProgress;

use crate::theme::{C_MUTED, C_PLAYING, C_SECONDARY};

const BLOCKS: [char; 9] = [' ', '▏', '▎', '▍', '▌', '▋', '▊', '▉', '█'];

/// Render `progress` in `area` as `m:ss ████▌     m:ss`.
pub fn draw_progress(frame: &mut Frame, area: Rect, progress: PlaybackProgress) {
    if area.width < 4 || area.height == 0 {
        return;
    }

    let left_label = fmt_duration(progress.elapsed);
    let right_label = fmt_duration(progress.total);
    let label_w = (left_label.len() + right_label.len() + 2) as u16;
    let bar_w = area.width.saturating_sub(label_w).max(4) as usize;

    let spans = vec![
        Span::styled(format!("{} ", left_label), Style::default().fg(C_SECONDARY)),
        Span::styled(bar(progress.ratio(), bar_w), Style::default().fg(C_PLAYING)),
        Span::styled(format!(" {}", right_label), Style::default().fg(C_MUTED)),
    ];

    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}

/// Bar of exactly `width` cells, 8 eighths per cell.
fn bar(ratio: f64, width: usize) -> String {
    let eighths = (ratio.clamp(0.0, 1.0) * width as f64 * 8.0) as usize;
    let full_blocks = eighths / 8;
    let partial = eighths % 8;

    let mut bar = String::with_capacity(width * 3);
    for _ in 0..full_blocks {
        bar.push('█');
    }
    if full_blocks < width {
        bar.push(BLOCKS[partial]);
        for _ in (full_blocks + 1)..width {
            bar.push(' ');
        }
    }
    bar
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bar_fills_in_eighths() {
        assert_eq!(bar(0.0, 4), "    ");
        assert_eq!(bar(1.0, 4), "████");
        assert_eq!(bar(0.5, 4), "██  ");
        // 0.3 * 4 cells * 8 = 9.6 eighths → one full cell plus one eighth.
        assert_eq!(bar(0.3, 4), "█▏  ");
    }

    #[test]
    fn test_bar_width_is_stable() {
        for i in 0..=20 {
            let ratio = i as f64 / 20.0;
            assert_eq!(bar(ratio, 10).chars().count(), 10, "ratio {}", ratio);
        }
        assert_eq!(bar(7.0, 3), "███");
    }
}
