//! Centered modal frame shared by the station picker and the narrative popup.

use ratatui::{
    layout::{Constraint, Flex, Layout, Rect},
    text::{Line, Span},
    widgets::{Block, BorderType, Clear},
    Frame,
};

use crate::theme::{style_accent, style_focused_border};

/// `percent_x` by `percent_y` of `area`, centered.
pub fn centered_rect(area: Rect, percent_x: u16, percent_y: u16) -> Rect {
    let [row] = Layout::vertical([Constraint::Percentage(percent_y)])
        .flex(Flex::Center)
        .areas(area);
    let [cell] = Layout::horizontal([Constraint::Percentage(percent_x)])
        .flex(Flex::Center)
        .areas(row);
    cell
}

/// Clear a centered region and draw a titled border around it.  Returns the
/// inner area for the content.
pub fn draw_modal(frame: &mut Frame, percent_x: u16, percent_y: u16, title: &str) -> Rect {
    let area = centered_rect(frame.area(), percent_x, percent_y);
    frame.render_widget(Clear, area);

    let block = Block::bordered()
        .border_type(BorderType::Rounded)
        .border_style(style_focused_border())
        .title(Line::from(Span::styled(format!(" {} ", title), style_accent())));
    let inner = block.inner(area);
    frame.render_widget(block, area);
    inner
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_centered_rect() {
        let area = Rect::new(0, 0, 100, 50);
        let r = centered_rect(area, 60, 40);
        assert_eq!((r.width, r.height), (60, 20));
        assert_eq!((r.x, r.y), (20, 15));
    }
}
