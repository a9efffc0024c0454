pub mod popup;
pub mod progress_bar;
