pub use app::App;
pub use tui::Tui;

mod action;
mod app;
mod components;
mod tui;
