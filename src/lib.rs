pub mod app;
pub mod cli;
pub mod error;
pub mod hotkey;
pub mod log;
pub mod mixer;
pub mod settings;
pub mod status;
