pub mod audio;
pub mod autostart;
pub mod config;
pub mod ipc;
pub mod monitor;
pub mod settings;
