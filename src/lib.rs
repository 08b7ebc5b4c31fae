pub mod app;
pub mod bank;
pub mod channels;
pub mod config;
pub mod scheduler;
pub mod speaker;
pub mod ui;

pub use app::{
    run, run_headless, start_engine, EngineCommand, EngineHandle, FrameSnapshot, SharedFrame,
};
pub use bank::{BankError, BankStore, CaptionBank, CaptionLine, CaptionScript};
pub use config::Cli;
pub use scheduler::{DrawLine, DrawList, Scheduler};
