pub mod export;
pub mod health;
pub mod history;
pub mod setup;
pub mod ui;
pub mod update;
