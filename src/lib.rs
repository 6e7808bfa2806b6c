pub mod app;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod scheduler;
pub mod state;
pub mod store;
pub mod time;
pub mod ui;

pub use app::router;
pub use config::AppConfig;
pub use scheduler::MidnightScheduler;
pub use state::AppState;
pub use store::{elapsed_chile_days, CounterStore, Rollover};
