pub mod clock;
pub mod config;
pub mod constants;
pub mod database;
pub mod errors;
pub mod provider;
pub mod retirement_ledger;
pub mod scheduler;
pub mod stages;
pub mod web;
pub mod window;

// Re-export commonly used types
pub use config::{Config, ConfigManager, RetirementSettings};
pub use database::{Database, SqliteTriggerStore, SqliteWorkQueue};
pub use errors::{CoordinatorError, PowerAction, ProviderError};
pub use provider::http::HttpComputeClient;
pub use retirement_ledger::{RetirementLedger, RetirementStage};
pub use scheduler::StageScheduler;
pub use stages::{InvocationReport, InvocationResponse, Outcome, Stage, StageContext, StageRunner};
pub use window::{MaintenanceWindow, TimeOfDay, WindowSchedule};
