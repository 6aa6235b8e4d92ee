pub mod config;
pub mod enums;
pub mod error;
pub mod db;
pub mod services;
pub mod notifier;
pub mod scheduler;
pub mod wb;

pub use config::Config;
pub use enums::{ Plan, NotifyRule, SortMode, NotificationKind };
pub use error::{ AppError, FetchError, Result };
