pub mod database;
pub mod error;
pub mod links;
pub mod role_delays;
pub mod row_helpers;
pub mod schema;
pub mod settings;

pub use database::Database;
pub use error::StoreError;
pub use links::LinkRepo;
pub use role_delays::RoleDelayRepo;
pub use settings::SettingsRepo;
