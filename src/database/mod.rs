// Database module
// SQLite persistence for users, activities, audio recordings and transcript chunks

pub mod codec;
pub mod gateway;
pub mod manager;
pub mod migrations;
pub mod models;
pub mod users_repo;
pub mod activities_repo;
pub mod recordings_repo;
pub mod transcripts_repo;
pub mod search;

pub use gateway::PersistenceGateway;
pub use manager::DatabaseManager;
pub use models::*;
