pub mod directory_models;
pub mod directory_repository;

pub use directory_models::{Principal, Role, UserProfile};
pub use directory_repository::{DirectoryRepository, PgDirectoryRepository};
