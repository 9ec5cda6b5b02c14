pub mod database;
pub mod error;
pub mod password;
pub mod posts;
pub mod schema;
pub mod users;

pub use database::Database;
pub use error::StoreError;
