pub mod api;
pub mod error;
pub mod server;
pub mod ws;

pub use error::ApiError;
pub use server::{build_router, start, AppState, ServerConfig, ServerHandle};
