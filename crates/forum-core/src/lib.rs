pub mod frame;
pub mod identity;
pub mod ids;

pub use frame::Frame;
pub use identity::AuthenticatedUser;
pub use ids::{ConnectionId, PeerId};
