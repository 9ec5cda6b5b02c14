use serde::{Deserialize, Serialize};

/// What the rest of the system learns about a user after a successful login.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticatedUser {
    pub id: i64,
    pub nickname: String,
    pub email: String,
}
