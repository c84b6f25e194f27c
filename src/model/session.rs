use serde::{Deserialize, Serialize};

/// The current sign-in state.
///
/// `SignedOut` is a real value, not "unknown": receiving it means any data
/// scoped to a previous user must be cleared.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Session {
    SignedOut,
    SignedIn { user_id: String },
}

impl Session {
    pub fn signed_in(user_id: impl Into<String>) -> Self {
        Session::SignedIn {
            user_id: user_id.into(),
        }
    }

    /// The signed-in user's ID, if any
    pub fn user_id(&self) -> Option<&str> {
        match self {
            Session::SignedOut => None,
            Session::SignedIn { user_id } => Some(user_id),
        }
    }
}
