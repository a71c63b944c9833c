use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::identity::UserId;

/// Display name used when a participant has no profile document.
pub const UNKNOWN_USER_NAME: &str = "Unknown User";

/// Avatar used when a participant has no profile picture.
pub const PLACEHOLDER_AVATAR: &str = "https://via.placeholder.com/50";

/// A user's public profile, stored under `users/{email}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub email: UserId,
    pub name: String,
    #[serde(default)]
    pub profile_picture: Option<String>,
    #[serde(default)]
    pub is_seller: bool,
    pub created_at: DateTime<Utc>,
}

/// The parts of a profile shown next to a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileSummary {
    pub user: UserId,
    pub name: String,
    pub avatar: String,
}

impl ProfileSummary {
    /// Summary for a user whose profile could not be found.
    pub fn unknown(user: UserId) -> Self {
        Self {
            user,
            name: UNKNOWN_USER_NAME.to_string(),
            avatar: PLACEHOLDER_AVATAR.to_string(),
        }
    }
}

impl From<&UserProfile> for ProfileSummary {
    fn from(profile: &UserProfile) -> Self {
        let name = match profile.name.trim() {
            "" => UNKNOWN_USER_NAME.to_string(),
            n => n.to_string(),
        };
        Self {
            user: profile.email.clone(),
            name,
            avatar: profile
                .profile_picture
                .clone()
                .filter(|p| !p.is_empty())
                .unwrap_or_else(|| PLACEHOLDER_AVATAR.to_string()),
        }
    }
}
