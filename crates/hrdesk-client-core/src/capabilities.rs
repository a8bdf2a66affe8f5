//! Per-user capability resolution.
//!
//! Capabilities come from explicit profile claims resolved once at session
//! start, never from comparing identity fields against well-known values.

use serde::{Deserialize, Serialize};

/// The authenticated user's profile as the identity layer reports it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Explicit administration claim carried by the profile.
    #[serde(default)]
    pub admin: bool,
}

/// What the client surface is allowed to show for this user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserCapabilities {
    pub admin_dashboard: bool,
}

impl UserCapabilities {
    pub fn resolve(profile: &UserProfile) -> Self {
        Self {
            admin_dashboard: profile.admin,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_dashboard_follows_the_profile_claim_not_the_email() {
        let admin = UserProfile {
            user_id: "user-1".to_string(),
            email: Some("someone@example.com".to_string()),
            admin: true,
        };
        assert!(UserCapabilities::resolve(&admin).admin_dashboard);

        let regular = UserProfile {
            user_id: "user-2".to_string(),
            email: Some("hr-admin@example.com".to_string()),
            admin: false,
        };
        assert!(!UserCapabilities::resolve(&regular).admin_dashboard);
    }
}
