//! Signed-in user state.
//!
//! The identity-provider popup is an external collaborator; it hands back a
//! profile and nothing else. This module only models the resulting state
//! with an explicit lifecycle: empty on creation, populated by `sign_in`,
//! cleared by `sign_out`.

use serde::{Deserialize, Serialize};

/// Profile returned by the external sign-in flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub display_name: String,
    pub email: String,
    pub photo_url: Option<String>,
}

/// Component-local signed-in state.
#[derive(Debug, Default)]
pub struct AccountState {
    profile: Option<Profile>,
}

impl AccountState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sign_in(&mut self, profile: Profile) {
        self.profile = Some(profile);
    }

    pub fn sign_out(&mut self) {
        self.profile = None;
    }

    pub fn current(&self) -> Option<&Profile> {
        self.profile.as_ref()
    }

    pub fn is_signed_in(&self) -> bool {
        self.profile.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_in_and_out_lifecycle() {
        let mut account = AccountState::new();
        assert!(!account.is_signed_in());

        account.sign_in(Profile {
            display_name: "Ada".to_string(),
            email: "ada@example.com".to_string(),
            photo_url: None,
        });
        assert!(account.is_signed_in());
        assert_eq!(account.current().unwrap().display_name, "Ada");

        account.sign_out();
        assert!(account.current().is_none());
    }
}
