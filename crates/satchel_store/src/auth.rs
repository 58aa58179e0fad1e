//! Authentication collaborator seam.

use parking_lot::RwLock;

/// Supplies the current user's id for namespace prefixing.
///
/// This is the only authentication surface the store consumes. When no
/// user is signed in, namespacing degrades to bare collection names; that
/// is a documented degraded mode, not an error.
pub trait AuthProvider: Send + Sync {
    /// Returns the id of the currently authenticated user, if any.
    fn current_user_id(&self) -> Option<String>;
}

/// An auth provider with no user: collections are unprefixed.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoAuth;

impl AuthProvider for NoAuth {
    fn current_user_id(&self) -> Option<String> {
        None
    }
}

/// An auth provider pinned to a fixed user id.
#[derive(Debug, Clone)]
pub struct StaticAuth {
    user_id: String,
}

impl StaticAuth {
    /// Creates a provider for the given user id.
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
        }
    }
}

impl AuthProvider for StaticAuth {
    fn current_user_id(&self) -> Option<String> {
        Some(self.user_id.clone())
    }
}

/// An auth provider backed by a mutable session.
///
/// Lets an application sign users in and out while sharing one provider
/// handle with the store.
#[derive(Debug, Default)]
pub struct SessionAuth {
    user: RwLock<Option<String>>,
}

impl SessionAuth {
    /// Creates a provider with no signed-in user.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Signs a user in.
    pub fn sign_in(&self, user_id: impl Into<String>) {
        *self.user.write() = Some(user_id.into());
    }

    /// Signs the current user out.
    pub fn sign_out(&self) {
        *self.user.write() = None;
    }
}

impl AuthProvider for SessionAuth {
    fn current_user_id(&self) -> Option<String> {
        self.user.read().clone()
    }
}
