//! Permission status and request handling.
//!
//! This crate defines the authorization vocabulary the rest of geotag speaks
//! and the backend contract hosts implement to wire in their platform's
//! permission prompts.

#![warn(missing_docs)]

use std::collections::HashMap;

use futures::future::{self, BoxFuture, FutureExt};

/// Types of permissions the tagging flow can require.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum Permission {
    /// Access to device location.
    Location,
    /// Access to device camera.
    Camera,
    /// Access to photo library.
    Photos,
}

/// The current status of a permission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PermissionStatus {
    /// Permission has been granted by the user.
    Granted,
    /// Permission has been denied by the user.
    Denied,
    /// Permission is restricted (e.g., parental controls).
    Restricted,
    /// Permission has not been requested yet.
    NotDetermined,
}

/// Errors that can occur when requesting permissions.
#[derive(Debug, Clone)]
pub enum PermissionError {
    /// The permission type is not supported by this backend.
    NotSupported,
    /// An unknown error occurred.
    Unknown(String),
}

impl std::fmt::Display for PermissionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotSupported => write!(f, "permission not supported by this backend"),
            Self::Unknown(msg) => write!(f, "unknown error: {msg}"),
        }
    }
}

impl std::error::Error for PermissionError {}

/// Source of permission decisions.
///
/// Hosts implement this against their platform's permission machinery; the
/// rest of geotag only ever consults the trait.
pub trait PermissionBackend: Send + Sync {
    /// Check the current status of a permission without requesting it.
    fn check(&self, permission: Permission) -> BoxFuture<'static, PermissionStatus>;

    /// Request a permission from the user.
    ///
    /// If the permission has already been granted or denied, this resolves to
    /// the current status without showing a prompt.
    fn request(
        &self,
        permission: Permission,
    ) -> BoxFuture<'static, Result<PermissionStatus, PermissionError>>;
}

/// A backend that answers from a fixed table.
///
/// Useful in tests and simulations; `request` resolves to the configured
/// status without prompting anyone. Permissions absent from the table report
/// [`PermissionStatus::NotDetermined`].
#[derive(Debug, Clone, Default)]
pub struct FixedPermissions {
    statuses: HashMap<Permission, PermissionStatus>,
}

impl FixedPermissions {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the status reported for `permission`.
    #[must_use]
    pub fn with_status(mut self, permission: Permission, status: PermissionStatus) -> Self {
        self.statuses.insert(permission, status);
        self
    }

    /// Mark `permission` as granted.
    #[must_use]
    pub fn granting(self, permission: Permission) -> Self {
        self.with_status(permission, PermissionStatus::Granted)
    }

    /// Mark `permission` as denied.
    #[must_use]
    pub fn denying(self, permission: Permission) -> Self {
        self.with_status(permission, PermissionStatus::Denied)
    }

    fn status(&self, permission: Permission) -> PermissionStatus {
        self.statuses
            .get(&permission)
            .copied()
            .unwrap_or(PermissionStatus::NotDetermined)
    }
}

impl PermissionBackend for FixedPermissions {
    fn check(&self, permission: Permission) -> BoxFuture<'static, PermissionStatus> {
        future::ready(self.status(permission)).boxed()
    }

    fn request(
        &self,
        permission: Permission,
    ) -> BoxFuture<'static, Result<PermissionStatus, PermissionError>> {
        future::ready(Ok(self.status(permission))).boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_permissions_are_not_determined() {
        let backend = FixedPermissions::new();
        assert_eq!(
            futures::executor::block_on(backend.check(Permission::Location)),
            PermissionStatus::NotDetermined
        );
    }

    #[test]
    fn configured_status_is_reported() {
        let backend = FixedPermissions::new()
            .granting(Permission::Location)
            .denying(Permission::Camera);

        assert_eq!(
            futures::executor::block_on(backend.check(Permission::Location)),
            PermissionStatus::Granted
        );
        let requested = futures::executor::block_on(backend.request(Permission::Camera));
        assert_eq!(requested.unwrap(), PermissionStatus::Denied);
    }
}
