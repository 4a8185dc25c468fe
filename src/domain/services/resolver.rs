#[cfg(test)]
#[path = "resolver_test.rs"]
mod tests;

use crate::domain::models::SessionKey;
use crate::domain::models::LEGACY_OWNER;

pub struct SessionResolver {}

impl SessionResolver {
    /// Derives the storage identity for an owner/project pair. No project
    /// means no session: persistence stays disabled rather than guessing a
    /// bucket. A missing owner maps to the legacy sentinel so pre-login
    /// installs keep reading the history they wrote.
    pub fn resolve(owner: Option<&str>, project: Option<&str>) -> Option<SessionKey> {
        let project = project?.trim();
        if project.is_empty() {
            return None;
        }

        let owner = match owner {
            Some(owner) if !owner.trim().is_empty() => owner.trim(),
            _ => LEGACY_OWNER,
        };

        return Some(SessionKey::new(owner, project));
    }
}
