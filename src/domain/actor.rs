//! Calling identity and authorization guards.
//!
//! Every service operation receives the acting identity as an explicit
//! parameter and runs its guard checks before touching storage; there is no
//! ambient current-user state anywhere in the crate.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorRole {
    Student,
    Teacher,
    Admin,
}

impl ActorRole {
    pub fn as_str(self) -> &'static str {
        match self {
            ActorRole::Student => "student",
            ActorRole::Teacher => "teacher",
            ActorRole::Admin => "admin",
        }
    }
}

impl TryFrom<&str> for ActorRole {
    type Error = ();

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "student" => Ok(ActorRole::Student),
            "teacher" => Ok(ActorRole::Teacher),
            "admin" => Ok(ActorRole::Admin),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AccessError {
    #[error("operation requires the `{required}` role, caller has `{actual}`")]
    RoleMismatch {
        required: &'static str,
        actual: &'static str,
    },
    #[error("actor `{actor}` does not own the target resource")]
    NotOwner { actor: Uuid },
}

/// Authenticated caller as asserted by the upstream identity provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub id: Uuid,
    pub role: ActorRole,
}

impl Actor {
    pub fn new(id: Uuid, role: ActorRole) -> Self {
        Self { id, role }
    }

    pub fn require_role(&self, required: ActorRole) -> Result<(), AccessError> {
        if self.role == required {
            Ok(())
        } else {
            Err(AccessError::RoleMismatch {
                required: required.as_str(),
                actual: self.role.as_str(),
            })
        }
    }

    /// Ownership is an identity check, not a role check; callers combine it
    /// with [`Actor::require_role`] as the operation demands.
    pub fn require_owner(&self, owner_id: Uuid) -> Result<(), AccessError> {
        if self.id == owner_id {
            Ok(())
        } else {
            Err(AccessError::NotOwner { actor: self.id })
        }
    }

    /// Owners and admins may see a course in any state; everyone else only
    /// sees published courses.
    pub fn can_view_unpublished(&self, owner_id: Uuid) -> bool {
        self.role == ActorRole::Admin || self.id == owner_id
    }

    /// Stable label used for audit trail rows, e.g. `teacher:5c0f…`.
    pub fn label(&self) -> String {
        format!("{}:{}", self.role.as_str(), self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn require_role_accepts_exact_match() {
        let actor = Actor::new(Uuid::new_v4(), ActorRole::Teacher);
        assert!(actor.require_role(ActorRole::Teacher).is_ok());
    }

    #[test]
    fn require_role_rejects_other_roles() {
        let actor = Actor::new(Uuid::new_v4(), ActorRole::Student);
        let err = actor.require_role(ActorRole::Admin).unwrap_err();
        assert_eq!(
            err,
            AccessError::RoleMismatch {
                required: "admin",
                actual: "student",
            }
        );
    }

    #[test]
    fn admins_do_not_inherit_ownership() {
        let owner = Uuid::new_v4();
        let admin = Actor::new(Uuid::new_v4(), ActorRole::Admin);
        assert!(admin.require_owner(owner).is_err());
        assert!(admin.can_view_unpublished(owner));
    }

    #[test]
    fn owner_passes_ownership_and_visibility() {
        let id = Uuid::new_v4();
        let teacher = Actor::new(id, ActorRole::Teacher);
        assert!(teacher.require_owner(id).is_ok());
        assert!(teacher.can_view_unpublished(id));
    }

    #[test]
    fn role_round_trips_through_str() {
        for role in [ActorRole::Student, ActorRole::Teacher, ActorRole::Admin] {
            assert_eq!(ActorRole::try_from(role.as_str()), Ok(role));
        }
        assert!(ActorRole::try_from("root").is_err());
    }
}
