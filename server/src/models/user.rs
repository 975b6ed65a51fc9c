use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Platform role of a user. Everything except `Spectator` is structure staff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Spectator,
    StructureAdministrator,
    OrganizationService,
    ReservationService,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Spectator => "SPECTATOR",
            Role::StructureAdministrator => "STRUCTURE_ADMINISTRATOR",
            Role::OrganizationService => "ORGANIZATION_SERVICE",
            Role::ReservationService => "RESERVATION_SERVICE",
        }
    }

    pub fn is_staff(&self) -> bool {
        !matches!(self, Role::Spectator)
    }

    /// Roles allowed to create, edit and change the status of events.
    pub fn can_manage_events(&self) -> bool {
        matches!(
            self,
            Role::StructureAdministrator | Role::OrganizationService
        )
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "SPECTATOR" => Ok(Role::Spectator),
            "STRUCTURE_ADMINISTRATOR" => Ok(Role::StructureAdministrator),
            "ORGANIZATION_SERVICE" => Ok(Role::OrganizationService),
            "RESERVATION_SERVICE" => Ok(Role::ReservationService),
            other => Err(format!("unknown role '{}'", other)),
        }
    }
}

/// The authenticated caller, passed explicitly into every engine operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: Uuid,
    pub email: String,
    pub role: Role,
    /// Structure the user works for, if any.
    pub structure_id: Option<Uuid>,
}

impl Actor {
    pub fn spectator(user_id: Uuid, email: impl Into<String>) -> Self {
        Self {
            user_id,
            email: email.into(),
            role: Role::Spectator,
            structure_id: None,
        }
    }

    pub fn staff(user_id: Uuid, email: impl Into<String>, role: Role, structure_id: Uuid) -> Self {
        Self {
            user_id,
            email: email.into(),
            role,
            structure_id: Some(structure_id),
        }
    }
}
