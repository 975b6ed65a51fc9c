use async_trait::async_trait;
use uuid::Uuid;

use crate::models::Actor;

/// Decides what an actor may do within a structure.
#[async_trait]
pub trait AuthorizationGate: Send + Sync {
    /// Door-side rights: validating tickets and listing them.
    async fn is_staff_of(&self, structure_id: Uuid, actor: &Actor) -> bool;

    /// Scheduling rights: creating, editing, publishing, cancelling and
    /// deleting the structure's events.
    async fn can_manage_events(&self, structure_id: Uuid, actor: &Actor) -> bool;
}

/// Grants rights to actors whose structure claim matches and whose role
/// covers the operation.
#[derive(Debug, Clone, Copy, Default)]
pub struct StructureMembershipGate;

#[async_trait]
impl AuthorizationGate for StructureMembershipGate {
    async fn is_staff_of(&self, structure_id: Uuid, actor: &Actor) -> bool {
        actor.role.is_staff() && actor.structure_id == Some(structure_id)
    }

    async fn can_manage_events(&self, structure_id: Uuid, actor: &Actor) -> bool {
        actor.role.can_manage_events() && actor.structure_id == Some(structure_id)
    }
}
