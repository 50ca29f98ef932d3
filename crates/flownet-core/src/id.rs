use serde::{Deserialize, Serialize};
use slotmap::new_key_type;

new_key_type! {
    /// Identifies a host entity (building, pipe segment, wire pole) that
    /// carries flow components. The host owns the key space.
    pub struct EntityId;
}

/// Identifies a network built by a discovery pass.
///
/// Ids increase monotonically across passes and are never reused, so a
/// stale id from an earlier pass can never alias a live network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NetworkId(pub u32);

/// Identifies a resource variant (water, steam, crude oil, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ResourceId(pub u32);

/// A single pin port on an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PortRef {
    pub entity: EntityId,
    pub port: usize,
}

/// A transport member of a network: a plain connector or one tunnel slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum LinkRef {
    Connector(EntityId),
    Tunnel { entity: EntityId, slot: usize },
}

impl LinkRef {
    /// The entity hosting this link.
    pub fn entity(&self) -> EntityId {
        match *self {
            LinkRef::Connector(entity) => entity,
            LinkRef::Tunnel { entity, .. } => entity,
        }
    }
}
