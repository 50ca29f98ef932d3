use crate::fixed::Fixed64;
use crate::id::{LinkRef, NetworkId, PortRef, ResourceId};
use crate::resource::{ResourceKind, TypeTag};
use serde::{Deserialize, Serialize};

/// Coarse fill state of a network's storage, tracked to report transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum StorageLevel {
    #[default]
    Empty,
    Partial,
    Full,
}

/// A maximal connected set of compatible ports and connectors sharing one
/// resource pool.
///
/// Networks are rebuilt from scratch by every discovery pass; members refer
/// back to them by [`NetworkId`] only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Network<R = ResourceId> {
    pub id: NetworkId,
    /// Tag shared by every member.
    pub tag: TypeTag,
    pub providers: Vec<PortRef>,
    pub consumers: Vec<PortRef>,
    /// Member connectors and tunnel slots.
    pub links: Vec<LinkRef>,
    /// Every member port, providers and consumers alike.
    pub ports: Vec<PortRef>,
    /// Stored resource, kept within `0..=max_volume` by the balancer.
    pub volume: Fixed64,
    /// Largest single per-port flow of the last balance. Diagnostic only.
    pub throughput: Fixed64,
    /// Set by the first typed member; further members must match.
    pub resource: Option<R>,
    /// Sum of member links' max volume.
    max_volume: Fixed64,
    /// Smallest member link throughput; `None` while there are no links.
    weakest_link: Option<Fixed64>,
    /// Level as of the last reported transition.
    #[serde(skip)]
    pub(crate) last_level: StorageLevel,
}

impl<R: ResourceKind> Network<R> {
    pub fn new(id: NetworkId, tag: TypeTag) -> Self {
        Self {
            id,
            tag,
            providers: Vec::new(),
            consumers: Vec::new(),
            links: Vec::new(),
            ports: Vec::new(),
            volume: Fixed64::ZERO,
            throughput: Fixed64::ZERO,
            resource: None,
            max_volume: Fixed64::ZERO,
            weakest_link: None,
            last_level: StorageLevel::Empty,
        }
    }

    /// Register a producer port.
    pub fn add_provider(&mut self, port: PortRef) {
        self.providers.push(port);
        self.ports.push(port);
    }

    /// Register a consumer port.
    pub fn add_consumer(&mut self, port: PortRef) {
        self.consumers.push(port);
        self.ports.push(port);
    }

    /// Register a connector or tunnel slot and fold in its capacity.
    pub fn add_link(&mut self, link: LinkRef, max_volume: Fixed64, max_throughput: Fixed64) {
        self.links.push(link);
        self.max_volume = self.max_volume.saturating_add(max_volume);
        self.weakest_link = Some(match self.weakest_link {
            Some(weakest) => weakest.min(max_throughput),
            None => max_throughput,
        });
    }

    /// Total storage: the sum of member links' max volume.
    pub fn max_volume(&self) -> Fixed64 {
        self.max_volume
    }

    /// Per-port flow ceiling: the weakest link's throughput scaled by how
    /// many endpoints share it. `None` (unconstrained) without links.
    pub fn max_throughput(&self) -> Option<Fixed64> {
        let endpoints = self.providers.len().max(self.consumers.len());
        self.weakest_link
            .map(|weakest| weakest.saturating_mul(Fixed64::saturating_from_num(endpoints)))
    }

    /// Storage headroom.
    pub fn free_volume(&self) -> Fixed64 {
        (self.max_volume - self.volume).max(Fixed64::ZERO)
    }

    pub fn is_full(&self) -> bool {
        self.max_volume > Fixed64::ZERO && self.volume >= self.max_volume
    }

    pub fn is_empty(&self) -> bool {
        self.volume <= Fixed64::ZERO
    }

    pub fn storage_level(&self) -> StorageLevel {
        if self.is_empty() {
            StorageLevel::Empty
        } else if self.is_full() {
            StorageLevel::Full
        } else {
            StorageLevel::Partial
        }
    }

    /// Record the current level, returning it if it differs from the last
    /// recorded one.
    pub(crate) fn update_level(&mut self) -> Option<StorageLevel> {
        let level = self.storage_level();
        if level == self.last_level {
            None
        } else {
            self.last_level = level;
            Some(level)
        }
    }

    /// Fraction of storage in use, 0 for a network without storage.
    pub fn fill_ratio(&self) -> Fixed64 {
        if self.max_volume <= Fixed64::ZERO {
            Fixed64::ZERO
        } else {
            self.volume / self.max_volume
        }
    }

    pub fn member_count(&self) -> usize {
        self.links.len() + self.ports.len()
    }
}
