//! Events reported by [`FlowEngine::tick`](crate::engine::FlowEngine::tick).
//!
//! Events fire on transitions only: a network that stays full does not
//! report `StorageFull` every tick.

use crate::fixed::Ticks;
use crate::id::{EntityId, NetworkId};
use crate::orientation::Orientation;

/// A flow event. All events carry the tick at which they occurred.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowEvent {
    /// A discovery pass replaced every network.
    NetworksRebuilt { networks: usize, tick: Ticks },
    /// A transport segment changed shape after a neighbor changed.
    OrientationChanged {
        entity: EntityId,
        orientation: Orientation,
        tick: Ticks,
    },
    /// A network's storage reached its maximum.
    StorageFull { network: NetworkId, tick: Ticks },
    /// A network's storage ran dry.
    StorageDrained { network: NetworkId, tick: Ticks },
}

impl FlowEvent {
    pub fn tick(&self) -> Ticks {
        match *self {
            FlowEvent::NetworksRebuilt { tick, .. }
            | FlowEvent::OrientationChanged { tick, .. }
            | FlowEvent::StorageFull { tick, .. }
            | FlowEvent::StorageDrained { tick, .. } => tick,
        }
    }

    /// The network this event concerns, if any.
    pub fn network(&self) -> Option<NetworkId> {
        match *self {
            FlowEvent::StorageFull { network, .. } | FlowEvent::StorageDrained { network, .. } => {
                Some(network)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_event_reports_its_tick() {
        let events = [
            FlowEvent::NetworksRebuilt { networks: 3, tick: 7 },
            FlowEvent::StorageFull {
                network: NetworkId(1),
                tick: 7,
            },
            FlowEvent::StorageDrained {
                network: NetworkId(2),
                tick: 7,
            },
        ];
        assert!(events.iter().all(|e| e.tick() == 7));
    }

    #[test]
    fn storage_events_name_their_network() {
        let full = FlowEvent::StorageFull {
            network: NetworkId(4),
            tick: 0,
        };
        assert_eq!(full.network(), Some(NetworkId(4)));
        let rebuilt = FlowEvent::NetworksRebuilt { networks: 0, tick: 0 };
        assert_eq!(rebuilt.network(), None);
    }
}
