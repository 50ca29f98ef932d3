//! Network discovery: partitions every connector, tunnel slot and pin port
//! into disjoint [`Network`]s.
//!
//! A pass always rebuilds every network. Before the rebuild each member's
//! live network id moves into its `previous` slot, and the previous arena is
//! kept aside so stored volume can be carried over proportionally.
//!
//! Traversal is breadth-first from each unclaimed connector or tunnel slot.
//! Members are claimed (linked to the new network) when enqueued, so no
//! member is queued twice; they are registered on the network when popped.
//!
//! Neighbor search from a tile looks one step along each outward direction
//! and tests every entity on that tile, on every layer:
//! - a connector joins if it opens back toward the origin and has the
//!   network's tag;
//! - otherwise pin ports on that tile facing back join if their tag and
//!   resource kind fit. A matching pin ends the test for that entity;
//! - otherwise tunnel slots on that tile facing back join if their tag fits.
//!
//! Tunnel slots additionally cast a ray along their tunnel direction and
//! pair with the first same-tag slot facing back, up to `max_length` tiles.

use crate::fixed::{mul_div, Fixed64};
use crate::grid::{Direction, GridPosition, GridQuery};
use crate::id::{EntityId, LinkRef, NetworkId, PortRef};
use crate::network::Network;
use crate::port::{FlowEntity, PortKind};
use crate::resource::{admits, ResourceKind, TypeTag};
use slotmap::SecondaryMap;
use std::collections::{BTreeMap, VecDeque};
use tracing::{debug, trace};

/// A queued traversal step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Visit {
    Pin(PortRef),
    Link(LinkRef),
}

/// Volume carried over from one previous network.
struct MigratedShare<R> {
    resource: Option<R>,
    amount: Fixed64,
}

/// One discovery pass over the entity store.
pub(crate) struct Discovery<'a, G: GridQuery + ?Sized, R: ResourceKind> {
    grid: &'a G,
    entities: &'a mut SecondaryMap<EntityId, FlowEntity<R>>,
    previous: &'a BTreeMap<NetworkId, Network<R>>,
}

impl<'a, G: GridQuery + ?Sized, R: ResourceKind> Discovery<'a, G, R> {
    pub(crate) fn new(
        grid: &'a G,
        entities: &'a mut SecondaryMap<EntityId, FlowEntity<R>>,
        previous: &'a BTreeMap<NetworkId, Network<R>>,
    ) -> Self {
        Self {
            grid,
            entities,
            previous,
        }
    }

    /// Rebuild every network. `next_id` is advanced for each network built.
    ///
    /// The caller must have detached all links (see
    /// [`FlowEntity::detach_links`]) and must clear the `previous` slots
    /// afterwards.
    pub(crate) fn run(mut self, next_id: &mut u32) -> BTreeMap<NetworkId, Network<R>> {
        let mut networks = BTreeMap::new();

        // Seeds are gathered up front; claims made while building earlier
        // networks are re-checked before each seed starts a new one.
        let seeds: Vec<LinkRef> = self
            .entities
            .iter()
            .flat_map(|(id, entity)| {
                let connector = entity.connector.as_ref().map(|_| LinkRef::Connector(id));
                let tunnels = (0..entity.tunnels.len()).map(move |slot| LinkRef::Tunnel {
                    entity: id,
                    slot,
                });
                connector.into_iter().chain(tunnels)
            })
            .collect();

        for seed in seeds {
            let Some(tag) = self.unclaimed_link_tag(seed) else {
                continue;
            };
            let id = NetworkId(*next_id);
            *next_id += 1;

            let network = self.build(id, tag, seed);
            trace!(
                network = id.0,
                links = network.links.len(),
                providers = network.providers.len(),
                consumers = network.consumers.len(),
                volume = %network.volume,
                "network built"
            );
            networks.insert(id, network);
        }

        debug!(networks = networks.len(), "network discovery finished");
        networks
    }

    fn unclaimed_link_tag(&self, link: LinkRef) -> Option<TypeTag> {
        let entity = self.entities.get(link.entity())?;
        match link {
            LinkRef::Connector(_) => entity
                .connector
                .as_ref()
                .filter(|c| !c.link.is_claimed())
                .map(|c| c.tag),
            LinkRef::Tunnel { slot, .. } => entity
                .tunnels
                .get(slot)
                .filter(|t| !t.link.is_claimed())
                .map(|t| t.tag),
        }
    }

    /// Breadth-first build of one network from a seed link.
    fn build(&mut self, id: NetworkId, tag: TypeTag, seed: LinkRef) -> Network<R> {
        let mut network = Network::new(id, tag);
        let mut shares: Vec<MigratedShare<R>> = Vec::new();
        let mut queue = VecDeque::new();

        self.claim_link(seed, id);
        queue.push_back(Visit::Link(seed));

        while let Some(visit) = queue.pop_front() {
            match visit {
                Visit::Pin(port) => self.visit_pin(&mut network, port, &mut queue),
                Visit::Link(link) => {
                    self.visit_link(&mut network, link, &mut shares, &mut queue)
                }
            }
        }

        // Storage carried over from a network of another resource kind is
        // invalid in this one.
        let carried = shares
            .iter()
            .filter(|share| share.resource == network.resource)
            .fold(Fixed64::ZERO, |acc, share| acc.saturating_add(share.amount));
        network.volume = carried.clamp(Fixed64::ZERO, network.max_volume().max(Fixed64::ZERO));
        network.last_level = network.storage_level();
        network
    }

    fn visit_pin(&mut self, network: &mut Network<R>, port_ref: PortRef, queue: &mut VecDeque<Visit>) {
        let Some(entity) = self.entities.get(port_ref.entity) else {
            return;
        };
        let Some(port) = entity.pins.get(port_ref.port) else {
            return;
        };
        debug_assert_eq!(port.tag, network.tag, "pin admitted across tags");

        match port.kind {
            PortKind::Producer => network.add_provider(port_ref),
            PortKind::Consumer => network.add_consumer(port_ref),
        }
        let origin = port.world_tile(&entity.placement);
        let dir = port.world_direction(&entity.placement);
        self.search_neighbor(network, origin, dir, queue);
    }

    fn visit_link(
        &mut self,
        network: &mut Network<R>,
        link: LinkRef,
        shares: &mut Vec<MigratedShare<R>>,
        queue: &mut VecDeque<Visit>,
    ) {
        let Some(entity) = self.entities.get(link.entity()) else {
            return;
        };
        let placement = entity.placement;

        let (origin, dirs, max_volume, max_throughput, previous, ray) = match link {
            LinkRef::Connector(_) => {
                let Some(c) = entity.connector.as_ref() else {
                    return;
                };
                debug_assert_eq!(c.tag, network.tag, "connector admitted across tags");
                (
                    c.world_tile(&placement),
                    c.world_directions(&placement),
                    c.max_volume,
                    c.max_throughput,
                    c.link.previous(),
                    None,
                )
            }
            LinkRef::Tunnel { slot, .. } => {
                let Some(t) = entity.tunnels.get(slot) else {
                    return;
                };
                debug_assert_eq!(t.tag, network.tag, "tunnel admitted across tags");
                (
                    t.world_tile(&placement),
                    vec![t.world_direction(&placement)],
                    t.max_volume,
                    t.max_throughput,
                    t.link.previous(),
                    Some((t.world_tunnel_direction(&placement), t.max_length)),
                )
            }
        };

        network.add_link(link, max_volume, max_throughput);
        if let Some(share) = self.migrate(network, previous, max_volume) {
            shares.push(share);
        }

        for dir in dirs {
            self.search_neighbor(network, origin, dir, queue);
        }
        if let Some((tunnel_dir, max_length)) = ray {
            self.search_tunnel(network.id, network.tag, origin, tunnel_dir, max_length, queue);
        }
    }

    /// This link's proportional share of its previous network's volume.
    fn migrate(
        &self,
        network: &Network<R>,
        previous: Option<NetworkId>,
        max_volume: Fixed64,
    ) -> Option<MigratedShare<R>> {
        let old = self.previous.get(&previous?)?;
        if network.resource.is_some() && old.resource != network.resource {
            return None;
        }
        Some(MigratedShare {
            resource: old.resource,
            amount: mul_div(max_volume, old.volume, old.max_volume()),
        })
    }

    /// Test every entity one step from `origin` along `dir`.
    fn search_neighbor(
        &mut self,
        network: &mut Network<R>,
        origin: GridPosition,
        dir: Direction,
        queue: &mut VecDeque<Visit>,
    ) {
        let tile = origin.step(dir);
        let facing = dir.inverse();

        for entity_id in self.grid.entities_at(tile, None) {
            let Some(entity) = self.entities.get_mut(entity_id) else {
                continue;
            };
            let placement = entity.placement;

            if let Some(c) = entity.connector.as_mut() {
                if c.world_tile(&placement) == tile
                    && c.accepts(&placement, facing)
                    && c.tag == network.tag
                    && !c.link.is_claimed()
                {
                    c.link.claim(network.id);
                    queue.push_back(Visit::Link(LinkRef::Connector(entity_id)));
                }
                continue;
            }

            let mut pin_matched = false;
            for (index, port) in entity.pins.iter_mut().enumerate() {
                if port.world_tile(&placement) != tile
                    || port.world_direction(&placement) != facing
                    || port.tag != network.tag
                    || port.link.is_claimed()
                    || !admits(network.resource, port.resource)
                {
                    continue;
                }
                if network.resource.is_none() {
                    network.resource = port.resource;
                }
                port.link.claim(network.id);
                queue.push_back(Visit::Pin(PortRef {
                    entity: entity_id,
                    port: index,
                }));
                pin_matched = true;
            }
            if pin_matched {
                continue;
            }

            for (slot, t) in entity.tunnels.iter_mut().enumerate() {
                if t.world_tile(&placement) == tile
                    && t.world_direction(&placement) == facing
                    && t.tag == network.tag
                    && !t.link.is_claimed()
                {
                    t.link.claim(network.id);
                    queue.push_back(Visit::Link(LinkRef::Tunnel {
                        entity: entity_id,
                        slot,
                    }));
                }
            }
        }
    }

    /// Walk up to `max_length` tiles along `dir` for an unclaimed partner
    /// slot facing back. The first one found ends the walk; claimed slots
    /// are passed over.
    fn search_tunnel(
        &mut self,
        network_id: NetworkId,
        tag: TypeTag,
        origin: GridPosition,
        dir: Direction,
        max_length: u32,
        queue: &mut VecDeque<Visit>,
    ) {
        let facing = dir.inverse();
        for distance in 1..=max_length {
            let tile = origin.step_by(dir, distance as i32);
            for entity_id in self.grid.entities_at(tile, None) {
                let Some(entity) = self.entities.get_mut(entity_id) else {
                    continue;
                };
                let placement = entity.placement;
                let partner = entity.tunnels.iter_mut().enumerate().find(|(_, t)| {
                    t.world_tile(&placement) == tile
                        && t.world_tunnel_direction(&placement) == facing
                        && t.tag == tag
                        && !t.link.is_claimed()
                });
                if let Some((slot, t)) = partner {
                    t.link.claim(network_id);
                    queue.push_back(Visit::Link(LinkRef::Tunnel {
                        entity: entity_id,
                        slot,
                    }));
                    return;
                }
            }
        }
    }

    fn claim_link(&mut self, link: LinkRef, network: NetworkId) {
        let Some(entity) = self.entities.get_mut(link.entity()) else {
            return;
        };
        match link {
            LinkRef::Connector(_) => {
                if let Some(c) = entity.connector.as_mut() {
                    c.link.claim(network);
                }
            }
            LinkRef::Tunnel { slot, .. } => {
                if let Some(t) = entity.tunnels.get_mut(slot) {
                    t.link.claim(network);
                }
            }
        }
    }
}
