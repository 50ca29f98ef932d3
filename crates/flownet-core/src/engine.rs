//! The flow engine: owns every registered entity's flow components and the
//! networks built from them, and runs the per-tick pipeline.
//!
//! # Tick pipeline
//!
//! 1. **Discovery** -- if any topology change was signalled since the last
//!    tick, rebuild every network once.
//! 2. **Re-orientation** -- re-shape every transport segment inside the
//!    stale areas queued since the last tick.
//! 3. **Balance** -- move resource between pins and network storage.
//! 4. **Bookkeeping** -- report storage transitions, advance the tick.
//!
//! The engine never owns the map; the host passes its [`GridQuery`] to
//! every call that needs tile lookups.

use crate::balance::{balance_network, BalanceOutcome};
use crate::discovery::Discovery;
use crate::event::FlowEvent;
use crate::fixed::{Fixed64, Ticks};
use crate::grid::{GridQuery, TileRect};
use crate::id::{EntityId, NetworkId, ResourceId};
use crate::network::{Network, StorageLevel};
use crate::orientation::{connection_mask, Orientation};
use crate::port::{ConfigError, FlowEntity, Port, DEFAULT_BUFFER_MULTIPLIER};
use crate::resource::ResourceKind;
use crate::stale::StaleAreaScheduler;
use serde::{Deserialize, Serialize};
use slotmap::SecondaryMap;
use std::collections::BTreeMap;
use tracing::{debug, trace};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Engine-wide tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowConfig {
    /// A pin without an explicit max buffer holds this many ticks of its
    /// larger rate.
    pub buffer_multiplier: Fixed64,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            buffer_multiplier: Fixed64::from_num(DEFAULT_BUFFER_MULTIPLIER),
        }
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors from entity registration and lookup.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FlowError {
    #[error("entity {0:?} is already registered")]
    DuplicateEntity(EntityId),
    #[error("entity {0:?} is not registered")]
    UnknownEntity(EntityId),
    #[error("entity {entity:?} has invalid flow configuration")]
    InvalidConfig {
        entity: EntityId,
        #[source]
        source: ConfigError,
    },
    #[error("entity {entity:?} has no pin {port}")]
    UnknownPort { entity: EntityId, port: usize },
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Discovers, stores and balances flow networks.
#[derive(Debug)]
pub struct FlowEngine<R: ResourceKind = ResourceId> {
    entities: SecondaryMap<EntityId, FlowEntity<R>>,
    networks: BTreeMap<NetworkId, Network<R>>,
    next_network_id: u32,
    scheduler: StaleAreaScheduler,
    config: FlowConfig,
    tick: Ticks,
}

impl<R: ResourceKind> Default for FlowEngine<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: ResourceKind> FlowEngine<R> {
    pub fn new() -> Self {
        Self::with_config(FlowConfig::default())
    }

    pub fn with_config(config: FlowConfig) -> Self {
        Self {
            entities: SecondaryMap::new(),
            networks: BTreeMap::new(),
            next_network_id: 0,
            scheduler: StaleAreaScheduler::new(),
            config,
            tick: 0,
        }
    }

    pub fn config(&self) -> &FlowConfig {
        &self.config
    }

    pub fn current_tick(&self) -> Ticks {
        self.tick
    }

    // -----------------------------------------------------------------------
    // Registration and topology signals
    // -----------------------------------------------------------------------

    /// Register an entity's flow components.
    ///
    /// Pins without an explicit max buffer get one derived from
    /// [`FlowConfig::buffer_multiplier`]. Takes effect on the next tick.
    pub fn add_entity(&mut self, id: EntityId, entity: FlowEntity<R>) -> Result<(), FlowError> {
        if self.entities.contains_key(id) {
            return Err(FlowError::DuplicateEntity(id));
        }
        let entity = self.prepare(id, entity)?;
        self.scheduler.mark_entity(entity.placement.bounds());
        self.entities.insert(id, entity);
        Ok(())
    }

    /// Unregister an entity and return its components. Its networks are
    /// rebuilt on the next tick.
    pub fn remove_entity(&mut self, id: EntityId) -> Result<FlowEntity<R>, FlowError> {
        let mut entity = self.entities.remove(id).ok_or(FlowError::UnknownEntity(id))?;
        self.scheduler.mark_entity(entity.placement.bounds());
        entity.reset_links();
        Ok(entity)
    }

    /// Replace an entity's flow components, e.g. after a rotation or a
    /// content change.
    pub fn update_entity(&mut self, id: EntityId, entity: FlowEntity<R>) -> Result<(), FlowError> {
        let old_bounds = self
            .entities
            .get(id)
            .map(|old| old.placement.bounds())
            .ok_or(FlowError::UnknownEntity(id))?;
        let entity = self.prepare(id, entity)?;
        self.scheduler.mark_entity(old_bounds);
        self.scheduler.mark_entity(entity.placement.bounds());
        self.entities.insert(id, entity);
        Ok(())
    }

    /// Signal a host-side change that affects connectivity without
    /// replacing the components.
    pub fn entity_changed(&mut self, id: EntityId) -> Result<(), FlowError> {
        let entity = self.entities.get(id).ok_or(FlowError::UnknownEntity(id))?;
        self.scheduler.mark_entity(entity.placement.bounds());
        Ok(())
    }

    fn prepare(&self, id: EntityId, mut entity: FlowEntity<R>) -> Result<FlowEntity<R>, FlowError> {
        entity.resolve_buffers(self.config.buffer_multiplier);
        entity
            .validate()
            .map_err(|source| FlowError::InvalidConfig { entity: id, source })?;
        entity.reset_links();
        Ok(entity)
    }

    // -----------------------------------------------------------------------
    // Lookups
    // -----------------------------------------------------------------------

    pub fn entity(&self, id: EntityId) -> Option<&FlowEntity<R>> {
        self.entities.get(id)
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    /// A pin, for host-side buffer access.
    pub fn pin(&self, entity: EntityId, port: usize) -> Result<&Port<R>, FlowError> {
        self.entities
            .get(entity)
            .ok_or(FlowError::UnknownEntity(entity))?
            .pins
            .get(port)
            .ok_or(FlowError::UnknownPort { entity, port })
    }

    /// A pin, for host-side [`fill`](Port::fill) and [`drain`](Port::drain).
    pub fn pin_mut(&mut self, entity: EntityId, port: usize) -> Result<&mut Port<R>, FlowError> {
        self.entities
            .get_mut(entity)
            .ok_or(FlowError::UnknownEntity(entity))?
            .pins
            .get_mut(port)
            .ok_or(FlowError::UnknownPort { entity, port })
    }

    pub fn network(&self, id: NetworkId) -> Option<&Network<R>> {
        self.networks.get(&id)
    }

    /// Every live network, in id order.
    pub fn networks(&self) -> impl Iterator<Item = &Network<R>> {
        self.networks.values()
    }

    pub fn network_count(&self) -> usize {
        self.networks.len()
    }

    pub fn pin_network(&self, entity: EntityId, port: usize) -> Option<&Network<R>> {
        let id = self.entities.get(entity)?.pins.get(port)?.network()?;
        self.networks.get(&id)
    }

    pub fn connector_network(&self, entity: EntityId) -> Option<&Network<R>> {
        let id = self.entities.get(entity)?.connector.as_ref()?.network()?;
        self.networks.get(&id)
    }

    pub fn tunnel_network(&self, entity: EntityId, slot: usize) -> Option<&Network<R>> {
        let id = self.entities.get(entity)?.tunnels.get(slot)?.network()?;
        self.networks.get(&id)
    }

    pub fn scheduler(&self) -> &StaleAreaScheduler {
        &self.scheduler
    }

    // -----------------------------------------------------------------------
    // Passes
    // -----------------------------------------------------------------------

    /// Rebuild every network from scratch, carrying stored volume over.
    /// Returns the number of networks built.
    pub fn rebuild_networks<G: GridQuery + ?Sized>(&mut self, grid: &G) -> usize {
        for entity in self.entities.values_mut() {
            entity.detach_links();
        }
        let previous = std::mem::take(&mut self.networks);
        self.networks = Discovery::new(grid, &mut self.entities, &previous)
            .run(&mut self.next_network_id);
        for entity in self.entities.values_mut() {
            entity.clear_previous_links();
        }
        self.networks.len()
    }

    /// Re-shape every connector inside `rect`. Returns the segments whose
    /// orientation changed.
    pub fn reorient<G: GridQuery + ?Sized>(
        &mut self,
        grid: &G,
        rect: TileRect,
    ) -> Vec<(EntityId, Orientation)> {
        let mut changed = Vec::new();
        for id in grid.entities_in_rect(rect) {
            let Some(mask) = connection_mask(grid, &self.entities, id) else {
                continue;
            };
            let orientation = Orientation::from_mask(mask);
            let Some(connector) = self
                .entities
                .get_mut(id)
                .and_then(|entity| entity.connector.as_mut())
            else {
                continue;
            };
            if connector.orientation != orientation {
                connector.orientation = orientation;
                trace!(?id, ?orientation, "segment re-oriented");
                changed.push((id, orientation));
            }
        }
        changed
    }

    /// Run one balance step on every network.
    ///
    /// Balancing consumes buffered resource, so it must run exactly once
    /// per tick; [`tick`](Self::tick) already does.
    pub fn balance(&mut self) -> BTreeMap<NetworkId, BalanceOutcome> {
        self.networks
            .iter_mut()
            .map(|(&id, network)| (id, balance_network(network, &mut self.entities)))
            .collect()
    }

    /// Advance one tick. See the module docs for the pipeline.
    pub fn tick<G: GridQuery + ?Sized>(&mut self, grid: &G) -> Vec<FlowEvent> {
        let mut events = Vec::new();
        let tick = self.tick;

        if self.scheduler.take_full_recompute() {
            let networks = self.rebuild_networks(grid);
            debug!(tick, networks, "networks rebuilt");
            events.push(FlowEvent::NetworksRebuilt { networks, tick });
        }

        for rect in self.scheduler.drain_areas() {
            for (entity, orientation) in self.reorient(grid, rect) {
                events.push(FlowEvent::OrientationChanged {
                    entity,
                    orientation,
                    tick,
                });
            }
        }

        self.balance();

        for network in self.networks.values_mut() {
            if network.max_volume() <= Fixed64::ZERO {
                continue;
            }
            match network.update_level() {
                Some(StorageLevel::Full) => events.push(FlowEvent::StorageFull {
                    network: network.id,
                    tick,
                }),
                Some(StorageLevel::Empty) => events.push(FlowEvent::StorageDrained {
                    network: network.id,
                    tick,
                }),
                Some(StorageLevel::Partial) | None => {}
            }
        }

        self.tick += 1;
        events
    }
}
