//! Flownet Core -- resource flow networks for tile-based simulations.
//!
//! Entities on a grid carry flow components: pins (producer or consumer
//! ports with a local buffer), connectors (wires, pipes) and tunnel slots
//! (connectors that bridge open tiles). The engine groups connected,
//! compatible components into networks and balances each network once per
//! tick, pooling surplus in the network's storage.
//!
//! # Tick Pipeline
//!
//! Each call to [`engine::FlowEngine::tick`] runs:
//!
//! 1. **Discovery** -- rebuild every network if the topology changed.
//! 2. **Re-orientation** -- re-shape transport segments near changes.
//! 3. **Balance** -- move resource between pins and network storage.
//! 4. **Bookkeeping** -- report storage transitions, advance the tick.
//!
//! # Topology Signals
//!
//! The host owns the map and the entity key space. It registers flow
//! components with [`engine::FlowEngine::add_entity`], reports changes with
//! `update_entity` / `entity_changed` / `remove_entity`, and passes its
//! [`grid::GridQuery`] into every tick:
//!
//! ```rust,ignore
//! engine.add_entity(id, FlowEntity::new(Placement::at(pos)).with_connector(pipe))?;
//! let events = engine.tick(&grid);
//! ```
//!
//! # Key Types
//!
//! - [`engine::FlowEngine`] -- registration, lookups and the tick pipeline.
//! - [`port::FlowEntity`] -- an entity's placement plus its connector, pins
//!   and tunnel slots.
//! - [`network::Network`] -- a connected set of members sharing storage.
//! - [`grid::TileGrid`] -- an in-memory [`grid::GridQuery`] implementation.
//! - [`fixed::Fixed64`] -- Q32.32 fixed-point type for deterministic math.

pub mod balance;
mod discovery;
pub mod engine;
pub mod event;
pub mod fixed;
pub mod grid;
pub mod id;
pub mod network;
pub mod orientation;
pub mod port;
pub mod resource;
pub mod stale;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
