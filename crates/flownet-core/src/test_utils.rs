//! Shared test helpers for integration tests and benchmarks.
//!
//! Gated behind `#[cfg(any(test, feature = "test-utils"))]` so these helpers
//! are available in unit tests, integration tests, and benchmarks (via the
//! `test-utils` feature).

use crate::engine::{FlowConfig, FlowEngine};
use crate::event::FlowEvent;
use crate::fixed::Fixed64;
use crate::grid::{Direction, GridPosition, Layer, Placement, TileGrid};
use crate::id::{EntityId, ResourceId};
use crate::port::{Connector, FlowEntity, Port, TunnelSlot};
use crate::resource::TypeTag;
use slotmap::SlotMap;

// ===========================================================================
// Fixed-point helper
// ===========================================================================

pub fn fixed(v: f64) -> Fixed64 {
    Fixed64::from_num(v)
}

// ===========================================================================
// Resource constructors
// ===========================================================================

pub fn water() -> ResourceId {
    ResourceId(0)
}
pub fn steam() -> ResourceId {
    ResourceId(1)
}
pub fn crude_oil() -> ResourceId {
    ResourceId(2)
}

// ===========================================================================
// Entity builders
// ===========================================================================

pub fn at(x: i32, y: i32) -> Placement {
    Placement::at(GridPosition::new(x, y))
}

/// An omni-directional energy wire on layer 1.
pub fn wire(x: i32, y: i32, max_volume: f64, throughput: f64) -> FlowEntity {
    FlowEntity::new(at(x, y).with_layer(Layer(1))).with_connector(Connector::new(
        TypeTag::Energy,
        fixed(max_volume),
        fixed(throughput),
    ))
}

/// An omni-directional pipe segment on layer 0.
pub fn pipe(x: i32, y: i32, max_volume: f64, throughput: f64) -> FlowEntity {
    FlowEntity::new(at(x, y)).with_connector(Connector::new(
        TypeTag::Pipe,
        fixed(max_volume),
        fixed(throughput),
    ))
}

/// A producer pin on the entity's origin tile.
pub fn producer_pin(facing: Direction, rate: f64, buffer: f64, tag: TypeTag) -> Port {
    Port::producer(GridPosition::ORIGIN, facing, fixed(rate))
        .with_buffer(fixed(buffer))
        .with_tag(tag)
}

/// A consumer pin on the entity's origin tile.
pub fn consumer_pin(facing: Direction, rate: f64, tag: TypeTag) -> Port {
    Port::consumer(GridPosition::ORIGIN, facing, fixed(rate)).with_tag(tag)
}

/// A single-tile machine carrying one pin.
pub fn machine(x: i32, y: i32, pin: Port) -> FlowEntity {
    FlowEntity::new(at(x, y)).with_pin(pin)
}

/// A pipe tunnel end opening toward `opening` with the given range.
pub fn tunnel(x: i32, y: i32, opening: Direction, max_length: u32) -> FlowEntity {
    FlowEntity::new(at(x, y)).with_tunnel(
        TunnelSlot::new(TypeTag::Pipe, opening, max_length).with_capacity(fixed(10.0), fixed(10.0)),
    )
}

// ===========================================================================
// ID helpers
// ===========================================================================

pub fn make_entity_ids(count: usize) -> (SlotMap<EntityId, ()>, Vec<EntityId>) {
    let mut sm: SlotMap<EntityId, ()> = SlotMap::with_key();
    let ids: Vec<EntityId> = (0..count).map(|_| sm.insert(())).collect();
    (sm, ids)
}

// ===========================================================================
// Test world
// ===========================================================================

/// A host stand-in: owns the key space and the map and keeps the engine
/// informed of every change.
#[derive(Debug, Default)]
pub struct TestWorld {
    pub keys: SlotMap<EntityId, ()>,
    pub grid: TileGrid,
    pub engine: FlowEngine,
}

impl TestWorld {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: FlowConfig) -> Self {
        Self {
            engine: FlowEngine::with_config(config),
            ..Self::default()
        }
    }

    /// Place and register an entity. Panics on overlap or invalid config.
    pub fn add(&mut self, entity: FlowEntity) -> EntityId {
        let id = self.keys.insert(());
        self.grid
            .place(id, entity.placement)
            .expect("tile already occupied");
        self.engine
            .add_entity(id, entity)
            .expect("invalid flow entity");
        id
    }

    pub fn remove(&mut self, id: EntityId) -> FlowEntity {
        self.grid.remove(id).expect("entity not placed");
        self.keys.remove(id);
        self.engine.remove_entity(id).expect("entity not registered")
    }

    pub fn tick(&mut self) -> Vec<FlowEvent> {
        self.engine.tick(&self.grid)
    }
}
