//! The flow components an entity can carry: pins (terminal producer or
//! consumer ports with a local buffer), connectors (passive transport
//! segments) and tunnel slots (connectors that bridge open space).
//!
//! Components hold a [`NetworkLink`] naming the network they currently
//! belong to by id. Discovery moves the current id into the `previous`
//! slot before a rebuild so stored volume can be migrated, then clears it.

use crate::fixed::Fixed64;
use crate::grid::{Direction, GridPosition, Placement};
use crate::id::{NetworkId, ResourceId};
use crate::orientation::Orientation;
use crate::resource::{ResourceKind, TypeTag};
use serde::{Deserialize, Serialize};

/// Default max-buffer multiplier: a pin buffers three ticks of its rate.
pub const DEFAULT_BUFFER_MULTIPLIER: i32 = 3;

/// Longest tunnel search, in tiles.
pub const MAX_TUNNEL_LENGTH: u32 = 1024;

// ---------------------------------------------------------------------------
// Network link
// ---------------------------------------------------------------------------

/// Non-owning reference from a component to its network.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NetworkLink {
    current: Option<NetworkId>,
    previous: Option<NetworkId>,
}

impl NetworkLink {
    pub fn network(&self) -> Option<NetworkId> {
        self.current
    }

    /// The network this component belonged to before the running pass.
    pub fn previous(&self) -> Option<NetworkId> {
        self.previous
    }

    pub fn is_claimed(&self) -> bool {
        self.current.is_some()
    }

    pub(crate) fn claim(&mut self, network: NetworkId) {
        self.current = Some(network);
    }

    pub(crate) fn detach(&mut self) {
        self.previous = self.current.take();
    }

    pub(crate) fn clear_previous(&mut self) {
        self.previous = None;
    }

    pub(crate) fn reset(&mut self) {
        *self = Self::default();
    }
}

// ---------------------------------------------------------------------------
// Pins
// ---------------------------------------------------------------------------

/// Whether a pin feeds the network or draws from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PortKind {
    Producer,
    Consumer,
}

/// A terminal slot on an entity.
///
/// Producers hand buffered resource to the network via [`produce`];
/// consumers receive it into their buffer via [`consume`]. The host refills
/// producers with [`fill`] and empties consumers with [`drain`].
///
/// [`produce`]: Port::produce
/// [`consume`]: Port::consume
/// [`fill`]: Port::fill
/// [`drain`]: Port::drain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Port<R = ResourceId> {
    /// Tile of the host entity the port sits on (local, unrotated).
    pub offset: GridPosition,
    /// Side the port faces (local, unrotated).
    pub direction: Direction,
    pub kind: PortKind,
    pub tag: TypeTag,
    pub production_rate: Fixed64,
    pub consumption_rate: Fixed64,
    pub buffer: Fixed64,
    pub max_buffer: Fixed64,
    /// Explicit max-buffer; `None` derives it from the rates.
    pub max_buffer_override: Option<Fixed64>,
    /// Resource filter. `None` accepts whatever the network carries.
    pub resource: Option<R>,
    #[serde(skip)]
    pub(crate) link: NetworkLink,
}

impl<R: ResourceKind> Port<R> {
    fn new(offset: GridPosition, direction: Direction, kind: PortKind) -> Self {
        Self {
            offset,
            direction,
            kind,
            tag: TypeTag::default(),
            production_rate: Fixed64::ZERO,
            consumption_rate: Fixed64::ZERO,
            buffer: Fixed64::ZERO,
            max_buffer: Fixed64::ZERO,
            max_buffer_override: None,
            resource: None,
            link: NetworkLink::default(),
        }
    }

    /// A producer emitting up to `rate` per tick.
    pub fn producer(offset: GridPosition, direction: Direction, rate: Fixed64) -> Self {
        let mut port = Self::new(offset, direction, PortKind::Producer);
        port.production_rate = rate;
        port.resolve_max_buffer(Fixed64::from_num(DEFAULT_BUFFER_MULTIPLIER));
        port
    }

    /// A consumer absorbing up to `rate` per tick.
    pub fn consumer(offset: GridPosition, direction: Direction, rate: Fixed64) -> Self {
        let mut port = Self::new(offset, direction, PortKind::Consumer);
        port.consumption_rate = rate;
        port.resolve_max_buffer(Fixed64::from_num(DEFAULT_BUFFER_MULTIPLIER));
        port
    }

    pub fn with_tag(mut self, tag: TypeTag) -> Self {
        self.tag = tag;
        self
    }

    pub fn with_resource(mut self, resource: R) -> Self {
        self.resource = Some(resource);
        self
    }

    pub fn with_buffer(mut self, buffer: Fixed64) -> Self {
        self.buffer = buffer;
        self
    }

    pub fn with_max_buffer(mut self, max_buffer: Fixed64) -> Self {
        self.max_buffer_override = Some(max_buffer);
        self.max_buffer = max_buffer;
        self
    }

    /// Recompute `max_buffer` as `multiplier * max(production, consumption)`
    /// unless an explicit override is set.
    pub fn resolve_max_buffer(&mut self, multiplier: Fixed64) {
        self.max_buffer = match self.max_buffer_override {
            Some(max) => max,
            None => self
                .production_rate
                .max(self.consumption_rate)
                .saturating_mul(multiplier),
        };
    }

    pub fn network(&self) -> Option<NetworkId> {
        self.link.network()
    }

    pub fn is_producer(&self) -> bool {
        self.kind == PortKind::Producer
    }

    pub fn world_tile(&self, placement: &Placement) -> GridPosition {
        placement.world_tile(self.offset)
    }

    pub fn world_direction(&self, placement: &Placement) -> Direction {
        placement.world_direction(self.direction)
    }

    /// What this port can emit this tick: its rate, limited by what is in
    /// the buffer and by the network's throughput ceiling. Zero when the
    /// port is not linked to a network.
    pub fn production(&self, max_throughput: Option<Fixed64>) -> Fixed64 {
        if !self.link.is_claimed() {
            return Fixed64::ZERO;
        }
        let amount = self.production_rate.min(self.buffer).max(Fixed64::ZERO);
        limit(amount, max_throughput)
    }

    /// What this port can absorb this tick: its rate, limited by buffer
    /// headroom and the network's throughput ceiling. Zero when unlinked.
    pub fn consumption(&self, max_throughput: Option<Fixed64>) -> Fixed64 {
        if !self.link.is_claimed() {
            return Fixed64::ZERO;
        }
        let headroom = (self.max_buffer - self.buffer).max(Fixed64::ZERO);
        let amount = self.consumption_rate.min(headroom).max(Fixed64::ZERO);
        limit(amount, max_throughput)
    }

    /// Emit `amount` into the network: removes it from the buffer.
    pub fn produce(&mut self, amount: Fixed64) {
        self.buffer = (self.buffer - amount).max(Fixed64::ZERO);
    }

    /// Receive `amount` from the network: adds it to the buffer.
    pub fn consume(&mut self, amount: Fixed64) {
        self.buffer = self.buffer.saturating_add(amount).min(self.max_buffer);
    }

    /// Host-side refill. Returns the part that did not fit.
    pub fn fill(&mut self, amount: Fixed64) -> Fixed64 {
        let headroom = (self.max_buffer - self.buffer).max(Fixed64::ZERO);
        let accepted = amount.max(Fixed64::ZERO).min(headroom);
        self.buffer += accepted;
        amount - accepted
    }

    /// Host-side withdrawal. Returns the amount actually taken.
    pub fn drain(&mut self, amount: Fixed64) -> Fixed64 {
        let taken = amount.max(Fixed64::ZERO).min(self.buffer);
        self.buffer -= taken;
        taken
    }
}

fn limit(amount: Fixed64, max_throughput: Option<Fixed64>) -> Fixed64 {
    match max_throughput {
        Some(ceiling) => amount.min(ceiling.max(Fixed64::ZERO)),
        None => amount,
    }
}

// ---------------------------------------------------------------------------
// Connectors
// ---------------------------------------------------------------------------

/// A passive transport segment (wire, pipe).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Connector {
    pub offset: GridPosition,
    /// Accepted local directions; `None` connects on all four sides.
    pub directions: Option<[Direction; 2]>,
    /// Storage this segment adds to its network.
    pub max_volume: Fixed64,
    pub max_throughput: Fixed64,
    pub tag: TypeTag,
    /// Shape derived from the neighbors, maintained by the engine.
    pub orientation: Orientation,
    #[serde(skip)]
    pub(crate) link: NetworkLink,
}

impl Connector {
    /// An omni-directional segment on the entity's origin tile.
    pub fn new(tag: TypeTag, max_volume: Fixed64, max_throughput: Fixed64) -> Self {
        Self {
            offset: GridPosition::ORIGIN,
            directions: None,
            max_volume,
            max_throughput,
            tag,
            orientation: Orientation::default(),
            link: NetworkLink::default(),
        }
    }

    /// Restrict the segment to two local directions.
    pub fn with_directions(mut self, a: Direction, b: Direction) -> Self {
        self.directions = Some([a, b]);
        self
    }

    pub fn network(&self) -> Option<NetworkId> {
        self.link.network()
    }

    pub fn world_tile(&self, placement: &Placement) -> GridPosition {
        placement.world_tile(self.offset)
    }

    /// Directions the segment connects toward, in world space.
    pub fn world_directions(&self, placement: &Placement) -> Vec<Direction> {
        match self.directions {
            Some(pair) => {
                let mut dirs: Vec<Direction> =
                    pair.iter().map(|d| placement.world_direction(*d)).collect();
                dirs.dedup();
                dirs
            }
            None => Direction::all().to_vec(),
        }
    }

    /// Whether the segment opens toward `world_dir`.
    pub fn accepts(&self, placement: &Placement, world_dir: Direction) -> bool {
        match self.directions {
            Some(pair) => pair
                .iter()
                .any(|d| placement.world_direction(*d) == world_dir),
            None => true,
        }
    }
}

// ---------------------------------------------------------------------------
// Tunnels
// ---------------------------------------------------------------------------

/// One end of a long-distance link. Opens toward `direction` like a
/// connector and pairs with the nearest same-tag slot facing back along
/// `tunnel_direction`, at most `max_length` tiles away.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TunnelSlot {
    pub offset: GridPosition,
    pub direction: Direction,
    pub tunnel_direction: Direction,
    pub max_length: u32,
    pub max_volume: Fixed64,
    pub max_throughput: Fixed64,
    pub tag: TypeTag,
    #[serde(skip)]
    pub(crate) link: NetworkLink,
}

impl TunnelSlot {
    /// A tunnel end opening toward `direction` and searching along the
    /// opposite side.
    pub fn new(tag: TypeTag, direction: Direction, max_length: u32) -> Self {
        Self {
            offset: GridPosition::ORIGIN,
            direction,
            tunnel_direction: direction.inverse(),
            max_length,
            max_volume: Fixed64::ZERO,
            max_throughput: Fixed64::ZERO,
            tag,
            link: NetworkLink::default(),
        }
    }

    pub fn with_capacity(mut self, max_volume: Fixed64, max_throughput: Fixed64) -> Self {
        self.max_volume = max_volume;
        self.max_throughput = max_throughput;
        self
    }

    pub fn with_tunnel_direction(mut self, dir: Direction) -> Self {
        self.tunnel_direction = dir;
        self
    }

    pub fn network(&self) -> Option<NetworkId> {
        self.link.network()
    }

    pub fn world_tile(&self, placement: &Placement) -> GridPosition {
        placement.world_tile(self.offset)
    }

    pub fn world_direction(&self, placement: &Placement) -> Direction {
        placement.world_direction(self.direction)
    }

    pub fn world_tunnel_direction(&self, placement: &Placement) -> Direction {
        placement.world_direction(self.tunnel_direction)
    }
}

// ---------------------------------------------------------------------------
// Entity bundle
// ---------------------------------------------------------------------------

/// Invalid content data found when registering an entity.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("{field} must not be negative, got {value}")]
    Negative { field: &'static str, value: Fixed64 },
    #[error("buffer {buffer} exceeds max buffer {max_buffer}")]
    BufferOverflow { buffer: Fixed64, max_buffer: Fixed64 },
    #[error("local offset ({x}, {y}) lies outside the {width}x{height} footprint")]
    OffsetOutsideFootprint {
        x: i32,
        y: i32,
        width: u32,
        height: u32,
    },
    #[error("entity carries no connector, pin or tunnel")]
    NoFlowComponents,
    #[error("tunnel max_length {max_length} exceeds {limit} tiles")]
    TunnelTooLong { max_length: u32, limit: u32 },
}

/// Every flow component an entity carries, plus where it sits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowEntity<R = ResourceId> {
    pub placement: Placement,
    pub connector: Option<Connector>,
    pub pins: Vec<Port<R>>,
    pub tunnels: Vec<TunnelSlot>,
}

impl<R: ResourceKind> FlowEntity<R> {
    pub fn new(placement: Placement) -> Self {
        Self {
            placement,
            connector: None,
            pins: Vec::new(),
            tunnels: Vec::new(),
        }
    }

    pub fn with_connector(mut self, connector: Connector) -> Self {
        self.connector = Some(connector);
        self
    }

    pub fn with_pin(mut self, port: Port<R>) -> Self {
        self.pins.push(port);
        self
    }

    pub fn with_tunnel(mut self, slot: TunnelSlot) -> Self {
        self.tunnels.push(slot);
        self
    }

    /// Check the content data for values the engine cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.connector.is_none() && self.pins.is_empty() && self.tunnels.is_empty() {
            return Err(ConfigError::NoFlowComponents);
        }
        let footprint = self.placement.footprint;
        let check_offset = |offset: GridPosition| {
            if footprint.contains_offset(offset) {
                Ok(())
            } else {
                Err(ConfigError::OffsetOutsideFootprint {
                    x: offset.x,
                    y: offset.y,
                    width: footprint.width,
                    height: footprint.height,
                })
            }
        };

        if let Some(c) = &self.connector {
            check_offset(c.offset)?;
            non_negative("connector max_volume", c.max_volume)?;
            non_negative("connector max_throughput", c.max_throughput)?;
        }
        for port in &self.pins {
            check_offset(port.offset)?;
            non_negative("port production_rate", port.production_rate)?;
            non_negative("port consumption_rate", port.consumption_rate)?;
            non_negative("port buffer", port.buffer)?;
            non_negative("port max_buffer", port.max_buffer)?;
            if port.buffer > port.max_buffer {
                return Err(ConfigError::BufferOverflow {
                    buffer: port.buffer,
                    max_buffer: port.max_buffer,
                });
            }
        }
        for slot in &self.tunnels {
            check_offset(slot.offset)?;
            non_negative("tunnel max_volume", slot.max_volume)?;
            non_negative("tunnel max_throughput", slot.max_throughput)?;
            if slot.max_length > MAX_TUNNEL_LENGTH {
                return Err(ConfigError::TunnelTooLong {
                    max_length: slot.max_length,
                    limit: MAX_TUNNEL_LENGTH,
                });
            }
        }
        Ok(())
    }

    /// Re-derive every pin's max buffer with the engine's multiplier.
    pub(crate) fn resolve_buffers(&mut self, multiplier: Fixed64) {
        for port in &mut self.pins {
            port.resolve_max_buffer(multiplier);
        }
    }

    /// Whether the entity takes part in transport (connector or tunnel).
    pub fn is_transport(&self) -> bool {
        self.connector.is_some() || !self.tunnels.is_empty()
    }

    /// Move every live link into its `previous` slot.
    pub(crate) fn detach_links(&mut self) {
        self.for_each_link(NetworkLink::detach);
    }

    pub(crate) fn clear_previous_links(&mut self) {
        self.for_each_link(NetworkLink::clear_previous);
    }

    pub(crate) fn reset_links(&mut self) {
        self.for_each_link(NetworkLink::reset);
    }

    fn for_each_link(&mut self, f: impl Fn(&mut NetworkLink)) {
        if let Some(c) = &mut self.connector {
            f(&mut c.link);
        }
        for port in &mut self.pins {
            f(&mut port.link);
        }
        for slot in &mut self.tunnels {
            f(&mut slot.link);
        }
    }
}

fn non_negative(field: &'static str, value: Fixed64) -> Result<(), ConfigError> {
    if value < Fixed64::ZERO {
        Err(ConfigError::Negative { field, value })
    } else {
        Ok(())
    }
}
