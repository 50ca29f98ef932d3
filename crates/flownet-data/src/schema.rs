//! Serde data file structs for flow entity catalogs.
//!
//! These structs define the on-disk format for resources and entity
//! prototypes. They are deserialized from RON, JSON, or TOML data files and
//! then resolved into core types by [`Catalog`](crate::catalog::Catalog).
//!
//! Directions, port kinds and tags are closed snake_case enums, so an
//! unrecognized value is a parse error rather than a runtime surprise.

use flownet_core::grid::Direction;
use flownet_core::port::PortKind;
use flownet_core::resource::TypeTag;
use serde::Deserialize;

// ===========================================================================
// Catalog file
// ===========================================================================

/// Top level of a catalog file.
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogData {
    /// Resource names; a resource's id is its index in this list.
    #[serde(default)]
    pub resources: Vec<String>,
    #[serde(default)]
    pub prototypes: Vec<PrototypeData>,
}

/// A flow entity prototype.
#[derive(Debug, Clone, Deserialize)]
pub struct PrototypeData {
    pub name: String,
    #[serde(default = "default_size")]
    pub width: u32,
    #[serde(default = "default_size")]
    pub height: u32,
    /// Tag for every component that does not name its own.
    #[serde(default)]
    pub tag: TagData,
    #[serde(default)]
    pub connector: Option<ConnectorData>,
    #[serde(default)]
    pub pins: Vec<PinData>,
    #[serde(default)]
    pub tunnels: Vec<TunnelData>,
}

fn default_size() -> u32 {
    1
}

// ===========================================================================
// Components
// ===========================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct ConnectorData {
    #[serde(default)]
    pub offset: (i32, i32),
    /// Accepted local directions; omitted means all four.
    #[serde(default)]
    pub directions: Option<(DirectionData, DirectionData)>,
    pub max_volume: f64,
    pub max_throughput: f64,
    #[serde(default)]
    pub tag: Option<TagData>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PinData {
    #[serde(default)]
    pub offset: (i32, i32),
    pub direction: DirectionData,
    pub kind: PortKindData,
    /// Production rate for producers, consumption rate for consumers.
    pub rate: f64,
    #[serde(default)]
    pub buffer: f64,
    #[serde(default)]
    pub max_buffer: Option<f64>,
    /// Resource filter by name.
    #[serde(default)]
    pub resource: Option<String>,
    #[serde(default)]
    pub tag: Option<TagData>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TunnelData {
    #[serde(default)]
    pub offset: (i32, i32),
    pub direction: DirectionData,
    /// Search axis; omitted means opposite the opening.
    #[serde(default)]
    pub tunnel_direction: Option<DirectionData>,
    pub max_length: u32,
    #[serde(default)]
    pub max_volume: f64,
    #[serde(default)]
    pub max_throughput: f64,
    #[serde(default)]
    pub tag: Option<TagData>,
}

// ===========================================================================
// Enums
// ===========================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DirectionData {
    North,
    East,
    South,
    West,
}

impl From<DirectionData> for Direction {
    fn from(d: DirectionData) -> Self {
        match d {
            DirectionData::North => Direction::North,
            DirectionData::East => Direction::East,
            DirectionData::South => Direction::South,
            DirectionData::West => Direction::West,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PortKindData {
    Producer,
    Consumer,
}

impl From<PortKindData> for PortKind {
    fn from(k: PortKindData) -> Self {
        match k {
            PortKindData::Producer => PortKind::Producer,
            PortKindData::Consumer => PortKind::Consumer,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TagData {
    #[default]
    Energy,
    Pipe,
    WaterPipe,
    Custom(u16),
}

impl From<TagData> for TypeTag {
    fn from(t: TagData) -> Self {
        match t {
            TagData::Energy => TypeTag::Energy,
            TagData::Pipe => TypeTag::Pipe,
            TagData::WaterPipe => TypeTag::WaterPipe,
            TagData::Custom(n) => TypeTag::Custom(n),
        }
    }
}
