//! Grid geometry and the grid query seam.
//!
//! The engine never owns the map. Hosts expose tile occupancy through
//! [`GridQuery`]; [`TileGrid`] is a ready-made in-memory implementation
//! for hosts without their own spatial index.

use crate::id::EntityId;
use serde::{Deserialize, Serialize};
use slotmap::SecondaryMap;
use std::collections::{BTreeMap, BTreeSet};

// ---------------------------------------------------------------------------
// Positions and directions
// ---------------------------------------------------------------------------

/// A tile on the 2D grid. `y` grows southward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct GridPosition {
    pub x: i32,
    pub y: i32,
}

impl GridPosition {
    pub const ORIGIN: GridPosition = GridPosition { x: 0, y: 0 };

    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// The adjacent tile in `dir`.
    pub fn step(self, dir: Direction) -> Self {
        self.step_by(dir, 1)
    }

    /// The tile `distance` steps away along `dir`.
    pub fn step_by(self, dir: Direction, distance: i32) -> Self {
        let (dx, dy) = dir.offset();
        Self::new(self.x + dx * distance, self.y + dy * distance)
    }

    /// Component-wise sum, for applying a local offset to an origin.
    pub fn offset_by(self, other: GridPosition) -> Self {
        Self::new(self.x + other.x, self.y + other.y)
    }

    /// Manhattan distance to another position.
    pub fn manhattan_distance(&self, other: &GridPosition) -> u32 {
        (self.x - other.x).unsigned_abs() + (self.y - other.y).unsigned_abs()
    }
}

/// Cardinal directions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Direction {
    North,
    East,
    South,
    West,
}

impl Direction {
    /// All four cardinal directions, clockwise from north.
    pub fn all() -> [Direction; 4] {
        [
            Direction::North,
            Direction::East,
            Direction::South,
            Direction::West,
        ]
    }

    /// Tile offset for one step in this direction.
    pub fn offset(&self) -> (i32, i32) {
        match self {
            Direction::North => (0, -1),
            Direction::East => (1, 0),
            Direction::South => (0, 1),
            Direction::West => (-1, 0),
        }
    }

    /// The opposite direction.
    pub fn inverse(self) -> Self {
        match self {
            Direction::North => Direction::South,
            Direction::East => Direction::West,
            Direction::South => Direction::North,
            Direction::West => Direction::East,
        }
    }

    /// Turn 90 degrees clockwise.
    pub fn turn_cw(self) -> Self {
        match self {
            Direction::North => Direction::East,
            Direction::East => Direction::South,
            Direction::South => Direction::West,
            Direction::West => Direction::North,
        }
    }

    /// Apply an entity rotation to a local direction.
    pub fn rotated(self, rotation: Rotation) -> Self {
        (0..rotation.quarter_turns()).fold(self, |dir, _| dir.turn_cw())
    }

    /// Bit used by four-way connection masks (N=1, E=2, S=4, W=8).
    pub fn bit(self) -> u8 {
        match self {
            Direction::North => 1,
            Direction::East => 2,
            Direction::South => 4,
            Direction::West => 8,
        }
    }
}

/// Rotation of an entity relative to its prototype.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Rotation {
    #[default]
    None,
    Cw90,
    Cw180,
    Cw270,
}

impl Rotation {
    /// All four rotation values.
    pub fn all() -> [Rotation; 4] {
        [
            Rotation::None,
            Rotation::Cw90,
            Rotation::Cw180,
            Rotation::Cw270,
        ]
    }

    /// Number of clockwise quarter turns.
    pub fn quarter_turns(self) -> u8 {
        match self {
            Rotation::None => 0,
            Rotation::Cw90 => 1,
            Rotation::Cw180 => 2,
            Rotation::Cw270 => 3,
        }
    }

    /// Rotate 90 degrees clockwise.
    pub fn rotate_cw(self) -> Self {
        match self {
            Rotation::None => Rotation::Cw90,
            Rotation::Cw90 => Rotation::Cw180,
            Rotation::Cw180 => Rotation::Cw270,
            Rotation::Cw270 => Rotation::None,
        }
    }
}

/// Size of an entity in tiles, before rotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Footprint {
    pub width: u32,
    pub height: u32,
}

impl Default for Footprint {
    fn default() -> Self {
        Self::single()
    }
}

impl Footprint {
    /// A 1x1 entity.
    pub fn single() -> Self {
        Self {
            width: 1,
            height: 1,
        }
    }

    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// For 90/270 degrees, width and height are swapped.
    pub fn rotated(&self, rotation: Rotation) -> Self {
        match rotation {
            Rotation::None | Rotation::Cw180 => *self,
            Rotation::Cw90 | Rotation::Cw270 => Self {
                width: self.height,
                height: self.width,
            },
        }
    }

    /// Whether a local offset lies inside this (unrotated) footprint.
    pub fn contains_offset(&self, offset: GridPosition) -> bool {
        offset.x >= 0
            && offset.y >= 0
            && (offset.x as u32) < self.width
            && (offset.y as u32) < self.height
    }

    /// Iterate over all tiles covered at `origin` (top-left corner).
    pub fn tiles(self, origin: GridPosition) -> impl Iterator<Item = GridPosition> {
        TileRect::from_footprint(origin, self).tiles()
    }
}

/// Map layer. Entities on different layers may share a tile; neighbor
/// searches look through every layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Layer(pub u8);

impl Layer {
    pub const MIN: Layer = Layer(u8::MIN);
    pub const MAX: Layer = Layer(u8::MAX);
}

// ---------------------------------------------------------------------------
// Rectangles
// ---------------------------------------------------------------------------

/// An inclusive axis-aligned tile rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TileRect {
    pub min: GridPosition,
    pub max: GridPosition,
}

impl TileRect {
    pub fn new(min: GridPosition, max: GridPosition) -> Self {
        Self {
            min: GridPosition::new(min.x.min(max.x), min.y.min(max.y)),
            max: GridPosition::new(min.x.max(max.x), min.y.max(max.y)),
        }
    }

    /// The tiles covered by a footprint placed at `origin`.
    pub fn from_footprint(origin: GridPosition, footprint: Footprint) -> Self {
        let w = footprint.width.max(1) as i32;
        let h = footprint.height.max(1) as i32;
        Self {
            min: origin,
            max: GridPosition::new(origin.x + w - 1, origin.y + h - 1),
        }
    }

    /// Grow by `margin` tiles on every side.
    pub fn expand(&self, margin: i32) -> Self {
        Self {
            min: GridPosition::new(self.min.x - margin, self.min.y - margin),
            max: GridPosition::new(self.max.x + margin, self.max.y + margin),
        }
    }

    pub fn contains(&self, pos: GridPosition) -> bool {
        pos.x >= self.min.x && pos.x <= self.max.x && pos.y >= self.min.y && pos.y <= self.max.y
    }

    /// Row-major iteration over every tile.
    pub fn tiles(self) -> impl Iterator<Item = GridPosition> {
        let (min, max) = (self.min, self.max);
        (min.y..=max.y).flat_map(move |y| (min.x..=max.x).map(move |x| GridPosition::new(x, y)))
    }

    pub fn area(&self) -> u64 {
        let w = (self.max.x - self.min.x) as u64 + 1;
        let h = (self.max.y - self.min.y) as u64 + 1;
        w * h
    }
}

// ---------------------------------------------------------------------------
// Placement
// ---------------------------------------------------------------------------

/// Where and how an entity sits on the map. Converts entity-local offsets
/// and directions to world tiles and world directions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Placement {
    /// Top-left tile of the rotated footprint.
    pub origin: GridPosition,
    pub rotation: Rotation,
    /// Unrotated footprint.
    pub footprint: Footprint,
    pub layer: Layer,
}

impl Placement {
    /// A 1x1 unrotated placement on the default layer.
    pub fn at(origin: GridPosition) -> Self {
        Self {
            origin,
            ..Self::default()
        }
    }

    pub fn with_rotation(mut self, rotation: Rotation) -> Self {
        self.rotation = rotation;
        self
    }

    pub fn with_footprint(mut self, footprint: Footprint) -> Self {
        self.footprint = footprint;
        self
    }

    pub fn with_layer(mut self, layer: Layer) -> Self {
        self.layer = layer;
        self
    }

    /// Footprint after rotation.
    pub fn world_footprint(&self) -> Footprint {
        self.footprint.rotated(self.rotation)
    }

    /// Every tile the entity covers.
    pub fn bounds(&self) -> TileRect {
        TileRect::from_footprint(self.origin, self.world_footprint())
    }

    /// World tile of a local offset, rotated inside the footprint.
    pub fn world_tile(&self, offset: GridPosition) -> GridPosition {
        let w = self.footprint.width.max(1) as i32;
        let h = self.footprint.height.max(1) as i32;
        let (x, y) = (offset.x, offset.y);
        let rotated = match self.rotation {
            Rotation::None => GridPosition::new(x, y),
            Rotation::Cw90 => GridPosition::new(h - 1 - y, x),
            Rotation::Cw180 => GridPosition::new(w - 1 - x, h - 1 - y),
            Rotation::Cw270 => GridPosition::new(y, w - 1 - x),
        };
        self.origin.offset_by(rotated)
    }

    /// World direction of a local direction.
    pub fn world_direction(&self, dir: Direction) -> Direction {
        dir.rotated(self.rotation)
    }
}

// ---------------------------------------------------------------------------
// Grid query seam
// ---------------------------------------------------------------------------

/// Tile occupancy lookup provided by the host.
pub trait GridQuery {
    /// All entities occupying `pos`. `None` means every layer.
    fn entities_at(&self, pos: GridPosition, layer: Option<Layer>) -> Vec<EntityId>;

    /// Unique entities with at least one tile inside `rect`, any layer.
    fn entities_in_rect(&self, rect: TileRect) -> Vec<EntityId> {
        let mut seen = BTreeSet::new();
        let mut result = Vec::new();
        for tile in rect.tiles() {
            for entity in self.entities_at(tile, None) {
                if seen.insert(entity) {
                    result.push(entity);
                }
            }
        }
        result
    }
}

impl<T: GridQuery + ?Sized> GridQuery for &T {
    fn entities_at(&self, pos: GridPosition, layer: Option<Layer>) -> Vec<EntityId> {
        (**self).entities_at(pos, layer)
    }
}

/// Errors from [`TileGrid`] placement.
#[derive(Debug, thiserror::Error)]
pub enum GridError {
    #[error("tile {0:?} is occupied on this layer")]
    Occupied(GridPosition),
    #[error("entity is not placed on the grid")]
    NotPlaced,
    #[error("entity is already placed on the grid")]
    AlreadyPlaced,
}

// ---------------------------------------------------------------------------
// TileGrid
// ---------------------------------------------------------------------------

/// An in-memory layered occupancy map.
///
/// One entity per tile per layer. Keyed by `(position, layer)` so a point
/// query over all layers is a single ordered range scan.
#[derive(Debug, Default)]
pub struct TileGrid {
    tiles: BTreeMap<(GridPosition, Layer), EntityId>,
    placements: SecondaryMap<EntityId, Placement>,
}

impl TileGrid {
    pub fn new() -> Self {
        Self::default()
    }

    /// Occupy every tile of `placement` on its layer.
    pub fn place(&mut self, entity: EntityId, placement: Placement) -> Result<(), GridError> {
        if self.placements.contains_key(entity) {
            return Err(GridError::AlreadyPlaced);
        }
        let bounds = placement.bounds();
        if let Some(tile) = bounds
            .tiles()
            .find(|tile| self.tiles.contains_key(&(*tile, placement.layer)))
        {
            return Err(GridError::Occupied(tile));
        }
        for tile in bounds.tiles() {
            self.tiles.insert((tile, placement.layer), entity);
        }
        self.placements.insert(entity, placement);
        Ok(())
    }

    /// Free the entity's tiles and return where it was.
    pub fn remove(&mut self, entity: EntityId) -> Result<Placement, GridError> {
        let placement = self.placements.remove(entity).ok_or(GridError::NotPlaced)?;
        for tile in placement.bounds().tiles() {
            self.tiles.remove(&(tile, placement.layer));
        }
        Ok(placement)
    }

    /// Whether `placement` fits without overlapping its layer.
    pub fn can_place(&self, placement: &Placement) -> bool {
        placement
            .bounds()
            .tiles()
            .all(|tile| !self.tiles.contains_key(&(tile, placement.layer)))
    }

    pub fn placement(&self, entity: EntityId) -> Option<Placement> {
        self.placements.get(entity).copied()
    }

    pub fn entity_at(&self, pos: GridPosition, layer: Layer) -> Option<EntityId> {
        self.tiles.get(&(pos, layer)).copied()
    }

    pub fn is_occupied(&self, pos: GridPosition) -> bool {
        self.tiles.range((pos, Layer::MIN)..=(pos, Layer::MAX)).next().is_some()
    }

    /// Number of placed entities.
    pub fn entity_count(&self) -> usize {
        self.placements.len()
    }

    /// Number of occupied (tile, layer) cells.
    pub fn tile_count(&self) -> usize {
        self.tiles.len()
    }
}

impl GridQuery for TileGrid {
    fn entities_at(&self, pos: GridPosition, layer: Option<Layer>) -> Vec<EntityId> {
        match layer {
            Some(layer) => self.entity_at(pos, layer).into_iter().collect(),
            None => self
                .tiles
                .range((pos, Layer::MIN)..=(pos, Layer::MAX))
                .map(|(_, &entity)| entity)
                .collect(),
        }
    }
}
