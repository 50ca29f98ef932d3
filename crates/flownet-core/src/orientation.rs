//! Auto-shaping of transport segments from their four neighbors.

use crate::grid::{Direction, GridQuery, Rotation};
use crate::id::EntityId;
use crate::port::FlowEntity;
use crate::resource::ResourceKind;
use serde::{Deserialize, Serialize};
use slotmap::SecondaryMap;

/// How a segment renders and which legs it shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Shape {
    /// Zero or one connected side.
    #[default]
    Stub,
    /// Two opposite sides.
    Forward,
    /// Two adjacent sides.
    Turn,
    /// Three sides.
    Split,
    /// All four sides.
    Cross,
}

/// A shape plus the rotation that lines its legs up with the neighbors.
///
/// Reference poses at [`Rotation::None`]: Stub points north, Forward runs
/// north-south, Turn joins north and east, Split is open on every side but
/// south.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Orientation {
    pub shape: Shape,
    pub rotation: Rotation,
}

impl Orientation {
    pub fn new(shape: Shape, rotation: Rotation) -> Self {
        Self { shape, rotation }
    }

    /// Derive the orientation from a connection mask (see [`Direction::bit`]).
    pub fn from_mask(mask: u8) -> Self {
        let mask = mask & 0b1111;
        let connected: Vec<Direction> = Direction::all()
            .into_iter()
            .filter(|d| mask & d.bit() != 0)
            .collect();

        match connected.as_slice() {
            [] => Self::default(),
            [single] => Self::new(Shape::Stub, rotation_from_north(*single)),
            [a, b] if a.inverse() == *b => {
                // North-south or east-west.
                let rotation = if *a == Direction::North {
                    Rotation::None
                } else {
                    Rotation::Cw90
                };
                Self::new(Shape::Forward, rotation)
            }
            [a, b] => {
                // Clockwise order puts the first leg of the turn in `a`,
                // except for the west-north pair which wraps around.
                let first = if *a == Direction::North && *b == Direction::West {
                    Direction::West
                } else {
                    *a
                };
                Self::new(Shape::Turn, rotation_from_north(first))
            }
            [_, _, _] => {
                let missing = Direction::all()
                    .into_iter()
                    .find(|d| mask & d.bit() == 0)
                    .unwrap_or(Direction::South);
                Self::new(Shape::Split, rotation_from_north(missing.inverse()))
            }
            _ => Self::new(Shape::Cross, Rotation::None),
        }
    }

    /// The world directions this orientation shows legs toward.
    pub fn legs(&self) -> Vec<Direction> {
        let base: &[Direction] = match self.shape {
            Shape::Stub => &[Direction::North],
            Shape::Forward => &[Direction::North, Direction::South],
            Shape::Turn => &[Direction::North, Direction::East],
            Shape::Split => &[Direction::North, Direction::East, Direction::West],
            Shape::Cross => &[
                Direction::North,
                Direction::East,
                Direction::South,
                Direction::West,
            ],
        };
        base.iter().map(|d| d.rotated(self.rotation)).collect()
    }
}

/// Which sides of `id`'s connector link up with a neighbor, as a
/// [`Direction::bit`] mask. `None` when the entity has no connector.
///
/// A side counts when the connector opens toward it and the neighbor tile
/// holds a same-tag connector opening back, or a same-tag pin or tunnel
/// slot facing back.
pub fn connection_mask<G, R>(
    grid: &G,
    entities: &SecondaryMap<EntityId, FlowEntity<R>>,
    id: EntityId,
) -> Option<u8>
where
    G: GridQuery + ?Sized,
    R: ResourceKind,
{
    let entity = entities.get(id)?;
    let connector = entity.connector.as_ref()?;
    let placement = entity.placement;
    let origin = connector.world_tile(&placement);

    let mut mask = 0;
    for dir in Direction::all() {
        if !connector.accepts(&placement, dir) {
            continue;
        }
        let tile = origin.step(dir);
        let facing = dir.inverse();
        let linked = grid.entities_at(tile, None).into_iter().any(|other_id| {
            if other_id == id {
                return false;
            }
            let Some(other) = entities.get(other_id) else {
                return false;
            };
            let p = other.placement;
            if let Some(c) = &other.connector {
                return c.tag == connector.tag && c.world_tile(&p) == tile && c.accepts(&p, facing);
            }
            let pin = other.pins.iter().any(|port| {
                port.tag == connector.tag
                    && port.world_tile(&p) == tile
                    && port.world_direction(&p) == facing
            });
            pin || other.tunnels.iter().any(|slot| {
                slot.tag == connector.tag
                    && slot.world_tile(&p) == tile
                    && slot.world_direction(&p) == facing
            })
        });
        if linked {
            mask |= dir.bit();
        }
    }
    Some(mask)
}

fn rotation_from_north(dir: Direction) -> Rotation {
    match dir {
        Direction::North => Rotation::None,
        Direction::East => Rotation::Cw90,
        Direction::South => Rotation::Cw180,
        Direction::West => Rotation::Cw270,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mask(dirs: &[Direction]) -> u8 {
        dirs.iter().fold(0, |m, d| m | d.bit())
    }

    fn sorted(mut dirs: Vec<Direction>) -> Vec<Direction> {
        dirs.sort();
        dirs
    }

    #[test]
    fn isolated_segment_is_a_stub() {
        assert_eq!(Orientation::from_mask(0), Orientation::default());
    }

    #[test]
    fn shapes_by_leg_count() {
        use Direction::*;
        assert_eq!(Orientation::from_mask(mask(&[East])).shape, Shape::Stub);
        assert_eq!(Orientation::from_mask(mask(&[East, West])).shape, Shape::Forward);
        assert_eq!(Orientation::from_mask(mask(&[South, West])).shape, Shape::Turn);
        assert_eq!(Orientation::from_mask(mask(&[North, South, West])).shape, Shape::Split);
        assert_eq!(Orientation::from_mask(0b1111).shape, Shape::Cross);
    }

    #[test]
    fn legs_reproduce_the_mask() {
        // Every non-stub mask must round-trip through its legs.
        for m in 0u8..16 {
            let orientation = Orientation::from_mask(m);
            if m.count_ones() < 2 {
                continue;
            }
            let legs = orientation.legs();
            assert_eq!(mask(&legs), m, "mask {m:04b} gave {orientation:?}");
        }
    }

    #[test]
    fn single_leg_stub_points_at_neighbor() {
        let o = Orientation::from_mask(Direction::South.bit());
        assert_eq!(o.legs(), vec![Direction::South]);
    }

    #[test]
    fn mask_counts_only_sides_that_link_back() {
        use crate::fixed::Fixed64;
        use crate::grid::{GridPosition, Placement, TileGrid};
        use crate::port::{Connector, Port};
        use crate::resource::TypeTag;
        use slotmap::SlotMap;

        let mut keys = SlotMap::<EntityId, ()>::with_key();
        let mut grid = TileGrid::new();
        let mut entities: SecondaryMap<EntityId, FlowEntity> = SecondaryMap::new();
        let mut add = |entity: FlowEntity| {
            let id = keys.insert(());
            grid.place(id, entity.placement).unwrap();
            entities.insert(id, entity);
            id
        };
        let pipe = |x, y| {
            FlowEntity::new(Placement::at(GridPosition::new(x, y)))
                .with_connector(Connector::new(TypeTag::Pipe, Fixed64::ONE, Fixed64::ONE))
        };

        let center = add(pipe(0, 0));
        add(pipe(0, -1));
        // Wrong tag to the east.
        add(FlowEntity::new(Placement::at(GridPosition::new(1, 0)))
            .with_connector(Connector::new(TypeTag::Energy, Fixed64::ONE, Fixed64::ONE)));
        // Pin to the south facing back north.
        add(FlowEntity::new(Placement::at(GridPosition::new(0, 1))).with_pin(
            Port::consumer(GridPosition::ORIGIN, Direction::North, Fixed64::ONE)
                .with_tag(TypeTag::Pipe),
        ));
        // Pin to the west facing away.
        add(FlowEntity::new(Placement::at(GridPosition::new(-1, 0))).with_pin(
            Port::consumer(GridPosition::ORIGIN, Direction::West, Fixed64::ONE)
                .with_tag(TypeTag::Pipe),
        ));

        let mask = connection_mask(&grid, &entities, center).unwrap();
        assert_eq!(mask, Direction::North.bit() | Direction::South.bit());
        assert_eq!(Orientation::from_mask(mask).shape, Shape::Forward);
    }

    #[test]
    fn west_north_turn_wraps() {
        use Direction::*;
        let o = Orientation::from_mask(mask(&[West, North]));
        assert_eq!(o.rotation, Rotation::Cw270);
        assert_eq!(sorted(o.legs()), sorted(vec![West, North]));
    }
}
