//! Resolution of catalog data into core flow types.

use crate::loader::DataLoadError;
use crate::schema::{CatalogData, ConnectorData, PinData, PrototypeData, TunnelData};
use flownet_core::fixed::Fixed64;
use flownet_core::grid::{Footprint, GridPosition, Layer, Placement, Rotation};
use flownet_core::id::ResourceId;
use flownet_core::port::{Connector, FlowEntity, Port, PortKind, TunnelSlot};
use flownet_core::resource::TypeTag;
use std::collections::BTreeMap;
use std::path::Path;

/// Resolved resources and entity prototypes.
///
/// Prototypes are stored as entities placed at the origin with no rotation;
/// [`instantiate`](Catalog::instantiate) places a copy.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    resource_names: Vec<String>,
    resources: BTreeMap<String, ResourceId>,
    prototypes: BTreeMap<String, FlowEntity<ResourceId>>,
}

impl Catalog {
    /// Resolve parsed catalog data. `file` names the source in errors.
    pub fn from_data(data: CatalogData, file: &Path) -> Result<Self, DataLoadError> {
        let mut catalog = Catalog::default();

        for name in data.resources {
            if catalog.resources.contains_key(&name) {
                return Err(DataLoadError::DuplicateName {
                    file: file.to_path_buf(),
                    name,
                });
            }
            let id = ResourceId(catalog.resource_names.len() as u32);
            catalog.resources.insert(name.clone(), id);
            catalog.resource_names.push(name);
        }

        for proto in data.prototypes {
            if catalog.prototypes.contains_key(&proto.name) {
                return Err(DataLoadError::DuplicateName {
                    file: file.to_path_buf(),
                    name: proto.name,
                });
            }
            let entity = catalog.resolve_prototype(&proto, file)?;
            entity
                .validate()
                .map_err(|source| DataLoadError::InvalidConfig {
                    prototype: proto.name.clone(),
                    source,
                })?;
            catalog.prototypes.insert(proto.name, entity);
        }

        Ok(catalog)
    }

    pub fn resource(&self, name: &str) -> Option<ResourceId> {
        self.resources.get(name).copied()
    }

    pub fn resource_name(&self, id: ResourceId) -> Option<&str> {
        self.resource_names.get(id.0 as usize).map(String::as_str)
    }

    pub fn resource_count(&self) -> usize {
        self.resource_names.len()
    }

    /// A prototype as stored: placed at the origin, unrotated.
    pub fn prototype(&self, name: &str) -> Option<&FlowEntity<ResourceId>> {
        self.prototypes.get(name)
    }

    pub fn prototype_names(&self) -> impl Iterator<Item = &str> {
        self.prototypes.keys().map(String::as_str)
    }

    pub fn prototype_count(&self) -> usize {
        self.prototypes.len()
    }

    /// A validated copy of prototype `name` placed on the map.
    pub fn instantiate(
        &self,
        name: &str,
        origin: GridPosition,
        rotation: Rotation,
        layer: Layer,
    ) -> Result<FlowEntity<ResourceId>, DataLoadError> {
        let proto = self
            .prototypes
            .get(name)
            .ok_or_else(|| DataLoadError::UnknownPrototype {
                name: name.to_string(),
            })?;
        let mut entity = proto.clone();
        entity.placement = Placement::at(origin)
            .with_footprint(proto.placement.footprint)
            .with_rotation(rotation)
            .with_layer(layer);
        entity
            .validate()
            .map_err(|source| DataLoadError::InvalidConfig {
                prototype: name.to_string(),
                source,
            })?;
        Ok(entity)
    }

    // -----------------------------------------------------------------------
    // Resolution
    // -----------------------------------------------------------------------

    fn resolve_prototype(
        &self,
        proto: &PrototypeData,
        file: &Path,
    ) -> Result<FlowEntity<ResourceId>, DataLoadError> {
        let footprint = Footprint::new(proto.width, proto.height);
        let mut entity = FlowEntity::new(Placement::at(GridPosition::ORIGIN).with_footprint(footprint));
        let default_tag = TypeTag::from(proto.tag);

        if let Some(c) = &proto.connector {
            entity.connector = Some(resolve_connector(c, proto, default_tag)?);
        }
        for pin in &proto.pins {
            let port = self.resolve_pin(pin, proto, default_tag, file)?;
            entity.pins.push(port);
        }
        for tunnel in &proto.tunnels {
            entity.tunnels.push(resolve_tunnel(tunnel, proto, default_tag)?);
        }
        Ok(entity)
    }

    fn resolve_pin(
        &self,
        pin: &PinData,
        proto: &PrototypeData,
        default_tag: TypeTag,
        file: &Path,
    ) -> Result<Port<ResourceId>, DataLoadError> {
        let offset = GridPosition::new(pin.offset.0, pin.offset.1);
        let rate = to_fixed(pin.rate, "rate", proto)?;
        let mut port = match PortKind::from(pin.kind) {
            PortKind::Producer => Port::producer(offset, pin.direction.into(), rate),
            PortKind::Consumer => Port::consumer(offset, pin.direction.into(), rate),
        };
        port = port.with_tag(pin.tag.map(TypeTag::from).unwrap_or(default_tag));
        if let Some(max) = pin.max_buffer {
            port = port.with_max_buffer(to_fixed(max, "max_buffer", proto)?);
        }
        port = port.with_buffer(to_fixed(pin.buffer, "buffer", proto)?);
        if let Some(name) = &pin.resource {
            let id = self
                .resource(name)
                .ok_or_else(|| DataLoadError::UnresolvedRef {
                    file: file.to_path_buf(),
                    name: name.clone(),
                    expected_kind: "resource",
                })?;
            port = port.with_resource(id);
        }
        Ok(port)
    }
}

fn resolve_connector(
    c: &ConnectorData,
    proto: &PrototypeData,
    default_tag: TypeTag,
) -> Result<Connector, DataLoadError> {
    let mut connector = Connector::new(
        c.tag.map(TypeTag::from).unwrap_or(default_tag),
        to_fixed(c.max_volume, "max_volume", proto)?,
        to_fixed(c.max_throughput, "max_throughput", proto)?,
    );
    connector.offset = GridPosition::new(c.offset.0, c.offset.1);
    if let Some((a, b)) = c.directions {
        connector = connector.with_directions(a.into(), b.into());
    }
    Ok(connector)
}

fn resolve_tunnel(
    t: &TunnelData,
    proto: &PrototypeData,
    default_tag: TypeTag,
) -> Result<TunnelSlot, DataLoadError> {
    let mut slot = TunnelSlot::new(
        t.tag.map(TypeTag::from).unwrap_or(default_tag),
        t.direction.into(),
        t.max_length,
    )
    .with_capacity(
        to_fixed(t.max_volume, "max_volume", proto)?,
        to_fixed(t.max_throughput, "max_throughput", proto)?,
    );
    slot.offset = GridPosition::new(t.offset.0, t.offset.1);
    if let Some(dir) = t.tunnel_direction {
        slot = slot.with_tunnel_direction(dir.into());
    }
    Ok(slot)
}

fn to_fixed(value: f64, field: &'static str, proto: &PrototypeData) -> Result<Fixed64, DataLoadError> {
    Fixed64::checked_from_num(value).ok_or_else(|| DataLoadError::InvalidNumber {
        prototype: proto.name.clone(),
        field,
        value,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::{parse_catalog, Format};
    use flownet_core::grid::Direction;
    use flownet_core::port::ConfigError;

    fn fixed(v: f64) -> Fixed64 {
        Fixed64::from_num(v)
    }

    const CATALOG: &str = r#"(
        resources: ["water", "steam"],
        prototypes: [
            (
                name: "pipe",
                tag: pipe,
                connector: Some((max_volume: 100.0, max_throughput: 10.0)),
            ),
            (
                name: "boiler",
                width: 2,
                tag: pipe,
                pins: [
                    (offset: (0, 0), direction: west, kind: consumer, rate: 4.0, resource: Some("water")),
                    (offset: (1, 0), direction: east, kind: producer, rate: 3.0, resource: Some("steam")),
                ],
            ),
            (
                name: "underground",
                tag: pipe,
                tunnels: [(direction: west, max_length: 10, max_volume: 50.0, max_throughput: 10.0)],
            ),
            (
                name: "pole",
                connector: Some((max_volume: 0.0, max_throughput: 30.0, directions: Some((north, south)))),
            ),
        ],
    )"#;

    fn catalog() -> Catalog {
        parse_catalog(CATALOG, Format::Ron).unwrap()
    }

    #[test]
    fn resources_get_sequential_ids() {
        let catalog = catalog();
        assert_eq!(catalog.resource("water"), Some(ResourceId(0)));
        assert_eq!(catalog.resource("steam"), Some(ResourceId(1)));
        assert_eq!(catalog.resource_name(ResourceId(1)), Some("steam"));
        assert_eq!(catalog.resource("lava"), None);
    }

    #[test]
    fn prototypes_resolve_components() {
        let catalog = catalog();
        assert_eq!(
            catalog.prototype_names().collect::<Vec<_>>(),
            vec!["boiler", "pipe", "pole", "underground"]
        );

        let boiler = catalog.prototype("boiler").unwrap();
        assert_eq!(boiler.placement.footprint, Footprint::new(2, 1));
        assert_eq!(boiler.pins[0].kind, PortKind::Consumer);
        assert_eq!(boiler.pins[0].tag, TypeTag::Pipe);
        assert_eq!(boiler.pins[1].resource, Some(ResourceId(1)));
        assert_eq!(boiler.pins[1].production_rate, fixed(3.0));

        let pole = catalog.prototype("pole").unwrap();
        let connector = pole.connector.as_ref().unwrap();
        assert_eq!(connector.tag, TypeTag::Energy);
        assert_eq!(connector.directions, Some([Direction::North, Direction::South]));

        let tunnel = &catalog.prototype("underground").unwrap().tunnels[0];
        assert_eq!(tunnel.tunnel_direction, Direction::East);
        assert_eq!(tunnel.max_volume, fixed(50.0));
    }

    #[test]
    fn instantiate_places_a_copy() {
        let catalog = catalog();
        let boiler = catalog
            .instantiate("boiler", GridPosition::new(4, 7), Rotation::Cw180, Layer(0))
            .unwrap();
        assert_eq!(boiler.placement.origin, GridPosition::new(4, 7));
        assert_eq!(boiler.placement.rotation, Rotation::Cw180);
        // Rotated 180: the west input now faces east from the far tile.
        assert_eq!(
            boiler.pins[0].world_direction(&boiler.placement),
            Direction::East
        );
        assert_eq!(
            boiler.pins[0].world_tile(&boiler.placement),
            GridPosition::new(5, 7)
        );
        assert_eq!(
            catalog.prototype("boiler").unwrap().placement.origin,
            GridPosition::ORIGIN
        );
    }

    #[test]
    fn instantiate_unknown_prototype() {
        let result = catalog().instantiate("reactor", GridPosition::ORIGIN, Rotation::None, Layer(0));
        assert!(matches!(
            result,
            Err(DataLoadError::UnknownPrototype { ref name }) if name == "reactor"
        ));
    }

    #[test]
    fn unresolved_resource_is_rejected() {
        let result = parse_catalog(
            r#"(prototypes: [(name: "m", pins: [(direction: east, kind: producer, rate: 1.0, resource: Some("lava"))])])"#,
            Format::Ron,
        );
        assert!(matches!(
            result,
            Err(DataLoadError::UnresolvedRef { expected_kind: "resource", .. })
        ));
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let dup_resource = parse_catalog(r#"(resources: ["water", "water"])"#, Format::Ron);
        assert!(matches!(dup_resource, Err(DataLoadError::DuplicateName { .. })));

        let dup_proto = parse_catalog(
            r#"(prototypes: [
                (name: "p", connector: Some((max_volume: 1.0, max_throughput: 1.0))),
                (name: "p", connector: Some((max_volume: 1.0, max_throughput: 1.0))),
            ])"#,
            Format::Ron,
        );
        assert!(matches!(dup_proto, Err(DataLoadError::DuplicateName { .. })));
    }

    #[test]
    fn invalid_content_is_rejected_at_load() {
        let negative = parse_catalog(
            r#"(prototypes: [(name: "p", connector: Some((max_volume: -1.0, max_throughput: 1.0)))])"#,
            Format::Ron,
        );
        assert!(matches!(
            negative,
            Err(DataLoadError::InvalidConfig {
                source: ConfigError::Negative { .. },
                ..
            })
        ));

        let empty = parse_catalog(r#"(prototypes: [(name: "nothing")])"#, Format::Ron);
        assert!(matches!(
            empty,
            Err(DataLoadError::InvalidConfig {
                source: ConfigError::NoFlowComponents,
                ..
            })
        ));

        let outside = parse_catalog(
            r#"(prototypes: [(name: "m", pins: [(offset: (3, 0), direction: east, kind: producer, rate: 1.0)])])"#,
            Format::Ron,
        );
        assert!(matches!(
            outside,
            Err(DataLoadError::InvalidConfig {
                source: ConfigError::OffsetOutsideFootprint { .. },
                ..
            })
        ));
    }

    #[test]
    fn out_of_range_numbers_are_rejected() {
        let huge = parse_catalog(
            r#"{"prototypes": [{"name": "p", "connector": {"max_volume": 1e12, "max_throughput": 1.0}}]}"#,
            Format::Json,
        );
        assert!(matches!(
            huge,
            Err(DataLoadError::InvalidNumber { field: "max_volume", .. })
        ));
    }
}
