//! Property-based tests for network discovery and balancing.
//!
//! Uses proptest to generate random tile layouts of pipes, wires, pins and
//! tunnels, runs a few ticks with random refills, then verifies structural
//! invariants hold.

use flownet_core::fixed::Fixed64;
use flownet_core::grid::Direction;
use flownet_core::id::{EntityId, LinkRef, NetworkId};
use flownet_core::network::Network;
use flownet_core::resource::TypeTag;
use flownet_core::test_utils::*;
use proptest::prelude::*;
use std::collections::BTreeSet;

// ===========================================================================
// Generators
// ===========================================================================

const SIDE: i32 = 8;

/// One cell of the board: (kind, facing, magnitude).
type Cell = (u8, u8, u32);

fn arb_board() -> impl Strategy<Value = Vec<Cell>> {
    proptest::collection::vec((0..8u8, 0..4u8, 1..20u32), (SIDE * SIDE) as usize)
}

fn build(board: &[Cell]) -> (TestWorld, Vec<(EntityId, bool)>) {
    let mut world = TestWorld::new();
    let mut pins = Vec::new();

    for (i, &(kind, facing, magnitude)) in board.iter().enumerate() {
        let x = i as i32 % SIDE;
        let y = i as i32 / SIDE;
        let dir = Direction::all()[facing as usize];
        let m = magnitude as f64;
        match kind {
            1 => {
                world.add(pipe(x, y, m * 5.0, m));
            }
            2 => {
                world.add(wire(x, y, m, m * 2.0));
            }
            3 => pins.push((
                world.add(machine(x, y, producer_pin(dir, m, m * 2.0, TypeTag::Pipe))),
                true,
            )),
            4 => pins.push((
                world.add(machine(x, y, consumer_pin(dir, m, TypeTag::Pipe))),
                false,
            )),
            5 => pins.push((
                world.add(machine(x, y, producer_pin(dir, m, m, TypeTag::Energy))),
                true,
            )),
            6 => pins.push((
                world.add(machine(x, y, consumer_pin(dir, m, TypeTag::Energy))),
                false,
            )),
            7 => {
                world.add(tunnel(x, y, dir, 4));
            }
            _ => {}
        }
    }
    (world, pins)
}

/// Tick `ticks` times, refilling producers and emptying consumers between
/// ticks like a host would.
fn run(world: &mut TestWorld, pins: &[(EntityId, bool)], ticks: usize) {
    for _ in 0..ticks {
        world.tick();
        for &(id, producer) in pins {
            let port = world.engine.pin_mut(id, 0).unwrap();
            if producer {
                port.fill(fixed(3.0));
            } else {
                port.drain(fixed(2.0));
            }
        }
    }
}

fn link_tag(world: &TestWorld, link: LinkRef) -> TypeTag {
    let entity = world.engine.entity(link.entity()).unwrap();
    match link {
        LinkRef::Connector(_) => entity.connector.as_ref().unwrap().tag,
        LinkRef::Tunnel { slot, .. } => entity.tunnels[slot].tag,
    }
}

fn volumes(world: &TestWorld) -> Vec<(usize, Fixed64)> {
    world
        .engine
        .networks()
        .map(|n: &Network| (n.links.len(), n.volume))
        .collect()
}

// ===========================================================================
// Properties
// ===========================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Volume stays within 0..=max_volume after every balance step.
    #[test]
    fn volume_stays_in_range(board in arb_board(), ticks in 1..6usize) {
        let (mut world, pins) = build(&board);
        for _ in 0..ticks {
            run(&mut world, &pins, 1);
            for network in world.engine.networks() {
                prop_assert!(network.volume >= Fixed64::ZERO);
                prop_assert!(network.volume <= network.max_volume());
            }
        }
    }

    /// Every member of a network carries the network's tag.
    #[test]
    fn members_share_one_tag(board in arb_board()) {
        let (mut world, pins) = build(&board);
        run(&mut world, &pins, 1);

        for network in world.engine.networks() {
            for &link in &network.links {
                prop_assert_eq!(link_tag(&world, link), network.tag);
            }
            for port in &network.ports {
                let pin = world.engine.pin(port.entity, port.port).unwrap();
                prop_assert_eq!(pin.tag, network.tag);
            }
        }
    }

    /// Each member belongs to exactly one network and points back at it.
    #[test]
    fn membership_is_exclusive(board in arb_board()) {
        let (mut world, pins) = build(&board);
        run(&mut world, &pins, 1);

        let mut seen_links = BTreeSet::new();
        let mut seen_ports = BTreeSet::new();
        for network in world.engine.networks() {
            let id: NetworkId = network.id;
            for &link in &network.links {
                prop_assert!(seen_links.insert(link));
                let back = match link {
                    LinkRef::Connector(e) => world.engine.connector_network(e),
                    LinkRef::Tunnel { entity, slot } => world.engine.tunnel_network(entity, slot),
                };
                prop_assert_eq!(back.map(|n| n.id), Some(id));
            }
            for &port in &network.ports {
                prop_assert!(seen_ports.insert(port));
                prop_assert_eq!(
                    world.engine.pin_network(port.entity, port.port).map(|n| n.id),
                    Some(id)
                );
            }
        }
    }

    /// Identical layouts and inputs produce identical networks.
    #[test]
    fn deterministic_balancing(board in arb_board(), ticks in 1..8usize) {
        let (mut a, pins_a) = build(&board);
        let (mut b, pins_b) = build(&board);
        run(&mut a, &pins_a, ticks);
        run(&mut b, &pins_b, ticks);
        prop_assert_eq!(volumes(&a), volumes(&b));
    }

    /// A rebuild with no topology change keeps every stored volume.
    #[test]
    fn rebuild_preserves_volume(board in arb_board()) {
        let (mut world, pins) = build(&board);
        run(&mut world, &pins, 3);

        let before: Fixed64 = world.engine.networks().map(|n| n.volume).sum();
        world.engine.rebuild_networks(&world.grid);
        let after: Fixed64 = world.engine.networks().map(|n| n.volume).sum();
        let tolerance = Fixed64::from_bits(1 << 8);
        prop_assert!((before - after).abs() <= tolerance * Fixed64::from_num(SIDE * SIDE));
    }
}
