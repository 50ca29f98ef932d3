//! Per-tick flow balancing.
//!
//! Each network pools what its providers can emit against what its
//! consumers can absorb, using stored volume to cover a shortfall or
//! absorb a surplus:
//!
//! - surplus: every consumer is served in full; providers emit only what
//!   consumers plus free storage can take, scaled evenly;
//! - shortfall: every provider emits in full; consumers receive what
//!   providers plus storage can supply, scaled evenly.
//!
//! Volume stays within `0..=max_volume` by construction.

use crate::fixed::{mul_div, Fixed64};
use crate::id::{EntityId, PortRef};
use crate::network::Network;
use crate::port::{FlowEntity, Port};
use crate::resource::ResourceKind;
use slotmap::SecondaryMap;
use tracing::trace;

/// Flows applied to one network in one balance step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BalanceOutcome {
    pub potential_production: Fixed64,
    pub potential_consumption: Fixed64,
    /// What providers actually emitted.
    pub produced: Fixed64,
    /// What consumers actually received.
    pub consumed: Fixed64,
}

impl BalanceOutcome {
    /// Net change of the network's stored volume.
    pub fn stored(&self) -> Fixed64 {
        self.produced - self.consumed
    }
}

/// Balance one network against the port buffers in `entities`.
///
/// Members whose entity has been removed since discovery are skipped.
pub fn balance_network<R: ResourceKind>(
    network: &mut Network<R>,
    entities: &mut SecondaryMap<EntityId, FlowEntity<R>>,
) -> BalanceOutcome {
    let limit = network.max_throughput();

    let offers = collect(&network.providers, entities, |port| port.production(limit));
    let demands = collect(&network.consumers, entities, |port| port.consumption(limit));
    let potential_production = total(&offers);
    let potential_consumption = total(&demands);

    let mut outcome = BalanceOutcome {
        potential_production,
        potential_consumption,
        ..BalanceOutcome::default()
    };

    if potential_production == Fixed64::ZERO && potential_consumption == Fixed64::ZERO {
        network.throughput = Fixed64::ZERO;
        return outcome;
    }

    let mut peak = Fixed64::ZERO;
    if potential_production > potential_consumption {
        let deficit = network.free_volume();
        let real = potential_production.min(potential_consumption.saturating_add(deficit));
        network.volume += real - potential_consumption;

        for &(port_ref, offer) in &offers {
            let amount = mul_div(offer, real, potential_production);
            apply(entities, port_ref, |port| port.produce(amount));
            outcome.produced = outcome.produced.saturating_add(amount);
            peak = peak.max(amount);
        }
        for &(port_ref, demand) in &demands {
            apply(entities, port_ref, |port| port.consume(demand));
            outcome.consumed = outcome.consumed.saturating_add(demand);
            peak = peak.max(demand);
        }
    } else {
        let surplus = network.volume.max(Fixed64::ZERO);
        let real = potential_consumption.min(potential_production.saturating_add(surplus));
        network.volume -= real - potential_production;

        for &(port_ref, offer) in &offers {
            apply(entities, port_ref, |port| port.produce(offer));
            outcome.produced = outcome.produced.saturating_add(offer);
            peak = peak.max(offer);
        }
        for &(port_ref, demand) in &demands {
            let amount = mul_div(demand, real, potential_consumption);
            apply(entities, port_ref, |port| port.consume(amount));
            outcome.consumed = outcome.consumed.saturating_add(amount);
            peak = peak.max(amount);
        }
    }

    debug_assert!(
        network.volume >= Fixed64::ZERO && network.volume <= network.max_volume(),
        "balance pushed volume out of range"
    );
    network.throughput = peak;

    trace!(
        network = network.id.0,
        potential_production = %potential_production,
        potential_consumption = %potential_consumption,
        volume = %network.volume,
        throughput = %peak,
        "network balanced"
    );
    outcome
}

fn collect<R: ResourceKind>(
    members: &[PortRef],
    entities: &SecondaryMap<EntityId, FlowEntity<R>>,
    amount: impl Fn(&Port<R>) -> Fixed64,
) -> Vec<(PortRef, Fixed64)> {
    members
        .iter()
        .filter_map(|&port_ref| {
            let port = entities.get(port_ref.entity)?.pins.get(port_ref.port)?;
            Some((port_ref, amount(port)))
        })
        .collect()
}

fn total(flows: &[(PortRef, Fixed64)]) -> Fixed64 {
    flows
        .iter()
        .fold(Fixed64::ZERO, |acc, &(_, amount)| acc.saturating_add(amount))
}

fn apply<R: ResourceKind>(
    entities: &mut SecondaryMap<EntityId, FlowEntity<R>>,
    port_ref: PortRef,
    f: impl FnOnce(&mut Port<R>),
) {
    if let Some(port) = entities
        .get_mut(port_ref.entity)
        .and_then(|entity| entity.pins.get_mut(port_ref.port))
    {
        f(port);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::{Direction, GridPosition, Placement};
    use crate::id::{LinkRef, NetworkId, ResourceId};
    use crate::port::PortKind;
    use crate::resource::TypeTag;
    use slotmap::SlotMap;

    fn fixed(v: f64) -> Fixed64 {
        Fixed64::from_num(v)
    }

    /// A network with one storage link and the given pins, each hosted on
    /// its own entity and already linked to the network.
    struct Rig {
        _keys: SlotMap<EntityId, ()>,
        entities: SecondaryMap<EntityId, FlowEntity<ResourceId>>,
        network: Network<ResourceId>,
        pins: Vec<EntityId>,
    }

    impl Rig {
        fn new(max_volume: f64, link_throughput: f64, pins: Vec<Port<ResourceId>>) -> Self {
            let mut keys = SlotMap::with_key();
            let mut entities = SecondaryMap::new();
            let mut network = Network::new(NetworkId(0), TypeTag::Energy);

            let link = keys.insert(());
            network.add_link(LinkRef::Connector(link), fixed(max_volume), fixed(link_throughput));

            let mut ids = Vec::new();
            for mut port in pins {
                let id = keys.insert(());
                port.link.claim(network.id);
                let port_ref = PortRef { entity: id, port: 0 };
                match port.kind {
                    PortKind::Producer => network.add_provider(port_ref),
                    PortKind::Consumer => network.add_consumer(port_ref),
                }
                entities.insert(id, FlowEntity::new(Placement::at(GridPosition::ORIGIN)).with_pin(port));
                ids.push(id);
            }
            Self {
                _keys: keys,
                entities,
                network,
                pins: ids,
            }
        }

        fn buffer(&self, index: usize) -> Fixed64 {
            self.entities[self.pins[index]].pins[0].buffer
        }

        fn balance(&mut self) -> BalanceOutcome {
            balance_network(&mut self.network, &mut self.entities)
        }
    }

    fn producer(rate: f64, buffer: f64) -> Port<ResourceId> {
        Port::producer(GridPosition::ORIGIN, Direction::East, fixed(rate)).with_buffer(fixed(buffer))
    }

    fn consumer(rate: f64) -> Port<ResourceId> {
        Port::consumer(GridPosition::ORIGIN, Direction::West, fixed(rate))
    }

    #[test]
    fn surplus_fills_storage() {
        let mut rig = Rig::new(100.0, 10.0, vec![producer(10.0, 10.0), consumer(4.0)]);
        let outcome = rig.balance();

        assert_eq!(rig.network.volume, fixed(6.0));
        assert_eq!(rig.buffer(0), Fixed64::ZERO);
        assert_eq!(rig.buffer(1), fixed(4.0));
        assert_eq!(outcome.stored(), fixed(6.0));
        assert_eq!(rig.network.throughput, fixed(10.0));
    }

    #[test]
    fn full_storage_throttles_producers() {
        let mut rig = Rig::new(5.0, 10.0, vec![producer(10.0, 10.0), consumer(2.0)]);
        rig.network.volume = fixed(5.0);
        let outcome = rig.balance();

        assert_eq!(outcome.produced, fixed(2.0));
        assert_eq!(rig.buffer(0), fixed(8.0));
        assert_eq!(rig.network.volume, fixed(5.0));
    }

    #[test]
    fn shortfall_drains_storage() {
        let mut rig = Rig::new(20.0, 10.0, vec![producer(2.0, 2.0), consumer(5.0)]);
        rig.network.volume = fixed(10.0);
        rig.balance();

        assert_eq!(rig.network.volume, fixed(7.0));
        assert_eq!(rig.buffer(1), fixed(5.0));
    }

    #[test]
    fn shortfall_without_storage_scales_consumers() {
        let mut rig = Rig::new(
            0.0,
            10.0,
            vec![producer(3.0, 3.0), consumer(4.0), consumer(2.0)],
        );
        rig.balance();

        // 3 units shared 4:2.
        assert_eq!(rig.buffer(1), fixed(2.0));
        assert_eq!(rig.buffer(2), fixed(1.0));
        assert_eq!(rig.network.volume, Fixed64::ZERO);
    }

    #[test]
    fn balanced_flow_leaves_volume_unchanged() {
        let mut rig = Rig::new(50.0, 10.0, vec![producer(4.0, 4.0), consumer(4.0)]);
        rig.network.volume = fixed(20.0);
        rig.balance();
        assert_eq!(rig.network.volume, fixed(20.0));
    }

    #[test]
    fn idle_network_is_untouched() {
        let mut rig = Rig::new(50.0, 10.0, vec![]);
        rig.network.volume = fixed(12.0);
        rig.network.throughput = fixed(3.0);
        let outcome = rig.balance();

        assert_eq!(rig.network.volume, fixed(12.0));
        assert_eq!(rig.network.throughput, Fixed64::ZERO);
        assert_eq!(outcome, BalanceOutcome::default());
    }

    #[test]
    fn weakest_link_caps_each_port() {
        // Link throughput 2 shared by 3 providers: ceiling 6 per port.
        let mut rig = Rig::new(
            100.0,
            2.0,
            vec![producer(10.0, 10.0), producer(10.0, 10.0), producer(10.0, 10.0)],
        );
        let outcome = rig.balance();

        assert_eq!(outcome.potential_production, fixed(18.0));
        assert!(rig.network.throughput <= fixed(6.0));
        assert_eq!(rig.network.volume, fixed(18.0));
    }

    #[test]
    fn removed_pin_is_skipped() {
        let mut rig = Rig::new(100.0, 10.0, vec![producer(5.0, 5.0), consumer(5.0)]);
        let gone = rig.pins[1];
        rig.entities.remove(gone);
        rig.balance();
        assert_eq!(rig.network.volume, fixed(5.0));
    }
}
