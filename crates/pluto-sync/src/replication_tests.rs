//! Tests for delta and full synchronization.

use super::*;
use crate::protocol::EntityId;

/// Eight independent gauges, one field each.
#[derive(Debug, Clone, Default, PartialEq)]
struct Gauges([i16; 8]);

impl Replicable for Gauges {
    type Field = i16;
    const FIELDS: usize = 8;

    fn field(&self, index: usize) -> &i16 {
        &self.0[index]
    }

    fn field_mut(&mut self, index: usize) -> &mut i16 {
        &mut self.0[index]
    }
}

const A: PeerId = PeerId(1);
const B: PeerId = PeerId(2);
const ACTIVE: u32 = 0b110;

/// An aggregate visible to A and B with its initial sync already sent.
fn synced() -> Aggregate<Gauges> {
    let mut aggregate = Aggregate::new(Gauges([10, 11, 12, 13, 14, 15, 16, 17]));
    aggregate.reveal(A);
    aggregate.reveal(B);
    aggregate.take_sync(ACTIVE);
    aggregate
}

#[test]
fn test_new_aggregate_is_fully_dirty() {
    let aggregate = Aggregate::new(Gauges::default());
    assert_eq!(aggregate.modified(), 0xFF);
    assert_eq!(aggregate.visible(), 0);
}

#[test]
fn test_first_sync_sends_everything_to_new_viewers() {
    let mut aggregate = Aggregate::new(Gauges([1, 2, 3, 4, 5, 6, 7, 8]));
    aggregate.reveal(A);
    let sends = aggregate.take_sync(ACTIVE);
    assert_eq!(sends.len(), 1);
    assert!(sends[0].full);
    assert_eq!(sends[0].peers, A.bit());
    assert_eq!(sends[0].update.mask(), 0xFF);
    // The pending full sync does not consume the modified bits, but the
    // delta pass does, and A was already covered.
    assert_eq!(aggregate.modified(), 0);
}

#[test]
fn test_bits_two_and_five_sent_in_order_then_cleared() {
    let mut aggregate = synced();
    *aggregate.field_mut(5) = 50;
    *aggregate.field_mut(2) = 20;
    assert_eq!(aggregate.modified(), 0b0010_0100);

    let sends = aggregate.take_sync(ACTIVE);
    assert_eq!(sends.len(), 1);
    let send = &sends[0];
    assert!(!send.full);
    assert_eq!(send.peers, ACTIVE);
    let fields: Vec<_> = send.update.iter().map(|(i, v)| (i, *v)).collect();
    assert_eq!(fields, [(2, 20), (5, 50)]);
    assert_eq!(aggregate.modified(), 0);
}

#[test]
fn test_unchanged_aggregate_sends_nothing() {
    let mut aggregate = synced();
    assert!(aggregate.take_sync(ACTIVE).is_empty());
    assert!(aggregate.take_sync(ACTIVE).is_empty());
}

#[test]
fn test_edit_marks_only_changed_fields() {
    let mut aggregate = synced();
    aggregate.edit(|g| {
        g.0[3] = 13;
        g.0[7] = 70;
    });
    assert_eq!(aggregate.modified(), 1 << 7);
}

#[test]
fn test_reveal_forces_full_sync_despite_clean_mask() {
    let mut aggregate = Aggregate::new(Gauges::default());
    aggregate.reveal(B);
    aggregate.take_sync(ACTIVE);
    assert_eq!(aggregate.modified(), 0);

    aggregate.reveal(A);
    let sends = aggregate.take_sync(ACTIVE);
    assert_eq!(sends.len(), 1);
    assert!(sends[0].full);
    assert_eq!(sends[0].peers, A.bit());
    assert_eq!(sends[0].update.mask(), 0xFF);

    // Nothing changed since, so nothing is repeated.
    assert!(aggregate.take_sync(ACTIVE).is_empty());
}

#[test]
fn test_newly_visible_peer_never_gets_only_a_delta() {
    let mut aggregate = synced();
    aggregate.hide(A);
    *aggregate.field_mut(1) = 99;
    aggregate.reveal(A);

    let sends = aggregate.take_sync(ACTIVE);
    let to_a: Vec<_> = sends.iter().filter(|s| s.peers & A.bit() != 0).collect();
    assert_eq!(to_a.len(), 1);
    assert!(to_a[0].full);

    let to_b: Vec<_> = sends.iter().filter(|s| s.peers & B.bit() != 0).collect();
    assert_eq!(to_b.len(), 1);
    assert!(!to_b[0].full);
    assert_eq!(to_b[0].update.mask(), 1 << 1);
}

#[test]
fn test_delta_consumed_without_recipients() {
    let mut aggregate = Aggregate::new(Gauges::default());
    aggregate.reveal(A);
    aggregate.take_sync(A.bit());
    *aggregate.field_mut(4) = 4;
    aggregate.reveal(B);

    // Only B is active: B is forced, A is offline, the delta has no
    // recipients but the tick still consumes it.
    let sends = aggregate.take_sync(B.bit());
    assert_eq!(sends.len(), 1);
    assert!(sends[0].full);
    assert_eq!(aggregate.modified(), 0);
}

#[test]
fn test_repeated_reveal_does_not_force_again() {
    let mut aggregate = synced();
    aggregate.reveal(A);
    assert_eq!(aggregate.pending(), 0);
    assert!(aggregate.take_sync(ACTIVE).is_empty());
}

#[test]
fn test_pending_waits_for_peer_to_be_active() {
    let mut aggregate = synced();
    let c = PeerId(3);
    aggregate.reveal(c);
    assert!(aggregate.take_sync(ACTIVE).is_empty());
    assert_eq!(aggregate.pending(), c.bit());

    let sends = aggregate.take_sync(ACTIVE | c.bit());
    assert_eq!(sends.len(), 1);
    assert_eq!(sends[0].peers, c.bit());
}

#[test]
fn test_set_visible_forces_only_new_bits() {
    let mut aggregate = synced();
    let c = PeerId(3);
    aggregate.set_visible(A.bit() | c.bit());
    assert_eq!(aggregate.pending(), c.bit());
    assert!(!aggregate.is_visible_to(B));
}

#[test]
fn test_registry_syncs_in_key_order_and_forgets_peers() {
    let mut registry = AggregateRegistry::new();
    for id in [9, 2, 5] {
        registry
            .insert(AggregateKey::Ship(EntityId(id)), Gauges::default())
            .reveal(A);
    }
    registry
        .insert(AggregateKey::Building(EntityId(1)), Gauges::default())
        .reveal(A);

    let keys: Vec<_> = registry.take_syncs(ACTIVE).into_iter().map(|(k, _)| k).collect();
    assert_eq!(
        keys,
        [
            AggregateKey::Ship(EntityId(2)),
            AggregateKey::Ship(EntityId(5)),
            AggregateKey::Ship(EntityId(9)),
            AggregateKey::Building(EntityId(1)),
        ]
    );

    registry.forget_peer(A);
    assert!(registry.iter().all(|(_, a)| a.visible() == 0));
    assert!(registry.remove(AggregateKey::Ship(EntityId(5))).is_some());
    assert_eq!(registry.len(), 3);
}

#[test]
fn test_reinserting_key_starts_dirty_and_hidden() {
    let mut registry = AggregateRegistry::new();
    let key = AggregateKey::Ship(EntityId(1));
    registry.insert(key, Gauges::default()).reveal(A);
    registry.take_syncs(ACTIVE);
    let fresh = registry.insert(key, Gauges::default());
    assert_eq!(fresh.modified(), 0xFF);
    assert_eq!(fresh.visible(), 0);
}

mod wire {
    use super::*;
    use crate::receive::tests::FixedLookup;

    fn roundtrip(update: &FieldUpdate<i16>) -> Result<FieldUpdate<i16>, Corrupt> {
        let mut writer = MessageWriter::new(0);
        update.write(&mut writer);
        let packet = writer.finish().unwrap();
        let lookup = FixedLookup::default();
        let mut receive = Receive::new(packet.reader(), PeerId::SERVER, &lookup);
        FieldUpdate::read::<Gauges>(&mut receive)
    }

    #[test]
    fn test_delta_applies_to_replica() {
        let source = Gauges([0, 1, 2, 3, 4, 5, 6, 7]);
        let update = FieldUpdate::select(&source, 0b1000_0001);
        let decoded = roundtrip(&update).unwrap();
        assert_eq!(decoded, update);

        let mut replica = Gauges::default();
        decoded.apply(&mut replica);
        assert_eq!(replica.0, [0, 0, 0, 0, 0, 0, 0, 7]);
    }

    #[test]
    fn test_mask_beyond_field_count_is_corrupt() {
        let mut writer = MessageWriter::new(0);
        writer.u32(1 << 8).i16(1);
        let packet = writer.finish().unwrap();
        let lookup = FixedLookup::default();
        let mut receive = Receive::new(packet.reader(), PeerId::SERVER, &lookup);
        let err = FieldUpdate::<i16>::read::<Gauges>(&mut receive).unwrap_err();
        assert_eq!(err.what, "field mask");
    }

    #[test]
    fn test_empty_update_is_just_a_mask() {
        let update = FieldUpdate::select(&Gauges::default(), 0);
        assert!(update.is_empty());
        assert_eq!(roundtrip(&update).unwrap(), update);
    }
}

mod properties {
    use super::*;
    use proptest::prelude::*;

    /// Server-side operations on one aggregate.
    #[derive(Debug, Clone)]
    enum Step {
        Set(usize, i16),
        Reveal(u8),
        Hide(u8),
        Sync,
    }

    fn step() -> impl Strategy<Value = Step> {
        prop_oneof![
            (0..8usize, any::<i16>()).prop_map(|(index, value)| Step::Set(index, value)),
            (1..4u8).prop_map(Step::Reveal),
            (1..4u8).prop_map(Step::Hide),
            Just(Step::Sync),
        ]
    }

    /// Peers 1 to 3, all connected throughout.
    const EVERYONE: u32 = 0b1110;

    proptest! {
        #[test]
        fn test_visible_peers_converge_without_resends(
            steps in prop::collection::vec(step(), 1..40)
        ) {
            let mut aggregate = Aggregate::new(Gauges::default());
            let mut replicas: [Option<Gauges>; 4] = Default::default();

            for step in steps.into_iter().chain([Step::Sync]) {
                match step {
                    Step::Set(index, value) => *aggregate.field_mut(index) = value,
                    Step::Reveal(peer) => aggregate.reveal(PeerId(peer)),
                    Step::Hide(peer) => {
                        aggregate.hide(PeerId(peer));
                        replicas[usize::from(peer)] = None;
                    }
                    Step::Sync => {
                        let pending = aggregate.pending();
                        let modified = aggregate.modified();
                        let visible = aggregate.visible();

                        for send in aggregate.take_sync(EVERYONE) {
                            if send.full {
                                prop_assert_eq!(send.peers, pending & visible);
                                prop_assert_eq!(send.update.mask(), 0xFF);
                            } else {
                                prop_assert_ne!(modified, 0);
                                prop_assert_eq!(send.peers, visible & !pending);
                                prop_assert_eq!(send.update.mask(), modified);
                            }
                            for peer in PeerId::iter_mask(send.peers) {
                                let replica = &mut replicas[peer.index()];
                                if send.full {
                                    *replica = Some(Gauges::default());
                                }
                                prop_assert!(replica.is_some(), "delta reached {} first", peer);
                                if let Some(replica) = replica {
                                    send.update.apply(replica);
                                }
                            }
                        }

                        prop_assert_eq!(aggregate.pending(), 0);
                        prop_assert_eq!(aggregate.modified(), 0);
                        for peer in PeerId::iter_mask(EVERYONE) {
                            let expected = aggregate.is_visible_to(peer).then(|| aggregate.value().clone());
                            prop_assert_eq!(&replicas[peer.index()], &expected);
                        }
                    }
                }
            }
        }
    }
}
