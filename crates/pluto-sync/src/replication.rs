//! Change and visibility tracking for replicated aggregates.
//!
//! An [`Aggregate`] wraps a [`Replicable`] value with three per-tick masks:
//!
//! - `modified`: one bit per field, set when the server mutates that field.
//! - `visible`: one bit per peer, set while that peer may see the value.
//! - `pending`: one bit per peer whose visibility just turned on and who
//!   still owes a full sync.
//!
//! [`Aggregate::take_sync`] turns those masks into at most two sends: every
//! field to the pending peers (leaving `modified` alone) and the modified
//! fields to the remaining visible peers (clearing `modified`). A peer that
//! just gained visibility never receives only a delta, and an unchanged field
//! is not resent until it is modified again.

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::fmt;

use pluto_net::{MessageWriter, PeerId};

use crate::protocol::AggregateKey;
use crate::receive::{Corrupt, Receive};

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// A value that can be written to and read from a message.
pub trait WireField: Clone + PartialEq + fmt::Debug {
    fn write(&self, writer: &mut MessageWriter);
    fn read(receive: &mut Receive<'_>) -> Result<Self, Corrupt>;
}

/// A fixed-size bundle of wire fields.
///
/// `FIELDS` must not exceed 32. Field indices are `0..FIELDS` and fix the
/// order fields appear on the wire.
pub trait Replicable: Clone {
    type Field: WireField;
    const FIELDS: usize;

    fn field(&self, index: usize) -> &Self::Field;
    fn field_mut(&mut self, index: usize) -> &mut Self::Field;
}

/// Mask with one bit for every field of `T`.
pub fn all_fields<T: Replicable>() -> u32 {
    debug_assert!(T::FIELDS <= 32);
    if T::FIELDS >= 32 {
        u32::MAX
    } else {
        (1u32 << T::FIELDS) - 1
    }
}

macro_rules! wire_int {
    ($($ty:ident),*) => {
        $(
            impl WireField for $ty {
                fn write(&self, writer: &mut MessageWriter) {
                    writer.$ty(*self);
                }

                fn read(receive: &mut Receive<'_>) -> Result<Self, Corrupt> {
                    Ok(receive.$ty())
                }
            }
        )*
    };
}

wire_int!(u8, u16, i16, u32, i32);

// ---------------------------------------------------------------------------
// FieldUpdate
// ---------------------------------------------------------------------------

/// A set of fields in ascending index order, as sent on the wire:
/// a `u32` field mask followed by each selected field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldUpdate<F> {
    mask: u32,
    fields: Vec<F>,
}

impl<F: WireField> FieldUpdate<F> {
    /// Every field of `value`.
    pub fn full<T: Replicable<Field = F>>(value: &T) -> Self {
        Self::select(value, all_fields::<T>())
    }

    /// The fields of `value` whose bits are set in `mask`.
    pub fn select<T: Replicable<Field = F>>(value: &T, mask: u32) -> Self {
        let mask = mask & all_fields::<T>();
        let fields = (0..T::FIELDS)
            .filter(|i| mask & (1 << i) != 0)
            .map(|i| value.field(i).clone())
            .collect();
        Self { mask, fields }
    }

    pub fn mask(&self) -> u32 {
        self.mask
    }

    pub fn is_empty(&self) -> bool {
        self.mask == 0
    }

    /// Field indices and values in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &F)> {
        (0..32usize)
            .filter(|i| self.mask & (1 << i) != 0)
            .zip(self.fields.iter())
    }

    pub fn write(&self, writer: &mut MessageWriter) {
        writer.u32(self.mask);
        for field in &self.fields {
            field.write(writer);
        }
    }

    /// Reads an update for `T`. A mask naming fields `T` does not have is
    /// corrupt.
    pub fn read<T: Replicable<Field = F>>(receive: &mut Receive<'_>) -> Result<Self, Corrupt> {
        let mask = receive.u32();
        if mask & !all_fields::<T>() != 0 {
            return Err(Corrupt::new("field mask"));
        }
        let mut fields = Vec::with_capacity(mask.count_ones() as usize);
        for _ in 0..mask.count_ones() {
            fields.push(F::read(receive)?);
        }
        Ok(Self { mask, fields })
    }

    /// Overwrites the selected fields of `target`.
    pub fn apply<T: Replicable<Field = F>>(&self, target: &mut T) {
        for (index, field) in self.iter() {
            if index < T::FIELDS {
                *target.field_mut(index) = field.clone();
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Aggregate
// ---------------------------------------------------------------------------

/// One send produced by [`Aggregate::take_sync`].
#[derive(Debug, Clone, PartialEq)]
pub struct Broadcast<F> {
    /// Recipient peers as a client mask.
    pub peers: u32,
    /// Whether this is a full sync.
    pub full: bool,
    pub update: FieldUpdate<F>,
}

/// A replicated value and its tracking masks.
#[derive(Debug, Clone)]
pub struct Aggregate<T: Replicable> {
    value: T,
    modified: u32,
    visible: u32,
    pending: u32,
}

impl<T: Replicable> Aggregate<T> {
    /// Wraps a freshly spawned value. Every field starts modified, so the
    /// first broadcast is complete.
    pub fn new(value: T) -> Self {
        Self {
            value,
            modified: all_fields::<T>(),
            visible: 0,
            pending: 0,
        }
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    pub fn modified(&self) -> u32 {
        self.modified
    }

    pub fn visible(&self) -> u32 {
        self.visible
    }

    /// Peers still owed a full sync.
    pub fn pending(&self) -> u32 {
        self.pending
    }

    /// Mutable access to one field, marking it modified.
    pub fn field_mut(&mut self, index: usize) -> &mut T::Field {
        self.modified |= 1 << index;
        self.value.field_mut(index)
    }

    /// Runs `edit` on the value and marks every field it changed.
    pub fn edit(&mut self, edit: impl FnOnce(&mut T)) {
        let before = self.value.clone();
        edit(&mut self.value);
        for index in 0..T::FIELDS {
            if before.field(index) != self.value.field(index) {
                self.modified |= 1 << index;
            }
        }
    }

    pub fn is_visible_to(&self, peer: PeerId) -> bool {
        self.visible & peer.bit() != 0
    }

    /// Makes the value visible to `peer`. Only a change from hidden to
    /// visible schedules a full sync.
    pub fn reveal(&mut self, peer: PeerId) {
        let bit = peer.bit();
        if self.visible & bit == 0 {
            self.visible |= bit;
            self.pending |= bit;
        }
    }

    /// Hides the value from `peer`. Nothing further is sent to it.
    pub fn hide(&mut self, peer: PeerId) {
        let bit = peer.bit();
        self.visible &= !bit;
        self.pending &= !bit;
    }

    /// Replaces the whole visibility mask, scheduling full syncs for every
    /// peer that gains visibility.
    pub fn set_visible(&mut self, mask: u32) {
        self.pending = (self.pending | (mask & !self.visible)) & mask;
        self.visible = mask;
    }

    /// Computes this tick's sends for the peers in `active`.
    ///
    /// Pending peers in `active` get every field and stop being pending;
    /// `modified` is left alone for them. If any field is modified, the
    /// remaining visible peers in `active` get just those fields and
    /// `modified` is cleared. With nothing modified and nobody pending, this
    /// returns no sends.
    pub fn take_sync(&mut self, active: u32) -> Vec<Broadcast<T::Field>> {
        let mut sends = Vec::new();

        let forced = self.pending & self.visible & active;
        if forced != 0 {
            self.pending &= !forced;
            sends.push(Broadcast {
                peers: forced,
                full: true,
                update: FieldUpdate::full(&self.value),
            });
        }

        if self.modified != 0 {
            let peers = self.visible & active & !forced;
            if peers != 0 {
                sends.push(Broadcast {
                    peers,
                    full: false,
                    update: FieldUpdate::select(&self.value, self.modified),
                });
            }
            self.modified = 0;
        }

        sends
    }

    /// Drops every bit belonging to `peer`.
    pub fn forget_peer(&mut self, peer: PeerId) {
        self.hide(peer);
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// All aggregates of one type in a session, iterated in key order.
#[derive(Debug, Clone)]
pub struct AggregateRegistry<T: Replicable> {
    aggregates: BTreeMap<AggregateKey, Aggregate<T>>,
}

impl<T: Replicable> AggregateRegistry<T> {
    pub fn new() -> Self {
        Self {
            aggregates: BTreeMap::new(),
        }
    }

    /// Registers a spawned value, replacing any previous one under `key`.
    pub fn insert(&mut self, key: AggregateKey, value: T) -> &mut Aggregate<T> {
        match self.aggregates.entry(key) {
            Entry::Occupied(mut entry) => {
                entry.insert(Aggregate::new(value));
                entry.into_mut()
            }
            Entry::Vacant(entry) => entry.insert(Aggregate::new(value)),
        }
    }

    /// Drops a despawned value.
    pub fn remove(&mut self, key: AggregateKey) -> Option<Aggregate<T>> {
        self.aggregates.remove(&key)
    }

    pub fn get(&self, key: AggregateKey) -> Option<&Aggregate<T>> {
        self.aggregates.get(&key)
    }

    pub fn get_mut(&mut self, key: AggregateKey) -> Option<&mut Aggregate<T>> {
        self.aggregates.get_mut(&key)
    }

    pub fn contains(&self, key: AggregateKey) -> bool {
        self.aggregates.contains_key(&key)
    }

    pub fn len(&self) -> usize {
        self.aggregates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.aggregates.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (AggregateKey, &Aggregate<T>)> {
        self.aggregates.iter().map(|(key, aggregate)| (*key, aggregate))
    }

    /// Removes `peer` from every visibility mask.
    pub fn forget_peer(&mut self, peer: PeerId) {
        for aggregate in self.aggregates.values_mut() {
            aggregate.forget_peer(peer);
        }
    }

    /// Runs [`Aggregate::take_sync`] on every aggregate in key order.
    pub fn take_syncs(&mut self, active: u32) -> Vec<(AggregateKey, Broadcast<T::Field>)> {
        let mut sends = Vec::new();
        for (key, aggregate) in &mut self.aggregates {
            sends.extend(aggregate.take_sync(active).into_iter().map(|b| (*key, b)));
        }
        sends
    }

    pub fn clear(&mut self) {
        self.aggregates.clear();
    }
}

impl<T: Replicable> Default for AggregateRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "replication_tests.rs"]
mod tests;
