//! Cargo manifests: the aggregate replicated for ships and buildings.

use std::ops::Index;

use pluto_net::MessageWriter;

use crate::protocol::Cargo;
use crate::receive::{Corrupt, Receive};
use crate::replication::{Aggregate, Replicable, WireField};

/// Stock and trade settings for one kind of cargo.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CargoSlot {
    pub amount: i16,
    /// Price paid when buying automatically, if enabled.
    pub buy_price: Option<i16>,
    /// Price asked when selling automatically, if enabled.
    pub sell_price: Option<i16>,
    /// Stock kept back from sale.
    pub minimum: i16,
    /// Stock above which nothing is bought.
    pub maximum: i16,
}

fn price_to_wire(price: Option<i16>) -> i16 {
    price.unwrap_or(-1)
}

fn price_from_wire(value: i16) -> Option<i16> {
    (value >= 0).then_some(value)
}

impl WireField for CargoSlot {
    fn write(&self, writer: &mut MessageWriter) {
        writer
            .i16(self.amount)
            .i16(price_to_wire(self.buy_price))
            .i16(price_to_wire(self.sell_price))
            .i16(self.minimum)
            .i16(self.maximum);
    }

    fn read(receive: &mut Receive<'_>) -> Result<Self, Corrupt> {
        Ok(Self {
            amount: receive.i16(),
            buy_price: price_from_wire(receive.i16()),
            sell_price: price_from_wire(receive.i16()),
            minimum: receive.i16(),
            maximum: receive.i16(),
        })
    }
}

/// One slot per [`Cargo`] kind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CargoManifest {
    slots: [CargoSlot; Cargo::COUNT],
}

impl CargoManifest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn slot(&self, cargo: Cargo) -> &CargoSlot {
        &self.slots[cargo as usize]
    }

    pub fn slot_mut(&mut self, cargo: Cargo) -> &mut CargoSlot {
        &mut self.slots[cargo as usize]
    }

    /// Total amount carried across all kinds.
    pub fn total(&self) -> i32 {
        self.slots.iter().map(|slot| i32::from(slot.amount)).sum()
    }
}

impl Index<Cargo> for CargoManifest {
    type Output = CargoSlot;

    fn index(&self, cargo: Cargo) -> &CargoSlot {
        self.slot(cargo)
    }
}

impl Replicable for CargoManifest {
    type Field = CargoSlot;
    const FIELDS: usize = Cargo::COUNT;

    fn field(&self, index: usize) -> &CargoSlot {
        &self.slots[index]
    }

    fn field_mut(&mut self, index: usize) -> &mut CargoSlot {
        &mut self.slots[index]
    }
}

impl Aggregate<CargoManifest> {
    /// Mutable access to one cargo kind, marking it modified.
    pub fn slot_mut(&mut self, cargo: Cargo) -> &mut CargoSlot {
        self.field_mut(cargo as usize)
    }
}
