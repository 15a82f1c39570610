//! Position accounting.
//!
//! [`PositionKeeper`] maintains the per-symbol ledger for one strategy:
//! signed quantity (+long / -short) and weighted-average cost. Fills arrive
//! as deltas from the order manager; queries materialize snapshots so no
//! caller ever holds the lock.
//!
//! [`aggregate_positions`] merges the per-strategy ledgers into the
//! cross-strategy view the engine serves.

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use exd_schemas::{Position, Side};

#[derive(Debug, Clone, Copy, Default)]
struct Entry {
    quantity: f64,
    avg_price: f64,
}

/// Per-strategy position ledger.
///
/// A writer-preferring read/write lock protects the symbol map: `on_fill`
/// takes the exclusive lock, queries take the shared lock and clone out.
#[derive(Debug, Default)]
pub struct PositionKeeper {
    positions: RwLock<HashMap<String, Entry>>,
}

impl PositionKeeper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one fill delta.
    ///
    /// Cost-basis rules:
    /// - flat after the fill        → average price resets to zero
    /// - opening from flat          → average price is the fill price
    /// - sign flip                  → average price is the fill price
    /// - adding to the same side    → weighted average
    /// - reducing without flipping  → average price unchanged
    ///
    /// A non-positive `fill_qty` is ignored. A zero `fill_price` updates
    /// quantity only — paper gateways may omit the price.
    pub fn on_fill(&self, symbol: &str, fill_qty: f64, fill_price: f64, side: Side) {
        if fill_qty <= 0.0 {
            return;
        }

        let signed_fill = match side {
            Side::Buy => fill_qty,
            Side::Sell => -fill_qty,
        };

        let mut positions = self.positions.write().expect("position lock poisoned");
        let entry = positions.entry(symbol.to_string()).or_default();

        let old_qty = entry.quantity;
        let new_qty = old_qty + signed_fill;

        if fill_price > 0.0 {
            if new_qty == 0.0 {
                entry.avg_price = 0.0;
            } else if old_qty == 0.0 {
                entry.avg_price = fill_price;
            } else if old_qty * new_qty < 0.0 {
                // Sign flip: the new side's cost basis starts at this fill.
                entry.avg_price = fill_price;
            } else if (old_qty > 0.0) == (signed_fill > 0.0) {
                entry.avg_price =
                    (old_qty * entry.avg_price + signed_fill * fill_price) / new_qty;
            }
            // Reducing without flipping: cost basis unchanged.
        }

        entry.quantity = new_qty;
    }

    /// Snapshot of one symbol's position, if any fill ever touched it.
    pub fn get_position(&self, symbol: &str) -> Option<Position> {
        let positions = self.positions.read().expect("position lock poisoned");
        positions.get(symbol).map(|entry| Position {
            symbol: symbol.to_string(),
            quantity: entry.quantity,
            avg_price: entry.avg_price,
        })
    }

    /// Snapshot of every tracked symbol, sorted by symbol.
    pub fn get_all_positions(&self) -> Vec<Position> {
        let positions = self.positions.read().expect("position lock poisoned");
        let mut all: Vec<Position> = positions
            .iter()
            .map(|(symbol, entry)| Position {
                symbol: symbol.clone(),
                quantity: entry.quantity,
                avg_price: entry.avg_price,
            })
            .collect();
        all.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        all
    }
}

/// Merge positions from several strategies into one view per symbol.
///
/// Quantities sum; the combined average price is `Σ qty·avg / Σ qty` when
/// the summed quantity is non-zero, zero otherwise.
pub fn aggregate_positions<I>(positions: I) -> Vec<Position>
where
    I: IntoIterator<Item = Position>,
{
    let mut sums: BTreeMap<String, (f64, f64)> = BTreeMap::new(); // qty, qty*avg
    for pos in positions {
        let slot = sums.entry(pos.symbol).or_insert((0.0, 0.0));
        slot.0 += pos.quantity;
        slot.1 += pos.quantity * pos.avg_price;
    }

    sums.into_iter()
        .map(|(symbol, (qty, weighted))| Position {
            symbol,
            quantity: qty,
            avg_price: if qty != 0.0 { weighted / qty } else { 0.0 },
        })
        .collect()
}
