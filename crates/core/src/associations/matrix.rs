//! Pairwise co-purchase statistics folded from an order corpus.

use std::collections::btree_map::{self, BTreeMap};
use chrono::{DateTime, Utc};
use rayon::prelude::*;

use crate::domain::order::OrderRecord;
use crate::domain::product::ProductId;

/// Directed composite key. Both directions of every co-purchased pair are stored.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PairKey {
    pub source: ProductId,
    pub target: ProductId,
}

impl PairKey {
    pub fn new(source: ProductId, target: ProductId) -> Self {
        Self { source, target }
    }
}

/// Co-occurrence history for one directed pair.
///
/// `cooccurrence_count` always equals `timestamps.len()` and `order_totals.len()`.
#[derive(Clone, Debug, PartialEq)]
pub struct ProductPair {
    pub key: PairKey,
    pub cooccurrence_count: u32,
    pub timestamps: Vec<DateTime<Utc>>,
    /// Order totals in minor units; missing totals were recorded as zero.
    pub order_totals: Vec<i64>,
}

impl ProductPair {
    fn empty(key: PairKey) -> Self {
        Self { key, cooccurrence_count: 0, timestamps: Vec::new(), order_totals: Vec::new() }
    }

    fn record(&mut self, placed_at: DateTime<Utc>, total: i64) {
        self.cooccurrence_count += 1;
        self.timestamps.push(placed_at);
        self.order_totals.push(total);
    }

    fn absorb(&mut self, other: ProductPair) {
        self.cooccurrence_count += other.cooccurrence_count;
        self.timestamps.extend(other.timestamps);
        self.order_totals.extend(other.order_totals);
    }

    pub fn source(&self) -> &ProductId {
        &self.key.source
    }

    pub fn target(&self) -> &ProductId {
        &self.key.target
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct CooccurrenceMatrix {
    pairs: BTreeMap<PairKey, ProductPair>,
    orders_folded: usize,
}

impl CooccurrenceMatrix {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one order into the matrix. Orders with fewer than two distinct
    /// products are counted but contribute no pairs.
    pub fn fold_order(&mut self, order: &OrderRecord) {
        self.orders_folded += 1;

        let products: Vec<&ProductId> = order.distinct_products().into_iter().collect();
        if products.len() < 2 {
            return;
        }

        let total = order.total_or_zero();
        for source in &products {
            for target in &products {
                if source == target {
                    continue;
                }
                let key = PairKey::new((*source).clone(), (*target).clone());
                self.pairs
                    .entry(key.clone())
                    .or_insert_with(|| ProductPair::empty(key))
                    .record(order.placed_at, total);
            }
        }
    }

    /// Merge a partial matrix built from a later slice of the corpus.
    pub fn merge(&mut self, other: CooccurrenceMatrix) {
        self.orders_folded += other.orders_folded;
        for (key, pair) in other.pairs {
            match self.pairs.entry(key) {
                btree_map::Entry::Vacant(slot) => {
                    slot.insert(pair);
                }
                btree_map::Entry::Occupied(mut slot) => slot.get_mut().absorb(pair),
            }
        }
    }

    pub fn get(&self, source: &ProductId, target: &ProductId) -> Option<&ProductPair> {
        self.pairs.get(&PairKey::new(source.clone(), target.clone()))
    }

    pub fn pairs(&self) -> impl Iterator<Item = &ProductPair> {
        self.pairs.values()
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn orders_folded(&self) -> usize {
        self.orders_folded
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct CooccurrenceMatrixBuilder;

impl CooccurrenceMatrixBuilder {
    pub fn new() -> Self {
        Self
    }

    pub fn build(&self, orders: &[OrderRecord]) -> CooccurrenceMatrix {
        let mut matrix = CooccurrenceMatrix::new();
        for order in orders {
            matrix.fold_order(order);
        }
        matrix
    }

    /// Build over contiguous slices of the corpus on the rayon pool, then merge
    /// the partial matrices in slice order. The result equals [`Self::build`].
    pub fn build_partitioned(&self, orders: &[OrderRecord], partitions: usize) -> CooccurrenceMatrix {
        if partitions <= 1 || orders.len() < 2 {
            return self.build(orders);
        }

        let chunk_size = orders.len().div_ceil(partitions);
        let partials: Vec<CooccurrenceMatrix> =
            orders.par_chunks(chunk_size).map(|chunk| self.build(chunk)).collect();

        let mut matrix = CooccurrenceMatrix::new();
        for partial in partials {
            matrix.merge(partial);
        }
        matrix
    }
}
