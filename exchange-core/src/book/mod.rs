//! Per-symbol order book: ordered bid/ask sides with a secondary index for
//! O(log n) removal by order id, plus the symbol-keyed manager over all
//! books.

use std::collections::BTreeSet;
use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use dashmap::DashMap;

use crate::domain::{OrderSide, SharedOrder};
use crate::ids::{OrderId, Symbol};

/// An order resting on the book, carrying just enough to order it and to
/// reach the full order record it stands for.
#[derive(Clone)]
pub struct BookEntry {
    pub price: i64,
    pub created_at: DateTime<Utc>,
    pub order_id: OrderId,
    pub order: SharedOrder,
}

/// An aggregated price level: total remaining quantity and order count
/// across every order resting at `price`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PriceLevel {
    pub price: i64,
    pub total_quantity: i64,
    pub order_count: usize,
}

fn tie_break(a: &BookEntry, b: &BookEntry) -> std::cmp::Ordering {
    a.created_at
        .cmp(&b.created_at)
        .then_with(|| a.order_id.cmp(&b.order_id))
}

/// Bid-side ordering: price descending, then created-at ascending, then
/// order id ascending — so the set's first element is the best bid.
struct BidKey(BookEntry);

impl PartialEq for BidKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == std::cmp::Ordering::Equal
    }
}
impl Eq for BidKey {}
impl PartialOrd for BidKey {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for BidKey {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        other
            .0
            .price
            .cmp(&self.0.price)
            .then_with(|| tie_break(&self.0, &other.0))
    }
}

/// Ask-side ordering: price ascending, then created-at ascending, then
/// order id ascending — so the set's first element is the best ask.
struct AskKey(BookEntry);

impl PartialEq for AskKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == std::cmp::Ordering::Equal
    }
}
impl Eq for AskKey {}
impl PartialOrd for AskKey {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for AskKey {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0
            .price
            .cmp(&other.0.price)
            .then_with(|| tie_break(&self.0, &other.0))
    }
}

/// The bid and ask sides for a single symbol, plus the order-id index used
/// for O(log n) removal. Callers take the enclosing `RwLock` (see
/// [`BookManager`]) for the duration of a mutating pass.
#[derive(Default)]
pub struct OrderBook {
    bids: BTreeSet<BidKey>,
    asks: BTreeSet<AskKey>,
    index: HashMap<OrderId, (OrderSide, BookEntry)>,
}

impl OrderBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_bid(&mut self, entry: BookEntry) {
        self.index
            .insert(entry.order_id, (OrderSide::Bid, entry.clone()));
        self.bids.insert(BidKey(entry));
    }

    pub fn insert_ask(&mut self, entry: BookEntry) {
        self.index
            .insert(entry.order_id, (OrderSide::Ask, entry.clone()));
        self.asks.insert(AskKey(entry));
    }

    /// No-op if `order_id` isn't resting on the book.
    pub fn remove(&mut self, order_id: OrderId) {
        if let Some((side, entry)) = self.index.remove(&order_id) {
            match side {
                OrderSide::Bid => {
                    self.bids.remove(&BidKey(entry));
                }
                OrderSide::Ask => {
                    self.asks.remove(&AskKey(entry));
                }
            }
        }
    }

    pub fn best_bid(&self) -> Option<BookEntry> {
        self.bids.iter().next().map(|k| k.0.clone())
    }

    pub fn best_ask(&self) -> Option<BookEntry> {
        self.asks.iter().next().map(|k| k.0.clone())
    }

    pub fn top_bids(&self, n: usize) -> Vec<PriceLevel> {
        top_levels(self.bids.iter().map(|k| &k.0), n)
    }

    pub fn top_asks(&self, n: usize) -> Vec<PriceLevel> {
        top_levels(self.asks.iter().map(|k| &k.0), n)
    }

    /// Iterates bids in priority order (best first), stopping when `visit`
    /// returns `false`.
    pub fn walk_bids(&self, mut visit: impl FnMut(&BookEntry) -> bool) {
        for key in &self.bids {
            if !visit(&key.0) {
                break;
            }
        }
    }

    /// Iterates asks in priority order (best first), stopping when `visit`
    /// returns `false`.
    pub fn walk_asks(&self, mut visit: impl FnMut(&BookEntry) -> bool) {
        for key in &self.asks {
            if !visit(&key.0) {
                break;
            }
        }
    }

    pub fn bid_count(&self) -> usize {
        self.bids.len()
    }

    pub fn ask_count(&self) -> usize {
        self.asks.len()
    }
}

fn top_levels<'a>(entries: impl Iterator<Item = &'a BookEntry>, n: usize) -> Vec<PriceLevel> {
    if n == 0 {
        return Vec::new();
    }
    let mut levels: Vec<PriceLevel> = Vec::with_capacity(n);
    for entry in entries {
        let remaining = entry.order.lock().expect("order lock poisoned").remaining_quantity;
        if let Some(last) = levels.last_mut() {
            if last.price == entry.price {
                last.total_quantity += remaining;
                last.order_count += 1;
                continue;
            }
        }
        if levels.len() >= n {
            break;
        }
        levels.push(PriceLevel {
            price: entry.price,
            total_quantity: remaining,
            order_count: 1,
        });
    }
    levels
}

/// Concurrent mapping from symbol to its order book, created lazily and
/// never evicted.
#[derive(Default)]
pub struct BookManager {
    books: DashMap<Symbol, RwLock<OrderBook>>,
}

impl BookManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a reference to the book for `symbol`, creating an empty one
    /// if this is the first order ever submitted for it.
    pub fn get_or_create(
        &self,
        symbol: &str,
    ) -> dashmap::mapref::one::Ref<'_, Symbol, RwLock<OrderBook>> {
        self.books
            .entry(symbol.to_string())
            .or_insert_with(|| RwLock::new(OrderBook::new()));
        self.books.get(symbol).expect("just inserted")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Order, OrderStatus, OrderType};
    use std::sync::{Arc, Mutex};

    fn entry(price: i64, created_at: DateTime<Utc>, remaining: i64) -> BookEntry {
        let order_id = OrderId::new();
        let order = Arc::new(Mutex::new(Order {
            order_id,
            order_type: OrderType::Limit,
            broker_id: "b1".to_string(),
            document_number: "D1".to_string(),
            side: OrderSide::Bid,
            symbol: "AAPL".to_string(),
            price,
            quantity: remaining,
            filled_quantity: 0,
            remaining_quantity: remaining,
            cancelled_quantity: 0,
            status: OrderStatus::Pending,
            expires_at: None,
            created_at,
            cancelled_at: None,
            expired_at: None,
            trades: Vec::new(),
        }));
        BookEntry {
            price,
            created_at,
            order_id,
            order,
        }
    }

    #[test]
    fn best_bid_is_highest_price_then_earliest_time() {
        let mut book = OrderBook::new();
        let t0 = Utc::now();
        let t1 = t0 + chrono::Duration::seconds(1);
        let cheap = entry(100, t0, 1);
        let expensive_later = entry(110, t1, 1);
        let expensive_earlier = entry(110, t0, 1);
        book.insert_bid(cheap);
        book.insert_bid(expensive_later);
        let expensive_earlier_id = expensive_earlier.order_id;
        book.insert_bid(expensive_earlier);

        let best = book.best_bid().unwrap();
        assert_eq!(best.price, 110);
        assert_eq!(best.order_id, expensive_earlier_id);
    }

    #[test]
    fn best_ask_is_lowest_price_then_earliest_time() {
        let mut book = OrderBook::new();
        let t0 = Utc::now();
        let cheap = entry(100, t0, 1);
        let cheap_id = cheap.order_id;
        book.insert_ask(cheap);
        book.insert_ask(entry(105, t0, 1));

        assert_eq!(book.best_ask().unwrap().order_id, cheap_id);
    }

    #[test]
    fn remove_drops_from_index_and_side() {
        let mut book = OrderBook::new();
        let e = entry(100, Utc::now(), 1);
        let id = e.order_id;
        book.insert_bid(e);
        assert_eq!(book.bid_count(), 1);
        book.remove(id);
        assert_eq!(book.bid_count(), 0);
        assert!(book.best_bid().is_none());
    }

    #[test]
    fn remove_unknown_order_is_noop() {
        let mut book = OrderBook::new();
        book.remove(OrderId::new());
        assert_eq!(book.bid_count(), 0);
    }

    #[test]
    fn top_bids_aggregates_by_price() {
        let mut book = OrderBook::new();
        let t0 = Utc::now();
        book.insert_bid(entry(100, t0, 5));
        book.insert_bid(entry(100, t0 + chrono::Duration::seconds(1), 3));
        book.insert_bid(entry(95, t0, 2));

        let levels = book.top_bids(10);
        assert_eq!(levels.len(), 2);
        assert_eq!(levels[0].price, 100);
        assert_eq!(levels[0].total_quantity, 8);
        assert_eq!(levels[0].order_count, 2);
        assert_eq!(levels[1].price, 95);
    }

    #[test]
    fn top_levels_respects_limit() {
        let mut book = OrderBook::new();
        let t0 = Utc::now();
        for i in 0..5 {
            book.insert_bid(entry(100 - i, t0, 1));
        }
        assert_eq!(book.top_bids(2).len(), 2);
    }

    #[test]
    fn book_manager_creates_lazily_and_reuses() {
        let manager = BookManager::new();
        {
            let book = manager.get_or_create("AAPL");
            book.write().unwrap().insert_bid(entry(100, Utc::now(), 1));
        }
        let book = manager.get_or_create("AAPL");
        assert_eq!(book.read().unwrap().bid_count(), 1);
    }
}
