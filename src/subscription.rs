//! Subscription set model.
//!
//! A [`SubscriptionSet`] is compared by per-channel set equality, not by
//! the order symbols were added in — two clients that ask for the same
//! symbols in a different order are subscribed to the same thing.

use std::collections::BTreeSet;

/// The desired or committed set of symbols per channel.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct SubscriptionSet {
    pub trades: BTreeSet<String>,
    pub quotes: BTreeSet<String>,
    pub bars: BTreeSet<String>,
    pub daily_bars: BTreeSet<String>,
    pub statuses: BTreeSet<String>,
}

impl SubscriptionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// `true` if every channel is empty.
    pub fn is_empty(&self) -> bool {
        self.trades.is_empty()
            && self.quotes.is_empty()
            && self.bars.is_empty()
            && self.daily_bars.is_empty()
            && self.statuses.is_empty()
    }

    /// Insert symbols into `trades`, upper-casing each one.
    pub fn add_trades<I: IntoIterator<Item = S>, S: AsRef<str>>(&mut self, symbols: I) {
        extend_upper(&mut self.trades, symbols);
    }

    pub fn add_quotes<I: IntoIterator<Item = S>, S: AsRef<str>>(&mut self, symbols: I) {
        extend_upper(&mut self.quotes, symbols);
    }

    pub fn add_bars<I: IntoIterator<Item = S>, S: AsRef<str>>(&mut self, symbols: I) {
        extend_upper(&mut self.bars, symbols);
    }

    pub fn add_daily_bars<I: IntoIterator<Item = S>, S: AsRef<str>>(&mut self, symbols: I) {
        extend_upper(&mut self.daily_bars, symbols);
    }

    pub fn add_statuses<I: IntoIterator<Item = S>, S: AsRef<str>>(&mut self, symbols: I) {
        extend_upper(&mut self.statuses, symbols);
    }

    /// Compute the per-channel symbols present in `self` but not in
    /// `other` — i.e. what must be sent to turn `other` into `self`.
    pub fn difference(&self, other: &SubscriptionSet) -> SubscriptionSet {
        SubscriptionSet {
            trades: self.trades.difference(&other.trades).cloned().collect(),
            quotes: self.quotes.difference(&other.quotes).cloned().collect(),
            bars: self.bars.difference(&other.bars).cloned().collect(),
            daily_bars: self
                .daily_bars
                .difference(&other.daily_bars)
                .cloned()
                .collect(),
            statuses: self
                .statuses
                .difference(&other.statuses)
                .cloned()
                .collect(),
        }
    }

    /// Merge another set's symbols into `self`, per channel.
    pub fn union_delta(&mut self, added: &SubscriptionSet) {
        self.trades.extend(added.trades.iter().cloned());
        self.quotes.extend(added.quotes.iter().cloned());
        self.bars.extend(added.bars.iter().cloned());
        self.daily_bars.extend(added.daily_bars.iter().cloned());
        self.statuses.extend(added.statuses.iter().cloned());
    }

    /// Remove another set's symbols from `self`, per channel.
    pub fn subtract_delta(&mut self, removed: &SubscriptionSet) {
        for s in &removed.trades {
            self.trades.remove(s);
        }
        for s in &removed.quotes {
            self.quotes.remove(s);
        }
        for s in &removed.bars {
            self.bars.remove(s);
        }
        for s in &removed.daily_bars {
            self.daily_bars.remove(s);
        }
        for s in &removed.statuses {
            self.statuses.remove(s);
        }
    }
}

fn extend_upper<I: IntoIterator<Item = S>, S: AsRef<str>>(set: &mut BTreeSet<String>, symbols: I) {
    for sym in symbols {
        set.insert(sym.as_ref().to_uppercase());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equality_is_order_independent() {
        let mut a = SubscriptionSet::new();
        a.add_trades(["AAPL", "MSFT"]);
        let mut b = SubscriptionSet::new();
        b.add_trades(["MSFT", "AAPL"]);
        assert_eq!(a, b);
    }

    #[test]
    fn symbols_are_upper_cased() {
        let mut s = SubscriptionSet::new();
        s.add_quotes(["aapl"]);
        assert!(s.quotes.contains("AAPL"));
    }

    #[test]
    fn difference_computes_added_symbols() {
        let mut desired = SubscriptionSet::new();
        desired.add_trades(["AAPL", "MSFT"]);
        let mut committed = SubscriptionSet::new();
        committed.add_trades(["AAPL"]);
        let delta = desired.difference(&committed);
        assert!(delta.trades.contains("MSFT"));
        assert!(!delta.trades.contains("AAPL"));
    }

    #[test]
    fn union_then_subtract_round_trips() {
        let mut set = SubscriptionSet::new();
        let mut added = SubscriptionSet::new();
        added.add_bars(["TSLA"]);
        set.union_delta(&added);
        assert!(set.bars.contains("TSLA"));
        set.subtract_delta(&added);
        assert!(set.bars.is_empty());
    }

    #[test]
    fn empty_set_is_empty() {
        assert!(SubscriptionSet::new().is_empty());
        let mut s = SubscriptionSet::new();
        s.add_statuses(["AAPL"]);
        assert!(!s.is_empty());
    }
}
