//! Time-ordered key history supporting point-in-time lookup and rotation.
//!
//! A [`KeyChain`] is an immutable, non-empty sequence of `(effective time,
//! key)` items, strictly descending by time. Rotation never mutates: `add`
//! returns a new chain, so a host process publishes rotations by swapping an
//! `Arc<KeyChain<K>>` — concurrent readers always see either the old chain
//! or the new one, never a partial state.

use std::fmt;

use crate::time::Time;

/// How long superseded keys stay resolvable after a rotation.
pub const RETENTION: i64 = 2 * Time::YEAR;

/// Clock-skew guard: how far in the future a new key's effective time may
/// lie.
pub const MAX_FUTURE_SKEW: i64 = Time::YEAR;

/// Precondition violations on key-chain operations. These indicate caller
/// defects, not recoverable conditions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyChainError {
    /// `get_key` was asked for a time before the oldest retained key.
    QueryBeforeOldest { queried: Time, oldest: Time },
    /// `add` was given a time not strictly newer than the current head.
    OutOfOrder { time: Time, newest: Time },
    /// `add` was given a time more than [`MAX_FUTURE_SKEW`] ahead of now.
    TooFarAhead { time: Time, now: Time },
}

impl fmt::Display for KeyChainError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            KeyChainError::QueryBeforeOldest { queried, oldest } => write!(
                f,
                "Queried key at {}, but the oldest retained key is from {}",
                queried, oldest
            ),
            KeyChainError::OutOfOrder { time, newest } => write!(
                f,
                "New key at {} is not strictly newer than the chain head at {}",
                time, newest
            ),
            KeyChainError::TooFarAhead { time, now } => write!(
                f,
                "New key at {} is more than a year ahead of the current time {}",
                time, now
            ),
        }
    }
}

impl std::error::Error for KeyChainError {}

/// Ordered, newest-first history of `(effective time, key)` pairs for one
/// owner.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyChain<K> {
    // Invariant: non-empty, strictly descending by time.
    items: Vec<(Time, K)>,
}

impl<K: Clone> KeyChain<K> {
    /// Start a chain with its first key.
    pub fn new(time: Time, key: K) -> KeyChain<K> {
        KeyChain {
            items: vec![(time, key)],
        }
    }

    /// Effective time of the newest key.
    pub fn newest_time(&self) -> Time {
        self.items[0].0
    }

    /// Effective time of the oldest retained key.
    pub fn oldest_time(&self) -> Time {
        self.items[self.items.len() - 1].0
    }

    /// All items, newest first.
    pub fn items(&self) -> &[(Time, K)] {
        &self.items
    }

    /// The key active at `time`: the newest item whose effective time is at
    /// or before `time`. A key that became active after `time` is never
    /// selected. Fails if `time` precedes the oldest retained key.
    pub fn get_key(&self, time: Time) -> Result<&K, KeyChainError> {
        self.items
            .iter()
            .find(|(effective, _)| *effective <= time)
            .map(|(_, key)| key)
            .ok_or(KeyChainError::QueryBeforeOldest {
                queried: time,
                oldest: self.oldest_time(),
            })
    }

    /// Rotate in a new key effective at `time`, returning a new chain. The
    /// current chain is unmodified. `time` must be strictly newer than the
    /// head and at most [`MAX_FUTURE_SKEW`] in the future; items older than
    /// the [`RETENTION`] cutoff (measured from `time`) are dropped.
    pub fn add(&self, time: Time, key: K) -> Result<KeyChain<K>, KeyChainError> {
        self.add_at(time, key, Time::now())
    }

    fn add_at(&self, time: Time, key: K, now: Time) -> Result<KeyChain<K>, KeyChainError> {
        if time <= self.newest_time() {
            return Err(KeyChainError::OutOfOrder {
                time,
                newest: self.newest_time(),
            });
        }
        if time - now > MAX_FUTURE_SKEW {
            return Err(KeyChainError::TooFarAhead { time, now });
        }
        let cutoff = time - RETENTION;
        let mut items = Vec::with_capacity(self.items.len() + 1);
        items.push((time, key));
        items.extend(
            self.items
                .iter()
                .take_while(|(effective, _)| *effective >= cutoff)
                .cloned(),
        );
        Ok(KeyChain { items })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(years_ago: f64) -> Time {
        Time::now() - (years_ago * Time::YEAR as f64) as i64
    }

    #[test]
    fn get_key_picks_newest_at_or_before() {
        let t0 = t(1.5);
        let chain = KeyChain::new(t0, "k1");
        let chain = chain.add(t0 + Time::DAY, "k2").unwrap();
        let chain = chain.add(t0 + 10 * Time::DAY, "k3").unwrap();

        assert_eq!(*chain.get_key(t0).unwrap(), "k1");
        assert_eq!(*chain.get_key(t0 + Time::HOUR).unwrap(), "k1");
        assert_eq!(*chain.get_key(t0 + Time::DAY).unwrap(), "k2");
        assert_eq!(*chain.get_key(t0 + 5 * Time::DAY).unwrap(), "k2");
        assert_eq!(*chain.get_key(t0 + Time::YEAR).unwrap(), "k3");
    }

    #[test]
    fn get_key_before_oldest_fails() {
        let t0 = t(1.0);
        let chain = KeyChain::new(t0, "k1");
        assert_eq!(
            chain.get_key(t0 - 1),
            Err(KeyChainError::QueryBeforeOldest {
                queried: t0 - 1,
                oldest: t0,
            })
        );
    }

    #[test]
    fn add_keeps_strict_descending_order() {
        let t0 = t(1.9);
        let mut chain = KeyChain::new(t0, 0u32);
        for i in 1..20u32 {
            chain = chain.add(t0 + i as i64 * 30 * Time::DAY, i).unwrap();
        }
        let times: Vec<Time> = chain.items().iter().map(|(time, _)| *time).collect();
        for pair in times.windows(2) {
            assert!(pair[0] > pair[1], "chain not strictly descending");
        }
    }

    #[test]
    fn add_out_of_order_fails() {
        let t0 = t(0.5);
        let chain = KeyChain::new(t0, "k1");
        assert!(matches!(
            chain.add(t0, "k2"),
            Err(KeyChainError::OutOfOrder { .. })
        ));
        assert!(matches!(
            chain.add(t0 - Time::DAY, "k2"),
            Err(KeyChainError::OutOfOrder { .. })
        ));
    }

    #[test]
    fn add_too_far_ahead_fails() {
        let chain = KeyChain::new(Time::now(), "k1");
        assert!(matches!(
            chain.add(Time::now() + MAX_FUTURE_SKEW + Time::DAY, "k2"),
            Err(KeyChainError::TooFarAhead { .. })
        ));
    }

    #[test]
    fn add_prunes_past_retention() {
        // A key three years older than the new head is past the two-year
        // retention cutoff and gets dropped.
        let t0 = t(3.0) + Time::DAY;
        let chain = KeyChain::new(t0, "k1");
        let rotated = chain.add(t0 + 3 * Time::YEAR, "k3").unwrap();
        assert_eq!(rotated.items().len(), 1);
        assert_eq!(rotated.items()[0].1, "k3");
        // The original chain is untouched.
        assert_eq!(chain.items().len(), 1);
        assert_eq!(chain.items()[0].1, "k1");
    }

    #[test]
    fn add_retains_within_retention() {
        let t0 = t(1.5);
        let chain = KeyChain::new(t0, "k1");
        let rotated = chain.add(t0 + Time::YEAR, "k2").unwrap();
        assert_eq!(rotated.items().len(), 2);
        assert_eq!(*rotated.get_key(t0 + Time::DAY).unwrap(), "k1");
    }

    #[test]
    fn never_empty_after_rotation() {
        let t0 = t(2.9);
        let mut chain = KeyChain::new(t0, 0u32);
        for i in 1..4u32 {
            chain = chain.add(t0 + i as i64 * Time::YEAR - Time::DAY, i).unwrap();
        }
        assert!(!chain.items().is_empty());
    }
}
