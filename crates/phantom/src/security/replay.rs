//! Nonce based protection against replayed datagrams
//!
//! Every accepted frame carries a random 12-byte nonce. The filter remembers
//! recently seen nonces and reports duplicates, so a captured datagram cannot
//! be played back at the server within the retention horizon. The map is
//! consulted before any decryption work: a lookup is roughly an order of
//! magnitude cheaper than the three-way trial decrypt it short-circuits.

use std::time::{Duration, Instant};

use dashmap::{mapref::entry::Entry, DashMap};

use crate::crypto::NONCE_SIZE;

/// How long a seen nonce is remembered. A legitimate retransmission can only
/// arrive within the clock-skew tolerance plus network delay; two minutes
/// bounds the cache at `packet_rate x 120s` entries.
pub const NONCE_RETENTION: Duration = Duration::from_secs(120);

/// Period of the janitor's eviction scan
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// A protector against replayed datagrams.
///
/// Shared between all packet workers and the janitor task. The map is
/// sharded, so the janitor's scan never blocks concurrent inserts globally.
pub struct ReplayProtector {
    seen_nonces: DashMap<[u8; NONCE_SIZE], Instant>,
}

impl ReplayProtector {
    /// Creates an empty protector
    pub fn new() -> ReplayProtector {
        ReplayProtector {
            seen_nonces: DashMap::new(),
        }
    }

    /// Checks if `nonce` was already observed, remembering it if not.
    ///
    /// Returns `true` for duplicates.
    #[inline]
    pub fn check_nonce_and_set(&self, nonce: &[u8; NONCE_SIZE]) -> bool {
        match self.seen_nonces.entry(*nonce) {
            Entry::Occupied(..) => true,
            Entry::Vacant(entry) => {
                entry.insert(Instant::now());
                false
            }
        }
    }

    /// Drops entries first seen longer than `retention` ago
    pub fn purge_older_than(&self, retention: Duration) {
        let now = Instant::now();
        self.seen_nonces
            .retain(|_, first_seen| now.duration_since(*first_seen) <= retention);
    }

    /// Number of remembered nonces
    pub fn len(&self) -> usize {
        self.seen_nonces.len()
    }

    /// Whether no nonce is currently remembered
    pub fn is_empty(&self) -> bool {
        self.seen_nonces.is_empty()
    }
}

impl Default for ReplayProtector {
    fn default() -> ReplayProtector {
        ReplayProtector::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_observation_is_fresh_second_is_duplicate() {
        let protector = ReplayProtector::new();
        let nonce = [0x42u8; NONCE_SIZE];

        assert!(!protector.check_nonce_and_set(&nonce));
        assert!(protector.check_nonce_and_set(&nonce));
        assert!(protector.check_nonce_and_set(&nonce));
    }

    #[test]
    fn distinct_nonces_are_independent() {
        let protector = ReplayProtector::new();

        assert!(!protector.check_nonce_and_set(&[1u8; NONCE_SIZE]));
        assert!(!protector.check_nonce_and_set(&[2u8; NONCE_SIZE]));
        assert_eq!(protector.len(), 2);
    }

    #[test]
    fn purge_evicts_expired_entries() {
        let protector = ReplayProtector::new();
        protector.check_nonce_and_set(&[1u8; NONCE_SIZE]);
        protector.check_nonce_and_set(&[2u8; NONCE_SIZE]);

        // Nothing is older than the real retention yet
        protector.purge_older_than(NONCE_RETENTION);
        assert_eq!(protector.len(), 2);

        // With a zero horizon everything has expired
        std::thread::sleep(Duration::from_millis(5));
        protector.purge_older_than(Duration::ZERO);
        assert!(protector.is_empty());

        // A purged nonce counts as fresh again
        assert!(!protector.check_nonce_and_set(&[1u8; NONCE_SIZE]));
    }
}
