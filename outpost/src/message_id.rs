//! Message-ID allocation.
//!
//! Identifiers look like `<1718000000.2891336453.42@example.com>`: the unix
//! timestamp, a random number and a per-service counter. The counter starts
//! somewhere in `1..=16` and advances by a random `0..=15` on every call,
//! wrapping at `u16::MAX`. Uniqueness is probabilistic.

use parking_lot::Mutex;
use rand::{Rng, SeedableRng, rngs::StdRng};

struct State {
    counter: u16,
    rng: StdRng,
}

/// Produces Message-IDs for one sending domain. Safe to share between tasks.
pub struct MessageIdGenerator {
    domain: String,
    state: Mutex<State>,
}

impl MessageIdGenerator {
    /// Creates a generator seeded from the operating system.
    #[must_use]
    pub fn new(domain: impl Into<String>) -> Self {
        Self::with_rng(domain, StdRng::from_os_rng())
    }

    #[must_use]
    pub fn with_rng(domain: impl Into<String>, mut rng: StdRng) -> Self {
        let counter = rng.random_range(1..=16);
        Self {
            domain: domain.into(),
            state: Mutex::new(State { counter, rng }),
        }
    }

    /// Returns the current counter value and a random number, then advances
    /// the counter.
    pub fn next_sequence(&self) -> (u16, u32) {
        let mut state = self.state.lock();
        let current = state.counter;
        let step = state.rng.random_range(0..16);
        state.counter = current.wrapping_add(step);
        let random = state.rng.random::<u32>();
        (current, random)
    }

    /// Allocates the next Message-ID, angle brackets included.
    #[must_use]
    pub fn generate(&self) -> String {
        let (counter, random) = self.next_sequence();
        let timestamp = chrono::Utc::now().timestamp();
        format!("<{timestamp}.{random}.{counter}@{}>", self.domain)
    }
}

impl std::fmt::Debug for MessageIdGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageIdGenerator")
            .field("domain", &self.domain)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, thread};

    use super::*;

    #[test]
    fn test_counter_starts_low_and_steps_by_at_most_fifteen() {
        for seed in 0..50 {
            let generator = MessageIdGenerator::with_rng("example.com", StdRng::seed_from_u64(seed));
            let (first, _) = generator.next_sequence();
            assert!((1..=16).contains(&first), "seed {seed}: {first}");

            let mut previous = first;
            for _ in 0..100 {
                let (current, _) = generator.next_sequence();
                assert!(current.wrapping_sub(previous) <= 15);
                previous = current;
            }
        }
    }

    #[test]
    fn test_counter_wraps() {
        let generator = MessageIdGenerator::with_rng("example.com", StdRng::seed_from_u64(7));
        generator.state.lock().counter = u16::MAX - 2;

        let mut previous = generator.next_sequence().0;
        for _ in 0..20 {
            let current = generator.next_sequence().0;
            assert!(current.wrapping_sub(previous) <= 15);
            previous = current;
        }
    }

    #[test]
    fn test_generate_format() {
        let generator = MessageIdGenerator::new("mail.example.com");
        let id = generator.generate();

        let inner = id
            .strip_prefix('<')
            .and_then(|s| s.strip_suffix('>'))
            .unwrap();
        let (local, domain) = inner.split_once('@').unwrap();
        assert_eq!(domain, "mail.example.com");

        let parts: Vec<&str> = local.split('.').collect();
        assert_eq!(parts.len(), 3);
        assert!(parts[0].parse::<i64>().unwrap() > 1_600_000_000);
        assert!(parts[1].parse::<u32>().is_ok());
        assert!(parts[2].parse::<u16>().is_ok());
    }

    #[test]
    fn test_concurrent_callers_each_get_a_value() {
        let generator = Arc::new(MessageIdGenerator::new("example.com"));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let generator = Arc::clone(&generator);
                thread::spawn(move || (0..100).map(|_| generator.generate()).count())
            })
            .collect();

        let total: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(total, 800);
    }
}
