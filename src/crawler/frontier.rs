//! Per-site crawl frontier
//!
//! Pops are random but strongly biased toward the front: the index is the
//! frontier length scaled by the product of two uniform draws. Discovery is
//! roughly breadth-first without a fully predictable visiting order.

use rand::Rng;
use std::collections::HashSet;

/// One frontier entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrontierEntry {
    /// Page the link was found on (the seed for the seed itself)
    pub parent: String,
    pub url: String,
    pub depth: usize,
}

/// URLs waiting to be audited for one site, plus every URL ever pushed
#[derive(Debug, Default)]
pub struct Frontier {
    entries: Vec<FrontierEntry>,
    visited: HashSet<String>,
}

impl Frontier {
    /// A frontier holding only the seed at depth 0
    pub fn seeded(seed: &str) -> Self {
        let mut frontier = Self::default();
        frontier.push(seed, seed, 0);
        frontier
    }

    /// Queues `url` unless it was pushed before
    ///
    /// The URL is marked visited here, not when popped, so a link found on
    /// several pages is only queued once. Returns true if it was queued.
    pub fn push(&mut self, parent: &str, url: &str, depth: usize) -> bool {
        if !self.visited.insert(url.to_string()) {
            return false;
        }
        self.entries.push(FrontierEntry {
            parent: parent.to_string(),
            url: url.to_string(),
            depth,
        });
        true
    }

    /// Removes a front-biased random entry
    pub fn pop<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Option<FrontierEntry> {
        if self.entries.is_empty() {
            return None;
        }
        let index = biased_index(self.entries.len(), rng.gen::<f64>(), rng.gen::<f64>());
        Some(self.entries.swap_remove(index))
    }

    pub fn has_visited(&self, url: &str) -> bool {
        self.visited.contains(url)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of distinct URLs ever pushed
    pub fn visited_count(&self) -> usize {
        self.visited.len()
    }
}

/// `floor(len * r1 * r2)` for draws in `[0, 1)`, clamped into range
fn biased_index(len: usize, r1: f64, r2: f64) -> usize {
    let index = (len as f64 * r1 * r2) as usize;
    index.min(len - 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_seeded_frontier() {
        let frontier = Frontier::seeded("https://example.gov/");
        assert_eq!(frontier.len(), 1);
        assert!(frontier.has_visited("https://example.gov/"));
    }

    #[test]
    fn test_duplicate_push_pops_once() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut frontier = Frontier::default();

        assert!(frontier.push("p", "https://example.gov/a", 1));
        assert!(!frontier.push("p", "https://example.gov/a", 1));

        assert!(frontier.pop(&mut rng).is_some());
        assert!(frontier.pop(&mut rng).is_none());
    }

    #[test]
    fn test_popped_url_is_not_requeued() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut frontier = Frontier::seeded("https://example.gov/");
        let entry = frontier.pop(&mut rng).unwrap();

        assert_eq!(entry.depth, 0);
        assert_eq!(entry.parent, "https://example.gov/");
        assert!(!frontier.push(&entry.url, "https://example.gov/", 1));
        assert!(frontier.is_empty());
    }

    #[test]
    fn test_every_entry_pops_exactly_once() {
        let mut rng = StdRng::seed_from_u64(42);
        let mut frontier = Frontier::default();
        for i in 0..50 {
            frontier.push("p", &format!("https://example.gov/{}", i), 1);
        }

        let mut seen = HashSet::new();
        while let Some(entry) = frontier.pop(&mut rng) {
            assert!(seen.insert(entry.url));
        }
        assert_eq!(seen.len(), 50);
        assert_eq!(frontier.visited_count(), 50);
    }

    #[test]
    fn test_biased_index() {
        assert_eq!(biased_index(10, 0.0, 0.9), 0);
        assert_eq!(biased_index(10, 0.5, 0.5), 2);
        assert_eq!(biased_index(10, 0.99, 0.99), 9);
        assert_eq!(biased_index(1, 0.99, 0.99), 0);
    }

    #[test]
    fn test_pop_favours_front() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut front = 0;
        for _ in 0..1000 {
            let index = biased_index(100, rng.gen(), rng.gen());
            if index < 50 {
                front += 1;
            }
        }
        // P(r1 * r2 < 0.5) is about 0.85
        assert!(front > 750, "front-half pops: {}", front);
    }
}
