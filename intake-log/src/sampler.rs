use std::sync::atomic::{AtomicU64, Ordering};

/// Admits every n-th occurrence of a repeated event.
///
/// The first occurrence is always admitted. This is used to log failures on hot paths without
/// flooding the log under sustained error conditions. The sampler is lock-free and can be shared
/// between threads or placed in a `static`.
#[derive(Debug)]
pub struct Sampler {
    every: u64,
    count: AtomicU64,
}

impl Sampler {
    /// Creates a sampler admitting one in `every` occurrences.
    ///
    /// A value of `0` is treated like `1`, which admits every occurrence.
    pub const fn new(every: u64) -> Self {
        Self {
            every: if every == 0 { 1 } else { every },
            count: AtomicU64::new(0),
        }
    }

    /// Records an occurrence.
    ///
    /// Returns the total number of occurrences recorded so far if this one is admitted.
    pub fn sample(&self) -> Option<u64> {
        let seen = self.count.fetch_add(1, Ordering::Relaxed);
        (seen % self.every == 0).then_some(seen + 1)
    }

    /// Returns the total number of recorded occurrences.
    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admits_first_and_every_nth() {
        let sampler = Sampler::new(3);
        let admitted: Vec<_> = (0..7).map(|_| sampler.sample()).collect();
        assert_eq!(
            admitted,
            [Some(1), None, None, Some(4), None, None, Some(7)]
        );
        assert_eq!(sampler.count(), 7);
    }

    #[test]
    fn test_zero_admits_all() {
        let sampler = Sampler::new(0);
        assert!((0..5).all(|_| sampler.sample().is_some()));
    }
}
