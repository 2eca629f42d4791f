use tinylink_core::error::Result;
use tinylink_core::{ShortCode, StorageError};
use tinylink_generator::Generator;
use tracing::{trace, warn};

/// Default bound on code generation attempts per save.
///
/// With 62^8 possible codes a handful of collisions in a row means the
/// generator is broken or the keyspace is nearly full.
pub const MAX_ALLOCATION_ATTEMPTS: usize = 64;

/// Draws candidates from `generator` until `is_taken` reports a free code.
///
/// `is_taken` must see tombstones as taken: codes are never reused. The
/// caller holds whatever lock makes the check and the following insert
/// atomic.
pub(crate) fn allocate<G, F>(generator: &G, max_attempts: usize, mut is_taken: F) -> Result<ShortCode>
where
    G: Generator + ?Sized,
    F: FnMut(&ShortCode) -> bool,
{
    let attempts = max_attempts.max(1);

    for attempt in 1..=attempts {
        let candidate = generator.generate();
        if !is_taken(&candidate) {
            return Ok(candidate);
        }
        trace!(code = %candidate, attempt, "short code collision, regenerating");
    }

    warn!(attempts, "gave up allocating a short code");
    Err(StorageError::ExhaustedKeyspace { attempts })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use tinylink_generator::SeqGenerator;

    struct FixedGenerator(&'static str);

    impl Generator for FixedGenerator {
        fn generate(&self) -> ShortCode {
            ShortCode::new_unchecked(self.0)
        }
    }

    #[test]
    fn returns_first_free_candidate() {
        let generator = SeqGenerator::with_prefix("c");
        let taken: HashSet<&str> = ["c000000", "c000001"].into_iter().collect();

        let code = allocate(&generator, 8, |c| taken.contains(c.as_str())).unwrap();
        assert_eq!(code.as_str(), "c000002");
    }

    #[test]
    fn exhausts_after_bound() {
        let generator = FixedGenerator("same");
        let mut calls = 0;

        let err = allocate(&generator, 5, |_| {
            calls += 1;
            true
        })
        .unwrap_err();

        assert!(matches!(err, StorageError::ExhaustedKeyspace { attempts: 5 }));
        assert_eq!(calls, 5);
    }

    #[test]
    fn zero_bound_still_tries_once() {
        let generator = FixedGenerator("free");
        let code = allocate(&generator, 0, |_| false).unwrap();
        assert_eq!(code.as_str(), "free");
    }
}
