pub mod random;
pub mod seq;

pub use random::RandomGenerator;
pub use seq::SeqGenerator;

use std::sync::Arc;
use tinylink_core::ShortCode;

/// Trait for generating short codes.
///
/// Implementations are pure generators that don't interact with storage.
/// Generation never fails; avoiding collisions with stored codes is the
/// caller's job.
pub trait Generator: Send + Sync + 'static {
    /// Produces the next candidate short code.
    fn generate(&self) -> ShortCode;
}

impl<G: Generator> Generator for Arc<G> {
    fn generate(&self) -> ShortCode {
        (**self).generate()
    }
}
