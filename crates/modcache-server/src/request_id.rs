//! Per-request identifiers attached to the tracing span for the lifetime of
//! a request, replacing the Go original's global `logrus`-style logger with
//! a structured, non-global observer (see Design Notes on this).

use std::hash::{BuildHasher, Hasher};

/// Generates a random 64-bit id, rendered as lowercase hex.
///
/// `std::collections::hash_map::RandomState` seeds itself from the OS RNG on
/// construction; hashing nothing through it yields a cheap source of
/// randomness without pulling in a dedicated RNG crate for one log field.
#[must_use]
pub fn generate() -> String {
    let state = std::collections::hash_map::RandomState::new();
    let id = state.build_hasher().finish();
    format!("{id:016x}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generates_sixteen_hex_digits() {
        let id = generate();
        assert_eq!(id.len(), 16);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn successive_ids_differ() {
        assert_ne!(generate(), generate());
    }
}
