//! Helpers shared by the store features

use rand::distributions::Uniform;
use rand::Rng;

const DATABASE_NAME_LEN: usize = 15;

/// Random lowercase name for isolating a scenario's data in a shared store
pub fn random_database() -> String {
    rand::thread_rng()
        .sample_iter(Uniform::new_inclusive(b'a', b'z'))
        .take(DATABASE_NAME_LEN)
        .map(char::from)
        .collect()
}
