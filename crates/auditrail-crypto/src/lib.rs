pub mod hash;
pub mod signer;

pub use hash::chain_hash;
pub use signer::{verify_with_key, Signer};
