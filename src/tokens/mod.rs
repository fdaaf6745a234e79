pub mod generator;
pub mod nonce;

pub use generator::generate_hex;
pub use nonce::{NonceError, NonceGuard, NonceRegistry};
