//! Long-term validation: collecting certificates and revocation data
//! for a token, completing them over the network, and writing the
//! document security store.

pub mod dss;
pub mod extract;
pub mod fetch;

pub use dss::{write_dss, VriEntry};
pub use extract::extract_ltv;
pub use fetch::LtvFetcher;
