//! SPIFFE identity parsing and trust bundle loading
//!
//! Strict, conformance-oriented validation of SPIFFE IDs, extraction of a
//! SPIFFE identity from the leaf of an X.509 certificate chain, and loading
//! of JSON trust bundle documents. Built for consumption by a TLS
//! peer-authentication layer; this crate never performs cryptographic chain
//! verification itself.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod spiffe_id;
pub mod trust_bundle;
pub mod x509;

pub use error::{Error, Result};
pub use spiffe_id::SpiffeId;
pub use trust_bundle::{load_trust_bundle, TrustBundle};
pub use x509::{extract_spiffe_id, Certificate};
