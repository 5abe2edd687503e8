//! Certificate abstraction and SPIFFE ID extraction from certificate chains

use crate::error::{Error, Result};
use crate::spiffe_id::SpiffeId;
use tracing::trace;
use x509_parser::prelude::*;

/// An X.509 certificate held as DER bytes
///
/// Construction goes through [`Certificate::from_der`], which parses the
/// whole input, so a held value is always decodable. Equality, ordering and
/// hashing are over the DER bytes, which is what lets trust bundle sets
/// collapse byte-identical certificates.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Certificate {
    der: Vec<u8>,
}

impl Certificate {
    /// Decode DER bytes into a certificate
    ///
    /// Trailing bytes after the certificate structure are rejected, the same
    /// as partial or corrupted input.
    pub fn from_der(der: Vec<u8>) -> Result<Self> {
        let (rem, _) = X509Certificate::from_der(&der)
            .map_err(|e| Error::malformed_certificate(format!("DER parse failed: {e}")))?;
        if !rem.is_empty() {
            return Err(Error::malformed_certificate(
                "trailing bytes after certificate structure",
            ));
        }
        Ok(Certificate { der })
    }

    /// Get the raw DER bytes
    pub fn der(&self) -> &[u8] {
        &self.der
    }

    /// Get the Subject Alternative Name URI entries, in declaration order
    ///
    /// A certificate without the SAN extension, or with no URI entries in
    /// it, yields an empty list. A SAN extension that fails to decode is a
    /// [`Error::MalformedCertificate`].
    pub fn san_uris(&self) -> Result<Vec<String>> {
        // from_der succeeded at construction, so re-parsing can't fail here.
        let (_, cert) = X509Certificate::from_der(&self.der)
            .map_err(|e| Error::malformed_certificate(format!("DER parse failed: {e}")))?;

        let san = cert
            .subject_alternative_name()
            .map_err(|e| Error::malformed_certificate(format!("SAN decode failed: {e}")))?;

        let mut uris = Vec::new();
        if let Some(san) = san {
            for name in &san.value.general_names {
                if let GeneralName::URI(uri) = name {
                    uris.push((*uri).to_string());
                }
            }
        }
        Ok(uris)
    }
}

/// Extract a SPIFFE ID from the leaf certificate of a chain
///
/// Only `chain[0]` is inspected: identity must be asserted by the leaf, so
/// SPIFFE URIs carried by intermediates or issuers are never consulted.
/// When the leaf carries several SPIFFE SAN entries, the first one in
/// declaration order wins and the rest are ignored.
///
/// Returns `Ok(None)` when the leaf has no `spiffe://` SAN URI; that is the
/// normal outcome for non-SPIFFE certificates, not an error. An empty chain
/// is an [`Error::InvalidArgument`], and a leaf whose SAN extension does not
/// decode propagates as [`Error::MalformedCertificate`].
pub fn extract_spiffe_id(chain: &[Certificate]) -> Result<Option<SpiffeId>> {
    let leaf = chain
        .first()
        .ok_or_else(|| Error::InvalidArgument("CertChain can't be empty".to_string()))?;

    for uri in leaf.san_uris()? {
        if has_spiffe_scheme(&uri) {
            trace!(spiffe_id = %uri, "found SPIFFE URI in leaf certificate SAN");
            return SpiffeId::parse(&uri).map(Some);
        }
    }
    Ok(None)
}

fn has_spiffe_scheme(uri: &str) -> bool {
    let prefix = b"spiffe://";
    uri.len() >= prefix.len() && uri.as_bytes()[..prefix.len()].eq_ignore_ascii_case(prefix)
}
