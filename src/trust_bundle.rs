//! Trust bundle loading for SPIFFE
//!
//! A trust bundle document is a JSON object with a mandatory `trust_domains`
//! object mapping trust domain names to entries. Each entry optionally holds
//! a `keys` array of JWK-shaped objects whose `x5c` arrays carry base64 DER
//! certificates, plus an optional `spiffe_sequence` freshness counter.
//! Unknown fields at any level are ignored, so future metadata does not fail
//! the load.

use crate::error::{Error, Result};
use crate::x509::Certificate;
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::io;
use std::path::Path;
use tracing::debug;

const TRUST_DOMAINS_FIELD: &str = "trust_domains";
const KEYS_FIELD: &str = "keys";
const CERT_CHAIN_FIELD: &str = "x5c";
const SEQUENCE_FIELD: &str = "spiffe_sequence";

/// Trust anchor material for one or more trust domains, loaded from a
/// bundle document
///
/// Built atomically by [`load_trust_bundle`]: a load either returns a fully
/// populated value or fails. Every key of [`sequence_numbers`] also appears
/// in [`trust_bundle_map`]; the reverse does not hold, since a domain may
/// omit its sequence number.
///
/// [`sequence_numbers`]: TrustBundle::sequence_numbers
/// [`trust_bundle_map`]: TrustBundle::trust_bundle_map
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TrustBundle {
    trust_bundle_map: HashMap<String, BTreeSet<Certificate>>,
    sequence_numbers: HashMap<String, u64>,
}

impl TrustBundle {
    /// Get the per-domain certificate sets
    ///
    /// Every domain named by the source document is present, mapped to its
    /// deduplicated certificates; a domain without key material maps to an
    /// empty set.
    pub fn trust_bundle_map(&self) -> &HashMap<String, BTreeSet<Certificate>> {
        &self.trust_bundle_map
    }

    /// Get the per-domain sequence numbers
    ///
    /// Only domains whose entry carried a `spiffe_sequence` field appear.
    pub fn sequence_numbers(&self) -> &HashMap<String, u64> {
        &self.sequence_numbers
    }

    /// Get the certificate set for a trust domain, if the bundle covers it
    pub fn certificates(&self, trust_domain: &str) -> Option<&BTreeSet<Certificate>> {
        self.trust_bundle_map.get(trust_domain)
    }

    /// Get the sequence number for a trust domain, if one was specified
    pub fn sequence_number(&self, trust_domain: &str) -> Option<u64> {
        self.sequence_numbers.get(trust_domain).copied()
    }
}

/// Load and validate a SPIFFE trust bundle document from a file
///
/// Performs one blocking read of the whole file, validates the JSON shape,
/// then materializes every `x5c` blob into a [`Certificate`]. The two stages
/// fail distinguishably: shape problems surface as
/// [`Error::InvalidFormat`] / [`Error::MissingField`], while base64 or DER
/// problems surface as [`Error::MalformedCertificate`]. Any failure aborts
/// the load; no partial bundle is ever returned.
///
/// A nonexistent file is [`Error::FileNotFound`] carrying the requested
/// path; other file-system failures propagate as [`Error::Io`].
pub fn load_trust_bundle(path: impl AsRef<Path>) -> Result<TrustBundle> {
    let path = path.as_ref();
    let bytes = fs::read(path).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => Error::FileNotFound(path.display().to_string()),
        _ => Error::Io(e),
    })?;

    let document: Value = serde_json::from_slice(&bytes).map_err(|e| {
        Error::invalid_format(format!(
            "SPIFFE Trust Bundle should be a JSON object. Parsing failed: {e}"
        ))
    })?;
    let root = document.as_object().ok_or_else(|| {
        Error::invalid_format(format!(
            "SPIFFE Trust Bundle should be a JSON object. Found: {}",
            json_type_name(&document)
        ))
    })?;

    let trust_domains = root
        .get(TRUST_DOMAINS_FIELD)
        .ok_or_else(|| Error::MissingField("Mandatory trust_domains element is missing".into()))?
        .as_object()
        .ok_or_else(|| Error::invalid_format("trust_domains element should be a JSON object"))?;

    let mut trust_bundle_map = HashMap::new();
    let mut sequence_numbers = HashMap::new();
    for (domain_name, domain_entry) in trust_domains {
        let entry = domain_entry.as_object().ok_or_else(|| {
            Error::invalid_format(format!(
                "trust domain '{domain_name}' entry should be a JSON object"
            ))
        })?;

        if let Some(sequence) = domain_sequence_number(domain_name, entry)? {
            sequence_numbers.insert(domain_name.clone(), sequence);
        }
        let certificates = domain_certificates(domain_name, entry)?;
        trust_bundle_map.insert(domain_name.clone(), certificates);
    }

    debug!(
        domains = trust_bundle_map.len(),
        path = %path.display(),
        "loaded SPIFFE trust bundle"
    );
    Ok(TrustBundle {
        trust_bundle_map,
        sequence_numbers,
    })
}

fn domain_sequence_number(
    domain_name: &str,
    entry: &serde_json::Map<String, Value>,
) -> Result<Option<u64>> {
    match entry.get(SEQUENCE_FIELD) {
        None => Ok(None),
        Some(value) => value.as_u64().map(Some).ok_or_else(|| {
            Error::invalid_format(format!(
                "spiffe_sequence for trust domain '{domain_name}' should be a non-negative integer"
            ))
        }),
    }
}

/// Materialize the certificates of one domain entry into a deduplicated set.
/// A missing or empty `keys` array yields an empty set.
fn domain_certificates(
    domain_name: &str,
    entry: &serde_json::Map<String, Value>,
) -> Result<BTreeSet<Certificate>> {
    use base64::engine::general_purpose::STANDARD as BASE64;
    use base64::Engine as _;

    let mut certificates = BTreeSet::new();
    let Some(keys) = entry.get(KEYS_FIELD) else {
        return Ok(certificates);
    };
    let keys = keys.as_array().ok_or_else(|| {
        Error::invalid_format(format!(
            "keys element of trust domain '{domain_name}' should be a JSON array"
        ))
    })?;

    for key in keys {
        let key = key.as_object().ok_or_else(|| {
            Error::invalid_format(format!(
                "key entry of trust domain '{domain_name}' should be a JSON object"
            ))
        })?;
        let Some(chain) = key.get(CERT_CHAIN_FIELD) else {
            continue;
        };
        let chain = chain.as_array().ok_or_else(|| {
            Error::invalid_format(format!(
                "x5c element of trust domain '{domain_name}' should be a JSON array"
            ))
        })?;

        for blob in chain {
            let blob = blob.as_str().ok_or_else(|| {
                Error::invalid_format(format!(
                    "x5c entries of trust domain '{domain_name}' should be strings"
                ))
            })?;
            let der = BASE64.decode(blob).map_err(|e| {
                Error::malformed_certificate(format!(
                    "invalid x5c base64 for trust domain '{domain_name}': {e}"
                ))
            })?;
            certificates.insert(Certificate::from_der(der)?);
        }
    }
    Ok(certificates)
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::x509::extract_spiffe_id;
    use rcgen::{CertificateParams, SanType};
    use serde_json::json;
    use tempfile::NamedTempFile;

    fn write_bundle(contents: &str) -> NamedTempFile {
        let file = NamedTempFile::new().unwrap();
        fs::write(file.path(), contents).unwrap();
        file
    }

    fn spiffe_cert_b64(uri: &str) -> String {
        use base64::engine::general_purpose::STANDARD as BASE64;
        use base64::Engine as _;

        let mut params = CertificateParams::default();
        params.subject_alt_names = vec![SanType::URI(uri.to_string())];
        let cert = rcgen::Certificate::from_params(params).unwrap();
        BASE64.encode(cert.serialize_der().unwrap())
    }

    #[test]
    fn test_load_well_formed_bundle() {
        let cert = spiffe_cert_b64("spiffe://foo.bar.com/client/workload/1");
        let document = json!({
            "trust_domains": {
                "google.com": {"spiffe_sequence": 123},
                "test.google.com": {"spiffe_sequence": 123, "keys": []},
                "test.google.com.au": {},
                "example.com": {
                    "spiffe_sequence": 12035488,
                    "keys": [{"use": "x509-svid", "x5c": [cert]}],
                },
            },
            "some_future_metadata": {"ignored": true},
        });
        let file = write_bundle(&document.to_string());

        let bundle = load_trust_bundle(file.path()).unwrap();

        assert_eq!(bundle.sequence_numbers().len(), 3);
        assert_eq!(bundle.sequence_number("google.com"), Some(123));
        assert_eq!(bundle.sequence_number("test.google.com"), Some(123));
        assert_eq!(bundle.sequence_number("example.com"), Some(12035488));
        assert_eq!(bundle.sequence_number("test.google.com.au"), None);

        assert_eq!(bundle.trust_bundle_map().len(), 4);
        assert_eq!(bundle.certificates("google.com").unwrap().len(), 0);
        assert_eq!(bundle.certificates("test.google.com").unwrap().len(), 0);
        assert_eq!(bundle.certificates("test.google.com.au").unwrap().len(), 0);
        assert_eq!(bundle.certificates("example.com").unwrap().len(), 1);

        // Every domain with a sequence number is covered by the map.
        for domain in bundle.sequence_numbers().keys() {
            assert!(bundle.trust_bundle_map().contains_key(domain));
        }

        // Loaded certificates feed straight back into the extractor.
        let chain: Vec<Certificate> =
            bundle.certificates("example.com").unwrap().iter().cloned().collect();
        let id = extract_spiffe_id(&chain).unwrap().unwrap();
        assert_eq!(id.trust_domain(), "foo.bar.com");
        assert_eq!(id.path(), "/client/workload/1");
    }

    #[test]
    fn test_duplicate_certificates_collapse() {
        let cert = spiffe_cert_b64("spiffe://example.org/ca");
        let document = json!({
            "trust_domains": {
                "example.org": {
                    "keys": [
                        {"x5c": [cert.as_str(), cert.as_str()]},
                        {"x5c": [cert.as_str()]},
                    ],
                },
            },
        });
        let file = write_bundle(&document.to_string());

        let bundle = load_trust_bundle(file.path()).unwrap();
        assert_eq!(bundle.certificates("example.org").unwrap().len(), 1);
    }

    #[test]
    fn test_missing_trust_domains() {
        let file = write_bundle(r#"{"trust_recommendations": {}}"#);
        let err = load_trust_bundle(file.path()).unwrap_err();
        assert!(matches!(err, Error::MissingField(_)));
        assert_eq!(err.to_string(), "Mandatory trust_domains element is missing");
    }

    #[test]
    fn test_root_must_be_object() {
        let file = write_bundle(r#"["trust_domains"]"#);
        let err = load_trust_bundle(file.path()).unwrap_err();
        assert!(matches!(err, Error::InvalidFormat(_)));
        assert!(err
            .to_string()
            .contains("SPIFFE Trust Bundle should be a JSON object."));
    }

    #[test]
    fn test_malformed_json() {
        let file = write_bundle("{\"trust_domains\": ");
        let err = load_trust_bundle(file.path()).unwrap_err();
        assert!(err
            .to_string()
            .contains("SPIFFE Trust Bundle should be a JSON object."));
    }

    #[test]
    fn test_nonexistent_file() {
        let err = load_trust_bundle("i_do_not_exist").unwrap_err();
        match err {
            Error::FileNotFound(path) => assert_eq!(path, "i_do_not_exist"),
            other => panic!("expected FileNotFound, got {other:?}"),
        }
    }

    #[test]
    fn test_bad_base64_aborts_load() {
        let document = json!({
            "trust_domains": {
                "example.org": {"keys": [{"x5c": ["!!not-base64!!"]}]},
            },
        });
        let file = write_bundle(&document.to_string());
        let err = load_trust_bundle(file.path()).unwrap_err();
        assert!(matches!(err, Error::MalformedCertificate(_)));
    }

    #[test]
    fn test_bad_der_aborts_load() {
        use base64::engine::general_purpose::STANDARD as BASE64;
        use base64::Engine as _;

        let junk = BASE64.encode(b"junk bytes, not a certificate");
        let document = json!({
            "trust_domains": {
                "example.org": {"keys": [{"x5c": [junk]}]},
            },
        });
        let file = write_bundle(&document.to_string());
        let err = load_trust_bundle(file.path()).unwrap_err();
        assert!(matches!(err, Error::MalformedCertificate(_)));
    }

    #[test]
    fn test_negative_sequence_rejected() {
        let document = json!({
            "trust_domains": {
                "example.org": {"spiffe_sequence": -1},
            },
        });
        let file = write_bundle(&document.to_string());
        let err = load_trust_bundle(file.path()).unwrap_err();
        assert!(matches!(err, Error::InvalidFormat(_)));
        assert!(err.to_string().contains("non-negative integer"));
    }

    #[test]
    fn test_wrongly_typed_shapes_rejected() {
        for document in [
            json!({"trust_domains": "not-an-object"}),
            json!({"trust_domains": {"example.org": "not-an-object"}}),
            json!({"trust_domains": {"example.org": {"keys": "not-an-array"}}}),
            json!({"trust_domains": {"example.org": {"keys": ["not-an-object"]}}}),
            json!({"trust_domains": {"example.org": {"keys": [{"x5c": "not-an-array"}]}}}),
            json!({"trust_domains": {"example.org": {"keys": [{"x5c": [42]}]}}}),
        ] {
            let file = write_bundle(&document.to_string());
            let err = load_trust_bundle(file.path()).unwrap_err();
            assert!(matches!(err, Error::InvalidFormat(_)), "{document}: {err}");
        }
    }

    #[test]
    fn test_key_without_x5c_is_skipped() {
        let document = json!({
            "trust_domains": {
                "example.org": {"keys": [{"use": "jwt-svid", "kty": "EC"}]},
            },
        });
        let file = write_bundle(&document.to_string());
        let bundle = load_trust_bundle(file.path()).unwrap();
        assert_eq!(bundle.certificates("example.org").unwrap().len(), 0);
    }
}
