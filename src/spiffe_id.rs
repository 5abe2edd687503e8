//! SPIFFE ID types and validation
//!
//! Implements the SPIFFE ID grammar from the
//! [SPIFFE standard](https://github.com/spiffe/spiffe/blob/main/standards/SPIFFE-ID.md).
//! Validation is deliberately strict and ordered so error messages are
//! unambiguous and stable for conformance testing; no normalization (such as
//! case-folding the trust domain) happens beyond what the standard mandates.

use crate::error::{Error, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

const PREFIX: &str = "spiffe://";
const MAX_URI_LENGTH: usize = 2048;
const MAX_TRUST_DOMAIN_LENGTH: usize = 255;

/// A SPIFFE ID uniquely identifies a workload
///
/// Instances exist only as the result of a successful [`SpiffeId::parse`];
/// there is no way to construct one that violates the standard.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SpiffeId {
    trust_domain: String,
    path: String,
}

impl SpiffeId {
    /// Parse a URI string, applying the validation rules of the SPIFFE
    /// standard, and return the decomposed trust domain and path.
    ///
    /// Validation short-circuits: the first violated rule aborts the parse
    /// and no partial value is ever produced. The scheme check is
    /// case-insensitive, while the trust domain charset is lowercase-only
    /// and the path segment charset allows mixed case.
    ///
    /// # Examples
    /// ```
    /// use spiffe_identity::SpiffeId;
    ///
    /// let id = SpiffeId::parse("spiffe://example.org/service/web").unwrap();
    /// assert_eq!(id.trust_domain(), "example.org");
    /// assert_eq!(id.path(), "/service/web");
    /// ```
    pub fn parse(uri: impl AsRef<str>) -> Result<Self> {
        let uri = uri.as_ref();
        do_initial_uri_validation(uri)?;

        if uri.len() < PREFIX.len()
            || !uri.as_bytes()[..PREFIX.len()].eq_ignore_ascii_case(PREFIX.as_bytes())
        {
            return Err(Error::invalid_spiffe_id(format!(
                "Spiffe Id must start with {PREFIX}"
            )));
        }

        let domain_and_path = &uri[PREFIX.len()..];
        let (trust_domain, path) = match domain_and_path.split_once('/') {
            None => (domain_and_path, ""),
            Some((trust_domain, path)) => {
                if path.is_empty() {
                    return Err(Error::invalid_spiffe_id(
                        "Path must not include a trailing '/'",
                    ));
                }
                (trust_domain, path)
            }
        };

        validate_trust_domain(trust_domain)?;
        validate_path(path)?;

        let path = if path.is_empty() {
            String::new()
        } else {
            format!("/{path}")
        };

        Ok(SpiffeId {
            trust_domain: trust_domain.to_string(),
            path,
        })
    }

    /// Get the trust domain
    pub fn trust_domain(&self) -> &str {
        &self.trust_domain
    }

    /// Get the path component (empty, or starting with a single `/` and
    /// never ending with one)
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Check if this ID belongs to the specified trust domain
    pub fn is_member_of(&self, trust_domain: &str) -> bool {
        self.trust_domain == trust_domain
    }
}

impl fmt::Display for SpiffeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", PREFIX, self.trust_domain, self.path)
    }
}

impl FromStr for SpiffeId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl Serialize for SpiffeId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for SpiffeId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let uri = String::deserialize(deserializer)?;
        SpiffeId::parse(&uri).map_err(serde::de::Error::custom)
    }
}

fn do_initial_uri_validation(uri: &str) -> Result<()> {
    if uri.is_empty() {
        return Err(Error::invalid_spiffe_id("Spiffe Id can't be empty"));
    }
    if uri.len() > MAX_URI_LENGTH {
        return Err(Error::invalid_spiffe_id(
            "Spiffe Id maximum length is 2048 characters",
        ));
    }
    if uri.contains('#') {
        return Err(Error::invalid_spiffe_id(
            "Spiffe Id must not contain query fragments",
        ));
    }
    if uri.contains('?') {
        return Err(Error::invalid_spiffe_id(
            "Spiffe Id must not contain query parameters",
        ));
    }
    Ok(())
}

fn validate_trust_domain(trust_domain: &str) -> Result<()> {
    if trust_domain.is_empty() {
        return Err(Error::invalid_spiffe_id("Trust Domain can't be empty"));
    }
    if trust_domain.len() > MAX_TRUST_DOMAIN_LENGTH {
        return Err(Error::invalid_spiffe_id(
            "Trust Domain maximum length is 255 characters",
        ));
    }
    if !is_valid_trust_domain(trust_domain) {
        return Err(Error::invalid_spiffe_id(
            "Trust Domain must contain only letters, numbers, dots, dashes, and underscores \
             ([a-z0-9.-_])",
        ));
    }
    Ok(())
}

fn validate_path(path: &str) -> Result<()> {
    if path.is_empty() {
        return Ok(());
    }
    if path.ends_with('/') {
        return Err(Error::invalid_spiffe_id(
            "Path must not include a trailing '/'",
        ));
    }
    for segment in path.split('/') {
        validate_path_segment(segment)?;
    }
    Ok(())
}

fn validate_path_segment(segment: &str) -> Result<()> {
    if segment.is_empty() {
        return Err(Error::invalid_spiffe_id(
            "Individual path segments must not be empty",
        ));
    }
    if segment == "." || segment == ".." {
        return Err(Error::invalid_spiffe_id(
            "Individual path segments must not be relative path modifiers (i.e. ., ..)",
        ));
    }
    if !is_valid_path_segment(segment) {
        return Err(Error::invalid_spiffe_id(
            "Individual path segments must contain only letters, numbers, dots, dashes, and \
             underscores ([a-zA-Z0-9.-_])",
        ));
    }
    Ok(())
}

/// Trust domain charset: `[a-z0-9._-]+`. Lowercase only, unlike the path
/// segment charset.
fn is_valid_trust_domain(s: &str) -> bool {
    !s.is_empty()
        && s.bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || matches!(b, b'.' | b'_' | b'-'))
}

/// Path segment charset: `[A-Za-z0-9._-]+`. Mixed case is permitted here.
fn is_valid_path_segment(s: &str) -> bool {
    !s.is_empty()
        && s.bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'_' | b'-'))
}
