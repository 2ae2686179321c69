//! # Static Authentication Data
//!
//! The per-authentication-key bundle persisted at provisioning time and
//! decoded read-only at presentation time:
//!
//! ```text
//! StaticAuthData = {
//!     "digestIdMapping": DigestIdMapping,
//!     "issuerAuth" : bstr       ; COSE_Sign1 over MobileSecurityObjectBytes
//! }
//!
//! DigestIdMapping = {
//!     NameSpace => [ + bstr ]   ; each bstr is IssuerSignedItemBytes
//! }
//! ```
//!
//! Every item in the mapping must carry the NULL element value. The check
//! runs on both encode and decode so that element values never reach
//! storage that is returned without access control checks.

use ciborium::Value;

use crate::cbor;
use crate::error::Error;
use crate::mdoc::{DigestIdMapping, IssuerSignedItem};

/// Digest id mapping plus the issuer-signed envelope, as persisted per
/// authentication key. `issuer_auth` is produced and consumed by the
/// issuing authority's signer and passes through unchanged.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StaticAuthData {
    /// Namespace to redacted issuer-signed items.
    pub digest_id_mapping: DigestIdMapping,

    /// `COSE_Sign1` bytes where the payload is `MobileSecurityObjectBytes`.
    pub issuer_auth: Vec<u8>,
}

impl StaticAuthData {
    /// Encode to the persisted CBOR form.
    ///
    /// # Errors
    /// Returns [`Error::UnredactedValue`] when any item still carries its
    /// element value, or [`Error::MalformedItem`] when an item cannot be
    /// decoded for the check.
    pub fn to_vec(&self) -> Result<Vec<u8>, Error> {
        let mut mapping = Vec::with_capacity(self.digest_id_mapping.len());
        for (name_space, items) in &self.digest_id_mapping {
            let mut encoded = Vec::with_capacity(items.len());
            for item_bytes in items {
                ensure_redacted(name_space, item_bytes)?;
                encoded.push(Value::Bytes(item_bytes.clone()));
            }
            mapping.push((Value::Text(name_space.clone()), Value::Array(encoded)));
        }

        let top = Value::Map(vec![
            (Value::Text("digestIdMapping".into()), Value::Map(mapping)),
            (Value::Text("issuerAuth".into()), Value::Bytes(self.issuer_auth.clone())),
        ]);
        cbor::to_vec(&top).map_err(|e| Error::MalformedContainer(e.to_string()))
    }

    /// Decode from the persisted CBOR form.
    ///
    /// Any structural violation aborts the whole decode; malformed
    /// namespaces are never silently dropped.
    ///
    /// # Errors
    /// - [`Error::MalformedContainer`] when the top level is not a map of
    ///   exactly the two expected entries.
    /// - [`Error::MissingField`] when either entry is absent.
    /// - [`Error::WrongShape`] when an entry's structural type does not
    ///   match.
    /// - [`Error::MalformedItem`] when an embedded item cannot be decoded.
    /// - [`Error::UnredactedValue`] when an item carries an element value.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, Error> {
        let top: Value =
            cbor::from_slice(bytes).map_err(|e| Error::MalformedContainer(e.to_string()))?;
        let Value::Map(entries) = top else {
            return Err(Error::MalformedContainer("top-level is not a map".into()));
        };

        let mut mapping_value = None;
        let mut issuer_auth_value = None;
        for (key, value) in entries {
            match key.as_text() {
                Some("digestIdMapping") => {
                    if mapping_value.replace(value).is_some() {
                        return Err(Error::MalformedContainer(
                            "duplicate digestIdMapping entry".into(),
                        ));
                    }
                }
                Some("issuerAuth") => {
                    if issuer_auth_value.replace(value).is_some() {
                        return Err(Error::MalformedContainer(
                            "duplicate issuerAuth entry".into(),
                        ));
                    }
                }
                _ => {
                    return Err(Error::MalformedContainer(format!(
                        "unexpected entry: {key:?}"
                    )));
                }
            }
        }
        let Some(mapping_value) = mapping_value else {
            return Err(Error::MissingField { name: "digestIdMapping" });
        };
        let Some(issuer_auth_value) = issuer_auth_value else {
            return Err(Error::MissingField { name: "issuerAuth" });
        };

        let Value::Bytes(issuer_auth) = issuer_auth_value else {
            return Err(Error::WrongShape { field: "issuerAuth" });
        };
        let Value::Map(name_spaces) = mapping_value else {
            return Err(Error::WrongShape { field: "digestIdMapping" });
        };

        let mut digest_id_mapping = DigestIdMapping::new();
        for (key, value) in name_spaces {
            let Value::Text(name_space) = key else {
                return Err(Error::WrongShape { field: "nameSpace" });
            };
            let Value::Array(items) = value else {
                return Err(Error::WrongShape { field: "digestIdMapping" });
            };

            let mut decoded = Vec::with_capacity(items.len());
            for item in items {
                let Value::Bytes(item_bytes) = item else {
                    return Err(Error::WrongShape { field: "issuerSignedItemBytes" });
                };
                ensure_redacted(&name_space, &item_bytes)?;
                decoded.push(item_bytes);
            }
            if digest_id_mapping.insert(name_space, decoded).is_some() {
                return Err(Error::MalformedContainer("duplicate nameSpace entry".into()));
            }
        }

        Ok(Self { digest_id_mapping, issuer_auth })
    }
}

/// Check that an encoded item carries the NULL element value.
fn ensure_redacted(name_space: &str, item_bytes: &[u8]) -> Result<(), Error> {
    let item = IssuerSignedItem::from_tagged_slice(item_bytes)?;
    if !item.element_value.is_null() {
        return Err(Error::UnredactedValue {
            namespace: name_space.to_string(),
            element: item.element_identifier,
        });
    }
    Ok(())
}
