//! # Issuer-Signed Items
//!
//! Data elements hashed and signed by the issuer. Each element is carried
//! as an `IssuerSignedItem`, encoded as tagged bytes so it can be embedded
//! opaquely in a larger structure and independently re-parsed:
//!
//! ```text
//! IssuerSignedItemBytes = #6.24(bstr .cbor IssuerSignedItem)
//!
//! IssuerSignedItem = {
//!   "digestID" : uint,                           ; Digest ID for issuer data auth
//!   "random" : bstr,                             ; Random value for issuer data auth
//!   "elementIdentifier" : DataElementIdentifier, ; Data element identifier
//!   "elementValue" : DataElementValue            ; Data element value
//! }
//! ```
//!
//! Inside stored static auth data, `elementValue` is always the CBOR NULL
//! value. The real value is substituted back at presentation time with
//! [`attach_value`], and only for elements the holder disclosed.

use std::collections::BTreeMap;

use ciborium::Value;
use serde::{Deserialize, Serialize};

use crate::cbor::{self, Tag24};
use crate::error::Error;

/// Namespace of a set of data elements, e.g. "org.iso.18013.5.1".
pub type NameSpace = String;

/// Correlates an issuer-signed item with its digest in the MSO. Unique
/// within one provisioning round for one authentication key, with no
/// correlation between rounds.
pub type DigestId = u32;

/// Encoded `IssuerSignedItemBytes`.
pub type ItemBytes = Vec<u8>;

/// Namespace to ordered encoded items. The order of items round-trips
/// byte-identically through the static auth data container.
pub type DigestIdMapping = BTreeMap<NameSpace, Vec<ItemBytes>>;

/// Issuer-signed data element.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(try_from = "ciborium::Value", into = "ciborium::Value")]
pub struct IssuerSignedItem {
    /// Id of the digest as added to the MSO `valueDigests` parameter.
    pub digest_id: DigestId,

    /// Random salt for issuer data authentication (16 bytes, fresh per
    /// item per authentication key).
    pub random: Vec<u8>,

    /// Data element identifier. For example, "`family_name`".
    pub element_identifier: String,

    /// Data element value, or `Value::Null` when redacted.
    pub element_value: Value,
}

impl IssuerSignedItem {
    /// Encode as `IssuerSignedItemBytes`.
    ///
    /// # Errors
    /// Returns [`Error::MalformedItem`] when the item cannot be encoded.
    pub fn to_tagged_vec(&self) -> Result<ItemBytes, Error> {
        Tag24(self.clone()).to_vec().map_err(|e| Error::MalformedItem(e.to_string()))
    }

    /// Decode from `IssuerSignedItemBytes`.
    ///
    /// # Errors
    /// Returns [`Error::MalformedItem`] when the tag, field set, or field
    /// types do not match.
    pub fn from_tagged_slice(bytes: &[u8]) -> Result<Self, Error> {
        let Tag24(item) =
            cbor::from_slice(bytes).map_err(|e| Error::MalformedItem(e.to_string()))?;
        Ok(item)
    }
}

impl From<IssuerSignedItem> for Value {
    fn from(item: IssuerSignedItem) -> Self {
        Self::Map(vec![
            (Self::Text("digestID".into()), Self::Integer(item.digest_id.into())),
            (Self::Text("random".into()), Self::Bytes(item.random)),
            (Self::Text("elementIdentifier".into()), Self::Text(item.element_identifier)),
            (Self::Text("elementValue".into()), item.element_value),
        ])
    }
}

impl TryFrom<Value> for IssuerSignedItem {
    type Error = Error;

    fn try_from(v: Value) -> Result<Self, Error> {
        let Value::Map(entries) = v else {
            return Err(Error::MalformedItem("issuer-signed item is not a map".into()));
        };

        let mut digest_id = None;
        let mut random = None;
        let mut element_identifier = None;
        let mut element_value = None;

        for (key, value) in entries {
            match key.as_text() {
                Some("digestID") => {
                    let int: i128 = value
                        .as_integer()
                        .ok_or_else(|| {
                            Error::MalformedItem("digestID is not an unsigned integer".into())
                        })?
                        .into();
                    digest_id = Some(DigestId::try_from(int).map_err(|_| {
                        Error::MalformedItem("digestID is out of range".into())
                    })?);
                }
                Some("random") => {
                    random = Some(value.into_bytes().map_err(|_| {
                        Error::MalformedItem("random is not a byte string".into())
                    })?);
                }
                Some("elementIdentifier") => {
                    element_identifier = Some(value.into_text().map_err(|_| {
                        Error::MalformedItem("elementIdentifier is not a text string".into())
                    })?);
                }
                Some("elementValue") => element_value = Some(value),
                _ => {
                    return Err(Error::MalformedItem(format!(
                        "unexpected entry in issuer-signed item: {key:?}"
                    )));
                }
            }
        }

        let missing = |name| Error::MalformedItem(format!("{name} entry is missing"));
        Ok(Self {
            digest_id: digest_id.ok_or_else(|| missing("digestID"))?,
            random: random.ok_or_else(|| missing("random"))?,
            element_identifier: element_identifier.ok_or_else(|| missing("elementIdentifier"))?,
            element_value: element_value.ok_or_else(|| missing("elementValue"))?,
        })
    }
}

/// Re-encode an item with `elementValue` replaced by the NULL marker,
/// leaving every other entry in place. Items are stored redacted so that
/// element values are never available without access control checks.
///
/// # Errors
/// Returns [`Error::MalformedItem`] when `item_bytes` is not an encoded
/// issuer-signed item.
pub fn redact(item_bytes: &[u8]) -> Result<ItemBytes, Error> {
    set_element_value(item_bytes, Value::Null)
}

/// Substitute a disclosed element value into a redacted item, the inverse
/// of [`redact`]. The digest id, salt, and element identifier are
/// preserved so a reader can recompute and verify the item's digest.
///
/// # Errors
/// Returns [`Error::MalformedItem`] when `item_bytes` is not an encoded
/// issuer-signed item.
pub fn attach_value(item_bytes: &[u8], value: Value) -> Result<ItemBytes, Error> {
    set_element_value(item_bytes, value)
}

fn set_element_value(item_bytes: &[u8], value: Value) -> Result<ItemBytes, Error> {
    let malformed = |e: &dyn std::fmt::Display| Error::MalformedItem(e.to_string());

    let tagged: Value = cbor::from_slice(item_bytes).map_err(|e| malformed(&e))?;
    let Value::Tag(24, inner) = tagged else {
        return Err(Error::MalformedItem("expected tag 24".into()));
    };
    let Value::Bytes(inner_bytes) = *inner else {
        return Err(Error::MalformedItem("tag 24 content is not a byte string".into()));
    };

    let item: Value = cbor::from_slice(&inner_bytes).map_err(|e| malformed(&e))?;
    let Value::Map(mut entries) = item else {
        return Err(Error::MalformedItem("issuer-signed item is not a map".into()));
    };
    let Some(entry) = entries.iter_mut().find(|(key, _)| key.as_text() == Some("elementValue"))
    else {
        return Err(Error::MalformedItem("elementValue entry is missing".into()));
    };
    entry.1 = value;

    let inner_bytes = cbor::to_vec(&Value::Map(entries)).map_err(|e| malformed(&e))?;
    cbor::to_vec(&Value::Tag(24, Box::new(Value::Bytes(inner_bytes)))).map_err(|e| malformed(&e))
}
