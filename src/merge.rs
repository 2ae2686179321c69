//! # Disclosure Merge
//!
//! Recombines a redacted digest id mapping with the element values the
//! credential store released for one presentation. Only elements the store
//! explicitly disclosed are re-attached; everything else stays out of the
//! result, so no value is exposed without a matching digest entry.

use std::collections::{BTreeMap, BTreeSet};

use crate::cbor;
use crate::error::Error;
use crate::mdoc::{self, DigestIdMapping, IssuerSignedItem, NameSpace};

/// Element values released by the credential store for one presentation.
/// Values are encoded CBOR.
pub trait DisclosedEntries {
    /// Namespaces the store returned entries for.
    fn namespaces(&self) -> BTreeSet<NameSpace>;

    /// Names of the elements disclosed under `name_space`.
    fn entry_names(&self, name_space: &str) -> BTreeSet<String>;

    /// Encoded value of one disclosed element, or `None` when the element
    /// was not released.
    fn entry(&self, name_space: &str, name: &str) -> Option<Vec<u8>>;
}

impl DisclosedEntries for BTreeMap<NameSpace, BTreeMap<String, Vec<u8>>> {
    fn namespaces(&self) -> BTreeSet<NameSpace> {
        self.keys().cloned().collect()
    }

    fn entry_names(&self, name_space: &str) -> BTreeSet<String> {
        self.get(name_space)
            .map(|entries| entries.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn entry(&self, name_space: &str, name: &str) -> Option<Vec<u8>> {
        self.get(name_space).and_then(|entries| entries.get(name)).cloned()
    }
}

/// Re-attach disclosed element values to their digest items.
///
/// Every namespace in `mapping` must be known to `entries`; within a
/// namespace, items whose element was not disclosed are simply dropped.
/// Namespaces with no disclosed items are omitted from the result. The
/// digest id, salt, and element identifier of retained items are
/// unchanged, so the reader can recompute and verify their digests.
///
/// # Errors
/// - [`Error::UnknownNamespace`] when `entries` has no record of a
///   namespace present in `mapping`.
/// - [`Error::MalformedItem`] when an item in `mapping` cannot be decoded.
/// - [`Error::InvalidElementValue`] when a disclosed value is not valid
///   CBOR.
pub fn merge_issuer_signed(
    mapping: &DigestIdMapping, entries: &impl DisclosedEntries,
) -> Result<DigestIdMapping, Error> {
    let namespaces = entries.namespaces();

    let mut merged = DigestIdMapping::new();
    for (name_space, items) in mapping {
        if !namespaces.contains(name_space) {
            return Err(Error::UnknownNamespace { namespace: name_space.clone() });
        }

        let names = entries.entry_names(name_space);
        let mut disclosed = Vec::new();
        for item_bytes in items {
            let item = IssuerSignedItem::from_tagged_slice(item_bytes)?;
            if !names.contains(&item.element_identifier) {
                // not disclosed in this presentation
                continue;
            }
            let Some(value_bytes) = entries.entry(name_space, &item.element_identifier) else {
                continue;
            };

            let value = cbor::from_slice(&value_bytes).map_err(|_| {
                Error::InvalidElementValue {
                    namespace: name_space.clone(),
                    element: item.element_identifier.clone(),
                }
            })?;
            disclosed.push(mdoc::attach_value(item_bytes, value)?);
        }

        if !disclosed.is_empty() {
            merged.insert(name_space.clone(), disclosed);
        }
    }

    Ok(merged)
}
