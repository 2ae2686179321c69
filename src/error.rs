//! # Errors
//!
//! Failures raised while encoding, decoding, provisioning, or merging
//! static authentication data. Every failure is surfaced to the caller as
//! a distinct variant; there is no local recovery, since a malformed or
//! unredacted structure indicates corrupted storage or a data-contract
//! violation.

use thiserror::Error;

use crate::provision::StoreError;

/// Static authentication data errors.
#[derive(Debug, Error)]
pub enum Error {
    /// An encoded issuer-signed item whose tag, field set, or field types
    /// do not match `IssuerSignedItem`.
    #[error("malformed issuer-signed item: {0}")]
    MalformedItem(String),

    /// Static auth data that is not the expected two-entry map.
    #[error("malformed static auth data: {0}")]
    MalformedContainer(String),

    /// A required static auth data entry is absent.
    #[error("{name} entry does not exist")]
    MissingField {
        /// Name of the absent entry.
        name: &'static str,
    },

    /// A static auth data entry with the wrong structural type.
    #[error("unexpected type for {field}")]
    WrongShape {
        /// Name of the offending entry.
        field: &'static str,
    },

    /// An item inside static auth data still carries its element value.
    /// Values must only ever be released through the merge path, after the
    /// store's access control checks.
    #[error("elementValue for nameSpace {namespace} elementName {element} is not NULL")]
    UnredactedValue {
        /// Namespace of the offending item.
        namespace: String,
        /// Element identifier of the offending item.
        element: String,
    },

    /// The disclosed entries carry no record of a namespace present in the
    /// digest id mapping.
    #[error("no disclosed entries for nameSpace {namespace}")]
    UnknownNamespace {
        /// The namespace missing from the disclosed entries.
        namespace: String,
    },

    /// The requested digest algorithm is not supported.
    #[error("unsupported digest algorithm: {0}")]
    DigestUnavailable(String),

    /// A data element value that is not valid CBOR.
    #[error("value for nameSpace {namespace} elementName {element} is not valid CBOR")]
    InvalidElementValue {
        /// Namespace of the offending element.
        namespace: String,
        /// Name of the offending element.
        element: String,
    },

    /// Credential store failure, passed through unchanged.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Issuing authority signer failure.
    #[error("signing failed: {0}")]
    Signer(anyhow::Error),
}
