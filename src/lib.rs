//! # Issuer Data Authentication for Mobile Documents
//!
//! Encoding, decoding, and construction of the selective-disclosure
//! authentication data of an ISO/IEC 18013-5 mobile document (mdoc), such
//! as a mobile driving licence. The issuing authority signs one compact
//! set of per-element digests (the Mobile Security Object), while the
//! element values themselves are disclosed selectively and later, without
//! invalidating the signature.
//!
//! The persisted unit is the static authentication data bundle, created
//! once per authentication key at provisioning time:
//!
//! ```text
//! StaticAuthData = {
//!     "digestIdMapping": DigestIdMapping,
//!     "issuerAuth" : bstr                ; COSE_Sign1, payload is
//! }                                      ; MobileSecurityObjectBytes
//!
//! DigestIdMapping = {
//!     NameSpace => [ + bstr ]            ; IssuerSignedItemBytes, with
//! }                                      ; elementValue set to NULL
//!
//! IssuerSignedItemBytes = #6.24(bstr .cbor IssuerSignedItem)
//!
//! IssuerSignedItem = {
//!   "digestID" : uint,
//!   "random" : bstr,
//!   "elementIdentifier" : DataElementIdentifier,
//!   "elementValue" : DataElementValue
//! }
//! ```
//!
//! [`provision_credential`] drives a [`CredentialStore`] and a [`Signer`]
//! to produce and persist one bundle per authentication key. At
//! presentation time the bundle is decoded with
//! [`StaticAuthData::from_slice`] and the disclosed element values are
//! re-attached with [`merge_issuer_signed`]; the merged mapping and the
//! `issuerAuth` bytes feed the device response assembly.

pub mod cbor;
mod cose_key;
mod error;
mod mdoc;
mod merge;
mod mso;
mod provision;
mod static_auth;

pub use crate::cose_key::{CoseKey, Ec2Curve, Ec2y, OkpCurve};
pub use crate::error::Error;
pub use crate::mdoc::{
    attach_value, redact, DigestId, DigestIdMapping, IssuerSignedItem, ItemBytes, NameSpace,
};
pub use crate::merge::{merge_issuer_signed, DisclosedEntries};
pub use crate::mso::{
    DeviceKeyInfo, Digest, DigestAlgorithm, DigestIdGenerator, DigestIds, KeyAuthorization,
    MobileSecurityObject, ValidityInfo, ValueDigests, Version,
};
pub use crate::provision::{
    provision_credential, Algorithm, AuthKey, CipherSuite, Credential, CredentialStore, Dataset,
    Entry, ProvisionRequest, Signer, StoreError, WritableCredential,
};
pub use crate::static_auth::StaticAuthData;
