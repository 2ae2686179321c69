//! # Mobile Security Object (MSO)
//!
//! The MSO provides issuer data authentication for an mdoc. It holds one
//! content digest per data element, the document type, the validity window,
//! and the device public key, and becomes the payload of the `COSE_Sign1`
//! signed by the issuing authority.
//!
//! See 9.1.2.4 Signing method and structure for MSO.

use std::collections::BTreeMap;
use std::fmt::{self, Display};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use rand::thread_rng;
use serde::{Deserialize, Serialize};
use serde_bytes::ByteBuf;

use crate::cose_key::CoseKey;
use crate::error::Error;
use crate::mdoc::{DigestId, NameSpace};

/// An ordered set of value digests for each data element in each namespace.
pub type ValueDigests = BTreeMap<NameSpace, DigestIds>;

/// Digest id to content digest.
pub type DigestIds = BTreeMap<DigestId, Digest>;

/// Content digest over `IssuerSignedItemBytes`.
pub type Digest = ByteBuf;

/// An mdoc digital signature is generated over the mobile security object.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MobileSecurityObject {
    /// Version of the MobileSecurityObject. Must be 1.0.
    pub version: Version,

    /// Message digest algorithm used for the value digests.
    pub digest_algorithm: DigestAlgorithm,

    /// Digests of all data elements, by namespace.
    pub value_digests: ValueDigests,

    /// The document type of the document being signed, e.g.
    /// "org.iso.18013.5.1.mDL".
    pub doc_type: String,

    /// Validity information for the MSO.
    pub validity_info: ValidityInfo,

    /// Device key information.
    pub device_key_info: DeviceKeyInfo,
}

/// MSO version.
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub enum Version {
    /// Version 1.0
    #[default]
    #[serde(rename = "1.0")]
    V1_0,
}

/// Digest algorithm used by the MSO.
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub enum DigestAlgorithm {
    /// SHA-256
    #[default]
    #[serde(rename = "SHA-256")]
    Sha256,

    /// SHA-384
    #[serde(rename = "SHA-384")]
    Sha384,

    /// SHA-512
    #[serde(rename = "SHA-512")]
    Sha512,
}

impl DigestAlgorithm {
    /// Compute the content digest of `data`.
    #[must_use]
    pub fn digest(self, data: &[u8]) -> Digest {
        use sha2::Digest as _;

        let bytes = match self {
            Self::Sha256 => sha2::Sha256::digest(data).to_vec(),
            Self::Sha384 => sha2::Sha384::digest(data).to_vec(),
            Self::Sha512 => sha2::Sha512::digest(data).to_vec(),
        };
        ByteBuf::from(bytes)
    }
}

impl Display for DigestAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sha256 => write!(f, "SHA-256"),
            Self::Sha384 => write!(f, "SHA-384"),
            Self::Sha512 => write!(f, "SHA-512"),
        }
    }
}

impl FromStr for DigestAlgorithm {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        match s {
            "SHA-256" => Ok(Self::Sha256),
            "SHA-384" => Ok(Self::Sha384),
            "SHA-512" => Ok(Self::Sha512),
            other => Err(Error::DigestUnavailable(other.to_string())),
        }
    }
}

/// Contains information related to the validity of the MSO and its
/// signature. Timestamps are ISO 8601 UTC without fractional seconds.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ValidityInfo {
    /// Time the MSO was signed.
    pub signed: String,

    /// The timestamp before which the MSO is not yet valid. Equal to or
    /// later than `signed`.
    pub valid_from: String,

    /// The timestamp after which the MSO is no longer valid.
    pub valid_until: String,

    /// The time at which the issuing authority expects to re-sign the MSO.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_update: Option<String>,
}

impl ValidityInfo {
    /// Validity window for an MSO signed at `signed` and expiring at
    /// `valid_until`.
    #[must_use]
    pub fn new(signed: DateTime<Utc>, valid_until: DateTime<Utc>) -> Self {
        Self {
            signed: tdate(signed),
            valid_from: tdate(signed),
            valid_until: tdate(valid_until),
            expected_update: None,
        }
    }
}

fn tdate(dt: DateTime<Utc>) -> String {
    dt.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

/// Holds the mdoc authentication public key and information related to
/// this key.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DeviceKeyInfo {
    /// Device key, an untagged `COSE_Key`.
    pub device_key: CoseKey,

    /// Key authorizations.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_authorizations: Option<KeyAuthorization>,

    /// Key info.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_info: Option<BTreeMap<i64, ciborium::Value>>,
}

impl DeviceKeyInfo {
    /// Key info for `device_key`, with no authorizations.
    #[must_use]
    pub const fn new(device_key: CoseKey) -> Self {
        Self { device_key, key_authorizations: None, key_info: None }
    }
}

/// Elements the device key is authorized to sign over.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct KeyAuthorization {
    /// Authorized namespaces, in full.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name_spaces: Option<Vec<NameSpace>>,

    /// Authorized data elements, by namespace.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_elements: Option<BTreeMap<NameSpace, Vec<String>>>,
}

/// Issues each digest id in `[0, count)` exactly once, in uniformly random
/// order, so that an id carries no information about which element it
/// covers when MSOs for different authentication keys are compared.
#[derive(Debug)]
pub struct DigestIdGenerator {
    ids: Vec<DigestId>,
}

impl DigestIdGenerator {
    /// Allocate a shuffled pool of `count` digest ids.
    #[must_use]
    pub fn new(count: usize) -> Self {
        let mut ids: Vec<DigestId> = (0..count).map(|id| id as DigestId).collect();
        ids.shuffle(&mut thread_rng());
        Self { ids }
    }

    /// Next unused digest id.
    ///
    /// # Panics
    /// Panics when more ids are requested than were allocated.
    pub fn generate(&mut self) -> DigestId {
        self.ids.pop().expect("digest id pool exhausted")
    }
}
