//! # Credential Provisioning
//!
//! Builds and persists the static authentication data for every
//! authentication key of a credential. The credential store and the
//! issuing authority signer are injected capabilities; this module owns
//! only the digest-binding construction between them.
//!
//! For each authentication key, provisioning draws a fresh random
//! permutation of digest ids and a fresh 16-byte salt per element, so that
//! neither digest ids nor digests can be correlated across keys or
//! presentations. The elements themselves are stored redacted; the MSO
//! carries one content digest per element and is signed into a
//! `COSE_Sign1` envelope by the issuing authority.

use std::collections::BTreeMap;
use std::future::Future;

use chrono::{DateTime, Months, Utc};
use ciborium::Value;
use coset::{iana, CborSerializable, CoseSign1Builder, HeaderBuilder};
use rand::{thread_rng, Rng};
use tracing::instrument;

use crate::cbor::{self, Tag24};
use crate::cose_key::CoseKey;
use crate::error::Error;
use crate::mdoc::{self, DigestIdMapping, IssuerSignedItem, NameSpace};
use crate::mso::{
    DeviceKeyInfo, DigestAlgorithm, DigestIdGenerator, MobileSecurityObject, ValidityInfo,
    ValueDigests, Version,
};
use crate::static_auth::StaticAuthData;

/// `x5chain` COSE header label (RFC 9360).
const X5CHAIN: i64 = 33;

/// Credential store failures. `AlreadyPersonalized` and
/// `DocTypeNotSupported` are terminal for the credential name being
/// provisioned; the caller decides whether to retry under another name.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The named credential has already been personalized.
    #[error("credential is already personalized")]
    AlreadyPersonalized,

    /// The store does not support the requested document type.
    #[error("document type is not supported: {0}")]
    DocTypeNotSupported(String),

    /// Any other store failure.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Cipher suite used when retrieving a credential from the store.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CipherSuite {
    /// ECDHE key agreement, HKDF, and AES-256-GCM.
    #[default]
    EcdheHkdfEcdsaWithAes256GcmSha256,
}

/// An authentication key the store reports as needing certification.
#[derive(Clone, Debug)]
pub struct AuthKey {
    /// X.509 certificate for the key (DER).
    pub certificate: Vec<u8>,

    /// Public key material, used as the MSO device key.
    pub public_key: CoseKey,
}

/// The credential store holding private keys and performing attestation.
/// Implementations are typically backed by a hardware or software
/// keystore.
pub trait CredentialStore: Send + Sync {
    /// Handle for a credential being created.
    type Writable: WritableCredential;

    /// Handle for a personalized credential.
    type Credential: Credential;

    /// Delete any existing credential data under `name`.
    fn delete_credential(&self, name: &str)
        -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Create a new credential for the given document type.
    fn create_credential(
        &self, name: &str, doc_type: &str,
    ) -> impl Future<Output = Result<Self::Writable, StoreError>> + Send;

    /// Retrieve a personalized credential.
    fn credential(
        &self, name: &str, cipher_suite: CipherSuite,
    ) -> impl Future<Output = Result<Self::Credential, StoreError>> + Send;
}

/// A credential being created in the store.
pub trait WritableCredential: Send + Sync {
    /// Certificate chain for the credential key, attested over `challenge`.
    fn certificate_chain(
        &self, challenge: &[u8],
    ) -> impl Future<Output = Result<Vec<Vec<u8>>, StoreError>> + Send;

    /// Store the dataset, returning the proof-of-provisioning signature.
    fn personalize(
        &mut self, dataset: &Dataset,
    ) -> impl Future<Output = Result<Vec<u8>, StoreError>> + Send;
}

/// A personalized credential whose authentication keys can be certified.
pub trait Credential: Send + Sync {
    /// Set the number of authentication keys and uses per key.
    fn set_auth_key_policy(
        &mut self, count: usize, max_uses_per_key: usize,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Authentication keys with no static auth data yet.
    fn auth_keys_needing_certification(
        &self,
    ) -> impl Future<Output = Result<Vec<AuthKey>, StoreError>> + Send;

    /// Persist static auth data for one authentication key.
    fn store_static_auth_data(
        &mut self, auth_key: &AuthKey, valid_until: DateTime<Utc>, data: &[u8],
    ) -> impl Future<Output = Result<(), StoreError>> + Send;
}

/// Issuing authority signing capability.
pub trait Signer: Send + Sync {
    /// Signature algorithm, for the COSE protected header.
    fn algorithm(&self) -> Algorithm;

    /// Issuing authority certificate chain (DER), leaf first.
    fn certificate_chain(&self) -> Vec<Vec<u8>>;

    /// Sign `msg` with the issuing authority private key.
    fn try_sign(&self, msg: &[u8]) -> impl Future<Output = anyhow::Result<Vec<u8>>> + Send;
}

/// Signature algorithm used by the issuing authority signer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Algorithm {
    /// Edwards-curve digital signature algorithm.
    #[default]
    EdDSA,

    /// ECDSA with SHA-256 on the P-256 curve.
    ES256,
}

impl From<Algorithm> for iana::Algorithm {
    fn from(alg: Algorithm) -> Self {
        match alg {
            Algorithm::EdDSA => Self::EdDSA,
            Algorithm::ES256 => Self::ES256,
        }
    }
}

/// Data to provision into a credential, organized by namespace. Entry
/// values are encoded CBOR.
#[derive(Clone, Debug, Default)]
pub struct Dataset {
    /// Ordered entries for each namespace.
    pub name_spaces: BTreeMap<NameSpace, Vec<Entry>>,
}

/// One data element to provision.
#[derive(Clone, Debug)]
pub struct Entry {
    /// Element identifier, e.g. "`family_name`".
    pub name: String,

    /// Encoded CBOR element value.
    pub value: Vec<u8>,
}

impl Dataset {
    /// An empty dataset.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one data element under `name_space`.
    #[must_use]
    pub fn with_entry(
        mut self, name_space: impl Into<String>, name: impl Into<String>, value: Vec<u8>,
    ) -> Self {
        self.name_spaces
            .entry(name_space.into())
            .or_default()
            .push(Entry { name: name.into(), value });
        self
    }

    /// Total element count across all namespaces.
    #[must_use]
    pub fn element_count(&self) -> usize {
        self.name_spaces.values().map(Vec::len).sum()
    }
}

/// Request to provision a credential.
#[derive(Clone, Debug)]
pub struct ProvisionRequest {
    /// Name for the credential in the store, e.g. "test".
    pub credential_name: String,

    /// Document type, e.g. "org.iso.18013.5.1.mDL".
    pub doc_type: String,

    /// The data to put in the document, organized by namespace.
    pub dataset: Dataset,

    /// Number of authentication keys to create.
    pub num_auth_keys: usize,

    /// Number of uses for each authentication key.
    pub max_uses_per_key: usize,

    /// Attestation challenge for the credential key certificate chain.
    pub challenge: Vec<u8>,

    /// MSO expiry. Defaults to 12 months after signing.
    pub valid_until: Option<DateTime<Utc>>,

    /// Digest algorithm for the MSO value digests.
    pub digest_algorithm: DigestAlgorithm,
}

/// Provision `request.dataset` into the store under
/// `request.credential_name` and certify every authentication key the
/// store reports as needing certification.
///
/// Per key, the full sequence runs to completion before anything is
/// persisted for that key: digest id permutation, salted items, MSO,
/// issuer signature, static auth data encoding, store write.
///
/// # Errors
/// Store failures pass through unchanged as [`Error::Store`]; signer
/// failures surface as [`Error::Signer`]; item and container failures
/// propagate from the codecs.
#[instrument(skip_all, fields(credential = %request.credential_name))]
pub async fn provision_credential(
    store: &impl CredentialStore, signer: &impl Signer, request: ProvisionRequest,
) -> Result<(), Error> {
    tracing::debug!("provision::personalize");

    store.delete_credential(&request.credential_name).await?;
    let mut writable =
        store.create_credential(&request.credential_name, &request.doc_type).await?;
    let _attestation = writable.certificate_chain(&request.challenge).await?;
    let _proof_of_provisioning = writable.personalize(&request.dataset).await?;

    tracing::debug!("provision::certify");

    let mut credential =
        store.credential(&request.credential_name, CipherSuite::default()).await?;
    credential.set_auth_key_policy(request.num_auth_keys, request.max_uses_per_key).await?;

    let signed = Utc::now();
    let valid_until = request.valid_until.unwrap_or(signed + Months::new(12));

    for auth_key in credential.auth_keys_needing_certification().await? {
        let data = certify_auth_key(signer, &request, &auth_key, signed, valid_until).await?;
        credential.store_static_auth_data(&auth_key, valid_until, &data).await?;
    }

    Ok(())
}

/// Build the signed static auth data bundle for one authentication key.
async fn certify_auth_key(
    signer: &impl Signer, request: &ProvisionRequest, auth_key: &AuthKey,
    signed: DateTime<Utc>, valid_until: DateTime<Utc>,
) -> Result<Vec<u8>, Error> {
    let dataset = &request.dataset;
    let mut id_gen = DigestIdGenerator::new(dataset.element_count());
    let mut value_digests = ValueDigests::new();
    let mut digest_id_mapping = DigestIdMapping::new();

    for (name_space, entries) in &dataset.name_spaces {
        for entry in entries {
            let element_value: Value = cbor::from_slice(&entry.value).map_err(|_| {
                Error::InvalidElementValue {
                    namespace: name_space.clone(),
                    element: entry.name.clone(),
                }
            })?;

            let item = IssuerSignedItem {
                digest_id: id_gen.generate(),
                random: thread_rng().gen::<[u8; 16]>().into(),
                element_identifier: entry.name.clone(),
                element_value,
            };
            let item_bytes = item.to_tagged_vec()?;

            // digest over the pre-redaction encoding; the stored item has
            // its value cleared
            let digest = request.digest_algorithm.digest(&item_bytes);
            value_digests
                .entry(name_space.clone())
                .or_default()
                .insert(item.digest_id, digest);
            digest_id_mapping
                .entry(name_space.clone())
                .or_default()
                .push(mdoc::redact(&item_bytes)?);
        }
    }

    let mso = MobileSecurityObject {
        version: Version::V1_0,
        digest_algorithm: request.digest_algorithm,
        value_digests,
        doc_type: request.doc_type.clone(),
        validity_info: ValidityInfo::new(signed, valid_until),
        device_key_info: DeviceKeyInfo::new(auth_key.public_key.clone()),
    };

    // IssuerAuth is a COSE_Sign1 where the payload is
    // MobileSecurityObjectBytes = #6.24(bstr .cbor MobileSecurityObject)
    let mso_bytes =
        Tag24(mso).to_vec().map_err(|e| Error::MalformedContainer(e.to_string()))?;
    let signature = signer.try_sign(&mso_bytes).await.map_err(Error::Signer)?;

    let protected = HeaderBuilder::new().algorithm(signer.algorithm().into()).build();
    let unprotected =
        HeaderBuilder::new().value(X5CHAIN, x5chain(signer.certificate_chain())).build();
    let issuer_auth = CoseSign1Builder::new()
        .protected(protected)
        .unprotected(unprotected)
        .payload(mso_bytes)
        .signature(signature)
        .build()
        .to_vec()
        .map_err(|e| Error::MalformedContainer(e.to_string()))?;

    StaticAuthData { digest_id_mapping, issuer_auth }.to_vec()
}

/// `x5chain` header value: a single certificate or an array (RFC 9360).
fn x5chain(mut certs: Vec<Vec<u8>>) -> Value {
    if certs.len() == 1 {
        Value::Bytes(certs.remove(0))
    } else {
        Value::Array(certs.into_iter().map(Value::Bytes).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dataset_counts_all_namespaces() {
        let dataset = Dataset::new()
            .with_entry("ns1", "a", vec![0x01])
            .with_entry("ns1", "b", vec![0x02])
            .with_entry("ns2", "c", vec![0x03]);
        assert_eq!(dataset.element_count(), 3);
        assert_eq!(dataset.name_spaces["ns1"].len(), 2);
    }

    #[test]
    fn x5chain_single_cert_is_bstr() {
        let single = x5chain(vec![vec![0x01, 0x02]]);
        assert_eq!(single, Value::Bytes(vec![0x01, 0x02]));

        let chain = x5chain(vec![vec![0x01], vec![0x02]]);
        assert_eq!(
            chain,
            Value::Array(vec![Value::Bytes(vec![0x01]), Value::Bytes(vec![0x02])])
        );
    }
}
