//! End-to-end provisioning tests against an in-memory credential store and
//! a fixed-key Ed25519 issuing authority.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use ciborium::Value;
use coset::{CborSerializable, CoseSign1};
use ed25519_dalek::{Signature, Signer as _, SigningKey, Verifier as _};
use mdoc_auth::cbor::Tag24;
use mdoc_auth::{
    attach_value, cbor, merge_issuer_signed, provision_credential, Algorithm, AuthKey,
    CipherSuite, CoseKey, Credential, CredentialStore, Dataset, DigestAlgorithm, Error,
    IssuerSignedItem, MobileSecurityObject, OkpCurve, ProvisionRequest, Signer, StaticAuthData,
    StoreError, Version, WritableCredential,
};

const DOC_TYPE: &str = "org.iso.18013.5.1.mDL";

struct TestSigner {
    key: SigningKey,
}

impl TestSigner {
    fn new() -> Self {
        Self { key: SigningKey::from_bytes(&[11u8; 32]) }
    }

    fn verifying_key(&self) -> ed25519_dalek::VerifyingKey {
        self.key.verifying_key()
    }
}

impl Signer for TestSigner {
    fn algorithm(&self) -> Algorithm {
        Algorithm::EdDSA
    }

    fn certificate_chain(&self) -> Vec<Vec<u8>> {
        vec![b"issuing-authority-cert".to_vec()]
    }

    async fn try_sign(&self, msg: &[u8]) -> anyhow::Result<Vec<u8>> {
        Ok(self.key.sign(msg).to_bytes().to_vec())
    }
}

/// Static auth data persisted for one auth key: certificate, expiry, bytes.
type Persisted = Vec<(Vec<u8>, DateTime<Utc>, Vec<u8>)>;

#[derive(Clone)]
struct TestStore {
    auth_keys: Vec<AuthKey>,
    persisted: Arc<Mutex<BTreeMap<String, Persisted>>>,
    pre_personalized: bool,
}

impl TestStore {
    fn new(auth_keys: Vec<AuthKey>) -> Self {
        Self {
            auth_keys,
            persisted: Arc::new(Mutex::new(BTreeMap::new())),
            pre_personalized: false,
        }
    }

    fn persisted(&self, name: &str) -> Persisted {
        self.persisted.lock().unwrap().get(name).cloned().unwrap_or_default()
    }
}

struct TestWritable;

impl WritableCredential for TestWritable {
    async fn certificate_chain(&self, _challenge: &[u8]) -> Result<Vec<Vec<u8>>, StoreError> {
        Ok(vec![b"credential-key-cert".to_vec()])
    }

    async fn personalize(&mut self, _dataset: &Dataset) -> Result<Vec<u8>, StoreError> {
        Ok(b"proof-of-provisioning-signature".to_vec())
    }
}

struct TestCredential {
    name: String,
    auth_keys: Vec<AuthKey>,
    persisted: Arc<Mutex<BTreeMap<String, Persisted>>>,
}

impl Credential for TestCredential {
    async fn set_auth_key_policy(
        &mut self, _count: usize, _max_uses_per_key: usize,
    ) -> Result<(), StoreError> {
        Ok(())
    }

    async fn auth_keys_needing_certification(&self) -> Result<Vec<AuthKey>, StoreError> {
        Ok(self.auth_keys.clone())
    }

    async fn store_static_auth_data(
        &mut self, auth_key: &AuthKey, valid_until: DateTime<Utc>, data: &[u8],
    ) -> Result<(), StoreError> {
        self.persisted
            .lock()
            .unwrap()
            .entry(self.name.clone())
            .or_default()
            .push((auth_key.certificate.clone(), valid_until, data.to_vec()));
        Ok(())
    }
}

impl CredentialStore for TestStore {
    type Writable = TestWritable;
    type Credential = TestCredential;

    async fn delete_credential(&self, name: &str) -> Result<(), StoreError> {
        self.persisted.lock().unwrap().remove(name);
        Ok(())
    }

    async fn create_credential(
        &self, _name: &str, doc_type: &str,
    ) -> Result<TestWritable, StoreError> {
        if doc_type != DOC_TYPE {
            return Err(StoreError::DocTypeNotSupported(doc_type.to_string()));
        }
        if self.pre_personalized {
            return Err(StoreError::AlreadyPersonalized);
        }
        Ok(TestWritable)
    }

    async fn credential(
        &self, name: &str, _cipher_suite: CipherSuite,
    ) -> Result<TestCredential, StoreError> {
        Ok(TestCredential {
            name: name.to_string(),
            auth_keys: self.auth_keys.clone(),
            persisted: Arc::clone(&self.persisted),
        })
    }
}

fn auth_key(seed: u8) -> AuthKey {
    let key = SigningKey::from_bytes(&[seed; 32]);
    AuthKey {
        certificate: vec![seed; 8],
        public_key: CoseKey::Okp {
            crv: OkpCurve::Ed25519,
            x: key.verifying_key().as_bytes().to_vec(),
        },
    }
}

fn request(dataset: Dataset) -> ProvisionRequest {
    ProvisionRequest {
        credential_name: "test-mdl".into(),
        doc_type: DOC_TYPE.into(),
        dataset,
        num_auth_keys: 1,
        max_uses_per_key: 1,
        challenge: b"attestation-challenge".to_vec(),
        valid_until: None,
        digest_algorithm: DigestAlgorithm::Sha256,
    }
}

#[tokio::test]
async fn provision_then_decode_and_merge() {
    let store = TestStore::new(vec![auth_key(3)]);
    let signer = TestSigner::new();

    // "x" -> 1 and "y" -> 2, as encoded CBOR
    let dataset =
        Dataset::new().with_entry("ns", "x", vec![0x01]).with_entry("ns", "y", vec![0x02]);
    provision_credential(&store, &signer, request(dataset)).await.expect("should provision");

    let persisted = store.persisted("test-mdl");
    assert_eq!(persisted.len(), 1);
    let (certificate, _valid_until, bundle) = &persisted[0];
    assert_eq!(certificate, &vec![3u8; 8]);

    // the persisted bundle decodes into two redacted items under "ns"
    let auth = StaticAuthData::from_slice(bundle).expect("should decode");
    let items = &auth.digest_id_mapping["ns"];
    assert_eq!(items.len(), 2);
    for item_bytes in items {
        let item = IssuerSignedItem::from_tagged_slice(item_bytes).expect("should decode");
        assert!(item.element_value.is_null());
        assert_eq!(item.random.len(), 16);
    }

    // recover the MSO through the signer's verification path
    let sign1 = CoseSign1::from_slice(&auth.issuer_auth).expect("should parse COSE_Sign1");
    sign1
        .verify_signature(b"", |sig, data| {
            let sig = Signature::from_slice(sig)?;
            signer.verifying_key().verify(data, &sig)
        })
        .expect("signature should verify");

    let payload = sign1.payload.expect("should have payload");
    let Tag24(mso): Tag24<MobileSecurityObject> =
        cbor::from_slice(&payload).expect("should decode MSO");
    assert_eq!(mso.version, Version::V1_0);
    assert_eq!(mso.digest_algorithm, DigestAlgorithm::Sha256);
    assert_eq!(mso.doc_type, DOC_TYPE);

    // digest ids are exactly {0, 1}, one digest per element
    let digests = &mso.value_digests["ns"];
    assert_eq!(digests.len(), 2);
    let ids: Vec<u32> = digests.keys().copied().collect();
    assert_eq!(ids, vec![0, 1]);

    // each digest matches the SHA-256 of the pre-redaction item bytes
    let originals: BTreeMap<&str, Value> =
        BTreeMap::from([("x", Value::Integer(1.into())), ("y", Value::Integer(2.into()))]);
    for item_bytes in items {
        let item = IssuerSignedItem::from_tagged_slice(item_bytes).expect("should decode");
        let value = originals[item.element_identifier.as_str()].clone();
        let with_value = attach_value(item_bytes, value).expect("should attach");
        assert_eq!(digests[&item.digest_id], DigestAlgorithm::Sha256.digest(&with_value));
    }

    // disclosing only "x" merges a single item carrying its value
    let mut disclosed: BTreeMap<String, BTreeMap<String, Vec<u8>>> = BTreeMap::new();
    disclosed.entry("ns".into()).or_default().insert("x".into(), vec![0x01]);
    let merged = merge_issuer_signed(&auth.digest_id_mapping, &disclosed).expect("should merge");
    assert_eq!(merged.len(), 1);
    assert_eq!(merged["ns"].len(), 1);
    let item = IssuerSignedItem::from_tagged_slice(&merged["ns"][0]).expect("should decode");
    assert_eq!(item.element_identifier, "x");
    assert_eq!(item.element_value, Value::Integer(1.into()));
}

#[tokio::test]
async fn each_auth_key_gets_fresh_salts() {
    let store = TestStore::new(vec![auth_key(3), auth_key(4)]);
    let signer = TestSigner::new();

    let dataset = Dataset::new().with_entry("ns", "x", vec![0x01]);
    provision_credential(&store, &signer, request(dataset)).await.expect("should provision");

    let persisted = store.persisted("test-mdl");
    assert_eq!(persisted.len(), 2);

    let item_for = |bundle: &[u8]| {
        let auth = StaticAuthData::from_slice(bundle).expect("should decode");
        IssuerSignedItem::from_tagged_slice(&auth.digest_id_mapping["ns"][0])
            .expect("should decode")
    };
    let first = item_for(&persisted[0].2);
    let second = item_for(&persisted[1].2);

    assert_eq!(first.element_identifier, second.element_identifier);
    assert_ne!(first.random, second.random);
}

#[tokio::test]
async fn unsupported_doc_type_is_terminal() {
    let store = TestStore::new(vec![auth_key(3)]);
    let signer = TestSigner::new();

    let mut req = request(Dataset::new().with_entry("ns", "x", vec![0x01]));
    req.doc_type = "org.example.other".into();

    let err = provision_credential(&store, &signer, req).await.expect_err("should fail");
    assert!(matches!(err, Error::Store(StoreError::DocTypeNotSupported(_))));
    assert!(store.persisted("test-mdl").is_empty());
}

#[tokio::test]
async fn already_personalized_is_terminal() {
    let mut store = TestStore::new(vec![auth_key(3)]);
    store.pre_personalized = true;
    let signer = TestSigner::new();

    let req = request(Dataset::new().with_entry("ns", "x", vec![0x01]));
    let err = provision_credential(&store, &signer, req).await.expect_err("should fail");
    assert!(matches!(err, Error::Store(StoreError::AlreadyPersonalized)));
}

#[tokio::test]
async fn invalid_dataset_value_is_rejected() {
    let store = TestStore::new(vec![auth_key(3)]);
    let signer = TestSigner::new();

    // an empty byte string is not valid CBOR
    let req = request(Dataset::new().with_entry("ns", "x", vec![]));
    let err = provision_credential(&store, &signer, req).await.expect_err("should fail");
    assert!(matches!(
        err,
        Error::InvalidElementValue { namespace, element }
            if namespace == "ns" && element == "x"
    ));
    assert!(store.persisted("test-mdl").is_empty());
}
