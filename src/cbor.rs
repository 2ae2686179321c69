//! # CBOR
//!
//! This module provides CBOR helper functions and the tag 24 wrapper used
//! for embedded, independently re-parseable structures.

use std::ops::Deref;

use anyhow::anyhow;
use ciborium::Value;
use serde::de::{self, DeserializeOwned, Deserializer};
use serde::ser::{self, Serializer};
use serde::{Deserialize, Serialize};

/// Serialize a value to a CBOR byte vector.
///
/// # Errors
/// Returns an error when the value cannot be represented in CBOR.
pub fn to_vec<T>(value: &T) -> anyhow::Result<Vec<u8>>
where
    T: Serialize,
{
    let mut buf = Vec::new();
    ciborium::into_writer(value, &mut buf)?;
    Ok(buf)
}

/// Deserialize a value from a CBOR byte slice.
///
/// # Errors
/// Returns an error when the bytes are not valid CBOR for the target type.
pub fn from_slice<T>(slice: &[u8]) -> anyhow::Result<T>
where
    T: DeserializeOwned,
{
    ciborium::from_reader(slice).map_err(|e| anyhow!("failed to decode CBOR: {e}"))
}

/// Wrap types whose encoded form is embedded as tagged bytes:
/// `#6.24(bstr .cbor T)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag24<T>(pub T);

impl<T> Deref for Tag24<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<T: Serialize> Tag24<T> {
    /// Serialize the tagged value to a CBOR byte vector.
    ///
    /// # Errors
    /// Returns an error when the inner value cannot be represented in CBOR.
    pub fn to_vec(&self) -> anyhow::Result<Vec<u8>> {
        to_vec(self)
    }
}

impl<T: DeserializeOwned> TryFrom<Value> for Tag24<T> {
    type Error = anyhow::Error;

    fn try_from(v: Value) -> anyhow::Result<Self> {
        match v {
            Value::Tag(24, value) => match value.as_ref() {
                Value::Bytes(bytes) => {
                    let inner: T = from_slice(bytes)?;
                    Ok(Self(inner))
                }
                _ => Err(anyhow!("tag 24 content is not a byte string")),
            },
            _ => Err(anyhow!("not a tag24: {v:?}")),
        }
    }
}

impl<T: Serialize> Serialize for Tag24<T> {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        let bytes = to_vec(&self.0).map_err(ser::Error::custom)?;
        Value::Tag(24, Box::new(Value::Bytes(bytes))).serialize(s)
    }
}

impl<'de, T: DeserializeOwned> Deserialize<'de> for Tag24<T> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        value.try_into().map_err(de::Error::custom)
    }
}
