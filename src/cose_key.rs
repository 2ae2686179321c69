//! An implementation of RFC 8152 `COSE_Key` restricted to the requirements
//! of ISO/IEC 18013-5: elliptic curve (`Ec2`) and octet key pair (`Okp`)
//! keys, encoded as an untagged CBOR map with integer labels.

use ciborium::Value;
use serde::{Deserialize, Serialize};

/// A `COSE_Key` public key, as carried in the MSO's `deviceKey` element.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(try_from = "ciborium::Value", into = "ciborium::Value")]
pub enum CoseKey {
    /// Elliptic curve key (kty 2).
    Ec2 {
        /// Curve identifier.
        crv: Ec2Curve,
        /// X coordinate.
        x: Vec<u8>,
        /// Y coordinate, either a full value or a point-compression sign bit.
        y: Ec2y,
    },
    /// Octet key pair (kty 1).
    Okp {
        /// Curve identifier.
        crv: OkpCurve,
        /// Public key bytes.
        x: Vec<u8>,
    },
}

/// The value or sign bit of the y-coordinate for an EC point.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Ec2y {
    /// Full y-coordinate.
    Value(Vec<u8>),
    /// Point-compression sign bit.
    SignBit(bool),
}

/// RFC 8152 curve identifiers for the `Ec2` key type.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Ec2Curve {
    /// NIST P-256 (1).
    P256,
    /// NIST P-384 (2).
    P384,
    /// NIST P-521 (3).
    P521,
}

/// RFC 8152 curve identifiers for the `Okp` key type.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OkpCurve {
    /// X25519 (4).
    X25519,
    /// Ed25519 (6).
    Ed25519,
}

/// Errors that can occur when converting a `COSE_Key`.
#[derive(Clone, Debug, thiserror::Error)]
pub enum Error {
    /// Key is not a CBOR map.
    #[error("COSE_Key is not a map")]
    NotAMap,
    /// Map labels are not integers.
    #[error("COSE_Key label is not an integer")]
    InvalidLabel,
    /// Key type is absent or not `Ec2`/`Okp`.
    #[error("unsupported COSE_Key key type")]
    UnsupportedKeyType,
    /// Curve identifier is absent or not supported.
    #[error("unsupported COSE_Key curve")]
    UnsupportedCurve,
    /// X coordinate is absent or not a byte string.
    #[error("COSE_Key x coordinate is missing or invalid")]
    InvalidX,
    /// Y coordinate is absent or neither a byte string nor a bool.
    #[error("COSE_Key y coordinate is missing or invalid")]
    InvalidY,
}

const KTY: i128 = 1;
const CRV: i128 = -1;
const X: i128 = -2;
const Y: i128 = -3;

const KTY_OKP: i128 = 1;
const KTY_EC2: i128 = 2;

impl From<CoseKey> for Value {
    fn from(key: CoseKey) -> Self {
        let label = |l: i128| Self::Integer((l as i64).into());
        match key {
            CoseKey::Ec2 { crv, x, y } => Self::Map(vec![
                (label(KTY), label(KTY_EC2)),
                (label(CRV), label(crv.label())),
                (label(X), Self::Bytes(x)),
                (label(Y), y.into()),
            ]),
            CoseKey::Okp { crv, x } => Self::Map(vec![
                (label(KTY), label(KTY_OKP)),
                (label(CRV), label(crv.label())),
                (label(X), Self::Bytes(x)),
            ]),
        }
    }
}

impl TryFrom<Value> for CoseKey {
    type Error = Error;

    fn try_from(v: Value) -> Result<Self, Error> {
        let Value::Map(entries) = v else {
            return Err(Error::NotAMap);
        };

        let mut kty = None;
        let mut crv = None;
        let mut x = None;
        let mut y = None;
        for (key, value) in entries {
            let label: i128 =
                key.as_integer().ok_or(Error::InvalidLabel)?.into();
            match label {
                KTY => kty = value.as_integer().map(i128::from),
                CRV => crv = value.as_integer().map(i128::from),
                X => x = value.into_bytes().ok(),
                Y => y = Some(value),
                _ => {}
            }
        }

        let crv = crv.ok_or(Error::UnsupportedCurve)?;
        let x = x.ok_or(Error::InvalidX)?;

        match kty {
            Some(KTY_EC2) => {
                let crv = match crv {
                    1 => Ec2Curve::P256,
                    2 => Ec2Curve::P384,
                    3 => Ec2Curve::P521,
                    _ => return Err(Error::UnsupportedCurve),
                };
                let y = y.ok_or(Error::InvalidY)?.try_into()?;
                Ok(Self::Ec2 { crv, x, y })
            }
            Some(KTY_OKP) => {
                let crv = match crv {
                    4 => OkpCurve::X25519,
                    6 => OkpCurve::Ed25519,
                    _ => return Err(Error::UnsupportedCurve),
                };
                Ok(Self::Okp { crv, x })
            }
            _ => Err(Error::UnsupportedKeyType),
        }
    }
}

impl Ec2Curve {
    const fn label(self) -> i128 {
        match self {
            Self::P256 => 1,
            Self::P384 => 2,
            Self::P521 => 3,
        }
    }
}

impl OkpCurve {
    const fn label(self) -> i128 {
        match self {
            Self::X25519 => 4,
            Self::Ed25519 => 6,
        }
    }
}

impl From<Ec2y> for Value {
    fn from(y: Ec2y) -> Self {
        match y {
            Ec2y::Value(bytes) => Self::Bytes(bytes),
            Ec2y::SignBit(bit) => Self::Bool(bit),
        }
    }
}

impl TryFrom<Value> for Ec2y {
    type Error = Error;

    fn try_from(v: Value) -> Result<Self, Error> {
        match v {
            Value::Bytes(bytes) => Ok(Self::Value(bytes)),
            Value::Bool(bit) => Ok(Self::SignBit(bit)),
            _ => Err(Error::InvalidY),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::cbor;

    use super::*;

    #[test]
    fn okp_round_trip() {
        let key = CoseKey::Okp {
            crv: OkpCurve::Ed25519,
            x: vec![0x5a; 32],
        };
        let bytes = cbor::to_vec(&key).expect("should encode");
        let decoded: CoseKey = cbor::from_slice(&bytes).expect("should decode");
        assert_eq!(key, decoded);
    }

    #[test]
    fn ec2_round_trip() {
        let key = CoseKey::Ec2 {
            crv: Ec2Curve::P256,
            x: vec![0x01; 32],
            y: Ec2y::Value(vec![0x02; 32]),
        };
        let bytes = cbor::to_vec(&key).expect("should encode");
        let decoded: CoseKey = cbor::from_slice(&bytes).expect("should decode");
        assert_eq!(key, decoded);
    }

    #[test]
    fn rejects_unknown_key_type() {
        let value = Value::Map(vec![(
            Value::Integer(1.into()),
            Value::Integer(99.into()),
        )]);
        assert!(CoseKey::try_from(value).is_err());
    }
}
