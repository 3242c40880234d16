//! Incremental certificate-request assembly
//!
//! A [`TbsCertRequest`] is built up field by field: independent setters each
//! validate their own input and mutate exactly one field, in any order. The
//! record is caller-owned for the whole build sequence; nothing here talks to
//! a backend except [`Session::set_public_key`](crate::session::Session),
//! which asks the key's owning backend for the encoded public key.

pub(crate) mod encode;
mod sign;

use std::{
    fs::File,
    io::Write,
    net::IpAddr,
    path::Path,
    str::FromStr,
};

use const_oid::db::{rfc5280, rfc8410, rfc5912};
use der::{
    asn1::{BitString, Ia5String, ObjectIdentifier, OctetString, SetOfVec, Utf8StringRef},
    Encode,
};
use pkcs8::spki::{AlgorithmIdentifierOwned, SubjectPublicKeyInfoOwned};
use serde::{Deserialize, Serialize};
pub use sign::SignedCertRequest;
pub(crate) use sign::sign_request;
use x509_cert::{
    attr::AttributeTypeAndValue,
    ext::pkix::{name::GeneralName, SubjectAltName},
    name::{Name, RdnSequence, RelativeDistinguishedName},
};

use crate::{
    error::{Error, Result},
    types::EncodeFormat,
};

/// PEM label of a certificate request
pub const CSR_PEM_TAG: &str = "CERTIFICATE REQUEST";
/// Legacy PEM label some tooling emits; accepted on import only
pub const CSR_PEM_TAG_LEGACY: &str = "NEW CERTIFICATE REQUEST";

const OID_CN: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.3");
const OID_C: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.6");
const OID_L: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.7");
const OID_ST: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.8");
const OID_O: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.10");
const OID_OU: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.11");

/// Key-usage flag bits, named-bit-list order per RFC 5280
pub mod key_usage {
    pub const DIGITAL_SIGNATURE: u16 = 0x8000;
    pub const NON_REPUDIATION: u16 = 0x4000;
    pub const KEY_ENCIPHERMENT: u16 = 0x2000;
    pub const DATA_ENCIPHERMENT: u16 = 0x1000;
    pub const KEY_AGREEMENT: u16 = 0x0800;
    pub const KEY_CERT_SIGN: u16 = 0x0400;
    pub const CRL_SIGN: u16 = 0x0200;
    pub const ENCIPHER_ONLY: u16 = 0x0100;
    pub const DECIPHER_ONLY: u16 = 0x0080;
}

/// Request subject, assembled into an X.501 distinguished name
///
/// Common name is required; the rest are optional.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct CsrSubject {
    pub common_name: String,
    pub organization: Option<String>,
    pub organizational_unit: Option<String>,
    pub country: Option<String>,
    pub state: Option<String>,
    pub locality: Option<String>,
}

impl CsrSubject {
    pub fn common_name(cn: impl Into<String>) -> Self {
        Self {
            common_name: cn.into(),
            ..Self::default()
        }
    }
}

impl FromStr for CsrSubject {
    type Err = Error;

    /// Parse a `"CN=test,O=Example,C=US"` style subject string
    fn from_str(s: &str) -> Result<Self> {
        let mut subject = CsrSubject::default();
        for part in s.split(',') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            let (key, value) = part
                .split_once('=')
                .ok_or_else(|| Error::BadParameter(format!("malformed subject part {part:?}")))?;
            let value = value.trim().to_string();
            match key.trim().to_ascii_uppercase().as_str() {
                "CN" => subject.common_name = value,
                "O" => subject.organization = Some(value),
                "OU" => subject.organizational_unit = Some(value),
                "C" => subject.country = Some(value),
                "ST" => subject.state = Some(value),
                "L" => subject.locality = Some(value),
                other => {
                    return Err(Error::BadParameter(format!(
                        "unsupported subject attribute {other:?}"
                    )))
                }
            }
        }
        Ok(subject)
    }
}

/// A single request extension: OID, criticality, DER-encoded payload
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CsrExtension {
    pub oid: ObjectIdentifier,
    pub critical: bool,
    pub value: Vec<u8>,
}

/// General-name choice for the subject-alternative-name setter
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum GeneralNameType {
    Dns,
    Email,
    Uri,
    Ip,
}

/// Signature algorithm selector, resolved to its OID at set time
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SignatureAlgorithm {
    Ed25519,
    EcdsaWithSha256,
    RsaWithSha256,
}

impl SignatureAlgorithm {
    pub fn oid(self) -> ObjectIdentifier {
        match self {
            SignatureAlgorithm::Ed25519 => rfc8410::ID_ED_25519,
            SignatureAlgorithm::EcdsaWithSha256 => rfc5912::ECDSA_WITH_SHA_256,
            SignatureAlgorithm::RsaWithSha256 => rfc5912::SHA_256_WITH_RSA_ENCRYPTION,
        }
    }
}

/// To-be-signed certificate request under construction
///
/// Owned exclusively by the caller for the lifetime of the build sequence.
/// Setters may run in any order; signing requires subject, public key, and
/// signature algorithm to have been set, and fails fast when they have not.
#[derive(Clone, Debug, Default)]
pub struct TbsCertRequest {
    version: Option<u8>,
    subject: Option<Name>,
    subject_public_key_info: Option<SubjectPublicKeyInfoOwned>,
    extensions: Vec<CsrExtension>,
    signature_algorithm: Option<AlgorithmIdentifierOwned>,
}

impl TbsCertRequest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the request version; only v1(0), v2(1), v3(2) exist
    pub fn set_version(&mut self, version: u32) -> Result<()> {
        if version > 2 {
            return Err(Error::BadParameter(format!(
                "version must be 0, 1 or 2, got {version}"
            )));
        }
        self.version = Some(version as u8);
        Ok(())
    }

    /// Replace the subject wholesale
    pub fn set_subject(&mut self, subject: &CsrSubject) -> Result<()> {
        self.subject = Some(build_distinguished_name(subject)?);
        Ok(())
    }

    /// Store backend-exported public key material (DER SubjectPublicKeyInfo)
    pub fn set_public_key_der(&mut self, spki_der: &[u8]) -> Result<()> {
        if spki_der.is_empty() {
            return Err(Error::bad_parameter("public key material is empty"));
        }
        self.subject_public_key_info = Some(encode::decode_spki(spki_der)?);
        Ok(())
    }

    /// Merge an extension into the request by OID
    ///
    /// An existing entry with the same OID is replaced in place; otherwise
    /// the extension is appended, preserving insertion order.
    pub fn add_extension(&mut self, ext: CsrExtension) {
        if let Some(existing) = self.extensions.iter_mut().find(|e| e.oid == ext.oid) {
            *existing = ext;
        } else {
            self.extensions.push(ext);
        }
    }

    /// Convenience: build and merge a subject-alternative-name extension
    pub fn set_subject_alt_name(
        &mut self,
        value: &str,
        critical: bool,
        name_type: GeneralNameType,
    ) -> Result<()> {
        if value.is_empty() {
            return Err(Error::bad_parameter("subject alternative name is empty"));
        }
        let general_name = match name_type {
            GeneralNameType::Dns => {
                GeneralName::DnsName(Ia5String::new(value).map_err(Error::encoding)?)
            }
            GeneralNameType::Email => {
                GeneralName::Rfc822Name(Ia5String::new(value).map_err(Error::encoding)?)
            }
            GeneralNameType::Uri => GeneralName::UniformResourceIdentifier(
                Ia5String::new(value).map_err(Error::encoding)?,
            ),
            GeneralNameType::Ip => {
                let addr: IpAddr = value
                    .parse()
                    .map_err(|_| Error::BadParameter(format!("invalid IP address {value:?}")))?;
                let octets = match addr {
                    IpAddr::V4(v4) => v4.octets().to_vec(),
                    IpAddr::V6(v6) => v6.octets().to_vec(),
                };
                GeneralName::IpAddress(OctetString::new(octets).map_err(Error::encoding)?)
            }
        };
        let san = SubjectAltName(vec![general_name]);
        self.add_extension(CsrExtension {
            oid: rfc5280::ID_CE_SUBJECT_ALT_NAME,
            critical,
            value: san.to_der().map_err(Error::encoding)?,
        });
        Ok(())
    }

    /// Convenience: build and merge a key-usage extension from flag bits
    pub fn set_key_usage(&mut self, critical: bool, bits: u16) -> Result<()> {
        if bits == 0 {
            return Err(Error::bad_parameter("key usage bits are empty"));
        }
        let bit_string = named_bit_string(bits)?;
        self.add_extension(CsrExtension {
            oid: rfc5280::ID_CE_KEY_USAGE,
            critical,
            value: bit_string.to_der().map_err(Error::encoding)?,
        });
        Ok(())
    }

    /// Select the signature algorithm for the eventual signing operation
    ///
    /// The algorithm parameters are copied from the stored public key so the
    /// identifier matches the key's own parameters (set the public key
    /// first; with no key stored the parameters stay absent).
    pub fn set_signature_algorithm(&mut self, algorithm: SignatureAlgorithm) -> Result<()> {
        let parameters = self
            .subject_public_key_info
            .as_ref()
            .and_then(|spki| spki.algorithm.parameters.clone());
        self.signature_algorithm = Some(AlgorithmIdentifierOwned {
            oid: algorithm.oid(),
            parameters,
        });
        Ok(())
    }

    pub fn version(&self) -> Option<u8> {
        self.version
    }

    pub fn subject(&self) -> Option<&Name> {
        self.subject.as_ref()
    }

    pub fn subject_public_key_info(&self) -> Option<&SubjectPublicKeyInfoOwned> {
        self.subject_public_key_info.as_ref()
    }

    pub fn extensions(&self) -> &[CsrExtension] {
        &self.extensions
    }

    pub fn signature_algorithm(&self) -> Option<&AlgorithmIdentifierOwned> {
        self.signature_algorithm.as_ref()
    }

    /// Serialize the request to canonical DER without signing it
    pub fn to_der(&self) -> Result<Vec<u8>> {
        encode::encode_tbs(self)
    }
}

pub(crate) fn build_distinguished_name(subject: &CsrSubject) -> Result<Name> {
    if subject.common_name.is_empty() {
        return Err(Error::bad_parameter("subject common name is required"));
    }

    let attributes: [(ObjectIdentifier, Option<&String>); 6] = [
        (OID_CN, Some(&subject.common_name)),
        (OID_O, subject.organization.as_ref()),
        (OID_OU, subject.organizational_unit.as_ref()),
        (OID_C, subject.country.as_ref()),
        (OID_ST, subject.state.as_ref()),
        (OID_L, subject.locality.as_ref()),
    ];

    let mut rdns = Vec::new();
    for (oid, value) in attributes {
        let Some(value) = value else { continue };
        let value = Utf8StringRef::new(value).map_err(Error::encoding)?;
        let mut set = SetOfVec::new();
        set.insert(AttributeTypeAndValue {
            oid,
            value: der::Any::from(value),
        })
        .map_err(Error::encoding)?;
        rdns.push(RelativeDistinguishedName(set));
    }

    Ok(Name::from(RdnSequence::from(rdns)))
}

/// Encode a named bit list per X.690: trailing zero bits are trimmed
fn named_bit_string(bits: u16) -> Result<BitString> {
    let used = 16 - bits.trailing_zeros() as usize;
    let bytes = bits.to_be_bytes();
    let (unused, content) = if used <= 8 {
        (8 - used, vec![bytes[0]])
    } else {
        (16 - used, bytes.to_vec())
    };
    BitString::new(unused as u8, content).map_err(Error::encoding)
}

/// Write an encoded request to a file, raw DER or PEM-armored
///
/// The observable contract is full output or none: a failed write removes
/// the partial file.
pub fn write_request_file(der: &[u8], format: EncodeFormat, path: &Path) -> Result<()> {
    if der.is_empty() {
        return Err(Error::bad_parameter("request bytes are empty"));
    }

    let payload = match format {
        EncodeFormat::Der => der.to_vec(),
        EncodeFormat::Pem => pem::encode(&pem::Pem::new(CSR_PEM_TAG, der.to_vec())).into_bytes(),
    };

    let mut file = File::create(path).map_err(|source| Error::OpenFile {
        path: path.to_path_buf(),
        source,
    })?;
    if let Err(source) = file.write_all(&payload) {
        drop(file);
        let _ = std::fs::remove_file(path);
        return Err(Error::WriteFile {
            path: path.to_path_buf(),
            source,
        });
    }
    Ok(())
}
