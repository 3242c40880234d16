//! DER seams for the request builder
//!
//! All ASN.1 structure lives here: the to-be-signed request layout, the final
//! signed layout, and SPKI decoding. The rest of the crate treats these as
//! opaque byte-level collaborators.

use der::{
    asn1::{Any, BitString, OctetString},
    Decode, Encode, Sequence,
};
use pkcs8::spki::{AlgorithmIdentifierOwned, SubjectPublicKeyInfoOwned};
use x509_cert::{
    ext::{Extension, Extensions},
    name::Name,
};

use super::TbsCertRequest;
use crate::error::{Error, Result};

/// DER layout of the to-be-signed request
///
/// ```text
/// TbsRequest ::= SEQUENCE {
///     version                  INTEGER { v1(0), v2(1), v3(2) },
///     subject                  Name,
///     subjectPublicKeyInfo     SubjectPublicKeyInfo,
///     extensions           [0] IMPLICIT Extensions OPTIONAL }
/// ```
#[derive(Clone, Debug, Sequence)]
struct TbsRequestDer {
    version: u8,
    subject: Name,
    subject_public_key_info: SubjectPublicKeyInfoOwned,
    #[asn1(context_specific = "0", tag_mode = "IMPLICIT", optional = "true")]
    extensions: Option<Extensions>,
}

/// DER layout of the final signed request
#[derive(Clone, Debug, Sequence)]
pub(crate) struct SignedRequestDer {
    pub(crate) tbs: Any,
    pub(crate) signature_algorithm: AlgorithmIdentifierOwned,
    pub(crate) signature: BitString,
}

/// Serialize a completed to-be-signed request to canonical DER
///
/// Fails with `IncompleteRequest` when a required field has not been set;
/// version defaults to v1(0) when left unset.
pub(crate) fn encode_tbs(tbs: &TbsCertRequest) -> Result<Vec<u8>> {
    let subject = tbs
        .subject()
        .cloned()
        .ok_or_else(|| Error::incomplete_request("subject"))?;
    let spki = tbs
        .subject_public_key_info()
        .cloned()
        .ok_or_else(|| Error::incomplete_request("subjectPublicKeyInfo"))?;

    let extensions = if tbs.extensions().is_empty() {
        None
    } else {
        let mut out = Vec::with_capacity(tbs.extensions().len());
        for ext in tbs.extensions() {
            out.push(Extension {
                extn_id: ext.oid,
                critical: ext.critical,
                extn_value: OctetString::new(ext.value.clone()).map_err(Error::encoding)?,
            });
        }
        Some(out)
    };

    let der = TbsRequestDer {
        version: tbs.version().unwrap_or(0),
        subject,
        subject_public_key_info: spki,
        extensions,
    };
    der.to_der().map_err(Error::encoding)
}

/// Wrap an encoded TBS request and its signature into the final structure
pub(crate) fn assemble_signed(
    tbs_der: &[u8],
    algorithm: &AlgorithmIdentifierOwned,
    signature: &[u8],
) -> Result<Vec<u8>> {
    let signed = SignedRequestDer {
        tbs: Any::from_der(tbs_der).map_err(Error::encoding)?,
        signature_algorithm: algorithm.clone(),
        signature: BitString::from_bytes(signature).map_err(Error::encoding)?,
    };
    signed.to_der().map_err(Error::encoding)
}

/// Parse a signed request back into its three parts
pub(crate) fn parse_signed(der: &[u8]) -> Result<SignedRequestDer> {
    SignedRequestDer::from_der(der).map_err(Error::encoding)
}

/// Decode backend-exported public key material as SubjectPublicKeyInfo
pub(crate) fn decode_spki(der: &[u8]) -> Result<SubjectPublicKeyInfoOwned> {
    SubjectPublicKeyInfoOwned::from_der(der).map_err(Error::encoding)
}

/// Pull the SubjectPublicKeyInfo back out of an encoded TBS request
pub(crate) fn extract_spki(tbs_der: &[u8]) -> Result<SubjectPublicKeyInfoOwned> {
    let tbs = TbsRequestDer::from_der(tbs_der).map_err(Error::encoding)?;
    Ok(tbs.subject_public_key_info)
}
