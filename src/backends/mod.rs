//! Reference backend plugins
//!
//! Two in-tree backends exercise the dispatch core: a software keystore for
//! the database and token families, and a directory-backed CRL store for the
//! file family. Real deployments register their own plugins through the same
//! [`BackendPlugin`](crate::plugin::BackendPlugin) surface.

mod file;
mod memory;

pub use file::FileBackend;
pub use memory::MemoryBackend;
use x509_cert::{certificate::Certificate, crl::CertificateList};

use crate::{
    crl::ImportCrlParams,
    error::{Error, Result},
};
use der::Decode;

/// PEM label of a certificate artifact
pub(crate) const CERT_PEM_TAG: &str = "CERTIFICATE";

/// Parse certificate bytes in either PEM or DER encoding
pub(crate) fn parse_cert_bytes(bytes: &[u8]) -> Result<Certificate> {
    if bytes.starts_with(b"-----BEGIN") {
        let block = pem::parse(bytes).map_err(Error::encoding)?;
        if block.tag() != CERT_PEM_TAG {
            return Err(Error::Encoding(format!(
                "expected {CERT_PEM_TAG} PEM block, found {}",
                block.tag()
            )));
        }
        return Certificate::from_der(block.contents()).map_err(Error::encoding);
    }
    Certificate::from_der(bytes).map_err(Error::encoding)
}

/// Name a CRL is stored under: explicit name, or the source file stem
pub(crate) fn import_name(params: &ImportCrlParams) -> Result<String> {
    if let Some(name) = &params.name {
        if name.is_empty() {
            return Err(Error::bad_parameter("import: name must not be empty"));
        }
        return Ok(name.clone());
    }
    params
        .crl_file
        .file_stem()
        .and_then(|stem| stem.to_str())
        .map(str::to_string)
        .ok_or_else(|| Error::bad_parameter("import: cannot derive a name from crl_file"))
}

/// Check whether the certificate's serial appears in the CRL's revoked list
pub(crate) fn cert_listed_in_crl(crl: &CertificateList, cert_der: &[u8]) -> Result<bool> {
    let cert = Certificate::from_der(cert_der).map_err(Error::encoding)?;
    let serial = cert.tbs_certificate.serial_number;
    let listed = crl
        .tbs_cert_list
        .revoked_certificates
        .as_ref()
        .is_some_and(|revoked| {
            revoked
                .iter()
                .any(|entry| entry.serial_number.as_bytes() == serial.as_bytes())
        });
    Ok(listed)
}

/// Fixture builders for Ed25519-signed CRL and certificate artifacts
#[cfg(test)]
pub(crate) mod testutil {
    use std::time::Duration;

    use der::{asn1::UtcTime, Decode, Encode};
    use ed25519_dalek::{Signer, SigningKey};
    use pkcs8::{
        spki::{AlgorithmIdentifierOwned, SubjectPublicKeyInfoOwned},
        EncodePublicKey,
    };
    use time::OffsetDateTime;
    use x509_cert::{
        certificate::{Certificate, TbsCertificate, Version},
        crl::{CertificateList, RevokedCert, TbsCertList},
        der::asn1::BitString,
        name::Name,
        serial_number::SerialNumber,
        time::{Time, Validity},
    };

    use crate::csr::{build_distinguished_name, CsrSubject};

    pub(crate) fn ed25519_key() -> SigningKey {
        let mut seed = [0u8; 32];
        getrandom::fill(&mut seed).expect("entropy");
        SigningKey::from_bytes(&seed)
    }

    fn ed25519_alg() -> AlgorithmIdentifierOwned {
        AlgorithmIdentifierOwned {
            oid: const_oid::db::rfc8410::ID_ED_25519,
            parameters: None,
        }
    }

    fn name(cn: &str) -> Name {
        build_distinguished_name(&CsrSubject::common_name(cn)).expect("subject")
    }

    fn utc(offset_secs: i64) -> Time {
        let secs = OffsetDateTime::now_utc().unix_timestamp() + offset_secs;
        Time::UtcTime(UtcTime::from_unix_duration(Duration::from_secs(secs as u64)).expect("time"))
    }

    fn spki(key: &SigningKey) -> SubjectPublicKeyInfoOwned {
        let der = key
            .verifying_key()
            .to_public_key_der()
            .expect("spki")
            .into_vec();
        SubjectPublicKeyInfoOwned::from_der(&der).expect("spki decode")
    }

    /// Build a DER-encoded CRL signed by `key`, revoking the given serials
    pub(crate) fn build_crl(
        key: &SigningKey,
        issuer_cn: &str,
        revoked_serials: &[&[u8]],
        this_update_offset: i64,
        next_update_offset: i64,
    ) -> Vec<u8> {
        let revoked: Vec<RevokedCert> = revoked_serials
            .iter()
            .map(|serial| RevokedCert {
                serial_number: SerialNumber::new(serial).expect("serial"),
                revocation_date: utc(this_update_offset),
                crl_entry_extensions: None,
            })
            .collect();

        let tbs = TbsCertList {
            version: Version::V2,
            signature: ed25519_alg(),
            issuer: name(issuer_cn),
            this_update: utc(this_update_offset),
            next_update: Some(utc(next_update_offset)),
            revoked_certificates: if revoked.is_empty() {
                None
            } else {
                Some(revoked)
            },
            crl_extensions: None,
        };

        let tbs_der = tbs.to_der().expect("tbs der");
        let signature = key.sign(&tbs_der);
        let crl = CertificateList {
            tbs_cert_list: tbs,
            signature_algorithm: ed25519_alg(),
            signature: BitString::from_bytes(&signature.to_bytes()).expect("sig"),
        };
        crl.to_der().expect("crl der")
    }

    /// Build a DER-encoded self-signed certificate for `key`
    pub(crate) fn build_cert(key: &SigningKey, subject_cn: &str, serial: &[u8]) -> Vec<u8> {
        let subject = name(subject_cn);
        let tbs = TbsCertificate {
            version: Version::V3,
            serial_number: SerialNumber::new(serial).expect("serial"),
            signature: ed25519_alg(),
            issuer: subject.clone(),
            validity: Validity {
                not_before: utc(-3600),
                not_after: utc(365 * 24 * 3600),
            },
            subject,
            subject_public_key_info: spki(key),
            issuer_unique_id: None,
            subject_unique_id: None,
            extensions: None,
        };

        let tbs_der = tbs.to_der().expect("tbs der");
        let signature = key.sign(&tbs_der);
        let cert = Certificate {
            tbs_certificate: tbs,
            signature_algorithm: ed25519_alg(),
            signature: BitString::from_bytes(&signature.to_bytes()).expect("sig"),
        };
        cert.to_der().expect("cert der")
    }
}
