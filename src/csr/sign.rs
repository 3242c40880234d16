//! Signing coordination
//!
//! Serializes a completed to-be-signed request, hands the bytes to the
//! signing backend resolved from the key handle, and wraps the backend's
//! final encoding. Failure at any step surfaces as `Err`; a partially signed
//! buffer is never observable.

use std::path::Path;

use const_oid::db::rfc8410;
use der::Encode;
use ed25519_dalek::{Signature, VerifyingKey};
use pkcs8::DecodePublicKey;

use super::{encode, TbsCertRequest, CSR_PEM_TAG, CSR_PEM_TAG_LEGACY};
use crate::{
    error::{Error, Result},
    plugin::{self, BackendRegistry, OperationId},
    types::{EncodeFormat, KeyHandle},
};

/// Sign a completed request with the given backend key
///
/// Preconditions (checked here, not in the setters): subject, public key and
/// signature algorithm must all have been set.
pub(crate) fn sign_request(
    registry: &BackendRegistry,
    tbs: &TbsCertRequest,
    signing_key: &KeyHandle,
) -> Result<SignedCertRequest> {
    let algorithm = tbs
        .signature_algorithm()
        .ok_or_else(|| Error::incomplete_request("signatureAlgorithm"))?;

    let tbs_der = encode::encode_tbs(tbs)?;

    let plugin = registry.resolve(signing_key.keystore_type)?;
    let op = plugin::table_op(plugin, OperationId::SignRequest, &plugin.ops().sign_request)?;
    let signed_der = op(&tbs_der, signing_key, algorithm)?;

    Ok(SignedCertRequest { der: signed_der })
}

/// A signed, encoded certificate request
///
/// Only produced by a successful signing operation or parsed from existing
/// bytes; there is no empty or partially filled value of this type.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SignedCertRequest {
    der: Vec<u8>,
}

impl SignedCertRequest {
    /// Parse a signed request from DER
    pub fn from_der(der: &[u8]) -> Result<Self> {
        encode::parse_signed(der)?;
        Ok(Self { der: der.to_vec() })
    }

    /// Parse a signed request from PEM armor
    ///
    /// Accepts both the standard and the legacy request labels.
    pub fn from_pem(pem_text: &str) -> Result<Self> {
        let block = pem::parse(pem_text).map_err(Error::encoding)?;
        if block.tag() != CSR_PEM_TAG && block.tag() != CSR_PEM_TAG_LEGACY {
            return Err(Error::Encoding(format!(
                "expected {CSR_PEM_TAG} PEM block, found {}",
                block.tag()
            )));
        }
        Self::from_der(block.contents())
    }

    pub fn as_der(&self) -> &[u8] {
        &self.der
    }

    pub fn into_der(self) -> Vec<u8> {
        self.der
    }

    pub fn len(&self) -> usize {
        self.der.len()
    }

    pub fn is_empty(&self) -> bool {
        self.der.is_empty()
    }

    pub fn to_pem(&self) -> String {
        pem::encode(&pem::Pem::new(CSR_PEM_TAG, self.der.clone()))
    }

    /// Write the request to a file in the chosen encoding
    pub fn write_to_file(&self, format: EncodeFormat, path: &Path) -> Result<()> {
        super::write_request_file(&self.der, format, path)
    }

    /// Verify the request's signature against its own embedded public key
    ///
    /// Only Ed25519-signed requests can be checked locally.
    pub fn verify_signature(&self) -> Result<()> {
        let signed = encode::parse_signed(&self.der)?;
        if signed.signature_algorithm.oid != rfc8410::ID_ED_25519 {
            return Err(Error::Encoding(format!(
                "cannot verify signature algorithm {}",
                signed.signature_algorithm.oid
            )));
        }

        let tbs_der = signed.tbs.to_der().map_err(Error::encoding)?;
        let spki = encode::extract_spki(&tbs_der)?;
        let spki_der = spki.to_der().map_err(Error::encoding)?;
        let verifying_key =
            VerifyingKey::from_public_key_der(&spki_der).map_err(Error::encoding)?;

        let sig_bytes = signed
            .signature
            .as_bytes()
            .ok_or_else(|| Error::encoding("signature bit string has unused bits"))?;
        let signature = Signature::from_slice(sig_bytes).map_err(Error::encoding)?;

        verifying_key
            .verify_strict(&tbs_der, &signature)
            .map_err(|_| Error::backend("request signature verification failed"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        backends::MemoryBackend,
        csr::{CsrSubject, GeneralNameType, SignatureAlgorithm},
        error::ErrorKind,
        session::Session,
        types::KeystoreType,
    };

    fn session_with_database_backend() -> (Session, KeyHandle) {
        let backend = MemoryBackend::new(KeystoreType::Database);
        let key = backend.generate_key().unwrap();
        let mut registry = BackendRegistry::new();
        registry.register(backend.plugin());
        (Session::new(registry), key)
    }

    #[test]
    fn full_build_and_sign_produces_a_verifiable_request() {
        let (session, key) = session_with_database_backend();

        let mut tbs = TbsCertRequest::new();
        tbs.set_version(1).unwrap();
        tbs.set_subject(&"CN=test".parse::<CsrSubject>().unwrap())
            .unwrap();
        session.set_public_key(&mut tbs, &key).unwrap();
        tbs.set_subject_alt_name("test.example.com", false, GeneralNameType::Dns)
            .unwrap();
        tbs.set_signature_algorithm(SignatureAlgorithm::Ed25519)
            .unwrap();

        let signed = session.sign_request(&tbs, &key).unwrap();
        assert!(!signed.is_empty());
        signed.verify_signature().unwrap();
    }

    #[test]
    fn signing_without_public_key_is_incomplete_request() {
        let (session, key) = session_with_database_backend();

        let mut tbs = TbsCertRequest::new();
        tbs.set_version(0).unwrap();
        tbs.set_subject(&CsrSubject::common_name("test")).unwrap();
        tbs.set_signature_algorithm(SignatureAlgorithm::Ed25519)
            .unwrap();

        let err = session.sign_request(&tbs, &key).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IncompleteRequest);
    }

    #[test]
    fn signing_without_algorithm_is_incomplete_request() {
        let (session, key) = session_with_database_backend();

        let mut tbs = TbsCertRequest::new();
        tbs.set_subject(&CsrSubject::common_name("test")).unwrap();
        session.set_public_key(&mut tbs, &key).unwrap();

        let err = session.sign_request(&tbs, &key).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IncompleteRequest);
    }

    #[test]
    fn signing_with_unregistered_keystore_is_plugin_not_found() {
        let (session, key) = session_with_database_backend();

        let mut tbs = TbsCertRequest::new();
        tbs.set_subject(&CsrSubject::common_name("test")).unwrap();
        session.set_public_key(&mut tbs, &key).unwrap();
        tbs.set_signature_algorithm(SignatureAlgorithm::Ed25519)
            .unwrap();

        let token_key = KeyHandle {
            keystore_type: KeystoreType::Token,
            ..key
        };
        let err = session.sign_request(&tbs, &token_key).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PluginNotFound);
    }

    #[test]
    fn pem_round_trip_preserves_der() {
        let (session, key) = session_with_database_backend();

        let mut tbs = TbsCertRequest::new();
        tbs.set_subject(&CsrSubject::common_name("pem.example.com"))
            .unwrap();
        session.set_public_key(&mut tbs, &key).unwrap();
        tbs.set_signature_algorithm(SignatureAlgorithm::Ed25519)
            .unwrap();
        let signed = session.sign_request(&tbs, &key).unwrap();

        let pem_text = signed.to_pem();
        let parsed = SignedCertRequest::from_pem(&pem_text).unwrap();
        assert_eq!(parsed, signed);

        // Legacy label is accepted too
        let legacy = pem::encode(&pem::Pem::new(CSR_PEM_TAG_LEGACY, signed.as_der().to_vec()));
        SignedCertRequest::from_pem(&legacy).unwrap();

        let wrong = pem::encode(&pem::Pem::new("CERTIFICATE", signed.as_der().to_vec()));
        assert!(SignedCertRequest::from_pem(&wrong).is_err());
    }
}
