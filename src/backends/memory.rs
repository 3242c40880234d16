//! In-memory Ed25519 keystore backend
//!
//! Serves the database and token families. Key material never leaves the
//! process; callers only ever hold opaque [`KeyHandle`]s. The token family
//! variant registers no CRL operations, so CRL verbs aimed at it surface as
//! unsupported rather than silently touching the wrong store.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, RwLock},
};

use const_oid::db::rfc8410;
use ed25519_dalek::{Signer, SigningKey};
use pkcs8::EncodePublicKey;

use super::{cert_listed_in_crl, import_name};
use crate::{
    crl::{
        self, DeleteCrlParams, FindCertInCrlParams, FindCrlParams, ImportCrlParams, ListCrlParams,
    },
    csr::encode,
    error::{Error, Result},
    plugin::{BackendPlugin, OperationTable},
    types::{Algorithm, KeyHandle, KeystoreType},
};

/// Process-local keystore holding Ed25519 seeds and, for the database
/// family, imported CRLs
pub struct MemoryBackend {
    keystore_type: KeystoreType,
    keys: RwLock<HashMap<u64, SigningKey>>,
    next_id: Mutex<u64>,
    crls: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryBackend {
    pub fn new(keystore_type: KeystoreType) -> Arc<Self> {
        Arc::new(Self {
            keystore_type,
            keys: RwLock::new(HashMap::new()),
            next_id: Mutex::new(1),
            crls: RwLock::new(HashMap::new()),
        })
    }

    pub fn keystore_type(&self) -> KeystoreType {
        self.keystore_type
    }

    /// Generate a fresh Ed25519 key and return its handle
    pub fn generate_key(&self) -> Result<KeyHandle> {
        let mut seed = [0u8; 32];
        getrandom::fill(&mut seed)
            .map_err(|e| Error::Key(format!("entropy source failed: {e}")))?;
        let key = SigningKey::from_bytes(&seed);

        let id = {
            let mut next = self
                .next_id
                .lock()
                .map_err(|_| Error::backend("keystore lock poisoned"))?;
            let id = *next;
            *next += 1;
            id
        };
        self.keys
            .write()
            .map_err(|_| Error::backend("keystore lock poisoned"))?
            .insert(id, key);

        Ok(KeyHandle::new(self.keystore_type, id, Algorithm::Ed25519))
    }

    fn signing_key(&self, handle: &KeyHandle) -> Result<SigningKey> {
        if handle.keystore_type != self.keystore_type {
            return Err(Error::Key(format!(
                "key belongs to {:?}, not {:?}",
                handle.keystore_type, self.keystore_type
            )));
        }
        if handle.algorithm != Algorithm::Ed25519 {
            return Err(Error::Key(format!(
                "unsupported key algorithm {:?}",
                handle.algorithm
            )));
        }
        self.keys
            .read()
            .map_err(|_| Error::backend("keystore lock poisoned"))?
            .get(&handle.id)
            .cloned()
            .ok_or_else(|| Error::key_not_found(handle))
    }

    fn export_public_key(&self, handle: &KeyHandle) -> Result<Vec<u8>> {
        let key = self.signing_key(handle)?;
        Ok(key
            .verifying_key()
            .to_public_key_der()
            .map_err(Error::encoding)?
            .into_vec())
    }

    fn sign_request(
        &self,
        tbs_der: &[u8],
        handle: &KeyHandle,
        algorithm: &pkcs8::spki::AlgorithmIdentifierOwned,
    ) -> Result<Vec<u8>> {
        if algorithm.oid != rfc8410::ID_ED_25519 {
            return Err(Error::Backend(format!(
                "cannot sign with algorithm {}",
                algorithm.oid
            )));
        }
        let key = self.signing_key(handle)?;
        let signature = key.sign(tbs_der);
        encode::assemble_signed(tbs_der, algorithm, &signature.to_bytes())
    }

    fn import_crl(&self, params: &ImportCrlParams) -> Result<()> {
        let bytes = std::fs::read(&params.crl_file)?;
        crl::parse_crl_bytes(&bytes)?;
        let name = import_name(params)?;
        self.crls
            .write()
            .map_err(|_| Error::backend("crl store lock poisoned"))?
            .insert(name, bytes);
        Ok(())
    }

    fn delete_crl(&self, params: &DeleteCrlParams) -> Result<()> {
        self.crls
            .write()
            .map_err(|_| Error::backend("crl store lock poisoned"))?
            .remove(&params.crl_name)
            .map(|_| ())
            .ok_or_else(|| Error::Backend(format!("no CRL stored as {:?}", params.crl_name)))
    }

    fn list_crls(&self, _params: &ListCrlParams) -> Result<Vec<String>> {
        let store = self
            .crls
            .read()
            .map_err(|_| Error::backend("crl store lock poisoned"))?;
        let mut names: Vec<&String> = store.keys().collect();
        names.sort();
        names
            .into_iter()
            .map(|name| crl::crl_summary(name, &crl::parse_crl_bytes(&store[name])?))
            .collect()
    }

    fn find_crls(&self, params: &FindCrlParams) -> Result<Vec<String>> {
        let all = self.list_crls(&ListCrlParams {
            keystore_type: self.keystore_type,
        })?;
        Ok(match &params.issuer {
            Some(needle) => all.into_iter().filter(|s| s.contains(needle)).collect(),
            None => all,
        })
    }

    fn find_cert_in_crl(&self, params: &FindCertInCrlParams) -> Result<bool> {
        let store = self
            .crls
            .read()
            .map_err(|_| Error::backend("crl store lock poisoned"))?;
        let bytes = store
            .get(&params.crl_name)
            .ok_or_else(|| Error::Backend(format!("no CRL stored as {:?}", params.crl_name)))?;
        cert_listed_in_crl(&crl::parse_crl_bytes(bytes)?, &params.cert_der)
    }

    /// Assemble the plugin this backend registers as
    ///
    /// Key operations are always present. CRL slots are filled only for the
    /// database family; token-family plugins leave them empty.
    pub fn plugin(self: &Arc<Self>) -> BackendPlugin {
        let mut ops = OperationTable::default();

        let this = Arc::clone(self);
        ops.export_public_key = Some(Arc::new(move |handle| this.export_public_key(handle)));
        let this = Arc::clone(self);
        ops.sign_request = Some(Arc::new(move |tbs_der, handle, algorithm| {
            this.sign_request(tbs_der, handle, algorithm)
        }));

        if self.keystore_type == KeystoreType::Database {
            let this = Arc::clone(self);
            ops.import_crl = Some(Arc::new(move |params| this.import_crl(params)));
            let this = Arc::clone(self);
            ops.delete_crl = Some(Arc::new(move |params| this.delete_crl(params)));
            let this = Arc::clone(self);
            ops.list_crl = Some(Arc::new(move |params| this.list_crls(params)));
            let this = Arc::clone(self);
            ops.find_crl = Some(Arc::new(move |params| this.find_crls(params)));
            let this = Arc::clone(self);
            ops.find_cert_in_crl = Some(Arc::new(move |params| this.find_cert_in_crl(params)));
        }

        BackendPlugin::new(self.keystore_type, ops, None)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::NamedTempFile;

    use super::*;
    use crate::{
        backends::testutil,
        error::ErrorKind,
        plugin::OperationId,
    };

    #[test]
    fn generated_key_exports_a_decodable_spki() {
        let backend = MemoryBackend::new(KeystoreType::Database);
        let key = backend.generate_key().unwrap();
        assert_eq!(key.keystore_type, KeystoreType::Database);
        assert_eq!(key.algorithm, Algorithm::Ed25519);

        let spki_der = backend.export_public_key(&key).unwrap();
        encode::decode_spki(&spki_der).unwrap();
    }

    #[test]
    fn unknown_and_foreign_handles_are_key_errors() {
        let backend = MemoryBackend::new(KeystoreType::Database);
        let key = backend.generate_key().unwrap();

        let unknown = KeyHandle::new(KeystoreType::Database, key.id + 100, Algorithm::Ed25519);
        assert_eq!(
            backend.export_public_key(&unknown).unwrap_err().kind(),
            ErrorKind::Key
        );

        let foreign = KeyHandle {
            keystore_type: KeystoreType::Token,
            ..key
        };
        assert_eq!(
            backend.export_public_key(&foreign).unwrap_err().kind(),
            ErrorKind::Key
        );
    }

    #[test]
    fn signing_rejects_non_ed25519_algorithms() {
        let backend = MemoryBackend::new(KeystoreType::Database);
        let key = backend.generate_key().unwrap();

        let rsa = pkcs8::spki::AlgorithmIdentifierOwned {
            oid: const_oid::db::rfc5912::SHA_256_WITH_RSA_ENCRYPTION,
            parameters: None,
        };
        let err = backend.sign_request(b"tbs", &key, &rsa).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Backend);
    }

    #[test]
    fn token_plugin_has_no_crl_slots() {
        let token = MemoryBackend::new(KeystoreType::Token);
        let plugin = token.plugin();
        assert!(plugin.supports(OperationId::SignRequest));
        assert!(plugin.supports(OperationId::ExportPublicKey));
        assert!(!plugin.supports(OperationId::ImportCrl));
        assert!(!plugin.supports(OperationId::ListCrl));

        let database = MemoryBackend::new(KeystoreType::Database);
        assert!(database.plugin().supports(OperationId::ImportCrl));
    }

    #[test]
    fn crl_store_import_list_find_delete() {
        let backend = MemoryBackend::new(KeystoreType::Database);
        let issuer_key = testutil::ed25519_key();
        let crl_der = testutil::build_crl(&issuer_key, "Test Root", &[&[0x01]], -60, 3600);

        let mut file = NamedTempFile::new().unwrap();
        file.write_all(&crl_der).unwrap();

        backend
            .import_crl(&ImportCrlParams {
                keystore_type: KeystoreType::Database,
                crl_file: file.path().to_path_buf(),
                name: Some("root".to_string()),
            })
            .unwrap();

        let listed = backend
            .list_crls(&ListCrlParams {
                keystore_type: KeystoreType::Database,
            })
            .unwrap();
        assert_eq!(listed.len(), 1);
        assert!(listed[0].contains("Test Root"));
        assert!(listed[0].contains("revoked=1"));

        let found = backend
            .find_crls(&FindCrlParams {
                keystore_type: KeystoreType::Database,
                issuer: Some("Test Root".to_string()),
            })
            .unwrap();
        assert_eq!(found.len(), 1);
        let missed = backend
            .find_crls(&FindCrlParams {
                keystore_type: KeystoreType::Database,
                issuer: Some("Other CA".to_string()),
            })
            .unwrap();
        assert!(missed.is_empty());

        let revoked_cert = testutil::build_cert(&issuer_key, "leaf", &[0x01]);
        assert!(backend
            .find_cert_in_crl(&FindCertInCrlParams {
                keystore_type: KeystoreType::Database,
                cert_der: revoked_cert,
                crl_name: "root".to_string(),
            })
            .unwrap());
        let clean_cert = testutil::build_cert(&issuer_key, "leaf2", &[0x02]);
        assert!(!backend
            .find_cert_in_crl(&FindCertInCrlParams {
                keystore_type: KeystoreType::Database,
                cert_der: clean_cert,
                crl_name: "root".to_string(),
            })
            .unwrap());

        backend
            .delete_crl(&DeleteCrlParams {
                keystore_type: KeystoreType::Database,
                crl_name: "root".to_string(),
            })
            .unwrap();
        let err = backend
            .delete_crl(&DeleteCrlParams {
                keystore_type: KeystoreType::Database,
                crl_name: "root".to_string(),
            })
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Backend);
    }
}
