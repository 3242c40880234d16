//! Caller-owned framework handle
//!
//! A [`Session`] bundles the immutable backend registry with an explicit
//! last-error slot, replacing the implicit global error state of older
//! credential frameworks. Every entry point clears the slot first and records
//! the outcome on the way out, so `last_error` always describes the most
//! recent call made through this handle.
//!
//! Precondition: a `Session` is a single thread-of-control handle. Sharing
//! one across threads is memory-safe but interleaves the last-error slot into
//! meaninglessness; give each thread its own `Session`.

use std::{path::Path, sync::Mutex};

use crate::{
    crl::{
        self, DeleteCrlParams, FindCertInCrlParams, FindCrlParams, ImportCrlParams, ListCrlParams,
        VerifyCrlParams,
    },
    csr::{self, SignedCertRequest, TbsCertRequest},
    error::{ErrorKind, Result},
    plugin::{self, BackendRegistry, OperationId},
    types::{EncodeFormat, KeyHandle},
};

/// Kind and rendered message of the most recent failure on a session
#[derive(Clone, Debug)]
pub struct LastError {
    pub kind: ErrorKind,
    pub message: String,
}

/// Framework handle: registry plus per-handle error context
pub struct Session {
    registry: BackendRegistry,
    last_error: Mutex<Option<LastError>>,
}

impl Session {
    /// Wrap a fully populated registry; no further plugin loading happens
    /// through the session
    pub fn new(registry: BackendRegistry) -> Self {
        Self {
            registry,
            last_error: Mutex::new(None),
        }
    }

    pub fn registry(&self) -> &BackendRegistry {
        &self.registry
    }

    /// The failure recorded by the most recent entry point, if any
    pub fn last_error(&self) -> Option<LastError> {
        self.last_error.lock().map(|slot| slot.clone()).unwrap_or(None)
    }

    /// Run one entry point: clear the error slot, execute, record the outcome
    fn enter<T>(&self, f: impl FnOnce(&BackendRegistry) -> Result<T>) -> Result<T> {
        if let Ok(mut slot) = self.last_error.lock() {
            *slot = None;
        }
        let outcome = f(&self.registry);
        if let Err(err) = &outcome {
            if let Ok(mut slot) = self.last_error.lock() {
                *slot = Some(LastError {
                    kind: err.kind(),
                    message: err.to_string(),
                });
            }
        }
        outcome
    }

    /// Ask the key's owning backend for its public key and store it in the
    /// request as SubjectPublicKeyInfo
    pub fn set_public_key(&self, tbs: &mut TbsCertRequest, key: &KeyHandle) -> Result<()> {
        self.enter(|registry| {
            let plugin = registry.resolve(key.keystore_type)?;
            let op = plugin::table_op(
                plugin,
                OperationId::ExportPublicKey,
                &plugin.ops().export_public_key,
            )?;
            let spki_der = op(key)?;
            tbs.set_public_key_der(&spki_der)
        })
    }

    /// Sign a completed request with the given backend key
    pub fn sign_request(
        &self,
        tbs: &TbsCertRequest,
        signing_key: &KeyHandle,
    ) -> Result<SignedCertRequest> {
        self.enter(|registry| csr::sign_request(registry, tbs, signing_key))
    }

    /// Import a CRL file into the backend that owns CRLs for this keystore
    pub fn import_crl(&self, params: &ImportCrlParams) -> Result<()> {
        self.enter(|registry| crl::import_crl(registry, params))
    }

    /// Delete a stored CRL by name
    pub fn delete_crl(&self, params: &DeleteCrlParams) -> Result<()> {
        self.enter(|registry| crl::delete_crl(registry, params))
    }

    /// List the CRLs a backend holds, one printable summary per CRL
    pub fn list_crls(&self, params: &ListCrlParams) -> Result<Vec<String>> {
        self.enter(|registry| crl::list_crls(registry, params))
    }

    /// Search stored CRLs; routes by the caller's keystore type unmapped
    pub fn find_crls(&self, params: &FindCrlParams) -> Result<Vec<String>> {
        self.enter(|registry| crl::find_crls(registry, params))
    }

    /// Check whether a certificate appears in a stored CRL
    pub fn find_cert_in_crl(&self, params: &FindCertInCrlParams) -> Result<bool> {
        self.enter(|registry| crl::find_cert_in_crl(registry, params))
    }

    /// Verify a CRL file's signature against an issuer certificate
    pub fn verify_crl_file(&self, params: &VerifyCrlParams) -> Result<()> {
        self.enter(|registry| crl::verify_crl_file(registry, params))
    }

    /// Check a CRL file's validity window against the current time
    pub fn check_crl_date(&self, crl_file: &Path) -> Result<()> {
        self.enter(|registry| crl::check_crl_date(registry, crl_file))
    }

    /// Sniff whether a file holds a CRL, and in which encoding
    pub fn is_crl_file(&self, crl_file: &Path) -> Result<EncodeFormat> {
        self.enter(|registry| crl::probe_crl_format(registry, crl_file))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::KeystoreType;

    #[test]
    fn entry_points_reset_and_record_the_error_slot() {
        let session = Session::new(BackendRegistry::new());
        assert!(session.last_error().is_none());

        let err = session
            .delete_crl(&DeleteCrlParams {
                keystore_type: KeystoreType::Database,
                crl_name: String::new(),
            })
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadParameter);

        let recorded = session.last_error().unwrap();
        assert_eq!(recorded.kind, ErrorKind::BadParameter);
        assert!(recorded.message.contains("crl_name"));

        // Next entry point clears the slot before doing anything else
        let _ = session.list_crls(&ListCrlParams {
            keystore_type: KeystoreType::Database,
        });
        let recorded = session.last_error().unwrap();
        assert_eq!(recorded.kind, ErrorKind::PluginNotFound);
    }
}
