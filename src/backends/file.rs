//! Directory-backed CRL store
//!
//! Serves the file family, and by routing also the token families for CRL
//! verbs. Each imported CRL is a `{name}.crl` file under the store directory,
//! kept in its source encoding. This is also the one backend that exports the
//! extension symbols for CRL file inspection.

use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use const_oid::db::rfc8410;
use der::Encode;
use ed25519_dalek::{Signature, VerifyingKey};
use pkcs8::DecodePublicKey;
use time::OffsetDateTime;

use super::{cert_listed_in_crl, import_name, parse_cert_bytes};
use crate::{
    crl::{
        self, DeleteCrlParams, FindCertInCrlParams, FindCrlParams, ImportCrlParams, ListCrlParams,
        VerifyCrlParams, CRL_PEM_TAG,
    },
    error::{Error, Result},
    plugin::{
        BackendPlugin, ExtensionFn, ExtensionSymbols, OperationTable, SYM_CHECK_CRL_DATE,
        SYM_PROBE_CRL_FORMAT, SYM_VERIFY_CRL_FILE,
    },
    types::{EncodeFormat, KeystoreType},
};

const CRL_FILE_EXT: &str = "crl";

/// CRL store rooted at a directory
pub struct FileBackend {
    store_dir: PathBuf,
}

impl FileBackend {
    /// Open a store at `store_dir`, creating the directory if needed
    pub fn new(store_dir: impl Into<PathBuf>) -> Result<Arc<Self>> {
        let store_dir = store_dir.into();
        fs::create_dir_all(&store_dir)?;
        Ok(Arc::new(Self { store_dir }))
    }

    pub fn store_dir(&self) -> &Path {
        &self.store_dir
    }

    fn crl_path(&self, name: &str) -> PathBuf {
        self.store_dir.join(format!("{name}.{CRL_FILE_EXT}"))
    }

    fn import_crl(&self, params: &ImportCrlParams) -> Result<()> {
        let bytes = fs::read(&params.crl_file)?;
        crl::parse_crl_bytes(&bytes)?;
        let name = import_name(params)?;
        fs::write(self.crl_path(&name), &bytes)?;
        Ok(())
    }

    fn delete_crl(&self, params: &DeleteCrlParams) -> Result<()> {
        let path = self.crl_path(&params.crl_name);
        if !path.exists() {
            return Err(Error::Backend(format!(
                "no CRL stored as {:?}",
                params.crl_name
            )));
        }
        fs::remove_file(path)?;
        Ok(())
    }

    fn stored_names(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.store_dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(CRL_FILE_EXT) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                names.push(stem.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    fn list_crls(&self, _params: &ListCrlParams) -> Result<Vec<String>> {
        self.stored_names()?
            .into_iter()
            .map(|name| {
                let parsed = crl::read_crl_file(&self.crl_path(&name))?;
                crl::crl_summary(&name, &parsed)
            })
            .collect()
    }

    fn find_crls(&self, params: &FindCrlParams) -> Result<Vec<String>> {
        let all = self.list_crls(&ListCrlParams {
            keystore_type: KeystoreType::File,
        })?;
        Ok(match &params.issuer {
            Some(needle) => all.into_iter().filter(|s| s.contains(needle)).collect(),
            None => all,
        })
    }

    fn find_cert_in_crl(&self, params: &FindCertInCrlParams) -> Result<bool> {
        let path = self.crl_path(&params.crl_name);
        if !path.exists() {
            return Err(Error::Backend(format!(
                "no CRL stored as {:?}",
                params.crl_name
            )));
        }
        cert_listed_in_crl(&crl::read_crl_file(&path)?, &params.cert_der)
    }

    /// Sniff whether a file holds a CRL, and in which encoding
    pub fn probe_crl_format(path: &Path) -> Result<EncodeFormat> {
        let bytes = fs::read(path)?;
        if bytes.starts_with(b"-----BEGIN") {
            let block = pem::parse(&bytes).map_err(Error::encoding)?;
            if block.tag() != CRL_PEM_TAG {
                return Err(Error::Encoding(format!(
                    "PEM block is {:?}, not a CRL",
                    block.tag()
                )));
            }
            crl::parse_crl_bytes(&bytes)?;
            return Ok(EncodeFormat::Pem);
        }
        crl::parse_crl_bytes(&bytes)?;
        Ok(EncodeFormat::Der)
    }

    /// Check a CRL file's validity window against the current time
    pub fn check_crl_date(path: &Path) -> Result<()> {
        let parsed = crl::read_crl_file(path)?;
        let now = OffsetDateTime::now_utc().unix_timestamp();

        let this_update = parsed.tbs_cert_list.this_update.to_unix_duration().as_secs() as i64;
        if this_update > now {
            return Err(Error::Validity(
                "CRL thisUpdate is in the future".to_string(),
            ));
        }
        if let Some(next_update) = &parsed.tbs_cert_list.next_update {
            if (next_update.to_unix_duration().as_secs() as i64) < now {
                return Err(Error::Validity("CRL has expired".to_string()));
            }
        }
        Ok(())
    }

    /// Verify a CRL file's signature against an issuer certificate
    pub fn verify_crl_file(params: &VerifyCrlParams) -> Result<()> {
        let parsed = crl::read_crl_file(&params.crl_file)?;
        let issuer = parse_cert_bytes(&fs::read(&params.issuer_cert)?)?;

        let spki = &issuer.tbs_certificate.subject_public_key_info;
        if spki.algorithm.oid != rfc8410::ID_ED_25519 {
            return Err(Error::Backend(format!(
                "cannot verify CRLs issued under algorithm {}",
                spki.algorithm.oid
            )));
        }
        let spki_der = spki.to_der().map_err(Error::encoding)?;
        let verifying_key =
            VerifyingKey::from_public_key_der(&spki_der).map_err(Error::encoding)?;

        let tbs_der = parsed.tbs_cert_list.to_der().map_err(Error::encoding)?;
        let sig_bytes = parsed
            .signature
            .as_bytes()
            .ok_or_else(|| Error::encoding("signature bit string has unused bits"))?;
        let signature = Signature::from_slice(sig_bytes).map_err(Error::encoding)?;

        verifying_key
            .verify_strict(&tbs_der, &signature)
            .map_err(|_| Error::backend("CRL signature verification failed"))
    }

    /// Assemble the plugin this backend registers as
    pub fn plugin(self: &Arc<Self>) -> BackendPlugin {
        let mut ops = OperationTable::default();

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

        BackendPlugin::new(KeystoreType::File, ops, Some(Arc::new(FileStoreSymbols)))
    }
}

/// Exported extension symbols of the file store
struct FileStoreSymbols;

impl ExtensionSymbols for FileStoreSymbols {
    fn resolve(&self, symbol: &str) -> Option<ExtensionFn> {
        match symbol {
            SYM_PROBE_CRL_FORMAT => Some(ExtensionFn::ProbeCrlFormat(Arc::new(
                FileBackend::probe_crl_format,
            ))),
            SYM_CHECK_CRL_DATE => Some(ExtensionFn::CheckCrlDate(Arc::new(
                FileBackend::check_crl_date,
            ))),
            SYM_VERIFY_CRL_FILE => Some(ExtensionFn::VerifyCrlFile(Arc::new(
                FileBackend::verify_crl_file,
            ))),
            _ => None,
        }
    }
}
