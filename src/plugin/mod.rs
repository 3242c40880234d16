//! Backend plugin model
//!
//! A backend exposes its capabilities through an [`OperationTable`]: one slot
//! per framework-defined operation, any of which may be left empty to signal
//! "not supported". A small, closed set of extension operations that only the
//! file-based backend implements is reachable through a second path, the
//! plugin's [`ExtensionSymbols`] provider, resolved by exact exported name.

mod dispatch;
mod registry;

use std::{path::Path, sync::Arc};

pub use dispatch::{extension_op, table_op};
pub use registry::BackendRegistry;
use pkcs8::spki::AlgorithmIdentifierOwned;

use crate::{
    crl::{
        DeleteCrlParams, FindCertInCrlParams, FindCrlParams, ImportCrlParams, ListCrlParams,
        VerifyCrlParams,
    },
    error::Result,
    types::{EncodeFormat, KeyHandle, KeystoreType},
};

/// Export a key's public half as DER-encoded SubjectPublicKeyInfo
pub type ExportPublicKeyFn = Arc<dyn Fn(&KeyHandle) -> Result<Vec<u8>> + Send + Sync>;
/// Sign an encoded to-be-signed request and return the final signed encoding
pub type SignRequestFn =
    Arc<dyn Fn(&[u8], &KeyHandle, &AlgorithmIdentifierOwned) -> Result<Vec<u8>> + Send + Sync>;
pub type ImportCrlFn = Arc<dyn Fn(&ImportCrlParams) -> Result<()> + Send + Sync>;
pub type DeleteCrlFn = Arc<dyn Fn(&DeleteCrlParams) -> Result<()> + Send + Sync>;
pub type ListCrlFn = Arc<dyn Fn(&ListCrlParams) -> Result<Vec<String>> + Send + Sync>;
pub type FindCrlFn = Arc<dyn Fn(&FindCrlParams) -> Result<Vec<String>> + Send + Sync>;
/// Returns true when the certificate is listed in the named CRL
pub type FindCertInCrlFn = Arc<dyn Fn(&FindCertInCrlParams) -> Result<bool> + Send + Sync>;

/// Sniff whether a file holds a CRL, and in which encoding
pub type ProbeCrlFormatFn = Arc<dyn Fn(&Path) -> Result<EncodeFormat> + Send + Sync>;
/// Check a CRL file's validity window against the current time
pub type CheckCrlDateFn = Arc<dyn Fn(&Path) -> Result<()> + Send + Sync>;
/// Verify a CRL file's signature against an issuer certificate
pub type VerifyCrlFileFn = Arc<dyn Fn(&VerifyCrlParams) -> Result<()> + Send + Sync>;

/// Identifier of a table operation, for capability probing and error text
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum OperationId {
    ExportPublicKey,
    SignRequest,
    ImportCrl,
    DeleteCrl,
    ListCrl,
    FindCrl,
    FindCertInCrl,
}

impl OperationId {
    pub fn name(self) -> &'static str {
        match self {
            OperationId::ExportPublicKey => "ExportPublicKey",
            OperationId::SignRequest => "SignRequest",
            OperationId::ImportCrl => "ImportCrl",
            OperationId::DeleteCrl => "DeleteCrl",
            OperationId::ListCrl => "ListCrl",
            OperationId::FindCrl => "FindCrl",
            OperationId::FindCertInCrl => "FindCertInCrl",
        }
    }
}

/// Static per-plugin operation table
///
/// Slots may be empty; an empty slot means the backend does not implement the
/// operation and the dispatcher reports it as unavailable.
#[derive(Clone, Default)]
pub struct OperationTable {
    pub export_public_key: Option<ExportPublicKeyFn>,
    pub sign_request: Option<SignRequestFn>,
    pub import_crl: Option<ImportCrlFn>,
    pub delete_crl: Option<DeleteCrlFn>,
    pub list_crl: Option<ListCrlFn>,
    pub find_crl: Option<FindCrlFn>,
    pub find_cert_in_crl: Option<FindCertInCrlFn>,
}

impl OperationTable {
    pub fn supports(&self, id: OperationId) -> bool {
        match id {
            OperationId::ExportPublicKey => self.export_public_key.is_some(),
            OperationId::SignRequest => self.sign_request.is_some(),
            OperationId::ImportCrl => self.import_crl.is_some(),
            OperationId::DeleteCrl => self.delete_crl.is_some(),
            OperationId::ListCrl => self.list_crl.is_some(),
            OperationId::FindCrl => self.find_crl.is_some(),
            OperationId::FindCertInCrl => self.find_cert_in_crl.is_some(),
        }
    }
}

/// Exported names of the extension operations, fixed by the framework
pub const SYM_PROBE_CRL_FORMAT: &str = "FileStore_ProbeCrlFormat";
pub const SYM_CHECK_CRL_DATE: &str = "FileStore_CheckCrlDate";
pub const SYM_VERIFY_CRL_FILE: &str = "FileStore_VerifyCrlFile";

/// The closed set of operations reachable only through tier-2 dispatch
///
/// These are implemented by exactly one backend (the file-based one) and are
/// deliberately not part of the common operation table.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum ExtensionOp {
    ProbeCrlFormat,
    CheckCrlDate,
    VerifyCrlFile,
}

impl ExtensionOp {
    /// Exact exported symbol name the operation resolves under
    pub fn symbol(self) -> &'static str {
        match self {
            ExtensionOp::ProbeCrlFormat => SYM_PROBE_CRL_FORMAT,
            ExtensionOp::CheckCrlDate => SYM_CHECK_CRL_DATE,
            ExtensionOp::VerifyCrlFile => SYM_VERIFY_CRL_FILE,
        }
    }
}

/// A resolved extension operation
#[derive(Clone)]
pub enum ExtensionFn {
    ProbeCrlFormat(ProbeCrlFormatFn),
    CheckCrlDate(CheckCrlDateFn),
    VerifyCrlFile(VerifyCrlFileFn),
}

impl std::fmt::Debug for ExtensionFn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ExtensionFn::ProbeCrlFormat(_) => "ProbeCrlFormat",
            ExtensionFn::CheckCrlDate(_) => "CheckCrlDate",
            ExtensionFn::VerifyCrlFile(_) => "VerifyCrlFile",
        };
        f.debug_tuple(name).finish()
    }
}

impl ExtensionFn {
    fn matches(&self, op: ExtensionOp) -> bool {
        matches!(
            (self, op),
            (ExtensionFn::ProbeCrlFormat(_), ExtensionOp::ProbeCrlFormat)
                | (ExtensionFn::CheckCrlDate(_), ExtensionOp::CheckCrlDate)
                | (ExtensionFn::VerifyCrlFile(_), ExtensionOp::VerifyCrlFile)
        )
    }
}

/// Named-symbol provider backing tier-2 dispatch
///
/// Stands in for the loaded dynamic-library image of the original framework:
/// symbols are looked up by exact exported name and either exist or do not.
pub trait ExtensionSymbols: Send + Sync {
    fn resolve(&self, symbol: &str) -> Option<ExtensionFn>;
}

/// A loaded backend plugin
///
/// Created once during framework initialization and looked up read-only
/// thereafter; the registry guarantees at most one plugin per keystore type.
pub struct BackendPlugin {
    keystore_type: KeystoreType,
    ops: OperationTable,
    symbols: Option<Arc<dyn ExtensionSymbols>>,
}

impl std::fmt::Debug for BackendPlugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendPlugin")
            .field("keystore_type", &self.keystore_type)
            .finish_non_exhaustive()
    }
}

impl BackendPlugin {
    pub fn new(
        keystore_type: KeystoreType,
        ops: OperationTable,
        symbols: Option<Arc<dyn ExtensionSymbols>>,
    ) -> Self {
        Self {
            keystore_type,
            ops,
            symbols,
        }
    }

    pub fn keystore_type(&self) -> KeystoreType {
        self.keystore_type
    }

    pub fn ops(&self) -> &OperationTable {
        &self.ops
    }

    pub(crate) fn symbols(&self) -> Option<&Arc<dyn ExtensionSymbols>> {
        self.symbols.as_ref()
    }

    pub fn supports(&self, id: OperationId) -> bool {
        self.ops.supports(id)
    }
}
