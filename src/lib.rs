//! Keystore-agnostic certificate request and CRL dispatch
//!
//! Callers build certificate signing requests and manage revocation lists
//! without knowing which backend holds the keys or the artifacts. Backends
//! register as plugins keyed by keystore type; a fixed routing table decides
//! which plugin serves each CRL verb, and a two-tier dispatcher reaches the
//! plugin's operation table or, for a closed set of file-inspection
//! operations, its exported extension symbols.

pub mod backends;
pub mod crl;
pub mod csr;
pub mod error;
pub mod plugin;
pub mod session;
pub mod types;

pub use crl::{
    route_target, CrlVerb, DeleteCrlParams, FindCertInCrlParams, FindCrlParams, ImportCrlParams,
    ListCrlParams, VerifyCrlParams,
};
pub use csr::{
    CsrExtension, CsrSubject, GeneralNameType, SignatureAlgorithm, SignedCertRequest,
    TbsCertRequest,
};
pub use error::{Error, ErrorKind, Result};
pub use session::{LastError, Session};
pub use types::{Algorithm, EncodeFormat, KeyHandle, KeystoreType};

/// The types most callers need to build, sign and store artifacts
pub mod prelude {
    pub use crate::{
        backends::{FileBackend, MemoryBackend},
        crl::{
            DeleteCrlParams, FindCertInCrlParams, FindCrlParams, ImportCrlParams, ListCrlParams,
            VerifyCrlParams,
        },
        csr::{CsrSubject, SignatureAlgorithm, SignedCertRequest, TbsCertRequest},
        error::{Error, Result},
        plugin::{BackendPlugin, BackendRegistry, OperationTable},
        session::Session,
        types::{Algorithm, EncodeFormat, KeyHandle, KeystoreType},
    };
}
