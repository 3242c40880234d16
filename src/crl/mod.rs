//! CRL request routing
//!
//! Maps each CRL verb to the backend that actually owns the artifact. Tokens
//! do not store CRLs, so CRL verbs against token-backed keystores are
//! delegated to the file-based plugin; the policy is a fixed table, not
//! configurable. Entry points validate their parameter records before any
//! routing happens and hand the caller's parameters to the backend untouched.

use std::path::{Path, PathBuf};

use der::Decode;
use time::{format_description::well_known::Rfc3339, OffsetDateTime};
use x509_cert::crl::CertificateList;

use crate::{
    error::{Error, Result},
    plugin::{self, BackendRegistry, ExtensionFn, ExtensionOp, OperationId},
    types::{EncodeFormat, KeystoreType},
};

/// PEM label of a CRL artifact
pub const CRL_PEM_TAG: &str = "X509 CRL";

/// The CRL verbs the framework routes
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum CrlVerb {
    Import,
    Delete,
    List,
    /// Generic CRL search; the one verb that never remaps
    Find,
    FindCertInCrl,
    VerifyFile,
    CheckDate,
    ProbeFormat,
}

/// Routing table: which keystore type serves a verb issued against `kstype`
///
/// Token and file-token CRLs are file artifacts regardless of where the keys
/// live, so those types delegate to the file-based plugin. The table is total
/// over the verb/type grid so the policy can be tested on its own.
pub fn route_target(verb: CrlVerb, kstype: KeystoreType) -> KeystoreType {
    match verb {
        CrlVerb::Find => kstype,
        CrlVerb::VerifyFile | CrlVerb::CheckDate | CrlVerb::ProbeFormat => KeystoreType::File,
        CrlVerb::Import | CrlVerb::Delete | CrlVerb::List | CrlVerb::FindCertInCrl => {
            match kstype {
                KeystoreType::Database => KeystoreType::Database,
                KeystoreType::Token | KeystoreType::File | KeystoreType::FileToken => {
                    KeystoreType::File
                }
            }
        }
    }
}

/// Parameters for importing a CRL file into a backend's store
#[derive(Clone, Debug)]
pub struct ImportCrlParams {
    pub keystore_type: KeystoreType,
    /// Source file holding the CRL, PEM or DER
    pub crl_file: PathBuf,
    /// Name to store the CRL under; defaults to the source file stem
    pub name: Option<String>,
}

impl ImportCrlParams {
    fn validate(&self) -> Result<()> {
        if self.crl_file.as_os_str().is_empty() {
            return Err(Error::bad_parameter("import: crl_file is required"));
        }
        Ok(())
    }
}

/// Parameters for deleting a stored CRL by name
#[derive(Clone, Debug)]
pub struct DeleteCrlParams {
    pub keystore_type: KeystoreType,
    pub crl_name: String,
}

impl DeleteCrlParams {
    fn validate(&self) -> Result<()> {
        if self.crl_name.is_empty() {
            return Err(Error::bad_parameter("delete: crl_name is required"));
        }
        Ok(())
    }
}

/// Parameters for listing the CRLs a backend holds
#[derive(Clone, Debug)]
pub struct ListCrlParams {
    pub keystore_type: KeystoreType,
}

/// Parameters for searching stored CRLs
#[derive(Clone, Debug)]
pub struct FindCrlParams {
    pub keystore_type: KeystoreType,
    /// Substring match against the CRL issuer name; `None` matches all
    pub issuer: Option<String>,
}

/// Parameters for checking whether a certificate appears in a stored CRL
#[derive(Clone, Debug)]
pub struct FindCertInCrlParams {
    pub keystore_type: KeystoreType,
    /// DER-encoded certificate to look up
    pub cert_der: Vec<u8>,
    pub crl_name: String,
}

impl FindCertInCrlParams {
    fn validate(&self) -> Result<()> {
        if self.cert_der.is_empty() {
            return Err(Error::bad_parameter("find-cert-in-crl: cert_der is required"));
        }
        if self.crl_name.is_empty() {
            return Err(Error::bad_parameter("find-cert-in-crl: crl_name is required"));
        }
        Ok(())
    }
}

/// Parameters for verifying a CRL file's signature
#[derive(Clone, Debug)]
pub struct VerifyCrlParams {
    /// CRL file to verify, PEM or DER
    pub crl_file: PathBuf,
    /// Certificate of the CRL issuer, PEM or DER
    pub issuer_cert: PathBuf,
}

impl VerifyCrlParams {
    fn validate(&self) -> Result<()> {
        if self.crl_file.as_os_str().is_empty() {
            return Err(Error::bad_parameter("verify: crl_file is required"));
        }
        if self.issuer_cert.as_os_str().is_empty() {
            return Err(Error::bad_parameter("verify: issuer_cert is required"));
        }
        Ok(())
    }
}

pub(crate) fn import_crl(registry: &BackendRegistry, params: &ImportCrlParams) -> Result<()> {
    params.validate()?;
    let plugin = registry.resolve(route_target(CrlVerb::Import, params.keystore_type))?;
    let op = plugin::table_op(plugin, OperationId::ImportCrl, &plugin.ops().import_crl)?;
    op(params)
}

pub(crate) fn delete_crl(registry: &BackendRegistry, params: &DeleteCrlParams) -> Result<()> {
    params.validate()?;
    let plugin = registry.resolve(route_target(CrlVerb::Delete, params.keystore_type))?;
    let op = plugin::table_op(plugin, OperationId::DeleteCrl, &plugin.ops().delete_crl)?;
    op(params)
}

pub(crate) fn list_crls(registry: &BackendRegistry, params: &ListCrlParams) -> Result<Vec<String>> {
    let plugin = registry.resolve(route_target(CrlVerb::List, params.keystore_type))?;
    let op = plugin::table_op(plugin, OperationId::ListCrl, &plugin.ops().list_crl)?;
    op(params)
}

pub(crate) fn find_crls(registry: &BackendRegistry, params: &FindCrlParams) -> Result<Vec<String>> {
    let plugin = registry.resolve(route_target(CrlVerb::Find, params.keystore_type))?;
    let op = plugin::table_op(plugin, OperationId::FindCrl, &plugin.ops().find_crl)?;
    op(params)
}

pub(crate) fn find_cert_in_crl(
    registry: &BackendRegistry,
    params: &FindCertInCrlParams,
) -> Result<bool> {
    params.validate()?;
    let plugin = registry.resolve(route_target(CrlVerb::FindCertInCrl, params.keystore_type))?;
    let op = plugin::table_op(
        plugin,
        OperationId::FindCertInCrl,
        &plugin.ops().find_cert_in_crl,
    )?;
    op(params)
}

pub(crate) fn verify_crl_file(registry: &BackendRegistry, params: &VerifyCrlParams) -> Result<()> {
    params.validate()?;
    let plugin = registry.resolve(KeystoreType::File)?;
    let ExtensionFn::VerifyCrlFile(f) = plugin::extension_op(plugin, ExtensionOp::VerifyCrlFile)?
    else {
        return Err(Error::symbol_missing(ExtensionOp::VerifyCrlFile.symbol()));
    };
    f(params)
}

pub(crate) fn check_crl_date(registry: &BackendRegistry, crl_file: &Path) -> Result<()> {
    if crl_file.as_os_str().is_empty() {
        return Err(Error::bad_parameter("check-date: crl_file is required"));
    }
    let plugin = registry.resolve(KeystoreType::File)?;
    let ExtensionFn::CheckCrlDate(f) = plugin::extension_op(plugin, ExtensionOp::CheckCrlDate)?
    else {
        return Err(Error::symbol_missing(ExtensionOp::CheckCrlDate.symbol()));
    };
    f(crl_file)
}

pub(crate) fn probe_crl_format(
    registry: &BackendRegistry,
    crl_file: &Path,
) -> Result<EncodeFormat> {
    if crl_file.as_os_str().is_empty() {
        return Err(Error::bad_parameter("probe: crl_file is required"));
    }
    let plugin = registry.resolve(KeystoreType::File)?;
    let ExtensionFn::ProbeCrlFormat(f) = plugin::extension_op(plugin, ExtensionOp::ProbeCrlFormat)?
    else {
        return Err(Error::symbol_missing(ExtensionOp::ProbeCrlFormat.symbol()));
    };
    f(crl_file)
}

/// Parse CRL bytes in either PEM or DER encoding
pub(crate) fn parse_crl_bytes(bytes: &[u8]) -> Result<CertificateList> {
    if bytes.starts_with(b"-----BEGIN") {
        let block = pem::parse(bytes).map_err(Error::encoding)?;
        if block.tag() != CRL_PEM_TAG {
            return Err(Error::Encoding(format!(
                "expected {CRL_PEM_TAG} PEM block, found {}",
                block.tag()
            )));
        }
        return CertificateList::from_der(block.contents()).map_err(Error::encoding);
    }
    CertificateList::from_der(bytes).map_err(Error::encoding)
}

/// Load and parse a CRL file, PEM or DER
pub(crate) fn read_crl_file(path: &Path) -> Result<CertificateList> {
    let bytes = std::fs::read(path)?;
    parse_crl_bytes(&bytes)
}

/// One-line printable summary of a stored CRL
pub(crate) fn crl_summary(name: &str, crl: &CertificateList) -> Result<String> {
    let this_update = rfc3339(crl.tbs_cert_list.this_update.to_unix_duration().as_secs())?;
    let next_update = match &crl.tbs_cert_list.next_update {
        Some(t) => rfc3339(t.to_unix_duration().as_secs())?,
        None => "-".to_string(),
    };
    let revoked = crl
        .tbs_cert_list
        .revoked_certificates
        .as_ref()
        .map_or(0, Vec::len);
    Ok(format!(
        "{name}: issuer={}, thisUpdate={this_update}, nextUpdate={next_update}, revoked={revoked}",
        crl.tbs_cert_list.issuer
    ))
}

fn rfc3339(unix_secs: u64) -> Result<String> {
    let ts = OffsetDateTime::from_unix_timestamp(unix_secs as i64).map_err(Error::encoding)?;
    ts.format(&Rfc3339).map_err(Error::encoding)
}

#[cfg(test)]
mod tests {
    use super::*;

    const REMAPPED_VERBS: [CrlVerb; 4] = [
        CrlVerb::Import,
        CrlVerb::Delete,
        CrlVerb::List,
        CrlVerb::FindCertInCrl,
    ];

    #[test]
    fn token_and_file_variants_route_to_file_plugin() {
        for verb in REMAPPED_VERBS {
            assert_eq!(route_target(verb, KeystoreType::Token), KeystoreType::File);
            assert_eq!(route_target(verb, KeystoreType::File), KeystoreType::File);
            assert_eq!(
                route_target(verb, KeystoreType::FileToken),
                KeystoreType::File
            );
        }
    }

    #[test]
    fn database_routes_to_itself() {
        for verb in REMAPPED_VERBS {
            assert_eq!(
                route_target(verb, KeystoreType::Database),
                KeystoreType::Database
            );
        }
    }

    #[test]
    fn generic_find_never_remaps() {
        for kstype in [
            KeystoreType::Token,
            KeystoreType::Database,
            KeystoreType::File,
            KeystoreType::FileToken,
        ] {
            assert_eq!(route_target(CrlVerb::Find, kstype), kstype);
        }
    }

    #[test]
    fn extension_verbs_pin_to_file_plugin() {
        for verb in [CrlVerb::VerifyFile, CrlVerb::CheckDate, CrlVerb::ProbeFormat] {
            assert_eq!(route_target(verb, KeystoreType::Token), KeystoreType::File);
            assert_eq!(
                route_target(verb, KeystoreType::Database),
                KeystoreType::File
            );
        }
    }

    #[test]
    fn unregistered_target_fails_with_plugin_not_found() {
        use crate::error::ErrorKind;

        let registry = BackendRegistry::new();
        let err = import_crl(
            &registry,
            &ImportCrlParams {
                keystore_type: KeystoreType::Token,
                crl_file: PathBuf::from("revoked.crl"),
                name: None,
            },
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PluginNotFound);
    }

    #[test]
    fn missing_required_fields_short_circuit() {
        use crate::error::ErrorKind;

        // Validation must fire before routing: an empty registry would give
        // PluginNotFound if routing were attempted first.
        let registry = BackendRegistry::new();
        let err = delete_crl(
            &registry,
            &DeleteCrlParams {
                keystore_type: KeystoreType::Database,
                crl_name: String::new(),
            },
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadParameter);
    }
}
