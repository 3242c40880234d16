use serde::{Deserialize, Serialize};

/// Backend family a key or certificate artifact lives in
///
/// Used purely as a registry lookup key; the variants are not ordered.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum KeystoreType {
    /// Hardware-token keystore (keys live on the token, CRLs do not)
    Token,
    /// Software certificate database
    Database,
    /// File-based store
    File,
    /// Raw file token: keys are plain files, CRL artifacts are files too
    FileToken,
}

/// Key algorithm family
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum Algorithm {
    Ed25519,
    EcdsaP256,
    Rsa2048,
}

/// Backend-scoped reference to a stored key
///
/// The keystore type on the handle is what routing keys off; the id is only
/// meaningful to the owning backend.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct KeyHandle {
    pub keystore_type: KeystoreType,
    pub id: u64,
    pub algorithm: Algorithm,
}

impl KeyHandle {
    pub fn new(keystore_type: KeystoreType, id: u64, algorithm: Algorithm) -> Self {
        Self {
            keystore_type,
            id,
            algorithm,
        }
    }
}

/// On-disk encoding of an exported or imported artifact
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum EncodeFormat {
    Der,
    Pem,
}

#[cfg(test)]
mod tests {
    use super::*;

    // Handles get persisted by callers between sessions
    #[test]
    fn key_handle_serde_round_trip() {
        let handle = KeyHandle::new(KeystoreType::FileToken, 42, Algorithm::Ed25519);
        let json = serde_json::to_string(&handle).unwrap();
        let back: KeyHandle = serde_json::from_str(&json).unwrap();
        assert_eq!(back, handle);
    }
}
