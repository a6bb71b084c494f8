use auditrail_core::AuditrailError;
use chrono::Utc;
use ed25519_dalek::{Signer as DalekSigner, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use zeroize::Zeroizing;

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

/// Ed25519 signer with on-disk key persistence (spec.md §4.2).
///
/// The private key never leaves the process except via explicit `backup()`.
/// Signatures are computed over the UTF-8 bytes of the digest's hex string,
/// not the raw digest bytes — this is an intentional, preserved quirk (spec.md
/// §9 "open question: signing domain"); fixing it would break verification
/// of every historical record.
pub struct Signer {
    signing_key: Zeroizing<SigningKeyBytes>,
    verifying_key: VerifyingKey,
    path: PathBuf,
}

/// Wrapper so the 64-byte keypair encoding zeroizes on drop.
struct SigningKeyBytes(pub [u8; 64]);

impl zeroize::Zeroize for SigningKeyBytes {
    fn zeroize(&mut self) {
        self.0.zeroize();
    }
}

impl fmt::Debug for Signer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signer")
            .field("public_key", &self.public_key_hex())
            .field("path", &self.path)
            .finish()
    }
}

impl Signer {
    /// Read a hex-encoded 64-byte keypair from `path` (owner-only
    /// permissions); on absence, generate a new keypair and persist it.
    pub fn load_or_create<P: AsRef<Path>>(path: P) -> Result<Self, AuditrailError> {
        let path = path.as_ref().to_path_buf();
        if path.exists() {
            let hex_str = fs::read_to_string(&path)
                .map_err(|e| AuditrailError::KeyIoError(format!("reading key file: {e}")))?;
            let bytes = hex::decode(hex_str.trim())
                .map_err(|e| AuditrailError::KeyIoError(format!("key file is not valid hex: {e}")))?;
            let arr: [u8; 64] = bytes
                .try_into()
                .map_err(|_| AuditrailError::KeyIoError("key file must encode 64 bytes".into()))?;
            let signing_key = SigningKey::from_keypair_bytes(&arr)
                .map_err(|e| AuditrailError::KeyIoError(format!("malformed keypair: {e}")))?;
            let verifying_key = signing_key.verifying_key();
            Ok(Self {
                signing_key: Zeroizing::new(SigningKeyBytes(arr)),
                verifying_key,
                path,
            })
        } else {
            let signing_key = SigningKey::generate(&mut OsRng);
            let verifying_key = signing_key.verifying_key();
            let bytes = signing_key.to_keypair_bytes();
            write_key_file(&path, &bytes)?;
            Ok(Self {
                signing_key: Zeroizing::new(SigningKeyBytes(bytes)),
                verifying_key,
                path,
            })
        }
    }

    fn signing_key(&self) -> SigningKey {
        SigningKey::from_keypair_bytes(&self.signing_key.0)
            .expect("in-memory keypair bytes are always well-formed")
    }

    pub fn public_key_hex(&self) -> String {
        hex::encode(self.verifying_key.as_bytes())
    }

    /// Sign the UTF-8 bytes of `digest_hex`, returning the hex-encoded
    /// signature.
    pub fn sign(&self, digest_hex: &str) -> String {
        let sig = self.signing_key().sign(digest_hex.as_bytes());
        hex::encode(sig.to_bytes())
    }

    /// Verify `signature_hex` against `digest_hex` using this signer's
    /// current public key.
    pub fn verify(&self, digest_hex: &str, signature_hex: &str) -> bool {
        verify_with_key(&self.public_key_hex(), digest_hex, signature_hex).unwrap_or(false)
    }

    /// Copy the current key file to a timestamped backup in the same
    /// directory (spec.md §6: "Backup format is identical content with a
    /// timestamped filename").
    pub fn backup(&self) -> Result<PathBuf, AuditrailError> {
        let ts = Utc::now().format("%Y%m%dT%H%M%S%.fZ").to_string();
        let backup_path = self.path.with_file_name(format!(
            "{}.{}.bak",
            self.path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("signing_key"),
            ts
        ));
        write_key_file(&backup_path, &self.signing_key.0)?;
        Ok(backup_path)
    }

    /// Atomically replace the on-disk key with a freshly generated one.
    /// Returns `(old_pub_hex, new_pub_hex)`. The old key is backed up first
    /// so historical events remain independently verifiable (spec.md §9
    /// "key rotation discontinuity").
    pub fn rotate(&mut self) -> Result<(String, String), AuditrailError> {
        let old_pub = self.public_key_hex();
        self.backup()?;

        let new_signing_key = SigningKey::generate(&mut OsRng);
        let new_verifying_key = new_signing_key.verifying_key();
        let new_bytes = new_signing_key.to_keypair_bytes();

        let tmp_path = self.path.with_extension("tmp");
        write_key_file(&tmp_path, &new_bytes)?;
        fs::rename(&tmp_path, &self.path)
            .map_err(|e| AuditrailError::KeyIoError(format!("atomic key replace failed: {e}")))?;

        self.signing_key = Zeroizing::new(SigningKeyBytes(new_bytes));
        self.verifying_key = new_verifying_key;
        let new_pub = self.public_key_hex();
        Ok((old_pub, new_pub))
    }
}

fn write_key_file(path: &Path, keypair_bytes: &[u8; 64]) -> Result<(), AuditrailError> {
    let hex_str = hex::encode(keypair_bytes);
    fs::write(path, hex_str.as_bytes())
        .map_err(|e| AuditrailError::KeyIoError(format!("writing key file: {e}")))?;
    set_owner_only_permissions(path)?;
    Ok(())
}

#[cfg(unix)]
fn set_owner_only_permissions(path: &Path) -> Result<(), AuditrailError> {
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))
        .map_err(|e| AuditrailError::KeyIoError(format!("setting key file permissions: {e}")))
}

#[cfg(not(unix))]
fn set_owner_only_permissions(_path: &Path) -> Result<(), AuditrailError> {
    Ok(())
}

/// Verify a signature against a specific historical public key, without
/// needing a live `Signer`. Used by the auditor (C10), which verifies
/// against whichever key was active at the time of signing (spec.md §3
/// invariant 5).
pub fn verify_with_key(public_key_hex: &str, digest_hex: &str, signature_hex: &str) -> Result<bool, AuditrailError> {
    let pub_bytes = hex::decode(public_key_hex)
        .map_err(|e| AuditrailError::InvalidInput(format!("public key is not valid hex: {e}")))?;
    let pub_arr: [u8; 32] = pub_bytes
        .try_into()
        .map_err(|_| AuditrailError::InvalidInput("public key must be 32 bytes".into()))?;
    let verifying_key = VerifyingKey::from_bytes(&pub_arr)
        .map_err(|e| AuditrailError::InvalidInput(format!("malformed public key: {e}")))?;

    let sig_bytes = hex::decode(signature_hex)
        .map_err(|e| AuditrailError::InvalidInput(format!("signature is not valid hex: {e}")))?;
    let sig_arr: [u8; 64] = match sig_bytes.try_into() {
        Ok(a) => a,
        Err(_) => return Ok(false),
    };
    let signature = ed25519_dalek::Signature::from_bytes(&sig_arr);

    Ok(verifying_key.verify(digest_hex.as_bytes(), &signature).is_ok())
}
