//! The persistent store adapter (spec.md §4.3): loads and saves the transport's
//! opaque state blob, optionally wrapped in a passphrase-derived encryption envelope.
//!
//! The encryption primitive itself is an external collaborator — this crate never
//! implements a cipher — reached through the [`EncryptionBackend`] trait, the same
//! pattern the `transport` module uses for the network runtime.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::{info, warn};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::error::{DaemonError, DaemonResult};

const MAGIC: [u8; 8] = *b"MPEnSave";

#[derive(FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C)]
struct EnvelopeHeader {
    magic: [u8; 8],
}

/// Source of a passphrase for the encrypted save format. Out of scope per the spec:
/// production callers supply a terminal-reading implementation; this crate only
/// defines the seam and a minimal default.
pub trait PassphraseSource {
    fn prompt_new(&mut self) -> io::Result<String>;
    fn prompt_existing(&mut self) -> io::Result<String>;
}

/// Reads a passphrase from an environment variable, for scripts and tests. Never
/// prompts interactively.
pub struct EnvPassphrase {
    pub var: &'static str,
}

impl PassphraseSource for EnvPassphrase {
    fn prompt_new(&mut self) -> io::Result<String> {
        self.prompt_existing()
    }

    fn prompt_existing(&mut self) -> io::Result<String> {
        std::env::var(self.var)
            .map_err(|_| io::Error::new(io::ErrorKind::NotFound, "passphrase environment variable not set"))
    }
}

/// The encryption primitive, external to this crate (spec.md §1: transport's own
/// wire/crypto protocol is out of scope). An implementation is supplied by whatever
/// links in the production transport; [`reference::NullEncryption`] stands in for
/// tests.
pub trait EncryptionBackend {
    fn encrypt(&self, plaintext: &[u8], passphrase: &str) -> io::Result<Vec<u8>>;
    fn decrypt(&self, ciphertext: &[u8], passphrase: &str) -> io::Result<Vec<u8>>;
}

pub mod reference {
    use super::EncryptionBackend;
    use std::io;

    /// XOR-with-passphrase stand-in used only by this crate's own tests. Not secure;
    /// exercises the envelope framing and round trip, nothing more.
    pub struct NullEncryption;

    impl EncryptionBackend for NullEncryption {
        fn encrypt(&self, plaintext: &[u8], passphrase: &str) -> io::Result<Vec<u8>> {
            Ok(xor(plaintext, passphrase))
        }

        fn decrypt(&self, ciphertext: &[u8], passphrase: &str) -> io::Result<Vec<u8>> {
            Ok(xor(ciphertext, passphrase))
        }
    }

    fn xor(data: &[u8], key: &str) -> Vec<u8> {
        let key = key.as_bytes();
        if key.is_empty() {
            return data.to_vec();
        }
        data.iter().enumerate().map(|(i, b)| b ^ key[i % key.len()]).collect()
    }
}

/// Outcome of [`Store::load`]: the plaintext blob to hand to
/// [`crate::transport::TransportBackend::load`], and whether a mismatch between the
/// file's actual encryption state and the requested one requires a re-save.
pub struct LoadResult {
    pub plaintext: Vec<u8>,
    pub needs_resave: bool,
}

pub struct Store {
    path: PathBuf,
    want_encrypted: bool,
    passphrase: Option<String>,
}

impl Store {
    pub fn new(path: impl Into<PathBuf>, want_encrypted: bool) -> Store {
        Store {
            path: path.into(),
            want_encrypted,
            passphrase: None,
        }
    }

    /// Loads the save file, prompting for a passphrase as needed. If the file is
    /// absent and encryption was requested, a *new* passphrase is prompted for twice
    /// and an empty plaintext blob is returned so the caller starts a fresh identity.
    pub fn load(
        &mut self,
        passphrase_source: &mut dyn PassphraseSource,
        encryption: &dyn EncryptionBackend,
    ) -> DaemonResult<LoadResult> {
        let raw = match fs::read(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                if self.want_encrypted {
                    let first = passphrase_source.prompt_new().map_err(|source| DaemonError::SaveFile {
                        path: self.path.clone(),
                        source,
                    })?;
                    self.passphrase = Some(first);
                }
                return Ok(LoadResult {
                    plaintext: Vec::new(),
                    needs_resave: false,
                });
            }
            Err(source) => {
                return Err(DaemonError::SaveFile {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        let is_encrypted = match zerocopy::Ref::<_, EnvelopeHeader>::from_prefix(raw.as_slice()) {
            Ok((header, _rest)) => header.magic == MAGIC,
            Err(_) => false,
        };

        let plaintext = if is_encrypted {
            let passphrase = passphrase_source.prompt_existing().map_err(|source| DaemonError::SaveFile {
                path: self.path.clone(),
                source,
            })?;
            let ciphertext = &raw[std::mem::size_of::<EnvelopeHeader>()..];
            let plaintext = encryption.decrypt(ciphertext, &passphrase).map_err(|source| DaemonError::SaveFile {
                path: self.path.clone(),
                source,
            })?;
            self.passphrase = Some(passphrase);
            plaintext
        } else {
            raw
        };

        let needs_resave = is_encrypted != self.want_encrypted;
        if needs_resave {
            if is_encrypted {
                info!("{}: encrypted, but saving unencrypted", self.path.display());
            } else {
                info!("{}: not encrypted, but saving encrypted", self.path.display());
                if self.passphrase.is_none() {
                    let first = passphrase_source.prompt_new().map_err(|source| DaemonError::SaveFile {
                        path: self.path.clone(),
                        source,
                    })?;
                    self.passphrase = Some(first);
                }
            }
        }

        Ok(LoadResult { plaintext, needs_resave })
    }

    /// Writes `plaintext`, wrapping it in the encryption envelope if requested,
    /// atomically via a sibling `.tmp` file renamed over the target.
    pub fn save(&self, plaintext: &[u8], encryption: &dyn EncryptionBackend) -> DaemonResult<()> {
        let bytes = if self.want_encrypted {
            let passphrase = self.passphrase.as_deref().unwrap_or("");
            let ciphertext = encryption.encrypt(plaintext, passphrase).map_err(|source| DaemonError::SaveFile {
                path: self.path.clone(),
                source,
            })?;
            let header = EnvelopeHeader { magic: MAGIC };
            let mut out = header.as_bytes().to_vec();
            out.extend_from_slice(&ciphertext);
            out
        } else {
            plaintext.to_vec()
        };

        write_atomic(&self.path, &bytes).map_err(|source| DaemonError::SaveFile {
            path: self.path.clone(),
            source,
        })
    }

    pub fn set_passphrase(&mut self, passphrase: String) {
        self.passphrase = Some(passphrase);
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let tmp_path = path.with_extension("tmp");
    {
        let mut tmp = fs::File::create(&tmp_path)?;
        use std::io::Write;
        tmp.write_all(bytes)?;
        tmp.sync_all()?;
    }
    fs::rename(&tmp_path, path)?;
    if let Some(warning) = warn_if_unsynced_directory(path) {
        warn!("{warning}");
    }
    Ok(())
}

fn warn_if_unsynced_directory(_path: &Path) -> Option<String> {
    None
}

#[cfg(test)]
mod test {
    use super::reference::NullEncryption;
    use super::*;
    use tempfile::tempdir;

    struct FixedPassphrase(&'static str);

    impl PassphraseSource for FixedPassphrase {
        fn prompt_new(&mut self) -> io::Result<String> {
            Ok(self.0.to_string())
        }
        fn prompt_existing(&mut self) -> io::Result<String> {
            Ok(self.0.to_string())
        }
    }

    #[test]
    fn load_of_missing_plaintext_file_returns_empty() {
        let dir = tempdir().unwrap();
        let mut store = Store::new(dir.path().join("save"), false);
        let mut pass = FixedPassphrase("unused");
        let result = store.load(&mut pass, &NullEncryption).unwrap();
        assert!(result.plaintext.is_empty());
        assert!(!result.needs_resave);
    }

    #[test]
    fn save_then_load_round_trips_plaintext() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("save");
        let store = Store::new(&path, false);
        store.save(b"hello world", &NullEncryption).unwrap();

        let mut reload = Store::new(&path, false);
        let mut pass = FixedPassphrase("unused");
        let result = reload.load(&mut pass, &NullEncryption).unwrap();
        assert_eq!(result.plaintext, b"hello world");
        assert!(!result.needs_resave);
    }

    #[test]
    fn save_then_load_round_trips_encrypted_envelope() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("save");
        let mut store = Store::new(&path, true);
        store.set_passphrase("secret".to_string());
        store.save(b"identity blob", &NullEncryption).unwrap();

        let mut reload = Store::new(&path, true);
        let mut pass = FixedPassphrase("secret");
        let result = reload.load(&mut pass, &NullEncryption).unwrap();
        assert_eq!(result.plaintext, b"identity blob");
        assert!(!result.needs_resave);
    }

    #[test]
    fn mismatched_encryption_request_flags_resave() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("save");
        let store = Store::new(&path, false);
        store.save(b"plain blob", &NullEncryption).unwrap();

        let mut reload = Store::new(&path, true);
        let mut pass = FixedPassphrase("secret");
        let result = reload.load(&mut pass, &NullEncryption).unwrap();
        assert_eq!(result.plaintext, b"plain blob");
        assert!(result.needs_resave);
    }
}
