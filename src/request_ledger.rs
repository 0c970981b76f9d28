//! Pending inbound friend requests (spec.md §4.6): each gets a FIFO under
//! `request/out/<hex(key)>`; a single byte read from it decides accept or reject.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use nix::fcntl::OFlag;

use crate::fifo::Fifo;
use crate::hex;
use crate::transport::PublicKey;

pub struct Request {
    pub public_key: PublicKey,
    pub hex: String,
    pub message: Option<String>,
    pub fifo: Fifo,
}

impl Request {
    fn create(out_dir: &Path, public_key: PublicKey, message: Option<String>) -> io::Result<Request> {
        let hex = hex::encode_lower(&public_key);
        let fifo = Fifo::reset(out_dir.join(&hex), OFlag::O_RDONLY)?;
        Ok(Request {
            public_key,
            hex,
            message,
            fifo,
        })
    }

    pub fn destroy(self) -> io::Result<()> {
        match fs::remove_file(self.fifo.path()) {
            Ok(()) | Err(_) => Ok(()),
        }
    }
}

/// The decision read from a request FIFO (spec.md §4.6).
pub enum Decision {
    Reject,
    Accept,
    /// Any byte other than `'0'`/`'1'`: ignored, the FIFO is left open.
    Ignored,
}

pub fn decode_decision(byte: u8) -> Decision {
    match byte {
        b'0' => Decision::Reject,
        b'1' => Decision::Accept,
        _ => Decision::Ignored,
    }
}

/// An insertion-ordered ledger of pending requests.
#[derive(Default)]
pub struct RequestLedger {
    out_dir: PathBuf,
    requests: Vec<Request>,
}

impl RequestLedger {
    pub fn new(out_dir: impl Into<PathBuf>) -> RequestLedger {
        RequestLedger {
            out_dir: out_dir.into(),
            requests: Vec::new(),
        }
    }

    pub fn add(&mut self, public_key: PublicKey, message: Option<String>) -> io::Result<()> {
        if self.find(&public_key).is_some() {
            return Ok(());
        }
        let request = Request::create(&self.out_dir, public_key, message)?;
        self.requests.push(request);
        Ok(())
    }

    pub fn find(&self, key: &PublicKey) -> Option<&Request> {
        self.requests.iter().find(|r| &r.public_key == key)
    }

    /// Removes a request for `key` without reading a decision from its FIFO, used
    /// when the same friend comes online through another path.
    pub fn clear_for_key(&mut self, key: &PublicKey) -> io::Result<()> {
        if let Some(index) = self.requests.iter().position(|r| &r.public_key == key) {
            let request = self.requests.remove(index);
            request.destroy()?;
        }
        Ok(())
    }

    pub fn remove(&mut self, hex: &str) -> Option<Request> {
        let index = self.requests.iter().position(|r| r.hex == hex)?;
        Some(self.requests.remove(index))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Request> {
        self.requests.iter_mut()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Request> {
        self.requests.iter()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn decode_decision_maps_bytes() {
        assert!(matches!(decode_decision(b'0'), Decision::Reject));
        assert!(matches!(decode_decision(b'1'), Decision::Accept));
        assert!(matches!(decode_decision(b'x'), Decision::Ignored));
    }

    #[test]
    fn add_is_idempotent_for_the_same_key() {
        let dir = tempdir().unwrap();
        let mut ledger = RequestLedger::new(dir.path());
        ledger.add([1u8; 32], Some("hi".to_string())).unwrap();
        ledger.add([1u8; 32], Some("hi again".to_string())).unwrap();
        assert_eq!(ledger.requests.len(), 1);
    }

    #[test]
    fn clear_for_key_removes_fifo_on_disk() {
        let dir = tempdir().unwrap();
        let mut ledger = RequestLedger::new(dir.path());
        ledger.add([2u8; 32], None).unwrap();
        let path = ledger.find(&[2u8; 32]).unwrap().fifo.path().to_path_buf();
        assert!(path.exists());
        ledger.clear_for_key(&[2u8; 32]).unwrap();
        assert!(!path.exists());
        assert!(ledger.find(&[2u8; 32]).is_none());
    }
}
