//! The five global slots (spec.md §4.4): `name`, `status`, `state`, `request`,
//! `nospam`. Each is a directory with an `in` FIFO, an `out` sink, and an `err` file;
//! a readable `in` drives the slot's callback.

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use nix::fcntl::OFlag;

use crate::error::{DaemonError, DaemonResult};
use crate::fifo::Fifo;
use crate::hex;
use crate::identity;
use crate::request_ledger::RequestLedger;
use crate::transport::{TransportBackend, UserState, ADDRESS_SIZE};

/// Strips at most one trailing `\n` (and a preceding `\r`), mirroring the FIFOs'
/// line-oriented external writers (`echo` et al.).
pub fn strip_trailing_newline(mut line: &[u8]) -> &[u8] {
    if line.last() == Some(&b'\n') {
        line = &line[..line.len() - 1];
    }
    if line.last() == Some(&b'\r') {
        line = &line[..line.len() - 1];
    }
    line
}

fn write_truncate(path: &Path, data: &[u8]) -> io::Result<()> {
    let mut f = OpenOptions::new().create(true).write(true).truncate(true).open(path)?;
    f.write_all(data)
}

/// A slot whose `out` sink is a single file (`name`, `status`, `state`, `nospam`).
pub struct FileSlot {
    pub in_fifo: Fifo,
    out_path: PathBuf,
    err_path: PathBuf,
}

impl FileSlot {
    pub fn create(root: &Path, name: &str) -> DaemonResult<FileSlot> {
        let dir = root.join(name);
        std::fs::create_dir_all(&dir).map_err(|source| DaemonError::Directory {
            path: dir.clone(),
            source,
        })?;
        let in_path = dir.join("in");
        let in_fifo = Fifo::reset(&in_path, OFlag::O_RDONLY).map_err(|source| DaemonError::Fifo {
            path: in_path,
            source,
        })?;
        let out_path = dir.join("out");
        let err_path = dir.join("err");
        write_truncate(&out_path, b"")?;
        write_truncate(&err_path, b"")?;
        Ok(FileSlot {
            in_fifo,
            out_path,
            err_path,
        })
    }

    pub fn write_out(&self, data: &[u8]) -> io::Result<()> {
        write_truncate(&self.out_path, data)
    }

    pub fn write_err(&self, message: &str) -> io::Result<()> {
        let mut line = message.as_bytes().to_vec();
        line.push(b'\n');
        write_truncate(&self.err_path, &line)
    }
}

/// The `request` slot: `in` and `err` as usual, but `out` is a directory of
/// per-requester FIFOs owned by [`RequestLedger`].
pub struct RequestSlot {
    pub in_fifo: Fifo,
    err_path: PathBuf,
    pub ledger: RequestLedger,
}

impl RequestSlot {
    pub fn create(root: &Path) -> DaemonResult<RequestSlot> {
        let dir = root.join("request");
        std::fs::create_dir_all(&dir).map_err(|source| DaemonError::Directory {
            path: dir.clone(),
            source,
        })?;
        let in_path = dir.join("in");
        let in_fifo = Fifo::reset(&in_path, OFlag::O_RDONLY).map_err(|source| DaemonError::Fifo {
            path: in_path,
            source,
        })?;
        let err_path = dir.join("err");
        write_truncate(&err_path, b"")?;
        let out_dir = dir.join("out");
        std::fs::create_dir_all(&out_dir).map_err(|source| DaemonError::Directory {
            path: out_dir.clone(),
            source,
        })?;
        Ok(RequestSlot {
            in_fifo,
            err_path,
            ledger: RequestLedger::new(out_dir),
        })
    }

    pub fn write_err(&self, message: &str) -> io::Result<()> {
        let mut line = message.as_bytes().to_vec();
        line.push(b'\n');
        write_truncate(&self.err_path, &line)
    }
}

/// All five global slots plus the `id` file they jointly keep in sync.
pub struct GlobalSlots {
    root: PathBuf,
    pub name: FileSlot,
    pub status: FileSlot,
    pub state: FileSlot,
    pub nospam: FileSlot,
    pub request: RequestSlot,
}

impl GlobalSlots {
    pub fn create(root: impl Into<PathBuf>) -> DaemonResult<GlobalSlots> {
        let root = root.into();
        Ok(GlobalSlots {
            name: FileSlot::create(&root, "name")?,
            status: FileSlot::create(&root, "status")?,
            state: FileSlot::create(&root, "state")?,
            nospam: FileSlot::create(&root, "nospam")?,
            request: RequestSlot::create(&root)?,
            root,
        })
    }

    /// Rewrites `./id` with the identity's current 38-byte address, uppercase hex
    /// plus trailing newline (spec.md §3 invariant).
    pub fn write_id(&self, transport: &dyn TransportBackend) -> io::Result<()> {
        let address = transport.self_address();
        let mut line = hex::encode_upper(&address).into_bytes();
        line.push(b'\n');
        write_truncate(&self.root.join("id"), &line)
    }

    pub fn remove_id(&self) -> io::Result<()> {
        match std::fs::remove_file(self.root.join("id")) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}

/// `name/in` became readable: apply the truncated name, echo to `out`.
pub fn handle_name(slot: &FileSlot, transport: &mut dyn TransportBackend, line: &[u8]) -> io::Result<()> {
    let line = strip_trailing_newline(line);
    if line.is_empty() {
        // An empty write leaves the previous name intact (spec.md §8 boundary behavior).
        return Ok(());
    }
    let applied = identity::set_name(transport, line);
    let mut echoed = applied;
    echoed.push(b'\n');
    slot.write_out(&echoed)
}

pub fn handle_status(slot: &FileSlot, transport: &mut dyn TransportBackend, line: &[u8]) -> io::Result<()> {
    let line = strip_trailing_newline(line);
    if line.is_empty() {
        return Ok(());
    }
    let applied = identity::set_status_message(transport, line);
    let mut echoed = applied;
    echoed.push(b'\n');
    slot.write_out(&echoed)
}

pub fn handle_state(slot: &FileSlot, transport: &mut dyn TransportBackend, line: &[u8]) -> io::Result<()> {
    let line = strip_trailing_newline(line);
    let text = match std::str::from_utf8(line) {
        Ok(s) => s,
        Err(_) => {
            slot.write_err("invalid state")?;
            return Ok(());
        }
    };
    match UserState::from_str(text) {
        Some(state) => {
            transport.self_set_user_state(state);
            let mut echoed = text.as_bytes().to_vec();
            echoed.push(b'\n');
            slot.write_out(&echoed)
        }
        None => slot.write_err("invalid state"),
    }
}

/// Outcome of a `nospam/in` write requiring the caller to rewrite `id`.
pub enum NospamOutcome {
    Applied,
    Invalid,
}

pub fn handle_nospam(slot: &FileSlot, transport: &mut dyn TransportBackend, line: &[u8]) -> io::Result<NospamOutcome> {
    let line = strip_trailing_newline(line);
    let text = match std::str::from_utf8(line) {
        Ok(s) => s,
        Err(_) => {
            slot.write_err("invalid nospam")?;
            return Ok(NospamOutcome::Invalid);
        }
    };
    match hex::decode::<4>(text) {
        Some(bytes) => {
            let nospam = u32::from_be_bytes(bytes);
            transport.self_set_nospam(nospam);
            let mut echoed = text.to_uppercase().into_bytes();
            echoed.push(b'\n');
            slot.write_out(&echoed)?;
            Ok(NospamOutcome::Applied)
        }
        None => {
            slot.write_err("invalid nospam")?;
            Ok(NospamOutcome::Invalid)
        }
    }
}

/// Outcome of a `request/in` write, before the friend directory is created by the
/// event loop (which owns the friend collection).
pub enum RequestOutcome {
    /// `request/in` line was malformed (wrong hex length).
    InvalidId,
    /// Transport rejected the add with a mapped error string already written to `err`.
    Rejected,
    /// Accepted; caller should create the friend directory and persist.
    Accepted(crate::transport::FriendId),
}

pub fn handle_request(slot: &RequestSlot, transport: &mut dyn TransportBackend, line: &[u8]) -> io::Result<RequestOutcome> {
    let line = strip_trailing_newline(line);
    let text = String::from_utf8_lossy(line);
    let mut parts = text.splitn(2, ' ');
    let id_part = parts.next().unwrap_or("");
    let message = parts.next().unwrap_or("");

    if id_part.len() != ADDRESS_SIZE * 2 {
        slot.write_err("Invalid friend ID")?;
        return Ok(RequestOutcome::InvalidId);
    }
    let address: [u8; ADDRESS_SIZE] = match hex::decode(id_part) {
        Some(a) => a,
        None => {
            slot.write_err("Invalid friend ID")?;
            return Ok(RequestOutcome::InvalidId);
        }
    };

    match transport.friend_add(&address, message.as_bytes()) {
        Ok(id) => Ok(RequestOutcome::Accepted(id)),
        Err(e) => {
            slot.write_err(&e.to_string())?;
            Ok(RequestOutcome::Rejected)
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::transport::ReferenceTransport;
    use tempfile::tempdir;

    #[test]
    fn handle_name_echoes_and_ignores_empty_write() {
        let dir = tempdir().unwrap();
        let slot = FileSlot::create(dir.path(), "name").unwrap();
        let mut transport = ReferenceTransport::new([0u8; 32]);
        handle_name(&slot, &mut transport, b"alice\n").unwrap();
        assert_eq!(transport.self_name(), b"alice");
        assert_eq!(std::fs::read(dir.path().join("name/out")).unwrap(), b"alice\n");

        handle_name(&slot, &mut transport, b"\n").unwrap();
        assert_eq!(transport.self_name(), b"alice", "empty write must not clear the name");
    }

    #[test]
    fn handle_state_rejects_unknown_word() {
        let dir = tempdir().unwrap();
        let slot = FileSlot::create(dir.path(), "state").unwrap();
        let mut transport = ReferenceTransport::new([0u8; 32]);
        handle_state(&slot, &mut transport, b"sleepy\n").unwrap();
        let err = std::fs::read_to_string(dir.path().join("state/err")).unwrap();
        assert!(err.contains("invalid state"));
    }

    #[test]
    fn handle_nospam_rewrites_out_uppercase() {
        let dir = tempdir().unwrap();
        let slot = FileSlot::create(dir.path(), "nospam").unwrap();
        let mut transport = ReferenceTransport::new([0u8; 32]);
        let outcome = handle_nospam(&slot, &mut transport, b"deadbeef\n").unwrap();
        assert!(matches!(outcome, NospamOutcome::Applied));
        assert_eq!(transport.self_nospam(), 0xDEADBEEF);
        assert_eq!(std::fs::read(dir.path().join("nospam/out")).unwrap(), b"DEADBEEF\n");
    }

    #[test]
    fn handle_request_rejects_wrong_length_id() {
        let dir = tempdir().unwrap();
        let slot = RequestSlot::create(dir.path()).unwrap();
        let mut transport = ReferenceTransport::new([0u8; 32]);
        let outcome = handle_request(&slot, &mut transport, b"deadbeef ping\n").unwrap();
        assert!(matches!(outcome, RequestOutcome::InvalidId));
        let err = std::fs::read_to_string(dir.path().join("request/err")).unwrap();
        assert_eq!(err.trim(), "Invalid friend ID");
    }
}
