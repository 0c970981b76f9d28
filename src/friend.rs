//! The friend collection: one directory per peer, keyed by hex public key, holding
//! the fixed set of files from spec.md §6 plus the transfer substates of §4.7.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

use nix::fcntl::OFlag;

use crate::fifo::Fifo;
use crate::hex;
use crate::transport::{ConnStatus, FriendId, PublicKey, UserState};
use crate::transfer::{RxState, SendState};

/// One peer's on-disk directory and transfer state. Iteration order over the owning
/// collection is insertion order, mirroring the original's `TAILQ`.
pub struct Friend {
    pub id: FriendId,
    pub public_key: PublicKey,
    pub hex: String,
    pub dir: PathBuf,
    pub text_in: Fifo,
    pub file_in: Fifo,
    pub remove: Fifo,
    pub tx: SendState,
    pub rx: RxState,
    file_out: Option<File>,
}

impl Friend {
    /// Creates `<dir>/<hex>/` with its fixed file set and opens the two inbound FIFOs
    /// and the `remove` FIFO non-blocking for reading.
    pub fn create(root: &Path, id: FriendId, public_key: PublicKey) -> io::Result<Friend> {
        let hex = hex::encode_lower(&public_key);
        let dir = root.join(&hex);
        fs::create_dir_all(&dir)?;

        let text_in = Fifo::reset(dir.join("text_in"), OFlag::O_RDONLY)?;
        let file_in = Fifo::reset(dir.join("file_in"), OFlag::O_RDONLY)?;
        let remove = Fifo::reset(dir.join("remove"), OFlag::O_RDONLY)?;

        write_truncate(&dir.join("online"), b"0")?;
        write_truncate(&dir.join("name"), b"")?;
        write_truncate(&dir.join("status"), b"")?;
        write_truncate(&dir.join("state"), UserState::None.as_str().as_bytes())?;
        write_truncate(&dir.join("file_pending"), b"")?;

        Ok(Friend {
            id,
            public_key,
            hex,
            dir,
            text_in,
            file_in,
            remove,
            tx: SendState::default(),
            rx: RxState::default(),
            file_out: None,
        })
    }

    pub fn set_online(&self, status: ConnStatus) -> io::Result<()> {
        let code: u8 = status.into();
        write_truncate(&self.dir.join("online"), code.to_string().as_bytes())
    }

    pub fn set_name(&self, name: &[u8]) -> io::Result<()> {
        write_truncate(&self.dir.join("name"), name)
    }

    pub fn set_status_message(&self, status: &[u8]) -> io::Result<()> {
        write_truncate(&self.dir.join("status"), status)
    }

    pub fn set_state(&self, state: UserState) -> io::Result<()> {
        write_truncate(&self.dir.join("state"), state.as_str().as_bytes())
    }

    pub fn set_file_pending(&self, name: &[u8]) -> io::Result<()> {
        write_truncate(&self.dir.join("file_pending"), name)
    }

    pub fn append_text_out(&self, line: &[u8]) -> io::Result<()> {
        let mut f = OpenOptions::new().create(true).append(true).open(self.dir.join("text_out"))?;
        f.write_all(line)
    }

    /// Lazily opens `file_out` non-blocking for writing. Returns `Ok(true)` the first
    /// time an external reader has attached (detected by a successful non-blocking
    /// open), `Ok(false)` if no reader has attached yet.
    pub fn try_attach_file_out(&mut self) -> io::Result<bool> {
        if self.file_out.is_some() {
            return Ok(false);
        }
        match OpenOptions::new().write(true).custom_flags(libc::O_NONBLOCK).open(self.dir.join("file_out")) {
            Ok(f) => {
                self.file_out = Some(f);
                Ok(true)
            }
            Err(e) if e.raw_os_error() == Some(libc::ENXIO) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Writes a received chunk to `file_out`. `Err` with `ErrorKind::BrokenPipe` means
    /// the reader went away and the receive should be cancelled.
    pub fn write_file_out(&mut self, data: &[u8]) -> io::Result<()> {
        match &mut self.file_out {
            Some(f) => f.write_all(data),
            None => Err(io::Error::new(io::ErrorKind::NotConnected, "file_out not attached")),
        }
    }

    pub fn close_file_out(&mut self) {
        self.file_out = None;
    }

    pub fn destroy(self) -> io::Result<()> {
        fs::remove_dir_all(&self.dir)
    }
}

fn write_truncate(path: &Path, data: &[u8]) -> io::Result<()> {
    let mut f = OpenOptions::new().create(true).write(true).truncate(true).open(path)?;
    f.write_all(data)
}

/// An insertion-ordered collection of friends.
#[derive(Default)]
pub struct FriendTable {
    friends: Vec<Friend>,
}

impl FriendTable {
    pub fn new() -> FriendTable {
        FriendTable { friends: Vec::new() }
    }

    pub fn insert(&mut self, friend: Friend) {
        self.friends.push(friend);
    }

    pub fn remove(&mut self, id: FriendId) -> Option<Friend> {
        let index = self.friends.iter().position(|f| f.id == id)?;
        Some(self.friends.remove(index))
    }

    pub fn get(&self, id: FriendId) -> Option<&Friend> {
        self.friends.iter().find(|f| f.id == id)
    }

    pub fn get_mut(&mut self, id: FriendId) -> Option<&mut Friend> {
        self.friends.iter_mut().find(|f| f.id == id)
    }

    pub fn find_by_public_key(&self, key: &PublicKey) -> Option<&Friend> {
        self.friends.iter().find(|f| &f.public_key == key)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Friend> {
        self.friends.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Friend> {
        self.friends.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.friends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.friends.is_empty()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn create_populates_fixed_file_set() {
        let dir = tempdir().unwrap();
        let friend = Friend::create(dir.path(), 1, [9u8; 32]).unwrap();
        for name in ["online", "name", "status", "state", "file_pending", "text_in", "file_in", "remove"] {
            assert!(friend.dir.join(name).exists(), "missing {name}");
        }
    }

    #[test]
    fn friend_table_insert_and_remove_round_trip() {
        let dir = tempdir().unwrap();
        let mut table = FriendTable::new();
        table.insert(Friend::create(dir.path(), 1, [1u8; 32]).unwrap());
        table.insert(Friend::create(dir.path(), 2, [2u8; 32]).unwrap());
        assert_eq!(table.len(), 2);
        assert!(table.get(1).is_some());
        let removed = table.remove(1).unwrap();
        assert_eq!(removed.id, 1);
        assert_eq!(table.len(), 1);
        assert!(table.get(1).is_none());
    }

    #[test]
    fn destroy_removes_directory() {
        let dir = tempdir().unwrap();
        let friend = Friend::create(dir.path(), 1, [3u8; 32]).unwrap();
        let path = friend.dir.clone();
        friend.destroy().unwrap();
        assert!(!path.exists());
    }
}
