//! An in-process reference `TransportBackend`, used by this crate's own tests and as
//! a runnable stand-in when no production transport is wired up. It speaks no real
//! network protocol; friend requests and messages are driven entirely by the test
//! harness calling `ReferenceTransport::inject_*` between `iterate` calls.

use std::collections::BTreeMap;
use std::time::Duration;

use super::abi::{
    Address, ConnStatus, FileControl, FileNum, FriendAddError, FriendId, PublicKey, UserState,
    ADDRESS_SIZE, PUBLIC_KEY_SIZE,
};
use super::backend::{BootstrapNode, TransportBackend};
use super::callbacks::TransportCallbacks;

struct FriendRecord {
    public_key: PublicKey,
    status: ConnStatus,
}

enum InjectedEvent {
    ConnStatus(FriendId, ConnStatus),
    FriendMessage(FriendId, Vec<u8>),
    FriendRequest(PublicKey, Vec<u8>),
    NameChange(FriendId, Vec<u8>),
    StatusMessage(FriendId, Vec<u8>),
    UserState(FriendId, UserState),
    FileControl(FriendId, FileNum, FileControl),
    FileChunkRequest(FriendId, FileNum, u64, usize),
    FileRecv(FriendId, FileNum, u64, Vec<u8>),
    FileChunk(FriendId, FileNum, u64, Vec<u8>),
}

pub struct ReferenceTransport {
    name: Vec<u8>,
    status_message: Vec<u8>,
    user_state: UserState,
    nospam: u32,
    public_key: PublicKey,
    next_friend_id: FriendId,
    friends: BTreeMap<FriendId, FriendRecord>,
    connected: bool,
    queue: Vec<InjectedEvent>,
    chunk_size: usize,
    control_log: Vec<(FriendId, FileNum, FileControl)>,
}

impl ReferenceTransport {
    pub fn new(public_key: PublicKey) -> ReferenceTransport {
        ReferenceTransport {
            name: Vec::new(),
            status_message: Vec::new(),
            user_state: UserState::None,
            nospam: 0,
            public_key,
            next_friend_id: 0,
            friends: BTreeMap::new(),
            connected: false,
            queue: Vec::new(),
            chunk_size: 1024,
            control_log: Vec::new(),
        }
    }

    /// Every `file_control` call the daemon has issued against this transport, in
    /// order. Used by this crate's own tests to observe control flow that has no
    /// other externally visible effect.
    pub fn control_log(&self) -> &[(FriendId, FileNum, FileControl)] {
        &self.control_log
    }

    pub fn set_connected(&mut self, connected: bool) {
        self.connected = connected;
    }

    pub fn inject_conn_status(&mut self, friend: FriendId, status: ConnStatus) {
        self.queue.push(InjectedEvent::ConnStatus(friend, status));
    }

    pub fn inject_friend_request(&mut self, key: PublicKey, message: Vec<u8>) {
        self.queue.push(InjectedEvent::FriendRequest(key, message));
    }

    pub fn inject_friend_message(&mut self, friend: FriendId, text: Vec<u8>) {
        self.queue.push(InjectedEvent::FriendMessage(friend, text));
    }

    pub fn inject_file_recv(&mut self, friend: FriendId, file: FileNum, size: u64, name: Vec<u8>) {
        self.queue.push(InjectedEvent::FileRecv(friend, file, size, name));
    }

    pub fn inject_file_chunk(&mut self, friend: FriendId, file: FileNum, position: u64, data: Vec<u8>) {
        self.queue.push(InjectedEvent::FileChunk(friend, file, position, data));
    }

    pub fn inject_file_control(&mut self, friend: FriendId, file: FileNum, control: FileControl) {
        self.queue.push(InjectedEvent::FileControl(friend, file, control));
    }

    fn checksum(key: &PublicKey, nospam: u32) -> [u8; 2] {
        let nospam_bytes = nospam.to_be_bytes();
        let mut acc = [0u8; 2];
        for (i, b) in key.iter().chain(nospam_bytes.iter()).enumerate() {
            acc[i % 2] ^= b;
        }
        acc
    }
}

impl TransportBackend for ReferenceTransport {
    fn iterate(&mut self, callbacks: &mut dyn TransportCallbacks) {
        for event in self.queue.drain(..) {
            match event {
                InjectedEvent::ConnStatus(f, s) => {
                    if let Some(rec) = self.friends.get_mut(&f) {
                        rec.status = s;
                    }
                    callbacks.conn_status(f, s);
                }
                InjectedEvent::FriendMessage(f, text) => callbacks.friend_message(f, &text),
                InjectedEvent::FriendRequest(key, msg) => callbacks.friend_request(key, &msg),
                InjectedEvent::NameChange(f, name) => callbacks.name_change(f, &name),
                InjectedEvent::StatusMessage(f, status) => callbacks.status_message(f, &status),
                InjectedEvent::UserState(f, state) => callbacks.user_state(f, state),
                InjectedEvent::FileControl(f, file, ctrl) => callbacks.file_control(f, file, ctrl),
                InjectedEvent::FileChunkRequest(f, file, pos, len) => {
                    callbacks.file_chunk_request(f, file, pos, len)
                }
                InjectedEvent::FileRecv(f, file, size, name) => callbacks.file_recv(f, file, size, &name),
                InjectedEvent::FileChunk(f, file, pos, data) => callbacks.file_chunk(f, file, pos, &data),
            }
        }
    }

    fn iteration_interval(&self) -> Duration {
        Duration::from_millis(50)
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn bootstrap(&mut self, _nodes: &[BootstrapNode]) {
        self.connected = true;
    }

    fn self_address(&self) -> Address {
        let mut addr = [0u8; ADDRESS_SIZE];
        addr[..PUBLIC_KEY_SIZE].copy_from_slice(&self.public_key);
        addr[PUBLIC_KEY_SIZE..PUBLIC_KEY_SIZE + 4].copy_from_slice(&self.nospam.to_be_bytes());
        let cs = Self::checksum(&self.public_key, self.nospam);
        addr[PUBLIC_KEY_SIZE + 4..].copy_from_slice(&cs);
        addr
    }

    fn self_set_name(&mut self, name: &[u8]) {
        self.name = name.to_vec();
    }

    fn self_name(&self) -> Vec<u8> {
        self.name.clone()
    }

    fn self_set_status_message(&mut self, status: &[u8]) {
        self.status_message = status.to_vec();
    }

    fn self_status_message(&self) -> Vec<u8> {
        self.status_message.clone()
    }

    fn self_set_user_state(&mut self, state: UserState) {
        self.user_state = state;
    }

    fn self_user_state(&self) -> UserState {
        self.user_state
    }

    fn self_set_nospam(&mut self, nospam: u32) {
        self.nospam = nospam;
    }

    fn self_nospam(&self) -> u32 {
        self.nospam
    }

    fn friend_add(&mut self, address: &Address, message: &[u8]) -> Result<FriendId, FriendAddError> {
        if message.is_empty() {
            return Err(FriendAddError::NoMessage);
        }
        let mut key = [0u8; PUBLIC_KEY_SIZE];
        key.copy_from_slice(&address[..PUBLIC_KEY_SIZE]);
        if key == self.public_key {
            return Err(FriendAddError::OwnKey);
        }
        self.friend_add_norequest(&key)
    }

    fn friend_add_norequest(&mut self, key: &PublicKey) -> Result<FriendId, FriendAddError> {
        let id = self.next_friend_id;
        self.next_friend_id += 1;
        self.friends.insert(
            id,
            FriendRecord {
                public_key: *key,
                status: ConnStatus::None,
            },
        );
        Ok(id)
    }

    fn friend_delete(&mut self, friend: FriendId) {
        self.friends.remove(&friend);
    }

    fn friend_send_message(&mut self, friend: FriendId, _text: &[u8]) -> Result<(), ()> {
        if self.friends.contains_key(&friend) {
            Ok(())
        } else {
            Err(())
        }
    }

    fn friend_public_key(&self, friend: FriendId) -> PublicKey {
        self.friends.get(&friend).map(|r| r.public_key).unwrap_or([0u8; PUBLIC_KEY_SIZE])
    }

    fn friend_connection_status(&self, friend: FriendId) -> ConnStatus {
        self.friends.get(&friend).map(|r| r.status).unwrap_or(ConnStatus::None)
    }

    fn friend_list(&self) -> Vec<FriendId> {
        self.friends.keys().copied().collect()
    }

    fn file_send(&mut self, _friend: FriendId) -> Result<FileNum, ()> {
        Ok(0)
    }

    fn file_control(&mut self, friend: FriendId, file: FileNum, control: FileControl) -> Result<(), ()> {
        self.control_log.push((friend, file, control));
        Ok(())
    }

    fn file_send_chunk(&mut self, _friend: FriendId, _file: FileNum, _data: &[u8]) -> Result<(), ()> {
        Ok(())
    }

    fn file_chunk_size(&self) -> usize {
        self.chunk_size
    }

    fn save(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&self.public_key);
        out.extend_from_slice(&self.nospam.to_be_bytes());
        out.extend_from_slice(&(self.name.len() as u32).to_be_bytes());
        out.extend_from_slice(&self.name);
        out
    }

    fn load(&mut self, data: &[u8]) -> Result<(), ()> {
        if data.len() < PUBLIC_KEY_SIZE + 8 {
            return Err(());
        }
        self.public_key.copy_from_slice(&data[..PUBLIC_KEY_SIZE]);
        let mut off = PUBLIC_KEY_SIZE;
        self.nospam = u32::from_be_bytes(data[off..off + 4].try_into().unwrap());
        off += 4;
        let name_len = u32::from_be_bytes(data[off..off + 4].try_into().unwrap()) as usize;
        off += 4;
        if data.len() < off + name_len {
            return Err(());
        }
        self.name = data[off..off + name_len].to_vec();
        Ok(())
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        requests: Vec<(PublicKey, Vec<u8>)>,
    }

    impl TransportCallbacks for Recorder {
        fn friend_request(&mut self, key: PublicKey, message: &[u8]) {
            self.requests.push((key, message.to_vec()));
        }
    }

    #[test]
    fn iterate_delivers_injected_friend_request() {
        let mut transport = ReferenceTransport::new([1u8; PUBLIC_KEY_SIZE]);
        transport.inject_friend_request([2u8; PUBLIC_KEY_SIZE], b"hi".to_vec());
        let mut recorder = Recorder::default();
        transport.iterate(&mut recorder);
        assert_eq!(recorder.requests, vec![([2u8; PUBLIC_KEY_SIZE], b"hi".to_vec())]);
    }

    #[test]
    fn save_load_round_trips_name_and_nospam() {
        let mut transport = ReferenceTransport::new([3u8; PUBLIC_KEY_SIZE]);
        transport.self_set_name(b"alice");
        transport.self_set_nospam(0xDEADBEEF);
        let bytes = transport.save();

        let mut restored = ReferenceTransport::new([0u8; PUBLIC_KEY_SIZE]);
        restored.load(&bytes).unwrap();
        assert_eq!(restored.self_name(), b"alice");
        assert_eq!(restored.self_nospam(), 0xDEADBEEF);
    }
}
