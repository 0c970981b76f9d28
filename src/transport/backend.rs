//! The interface this crate requires from the peer-to-peer transport runtime.
//!
//! The transport itself — bootstrap nodes, wire protocol, NAT traversal — is out of
//! scope (spec.md §1); this trait is the seam at which an external implementation is
//! plugged in behind a `Box<dyn TransportBackend>`, the same runtime-pluggable-backend
//! shape as the teacher crate's `Box<dyn ReplySender>` (`src/reply.rs`), which swaps
//! between its sync-channel and test senders behind one trait object rather than
//! selecting at compile time.

use std::time::Duration;

use super::abi::{Address, ConnStatus, FileControl, FileNum, FriendId, PublicKey, UserState};
use super::callbacks::TransportCallbacks;

pub struct BootstrapNode {
    pub address: &'static str,
    pub port: u16,
    pub public_key: PublicKey,
}

pub trait TransportBackend {
    /// Advances the transport's internal state machine by one tick, invoking
    /// `callbacks` synchronously for every event observed during the tick.
    fn iterate(&mut self, callbacks: &mut dyn TransportCallbacks);

    /// Upper bound on the time until the next required `iterate` call.
    fn iteration_interval(&self) -> Duration;

    /// Whether the transport currently considers itself connected to the network.
    fn is_connected(&self) -> bool;

    fn bootstrap(&mut self, nodes: &[BootstrapNode]);

    fn self_address(&self) -> Address;
    fn self_set_name(&mut self, name: &[u8]);
    fn self_name(&self) -> Vec<u8>;
    fn self_set_status_message(&mut self, status: &[u8]);
    fn self_status_message(&self) -> Vec<u8>;
    fn self_set_user_state(&mut self, state: UserState);
    fn self_user_state(&self) -> UserState;
    fn self_set_nospam(&mut self, nospam: u32);
    fn self_nospam(&self) -> u32;

    fn friend_add(&mut self, address: &Address, message: &[u8]) -> Result<FriendId, super::abi::FriendAddError>;
    fn friend_add_norequest(&mut self, key: &PublicKey) -> Result<FriendId, super::abi::FriendAddError>;
    fn friend_delete(&mut self, friend: FriendId);
    fn friend_send_message(&mut self, friend: FriendId, text: &[u8]) -> Result<(), ()>;
    fn friend_public_key(&self, friend: FriendId) -> PublicKey;
    fn friend_connection_status(&self, friend: FriendId) -> ConnStatus;
    fn friend_list(&self) -> Vec<FriendId>;

    /// Announces a new outbound transfer; returns the transport-assigned file number.
    fn file_send(&mut self, friend: FriendId) -> Result<FileNum, ()>;
    fn file_control(&mut self, friend: FriendId, file: FileNum, control: FileControl) -> Result<(), ()>;
    /// Enqueues `data` as the next chunk of an outbound transfer. Returns `Err` if the
    /// transport's internal queue is full (backpressure).
    fn file_send_chunk(&mut self, friend: FriendId, file: FileNum, data: &[u8]) -> Result<(), ()>;
    /// Size of the chunks the transport expects on outbound sends.
    fn file_chunk_size(&self) -> usize;

    /// Serializes the transport's full internal state for persistence.
    fn save(&self) -> Vec<u8>;
    /// Restores internal state previously produced by `save`.
    fn load(&mut self, data: &[u8]) -> Result<(), ()>;

    /// Downcasting escape hatch so embedders (and this crate's own integration tests)
    /// can reach implementation-specific methods on the concrete transport behind the
    /// trait object.
    fn as_any_mut(&mut self) -> &mut dyn std::any::Any;
}
