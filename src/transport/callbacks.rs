//! The callback contract the transport invokes during `iterate` (spec.md §4.9).
//!
//! Mirrors the teacher crate's `Filesystem` trait: the transport is generic over any
//! implementor, default methods are no-ops, and the implementor mutates its own state
//! synchronously from inside the call. Callbacks never block.

use super::abi::{ConnStatus, FileControl, FriendId, FileNum, PublicKey, UserState};

pub trait TransportCallbacks {
    /// A friend's connection state changed.
    fn conn_status(&mut self, _friend: FriendId, _status: ConnStatus) {}

    /// An inbound text message arrived from a friend.
    fn friend_message(&mut self, _friend: FriendId, _text: &[u8]) {}

    /// A stranger asked to become a friend.
    fn friend_request(&mut self, _key: PublicKey, _message: &[u8]) {}

    fn name_change(&mut self, _friend: FriendId, _name: &[u8]) {}

    fn status_message(&mut self, _friend: FriendId, _status: &[u8]) {}

    fn user_state(&mut self, _friend: FriendId, _state: UserState) {}

    /// The peer paused, resumed, or cancelled a transfer. `file == 0` and the control
    /// originating from the receiver drives our send state machine; anything else is
    /// a receive-side cancel.
    fn file_control(&mut self, _friend: FriendId, _file: FileNum, _control: FileControl) {}

    /// The transport is ready for another outbound chunk.
    fn file_chunk_request(&mut self, _friend: FriendId, _file: FileNum, _position: u64, _len: usize) {}

    /// The peer offered an inbound file of `size` bytes named `name`.
    fn file_recv(&mut self, _friend: FriendId, _file: FileNum, _size: u64, _name: &[u8]) {}

    /// A chunk of an inbound file arrived.
    fn file_chunk(&mut self, _friend: FriendId, _file: FileNum, _position: u64, _data: &[u8]) {}
}
