//! The seam between this daemon and the peer-to-peer transport runtime.
//!
//! `backend` defines the trait an external transport implements; `callbacks` defines
//! the trait the daemon implements to receive transport events; `abi` holds the
//! shared constants and small value types; `reference` is an in-process stand-in used
//! by this crate's own tests.

pub mod abi;
pub mod backend;
pub mod callbacks;
pub mod reference;

pub use abi::{
    Address, ConnStatus, FileControl, FileNum, FriendAddError, FriendId, PublicKey, UserState,
    ADDRESS_SIZE, MAX_MESSAGE_LENGTH, MAX_NAME_LENGTH, MAX_STATUS_MESSAGE_LENGTH, PUBLIC_KEY_SIZE,
};
pub use backend::{BootstrapNode, TransportBackend};
pub use callbacks::TransportCallbacks;
pub use reference::ReferenceTransport;
