//! Wire-level constants and small enumerations describing the transport's data
//! shapes. Mirrors the role of the teacher crate's `ll::fuse_abi` module: the ABI the
//! external runtime is assumed to speak, kept separate from the safe wrapper that
//! uses it.

use num_enum::{IntoPrimitive, TryFromPrimitive};

pub const PUBLIC_KEY_SIZE: usize = 32;
/// Public key + 4-byte nospam + 2-byte checksum.
pub const ADDRESS_SIZE: usize = PUBLIC_KEY_SIZE + 4 + 2;
pub const MAX_NAME_LENGTH: usize = 128;
pub const MAX_STATUS_MESSAGE_LENGTH: usize = 1007;
pub const MAX_MESSAGE_LENGTH: usize = 1372;

/// A 32-byte transport public key.
pub type PublicKey = [u8; PUBLIC_KEY_SIZE];
/// A 38-byte friend address: public key + nospam + checksum.
pub type Address = [u8; ADDRESS_SIZE];
/// An opaque friend handle assigned by the transport.
pub type FriendId = u32;
/// An opaque per-friend file-transfer handle assigned by the transport.
pub type FileNum = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum ConnStatus {
    None = 0,
    Tcp = 1,
    Udp = 2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum UserState {
    None = 0,
    Away = 1,
    Busy = 2,
}

impl UserState {
    pub fn as_str(self) -> &'static str {
        match self {
            UserState::None => "none",
            UserState::Away => "away",
            UserState::Busy => "busy",
        }
    }

    pub fn from_str(s: &str) -> Option<UserState> {
        match s {
            "none" => Some(UserState::None),
            "away" => Some(UserState::Away),
            "busy" => Some(UserState::Busy),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum FileControl {
    Resume = 0,
    Pause = 1,
    Cancel = 2,
}

/// Mirrors the transport's `FRIEND_ADD_*` error enumeration (spec.md §7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FriendAddError {
    Null,
    TooLong,
    NoMessage,
    OwnKey,
    AlreadySent,
    BadChecksum,
    SetNewNospam,
    Malloc,
}

impl FriendAddError {
    /// Human string written to `request/err`, mirroring the original's `reqerr[]` table.
    pub fn as_str(self) -> &'static str {
        match self {
            FriendAddError::Null => "Unexpected argument, NULL error",
            FriendAddError::TooLong => "Message is too long",
            FriendAddError::NoMessage => "Please add a message to your request",
            FriendAddError::OwnKey => "That appears to be your own ID",
            FriendAddError::AlreadySent => "Friend request already sent",
            FriendAddError::BadChecksum => "Bad checksum while verifying address",
            FriendAddError::SetNewNospam => "Friend already added but invalid nospam",
            FriendAddError::Malloc => "Error increasing the friend list size",
        }
    }
}

impl std::fmt::Display for FriendAddError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
