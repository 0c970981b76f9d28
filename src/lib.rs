//! A headless daemon exposing a peer-to-peer secure-messaging identity as a
//! filesystem of FIFOs and status files: every knob and every conversation surface is
//! a named pipe or regular file under a working directory.

pub mod error;
pub mod eventloop;
pub mod fifo;
pub mod friend;
pub mod hex;
pub mod identity;
pub mod passphrase;
pub mod request_ledger;
pub mod signals;
pub mod slots;
pub mod store;
pub mod transfer;
pub mod transport;

pub use error::{DaemonError, DaemonResult};
pub use eventloop::EventLoop;
