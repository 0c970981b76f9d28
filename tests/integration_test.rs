//! End-to-end scenarios driving `EventLoop` over a real temporary directory, the way
//! an external shell script would: write to the FIFOs a user-facing slot exposes and
//! observe the resulting filesystem state.

use std::fs::{self, OpenOptions};
use std::io::Write;

use meshpipe::eventloop::EventLoop;
use meshpipe::slots::GlobalSlots;
use meshpipe::store::reference::NullEncryption;
use meshpipe::store::{PassphraseSource, Store};
use meshpipe::transport::{ConnStatus, FileControl, ReferenceTransport};
use tempfile::tempdir;

struct NoPrompt;

impl PassphraseSource for NoPrompt {
    fn prompt_new(&mut self) -> std::io::Result<String> {
        Ok(String::new())
    }
    fn prompt_existing(&mut self) -> std::io::Result<String> {
        Ok(String::new())
    }
}

fn new_event_loop(dir: &std::path::Path, public_key: [u8; 32]) -> EventLoop {
    let slots = GlobalSlots::create(dir).unwrap();
    let transport = Box::new(ReferenceTransport::new(public_key));
    let store = Store::new(dir.join("save"), false);
    let mut event_loop = EventLoop::new(dir.to_path_buf(), slots, transport, store, Box::new(NullEncryption), Vec::new());
    event_loop.load(&mut NoPrompt).unwrap();
    event_loop
}

fn write_line(path: &std::path::Path, line: &[u8]) {
    let mut f = OpenOptions::new().write(true).open(path).unwrap();
    f.write_all(line).unwrap();
}

#[test]
fn fresh_identity_creates_the_filesystem_surface() {
    let dir = tempdir().unwrap();
    let event_loop = new_event_loop(dir.path(), [1u8; 32]);
    drop(event_loop);

    let root = dir.path();
    assert!(root.join("id").exists());
    for slot in ["name", "status", "state", "nospam", "request"] {
        assert!(root.join(slot).join("in").exists(), "missing {slot}/in");
        assert!(root.join(slot).join("err").exists(), "missing {slot}/err");
    }
    assert!(root.join("name").join("out").exists());
    assert!(root.join("request").join("out").is_dir());

    let id = fs::read_to_string(root.join("id")).unwrap();
    assert_eq!(id.trim().len(), 76, "id must be 38 bytes of hex plus newline");
}

#[test]
fn sending_a_well_formed_request_creates_a_friend_directory() {
    let dir = tempdir().unwrap();
    let mut event_loop = new_event_loop(dir.path(), [1u8; 32]);

    let address_hex = "22".repeat(32) + "00000000" + "0000";
    write_line(&dir.path().join("request/in"), format!("{address_hex} hello there\n").as_bytes());

    event_loop.step().unwrap();

    assert_eq!(event_loop.friends().len(), 1);
    let friend = event_loop.friends().iter().next().unwrap();
    assert!(dir.path().join(&friend.hex).join("online").exists());
}

#[test]
fn malformed_request_is_rejected_without_creating_a_friend() {
    let dir = tempdir().unwrap();
    let mut event_loop = new_event_loop(dir.path(), [1u8; 32]);

    write_line(&dir.path().join("request/in"), b"not-hex hello\n");
    event_loop.step().unwrap();

    assert!(event_loop.friends().is_empty());
    let err = fs::read_to_string(dir.path().join("request/err")).unwrap();
    assert_eq!(err.trim(), "Invalid friend ID");
}

#[test]
fn inbound_friend_request_gets_a_ledger_fifo() {
    let dir = tempdir().unwrap();
    let mut event_loop = new_event_loop(dir.path(), [9u8; 32]);

    {
        let transport = event_loop.transport_mut();
        let reference = transport.as_any_mut().downcast_mut::<ReferenceTransport>().unwrap();
        reference.inject_friend_request([5u8; 32], b"let's be friends".to_vec());
    }
    event_loop.step().unwrap();

    let expected = dir.path().join("request/out").join(meshpipe::hex::encode_lower(&[5u8; 32]));
    assert!(expected.exists(), "expected a ledger fifo at {}", expected.display());
}

#[test]
fn a_second_concurrent_file_offer_is_cancelled() {
    let dir = tempdir().unwrap();
    let mut event_loop = new_event_loop(dir.path(), [1u8; 32]);

    let address_hex = "22".repeat(32) + "00000000" + "0000";
    write_line(&dir.path().join("request/in"), format!("{address_hex} hi\n").as_bytes());
    event_loop.step().unwrap();
    let friend_id = event_loop.friends().iter().next().unwrap().id;

    {
        let transport = event_loop.transport_mut();
        let reference = transport.as_any_mut().downcast_mut::<ReferenceTransport>().unwrap();
        reference.inject_file_recv(friend_id, 1, 100, b"first.bin".to_vec());
    }
    event_loop.step().unwrap();
    assert_eq!(
        fs::read(dir.path().join(&event_loop.friends().get(friend_id).unwrap().hex).join("file_pending")).unwrap(),
        b"first.bin"
    );

    {
        let transport = event_loop.transport_mut();
        let reference = transport.as_any_mut().downcast_mut::<ReferenceTransport>().unwrap();
        reference.inject_file_recv(friend_id, 2, 50, b"second.bin".to_vec());
    }
    event_loop.step().unwrap();

    let transport = event_loop.transport_mut();
    let reference = transport.as_any_mut().downcast_mut::<ReferenceTransport>().unwrap();
    assert!(reference.control_log().contains(&(friend_id, 2, FileControl::Cancel)));
}

#[test]
fn friend_coming_online_clears_any_duplicate_pending_request() {
    let dir = tempdir().unwrap();
    let mut event_loop = new_event_loop(dir.path(), [1u8; 32]);

    let key = [7u8; 32];
    {
        let transport = event_loop.transport_mut();
        let reference = transport.as_any_mut().downcast_mut::<ReferenceTransport>().unwrap();
        reference.inject_friend_request(key, b"hi".to_vec());
    }
    event_loop.step().unwrap();
    let ledger_fifo = dir.path().join("request/out").join(meshpipe::hex::encode_lower(&key));
    assert!(ledger_fifo.exists());

    let address_hex = meshpipe::hex::encode_lower(&key) + "00000000" + "0000";
    write_line(&dir.path().join("request/in"), format!("{address_hex} hi again\n").as_bytes());
    event_loop.step().unwrap();
    let friend_id = event_loop.friends().iter().next().unwrap().id;

    {
        let transport = event_loop.transport_mut();
        let reference = transport.as_any_mut().downcast_mut::<ReferenceTransport>().unwrap();
        reference.inject_conn_status(friend_id, ConnStatus::Udp);
    }
    event_loop.step().unwrap();

    assert!(!ledger_fifo.exists(), "the duplicate request ledger entry should be cleared");
}
