//! The single-threaded cooperative scheduler (spec.md §4.8): drives the transport's
//! `iterate`, multiplexes every FIFO in the working directory with a timeout equal to
//! the transport's advertised iteration interval, and dispatches readable events.

use std::io;
use std::os::fd::RawFd;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use log::{info, warn};

use crate::friend::{Friend, FriendTable};
use crate::request_ledger::{decode_decision, Decision};
use crate::signals;
use crate::slots::{self, GlobalSlots, NospamOutcome, RequestOutcome};
use crate::store::{EncryptionBackend, PassphraseSource, Store};
use crate::transfer::SendState;
use crate::transport::{
    BootstrapNode, ConnStatus, FileControl, FileNum, FriendId, PublicKey, TransportBackend,
    TransportCallbacks, UserState, MAX_MESSAGE_LENGTH,
};

/// Minimum wall-clock gap between bootstrap attempts (spec.md §5).
const BOOTSTRAP_BACKOFF: Duration = Duration::from_secs(5);
/// How long the daemon considers itself continuously connected before re-checking
/// bootstrap status (original's `CONNECTDELAY`, spec.md §4.8 supplement).
const CONNECT_DELAY: Duration = Duration::from_secs(10 * 60);

pub struct EventLoop {
    root: PathBuf,
    slots: GlobalSlots,
    friends: FriendTable,
    transport: Box<dyn TransportBackend>,
    store: Store,
    encryption: Box<dyn EncryptionBackend>,
    bootstrap_nodes: Vec<BootstrapNode>,
    connected: bool,
    last_bootstrap: Option<Instant>,
    last_connect: Option<Instant>,
    identity_dirty: bool,
}

impl EventLoop {
    pub fn new(
        root: PathBuf,
        slots: GlobalSlots,
        transport: Box<dyn TransportBackend>,
        store: Store,
        encryption: Box<dyn EncryptionBackend>,
        bootstrap_nodes: Vec<BootstrapNode>,
    ) -> EventLoop {
        EventLoop {
            root,
            slots,
            friends: FriendTable::new(),
            transport,
            store,
            encryption,
            bootstrap_nodes,
            connected: false,
            last_bootstrap: None,
            last_connect: None,
            identity_dirty: false,
        }
    }

    pub fn friends(&self) -> &FriendTable {
        &self.friends
    }

    /// Direct access to the transport, for embedders that need to reach
    /// implementation-specific methods (e.g. `as_any_mut().downcast_mut`) that aren't
    /// part of the [`TransportBackend`] seam.
    pub fn transport_mut(&mut self) -> &mut dyn TransportBackend {
        self.transport.as_mut()
    }

    /// Loads identity/friend state from the save file, prompting for a passphrase if
    /// required, and populates the friend table and `id` file.
    pub fn load(&mut self, passphrase_source: &mut dyn PassphraseSource) -> crate::error::DaemonResult<()> {
        let result = self.store.load(passphrase_source, self.encryption.as_ref())?;
        if !result.plaintext.is_empty() {
            let _ = self.transport.load(&result.plaintext);
        }
        for id in self.transport.friend_list() {
            let key = self.transport.friend_public_key(id);
            match Friend::create(&self.root, id, key) {
                Ok(friend) => self.friends.insert(friend),
                Err(e) => warn!("failed to recreate friend directory for {id}: {e}"),
            }
        }
        self.slots.write_id(self.transport.as_ref())?;
        if result.needs_resave {
            self.persist();
        }
        Ok(())
    }

    fn persist(&self) {
        let blob = self.transport.save();
        if let Err(e) = self.store.save(&blob, self.encryption.as_ref()) {
            warn!("failed to persist save file: {e}");
        }
    }

    /// Runs until a signal clears the `running` flag, then tears down orderly.
    pub fn run(&mut self) -> io::Result<()> {
        while signals::is_running() {
            self.step()?;
        }
        self.shutdown();
        Ok(())
    }

    fn maybe_bootstrap(&mut self) {
        if self.transport.is_connected() {
            if !self.connected {
                info!("connected to the network");
            }
            self.connected = true;
            self.last_connect = Some(Instant::now());
            return;
        }
        if self.connected {
            let stayed_connected = self
                .last_connect
                .map(|t| t.elapsed() < CONNECT_DELAY)
                .unwrap_or(false);
            if stayed_connected {
                return;
            }
        }
        self.connected = false;
        let should_retry = self
            .last_bootstrap
            .map(|t| t.elapsed() >= BOOTSTRAP_BACKOFF)
            .unwrap_or(true);
        if should_retry {
            self.transport.bootstrap(&self.bootstrap_nodes);
            self.last_bootstrap = Some(Instant::now());
        }
    }

    /// One iteration of the loop (spec.md §4.8, steps 1-7). `run` simply calls this
    /// until a signal clears `running`; exposed directly for callers that want to
    /// drive the loop from their own scheduler instead of blocking in `run`.
    pub fn step(&mut self) -> io::Result<()> {
        self.maybe_bootstrap();

        let chunk_size = self.transport.file_chunk_size();
        let EventLoop {
            transport,
            friends,
            slots,
            identity_dirty,
            ..
        } = self;
        let mut callbacks = Callbacks {
            friends,
            request: &mut slots.request,
            identity_dirty,
            pending_cancels: Vec::new(),
            chunk_size,
        };
        transport.iterate(&mut callbacks);
        for (friend, file) in std::mem::take(&mut callbacks.pending_cancels) {
            let _ = transport.file_control(friend, file, FileControl::Cancel);
        }
        if self.identity_dirty {
            self.identity_dirty = false;
            self.persist();
        }

        let timeout_ms = self.transport.iteration_interval().as_millis().min(i32::MAX as u128) as i32;
        let mut targets = self.collect_poll_targets();
        poll_wait(&mut targets, timeout_ms)?;

        self.sweep_friends();
        self.attach_pending_file_outs();
        self.dispatch_readable(&targets)?;

        Ok(())
    }

    fn sweep_friends(&mut self) {
        let now = Instant::now();
        let interval = self.transport.iteration_interval();
        for friend in self.friends.iter_mut() {
            if self.transport.friend_connection_status(friend.id) == ConnStatus::None {
                friend.tx.cancel();
                if !friend.rx.is_none() {
                    friend.rx.cancel();
                    friend.close_file_out();
                    let _ = friend.set_file_pending(b"");
                }
            }
            if let SendState::InProgress { pending, .. } = &mut friend.tx {
                if let Some(chunk) = pending.take() {
                    match self.transport.file_send_chunk(friend.id, friend.tx.file_num().unwrap_or(0), &chunk) {
                        Ok(()) => {}
                        Err(()) => friend.tx.set_pending(chunk, now),
                    }
                }
            }
            friend.tx.clear_stale_cooldown(now, interval);
        }
    }

    fn attach_pending_file_outs(&mut self) {
        for friend in self.friends.iter_mut() {
            if friend.rx.is_pending() {
                match friend.try_attach_file_out() {
                    Ok(true) => {
                        if let Some(file) = friend.rx.file_num() {
                            let _ = self.transport.file_control(friend.id, file, FileControl::Resume);
                        }
                        friend.rx.accept();
                        info!("{}: accepted inbound transfer", friend.hex);
                    }
                    Ok(false) => {}
                    Err(e) => warn!("{}: failed to open file_out: {e}", friend.hex),
                }
            }
        }
    }

    fn collect_poll_targets(&self) -> Vec<PollTarget> {
        let mut targets = Vec::new();
        push_fd(&mut targets, PollSource::Name, self.slots.name.in_fifo.raw_fd());
        push_fd(&mut targets, PollSource::Status, self.slots.status.in_fifo.raw_fd());
        push_fd(&mut targets, PollSource::State, self.slots.state.in_fifo.raw_fd());
        push_fd(&mut targets, PollSource::Nospam, self.slots.nospam.in_fifo.raw_fd());
        push_fd(&mut targets, PollSource::Request, self.slots.request.in_fifo.raw_fd());
        for request in self.slots.request.ledger.iter() {
            push_fd(
                &mut targets,
                PollSource::RequestDecision(request.hex.clone()),
                request.fifo.raw_fd(),
            );
        }
        for friend in self.friends.iter() {
            push_fd(&mut targets, PollSource::FriendText(friend.id), friend.text_in.raw_fd());
            push_fd(&mut targets, PollSource::FriendRemove(friend.id), friend.remove.raw_fd());
            if friend.tx.accepts_input() {
                push_fd(&mut targets, PollSource::FriendFile(friend.id), friend.file_in.raw_fd());
            }
        }
        targets
    }

    fn dispatch_readable(&mut self, targets: &[PollTarget]) -> io::Result<()> {
        let mut buf = [0u8; 4096];
        for target in targets {
            if !target.readable {
                continue;
            }
            match &target.source {
                PollSource::Name => self.dispatch_name(&mut buf)?,
                PollSource::Status => self.dispatch_status(&mut buf)?,
                PollSource::State => self.dispatch_state(&mut buf)?,
                PollSource::Nospam => self.dispatch_nospam(&mut buf)?,
                PollSource::Request => self.dispatch_request(&mut buf)?,
                PollSource::RequestDecision(hex) => self.dispatch_request_decision(hex, &mut buf)?,
                PollSource::FriendText(id) => self.dispatch_friend_text(*id, &mut buf)?,
                PollSource::FriendFile(id) => self.dispatch_friend_file(*id, &mut buf)?,
                PollSource::FriendRemove(id) => self.dispatch_friend_remove(*id, &mut buf)?,
            }
        }
        Ok(())
    }

    fn dispatch_name(&mut self, buf: &mut [u8]) -> io::Result<()> {
        if let crate::fifo::FifoRead::Data(n) = self.slots.name.in_fifo.read(buf)? {
            slots::handle_name(&self.slots.name, self.transport.as_mut(), &buf[..n])?;
            self.persist();
        }
        Ok(())
    }

    fn dispatch_status(&mut self, buf: &mut [u8]) -> io::Result<()> {
        if let crate::fifo::FifoRead::Data(n) = self.slots.status.in_fifo.read(buf)? {
            slots::handle_status(&self.slots.status, self.transport.as_mut(), &buf[..n])?;
            self.persist();
        }
        Ok(())
    }

    fn dispatch_state(&mut self, buf: &mut [u8]) -> io::Result<()> {
        if let crate::fifo::FifoRead::Data(n) = self.slots.state.in_fifo.read(buf)? {
            slots::handle_state(&self.slots.state, self.transport.as_mut(), &buf[..n])?;
            self.persist();
        }
        Ok(())
    }

    fn dispatch_nospam(&mut self, buf: &mut [u8]) -> io::Result<()> {
        if let crate::fifo::FifoRead::Data(n) = self.slots.nospam.in_fifo.read(buf)? {
            let outcome = slots::handle_nospam(&self.slots.nospam, self.transport.as_mut(), &buf[..n])?;
            if let NospamOutcome::Applied = outcome {
                self.slots.write_id(self.transport.as_ref())?;
                self.persist();
            }
        }
        Ok(())
    }

    fn dispatch_request(&mut self, buf: &mut [u8]) -> io::Result<()> {
        if let crate::fifo::FifoRead::Data(n) = self.slots.request.in_fifo.read(buf)? {
            let outcome = slots::handle_request(&self.slots.request, self.transport.as_mut(), &buf[..n])?;
            if let RequestOutcome::Accepted(id) = outcome {
                let key = self.transport.friend_public_key(id);
                match Friend::create(&self.root, id, key) {
                    Ok(friend) => {
                        self.friends.insert(friend);
                        self.persist();
                    }
                    Err(e) => warn!("failed to create friend directory for {id}: {e}"),
                }
            }
        }
        Ok(())
    }

    /// `request/out/<hex>` became readable: a single decision byte accepts or rejects
    /// the pending request (spec.md §4.6).
    fn dispatch_request_decision(&mut self, hex: &str, buf: &mut [u8]) -> io::Result<()> {
        let Some(request) = self.slots.request.ledger.iter_mut().find(|r| r.hex == hex) else {
            return Ok(());
        };
        let crate::fifo::FifoRead::Data(n) = request.fifo.read(buf)? else {
            return Ok(());
        };
        if n == 0 {
            return Ok(());
        }
        match decode_decision(buf[0]) {
            Decision::Ignored => Ok(()),
            Decision::Reject => {
                if let Some(request) = self.slots.request.ledger.remove(hex) {
                    if let Err(e) = request.destroy() {
                        warn!("failed to remove request fifo for {hex}: {e}");
                    }
                }
                Ok(())
            }
            Decision::Accept => {
                let Some(request) = self.slots.request.ledger.remove(hex) else {
                    return Ok(());
                };
                let public_key = request.public_key;
                if let Err(e) = request.destroy() {
                    warn!("failed to remove request fifo for {hex}: {e}");
                }
                match self.transport.friend_add_norequest(&public_key) {
                    Ok(id) => {
                        let key = self.transport.friend_public_key(id);
                        match Friend::create(&self.root, id, key) {
                            Ok(friend) => {
                                self.friends.insert(friend);
                                self.persist();
                            }
                            Err(e) => warn!("failed to create friend directory for {id}: {e}"),
                        }
                    }
                    Err(e) => warn!("failed to accept request from {hex}: {e}"),
                }
                Ok(())
            }
        }
    }

    fn dispatch_friend_text(&mut self, id: FriendId, buf: &mut [u8]) -> io::Result<()> {
        let Some(friend) = self.friends.get_mut(id) else { return Ok(()) };
        // Bounded to MAX_MESSAGE_LENGTH, mirroring the original reading into a stack
        // buffer sized exactly TOX_MAX_MESSAGE_LENGTH: anything past that is silently
        // left in the pipe for the next read rather than forwarded in one oversized
        // message.
        let limit = MAX_MESSAGE_LENGTH.min(buf.len());
        if let crate::fifo::FifoRead::Data(n) = friend.text_in.read(&mut buf[..limit])? {
            let text = slots::strip_trailing_newline(&buf[..n]);
            if !text.is_empty() {
                let _ = self.transport.friend_send_message(id, text);
            }
        }
        Ok(())
    }

    fn dispatch_friend_file(&mut self, id: FriendId, buf: &mut [u8]) -> io::Result<()> {
        let Some(friend) = self.friends.get_mut(id) else { return Ok(()) };
        match friend.tx {
            SendState::None => {
                if let crate::fifo::FifoRead::Data(n) = friend.file_in.read(buf)? {
                    if n == 0 {
                        return Ok(());
                    }
                    match self.transport.file_send(id) {
                        Ok(file) => {
                            friend.tx.initiate(file);
                        }
                        Err(()) => {
                            friend.file_in.force_reset()?;
                        }
                    }
                }
            }
            SendState::InProgress { chunk_size: size, .. } => {
                self.drive_send_chunk_loop(id, size, buf)?;
            }
            SendState::Initiated { .. } | SendState::Paused { .. } => {}
        }
        Ok(())
    }

    /// Runs the chunk loop (spec.md §4.7) until the transport's iteration interval has
    /// elapsed, reading from `file_in` and enqueueing chunks.
    fn drive_send_chunk_loop(&mut self, id: FriendId, chunk_size: usize, buf: &mut [u8]) -> io::Result<()> {
        let deadline = Instant::now() + self.transport.iteration_interval();
        let chunk_size = chunk_size.min(buf.len());
        loop {
            if Instant::now() >= deadline {
                return Ok(());
            }
            let Some(friend) = self.friends.get_mut(id) else { return Ok(()) };
            let file = match friend.tx.file_num() {
                Some(f) => f,
                None => return Ok(()),
            };
            match friend.file_in.read(&mut buf[..chunk_size])? {
                crate::fifo::FifoRead::NoData => return Ok(()),
                crate::fifo::FifoRead::Data(0) => {
                    let _ = self.transport.file_control(id, file, FileControl::Cancel);
                    if let Some(friend) = self.friends.get_mut(id) {
                        friend.tx.cancel();
                    }
                    return Ok(());
                }
                crate::fifo::FifoRead::Data(n) => match self.transport.file_send_chunk(id, file, &buf[..n]) {
                    Ok(()) => {}
                    Err(()) => {
                        if let Some(friend) = self.friends.get_mut(id) {
                            friend.tx.set_pending(buf[..n].to_vec(), Instant::now());
                        }
                        return Ok(());
                    }
                },
            }
        }
    }

    fn dispatch_friend_remove(&mut self, id: FriendId, buf: &mut [u8]) -> io::Result<()> {
        let should_remove = {
            let Some(friend) = self.friends.get_mut(id) else { return Ok(()) };
            matches!(friend.remove.read(buf)?, crate::fifo::FifoRead::Data(n) if n > 0 && buf[0] == b'1')
        };
        if should_remove {
            self.transport.friend_delete(id);
            if let Some(friend) = self.friends.remove(id) {
                if let Err(e) = friend.destroy() {
                    warn!("failed to remove friend directory: {e}");
                }
            }
            self.persist();
        }
        Ok(())
    }

    fn shutdown(&mut self) {
        info!("shutting down");
        self.persist();
        let ids: Vec<FriendId> = self.friends.iter().map(|f| f.id).collect();
        for id in ids {
            if let Some(friend) = self.friends.remove(id) {
                let _ = friend.destroy();
            }
        }
        let _ = self.slots.remove_id();
    }
}

/// A mutable view of the collections [`TransportCallbacks`] needs, borrowed
/// disjointly from the fields of [`EventLoop`] so the transport can be iterated while
/// its own callbacks mutate everything else.
struct Callbacks<'a> {
    friends: &'a mut FriendTable,
    request: &'a mut crate::slots::RequestSlot,
    identity_dirty: &'a mut bool,
    /// `(friend, file)` pairs the event loop must send `FileControl::Cancel` for once
    /// `iterate` returns, since callbacks have no access to `transport` themselves.
    pending_cancels: Vec<(FriendId, FileNum)>,
    /// The transport's advertised outbound chunk size, read from `transport` just
    /// before `iterate` is called (callbacks otherwise have no access to it either).
    chunk_size: usize,
}

impl<'a> TransportCallbacks for Callbacks<'a> {
    fn conn_status(&mut self, friend: FriendId, status: ConnStatus) {
        if let Some(f) = self.friends.get_mut(friend) {
            let message = match status {
                ConnStatus::None => "offline",
                ConnStatus::Tcp => "online using TCP",
                ConnStatus::Udp => "online using UDP",
            };
            info!("{}: {message}", f.hex);
            let _ = f.set_online(status);
            let key = f.public_key;
            if !matches!(status, ConnStatus::None) {
                let _ = self.request.ledger.clear_for_key(&key);
            }
        }
    }

    fn friend_message(&mut self, friend: FriendId, text: &[u8]) {
        if let Some(f) = self.friends.get_mut(friend) {
            let stamp = chrono::Local::now().format("%Y-%m-%d %H:%M");
            let mut line = Vec::with_capacity(text.len() + 32);
            line.extend_from_slice(stamp.to_string().as_bytes());
            line.push(b' ');
            line.extend_from_slice(text);
            line.push(b'\n');
            let _ = f.append_text_out(&line);
        }
    }

    fn friend_request(&mut self, key: PublicKey, message: &[u8]) {
        let text = String::from_utf8_lossy(message).into_owned();
        let _ = self.request.ledger.add(key, Some(text));
    }

    fn name_change(&mut self, friend: FriendId, name: &[u8]) {
        if let Some(f) = self.friends.get_mut(friend) {
            let _ = f.set_name(name);
        }
        *self.identity_dirty = true;
    }

    fn status_message(&mut self, friend: FriendId, status: &[u8]) {
        if let Some(f) = self.friends.get_mut(friend) {
            let _ = f.set_status_message(status);
        }
        *self.identity_dirty = true;
    }

    fn user_state(&mut self, friend: FriendId, state: UserState) {
        if let Some(f) = self.friends.get_mut(friend) {
            let _ = f.set_state(state);
        }
        *self.identity_dirty = true;
    }

    fn file_control(&mut self, friend: FriendId, file: FileNum, control: FileControl) {
        let Some(f) = self.friends.get_mut(friend) else { return };
        if file == 0 {
            match control {
                FileControl::Resume => {
                    f.tx.resume(self.chunk_size);
                }
                FileControl::Pause => f.tx.pause(),
                FileControl::Cancel => f.tx.cancel(),
            }
        } else if let FileControl::Cancel = control {
            f.rx.cancel();
            f.close_file_out();
            let _ = f.set_file_pending(b"");
        }
    }

    fn file_chunk_request(&mut self, _friend: FriendId, _file: FileNum, _position: u64, _len: usize) {}

    fn file_recv(&mut self, friend: FriendId, file: FileNum, size: u64, name: &[u8]) {
        let Some(f) = self.friends.get_mut(friend) else { return };
        if !f.rx.is_none() {
            // A receive is already in progress; reject the second offer outright
            // rather than silently dropping it.
            self.pending_cancels.push((friend, file));
            return;
        }
        f.rx.offer(file, size, name.to_vec());
        let _ = f.set_file_pending(name);
    }

    fn file_chunk(&mut self, friend: FriendId, _file: FileNum, _position: u64, data: &[u8]) {
        let Some(f) = self.friends.get_mut(friend) else { return };
        if data.is_empty() {
            f.rx.cancel();
            f.close_file_out();
            let _ = f.set_file_pending(b"");
            return;
        }
        if let Err(e) = f.write_file_out(data) {
            if e.kind() == io::ErrorKind::BrokenPipe {
                f.rx.cancel();
                f.close_file_out();
                let _ = f.set_file_pending(b"");
            }
        }
    }
}

enum PollSource {
    Name,
    Status,
    State,
    Nospam,
    Request,
    RequestDecision(String),
    FriendText(FriendId),
    FriendFile(FriendId),
    FriendRemove(FriendId),
}

struct PollTarget {
    source: PollSource,
    fd: RawFd,
    readable: bool,
}

fn push_fd(targets: &mut Vec<PollTarget>, source: PollSource, fd: Option<RawFd>) {
    if let Some(fd) = fd {
        targets.push(PollTarget { source, fd, readable: false });
    }
}

fn poll_wait(targets: &mut [PollTarget], timeout_ms: i32) -> io::Result<()> {
    if targets.is_empty() {
        std::thread::sleep(Duration::from_millis(timeout_ms.max(0) as u64));
        return Ok(());
    }
    let mut pollfds: Vec<libc::pollfd> = targets
        .iter()
        .map(|t| libc::pollfd {
            fd: t.fd,
            events: libc::POLLIN,
            revents: 0,
        })
        .collect();
    loop {
        let rc = unsafe { libc::poll(pollfds.as_mut_ptr(), pollfds.len() as libc::nfds_t, timeout_ms) };
        if rc < 0 {
            let err = io::Error::last_os_error();
            if err.raw_os_error() == Some(libc::EINTR) {
                continue;
            }
            return Err(err);
        }
        break;
    }
    for (target, pfd) in targets.iter_mut().zip(pollfds.iter()) {
        target.readable = pfd.revents & libc::POLLIN != 0;
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::store::reference::NullEncryption;
    use crate::transport::ReferenceTransport;
    use std::io::Write;
    use tempfile::tempdir;

    fn write_decision(dir: &std::path::Path, hex: &str, byte: u8) {
        let path = dir.join("request/out").join(hex);
        std::fs::OpenOptions::new().write(true).open(path).unwrap().write_all(&[byte]).unwrap();
    }

    fn new_loop(dir: &std::path::Path) -> EventLoop {
        let slots = GlobalSlots::create(dir).unwrap();
        let transport = Box::new(ReferenceTransport::new([7u8; 32]));
        let store = Store::new(dir.join("save"), false);
        EventLoop::new(dir.to_path_buf(), slots, transport, store, Box::new(NullEncryption), Vec::new())
    }

    #[test]
    fn collect_poll_targets_includes_all_global_slots() {
        let dir = tempdir().unwrap();
        let event_loop = new_loop(dir.path());
        let targets = event_loop.collect_poll_targets();
        assert_eq!(targets.len(), 5);
    }

    #[test]
    fn file_control_resume_on_transfer_zero_drives_send_state() {
        let dir = tempdir().unwrap();
        let mut event_loop = new_loop(dir.path());
        let friend = Friend::create(&dir.path().to_path_buf(), 1, [1u8; 32]).unwrap();
        event_loop.friends.insert(friend);
        event_loop.friends.get_mut(1).unwrap().tx.initiate(0);

        let mut request = crate::slots::RequestSlot::create(dir.path()).unwrap();
        let mut dirty = false;
        let mut cb = Callbacks {
            friends: &mut event_loop.friends,
            request: &mut request,
            identity_dirty: &mut dirty,
            pending_cancels: Vec::new(),
            chunk_size: 2048,
        };
        cb.file_control(1, 0, FileControl::Resume);
        assert!(event_loop.friends.get(1).unwrap().tx.accepts_input());
        assert_eq!(event_loop.friends.get(1).unwrap().tx.chunk_size(), Some(2048));
    }

    #[test]
    fn second_concurrent_file_offer_is_queued_for_cancel() {
        let dir = tempdir().unwrap();
        let mut event_loop = new_loop(dir.path());
        let friend = Friend::create(&dir.path().to_path_buf(), 1, [1u8; 32]).unwrap();
        event_loop.friends.insert(friend);

        let mut request = crate::slots::RequestSlot::create(dir.path()).unwrap();
        let mut dirty = false;
        let mut cb = Callbacks {
            friends: &mut event_loop.friends,
            request: &mut request,
            identity_dirty: &mut dirty,
            pending_cancels: Vec::new(),
            chunk_size: 1024,
        };
        cb.file_recv(1, 5, 100, b"first.bin");
        cb.file_recv(1, 9, 50, b"second.bin");
        assert_eq!(cb.pending_cancels, vec![(1, 9)]);
        assert_eq!(event_loop.friends.get(1).unwrap().rx.file_num(), Some(5));
    }

    #[test]
    fn dispatch_request_decision_accept_creates_friend_and_clears_ledger() {
        let dir = tempdir().unwrap();
        let mut event_loop = new_loop(dir.path());
        let key = [9u8; 32];
        event_loop.slots.request.ledger.add(key, Some("hi".to_string())).unwrap();
        let hex = crate::hex::encode_lower(&key);
        write_decision(dir.path(), &hex, b'1');

        let mut buf = [0u8; 4096];
        event_loop.dispatch_request_decision(&hex, &mut buf).unwrap();

        assert!(event_loop.slots.request.ledger.find(&key).is_none());
        assert_eq!(event_loop.friends.len(), 1);
    }

    #[test]
    fn dispatch_request_decision_reject_clears_ledger_without_a_friend() {
        let dir = tempdir().unwrap();
        let mut event_loop = new_loop(dir.path());
        let key = [9u8; 32];
        event_loop.slots.request.ledger.add(key, Some("hi".to_string())).unwrap();
        let hex = crate::hex::encode_lower(&key);
        write_decision(dir.path(), &hex, b'0');

        let mut buf = [0u8; 4096];
        event_loop.dispatch_request_decision(&hex, &mut buf).unwrap();

        assert!(event_loop.slots.request.ledger.find(&key).is_none());
        assert!(event_loop.friends.is_empty());
    }

    #[test]
    fn sweep_friends_cancels_transfers_once_offline() {
        let dir = tempdir().unwrap();
        let mut event_loop = new_loop(dir.path());
        let friend = Friend::create(&dir.path().to_path_buf(), 1, [1u8; 32]).unwrap();
        event_loop.friends.insert(friend);
        event_loop.friends.get_mut(1).unwrap().tx.initiate(0);
        event_loop.friends.get_mut(1).unwrap().tx.resume(1024);
        event_loop.friends.get_mut(1).unwrap().rx.offer(2, 10, b"f.bin".to_vec());

        event_loop.sweep_friends();

        let friend = event_loop.friends.get(1).unwrap();
        assert!(friend.tx.is_none());
        assert!(friend.rx.is_none());
    }
}
