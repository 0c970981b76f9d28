//! Per-friend file-transfer state machines. Tagged enums carrying their own payload,
//! replacing the original's numeric state plus `OUTGOING|INCOMING|TRANSMITTING|
//! INCOMPLETE` bitmask (spec.md §9, "Tagged states over flags" redesign flag).

use std::time::Instant;

use crate::transport::FileNum;

/// Outbound transfer state, driven by readable `file_in` and transport file-control
/// events (spec.md §4.7).
pub enum SendState {
    /// No transfer in progress.
    None,
    /// `file_send` was called; waiting for the transport's `RESUME` on transfer 0.
    Initiated { file: FileNum },
    /// Actively streaming. `pending` holds a chunk that failed to enqueue and must be
    /// retried before reading more from `file_in`; `cooldown` records when that
    /// happened so the event loop can clear it after three iteration intervals.
    InProgress {
        file: FileNum,
        chunk_size: usize,
        pending: Option<Vec<u8>>,
        cooldown: Option<Instant>,
    },
    /// Transport asked us to pause; the chunk buffer and position are retained.
    Paused { file: FileNum, chunk_size: usize },
}

impl SendState {
    pub fn is_none(&self) -> bool {
        matches!(self, SendState::None)
    }

    /// Whether `file_in` should be included in the event loop's read-set: idle, or
    /// in progress with no active backpressure cooldown.
    pub fn accepts_input(&self) -> bool {
        match self {
            SendState::None => true,
            SendState::InProgress { cooldown, .. } => cooldown.is_none(),
            SendState::Initiated { .. } | SendState::Paused { .. } => false,
        }
    }

    pub fn file_num(&self) -> Option<FileNum> {
        match self {
            SendState::None => None,
            SendState::Initiated { file }
            | SendState::InProgress { file, .. }
            | SendState::Paused { file, .. } => Some(*file),
        }
    }

    /// `file_in` became readable while idle: the caller has already invoked the
    /// transport's `file_send` and is recording the assigned file number.
    pub fn initiate(&mut self, file: FileNum) {
        *self = SendState::Initiated { file };
    }

    /// Transport delivered `RESUME` for transfer 0.
    pub fn resume(&mut self, chunk_size: usize) {
        match self {
            SendState::Initiated { file } => {
                *self = SendState::InProgress {
                    file: *file,
                    chunk_size,
                    pending: None,
                    cooldown: None,
                };
            }
            SendState::Paused { file, chunk_size } => {
                *self = SendState::InProgress {
                    file: *file,
                    chunk_size: *chunk_size,
                    pending: None,
                    cooldown: None,
                };
            }
            SendState::None | SendState::InProgress { .. } => {}
        }
    }

    pub fn pause(&mut self) {
        if let SendState::InProgress { file, chunk_size, .. } = self {
            *self = SendState::Paused {
                file: *file,
                chunk_size: *chunk_size,
            };
        }
    }

    /// Transport (or EOF on `file_in`) cancels the transfer unconditionally.
    pub fn cancel(&mut self) {
        *self = SendState::None;
    }

    /// A chunk failed to enqueue; remember it and start the cooldown clock.
    pub fn set_pending(&mut self, data: Vec<u8>, now: Instant) {
        if let SendState::InProgress { pending, cooldown, .. } = self {
            *pending = Some(data);
            *cooldown = Some(now);
        }
    }

    pub fn take_pending(&mut self) -> Option<Vec<u8>> {
        match self {
            SendState::InProgress { pending, .. } => pending.take(),
            _ => None,
        }
    }

    /// Clears a cooldown whose age exceeds `3 * iteration_interval`.
    pub fn clear_stale_cooldown(&mut self, now: Instant, iteration_interval: std::time::Duration) {
        if let SendState::InProgress { cooldown, .. } = self {
            if let Some(since) = cooldown {
                if now.saturating_duration_since(*since) > iteration_interval * 3 {
                    *cooldown = None;
                }
            }
        }
    }

    pub fn chunk_size(&self) -> Option<usize> {
        match self {
            SendState::InProgress { chunk_size, .. } | SendState::Paused { chunk_size, .. } => {
                Some(*chunk_size)
            }
            SendState::None | SendState::Initiated { .. } => None,
        }
    }
}

impl Default for SendState {
    fn default() -> SendState {
        SendState::None
    }
}

/// Inbound transfer state (spec.md §4.7).
pub enum RxState {
    None,
    /// Transport offered a file; proposed name has been written to `file_pending`.
    Pending { file: FileNum, size: u64, name: Vec<u8> },
    /// An external reader attached to `file_out`; transport told to `RESUME`.
    InProgress { file: FileNum, size: u64, name: Vec<u8> },
}

impl RxState {
    pub fn is_none(&self) -> bool {
        matches!(self, RxState::None)
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, RxState::Pending { .. })
    }

    pub fn offer(&mut self, file: FileNum, size: u64, name: Vec<u8>) {
        *self = RxState::Pending { file, size, name };
    }

    /// `file_out` was opened by an external reader: resume the transfer.
    pub fn accept(&mut self) {
        if let RxState::Pending { file, size, name } = self {
            *self = RxState::InProgress {
                file: *file,
                size: *size,
                name: std::mem::take(name),
            };
        }
    }

    pub fn cancel(&mut self) {
        *self = RxState::None;
    }

    pub fn file_num(&self) -> Option<FileNum> {
        match self {
            RxState::None => None,
            RxState::Pending { file, .. } | RxState::InProgress { file, .. } => Some(*file),
        }
    }

    pub fn proposed_name(&self) -> &[u8] {
        match self {
            RxState::None => b"",
            RxState::Pending { name, .. } | RxState::InProgress { name, .. } => name,
        }
    }
}

impl Default for RxState {
    fn default() -> RxState {
        RxState::None
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn send_state_initiate_then_resume_reaches_in_progress() {
        let mut state = SendState::default();
        assert!(state.accepts_input());
        state.initiate(7);
        assert!(!state.accepts_input());
        state.resume(4096);
        assert!(state.accepts_input());
        assert_eq!(state.chunk_size(), Some(4096));
    }

    #[test]
    fn send_state_pause_then_resume_round_trips() {
        let mut state = SendState::default();
        state.initiate(1);
        state.resume(1024);
        state.pause();
        assert!(!state.accepts_input());
        state.resume(1024);
        assert!(state.accepts_input());
    }

    #[test]
    fn send_state_cancel_from_any_state_returns_to_none() {
        let mut state = SendState::default();
        state.initiate(1);
        state.resume(1024);
        state.cancel();
        assert!(state.is_none());
    }

    #[test]
    fn send_state_cooldown_blocks_input_until_stale() {
        let mut state = SendState::default();
        state.initiate(1);
        state.resume(1024);
        let now = Instant::now();
        state.set_pending(vec![1, 2, 3], now);
        assert!(!state.accepts_input());
        state.clear_stale_cooldown(now, std::time::Duration::from_millis(10));
        assert!(!state.accepts_input(), "cooldown should not clear before it is stale");
    }

    #[test]
    fn rx_state_offer_then_accept_reaches_in_progress() {
        let mut state = RxState::default();
        state.offer(3, 1024, b"file.bin".to_vec());
        assert!(state.is_pending());
        assert_eq!(state.proposed_name(), b"file.bin");
        state.accept();
        assert!(matches!(state, RxState::InProgress { .. }));
    }

    #[test]
    fn rx_state_cancel_returns_to_none() {
        let mut state = RxState::default();
        state.offer(3, 1024, b"file.bin".to_vec());
        state.accept();
        state.cancel();
        assert!(state.is_none());
    }
}
