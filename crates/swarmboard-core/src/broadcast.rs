//! Outbound operation queue and fan-out.
//!
//! Best-effort fire-and-forget: no retry, no acknowledgement. Durability
//! comes from checkpoints, and convergence from the version-gated
//! snapshot fallback, not from the live operation stream.

use crate::objects::PeerId;
use crate::protocol::{self, WireMessage};
use std::collections::VecDeque;

/// Where an encoded frame should be written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// Every open connection.
    All,
    /// A single peer (handshake catch-up replies).
    Peer(PeerId),
}

/// An encoded message addressed to its destination. The transport layer
/// writes the payload to the matching sockets; write failures on a
/// single connection are ignored, its close event handles removal.
#[derive(Debug, Clone)]
pub struct Frame {
    pub target: Target,
    pub payload: Vec<u8>,
}

/// FIFO outbound queue. Queueing triggers a flush; the flush serializes
/// each message once and turns it into an addressed frame.
#[derive(Debug, Default)]
pub struct Broadcaster {
    queue: VecDeque<(Target, WireMessage)>,
    frames: Vec<Frame>,
    flushing: bool,
}

impl Broadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a message for every open connection.
    pub fn queue(&mut self, msg: WireMessage) {
        self.queue_to(Target::All, msg);
    }

    /// Queue a message for a single peer.
    pub fn queue_to(&mut self, target: Target, msg: WireMessage) {
        self.queue.push_back((target, msg));
        self.flush();
    }

    /// Drain the queue into encoded frames. Guarded against re-entrant
    /// drains by the flushing flag.
    pub fn flush(&mut self) {
        if self.flushing {
            return;
        }
        self.flushing = true;
        while let Some((target, msg)) = self.queue.pop_front() {
            match protocol::encode(&msg) {
                Ok(payload) => self.frames.push(Frame { target, payload }),
                Err(e) => log::warn!("failed to encode outbound message: {}", e),
            }
        }
        self.flushing = false;
    }

    /// Take the frames produced so far, in queue order.
    pub fn take_frames(&mut self) -> Vec<Frame> {
        std::mem::take(&mut self.frames)
    }

    pub fn is_idle(&self) -> bool {
        self.queue.is_empty() && self.frames.is_empty()
    }
}
