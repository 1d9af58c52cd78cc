//! Peer connection bookkeeping.
//!
//! The session tracks who is connected and where each link is in the
//! join/catch-up handshake. It never mutates the document; inbound
//! operations are routed to the revision resolver by the engine.

use crate::objects::PeerId;
use std::collections::HashMap;

/// Handshake state of one peer link.
///
/// There is no heartbeat: a stalled handshake stays in `HelloSent` until
/// the transport surfaces a close or error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerState {
    Connecting,
    HelloSent,
    Synced,
    Closed,
}

/// One peer link.
#[derive(Debug, Clone)]
pub struct Peer {
    pub id: PeerId,
    pub state: PeerState,
}

/// The set of live peer links.
#[derive(Debug, Default)]
pub struct Session {
    peers: HashMap<PeerId, Peer>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a freshly connected peer.
    pub fn connect(&mut self, id: PeerId) -> &mut Peer {
        self.peers.entry(id).or_insert(Peer {
            id,
            state: PeerState::Connecting,
        })
    }

    pub fn mark_hello_sent(&mut self, id: &PeerId) {
        if let Some(peer) = self.peers.get_mut(id) {
            peer.state = PeerState::HelloSent;
        }
    }

    pub fn mark_synced(&mut self, id: &PeerId) {
        if let Some(peer) = self.peers.get_mut(id) {
            peer.state = PeerState::Synced;
        }
    }

    /// Drop a peer on transport close or error. Contributions already
    /// merged stay merged; nothing is rolled back.
    pub fn disconnect(&mut self, id: &PeerId) -> bool {
        self.peers.remove(id).is_some()
    }

    pub fn state(&self, id: &PeerId) -> Option<PeerState> {
        self.peers.get(id).map(|p| p.state)
    }

    pub fn contains(&self, id: &PeerId) -> bool {
        self.peers.contains_key(id)
    }

    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    pub fn peer_ids(&self) -> impl Iterator<Item = &PeerId> {
        self.peers.keys()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_handshake_state_transitions() {
        let mut session = Session::new();
        let id = Uuid::new_v4();

        session.connect(id);
        assert_eq!(session.state(&id), Some(PeerState::Connecting));

        session.mark_hello_sent(&id);
        assert_eq!(session.state(&id), Some(PeerState::HelloSent));

        session.mark_synced(&id);
        assert_eq!(session.state(&id), Some(PeerState::Synced));

        assert!(session.disconnect(&id));
        assert_eq!(session.state(&id), None);
        assert!(!session.disconnect(&id));
    }

    #[test]
    fn test_peer_count_tracks_active_set() {
        let mut session = Session::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        session.connect(a);
        session.connect(b);
        assert_eq!(session.peer_count(), 2);

        session.disconnect(&a);
        assert_eq!(session.peer_count(), 1);
        assert!(session.contains(&b));
    }
}
