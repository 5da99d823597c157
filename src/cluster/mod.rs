//! Server-mesh boundary (§1: "Server-mesh transport... treated as
//! a `ClusterBus`").
//!
//! The inter-process message bus, service discovery, and wire format are
//! external collaborators. This module only defines the [`ClusterBus`]
//! trait the [`crate::sender`] implementation calls into, and the
//! [`RoutePacket`]/[`PolicyKind`] shapes that cross that boundary.

// Layer 1: Standard library imports
// (none)

// Layer 2: Third-party crate imports
use async_trait::async_trait;
use rand::seq::SliceRandom;
use rand::Rng;

// Layer 3: Internal module imports
use crate::packet::{Packet, RouteHeader};
use crate::util::PeerId;

pub use crate::config::PolicyKind;

/// A packet plus its routing header, ready to cross the mesh
/// (§4.7, "Cross-process transport").
#[derive(Debug, Clone)]
pub struct RoutePacket {
    pub header: RouteHeader,
    pub packet: Packet,
}

/// One member of a service group, as seen by the selection policy.
#[derive(Debug, Clone)]
pub struct ServicePeer {
    pub peer_id: PeerId,
    pub weight: u32,
}

/// The mesh transport the core routes through. An embedding application
/// implements this over whatever inter-process bus it runs (gRPC, raw TCP,
/// a message queue); the core only requires that a sent [`RoutePacket`]
/// eventually reaches the peer named in its header, or that delivery
/// failure surfaces as an `Err`.
#[async_trait]
pub trait ClusterBus: Send + Sync {
    async fn send(&self, peer_id: &PeerId, packet: RoutePacket) -> Result<(), ClusterSendError>;

    /// Current members of `(server_type, service_id)`, for
    /// `send_to_service`/`request_to_service` peer selection.
    fn service_peers(&self, server_type: &str, service_id: u16) -> Vec<ServicePeer>;
}

#[derive(Debug, thiserror::Error)]
pub enum ClusterSendError {
    #[error("peer {0} is not reachable")]
    PeerUnreachable(PeerId),
    #[error("mesh transport error: {0}")]
    Transport(String),
}

/// Picks one peer from a service group according to `policy`
/// (§6, "Server-selection policy").
pub fn select_peer(peers: &[ServicePeer], policy: PolicyKind, round_robin_cursor: &mut usize) -> Option<PeerId> {
    if peers.is_empty() {
        return None;
    }
    match policy {
        PolicyKind::RoundRobin => {
            let index = *round_robin_cursor % peers.len();
            *round_robin_cursor = round_robin_cursor.wrapping_add(1);
            Some(peers[index].peer_id.clone())
        }
        PolicyKind::Weighted => {
            let total_weight: u32 = peers.iter().map(|p| p.weight.max(1)).sum();
            let mut choice = rand::thread_rng().gen_range(0..total_weight.max(1));
            for peer in peers {
                let weight = peer.weight.max(1);
                if choice < weight {
                    return Some(peer.peer_id.clone());
                }
                choice -= weight;
            }
            peers.choose(&mut rand::thread_rng()).map(|p| p.peer_id.clone())
        }
    }
}
