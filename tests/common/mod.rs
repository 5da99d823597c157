//! Shared test doubles for the integration suite: a loopback mesh bus and a
//! recording transport, standing in for the external collaborators
//! §1 places outside the core.
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use stagecore::cluster::{ClusterBus, ClusterSendError, RoutePacket, ServicePeer};
use stagecore::dispatcher::Dispatcher;
use stagecore::packet::Packet;
use stagecore::transport::{ClientChannel, TransportServer};
use stagecore::util::PeerId;

/// A one-peer mesh: every `send` routes straight back into the bound
/// `Dispatcher`, simulating a server replying to (or forwarding within)
/// itself. Bound after construction since the `Dispatcher` it targets isn't
/// built until after the `Runtime` holding this bus exists.
pub struct LoopbackBus {
    dispatcher: Mutex<Option<Arc<Dispatcher>>>,
    sent_count: AtomicUsize,
}

impl LoopbackBus {
    pub fn new() -> Arc<Self> {
        Arc::new(Self { dispatcher: Mutex::new(None), sent_count: AtomicUsize::new(0) })
    }

    pub fn bind(&self, dispatcher: Arc<Dispatcher>) {
        *self.dispatcher.lock().unwrap() = Some(dispatcher);
    }

    pub fn sent_count(&self) -> usize {
        self.sent_count.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl ClusterBus for LoopbackBus {
    async fn send(&self, _peer_id: &PeerId, route: RoutePacket) -> Result<(), ClusterSendError> {
        self.sent_count.fetch_add(1, Ordering::Relaxed);
        let dispatcher = self.dispatcher.lock().unwrap().clone().expect("LoopbackBus::bind must run before send");
        dispatcher.route_packet(route.packet, route.header).await;
        Ok(())
    }

    fn service_peers(&self, _server_type: &str, _service_id: u16) -> Vec<ServicePeer> {
        vec![ServicePeer { peer_id: "self".to_string(), weight: 1 }]
    }
}

/// A `ClusterBus` that never delivers — simulates a peer that never replies,
/// for request-timeout scenarios.
pub struct BlackholeBus;

#[async_trait]
impl ClusterBus for BlackholeBus {
    async fn send(&self, _peer_id: &PeerId, _route: RoutePacket) -> Result<(), ClusterSendError> {
        Ok(())
    }

    fn service_peers(&self, _server_type: &str, _service_id: u16) -> Vec<ServicePeer> {
        vec![ServicePeer { peer_id: "nobody-home".to_string(), weight: 1 }]
    }
}

/// A client connection double: records every packet pushed to it and every
/// close call.
#[derive(Default)]
pub struct RecordingChannel {
    pub sent: Mutex<Vec<Packet>>,
    pub closed: AtomicUsize,
}

impl RecordingChannel {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn sent_len(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    pub fn last(&self) -> Option<Packet> {
        self.sent.lock().unwrap().last().cloned()
    }
}

impl ClientChannel for RecordingChannel {
    fn send(&self, packet: Packet) {
        self.sent.lock().unwrap().push(packet);
    }

    fn close(&self) {
        self.closed.fetch_add(1, Ordering::Relaxed);
    }

    fn session_id(&self) -> &str {
        "test-session"
    }
}

/// A transport double: records `close_session` calls and any response
/// pushed through the stage-level `send_to_client` path.
#[derive(Default)]
pub struct RecordingTransport {
    pub closed_sessions: Mutex<Vec<String>>,
    pub responses: Mutex<Vec<(String, Packet)>>,
}

impl RecordingTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait]
impl TransportServer for RecordingTransport {
    async fn send_response(&self, session_id: &str, packet: Packet) {
        self.responses.lock().unwrap().push((session_id.to_string(), packet));
    }

    async fn close_session(&self, session_id: &str) {
        self.closed_sessions.lock().unwrap().push(session_id.to_string());
    }
}

/// Polls `condition` until it returns `true` or `timeout` elapses, yielding
/// between attempts so spawned tasks get a chance to run. Integration tests
/// use this instead of a fixed sleep since message delivery crosses real
/// tokio task boundaries.
pub async fn wait_until<F: Fn() -> bool>(timeout: std::time::Duration, condition: F) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
    }
}
