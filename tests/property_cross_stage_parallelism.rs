//! §8 testable property 3: under N stages and M worker threads
//! (M >= 2, N >= 2), callbacks for distinct stages can be observed to
//! execute concurrently — single-consumer isolation is per-stage, not
//! global.

// Layer 1: Standard library imports
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

// Layer 2: Third-party crate imports
use async_trait::async_trait;
use tokio::sync::Barrier;

// Layer 3: Internal module imports
use stagecore::config::RuntimeConfig;
use stagecore::context::RuntimeContext;
use stagecore::dispatcher::Dispatcher;
use stagecore::packet::{Packet, Payload, RouteHeader};
use stagecore::sender::{ActorSender, StageSender};
use stagecore::stage::{ActorBehavior, StageMessage, StageType};
use stagecore::util::MsgSeq;

mod common;
use common::wait_until;

const STAGE_COUNT: i64 = 4;

/// Each stage's handler blocks on a shared `Barrier` sized to `STAGE_COUNT`.
/// The only way every stage can release that barrier is if all `STAGE_COUNT`
/// handlers are genuinely in flight at once — proving distinct stages run
/// concurrently rather than being serialized onto one hidden global loop.
struct BarrierStage {
    barrier: Arc<Barrier>,
    entered: Arc<AtomicUsize>,
}

#[async_trait]
impl StageType for BarrierStage {
    async fn on_dispatch(&mut self, _sender: &ActorSender, _actor: &mut dyn ActorBehavior, _packet: &Packet) {}

    async fn on_dispatch_stage(&mut self, _sender: &StageSender, _packet: &Packet) {
        self.entered.fetch_add(1, Ordering::SeqCst);
        self.barrier.wait().await;
    }
}

struct NoopActor {
    account_id: String,
}

#[async_trait]
impl ActorBehavior for NoopActor {
    fn account_id(&self) -> &str {
        &self.account_id
    }
    async fn on_authenticate(&mut self, _auth_packet: &Packet) -> bool {
        true
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn distinct_stages_run_their_handlers_concurrently() {
    let barrier = Arc::new(Barrier::new(STAGE_COUNT as usize));
    let entered = Arc::new(AtomicUsize::new(0));

    let ctx = RuntimeContext::new(RuntimeConfig::default(), None);
    let dispatcher = Arc::new(Dispatcher::new(ctx));
    {
        let barrier = barrier.clone();
        let entered = entered.clone();
        dispatcher.register_stage_type(
            "Barrier",
            Box::new(move || Box::new(BarrierStage { barrier: barrier.clone(), entered: entered.clone() }) as Box<dyn StageType>),
            Box::new(|| Box::new(NoopActor { account_id: String::new() }) as Box<dyn ActorBehavior>),
        );
    }

    let mut cells = Vec::new();
    for stage_id in 0..STAGE_COUNT {
        cells.push(dispatcher.create(stage_id, "Barrier").await.unwrap());
    }

    for (stage_id, cell) in cells.iter().enumerate() {
        let stage_id = stage_id as i64;
        cell.enqueue(StageMessage::RouteMessage {
            packet: Packet::request("Sync", stage_id, Payload::empty()),
            header: RouteHeader {
                msg_seq: MsgSeq::NONE,
                service_id: 0,
                msg_id: "Sync".to_string(),
                from: "peer-a".to_string(),
                stage_id,
                account_id: String::new(),
                sid: String::new(),
                is_reply: false,
            },
        });
    }

    // If stages were secretly serialized, every handler but the last would
    // block forever on the barrier and this would time out.
    assert!(wait_until(Duration::from_secs(2), || entered.load(Ordering::SeqCst) == STAGE_COUNT as usize).await);
}
