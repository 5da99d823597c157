//! User extension points: the trait objects a `stage_type` registration and
//! an authenticated actor present to the runtime.
//!
//! §9 calls out the source's reflection-based dispatch as a
//! pattern to re-architect away from; the runtime routes by a static
//! `stage_type → factory` table (owned by the [`crate::dispatcher`]) and
//! calls straight through a `dyn` trait object, never by name lookup on the
//! hot path. Trait objects are required here (unlike the teacher's
//! generic-constraint actors) because one Dispatcher must host arbitrarily
//! many concurrent, heterogeneous stage types chosen at registration time,
//! not at compile time.

// Layer 1: Standard library imports
// (none)

// Layer 2: Third-party crate imports
use async_trait::async_trait;

// Layer 3: Internal module imports
use crate::error::StageError;
use crate::packet::Packet;
use crate::sender::{ActorSender, StageSender};

/// Per-client state inside a stage (§3, "Actor").
///
/// Implementations typically hold a user-defined payload struct plus
/// whatever per-client fields the game logic needs; `account_id` is the
/// only field the runtime itself reads.
#[async_trait]
pub trait ActorBehavior: Send {
    fn account_id(&self) -> &str;

    /// Called once, before `on_authenticate`, while constructing the actor
    /// for a brand-new session (§4.5 step 3).
    async fn on_create(&mut self) {}

    /// The user must arrange for `account_id()` to return non-empty before
    /// returning `true`; the session adapter treats a `true` result with an
    /// empty `account_id` as an authentication failure
    /// (§4.5 step 4).
    async fn on_authenticate(&mut self, auth_packet: &Packet) -> bool;

    /// Runs after a successful authentication, before the actor is joined
    /// into its stage; may perform follow-up API-server calls
    /// (§4.5 step 6).
    async fn on_post_authenticate(&mut self) {}

    /// Runs when the actor leaves its stage for good: explicit
    /// `leave_stage`, stage destruction, or grace-window expiry
    /// (§3, "Actor lifecycle").
    async fn on_destroy(&mut self) {}
}

/// Per-stage user logic (§3, "Stage"; §4.4 dispatch table).
#[async_trait]
pub trait StageType: Send {
    /// Runs inside the stage loop once, right after the Dispatcher creates
    /// the registry entry (§4.6).
    async fn on_create(&mut self, sender: &StageSender) -> Result<(), StageError> {
        let _ = sender;
        Ok(())
    }

    /// A user `msg_id` arrived for a known actor
    /// (`ClientRouteMessage`, or `RouteMessage` with a resolvable actor).
    /// The sender is bound to this specific actor's session, so
    /// `send_to_client` reaches the right connection.
    async fn on_dispatch(&mut self, sender: &ActorSender, actor: &mut dyn ActorBehavior, packet: &Packet);

    /// A user `msg_id` arrived with no associated actor: a server-side
    /// `RouteMessage` (§4.4, "no actor ⇒ server-side").
    async fn on_dispatch_stage(&mut self, sender: &StageSender, packet: &Packet) {
        let _ = (sender, packet);
    }

    /// Decide whether a freshly authenticated actor may join. Returning
    /// `false` rejects the join; the actor is not inserted into the actors
    /// map and `on_post_join_stage` is not called (§4.4).
    async fn on_join_stage(&mut self, sender: &ActorSender, actor: &dyn ActorBehavior) -> bool {
        let _ = (sender, actor);
        true
    }

    /// Runs once, right after a join is accepted and the actor is inserted.
    /// Not re-run on reconnection (§4.5).
    async fn on_post_join_stage(&mut self, sender: &ActorSender, actor: &mut dyn ActorBehavior) {
        let _ = (sender, actor);
    }

    /// `connected == false` on transport disconnect, `true` on a
    /// subsequent reconnection for the same `account_id`
    /// (§4.4, `DisconnectMessage` / reconnection handling).
    async fn on_connection_changed(
        &mut self,
        sender: &ActorSender,
        actor: &mut dyn ActorBehavior,
        connected: bool,
    ) {
        let _ = (sender, actor, connected);
    }

    /// Called for every actor still present, then once for the stage
    /// itself, when the stage is torn down (§4.4, `DestroyMessage`).
    async fn on_destroy(&mut self, sender: &StageSender) {
        let _ = sender;
    }
}

/// Constructs a fresh `Box<dyn StageType>` for a newly created stage.
/// Registered once per `stage_type` string with the Dispatcher.
pub type StageTypeFactory = Box<dyn Fn() -> Box<dyn StageType> + Send + Sync>;

/// Constructs a fresh `Box<dyn ActorBehavior>` for a newly authenticating
/// session. Registered alongside a [`StageTypeFactory`] under the same
/// `stage_type` string (§4.5 step 2, "instantiate the
/// user-defined actor").
pub type ActorFactory = Box<dyn Fn() -> Box<dyn ActorBehavior> + Send + Sync>;

#[cfg(test)]
mod tests {
    use super::*;

    struct NoopStage;

    #[async_trait]
    impl StageType for NoopStage {
        async fn on_dispatch(&mut self, _sender: &ActorSender, _actor: &mut dyn ActorBehavior, _packet: &Packet) {}
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
            self.account_id = "alice".to_string();
            true
        }
    }

    #[tokio::test]
    async fn default_stage_hooks_are_no_ops() {
        let mut actor = NoopActor {
            account_id: String::new(),
        };
        assert!(actor.on_authenticate(&Packet::request("Auth", 1, crate::packet::Payload::empty())).await);
        assert_eq!(actor.account_id(), "alice");
    }

    #[test]
    fn factory_produces_boxed_stage_types() {
        let factory: StageTypeFactory = Box::new(|| Box::new(NoopStage));
        let _stage: Box<dyn StageType> = factory();
    }
}
