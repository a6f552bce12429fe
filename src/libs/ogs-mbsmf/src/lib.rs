//! NextGCore MB-SMF Consumer Library
//!
//! This crate implements the consumer side of the 3GPP Nmbsmf_MBSSession
//! service (TS 29.532). An application edits MBS sessions and status
//! subscriptions locally; the library tracks what changed since the MB-SMF
//! last acknowledged them and turns the difference into transport intents.
//!
//! # Features
//!
//! - Value model of the MBS session resource with JSON serialization via serde
//! - Structural diff producing RFC 6902 JSON Patch operations
//! - Session reconciliation state machine (create, re-create, patch, delete)
//! - Status subscription lifecycle and notification correlation
//!
//! No I/O happens here. The embedding application executes the [`Intent`]s
//! taken from the [`Context`] and feeds the answers back as
//! [`TransportEvent`]s.
//!
//! # Modules
//!
//! - [`model`] - MBS session, service and subscription records
//! - [`encode`] - JSON documents and fixed-width wire scalars
//! - [`patch`] - JSON Patch operations and JSON Pointer paths
//! - [`diff`] - Change detection between two versions of a value
//! - [`intent`] - Transport intents, answers and result types
//! - [`subscription`] - Status subscriptions
//! - [`session`] - Per-session reconciliation
//! - [`context`] - Session registry and correlation indexes
//! - [`config`] - YAML configuration
//! - [`error`] - Error types

pub mod config;
pub mod context;
pub mod diff;
pub mod encode;
pub mod error;
pub mod intent;
pub mod model;
pub mod patch;
pub mod session;
pub mod subscription;

mod property_tests;

// Re-export commonly used types
pub use config::{MbsmfConfig, NotificationServer};
pub use context::Context;
pub use diff::{diff, diff_values, Diff, Patch};
pub use encode::{BitRate, Document, ToDocument};
pub use error::{MbsmfError, MbsmfResult};
pub use intent::{
    BundledSubscription, Intent, OperationResult, ProblemDetails, SessionCreated, SessionKey,
    SubscriptionAck, SubscriptionKey, TimeoutTarget, TransportEvent,
};
pub use model::{
    MbsMediaComp, MbsQosReq, MbsServiceInfo, MbsSession, MbsSessionEventReportList,
    MbsSessionEventType, MbsSessionId, MbsSessionSubscription, MbsSessionType, PlmnId, Ssm, Tmgi,
};
pub use patch::{PatchOp, PatchOpKind};
pub use session::{Session, SessionState};
pub use subscription::{NotificationEndpoint, ServerHandle, StatusSubscription};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_then_patch_free_update() {
        let mut ctx = Context::new(MbsmfConfig::default());
        let key = ctx.session_new().unwrap();
        ctx.session_mut(key)
            .unwrap()
            .set_tmgi(Some(Tmgi::new("000001", PlmnId::new("001", "01"))));
        ctx.push(key).unwrap();

        let intents = ctx.take_intents();
        assert_eq!(intents.len(), 1);
        assert_eq!(intents[0].name(), "CreateResource");
        assert_eq!(ctx.session(key).unwrap().state(), SessionState::CreatePending);

        ctx.handle_event(TransportEvent::CreateResult {
            session: key,
            result: Ok(SessionCreated::new("abc")),
        });
        assert_eq!(ctx.session(key).unwrap().state(), SessionState::Registered);
        assert_eq!(ctx.session(key).unwrap().resource_id(), Some("abc"));

        ctx.push(key).unwrap();
        assert!(ctx.take_intents().is_empty());
    }
}
