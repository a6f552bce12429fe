//! Dry-run transport
//!
//! Renders intents as the HTTP requests a Nmbsmf_MBSSession client would
//! send, and fabricates successful answers for them.

use std::fmt;

use ogs_mbsmf::{
    Document, Intent, PlmnId, SessionCreated, SubscriptionAck, Tmgi, TransportEvent,
};

/// API root of the Nmbsmf_MBSSession service
pub const API_ROOT: &str = "/nmbsmf-mbssession/v1";

/// HTTP request rendered from an intent
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub method: &'static str,
    pub path: String,
    pub body: Option<Document>,
}

impl Request {
    pub fn from_intent(intent: &Intent) -> Self {
        let (method, path) = match intent {
            Intent::CreateResource { .. } => ("POST", format!("{API_ROOT}/mbs-sessions")),
            Intent::RemoveResource { resource_id, .. } => {
                ("DELETE", format!("{API_ROOT}/mbs-sessions/{resource_id}"))
            }
            Intent::PatchResource { resource_id, .. } => {
                ("PATCH", format!("{API_ROOT}/mbs-sessions/{resource_id}"))
            }
            Intent::CreateSubscription { .. } => {
                ("POST", format!("{API_ROOT}/mbs-sessions/subscriptions"))
            }
            Intent::UpdateSubscription {
                subscription_id, ..
            } => (
                "PATCH",
                format!("{API_ROOT}/mbs-sessions/subscriptions/{subscription_id}"),
            ),
            Intent::DeleteSubscription { subscription_id } => (
                "DELETE",
                format!("{API_ROOT}/mbs-sessions/subscriptions/{subscription_id}"),
            ),
        };
        Self {
            method,
            path,
            body: intent.request_body(),
        }
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.path)?;
        if let Some(body) = &self.body {
            let pretty = serde_json::to_string_pretty(body).map_err(|_| fmt::Error)?;
            write!(f, "\n{pretty}")?;
        }
        Ok(())
    }
}

/// Answers every request with success, numbering the resources it creates
#[derive(Debug, Default)]
pub struct Simulator {
    next_id: u32,
}

impl Simulator {
    pub fn new() -> Self {
        Self::default()
    }

    fn allocate(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }

    /// Successful answer to an intent; deletes are not answered
    pub fn answer(&mut self, intent: &Intent) -> Option<TransportEvent> {
        match intent {
            Intent::CreateResource {
                session,
                snapshot,
                subscription,
            } => {
                let id = self.allocate();
                let mut created = SessionCreated::new(format!("mbs-{id}"));
                if snapshot.tmgi_alloc_req && snapshot.tmgi().is_none() {
                    created.tmgi = Some(Tmgi::new(format!("{id:06X}"), PlmnId::new("001", "01")));
                }
                if subscription.is_some() {
                    created.subscription_id = Some(format!("sub-{}", self.allocate()));
                }
                Some(TransportEvent::CreateResult {
                    session: *session,
                    result: Ok(created),
                })
            }
            Intent::PatchResource { session, .. } => Some(TransportEvent::PatchResult {
                session: *session,
                result: Ok(()),
            }),
            Intent::CreateSubscription { subscription, .. } => {
                let id = self.allocate();
                Some(TransportEvent::SubscriptionCreated {
                    subscription: *subscription,
                    result: Ok(SubscriptionAck::new(format!("sub-{id}"))),
                })
            }
            Intent::UpdateSubscription {
                subscription,
                subscription_id,
                ..
            } => Some(TransportEvent::SubscriptionUpdated {
                subscription: *subscription,
                result: Ok(SubscriptionAck::new(subscription_id.clone())),
            }),
            Intent::RemoveResource { .. } | Intent::DeleteSubscription { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ogs_mbsmf::{MbsSession, SessionKey, SubscriptionKey};

    #[test]
    fn test_request_paths() {
        let remove = Intent::RemoveResource {
            session: SessionKey(1),
            resource_id: "mbs-3".to_string(),
        };
        let request = Request::from_intent(&remove);
        assert_eq!(request.method, "DELETE");
        assert_eq!(request.path, "/nmbsmf-mbssession/v1/mbs-sessions/mbs-3");
        assert!(request.body.is_none());

        let update = Intent::UpdateSubscription {
            subscription: SubscriptionKey(2),
            subscription_id: "sub-9".to_string(),
            ops: Vec::new(),
        };
        let request = Request::from_intent(&update);
        assert_eq!(request.method, "PATCH");
        assert_eq!(
            request.path,
            "/nmbsmf-mbssession/v1/mbs-sessions/subscriptions/sub-9"
        );
    }

    #[test]
    fn test_create_body_is_wrapped() {
        let create = Intent::CreateResource {
            session: SessionKey(1),
            snapshot: MbsSession::default(),
            subscription: None,
        };
        let request = Request::from_intent(&create);
        assert_eq!(request.method, "POST");
        let body = request.body.unwrap();
        assert_eq!(body["mbsSession"]["serviceType"], "MULTICAST");
        assert!(request_display_starts_with(&create, "POST /nmbsmf-mbssession/v1/mbs-sessions\n"));
    }

    fn request_display_starts_with(intent: &Intent, prefix: &str) -> bool {
        Request::from_intent(intent).to_string().starts_with(prefix)
    }

    #[test]
    fn test_simulated_create() {
        let mut simulator = Simulator::new();
        let snapshot = MbsSession {
            tmgi_alloc_req: true,
            ..Default::default()
        };
        let create = Intent::CreateResource {
            session: SessionKey(4),
            snapshot,
            subscription: None,
        };
        match simulator.answer(&create) {
            Some(TransportEvent::CreateResult { session, result }) => {
                assert_eq!(session, SessionKey(4));
                let created = result.unwrap();
                assert_eq!(created.resource_id, "mbs-1");
                assert_eq!(created.tmgi.unwrap().mbs_service_id, "000001");
                assert!(created.subscription_id.is_none());
            }
            other => panic!("unexpected answer {other:?}"),
        }

        let delete = Intent::DeleteSubscription {
            subscription_id: "sub-1".to_string(),
        };
        assert!(simulator.answer(&delete).is_none());
    }
}
