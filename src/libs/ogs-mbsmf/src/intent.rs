//! Transport Intents and Events
//!
//! The reconciliation never talks to the network. It emits [`Intent`]s for
//! the transport collaborator to execute, and the transport reports back
//! with [`TransportEvent`]s.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::encode::{Document, ToDocument};
use crate::error::{MbsmfError, MbsmfResult};
use crate::model::{MbsSession, MbsSessionEventReport, MbsSessionId, MbsSessionSubscription, Tmgi, TunnelAddress};
use crate::patch::PatchOp;

/// Local handle of a session inside a [`Context`](crate::Context)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SessionKey(pub u64);

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Local handle of a status subscription inside a [`Context`](crate::Context)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionKey(pub u64);

impl fmt::Display for SubscriptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Problem Details (RFC 7807) returned by the MB-SMF on rejection
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProblemDetails {
    /// A URI reference that identifies the problem type
    #[serde(rename = "type", skip_serializing_if = "Option::is_none", default)]
    pub problem_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub title: Option<String>,
    /// The HTTP status code
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub instance: Option<String>,
    /// Application-specific error cause
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub cause: Option<String>,
    #[serde(rename = "invalidParams", skip_serializing_if = "Vec::is_empty", default)]
    pub invalid_params: Vec<InvalidParam>,
}

impl ProblemDetails {
    pub fn with_status(status: u16) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn with_cause(mut self, cause: impl Into<String>) -> Self {
        self.cause = Some(cause.into());
        self
    }
}

impl fmt::Display for ProblemDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(f, "[{status}]")?,
            None => f.write_str("[-]")?,
        }
        if let Some(title) = &self.title {
            write!(f, " {title}")?;
        }
        if let Some(cause) = &self.cause {
            write!(f, " ({cause})")?;
        }
        if let Some(detail) = &self.detail {
            write!(f, ": {detail}")?;
        }
        Ok(())
    }
}

/// Invalid parameter of a [`ProblemDetails`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvalidParam {
    pub param: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub reason: Option<String>,
}

/// Outcome reported to the application through result callbacks
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationResult {
    Ok,
    TimedOut,
    Error(ProblemDetails),
}

impl OperationResult {
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok)
    }
}

impl fmt::Display for OperationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok => f.write_str("ok"),
            Self::TimedOut => f.write_str("timed out"),
            Self::Error(problem) => write!(f, "error {problem}"),
        }
    }
}

/// Session result callback
pub type SessionResultCallback = Box<dyn FnMut(SessionKey, &OperationResult) + Send>;

/// Subscription result callback
pub type SubscriptionResultCallback = Box<dyn FnMut(SubscriptionKey, &OperationResult) + Send>;

/// Notification callback, called once per received event report
pub type NotifyCallback = Box<dyn FnMut(SubscriptionKey, &MbsSessionEventReport) + Send>;

/// Subscription carried inside a session create request
#[derive(Debug, Clone, PartialEq)]
pub struct BundledSubscription {
    pub key: SubscriptionKey,
    pub snapshot: MbsSessionSubscription,
}

/// Operation for the transport to execute against the MB-SMF
#[derive(Debug, Clone, PartialEq)]
pub enum Intent {
    /// POST the full session, optionally with one subscription
    CreateResource {
        session: SessionKey,
        snapshot: MbsSession,
        subscription: Option<BundledSubscription>,
    },
    /// DELETE a session resource
    RemoveResource {
        session: SessionKey,
        resource_id: String,
    },
    /// PATCH the session body
    PatchResource {
        session: SessionKey,
        resource_id: String,
        ops: Vec<PatchOp>,
    },
    /// POST a status subscription for a registered session
    CreateSubscription {
        session: SessionKey,
        subscription: SubscriptionKey,
        resource_id: String,
        snapshot: MbsSessionSubscription,
    },
    /// PATCH a status subscription
    UpdateSubscription {
        subscription: SubscriptionKey,
        subscription_id: String,
        ops: Vec<PatchOp>,
    },
    /// DELETE a status subscription; nothing waits for the answer
    DeleteSubscription { subscription_id: String },
}

impl Intent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::CreateResource { .. } => "CreateResource",
            Self::RemoveResource { .. } => "RemoveResource",
            Self::PatchResource { .. } => "PatchResource",
            Self::CreateSubscription { .. } => "CreateSubscription",
            Self::UpdateSubscription { .. } => "UpdateSubscription",
            Self::DeleteSubscription { .. } => "DeleteSubscription",
        }
    }

    /// Session the intent acts on, if any
    pub fn session(&self) -> Option<SessionKey> {
        match self {
            Self::CreateResource { session, .. }
            | Self::RemoveResource { session, .. }
            | Self::PatchResource { session, .. }
            | Self::CreateSubscription { session, .. } => Some(*session),
            Self::UpdateSubscription { .. } | Self::DeleteSubscription { .. } => None,
        }
    }

    /// Request body as sent on the wire
    pub fn request_body(&self) -> Option<Document> {
        match self {
            Self::CreateResource {
                snapshot,
                subscription,
                ..
            } => {
                let mut session = snapshot.to_document()?;
                if let (Some(bundled), Some(fields)) = (subscription, session.as_object_mut()) {
                    if let Some(subsc) = bundled.snapshot.to_document() {
                        fields.insert("mbsSessionSubsc".to_string(), subsc);
                    }
                }
                Some(json!({ "mbsSession": session }))
            }
            Self::PatchResource { ops, .. } | Self::UpdateSubscription { ops, .. } => {
                ops.to_document()
            }
            Self::CreateSubscription { snapshot, .. } => snapshot.to_document(),
            Self::RemoveResource { .. } | Self::DeleteSubscription { .. } => None,
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CreateResource {
                session,
                snapshot,
                subscription,
            } => {
                write!(f, "CreateResource session={session} id=[{}]", snapshot.mbs_session_id)?;
                if let Some(bundled) = subscription {
                    write!(f, " subscription={}", bundled.key)?;
                }
                Ok(())
            }
            Self::RemoveResource {
                session,
                resource_id,
            } => write!(f, "RemoveResource session={session} resource={resource_id}"),
            Self::PatchResource {
                session,
                resource_id,
                ops,
            } => write!(
                f,
                "PatchResource session={session} resource={resource_id} ops={}",
                ops.len()
            ),
            Self::CreateSubscription {
                session,
                subscription,
                ..
            } => write!(f, "CreateSubscription session={session} subscription={subscription}"),
            Self::UpdateSubscription {
                subscription,
                subscription_id,
                ops,
            } => write!(
                f,
                "UpdateSubscription subscription={subscription} id={subscription_id} ops={}",
                ops.len()
            ),
            Self::DeleteSubscription { subscription_id } => {
                write!(f, "DeleteSubscription id={subscription_id}")
            }
        }
    }
}

/// Last non-empty path segment of a resource URI
fn resource_id_from_uri(uri: &str) -> Option<String> {
    let path = uri.split(['?', '#']).next().unwrap_or(uri);
    path.trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|segment| !segment.is_empty() && !segment.contains(':'))
        .map(str::to_string)
}

#[derive(Debug, Default, Deserialize)]
struct CreatedSubscriptionDoc {
    #[serde(rename = "mbsSessionSubscUri", default)]
    mbs_session_subsc_uri: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct CreatedSessionDoc {
    #[serde(rename = "mbsSessionId", default)]
    mbs_session_id: Option<MbsSessionId>,
    #[serde(rename = "ingressTunAddr", default)]
    ingress_tun_addr: Vec<TunnelAddress>,
    #[serde(rename = "expirationTime", default)]
    expiration_time: Option<DateTime<Utc>>,
    #[serde(rename = "mbsSessionSubsc", default)]
    mbs_session_subsc: Option<CreatedSubscriptionDoc>,
}

#[derive(Debug, Default, Deserialize)]
struct CreateRspDoc {
    #[serde(rename = "mbsSession", default)]
    mbs_session: Option<CreatedSessionDoc>,
}

/// Successful answer to a [`Intent::CreateResource`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionCreated {
    pub resource_id: String,
    /// TMGI allocated by the MB-SMF
    pub tmgi: Option<Tmgi>,
    pub ingress_tun_addrs: Vec<TunnelAddress>,
    pub expiration_time: Option<DateTime<Utc>>,
    /// Id of the bundled subscription, when one was created
    pub subscription_id: Option<String>,
}

impl SessionCreated {
    pub fn new(resource_id: impl Into<String>) -> Self {
        Self {
            resource_id: resource_id.into(),
            ..Default::default()
        }
    }

    /// Parse a `201 Created` answer from its `Location` header and body
    pub fn from_response(location: Option<&str>, body: Option<&Document>) -> MbsmfResult<Self> {
        let location = location
            .ok_or_else(|| MbsmfError::Protocol("create response without Location".to_string()))?;
        let resource_id = resource_id_from_uri(location).ok_or_else(|| {
            MbsmfError::Protocol(format!("no resource id in Location '{location}'"))
        })?;

        let doc: CreateRspDoc = match body {
            Some(body) => serde_json::from_value(body.clone())?,
            None => CreateRspDoc::default(),
        };
        let session = doc.mbs_session.unwrap_or_default();

        Ok(Self {
            resource_id,
            tmgi: session.mbs_session_id.and_then(|id| id.tmgi),
            ingress_tun_addrs: session.ingress_tun_addr,
            expiration_time: session.expiration_time,
            subscription_id: session
                .mbs_session_subsc
                .and_then(|subsc| subsc.mbs_session_subsc_uri)
                .as_deref()
                .and_then(resource_id_from_uri),
        })
    }
}

/// Successful answer to a subscription create or update
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionAck {
    pub id: String,
    /// Expiry granted by the MB-SMF
    pub expiry_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, Deserialize)]
struct SubscriptionRspDoc {
    #[serde(rename = "expiryTime", default)]
    expiry_time: Option<DateTime<Utc>>,
}

impl SubscriptionAck {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            expiry_time: None,
        }
    }

    pub fn from_response(location: Option<&str>, body: Option<&Document>) -> MbsmfResult<Self> {
        let location = location.ok_or_else(|| {
            MbsmfError::Protocol("subscription response without Location".to_string())
        })?;
        let id = resource_id_from_uri(location).ok_or_else(|| {
            MbsmfError::Protocol(format!("no subscription id in Location '{location}'"))
        })?;
        let doc: SubscriptionRspDoc = match body {
            Some(body) => serde_json::from_value(body.clone())?,
            None => SubscriptionRspDoc::default(),
        };
        Ok(Self {
            id,
            expiry_time: doc.expiry_time,
        })
    }
}

/// What a timed out request was doing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutTarget {
    CreateResource(SessionKey),
    PatchResource(SessionKey),
    CreateSubscription(SubscriptionKey),
    UpdateSubscription(SubscriptionKey),
}

/// Completion reported by the transport
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    CreateResult {
        session: SessionKey,
        result: Result<SessionCreated, ProblemDetails>,
    },
    PatchResult {
        session: SessionKey,
        result: Result<(), ProblemDetails>,
    },
    SubscriptionCreated {
        subscription: SubscriptionKey,
        result: Result<SubscriptionAck, ProblemDetails>,
    },
    SubscriptionUpdated {
        subscription: SubscriptionKey,
        result: Result<SubscriptionAck, ProblemDetails>,
    },
    Timeout(TimeoutTarget),
}
