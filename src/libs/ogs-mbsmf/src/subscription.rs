//! Status Subscription Aggregate
//!
//! A [`StatusSubscription`] wraps the subscription record with the local
//! bookkeeping needed to reconcile it: the id assigned by the MB-SMF, the
//! last acknowledged record, a dirty flag and the notification endpoint.

use std::fmt;

use chrono::{DateTime, Utc};

use crate::config::NotificationServer;
use crate::intent::{
    NotifyCallback, OperationResult, SessionKey, SubscriptionKey, SubscriptionResultCallback,
};
use crate::model::{
    MbsSessionEventMask, MbsSessionEventReport, MbsSessionEventType, MbsSessionId,
    MbsSessionSubscription,
};

/// Index of a configured notification server
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ServerHandle(pub usize);

/// Where the MB-SMF sends notifications for one subscription
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationEndpoint {
    pub server: ServerHandle,
    pub url: String,
    /// URL path without its leading `/`, `None` when the URL has no path
    pub path: Option<String>,
}

impl NotificationEndpoint {
    pub const RESOURCE: &'static str = "mbs-session-notify";

    pub fn new(server: ServerHandle, api_root: &str, key: SubscriptionKey) -> Self {
        let url = format!(
            "{}/{}/{}",
            api_root.trim_end_matches('/'),
            Self::RESOURCE,
            key
        );
        let path = url_path(&url);
        Self { server, url, path }
    }

    /// Whether a request received on `server` for `path` targets this endpoint
    pub fn matches(&self, server: ServerHandle, path: &str) -> bool {
        if self.server != server {
            return false;
        }
        let path = path.strip_prefix('/').unwrap_or(path);
        match &self.path {
            Some(own) => own == path,
            None => path.is_empty(),
        }
    }
}

/// Path of an absolute URL, after the authority
fn url_path(url: &str) -> Option<String> {
    let rest = url.split_once("://").map_or(url, |(_, rest)| rest);
    let (_, path) = rest.split_once('/')?;
    let path = path.split(['?', '#']).next().unwrap_or(path);
    Some(path.to_string())
}

/// Status subscription attached to a session
pub struct StatusSubscription {
    key: SubscriptionKey,
    session: SessionKey,
    data: MbsSessionSubscription,
    /// The record takes the session identity unless one was set explicitly
    inherit_session_id: bool,
    id: Option<String>,
    endpoint: Option<NotificationEndpoint>,
    dirty: bool,
    acked: Option<MbsSessionSubscription>,
    in_flight: Option<MbsSessionSubscription>,
    granted_expiry: Option<DateTime<Utc>>,
    notify_cb: Option<NotifyCallback>,
    result_cb: Option<SubscriptionResultCallback>,
}

impl StatusSubscription {
    pub(crate) fn new(key: SubscriptionKey, session: SessionKey, data: MbsSessionSubscription) -> Self {
        let inherit_session_id = data.mbs_session_id.is_none();
        Self {
            key,
            session,
            data,
            inherit_session_id,
            id: None,
            endpoint: None,
            dirty: true,
            acked: None,
            in_flight: None,
            granted_expiry: None,
            notify_cb: None,
            result_cb: None,
        }
    }

    pub fn key(&self) -> SubscriptionKey {
        self.key
    }

    /// Session the subscription is attached to
    pub fn session(&self) -> SessionKey {
        self.session
    }

    pub fn data(&self) -> &MbsSessionSubscription {
        &self.data
    }

    /// Id assigned by the MB-SMF, absent until registered
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn endpoint(&self) -> Option<&NotificationEndpoint> {
        self.endpoint.as_ref()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn acknowledged(&self) -> Option<&MbsSessionSubscription> {
        self.acked.as_ref()
    }

    pub fn granted_expiry(&self) -> Option<DateTime<Utc>> {
        self.granted_expiry
    }

    // Setters

    pub fn set_area_session_id(&mut self, area_session_id: Option<u16>) {
        self.data.area_session_id = area_session_id;
        self.dirty = true;
    }

    pub fn set_event_mask(&mut self, mask: MbsSessionEventMask) {
        self.data.event_list = mask;
        self.dirty = true;
    }

    pub fn add_event(&mut self, event: MbsSessionEventType) {
        self.data.event_list.insert(event);
        self.dirty = true;
    }

    pub fn remove_event(&mut self, event: MbsSessionEventType) {
        self.data.event_list.remove(event);
        self.dirty = true;
    }

    pub fn set_correlation_id(&mut self, correlation_id: Option<String>) {
        self.data.notify_correlation_id = correlation_id;
        self.dirty = true;
    }

    pub fn set_expiry_time(&mut self, expiry_time: Option<DateTime<Utc>>) {
        self.data.expiry_time = expiry_time;
        self.dirty = true;
    }

    pub fn set_nfc_instance_id(&mut self, nfc_instance_id: Option<String>) {
        self.data.nfc_instance_id = nfc_instance_id;
        self.dirty = true;
    }

    /// Pin the session identity carried by the record
    pub fn set_mbs_session_id(&mut self, id: Option<MbsSessionId>) {
        self.inherit_session_id = id.is_none();
        self.data.mbs_session_id = id;
        self.dirty = true;
    }

    pub fn set_notify_callback(&mut self, cb: NotifyCallback) {
        self.notify_cb = Some(cb);
    }

    pub fn set_result_callback(&mut self, cb: SubscriptionResultCallback) {
        self.result_cb = Some(cb);
    }

    // Reconciliation support

    /// Allocate the notification endpoint once, on the first server
    pub(crate) fn ensure_endpoint(&mut self, servers: &[NotificationServer]) {
        if self.endpoint.is_none() {
            let Some(server) = servers.first() else {
                log::warn!(
                    "No notification server configured for subscription [{}]",
                    self.key
                );
                return;
            };
            let endpoint = NotificationEndpoint::new(ServerHandle(0), &server.api_root, self.key);
            log::debug!("Subscription [{}] notify URI {}", self.key, endpoint.url);
            self.endpoint = Some(endpoint);
        }
        if self.data.notify_uri.is_none() {
            self.data.notify_uri = self.endpoint.as_ref().map(|e| e.url.clone());
        }
    }

    /// Freeze the record for a create request
    pub(crate) fn prepare_create(
        &mut self,
        session_id: &MbsSessionId,
        servers: &[NotificationServer],
    ) -> MbsSessionSubscription {
        self.ensure_endpoint(servers);
        if self.inherit_session_id {
            self.data.mbs_session_id = Some(session_id.clone());
        }
        self.dirty = false;
        self.in_flight = Some(self.data.clone());
        self.data.clone()
    }

    /// Freeze the record for an update request
    pub(crate) fn prepare_update(&mut self) {
        self.dirty = false;
        self.in_flight = Some(self.data.clone());
    }

    pub(crate) fn attach(&mut self, session: SessionKey) {
        self.session = session;
    }

    /// Forget the remote side entirely; the next push creates it anew
    pub(crate) fn reset_remote(&mut self) -> Option<String> {
        self.acked = None;
        self.in_flight = None;
        self.granted_expiry = None;
        self.dirty = true;
        self.id.take()
    }

    pub(crate) fn confirm(&mut self, id: String, expiry: Option<DateTime<Utc>>) {
        self.id = Some(id);
        self.acked = self.in_flight.take();
        if expiry.is_some() {
            self.granted_expiry = expiry;
        }
    }

    pub(crate) fn confirm_update(&mut self, expiry: Option<DateTime<Utc>>) {
        self.acked = self.in_flight.take();
        if expiry.is_some() {
            self.granted_expiry = expiry;
        }
    }

    pub(crate) fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub(crate) fn mark_clean(&mut self) {
        self.dirty = false;
    }

    /// A request did not go through: try again on the next push
    pub(crate) fn fail(&mut self) {
        self.in_flight = None;
        self.dirty = true;
    }

    pub(crate) fn report(&mut self, result: &OperationResult) {
        if let Some(cb) = self.result_cb.as_mut() {
            cb(self.key, result);
        }
    }

    pub(crate) fn deliver(&mut self, report: &MbsSessionEventReport) -> bool {
        match self.notify_cb.as_mut() {
            Some(cb) => {
                cb(self.key, report);
                true
            }
            None => false,
        }
    }

    pub(crate) fn matches_endpoint(&self, server: ServerHandle, path: &str) -> bool {
        self.endpoint
            .as_ref()
            .is_some_and(|endpoint| endpoint.matches(server, path))
    }

    pub(crate) fn matches_correlation_id(&self, correlation_id: &str) -> bool {
        self.data.notify_correlation_id.as_deref() == Some(correlation_id)
    }
}

impl fmt::Debug for StatusSubscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StatusSubscription")
            .field("key", &self.key)
            .field("session", &self.session)
            .field("id", &self.id)
            .field("dirty", &self.dirty)
            .field("in_flight", &self.in_flight.is_some())
            .field("endpoint", &self.endpoint)
            .field("data", &self.data)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subscription() -> StatusSubscription {
        StatusSubscription::new(SubscriptionKey(5), SessionKey(1), MbsSessionSubscription::default())
    }

    #[test]
    fn test_endpoint_path_matching() {
        let endpoint = NotificationEndpoint::new(ServerHandle(0), "http://10.0.0.1:7777/", SubscriptionKey(5));
        assert_eq!(endpoint.url, "http://10.0.0.1:7777/mbs-session-notify/5");
        assert_eq!(endpoint.path.as_deref(), Some("mbs-session-notify/5"));
        assert!(endpoint.matches(ServerHandle(0), "/mbs-session-notify/5"));
        assert!(endpoint.matches(ServerHandle(0), "mbs-session-notify/5"));
        assert!(!endpoint.matches(ServerHandle(1), "/mbs-session-notify/5"));
        assert!(!endpoint.matches(ServerHandle(0), "/mbs-session-notify/6"));
    }

    #[test]
    fn test_endpoint_without_path() {
        let endpoint = NotificationEndpoint {
            server: ServerHandle(0),
            url: "http://10.0.0.1:7777".to_string(),
            path: url_path("http://10.0.0.1:7777"),
        };
        assert!(endpoint.path.is_none());
        assert!(endpoint.matches(ServerHandle(0), ""));
        assert!(endpoint.matches(ServerHandle(0), "/"));
        assert!(!endpoint.matches(ServerHandle(0), "/x"));
    }

    #[test]
    fn test_endpoint_is_memoized() {
        let servers = vec![NotificationServer::new("http://127.0.0.1:8080")];
        let mut sub = subscription();
        sub.ensure_endpoint(&servers);
        let first = sub.endpoint().cloned();
        sub.ensure_endpoint(&[NotificationServer::new("http://other:1")]);
        assert_eq!(sub.endpoint().cloned(), first);
        assert_eq!(
            sub.data().notify_uri.as_deref(),
            Some("http://127.0.0.1:8080/mbs-session-notify/5")
        );
    }

    #[test]
    fn test_setters_mark_dirty() {
        let mut sub = subscription();
        sub.dirty = false;
        sub.add_event(MbsSessionEventType::MbsRelTmgiExpiry);
        assert!(sub.is_dirty());

        sub.dirty = false;
        sub.set_notify_callback(Box::new(|_, _: &MbsSessionEventReport| {}));
        assert!(!sub.is_dirty());
    }

    #[test]
    fn test_create_inherits_session_identity() {
        let mut sub = subscription();
        let id = MbsSessionId::default();
        let snapshot = sub.prepare_create(&id, &[]);
        assert_eq!(snapshot.mbs_session_id, Some(id));
        assert!(sub.is_in_flight());
        assert!(!sub.is_dirty());

        sub.confirm("s1".to_string(), None);
        assert_eq!(sub.id(), Some("s1"));
        assert_eq!(sub.acknowledged(), Some(&snapshot));
        assert_eq!(sub.reset_remote().as_deref(), Some("s1"));
        assert!(sub.is_dirty());
    }
}
