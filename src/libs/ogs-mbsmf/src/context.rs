//! MB-SMF Consumer Context
//!
//! Owns every session of the consumer, the index from subscription keys to
//! their session, and the outbox of intents waiting for the transport.
//! There is no global instance: the host creates a [`Context`] and passes it
//! around. Access must be serialized by the host.

use std::collections::{BTreeMap, HashMap};

use crate::config::MbsmfConfig;
use crate::error::{MbsmfError, MbsmfResult};
use crate::intent::{
    Intent, OperationResult, ProblemDetails, SessionCreated, SessionKey, SubscriptionAck,
    SubscriptionKey, TimeoutTarget, TransportEvent,
};
use crate::model::{MbsSessionEventReportList, MbsSessionSubscription, Ssm, Tmgi};
use crate::session::{Disposition, PushOptions, Session, SessionState, SubscriptionOutcome};
use crate::subscription::{ServerHandle, StatusSubscription};

/// MB-SMF consumer context
pub struct Context {
    config: MbsmfConfig,
    /// Sessions, iterated in creation order
    session_list: BTreeMap<SessionKey, Session>,
    /// Acknowledged TMGI -> session
    tmgi_hash: HashMap<Tmgi, SessionKey>,
    /// Subscription -> owning session
    subscription_index: HashMap<SubscriptionKey, SessionKey>,
    next_session_key: u64,
    next_subscription_key: u64,
    outbox: Vec<Intent>,
}

impl Context {
    pub fn new(config: MbsmfConfig) -> Self {
        log::info!(
            "MB-SMF consumer context initialized with max {} sessions",
            config.max_sessions
        );
        Self {
            config,
            session_list: BTreeMap::new(),
            tmgi_hash: HashMap::new(),
            subscription_index: HashMap::new(),
            next_session_key: 1,
            next_subscription_key: 1,
            outbox: Vec::new(),
        }
    }

    /// Drop every session. Registered ones are removed remotely; the
    /// resulting intents stay available through [`Context::take_intents`].
    pub fn close(&mut self) {
        for (key, session) in std::mem::take(&mut self.session_list) {
            if let Some(resource_id) = session.resource_id() {
                self.outbox.push(Intent::RemoveResource {
                    session: key,
                    resource_id: resource_id.to_string(),
                });
            }
        }
        self.tmgi_hash.clear();
        self.subscription_index.clear();
        log::info!("MB-SMF consumer context finalized");
    }

    pub fn config(&self) -> &MbsmfConfig {
        &self.config
    }

    // Session management

    pub fn session_new(&mut self) -> MbsmfResult<SessionKey> {
        if self.session_list.len() >= self.config.max_sessions {
            log::error!(
                "Maximum number of MBS sessions [{}] reached",
                self.config.max_sessions
            );
            return Err(MbsmfError::TooManySessions(self.config.max_sessions));
        }
        let key = SessionKey(self.next_session_key);
        self.next_session_key += 1;
        self.session_list.insert(key, Session::new(key));
        log::debug!("MBS session [{key}] added");
        Ok(key)
    }

    pub fn session(&self, key: SessionKey) -> Option<&Session> {
        self.session_list.get(&key)
    }

    pub fn session_mut(&mut self, key: SessionKey) -> Option<&mut Session> {
        self.session_list.get_mut(&key)
    }

    fn session_entry(&mut self, key: SessionKey) -> MbsmfResult<&mut Session> {
        self.session_list
            .get_mut(&key)
            .ok_or(MbsmfError::SessionNotFound(key))
    }

    /// Mark a session for deletion; teardown happens on the next push
    pub fn session_delete(&mut self, key: SessionKey) -> MbsmfResult<()> {
        self.session_entry(key)?.mark_deleted();
        log::debug!("MBS session [{key}] marked deleted");
        Ok(())
    }

    pub fn session_count(&self) -> usize {
        self.session_list.len()
    }

    pub fn sessions(&self) -> impl Iterator<Item = &Session> {
        self.session_list.values()
    }

    /// Session the MB-SMF knows under `tmgi`
    pub fn session_find_by_tmgi(&self, tmgi: &Tmgi) -> Option<&Session> {
        self.tmgi_hash
            .get(tmgi)
            .and_then(|key| self.session_list.get(key))
    }

    pub fn session_find_by_ssm(&self, ssm: &Ssm) -> Option<&Session> {
        self.session_list
            .values()
            .find(|session| session.data().ssm() == Some(ssm))
    }

    pub fn session_find_by_resource_id(&self, resource_id: &str) -> Option<&Session> {
        self.session_list
            .values()
            .find(|session| session.resource_id() == Some(resource_id))
    }

    fn destroy_session(&mut self, key: SessionKey) {
        let Some(session) = self.session_list.remove(&key) else {
            return;
        };
        self.tmgi_hash.retain(|_, owner| *owner != key);
        self.subscription_index.retain(|_, owner| *owner != key);
        log::info!("MBS session [{key}] removed ({})", session.state());
    }

    /// Drop index entries of subscriptions the session no longer holds
    fn reindex(&mut self, key: SessionKey) {
        let Some(session) = self.session_list.get(&key) else {
            return;
        };
        let held = session.subscription_keys();
        self.subscription_index
            .retain(|sub, owner| *owner != key || held.contains(sub));
    }

    // Subscription management

    /// Attach a new status subscription to a session's pending-new bucket
    pub fn subscription_add(
        &mut self,
        session: SessionKey,
        data: MbsSessionSubscription,
    ) -> MbsmfResult<SubscriptionKey> {
        let key = SubscriptionKey(self.next_subscription_key);
        let owner = self.session_entry(session)?;
        owner.attach_subscription(StatusSubscription::new(key, session, data));
        self.next_subscription_key += 1;
        self.subscription_index.insert(key, session);
        log::debug!("[{session}] subscription [{key}] added");
        Ok(key)
    }

    /// Move a subscription to another session. A registered subscription is
    /// deleted remotely first and created again under its new session.
    pub fn subscription_transfer(
        &mut self,
        key: SubscriptionKey,
        to: SessionKey,
    ) -> MbsmfResult<()> {
        let from = self.owner_of(key)?;
        if !self.session_list.contains_key(&to) {
            return Err(MbsmfError::SessionNotFound(to));
        }
        let mut sub = self
            .session_entry(from)?
            .detach_subscription(key)
            .ok_or(MbsmfError::SubscriptionNotFound(key))?;
        if let Some(subscription_id) = sub.reset_remote() {
            log::debug!("subscription [{key}] id {subscription_id} deleted before transfer");
            self.outbox
                .push(Intent::DeleteSubscription { subscription_id });
        }
        // in_flight was reset as well, so a late create answer is an orphan
        self.session_entry(to)?.attach_subscription(sub);
        self.subscription_index.insert(key, to);
        log::debug!("subscription [{key}] moved from [{from}] to [{to}]");
        Ok(())
    }

    pub fn subscription_remove(&mut self, key: SubscriptionKey) -> MbsmfResult<()> {
        let owner = self.owner_of(key)?;
        let queued = self.session_entry(owner)?.remove_subscription(key)?;
        if !queued {
            self.subscription_index.remove(&key);
        }
        Ok(())
    }

    /// Apply a local change to a subscription; marks it and its session dirty
    pub fn subscription_update<F>(&mut self, key: SubscriptionKey, f: F) -> MbsmfResult<()>
    where
        F: FnOnce(&mut StatusSubscription),
    {
        let owner = self.owner_of(key)?;
        let session = self.session_entry(owner)?;
        let sub = session
            .subscription_mut(key)
            .ok_or(MbsmfError::SubscriptionNotFound(key))?;
        f(sub);
        sub.mark_dirty();
        session.mark_dirty();
        Ok(())
    }

    pub fn subscription(&self, key: SubscriptionKey) -> Option<&StatusSubscription> {
        let owner = self.subscription_index.get(&key)?;
        self.session_list.get(owner)?.subscription(key)
    }

    fn owner_of(&self, key: SubscriptionKey) -> MbsmfResult<SessionKey> {
        self.subscription_index
            .get(&key)
            .copied()
            .ok_or(MbsmfError::SubscriptionNotFound(key))
    }

    // Reconciliation

    /// Reconcile one session
    pub fn push(&mut self, key: SessionKey) -> MbsmfResult<()> {
        let options = PushOptions {
            session_body_patch: self.config.session_body_patch,
            notification_servers: &self.config.notification_servers,
        };
        let session = self
            .session_list
            .get_mut(&key)
            .ok_or(MbsmfError::SessionNotFound(key))?;
        let before = self.outbox.len();
        let disposition = session.push(&options, &mut self.outbox);
        log::debug!("[{key}] push emitted {} intents", self.outbox.len() - before);

        match disposition {
            Disposition::Destroy => self.destroy_session(key),
            Disposition::Keep => self.reindex(key),
        }
        Ok(())
    }

    /// Reconcile every session, in creation order
    pub fn push_all(&mut self) {
        let keys: Vec<SessionKey> = self.session_list.keys().copied().collect();
        for key in keys {
            if let Err(e) = self.push(key) {
                log::warn!("push [{key}] failed: {e}");
            }
        }
    }

    /// Hand the emitted intents over to the transport
    pub fn take_intents(&mut self) -> Vec<Intent> {
        std::mem::take(&mut self.outbox)
    }

    pub fn pending_intents(&self) -> &[Intent] {
        &self.outbox
    }

    // Transport callbacks

    pub fn handle_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::CreateResult { session, result } => {
                self.on_create_result(session, result)
            }
            TransportEvent::PatchResult { session, result } => {
                self.on_patch_result(session, result)
            }
            TransportEvent::SubscriptionCreated {
                subscription,
                result,
            } => self.on_subscription_created(subscription, result.map_err(OperationResult::Error)),
            TransportEvent::SubscriptionUpdated {
                subscription,
                result,
            } => self.on_subscription_updated(subscription, result.map_err(OperationResult::Error)),
            TransportEvent::Timeout(target) => self.on_timeout(target),
        }
    }

    pub fn on_create_result(
        &mut self,
        key: SessionKey,
        result: Result<SessionCreated, ProblemDetails>,
    ) {
        let waiting = self
            .session_list
            .get(&key)
            .is_some_and(|session| session.state() == SessionState::CreatePending);
        if !waiting {
            match result {
                Ok(created) => {
                    log::warn!(
                        "[{key}] create answer for a session no longer waiting, removing {}",
                        created.resource_id
                    );
                    self.outbox.push(Intent::RemoveResource {
                        session: key,
                        resource_id: created.resource_id,
                    });
                    if let Some(subscription_id) = created.subscription_id {
                        self.outbox
                            .push(Intent::DeleteSubscription { subscription_id });
                    }
                }
                Err(problem) => {
                    log::warn!("[{key}] ignoring create failure {problem} for unknown session")
                }
            }
            return;
        }

        let Some(session) = self.session_list.get_mut(&key) else {
            return;
        };
        session.on_create_result(result);
        if let Some(tmgi) = session.acknowledged_tmgi().cloned() {
            self.tmgi_hash.retain(|_, owner| *owner != key);
            self.tmgi_hash.insert(tmgi, key);
        }
        self.reindex(key);
    }

    pub fn on_patch_result(&mut self, key: SessionKey, result: Result<(), ProblemDetails>) {
        match self.session_list.get_mut(&key) {
            Some(session) => session.on_patch_result(result),
            None => log::warn!("[{key}] patch answer for unknown session"),
        }
    }

    pub fn on_subscription_created(
        &mut self,
        key: SubscriptionKey,
        result: Result<SubscriptionAck, OperationResult>,
    ) {
        let outcome = match self.subscription_index.get(&key).copied() {
            Some(owner) => self
                .session_list
                .get_mut(&owner)
                .map_or(SubscriptionOutcome::NotInFlight, |session| {
                    session.on_subscription_created(key, result.clone())
                }),
            None => SubscriptionOutcome::NotInFlight,
        };
        if outcome == SubscriptionOutcome::NotInFlight {
            if let Ok(ack) = result {
                log::warn!(
                    "subscription [{key}] created as {} but no longer wanted, deleting",
                    ack.id
                );
                self.outbox.push(Intent::DeleteSubscription {
                    subscription_id: ack.id,
                });
            }
        }
    }

    pub fn on_subscription_updated(
        &mut self,
        key: SubscriptionKey,
        result: Result<SubscriptionAck, OperationResult>,
    ) {
        let applied = self
            .subscription_index
            .get(&key)
            .copied()
            .and_then(|owner| self.session_list.get_mut(&owner))
            .map(|session| session.on_subscription_updated(key, result));
        if applied != Some(SubscriptionOutcome::Applied) {
            log::warn!("subscription [{key}] update answer ignored");
        }
    }

    pub fn on_timeout(&mut self, target: TimeoutTarget) {
        match target {
            TimeoutTarget::CreateResource(key) => {
                let disposition = match self.session_list.get_mut(&key) {
                    Some(session) if session.state() == SessionState::CreatePending => {
                        session.on_create_timeout()
                    }
                    _ => {
                        log::warn!("[{key}] create timeout for a session not waiting");
                        return;
                    }
                };
                if disposition == Disposition::Destroy {
                    self.destroy_session(key);
                }
            }
            TimeoutTarget::PatchResource(key) => match self.session_list.get_mut(&key) {
                Some(session) => session.on_patch_timeout(),
                None => log::warn!("[{key}] patch timeout for unknown session"),
            },
            TimeoutTarget::CreateSubscription(key) => {
                self.on_subscription_created(key, Err(OperationResult::TimedOut))
            }
            TimeoutTarget::UpdateSubscription(key) => {
                self.on_subscription_updated(key, Err(OperationResult::TimedOut))
            }
        }
    }

    // Correlation index

    fn candidates(&self) -> impl Iterator<Item = &StatusSubscription> {
        self.session_list
            .values()
            .flat_map(|session| session.pending_new().chain(session.active()))
    }

    /// Subscription whose notification endpoint is `path` on `server`
    pub fn find_by_endpoint(&self, server: ServerHandle, path: &str) -> Option<&StatusSubscription> {
        self.candidates()
            .find(|sub| sub.matches_endpoint(server, path))
    }

    pub fn find_by_correlation_id(&self, correlation_id: &str) -> Option<&StatusSubscription> {
        self.candidates()
            .find(|sub| sub.matches_correlation_id(correlation_id))
    }

    /// Route an inbound notification to its subscription's callback.
    /// Returns the number of reports delivered, `None` when not ours.
    pub fn notify(
        &mut self,
        server: ServerHandle,
        path: &str,
        reports: &MbsSessionEventReportList,
    ) -> Option<usize> {
        let sub = self
            .find_by_endpoint(server, path)
            .or_else(|| {
                reports
                    .notify_correlation_id
                    .as_deref()
                    .and_then(|id| self.find_by_correlation_id(id))
            })?;
        let (key, owner) = (sub.key(), sub.session());

        let sub = self.session_list.get_mut(&owner)?.subscription_mut(key)?;
        let delivered = reports
            .event_list
            .iter()
            .filter(|report| sub.deliver(report))
            .count();
        log::debug!("subscription [{key}] received {delivered} event reports");
        Some(delivered)
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new(MbsmfConfig::default())
    }
}
