//! Session Reconciliation
//!
//! A [`Session`] wraps the [`MbsSession`] record with the local state needed
//! to keep the MB-SMF in step with it, and owns the session's status
//! subscriptions in three buckets: pending-new, active (by assigned id) and
//! pending-delete.
//!
//! Pushing a session inspects that state and emits the [`Intent`]s turning
//! the remote resource into the local one:
//!
//! 1. a deleted session is removed remotely and destroyed locally;
//! 2. a session never created is created, bundling its first pending
//!    subscription;
//! 3. a registered session whose SSM or TMGI differs from the acknowledged
//!    one is removed and created again;
//! 4. a clean session is left alone;
//! 5. otherwise its subscriptions are reconciled (and the body patched when
//!    enabled).

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};

use crate::config::NotificationServer;
use crate::diff::{diff, diff_values};
use crate::encode::FsaId;
use crate::error::{MbsmfError, MbsmfResult};
use crate::intent::{
    BundledSubscription, Intent, OperationResult, ProblemDetails, SessionCreated, SessionKey,
    SessionResultCallback, SubscriptionAck, SubscriptionKey,
};
use crate::model::{
    ExtMbsServiceArea, MbsMediaComp, MbsServiceArea, MbsServiceInfo, MbsSession, MbsSessionType,
    Ssm, Tmgi, TunnelAddress,
};
use crate::subscription::StatusSubscription;

/// Remote lifecycle of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// Not known to the MB-SMF
    #[default]
    Local,
    /// Create request outstanding
    CreatePending,
    Registered,
    /// Marked deleted, waiting for the next push
    PendingDelete,
    Gone,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Local => "LOCAL",
            Self::CreatePending => "CREATE_PENDING",
            Self::Registered => "REGISTERED",
            Self::PendingDelete => "PENDING_DELETE",
            Self::Gone => "GONE",
        };
        f.write_str(name)
    }
}

/// Subscription bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bucket {
    PendingNew,
    Active,
    PendingDelete,
}

/// Options a push runs with
#[derive(Debug, Clone, Copy)]
pub(crate) struct PushOptions<'a> {
    pub session_body_patch: bool,
    pub notification_servers: &'a [NotificationServer],
}

/// What the owner has to do with the session after a push or callback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Disposition {
    Keep,
    Destroy,
}

/// Result of a subscription callback routed to its session
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum SubscriptionOutcome {
    Applied,
    /// No matching request outstanding; a created remote subscription is an orphan
    NotInFlight,
}

/// MBS session aggregate
pub struct Session {
    key: SessionKey,
    data: MbsSession,
    resource_id: Option<String>,
    state: SessionState,
    dirty: bool,
    deleted: bool,
    prev_ssm: Option<Ssm>,
    prev_tmgi: Option<Tmgi>,
    acked: Option<MbsSession>,
    /// Body sent by the outstanding create
    creating: Option<MbsSession>,
    /// Body sent by the outstanding patch
    patching: Option<MbsSession>,
    /// Subscription carried by the outstanding create
    bundled: Option<SubscriptionKey>,
    pending_new: Vec<StatusSubscription>,
    active: BTreeMap<String, StatusSubscription>,
    pending_delete: Vec<(String, StatusSubscription)>,
    ingress_tun_addrs: Vec<TunnelAddress>,
    expiration_time: Option<DateTime<Utc>>,
    result_cb: Option<SessionResultCallback>,
}

impl Session {
    pub(crate) fn new(key: SessionKey) -> Self {
        Self {
            key,
            data: MbsSession::default(),
            resource_id: None,
            state: SessionState::Local,
            dirty: true,
            deleted: false,
            prev_ssm: None,
            prev_tmgi: None,
            acked: None,
            creating: None,
            patching: None,
            bundled: None,
            pending_new: Vec::new(),
            active: BTreeMap::new(),
            pending_delete: Vec::new(),
            ingress_tun_addrs: Vec::new(),
            expiration_time: None,
            result_cb: None,
        }
    }

    pub fn key(&self) -> SessionKey {
        self.key
    }

    pub fn data(&self) -> &MbsSession {
        &self.data
    }

    /// Resource id assigned by the MB-SMF
    pub fn resource_id(&self) -> Option<&str> {
        self.resource_id.as_deref()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted
    }

    /// SSM the MB-SMF last acknowledged
    pub fn acknowledged_ssm(&self) -> Option<&Ssm> {
        self.prev_ssm.as_ref()
    }

    /// TMGI the MB-SMF last acknowledged
    pub fn acknowledged_tmgi(&self) -> Option<&Tmgi> {
        self.prev_tmgi.as_ref()
    }

    pub fn acknowledged(&self) -> Option<&MbsSession> {
        self.acked.as_ref()
    }

    pub fn ingress_tun_addrs(&self) -> &[TunnelAddress] {
        &self.ingress_tun_addrs
    }

    pub fn expiration_time(&self) -> Option<DateTime<Utc>> {
        self.expiration_time
    }

    // Setters. Every one of them marks the session dirty.

    /// Apply an arbitrary change to the record
    pub fn update<F: FnOnce(&mut MbsSession)>(&mut self, f: F) {
        f(&mut self.data);
        self.dirty = true;
    }

    pub fn set_ssm(&mut self, ssm: Option<Ssm>) {
        self.data.mbs_session_id.ssm = ssm;
        self.dirty = true;
    }

    /// Setting a TMGI withdraws a pending TMGI allocation request
    pub fn set_tmgi(&mut self, tmgi: Option<Tmgi>) {
        if tmgi.is_some() {
            self.data.tmgi_alloc_req = false;
        }
        self.data.mbs_session_id.tmgi = tmgi;
        self.dirty = true;
    }

    pub fn set_tmgi_alloc_req(&mut self, request: bool) {
        self.data.tmgi_alloc_req = request;
        self.dirty = true;
    }

    /// Frequency selection areas only exist for broadcast sessions
    pub fn set_service_type(&mut self, service_type: MbsSessionType) {
        if service_type == MbsSessionType::Multicast {
            self.data.mbs_fsa_id_list.0.clear();
        }
        self.data.service_type = service_type;
        self.dirty = true;
    }

    pub fn set_location_dependent(&mut self, location_dependent: bool) {
        if !location_dependent {
            self.data.area_session_id = None;
        }
        self.data.location_dependent = location_dependent;
        self.dirty = true;
    }

    pub fn set_area_session_id(&mut self, area_session_id: Option<u16>) {
        self.data.area_session_id = area_session_id;
        self.dirty = true;
    }

    pub fn set_ingress_tun_addr_req(&mut self, request: bool) {
        self.data.ingress_tun_addr_req = request;
        self.dirty = true;
    }

    pub fn set_service_area(&mut self, area: Option<MbsServiceArea>) {
        self.data.mbs_service_area = area;
        self.dirty = true;
    }

    pub fn set_ext_service_area(&mut self, area: Option<ExtMbsServiceArea>) {
        self.data.ext_mbs_service_area = area;
        self.dirty = true;
    }

    pub fn set_service_info(&mut self, info: Option<MbsServiceInfo>) {
        self.data.mbs_serv_info = info;
        self.dirty = true;
    }

    pub fn add_media_comp(&mut self, comp: MbsMediaComp) {
        self.data
            .mbs_serv_info
            .get_or_insert_with(MbsServiceInfo::default)
            .add_media_comp(comp);
        self.dirty = true;
    }

    pub fn remove_media_comp(&mut self, num: u32) -> Option<MbsMediaComp> {
        let removed = self
            .data
            .mbs_serv_info
            .as_mut()
            .and_then(|info| info.remove_media_comp(num));
        if removed.is_some() {
            self.dirty = true;
        }
        removed
    }

    pub fn set_fsa_ids(&mut self, ids: Vec<FsaId>) -> MbsmfResult<()> {
        if !ids.is_empty() && !self.data.is_broadcast() {
            return Err(MbsmfError::invalid(
                "mbsFsaIdList",
                "only allowed for broadcast sessions",
            ));
        }
        self.data.mbs_fsa_id_list = ids.into();
        self.dirty = true;
        Ok(())
    }

    pub fn set_associated_session_id(&mut self, id: Option<String>) {
        self.data.associated_session_id = id;
        self.dirty = true;
    }

    pub fn set_start_time(&mut self, time: Option<DateTime<Utc>>) {
        self.data.start_time = time;
        self.dirty = true;
    }

    pub fn set_termination_time(&mut self, time: Option<DateTime<Utc>>) {
        self.data.termination_time = time;
        self.dirty = true;
    }

    pub fn set_result_callback(&mut self, cb: SessionResultCallback) {
        self.result_cb = Some(cb);
    }

    /// Teardown happens on the next push
    ///
    /// A session deleted while its create is outstanding leaves
    /// `CreatePending` too, so the create answer finds it not waiting and
    /// removes the resource as an orphan.
    pub(crate) fn mark_deleted(&mut self) {
        self.deleted = true;
        self.dirty = true;
        if self.state != SessionState::Gone {
            self.state = SessionState::PendingDelete;
        }
    }

    pub(crate) fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    // Subscription buckets

    pub fn pending_new(&self) -> impl Iterator<Item = &StatusSubscription> {
        self.pending_new.iter()
    }

    pub fn active(&self) -> impl Iterator<Item = &StatusSubscription> {
        self.active.values()
    }

    pub fn pending_delete(&self) -> impl Iterator<Item = &StatusSubscription> {
        self.pending_delete.iter().map(|(_, sub)| sub)
    }

    pub fn bucket_of(&self, key: SubscriptionKey) -> Option<Bucket> {
        if self.pending_new.iter().any(|sub| sub.key() == key) {
            Some(Bucket::PendingNew)
        } else if self.active.values().any(|sub| sub.key() == key) {
            Some(Bucket::Active)
        } else if self.pending_delete.iter().any(|(_, sub)| sub.key() == key) {
            Some(Bucket::PendingDelete)
        } else {
            None
        }
    }

    /// Subscription in the pending-new or active bucket
    pub fn subscription(&self, key: SubscriptionKey) -> Option<&StatusSubscription> {
        self.pending_new
            .iter()
            .chain(self.active.values())
            .find(|sub| sub.key() == key)
    }

    pub(crate) fn subscription_mut(&mut self, key: SubscriptionKey) -> Option<&mut StatusSubscription> {
        self.pending_new
            .iter_mut()
            .chain(self.active.values_mut())
            .find(|sub| sub.key() == key)
    }

    /// Keys of every subscription held, in any bucket
    pub fn subscription_keys(&self) -> Vec<SubscriptionKey> {
        self.pending_new
            .iter()
            .chain(self.active.values())
            .chain(self.pending_delete.iter().map(|(_, sub)| sub))
            .map(StatusSubscription::key)
            .collect()
    }

    pub(crate) fn attach_subscription(&mut self, mut sub: StatusSubscription) {
        sub.attach(self.key);
        self.pending_new.push(sub);
        self.dirty = true;
    }

    /// Take a pending-new or active subscription out of its bucket
    pub(crate) fn detach_subscription(&mut self, key: SubscriptionKey) -> Option<StatusSubscription> {
        if let Some(pos) = self.pending_new.iter().position(|sub| sub.key() == key) {
            if self.bundled == Some(key) {
                self.bundled = None;
            }
            return Some(self.pending_new.remove(pos));
        }
        let id = self
            .active
            .iter()
            .find(|(_, sub)| sub.key() == key)
            .map(|(id, _)| id.clone())?;
        self.active.remove(&id)
    }

    /// Withdraw a subscription. Registered ones are deleted on the next
    /// push, others vanish at once. Returns whether a remote delete is queued.
    pub(crate) fn remove_subscription(&mut self, key: SubscriptionKey) -> MbsmfResult<bool> {
        let Some(mut sub) = self.detach_subscription(key) else {
            return Err(MbsmfError::SubscriptionNotFound(key));
        };
        match sub.reset_remote() {
            Some(id) => {
                log::debug!("[{}] subscription [{key}] id {id} pending delete", self.key);
                self.pending_delete.push((id, sub));
                self.dirty = true;
                Ok(true)
            }
            None => {
                log::debug!("[{}] subscription [{key}] dropped before registration", self.key);
                Ok(false)
            }
        }
    }

    fn identity_changed(&self) -> bool {
        self.data.ssm() != self.prev_ssm.as_ref() || self.data.tmgi() != self.prev_tmgi.as_ref()
    }

    /// Run one reconciliation step
    pub(crate) fn push(&mut self, options: &PushOptions<'_>, out: &mut Vec<Intent>) -> Disposition {
        if self.deleted {
            if let Some(resource_id) = self.resource_id.take() {
                log::info!("[{}] remove MBS session resource {resource_id}", self.key);
                out.push(Intent::RemoveResource {
                    session: self.key,
                    resource_id,
                });
            }
            self.state = SessionState::Gone;
            self.pending_new.clear();
            self.active.clear();
            self.pending_delete.clear();
            return Disposition::Destroy;
        }

        match self.state {
            SessionState::Local => {
                if self.dirty {
                    self.emit_create(options, out);
                }
                return Disposition::Keep;
            }
            SessionState::CreatePending => {
                log::debug!("[{}] create outstanding, push deferred", self.key);
                return Disposition::Keep;
            }
            _ => {}
        }

        if self.identity_changed() {
            log::info!(
                "[{}] identity changed to [{}], recreating",
                self.key,
                self.data.mbs_session_id
            );
            if let Some(resource_id) = self.resource_id.take() {
                out.push(Intent::RemoveResource {
                    session: self.key,
                    resource_id,
                });
            }
            self.requeue_subscriptions();
            self.acked = None;
            self.patching = None;
            self.emit_create(options, out);
            return Disposition::Keep;
        }

        if !self.dirty {
            return Disposition::Keep;
        }
        self.dirty = false;

        if options.session_body_patch {
            self.emit_body_patch(out);
        }
        self.reconcile_subscriptions(options, out);
        Disposition::Keep
    }

    fn emit_create(&mut self, options: &PushOptions<'_>, out: &mut Vec<Intent>) {
        self.dirty = false;
        self.state = SessionState::CreatePending;

        let session_id = self.data.mbs_session_id.clone();
        let bundled = self
            .pending_new
            .iter_mut()
            .find(|sub| sub.is_dirty() && !sub.is_in_flight())
            .map(|sub| BundledSubscription {
                key: sub.key(),
                snapshot: sub.prepare_create(&session_id, options.notification_servers),
            });
        self.bundled = bundled.as_ref().map(|b| b.key);

        log::info!(
            "[{}] create MBS session [{}]{}",
            self.key,
            session_id,
            match &bundled {
                Some(b) => format!(" with subscription [{}]", b.key),
                None => String::new(),
            }
        );
        self.creating = Some(self.data.clone());
        out.push(Intent::CreateResource {
            session: self.key,
            snapshot: self.data.clone(),
            subscription: bundled,
        });
    }

    fn emit_body_patch(&mut self, out: &mut Vec<Intent>) {
        let (Some(acked), Some(resource_id)) = (&self.acked, &self.resource_id) else {
            return;
        };
        if self.patching.is_some() {
            log::debug!("[{}] patch outstanding, body change deferred", self.key);
            self.dirty = true;
            return;
        }
        let ops = diff_values(acked, &self.data);
        if ops.is_empty() {
            return;
        }
        log::debug!("[{}] patch MBS session with {} ops", self.key, ops.len());
        out.push(Intent::PatchResource {
            session: self.key,
            resource_id: resource_id.clone(),
            ops,
        });
        self.patching = Some(self.data.clone());
    }

    /// The old resource took its subscriptions with it
    fn requeue_subscriptions(&mut self) {
        // Answers to creates sent against the old resource no longer apply
        for sub in self.pending_new.iter_mut() {
            sub.reset_remote();
        }
        let active = std::mem::take(&mut self.active);
        for (id, mut sub) in active {
            log::debug!("[{}] subscription {id} requeued", self.key);
            sub.reset_remote();
            self.pending_new.push(sub);
        }
        for (id, _) in self.pending_delete.drain(..) {
            log::debug!("[{}] subscription {id} went with the old resource", self.key);
        }
    }

    fn reconcile_subscriptions(&mut self, options: &PushOptions<'_>, out: &mut Vec<Intent>) {
        let Some(resource_id) = self.resource_id.clone() else {
            return;
        };
        let session_id = self.data.mbs_session_id.clone();

        for sub in self.pending_new.iter_mut() {
            if !sub.is_dirty() || sub.is_in_flight() {
                continue;
            }
            log::debug!("[{}] create subscription [{}]", self.key, sub.key());
            out.push(Intent::CreateSubscription {
                session: self.key,
                subscription: sub.key(),
                resource_id: resource_id.clone(),
                snapshot: sub.prepare_create(&session_id, options.notification_servers),
            });
        }

        for (id, sub) in self.active.iter_mut() {
            if !sub.is_dirty() || sub.is_in_flight() {
                continue;
            }
            let ops = diff(sub.acknowledged(), Some(sub.data()));
            if ops.is_empty() {
                sub.mark_clean();
                continue;
            }
            log::debug!("[{}] update subscription {id} with {} ops", self.key, ops.len());
            sub.prepare_update();
            out.push(Intent::UpdateSubscription {
                subscription: sub.key(),
                subscription_id: id.clone(),
                ops,
            });
        }

        for (id, sub) in self.pending_delete.drain(..) {
            log::debug!("[{}] delete subscription [{}] id {id}", self.key, sub.key());
            out.push(Intent::DeleteSubscription {
                subscription_id: id,
            });
        }
    }

    fn report(&mut self, result: &OperationResult) {
        if let Some(cb) = self.result_cb.as_mut() {
            cb(self.key, result);
        }
    }

    pub(crate) fn on_create_result(
        &mut self,
        result: Result<SessionCreated, ProblemDetails>,
    ) -> Disposition {
        let bundled = self.bundled.take();
        let snapshot = self.creating.take();
        match result {
            Ok(created) => {
                log::info!(
                    "[{}] MBS session created, resource {}",
                    self.key,
                    created.resource_id
                );
                self.state = SessionState::Registered;
                self.resource_id = Some(created.resource_id);
                self.ingress_tun_addrs = created.ingress_tun_addrs;
                self.expiration_time = created.expiration_time;

                let mut acked = snapshot.unwrap_or_else(|| self.data.clone());
                if let Some(tmgi) = created.tmgi {
                    // Keep a TMGI set locally while the create was outstanding
                    if self.data.tmgi().is_none() {
                        self.data.mbs_session_id.tmgi = Some(tmgi.clone());
                        self.data.tmgi_alloc_req = false;
                    }
                    acked.mbs_session_id.tmgi = Some(tmgi);
                    acked.tmgi_alloc_req = false;
                }
                self.prev_ssm = acked.mbs_session_id.ssm;
                self.prev_tmgi = acked.mbs_session_id.tmgi.clone();
                self.acked = Some(acked);

                if let Some(key) = bundled {
                    self.settle_bundled(key, created.subscription_id);
                }
                // Subscriptions that did not ride on the create go out next push
                if self
                    .pending_new
                    .iter()
                    .chain(self.active.values())
                    .any(StatusSubscription::is_dirty)
                {
                    self.dirty = true;
                }
                self.report(&OperationResult::Ok);
                Disposition::Keep
            }
            Err(problem) => {
                log::error!("[{}] MBS session create rejected {problem}", self.key);
                self.state = SessionState::Local;
                self.dirty = true;
                let result = OperationResult::Error(problem);
                if let Some(sub) = bundled.and_then(|key| self.subscription_mut(key)) {
                    sub.fail();
                    sub.report(&result);
                }
                self.report(&result);
                Disposition::Keep
            }
        }
    }

    fn settle_bundled(&mut self, key: SubscriptionKey, id: Option<String>) {
        let Some(pos) = self.pending_new.iter().position(|sub| sub.key() == key) else {
            return;
        };
        match id {
            Some(id) => {
                let mut sub = self.pending_new.remove(pos);
                log::debug!("[{}] bundled subscription [{key}] active as {id}", self.key);
                sub.confirm(id.clone(), None);
                sub.report(&OperationResult::Ok);
                self.active.insert(id, sub);
            }
            None => {
                log::warn!(
                    "[{}] create answer carries no id for bundled subscription [{key}]",
                    self.key
                );
                self.pending_new[pos].fail();
                self.dirty = true;
            }
        }
    }

    pub(crate) fn on_create_timeout(&mut self) -> Disposition {
        log::error!("[{}] MBS session create timed out", self.key);
        self.creating = None;
        if let Some(sub) = self.bundled.take().and_then(|key| self.subscription_mut(key)) {
            sub.fail();
            sub.report(&OperationResult::TimedOut);
        }
        self.report(&OperationResult::TimedOut);
        self.state = SessionState::Gone;
        Disposition::Destroy
    }

    /// Patch answers count only for the registered resource they were sent to
    fn take_patch(&mut self) -> Option<MbsSession> {
        if self.state != SessionState::Registered {
            log::warn!("[{}] patch answer ignored in state {}", self.key, self.state);
            return None;
        }
        let snapshot = self.patching.take();
        if snapshot.is_none() {
            log::warn!("[{}] patch answer with no patch outstanding", self.key);
        }
        snapshot
    }

    pub(crate) fn on_patch_result(&mut self, result: Result<(), ProblemDetails>) {
        let Some(snapshot) = self.take_patch() else {
            return;
        };
        match result {
            Ok(()) => {
                log::debug!("[{}] MBS session patched", self.key);
                self.acked = Some(snapshot);
                self.report(&OperationResult::Ok);
            }
            Err(problem) => {
                log::error!("[{}] MBS session patch rejected {problem}", self.key);
                self.dirty = true;
                self.report(&OperationResult::Error(problem));
            }
        }
    }

    pub(crate) fn on_patch_timeout(&mut self) {
        if self.take_patch().is_none() {
            return;
        }
        log::error!("[{}] MBS session patch timed out", self.key);
        self.dirty = true;
        self.report(&OperationResult::TimedOut);
    }

    pub(crate) fn on_subscription_created(
        &mut self,
        key: SubscriptionKey,
        result: Result<SubscriptionAck, OperationResult>,
    ) -> SubscriptionOutcome {
        // A bundled subscription is answered through the create
        if self.state != SessionState::Registered {
            return SubscriptionOutcome::NotInFlight;
        }
        let Some(pos) = self
            .pending_new
            .iter()
            .position(|sub| sub.key() == key && sub.is_in_flight())
        else {
            return SubscriptionOutcome::NotInFlight;
        };
        match result {
            Ok(ack) => {
                let mut sub = self.pending_new.remove(pos);
                log::info!("[{}] subscription [{key}] created as {}", self.key, ack.id);
                sub.confirm(ack.id.clone(), ack.expiry_time);
                sub.report(&OperationResult::Ok);
                // Changed while the create was outstanding
                if sub.is_dirty() {
                    self.dirty = true;
                }
                self.active.insert(ack.id, sub);
            }
            Err(failure) => {
                log::error!("[{}] subscription [{key}] create {failure}", self.key);
                let sub = &mut self.pending_new[pos];
                sub.fail();
                sub.report(&failure);
                self.dirty = true;
            }
        }
        SubscriptionOutcome::Applied
    }

    pub(crate) fn on_subscription_updated(
        &mut self,
        key: SubscriptionKey,
        result: Result<SubscriptionAck, OperationResult>,
    ) -> SubscriptionOutcome {
        let Some(sub) = self
            .active
            .values_mut()
            .find(|sub| sub.key() == key && sub.is_in_flight())
        else {
            return SubscriptionOutcome::NotInFlight;
        };
        match result {
            Ok(ack) => {
                log::debug!("[{}] subscription [{key}] updated", self.key);
                sub.confirm_update(ack.expiry_time);
                sub.report(&OperationResult::Ok);
                if sub.is_dirty() {
                    self.dirty = true;
                }
            }
            Err(failure) => {
                log::error!("[{}] subscription [{key}] update {failure}", self.key);
                sub.fail();
                sub.report(&failure);
                self.dirty = true;
            }
        }
        SubscriptionOutcome::Applied
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("key", &self.key)
            .field("state", &self.state)
            .field("resource_id", &self.resource_id)
            .field("dirty", &self.dirty)
            .field("deleted", &self.deleted)
            .field("pending_new", &self.pending_new.len())
            .field("active", &self.active.len())
            .field("pending_delete", &self.pending_delete.len())
            .field("data", &self.data)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{MbsSessionSubscription, PlmnId};

    const OPTIONS: PushOptions<'static> = PushOptions {
        session_body_patch: false,
        notification_servers: &[],
    };

    fn ssm(dest: &str) -> Ssm {
        Ssm::new("10.0.0.1".parse().unwrap(), dest.parse().unwrap()).unwrap()
    }

    fn registered(ssm_dest: &str) -> Session {
        let mut session = Session::new(SessionKey(1));
        session.set_ssm(Some(ssm(ssm_dest)));
        let mut out = Vec::new();
        session.push(&OPTIONS, &mut out);
        session.on_create_result(Ok(SessionCreated::new("res-1")));
        session
    }

    fn sub(key: u64) -> StatusSubscription {
        StatusSubscription::new(SubscriptionKey(key), SessionKey(1), MbsSessionSubscription::default())
    }

    #[test]
    fn test_new_session_creates_once() {
        let mut session = Session::new(SessionKey(1));
        let mut out = Vec::new();
        assert_eq!(session.push(&OPTIONS, &mut out), Disposition::Keep);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].name(), "CreateResource");
        assert_eq!(session.state(), SessionState::CreatePending);

        // Mutations while the create is outstanding wait for the answer
        session.set_area_session_id(Some(3));
        session.push(&OPTIONS, &mut out);
        assert_eq!(out.len(), 1);
        assert!(session.is_dirty());
    }

    #[test]
    fn test_identity_snapshot_only_moves_on_ack() {
        let mut session = Session::new(SessionKey(1));
        session.set_ssm(Some(ssm("232.1.1.1")));
        assert!(session.acknowledged_ssm().is_none());

        let mut out = Vec::new();
        session.push(&OPTIONS, &mut out);
        assert!(session.acknowledged_ssm().is_none());

        session.on_create_result(Ok(SessionCreated::new("res-1")));
        assert_eq!(session.acknowledged_ssm(), Some(&ssm("232.1.1.1")));
        assert_eq!(session.resource_id(), Some("res-1"));
        assert_eq!(session.state(), SessionState::Registered);
        assert!(!session.is_dirty());
    }

    #[test]
    fn test_ssm_change_recreates() {
        let mut session = registered("232.1.1.1");
        session.set_ssm(Some(ssm("232.1.1.2")));

        let mut out = Vec::new();
        session.push(&OPTIONS, &mut out);
        let names: Vec<&str> = out.iter().map(Intent::name).collect();
        assert_eq!(names, vec!["RemoveResource", "CreateResource"]);
        assert_eq!(session.acknowledged_ssm(), Some(&ssm("232.1.1.1")));
        assert!(session.resource_id().is_none());
    }

    #[test]
    fn test_allocated_tmgi_is_not_an_identity_change() {
        let mut session = Session::new(SessionKey(1));
        session.set_tmgi_alloc_req(true);
        let mut out = Vec::new();
        session.push(&OPTIONS, &mut out);

        let tmgi = Tmgi::new("0000AB", PlmnId::new("001", "01"));
        let mut created = SessionCreated::new("res-1");
        created.tmgi = Some(tmgi.clone());
        session.on_create_result(Ok(created));
        assert_eq!(session.data().tmgi(), Some(&tmgi));
        assert!(!session.data().tmgi_alloc_req);

        out.clear();
        session.push(&OPTIONS, &mut out);
        assert!(out.is_empty());
    }

    #[test]
    fn test_body_change_dropped_without_patch_option() {
        let mut session = registered("232.1.1.1");
        session.set_area_session_id(Some(9));
        let mut out = Vec::new();
        session.push(&OPTIONS, &mut out);
        assert!(out.is_empty());
        assert!(!session.is_dirty());
    }

    #[test]
    fn test_body_change_patched_with_option() {
        let options = PushOptions {
            session_body_patch: true,
            notification_servers: &[],
        };
        let mut session = registered("232.1.1.1");
        session.set_location_dependent(true);
        session.set_area_session_id(Some(9));
        let mut out = Vec::new();
        session.push(&options, &mut out);
        assert_eq!(out.len(), 1);
        let Intent::PatchResource { ops, resource_id, .. } = &out[0] else {
            panic!("expected a patch, got {}", out[0]);
        };
        assert_eq!(resource_id, "res-1");
        let paths: Vec<&str> = ops.iter().map(|op| op.path.as_str()).collect();
        assert_eq!(paths, vec!["/locationDependent", "/areaSessionId"]);

        session.on_patch_result(Ok(()));
        out.clear();
        session.mark_dirty();
        session.push(&options, &mut out);
        assert!(out.is_empty());
    }

    #[test]
    fn test_create_rejected_returns_to_local() {
        let mut session = Session::new(SessionKey(1));
        session.attach_subscription(sub(7));
        let mut out = Vec::new();
        session.push(&OPTIONS, &mut out);
        let Intent::CreateResource { subscription, .. } = &out[0] else {
            panic!("expected a create");
        };
        assert_eq!(subscription.as_ref().map(|b| b.key), Some(SubscriptionKey(7)));

        session.on_create_result(Err(ProblemDetails::with_status(400)));
        assert_eq!(session.state(), SessionState::Local);
        assert!(session.is_dirty());
        assert!(session.subscription(SubscriptionKey(7)).unwrap().is_dirty());

        out.clear();
        session.push(&OPTIONS, &mut out);
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn test_bundled_subscription_activated_with_id() {
        let mut session = Session::new(SessionKey(1));
        session.attach_subscription(sub(7));
        session.attach_subscription(sub(8));
        let mut out = Vec::new();
        session.push(&OPTIONS, &mut out);

        let mut created = SessionCreated::new("res-1");
        created.subscription_id = Some("s7".to_string());
        session.on_create_result(Ok(created));
        assert_eq!(session.bucket_of(SubscriptionKey(7)), Some(Bucket::Active));
        assert_eq!(session.bucket_of(SubscriptionKey(8)), Some(Bucket::PendingNew));

        // The second one goes out on its own now
        assert!(session.is_dirty());
        out.clear();
        session.push(&OPTIONS, &mut out);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].name(), "CreateSubscription");
    }

    #[test]
    fn test_remove_subscription_buckets() {
        let mut session = registered("232.1.1.1");
        session.attach_subscription(sub(7));
        session.attach_subscription(sub(8));
        let mut out = Vec::new();
        session.push(&OPTIONS, &mut out);
        assert_eq!(out.len(), 2);
        session.on_subscription_created(SubscriptionKey(7), Ok(SubscriptionAck::new("s7")));

        // Never registered: gone at once
        assert!(!session.remove_subscription(SubscriptionKey(8)).unwrap());
        assert_eq!(session.bucket_of(SubscriptionKey(8)), None);

        assert!(session.remove_subscription(SubscriptionKey(7)).unwrap());
        assert_eq!(session.bucket_of(SubscriptionKey(7)), Some(Bucket::PendingDelete));
        assert!(session.pending_delete().all(|s| s.id().is_none()));

        out.clear();
        session.push(&OPTIONS, &mut out);
        assert_eq!(
            out,
            vec![Intent::DeleteSubscription {
                subscription_id: "s7".to_string()
            }]
        );
        assert_eq!(session.bucket_of(SubscriptionKey(7)), None);
        assert!(matches!(
            session.remove_subscription(SubscriptionKey(7)),
            Err(MbsmfError::SubscriptionNotFound(_))
        ));
    }

    #[test]
    fn test_identity_change_requeues_subscriptions() {
        let mut session = registered("232.1.1.1");
        session.attach_subscription(sub(7));
        let mut out = Vec::new();
        session.push(&OPTIONS, &mut out);
        session.on_subscription_created(SubscriptionKey(7), Ok(SubscriptionAck::new("s7")));

        session.set_ssm(Some(ssm("232.1.1.9")));
        out.clear();
        session.push(&OPTIONS, &mut out);
        assert_eq!(out.len(), 2);
        let Intent::CreateResource { subscription, .. } = &out[1] else {
            panic!("expected a create");
        };
        assert_eq!(subscription.as_ref().map(|b| b.key), Some(SubscriptionKey(7)));
        assert_eq!(session.bucket_of(SubscriptionKey(7)), Some(Bucket::PendingNew));
    }

    #[test]
    fn test_subscription_update_failure_retries() {
        let mut session = registered("232.1.1.1");
        session.attach_subscription(sub(7));
        let mut out = Vec::new();
        session.push(&OPTIONS, &mut out);
        session.on_subscription_created(SubscriptionKey(7), Ok(SubscriptionAck::new("s7")));

        session
            .subscription_mut(SubscriptionKey(7))
            .unwrap()
            .set_correlation_id(Some("c1".to_string()));
        session.mark_dirty();
        out.clear();
        session.push(&OPTIONS, &mut out);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].name(), "UpdateSubscription");

        session.on_subscription_updated(SubscriptionKey(7), Err(OperationResult::TimedOut));
        assert!(session.is_dirty());
        out.clear();
        session.push(&OPTIONS, &mut out);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].name(), "UpdateSubscription");
    }

    #[test]
    fn test_change_during_subscription_update_goes_out_after_ack() {
        let mut session = registered("232.1.1.1");
        session.attach_subscription(sub(7));
        let mut out = Vec::new();
        session.push(&OPTIONS, &mut out);
        session.on_subscription_created(SubscriptionKey(7), Ok(SubscriptionAck::new("s7")));

        session
            .subscription_mut(SubscriptionKey(7))
            .unwrap()
            .set_correlation_id(Some("c1".to_string()));
        session.mark_dirty();
        out.clear();
        session.push(&OPTIONS, &mut out);
        assert_eq!(out[0].name(), "UpdateSubscription");

        // Held back while the update is outstanding
        session
            .subscription_mut(SubscriptionKey(7))
            .unwrap()
            .set_correlation_id(Some("c2".to_string()));
        session.mark_dirty();
        out.clear();
        session.push(&OPTIONS, &mut out);
        assert!(out.is_empty());

        session.on_subscription_updated(SubscriptionKey(7), Ok(SubscriptionAck::new("s7")));
        assert!(session.is_dirty());
        session.push(&OPTIONS, &mut out);
        assert_eq!(out.len(), 1);
        let Intent::UpdateSubscription { ops, .. } = &out[0] else {
            panic!("expected an update, got {}", out[0]);
        };
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].path, "/notifyCorrelationId");
        assert_eq!(ops[0].value, Some(serde_json::json!("c2")));
    }

    #[test]
    fn test_identity_change_rebundles_subscription_in_flight() {
        let mut session = registered("232.1.1.1");
        session.attach_subscription(sub(7));
        let mut out = Vec::new();
        session.push(&OPTIONS, &mut out);
        assert_eq!(out[0].name(), "CreateSubscription");

        session.set_ssm(Some(ssm("232.1.1.9")));
        out.clear();
        session.push(&OPTIONS, &mut out);
        let names: Vec<&str> = out.iter().map(Intent::name).collect();
        assert_eq!(names, vec!["RemoveResource", "CreateResource"]);
        let Intent::CreateResource { subscription, .. } = &out[1] else {
            panic!("expected a create");
        };
        assert_eq!(subscription.as_ref().map(|b| b.key), Some(SubscriptionKey(7)));

        // Answer for the removed resource
        assert_eq!(
            session.on_subscription_created(SubscriptionKey(7), Ok(SubscriptionAck::new("s-old"))),
            SubscriptionOutcome::NotInFlight
        );
        assert_eq!(session.bucket_of(SubscriptionKey(7)), Some(Bucket::PendingNew));

        let mut created = SessionCreated::new("res-2");
        created.subscription_id = Some("s7".to_string());
        session.on_create_result(Ok(created));
        assert_eq!(session.bucket_of(SubscriptionKey(7)), Some(Bucket::Active));
        assert_eq!(session.subscription(SubscriptionKey(7)).unwrap().id(), Some("s7"));
    }

    #[test]
    fn test_patch_answer_after_recreate_is_ignored() {
        let options = PushOptions {
            session_body_patch: true,
            notification_servers: &[],
        };
        let mut session = registered("232.1.1.1");
        session.set_location_dependent(true);
        session.set_area_session_id(Some(9));
        let mut out = Vec::new();
        session.push(&options, &mut out);
        assert_eq!(out[0].name(), "PatchResource");

        session.set_ssm(Some(ssm("232.1.1.2")));
        out.clear();
        session.push(&options, &mut out);
        assert_eq!(out[1].name(), "CreateResource");

        session.on_patch_result(Ok(()));
        session.on_patch_timeout();
        assert_eq!(session.state(), SessionState::CreatePending);
        assert!(session.acknowledged().is_none());

        session.on_create_result(Ok(SessionCreated::new("res-2")));
        let acked = session.acknowledged().unwrap();
        assert_eq!(acked.area_session_id, Some(9));
        assert_eq!(session.acknowledged_ssm(), Some(&ssm("232.1.1.2")));
    }

    #[test]
    fn test_setter_side_effects() {
        let mut session = Session::new(SessionKey(1));
        session.set_tmgi_alloc_req(true);
        session.set_tmgi(Some(Tmgi::new("000001", PlmnId::new("001", "01"))));
        assert!(!session.data().tmgi_alloc_req);

        session.set_location_dependent(true);
        session.set_area_session_id(Some(4));
        session.set_location_dependent(false);
        assert_eq!(session.data().area_session_id, None);

        assert!(session.set_fsa_ids(vec![FsaId(1)]).is_err());
        session.set_service_type(MbsSessionType::Broadcast);
        session.set_fsa_ids(vec![FsaId(1)]).unwrap();
        session.set_service_type(MbsSessionType::Multicast);
        assert!(session.data().mbs_fsa_id_list.is_empty());
    }
}
