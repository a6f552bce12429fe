//! MBS session status subscription and event reports (TS 29.532)

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::identity::{MbsSessionId, TunnelAddress};
use crate::diff::{Diff, Patch};

/// Events a status subscription can ask for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MbsSessionEventType {
    #[serde(rename = "MBS_REL_TMGI_EXPIRY")]
    MbsRelTmgiExpiry,
    #[serde(rename = "BROADCAST_DELIVERY_STATUS")]
    BroadcastDeliveryStatus,
    #[serde(rename = "INGRESS_TUNNEL_ADD_CHANGE")]
    IngressTunnelAddChange,
}

impl MbsSessionEventType {
    pub const ALL: [MbsSessionEventType; 3] = [
        Self::MbsRelTmgiExpiry,
        Self::BroadcastDeliveryStatus,
        Self::IngressTunnelAddChange,
    ];

    fn bit(self) -> u8 {
        match self {
            Self::MbsRelTmgiExpiry => 1 << 0,
            Self::BroadcastDeliveryStatus => 1 << 1,
            Self::IngressTunnelAddChange => 1 << 2,
        }
    }
}

crate::scalar_diff!(MbsSessionEventType);

/// One entry of a subscription's event list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MbsSessionEvent {
    #[serde(rename = "eventType")]
    pub event_type: MbsSessionEventType,
}

impl Diff for MbsSessionEvent {
    fn diff_to(&self, new: &Self, patch: &mut Patch) {
        patch.field("eventType", &self.event_type, &new.event_type);
    }
}

/// Set of subscribed event types
///
/// On the wire this is the `eventList` array, in a fixed order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct MbsSessionEventMask(u8);

impl MbsSessionEventMask {
    pub const fn empty() -> Self {
        Self(0)
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn contains(&self, event: MbsSessionEventType) -> bool {
        self.0 & event.bit() != 0
    }

    pub fn insert(&mut self, event: MbsSessionEventType) {
        self.0 |= event.bit();
    }

    pub fn remove(&mut self, event: MbsSessionEventType) {
        self.0 &= !event.bit();
    }

    pub fn with(mut self, event: MbsSessionEventType) -> Self {
        self.insert(event);
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = MbsSessionEventType> + '_ {
        MbsSessionEventType::ALL
            .into_iter()
            .filter(move |event| self.contains(*event))
    }

    pub fn events(&self) -> Vec<MbsSessionEvent> {
        self.iter()
            .map(|event_type| MbsSessionEvent { event_type })
            .collect()
    }
}

impl FromIterator<MbsSessionEventType> for MbsSessionEventMask {
    fn from_iter<I: IntoIterator<Item = MbsSessionEventType>>(iter: I) -> Self {
        let mut mask = Self::empty();
        for event in iter {
            mask.insert(event);
        }
        mask
    }
}

impl Serialize for MbsSessionEventMask {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.events().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for MbsSessionEventMask {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let events = Vec::<MbsSessionEvent>::deserialize(deserializer)?;
        Ok(events.into_iter().map(|e| e.event_type).collect())
    }
}

impl Diff for MbsSessionEventMask {
    fn diff_to(&self, new: &Self, patch: &mut Patch) {
        patch.list(&self.events(), &new.events());
    }
}

/// Status subscription resource
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MbsSessionSubscription {
    #[serde(rename = "mbsSessionId", skip_serializing_if = "Option::is_none", default)]
    pub mbs_session_id: Option<MbsSessionId>,
    #[serde(rename = "areaSessionId", skip_serializing_if = "Option::is_none", default)]
    pub area_session_id: Option<u16>,
    #[serde(rename = "eventList", default)]
    pub event_list: MbsSessionEventMask,
    #[serde(rename = "notifyUri", skip_serializing_if = "Option::is_none", default)]
    pub notify_uri: Option<String>,
    #[serde(rename = "notifyCorrelationId", skip_serializing_if = "Option::is_none", default)]
    pub notify_correlation_id: Option<String>,
    #[serde(rename = "expiryTime", skip_serializing_if = "Option::is_none", default)]
    pub expiry_time: Option<DateTime<Utc>>,
    #[serde(rename = "nfcInstanceId", skip_serializing_if = "Option::is_none", default)]
    pub nfc_instance_id: Option<String>,
}

impl Diff for MbsSessionSubscription {
    fn diff_to(&self, new: &Self, patch: &mut Patch) {
        patch.field("mbsSessionId", &self.mbs_session_id, &new.mbs_session_id);
        patch.field("areaSessionId", &self.area_session_id, &new.area_session_id);
        patch.field("eventList", &self.event_list, &new.event_list);
        patch.field("notifyUri", &self.notify_uri, &new.notify_uri);
        patch.field("notifyCorrelationId", &self.notify_correlation_id, &new.notify_correlation_id);
        patch.field("expiryTime", &self.expiry_time, &new.expiry_time);
        patch.field("nfcInstanceId", &self.nfc_instance_id, &new.nfc_instance_id);
    }
}

/// Broadcast delivery status carried by BROADCAST_DELIVERY_STATUS reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BroadcastDeliveryStatus {
    #[serde(rename = "STARTED")]
    Started,
    #[serde(rename = "TERMINATED")]
    Terminated,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngressTunAddrInfo {
    #[serde(rename = "ingressTunAddr", default)]
    pub ingress_tun_addr: Vec<TunnelAddress>,
}

/// One event reported by the MB-SMF
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MbsSessionEventReport {
    #[serde(rename = "eventType")]
    pub event_type: MbsSessionEventType,
    #[serde(rename = "timeStamp", skip_serializing_if = "Option::is_none", default)]
    pub time_stamp: Option<DateTime<Utc>>,
    #[serde(rename = "ingressTunAddrInfo", skip_serializing_if = "Option::is_none", default)]
    pub ingress_tun_addr_info: Option<IngressTunAddrInfo>,
    #[serde(rename = "broadcastDelStatus", skip_serializing_if = "Option::is_none", default)]
    pub broadcast_del_status: Option<BroadcastDeliveryStatus>,
}

/// Notification request body
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MbsSessionEventReportList {
    #[serde(rename = "eventList", default)]
    pub event_list: Vec<MbsSessionEventReport>,
    #[serde(rename = "notifyCorrelationId", skip_serializing_if = "Option::is_none", default)]
    pub notify_correlation_id: Option<String>,
}

impl fmt::Display for MbsSessionEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::MbsRelTmgiExpiry => "MBS_REL_TMGI_EXPIRY",
            Self::BroadcastDeliveryStatus => "BROADCAST_DELIVERY_STATUS",
            Self::IngressTunnelAddChange => "INGRESS_TUNNEL_ADD_CHANGE",
        };
        f.write_str(name)
    }
}
