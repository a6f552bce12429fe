//! MBS session record (TS 29.571 MbsSession)

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::area::{same_multiset, ExtMbsServiceArea, MbsServiceArea};
use super::identity::{MbsSessionId, Ssm, Tmgi};
use super::service::MbsServiceInfo;
use crate::diff::{Diff, Patch};
use crate::encode::FsaId;

/// MBS session type (TS 23.247 5.2)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MbsSessionType {
    #[default]
    #[serde(rename = "MULTICAST")]
    Multicast,
    #[serde(rename = "BROADCAST")]
    Broadcast,
}

impl fmt::Display for MbsSessionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Multicast => f.write_str("MULTICAST"),
            Self::Broadcast => f.write_str("BROADCAST"),
        }
    }
}

crate::scalar_diff!(MbsSessionType);

/// MBS Frequency Selection Area ids of a broadcast session
///
/// Kept in insertion order; two lists holding the same ids compare equal
/// regardless of order.
#[derive(Debug, Clone, Default, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FsaIdList(pub Vec<FsaId>);

impl FsaIdList {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[FsaId] {
        &self.0
    }
}

impl PartialEq for FsaIdList {
    fn eq(&self, other: &Self) -> bool {
        same_multiset(&self.0, &other.0)
    }
}

impl From<Vec<FsaId>> for FsaIdList {
    fn from(ids: Vec<FsaId>) -> Self {
        Self(ids)
    }
}

fn is_false(flag: &bool) -> bool {
    !*flag
}

/// MBS session as exchanged with the MB-SMF
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MbsSession {
    #[serde(rename = "mbsSessionId")]
    pub mbs_session_id: MbsSessionId,
    /// Ask the MB-SMF to allocate a TMGI
    #[serde(rename = "tmgiAllocReq", skip_serializing_if = "is_false", default)]
    pub tmgi_alloc_req: bool,
    #[serde(rename = "serviceType")]
    pub service_type: MbsSessionType,
    #[serde(rename = "locationDependent", skip_serializing_if = "is_false", default)]
    pub location_dependent: bool,
    /// Only meaningful for location dependent sessions
    #[serde(rename = "areaSessionId", skip_serializing_if = "Option::is_none", default)]
    pub area_session_id: Option<u16>,
    #[serde(rename = "ingressTunAddrReq", skip_serializing_if = "is_false", default)]
    pub ingress_tun_addr_req: bool,
    #[serde(rename = "mbsServiceArea", skip_serializing_if = "Option::is_none", default)]
    pub mbs_service_area: Option<MbsServiceArea>,
    #[serde(rename = "extMbsServiceArea", skip_serializing_if = "Option::is_none", default)]
    pub ext_mbs_service_area: Option<ExtMbsServiceArea>,
    #[serde(rename = "mbsServInfo", skip_serializing_if = "Option::is_none", default)]
    pub mbs_serv_info: Option<MbsServiceInfo>,
    #[serde(rename = "mbsFsaIdList", skip_serializing_if = "FsaIdList::is_empty", default)]
    pub mbs_fsa_id_list: FsaIdList,
    /// Reserved for associated session handling
    #[serde(rename = "associatedSessionId", skip_serializing_if = "Option::is_none", default)]
    pub associated_session_id: Option<String>,
    #[serde(rename = "startTime", skip_serializing_if = "Option::is_none", default)]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(rename = "terminationTime", skip_serializing_if = "Option::is_none", default)]
    pub termination_time: Option<DateTime<Utc>>,
}

impl MbsSession {
    pub fn ssm(&self) -> Option<&Ssm> {
        self.mbs_session_id.ssm.as_ref()
    }

    pub fn tmgi(&self) -> Option<&Tmgi> {
        self.mbs_session_id.tmgi.as_ref()
    }

    pub fn is_broadcast(&self) -> bool {
        self.service_type == MbsSessionType::Broadcast
    }
}

impl Diff for MbsSession {
    fn diff_to(&self, new: &Self, patch: &mut Patch) {
        patch.field("mbsSessionId", &self.mbs_session_id, &new.mbs_session_id);
        patch.flag("tmgiAllocReq", self.tmgi_alloc_req, new.tmgi_alloc_req);
        patch.field("serviceType", &self.service_type, &new.service_type);
        patch.flag("locationDependent", self.location_dependent, new.location_dependent);
        patch.field("areaSessionId", &self.area_session_id, &new.area_session_id);
        patch.flag("ingressTunAddrReq", self.ingress_tun_addr_req, new.ingress_tun_addr_req);
        patch.field("mbsServiceArea", &self.mbs_service_area, &new.mbs_service_area);
        patch.field("extMbsServiceArea", &self.ext_mbs_service_area, &new.ext_mbs_service_area);
        patch.field("mbsServInfo", &self.mbs_serv_info, &new.mbs_serv_info);
        patch.sequence("mbsFsaIdList", self.mbs_fsa_id_list.as_slice(), new.mbs_fsa_id_list.as_slice());
        patch.field("associatedSessionId", &self.associated_session_id, &new.associated_session_id);
        patch.field("startTime", &self.start_time, &new.start_time);
        patch.field("terminationTime", &self.termination_time, &new.termination_time);
    }
}
