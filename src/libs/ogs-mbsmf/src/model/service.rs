//! MBS service information (TS 29.571 MbsServiceInfo and friends)

use std::collections::BTreeMap;

use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::diff::{Diff, Patch};
use crate::encode::{BitRate, ReservPriority};
use crate::error::{MbsmfError, MbsmfResult};

/// Media type of a media component
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MediaType {
    #[serde(rename = "AUDIO")]
    Audio,
    #[serde(rename = "VIDEO")]
    Video,
    #[serde(rename = "DATA")]
    Data,
    #[serde(rename = "APPLICATION")]
    Application,
    #[serde(rename = "CONTROL")]
    Control,
    #[serde(rename = "TEXT")]
    Text,
    #[serde(rename = "MESSAGE")]
    Message,
    #[serde(rename = "OTHER")]
    Other,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PreemptionCapability {
    #[default]
    #[serde(rename = "NOT_PREEMPT")]
    NotPreempt,
    #[serde(rename = "MAY_PREEMPT")]
    MayPreempt,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PreemptionVulnerability {
    #[default]
    #[serde(rename = "NOT_PREEMPTABLE")]
    NotPreemptable,
    #[serde(rename = "PREEMPTABLE")]
    Preemptable,
}

crate::scalar_diff!(MediaType, PreemptionCapability, PreemptionVulnerability);

/// Allocation and Retention Priority
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Arp {
    /// 1 (highest) to 15
    #[serde(rename = "priorityLevel")]
    pub priority_level: u8,
    #[serde(rename = "preemptCap")]
    pub preempt_cap: PreemptionCapability,
    #[serde(rename = "preemptVuln")]
    pub preempt_vuln: PreemptionVulnerability,
}

impl Arp {
    pub fn new(
        priority_level: u8,
        preempt_cap: PreemptionCapability,
        preempt_vuln: PreemptionVulnerability,
    ) -> MbsmfResult<Self> {
        if !(1..=15).contains(&priority_level) {
            return Err(MbsmfError::invalid(
                "priorityLevel",
                format!("{priority_level} outside 1..=15"),
            ));
        }
        Ok(Self {
            priority_level,
            preempt_cap,
            preempt_vuln,
        })
    }
}

impl Diff for Arp {
    fn diff_to(&self, new: &Self, patch: &mut Patch) {
        patch.field("priorityLevel", &self.priority_level, &new.priority_level);
        patch.field("preemptCap", &self.preempt_cap, &new.preempt_cap);
        patch.field("preemptVuln", &self.preempt_vuln, &new.preempt_vuln);
    }
}

/// QoS requirements of an MBS media component
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MbsQosReq {
    #[serde(rename = "5qi")]
    pub five_qi: u8,
    #[serde(rename = "guarBitRate", skip_serializing_if = "Option::is_none", default)]
    pub guar_bit_rate: Option<BitRate>,
    #[serde(rename = "maxBitRate", skip_serializing_if = "Option::is_none", default)]
    pub max_bit_rate: Option<BitRate>,
    /// Milliseconds, 1 to 4095. When absent the MB-SMF applies its default.
    #[serde(rename = "averWindow", skip_serializing_if = "Option::is_none", default)]
    pub aver_window: Option<u16>,
    #[serde(rename = "reqMbsArp", skip_serializing_if = "Option::is_none", default)]
    pub req_mbs_arp: Option<Arp>,
}

impl MbsQosReq {
    pub const AVER_WINDOW_MAX: u16 = 4095;

    pub fn new(five_qi: u8) -> Self {
        Self {
            five_qi,
            ..Default::default()
        }
    }

    pub fn set_aver_window(&mut self, window: Option<u16>) -> MbsmfResult<()> {
        if let Some(w) = window {
            if !(1..=Self::AVER_WINDOW_MAX).contains(&w) {
                return Err(MbsmfError::invalid(
                    "averWindow",
                    format!("must be within 1..={}", Self::AVER_WINDOW_MAX),
                ));
            }
        }
        self.aver_window = window;
        Ok(())
    }
}

impl Diff for MbsQosReq {
    fn diff_to(&self, new: &Self, patch: &mut Patch) {
        patch.field("5qi", &self.five_qi, &new.five_qi);
        patch.field("guarBitRate", &self.guar_bit_rate, &new.guar_bit_rate);
        patch.field("maxBitRate", &self.max_bit_rate, &new.max_bit_rate);
        patch.field("averWindow", &self.aver_window, &new.aver_window);
        patch.field("reqMbsArp", &self.req_mbs_arp, &new.req_mbs_arp);
    }
}

/// Media description of an MBS media component
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MbsMediaInfo {
    #[serde(rename = "mbsMedType", skip_serializing_if = "Option::is_none", default)]
    pub mbs_med_type: Option<MediaType>,
    #[serde(rename = "maxReqMbsBwDl", skip_serializing_if = "Option::is_none", default)]
    pub max_req_mbs_bw_dl: Option<BitRate>,
    #[serde(rename = "minReqMbsBwDl", skip_serializing_if = "Option::is_none", default)]
    pub min_req_mbs_bw_dl: Option<BitRate>,
    /// Two codec slots; the first present one is the primary codec
    #[serde(
        with = "codec_slots",
        skip_serializing_if = "codec_slots::is_empty",
        default
    )]
    pub codecs: [Option<String>; 2],
}

impl MbsMediaInfo {
    /// Present codecs in slot order
    pub fn codec_list(&self) -> Vec<String> {
        self.codecs.iter().flatten().cloned().collect()
    }

    pub fn primary_codec(&self) -> Option<&str> {
        self.codecs.iter().flatten().next().map(String::as_str)
    }
}

impl Diff for MbsMediaInfo {
    fn diff_to(&self, new: &Self, patch: &mut Patch) {
        patch.field("mbsMedType", &self.mbs_med_type, &new.mbs_med_type);
        patch.field("maxReqMbsBwDl", &self.max_req_mbs_bw_dl, &new.max_req_mbs_bw_dl);
        patch.field("minReqMbsBwDl", &self.min_req_mbs_bw_dl, &new.min_req_mbs_bw_dl);
        patch.sequence("codecs", &self.codec_list(), &new.codec_list());
    }
}

mod codec_slots {
    use serde::de::Error as _;

    use super::*;

    pub fn is_empty(slots: &[Option<String>; 2]) -> bool {
        slots.iter().all(Option::is_none)
    }

    pub fn serialize<S: Serializer>(
        slots: &[Option<String>; 2],
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let present: Vec<&String> = slots.iter().flatten().collect();
        present.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<[Option<String>; 2], D::Error> {
        let codecs = Vec::<String>::deserialize(deserializer)?;
        if codecs.len() > 2 {
            return Err(D::Error::custom(format!(
                "at most 2 codecs allowed, got {}",
                codecs.len()
            )));
        }
        let mut slots = [None, None];
        for (slot, codec) in slots.iter_mut().zip(codecs) {
            *slot = Some(codec);
        }
        Ok(slots)
    }
}

/// The externally visible QoS source of a media component
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QosSource<'a> {
    MediaInfo(&'a MbsMediaInfo),
    QosRef(&'a str),
    QosReq(&'a MbsQosReq),
}

/// MBS media component
///
/// Up to three QoS sources may be filled in locally; only the one with the
/// highest precedence (media info, then QoS reference, then QoS
/// requirements) is put on the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct MbsMediaComp {
    #[serde(rename = "mbsMedCompNum")]
    pub mbs_med_comp_num: u32,
    #[serde(rename = "mbsFlowDescs", default)]
    pub mbs_flow_descs: Vec<String>,
    #[serde(rename = "mbsSdfResPrio", default)]
    pub mbs_sdf_res_prio: Option<ReservPriority>,
    #[serde(rename = "mbsMediaInfo", default)]
    pub mbs_media_info: Option<MbsMediaInfo>,
    #[serde(rename = "qosRef", default)]
    pub qos_ref: Option<String>,
    #[serde(rename = "mbsQoSReq", default)]
    pub mbs_qos_req: Option<MbsQosReq>,
}

impl MbsMediaComp {
    pub fn new(mbs_med_comp_num: u32) -> Self {
        Self {
            mbs_med_comp_num,
            ..Default::default()
        }
    }

    pub fn with_flow_desc(mut self, flow_desc: impl Into<String>) -> Self {
        self.mbs_flow_descs.push(flow_desc.into());
        self
    }

    pub fn effective_qos(&self) -> Option<QosSource<'_>> {
        if let Some(info) = &self.mbs_media_info {
            return Some(QosSource::MediaInfo(info));
        }
        if let Some(qos_ref) = &self.qos_ref {
            return Some(QosSource::QosRef(qos_ref));
        }
        self.mbs_qos_req.as_ref().map(QosSource::QosReq)
    }
}

impl Serialize for MbsMediaComp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("mbsMedCompNum", &self.mbs_med_comp_num)?;
        if !self.mbs_flow_descs.is_empty() {
            map.serialize_entry("mbsFlowDescs", &self.mbs_flow_descs)?;
        }
        if let Some(prio) = &self.mbs_sdf_res_prio {
            map.serialize_entry("mbsSdfResPrio", prio)?;
        }
        match self.effective_qos() {
            Some(QosSource::MediaInfo(info)) => map.serialize_entry("mbsMediaInfo", info)?,
            Some(QosSource::QosRef(qos_ref)) => map.serialize_entry("qosRef", qos_ref)?,
            Some(QosSource::QosReq(req)) => map.serialize_entry("mbsQoSReq", req)?,
            None => {}
        }
        map.end()
    }
}

impl Diff for MbsMediaComp {
    fn diff_to(&self, new: &Self, patch: &mut Patch) {
        patch.field("mbsMedCompNum", &self.mbs_med_comp_num, &new.mbs_med_comp_num);
        patch.sequence("mbsFlowDescs", &self.mbs_flow_descs, &new.mbs_flow_descs);
        patch.field("mbsSdfResPrio", &self.mbs_sdf_res_prio, &new.mbs_sdf_res_prio);
        patch.field("mbsMediaInfo", &self.mbs_media_info, &new.mbs_media_info);
        patch.field("qosRef", &self.qos_ref, &new.qos_ref);
        patch.field("mbsQoSReq", &self.mbs_qos_req, &new.mbs_qos_req);
    }
}

/// MBS service information
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MbsServiceInfo {
    #[serde(rename = "mbsMediaComps", default)]
    pub mbs_media_comps: BTreeMap<u32, MbsMediaComp>,
    #[serde(rename = "mbsSdfResPrio", skip_serializing_if = "Option::is_none", default)]
    pub mbs_sdf_res_prio: Option<ReservPriority>,
    #[serde(rename = "afAppId", skip_serializing_if = "Option::is_none", default)]
    pub af_app_id: Option<String>,
    #[serde(rename = "mbsSessionAmbr", skip_serializing_if = "Option::is_none", default)]
    pub mbs_session_ambr: Option<BitRate>,
}

impl MbsServiceInfo {
    /// Insert or replace a media component under its own number
    pub fn add_media_comp(&mut self, comp: MbsMediaComp) -> Option<MbsMediaComp> {
        self.mbs_media_comps.insert(comp.mbs_med_comp_num, comp)
    }

    pub fn remove_media_comp(&mut self, num: u32) -> Option<MbsMediaComp> {
        self.mbs_media_comps.remove(&num)
    }
}

impl Diff for MbsServiceInfo {
    fn diff_to(&self, new: &Self, patch: &mut Patch) {
        patch.field("mbsMediaComps", &self.mbs_media_comps, &new.mbs_media_comps);
        patch.field("mbsSdfResPrio", &self.mbs_sdf_res_prio, &new.mbs_sdf_res_prio);
        patch.field("afAppId", &self.af_app_id, &new.af_app_id);
        patch.field("mbsSessionAmbr", &self.mbs_session_ambr, &new.mbs_session_ambr);
    }
}
