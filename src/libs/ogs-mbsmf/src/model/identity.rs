//! MBS session identities (TS 29.571 Tmgi, Ssm, MbsSessionId)

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::diff::{Diff, Patch};
use crate::error::{MbsmfError, MbsmfResult};

/// PLMN ID (MCC + MNC)
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PlmnId {
    pub mcc: String,
    pub mnc: String,
}

impl PlmnId {
    pub fn new(mcc: impl Into<String>, mnc: impl Into<String>) -> Self {
        Self {
            mcc: mcc.into(),
            mnc: mnc.into(),
        }
    }
}

impl fmt::Display for PlmnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.mcc, self.mnc)
    }
}

impl Diff for PlmnId {
    fn diff_to(&self, new: &Self, patch: &mut Patch) {
        patch.field("mcc", &self.mcc, &new.mcc);
        patch.field("mnc", &self.mnc, &new.mnc);
    }
}

/// Temporary Mobile Group Identity
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Tmgi {
    /// MBS Service ID (6 hex digits)
    #[serde(rename = "mbsServiceId")]
    pub mbs_service_id: String,
    #[serde(rename = "plmnId")]
    pub plmn_id: PlmnId,
}

impl Tmgi {
    pub fn new(mbs_service_id: impl Into<String>, plmn_id: PlmnId) -> Self {
        Self {
            mbs_service_id: mbs_service_id.into(),
            plmn_id,
        }
    }
}

impl fmt::Display for Tmgi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.mbs_service_id, self.plmn_id)
    }
}

impl Diff for Tmgi {
    fn diff_to(&self, new: &Self, patch: &mut Patch) {
        patch.field("mbsServiceId", &self.mbs_service_id, &new.mbs_service_id);
        patch.field("plmnId", &self.plmn_id, &new.plmn_id);
    }
}

/// TS 29.571 IpAddr: exactly one of the address families is present
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
struct IpAddrDoc {
    #[serde(rename = "ipv4Addr", skip_serializing_if = "Option::is_none", default)]
    ipv4_addr: Option<Ipv4Addr>,
    #[serde(rename = "ipv6Addr", skip_serializing_if = "Option::is_none", default)]
    ipv6_addr: Option<Ipv6Addr>,
}

impl From<IpAddr> for IpAddrDoc {
    fn from(addr: IpAddr) -> Self {
        match addr {
            IpAddr::V4(v4) => Self {
                ipv4_addr: Some(v4),
                ipv6_addr: None,
            },
            IpAddr::V6(v6) => Self {
                ipv4_addr: None,
                ipv6_addr: Some(v6),
            },
        }
    }
}

impl IpAddrDoc {
    fn into_addr(self) -> Option<IpAddr> {
        match (self.ipv4_addr, self.ipv6_addr) {
            (Some(v4), None) => Some(IpAddr::V4(v4)),
            (None, Some(v6)) => Some(IpAddr::V6(v6)),
            _ => None,
        }
    }
}

/// Source Specific Multicast address pair
///
/// Both addresses always belong to the same family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ssm {
    source: IpAddr,
    dest: IpAddr,
}

impl Ssm {
    pub fn new(source: IpAddr, dest: IpAddr) -> MbsmfResult<Self> {
        if source.is_ipv4() != dest.is_ipv4() {
            return Err(MbsmfError::InvalidSsm(format!(
                "address family mismatch between source {source} and destination {dest}"
            )));
        }
        if !dest.is_multicast() {
            return Err(MbsmfError::InvalidSsm(format!(
                "destination {dest} is not a multicast address"
            )));
        }
        Ok(Self { source, dest })
    }

    pub fn source(&self) -> IpAddr {
        self.source
    }

    pub fn dest(&self) -> IpAddr {
        self.dest
    }

    pub fn is_ipv6(&self) -> bool {
        self.source.is_ipv6()
    }
}

impl fmt::Display for Ssm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.source, self.dest)
    }
}

#[derive(Serialize, Deserialize)]
struct SsmDoc {
    #[serde(rename = "sourceIpAddr")]
    source_ip_addr: IpAddrDoc,
    #[serde(rename = "destIpAddr")]
    dest_ip_addr: IpAddrDoc,
}

impl Serialize for Ssm {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        SsmDoc {
            source_ip_addr: self.source.into(),
            dest_ip_addr: self.dest.into(),
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Ssm {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let doc = SsmDoc::deserialize(deserializer)?;
        let source = doc
            .source_ip_addr
            .into_addr()
            .ok_or_else(|| D::Error::custom("sourceIpAddr needs exactly one address"))?;
        let dest = doc
            .dest_ip_addr
            .into_addr()
            .ok_or_else(|| D::Error::custom("destIpAddr needs exactly one address"))?;
        Ssm::new(source, dest).map_err(D::Error::custom)
    }
}

// Identity is never patched piecewise
impl Diff for Ssm {
    fn diff_to(&self, new: &Self, patch: &mut Patch) {
        patch.scalar(self, new);
    }
}

/// MBS session identifier: a TMGI, an SSM, or both
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MbsSessionId {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub tmgi: Option<Tmgi>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub ssm: Option<Ssm>,
}

impl MbsSessionId {
    pub fn is_empty(&self) -> bool {
        self.tmgi.is_none() && self.ssm.is_none()
    }
}

impl fmt::Display for MbsSessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.tmgi, &self.ssm) {
            (Some(tmgi), Some(ssm)) => write!(f, "tmgi={tmgi} ssm={ssm}"),
            (Some(tmgi), None) => write!(f, "tmgi={tmgi}"),
            (None, Some(ssm)) => write!(f, "ssm={ssm}"),
            (None, None) => f.write_str("<unset>"),
        }
    }
}

impl Diff for MbsSessionId {
    fn diff_to(&self, new: &Self, patch: &mut Patch) {
        patch.field("tmgi", &self.tmgi, &new.tmgi);
        patch.field("ssm", &self.ssm, &new.ssm);
    }
}

/// Ingress tunnel address returned by the MB-SMF
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TunnelAddress {
    #[serde(rename = "ipv4Addr", skip_serializing_if = "Option::is_none", default)]
    pub ipv4_addr: Option<Ipv4Addr>,
    #[serde(rename = "ipv6Addr", skip_serializing_if = "Option::is_none", default)]
    pub ipv6_addr: Option<Ipv6Addr>,
    #[serde(rename = "portNumber")]
    pub port_number: u16,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::diff_values;
    use crate::patch::PatchOp;
    use serde_json::json;

    fn ssm(source: &str, dest: &str) -> Ssm {
        Ssm::new(source.parse().unwrap(), dest.parse().unwrap()).unwrap()
    }

    #[test]
    fn test_ssm_validation() {
        assert!(Ssm::new("10.0.0.1".parse().unwrap(), "ff0e::1".parse().unwrap()).is_err());
        assert!(Ssm::new("10.0.0.1".parse().unwrap(), "10.0.0.2".parse().unwrap()).is_err());
        assert!(!ssm("10.0.0.1", "232.1.1.1").is_ipv6());
        assert!(ssm("2001:db8::1", "ff3e::8000:1").is_ipv6());
    }

    #[test]
    fn test_ssm_document() {
        let doc = serde_json::to_value(ssm("10.0.0.1", "232.1.1.1")).unwrap();
        assert_eq!(
            doc,
            json!({
                "sourceIpAddr": {"ipv4Addr": "10.0.0.1"},
                "destIpAddr": {"ipv4Addr": "232.1.1.1"}
            })
        );
        let back: Ssm = serde_json::from_value(doc).unwrap();
        assert_eq!(back, ssm("10.0.0.1", "232.1.1.1"));
    }

    #[test]
    fn test_ssm_family_is_part_of_equality() {
        let v4 = ssm("10.0.0.1", "232.1.1.1");
        let v6 = ssm("::ffff:10.0.0.1", "ff3e::e801:101");
        assert_ne!(v4, v6);
    }

    #[test]
    fn test_ssm_diff_replaces_whole_pair() {
        let old = MbsSessionId {
            tmgi: None,
            ssm: Some(ssm("10.0.0.1", "232.1.1.1")),
        };
        let new = MbsSessionId {
            tmgi: None,
            ssm: Some(ssm("10.0.0.1", "232.1.1.2")),
        };
        let ops = diff_values(&old, &new);
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].path, "/ssm");
        assert_eq!(
            ops[0].value,
            Some(json!({
                "sourceIpAddr": {"ipv4Addr": "10.0.0.1"},
                "destIpAddr": {"ipv4Addr": "232.1.1.2"}
            }))
        );
    }

    #[test]
    fn test_tmgi_diff_is_per_field() {
        let old = Tmgi::new("000001", PlmnId::new("001", "01"));
        let new = Tmgi::new("000001", PlmnId::new("001", "02"));
        assert_eq!(
            diff_values(&old, &new),
            vec![PatchOp::replace("/plmnId/mnc", Some(json!("02")))]
        );
        assert_eq!(old.to_string(), "000001-00101");
    }
}
