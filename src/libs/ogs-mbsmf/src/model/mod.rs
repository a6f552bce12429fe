//! Value model of the MBS session resource
//!
//! Plain data records with the TS 29.532 / TS 29.571 JSON shape. Every type
//! carries a [`Diff`](crate::diff::Diff) implementation next to it.

pub mod area;
pub mod identity;
pub mod service;
pub mod session;
pub mod subscription;

pub use area::{
    CivicAddress, ExtMbsServiceArea, GeographicArea, GeographicalCoordinates, MbsServiceArea,
    Ncgi, NcgiTai, Tai, UncertaintyEllipse,
};
pub use identity::{MbsSessionId, PlmnId, Ssm, Tmgi, TunnelAddress};
pub use service::{
    Arp, MbsMediaComp, MbsMediaInfo, MbsQosReq, MbsServiceInfo, MediaType, PreemptionCapability,
    PreemptionVulnerability, QosSource,
};
pub use session::{FsaIdList, MbsSession, MbsSessionType};
pub use subscription::{
    BroadcastDeliveryStatus, IngressTunAddrInfo, MbsSessionEvent, MbsSessionEventMask,
    MbsSessionEventReport, MbsSessionEventReportList, MbsSessionEventType,
    MbsSessionSubscription,
};
