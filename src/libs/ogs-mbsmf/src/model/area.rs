//! MBS service areas
//!
//! Cell based areas (`MbsServiceArea`, TS 29.571) and external areas given
//! as civic addresses or geographic shapes (`ExternalMbsServiceArea`,
//! TS 29.572 location types).

use serde::{Deserialize, Serialize};

use crate::diff::{Diff, Patch};
use crate::encode::{Nid, NrCellId, Tac};
use crate::model::identity::PlmnId;

/// Tracking Area Identity
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Tai {
    #[serde(rename = "plmnId")]
    pub plmn_id: PlmnId,
    pub tac: Tac,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub nid: Option<Nid>,
}

impl Diff for Tai {
    fn diff_to(&self, new: &Self, patch: &mut Patch) {
        patch.field("plmnId", &self.plmn_id, &new.plmn_id);
        patch.field("tac", &self.tac, &new.tac);
        patch.field("nid", &self.nid, &new.nid);
    }
}

/// NR Cell Global Identity
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Ncgi {
    #[serde(rename = "plmnId")]
    pub plmn_id: PlmnId,
    #[serde(rename = "nrCellId")]
    pub nr_cell_id: NrCellId,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub nid: Option<Nid>,
}

impl Diff for Ncgi {
    fn diff_to(&self, new: &Self, patch: &mut Patch) {
        patch.field("plmnId", &self.plmn_id, &new.plmn_id);
        patch.field("nrCellId", &self.nr_cell_id, &new.nr_cell_id);
        patch.field("nid", &self.nid, &new.nid);
    }
}

/// Cells of one tracking area
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NcgiTai {
    pub tai: Tai,
    #[serde(rename = "cellList")]
    pub cell_list: Vec<Ncgi>,
}

impl Diff for NcgiTai {
    fn diff_to(&self, new: &Self, patch: &mut Patch) {
        patch.field("tai", &self.tai, &new.tai);
        patch.field("cellList", &self.cell_list, &new.cell_list);
    }
}

/// Cell and tracking area based service area
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MbsServiceArea {
    #[serde(rename = "ncgiList", skip_serializing_if = "Vec::is_empty", default)]
    pub ncgi_list: Vec<NcgiTai>,
    #[serde(rename = "taiList", skip_serializing_if = "Vec::is_empty", default)]
    pub tai_list: Vec<Tai>,
}

impl MbsServiceArea {
    pub fn is_empty(&self) -> bool {
        self.ncgi_list.is_empty() && self.tai_list.is_empty()
    }
}

impl Diff for MbsServiceArea {
    fn diff_to(&self, new: &Self, patch: &mut Patch) {
        patch.sequence("ncgiList", &self.ncgi_list, &new.ncgi_list);
        patch.sequence("taiList", &self.tai_list, &new.tai_list);
    }
}

/// Civic address (TS 29.572, RFC 4776 CAtypes)
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct CivicAddress {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(rename = "A1", skip_serializing_if = "Option::is_none")]
    pub a1: Option<String>,
    #[serde(rename = "A2", skip_serializing_if = "Option::is_none")]
    pub a2: Option<String>,
    #[serde(rename = "A3", skip_serializing_if = "Option::is_none")]
    pub a3: Option<String>,
    #[serde(rename = "A4", skip_serializing_if = "Option::is_none")]
    pub a4: Option<String>,
    #[serde(rename = "A5", skip_serializing_if = "Option::is_none")]
    pub a5: Option<String>,
    #[serde(rename = "A6", skip_serializing_if = "Option::is_none")]
    pub a6: Option<String>,
    #[serde(rename = "PRD", skip_serializing_if = "Option::is_none")]
    pub prd: Option<String>,
    #[serde(rename = "POD", skip_serializing_if = "Option::is_none")]
    pub pod: Option<String>,
    #[serde(rename = "STS", skip_serializing_if = "Option::is_none")]
    pub sts: Option<String>,
    #[serde(rename = "HNO", skip_serializing_if = "Option::is_none")]
    pub hno: Option<String>,
    #[serde(rename = "HNS", skip_serializing_if = "Option::is_none")]
    pub hns: Option<String>,
    #[serde(rename = "LMK", skip_serializing_if = "Option::is_none")]
    pub lmk: Option<String>,
    #[serde(rename = "LOC", skip_serializing_if = "Option::is_none")]
    pub loc: Option<String>,
    #[serde(rename = "NAM", skip_serializing_if = "Option::is_none")]
    pub nam: Option<String>,
    #[serde(rename = "PC", skip_serializing_if = "Option::is_none")]
    pub pc: Option<String>,
    #[serde(rename = "BLD", skip_serializing_if = "Option::is_none")]
    pub bld: Option<String>,
    #[serde(rename = "UNIT", skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(rename = "FLR", skip_serializing_if = "Option::is_none")]
    pub flr: Option<String>,
    #[serde(rename = "ROOM", skip_serializing_if = "Option::is_none")]
    pub room: Option<String>,
    #[serde(rename = "PLC", skip_serializing_if = "Option::is_none")]
    pub plc: Option<String>,
    #[serde(rename = "PCN", skip_serializing_if = "Option::is_none")]
    pub pcn: Option<String>,
    #[serde(rename = "POBOX", skip_serializing_if = "Option::is_none")]
    pub pobox: Option<String>,
    #[serde(rename = "ADDCODE", skip_serializing_if = "Option::is_none")]
    pub addcode: Option<String>,
    #[serde(rename = "SEAT", skip_serializing_if = "Option::is_none")]
    pub seat: Option<String>,
    #[serde(rename = "RD", skip_serializing_if = "Option::is_none")]
    pub rd: Option<String>,
    #[serde(rename = "RDSEC", skip_serializing_if = "Option::is_none")]
    pub rdsec: Option<String>,
    #[serde(rename = "RDBR", skip_serializing_if = "Option::is_none")]
    pub rdbr: Option<String>,
    #[serde(rename = "RDSUBBR", skip_serializing_if = "Option::is_none")]
    pub rdsubbr: Option<String>,
    #[serde(rename = "PRM", skip_serializing_if = "Option::is_none")]
    pub prm: Option<String>,
    #[serde(rename = "POM", skip_serializing_if = "Option::is_none")]
    pub pom: Option<String>,
    #[serde(rename = "usageRules", skip_serializing_if = "Option::is_none")]
    pub usage_rules: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(rename = "providedBy", skip_serializing_if = "Option::is_none")]
    pub provided_by: Option<String>,
}

impl Diff for CivicAddress {
    fn diff_to(&self, new: &Self, patch: &mut Patch) {
        patch.field("country", &self.country, &new.country);
        patch.field("A1", &self.a1, &new.a1);
        patch.field("A2", &self.a2, &new.a2);
        patch.field("A3", &self.a3, &new.a3);
        patch.field("A4", &self.a4, &new.a4);
        patch.field("A5", &self.a5, &new.a5);
        patch.field("A6", &self.a6, &new.a6);
        patch.field("PRD", &self.prd, &new.prd);
        patch.field("POD", &self.pod, &new.pod);
        patch.field("STS", &self.sts, &new.sts);
        patch.field("HNO", &self.hno, &new.hno);
        patch.field("HNS", &self.hns, &new.hns);
        patch.field("LMK", &self.lmk, &new.lmk);
        patch.field("LOC", &self.loc, &new.loc);
        patch.field("NAM", &self.nam, &new.nam);
        patch.field("PC", &self.pc, &new.pc);
        patch.field("BLD", &self.bld, &new.bld);
        patch.field("UNIT", &self.unit, &new.unit);
        patch.field("FLR", &self.flr, &new.flr);
        patch.field("ROOM", &self.room, &new.room);
        patch.field("PLC", &self.plc, &new.plc);
        patch.field("PCN", &self.pcn, &new.pcn);
        patch.field("POBOX", &self.pobox, &new.pobox);
        patch.field("ADDCODE", &self.addcode, &new.addcode);
        patch.field("SEAT", &self.seat, &new.seat);
        patch.field("RD", &self.rd, &new.rd);
        patch.field("RDSEC", &self.rdsec, &new.rdsec);
        patch.field("RDBR", &self.rdbr, &new.rdbr);
        patch.field("RDSUBBR", &self.rdsubbr, &new.rdsubbr);
        patch.field("PRM", &self.prm, &new.prm);
        patch.field("POM", &self.pom, &new.pom);
        patch.field("usageRules", &self.usage_rules, &new.usage_rules);
        patch.field("method", &self.method, &new.method);
        patch.field("providedBy", &self.provided_by, &new.provided_by);
    }
}

/// WGS84 coordinates
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct GeographicalCoordinates {
    pub lon: f64,
    pub lat: f64,
}

impl Diff for GeographicalCoordinates {
    fn diff_to(&self, new: &Self, patch: &mut Patch) {
        patch.field("lon", &self.lon, &new.lon);
        patch.field("lat", &self.lat, &new.lat);
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct UncertaintyEllipse {
    #[serde(rename = "semiMajor")]
    pub semi_major: f32,
    #[serde(rename = "semiMinor")]
    pub semi_minor: f32,
    #[serde(rename = "orientationMajor")]
    pub orientation_major: u8,
}

impl Diff for UncertaintyEllipse {
    fn diff_to(&self, new: &Self, patch: &mut Patch) {
        patch.field("semiMajor", &self.semi_major, &new.semi_major);
        patch.field("semiMinor", &self.semi_minor, &new.semi_minor);
        patch.field("orientationMajor", &self.orientation_major, &new.orientation_major);
    }
}

/// Geographic area shape, tagged by `shape` on the wire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "shape")]
pub enum GeographicArea {
    #[serde(rename = "POINT")]
    Point { point: GeographicalCoordinates },
    #[serde(rename = "POINT_UNCERTAINTY_CIRCLE")]
    PointUncertaintyCircle {
        point: GeographicalCoordinates,
        uncertainty: f32,
    },
    #[serde(rename = "POINT_UNCERTAINTY_ELLIPSE")]
    PointUncertaintyEllipse {
        point: GeographicalCoordinates,
        #[serde(rename = "uncertaintyEllipse")]
        uncertainty_ellipse: UncertaintyEllipse,
        confidence: u8,
    },
    #[serde(rename = "POLYGON")]
    Polygon {
        #[serde(rename = "pointList")]
        point_list: Vec<GeographicalCoordinates>,
    },
    #[serde(rename = "POINT_ALTITUDE")]
    PointAltitude {
        point: GeographicalCoordinates,
        altitude: f64,
    },
    #[serde(rename = "POINT_ALTITUDE_UNCERTAINTY")]
    PointAltitudeUncertainty {
        point: GeographicalCoordinates,
        altitude: f64,
        #[serde(rename = "uncertaintyEllipse")]
        uncertainty_ellipse: UncertaintyEllipse,
        #[serde(rename = "uncertaintyAltitude")]
        uncertainty_altitude: f32,
        confidence: u8,
    },
    #[serde(rename = "ELLIPSOID_ARC")]
    EllipsoidArc {
        point: GeographicalCoordinates,
        #[serde(rename = "innerRadius")]
        inner_radius: i32,
        #[serde(rename = "uncertaintyRadius")]
        uncertainty_radius: f32,
        #[serde(rename = "offsetAngle")]
        offset_angle: i32,
        #[serde(rename = "includedAngle")]
        included_angle: i32,
        confidence: u8,
    },
}

impl GeographicArea {
    pub fn shape(&self) -> &'static str {
        match self {
            Self::Point { .. } => "POINT",
            Self::PointUncertaintyCircle { .. } => "POINT_UNCERTAINTY_CIRCLE",
            Self::PointUncertaintyEllipse { .. } => "POINT_UNCERTAINTY_ELLIPSE",
            Self::Polygon { .. } => "POLYGON",
            Self::PointAltitude { .. } => "POINT_ALTITUDE",
            Self::PointAltitudeUncertainty { .. } => "POINT_ALTITUDE_UNCERTAINTY",
            Self::EllipsoidArc { .. } => "ELLIPSOID_ARC",
        }
    }
}

impl Diff for GeographicArea {
    fn diff_to(&self, new: &Self, patch: &mut Patch) {
        use GeographicArea::*;

        match (self, new) {
            (Point { point: a }, Point { point: b }) => patch.field("point", a, b),
            (
                PointUncertaintyCircle { point: pa, uncertainty: ua },
                PointUncertaintyCircle { point: pb, uncertainty: ub },
            ) => {
                patch.field("point", pa, pb);
                patch.field("uncertainty", ua, ub);
            }
            (
                PointUncertaintyEllipse { point: pa, uncertainty_ellipse: ea, confidence: ca },
                PointUncertaintyEllipse { point: pb, uncertainty_ellipse: eb, confidence: cb },
            ) => {
                patch.field("point", pa, pb);
                patch.field("uncertaintyEllipse", ea, eb);
                patch.field("confidence", ca, cb);
            }
            (Polygon { point_list: a }, Polygon { point_list: b }) => {
                patch.field("pointList", a, b);
            }
            (
                PointAltitude { point: pa, altitude: aa },
                PointAltitude { point: pb, altitude: ab },
            ) => {
                patch.field("point", pa, pb);
                patch.field("altitude", aa, ab);
            }
            (
                PointAltitudeUncertainty {
                    point: pa,
                    altitude: aa,
                    uncertainty_ellipse: ea,
                    uncertainty_altitude: ua,
                    confidence: ca,
                },
                PointAltitudeUncertainty {
                    point: pb,
                    altitude: ab,
                    uncertainty_ellipse: eb,
                    uncertainty_altitude: ub,
                    confidence: cb,
                },
            ) => {
                patch.field("point", pa, pb);
                patch.field("altitude", aa, ab);
                patch.field("uncertaintyEllipse", ea, eb);
                patch.field("uncertaintyAltitude", ua, ub);
                patch.field("confidence", ca, cb);
            }
            (
                EllipsoidArc {
                    point: pa,
                    inner_radius: ia,
                    uncertainty_radius: ua,
                    offset_angle: oa,
                    included_angle: na,
                    confidence: ca,
                },
                EllipsoidArc {
                    point: pb,
                    inner_radius: ib,
                    uncertainty_radius: ub,
                    offset_angle: ob,
                    included_angle: nb,
                    confidence: cb,
                },
            ) => {
                patch.field("point", pa, pb);
                patch.field("innerRadius", ia, ib);
                patch.field("uncertaintyRadius", ua, ub);
                patch.field("offsetAngle", oa, ob);
                patch.field("includedAngle", na, nb);
                patch.field("confidence", ca, cb);
            }
            // A different shape is a different object
            _ => patch.replace(new),
        }
    }
}

/// Service area given as civic addresses and geographic areas
///
/// Equality treats the civic address list as a multiset while the diff
/// walks it positionally; reordering alone compares equal but still
/// produces operations when diffed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtMbsServiceArea {
    #[serde(rename = "civicAddressList", skip_serializing_if = "Vec::is_empty", default)]
    pub civic_address_list: Vec<CivicAddress>,
    #[serde(rename = "geographicAreaList", skip_serializing_if = "Vec::is_empty", default)]
    pub geographic_area_list: Vec<GeographicArea>,
}

impl ExtMbsServiceArea {
    pub fn is_empty(&self) -> bool {
        self.civic_address_list.is_empty() && self.geographic_area_list.is_empty()
    }
}

impl PartialEq for ExtMbsServiceArea {
    fn eq(&self, other: &Self) -> bool {
        same_multiset(&self.civic_address_list, &other.civic_address_list)
            && self.geographic_area_list == other.geographic_area_list
    }
}

impl Diff for ExtMbsServiceArea {
    fn diff_to(&self, new: &Self, patch: &mut Patch) {
        patch.sequence("civicAddressList", &self.civic_address_list, &new.civic_address_list);
        patch.sequence("geographicAreaList", &self.geographic_area_list, &new.geographic_area_list);
    }
}

/// Order-insensitive comparison, duplicates counted
pub(crate) fn same_multiset<T: Ord + Clone>(a: &[T], b: &[T]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut a = a.to_vec();
    let mut b = b.to_vec();
    a.sort();
    b.sort();
    a == b
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::diff_values;
    use crate::patch::PatchOp;
    use serde_json::json;

    fn civic(country: &str, a1: &str) -> CivicAddress {
        CivicAddress {
            country: Some(country.to_string()),
            a1: Some(a1.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_civic_address_equality_ignores_order() {
        let a = ExtMbsServiceArea {
            civic_address_list: vec![civic("DE", "Berlin"), civic("FR", "Paris")],
            ..Default::default()
        };
        let b = ExtMbsServiceArea {
            civic_address_list: vec![civic("FR", "Paris"), civic("DE", "Berlin")],
            ..Default::default()
        };
        assert_eq!(a, b);
        // ...while the patch stays positional
        assert_eq!(diff_values(&a, &b).len(), 4);
    }

    #[test]
    fn test_civic_address_multiset_counts_duplicates() {
        let a = ExtMbsServiceArea {
            civic_address_list: vec![civic("DE", "Berlin"), civic("DE", "Berlin")],
            ..Default::default()
        };
        let b = ExtMbsServiceArea {
            civic_address_list: vec![civic("DE", "Berlin"), civic("FR", "Paris")],
            ..Default::default()
        };
        assert_ne!(a, b);
    }

    #[test]
    fn test_civic_address_wire_names() {
        let doc = serde_json::to_value(civic("DE", "Berlin")).unwrap();
        assert_eq!(doc, json!({"country": "DE", "A1": "Berlin"}));
    }

    #[test]
    fn test_geographic_area_same_shape_patches_fields() {
        let old = GeographicArea::PointUncertaintyCircle {
            point: GeographicalCoordinates { lon: 13.4, lat: 52.5 },
            uncertainty: 10.0,
        };
        let new = GeographicArea::PointUncertaintyCircle {
            point: GeographicalCoordinates { lon: 13.4, lat: 52.5 },
            uncertainty: 20.0,
        };
        assert_eq!(
            diff_values(&old, &new),
            vec![PatchOp::replace("/uncertainty", Some(json!(20.0)))]
        );
    }

    #[test]
    fn test_geographic_area_shape_change_replaces() {
        let old = GeographicArea::Point {
            point: GeographicalCoordinates { lon: 1.0, lat: 2.0 },
        };
        let new = GeographicArea::PointAltitude {
            point: GeographicalCoordinates { lon: 1.0, lat: 2.0 },
            altitude: 30.0,
        };
        let ops = diff_values(&old, &new);
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].path, "/");
        assert_eq!(ops[0].value.as_ref().unwrap()["shape"], json!("POINT_ALTITUDE"));
        assert_eq!(new.shape(), "POINT_ALTITUDE");
    }

    #[test]
    fn test_polygon_point_appended() {
        let p = |lon: f64, lat: f64| GeographicalCoordinates { lon, lat };
        let old = GeographicArea::Polygon {
            point_list: vec![p(0.0, 0.0), p(1.0, 0.0), p(1.0, 1.0)],
        };
        let new = GeographicArea::Polygon {
            point_list: vec![p(0.0, 0.0), p(1.0, 0.0), p(1.0, 1.0), p(0.0, 1.0)],
        };
        assert_eq!(
            diff_values(&old, &new),
            vec![PatchOp::add("/pointList/-", Some(json!({"lon": 0.0, "lat": 1.0})))]
        );
    }

    #[test]
    fn test_cell_area_hex_encoding() {
        let area = MbsServiceArea {
            ncgi_list: vec![NcgiTai {
                tai: Tai {
                    plmn_id: PlmnId::new("001", "01"),
                    tac: Tac(1),
                    nid: None,
                },
                cell_list: vec![Ncgi {
                    plmn_id: PlmnId::new("001", "01"),
                    nr_cell_id: NrCellId(0x10),
                    nid: Some(Nid(0x1)),
                }],
            }],
            tai_list: Vec::new(),
        };
        let doc = serde_json::to_value(&area).unwrap();
        assert_eq!(doc["ncgiList"][0]["tai"]["tac"], json!("000001"));
        assert_eq!(doc["ncgiList"][0]["cellList"][0]["nrCellId"], json!("000000010"));
        assert_eq!(doc["ncgiList"][0]["cellList"][0]["nid"], json!("00000000001"));
        assert!(doc.get("taiList").is_none());
    }
}
