//! Property-based tests for the diff engine and the reconciliation

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use crate::config::MbsmfConfig;
    use crate::context::Context;
    use crate::diff::{diff_values, Patch};
    use crate::encode::{BitRate, FsaId};
    use crate::intent::{SessionCreated, SessionKey, SubscriptionAck, SubscriptionKey};
    use crate::model::{
        Arp, MbsMediaComp, MbsQosReq, MbsServiceInfo, MbsSession, MbsSessionId,
        MbsSessionSubscription, MbsSessionType, PlmnId, PreemptionCapability,
        PreemptionVulnerability, Ssm, Tmgi,
    };
    use crate::patch::{PatchOp, PatchOpKind};
    use proptest::prelude::*;
    use serde_json::Value;

    fn arb_tmgi() -> impl Strategy<Value = Tmgi> {
        (0u32..0xFFFFFF, 0u8..3).prop_map(|(sid, mnc)| {
            Tmgi::new(format!("{sid:06X}"), PlmnId::new("001", format!("{mnc:02}")))
        })
    }

    fn arb_ssm() -> impl Strategy<Value = Ssm> {
        (1u8..255, 1u8..255).prop_map(|(src, grp)| {
            Ssm::new(
                format!("10.0.0.{src}").parse().unwrap(),
                format!("232.0.0.{grp}").parse().unwrap(),
            )
            .unwrap()
        })
    }

    fn arb_media_comp(num: u32) -> impl Strategy<Value = MbsMediaComp> {
        (
            prop::collection::vec("[a-z ]{1,12}", 0..4),
            prop::option::of(1u16..=4095),
            prop::option::of(1u64..10_000_000),
        )
            .prop_map(move |(flows, window, mbr)| {
                let mut comp = MbsMediaComp::new(num);
                comp.mbs_flow_descs = flows;
                let mut req = MbsQosReq::new(9);
                req.aver_window = window;
                req.max_bit_rate = mbr.map(BitRate);
                comp.mbs_qos_req = Some(req);
                comp
            })
    }

    fn arb_service_info() -> impl Strategy<Value = MbsServiceInfo> {
        (
            prop::collection::btree_set(0u32..6, 0..4),
            prop::option::of("[a-z]{1,8}"),
        )
            .prop_flat_map(|(nums, app)| {
                let comps: Vec<_> = nums.into_iter().map(arb_media_comp).collect();
                (comps, Just(app))
            })
            .prop_map(|(comps, app)| {
                let mut info = MbsServiceInfo {
                    af_app_id: app,
                    ..Default::default()
                };
                for comp in comps {
                    info.add_media_comp(comp);
                }
                info
            })
    }

    fn arb_session() -> impl Strategy<Value = MbsSession> {
        (
            prop::option::of(arb_tmgi()),
            prop::option::of(arb_ssm()),
            any::<bool>(),
            prop::option::of(any::<u16>()),
            prop::collection::vec(0u32..0xFFFFFF, 0..4),
            prop::option::of(arb_service_info()),
        )
            .prop_map(|(tmgi, ssm, broadcast, area, fsa, info)| MbsSession {
                mbs_session_id: MbsSessionId { tmgi, ssm },
                service_type: if broadcast {
                    MbsSessionType::Broadcast
                } else {
                    MbsSessionType::Multicast
                },
                location_dependent: area.is_some(),
                area_session_id: area,
                mbs_fsa_id_list: fsa.into_iter().map(FsaId).collect::<Vec<_>>().into(),
                mbs_serv_info: info,
                ..Default::default()
            })
    }

    fn arb_arp() -> impl Strategy<Value = Arp> {
        (1u8..=15, any::<bool>(), any::<bool>()).prop_map(|(level, may, vuln)| {
            let cap = if may {
                PreemptionCapability::MayPreempt
            } else {
                PreemptionCapability::NotPreempt
            };
            let vuln = if vuln {
                PreemptionVulnerability::Preemptable
            } else {
                PreemptionVulnerability::NotPreemptable
            };
            Arp::new(level, cap, vuln).unwrap()
        })
    }

    fn arb_qos_req() -> impl Strategy<Value = MbsQosReq> {
        (
            1u8..10,
            prop::option::of(1u64..10_000_000),
            prop::option::of(1u64..10_000_000),
            prop::option::of(1u16..=4095),
            prop::option::of(arb_arp()),
        )
            .prop_map(|(five_qi, gbr, mbr, window, arp)| MbsQosReq {
                five_qi,
                guar_bit_rate: gbr.map(BitRate),
                max_bit_rate: mbr.map(BitRate),
                aver_window: window,
                req_mbs_arp: arp,
            })
    }

    /// Service info whose components carry no positional lists
    fn arb_listless_service_info() -> impl Strategy<Value = MbsServiceInfo> {
        arb_service_info().prop_map(|mut info| {
            for comp in info.mbs_media_comps.values_mut() {
                comp.mbs_flow_descs.clear();
            }
            info
        })
    }

    /// Every op must point into the document it touches: `remove` and
    /// `replace` into the old one, and `add`/`replace` values must be what
    /// the new one holds there.
    fn check_op_targets(ops: &[PatchOp], old: &Value, new: &Value) -> Result<(), TestCaseError> {
        for op in ops {
            match op.op {
                PatchOpKind::Remove => {
                    prop_assert!(old.pointer(&op.path).is_some(), "remove {} not in old", op.path);
                }
                PatchOpKind::Replace => {
                    prop_assert!(old.pointer(&op.path).is_some(), "replace {} not in old", op.path);
                    prop_assert_eq!(op.value.as_ref(), new.pointer(&op.path));
                }
                PatchOpKind::Add => {
                    prop_assert_eq!(op.value.as_ref(), new.pointer(&op.path));
                }
            }
        }
        Ok(())
    }

    /// Undo `ops` on `new`, restoring each touched member from `old`
    fn revert(ops: &[PatchOp], old: &Value, new: &Value) -> Value {
        let mut doc = new.clone();
        for op in ops.iter().rev() {
            let Some((parent, member)) = op.path.rsplit_once('/') else {
                continue;
            };
            let Some(Value::Object(members)) = doc.pointer_mut(parent) else {
                continue;
            };
            match old.pointer(&op.path) {
                Some(value) => {
                    members.insert(member.to_string(), value.clone());
                }
                None => {
                    members.remove(member);
                }
            }
        }
        doc
    }

    proptest! {
        #[test]
        fn prop_diff_of_equal_values_is_empty(session in arb_session()) {
            let copy = session.clone();
            prop_assert!(diff_values(&session, &copy).is_empty());
        }

        #[test]
        fn prop_qos_diff_reverts_to_old(old in arb_qos_req(), new in arb_qos_req()) {
            let (old_doc, new_doc) = (serde_json::to_value(&old).unwrap(), serde_json::to_value(&new).unwrap());
            let ops = diff_values(&old, &new);
            check_op_targets(&ops, &old_doc, &new_doc)?;
            prop_assert_eq!(revert(&ops, &old_doc, &new_doc), old_doc);
        }

        #[test]
        fn prop_service_info_diff_reverts_to_old(
            old in arb_listless_service_info(),
            new in arb_listless_service_info(),
        ) {
            let (old_doc, new_doc) = (serde_json::to_value(&old).unwrap(), serde_json::to_value(&new).unwrap());
            let ops = diff_values(&old, &new);
            check_op_targets(&ops, &old_doc, &new_doc)?;
            prop_assert_eq!(revert(&ops, &old_doc, &new_doc), old_doc);
        }

        #[test]
        fn prop_map_diff_counts_key_changes(
            old in prop::collection::btree_map(0u32..16, 0u16..4, 0..10),
            new in prop::collection::btree_map(0u32..16, 0u16..4, 0..10),
        ) {
            let old_keys: BTreeSet<_> = old.keys().collect();
            let new_keys: BTreeSet<_> = new.keys().collect();
            let removed = old_keys.difference(&new_keys).count();
            let added = new_keys.difference(&old_keys).count();
            let changed = old_keys
                .intersection(&new_keys)
                .filter(|k| old[**k] != new[**k])
                .count();

            let ops = diff_values(&old, &new);
            prop_assert_eq!(ops.len(), removed + added + changed);
            prop_assert_eq!(ops.iter().filter(|op| op.op == PatchOpKind::Remove).count(), removed);
            prop_assert_eq!(ops.iter().filter(|op| op.op == PatchOpKind::Add).count(), added);
        }

        #[test]
        fn prop_map_diff_is_in_key_order(
            old in prop::collection::btree_map(0u32..100, any::<u8>(), 0..10),
            new in prop::collection::btree_map(0u32..100, any::<u8>(), 0..10),
        ) {
            let keys: Vec<u32> = diff_values(&old, &new)
                .iter()
                .map(|op| op.path.trim_start_matches('/').parse().unwrap())
                .collect();
            let mut sorted = keys.clone();
            sorted.sort();
            prop_assert_eq!(keys, sorted);
        }

        #[test]
        fn prop_dropping_one_distinct_entry_is_one_remove(
            entries in prop::collection::btree_set("[a-z]{1,6}", 1..8),
            pick in any::<prop::sample::Index>(),
        ) {
            let old: Vec<String> = entries.into_iter().collect();
            let at = pick.index(old.len());
            let mut new = old.clone();
            new.remove(at);

            let mut patch = Patch::new();
            patch.list(&old, &new);
            let ops = patch.into_ops();
            prop_assert_eq!(ops.len(), 1);
            prop_assert_eq!(ops[0].op, PatchOpKind::Remove);
            prop_assert_eq!(ops[0].path.clone(), format!("/{at}"));
        }

        #[test]
        fn prop_subscription_held_by_one_session(
            steps in prop::collection::vec((0u8..6, 0usize..8, 0usize..3, any::<bool>()), 1..60),
        ) {
            let mut ctx = Context::new(MbsmfConfig::default());
            let sessions: Vec<SessionKey> = (0..3).map(|_| ctx.session_new().unwrap()).collect();
            let mut subs: Vec<SubscriptionKey> = Vec::new();
            let mut resource = 0u32;

            for (action, sub_pick, session_pick, ok) in steps {
                let session = sessions[session_pick];
                let sub = (!subs.is_empty()).then(|| subs[sub_pick % subs.len()]);
                match action {
                    0 => {
                        if let Ok(key) = ctx.subscription_add(session, MbsSessionSubscription::default()) {
                            subs.push(key);
                        }
                    }
                    1 => {
                        if let Some(sub) = sub {
                            let _ = ctx.subscription_remove(sub);
                        }
                    }
                    2 => {
                        if let Some(sub) = sub {
                            let _ = ctx.subscription_transfer(sub, session);
                        }
                    }
                    3 => {
                        let _ = ctx.push(session);
                    }
                    4 => {
                        resource += 1;
                        let mut created = SessionCreated::new(format!("r{resource}"));
                        if ok {
                            created.subscription_id = Some(format!("bundled{resource}"));
                        }
                        ctx.on_create_result(session, Ok(created));
                    }
                    _ => {
                        if let Some(sub) = sub {
                            resource += 1;
                            ctx.on_subscription_created(sub, Ok(SubscriptionAck::new(format!("s{resource}"))));
                        }
                    }
                }
                ctx.take_intents();

                for sub in &subs {
                    let homes = sessions
                        .iter()
                        .filter_map(|key| ctx.session(*key))
                        .filter(|s| s.bucket_of(*sub).is_some())
                        .count();
                    prop_assert!(homes <= 1, "subscription {} held by {} sessions", sub, homes);
                    if ctx.subscription(*sub).is_some() {
                        prop_assert_eq!(homes, 1);
                    }
                }
            }
        }
    }
}
