#![forbid(unsafe_code)]

//! Action availability for `GET /v1/actions/list`.
//!
//! Uses the same gate and the same [`precondition`] as execution, so an action offered here for an
//! entity is exactly one whose execution would pass the role and lifecycle checks.

use keel_kernel_contracts::action::{ActionDefinition, ActionDomain, EntityType};
use keel_kernel_contracts::MonotonicTimeNs;
use keel_storage::TenantPartition;
use serde::Serialize;

use crate::error::ActionError;
use crate::executor::ActionEngine;
use crate::gate::{self, RequestContext};
use crate::handlers::{precondition, Precondition};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AvailableAction {
    #[serde(rename = "action")]
    pub action_id: &'static str,
    pub label: &'static str,
    pub execution_class: &'static str,
    pub requires_confirmation: bool,
    pub requires_signature: bool,
}

impl AvailableAction {
    fn from_definition(def: &ActionDefinition) -> Self {
        Self {
            action_id: def.action_id,
            label: def.label,
            execution_class: def.execution_class.as_str(),
            requires_confirmation: def.requires_confirmation(),
            requires_signature: def.requires_signature(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionList {
    pub domain: &'static str,
    pub role: &'static str,
    pub yacht_id: String,
    pub actions: Vec<AvailableAction>,
}

/// Entity types an entity-scoped action of `def` may target. History reads accept any family.
fn target_types(def: &'static ActionDefinition) -> &'static [EntityType] {
    if def.entity_type == EntityType::AuditEntry {
        &EntityType::ALL
    } else {
        std::slice::from_ref(&def.entity_type)
    }
}

fn offered_for_entity(
    p: &TenantPartition,
    ctx: &RequestContext,
    def: &'static ActionDefinition,
    entity_id: &str,
) -> bool {
    if def.creates_entity || def.entity_id_field.is_none() {
        return false;
    }
    target_types(def).iter().any(|t| {
        matches!(
            precondition(p, ctx, def.action_id, *t, entity_id),
            Ok(Precondition::Legal)
        )
    })
}

impl ActionEngine {
    pub fn list_actions(
        &self,
        bearer: Option<&str>,
        domain: &str,
        entity_id: Option<&str>,
        now: MonotonicTimeNs,
    ) -> Result<ActionList, ActionError> {
        let ctx = gate::authenticate(self.store(), bearer, now)?;
        let domain = ActionDomain::parse(domain.trim())?;
        let defs = self.registry().actions_for_domain(domain);
        let allowed = defs.iter().copied().filter(|d| d.allows(ctx.role()));

        let actions: Vec<AvailableAction> = match entity_id.map(str::trim) {
            None | Some("") => allowed.map(AvailableAction::from_definition).collect(),
            Some(id) => self.store().read(ctx.yacht_id(), |p| {
                let known = defs
                    .iter()
                    .filter(|d| d.entity_id_field.is_some() && !d.creates_entity)
                    .flat_map(|d| target_types(*d).iter())
                    .any(|t| p.entity_exists(*t, id));
                if !known {
                    return Err(ActionError::NotFound(format!(
                        "no {} entity '{id}' found",
                        domain.as_str()
                    )));
                }
                Ok(allowed
                    .filter(|d| offered_for_entity(p, &ctx, *d, id))
                    .map(AvailableAction::from_definition)
                    .collect())
            })??,
        };
        tracing::debug!(
            domain = domain.as_str(),
            role = ctx.role().as_str(),
            count = actions.len(),
            "listed actions"
        );
        Ok(ActionList {
            domain: domain.as_str(),
            role: ctx.role().as_str(),
            yacht_id: ctx.yacht_id().to_string(),
            actions,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::ActionRequest;
    use crate::testkit::{engine, signature, CAPTAIN, CREW, CREW_2, CREW_B, HOD, T0};
    use serde_json::{json, Value};

    fn ids(list: &ActionList) -> Vec<&'static str> {
        list.actions.iter().map(|a| a.action_id).collect()
    }

    fn exec(e: &ActionEngine, token: &str, action: &str, payload: Value) -> Value {
        Value::Object(
            e.execute(&ActionRequest::new(Some(token), action, payload), T0)
                .unwrap()
                .result,
        )
    }

    #[test]
    fn at_avail_01_domain_listing_filters_by_role() {
        let e = engine();
        let crew = e.list_actions(Some(CREW), "work_orders", None, T0).unwrap();
        assert_eq!(
            ids(&crew),
            vec!["start_work_order", "add_work_order_note", "view_work_order"]
        );
        assert_eq!(crew.role, "crew");
        assert_eq!(crew.yacht_id, "yacht_a");
        let hod = e.list_actions(Some(HOD), "work_orders", None, T0).unwrap();
        assert!(ids(&hod).contains(&"close_work_order"));
        let cancel = hod
            .actions
            .iter()
            .find(|a| a.action_id == "cancel_work_order")
            .unwrap();
        assert!(cancel.requires_confirmation);
        assert_eq!(cancel.execution_class, "CONFIRM");
    }

    #[test]
    fn at_avail_02_entity_listing_agrees_with_execution() {
        let e = engine();
        let wo = exec(&e, HOD, "create_work_order", json!({"title": "Check steering"}));
        let wo = wo["work_order_id"].as_str().unwrap();
        let open = e.list_actions(Some(HOD), "work_orders", Some(wo), T0).unwrap();
        assert!(ids(&open).contains(&"start_work_order"));
        assert!(!ids(&open).contains(&"close_work_order"));
        assert!(!ids(&open).contains(&"create_work_order"));

        let refused = e
            .execute(
                &ActionRequest::new(Some(HOD), "close_work_order", json!({"work_order_id": wo})),
                T0,
            )
            .unwrap_err();
        assert_eq!(refused.code(), "INVALID_STATE_TRANSITION");

        exec(&e, HOD, "start_work_order", json!({"work_order_id": wo}));
        let started = e.list_actions(Some(HOD), "work_orders", Some(wo), T0).unwrap();
        assert!(!ids(&started).contains(&"start_work_order"));
        assert!(ids(&started).contains(&"close_work_order"));
        exec(&e, HOD, "close_work_order", json!({"work_order_id": wo}));
        let closed = e.list_actions(Some(HOD), "work_orders", Some(wo), T0).unwrap();
        assert_eq!(ids(&closed), vec!["view_work_order"]);
    }

    #[test]
    fn at_avail_03_unknown_or_foreign_entity_is_not_found() {
        let e = engine();
        let f = exec(&e, CREW, "report_fault", json!({"title": "Horn weak", "severity": "low"}));
        let fid = f["fault_id"].as_str().unwrap();
        let err = e
            .list_actions(Some(CREW_B), "faults", Some(fid), T0)
            .unwrap_err();
        assert_eq!(err.code(), "NOT_FOUND");
        let err = e
            .list_actions(Some(CREW), "faults", Some("flt_999999"), T0)
            .unwrap_err();
        assert_eq!(err.code(), "NOT_FOUND");
        let bad = e.list_actions(Some(CREW), "galley", None, T0).unwrap_err();
        assert_eq!(bad.code(), "VALIDATION_FAILED");
        let anon = e.list_actions(None, "faults", None, T0).unwrap_err();
        assert_eq!(anon.http_status(), 401);
    }

    #[test]
    fn at_avail_04_promoted_item_offers_no_decisions() {
        let e = engine();
        let item = exec(&e, CREW, "create_shopping_list_item", json!({"part_name": "Zinc anode", "quantity": 4}));
        let item = item["item_id"].as_str().unwrap();
        exec(&e, HOD, "approve_shopping_list_item", json!({"item_id": item}));
        exec(&e, HOD, "promote_candidate_to_part", json!({"item_id": item}));
        let list = e.list_actions(Some(HOD), "shopping_list", Some(item), T0).unwrap();
        assert_eq!(ids(&list), vec!["view_shopping_list_item"]);
    }

    #[test]
    fn at_avail_05_history_is_offered_for_any_entity_family() {
        let e = engine();
        let f = exec(&e, CREW, "report_fault", json!({"title": "Davit slow", "severity": "medium"}));
        let fid = f["fault_id"].as_str().unwrap();
        let list = e.list_actions(Some(CAPTAIN), "audit", Some(fid), T0).unwrap();
        assert_eq!(ids(&list), vec!["view_entity_history"]);
        let crew = e.list_actions(Some(CREW), "audit", Some(fid), T0).unwrap();
        assert!(crew.actions.is_empty());
    }

    #[test]
    fn at_avail_06_outgoing_signer_is_not_offered_the_incoming_signature() {
        let e = engine();
        let draft = exec(&e, HOD, "create_handover_draft", json!({"title": "Rotation 14"}));
        let draft = draft["draft_id"].as_str().unwrap();
        exec(&e, HOD, "add_handover_item", json!({"draft_id": draft, "summary": "Bilge alarm tested"}));
        exec(&e, HOD, "finalize_handover", json!({"draft_id": draft}));
        let export = exec(&e, HOD, "export_handover", json!({"draft_id": draft}));
        let export_id = export["export_id"].as_str().unwrap();
        exec(&e, HOD, "sign_handover_outgoing", json!({"export_id": export_id, "signature": signature("Outgoing")}));

        let outgoing = e.list_actions(Some(HOD), "handover", Some(export_id), T0).unwrap();
        assert!(!ids(&outgoing).contains(&"sign_handover_incoming"));
        let refused = e
            .execute(
                &ActionRequest::new(
                    Some(HOD),
                    "sign_handover_incoming",
                    json!({"export_id": export_id, "signature": signature("Outgoing")}),
                ),
                T0,
            )
            .unwrap_err();
        assert_eq!(refused.code(), "VALIDATION_FAILED");

        let incoming = e.list_actions(Some(CREW_2), "handover", Some(export_id), T0).unwrap();
        assert!(ids(&incoming).contains(&"sign_handover_incoming"));
        let done = exec(&e, CREW_2, "sign_handover_incoming", json!({"export_id": export_id, "signature": signature("Incoming")}));
        assert_eq!(done["status"], json!("completed"));
    }
}
