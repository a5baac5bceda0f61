#![forbid(unsafe_code)]

//! Static action catalog.
//!
//! Every executable action is one row here. The executor and the action-list endpoint both read
//! this table; nothing else decides which roles may run an action or which payload fields it needs.

use std::collections::BTreeMap;

use keel_kernel_contracts::action::{
    ActionDefinition, ActionDomain, EntityType, ExecutionClass, IdempotencyPolicy,
};
use keel_kernel_contracts::tenancy::Role;
use keel_kernel_contracts::{ContractViolation, Validate};

const ALL: &[Role] = &[Role::Crew, Role::ChiefEngineer, Role::Captain];
const HOD_CAPTAIN: &[Role] = &[Role::ChiefEngineer, Role::Captain];
const CREW_HOD: &[Role] = &[Role::Crew, Role::ChiefEngineer];
const CREW: &[Role] = &[Role::Crew];
const HOD: &[Role] = &[Role::ChiefEngineer];
const CAPTAIN: &[Role] = &[Role::Captain];

const fn create(
    action_id: &'static str,
    label: &'static str,
    domain: ActionDomain,
    entity_type: EntityType,
    required_fields: &'static [&'static str],
    allowed_roles: &'static [Role],
) -> ActionDefinition {
    ActionDefinition {
        action_id,
        label,
        domain,
        execution_class: ExecutionClass::Mutate,
        entity_type,
        entity_id_field: None,
        required_fields,
        allowed_roles,
        idempotency: IdempotencyPolicy::Optional,
        creates_entity: true,
    }
}

#[allow(clippy::too_many_arguments)]
const fn on_entity(
    action_id: &'static str,
    label: &'static str,
    domain: ActionDomain,
    execution_class: ExecutionClass,
    entity_type: EntityType,
    entity_id_field: &'static str,
    required_fields: &'static [&'static str],
    allowed_roles: &'static [Role],
) -> ActionDefinition {
    let idempotency = match execution_class {
        ExecutionClass::Read => IdempotencyPolicy::NotApplicable,
        _ => IdempotencyPolicy::Optional,
    };
    ActionDefinition {
        action_id,
        label,
        domain,
        execution_class,
        entity_type,
        entity_id_field: Some(entity_id_field),
        required_fields,
        allowed_roles,
        idempotency,
        creates_entity: false,
    }
}

use ActionDomain as D;
use EntityType as E;
use ExecutionClass::{Confirm, Mutate, Read, Signed};

#[rustfmt::skip]
static ACTIONS: &[ActionDefinition] = &[
    // faults
    create("report_fault", "Report fault", D::Faults, E::Fault, &["title", "severity"], ALL),
    on_entity("acknowledge_fault", "Acknowledge fault", D::Faults, Mutate, E::Fault, "fault_id", &["fault_id"], HOD_CAPTAIN),
    on_entity("diagnose_fault", "Diagnose fault", D::Faults, Mutate, E::Fault, "fault_id", &["fault_id", "diagnosis"], HOD_CAPTAIN),
    on_entity("add_fault_note", "Add note", D::Faults, Mutate, E::Fault, "fault_id", &["fault_id", "note"], ALL),
    on_entity("close_fault", "Close fault", D::Faults, Mutate, E::Fault, "fault_id", &["fault_id", "resolution"], HOD_CAPTAIN),
    on_entity("reopen_fault", "Reopen fault", D::Faults, Mutate, E::Fault, "fault_id", &["fault_id", "reason"], HOD_CAPTAIN),
    on_entity("mark_fault_false_alarm", "Mark as false alarm", D::Faults, Confirm, E::Fault, "fault_id", &["fault_id", "confirmed"], HOD_CAPTAIN),
    on_entity("view_fault", "View fault", D::Faults, Read, E::Fault, "fault_id", &["fault_id"], ALL),
    // work orders
    create("create_work_order", "Create work order", D::WorkOrders, E::WorkOrder, &["title"], HOD_CAPTAIN),
    on_entity("assign_work_order", "Assign", D::WorkOrders, Mutate, E::WorkOrder, "work_order_id", &["work_order_id", "assignee_id"], HOD_CAPTAIN),
    on_entity("start_work_order", "Start work", D::WorkOrders, Mutate, E::WorkOrder, "work_order_id", &["work_order_id"], ALL),
    on_entity("add_work_order_note", "Add note", D::WorkOrders, Mutate, E::WorkOrder, "work_order_id", &["work_order_id", "note"], ALL),
    on_entity("close_work_order", "Close work order", D::WorkOrders, Mutate, E::WorkOrder, "work_order_id", &["work_order_id"], HOD_CAPTAIN),
    on_entity("cancel_work_order", "Cancel work order", D::WorkOrders, Confirm, E::WorkOrder, "work_order_id", &["work_order_id", "reason", "confirmed"], HOD_CAPTAIN),
    on_entity("view_work_order", "View work order", D::WorkOrders, Read, E::WorkOrder, "work_order_id", &["work_order_id"], ALL),
    // inventory
    ActionDefinition {
        idempotency: IdempotencyPolicy::Required,
        ..on_entity("receive_part", "Receive stock", D::Inventory, Mutate, E::Part, "part_id", &["part_id", "to_location", "quantity", "idempotency_key"], ALL)
    },
    ActionDefinition {
        idempotency: IdempotencyPolicy::Required,
        ..on_entity("consume_part", "Consume stock", D::Inventory, Mutate, E::Part, "part_id", &["part_id", "from_location", "quantity", "idempotency_key"], ALL)
    },
    on_entity("archive_part", "Archive part", D::Inventory, Confirm, E::Part, "part_id", &["part_id", "confirmed"], HOD_CAPTAIN),
    on_entity("view_part", "View part", D::Inventory, Read, E::Part, "part_id", &["part_id"], ALL),
    // shopping list
    create("create_shopping_list_item", "Request part", D::ShoppingList, E::ShoppingListItem, &["part_name", "quantity"], CREW_HOD),
    on_entity("approve_shopping_list_item", "Approve", D::ShoppingList, Mutate, E::ShoppingListItem, "item_id", &["item_id"], HOD_CAPTAIN),
    on_entity("reject_shopping_list_item", "Reject", D::ShoppingList, Mutate, E::ShoppingListItem, "item_id", &["item_id", "reason"], HOD_CAPTAIN),
    on_entity("promote_candidate_to_part", "Promote to part", D::ShoppingList, Mutate, E::ShoppingListItem, "item_id", &["item_id"], HOD_CAPTAIN),
    on_entity("view_shopping_list_item", "View request", D::ShoppingList, Read, E::ShoppingListItem, "item_id", &["item_id"], ALL),
    // certificates
    create("create_certificate", "Add certificate", D::Certificates, E::Certificate, &["name", "issuing_authority", "expires_on"], HOD_CAPTAIN),
    on_entity("renew_certificate", "Renew", D::Certificates, Mutate, E::Certificate, "certificate_id", &["certificate_id", "expires_on"], HOD_CAPTAIN),
    on_entity("suspend_certificate", "Suspend", D::Certificates, Mutate, E::Certificate, "certificate_id", &["certificate_id", "reason"], CAPTAIN),
    on_entity("reinstate_certificate", "Reinstate", D::Certificates, Mutate, E::Certificate, "certificate_id", &["certificate_id"], CAPTAIN),
    on_entity("revoke_certificate", "Revoke", D::Certificates, Confirm, E::Certificate, "certificate_id", &["certificate_id", "reason", "confirmed"], CAPTAIN),
    on_entity("view_certificate", "View certificate", D::Certificates, Read, E::Certificate, "certificate_id", &["certificate_id"], ALL),
    // warranty
    create("create_warranty_claim", "Draft warranty claim", D::Warranty, E::WarrantyClaim, &["title", "description"], CREW_HOD),
    on_entity("submit_warranty_claim", "Submit claim", D::Warranty, Mutate, E::WarrantyClaim, "claim_id", &["claim_id"], HOD),
    on_entity("approve_warranty_claim", "Approve claim", D::Warranty, Mutate, E::WarrantyClaim, "claim_id", &["claim_id"], CAPTAIN),
    on_entity("reject_warranty_claim", "Reject claim", D::Warranty, Mutate, E::WarrantyClaim, "claim_id", &["claim_id", "reason"], CAPTAIN),
    on_entity("close_warranty_claim", "Close claim", D::Warranty, Mutate, E::WarrantyClaim, "claim_id", &["claim_id"], HOD_CAPTAIN),
    on_entity("view_warranty_claim", "View claim", D::Warranty, Read, E::WarrantyClaim, "claim_id", &["claim_id"], ALL),
    // hours of rest
    create("record_hours_of_rest", "Record rest", D::HoursOfRest, E::HoursOfRestRecord, &["record_date", "rest_hours"], ALL),
    on_entity("acknowledge_rest_warning", "Acknowledge warning", D::HoursOfRest, Mutate, E::RestWarning, "warning_id", &["warning_id"], ALL),
    on_entity("dismiss_rest_warning", "Dismiss warning", D::HoursOfRest, Mutate, E::RestWarning, "warning_id", &["warning_id", "reason"], HOD_CAPTAIN),
    create("create_monthly_signoff", "Start monthly sign-off", D::HoursOfRest, E::MonthlySignoff, &["month"], CREW),
    on_entity("crew_sign_monthly_signoff", "Sign (crew)", D::HoursOfRest, Signed, E::MonthlySignoff, "signoff_id", &["signoff_id", "signature"], CREW),
    on_entity("hod_sign_monthly_signoff", "Sign (HOD)", D::HoursOfRest, Signed, E::MonthlySignoff, "signoff_id", &["signoff_id", "signature"], HOD),
    on_entity("captain_finalize_monthly_signoff", "Finalize (captain)", D::HoursOfRest, Signed, E::MonthlySignoff, "signoff_id", &["signoff_id", "signature"], CAPTAIN),
    on_entity("view_monthly_signoff", "View sign-off", D::HoursOfRest, Read, E::MonthlySignoff, "signoff_id", &["signoff_id"], ALL),
    // handover
    create("create_handover_draft", "Start handover", D::Handover, E::HandoverDraft, &["title"], ALL),
    on_entity("add_handover_item", "Add item", D::Handover, Mutate, E::HandoverDraft, "draft_id", &["draft_id", "summary"], ALL),
    on_entity("finalize_handover", "Finalize", D::Handover, Mutate, E::HandoverDraft, "draft_id", &["draft_id"], HOD_CAPTAIN),
    on_entity("export_handover", "Export", D::Handover, Mutate, E::HandoverDraft, "draft_id", &["draft_id"], HOD_CAPTAIN),
    on_entity("sign_handover_outgoing", "Sign (outgoing)", D::Handover, Signed, E::HandoverExport, "export_id", &["export_id", "signature"], ALL),
    on_entity("sign_handover_incoming", "Sign (incoming)", D::Handover, Signed, E::HandoverExport, "export_id", &["export_id", "signature"], ALL),
    on_entity("verify_handover_export", "Verify export", D::Handover, Read, E::HandoverExport, "export_id", &["export_id"], ALL),
    // audit
    on_entity("view_entity_history", "View history", D::Audit, Read, E::AuditEntry, "entity_id", &["entity_type", "entity_id"], HOD_CAPTAIN),
];

#[derive(Debug, Clone, PartialEq)]
pub enum RegistryError {
    UnknownAction(String),
    DuplicateAction(&'static str),
    InvalidDefinition {
        action_id: &'static str,
        violation: ContractViolation,
    },
}

impl std::fmt::Display for RegistryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownAction(id) => write!(f, "unknown action '{id}'"),
            Self::DuplicateAction(id) => write!(f, "action '{id}' is declared twice"),
            Self::InvalidDefinition {
                action_id,
                violation,
            } => write!(f, "action '{action_id}' is malformed: {violation}"),
        }
    }
}

impl std::error::Error for RegistryError {}

/// Validated, indexed view over the static catalog.
#[derive(Debug, Clone)]
pub struct ActionRegistry {
    by_id: BTreeMap<&'static str, &'static ActionDefinition>,
}

impl ActionRegistry {
    pub fn load() -> Result<Self, RegistryError> {
        Self::from_definitions(ACTIONS)
    }

    pub fn from_definitions(defs: &'static [ActionDefinition]) -> Result<Self, RegistryError> {
        let mut by_id = BTreeMap::new();
        for def in defs {
            def.validate()
                .map_err(|violation| RegistryError::InvalidDefinition {
                    action_id: def.action_id,
                    violation,
                })?;
            if by_id.insert(def.action_id, def).is_some() {
                return Err(RegistryError::DuplicateAction(def.action_id));
            }
        }
        Ok(Self { by_id })
    }

    pub fn lookup(&self, action_id: &str) -> Result<&'static ActionDefinition, RegistryError> {
        self.by_id
            .get(action_id)
            .copied()
            .ok_or_else(|| RegistryError::UnknownAction(action_id.to_string()))
    }

    /// Catalog order, so list responses are stable.
    pub fn actions_for_domain(&self, domain: ActionDomain) -> Vec<&'static ActionDefinition> {
        let mut out: Vec<&'static ActionDefinition> = self
            .by_id
            .values()
            .copied()
            .filter(|d| d.domain == domain)
            .collect();
        out.sort_by_key(|d| catalog_position(d.action_id));
        out
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

fn catalog_position(action_id: &str) -> usize {
    ACTIONS
        .iter()
        .position(|d| d.action_id == action_id)
        .unwrap_or(usize::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn at_registry_01_catalog_loads_and_validates() {
        let reg = ActionRegistry::load().unwrap();
        assert_eq!(reg.len(), ACTIONS.len());
        assert!(reg.lookup("acknowledge_fault").is_ok());
        assert_eq!(
            reg.lookup("launch_tender").unwrap_err(),
            RegistryError::UnknownAction("launch_tender".to_string())
        );
    }

    #[test]
    fn at_registry_02_permission_lattice_is_not_a_rank() {
        let reg = ActionRegistry::load().unwrap();
        let create_item = reg.lookup("create_shopping_list_item").unwrap();
        assert!(create_item.allows(Role::Crew));
        assert!(!create_item.allows(Role::Captain));
        let approve_item = reg.lookup("approve_shopping_list_item").unwrap();
        assert!(!approve_item.allows(Role::Crew));
        assert!(approve_item.allows(Role::Captain));
        let submit = reg.lookup("submit_warranty_claim").unwrap();
        assert_eq!(submit.allowed_roles, &[Role::ChiefEngineer]);
    }

    #[test]
    fn at_registry_03_stock_movements_require_idempotency_keys() {
        let reg = ActionRegistry::load().unwrap();
        for id in ["receive_part", "consume_part"] {
            assert_eq!(
                reg.lookup(id).unwrap().idempotency,
                IdempotencyPolicy::Required
            );
        }
        assert_eq!(
            reg.lookup("view_part").unwrap().idempotency,
            IdempotencyPolicy::NotApplicable
        );
    }

    #[test]
    fn at_registry_04_domain_listing_keeps_catalog_order() {
        let reg = ActionRegistry::load().unwrap();
        let ids: Vec<&str> = reg
            .actions_for_domain(ActionDomain::WorkOrders)
            .iter()
            .map(|d| d.action_id)
            .collect();
        assert_eq!(ids.first().copied(), Some("create_work_order"));
        assert_eq!(ids.last().copied(), Some("view_work_order"));
        assert_eq!(ids.len(), 7);
    }

    #[test]
    fn at_registry_05_malformed_definitions_are_rejected() {
        static BAD: &[ActionDefinition] = &[ActionDefinition {
            action_id: "sign_without_signature",
            label: "x",
            domain: ActionDomain::Handover,
            execution_class: ExecutionClass::Signed,
            entity_type: EntityType::HandoverExport,
            entity_id_field: Some("export_id"),
            required_fields: &["export_id"],
            allowed_roles: ALL,
            idempotency: IdempotencyPolicy::Optional,
            creates_entity: false,
        }];
        assert!(matches!(
            ActionRegistry::from_definitions(BAD),
            Err(RegistryError::InvalidDefinition { .. })
        ));

        static DUP: &[ActionDefinition] = &[
            create("report_fault", "a", D::Faults, E::Fault, &["title"], ALL),
            create("report_fault", "b", D::Faults, E::Fault, &["title"], ALL),
        ];
        assert_eq!(
            ActionRegistry::from_definitions(DUP).unwrap_err(),
            RegistryError::DuplicateAction("report_fault")
        );
    }
}
