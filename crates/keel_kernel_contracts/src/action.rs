#![forbid(unsafe_code)]

use serde::Serialize;

use crate::tenancy::Role;
use crate::{ContractViolation, Validate};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionClass {
    Read,
    Mutate,
    /// Requires an explicit `confirmed: true` in the payload.
    Confirm,
    /// Requires a `signature` object in the payload; the audit row carries its digest.
    Signed,
}

impl ExecutionClass {
    pub fn as_str(self) -> &'static str {
        match self {
            ExecutionClass::Read => "READ",
            ExecutionClass::Mutate => "MUTATE",
            ExecutionClass::Confirm => "CONFIRM",
            ExecutionClass::Signed => "SIGNED",
        }
    }

    pub fn is_mutating(self) -> bool {
        !matches!(self, ExecutionClass::Read)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ActionDomain {
    Faults,
    WorkOrders,
    Inventory,
    ShoppingList,
    Certificates,
    Warranty,
    HoursOfRest,
    Handover,
    Audit,
}

impl ActionDomain {
    pub const ALL: [ActionDomain; 9] = [
        ActionDomain::Faults,
        ActionDomain::WorkOrders,
        ActionDomain::Inventory,
        ActionDomain::ShoppingList,
        ActionDomain::Certificates,
        ActionDomain::Warranty,
        ActionDomain::HoursOfRest,
        ActionDomain::Handover,
        ActionDomain::Audit,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ActionDomain::Faults => "faults",
            ActionDomain::WorkOrders => "work_orders",
            ActionDomain::Inventory => "inventory",
            ActionDomain::ShoppingList => "shopping_list",
            ActionDomain::Certificates => "certificates",
            ActionDomain::Warranty => "warranty",
            ActionDomain::HoursOfRest => "hours_of_rest",
            ActionDomain::Handover => "handover",
            ActionDomain::Audit => "audit",
        }
    }

    pub fn parse(s: &str) -> Result<Self, ContractViolation> {
        ActionDomain::ALL
            .into_iter()
            .find(|d| d.as_str() == s)
            .ok_or(ContractViolation::InvalidValue {
                field: "domain",
                reason: "unknown action domain",
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EntityType {
    Fault,
    WorkOrder,
    Part,
    ShoppingListItem,
    Certificate,
    WarrantyClaim,
    HoursOfRestRecord,
    RestWarning,
    MonthlySignoff,
    HandoverDraft,
    HandoverExport,
    AuditEntry,
}

impl EntityType {
    pub const ALL: [EntityType; 12] = [
        EntityType::Fault,
        EntityType::WorkOrder,
        EntityType::Part,
        EntityType::ShoppingListItem,
        EntityType::Certificate,
        EntityType::WarrantyClaim,
        EntityType::HoursOfRestRecord,
        EntityType::RestWarning,
        EntityType::MonthlySignoff,
        EntityType::HandoverDraft,
        EntityType::HandoverExport,
        EntityType::AuditEntry,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EntityType::Fault => "fault",
            EntityType::WorkOrder => "work_order",
            EntityType::Part => "part",
            EntityType::ShoppingListItem => "shopping_list_item",
            EntityType::Certificate => "certificate",
            EntityType::WarrantyClaim => "warranty_claim",
            EntityType::HoursOfRestRecord => "hours_of_rest_record",
            EntityType::RestWarning => "rest_warning",
            EntityType::MonthlySignoff => "monthly_signoff",
            EntityType::HandoverDraft => "handover_draft",
            EntityType::HandoverExport => "handover_export",
            EntityType::AuditEntry => "audit_entry",
        }
    }

    pub fn parse(s: &str) -> Result<Self, ContractViolation> {
        EntityType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or(ContractViolation::InvalidValue {
                field: "entity_type",
                reason: "unknown entity type",
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdempotencyPolicy {
    /// Key must be supplied; absence is a missing-field failure.
    Required,
    /// Key is reserved when supplied.
    Optional,
    /// Reads never consult the ledger.
    NotApplicable,
}

/// One row of the static action catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionDefinition {
    pub action_id: &'static str,
    pub label: &'static str,
    pub domain: ActionDomain,
    pub execution_class: ExecutionClass,
    pub entity_type: EntityType,
    /// Payload key naming the target entity; `None` for creating actions.
    pub entity_id_field: Option<&'static str>,
    pub required_fields: &'static [&'static str],
    pub allowed_roles: &'static [Role],
    pub idempotency: IdempotencyPolicy,
    pub creates_entity: bool,
}

impl ActionDefinition {
    pub fn allows(&self, role: Role) -> bool {
        self.allowed_roles.contains(&role)
    }

    pub fn requires_confirmation(&self) -> bool {
        self.execution_class == ExecutionClass::Confirm
    }

    pub fn requires_signature(&self) -> bool {
        self.execution_class == ExecutionClass::Signed
    }
}

impl Validate for ActionDefinition {
    fn validate(&self) -> Result<(), ContractViolation> {
        crate::common::validate_id("action_definition.action_id", self.action_id, 64)?;
        if self.allowed_roles.is_empty() {
            return Err(ContractViolation::InvalidValue {
                field: "action_definition.allowed_roles",
                reason: "must not be empty",
            });
        }
        if self.requires_signature() && !self.required_fields.contains(&"signature") {
            return Err(ContractViolation::InvalidValue {
                field: "action_definition.required_fields",
                reason: "SIGNED actions must require signature",
            });
        }
        if self.requires_confirmation() && !self.required_fields.contains(&"confirmed") {
            return Err(ContractViolation::InvalidValue {
                field: "action_definition.required_fields",
                reason: "CONFIRM actions must require confirmed",
            });
        }
        if self.idempotency == IdempotencyPolicy::Required
            && !self.required_fields.contains(&"idempotency_key")
        {
            return Err(ContractViolation::InvalidValue {
                field: "action_definition.required_fields",
                reason: "required idempotency must list idempotency_key",
            });
        }
        if (self.execution_class == ExecutionClass::Read)
            != (self.idempotency == IdempotencyPolicy::NotApplicable)
        {
            return Err(ContractViolation::InvalidValue {
                field: "action_definition.idempotency",
                reason: "only READ actions skip the idempotency ledger",
            });
        }
        if self.creates_entity == self.entity_id_field.is_some() {
            return Err(ContractViolation::InvalidValue {
                field: "action_definition.entity_id_field",
                reason: "creating actions have no target id; all others do",
            });
        }
        if let Some(f) = self.entity_id_field {
            if !self.required_fields.contains(&f) {
                return Err(ContractViolation::InvalidValue {
                    field: "action_definition.entity_id_field",
                    reason: "target id field must be required",
                });
            }
        }
        Ok(())
    }
}
