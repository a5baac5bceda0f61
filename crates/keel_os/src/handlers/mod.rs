#![forbid(unsafe_code)]

//! Per-family action handlers.
//!
//! Handlers never write. A mutating handler reads the tenant partition and returns a
//! [`MutationPlan`]; the executor applies it inside the same transaction. Read handlers return the
//! result map directly.

pub mod certificate;
pub mod fault;
pub mod handover;
pub mod history;
pub mod hours_of_rest;
pub mod inventory;
pub mod shopping_list;
pub mod warranty;
pub mod work_order;

use keel_kernel_contracts::action::{ActionDefinition, ActionDomain, EntityType};
use keel_kernel_contracts::audit::{AuditEntryInput, AuditValues, SignatureRecord};
use keel_kernel_contracts::certificate::CertificateId;
use keel_kernel_contracts::fault::{FaultId, CLOSE_FAULT};
use keel_kernel_contracts::handover::{HandoverDraftId, HandoverExportId, SIGN_HANDOVER_INCOMING};
use keel_kernel_contracts::hours_of_rest::{
    MonthlySignoffId, RestWarningId, ACKNOWLEDGE_REST_WARNING, CREW_SIGN_MONTHLY_SIGNOFF,
};
use keel_kernel_contracts::inventory::PartId;
use keel_kernel_contracts::lifecycle::{governs, transition, Lifecycle};
use keel_kernel_contracts::shopping_list::{
    ShoppingListItemId, ShoppingListStatus, PROMOTE_CANDIDATE_TO_PART,
};
use keel_kernel_contracts::tenancy::{Role, UserId};
use keel_kernel_contracts::warranty::WarrantyClaimId;
use keel_kernel_contracts::work_order::WorkOrderId;
use keel_kernel_contracts::MonotonicTimeNs;
use keel_storage::store::IdAllocator;
use keel_storage::{EntityWrite, KeelStore, TenantPartition};
use serde_json::{Map, Value};

use crate::error::ActionError;
use crate::gate::RequestContext;
use crate::payload::Payload;

/// Document body the executor stores before commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentPut {
    pub document_ref: String,
    pub body: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MutationPlan {
    pub writes: Vec<EntityWrite>,
    pub audits: Vec<AuditEntryInput>,
    pub documents: Vec<DocumentPut>,
    pub result: Map<String, Value>,
    /// Whether the action created a new entity (HTTP 201).
    pub created: bool,
}

impl MutationPlan {
    pub fn new(result: Value) -> Self {
        Self {
            result: into_map(result),
            ..Self::default()
        }
    }

    pub fn created(mut self) -> Self {
        self.created = true;
        self
    }

    pub fn write(mut self, write: EntityWrite) -> Self {
        self.writes.push(write);
        self
    }

    pub fn audit(mut self, audit: AuditEntryInput) -> Self {
        self.audits.push(audit);
        self
    }

    pub fn document(mut self, doc: DocumentPut) -> Self {
        self.documents.push(doc);
        self
    }
}

pub(crate) fn into_map(v: Value) -> Map<String, Value> {
    match v {
        Value::Object(m) => m,
        other => {
            let mut m = Map::new();
            m.insert("value".to_string(), other);
            m
        }
    }
}

/// Everything a handler may consult. Built by the executor after the gate and shape checks.
pub struct HandlerContext<'a> {
    pub request: &'a RequestContext,
    pub def: &'static ActionDefinition,
    pub payload: Payload<'a>,
    pub store: &'a KeelStore,
}

impl<'a> HandlerContext<'a> {
    pub fn action(&self) -> &'static str {
        self.def.action_id
    }

    pub fn now(&self) -> MonotonicTimeNs {
        self.request.now
    }

    pub fn actor(&self) -> &UserId {
        self.request.user_id()
    }

    pub fn ids(&self) -> &IdAllocator {
        self.store.ids()
    }

    pub fn audit(
        &self,
        entity_type: EntityType,
        entity_id: &str,
        old_values: AuditValues,
        new_values: AuditValues,
    ) -> Result<AuditEntryInput, ActionError> {
        self.audit_signed(entity_type, entity_id, old_values, new_values, None)
    }

    pub fn audit_signed(
        &self,
        entity_type: EntityType,
        entity_id: &str,
        old_values: AuditValues,
        new_values: AuditValues,
        signature: Option<SignatureRecord>,
    ) -> Result<AuditEntryInput, ActionError> {
        AuditEntryInput::v1(
            self.now(),
            self.request.yacht_id().clone(),
            entity_type,
            entity_id,
            self.action(),
            self.actor().clone(),
            self.request.role(),
            old_values,
            new_values,
            signature,
        )
        .map_err(|v| ActionError::Internal(format!("audit row rejected: {v}")))
    }

    /// Role of `user_id` when they belong to the caller's yacht.
    pub fn crew_member_role(&self, user_id: &UserId) -> Result<Option<Role>, ActionError> {
        let yacht = self.request.yacht_id();
        self.store
            .directory(|d| {
                d.membership(user_id)
                    .filter(|m| &m.yacht_id == yacht)
                    .map(|m| m.role)
            })
            .map_err(ActionError::from)
    }
}

/// `{"status": "<from>"}` / `{"status": "<to>"}` pair for a plain status change.
pub(crate) fn status_change<S: Lifecycle>(
    from: S,
    to: S,
) -> Result<(AuditValues, AuditValues), ActionError> {
    Ok((
        AuditValues::new().with("status", from.as_str())?,
        AuditValues::new().with("status", to.as_str())?,
    ))
}

/// Result of the lifecycle precondition on an existing entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precondition {
    Legal,
    /// Already in the requested end state; the action replays its original result.
    Replay,
}

fn lifecycle_check<S: Lifecycle>(status: S, action: &str) -> Result<Precondition, ActionError> {
    if governs::<S>(action) {
        transition(status, action)?;
    }
    Ok(Precondition::Legal)
}

/// Entity family and id an action targets. History reads target the entity named in the payload.
pub fn target_of(
    def: &ActionDefinition,
    payload: &Payload<'_>,
) -> Result<Option<(EntityType, String)>, ActionError> {
    let Some(field) = def.entity_id_field else {
        return Ok(None);
    };
    let id = payload.entity_id(field)?;
    let entity_type = if def.entity_type == EntityType::AuditEntry {
        EntityType::parse(&payload.text("entity_type")?)?
    } else {
        def.entity_type
    };
    Ok(Some((entity_type, id)))
}

/// Existence (404) then lifecycle legality (409) for `action` against one entity.
///
/// Shared by execution and the action-list endpoint, so both always agree. Reads only check
/// existence because no family table governs them.
pub fn precondition(
    p: &TenantPartition,
    request: &RequestContext,
    action: &str,
    entity_type: EntityType,
    entity_id: &str,
) -> Result<Precondition, ActionError> {
    let missing = || ActionError::not_found(entity_type.as_str(), entity_id);
    match entity_type {
        EntityType::Fault => {
            let f = FaultId::new(entity_id)
                .ok()
                .and_then(|id| p.fault(&id))
                .ok_or_else(missing)?;
            lifecycle_check(f.status, action)?;
            if action == CLOSE_FAULT
                && p
                    .work_orders_for_fault(&f.fault_id)
                    .iter()
                    .any(|w| w.status.is_active())
            {
                return Err(ActionError::InvalidTransition(format!(
                    "close_fault is not allowed while fault '{entity_id}' has an active work order"
                )));
            }
            Ok(Precondition::Legal)
        }
        EntityType::WorkOrder => {
            let w = WorkOrderId::new(entity_id)
                .ok()
                .and_then(|id| p.work_order(&id))
                .ok_or_else(missing)?;
            lifecycle_check(w.status, action)
        }
        EntityType::Part => {
            let part = PartId::new(entity_id)
                .ok()
                .and_then(|id| p.part(&id))
                .ok_or_else(missing)?;
            lifecycle_check(part.status, action)
        }
        EntityType::ShoppingListItem => {
            let item = ShoppingListItemId::new(entity_id)
                .ok()
                .and_then(|id| p.shopping_list_item(&id))
                .ok_or_else(missing)?;
            if item.status == ShoppingListStatus::Promoted && governs::<ShoppingListStatus>(action)
            {
                if action == PROMOTE_CANDIDATE_TO_PART {
                    return Ok(Precondition::Replay);
                }
                return Err(ActionError::AlreadyPromoted(format!(
                    "shopping list item '{entity_id}' is already promoted"
                )));
            }
            lifecycle_check(item.status, action)
        }
        EntityType::Certificate => {
            let c = CertificateId::new(entity_id)
                .ok()
                .and_then(|id| p.certificate(&id))
                .ok_or_else(missing)?;
            lifecycle_check(c.status, action)
        }
        EntityType::WarrantyClaim => {
            let c = WarrantyClaimId::new(entity_id)
                .ok()
                .and_then(|id| p.warranty_claim(&id))
                .ok_or_else(missing)?;
            lifecycle_check(c.status, action)
        }
        EntityType::HoursOfRestRecord => {
            if p.entity_exists(entity_type, entity_id) {
                Ok(Precondition::Legal)
            } else {
                Err(missing())
            }
        }
        EntityType::RestWarning => {
            let w = RestWarningId::new(entity_id)
                .ok()
                .and_then(|id| p.rest_warning(&id))
                .ok_or_else(missing)?;
            lifecycle_check(w.status, action)?;
            if action == ACKNOWLEDGE_REST_WARNING
                && request.role() == Role::Crew
                && &w.user_id != request.user_id()
            {
                return Err(ActionError::Forbidden(
                    "crew may only acknowledge their own rest warnings".to_string(),
                ));
            }
            Ok(Precondition::Legal)
        }
        EntityType::MonthlySignoff => {
            let s = MonthlySignoffId::new(entity_id)
                .ok()
                .and_then(|id| p.monthly_signoff(&id))
                .ok_or_else(missing)?;
            lifecycle_check(s.status, action)?;
            if action == CREW_SIGN_MONTHLY_SIGNOFF && &s.user_id != request.user_id() {
                return Err(ActionError::Forbidden(
                    "crew may only sign their own monthly sign-off".to_string(),
                ));
            }
            Ok(Precondition::Legal)
        }
        EntityType::HandoverDraft => {
            let d = HandoverDraftId::new(entity_id)
                .ok()
                .and_then(|id| p.handover_draft(&id))
                .ok_or_else(missing)?;
            lifecycle_check(d.status, action)
        }
        EntityType::HandoverExport => {
            let e = HandoverExportId::new(entity_id)
                .ok()
                .and_then(|id| p.handover_export(&id))
                .ok_or_else(missing)?;
            lifecycle_check(e.status, action)?;
            if action == SIGN_HANDOVER_INCOMING
                && e.outgoing_signature
                    .as_ref()
                    .is_some_and(|out| &out.user_id == request.user_id())
            {
                return Err(ActionError::Validation(
                    "the incoming signer must differ from the outgoing signer".to_string(),
                ));
            }
            Ok(Precondition::Legal)
        }
        EntityType::AuditEntry => {
            if p.entity_exists(entity_type, entity_id) {
                Ok(Precondition::Legal)
            } else {
                Err(missing())
            }
        }
    }
}

pub fn plan(cx: &HandlerContext<'_>, p: &TenantPartition) -> Result<MutationPlan, ActionError> {
    match cx.def.domain {
        ActionDomain::Faults => fault::plan(cx, p),
        ActionDomain::WorkOrders => work_order::plan(cx, p),
        ActionDomain::Inventory => inventory::plan(cx, p),
        ActionDomain::ShoppingList => shopping_list::plan(cx, p),
        ActionDomain::Certificates => certificate::plan(cx, p),
        ActionDomain::Warranty => warranty::plan(cx, p),
        ActionDomain::HoursOfRest => hours_of_rest::plan(cx, p),
        ActionDomain::Handover => handover::plan(cx, p),
        ActionDomain::Audit => Err(unhandled(cx)),
    }
}

/// Result of a read handler run under the tenant lock.
pub enum ReadView {
    Ready(Map<String, Value>),
    /// Completed by the executor once the stored document has been fetched, after the lock is
    /// released.
    PendingDocument(handover::PendingVerification),
}

pub fn read(cx: &HandlerContext<'_>, p: &TenantPartition) -> Result<ReadView, ActionError> {
    let v = match cx.def.domain {
        ActionDomain::Faults => fault::read(cx, p)?,
        ActionDomain::WorkOrders => work_order::read(cx, p)?,
        ActionDomain::Inventory => inventory::read(cx, p)?,
        ActionDomain::ShoppingList => shopping_list::read(cx, p)?,
        ActionDomain::Certificates => certificate::read(cx, p)?,
        ActionDomain::Warranty => warranty::read(cx, p)?,
        ActionDomain::HoursOfRest => hours_of_rest::read(cx, p)?,
        ActionDomain::Handover => {
            return handover::read(cx, p).map(ReadView::PendingDocument);
        }
        ActionDomain::Audit => history::read(cx, p)?,
    };
    Ok(ReadView::Ready(into_map(v)))
}

pub(crate) fn unhandled(cx: &HandlerContext<'_>) -> ActionError {
    ActionError::Internal(format!("no handler for '{}'", cx.action()))
}

pub(crate) fn opt_str<T: AsRef<str>>(v: &Option<T>) -> Value {
    match v {
        Some(s) => Value::String(s.as_ref().to_string()),
        None => Value::Null,
    }
}

pub(crate) fn signature_json(s: &Option<SignatureRecord>) -> Value {
    match s {
        Some(s) => serde_json::json!({
            "user_id": s.user_id.as_str(),
            "role": s.role.as_str(),
            "signer_name": s.signer_name,
            "signed_at": s.signed_at.0,
            "signature_hash": s.signature_hash,
        }),
        None => Value::Null,
    }
}
