#![forbid(unsafe_code)]

//! Action executor.
//!
//! Fixed stage order per request: gate (401/403), registry lookup (404), payload shape
//! (400/422), then either a read view or one tenant transaction covering idempotency reservation,
//! lifecycle legality, entity writes, audit rows, document storage and the idempotency snapshot.
//! Any failure inside the transaction rolls the partition back to its state before the call.
//! Reads that need a stored document fetch it after the tenant lock is released.

use std::sync::Arc;

use keel_engines::registry::ActionRegistry;
use keel_kernel_contracts::action::{ActionDefinition, ExecutionClass};
use keel_kernel_contracts::MonotonicTimeNs;
use keel_storage::audit::AuditWriter;
use keel_storage::repo::{KeelEntityRepo, KeelIdempotencyRepo};
use keel_storage::{KeelStore, StorageError};
use serde_json::{Map, Value};
use tracing::{debug, error, info, warn};

use crate::document::DocumentStore;
use crate::error::ActionError;
use crate::gate::{self, RequestContext};
use crate::handlers::{self, precondition, target_of, HandlerContext, MutationPlan, ReadView};
use crate::payload::Payload;

/// One `POST /v1/actions/execute` call after transport decoding.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionRequest {
    pub bearer: Option<String>,
    pub action: String,
    pub context_yacht_id: Option<String>,
    pub payload: Value,
}

impl ActionRequest {
    pub fn new(bearer: Option<&str>, action: &str, payload: Value) -> Self {
        Self {
            bearer: bearer.map(str::to_string),
            action: action.to_string(),
            context_yacht_id: None,
            payload,
        }
    }

    pub fn with_context_yacht(mut self, yacht_id: &str) -> Self {
        self.context_yacht_id = Some(yacht_id.to_string());
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ActionOutcome {
    pub action: &'static str,
    /// 200, or 201 when the action created an entity.
    pub http_status: u16,
    pub result: Map<String, Value>,
}

pub struct ActionEngine {
    store: Arc<KeelStore>,
    registry: ActionRegistry,
    documents: Arc<dyn DocumentStore>,
}

impl ActionEngine {
    pub fn new(store: Arc<KeelStore>, documents: Arc<dyn DocumentStore>) -> Result<Self, ActionError> {
        let registry = ActionRegistry::load()?;
        Ok(Self {
            store,
            registry,
            documents,
        })
    }

    pub fn store(&self) -> &KeelStore {
        &self.store
    }

    pub fn registry(&self) -> &ActionRegistry {
        &self.registry
    }

    /// Resolves a bearer credential to the caller's tenant, principal and role.
    pub fn authenticate(
        &self,
        bearer: Option<&str>,
        now: MonotonicTimeNs,
    ) -> Result<RequestContext, ActionError> {
        Ok(gate::authenticate(&self.store, bearer, now)?)
    }

    pub fn execute(
        &self,
        req: &ActionRequest,
        now: MonotonicTimeNs,
    ) -> Result<ActionOutcome, ActionError> {
        let ctx = match self.authenticate(req.bearer.as_deref(), now) {
            Ok(ctx) => ctx,
            Err(e) => {
                warn!(action = %req.action, code = e.code(), reason = %e, "action refused");
                return Err(e);
            }
        };
        self.execute_as(&ctx, req)
    }

    /// Runs `req` for an already authenticated caller. `req.bearer` is not consulted.
    pub fn execute_as(
        &self,
        ctx: &RequestContext,
        req: &ActionRequest,
    ) -> Result<ActionOutcome, ActionError> {
        let out = self.run(ctx, req);
        match &out {
            Ok(o) => info!(
                yacht_id = %ctx.yacht_id(),
                actor = %ctx.user_id(),
                role = ctx.role().as_str(),
                action = o.action,
                status = o.http_status,
                "action completed"
            ),
            Err(e) if e.is_internal() => error!(
                yacht_id = %ctx.yacht_id(),
                actor = %ctx.user_id(),
                action = %req.action,
                error = %e,
                "action failed"
            ),
            Err(e) => warn!(
                yacht_id = %ctx.yacht_id(),
                actor = %ctx.user_id(),
                action = %req.action,
                code = e.code(),
                reason = %e,
                "action refused"
            ),
        }
        out
    }

    fn run(&self, ctx: &RequestContext, req: &ActionRequest) -> Result<ActionOutcome, ActionError> {
        let def = self.registry.lookup(&req.action)?;
        gate::check_context(ctx, req.context_yacht_id.as_deref())?;
        gate::authorize(ctx, def)?;

        let payload = Payload::new(&req.payload)?;
        payload.check_required(def)?;
        payload.check_shape()?;
        payload.check_class(def)?;

        let cx = HandlerContext {
            request: ctx,
            def,
            payload,
            store: &self.store,
        };
        if def.execution_class == ExecutionClass::Read {
            let view = self.store.read(ctx.yacht_id(), |p| {
                check_target(p, ctx, def, &payload)?;
                handlers::read(&cx, p)
            })??;
            let result = match view {
                ReadView::Ready(result) => result,
                ReadView::PendingDocument(pending) => {
                    let stored = self.documents.get(pending.document_ref())?;
                    pending.finish(stored.as_deref())
                }
            };
            return Ok(ActionOutcome {
                action: def.action_id,
                http_status: 200,
                result,
            });
        }
        self.mutate(&cx, ctx, def)
    }

    fn mutate(
        &self,
        cx: &HandlerContext<'_>,
        ctx: &RequestContext,
        def: &'static ActionDefinition,
    ) -> Result<ActionOutcome, ActionError> {
        let key = cx.payload.idempotency_key()?;
        let (created, result) = self.store.transaction(ctx.yacht_id(), |p| {
            if let Some(k) = &key {
                p.reserve_idempotency_key(def.action_id, k.clone(), ctx.now)
                    .map_err(|e| match e {
                        StorageError::DuplicateKey { .. } => ActionError::IdempotencyConflict {
                            action: def.action_id.to_string(),
                            key: k.as_str().to_string(),
                        },
                        other => ActionError::from(other),
                    })?;
            }
            check_target(p, ctx, def, &cx.payload)?;

            let MutationPlan {
                writes,
                audits,
                documents,
                result,
                created,
            } = handlers::plan(cx, p)?;
            debug!(
                action = def.action_id,
                writes = writes.len(),
                audits = audits.len(),
                "applying mutation plan"
            );
            for w in writes {
                p.apply_entity_write(w)?;
            }
            AuditWriter::emit_all(p, audits)?;
            for doc in &documents {
                self.documents.put(&doc.document_ref, doc.body.as_bytes())?;
            }
            if let Some(k) = &key {
                let snapshot = serde_json::to_string(&result)
                    .map_err(|e| ActionError::Internal(format!("result snapshot: {e}")))?;
                p.complete_idempotency_key(def.action_id, k, snapshot)?;
            }
            Ok::<_, ActionError>((created, result))
        })?;
        Ok(ActionOutcome {
            action: def.action_id,
            http_status: if created { 201 } else { 200 },
            result,
        })
    }
}

fn check_target(
    p: &keel_storage::TenantPartition,
    ctx: &RequestContext,
    def: &ActionDefinition,
    payload: &Payload<'_>,
) -> Result<(), ActionError> {
    if let Some((entity_type, entity_id)) = target_of(def, payload)? {
        precondition(p, ctx, def.action_id, entity_type, &entity_id)?;
    }
    Ok(())
}
