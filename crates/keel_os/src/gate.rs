#![forbid(unsafe_code)]

//! Authorization gate. Runs before payload validation and before any entity is read.
//!
//! Order: bearer session, tenant and role from the directory membership, optional
//! `context.yacht_id` cross-check, then the action's allowed-role set.

use keel_kernel_contracts::action::ActionDefinition;
use keel_kernel_contracts::tenancy::{Principal, Role, UserId, YachtId};
use keel_kernel_contracts::{MonotonicTimeNs, ReasonCodeId};
use keel_storage::directory::SessionLookup;
use keel_storage::KeelStore;

use crate::error::ActionError;

pub mod reason_codes {
    use keel_kernel_contracts::ReasonCodeId;

    // Gate reason-code namespace ("KG").
    pub const KEEL_GATE_MISSING_CREDENTIAL: ReasonCodeId = ReasonCodeId(0x4B47_0101);
    pub const KEEL_GATE_UNKNOWN_SESSION: ReasonCodeId = ReasonCodeId(0x4B47_0102);
    pub const KEEL_GATE_SESSION_EXPIRED: ReasonCodeId = ReasonCodeId(0x4B47_0103);
    pub const KEEL_GATE_USER_INACTIVE: ReasonCodeId = ReasonCodeId(0x4B47_0104);
    pub const KEEL_GATE_NO_MEMBERSHIP: ReasonCodeId = ReasonCodeId(0x4B47_0105);
    pub const KEEL_GATE_TENANT_MISMATCH: ReasonCodeId = ReasonCodeId(0x4B47_0201);
    pub const KEEL_GATE_ROLE_NOT_ALLOWED: ReasonCodeId = ReasonCodeId(0x4B47_0202);
    pub const KEEL_GATE_DIRECTORY_UNAVAILABLE: ReasonCodeId = ReasonCodeId(0x4B47_01F1);
}

/// Immutable per-request context. Built once by the gate and passed to every later stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    pub principal: Principal,
    pub now: MonotonicTimeNs,
}

impl RequestContext {
    pub fn yacht_id(&self) -> &YachtId {
        &self.principal.yacht_id
    }

    pub fn user_id(&self) -> &UserId {
        &self.principal.user_id
    }

    pub fn role(&self) -> Role {
        self.principal.role
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateRefusal {
    pub reason_code: ReasonCodeId,
    pub error: ActionError,
}

impl GateRefusal {
    fn unauthorized(reason_code: ReasonCodeId, message: &str) -> Self {
        Self {
            reason_code,
            error: ActionError::Unauthorized(message.to_string()),
        }
    }

    fn forbidden(reason_code: ReasonCodeId, message: String) -> Self {
        Self {
            reason_code,
            error: ActionError::Forbidden(message),
        }
    }
}

impl From<GateRefusal> for ActionError {
    fn from(r: GateRefusal) -> Self {
        r.error
    }
}

/// Resolves the caller from the bearer token. Tenant and role come from the directory only.
pub fn authenticate(
    store: &KeelStore,
    bearer: Option<&str>,
    now: MonotonicTimeNs,
) -> Result<RequestContext, GateRefusal> {
    let token = match bearer.map(str::trim) {
        Some(t) if !t.is_empty() => t,
        _ => {
            return Err(GateRefusal::unauthorized(
                reason_codes::KEEL_GATE_MISSING_CREDENTIAL,
                "missing bearer credential",
            ))
        }
    };
    let resolved = store
        .directory(|d| -> Result<Principal, GateRefusal> {
            let session = match d.lookup_session(token, now) {
                SessionLookup::Live(s) => s,
                SessionLookup::Expired => {
                    return Err(GateRefusal::unauthorized(
                        reason_codes::KEEL_GATE_SESSION_EXPIRED,
                        "session expired",
                    ))
                }
                SessionLookup::Unknown => {
                    return Err(GateRefusal::unauthorized(
                        reason_codes::KEEL_GATE_UNKNOWN_SESSION,
                        "invalid bearer credential",
                    ))
                }
            };
            let user = d
                .user(&session.user_id)
                .filter(|u| u.active)
                .ok_or_else(|| {
                    GateRefusal::unauthorized(
                        reason_codes::KEEL_GATE_USER_INACTIVE,
                        "user is not active",
                    )
                })?;
            let membership = d.membership(&user.user_id).ok_or_else(|| {
                GateRefusal::unauthorized(
                    reason_codes::KEEL_GATE_NO_MEMBERSHIP,
                    "user has no yacht membership",
                )
            })?;
            Principal::v1(
                user.user_id.clone(),
                membership.yacht_id.clone(),
                membership.role,
                user.display_name.clone(),
            )
            .map_err(|_| {
                GateRefusal::unauthorized(
                    reason_codes::KEEL_GATE_NO_MEMBERSHIP,
                    "directory entry is malformed",
                )
            })
        })
        .map_err(|e| GateRefusal {
            reason_code: reason_codes::KEEL_GATE_DIRECTORY_UNAVAILABLE,
            error: ActionError::Internal(e.to_string()),
        })??;
    Ok(RequestContext {
        principal: resolved,
        now,
    })
}

/// A caller-supplied `context.yacht_id` may only confirm the resolved tenant, never change it.
pub fn check_context(
    ctx: &RequestContext,
    context_yacht_id: Option<&str>,
) -> Result<(), GateRefusal> {
    match context_yacht_id {
        Some(y) if y != ctx.yacht_id().as_str() => Err(GateRefusal::forbidden(
            reason_codes::KEEL_GATE_TENANT_MISMATCH,
            "context yacht_id does not match the authenticated yacht".to_string(),
        )),
        _ => Ok(()),
    }
}

pub fn authorize(ctx: &RequestContext, def: &ActionDefinition) -> Result<(), GateRefusal> {
    if def.allows(ctx.role()) {
        return Ok(());
    }
    Err(GateRefusal::forbidden(
        reason_codes::KEEL_GATE_ROLE_NOT_ALLOWED,
        format!(
            "role '{}' may not perform '{}'",
            ctx.role().as_str(),
            def.action_id
        ),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use keel_engines::registry::ActionRegistry;
    use keel_storage::directory::{MembershipRecord, UserRecord};

    const CREW_TOKEN: &str = "tok_gate_crew_0000000001";

    fn store() -> KeelStore {
        let s = KeelStore::new_in_memory();
        s.directory_mut(|d| {
            d.insert_yacht(YachtId::new("yacht_a").unwrap())?;
            d.insert_user(UserRecord {
                user_id: UserId::new("user_crew").unwrap(),
                display_name: "Deck Crew".to_string(),
                active: true,
            })?;
            d.insert_membership(MembershipRecord {
                user_id: UserId::new("user_crew").unwrap(),
                yacht_id: YachtId::new("yacht_a").unwrap(),
                role: Role::Crew,
            })?;
            d.issue_session(
                CREW_TOKEN,
                &UserId::new("user_crew").unwrap(),
                MonotonicTimeNs(10),
                1_000,
            )
        })
        .unwrap();
        s
    }

    #[test]
    fn at_gate_01_missing_unknown_and_expired_credentials_are_401() {
        let s = store();
        let none = authenticate(&s, None, MonotonicTimeNs(20)).unwrap_err();
        assert_eq!(none.reason_code, reason_codes::KEEL_GATE_MISSING_CREDENTIAL);
        assert_eq!(none.error.http_status(), 401);
        let unknown = authenticate(&s, Some("tok_nobody_000000000000"), MonotonicTimeNs(20))
            .unwrap_err();
        assert_eq!(unknown.reason_code, reason_codes::KEEL_GATE_UNKNOWN_SESSION);
        let expired = authenticate(&s, Some(CREW_TOKEN), MonotonicTimeNs(5_000)).unwrap_err();
        assert_eq!(expired.reason_code, reason_codes::KEEL_GATE_SESSION_EXPIRED);
    }

    #[test]
    fn at_gate_02_tenant_and_role_come_from_membership() {
        let s = store();
        let ctx = authenticate(&s, Some(CREW_TOKEN), MonotonicTimeNs(20)).unwrap();
        assert_eq!(ctx.yacht_id().as_str(), "yacht_a");
        assert_eq!(ctx.role(), Role::Crew);
        assert!(check_context(&ctx, Some("yacht_a")).is_ok());
        assert!(check_context(&ctx, None).is_ok());
        let r = check_context(&ctx, Some("yacht_b")).unwrap_err();
        assert_eq!(r.error.http_status(), 403);
    }

    #[test]
    fn at_gate_03_role_outside_allow_set_is_forbidden() {
        let s = store();
        let ctx = authenticate(&s, Some(CREW_TOKEN), MonotonicTimeNs(20)).unwrap();
        let reg = ActionRegistry::load().unwrap();
        assert!(authorize(&ctx, reg.lookup("report_fault").unwrap()).is_ok());
        let denied = authorize(&ctx, reg.lookup("close_work_order").unwrap()).unwrap_err();
        assert_eq!(denied.reason_code, reason_codes::KEEL_GATE_ROLE_NOT_ALLOWED);
        assert_eq!(denied.error.code(), "FORBIDDEN");
    }
}
