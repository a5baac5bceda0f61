#![forbid(unsafe_code)]

//! HTTP-facing runtime for the action engine: environment config, directory seeding, and the
//! flat response shapes clients depend on.

use std::env;
use std::fs;
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use keel_kernel_contracts::tenancy::{Role, UserId, YachtId};
use keel_kernel_contracts::MonotonicTimeNs;
use keel_os::availability::ActionList;
use keel_os::document::{DocumentStore, InMemoryDocumentStore};
use keel_os::{ActionEngine, ActionError, ActionOutcome, ActionRequest};
use keel_storage::directory::{MembershipRecord, UserRecord};
use keel_storage::KeelStore;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{info, warn};

pub const DEFAULT_HTTP_BIND: &str = "127.0.0.1:8080";
pub const DEFAULT_SESSION_TTL_SECS: u64 = 43_200;
pub const DEFAULT_LOG_FILTER: &str = "info";
const SESSION_TTL_BOUNDS_SECS: RangeInclusive<u64> = 60..=604_800;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterConfig {
    pub http_bind: String,
    pub directory_seed_path: Option<PathBuf>,
    pub session_ttl_secs: u64,
    pub log_filter: String,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            http_bind: DEFAULT_HTTP_BIND.to_string(),
            directory_seed_path: None,
            session_ttl_secs: DEFAULT_SESSION_TTL_SECS,
            log_filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

impl AdapterConfig {
    pub fn from_env_var_map<F>(get: F) -> Result<Self, String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |key: &str| {
            get(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let session_ttl_secs = match read("KEEL_SESSION_TTL_SECS") {
            None => DEFAULT_SESSION_TTL_SECS,
            Some(raw) => {
                let secs = raw.parse::<u64>().map_err(|_| {
                    format!("KEEL_SESSION_TTL_SECS must be an integer number of seconds, got '{raw}'")
                })?;
                if !SESSION_TTL_BOUNDS_SECS.contains(&secs) {
                    return Err(format!(
                        "KEEL_SESSION_TTL_SECS must be within {}..={}, got {secs}",
                        SESSION_TTL_BOUNDS_SECS.start(),
                        SESSION_TTL_BOUNDS_SECS.end()
                    ));
                }
                secs
            }
        };
        Ok(Self {
            http_bind: read("KEEL_HTTP_BIND").unwrap_or_else(|| DEFAULT_HTTP_BIND.to_string()),
            directory_seed_path: read("KEEL_DIRECTORY_SEED_PATH").map(PathBuf::from),
            session_ttl_secs,
            log_filter: read("KEEL_LOG").unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string()),
        })
    }

    pub fn default_from_env() -> Result<Self, String> {
        Self::from_env_var_map(|key| env::var(key).ok())
    }

    pub fn session_ttl_ns(&self) -> u64 {
        self.session_ttl_secs.saturating_mul(1_000_000_000)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SeedUser {
    pub user_id: String,
    pub display_name: String,
    #[serde(default = "seed_user_active")]
    pub active: bool,
}

fn seed_user_active() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SeedMembership {
    pub user_id: String,
    pub yacht_id: String,
    pub role: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SeedSession {
    pub token: String,
    pub user_id: String,
}

/// Master-directory contents loaded at startup from `KEEL_DIRECTORY_SEED_PATH`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DirectorySeed {
    #[serde(default)]
    pub yachts: Vec<String>,
    #[serde(default)]
    pub users: Vec<SeedUser>,
    #[serde(default)]
    pub memberships: Vec<SeedMembership>,
    #[serde(default)]
    pub sessions: Vec<SeedSession>,
}

impl DirectorySeed {
    pub fn from_json_str(raw: &str) -> Result<Self, String> {
        serde_json::from_str(raw).map_err(|err| format!("invalid directory seed: {err}"))
    }

    pub fn load(path: &Path) -> Result<Self, String> {
        let raw = fs::read_to_string(path).map_err(|err| {
            format!(
                "failed to read directory seed '{}': {}",
                path.display(),
                err
            )
        })?;
        Self::from_json_str(&raw)
    }

    /// Inserts everything in one directory transaction; a single bad row leaves the store untouched.
    pub fn apply(
        &self,
        store: &KeelStore,
        issued_at: MonotonicTimeNs,
        session_ttl_ns: u64,
    ) -> Result<(), String> {
        store
            .directory_mut(|d| {
                for yacht in &self.yachts {
                    d.insert_yacht(YachtId::new(yacht.as_str())?)?;
                }
                for user in &self.users {
                    d.insert_user(UserRecord {
                        user_id: UserId::new(user.user_id.as_str())?,
                        display_name: user.display_name.clone(),
                        active: user.active,
                    })?;
                }
                for m in &self.memberships {
                    d.insert_membership(MembershipRecord {
                        user_id: UserId::new(m.user_id.as_str())?,
                        yacht_id: YachtId::new(m.yacht_id.as_str())?,
                        role: Role::parse(&m.role)?,
                    })?;
                }
                for s in &self.sessions {
                    let user_id = UserId::new(s.user_id.as_str())?;
                    d.issue_session(&s.token, &user_id, issued_at, session_ttl_ns)?;
                }
                Ok(())
            })
            .map_err(|err| format!("directory seed rejected: {err}"))
    }
}

pub fn now_from_system_clock() -> MonotonicTimeNs {
    let ns = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_nanos()).unwrap_or(u64::MAX))
        .unwrap_or(0);
    MonotonicTimeNs(ns)
}

/// `Authorization` header value to bearer token. Anything but a non-empty `Bearer` credential is
/// treated as absent, which the gate answers with 401.
pub fn bearer_token(authorization: Option<&str>) -> Option<&str> {
    let (scheme, token) = authorization?.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

#[derive(Debug, Clone, PartialEq)]
pub struct AdapterResponse {
    pub http_status: u16,
    pub body: Value,
}

impl AdapterResponse {
    fn new(http_status: u16, body: Value) -> Self {
        Self { http_status, body }
    }
}

pub fn error_response(err: &ActionError) -> AdapterResponse {
    let message = if err.is_internal() {
        "internal error".to_string()
    } else {
        err.to_string()
    };
    let body = match err {
        ActionError::MissingField(_) | ActionError::Validation(_) => {
            json!({"error_code": err.code(), "message": message})
        }
        ActionError::NotFound(_)
        | ActionError::UpstreamUnavailable(_)
        | ActionError::Internal(_) => {
            json!({"status": "error", "error_code": err.code(), "message": message})
        }
        ActionError::IdempotencyConflict { .. } => json!({"error": message}),
        ActionError::Unauthorized(_)
        | ActionError::Forbidden(_)
        | ActionError::InvalidTransition(_)
        | ActionError::AlreadyPromoted(_)
        | ActionError::InsufficientStock(_)
        | ActionError::IntegrityFailure(_) => {
            json!({"success": false, "code": err.code(), "message": message})
        }
    };
    AdapterResponse::new(err.http_status(), body)
}

/// Flat success envelope. A result field named like an envelope key is emitted as `entity_<key>`.
pub fn success_response(outcome: &ActionOutcome) -> AdapterResponse {
    let mut body = Map::new();
    body.insert("status".to_string(), Value::from("success"));
    body.insert("action".to_string(), Value::from(outcome.action));
    for (key, value) in &outcome.result {
        let key = match key.as_str() {
            "status" | "action" => format!("entity_{key}"),
            _ => key.clone(),
        };
        body.insert(key, value.clone());
    }
    AdapterResponse::new(outcome.http_status, Value::Object(body))
}

pub fn list_response(list: &ActionList) -> AdapterResponse {
    let actions: Vec<Value> = list
        .actions
        .iter()
        .map(|a| {
            json!({
                "action": a.action_id,
                "label": a.label,
                "execution_class": a.execution_class,
                "requires_confirmation": a.requires_confirmation,
                "requires_signature": a.requires_signature,
            })
        })
        .collect();
    AdapterResponse::new(
        200,
        json!({
            "status": "success",
            "domain": list.domain,
            "role": list.role,
            "yacht_id": list.yacht_id,
            "actions": actions,
        }),
    )
}

#[derive(Debug, Default, Deserialize)]
struct ExecuteContext {
    #[serde(default)]
    yacht_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ExecuteBody {
    #[serde(default)]
    action: Option<String>,
    #[serde(default)]
    context: ExecuteContext,
    #[serde(default = "empty_payload")]
    payload: Value,
}

fn empty_payload() -> Value {
    Value::Object(Map::new())
}

#[derive(Clone)]
pub struct AdapterRuntime {
    engine: Arc<ActionEngine>,
}

impl AdapterRuntime {
    pub fn new(engine: Arc<ActionEngine>) -> Self {
        Self { engine }
    }

    pub fn from_config(config: &AdapterConfig, now: MonotonicTimeNs) -> Result<Self, String> {
        let store = Arc::new(KeelStore::new_in_memory());
        match config.directory_seed_path.as_deref() {
            Some(path) => {
                let seed = DirectorySeed::load(path)?;
                seed.apply(&store, now, config.session_ttl_ns())?;
                info!(
                    path = %path.display(),
                    yachts = seed.yachts.len(),
                    users = seed.users.len(),
                    sessions = seed.sessions.len(),
                    "directory seeded"
                );
            }
            None => warn!("KEEL_DIRECTORY_SEED_PATH unset; directory is empty and every request is unauthorized"),
        }
        let documents: Arc<dyn DocumentStore> = Arc::new(InMemoryDocumentStore::new());
        let engine = ActionEngine::new(store, documents)
            .map_err(|err| format!("action engine failed to start: {err}"))?;
        Ok(Self::new(Arc::new(engine)))
    }

    pub fn default_from_env() -> Result<(AdapterConfig, Self), String> {
        let config = AdapterConfig::default_from_env()?;
        let runtime = Self::from_config(&config, now_from_system_clock())?;
        Ok((config, runtime))
    }

    pub fn engine(&self) -> &ActionEngine {
        &self.engine
    }

    /// `POST /v1/actions/execute` with the raw request body.
    pub fn execute(
        &self,
        authorization: Option<&str>,
        body: &[u8],
        now: MonotonicTimeNs,
    ) -> AdapterResponse {
        let ctx = match self.engine.authenticate(bearer_token(authorization), now) {
            Ok(ctx) => ctx,
            Err(err) => {
                warn!(code = err.code(), reason = %err, "execute refused before body decode");
                return error_response(&err);
            }
        };
        let parsed: ExecuteBody = match serde_json::from_slice(body) {
            Ok(parsed) => parsed,
            Err(err) => {
                warn!(error = %err, "malformed execute body");
                return error_response(&ActionError::Validation(format!(
                    "malformed request body: {err}"
                )));
            }
        };
        let Some(action) = parsed.action.filter(|a| !a.trim().is_empty()) else {
            return error_response(&ActionError::MissingField(
                "missing required field 'action'".to_string(),
            ));
        };
        let mut request = ActionRequest::new(bearer_token(authorization), &action, parsed.payload);
        if let Some(yacht_id) = parsed.context.yacht_id.as_deref() {
            request = request.with_context_yacht(yacht_id);
        }
        match self.engine.execute_as(&ctx, &request) {
            Ok(outcome) => success_response(&outcome),
            Err(err) => error_response(&err),
        }
    }

    /// `GET /v1/actions/list?domain=<d>[&entity_id=<id>]`.
    pub fn list_actions(
        &self,
        authorization: Option<&str>,
        domain: Option<&str>,
        entity_id: Option<&str>,
        now: MonotonicTimeNs,
    ) -> AdapterResponse {
        let Some(domain) = domain.filter(|d| !d.trim().is_empty()) else {
            return error_response(&ActionError::MissingField(
                "missing required query parameter 'domain'".to_string(),
            ));
        };
        match self
            .engine
            .list_actions(bearer_token(authorization), domain, entity_id, now)
        {
            Ok(list) => list_response(&list),
            Err(err) => {
                warn!(code = err.code(), "action list refused");
                error_response(&err)
            }
        }
    }

    pub fn health(&self) -> AdapterResponse {
        AdapterResponse::new(200, json!({"status": "ok"}))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const T0: MonotonicTimeNs = MonotonicTimeNs(1_700_000_000_000_000_000);
    const CREW: &str = "Bearer tok_adapter_crew_0001";
    const HOD: &str = "Bearer tok_adapter_hod_00001";

    const SEED: &str = r#"{
        "yachts": ["yacht_a", "yacht_b"],
        "users": [
            {"user_id": "user_crew", "display_name": "Deck Crew"},
            {"user_id": "user_hod", "display_name": "Chief Engineer"}
        ],
        "memberships": [
            {"user_id": "user_crew", "yacht_id": "yacht_a", "role": "crew"},
            {"user_id": "user_hod", "yacht_id": "yacht_a", "role": "chief_engineer"}
        ],
        "sessions": [
            {"token": "tok_adapter_crew_0001", "user_id": "user_crew"},
            {"token": "tok_adapter_hod_00001", "user_id": "user_hod"}
        ]
    }"#;

    fn runtime() -> AdapterRuntime {
        let store = Arc::new(KeelStore::new_in_memory());
        DirectorySeed::from_json_str(SEED)
            .unwrap()
            .apply(&store, MonotonicTimeNs(1), DEFAULT_SESSION_TTL_SECS * 1_000_000_000 * 100_000)
            .unwrap();
        let documents: Arc<dyn DocumentStore> = Arc::new(InMemoryDocumentStore::new());
        AdapterRuntime::new(Arc::new(ActionEngine::new(store, documents).unwrap()))
    }

    fn post(rt: &AdapterRuntime, auth: Option<&str>, body: Value) -> AdapterResponse {
        rt.execute(auth, body.to_string().as_bytes(), T0)
    }

    #[test]
    fn at_adapter_01_env_config_defaults_and_overrides() {
        let defaults = AdapterConfig::from_env_var_map(|_| None).unwrap();
        assert_eq!(defaults, AdapterConfig::default());
        assert_eq!(defaults.session_ttl_ns(), 43_200_000_000_000);

        let cfg = AdapterConfig::from_env_var_map(|key| match key {
            "KEEL_HTTP_BIND" => Some("0.0.0.0:9000".to_string()),
            "KEEL_DIRECTORY_SEED_PATH" => Some(" /etc/keel/seed.json ".to_string()),
            "KEEL_SESSION_TTL_SECS" => Some("600".to_string()),
            "KEEL_LOG" => Some("keel_os=debug".to_string()),
            _ => None,
        })
        .unwrap();
        assert_eq!(cfg.http_bind, "0.0.0.0:9000");
        assert_eq!(cfg.directory_seed_path, Some(PathBuf::from("/etc/keel/seed.json")));
        assert_eq!(cfg.session_ttl_secs, 600);
        assert_eq!(cfg.log_filter, "keel_os=debug");
    }

    #[test]
    fn at_adapter_02_session_ttl_out_of_bounds_fails_fast() {
        for raw in ["59", "604801", "ten"] {
            let err = AdapterConfig::from_env_var_map(|key| {
                (key == "KEEL_SESSION_TTL_SECS").then(|| raw.to_string())
            })
            .unwrap_err();
            assert!(err.contains("KEEL_SESSION_TTL_SECS"));
        }
    }

    #[test]
    fn at_adapter_03_seed_with_unknown_user_leaves_directory_empty() {
        let store = KeelStore::new_in_memory();
        let seed = DirectorySeed::from_json_str(
            r#"{"yachts": ["yacht_a"], "sessions": [{"token": "tok_orphan_session_01", "user_id": "ghost"}]}"#,
        )
        .unwrap();
        let err = seed.apply(&store, T0, 1_000).unwrap_err();
        assert!(err.starts_with("directory seed rejected"));
        let yachts = store
            .directory(|d| d.has_yacht(&YachtId::new("yacht_a").unwrap()))
            .unwrap();
        assert!(!yachts);
        assert!(DirectorySeed::from_json_str(r#"{"vessels": []}"#).is_err());
    }

    #[test]
    fn at_adapter_04_bearer_header_parsing() {
        assert_eq!(bearer_token(Some("Bearer abc")), Some("abc"));
        assert_eq!(bearer_token(Some("bearer  abc ")), Some("abc"));
        assert_eq!(bearer_token(Some("Basic abc")), None);
        assert_eq!(bearer_token(Some("Bearer ")), None);
        assert_eq!(bearer_token(Some("abc")), None);
        assert_eq!(bearer_token(None), None);
    }

    #[test]
    fn at_adapter_05_create_returns_201_flat_envelope() {
        let rt = runtime();
        let out = post(
            &rt,
            Some(CREW),
            json!({"action": "report_fault", "context": {"yacht_id": "yacht_a"}, "payload": {"title": "Bilge alarm", "severity": "high"}}),
        );
        assert_eq!(out.http_status, 201);
        assert_eq!(out.body["status"], "success");
        assert_eq!(out.body["action"], "report_fault");
        assert!(out.body["fault_id"].as_str().unwrap().starts_with("flt_"));
        assert_eq!(out.body["entity_status"], "open");
    }

    #[test]
    fn at_adapter_06_malformed_json_is_validation_not_500() {
        let rt = runtime();
        let out = rt.execute(Some(CREW), b"{\"action\": \"report_fault\",", T0);
        assert_eq!(out.http_status, 422);
        assert_eq!(out.body["error_code"], "VALIDATION_FAILED");
        let missing = post(&rt, Some(CREW), json!({"payload": {}}));
        assert_eq!(missing.http_status, 400);
        assert_eq!(missing.body["error_code"], "MISSING_REQUIRED_FIELD");
    }

    #[test]
    fn at_adapter_10_credentials_are_checked_before_the_body() {
        let rt = runtime();
        let malformed = b"{\"action\": \"report_fault\",";
        for auth in [None, Some("Bearer tok_unknown_session_01"), Some("Basic abc")] {
            let out = rt.execute(auth, malformed, T0);
            assert_eq!(out.http_status, 401);
            assert_eq!(out.body["code"], "UNAUTHORIZED");
        }
        let no_action = rt.execute(None, b"{\"payload\": {}}", T0);
        assert_eq!(no_action.http_status, 401);
    }

    #[test]
    fn at_adapter_07_error_shapes_follow_wire_table() {
        let rt = runtime();
        let anon = post(&rt, None, json!({"action": "report_fault", "payload": {}}));
        assert_eq!(anon.http_status, 401);
        assert_eq!(anon.body["success"], false);
        assert_eq!(anon.body["code"], "UNAUTHORIZED");

        let forbidden = post(&rt, Some(CREW), json!({"action": "close_work_order", "payload": {"work_order_id": "wo_000001"}}));
        assert_eq!(forbidden.http_status, 403);
        assert_eq!(forbidden.body["code"], "FORBIDDEN");

        let missing = post(&rt, Some(HOD), json!({"action": "view_fault", "payload": {"fault_id": "flt_424242"}}));
        assert_eq!(missing.http_status, 404);
        assert_eq!(missing.body["status"], "error");
        assert_eq!(missing.body["error_code"], "NOT_FOUND");

        let internal = error_response(&ActionError::Internal("lock poisoned".to_string()));
        assert_eq!(internal.http_status, 500);
        assert_eq!(internal.body["message"], "internal error");
    }

    #[test]
    fn at_adapter_08_duplicate_key_is_409_with_error_field() {
        let rt = runtime();
        let body = json!({
            "action": "create_shopping_list_item",
            "payload": {"part_name": "Fuel filter", "quantity": 2, "idempotency_key": "K-adapter-1"},
        });
        assert_eq!(post(&rt, Some(CREW), body.clone()).http_status, 201);
        let again = post(&rt, Some(CREW), body);
        assert_eq!(again.http_status, 409);
        assert!(again.body["error"].as_str().unwrap().contains("K-adapter-1"));
    }

    #[test]
    fn at_adapter_09_list_endpoint_shape() {
        let rt = runtime();
        let out = rt.list_actions(Some(HOD), Some("work_orders"), None, T0);
        assert_eq!(out.http_status, 200);
        assert_eq!(out.body["status"], "success");
        assert_eq!(out.body["role"], "chief_engineer");
        assert_eq!(out.body["yacht_id"], "yacht_a");
        let first = &out.body["actions"][0];
        assert!(first["action"].is_string());
        assert!(first["requires_signature"].is_boolean());
        let no_domain = rt.list_actions(Some(HOD), None, None, T0);
        assert_eq!(no_domain.http_status, 400);
        assert_eq!(rt.health().body, json!({"status": "ok"}));
    }
}
