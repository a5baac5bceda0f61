#![forbid(unsafe_code)]

//! Shared fixtures for engine tests: two yachts, one user per role on `yacht_a`, one crew member on
//! `yacht_b`.

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use keel_kernel_contracts::tenancy::{Role, UserId, YachtId};
use keel_kernel_contracts::MonotonicTimeNs;
use keel_storage::directory::{MembershipRecord, UserRecord};
use keel_storage::KeelStore;
use serde_json::{json, Value};

use crate::document::{DocumentStore, InMemoryDocumentStore};
use crate::executor::{ActionEngine, ActionRequest};

pub const T0: MonotonicTimeNs = MonotonicTimeNs(1_700_000_000_000_000_000);

pub const CREW: &str = "tok_crew_a_000000000001";
pub const CREW_2: &str = "tok_crew_a_000000000002";
pub const HOD: &str = "tok_hod_a_0000000000001";
pub const CAPTAIN: &str = "tok_captain_a_000000001";
pub const CREW_B: &str = "tok_crew_b_000000000001";

const SEED: &[(&str, &str, &str, Role, &str)] = &[
    (CREW, "user_crew", "yacht_a", Role::Crew, "Deck Crew"),
    (CREW_2, "user_crew_2", "yacht_a", Role::Crew, "Second Stew"),
    (HOD, "user_hod", "yacht_a", Role::ChiefEngineer, "Chief Engineer"),
    (CAPTAIN, "user_captain", "yacht_a", Role::Captain, "Captain"),
    (CREW_B, "user_crew_b", "yacht_b", Role::Crew, "Other Deckhand"),
];

pub fn seeded_store() -> KeelStore {
    let store = KeelStore::new_in_memory();
    store
        .directory_mut(|d| {
            d.insert_yacht(YachtId::new("yacht_a")?)?;
            d.insert_yacht(YachtId::new("yacht_b")?)?;
            for (token, user, yacht, role, name) in SEED {
                let user_id = UserId::new(*user)?;
                d.insert_user(UserRecord {
                    user_id: user_id.clone(),
                    display_name: name.to_string(),
                    active: true,
                })?;
                d.insert_membership(MembershipRecord {
                    user_id: user_id.clone(),
                    yacht_id: YachtId::new(*yacht)?,
                    role: *role,
                })?;
                d.issue_session(token, &user_id, MonotonicTimeNs(1), u64::MAX / 2)?;
            }
            Ok(())
        })
        .unwrap();
    store
}

pub fn engine_with_documents(documents: Arc<dyn DocumentStore>) -> ActionEngine {
    ActionEngine::new(Arc::new(seeded_store()), documents).unwrap()
}

pub fn engine() -> ActionEngine {
    engine_with_documents(Arc::new(InMemoryDocumentStore::new()))
}

pub fn signature(signer_name: &str) -> Value {
    json!({
        "signer_name": signer_name,
        "signature_data": BASE64.encode(format!("ink:{signer_name}")),
    })
}

/// Creates a part through the shopping-list promotion path, optionally receiving stock.
pub fn part_in_stock(e: &ActionEngine, location: &str, quantity: u64) -> String {
    let exec = |token: &str, action: &str, payload: Value| {
        e.execute(&ActionRequest::new(Some(token), action, payload), T0)
            .unwrap()
            .result
    };
    let item = exec(
        CREW,
        "create_shopping_list_item",
        json!({"part_name": "Raw water impeller", "quantity": 1}),
    );
    let item_id = item["item_id"].as_str().unwrap().to_string();
    exec(HOD, "approve_shopping_list_item", json!({"item_id": item_id}));
    let promoted = exec(HOD, "promote_candidate_to_part", json!({"item_id": item_id}));
    let part_id = promoted["part_id"].as_str().unwrap().to_string();
    if quantity > 0 {
        exec(
            CREW,
            "receive_part",
            json!({
                "part_id": part_id,
                "to_location": location,
                "quantity": quantity,
                "idempotency_key": format!("seed-{part_id}"),
            }),
        );
    }
    part_id
}
