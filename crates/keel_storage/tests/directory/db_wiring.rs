#![forbid(unsafe_code)]

use keel_kernel_contracts::tenancy::{Role, UserId, YachtId};
use keel_kernel_contracts::MonotonicTimeNs;
use keel_storage::directory::{token_hash, MembershipRecord, SessionLookup, UserRecord};
use keel_storage::{KeelStore, StorageError};

const TOKEN: &str = "tok_crew_aaaaaaaaaaaaaaaa";

fn seeded() -> KeelStore {
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
            TOKEN,
            &UserId::new("user_crew").unwrap(),
            MonotonicTimeNs(1_000),
            1_000,
        )
    })
    .unwrap();
    s
}

#[test]
fn at_directory_db_01_session_lookup_respects_expiry() {
    let s = seeded();
    let live = s
        .directory(|d| matches!(d.lookup_session(TOKEN, MonotonicTimeNs(1_500)), SessionLookup::Live(_)))
        .unwrap();
    assert!(live);
    let expired = s
        .directory(|d| d.lookup_session(TOKEN, MonotonicTimeNs(2_000)) == SessionLookup::Expired)
        .unwrap();
    assert!(expired);
    let unknown = s
        .directory(|d| {
            d.lookup_session("tok_unknown_bbbbbbbbbbbb", MonotonicTimeNs(1_500))
                == SessionLookup::Unknown
        })
        .unwrap();
    assert!(unknown);
}

#[test]
fn at_directory_db_02_tokens_stored_hashed() {
    let s = seeded();
    let hash = token_hash(TOKEN);
    assert_eq!(hash.len(), 64);
    assert_ne!(hash, TOKEN);
    let stored = s
        .directory(|d| match d.lookup_session(TOKEN, MonotonicTimeNs(1_500)) {
            SessionLookup::Live(rec) => rec.token_hash.clone(),
            _ => String::new(),
        })
        .unwrap();
    assert_eq!(stored, hash);
}

#[test]
fn at_directory_db_03_membership_requires_known_user_and_yacht() {
    let s = seeded();
    let r = s.directory_mut(|d| {
        d.insert_membership(MembershipRecord {
            user_id: UserId::new("user_ghost").unwrap(),
            yacht_id: YachtId::new("yacht_a").unwrap(),
            role: Role::Captain,
        })
    });
    assert!(matches!(r, Err(StorageError::ForeignKeyViolation { .. })));

    let second = s.directory_mut(|d| {
        d.insert_membership(MembershipRecord {
            user_id: UserId::new("user_crew").unwrap(),
            yacht_id: YachtId::new("yacht_a").unwrap(),
            role: Role::Captain,
        })
    });
    assert!(matches!(second, Err(StorageError::DuplicateKey { .. })));
    let role = s
        .directory(|d| d.membership(&UserId::new("user_crew").unwrap()).map(|m| m.role))
        .unwrap();
    assert_eq!(role, Some(Role::Crew));
}

#[test]
fn at_directory_db_04_failed_directory_write_rolls_back() {
    let s = seeded();
    let r = s.directory_mut(|d| {
        d.insert_yacht(YachtId::new("yacht_b").unwrap())?;
        d.insert_yacht(YachtId::new("yacht_b").unwrap())
    });
    assert!(r.is_err());
    assert!(!s
        .directory(|d| d.has_yacht(&YachtId::new("yacht_b").unwrap()))
        .unwrap());
}
