#![forbid(unsafe_code)]

//! Deterministic digests for handover exports.
//!
//! `content_hash` covers the items only. `document_hash` covers the rendered export document.
//! `signature_hash` binds one signer to both hashes and the signed instant.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use keel_kernel_contracts::handover::{HandoverDraftRecord, HandoverItem};
use keel_kernel_contracts::tenancy::UserId;
use keel_kernel_contracts::{ContractViolation, MonotonicTimeNs};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use unicode_normalization::UnicodeNormalization;

pub const MAX_SIGNATURE_BYTES: usize = 256 * 1024;

pub fn sha256_hex(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    to_hex(&digest)
}

fn to_hex(bytes: &[u8]) -> String {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        out.push(HEX[(b >> 4) as usize] as char);
        out.push(HEX[(b & 0x0f) as usize] as char);
    }
    out
}

fn nfc(s: &str) -> String {
    s.nfc().collect()
}

/// Canonical serialization: items ordered by `item_id`, text NFC-normalized, object keys sorted.
pub fn canonical_items(items: &[HandoverItem]) -> String {
    let mut ordered: Vec<&HandoverItem> = items.iter().collect();
    ordered.sort_by(|a, b| a.item_id.cmp(&b.item_id));
    let rows: Vec<Value> = ordered
        .into_iter()
        .map(|i| {
            json!({
                "item_id": i.item_id.as_str(),
                "summary": nfc(&i.summary),
                "detail": i.detail.as_deref().map(nfc),
                "is_critical": i.is_critical,
                "entity_ref": i.entity_ref.as_deref(),
                "added_by": i.added_by.as_str(),
            })
        })
        .collect();
    Value::Array(rows).to_string()
}

pub fn content_hash(items: &[HandoverItem]) -> String {
    sha256_hex(canonical_items(items).as_bytes())
}

/// Plain-text export document. Identical inputs always render identical bytes.
pub fn render_document(
    draft: &HandoverDraftRecord,
    content_hash: &str,
    exported_by: &UserId,
    exported_at: MonotonicTimeNs,
) -> String {
    let mut items: Vec<&HandoverItem> = draft.items.iter().collect();
    items.sort_by(|a, b| a.item_id.cmp(&b.item_id));

    let mut doc = String::new();
    doc.push_str("HANDOVER EXPORT\n");
    doc.push_str(&format!("yacht: {}\n", draft.yacht_id));
    doc.push_str(&format!("draft: {}\n", draft.draft_id));
    doc.push_str(&format!("title: {}\n", nfc(&draft.title)));
    doc.push_str(&format!("exported_by: {exported_by}\n"));
    doc.push_str(&format!("exported_at_ns: {}\n", exported_at.0));
    doc.push_str(&format!("content_hash: {content_hash}\n"));
    doc.push_str(&format!("items: {}\n", items.len()));
    for (n, item) in items.iter().enumerate() {
        let flag = if item.is_critical { " [CRITICAL]" } else { "" };
        doc.push_str(&format!(
            "\n{}. {}{}\n",
            n + 1,
            nfc(&item.summary),
            flag
        ));
        if let Some(detail) = &item.detail {
            doc.push_str(&format!("   {}\n", nfc(detail)));
        }
        if let Some(r) = &item.entity_ref {
            doc.push_str(&format!("   ref: {r}\n"));
        }
        doc.push_str(&format!("   id: {} by {}\n", item.item_id, item.added_by));
    }
    doc
}

pub fn document_hash(document: &str) -> String {
    sha256_hex(document.as_bytes())
}

pub fn decode_signature_data(encoded: &str) -> Result<Vec<u8>, ContractViolation> {
    let bytes = BASE64
        .decode(encoded.trim())
        .map_err(|_| ContractViolation::InvalidValue {
            field: "signature.signature_data",
            reason: "must be base64",
        })?;
    if bytes.is_empty() {
        return Err(ContractViolation::InvalidValue {
            field: "signature.signature_data",
            reason: "must not be empty",
        });
    }
    if bytes.len() > MAX_SIGNATURE_BYTES {
        return Err(ContractViolation::InvalidValue {
            field: "signature.signature_data",
            reason: "exceeds max signature size",
        });
    }
    Ok(bytes)
}

pub fn signature_hash(
    document_hash: &str,
    content_hash: &str,
    user_id: &UserId,
    signed_at: MonotonicTimeNs,
    signature_bytes: &[u8],
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(document_hash.as_bytes());
    hasher.update(b"|");
    hasher.update(content_hash.as_bytes());
    hasher.update(b"|");
    hasher.update(user_id.as_str().as_bytes());
    hasher.update(b"|");
    hasher.update(signed_at.0.to_string().as_bytes());
    hasher.update(b"|");
    hasher.update(signature_bytes);
    to_hex(&hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use keel_kernel_contracts::handover::{
        HandoverDraftId, HandoverDraftStatus, HandoverItemId,
    };
    use keel_kernel_contracts::tenancy::YachtId;

    fn item(id: &str, summary: &str, critical: bool) -> HandoverItem {
        HandoverItem {
            item_id: HandoverItemId::new(id).unwrap(),
            summary: summary.to_string(),
            detail: None,
            is_critical: critical,
            entity_ref: None,
            added_by: UserId::new("user_hod").unwrap(),
            added_at: MonotonicTimeNs(5),
        }
    }

    #[test]
    fn at_digest_01_content_hash_ignores_item_order() {
        let a = vec![item("hoi_000001", "Bilge pump", false), item("hoi_000002", "Genset", true)];
        let b = vec![a[1].clone(), a[0].clone()];
        assert_eq!(content_hash(&a), content_hash(&b));
        assert_eq!(content_hash(&a).len(), 64);
    }

    #[test]
    fn at_digest_02_content_hash_normalizes_unicode() {
        let composed = vec![item("hoi_000001", "Caf\u{e9} fridge", false)];
        let decomposed = vec![item("hoi_000001", "Cafe\u{301} fridge", false)];
        assert_eq!(content_hash(&composed), content_hash(&decomposed));
    }

    #[test]
    fn at_digest_03_any_item_change_moves_the_hash() {
        let a = vec![item("hoi_000001", "Bilge pump", false)];
        let b = vec![item("hoi_000001", "Bilge pump", true)];
        assert_ne!(content_hash(&a), content_hash(&b));
    }

    #[test]
    fn at_digest_04_document_render_is_deterministic() {
        let items = vec![item("hoi_000001", "Bilge pump", true)];
        let hash = content_hash(&items);
        let draft = HandoverDraftRecord {
            yacht_id: YachtId::new("yacht_a").unwrap(),
            draft_id: HandoverDraftId::new("hod_000001").unwrap(),
            title: "Rotation".to_string(),
            items,
            status: HandoverDraftStatus::Finalized,
            created_by: UserId::new("user_hod").unwrap(),
            content_hash: Some(hash.clone()),
            finalized_at: Some(MonotonicTimeNs(9)),
            finalized_by: Some(UserId::new("user_hod").unwrap()),
            export_id: None,
            created_at: MonotonicTimeNs(1),
            updated_at: MonotonicTimeNs(9),
        };
        let by = UserId::new("user_hod").unwrap();
        let d1 = render_document(&draft, &hash, &by, MonotonicTimeNs(10));
        let d2 = render_document(&draft, &hash, &by, MonotonicTimeNs(10));
        assert_eq!(document_hash(&d1), document_hash(&d2));
        assert!(d1.contains("[CRITICAL]"));
    }

    #[test]
    fn at_digest_05_signature_hash_binds_signer() {
        let bytes = decode_signature_data("c2lnbmVk").unwrap();
        assert_eq!(bytes, b"signed");
        let a = signature_hash("d", "c", &UserId::new("u1").unwrap(), MonotonicTimeNs(1), &bytes);
        let b = signature_hash("d", "c", &UserId::new("u2").unwrap(), MonotonicTimeNs(1), &bytes);
        assert_ne!(a, b);
        assert!(decode_signature_data("not base64!").is_err());
        assert!(decode_signature_data("").is_err());
    }
}
