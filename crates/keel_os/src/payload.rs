#![forbid(unsafe_code)]

//! Typed access to an action payload.
//!
//! Shape checks run before any transaction: required fields first (`MISSING_REQUIRED_FIELD`),
//! then every known field that is present is checked against [`FIELD_RULES`]
//! (`VALIDATION_FAILED`). Unknown keys, including a payload `yacht_id`, are ignored.

use std::str::FromStr;

use keel_engines::handover_digest::decode_signature_data;
use keel_engines::rest_compliance::parse_rest_hours;
use keel_kernel_contracts::action::{ActionDefinition, EntityType, ExecutionClass};
use keel_kernel_contracts::common::{validate_id, validate_text, CalendarDate, CalendarMonth};
use keel_kernel_contracts::fault::FaultSeverity;
use keel_kernel_contracts::idempotency::IdempotencyKey;
use keel_kernel_contracts::shopping_list::ShoppingUrgency;
use keel_kernel_contracts::work_order::WorkOrderPriority;
use keel_kernel_contracts::ContractViolation;
use rust_decimal::Decimal;
use serde_json::{Map, Value};

use crate::error::ActionError;

#[derive(Debug, Clone, Copy)]
enum FieldKind {
    Id,
    Text(usize),
    Quantity,
    Flag,
    Date,
    Month,
    RestHours,
    Amount,
    Choice(fn(&str) -> Result<(), ContractViolation>),
    Signature,
    IdempotencyKey,
}

fn severity(s: &str) -> Result<(), ContractViolation> {
    FaultSeverity::parse(s).map(|_| ())
}

fn priority(s: &str) -> Result<(), ContractViolation> {
    WorkOrderPriority::parse(s).map(|_| ())
}

fn urgency(s: &str) -> Result<(), ContractViolation> {
    ShoppingUrgency::parse(s).map(|_| ())
}

fn entity_type(s: &str) -> Result<(), ContractViolation> {
    EntityType::parse(s).map(|_| ())
}

static FIELD_RULES: &[(&str, FieldKind)] = &[
    ("fault_id", FieldKind::Id),
    ("work_order_id", FieldKind::Id),
    ("part_id", FieldKind::Id),
    ("item_id", FieldKind::Id),
    ("certificate_id", FieldKind::Id),
    ("claim_id", FieldKind::Id),
    ("warning_id", FieldKind::Id),
    ("signoff_id", FieldKind::Id),
    ("draft_id", FieldKind::Id),
    ("export_id", FieldKind::Id),
    ("assignee_id", FieldKind::Id),
    ("entity_id", FieldKind::Id),
    ("entity_ref", FieldKind::Id),
    ("title", FieldKind::Text(200)),
    ("description", FieldKind::Text(4_000)),
    ("diagnosis", FieldKind::Text(4_000)),
    ("resolution", FieldKind::Text(4_000)),
    ("completion_notes", FieldKind::Text(4_000)),
    ("note", FieldKind::Text(4_000)),
    ("notes", FieldKind::Text(1_000)),
    ("reason", FieldKind::Text(1_000)),
    ("summary", FieldKind::Text(500)),
    ("detail", FieldKind::Text(4_000)),
    ("equipment_id", FieldKind::Text(128)),
    ("part_name", FieldKind::Text(200)),
    ("part_number", FieldKind::Text(64)),
    ("unit", FieldKind::Text(32)),
    ("name", FieldKind::Text(200)),
    ("issuing_authority", FieldKind::Text(200)),
    ("certificate_number", FieldKind::Text(64)),
    ("to_location", FieldKind::Text(64)),
    ("from_location", FieldKind::Text(64)),
    ("quantity", FieldKind::Quantity),
    ("confirmed", FieldKind::Flag),
    ("is_critical", FieldKind::Flag),
    ("acknowledge_critical", FieldKind::Flag),
    ("record_date", FieldKind::Date),
    ("expires_on", FieldKind::Date),
    ("month", FieldKind::Month),
    ("rest_hours", FieldKind::RestHours),
    ("claimed_amount", FieldKind::Amount),
    ("severity", FieldKind::Choice(severity)),
    ("priority", FieldKind::Choice(priority)),
    ("urgency", FieldKind::Choice(urgency)),
    ("entity_type", FieldKind::Choice(entity_type)),
    ("signature", FieldKind::Signature),
    ("idempotency_key", FieldKind::IdempotencyKey),
];

fn rule_for(field: &str) -> Option<(&'static str, FieldKind)> {
    FIELD_RULES
        .iter()
        .find(|(name, _)| *name == field)
        .map(|(name, kind)| (*name, *kind))
}

fn invalid(field: &str, reason: &str) -> ActionError {
    ActionError::Validation(format!("invalid field '{field}': {reason}"))
}

/// Caller-supplied signature after base64 decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureInput {
    pub signer_name: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, Copy)]
pub struct Payload<'a> {
    fields: &'a Map<String, Value>,
}

impl<'a> Payload<'a> {
    pub fn new(value: &'a Value) -> Result<Self, ActionError> {
        match value {
            Value::Object(fields) => Ok(Self { fields }),
            _ => Err(ActionError::Validation(
                "payload must be a JSON object".to_string(),
            )),
        }
    }

    fn raw(&self, field: &str) -> Option<&'a Value> {
        match self.fields.get(field) {
            None | Some(Value::Null) => None,
            Some(v) => Some(v),
        }
    }

    /// Present means non-null and, for strings, not blank.
    pub fn is_present(&self, field: &str) -> bool {
        match self.raw(field) {
            None => false,
            Some(Value::String(s)) => !s.trim().is_empty(),
            Some(_) => true,
        }
    }

    pub fn check_required(&self, def: &ActionDefinition) -> Result<(), ActionError> {
        for field in def.required_fields {
            if !self.is_present(field) {
                return Err(ActionError::MissingField(format!(
                    "missing required field '{field}'"
                )));
            }
        }
        Ok(())
    }

    pub fn check_shape(&self) -> Result<(), ActionError> {
        for key in self.fields.keys() {
            let Some((field, kind)) = rule_for(key) else {
                continue;
            };
            if !self.is_present(field) {
                continue;
            }
            match kind {
                FieldKind::Id => {
                    self.id_str(field)?;
                }
                FieldKind::Text(max) => {
                    let s = self.str_value(field)?;
                    validate_text(field, s, max).map_err(|v| invalid(field, &v.to_string()))?;
                }
                FieldKind::Quantity => {
                    self.quantity(field)?;
                }
                FieldKind::Flag => {
                    self.flag(field)?;
                }
                FieldKind::Date => {
                    self.date(field)?;
                }
                FieldKind::Month => {
                    self.month(field)?;
                }
                FieldKind::RestHours => {
                    self.rest_hours(field)?;
                }
                FieldKind::Amount => {
                    self.opt_amount(field)?;
                }
                FieldKind::Choice(parse) => {
                    let s = self.str_value(field)?;
                    parse(s).map_err(|v| invalid(field, &v.to_string()))?;
                }
                FieldKind::Signature => {
                    self.signature(field)?;
                }
                FieldKind::IdempotencyKey => {
                    self.idempotency_key()?;
                }
            }
        }
        Ok(())
    }

    /// CONFIRM actions need an explicit `confirmed: true`; SIGNED actions need a decodable signature.
    pub fn check_class(&self, def: &ActionDefinition) -> Result<(), ActionError> {
        match def.execution_class {
            ExecutionClass::Confirm if !self.flag("confirmed")? => Err(ActionError::Validation(
                format!("'{}' requires confirmed=true", def.action_id),
            )),
            ExecutionClass::Signed => self.signature("signature").map(|_| ()),
            _ => Ok(()),
        }
    }

    fn str_value(&self, field: &str) -> Result<&'a str, ActionError> {
        match self.raw(field) {
            Some(Value::String(s)) => Ok(s.as_str()),
            Some(_) => Err(invalid(field, "must be a string")),
            None => Err(ActionError::MissingField(format!(
                "missing required field '{field}'"
            ))),
        }
    }

    fn id_str(&self, field: &str) -> Result<&'a str, ActionError> {
        let s = self.str_value(field)?;
        let static_field = rule_for(field).map(|(f, _)| f).unwrap_or("id");
        validate_id(static_field, s, 160).map_err(|v| invalid(field, &v.to_string()))?;
        Ok(s)
    }

    pub fn text(&self, field: &str) -> Result<String, ActionError> {
        Ok(self.str_value(field)?.trim().to_string())
    }

    pub fn opt_text(&self, field: &str) -> Result<Option<String>, ActionError> {
        if !self.is_present(field) {
            return Ok(None);
        }
        self.text(field).map(Some)
    }

    pub fn id<T>(
        &self,
        field: &str,
        ctor: impl FnOnce(String) -> Result<T, ContractViolation>,
    ) -> Result<T, ActionError> {
        let s = self.id_str(field)?;
        ctor(s.to_string()).map_err(|v| invalid(field, &v.to_string()))
    }

    pub fn opt_id<T>(
        &self,
        field: &str,
        ctor: impl FnOnce(String) -> Result<T, ContractViolation>,
    ) -> Result<Option<T>, ActionError> {
        if !self.is_present(field) {
            return Ok(None);
        }
        self.id(field, ctor).map(Some)
    }

    /// Raw id string, used for entity lookup before the family type is known.
    pub fn entity_id(&self, field: &str) -> Result<String, ActionError> {
        self.id_str(field).map(str::to_string)
    }

    pub fn quantity(&self, field: &str) -> Result<u64, ActionError> {
        match self.raw(field) {
            Some(Value::Number(n)) => match n.as_u64() {
                Some(q) if q > 0 => Ok(q),
                _ => Err(invalid(field, "must be a positive integer")),
            },
            Some(_) => Err(invalid(field, "must be a positive integer")),
            None => Err(ActionError::MissingField(format!(
                "missing required field '{field}'"
            ))),
        }
    }

    /// Absent flags read as `false`.
    pub fn flag(&self, field: &str) -> Result<bool, ActionError> {
        match self.raw(field) {
            None => Ok(false),
            Some(Value::Bool(b)) => Ok(*b),
            Some(_) => Err(invalid(field, "must be a boolean")),
        }
    }

    pub fn date(&self, field: &str) -> Result<CalendarDate, ActionError> {
        let s = self.str_value(field)?;
        CalendarDate::parse("date", s.trim()).map_err(|_| invalid(field, "must be YYYY-MM-DD"))
    }

    pub fn month(&self, field: &str) -> Result<CalendarMonth, ActionError> {
        let s = self.str_value(field)?;
        CalendarMonth::parse("month", s.trim()).map_err(|_| invalid(field, "must be YYYY-MM"))
    }

    fn decimal_text(&self, field: &str) -> Result<Option<String>, ActionError> {
        match self.raw(field) {
            None => Ok(None),
            Some(Value::Number(n)) => Ok(Some(n.to_string())),
            Some(Value::String(s)) => Ok(Some(s.trim().to_string())),
            Some(_) => Err(invalid(field, "must be a decimal number")),
        }
    }

    pub fn rest_hours(&self, field: &str) -> Result<Decimal, ActionError> {
        let raw = self.decimal_text(field)?.ok_or_else(|| {
            ActionError::MissingField(format!("missing required field '{field}'"))
        })?;
        parse_rest_hours(&raw).map_err(|v| invalid(field, &v.to_string()))
    }

    pub fn opt_amount(&self, field: &str) -> Result<Option<Decimal>, ActionError> {
        let Some(raw) = self.decimal_text(field)? else {
            return Ok(None);
        };
        let amount =
            Decimal::from_str(&raw).map_err(|_| invalid(field, "must be a decimal number"))?;
        if amount.is_sign_negative() || amount.scale() > 2 {
            return Err(invalid(field, "must be >= 0 with at most two decimal places"));
        }
        Ok(Some(amount))
    }

    pub fn signature(&self, field: &str) -> Result<SignatureInput, ActionError> {
        let obj = match self.raw(field) {
            Some(Value::Object(o)) => o,
            Some(_) => return Err(invalid(field, "must be an object")),
            None => {
                return Err(ActionError::MissingField(format!(
                    "missing required field '{field}'"
                )))
            }
        };
        let signer_name = match obj.get("signer_name") {
            Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
            _ => return Err(invalid(field, "signer_name must be a non-empty string")),
        };
        validate_text("signature.signer_name", &signer_name, 128)
            .map_err(|v| invalid(field, &v.to_string()))?;
        let data = match obj.get("signature_data") {
            Some(Value::String(s)) => s,
            _ => return Err(invalid(field, "signature_data must be a base64 string")),
        };
        let bytes = decode_signature_data(data).map_err(|v| invalid(field, &v.to_string()))?;
        Ok(SignatureInput { signer_name, bytes })
    }

    pub fn idempotency_key(&self) -> Result<Option<IdempotencyKey>, ActionError> {
        if !self.is_present("idempotency_key") {
            return Ok(None);
        }
        let s = self.str_value("idempotency_key")?;
        IdempotencyKey::new(s)
            .map(Some)
            .map_err(|v| invalid("idempotency_key", &v.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keel_engines::registry::ActionRegistry;
    use serde_json::json;

    #[test]
    fn at_payload_01_missing_and_blank_fields_are_400() {
        let reg = ActionRegistry::load().unwrap();
        let def = reg.lookup("receive_part").unwrap();
        let v = json!({"part_id": "prt_000001", "to_location": "  ", "quantity": 3});
        let e = Payload::new(&v).unwrap().check_required(def).unwrap_err();
        assert_eq!(e, ActionError::MissingField("missing required field 'to_location'".to_string()));
    }

    #[test]
    fn at_payload_02_shape_errors_are_validation() {
        let v = json!({"quantity": -2});
        assert_eq!(Payload::new(&v).unwrap().check_shape().unwrap_err().code(), "VALIDATION_FAILED");
        let v = json!({"severity": "catastrophic"});
        assert!(Payload::new(&v).unwrap().check_shape().is_err());
        let v = json!({"rest_hours": "25"});
        assert!(Payload::new(&v).unwrap().check_shape().is_err());
        let v = json!({"record_date": "2025-02-30"});
        assert!(Payload::new(&v).unwrap().check_shape().is_err());
        assert!(Payload::new(&json!([1, 2])).is_err());
    }

    #[test]
    fn at_payload_03_unknown_keys_and_payload_yacht_are_ignored() {
        let v = json!({"yacht_id": "yacht_b", "colour": 7, "fault_id": "flt_000001"});
        let p = Payload::new(&v).unwrap();
        assert!(p.check_shape().is_ok());
        assert_eq!(p.entity_id("fault_id").unwrap(), "flt_000001");
    }

    #[test]
    fn at_payload_04_confirm_and_signature_classes() {
        let reg = ActionRegistry::load().unwrap();
        let cancel = reg.lookup("cancel_work_order").unwrap();
        let v = json!({"work_order_id": "wo_1", "reason": "dup", "confirmed": false});
        assert_eq!(Payload::new(&v).unwrap().check_class(cancel).unwrap_err().code(), "VALIDATION_FAILED");

        let sign = reg.lookup("sign_handover_outgoing").unwrap();
        let v = json!({"export_id": "hex_1", "signature": {"signer_name": "A. Mate", "signature_data": "c2lnbmVk"}});
        let p = Payload::new(&v).unwrap();
        assert!(p.check_class(sign).is_ok());
        assert_eq!(p.signature("signature").unwrap().bytes, b"signed");
        let v = json!({"export_id": "hex_1", "signature": {"signer_name": "A. Mate", "signature_data": "%%%"}});
        assert!(Payload::new(&v).unwrap().check_class(sign).is_err());
    }

    #[test]
    fn at_payload_05_decimals_accept_numbers_and_strings() {
        let v = json!({"rest_hours": 10.5, "claimed_amount": "120.00"});
        let p = Payload::new(&v).unwrap();
        assert_eq!(p.rest_hours("rest_hours").unwrap(), Decimal::from_str("10.5").unwrap());
        assert_eq!(p.opt_amount("claimed_amount").unwrap(), Some(Decimal::from_str("120.00").unwrap()));
        assert_eq!(p.opt_amount("missing").unwrap(), None);
    }
}
