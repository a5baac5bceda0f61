#![forbid(unsafe_code)]

//! Table-driven entity state machines.
//!
//! Every entity family declares its legal `{from, action} -> to` rows once. Execution and the
//! action-list endpoint both go through [`transition`], so an action is never advertised as
//! available and then refused on the same state (or the reverse).

use std::fmt::Debug;

use crate::action::EntityType;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition<S: 'static> {
    pub from: S,
    pub action: &'static str,
    pub to: S,
}

pub trait Lifecycle: Copy + Eq + Debug + 'static {
    const ENTITY: EntityType;

    fn as_str(self) -> &'static str;

    fn transitions() -> &'static [Transition<Self>];

    /// Terminal states have no outgoing rows.
    fn is_terminal(self) -> bool {
        !Self::transitions().iter().any(|t| t.from == self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IllegalTransition {
    pub entity: EntityType,
    pub action: String,
    pub from: &'static str,
}

impl IllegalTransition {
    pub fn message(&self) -> String {
        format!(
            "{} is not allowed while {} is '{}'",
            self.action,
            self.entity.as_str(),
            self.from
        )
    }
}

pub fn transition<S: Lifecycle>(current: S, action: &str) -> Result<S, IllegalTransition> {
    S::transitions()
        .iter()
        .find(|t| t.from == current && t.action == action)
        .map(|t| t.to)
        .ok_or_else(|| IllegalTransition {
            entity: S::ENTITY,
            action: action.to_string(),
            from: current.as_str(),
        })
}

pub fn is_legal<S: Lifecycle>(current: S, action: &str) -> bool {
    transition(current, action).is_ok()
}

/// True when the family's table mentions `action` at all.
pub fn governs<S: Lifecycle>(action: &str) -> bool {
    S::transitions().iter().any(|t| t.action == action)
}

/// Actions legal from `current`, in table order, without duplicates.
pub fn legal_actions<S: Lifecycle>(current: S) -> Vec<&'static str> {
    let mut out: Vec<&'static str> = Vec::new();
    for t in S::transitions().iter().filter(|t| t.from == current) {
        if !out.contains(&t.action) {
            out.push(t.action);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Door {
        Shut,
        Ajar,
        Gone,
    }

    impl Lifecycle for Door {
        const ENTITY: EntityType = EntityType::Part;

        fn as_str(self) -> &'static str {
            match self {
                Door::Shut => "shut",
                Door::Ajar => "ajar",
                Door::Gone => "gone",
            }
        }

        fn transitions() -> &'static [Transition<Self>] {
            &[
                Transition {
                    from: Door::Shut,
                    action: "open",
                    to: Door::Ajar,
                },
                Transition {
                    from: Door::Ajar,
                    action: "close",
                    to: Door::Shut,
                },
                Transition {
                    from: Door::Ajar,
                    action: "remove",
                    to: Door::Gone,
                },
            ]
        }
    }

    #[test]
    fn at_lifecycle_01_lookup_returns_target_or_illegal() {
        assert_eq!(transition(Door::Shut, "open").unwrap(), Door::Ajar);
        let err = transition(Door::Shut, "close").unwrap_err();
        assert_eq!(err.from, "shut");
        assert_eq!(err.action, "close");
        assert!(err.message().contains("'shut'"));
    }

    #[test]
    fn at_lifecycle_02_terminal_states_have_no_rows() {
        assert!(Door::Gone.is_terminal());
        assert!(!Door::Ajar.is_terminal());
        assert_eq!(legal_actions(Door::Ajar), vec!["close", "remove"]);
        assert!(governs::<Door>("remove"));
        assert!(!governs::<Door>("paint"));
    }
}
