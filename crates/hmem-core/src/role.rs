//! Role filter (C8).
//!
//! Fixed total order `worker < al < pl < ceo`. Every query over the shared
//! "company" store restricts to `min_role <= caller`. Personal stores are
//! single-owner and ignore role entirely.

use serde::{Deserialize, Serialize};

/// Caller role, totally ordered by declaration order (`worker` lowest).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Worker,
    Al,
    Pl,
    Ceo,
}

impl Role {
    /// All roles whose level is `<= self` — the "visible roles" set for a
    /// caller at this role.
    pub fn allowed_roles(self) -> Vec<Role> {
        [Role::Worker, Role::Al, Role::Pl, Role::Ceo]
            .into_iter()
            .filter(|r| *r <= self)
            .collect()
    }

    /// Whether `self` may write to the shared company store (requires `al+`).
    pub fn can_write_company(self) -> bool {
        self >= Role::Al
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "worker" => Ok(Role::Worker),
            "al" => Ok(Role::Al),
            "pl" => Ok(Role::Pl),
            "ceo" => Ok(Role::Ceo),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Role::Worker => "worker",
            Role::Al => "al",
            Role::Pl => "pl",
            Role::Ceo => "ceo",
        };
        write!(f, "{s}")
    }
}

/// Which store a query targets — role filtering only applies to `Company`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    Personal,
    Company,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordering_is_total() {
        assert!(Role::Worker < Role::Al);
        assert!(Role::Al < Role::Pl);
        assert!(Role::Pl < Role::Ceo);
    }

    #[test]
    fn allowed_roles_is_everything_at_or_below() {
        assert_eq!(Role::Worker.allowed_roles(), vec![Role::Worker]);
        assert_eq!(
            Role::Ceo.allowed_roles(),
            vec![Role::Worker, Role::Al, Role::Pl, Role::Ceo]
        );
    }

    #[test]
    fn write_gate_requires_al_or_above() {
        assert!(!Role::Worker.can_write_company());
        assert!(Role::Al.can_write_company());
        assert!(Role::Ceo.can_write_company());
    }
}
