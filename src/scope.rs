//! Role-scoped query filter.
//!
//! Maps a caller's role and organizational identifiers to the subset of
//! records they may see or mutate. The mapping is one data-driven table
//! (first match wins) rather than per-screen branching, so authorization
//! stays centralized and testable:
//!
//! | role                        | visible scope                          |
//! |-----------------------------|----------------------------------------|
//! | admin                       | unrestricted                           |
//! | omc                         | stations where omc_id matches          |
//! | dealer                      | stations where dealer_id matches       |
//! | station_manager / attendant | exactly the identity's station         |
//!
//! A request outside scope fails with `Forbidden`, never an empty set
//! disguised as success. Forbidden responses carry no record details.

use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};

use crate::PosError;

// ---------------------------------------------------------------------------
// Roles
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Omc,
    Dealer,
    StationManager,
    Attendant,
}

impl Role {
    pub fn parse(raw: &str) -> Result<Role, PosError> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "omc" => Ok(Role::Omc),
            "dealer" => Ok(Role::Dealer),
            "station_manager" | "manager" => Ok(Role::StationManager),
            "attendant" => Ok(Role::Attendant),
            other => Err(PosError::validation(format!("Unknown role: {other}"))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Omc => "omc",
            Role::Dealer => "dealer",
            Role::StationManager => "station_manager",
            Role::Attendant => "attendant",
        }
    }
}

/// The already-trusted caller identity. The core never authenticates;
/// whoever constructs this has done so upstream.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub role: Role,
    #[serde(default, alias = "station_id")]
    pub station_id: Option<String>,
    #[serde(default, alias = "dealer_id")]
    pub dealer_id: Option<String>,
    #[serde(default, alias = "omc_id")]
    pub omc_id: Option<String>,
}

impl Identity {
    pub fn new(role: Role) -> Self {
        Identity {
            role,
            station_id: None,
            dealer_id: None,
            omc_id: None,
        }
    }

    pub fn for_station(role: Role, station_id: &str) -> Self {
        Identity {
            role,
            station_id: Some(station_id.to_string()),
            dealer_id: None,
            omc_id: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Authority table
// ---------------------------------------------------------------------------

/// How a role's visible station set is derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScopeKind {
    Unrestricted,
    ByOmc,
    ByDealer,
    ByStation,
}

struct RoleRule {
    role: Role,
    scope: ScopeKind,
    can_record_sales: bool,
    can_edit_records: bool,
}

/// First match wins.
const ROLE_RULES: &[RoleRule] = &[
    RoleRule {
        role: Role::Admin,
        scope: ScopeKind::Unrestricted,
        can_record_sales: true,
        can_edit_records: true,
    },
    RoleRule {
        role: Role::Omc,
        scope: ScopeKind::ByOmc,
        can_record_sales: false,
        can_edit_records: false,
    },
    RoleRule {
        role: Role::Dealer,
        scope: ScopeKind::ByDealer,
        can_record_sales: false,
        can_edit_records: false,
    },
    RoleRule {
        role: Role::StationManager,
        scope: ScopeKind::ByStation,
        can_record_sales: true,
        can_edit_records: true,
    },
    RoleRule {
        role: Role::Attendant,
        scope: ScopeKind::ByStation,
        can_record_sales: true,
        can_edit_records: false,
    },
];

fn rule_for(role: Role) -> &'static RoleRule {
    ROLE_RULES
        .iter()
        .find(|r| r.role == role)
        .expect("every role has a rule")
}

// ---------------------------------------------------------------------------
// Scope filter
// ---------------------------------------------------------------------------

/// A SQL predicate over a `station_id` column plus its bound parameters.
#[derive(Debug, Clone)]
pub struct ScopeFilter {
    clause: String,
    param: Option<String>,
}

impl ScopeFilter {
    /// Render the predicate for the given station-id column reference
    /// (e.g. `"s.station_id"`). Returns the clause and its parameters in
    /// bind order.
    pub fn sql(&self, column: &str) -> (String, Vec<String>) {
        let clause = self.clause.replace("{col}", column);
        let params = self.param.iter().cloned().collect();
        (clause, params)
    }
}

/// Build the visibility predicate for an identity.
///
/// A scoped role missing its own organizational id is a misconfigured
/// identity and sees nothing — that is `Forbidden`, not an empty result.
pub fn scope_filter(identity: &Identity) -> Result<ScopeFilter, PosError> {
    let rule = rule_for(identity.role);
    let (clause, param) = match rule.scope {
        ScopeKind::Unrestricted => ("1 = 1".to_string(), None),
        ScopeKind::ByOmc => (
            "{col} IN (SELECT id FROM stations WHERE omc_id = ?)".to_string(),
            Some(identity.omc_id.clone().ok_or(PosError::Forbidden)?),
        ),
        ScopeKind::ByDealer => (
            "{col} IN (SELECT id FROM stations WHERE dealer_id = ?)".to_string(),
            Some(identity.dealer_id.clone().ok_or(PosError::Forbidden)?),
        ),
        ScopeKind::ByStation => (
            "{col} = ?".to_string(),
            Some(identity.station_id.clone().ok_or(PosError::Forbidden)?),
        ),
    };
    Ok(ScopeFilter { clause, param })
}

/// Check that a specific station is inside the caller's scope.
///
/// Used when a request names a station explicitly (filters, creates).
/// Out-of-scope requests fail `Forbidden` without revealing whether the
/// station exists.
pub fn authorize_station(
    conn: &Connection,
    identity: &Identity,
    station_id: &str,
) -> Result<(), PosError> {
    let rule = rule_for(identity.role);
    let in_scope = match rule.scope {
        ScopeKind::Unrestricted => true,
        ScopeKind::ByStation => identity.station_id.as_deref() == Some(station_id),
        ScopeKind::ByOmc => {
            let omc_id = identity.omc_id.as_deref().ok_or(PosError::Forbidden)?;
            conn.query_row(
                "SELECT 1 FROM stations WHERE id = ?1 AND omc_id = ?2",
                params![station_id, omc_id],
                |_| Ok(()),
            )
            .is_ok()
        }
        ScopeKind::ByDealer => {
            let dealer_id = identity.dealer_id.as_deref().ok_or(PosError::Forbidden)?;
            conn.query_row(
                "SELECT 1 FROM stations WHERE id = ?1 AND dealer_id = ?2",
                params![station_id, dealer_id],
                |_| Ok(()),
            )
            .is_ok()
        }
    };

    if in_scope {
        Ok(())
    } else {
        Err(PosError::Forbidden)
    }
}

/// Whether the role may record new sales and deposits.
pub fn can_record_sales(role: Role) -> bool {
    rule_for(role).can_record_sales
}

/// Whether the role may edit or void existing records in its scope.
pub fn can_edit_records(role: Role) -> bool {
    rule_for(role).can_edit_records
}

/// Whether the role may edit or delete deposits past `pending`.
pub fn can_override_deposit_lock(role: Role) -> bool {
    role == Role::Admin
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use rusqlite::Connection;

    fn test_conn() -> Connection {
        let conn = Connection::open_in_memory().expect("open in-memory db");
        db::run_migrations_for_test(&conn);
        conn.execute_batch(
            "INSERT INTO omcs (id, name) VALUES ('omc-1', 'PetroMax');
             INSERT INTO dealers (id, name) VALUES ('dlr-1', 'Mensah Fuels');
             INSERT INTO stations (id, name, dealer_id, omc_id)
                VALUES ('st-a', 'Airport Rd', 'dlr-1', 'omc-1'),
                       ('st-b', 'Harbour View', NULL, 'omc-1'),
                       ('st-c', 'East Gate', 'dlr-1', NULL);",
        )
        .expect("seed stations");
        conn
    }

    #[test]
    fn test_admin_is_unrestricted() {
        let filter = scope_filter(&Identity::new(Role::Admin)).unwrap();
        let (clause, params) = filter.sql("station_id");
        assert_eq!(clause, "1 = 1");
        assert!(params.is_empty());
    }

    #[test]
    fn test_station_roles_pin_to_their_station() {
        let identity = Identity::for_station(Role::StationManager, "st-a");
        let filter = scope_filter(&identity).unwrap();
        let (clause, params) = filter.sql("s.station_id");
        assert_eq!(clause, "s.station_id = ?");
        assert_eq!(params, vec!["st-a".to_string()]);
    }

    #[test]
    fn test_omc_scope_spans_its_stations() {
        let conn = test_conn();
        let identity = Identity {
            role: Role::Omc,
            station_id: None,
            dealer_id: None,
            omc_id: Some("omc-1".into()),
        };
        assert!(authorize_station(&conn, &identity, "st-a").is_ok());
        assert!(authorize_station(&conn, &identity, "st-b").is_ok());
        // st-c has no OMC edge
        assert!(matches!(
            authorize_station(&conn, &identity, "st-c"),
            Err(PosError::Forbidden)
        ));
    }

    #[test]
    fn test_dealer_scope_spans_its_stations() {
        let conn = test_conn();
        let identity = Identity {
            role: Role::Dealer,
            station_id: None,
            dealer_id: Some("dlr-1".into()),
            omc_id: None,
        };
        assert!(authorize_station(&conn, &identity, "st-c").is_ok());
        assert!(matches!(
            authorize_station(&conn, &identity, "st-b"),
            Err(PosError::Forbidden)
        ));
    }

    #[test]
    fn test_manager_cannot_reach_other_station() {
        let conn = test_conn();
        let identity = Identity::for_station(Role::StationManager, "st-a");
        let err = authorize_station(&conn, &identity, "st-b").unwrap_err();
        assert_eq!(err.kind(), "forbidden");
        // Nonexistent station looks identical — existence is not leaked.
        let err = authorize_station(&conn, &identity, "st-zz").unwrap_err();
        assert_eq!(err.kind(), "forbidden");
    }

    #[test]
    fn test_scoped_role_without_id_is_forbidden() {
        let err = scope_filter(&Identity::new(Role::Omc)).unwrap_err();
        assert_eq!(err.kind(), "forbidden");
        let err = scope_filter(&Identity::new(Role::Attendant)).unwrap_err();
        assert_eq!(err.kind(), "forbidden");
    }

    #[test]
    fn test_authority_table() {
        assert!(can_record_sales(Role::Attendant));
        assert!(!can_edit_records(Role::Attendant));
        assert!(can_edit_records(Role::StationManager));
        assert!(!can_record_sales(Role::Omc));
        assert!(!can_record_sales(Role::Dealer));
        assert!(can_override_deposit_lock(Role::Admin));
        assert!(!can_override_deposit_lock(Role::StationManager));
    }

    #[test]
    fn test_role_parse_aliases() {
        assert_eq!(Role::parse("manager").unwrap(), Role::StationManager);
        assert_eq!(Role::parse("ADMIN").unwrap(), Role::Admin);
        assert!(Role::parse("driver").is_err());
    }
}
