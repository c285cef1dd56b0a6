//! Checks that the role a source connects as can only read: no superuser,
//! no role-creation/db-creation attributes, and no write-capable grant on
//! any relation it can see. Walks the full role-inheritance tree, since a
//! role often gets its real privileges from a group it's a member of.

use crate::error::PrivilegeError;
use serde::Serialize;
use sqlx::{FromRow, PgPool};

#[derive(Debug, Clone, Serialize)]
pub struct PrivilegeViolation {
    pub role: String,
    pub detail: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PrivilegeReport {
    pub connected_role: String,
    pub role_tree: Vec<String>,
    pub violations: Vec<PrivilegeViolation>,
}

impl PrivilegeReport {
    pub fn is_clean(&self) -> bool {
        self.violations.is_empty()
    }

    /// A short human-readable summary, one line per violation, suitable
    /// for printing to stderr or returning from `qpg auth check`.
    pub fn format_report(&self) -> String {
        if self.is_clean() {
            return format!("role '{}' (and inherited roles {:?}) is read-only", self.connected_role, self.role_tree);
        }
        let mut lines = vec![format!("role '{}' has write-capable privileges:", self.connected_role)];
        for violation in &self.violations {
            lines.push(format!("  - {}: {}", violation.role, violation.detail));
        }
        lines.join("\n")
    }
}

const WRITE_PRIVILEGE_TYPES: &[&str] = &["INSERT", "UPDATE", "DELETE", "TRUNCATE", "REFERENCES", "TRIGGER"];

#[derive(FromRow)]
struct RoleAttrs {
    rolname: String,
    rolsuper: bool,
    rolcreatedb: bool,
    rolcreaterole: bool,
    rolbypassrls: bool,
}

#[derive(FromRow)]
struct TableGrant {
    grantee: String,
    table_name: String,
    privilege_type: String,
}

/// Walks `pg_auth_members` transitively starting from `role`, returning
/// the full set of role names `role` inherits membership from (including
/// itself).
async fn role_inheritance_tree(pool: &PgPool, role: &str) -> Result<Vec<String>, PrivilegeError> {
    let rows: Vec<(String,)> = sqlx::query_as(
        r#"WITH RECURSIVE tree(rolname) AS (
               SELECT rolname FROM pg_roles WHERE rolname = $1
               UNION
               SELECT r.rolname FROM pg_roles r
               JOIN pg_auth_members m ON m.roleid = r.oid
               JOIN pg_roles member ON member.oid = m.member
               JOIN tree ON tree.rolname = member.rolname
           )
           SELECT rolname FROM tree"#,
    )
    .bind(role)
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(|(r,)| r).collect())
}

pub async fn check_privileges(pool: &PgPool, connected_role: &str) -> Result<PrivilegeReport, PrivilegeError> {
    let role_tree = role_inheritance_tree(pool, connected_role).await?;
    let mut report = PrivilegeReport { connected_role: connected_role.to_string(), role_tree: role_tree.clone(), violations: Vec::new() };

    if role_tree.is_empty() {
        return Ok(report);
    }

    let placeholders: Vec<String> = (1..=role_tree.len()).map(|i| format!("${i}")).collect();
    let attrs_sql = format!(
        "SELECT rolname, rolsuper, rolcreatedb, rolcreaterole, rolbypassrls FROM pg_roles WHERE rolname IN ({})",
        placeholders.join(", ")
    );
    let mut attrs_query = sqlx::query_as::<_, RoleAttrs>(&attrs_sql);
    for role in &role_tree {
        attrs_query = attrs_query.bind(role);
    }
    let attrs = attrs_query.fetch_all(pool).await?;

    for attr in &attrs {
        if attr.rolsuper {
            report.violations.push(PrivilegeViolation { role: attr.rolname.clone(), detail: "has SUPERUSER".to_string() });
        }
        if attr.rolcreatedb {
            report.violations.push(PrivilegeViolation { role: attr.rolname.clone(), detail: "has CREATEDB".to_string() });
        }
        if attr.rolcreaterole {
            report.violations.push(PrivilegeViolation { role: attr.rolname.clone(), detail: "has CREATEROLE".to_string() });
        }
        if attr.rolbypassrls {
            report.violations.push(PrivilegeViolation { role: attr.rolname.clone(), detail: "has BYPASSRLS".to_string() });
        }
    }

    let grants_sql = format!(
        "SELECT grantee, table_name, privilege_type
         FROM information_schema.role_table_grants
         WHERE grantee IN ({})
           AND privilege_type = ANY(${})",
        placeholders.join(", "),
        role_tree.len() + 1
    );
    let mut grants_query = sqlx::query_as::<_, TableGrant>(&grants_sql);
    for role in &role_tree {
        grants_query = grants_query.bind(role);
    }
    let grants_query = grants_query.bind(WRITE_PRIVILEGE_TYPES);
    let grants = grants_query.fetch_all(pool).await?;

    for grant in grants {
        report.violations.push(PrivilegeViolation {
            role: grant.grantee,
            detail: format!("has {} on {}", grant.privilege_type, grant.table_name),
        });
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_report_formats_without_violations() {
        let report = PrivilegeReport {
            connected_role: "qpg_reader".to_string(),
            role_tree: vec!["qpg_reader".to_string()],
            violations: vec![],
        };
        assert!(report.is_clean());
        assert!(report.format_report().contains("read-only"));
    }

    #[test]
    fn dirty_report_lists_each_violation() {
        let report = PrivilegeReport {
            connected_role: "qpg_reader".to_string(),
            role_tree: vec!["qpg_reader".to_string()],
            violations: vec![PrivilegeViolation { role: "qpg_reader".to_string(), detail: "has INSERT on public.orders".to_string() }],
        };
        assert!(!report.is_clean());
        assert!(report.format_report().contains("INSERT on public.orders"));
    }
}
