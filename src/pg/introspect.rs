//! Fixed catalog SQL against `pg_catalog`/`information_schema`. Each
//! section is fetched independently so one failing query (e.g. missing
//! privilege on `pg_proc`) degrades to a warning instead of aborting the
//! whole introspection run.

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ColumnMeta {
    pub column_name: String,
    pub data_type: String,
    pub is_nullable: bool,
    pub ordinal_position: i32,
    pub default_expr: Option<String>,
    pub comment: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ConstraintMeta {
    pub constraint_name: String,
    pub constraint_type: String,
    pub definition: String,
    #[sqlx(skip)]
    pub columns: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct IndexMeta {
    pub index_name: String,
    pub definition: String,
    pub is_unique: bool,
    pub is_primary: bool,
    #[sqlx(skip)]
    pub columns: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependencyMeta {
    pub depends_on_fqname: String,
    pub dependency_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntrospectedObject {
    pub schema_name: Option<String>,
    pub object_name: String,
    pub object_type: String,
    pub definition: String,
    pub comment: String,
    pub signature: Option<String>,
    pub owner: Option<String>,
    pub is_system: bool,
    pub columns: Vec<ColumnMeta>,
    pub constraints: Vec<ConstraintMeta>,
    pub indexes: Vec<IndexMeta>,
    pub dependencies: Vec<DependencyMeta>,
}

impl IntrospectedObject {
    pub fn fqname(&self) -> String {
        match &self.schema_name {
            Some(schema) => format!("{schema}.{}", self.object_name),
            None => self.object_name.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IntrospectionBundle {
    pub objects: Vec<IntrospectedObject>,
    pub warnings: Vec<String>,
}

fn is_system_schema(name: &str) -> bool {
    name.starts_with("pg_") || name == "information_schema"
}

#[derive(FromRow)]
struct RelationRow {
    schema_name: String,
    relation_name: String,
    relkind: String,
    definition: Option<String>,
    comment: Option<String>,
    owner: Option<String>,
}

#[derive(FromRow)]
struct FunctionRow {
    schema_name: String,
    function_name: String,
    definition: Option<String>,
    comment: Option<String>,
    owner: Option<String>,
    identity_args: Option<String>,
}

#[derive(FromRow)]
struct ExtensionRow {
    extname: String,
    extversion: Option<String>,
}

/// Runs `introspect_schema` against a live Postgres source, appending a
/// `"<section>: <error>"` warning per failed section instead of bailing.
pub async fn introspect_schema(pool: &PgPool, include_functions: bool) -> IntrospectionBundle {
    let mut bundle = IntrospectionBundle::default();

    let relations: Result<Vec<RelationRow>, sqlx::Error> = sqlx::query_as(
        r#"SELECT n.nspname AS schema_name,
                  c.relname AS relation_name,
                  CASE c.relkind WHEN 'r' THEN 'table' WHEN 'p' THEN 'table'
                                 WHEN 'v' THEN 'view' WHEN 'm' THEN 'view' END AS relkind,
                  CASE WHEN c.relkind IN ('v','m') THEN pg_get_viewdef(c.oid, true) ELSE NULL END AS definition,
                  obj_description(c.oid, 'pg_class') AS comment,
                  pg_get_userbyid(c.relowner) AS owner
           FROM pg_class c
           JOIN pg_namespace n ON n.oid = c.relnamespace
           WHERE c.relkind IN ('r','p','v','m')
           ORDER BY n.nspname, c.relname"#,
    )
    .fetch_all(pool)
    .await;

    match relations {
        Ok(rows) => {
            for row in rows {
                let is_system = is_system_schema(&row.schema_name);
                let columns = fetch_columns(pool, &row.schema_name, &row.relation_name).await.unwrap_or_else(|e| {
                    bundle.warnings.push(format!("columns({}.{}): {e}", row.schema_name, row.relation_name));
                    Vec::new()
                });
                let constraints = fetch_constraints(pool, &row.schema_name, &row.relation_name).await.unwrap_or_else(|e| {
                    bundle.warnings.push(format!("constraints({}.{}): {e}", row.schema_name, row.relation_name));
                    Vec::new()
                });
                let indexes = fetch_indexes(pool, &row.schema_name, &row.relation_name).await.unwrap_or_else(|e| {
                    bundle.warnings.push(format!("indexes({}.{}): {e}", row.schema_name, row.relation_name));
                    Vec::new()
                });

                bundle.objects.push(IntrospectedObject {
                    schema_name: Some(row.schema_name),
                    object_name: row.relation_name,
                    object_type: row.relkind,
                    definition: row.definition.unwrap_or_default(),
                    comment: row.comment.unwrap_or_default(),
                    signature: None,
                    owner: row.owner,
                    is_system,
                    columns,
                    constraints,
                    indexes,
                    dependencies: Vec::new(),
                });
            }
        }
        Err(e) => bundle.warnings.push(format!("relations: {e}")),
    }

    if include_functions {
        let functions: Result<Vec<FunctionRow>, sqlx::Error> = sqlx::query_as(
            r#"SELECT n.nspname AS schema_name,
                      p.proname AS function_name,
                      pg_get_functiondef(p.oid) AS definition,
                      obj_description(p.oid, 'pg_proc') AS comment,
                      pg_get_userbyid(p.proowner) AS owner,
                      pg_get_function_identity_arguments(p.oid) AS identity_args
               FROM pg_proc p
               JOIN pg_namespace n ON n.oid = p.pronamespace
               WHERE p.prokind IN ('f','p')
               ORDER BY n.nspname, p.proname"#,
        )
        .fetch_all(pool)
        .await;

        match functions {
            Ok(rows) => {
                for row in rows {
                    let is_system = is_system_schema(&row.schema_name);
                    bundle.objects.push(IntrospectedObject {
                        schema_name: Some(row.schema_name),
                        object_name: row.function_name,
                        object_type: "function".to_string(),
                        definition: row.definition.unwrap_or_default(),
                        comment: row.comment.unwrap_or_default(),
                        signature: row.identity_args,
                        owner: row.owner,
                        is_system,
                        columns: Vec::new(),
                        constraints: Vec::new(),
                        indexes: Vec::new(),
                        dependencies: Vec::new(),
                    });
                }
            }
            Err(e) => bundle.warnings.push(format!("functions: {e}")),
        }
    }

    let extensions: Result<Vec<ExtensionRow>, sqlx::Error> = sqlx::query_as("SELECT extname, extversion FROM pg_extension ORDER BY extname")
        .fetch_all(pool)
        .await;
    match extensions {
        Ok(rows) => {
            for row in rows {
                bundle.objects.push(IntrospectedObject {
                    schema_name: None,
                    object_name: row.extname,
                    object_type: "extension".to_string(),
                    definition: row.extversion.unwrap_or_default(),
                    comment: String::new(),
                    signature: None,
                    owner: None,
                    is_system: false,
                    columns: Vec::new(),
                    constraints: Vec::new(),
                    indexes: Vec::new(),
                    dependencies: Vec::new(),
                });
            }
        }
        Err(e) => bundle.warnings.push(format!("extensions: {e}")),
    }

    bundle
}

async fn fetch_columns(pool: &PgPool, schema: &str, relation: &str) -> Result<Vec<ColumnMeta>, sqlx::Error> {
    sqlx::query_as(
        r#"SELECT a.attname AS column_name,
                  format_type(a.atttypid, a.atttypmod) AS data_type,
                  NOT a.attnotnull AS is_nullable,
                  a.attnum AS ordinal_position,
                  pg_get_expr(ad.adbin, ad.adrelid) AS default_expr,
                  col_description(a.attrelid, a.attnum) AS comment
           FROM pg_attribute a
           JOIN pg_class c ON c.oid = a.attrelid
           JOIN pg_namespace n ON n.oid = c.relnamespace
           LEFT JOIN pg_attrdef ad ON ad.adrelid = a.attrelid AND ad.adnum = a.attnum
           WHERE n.nspname = $1 AND c.relname = $2 AND a.attnum > 0 AND NOT a.attisdropped
           ORDER BY a.attnum"#,
    )
    .bind(schema)
    .bind(relation)
    .fetch_all(pool)
    .await
}

async fn fetch_constraints(pool: &PgPool, schema: &str, relation: &str) -> Result<Vec<ConstraintMeta>, sqlx::Error> {
    #[derive(FromRow)]
    struct Row {
        constraint_name: String,
        contype: String,
        definition: String,
        columns: Option<Vec<String>>,
    }

    let rows: Vec<Row> = sqlx::query_as(
        r#"SELECT con.conname AS constraint_name,
                  CASE con.contype
                      WHEN 'p' THEN 'primary_key' WHEN 'f' THEN 'foreign_key'
                      WHEN 'u' THEN 'unique' WHEN 'c' THEN 'check' WHEN 'x' THEN 'exclusion'
                  END AS contype,
                  pg_get_constraintdef(con.oid) AS definition,
                  ARRAY(
                      SELECT a.attname FROM unnest(con.conkey) WITH ORDINALITY AS k(attnum, ord)
                      JOIN pg_attribute a ON a.attrelid = con.conrelid AND a.attnum = k.attnum
                      ORDER BY k.ord
                  ) AS columns
           FROM pg_constraint con
           JOIN pg_class c ON c.oid = con.conrelid
           JOIN pg_namespace n ON n.oid = c.relnamespace
           WHERE n.nspname = $1 AND c.relname = $2"#,
    )
    .bind(schema)
    .bind(relation)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|r| ConstraintMeta {
            constraint_name: r.constraint_name,
            constraint_type: r.contype,
            definition: r.definition,
            columns: r.columns.unwrap_or_default(),
        })
        .collect())
}

async fn fetch_indexes(pool: &PgPool, schema: &str, relation: &str) -> Result<Vec<IndexMeta>, sqlx::Error> {
    #[derive(FromRow)]
    struct Row {
        index_name: String,
        definition: String,
        is_unique: bool,
        is_primary: bool,
        columns: Option<Vec<String>>,
    }

    let rows: Vec<Row> = sqlx::query_as(
        r#"SELECT ic.relname AS index_name,
                  pg_get_indexdef(i.indexrelid) AS definition,
                  i.indisunique AS is_unique,
                  i.indisprimary AS is_primary,
                  ARRAY(
                      SELECT a.attname FROM unnest(i.indkey) WITH ORDINALITY AS k(attnum, ord)
                      JOIN pg_attribute a ON a.attrelid = i.indrelid AND a.attnum = k.attnum
                      ORDER BY k.ord
                  ) AS columns
           FROM pg_index i
           JOIN pg_class c ON c.oid = i.indrelid
           JOIN pg_class ic ON ic.oid = i.indexrelid
           JOIN pg_namespace n ON n.oid = c.relnamespace
           WHERE n.nspname = $1 AND c.relname = $2"#,
    )
    .bind(schema)
    .bind(relation)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|r| IndexMeta {
            index_name: r.index_name,
            definition: r.definition,
            is_unique: r.is_unique,
            is_primary: r.is_primary,
            columns: r.columns.unwrap_or_default(),
        })
        .collect())
}

/// Simple `fnmatch`-style glob: `*` matches any run of characters, `?` a
/// single character, everything else is literal.
fn glob_match(pattern: &str, text: &str) -> bool {
    fn inner(p: &[char], t: &[char]) -> bool {
        match (p.first(), t.first()) {
            (None, None) => true,
            (Some('*'), _) => inner(&p[1..], t) || (!t.is_empty() && inner(p, &t[1..])),
            (Some('?'), Some(_)) => inner(&p[1..], &t[1..]),
            (Some(pc), Some(tc)) if pc == tc => inner(&p[1..], &t[1..]),
            _ => false,
        }
    }
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    inner(&p, &t)
}

/// Applies an include-schemas allowlist and skip-pattern denylist to a
/// bundle, cascading removal to any dependency edge that now points at a
/// dropped object.
pub fn apply_filters(mut bundle: IntrospectionBundle, include_schemas: &[String], skip_patterns: &[String]) -> IntrospectionBundle {
    if !include_schemas.is_empty() {
        bundle.objects.retain(|obj| {
            obj.schema_name.as_deref().map(|s| include_schemas.iter().any(|i| i == s)).unwrap_or(true)
        });
    }

    if !skip_patterns.is_empty() {
        bundle.objects.retain(|obj| {
            let fq = obj.fqname();
            !skip_patterns.iter().any(|p| glob_match(p, &fq) || glob_match(p, &obj.object_name))
        });
    }

    let remaining: std::collections::HashSet<String> = bundle.objects.iter().map(|o| o.fqname()).collect();
    for obj in &mut bundle.objects {
        obj.dependencies.retain(|dep| remaining.contains(&dep.depends_on_fqname));
    }

    bundle
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obj(schema: &str, name: &str) -> IntrospectedObject {
        IntrospectedObject {
            schema_name: Some(schema.to_string()),
            object_name: name.to_string(),
            object_type: "table".to_string(),
            definition: String::new(),
            comment: String::new(),
            signature: None,
            owner: None,
            is_system: false,
            columns: Vec::new(),
            constraints: Vec::new(),
            indexes: Vec::new(),
            dependencies: Vec::new(),
        }
    }

    #[test]
    fn glob_match_supports_star_and_question() {
        assert!(glob_match("public.*", "public.orders"));
        assert!(glob_match("public.order?", "public.orders"));
        assert!(!glob_match("private.*", "public.orders"));
    }

    #[test]
    fn apply_filters_include_schemas_allowlist() {
        let bundle = IntrospectionBundle {
            objects: vec![obj("public", "orders"), obj("internal", "secrets")],
            warnings: vec![],
        };
        let filtered = apply_filters(bundle, &["public".to_string()], &[]);
        assert_eq!(filtered.objects.len(), 1);
        assert_eq!(filtered.objects[0].object_name, "orders");
    }

    #[test]
    fn apply_filters_skip_patterns_denylist() {
        let bundle = IntrospectionBundle {
            objects: vec![obj("public", "orders"), obj("public", "orders_audit")],
            warnings: vec![],
        };
        let filtered = apply_filters(bundle, &[], &["public.*_audit".to_string()]);
        assert_eq!(filtered.objects.len(), 1);
        assert_eq!(filtered.objects[0].object_name, "orders");
    }

    #[test]
    fn fqname_includes_schema() {
        let o = obj("public", "orders");
        assert_eq!(o.fqname(), "public.orders");
    }
}
