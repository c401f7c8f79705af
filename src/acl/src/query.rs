//! ACL query filter
//!
//! Listing resources a security identity may act on cannot go through
//! [`crate::Acl::is_allowed`] one row at a time. Instead [`join_acl`] adds an
//! inner join on the authorization table to a select query, so that only rows
//! with a matching authorization are returned.
//!
//! ```rust
//! use cretoai_acl::query::{join_acl, ResourceQuery};
//! use cretoai_acl::{ActionSchema, SecurityIdentity};
//!
//! let query = ResourceQuery::from_table("documents")
//!     .entity_class("Document")
//!     .alias("d");
//! let alice = SecurityIdentity::new("user", "alice");
//!
//! let query = join_acl(query, &alice, "view", &ActionSchema::default(), None, None).unwrap();
//! assert!(query.to_sql().contains("INNER JOIN acl_authorization"));
//! assert_eq!(query.params(), &["Document".to_string(), "alice".to_string()]);
//! ```

use crate::actions::ActionSchema;
use crate::error::{AclError, Result};
use crate::identity::SecurityIdentity;
use crate::store::AUTHORIZATION_TABLE;
use regex::Regex;

const IDENTIFIER_PATTERN: &str = "^[A-Za-z_][A-Za-z0-9_]*$";

/// Select query over the rows of one entity class
///
/// Parameters are positional (`$1`, `$2`, ...) and collected in
/// [`ResourceQuery::params`] in placeholder order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceQuery {
    table: Option<String>,
    entity_class: Option<String>,
    alias: Option<String>,
    id_column: String,
    columns: Vec<String>,
    joins: Vec<String>,
    conditions: Vec<String>,
    params: Vec<String>,
    distinct: bool,
}

impl ResourceQuery {
    /// Select from `table`
    pub fn from_table(table: impl Into<String>) -> Self {
        Self {
            table: Some(table.into()),
            id_column: "id".to_string(),
            ..Default::default()
        }
    }

    /// Query without a root table; only useful to build joins on
    pub fn empty() -> Self {
        Self {
            id_column: "id".to_string(),
            ..Default::default()
        }
    }

    /// Entity class stored in the table
    pub fn entity_class(mut self, entity_class: impl Into<String>) -> Self {
        self.entity_class = Some(entity_class.into());
        self
    }

    /// Alias of the root table
    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// Column holding the entity id (default `id`)
    pub fn id_column(mut self, column: impl Into<String>) -> Self {
        self.id_column = column.into();
        self
    }

    /// Add a selected column or expression
    pub fn select(mut self, column: impl Into<String>) -> Self {
        self.columns.push(column.into());
        self
    }

    /// Add a filter condition, AND-ed with the others
    pub fn and_where(mut self, condition: impl Into<String>) -> Self {
        self.conditions.push(condition.into());
        self
    }

    /// Add a parameter, returning its placeholder
    pub fn bind(&mut self, value: impl Into<String>) -> String {
        self.params.push(value.into());
        format!("${}", self.params.len())
    }

    /// Root entity class, if known
    pub fn root_entity_class(&self) -> Option<&str> {
        self.entity_class.as_deref()
    }

    /// Root alias, if known
    ///
    /// Falls back to the table name, which SQL accepts as qualifier when no
    /// alias is given.
    pub fn root_alias(&self) -> Option<&str> {
        self.alias.as_deref().or(self.table.as_deref())
    }

    /// Bound parameters in placeholder order
    pub fn params(&self) -> &[String] {
        &self.params
    }

    /// Render the query
    pub fn to_sql(&self) -> String {
        let mut sql = String::from("SELECT ");
        if self.distinct {
            sql.push_str("DISTINCT ");
        }

        if self.columns.is_empty() {
            match self.root_alias() {
                Some(alias) => sql.push_str(&format!("{}.*", alias)),
                None => sql.push('*'),
            }
        } else {
            sql.push_str(&self.columns.join(", "));
        }

        if let Some(table) = &self.table {
            sql.push_str(" FROM ");
            sql.push_str(table);
            if let Some(alias) = &self.alias {
                sql.push(' ');
                sql.push_str(alias);
            }
        }

        for join in &self.joins {
            sql.push(' ');
            sql.push_str(join);
        }

        if !self.conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&self.conditions.join(" AND "));
        }

        sql
    }
}

/// Restrict `query` to rows `identity` may perform `action` on
///
/// `entity_class` and `alias` default to the query's root entity class and
/// alias. The join matches authorizations on the row's id, the entity class,
/// the identity and the action column, and the query becomes `DISTINCT`
/// since several authorizations may grant the same row.
///
/// # Errors
///
/// - [`AclError::MalformedQuery`] if the class or alias cannot be resolved,
///   or the alias is not a plain identifier
/// - [`AclError::UnknownAction`] if `action` is not part of `schema`
pub fn join_acl(
    mut query: ResourceQuery,
    identity: &SecurityIdentity,
    action: &str,
    schema: &ActionSchema,
    entity_class: Option<&str>,
    alias: Option<&str>,
) -> Result<ResourceQuery> {
    let entity_class = entity_class
        .or_else(|| query.root_entity_class())
        .map(str::to_string)
        .ok_or_else(|| {
            AclError::MalformedQuery(
                "The entity class of the query could not be guessed, pass it explicitly".to_string(),
            )
        })?;

    let alias = alias
        .or_else(|| query.root_alias())
        .map(str::to_string)
        .ok_or_else(|| {
            AclError::MalformedQuery(
                "The entity alias of the query could not be guessed, pass it explicitly".to_string(),
            )
        })?;

    let identifier = Regex::new(IDENTIFIER_PATTERN)
        .map_err(|e| AclError::MalformedQuery(format!("Invalid identifier pattern: {}", e)))?;
    if !identifier.is_match(&alias) || !identifier.is_match(&query.id_column) {
        return Err(AclError::MalformedQuery(format!(
            "'{}.{}' is not a valid column reference",
            alias, query.id_column
        )));
    }

    let column = schema.column_name(action)?;
    let acl_alias = format!("acl_auth_{}", query.joins.len());
    let class_param = query.bind(entity_class);
    let identity_param = query.bind(identity.id.clone());

    let join = format!(
        "INNER JOIN {table} {a} ON {a}.entity_id = CAST({alias}.{id} AS VARCHAR) \
         AND {a}.entity_class = {class} AND {a}.security_identity_id = {identity} AND {a}.{column} = TRUE",
        table = AUTHORIZATION_TABLE,
        a = acl_alias,
        alias = alias,
        id = query.id_column,
        class = class_param,
        identity = identity_param,
        column = column
    );
    query.joins.push(join);
    query.distinct = true;

    Ok(query)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alice() -> SecurityIdentity {
        SecurityIdentity::new("user", "alice")
    }

    #[test]
    fn test_join_with_guessed_class_and_alias() {
        let query = ResourceQuery::from_table("documents")
            .entity_class("Document")
            .alias("d")
            .and_where("d.archived = FALSE");

        let query = join_acl(query, &alice(), "edit", &ActionSchema::default(), None, None).unwrap();

        assert_eq!(
            query.to_sql(),
            "SELECT DISTINCT d.* FROM documents d INNER JOIN acl_authorization acl_auth_0 \
             ON acl_auth_0.entity_id = CAST(d.id AS VARCHAR) AND acl_auth_0.entity_class = $1 \
             AND acl_auth_0.security_identity_id = $2 AND acl_auth_0.actions_edit = TRUE \
             WHERE d.archived = FALSE"
        );
        assert_eq!(query.params(), &["Document".to_string(), "alice".to_string()]);
    }

    #[test]
    fn test_explicit_class_and_alias() {
        let query = ResourceQuery::from_table("documents").select("documents.title");

        let query = join_acl(
            query,
            &alice(),
            "view",
            &ActionSchema::default(),
            Some("Document"),
            Some("documents"),
        )
        .unwrap();

        let sql = query.to_sql();
        assert!(sql.starts_with("SELECT DISTINCT documents.title FROM documents INNER JOIN"));
        assert!(sql.contains("CAST(documents.id AS VARCHAR)"));
    }

    #[test]
    fn test_table_name_used_as_alias() {
        let query = ResourceQuery::from_table("reports").entity_class("Report");
        let query = join_acl(query, &alice(), "view", &ActionSchema::default(), None, None).unwrap();
        assert!(query.to_sql().contains("CAST(reports.id AS VARCHAR)"));
    }

    #[test]
    fn test_unresolvable_target_is_malformed() {
        let schema = ActionSchema::default();

        let no_class = ResourceQuery::from_table("documents");
        assert!(matches!(
            join_acl(no_class, &alice(), "view", &schema, None, None),
            Err(AclError::MalformedQuery(_))
        ));

        let no_alias = ResourceQuery::empty().entity_class("Document");
        assert!(matches!(
            join_acl(no_alias, &alice(), "view", &schema, None, None),
            Err(AclError::MalformedQuery(_))
        ));

        let injected = ResourceQuery::from_table("documents").entity_class("Document");
        assert!(matches!(
            join_acl(injected, &alice(), "view", &schema, None, Some("d; DROP TABLE x")),
            Err(AclError::MalformedQuery(_))
        ));
    }

    #[test]
    fn test_unknown_action() {
        let query = ResourceQuery::from_table("documents").entity_class("Document");
        assert!(matches!(
            join_acl(query, &alice(), "fly", &ActionSchema::default(), None, None),
            Err(AclError::UnknownAction(_))
        ));
    }

    #[test]
    fn test_joins_stack_with_existing_params() {
        let mut query = ResourceQuery::from_table("documents").entity_class("Document").alias("d");
        let owner = query.bind("bob");
        let query = query.and_where(format!("d.owner = {}", owner));

        let schema = ActionSchema::default();
        let query = join_acl(query, &alice(), "view", &schema, None, None).unwrap();
        let query = join_acl(query, &alice(), "edit", &schema, None, None).unwrap();

        let sql = query.to_sql();
        assert!(sql.contains("acl_auth_0.entity_class = $2"));
        assert!(sql.contains("acl_auth_1.entity_class = $4"));
        assert!(sql.contains("acl_auth_1.actions_edit = TRUE"));
        assert_eq!(query.params().len(), 5);
        assert_eq!(query.params()[0], "bob");
    }
}
