//! SQL Safety Gate
//!
//! Every statement bound for the database passes through [`SqlSafetyGate::validate`].
//! Checks run in a fixed order:
//!
//! 1. strip whitespace and one trailing `;`
//! 2. the first token must be `SELECT`
//! 3. no denylisted DML/DDL keyword anywhere
//! 4. no second statement
//! 5. append `LIMIT <default>` when no LIMIT is present
//! 6. at least one allowed object referenced (introspection namespaces excepted)
//! 7. every qualified column reference names a known column
//!
//! The output of a successful validation validates to itself.

use crate::catalog::CatalogSnapshot;
use crate::error::SqlRejection;
use crate::security::lexer::{lex, IdentChain, LexedSql};
use itertools::Itertools;
use std::collections::HashSet;
use tracing::{debug, warn};

pub const DEFAULT_ROW_LIMIT: usize = 200;

pub const FORBIDDEN_KEYWORDS: [&str; 7] = [
    "insert", "update", "delete", "drop", "alter", "truncate", "create",
];

pub const INTROSPECTION_NAMESPACES: [&str; 2] = ["information_schema", "pg_catalog"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatePolicy {
    pub default_limit: usize,
    pub forbidden_keywords: Vec<String>,
    pub introspection_namespaces: Vec<String>,
}

impl Default for GatePolicy {
    fn default() -> Self {
        Self {
            default_limit: DEFAULT_ROW_LIMIT,
            forbidden_keywords: FORBIDDEN_KEYWORDS.iter().map(|s| s.to_string()).collect(),
            introspection_namespaces: INTROSPECTION_NAMESPACES
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl GatePolicy {
    pub fn with_default_limit(default_limit: usize) -> Self {
        Self {
            default_limit,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SqlSafetyGate {
    policy: GatePolicy,
}

impl SqlSafetyGate {
    pub fn new(policy: GatePolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &GatePolicy {
        &self.policy
    }

    /// Validate against the allowlists of a catalog snapshot.
    pub fn validate_for_catalog(
        &self,
        sql: &str,
        catalog: &CatalogSnapshot,
    ) -> Result<String, SqlRejection> {
        self.run(
            sql,
            catalog.allowed_objects(),
            catalog.allowed_columns(),
            Some(catalog.default_schema()),
        )
    }

    /// Validate and normalize `sql`. Allowlists hold lower-cased names; an
    /// empty allowlist disables the corresponding check. Relations must be
    /// schema-qualified to count as allowed.
    pub fn validate(
        &self,
        sql: &str,
        allowed_objects: &HashSet<String>,
        allowed_columns: &HashSet<String>,
    ) -> Result<String, SqlRejection> {
        self.run(sql, allowed_objects, allowed_columns, None)
    }

    /// Unqualified relation names resolve against `default_schema` when given.
    fn run(
        &self,
        sql: &str,
        allowed_objects: &HashSet<String>,
        allowed_columns: &HashSet<String>,
        default_schema: Option<&str>,
    ) -> Result<String, SqlRejection> {
        let result = self.check(sql, allowed_objects, allowed_columns, default_schema);
        match &result {
            Ok(normalized) => debug!("SQL passed safety gate: {}", normalized),
            Err(rejection) => warn!("SQL rejected by safety gate ({}): {}", rejection, sql),
        }
        result
    }

    fn check(
        &self,
        sql: &str,
        allowed_objects: &HashSet<String>,
        allowed_columns: &HashSet<String>,
        default_schema: Option<&str>,
    ) -> Result<String, SqlRejection> {
        let trimmed = sql.trim();
        let stripped = trimmed.strip_suffix(';').unwrap_or(trimmed).trim_end();
        let lexed = lex(stripped);
        // A terminator followed only by comments is dropped, comments kept.
        let cleaned = match lexed.dangling_terminator {
            Some(at) => format!("{}{}", stripped[..at].trim_end(), &stripped[at + 1..]),
            None => stripped.to_string(),
        };

        if lexed.first_word.as_deref() != Some("select") {
            return Err(SqlRejection::NotSelect);
        }

        if let Some(word) = lexed
            .words
            .iter()
            .find(|w| self.policy.forbidden_keywords.iter().any(|k| k == *w))
        {
            return Err(SqlRejection::ForbiddenKeyword(word.clone()));
        }

        if lexed.statement_separators > 0 {
            return Err(SqlRejection::MultipleStatements);
        }

        let normalized = if lexed.has_word("limit") {
            cleaned
        } else if lexed.ends_with_line_comment {
            format!("{}\nLIMIT {}", cleaned, self.policy.default_limit)
        } else {
            format!("{} LIMIT {}", cleaned, self.policy.default_limit)
        };

        if !allowed_objects.is_empty() {
            self.check_objects(&lexed, allowed_objects, default_schema)?;
        }
        if !allowed_columns.is_empty() {
            self.check_columns(&lexed, allowed_objects, allowed_columns)?;
        }

        Ok(normalized)
    }

    fn is_introspection(&self, chain: &IdentChain) -> bool {
        chain
            .parts
            .first()
            .map(|root| {
                let root = root.to_lowercase();
                self.policy.introspection_namespaces.iter().any(|ns| *ns == root)
            })
            .unwrap_or(false)
    }

    fn check_objects(
        &self,
        lexed: &LexedSql,
        allowed_objects: &HashSet<String>,
        default_schema: Option<&str>,
    ) -> Result<(), SqlRejection> {
        // Bare names count only for objects in the default schema.
        let bare_names: HashSet<&str> = default_schema
            .map(str::to_lowercase)
            .map(|schema| {
                allowed_objects
                    .iter()
                    .filter_map(|o| o.split_once('.'))
                    .filter(|(s, _)| *s == schema)
                    .map(|(_, name)| name)
                    .collect()
            })
            .unwrap_or_default();

        let references_allowed = lexed.chains.iter().any(|chain| {
            if self.is_introspection(chain) {
                return true;
            }
            let parts = chain.lowered();
            match parts.as_slice() {
                [single] => chain.after_relation_keyword && bare_names.contains(single.as_str()),
                [schema, name, ..] => allowed_objects.contains(&format!("{}.{}", schema, name)),
                [] => false,
            }
        });

        if references_allowed {
            Ok(())
        } else {
            let mut allowed: Vec<&String> = allowed_objects.iter().collect();
            allowed.sort();
            Err(SqlRejection::DisallowedObject(allowed.iter().join(", ")))
        }
    }

    fn check_columns(
        &self,
        lexed: &LexedSql,
        allowed_objects: &HashSet<String>,
        allowed_columns: &HashSet<String>,
    ) -> Result<(), SqlRejection> {
        for chain in lexed.chains.iter().filter(|c| c.is_qualified()) {
            if self.is_introspection(chain) {
                continue;
            }
            let parts = chain.lowered();
            // Relation references name objects, not columns.
            if chain.after_relation_keyword || allowed_objects.contains(&parts.join(".")) {
                continue;
            }
            let column = parts.last().map(String::as_str).unwrap_or_default();
            if column == "*" || allowed_columns.contains(column) {
                continue;
            }
            let written = chain.parts.last().cloned().unwrap_or_default();
            return Err(SqlRejection::UnknownColumn {
                suggestion: closest_column(column, allowed_columns),
                column: written,
            });
        }
        Ok(())
    }
}

/// Closest known column by Jaro-Winkler similarity, if reasonably close.
fn closest_column(column: &str, allowed_columns: &HashSet<String>) -> Option<String> {
    allowed_columns
        .iter()
        .map(|candidate| (strsim::jaro_winkler(column, candidate), candidate))
        .filter(|(score, _)| *score >= 0.8)
        .max_by(|a, b| {
            a.0.partial_cmp(&b.0)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.1.cmp(a.1))
        })
        .map(|(_, candidate)| candidate.clone())
}
