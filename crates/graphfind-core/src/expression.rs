//! Compiles searchable fields into a single where clause.
//!
//! # Field rules
//!
//! | Field | Joined with | Value |
//! |-------|-------------|-------|
//! | visible | `AND` | the value the user entered |
//! | hidden with a default value | `AND` | the default value |
//! | otherwise | `OR` | the request keyword |
//!
//! `AND` predicates come first, in configuration order. The keyword
//! predicates follow as one `OR` group, parenthesized whenever the field
//! list has more than one entry:
//!
//! ```text
//! "STATUS" = 2 AND (UPPER("NAME") LIKE '%OAK%' OR UPPER("STREET") LIKE '%OAK%')
//! ```
//!
//! A field named `Any` switches to a search across every field of the
//! class, joined with the request's logical operator.
//!
//! An empty result means nothing can match; callers skip the query.

use anyhow::Result;

use crate::error::SearchError;
use crate::models::{ComparisonOperator, LogicalOperator, SearchableField};
use crate::store::{Field, FieldKind, ObjectClass};

/// A configured field resolved against the class schema.
#[derive(Debug, Clone, Copy)]
pub struct ResolvedField<'a> {
    pub field: &'a Field,
    pub config: &'a SearchableField,
}

/// Compiles `fields` for `class`.
///
/// Fails with [`SearchError::FieldNotFound`] when a configured field does
/// not exist on the class.
pub fn compile(
    class: &ObjectClass,
    keyword: &str,
    comparison: ComparisonOperator,
    logical: LogicalOperator,
    fields: &[SearchableField],
) -> Result<String> {
    if fields.iter().any(|f| f.name.is_any()) {
        return Ok(compile_all_fields(class, keyword, comparison, logical));
    }
    let resolved = resolve_fields(class, fields)?;
    Ok(compile_resolved(&resolved, keyword, comparison))
}

/// Looks up every configured field on the class schema.
pub fn resolve_fields<'a>(
    class: &'a ObjectClass,
    fields: &'a [SearchableField],
) -> Result<Vec<ResolvedField<'a>>> {
    fields
        .iter()
        .map(|config| {
            class
                .find_field(config.name.as_str())
                .map(|field| ResolvedField { field, config })
                .ok_or_else(|| {
                    SearchError::FieldNotFound {
                        class: class.name.clone(),
                        field: config.name.to_string(),
                    }
                    .into()
                })
        })
        .collect()
}

/// Compiles already-resolved fields.
pub fn compile_resolved(
    fields: &[ResolvedField<'_>],
    keyword: &str,
    comparison: ComparisonOperator,
) -> String {
    let mut ordered: Vec<&ResolvedField<'_>> = fields.iter().collect();
    // Stable: AND-joined fields keep their relative order ahead of keyword fields.
    ordered.sort_by_key(|f| uses_keyword(f.config));

    let mut and_terms = Vec::new();
    let mut or_terms = Vec::new();

    for f in ordered {
        let (operator, value) = if f.config.visible {
            (LogicalOperator::And, f.config.value.as_deref().unwrap_or(""))
        } else if let Some(default) = f.config.default_value() {
            (LogicalOperator::And, default)
        } else {
            (LogicalOperator::Or, keyword)
        };

        let Some(term) = atomic_predicate(f.field, comparison, value) else {
            continue;
        };
        match operator {
            LogicalOperator::And => and_terms.push(term),
            LogicalOperator::Or => or_terms.push(term),
        }
    }

    if !or_terms.is_empty() {
        let group = or_terms.join(" OR ");
        if fields.len() > 1 {
            and_terms.push(format!("({})", group));
        } else {
            and_terms.push(group);
        }
    }

    and_terms.join(" AND ")
}

fn uses_keyword(config: &SearchableField) -> bool {
    !config.visible && config.default_value().is_none()
}

/// Searches `keyword` across every field of the class.
pub fn compile_all_fields(
    class: &ObjectClass,
    keyword: &str,
    comparison: ComparisonOperator,
    logical: LogicalOperator,
) -> String {
    let terms: Vec<String> = class
        .fields
        .iter()
        .filter_map(|f| atomic_predicate(f, comparison, keyword))
        .collect();
    let separator = format!(" {} ", logical);
    match terms.len() {
        0 => String::new(),
        1 => terms.into_iter().next().unwrap_or_default(),
        _ => format!("({})", terms.join(&separator)),
    }
}

/// Builds `field <op> value`, or `None` when the value cannot be compared
/// against a field of this kind (including empty values).
///
/// Text literals are upper-cased over ASCII only, matching how SQLite's
/// `UPPER` and `LIKE` fold case.
pub fn atomic_predicate(field: &Field, comparison: ComparisonOperator, value: &str) -> Option<String> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    let name = quote_ident(&field.name);
    match field.kind {
        FieldKind::Text => {
            let literal = value.replace('\'', "''").to_ascii_uppercase();
            Some(match comparison {
                ComparisonOperator::Contains => format!("UPPER({}) LIKE '%{}%'", name, literal),
                ComparisonOperator::StartsWith => format!("UPPER({}) LIKE '{}%'", name, literal),
                ComparisonOperator::EndsWith => format!("UPPER({}) LIKE '%{}'", name, literal),
                ComparisonOperator::Equals => format!("UPPER({}) = '{}'", name, literal),
            })
        }
        FieldKind::Integer => value
            .parse::<i64>()
            .ok()
            .map(|n| format!("{} = {}", name, n)),
        FieldKind::Double => value
            .parse::<f64>()
            .ok()
            .filter(|n| n.is_finite())
            .map(|n| format!("{} = {}", name, n)),
        FieldKind::Date | FieldKind::Other => None,
    }
}

/// Double-quotes an identifier, doubling any embedded `"`.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ClassId;

    fn parcel() -> ObjectClass {
        ObjectClass {
            id: ClassId(1),
            name: "PARCEL".to_string(),
            workspace: "gdb".to_string(),
            model_names: Vec::new(),
            fields: vec![
                Field::new("OWNER", FieldKind::Text),
                Field::new("ADDRESS", FieldKind::Text),
                Field::new("PARCELID", FieldKind::Integer),
                Field::new("AREA", FieldKind::Double),
                Field::new("RECORDED", FieldKind::Date),
            ],
            spatial: true,
        }
    }

    fn run(fields: Vec<SearchableField>, keyword: &str) -> String {
        compile(
            &parcel(),
            keyword,
            ComparisonOperator::Contains,
            LogicalOperator::Or,
            &fields,
        )
        .unwrap()
    }

    #[test]
    fn test_single_visible_field_has_no_parentheses() {
        let fields = vec![SearchableField {
            name: "OWNER".into(),
            visible: true,
            value: Some("foo".to_string()),
        }];
        let expr = compile(
            &parcel(),
            "foo",
            ComparisonOperator::Contains,
            LogicalOperator::And,
            &fields,
        )
        .unwrap();
        assert_eq!(expr, "UPPER(\"OWNER\") LIKE '%FOO%'");
    }

    #[test]
    fn test_visible_value_ignores_keyword() {
        let expr = run(vec![SearchableField::visible("OWNER", "Smith")], "unrelated");
        assert_eq!(expr, "UPPER(\"OWNER\") LIKE '%SMITH%'");
    }

    #[test]
    fn test_keyword_group_parenthesized_after_visible() {
        let expr = run(
            vec![
                SearchableField::keyword("ADDRESS"),
                SearchableField::visible("OWNER", "smith"),
            ],
            "main",
        );
        assert_eq!(
            expr,
            "UPPER(\"OWNER\") LIKE '%SMITH%' AND (UPPER(\"ADDRESS\") LIKE '%MAIN%')"
        );
    }

    #[test]
    fn test_multiple_keyword_fields_grouped() {
        let expr = run(
            vec![
                SearchableField::keyword("OWNER"),
                SearchableField::keyword("ADDRESS"),
                SearchableField::keyword("PARCELID"),
            ],
            "42",
        );
        assert_eq!(
            expr,
            "(UPPER(\"OWNER\") LIKE '%42%' OR UPPER(\"ADDRESS\") LIKE '%42%' OR \"PARCELID\" = 42)"
        );
    }

    #[test]
    fn test_hidden_default_joins_with_and() {
        let expr = run(
            vec![
                SearchableField::keyword("OWNER"),
                SearchableField::with_default("PARCELID", "7"),
                SearchableField::keyword("ADDRESS"),
            ],
            "oak",
        );
        assert_eq!(
            expr,
            "\"PARCELID\" = 7 AND (UPPER(\"OWNER\") LIKE '%OAK%' OR UPPER(\"ADDRESS\") LIKE '%OAK%')"
        );
    }

    #[test]
    fn test_non_numeric_keyword_skips_numeric_fields() {
        let expr = run(
            vec![
                SearchableField::keyword("PARCELID"),
                SearchableField::keyword("AREA"),
            ],
            "oak",
        );
        assert_eq!(expr, "");
    }

    #[test]
    fn test_empty_visible_value_produces_nothing() {
        let expr = run(vec![SearchableField::visible("OWNER", "")], "kw");
        assert_eq!(expr, "");
    }

    #[test]
    fn test_quotes_are_escaped() {
        let expr = run(vec![SearchableField::keyword("OWNER")], "o'brien");
        assert_eq!(expr, "UPPER(\"OWNER\") LIKE '%O''BRIEN%'");
    }

    #[test]
    fn test_comparison_operators() {
        let field = Field::new("NAME", FieldKind::Text);
        assert_eq!(
            atomic_predicate(&field, ComparisonOperator::StartsWith, "ab").unwrap(),
            "UPPER(\"NAME\") LIKE 'AB%'"
        );
        assert_eq!(
            atomic_predicate(&field, ComparisonOperator::EndsWith, "ab").unwrap(),
            "UPPER(\"NAME\") LIKE '%AB'"
        );
        assert_eq!(
            atomic_predicate(&field, ComparisonOperator::Equals, "ab").unwrap(),
            "UPPER(\"NAME\") = 'AB'"
        );
        let area = Field::new("AREA", FieldKind::Double);
        assert_eq!(
            atomic_predicate(&area, ComparisonOperator::Contains, "2.5").unwrap(),
            "\"AREA\" = 2.5"
        );
        assert!(atomic_predicate(&area, ComparisonOperator::Contains, "NaN").is_none());
    }

    #[test]
    fn test_any_field_searches_every_field() {
        let expr = compile(
            &parcel(),
            "12",
            ComparisonOperator::Contains,
            LogicalOperator::Or,
            &[SearchableField::any()],
        )
        .unwrap();
        assert_eq!(
            expr,
            "(UPPER(\"OWNER\") LIKE '%12%' OR UPPER(\"ADDRESS\") LIKE '%12%' OR \"PARCELID\" = 12 OR \"AREA\" = 12)"
        );
    }

    #[test]
    fn test_any_field_bypasses_visibility() {
        let expr = compile(
            &parcel(),
            "oak",
            ComparisonOperator::Equals,
            LogicalOperator::Or,
            &[SearchableField::visible("OWNER", "smith"), SearchableField::any()],
        )
        .unwrap();
        assert_eq!(expr, "(UPPER(\"OWNER\") = 'OAK' OR UPPER(\"ADDRESS\") = 'OAK')");
    }

    #[test]
    fn test_unknown_field_is_configuration_error() {
        let err = compile(
            &parcel(),
            "x",
            ComparisonOperator::Contains,
            LogicalOperator::Or,
            &[SearchableField::keyword("COLOR")],
        )
        .unwrap_err();
        let search_err = err.downcast_ref::<SearchError>().unwrap();
        assert_eq!(
            search_err,
            &SearchError::FieldNotFound {
                class: "PARCEL".to_string(),
                field: "COLOR".to_string(),
            }
        );
        assert_eq!(err.to_string(), "table 'PARCEL' has no field 'COLOR'");
    }

    #[test]
    fn test_no_fields_compiles_to_empty() {
        assert_eq!(run(Vec::new(), "x"), "");
    }

    #[test]
    fn test_spaced_and_reserved_names_are_quoted() {
        let owner = Field::new("Owner Name", FieldKind::Text);
        assert_eq!(
            atomic_predicate(&owner, ComparisonOperator::Contains, "smith").unwrap(),
            "UPPER(\"Owner Name\") LIKE '%SMITH%'"
        );
        let order = Field::new("ORDER", FieldKind::Integer);
        assert_eq!(
            atomic_predicate(&order, ComparisonOperator::Contains, "3").unwrap(),
            "\"ORDER\" = 3"
        );
        assert_eq!(quote_ident("a\"b"), "\"a\"\"b\"");
    }

    #[test]
    fn test_literal_uppercases_ascii_only() {
        let field = Field::new("NAME", FieldKind::Text);
        assert_eq!(
            atomic_predicate(&field, ComparisonOperator::Contains, "café").unwrap(),
            "UPPER(\"NAME\") LIKE '%CAFé%'"
        );
    }
}
