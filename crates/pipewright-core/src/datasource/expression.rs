use pipewright_kit::indexmap::IndexMap;
use pipewright_kit::types::frontend::SelectableItem;
use strum::Display;

use crate::errors::{ReferenceKind, ResolutionError};
use crate::types::DataSourceDefinition;

use super::DataSourceResult;

pub const INTERSECT_TOKEN: &str = " INTERSECT ";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Display)]
pub enum SetOperator {
    #[strum(serialize = "INTERSECT")]
    Intersect,
}

/// A data source reference: a single source id, or two source ids joined by
/// a set operator. Exactly one operator occurrence is supported; the grammar
/// has no precedence, so parenthesized or multi-operator expressions are
/// rejected at parse time.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DataSourceExpression {
    Source(String),
    Binary { operator: SetOperator, left: Box<DataSourceExpression>, right: Box<DataSourceExpression> },
}

impl DataSourceExpression {
    /// Source ids referenced by the expression, left to right.
    pub fn referenced_sources(&self) -> Vec<&str> {
        match self {
            DataSourceExpression::Source(id) => vec![id.as_str()],
            DataSourceExpression::Binary { left, right, .. } => {
                let mut ids = left.referenced_sources();
                ids.extend(right.referenced_sources());
                ids
            }
        }
    }
}

pub fn parse(
    expression: &str,
    sources: &IndexMap<String, DataSourceDefinition>,
) -> Result<DataSourceExpression, ResolutionError> {
    let trimmed = expression.trim();
    if trimmed.is_empty() {
        return Err(ResolutionError::MalformedDataSourceExpression {
            expression: expression.to_string(),
            reason: "expression is empty".to_string(),
        });
    }
    if trimmed.starts_with('(') || trimmed.ends_with(')') {
        return Err(ResolutionError::MalformedDataSourceExpression {
            expression: expression.to_string(),
            reason: "parenthesized expressions are not supported".to_string(),
        });
    }
    let parts: Vec<&str> = trimmed.split(INTERSECT_TOKEN).collect();
    match parts.as_slice() {
        [single] => parse_leaf(single, expression, sources),
        [left, right] => Ok(DataSourceExpression::Binary {
            operator: SetOperator::Intersect,
            left: Box::new(parse_leaf(left, expression, sources)?),
            right: Box::new(parse_leaf(right, expression, sources)?),
        }),
        _ => Err(ResolutionError::MalformedDataSourceExpression {
            expression: expression.to_string(),
            reason: "at most one operator occurrence is supported".to_string(),
        }),
    }
}

fn parse_leaf(
    id: &str,
    expression: &str,
    sources: &IndexMap<String, DataSourceDefinition>,
) -> Result<DataSourceExpression, ResolutionError> {
    let id = id.trim();
    if id.contains(char::is_whitespace) {
        // `a UNION b` splits into one part; surface the operator rather
        // than a confusing unknown-source error.
        let tokens: Vec<&str> = id.split_whitespace().collect();
        if tokens.len() == 3 && tokens[1].chars().all(|c| c.is_ascii_uppercase()) {
            return Err(ResolutionError::UnknownDataSourceOperator {
                operator: tokens[1].to_string(),
            });
        }
        return Err(ResolutionError::MalformedDataSourceExpression {
            expression: expression.to_string(),
            reason: format!("data source id '{}' cannot contain whitespace", id),
        });
    }
    if !sources.contains_key(id) {
        return Err(ResolutionError::UnknownReference {
            referenced_by: expression.to_string(),
            kind: ReferenceKind::DataSource,
            reference: id.to_string(),
        });
    }
    Ok(DataSourceExpression::Source(id.to_string()))
}

/// Combines two evaluated sides of a binary expression. Lists are preferred
/// over scalars, scalar/scalar ties break left, and `INTERSECT` keeps items
/// from the left list whose `(value, group)` pair matches the right list
/// case-insensitively. An `Empty` side empties the whole intersection: a
/// lookup that found nothing must not disable the filter it feeds.
pub fn combine(
    operator: SetOperator,
    left: DataSourceResult,
    right: DataSourceResult,
) -> DataSourceResult {
    match operator {
        SetOperator::Intersect => intersect(left, right),
    }
}

fn intersect(left: DataSourceResult, right: DataSourceResult) -> DataSourceResult {
    use DataSourceResult::*;
    match (left, right) {
        (Empty, _) | (_, Empty) => Empty,
        (List(left), List(right)) => List(
            left.into_iter()
                .filter(|item| right.iter().any(|other| same_value_and_group(item, other)))
                .collect(),
        ),
        (List(left), _) => List(left),
        (_, List(right)) => List(right),
        (left, _) => left,
    }
}

fn same_value_and_group(a: &SelectableItem, b: &SelectableItem) -> bool {
    let value_matches = a
        .value
        .encode_to_string()
        .to_lowercase()
        .eq(&b.value.encode_to_string().to_lowercase());
    let group_matches = match (&a.group, &b.group) {
        (Some(a), Some(b)) => a.to_lowercase() == b.to_lowercase(),
        (None, None) => true,
        _ => false,
    };
    value_matches && group_matches
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipewright_kit::types::types::Value;

    fn sources(ids: &[&str]) -> IndexMap<String, DataSourceDefinition> {
        ids.iter()
            .map(|id| (id.to_string(), DataSourceDefinition::new(id, "https://example.test")))
            .collect()
    }

    fn item(value: &str) -> SelectableItem {
        SelectableItem::new(value, Value::string(value.to_string()))
    }

    #[test]
    fn parses_a_single_source_id() {
        let expr = parse("regionsSrc", &sources(&["regionsSrc"])).unwrap();
        assert_eq!(expr, DataSourceExpression::Source("regionsSrc".to_string()));
    }

    #[test]
    fn parses_a_binary_intersect() {
        let expr = parse("acrListSrc INTERSECT aksAcrListSrc", &sources(&["acrListSrc", "aksAcrListSrc"]))
            .unwrap();
        assert_eq!(expr.referenced_sources(), vec!["acrListSrc", "aksAcrListSrc"]);
    }

    #[test]
    fn rejects_parentheses() {
        let err = parse("(a INTERSECT b)", &sources(&["a", "b"])).unwrap_err();
        assert!(matches!(err, ResolutionError::MalformedDataSourceExpression { .. }));
    }

    #[test]
    fn rejects_multiple_operators() {
        let err = parse("a INTERSECT b INTERSECT c", &sources(&["a", "b", "c"])).unwrap_err();
        assert!(matches!(err, ResolutionError::MalformedDataSourceExpression { .. }));
    }

    #[test]
    fn unknown_operator_is_fatal() {
        let err = parse("a UNION b", &sources(&["a", "b"])).unwrap_err();
        assert_eq!(err, ResolutionError::UnknownDataSourceOperator { operator: "UNION".to_string() });
    }

    #[test]
    fn unknown_source_id_is_a_configuration_error() {
        let err = parse("missingSrc", &sources(&["a"])).unwrap_err();
        assert!(matches!(err, ResolutionError::UnknownReference { .. }));
    }

    #[test]
    fn intersect_matches_values_case_insensitively() {
        let left = DataSourceResult::List(vec![item("acr1"), item("acr2")]);
        let right = DataSourceResult::List(vec![item("ACR1")]);
        let DataSourceResult::List(items) = combine(SetOperator::Intersect, left, right) else {
            panic!("expected a list");
        };
        assert_eq!(items, vec![item("acr1")]);
    }

    #[test]
    fn intersect_is_commutative_on_value_and_group() {
        let a = vec![item("acr1"), item("acr2")];
        let b = vec![item("ACR1"), item("other")];
        let DataSourceResult::List(ab) = combine(
            SetOperator::Intersect,
            DataSourceResult::List(a.clone()),
            DataSourceResult::List(b.clone()),
        ) else {
            panic!("expected a list");
        };
        let DataSourceResult::List(ba) = combine(
            SetOperator::Intersect,
            DataSourceResult::List(b),
            DataSourceResult::List(a),
        ) else {
            panic!("expected a list");
        };
        let key = |item: &SelectableItem| {
            (item.value.encode_to_string().to_lowercase(), item.group.clone())
        };
        let mut ab_keys: Vec<_> = ab.iter().map(key).collect();
        let mut ba_keys: Vec<_> = ba.iter().map(key).collect();
        ab_keys.sort();
        ba_keys.sort();
        assert_eq!(ab_keys, ba_keys);
    }

    #[test]
    fn grouped_items_only_match_same_group() {
        let left = DataSourceResult::List(vec![item("acr1").with_group("East US")]);
        let right = DataSourceResult::List(vec![item("ACR1").with_group("west us")]);
        let DataSourceResult::List(items) = combine(SetOperator::Intersect, left, right) else {
            panic!("expected a list");
        };
        assert!(items.is_empty());
    }

    #[test]
    fn an_empty_side_empties_the_intersection() {
        let left = DataSourceResult::List(vec![item("acr1"), item("acr2")]);
        assert_eq!(
            combine(SetOperator::Intersect, left.clone(), DataSourceResult::Empty),
            DataSourceResult::Empty
        );
        assert_eq!(
            combine(SetOperator::Intersect, DataSourceResult::Empty, left),
            DataSourceResult::Empty
        );
    }

    #[test]
    fn list_wins_over_scalar_and_scalar_ties_break_left() {
        let list = DataSourceResult::List(vec![item("a")]);
        let scalar = DataSourceResult::Scalar(Value::string("s".into()));
        assert!(matches!(
            combine(SetOperator::Intersect, list.clone(), scalar.clone()),
            DataSourceResult::List(_)
        ));
        assert!(matches!(
            combine(SetOperator::Intersect, scalar.clone(), list),
            DataSourceResult::List(_)
        ));
        let DataSourceResult::Scalar(value) = combine(
            SetOperator::Intersect,
            DataSourceResult::Scalar(Value::string("left".into())),
            scalar,
        ) else {
            panic!("expected a scalar");
        };
        assert_eq!(value, Value::string("left".into()));
    }
}
