//! Visibility rules: homogeneous `&&`- or `||`-joined comparison predicates
//! over other inputs' resolved values, e.g.
//! `useCustomDomain == true && environment != prod`.

use pipewright_kit::types::types::Value;
use strum::Display;

use crate::errors::ResolutionError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Display)]
pub enum RuleOperator {
    #[strum(serialize = "&&")]
    And,
    #[strum(serialize = "||")]
    Or,
}

/// Comparison operators, longest token first so that scanning never matches
/// `=` inside `==`, or `Contains` inside `NotContains`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Comparison {
    NotContains,
    NotStartsWith,
    NotEndsWith,
    StartsWith,
    EndsWith,
    Contains,
    Le,
    Ge,
    EqEq,
    Ne,
    Eq,
    Lt,
    Gt,
}

const COMPARISON_TOKENS: &[(&str, Comparison)] = &[
    ("NotContains", Comparison::NotContains),
    ("NotStartsWith", Comparison::NotStartsWith),
    ("NotEndsWith", Comparison::NotEndsWith),
    ("StartsWith", Comparison::StartsWith),
    ("EndsWith", Comparison::EndsWith),
    ("Contains", Comparison::Contains),
    ("<=", Comparison::Le),
    (">=", Comparison::Ge),
    ("==", Comparison::EqEq),
    ("!=", Comparison::Ne),
    ("=", Comparison::Eq),
    ("<", Comparison::Lt),
    (">", Comparison::Gt),
];

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Predicate {
    pub input_id: String,
    pub comparison: Comparison,
    pub literal: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VisibilityRule {
    pub operator: Option<RuleOperator>,
    pub predicates: Vec<Predicate>,
}

/// Operand for one predicate: the referenced input's resolved value, or the
/// fact that it is currently hidden. A hidden input cannot satisfy any
/// condition, so its predicates evaluate to false.
#[derive(Clone, Debug)]
pub enum PredicateOperand {
    Hidden,
    Visible(Value),
}

pub fn parse_rule(rule: &str) -> Result<VisibilityRule, ResolutionError> {
    let has_and = rule.contains("&&");
    let has_or = rule.contains("||");
    if has_and && has_or {
        return Err(ResolutionError::MalformedVisibilityRule {
            rule: rule.to_string(),
            reason: "mixing '&&' and '||' in one rule is not supported".to_string(),
        });
    }
    let (operator, clauses): (Option<RuleOperator>, Vec<&str>) = if has_and {
        (Some(RuleOperator::And), rule.split("&&").collect())
    } else if has_or {
        (Some(RuleOperator::Or), rule.split("||").collect())
    } else {
        (None, vec![rule])
    };
    let predicates = clauses
        .iter()
        .map(|clause| parse_predicate(clause, rule))
        .collect::<Result<Vec<Predicate>, ResolutionError>>()?;
    Ok(VisibilityRule { operator, predicates })
}

fn parse_predicate(clause: &str, rule: &str) -> Result<Predicate, ResolutionError> {
    let clause = clause.trim();
    for (token, comparison) in COMPARISON_TOKENS.iter() {
        let Some(at) = find_operator(clause, token) else {
            continue;
        };
        let input_id = clause[..at].trim();
        let literal = clause[at + token.len()..].trim();
        if input_id.is_empty() {
            return Err(ResolutionError::MalformedVisibilityRule {
                rule: rule.to_string(),
                reason: format!("predicate '{}' is missing an input name", clause),
            });
        }
        if !input_id.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-') {
            return Err(ResolutionError::MalformedVisibilityRule {
                rule: rule.to_string(),
                reason: format!("'{}' is not a valid input name", input_id),
            });
        }
        let literal = literal.trim_matches('\'').trim_matches('"');
        return Ok(Predicate {
            input_id: input_id.to_string(),
            comparison: *comparison,
            literal: literal.to_string(),
        });
    }
    Err(ResolutionError::MalformedVisibilityRule {
        rule: rule.to_string(),
        reason: format!("predicate '{}' has no comparison operator", clause),
    })
}

/// Word operators (`Contains`, ...) must stand alone between whitespace;
/// symbol operators may touch their operands (`a==b`).
fn find_operator(clause: &str, token: &str) -> Option<usize> {
    let is_word = token.chars().all(|c| c.is_ascii_alphabetic());
    let mut from = 0;
    while let Some(offset) = clause[from..].find(token) {
        let at = from + offset;
        if !is_word {
            return Some(at);
        }
        let before_ok =
            at == 0 || clause[..at].chars().last().map(char::is_whitespace).unwrap_or(true);
        let after = at + token.len();
        let after_ok = after == clause.len()
            || clause[after..].chars().next().map(char::is_whitespace).unwrap_or(true);
        if before_ok && after_ok {
            return Some(at);
        }
        from = at + token.len();
    }
    None
}

impl VisibilityRule {
    /// Evaluates the rule given each referenced input's operand. All
    /// predicates are evaluated (no short-circuit) for determinism. A
    /// missing operand is an orchestrator ordering bug upstream; it counts
    /// as false here rather than panicking.
    pub fn evaluate<F>(&self, operand_for: F) -> bool
    where
        F: Fn(&str) -> Option<PredicateOperand>,
    {
        let results: Vec<bool> = self
            .predicates
            .iter()
            .map(|predicate| match operand_for(&predicate.input_id) {
                Some(PredicateOperand::Visible(value)) => predicate.compare(&value),
                Some(PredicateOperand::Hidden) | None => false,
            })
            .collect();
        match self.operator {
            Some(RuleOperator::And) => results.iter().fold(true, |acc, r| acc && *r),
            Some(RuleOperator::Or) => results.iter().fold(false, |acc, r| acc || *r),
            None => results.first().copied().unwrap_or(false),
        }
    }

    pub fn referenced_inputs(&self) -> Vec<&str> {
        self.predicates.iter().map(|p| p.input_id.as_str()).collect()
    }
}

impl Predicate {
    /// Case-insensitive string comparison. The ordering operators compare
    /// the lower-cased strings lexically, NOT numerically: `"10" < "9"`
    /// holds. Kept for compatibility with existing rules.
    pub fn compare(&self, value: &Value) -> bool {
        let lhs = value.encode_to_string().to_lowercase();
        let rhs = self.literal.to_lowercase();
        match self.comparison {
            Comparison::Eq | Comparison::EqEq => lhs == rhs,
            Comparison::Ne => lhs != rhs,
            Comparison::Lt => lhs < rhs,
            Comparison::Gt => lhs > rhs,
            Comparison::Le => lhs <= rhs,
            Comparison::Ge => lhs >= rhs,
            Comparison::Contains => lhs.contains(&rhs),
            Comparison::StartsWith => lhs.starts_with(&rhs),
            Comparison::EndsWith => lhs.ends_with(&rhs),
            Comparison::NotContains => !lhs.contains(&rhs),
            Comparison::NotStartsWith => !lhs.starts_with(&rhs),
            Comparison::NotEndsWith => !lhs.ends_with(&rhs),
        }
    }
}
