//! Activator/inhibitor expression language.
//!
//! | Notation    | Meaning                                                   |
//! |-------------|-----------------------------------------------------------|
//! | `a,b`       | OR across top-level groups (`max`)                        |
//! | `a+b`       | weighted sum (cannot be mixed with commas)                |
//! | `(a,b)`     | AND of the enclosed group (`min`)                         |
//! | `{a}`       | initializer, top level only                               |
//! | `{a}[b]`    | necessary / enhance pair                                  |
//! | `a^`, `!a^` | highest-state test and its negation                       |
//! | `!a`        | NOT via n's complement                                    |
//! | `w*a`       | product of weights and terms                              |
//! | `a=k`       | target-level test                                         |
//! | `d~a`       | value of `a` from `d` steps in the past (`a~d` also read) |
//!
//! Expressions are parsed once, with regulator names resolved to element ids,
//! and evaluated on every update.

use serde::Serialize;

use super::EvalEnv;
use crate::error::{LevelNetError, Result};
use crate::model::ElementId;

/// Top-level reduction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Combine {
    Or,
    Sum,
}

/// Where a regulator level is read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Current(ElementId),
    Delayed { id: ElementId, delay: u32 },
}

impl Source {
    pub fn id(&self) -> ElementId {
        match *self {
            Source::Current(id) | Source::Delayed { id, .. } => id,
        }
    }
}

/// Comma or plus separated list inside braces, optionally prefixed `w*`.
#[derive(Debug, Clone, PartialEq)]
pub struct Group {
    pub weight: Option<f64>,
    pub terms: Vec<Term>,
}

/// A sub-expression yielding exactly one score.
#[derive(Debug, Clone, PartialEq)]
pub enum Term {
    Level(Source),
    Not(Source),
    Highest { id: ElementId, negated: bool },
    Target { id: ElementId, level: usize },
    Weight(f64),
    Product(Vec<Term>),
    And(Vec<Term>),
    Necessary { necessary: Group, enhance: Group },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    source: String,
    combine: Combine,
    initializers: Vec<Group>,
    terms: Vec<Term>,
}

impl Expression {
    /// Parse `text`; blank text means "no regulation" and yields `None`.
    pub fn parse(
        element: &str,
        text: &str,
        resolve: &dyn Fn(&str) -> Option<ElementId>,
    ) -> Result<Option<Self>> {
        let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
        if compact.is_empty() {
            return Ok(None);
        }

        let parser = Parser {
            element,
            source: &compact,
            resolve,
        };
        if !balanced(&compact) {
            return Err(parser.malformed("unbalanced brackets"));
        }

        let (combine, items) = if compact.contains('+') {
            if compact.contains(',') {
                return Err(parser.malformed(
                    "mixed commas (OR) and plus signs (SUM); \
                     replace deprecated highest-state notation element+ with element^",
                ));
            }
            if compact.ends_with('+') {
                return Err(
                    parser.malformed("deprecated highest-state notation element+, use element^")
                );
            }
            (Combine::Sum, split_top_level(&compact, '+'))
        } else {
            (Combine::Or, split_top_level(&compact, ','))
        };

        let mut initializers = Vec::new();
        let mut terms = Vec::new();
        for item in items {
            if item.is_empty() {
                return Err(parser.malformed("empty term"));
            }
            if encloses(item, '{', '}') {
                initializers.push(parser.group(&item[1..item.len() - 1])?);
            } else {
                terms.push(parser.term(item)?);
            }
        }

        Ok(Some(Self {
            source: compact,
            combine,
            initializers,
            terms,
        }))
    }

    /// Whitespace-stripped source text
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn combine(&self) -> Combine {
        self.combine
    }

    /// Distinct regulator ids in order of first appearance.
    pub fn regulators(&self) -> Vec<ElementId> {
        let mut ids = Vec::new();
        for group in &self.initializers {
            collect_group(group, &mut ids);
        }
        for term in &self.terms {
            collect_term(term, &mut ids);
        }
        ids
    }

    /// Regulation score of this expression for element `own`.
    ///
    /// Initializers suppress the score to 0 when `own` is at level 0 and every
    /// initializer evaluates to 0.
    pub fn score(&self, own: ElementId, env: &mut EvalEnv<'_>) -> f64 {
        let init: Vec<f64> = self
            .initializers
            .iter()
            .flat_map(|g| eval_group(g, env))
            .collect();

        if env.level(own) == 0 && !init.is_empty() && init.iter().all(|&y| y == 0.0) {
            return 0.0;
        }

        let scores: Vec<f64> = self.terms.iter().map(|t| eval_term(t, env)).collect();
        match self.combine {
            Combine::Sum => init.iter().sum::<f64>() + scores.iter().sum::<f64>(),
            Combine::Or => init
                .iter()
                .chain(scores.iter())
                .copied()
                .fold(f64::NEG_INFINITY, f64::max),
        }
    }
}

fn eval_group(group: &Group, env: &mut EvalEnv<'_>) -> Vec<f64> {
    let weight = group.weight.unwrap_or(1.0);
    group
        .terms
        .iter()
        .map(|t| weight * eval_term(t, env))
        .collect()
}

fn eval_source(source: Source, env: &mut EvalEnv<'_>) -> f64 {
    match source {
        Source::Current(id) => env.normalized(id, env.level(id)),
        Source::Delayed { id, delay } => {
            let level = env.delayed_level(id, delay);
            env.normalized(id, level)
        }
    }
}

fn eval_term(term: &Term, env: &mut EvalEnv<'_>) -> f64 {
    match term {
        Term::Level(source) => eval_source(*source, env),
        Term::Not(source) => 1.0 - eval_source(*source, env),
        Term::Highest { id, negated } => {
            let at_max = env.level(*id) == env.max_level(*id);
            if at_max != *negated {
                1.0
            } else {
                0.0
            }
        }
        Term::Target { id, level } => {
            if env.level(*id) == *level {
                1.0
            } else {
                0.0
            }
        }
        Term::Weight(w) => *w,
        Term::Product(factors) => factors.iter().map(|f| eval_term(f, env)).product(),
        Term::And(members) => members
            .iter()
            .map(|m| eval_term(m, env))
            .fold(f64::INFINITY, f64::min),
        Term::Necessary { necessary, enhance } => {
            let need = eval_group(necessary, env);
            let boost = eval_group(enhance, env);
            if need.iter().all(|&y| y == 0.0) {
                return 0.0;
            }
            let weight = enhance.weight.or(necessary.weight).unwrap_or(0.0);
            if weight > 0.0 {
                need.iter().sum::<f64>() + boost.iter().sum::<f64>()
            } else {
                let min_need = need.iter().copied().fold(f64::INFINITY, f64::min);
                let max_boost = boost.iter().copied().fold(f64::NEG_INFINITY, f64::max);
                min_need.max(max_boost).clamp(0.0, 1.0)
            }
        }
    }
}

fn collect_group(group: &Group, ids: &mut Vec<ElementId>) {
    for term in &group.terms {
        collect_term(term, ids);
    }
}

fn push_unique(ids: &mut Vec<ElementId>, id: ElementId) {
    if !ids.contains(&id) {
        ids.push(id);
    }
}

fn collect_term(term: &Term, ids: &mut Vec<ElementId>) {
    match term {
        Term::Level(s) | Term::Not(s) => push_unique(ids, s.id()),
        Term::Highest { id, .. } | Term::Target { id, .. } => push_unique(ids, *id),
        Term::Weight(_) => {}
        Term::Product(ts) | Term::And(ts) => {
            for t in ts {
                collect_term(t, ids);
            }
        }
        Term::Necessary { necessary, enhance } => {
            collect_group(necessary, ids);
            collect_group(enhance, ids);
        }
    }
}

struct Parser<'a> {
    element: &'a str,
    source: &'a str,
    resolve: &'a dyn Fn(&str) -> Option<ElementId>,
}

impl<'a> Parser<'a> {
    fn malformed(&self, reason: &str) -> LevelNetError {
        LevelNetError::MalformedExpression {
            element: self.element.to_string(),
            expression: self.source.to_string(),
            reason: reason.to_string(),
        }
    }

    fn name(&self, token: &str) -> Result<ElementId> {
        let valid = !token.is_empty()
            && token.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
            && token.chars().any(|c| c.is_ascii_alphabetic());
        if !valid {
            return Err(self.malformed(&format!("unparseable regulator token '{token}'")));
        }
        (self.resolve)(token).ok_or_else(|| LevelNetError::UnknownRegulator {
            element: self.element.to_string(),
            regulator: token.to_string(),
        })
    }

    /// Braced group: `w*a,b` or `a,b` or `a+b`.
    fn group(&self, text: &str) -> Result<Group> {
        if text.is_empty() {
            return Err(self.malformed("empty necessary/enhance term"));
        }
        let (weight, body) = match text.split_once('*') {
            Some((w, rest)) if !w.chars().any(|c| c.is_ascii_alphabetic()) => {
                let w: f64 = w
                    .parse()
                    .map_err(|_| self.malformed(&format!("invalid weight '{w}'")))?;
                (Some(w), rest)
            }
            _ => (None, text),
        };
        Ok(Group {
            weight,
            terms: self.list(body)?,
        })
    }

    /// Nested comma list; a nested `+` list behaves like a comma list.
    fn list(&self, text: &str) -> Result<Vec<Term>> {
        let mut items = split_top_level(text, ',');
        if items.len() == 1 {
            items = split_top_level(text, '+');
        }
        items
            .into_iter()
            .map(|item| {
                if item.is_empty() {
                    Err(self.malformed("empty term"))
                } else if encloses(item, '{', '}') {
                    Err(self.malformed("initializer {..} is only allowed at the top level"))
                } else {
                    self.term(item)
                }
            })
            .collect()
    }

    fn term(&self, item: &str) -> Result<Term> {
        if item.starts_with('{') {
            if let Some(cut) = closing_index(item) {
                let rest = &item[cut + 1..];
                if rest.starts_with('[') && encloses(rest, '[', ']') {
                    let necessary = self.group(&item[1..cut])?;
                    let enhance = self.group(&rest[1..rest.len() - 1])?;
                    return Ok(Term::Necessary { necessary, enhance });
                }
            }
        }

        if encloses(item, '(', ')') {
            return Ok(Term::And(self.list(&item[1..item.len() - 1])?));
        }

        let factors = split_top_level(item, '*');
        if factors.len() > 1 {
            return factors
                .into_iter()
                .map(|f| {
                    if f.is_empty() {
                        Err(self.malformed("empty factor"))
                    } else if !f.chars().any(|c| c.is_ascii_alphabetic()) {
                        f.parse()
                            .map(Term::Weight)
                            .map_err(|_| self.malformed(&format!("invalid weight '{f}'")))
                    } else {
                        self.term(f)
                    }
                })
                .collect::<Result<Vec<_>>>()
                .map(Term::Product);
        }

        if let Some(body) = item.strip_suffix('^') {
            let (negated, name) = match body.strip_prefix('!') {
                Some(name) => (true, name),
                None => (false, body),
            };
            return Ok(Term::Highest {
                id: self.name(name)?,
                negated,
            });
        }

        if let Some(rest) = item.strip_prefix('!') {
            return Ok(Term::Not(self.source_of(rest)?));
        }

        if let Some((name, level)) = item.split_once('=') {
            let level = level
                .parse()
                .map_err(|_| self.malformed(&format!("invalid target level '{level}'")))?;
            return Ok(Term::Target {
                id: self.name(name)?,
                level,
            });
        }

        Ok(Term::Level(self.source_of(item)?))
    }

    fn source_of(&self, token: &str) -> Result<Source> {
        let Some((left, right)) = token.split_once('~') else {
            return Ok(Source::Current(self.name(token)?));
        };
        let (name, delay) = if let Ok(delay) = left.parse::<u32>() {
            (right, delay)
        } else if let Ok(delay) = right.parse::<u32>() {
            (left, delay)
        } else {
            return Err(self.malformed(&format!("invalid propagation delay in '{token}'")));
        };
        Ok(Source::Delayed {
            id: self.name(name)?,
            delay,
        })
    }
}

fn depth_delta(c: char) -> i32 {
    match c {
        '(' | '{' | '[' => 1,
        ')' | '}' | ']' => -1,
        _ => 0,
    }
}

fn balanced(text: &str) -> bool {
    let mut depth = 0;
    for c in text.chars() {
        depth += depth_delta(c);
        if depth < 0 {
            return false;
        }
    }
    depth == 0
}

/// Split on `sep` outside any brackets.
fn split_top_level(text: &str, sep: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0;
    let mut start = 0;
    for (i, c) in text.char_indices() {
        depth += depth_delta(c);
        if c == sep && depth == 0 {
            parts.push(&text[start..i]);
            start = i + c.len_utf8();
        }
    }
    parts.push(&text[start..]);
    parts
}

/// Byte index of the bracket closing the one at position 0.
fn closing_index(text: &str) -> Option<usize> {
    let mut depth = 0;
    for (i, c) in text.char_indices() {
        depth += depth_delta(c);
        if depth == 0 {
            return if i == 0 { None } else { Some(i) };
        }
    }
    None
}

/// True when `text` is one bracketed unit `open .. close`.
fn encloses(text: &str, open: char, close: char) -> bool {
    text.starts_with(open) && text.ends_with(close) && closing_index(text) == Some(text.len() - 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DelayJitter;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    const NAMES: [&str; 5] = ["A", "B", "C", "D", "X"];

    fn resolve(name: &str) -> Option<ElementId> {
        NAMES.iter().position(|n| *n == name)
    }

    fn parse(text: &str) -> Expression {
        Expression::parse("X", text, &resolve).unwrap().unwrap()
    }

    /// Score with all elements having 3 levels.
    fn score(text: &str, values: [usize; 5]) -> f64 {
        score_with_history(text, values, &[const { Vec::new() }; 5])
    }

    fn score_with_history(text: &str, values: [usize; 5], history: &[Vec<usize>]) -> f64 {
        let expr = parse(text);
        let levels = [3; 5];
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let mut env = EvalEnv {
            levels: &levels,
            values: &values,
            history,
            jitter: DelayJitter::Fixed,
            delta: 0,
            rng: &mut rng,
        };
        expr.score(4, &mut env)
    }

    #[test]
    fn test_blank_is_none() {
        assert!(Expression::parse("X", "  ", &resolve).unwrap().is_none());
    }

    #[test]
    fn test_or_and_sum() {
        assert_eq!(score("A,B", [1, 2, 0, 0, 0]), 1.0);
        assert_eq!(score("(A,B)", [1, 2, 0, 0, 0]), 0.5);
        assert_eq!(score("A+B", [1, 2, 0, 0, 0]), 1.5);
        assert_eq!(score("(A,B),C", [2, 2, 1, 0, 0]), 1.0);
        assert_eq!(parse("A+B").combine(), Combine::Sum);
    }

    #[test]
    fn test_not_highest_target() {
        assert_eq!(score("!A", [1, 0, 0, 0, 0]), 0.5);
        assert_eq!(score("A^", [2, 0, 0, 0, 0]), 1.0);
        assert_eq!(score("A^", [1, 0, 0, 0, 0]), 0.0);
        assert_eq!(score("!A^", [1, 0, 0, 0, 0]), 1.0);
        assert_eq!(score("A=1", [1, 0, 0, 0, 0]), 1.0);
        assert_eq!(score("A=2", [1, 0, 0, 0, 0]), 0.0);
    }

    #[test]
    fn test_weights_multiply() {
        assert_eq!(score("2*A", [1, 0, 0, 0, 0]), 1.0);
        assert_eq!(score("0.5*A*B", [2, 2, 0, 0, 0]), 0.5);
        assert_eq!(score("2*A+B", [1, 2, 0, 0, 0]), 2.0);
    }

    #[test]
    fn test_initializer_suppresses_at_zero() {
        // own level 0 and initializer 0 => suppressed
        assert_eq!(score("{A},B", [0, 2, 0, 0, 0]), 0.0);
        // own level nonzero => ordinary OR
        assert_eq!(score("{A},B", [0, 2, 0, 0, 1]), 1.0);
        // initializer active => OR includes it
        assert_eq!(score("{A},B", [1, 0, 0, 0, 0]), 0.5);
    }

    #[test]
    fn test_necessary_pair() {
        // necessary absent => 0 regardless of enhancer
        assert_eq!(score("{A}[B]", [0, 2, 0, 0, 0]), 0.0);
        // unweighted: clamp(max(min(nec), max(enh)))
        assert_eq!(score("{A}[B]", [1, 2, 0, 0, 0]), 1.0);
        assert_eq!(score("{A,C}[B]", [2, 0, 1, 0, 0]), 0.5);
        // weighted: sum
        assert_eq!(score("{2*A}[B]", [1, 2, 0, 0, 0]), 2.0);
    }

    #[test]
    fn test_propagation_delay_both_notations() {
        let history = vec![vec![0, 0, 2], vec![], vec![], vec![], vec![]];
        assert_eq!(score_with_history("2~A", [2, 0, 0, 0, 0], &history), 0.0);
        assert_eq!(score_with_history("A~2", [2, 0, 0, 0, 0], &history), 0.0);
        assert_eq!(score_with_history("!2~A", [2, 0, 0, 0, 0], &history), 1.0);
        assert_eq!(score_with_history("0~A", [2, 0, 0, 0, 0], &history), 1.0);
    }

    #[test]
    fn test_regulators_collected() {
        let expr = parse("(A,B),{C}[2~D],!A");
        assert_eq!(expr.regulators(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_malformed_expressions() {
        let err = |text: &str| Expression::parse("X", text, &resolve).unwrap_err();
        assert!(matches!(err("A,B+C"), LevelNetError::MalformedExpression { .. }));
        assert!(matches!(err("A+"), LevelNetError::MalformedExpression { .. }));
        assert!(matches!(err("{}[A]"), LevelNetError::MalformedExpression { .. }));
        assert!(matches!(err("(A,B"), LevelNetError::MalformedExpression { .. }));
        assert!(matches!(err("A,,B"), LevelNetError::MalformedExpression { .. }));
        assert!(matches!(err("(A,{B})"), LevelNetError::MalformedExpression { .. }));
        assert!(matches!(err("A-B"), LevelNetError::MalformedExpression { .. }));
        assert!(matches!(err("Q"), LevelNetError::UnknownRegulator { .. }));
    }
}
