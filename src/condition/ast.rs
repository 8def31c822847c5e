// SPDX-License-Identifier: MIT

//! Abstract Syntax Tree for condition expressions

use std::fmt;

/// A single test reference: `name` or `name:{config}`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Leaf {
    pub test: String,
    /// Passed verbatim to the test constructor
    pub config: Option<String>,
}

impl Leaf {
    pub fn new(test: impl Into<String>, config: Option<&str>) -> Self {
        Self {
            test: test.into(),
            config: config.map(str::to_string),
        }
    }
}

impl fmt::Display for Leaf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.config {
            Some(config) => write!(f, "{}:{{{}}}", self.test, config),
            None => write!(f, "{}", self.test),
        }
    }
}

/// A parsed condition expression
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    /// Test reference
    Leaf(Leaf),
    /// Logical AND
    And(Box<Expression>, Box<Expression>),
    /// Logical OR
    Or(Box<Expression>, Box<Expression>),
    /// Logical NOT
    Not(Box<Expression>),
}

impl Expression {
    pub fn leaf(test: &str, config: Option<&str>) -> Self {
        Expression::Leaf(Leaf::new(test, config))
    }

    pub fn and(left: Expression, right: Expression) -> Self {
        Expression::And(Box::new(left), Box::new(right))
    }

    pub fn or(left: Expression, right: Expression) -> Self {
        Expression::Or(Box::new(left), Box::new(right))
    }

    pub fn not(operand: Expression) -> Self {
        Expression::Not(Box::new(operand))
    }

    /// Leaves in left-to-right order, duplicates included
    pub fn leaves(&self) -> Vec<&Leaf> {
        let mut out = Vec::new();
        self.collect_leaves(&mut out);
        out
    }

    fn collect_leaves<'a>(&'a self, out: &mut Vec<&'a Leaf>) {
        match self {
            Expression::Leaf(leaf) => out.push(leaf),
            Expression::And(l, r) | Expression::Or(l, r) => {
                l.collect_leaves(out);
                r.collect_leaves(out);
            }
            Expression::Not(inner) => inner.collect_leaves(out),
        }
    }

    /// Evaluate every node against `value_of`; no short-circuiting
    pub fn evaluate<F>(&self, value_of: &F) -> bool
    where
        F: Fn(&Leaf) -> bool,
    {
        match self {
            Expression::Leaf(leaf) => value_of(leaf),
            Expression::And(l, r) => {
                let (a, b) = (l.evaluate(value_of), r.evaluate(value_of));
                a && b
            }
            Expression::Or(l, r) => {
                let (a, b) = (l.evaluate(value_of), r.evaluate(value_of));
                a || b
            }
            Expression::Not(inner) => !inner.evaluate(value_of),
        }
    }

    fn precedence(&self) -> u8 {
        match self {
            Expression::Or(..) => 1,
            Expression::And(..) => 2,
            Expression::Not(_) => 3,
            Expression::Leaf(_) => 4,
        }
    }

    fn fmt_within(&self, f: &mut fmt::Formatter<'_>, parent: u8) -> fmt::Result {
        let own = self.precedence();
        if own < parent {
            write!(f, "(")?;
        }
        match self {
            Expression::Leaf(leaf) => write!(f, "{}", leaf)?,
            Expression::And(l, r) => {
                l.fmt_within(f, own)?;
                write!(f, " and ")?;
                r.fmt_within(f, own + 1)?;
            }
            Expression::Or(l, r) => {
                l.fmt_within(f, own)?;
                write!(f, " or ")?;
                r.fmt_within(f, own + 1)?;
            }
            Expression::Not(inner) => {
                write!(f, "not ")?;
                inner.fmt_within(f, own)?;
            }
        }
        if own < parent {
            write!(f, ")")?;
        }
        Ok(())
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_within(f, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_leaf_display() {
        assert_eq!(Leaf::new("online", None).to_string(), "online");
        assert_eq!(
            Leaf::new("media", Some("(min-width:40em)")).to_string(),
            "media:{(min-width:40em)}"
        );
    }

    #[test]
    fn test_display_adds_only_needed_parentheses() {
        let expr = Expression::and(
            Expression::or(Expression::leaf("a", None), Expression::leaf("b", None)),
            Expression::not(Expression::leaf("c", None)),
        );
        assert_eq!(expr.to_string(), "(a or b) and not c");

        let expr = Expression::or(
            Expression::leaf("a", None),
            Expression::and(Expression::leaf("b", None), Expression::leaf("c", None)),
        );
        assert_eq!(expr.to_string(), "a or b and c");

        let expr = Expression::not(Expression::and(
            Expression::leaf("a", None),
            Expression::leaf("b", None),
        ));
        assert_eq!(expr.to_string(), "not (a and b)");
    }

    #[test]
    fn test_leaves_keeps_duplicates_in_order() {
        let expr = Expression::and(
            Expression::leaf("a", Some("x")),
            Expression::or(Expression::leaf("b", None), Expression::leaf("a", Some("x"))),
        );
        let names: Vec<String> = expr.leaves().iter().map(|l| l.to_string()).collect();
        assert_eq!(names, vec!["a:{x}", "b", "a:{x}"]);
    }

    #[test]
    fn test_evaluate() {
        let expr = Expression::and(
            Expression::or(Expression::leaf("a", None), Expression::leaf("b", None)),
            Expression::not(Expression::leaf("c", None)),
        );
        fn truthy(names: &'static [&'static str]) -> impl Fn(&Leaf) -> bool {
            move |leaf| names.contains(&leaf.test.as_str())
        }

        assert!(expr.evaluate(&truthy(&["a"])));
        assert!(expr.evaluate(&truthy(&["b"])));
        assert!(!expr.evaluate(&truthy(&["a", "c"])));
        assert!(!expr.evaluate(&truthy(&[])));
    }

    #[test]
    fn test_evaluate_visits_every_leaf() {
        use std::cell::Cell;

        let expr = Expression::or(Expression::leaf("a", None), Expression::leaf("b", None));
        let visits = Cell::new(0);
        let result = expr.evaluate(&|_: &Leaf| {
            visits.set(visits.get() + 1);
            true
        });
        assert!(result);
        assert_eq!(visits.get(), 2);
    }
}
