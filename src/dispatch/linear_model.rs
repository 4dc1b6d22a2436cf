//! Solver-agnostic description of a mixed-integer linear program: typed, bounded variables,
//! named linear constraints and a linear objective to minimise.

use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Index, Mul, Neg, Sub};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VariableId(usize);

impl VariableId {
    pub fn index(&self) -> usize {
        self.0
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VariableKind {
    Continuous,
    Binary,
    Integer,
}

#[derive(Clone, Debug, PartialEq)]
pub struct VariableSpec {
    pub name: String,
    pub kind: VariableKind,
    pub lower: Option<f64>,
    pub upper: Option<f64>,
}

/// `sum(coefficient * variable) + constant`
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LinearExpr {
    terms: Vec<(VariableId, f64)>,
    constant: f64,
}

impl LinearExpr {
    pub fn constant(value: f64) -> Self {
        Self {
            terms: vec![],
            constant: value,
        }
    }

    pub fn term(variable: VariableId, coefficient: f64) -> Self {
        Self {
            terms: vec![(variable, coefficient)],
            constant: 0.,
        }
    }

    pub fn add_term(&mut self, variable: VariableId, coefficient: f64) {
        self.terms.push((variable, coefficient));
    }

    pub fn terms(&self) -> &[(VariableId, f64)] {
        &self.terms
    }

    pub fn constant_term(&self) -> f64 {
        self.constant
    }

    pub fn evaluate(&self, assignment: &Assignment) -> f64 {
        self.terms
            .iter()
            .map(|(variable, coefficient)| coefficient * assignment[*variable])
            .sum::<f64>()
            + self.constant
    }
}

impl From<VariableId> for LinearExpr {
    fn from(variable: VariableId) -> Self {
        Self::term(variable, 1.)
    }
}

impl From<f64> for LinearExpr {
    fn from(value: f64) -> Self {
        Self::constant(value)
    }
}

impl<T: Into<LinearExpr>> Add<T> for LinearExpr {
    type Output = LinearExpr;

    fn add(mut self, rhs: T) -> Self::Output {
        self += rhs;
        self
    }
}

impl<T: Into<LinearExpr>> AddAssign<T> for LinearExpr {
    fn add_assign(&mut self, rhs: T) {
        let rhs = rhs.into();
        self.terms.extend(rhs.terms);
        self.constant += rhs.constant;
    }
}

impl<T: Into<LinearExpr>> Sub<T> for LinearExpr {
    type Output = LinearExpr;

    fn sub(self, rhs: T) -> Self::Output {
        self + -rhs.into()
    }
}

impl Neg for LinearExpr {
    type Output = LinearExpr;

    fn neg(self) -> Self::Output {
        self * -1.
    }
}

impl Mul<f64> for LinearExpr {
    type Output = LinearExpr;

    fn mul(mut self, rhs: f64) -> Self::Output {
        for (_, coefficient) in self.terms.iter_mut() {
            *coefficient *= rhs;
        }
        self.constant *= rhs;
        self
    }
}

impl Mul<VariableId> for f64 {
    type Output = LinearExpr;

    fn mul(self, rhs: VariableId) -> Self::Output {
        LinearExpr::term(rhs, self)
    }
}

impl Sum for LinearExpr {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(LinearExpr::default(), |acc, expr| acc + expr)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Comparison {
    Equal,
    LessOrEqual,
    GreaterOrEqual,
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Comparison::Equal => "==",
            Comparison::LessOrEqual => "<=",
            Comparison::GreaterOrEqual => ">=",
        })
    }
}

/// `lhs <cmp> rhs`, with every constant gathered on the right-hand side
#[derive(Clone, Debug, PartialEq)]
pub struct Constraint {
    pub name: String,
    pub lhs: LinearExpr,
    pub comparison: Comparison,
    pub rhs: f64,
}

impl Constraint {
    pub fn is_satisfied(&self, assignment: &Assignment, tolerance: f64) -> bool {
        let lhs = self.lhs.evaluate(assignment);
        match self.comparison {
            Comparison::Equal => (lhs - self.rhs).abs() <= tolerance,
            Comparison::LessOrEqual => lhs <= self.rhs + tolerance,
            Comparison::GreaterOrEqual => lhs >= self.rhs - tolerance,
        }
    }
}

/// A minimisation problem. Constraints accumulate: every call to `add_constraint` adds to those
/// already present.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LinearModel {
    variables: Vec<VariableSpec>,
    constraints: Vec<Constraint>,
    objective: LinearExpr,
}

impl LinearModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_variable(
        &mut self,
        name: impl Into<String>,
        kind: VariableKind,
        lower: Option<f64>,
        upper: Option<f64>,
    ) -> VariableId {
        self.variables.push(VariableSpec {
            name: name.into(),
            kind,
            lower,
            upper,
        });
        VariableId(self.variables.len() - 1)
    }

    pub fn continuous(
        &mut self,
        name: impl Into<String>,
        lower: Option<f64>,
        upper: Option<f64>,
    ) -> VariableId {
        self.add_variable(name, VariableKind::Continuous, lower, upper)
    }

    pub fn non_negative(&mut self, name: impl Into<String>) -> VariableId {
        self.continuous(name, Some(0.), None)
    }

    pub fn free(&mut self, name: impl Into<String>) -> VariableId {
        self.continuous(name, None, None)
    }

    pub fn binary(&mut self, name: impl Into<String>) -> VariableId {
        self.add_variable(name, VariableKind::Binary, Some(0.), Some(1.))
    }

    pub fn add_constraint(
        &mut self,
        name: impl Into<String>,
        lhs: impl Into<LinearExpr>,
        comparison: Comparison,
        rhs: impl Into<LinearExpr>,
    ) {
        let expr = lhs.into() - rhs.into();
        let rhs = -expr.constant;
        self.constraints.push(Constraint {
            name: name.into(),
            lhs: LinearExpr {
                terms: expr.terms,
                constant: 0.,
            },
            comparison,
            rhs,
        });
    }

    pub fn equal(
        &mut self,
        name: impl Into<String>,
        lhs: impl Into<LinearExpr>,
        rhs: impl Into<LinearExpr>,
    ) {
        self.add_constraint(name, lhs, Comparison::Equal, rhs)
    }

    pub fn less_or_equal(
        &mut self,
        name: impl Into<String>,
        lhs: impl Into<LinearExpr>,
        rhs: impl Into<LinearExpr>,
    ) {
        self.add_constraint(name, lhs, Comparison::LessOrEqual, rhs)
    }

    pub fn greater_or_equal(
        &mut self,
        name: impl Into<String>,
        lhs: impl Into<LinearExpr>,
        rhs: impl Into<LinearExpr>,
    ) {
        self.add_constraint(name, lhs, Comparison::GreaterOrEqual, rhs)
    }

    pub fn minimise(&mut self, objective: LinearExpr) {
        self.objective = objective;
    }

    pub fn variables(&self) -> &[VariableSpec] {
        &self.variables
    }

    pub fn variable(&self, id: VariableId) -> &VariableSpec {
        &self.variables[id.0]
    }

    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    pub fn constraint(&self, name: &str) -> Option<&Constraint> {
        self.constraints.iter().find(|constraint| constraint.name == name)
    }

    pub fn objective(&self) -> &LinearExpr {
        &self.objective
    }

    pub fn binary_count(&self) -> usize {
        self.variables
            .iter()
            .filter(|variable| variable.kind != VariableKind::Continuous)
            .count()
    }

    /// Names of the constraints and variable bounds an assignment breaks
    pub fn violations(&self, assignment: &Assignment, tolerance: f64) -> Vec<String> {
        let bounds = self.variables.iter().enumerate().filter_map(|(idx, spec)| {
            let value = assignment.values[idx];
            let below = spec.lower.is_some_and(|lower| value < lower - tolerance);
            let above = spec.upper.is_some_and(|upper| value > upper + tolerance);
            (below || above).then(|| spec.name.clone())
        });
        let constraints = self
            .constraints
            .iter()
            .filter(|constraint| !constraint.is_satisfied(assignment, tolerance))
            .map(|constraint| constraint.name.clone());

        bounds.chain(constraints).collect()
    }
}

/// Values a solver found for every variable of a model.
#[derive(Clone, Debug, PartialEq)]
pub struct Assignment {
    values: Vec<f64>,
}

impl Assignment {
    pub fn new(values: Vec<f64>) -> Self {
        Self { values }
    }

    pub fn value(&self, variable: VariableId) -> f64 {
        self.values[variable.0]
    }

    /// Value of a binary variable
    pub fn is_set(&self, variable: VariableId) -> bool {
        self.values[variable.0] > 0.5
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl Index<VariableId> for Assignment {
    type Output = f64;

    fn index(&self, variable: VariableId) -> &Self::Output {
        &self.values[variable.0]
    }
}
