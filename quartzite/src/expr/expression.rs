use std::collections::{BTreeMap, HashMap};
use std::fmt::{Display, Formatter};

use datafusion_common::ScalarValue;
use itertools::Itertools;

use crate::expr::{FunctionIdentifier, LogicalVariable};
use crate::properties::{EquivalenceClasses, FunctionalDependency};

/// Scalar, aggregate or unnesting expression evaluated by an operator.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Expression {
    Constant(ScalarValue),
    Variable(LogicalVariable),
    FunctionCall(FunctionCall),
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct FunctionCall {
    pub function: FunctionIdentifier,
    pub args: Vec<Expression>,
    /// Optimizer hints, e.g. `broadcast` on a join equality.
    pub annotations: BTreeMap<String, String>,
}

impl From<LogicalVariable> for Expression {
    fn from(var: LogicalVariable) -> Self {
        Expression::Variable(var)
    }
}

impl Expression {
    pub fn variable<V: Into<LogicalVariable>>(var: V) -> Self {
        Expression::Variable(var.into())
    }

    pub fn constant<T: Into<ScalarValue>>(value: T) -> Self {
        Expression::Constant(value.into())
    }

    pub fn call(function: FunctionIdentifier, args: Vec<Expression>) -> Self {
        Expression::FunctionCall(FunctionCall {
            function,
            args,
            annotations: BTreeMap::new(),
        })
    }

    pub fn eq<L: Into<Expression>, R: Into<Expression>>(left: L, right: R) -> Self {
        Self::call(FunctionIdentifier::Eq, vec![left.into(), right.into()])
    }

    /// Attaches an annotation to a function call. Other expressions are returned unchanged.
    pub fn annotated<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        if let Expression::FunctionCall(call) = &mut self {
            call.annotations.insert(key.into(), value.into());
        }
        self
    }

    pub fn as_variable(&self) -> Option<LogicalVariable> {
        match self {
            Expression::Variable(var) => Some(*var),
            _ => None,
        }
    }

    pub fn as_function_call(&self) -> Option<&FunctionCall> {
        match self {
            Expression::FunctionCall(call) => Some(call),
            _ => None,
        }
    }

    pub fn function(&self) -> Option<FunctionIdentifier> {
        self.as_function_call().map(|call| call.function)
    }

    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.as_function_call()
            .and_then(|call| call.annotations.get(key))
            .map(|value| value.as_str())
    }

    pub fn is_true(&self) -> bool {
        matches!(self, Expression::Constant(ScalarValue::Boolean(Some(true))))
    }

    /// Variables read by this expression, in order of first appearance.
    pub fn used_variables(&self) -> Vec<LogicalVariable> {
        let mut vars = Vec::new();
        self.collect_used_variables(&mut vars);
        vars
    }

    pub fn collect_used_variables(&self, vars: &mut Vec<LogicalVariable>) {
        match self {
            Expression::Constant(_) => {}
            Expression::Variable(var) => {
                if !vars.contains(var) {
                    vars.push(*var);
                }
            }
            Expression::FunctionCall(call) => {
                for arg in &call.args {
                    arg.collect_used_variables(vars);
                }
            }
        }
    }

    pub fn is_deterministic(&self) -> bool {
        match self {
            Expression::FunctionCall(call) => {
                call.function.is_deterministic()
                    && call.args.iter().all(|arg| arg.is_deterministic())
            }
            _ => true,
        }
    }

    /// Replaces every reference of `from` with `to`, returns whether anything changed.
    pub fn substitute_variable(&mut self, from: LogicalVariable, to: &Expression) -> bool {
        match self {
            Expression::Variable(var) if *var == from => {
                *self = to.clone();
                true
            }
            Expression::FunctionCall(call) => call
                .args
                .iter_mut()
                .fold(false, |changed, arg| arg.substitute_variable(from, to) || changed),
            _ => false,
        }
    }

    pub fn rename_variables(
        &mut self,
        renames: &HashMap<LogicalVariable, LogicalVariable>,
    ) -> bool {
        match self {
            Expression::Variable(var) => match renames.get(&*var) {
                Some(new_var) if *new_var != *var => {
                    *var = *new_var;
                    true
                }
                _ => false,
            },
            Expression::FunctionCall(call) => call
                .args
                .iter_mut()
                .fold(false, |changed, arg| arg.rename_variables(renames) || changed),
            Expression::Constant(_) => false,
        }
    }

    /// Top level conjuncts, nested `and` calls are flattened.
    pub fn conjuncts(&self) -> Vec<&Expression> {
        match self {
            Expression::FunctionCall(call) if call.function == FunctionIdentifier::And => {
                call.args.iter().flat_map(|arg| arg.conjuncts()).collect()
            }
            _ => vec![self],
        }
    }

    pub fn into_conjuncts(self) -> Vec<Expression> {
        match self {
            Expression::FunctionCall(call) if call.function == FunctionIdentifier::And => call
                .args
                .into_iter()
                .flat_map(|arg| arg.into_conjuncts())
                .collect(),
            _ => vec![self],
        }
    }

    pub fn and_of(mut conjuncts: Vec<Expression>) -> Expression {
        match conjuncts.len() {
            0 => Expression::constant(true),
            1 => conjuncts.remove(0),
            _ => Expression::call(FunctionIdentifier::And, conjuncts),
        }
    }

    /// `Some((a, b))` for `eq(a, b)` over two variables.
    pub fn as_variable_equality(&self) -> Option<(LogicalVariable, LogicalVariable)> {
        match self.as_function_call() {
            Some(call) if call.function == FunctionIdentifier::Eq && call.args.len() == 2 => {
                Some((call.args[0].as_variable()?, call.args[1].as_variable()?))
            }
            _ => None,
        }
    }

    /// Folds the equality constraints of this predicate into `classes` and `fds`.
    ///
    /// `a = b` merges the classes of both variables, `a = c` binds `a` to the constant and makes
    /// it determined by the empty set.
    pub fn constraints_and_equiv_classes(
        &self,
        classes: &mut EquivalenceClasses,
        fds: &mut Vec<FunctionalDependency>,
    ) {
        for conjunct in self.conjuncts() {
            let call = match conjunct.as_function_call() {
                Some(call) if call.function == FunctionIdentifier::Eq && call.args.len() == 2 => {
                    call
                }
                _ => continue,
            };
            match (&call.args[0], &call.args[1]) {
                (Expression::Variable(left), Expression::Variable(right)) => {
                    classes.merge(*left, *right);
                }
                (Expression::Variable(var), Expression::Constant(value))
                | (Expression::Constant(value), Expression::Variable(var)) => {
                    classes.add_constant(*var, value.clone());
                    let fd = FunctionalDependency::new(vec![], vec![*var]);
                    if !fds.contains(&fd) {
                        fds.push(fd);
                    }
                }
                _ => {}
            }
        }
    }
}

impl Display for Expression {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Expression::Constant(value) => write!(f, "{}", value),
            Expression::Variable(var) => write!(f, "{}", var),
            Expression::FunctionCall(call) => {
                write!(f, "{}({})", call.function, call.args.iter().join(", "))?;
                if !call.annotations.is_empty() {
                    write!(
                        f,
                        "[{}]",
                        call.annotations
                            .iter()
                            .map(|(k, v)| format!("{}={}", k, v))
                            .join(", ")
                    )?;
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::expr::FunctionIdentifier::{And, Gt, Plus};
    use crate::expr::{Expression, LogicalVariable};
    use crate::properties::{EquivalenceClasses, FunctionalDependency};
    use maplit::hashmap;

    fn var(id: u32) -> LogicalVariable {
        LogicalVariable(id)
    }

    #[test]
    fn test_conjuncts_are_flattened() {
        let expr = Expression::call(
            And,
            vec![
                Expression::eq(var(1), var(2)),
                Expression::call(
                    And,
                    vec![
                        Expression::call(Gt, vec![var(1).into(), Expression::constant(2i64)]),
                        Expression::eq(var(3), var(4)),
                    ],
                ),
            ],
        );

        assert_eq!(3, expr.conjuncts().len());
        assert_eq!(
            "and(eq($1, $2), gt($1, 2), eq($3, $4))",
            Expression::and_of(expr.into_conjuncts()).to_string()
        );
    }

    #[test]
    fn test_substitute_and_rename() {
        let mut expr = Expression::call(Plus, vec![var(1).into(), var(2).into()]);
        assert!(expr.substitute_variable(var(1), &Expression::constant(5i64)));
        assert!(!expr.substitute_variable(var(1), &Expression::constant(5i64)));
        assert!(expr.rename_variables(&hashmap! { var(2) => var(7) }));
        assert_eq!("plus(5, $7)", expr.to_string());
        assert_eq!(vec![var(7)], expr.used_variables());
    }

    #[test]
    fn test_fold_equalities() {
        let predicate = Expression::and_of(vec![
            Expression::eq(var(1), var(2)),
            Expression::eq(var(3), Expression::constant(10i64)),
            Expression::call(Gt, vec![var(4).into(), var(5).into()]),
        ]);
        let mut classes = EquivalenceClasses::default();
        let mut fds = vec![];
        predicate.constraints_and_equiv_classes(&mut classes, &mut fds);

        assert!(classes.are_equivalent(var(1), var(2)));
        assert!(classes.is_constant(var(3)));
        assert!(!classes.are_equivalent(var(4), var(5)));
        assert_eq!(vec![FunctionalDependency::new(vec![], vec![var(3)])], fds);
    }
}
