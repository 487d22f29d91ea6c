use std::collections::HashMap;
use std::sync::Arc;

use anyhow::bail;
use arrow_schema::{DataType, Field};

use crate::error::{OptError, OptResult};
use crate::expr::{Expression, FunctionIdentifier, LogicalVariable};

/// Types of the variables visible at an operator.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TypeEnvironment {
    types: HashMap<LogicalVariable, DataType>,
}

impl TypeEnvironment {
    pub fn get(&self, var: LogicalVariable) -> Option<&DataType> {
        self.types.get(&var)
    }

    pub fn insert(&mut self, var: LogicalVariable, data_type: DataType) {
        self.types.insert(var, data_type);
    }

    pub fn extend(&mut self, other: &TypeEnvironment) {
        for (var, data_type) in &other.types {
            self.types.insert(*var, data_type.clone());
        }
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

/// Result type of the built-in functions.
pub fn builtin_expression_type(expr: &Expression, env: &TypeEnvironment) -> OptResult<DataType> {
    use FunctionIdentifier::*;

    let call = match expr {
        Expression::Constant(value) => return Ok(value.get_datatype()),
        Expression::Variable(var) => {
            return env.get(*var).cloned().ok_or_else(|| {
                OptError::internal(format!("Variable {} has no type in scope", var)).into()
            })
        }
        Expression::FunctionCall(call) => call,
    };

    let arg_type = |idx: usize| -> OptResult<DataType> {
        match call.args.get(idx) {
            Some(arg) => builtin_expression_type(arg, env),
            None => bail!(OptError::malformed(
                call.function.as_ref(),
                format!("missing argument {}", idx)
            )),
        }
    };

    let data_type = match call.function {
        Eq | Neq | Lt | Le | Gt | Ge | And | Or | Not | IsNull => DataType::Boolean,
        Plus | Minus | Multiply | Divide | Sum | Min | Max => arg_type(0)?,
        Random | Avg => DataType::Float64,
        Count | Range => DataType::Int64,
        Listify => DataType::List(Arc::new(Field::new("item", arg_type(0)?, true))),
        ScanCollection => match arg_type(0)? {
            DataType::List(item) => item.data_type().clone(),
            other => bail!(OptError::unsupported(
                call.function.as_ref(),
                format!("cannot unnest a value of type {}", other)
            )),
        },
    };
    Ok(data_type)
}

#[cfg(test)]
mod tests {
    use crate::error::OptError;
    use crate::expr::FunctionIdentifier::{Count, Gt, Listify, Plus, ScanCollection};
    use crate::expr::{builtin_expression_type, Expression, LogicalVariable, TypeEnvironment};
    use arrow_schema::DataType;

    #[test]
    fn test_builtin_types() {
        let mut env = TypeEnvironment::default();
        env.insert(LogicalVariable(1), DataType::Int32);

        let plus = Expression::call(
            Plus,
            vec![LogicalVariable(1).into(), Expression::constant(1i32)],
        );
        assert_eq!(DataType::Int32, builtin_expression_type(&plus, &env).unwrap());

        let gt = Expression::call(Gt, vec![plus.clone(), Expression::constant(1i32)]);
        assert_eq!(DataType::Boolean, builtin_expression_type(&gt, &env).unwrap());

        let count = Expression::call(Count, vec![LogicalVariable(1).into()]);
        assert_eq!(DataType::Int64, builtin_expression_type(&count, &env).unwrap());

        let unnest = Expression::call(
            ScanCollection,
            vec![Expression::call(Listify, vec![LogicalVariable(1).into()])],
        );
        assert_eq!(DataType::Int32, builtin_expression_type(&unnest, &env).unwrap());
    }

    #[test]
    fn test_untyped_variable() {
        let err = builtin_expression_type(&LogicalVariable(3).into(), &TypeEnvironment::default())
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<OptError>(),
            Some(OptError::Internal(_))
        ));
    }
}
