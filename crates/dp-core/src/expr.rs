//! Evaluable expression trees.
//!
//! The IR builder lowers parse-level expressions into these nodes.
//! They carry value-type tags so binary operators can dispatch (and
//! complain) by type, and they evaluate against a host-provided
//! [`Environment`] of variables and functions.

use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// The sentinel spliced into an f-string's fragment list for each
/// embedded expression; evaluation replaces the n-th occurrence with
/// the n-th embed.
pub const EMBED_PLACEHOLDER: &str = "{_0_}";

/// The four primitive value types, plus void for calls that return
/// nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ValueType {
    Int,
    Float,
    String,
    Bool,
    Void,
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueType::Int => "int",
            ValueType::Float => "float",
            ValueType::String => "string",
            ValueType::Bool => "bool",
            ValueType::Void => "void",
        };
        f.write_str(name)
    }
}

/// A runtime value.
///
/// Numeric literals always lex as floats; the `Int` arm exists for
/// host functions and variables so the promotion rules stay complete.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Value {
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
    Void,
}

impl Value {
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Int(_) => ValueType::Int,
            Value::Float(_) => ValueType::Float,
            Value::Str(_) => ValueType::String,
            Value::Bool(_) => ValueType::Bool,
            Value::Void => ValueType::Void,
        }
    }

    fn as_float(&self) -> Option<f64> {
        match self {
            Value::Int(v) => Some(*v as f64),
            Value::Float(v) => Some(*v),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", v),
            Value::Str(v) => f.write_str(v),
            Value::Bool(v) => write!(f, "{}", v),
            Value::Void => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum UnaryOp {
    Neg,
    Pos,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Pow => "**",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::And => "and",
            BinaryOp::Or => "or",
        };
        f.write_str(symbol)
    }
}

/// An expression tree node.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ExprNode {
    Constant(Value),
    /// Variable reference; the name has the `$` stripped and keeps an
    /// optional `global.` prefix.
    Variable(String),
    Unary {
        op: UnaryOp,
        operand: Box<ExprNode>,
    },
    Binary {
        op: BinaryOp,
        left: Box<ExprNode>,
        right: Box<ExprNode>,
    },
    EmbedCall {
        fname: String,
        args: Vec<ExprNode>,
    },
    /// An f-string: literal fragments with one [`EMBED_PLACEHOLDER`]
    /// per entry in `embeds`.
    FString {
        fragments: Vec<String>,
        embeds: Vec<ExprNode>,
    },
}

/// Errors produced while evaluating an expression tree.
#[derive(Debug, Error, PartialEq)]
pub enum EvalError {
    #[error("undefined variable '{0}'")]
    UndefinedVariable(String),
    #[error("unknown function '{0}'")]
    UnknownFunction(String),
    #[error("operator '{op}' is not defined for {left} and {right}")]
    BadOperands {
        op: BinaryOp,
        left: ValueType,
        right: ValueType,
    },
    #[error("operator '{op}' is not defined for {operand}")]
    BadUnaryOperand { op: &'static str, operand: ValueType },
    #[error("division by zero")]
    DivisionByZero,
    #[error("{0}")]
    Host(String),
}

/// Variable and function lookup for evaluation.
pub trait Environment {
    fn get_variable(&self, name: &str) -> Option<Value>;
    fn call_function(&mut self, name: &str, args: &[Value]) -> Result<Value, EvalError>;
}

impl ExprNode {
    /// Evaluate against an environment.
    pub fn eval(&self, env: &mut dyn Environment) -> Result<Value, EvalError> {
        match self {
            ExprNode::Constant(value) => Ok(value.clone()),
            ExprNode::Variable(name) => env
                .get_variable(name)
                .ok_or_else(|| EvalError::UndefinedVariable(name.clone())),
            ExprNode::Unary { op, operand } => eval_unary(*op, operand.eval(env)?),
            ExprNode::Binary { op, left, right } => {
                // `and`/`or` short-circuit; everything else is strict.
                match op {
                    BinaryOp::And | BinaryOp::Or => eval_logical(*op, left, right, env),
                    _ => eval_binary(*op, left.eval(env)?, right.eval(env)?),
                }
            }
            ExprNode::EmbedCall { fname, args } => {
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(arg.eval(env)?);
                }
                env.call_function(fname, &values)
            }
            ExprNode::FString { fragments, embeds } => {
                let mut out = String::new();
                let mut next_embed = 0usize;
                for fragment in fragments {
                    if fragment == EMBED_PLACEHOLDER && next_embed < embeds.len() {
                        let value = embeds[next_embed].eval(env)?;
                        next_embed += 1;
                        out.push_str(&value.to_string());
                    } else {
                        out.push_str(fragment);
                    }
                }
                Ok(Value::Str(out))
            }
        }
    }
}

fn eval_unary(op: UnaryOp, value: Value) -> Result<Value, EvalError> {
    match (op, &value) {
        (UnaryOp::Neg, Value::Int(v)) => Ok(Value::Int(-v)),
        (UnaryOp::Neg, Value::Float(v)) => Ok(Value::Float(-v)),
        (UnaryOp::Pos, Value::Int(_) | Value::Float(_)) => Ok(value),
        (UnaryOp::Not, Value::Bool(v)) => Ok(Value::Bool(!v)),
        (UnaryOp::Neg, _) => Err(EvalError::BadUnaryOperand {
            op: "-",
            operand: value.value_type(),
        }),
        (UnaryOp::Pos, _) => Err(EvalError::BadUnaryOperand {
            op: "+",
            operand: value.value_type(),
        }),
        (UnaryOp::Not, _) => Err(EvalError::BadUnaryOperand {
            op: "not",
            operand: value.value_type(),
        }),
    }
}

fn eval_logical(
    op: BinaryOp,
    left: &ExprNode,
    right: &ExprNode,
    env: &mut dyn Environment,
) -> Result<Value, EvalError> {
    let lhs = match left.eval(env)? {
        Value::Bool(v) => v,
        other => {
            return Err(EvalError::BadOperands {
                op,
                left: other.value_type(),
                right: ValueType::Bool,
            })
        }
    };
    match (op, lhs) {
        (BinaryOp::And, false) => return Ok(Value::Bool(false)),
        (BinaryOp::Or, true) => return Ok(Value::Bool(true)),
        _ => {}
    }
    match right.eval(env)? {
        Value::Bool(v) => Ok(Value::Bool(v)),
        other => Err(EvalError::BadOperands {
            op,
            left: ValueType::Bool,
            right: other.value_type(),
        }),
    }
}

/// Arithmetic follows widest-wins promotion: two ints stay int,
/// anything involving a float is float.
fn eval_binary(op: BinaryOp, left: Value, right: Value) -> Result<Value, EvalError> {
    use BinaryOp::*;

    let mismatch = |left: &Value, right: &Value| EvalError::BadOperands {
        op,
        left: left.value_type(),
        right: right.value_type(),
    };

    match op {
        Add => match (&left, &right) {
            (Value::Str(a), Value::Str(b)) => Ok(Value::Str(format!("{}{}", a, b))),
            (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a + b)),
            _ => numeric(op, &left, &right).ok_or_else(|| mismatch(&left, &right)),
        },
        Sub | Mul | Pow => match (&left, &right) {
            (Value::Int(a), Value::Int(b)) => Ok(match op {
                Sub => Value::Int(a - b),
                Mul => Value::Int(a * b),
                // Negative exponents and overflow leave the int domain.
                Pow => u32::try_from(*b)
                    .ok()
                    .and_then(|e| a.checked_pow(e))
                    .map(Value::Int)
                    .unwrap_or_else(|| Value::Float((*a as f64).powf(*b as f64))),
                _ => unreachable!(),
            }),
            _ => numeric(op, &left, &right).ok_or_else(|| mismatch(&left, &right)),
        },
        Div => match (&left, &right) {
            (Value::Int(_), Value::Int(0)) => Err(EvalError::DivisionByZero),
            (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a / b)),
            _ => numeric(op, &left, &right).ok_or_else(|| mismatch(&left, &right)),
        },
        Mod => match (&left, &right) {
            (Value::Int(_), Value::Int(0)) => Err(EvalError::DivisionByZero),
            (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a % b)),
            _ => numeric(op, &left, &right).ok_or_else(|| mismatch(&left, &right)),
        },
        Eq | Ne => {
            let equal = match (&left, &right) {
                (Value::Str(a), Value::Str(b)) => a == b,
                (Value::Bool(a), Value::Bool(b)) => a == b,
                _ => match (left.as_float(), right.as_float()) {
                    (Some(a), Some(b)) => a == b,
                    _ => return Err(mismatch(&left, &right)),
                },
            };
            Ok(Value::Bool(if op == Eq { equal } else { !equal }))
        }
        Lt | Le | Gt | Ge => match (left.as_float(), right.as_float()) {
            (Some(a), Some(b)) => Ok(Value::Bool(match op {
                Lt => a < b,
                Le => a <= b,
                Gt => a > b,
                Ge => a >= b,
                _ => unreachable!(),
            })),
            _ => Err(mismatch(&left, &right)),
        },
        And | Or => unreachable!("logical operators short-circuit in eval"),
    }
}

fn numeric(op: BinaryOp, left: &Value, right: &Value) -> Option<Value> {
    let (a, b) = (left.as_float()?, right.as_float()?);
    let out = match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Div => a / b,
        BinaryOp::Mod => a % b,
        BinaryOp::Pow => a.powf(b),
        _ => return None,
    };
    Some(Value::Float(out))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct TestEnv {
        vars: HashMap<String, Value>,
    }

    impl TestEnv {
        fn new() -> Self {
            Self {
                vars: HashMap::new(),
            }
        }

        fn with(mut self, name: &str, value: Value) -> Self {
            self.vars.insert(name.to_string(), value);
            self
        }
    }

    impl Environment for TestEnv {
        fn get_variable(&self, name: &str) -> Option<Value> {
            self.vars.get(name).cloned()
        }

        fn call_function(&mut self, name: &str, args: &[Value]) -> Result<Value, EvalError> {
            match name {
                "add" => match (&args[0], &args[1]) {
                    (Value::Float(a), Value::Float(b)) => Ok(Value::Float(a + b)),
                    _ => Err(EvalError::Host("add expects numbers".to_string())),
                },
                _ => Err(EvalError::UnknownFunction(name.to_string())),
            }
        }
    }

    fn bin(op: BinaryOp, left: ExprNode, right: ExprNode) -> ExprNode {
        ExprNode::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    #[test]
    fn widest_wins_promotion() {
        let mut env = TestEnv::new();
        let int_int = bin(
            BinaryOp::Add,
            ExprNode::Constant(Value::Int(2)),
            ExprNode::Constant(Value::Int(3)),
        );
        assert_eq!(int_int.eval(&mut env).unwrap(), Value::Int(5));

        let int_float = bin(
            BinaryOp::Add,
            ExprNode::Constant(Value::Int(2)),
            ExprNode::Constant(Value::Float(0.5)),
        );
        assert_eq!(int_float.eval(&mut env).unwrap(), Value::Float(2.5));
    }

    #[test]
    fn string_concatenation() {
        let mut env = TestEnv::new();
        let expr = bin(
            BinaryOp::Add,
            ExprNode::Constant(Value::Str("ab".into())),
            ExprNode::Constant(Value::Str("cd".into())),
        );
        assert_eq!(expr.eval(&mut env).unwrap(), Value::Str("abcd".into()));
    }

    #[test]
    fn type_mismatch_reports_both_sides() {
        let mut env = TestEnv::new();
        let expr = bin(
            BinaryOp::Sub,
            ExprNode::Constant(Value::Str("x".into())),
            ExprNode::Constant(Value::Float(1.0)),
        );
        assert_eq!(
            expr.eval(&mut env).unwrap_err(),
            EvalError::BadOperands {
                op: BinaryOp::Sub,
                left: ValueType::String,
                right: ValueType::Float,
            }
        );
    }

    #[test]
    fn undefined_variable() {
        let mut env = TestEnv::new();
        let expr = ExprNode::Variable("missing".into());
        assert_eq!(
            expr.eval(&mut env).unwrap_err(),
            EvalError::UndefinedVariable("missing".into())
        );
    }

    #[test]
    fn logical_short_circuit() {
        let mut env = TestEnv::new();
        // The right side would fail, but `false and …` never gets there.
        let expr = bin(
            BinaryOp::And,
            ExprNode::Constant(Value::Bool(false)),
            ExprNode::Variable("missing".into()),
        );
        assert_eq!(expr.eval(&mut env).unwrap(), Value::Bool(false));
    }

    #[test]
    fn comparison_promotes_numerics() {
        let mut env = TestEnv::new();
        let expr = bin(
            BinaryOp::Le,
            ExprNode::Constant(Value::Int(2)),
            ExprNode::Constant(Value::Float(2.0)),
        );
        assert_eq!(expr.eval(&mut env).unwrap(), Value::Bool(true));
    }

    #[test]
    fn integer_division_by_zero() {
        let mut env = TestEnv::new();
        let expr = bin(
            BinaryOp::Div,
            ExprNode::Constant(Value::Int(1)),
            ExprNode::Constant(Value::Int(0)),
        );
        assert_eq!(expr.eval(&mut env).unwrap_err(), EvalError::DivisionByZero);
    }

    #[test]
    fn fstring_splices_embeds_in_order() {
        let mut env = TestEnv::new().with("x", Value::Float(4.0));
        let expr = ExprNode::FString {
            fragments: vec![
                "score: ".to_string(),
                EMBED_PLACEHOLDER.to_string(),
                " of ".to_string(),
                EMBED_PLACEHOLDER.to_string(),
            ],
            embeds: vec![
                ExprNode::Variable("x".into()),
                ExprNode::Constant(Value::Float(10.0)),
            ],
        };
        assert_eq!(
            expr.eval(&mut env).unwrap(),
            Value::Str("score: 4 of 10".into())
        );
    }

    #[test]
    fn embed_call_through_environment() {
        let mut env = TestEnv::new().with("x", Value::Float(1.5));
        let expr = ExprNode::EmbedCall {
            fname: "add".into(),
            args: vec![
                ExprNode::Variable("x".into()),
                ExprNode::Constant(Value::Float(1.0)),
            ],
        };
        assert_eq!(expr.eval(&mut env).unwrap(), Value::Float(2.5));
    }

    #[test]
    fn power_is_right_associative_value() {
        let mut env = TestEnv::new();
        let expr = bin(
            BinaryOp::Pow,
            ExprNode::Constant(Value::Int(2)),
            bin(
                BinaryOp::Pow,
                ExprNode::Constant(Value::Int(3)),
                ExprNode::Constant(Value::Int(2)),
            ),
        );
        assert_eq!(expr.eval(&mut env).unwrap(), Value::Int(512));
    }
}
