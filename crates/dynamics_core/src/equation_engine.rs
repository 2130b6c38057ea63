//! Rate functions written as text, e.g. `"r*y*(1 - y/K)"`.
//!
//! An expression is tokenized, parsed into an [`Expr`] tree, compiled to
//! stack bytecode and run by a small VM. The right-hand side may use the
//! reserved variables `t` and `y`, any named parameter, and the functions
//! `sin cos tan exp ln sqrt abs`.

use crate::traits::{lit, Elementwise, RateFunction, Scalar};
use std::collections::HashMap;
use thiserror::Error;

/// Index of `t` in the VM's variable slots.
const VAR_T: usize = 0;
/// Index of `y` in the VM's variable slots.
const VAR_Y: usize = 1;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExpressionError {
    #[error("Unexpected character '{0}' at position {1}.")]
    UnexpectedCharacter(char, usize),
    #[error("Malformed number literal: {0}")]
    InvalidNumber(String),
    #[error("Unexpected token: {0}")]
    UnexpectedToken(String),
    #[error("Unexpected end of expression.")]
    UnexpectedEnd,
    #[error("Expected ')'.")]
    ExpectedClosingParen,
    #[error("Unexpected trailing input: {0}")]
    TrailingInput(String),
    #[error("Unknown variable or parameter: {0}")]
    UnknownSymbol(String),
    #[error("Unknown function: {0}")]
    UnknownFunction(String),
    #[error("Parameter name '{0}' is reserved.")]
    ReservedName(String),
    #[error("Parameter '{0}' is defined more than once.")]
    DuplicateParameter(String),
}

/// OpCodes for the stack-based VM.
#[derive(Debug, Clone, Copy, PartialEq)]
enum OpCode {
    /// Pushes a constant.
    LoadConst(f64),
    /// Pushes a variable slot (`t` or `y`).
    LoadVar(usize),
    /// Pushes a parameter value.
    LoadParam(usize),
    Add,
    Sub,
    Mul,
    Div,
    Pow,
    Neg,
    Call(Function),
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Function {
    Sin,
    Cos,
    Tan,
    Exp,
    Ln,
    Sqrt,
    Abs,
}

impl Function {
    fn lookup(name: &str) -> Option<Self> {
        match name {
            "sin" => Some(Self::Sin),
            "cos" => Some(Self::Cos),
            "tan" => Some(Self::Tan),
            "exp" => Some(Self::Exp),
            "ln" => Some(Self::Ln),
            "sqrt" => Some(Self::Sqrt),
            "abs" => Some(Self::Abs),
            _ => None,
        }
    }

    fn apply<T: Scalar>(self, a: T) -> T {
        match self {
            Self::Sin => a.sin(),
            Self::Cos => a.cos(),
            Self::Tan => a.tan(),
            Self::Exp => a.exp(),
            Self::Ln => a.ln(),
            Self::Sqrt => a.sqrt(),
            Self::Abs => a.abs(),
        }
    }
}

/// A compiled sequence of operations. Only [`Compiler`] builds one, so every
/// instruction finds its operands on the stack.
#[derive(Debug, Clone, PartialEq)]
pub struct Bytecode {
    ops: Vec<OpCode>,
}

/// Stateless stack machine evaluating [`Bytecode`].
pub struct VM;

impl VM {
    /// Runs `bytecode` against the variable slots and parameters, reusing
    /// `stack` as scratch space. Returns the value left on top of the stack.
    pub fn execute<T: Scalar>(
        bytecode: &Bytecode,
        vars: &[T],
        params: &[T],
        stack: &mut Vec<T>,
    ) -> T {
        stack.clear();

        for op in &bytecode.ops {
            match *op {
                OpCode::LoadConst(value) => stack.push(lit(value)),
                OpCode::LoadVar(idx) => stack.push(slot(vars, idx)),
                OpCode::LoadParam(idx) => stack.push(slot(params, idx)),
                OpCode::Add => binary(stack, |a, b| a + b),
                OpCode::Sub => binary(stack, |a, b| a - b),
                OpCode::Mul => binary(stack, |a, b| a * b),
                OpCode::Div => binary(stack, |a, b| a / b),
                OpCode::Pow => binary(stack, |a, b| a.powf(b)),
                OpCode::Neg => {
                    let a = pop(stack);
                    stack.push(-a);
                }
                OpCode::Call(function) => {
                    let a = pop(stack);
                    stack.push(function.apply(a));
                }
            }
        }

        pop(stack)
    }
}

fn pop<T: Scalar>(stack: &mut Vec<T>) -> T {
    stack.pop().unwrap_or_else(T::nan)
}

/// Missing slots read as NaN, like an empty stack.
fn slot<T: Scalar>(values: &[T], idx: usize) -> T {
    values.get(idx).copied().unwrap_or_else(T::nan)
}

/// Pops `b` then `a` and pushes `f(a, b)`.
fn binary<T: Scalar>(stack: &mut Vec<T>, f: impl FnOnce(T, T) -> T) {
    let b = pop(stack);
    let a = pop(stack);
    stack.push(f(a, b));
}

// --- AST & Parser ---

/// Abstract syntax tree of a parsed expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Variable(String),
    /// Operator is one of `+ - * / ^`.
    Binary(Box<Expr>, char, Box<Expr>),
    Neg(Box<Expr>),
    Call(String, Box<Expr>),
}

/// Parses an expression into an [`Expr`] tree.
///
/// Precedence from loosest to tightest: `+ -`, `* /`, unary `-`, `^`
/// (right-associative), then numbers, names, calls and parentheses.
pub fn parse(input: &str) -> Result<Expr, ExpressionError> {
    let tokens = tokenize(input)?;
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.parse_sum()?;
    match parser.peek() {
        None => Ok(expr),
        Some(token) => Err(ExpressionError::TrailingInput(token.to_string())),
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Identifier(String),
    Plus,
    Minus,
    Star,
    Slash,
    Caret,
    LParen,
    RParen,
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Token::Number(n) => write!(f, "{n}"),
            Token::Identifier(name) => write!(f, "{name}"),
            Token::Plus => write!(f, "+"),
            Token::Minus => write!(f, "-"),
            Token::Star => write!(f, "*"),
            Token::Slash => write!(f, "/"),
            Token::Caret => write!(f, "^"),
            Token::LParen => write!(f, "("),
            Token::RParen => write!(f, ")"),
        }
    }
}

fn tokenize(input: &str) -> Result<Vec<Token>, ExpressionError> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some(&(pos, c)) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
        } else if c.is_ascii_digit() || c == '.' {
            let mut literal = String::new();
            while let Some(&(_, d)) = chars.peek() {
                // Exponent signs belong to the literal: `1e-3`.
                let exponent_sign =
                    (d == '-' || d == '+') && matches!(literal.chars().last(), Some('e' | 'E'));
                if d.is_ascii_digit() || d == '.' || d == 'e' || d == 'E' || exponent_sign {
                    literal.push(d);
                    chars.next();
                } else {
                    break;
                }
            }
            let value = literal
                .parse()
                .map_err(|_| ExpressionError::InvalidNumber(literal.clone()))?;
            tokens.push(Token::Number(value));
        } else if c.is_alphabetic() || c == '_' {
            let mut ident = String::new();
            while let Some(&(_, d)) = chars.peek() {
                if d.is_alphanumeric() || d == '_' {
                    ident.push(d);
                    chars.next();
                } else {
                    break;
                }
            }
            tokens.push(Token::Identifier(ident));
        } else {
            let token = match c {
                '+' => Token::Plus,
                '-' => Token::Minus,
                '*' => Token::Star,
                '/' => Token::Slash,
                '^' => Token::Caret,
                '(' => Token::LParen,
                ')' => Token::RParen,
                _ => return Err(ExpressionError::UnexpectedCharacter(c, pos)),
            };
            tokens.push(token);
            chars.next();
        }
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn consume(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn parse_sum(&mut self) -> Result<Expr, ExpressionError> {
        let mut left = self.parse_product()?;
        while let Some(op) = self.peek().and_then(|token| match token {
            Token::Plus => Some('+'),
            Token::Minus => Some('-'),
            _ => None,
        }) {
            self.consume();
            let right = self.parse_product()?;
            left = Expr::Binary(Box::new(left), op, Box::new(right));
        }
        Ok(left)
    }

    fn parse_product(&mut self) -> Result<Expr, ExpressionError> {
        let mut left = self.parse_unary()?;
        while let Some(op) = self.peek().and_then(|token| match token {
            Token::Star => Some('*'),
            Token::Slash => Some('/'),
            _ => None,
        }) {
            self.consume();
            let right = self.parse_unary()?;
            left = Expr::Binary(Box::new(left), op, Box::new(right));
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, ExpressionError> {
        if let Some(Token::Minus) = self.peek() {
            self.consume();
            let operand = self.parse_unary()?;
            return Ok(Expr::Neg(Box::new(operand)));
        }
        self.parse_power()
    }

    fn parse_power(&mut self) -> Result<Expr, ExpressionError> {
        let base = self.parse_primary()?;
        if let Some(Token::Caret) = self.peek() {
            self.consume();
            // Right-associative; the exponent may carry its own sign.
            let exponent = self.parse_unary()?;
            return Ok(Expr::Binary(Box::new(base), '^', Box::new(exponent)));
        }
        Ok(base)
    }

    fn parse_primary(&mut self) -> Result<Expr, ExpressionError> {
        match self.consume() {
            Some(Token::Number(n)) => Ok(Expr::Number(n)),
            Some(Token::Identifier(name)) => {
                if let Some(Token::LParen) = self.peek() {
                    self.consume();
                    let arg = self.parse_sum()?;
                    self.expect_closing_paren()?;
                    Ok(Expr::Call(name, Box::new(arg)))
                } else {
                    Ok(Expr::Variable(name))
                }
            }
            Some(Token::LParen) => {
                let expr = self.parse_sum()?;
                self.expect_closing_paren()?;
                Ok(expr)
            }
            Some(token) => Err(ExpressionError::UnexpectedToken(token.to_string())),
            None => Err(ExpressionError::UnexpectedEnd),
        }
    }

    fn expect_closing_paren(&mut self) -> Result<(), ExpressionError> {
        match self.consume() {
            Some(Token::RParen) => Ok(()),
            _ => Err(ExpressionError::ExpectedClosingParen),
        }
    }
}

/// Compiles an [`Expr`] into [`Bytecode`], resolving names to slots.
/// `t` and `y` are always variables; everything else must be a parameter.
pub struct Compiler {
    param_map: HashMap<String, usize>,
}

impl Compiler {
    pub fn new(param_names: &[String]) -> Result<Self, ExpressionError> {
        let mut param_map = HashMap::new();
        for (i, name) in param_names.iter().enumerate() {
            if name == "t" || name == "y" {
                return Err(ExpressionError::ReservedName(name.clone()));
            }
            if param_map.insert(name.clone(), i).is_some() {
                return Err(ExpressionError::DuplicateParameter(name.clone()));
            }
        }
        Ok(Self { param_map })
    }

    pub fn compile(&self, expr: &Expr) -> Result<Bytecode, ExpressionError> {
        let mut ops = Vec::new();
        self.compile_recursive(expr, &mut ops)?;
        Ok(Bytecode { ops })
    }

    fn compile_recursive(
        &self,
        expr: &Expr,
        ops: &mut Vec<OpCode>,
    ) -> Result<(), ExpressionError> {
        match expr {
            Expr::Number(n) => ops.push(OpCode::LoadConst(*n)),
            Expr::Variable(name) => ops.push(match name.as_str() {
                "t" => OpCode::LoadVar(VAR_T),
                "y" => OpCode::LoadVar(VAR_Y),
                other => match self.param_map.get(other) {
                    Some(&idx) => OpCode::LoadParam(idx),
                    None => return Err(ExpressionError::UnknownSymbol(other.to_string())),
                },
            }),
            Expr::Binary(left, op, right) => {
                self.compile_recursive(left, ops)?;
                self.compile_recursive(right, ops)?;
                ops.push(match op {
                    '+' => OpCode::Add,
                    '-' => OpCode::Sub,
                    '*' => OpCode::Mul,
                    '/' => OpCode::Div,
                    '^' => OpCode::Pow,
                    other => return Err(ExpressionError::UnexpectedToken(other.to_string())),
                });
            }
            Expr::Neg(operand) => {
                self.compile_recursive(operand, ops)?;
                ops.push(OpCode::Neg);
            }
            Expr::Call(name, arg) => {
                let function = Function::lookup(name)
                    .ok_or_else(|| ExpressionError::UnknownFunction(name.clone()))?;
                self.compile_recursive(arg, ops)?;
                ops.push(OpCode::Call(function));
            }
        }
        Ok(())
    }
}

// --- ExpressionRate ---

/// A rate function `dy/dt = <rhs>` defined by a text expression.
///
/// Parameters are fixed at construction. Evaluation allocates a small stack
/// per call, so the model holds no interior mutability and can be shared.
#[derive(Debug, Clone, PartialEq)]
pub struct ExpressionRate {
    source: String,
    bytecode: Bytecode,
    params: Vec<f64>,
}

impl ExpressionRate {
    pub fn new(rhs: &str, params: &[(&str, f64)]) -> Result<Self, ExpressionError> {
        let names: Vec<String> = params.iter().map(|(name, _)| name.to_string()).collect();
        let compiler = Compiler::new(&names)?;
        let bytecode = compiler.compile(&parse(rhs)?)?;
        Ok(Self {
            source: rhs.to_string(),
            bytecode,
            params: params.iter().map(|&(_, value)| value).collect(),
        })
    }

    /// The expression text this model was built from.
    pub fn source(&self) -> &str {
        &self.source
    }
}

impl<V: Elementwise> RateFunction<V> for ExpressionRate {
    fn evaluate(&self, t: &V, y: &V) -> V {
        let params: Vec<V::Elem> = self.params.iter().map(|&p| lit(p)).collect();
        let mut stack = Vec::with_capacity(self.bytecode.ops.len());
        t.zip_elems(y, |t, y| VM::execute(&self.bytecode, &[t, y], &params, &mut stack))
    }

    fn name(&self) -> String {
        format!("dy/dt = {}", self.source)
    }
}

#[cfg(test)]
mod tests {
    use super::{parse, Compiler, ExpressionError, ExpressionRate, Expr, VM};
    use crate::models::LogisticGrowth;
    use crate::traits::RateFunction;
    use ndarray::{array, Array1};

    fn eval(rhs: &str, t: f64, y: f64) -> f64 {
        let model = ExpressionRate::new(rhs, &[]).expect("expression should compile");
        model.evaluate(&t, &y)
    }

    #[test]
    fn parse_respects_precedence() {
        assert_eq!(eval("1 + 2 * 3", 0.0, 0.0), 7.0);
        assert_eq!(eval("(1 + 2) * 3", 0.0, 0.0), 9.0);
        assert_eq!(eval("8 / 4 / 2", 0.0, 0.0), 1.0);
        assert_eq!(eval("10 - 4 - 3", 0.0, 0.0), 3.0);
    }

    #[test]
    fn power_is_right_associative_and_binds_tighter_than_negation() {
        assert_eq!(eval("2 ^ 3 ^ 2", 0.0, 0.0), 512.0);
        assert_eq!(eval("-y ^ 2", 0.0, 3.0), -9.0);
        assert_eq!(eval("2 ^ -1", 0.0, 0.0), 0.5);
    }

    #[test]
    fn parse_reads_scientific_literals() {
        assert_eq!(parse("1e-3").expect("literal parses"), Expr::Number(1e-3));
        assert_eq!(parse("2.5E2").expect("literal parses"), Expr::Number(250.0));
    }

    #[test]
    fn functions_and_variables_evaluate() {
        assert!((eval("sin(t) + cos(t)", 0.0, 0.0) - 1.0).abs() < 1e-12);
        assert!((eval("exp(ln(y))", 0.0, 4.0) - 4.0).abs() < 1e-12);
        assert_eq!(eval("sqrt(abs(y))", 0.0, -16.0), 4.0);
        assert_eq!(eval("t * y", 3.0, 5.0), 15.0);
    }

    #[test]
    fn parse_rejects_malformed_input() {
        assert_eq!(parse("1 +"), Err(ExpressionError::UnexpectedEnd));
        assert_eq!(parse("(y"), Err(ExpressionError::ExpectedClosingParen));
        assert_eq!(parse("y)"), Err(ExpressionError::TrailingInput(")".to_string())));
        assert_eq!(parse("y $ 2"), Err(ExpressionError::UnexpectedCharacter('$', 2)));
        assert_eq!(parse("1.2.3"), Err(ExpressionError::InvalidNumber("1.2.3".to_string())));
        assert_eq!(parse("* y"), Err(ExpressionError::UnexpectedToken("*".to_string())));
    }

    #[test]
    fn compiler_rejects_unknown_names() {
        assert_eq!(
            ExpressionRate::new("r * z", &[("r", 1.0)]),
            Err(ExpressionError::UnknownSymbol("z".to_string()))
        );
        assert_eq!(
            ExpressionRate::new("gamma(y)", &[]),
            Err(ExpressionError::UnknownFunction("gamma".to_string()))
        );
    }

    #[test]
    fn compiler_rejects_reserved_and_duplicate_parameters() {
        assert_eq!(
            Compiler::new(&["y".to_string()]).err(),
            Some(ExpressionError::ReservedName("y".to_string()))
        );
        assert_eq!(
            Compiler::new(&["r".to_string(), "r".to_string()]).err(),
            Some(ExpressionError::DuplicateParameter("r".to_string()))
        );
    }

    #[test]
    fn vm_runs_compiled_bytecode() {
        let compiler = Compiler::new(&["k".to_string()]).expect("parameters are valid");
        let code = compiler
            .compile(&parse("k * (t - y)").expect("expression parses"))
            .expect("expression compiles");
        let mut stack = Vec::new();
        assert_eq!(VM::execute(&code, &[5.0, 2.0], &[3.0], &mut stack), 9.0);
        let mut narrow_stack = Vec::new();
        assert_eq!(VM::execute(&code, &[1.0f32, 2.0], &[0.5], &mut narrow_stack), -0.5);
    }

    #[test]
    fn vm_reads_missing_slots_as_nan() {
        let compiler = Compiler::new(&["k".to_string()]).expect("parameters are valid");
        let code = compiler
            .compile(&parse("k * (t - y)").expect("expression parses"))
            .expect("expression compiles");
        let mut stack: Vec<f64> = Vec::new();
        assert!(VM::execute(&code, &[5.0], &[3.0], &mut stack).is_nan());
        assert!(VM::execute(&code, &[5.0, 2.0], &[], &mut stack).is_nan());
        assert!(VM::execute(&code, &[], &[], &mut stack).is_nan());
    }

    #[test]
    fn expression_logistic_matches_builtin_model() {
        let expression =
            ExpressionRate::new("r*y*(1 - y/K)", &[("r", 0.1), ("K", 100.0)]).expect("valid");
        let builtin = LogisticGrowth::new(0.1, 100.0);
        for y in [0.0, 10.0, 55.5, 100.0, 140.0] {
            let a: f64 = expression.evaluate(&0.0, &y);
            let b: f64 = builtin.evaluate(&0.0, &y);
            assert!((a - b).abs() < 1e-12);
        }
    }

    #[test]
    fn expression_evaluates_elementwise_over_arrays() {
        let model = ExpressionRate::new("a * t + y", &[("a", 2.0)]).expect("valid");
        let t: Array1<f64> = array![0.0, 1.0, 2.0];
        let y: Array1<f64> = array![1.0, 1.0, 1.0];
        assert_eq!(model.evaluate(&t, &y), array![1.0, 3.0, 5.0]);
    }

    #[test]
    fn expression_name_shows_source() {
        let model = ExpressionRate::new("-y", &[]).expect("valid");
        assert_eq!(model.source(), "-y");
        assert_eq!(RateFunction::<f64>::name(&model), "dy/dt = -y");
    }
}
