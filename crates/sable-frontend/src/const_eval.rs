//! Const Expression Evaluator
//!
//! Evaluates compile-time constant expressions for generic instantiation.
//! Integer values carry their bit width and signedness; two integers are equal
//! only when width, signedness and value all match.
//!
//! Identifiers are looked up in the evaluator's parameter bindings first.
//! Everything else (constants declared in a scope, package-qualified
//! references) is delegated to a [`ConstResolver`] supplied by the caller.

use crate::ast::{BinaryOp, Expr, Literal, QualifiedPath, UnaryOp};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use thiserror::Error;

/// Widest integer the evaluator represents
pub const MAX_WIDTH: u32 = 128;

/// Width given to integer literals written without a size
pub const DEFAULT_INTEGER_WIDTH: u32 = 32;

fn mask(width: u32) -> u128 {
    if width >= MAX_WIDTH {
        u128::MAX
    } else {
        (1u128 << width) - 1
    }
}

fn sign_extend(bits: u128, width: u32) -> i128 {
    if width >= MAX_WIDTH {
        bits as i128
    } else {
        let shift = MAX_WIDTH - width;
        ((bits << shift) as i128) >> shift
    }
}

fn bits_needed(value: u128) -> u32 {
    (MAX_WIDTH - value.leading_zeros()).max(1)
}

/// Evaluation error
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvalError {
    /// Expression is not constant
    #[error("expression is not constant: {0}")]
    NotConstant(String),
    /// Undefined symbol
    #[error("undefined symbol '{0}'")]
    UndefinedSymbol(String),
    /// Type mismatch
    #[error("type mismatch: {0}")]
    TypeMismatch(String),
    /// Division by zero
    #[error("division by zero")]
    DivisionByZero,
    /// Function not found
    #[error("unknown const function '{0}'")]
    FunctionNotFound(String),
    /// Invalid argument count
    #[error("'{name}' expects {expected} argument(s), got {got}")]
    InvalidArgCount {
        name: String,
        expected: usize,
        got: usize,
    },
    /// Width outside what the evaluator represents
    #[error("width {0} is outside the supported range 1..={MAX_WIDTH}")]
    UnsupportedWidth(u64),
}

/// Integer constant with an explicit bit width
///
/// `bits` holds the two's-complement representation masked to `width`.
/// `sized` records whether the width was written in source (`8'd1`) or
/// defaulted; it does not take part in equality or hashing.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct IntValue {
    bits: u128,
    width: u32,
    signed: bool,
    sized: bool,
}

impl IntValue {
    /// Create a sized integer, truncating `bits` to `width`
    pub fn new(bits: u128, width: u32, signed: bool) -> Result<Self, EvalError> {
        if width == 0 || width > MAX_WIDTH {
            return Err(EvalError::UnsupportedWidth(width as u64));
        }
        Ok(Self {
            bits: bits & mask(width),
            width,
            signed,
            sized: true,
        })
    }

    /// Create an unsized unsigned integer, widened past `default_width` when
    /// the value needs more bits
    pub fn unsized_value(value: u128, default_width: u32) -> Self {
        Self {
            bits: value,
            width: default_width.clamp(1, MAX_WIDTH).max(bits_needed(value)),
            signed: false,
            sized: false,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn is_signed(&self) -> bool {
        self.signed
    }

    pub fn is_sized(&self) -> bool {
        self.sized
    }

    /// Raw two's-complement bits
    pub fn bits(&self) -> u128 {
        self.bits
    }

    pub fn is_negative(&self) -> bool {
        self.signed && (self.bits >> (self.width - 1)) & 1 == 1
    }

    /// Value as a signed integer (sign-extended when signed)
    pub fn to_i128(&self) -> i128 {
        if self.signed {
            sign_extend(self.bits, self.width)
        } else {
            self.bits as i128
        }
    }

    /// Non-negative value that fits in 64 bits
    pub fn to_u64(&self) -> Option<u64> {
        if self.is_negative() {
            None
        } else {
            u64::try_from(self.bits).ok()
        }
    }

    /// Whether the value is representable as `width` bits of the given signedness
    pub fn fits(&self, width: u32, signed: bool) -> bool {
        if width == 0 || width > MAX_WIDTH {
            return false;
        }
        if self.is_negative() {
            signed && (width == MAX_WIDTH || self.to_i128() >= -(1i128 << (width - 1)))
        } else {
            let needed = MAX_WIDTH - self.bits.leading_zeros();
            if signed {
                needed < width
            } else {
                needed <= width
            }
        }
    }

    /// Re-type the value to `width` bits, marking it sized
    pub fn retyped(&self, width: u32, signed: bool) -> Result<Self, EvalError> {
        let bits = if self.signed {
            sign_extend(self.bits, self.width) as u128
        } else {
            self.bits
        };
        IntValue::new(bits, width, signed)
    }

    fn extended(&self, width: u32, signed: bool) -> u128 {
        if signed {
            (sign_extend(self.bits, self.width) as u128) & mask(width)
        } else {
            self.bits
        }
    }

    fn with_bits(bits: u128, width: u32, signed: bool, sized: bool) -> Self {
        Self {
            bits: bits & mask(width),
            width,
            signed,
            sized,
        }
    }

    /// Literal expression that evaluates back to this value, width included,
    /// under an evaluator with the given default width
    ///
    /// Unsized values keep their unsized spelling only when that spelling
    /// re-evaluates to the same width and signedness.
    pub fn to_expr(&self, default_width: u32) -> Expr {
        if !self.sized {
            if !self.signed {
                if IntValue::unsized_value(self.bits, default_width) == *self {
                    return Expr::int(self.bits);
                }
            } else if self.is_negative() {
                let magnitude = (self.to_i128() as u128).wrapping_neg() & mask(self.width);
                if IntValue::unsized_value(magnitude, default_width).width == self.width {
                    return Expr::unary(UnaryOp::Neg, Expr::int(magnitude));
                }
            }
        }
        Expr::Literal(Literal::Int {
            value: self.bits,
            width: Some(self.width),
            signed: self.signed,
        })
    }
}

impl PartialEq for IntValue {
    fn eq(&self, other: &Self) -> bool {
        self.width == other.width && self.signed == other.signed && self.bits == other.bits
    }
}

impl Eq for IntValue {}

impl Hash for IntValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.bits.hash(state);
        self.width.hash(state);
        self.signed.hash(state);
    }
}

impl fmt::Display for IntValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.sized {
            let lit = Literal::Int {
                value: self.bits,
                width: Some(self.width),
                signed: self.signed,
            };
            write!(f, "{}", lit)
        } else {
            write!(f, "{}", self.to_i128())
        }
    }
}

/// Const expression evaluation result
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConstValue {
    /// Integer with width and signedness
    Int(IntValue),
    /// Boolean
    Bool(bool),
}

impl ConstValue {
    pub fn as_int(&self) -> Option<&IntValue> {
        match self {
            ConstValue::Int(i) => Some(i),
            ConstValue::Bool(_) => None,
        }
    }

    /// Convert to u64 (for widths, sizes, etc.)
    pub fn as_u64(&self) -> Option<u64> {
        self.as_int().and_then(IntValue::to_u64)
    }

    /// Truth value used by conditions and logical operators
    pub fn is_truthy(&self) -> bool {
        match self {
            ConstValue::Bool(b) => *b,
            ConstValue::Int(i) => i.bits != 0,
        }
    }

    /// Human-readable type, used in diagnostics
    pub fn type_name(&self) -> String {
        match self {
            ConstValue::Bool(_) => "bool".to_string(),
            ConstValue::Int(i) => format!(
                "{}-bit {}",
                i.width,
                if i.signed { "signed" } else { "unsigned" }
            ),
        }
    }

    /// Literal expression that evaluates back to this value
    pub fn to_expr(&self, default_width: u32) -> Expr {
        match self {
            ConstValue::Bool(b) => Expr::bool(*b),
            ConstValue::Int(i) => i.to_expr(default_width),
        }
    }
}

impl fmt::Display for ConstValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstValue::Int(i) => write!(f, "{}", i),
            ConstValue::Bool(b) => write!(f, "{}", b),
        }
    }
}

/// Resolves names the evaluator cannot bind on its own
pub trait ConstResolver {
    type Error: From<EvalError>;

    /// Value of an identifier that is not a bound parameter
    fn resolve_ident(&mut self, name: &str) -> Result<ConstValue, Self::Error>;

    /// Value of a package-qualified constant
    fn resolve_path(&mut self, path: &QualifiedPath) -> Result<ConstValue, Self::Error>;
}

/// Resolver for expressions that may only use bound parameters and literals
pub struct NoExternalConstants;

impl ConstResolver for NoExternalConstants {
    type Error = EvalError;

    fn resolve_ident(&mut self, name: &str) -> Result<ConstValue, EvalError> {
        Err(EvalError::UndefinedSymbol(name.to_string()))
    }

    fn resolve_path(&mut self, path: &QualifiedPath) -> Result<ConstValue, EvalError> {
        Err(EvalError::UndefinedSymbol(path.to_string()))
    }
}

/// Built-in const function
type BuiltinConstFn = fn(&[ConstValue], u32) -> Result<ConstValue, EvalError>;

/// Const expression evaluator
#[derive(Clone)]
pub struct ConstEvaluator {
    /// Parameter bindings (parameter name -> value)
    bindings: HashMap<String, ConstValue>,
    /// Built-in const functions
    builtin_fns: HashMap<&'static str, BuiltinConstFn>,
    /// Width of unsized literals
    default_width: u32,
}

impl Default for ConstEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

impl ConstEvaluator {
    /// Create a new const evaluator
    pub fn new() -> Self {
        Self::with_default_width(DEFAULT_INTEGER_WIDTH)
    }

    /// Create an evaluator giving unsized literals `default_width` bits
    pub fn with_default_width(default_width: u32) -> Self {
        let mut builtin_fns: HashMap<&'static str, BuiltinConstFn> = HashMap::new();
        builtin_fns.insert("clog2", builtin_clog2);
        builtin_fns.insert("pow2", builtin_pow2);
        builtin_fns.insert("max", builtin_max);
        builtin_fns.insert("min", builtin_min);
        builtin_fns.insert("is_power_of_2", builtin_is_power_of_2);

        Self {
            bindings: HashMap::new(),
            builtin_fns,
            default_width: default_width.clamp(1, MAX_WIDTH),
        }
    }

    pub fn default_width(&self) -> u32 {
        self.default_width
    }

    /// Bind a const parameter to a value
    pub fn bind(&mut self, name: impl Into<String>, value: ConstValue) {
        self.bindings.insert(name.into(), value);
    }

    /// Bind multiple const parameters
    pub fn bind_all(&mut self, bindings: impl IntoIterator<Item = (String, ConstValue)>) {
        self.bindings.extend(bindings);
    }

    /// Unbind a const parameter
    pub fn unbind(&mut self, name: &str) {
        self.bindings.remove(name);
    }

    /// Value bound to a parameter
    pub fn binding(&self, name: &str) -> Option<&ConstValue> {
        self.bindings.get(name)
    }

    /// Evaluate a const expression
    pub fn eval<R: ConstResolver>(
        &self,
        expr: &Expr,
        resolver: &mut R,
    ) -> Result<ConstValue, R::Error> {
        match expr {
            Expr::Literal(lit) => Ok(self.eval_literal(lit)?),

            Expr::Ident(name) => match self.bindings.get(name) {
                Some(value) => Ok(value.clone()),
                None => resolver.resolve_ident(name),
            },

            Expr::Path(path) => resolver.resolve_path(path),

            Expr::Binary(bin) => {
                let left = self.eval(&bin.left, resolver)?;
                let right = self.eval(&bin.right, resolver)?;
                Ok(eval_binary(bin.op, left, right)?)
            }

            Expr::Unary(un) => {
                let operand = self.eval(&un.operand, resolver)?;
                Ok(eval_unary(un.op, operand)?)
            }

            Expr::Call(call) => {
                let name = call.function.trim_start_matches('$');
                let builtin = *self
                    .builtin_fns
                    .get(name)
                    .ok_or_else(|| EvalError::FunctionNotFound(call.function.clone()))?;
                let args = call
                    .args
                    .iter()
                    .map(|arg| self.eval(arg, resolver))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(builtin(&args, self.default_width)?)
            }

            Expr::Ternary(t) => {
                if self.eval(&t.cond, resolver)?.is_truthy() {
                    self.eval(&t.then_expr, resolver)
                } else {
                    self.eval(&t.else_expr, resolver)
                }
            }

            Expr::Field { base, field } => Err(EvalError::NotConstant(format!(
                "member access '{}.{}' is not a compile-time constant",
                base, field
            ))
            .into()),
        }
    }

    /// Evaluate a positive size (vector width, array length)
    pub fn eval_size<R: ConstResolver>(
        &self,
        expr: &Expr,
        resolver: &mut R,
    ) -> Result<u64, R::Error> {
        let value = self.eval(expr, resolver)?;
        match value.as_u64() {
            Some(size) if size > 0 => Ok(size),
            _ => Err(EvalError::TypeMismatch(format!(
                "size '{}' must be a positive integer, found {}",
                expr, value
            ))
            .into()),
        }
    }

    /// Evaluate a literal
    fn eval_literal(&self, lit: &Literal) -> Result<ConstValue, EvalError> {
        match lit {
            Literal::Bool(b) => Ok(ConstValue::Bool(*b)),
            Literal::Int {
                value,
                width: None,
                ..
            } => Ok(ConstValue::Int(IntValue::unsized_value(
                *value,
                self.default_width,
            ))),
            Literal::Int {
                value,
                width: Some(width),
                signed,
            } => Ok(ConstValue::Int(IntValue::new(*value, *width, *signed)?)),
        }
    }
}

/// Evaluate binary operation
fn eval_binary(op: BinaryOp, left: ConstValue, right: ConstValue) -> Result<ConstValue, EvalError> {
    match op {
        BinaryOp::LogicAnd => return Ok(ConstValue::Bool(left.is_truthy() && right.is_truthy())),
        BinaryOp::LogicOr => return Ok(ConstValue::Bool(left.is_truthy() || right.is_truthy())),
        _ => {}
    }

    match (left, right) {
        (ConstValue::Int(a), ConstValue::Int(b)) => eval_int_binary(op, a, b),
        (ConstValue::Bool(a), ConstValue::Bool(b)) => match op {
            BinaryOp::Eq => Ok(ConstValue::Bool(a == b)),
            BinaryOp::Ne => Ok(ConstValue::Bool(a != b)),
            BinaryOp::BitAnd => Ok(ConstValue::Bool(a & b)),
            BinaryOp::BitOr => Ok(ConstValue::Bool(a | b)),
            BinaryOp::BitXor => Ok(ConstValue::Bool(a ^ b)),
            _ => Err(EvalError::TypeMismatch(format!(
                "operator '{}' is not defined for bool",
                op.symbol()
            ))),
        },
        (left, right) => Err(EvalError::TypeMismatch(format!(
            "operator '{}' applied to {} and {}",
            op.symbol(),
            left.type_name(),
            right.type_name()
        ))),
    }
}

fn eval_int_binary(op: BinaryOp, a: IntValue, b: IntValue) -> Result<ConstValue, EvalError> {
    // Shifts keep the type of the shifted operand
    if matches!(op, BinaryOp::Shl | BinaryOp::Shr) {
        let amount = b.to_u64().unwrap_or(u64::MAX);
        let bits = match op {
            BinaryOp::Shl if amount >= a.width as u64 => 0,
            BinaryOp::Shl => a.bits << amount,
            _ if a.signed => (sign_extend(a.bits, a.width) >> amount.min(127)) as u128,
            _ if amount >= MAX_WIDTH as u64 => 0,
            _ => a.bits >> amount,
        };
        return Ok(ConstValue::Int(IntValue::with_bits(
            bits,
            a.width,
            a.signed,
            a.sized || b.sized,
        )));
    }

    let width = a.width.max(b.width);
    let signed = a.signed && b.signed;
    let sized = a.sized || b.sized;
    let x = a.extended(width, signed);
    let y = b.extended(width, signed);
    let int = |bits: u128| ConstValue::Int(IntValue::with_bits(bits, width, signed, sized));

    match op {
        BinaryOp::Add => Ok(int(x.wrapping_add(y))),
        BinaryOp::Sub => Ok(int(x.wrapping_sub(y))),
        BinaryOp::Mul => Ok(int(x.wrapping_mul(y))),
        BinaryOp::Div | BinaryOp::Rem => {
            if y & mask(width) == 0 {
                return Err(EvalError::DivisionByZero);
            }
            let bits = if signed {
                let (sx, sy) = (sign_extend(x, width), sign_extend(y, width));
                if op == BinaryOp::Div {
                    sx.wrapping_div(sy) as u128
                } else {
                    sx.wrapping_rem(sy) as u128
                }
            } else if op == BinaryOp::Div {
                x / y
            } else {
                x % y
            };
            Ok(int(bits))
        }
        BinaryOp::Pow => {
            let exponent = b.to_u64().ok_or_else(|| {
                EvalError::TypeMismatch(format!("negative exponent {}", b))
            })?;
            let exponent = u32::try_from(exponent).unwrap_or(u32::MAX);
            Ok(int(x.wrapping_pow(exponent)))
        }
        BinaryOp::BitAnd => Ok(int(x & y)),
        BinaryOp::BitOr => Ok(int(x | y)),
        BinaryOp::BitXor => Ok(int(x ^ y)),
        BinaryOp::Eq => Ok(ConstValue::Bool(x == y)),
        BinaryOp::Ne => Ok(ConstValue::Bool(x != y)),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            let ordering = if signed {
                sign_extend(x, width).cmp(&sign_extend(y, width))
            } else {
                x.cmp(&y)
            };
            let result = match op {
                BinaryOp::Lt => ordering.is_lt(),
                BinaryOp::Le => ordering.is_le(),
                BinaryOp::Gt => ordering.is_gt(),
                _ => ordering.is_ge(),
            };
            Ok(ConstValue::Bool(result))
        }
        BinaryOp::Shl | BinaryOp::Shr | BinaryOp::LogicAnd | BinaryOp::LogicOr => {
            unreachable!("handled above")
        }
    }
}

/// Evaluate unary operation
fn eval_unary(op: UnaryOp, operand: ConstValue) -> Result<ConstValue, EvalError> {
    match (op, operand) {
        (UnaryOp::Not, value) => Ok(ConstValue::Bool(!value.is_truthy())),
        (UnaryOp::Neg, ConstValue::Int(i)) => {
            // Negating an unsized literal yields a signed integer
            let signed = i.signed || !i.sized;
            Ok(ConstValue::Int(IntValue::with_bits(
                i.bits.wrapping_neg(),
                i.width,
                signed,
                i.sized,
            )))
        }
        (UnaryOp::BitNot, ConstValue::Int(i)) => Ok(ConstValue::Int(IntValue::with_bits(
            !i.bits, i.width, i.signed, i.sized,
        ))),
        (UnaryOp::BitNot, ConstValue::Bool(b)) => Ok(ConstValue::Bool(!b)),
        (UnaryOp::Neg, value) => Err(EvalError::TypeMismatch(format!(
            "cannot negate {}",
            value.type_name()
        ))),
    }
}

// ============================================================================
// Built-in Const Functions
// ============================================================================

fn check_arity(name: &str, args: &[ConstValue], expected: usize) -> Result<(), EvalError> {
    if args.len() != expected {
        return Err(EvalError::InvalidArgCount {
            name: name.to_string(),
            expected,
            got: args.len(),
        });
    }
    Ok(())
}

fn nat_arg(name: &str, value: &ConstValue) -> Result<u64, EvalError> {
    value.as_u64().ok_or_else(|| {
        EvalError::TypeMismatch(format!(
            "{} requires a non-negative integer argument, found {}",
            name, value
        ))
    })
}

/// Ceiling log base 2
fn builtin_clog2(args: &[ConstValue], default_width: u32) -> Result<ConstValue, EvalError> {
    check_arity("clog2", args, 1)?;
    let n = nat_arg("clog2", &args[0])?;
    let result = if n <= 1 { 0 } else { (n - 1).ilog2() + 1 };
    Ok(ConstValue::Int(IntValue::unsized_value(
        result as u128,
        default_width,
    )))
}

/// Two to the power of n
fn builtin_pow2(args: &[ConstValue], default_width: u32) -> Result<ConstValue, EvalError> {
    check_arity("pow2", args, 1)?;
    let n = nat_arg("pow2", &args[0])?;
    if n >= MAX_WIDTH as u64 {
        return Err(EvalError::UnsupportedWidth(n + 1));
    }
    Ok(ConstValue::Int(IntValue::unsized_value(
        1u128 << n,
        default_width,
    )))
}

/// Check if power of 2
fn builtin_is_power_of_2(args: &[ConstValue], _: u32) -> Result<ConstValue, EvalError> {
    check_arity("is_power_of_2", args, 1)?;
    let n = nat_arg("is_power_of_2", &args[0])?;
    Ok(ConstValue::Bool(n.is_power_of_two()))
}

fn pick(name: &str, args: &[ConstValue], take_greater: bool) -> Result<ConstValue, EvalError> {
    check_arity(name, args, 2)?;
    let greater = eval_binary(BinaryOp::Gt, args[0].clone(), args[1].clone())?;
    let first = greater.is_truthy() == take_greater;
    Ok(if first {
        args[0].clone()
    } else {
        args[1].clone()
    })
}

/// Maximum of two numbers
fn builtin_max(args: &[ConstValue], _: u32) -> Result<ConstValue, EvalError> {
    pick("max", args, true)
}

/// Minimum of two numbers
fn builtin_min(args: &[ConstValue], _: u32) -> Result<ConstValue, EvalError> {
    pick("min", args, false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(expr: &Expr) -> Result<ConstValue, EvalError> {
        ConstEvaluator::new().eval(expr, &mut NoExternalConstants)
    }

    fn uint(value: u128, width: u32) -> ConstValue {
        ConstValue::Int(IntValue::new(value, width, false).unwrap())
    }

    #[test]
    fn test_unsized_literal_takes_default_width() {
        assert_eq!(eval(&Expr::int(42)).unwrap(), uint(42, 32));

        // Wider values grow past the default
        let wide = eval(&Expr::int(1 << 40)).unwrap();
        assert_eq!(wide.as_int().unwrap().width(), 41);
    }

    #[test]
    fn test_sized_and_unsized_compare_by_width() {
        let sized = eval(&Expr::sized(32, 1)).unwrap();
        let plain = eval(&Expr::int(1)).unwrap();
        assert_eq!(sized, plain);

        let wide = eval(&Expr::sized(64, 1)).unwrap();
        assert_ne!(sized, wide);
    }

    #[test]
    fn test_arithmetic_wraps_to_result_width() {
        let expr = Expr::binary(BinaryOp::Add, Expr::sized(8, 255), Expr::sized(8, 1));
        assert_eq!(eval(&expr).unwrap(), uint(0, 8));

        // The wider operand decides the width
        let expr = Expr::binary(BinaryOp::Add, Expr::sized(8, 255), Expr::sized(16, 1));
        assert_eq!(eval(&expr).unwrap(), uint(256, 16));
    }

    #[test]
    fn test_negation_of_unsized_literal_is_signed() {
        let value = eval(&Expr::unary(UnaryOp::Neg, Expr::int(3))).unwrap();
        let int = value.as_int().unwrap();
        assert!(int.is_signed());
        assert_eq!(int.to_i128(), -3);

        // And survives a round trip through a literal expression
        assert_eq!(eval(&value.to_expr(DEFAULT_INTEGER_WIDTH)).unwrap(), value);
    }

    #[test]
    fn test_literal_keeps_width_of_wide_result() {
        // 41 bits from the wide operand, though the result fits in 40
        let expr = Expr::binary(BinaryOp::Sub, Expr::int(1 << 40), Expr::int(1));
        let value = eval(&expr).unwrap();
        assert_eq!(value.as_int().unwrap().width(), 41);

        let literal = value.to_expr(DEFAULT_INTEGER_WIDTH);
        assert_eq!(literal, Expr::sized(41, (1 << 40) - 1));
        let reparsed = eval(&literal).unwrap();
        assert_eq!(reparsed, value);
        assert_eq!(reparsed.as_int().unwrap().width(), 41);

        // Natural widths keep the plain spelling
        let plain = IntValue::unsized_value(5, DEFAULT_INTEGER_WIDTH);
        assert_eq!(plain.to_expr(DEFAULT_INTEGER_WIDTH), Expr::int(5));
    }

    #[test]
    fn test_signed_comparison() {
        let minus_one = Expr::Literal(Literal::Int {
            value: 0xFF,
            width: Some(8),
            signed: true,
        });
        let one = Expr::Literal(Literal::Int {
            value: 1,
            width: Some(8),
            signed: true,
        });
        let expr = Expr::binary(BinaryOp::Lt, minus_one.clone(), one);
        assert_eq!(eval(&expr).unwrap(), ConstValue::Bool(true));

        // Mixed signedness compares unsigned
        let expr = Expr::binary(BinaryOp::Lt, minus_one, Expr::sized(8, 1));
        assert_eq!(eval(&expr).unwrap(), ConstValue::Bool(false));
    }

    #[test]
    fn test_shifts_keep_left_type() {
        let expr = Expr::binary(BinaryOp::Shl, Expr::sized(8, 1), Expr::int(7));
        assert_eq!(eval(&expr).unwrap(), uint(128, 8));

        let expr = Expr::binary(BinaryOp::Shl, Expr::sized(8, 1), Expr::int(8));
        assert_eq!(eval(&expr).unwrap(), uint(0, 8));

        let negative = Expr::Literal(Literal::Int {
            value: 0x80,
            width: Some(8),
            signed: true,
        });
        let expr = Expr::binary(BinaryOp::Shr, negative, Expr::int(2));
        let value = eval(&expr).unwrap();
        assert_eq!(value.as_int().unwrap().to_i128(), -32);
    }

    #[test]
    fn test_division_by_zero() {
        let expr = Expr::binary(BinaryOp::Div, Expr::int(4), Expr::int(0));
        assert_eq!(eval(&expr), Err(EvalError::DivisionByZero));
    }

    #[test]
    fn test_builtins() {
        let expr = Expr::call("$clog2", vec![Expr::int(1024)]);
        assert_eq!(eval(&expr).unwrap(), uint(10, 32));

        let expr = Expr::call("clog2", vec![Expr::int(1)]);
        assert_eq!(eval(&expr).unwrap(), uint(0, 32));

        let expr = Expr::call("max", vec![Expr::int(3), Expr::int(9)]);
        assert_eq!(eval(&expr).unwrap(), uint(9, 32));

        let expr = Expr::call("min", vec![Expr::int(3), Expr::int(9)]);
        assert_eq!(eval(&expr).unwrap(), uint(3, 32));

        let expr = Expr::call("pow2", vec![Expr::int(4)]);
        assert_eq!(eval(&expr).unwrap(), uint(16, 32));

        let expr = Expr::call("clog2", vec![]);
        assert!(matches!(
            eval(&expr),
            Err(EvalError::InvalidArgCount { expected: 1, .. })
        ));

        let expr = Expr::call("sqrt", vec![Expr::int(4)]);
        assert_eq!(
            eval(&expr),
            Err(EvalError::FunctionNotFound("sqrt".to_string()))
        );
    }

    #[test]
    fn test_bindings_shadow_resolver() {
        let mut evaluator = ConstEvaluator::new();
        evaluator.bind("W", uint(8, 32));
        let expr = Expr::binary(BinaryOp::Mul, Expr::ident("W"), Expr::int(2));
        assert_eq!(
            evaluator.eval(&expr, &mut NoExternalConstants).unwrap(),
            uint(16, 32)
        );

        evaluator.unbind("W");
        assert_eq!(
            evaluator.eval(&expr, &mut NoExternalConstants),
            Err(EvalError::UndefinedSymbol("W".to_string()))
        );
    }

    #[test]
    fn test_fits() {
        let value = IntValue::unsized_value(255, 32);
        assert!(value.fits(8, false));
        assert!(!value.fits(8, true));
        assert!(!value.fits(7, false));

        let retyped = value.retyped(8, false).unwrap();
        assert!(retyped.is_sized());
        assert_eq!(retyped.width(), 8);
    }

    #[test]
    fn test_size_must_be_positive() {
        let evaluator = ConstEvaluator::new();
        assert_eq!(
            evaluator.eval_size(&Expr::int(16), &mut NoExternalConstants),
            Ok(16)
        );
        assert!(matches!(
            evaluator.eval_size(&Expr::int(0), &mut NoExternalConstants),
            Err(EvalError::TypeMismatch(_))
        ));
    }
}
