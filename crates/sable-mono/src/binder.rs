//! Parameter Binder
//!
//! Evaluates the generic arguments of a call site and binds them, in
//! declaration order, to the parameters of a generic package.

use crate::error::{InstantiationError, ResolveFailure};
use sable_frontend::ast::{Expr, PackageDecl, ParamType, TypeExpr};
use sable_frontend::const_eval::MAX_WIDTH;
use sable_frontend::{
    ConstEvaluator, ConstResolver, ConstValue, EvalError, NoExternalConstants, SourceSpan,
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Resolved generic arguments, aligned with the declared parameters
///
/// Compared by value: width and signedness are part of each value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ParameterValueSet(Vec<ConstValue>);

impl ParameterValueSet {
    pub fn new(values: Vec<ConstValue>) -> Self {
        Self(values)
    }

    pub fn values(&self) -> &[ConstValue] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ConstValue> {
        self.0.iter()
    }
}

impl fmt::Display for ParameterValueSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, value) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", value)?;
        }
        Ok(())
    }
}

/// Type a declaration pins a constant to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    Int { width: u32, signed: bool },
    Bool,
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueType::Int { width, signed } => write!(
                f,
                "{}-bit {}",
                width,
                if *signed { "signed" } else { "unsigned" }
            ),
            ValueType::Bool => write!(f, "bool"),
        }
    }
}

/// Value type fixed by a declared type, if the type fixes one
///
/// Vector widths are evaluated with `evaluator`, so they may use bound
/// parameters and whatever `resolver` can see. Named, package and array
/// types do not constrain constant values.
pub fn value_type<R: ConstResolver>(
    ty: &TypeExpr,
    evaluator: &ConstEvaluator,
    resolver: &mut R,
) -> Result<Option<ValueType>, R::Error> {
    match ty {
        TypeExpr::Bool => Ok(Some(ValueType::Bool)),
        TypeExpr::Int(kind) => Ok(Some(ValueType::Int {
            width: kind.width(),
            signed: kind.is_signed(),
        })),
        TypeExpr::Logic(None) | TypeExpr::Bit(None) => Ok(Some(ValueType::Int {
            width: 1,
            signed: false,
        })),
        TypeExpr::Logic(Some(width)) | TypeExpr::Bit(Some(width)) => {
            let width = evaluator.eval_size(width, resolver)?;
            let width = u32::try_from(width)
                .ok()
                .filter(|w| *w <= MAX_WIDTH)
                .ok_or(EvalError::UnsupportedWidth(width))?;
            Ok(Some(ValueType::Int {
                width,
                signed: false,
            }))
        }
        TypeExpr::Named(_) | TypeExpr::Path(_) | TypeExpr::Array { .. } => Ok(None),
    }
}

/// Convert a value to a declared type
///
/// Values with an explicit width must match the declared width and
/// signedness exactly. Unsized values are accepted when they fit and take
/// the declared type.
pub fn coerce(
    value: ConstValue,
    expected: ValueType,
    what: &str,
    site: &SourceSpan,
) -> Result<ConstValue, InstantiationError> {
    let mismatch = |value: &ConstValue| InstantiationError::TypeMismatch {
        what: what.to_string(),
        expected: expected.to_string(),
        found: format!("{} (value {})", value.type_name(), value),
        site: site.clone(),
    };

    match (expected, &value) {
        (ValueType::Bool, ConstValue::Bool(_)) => Ok(value),
        (ValueType::Int { width, signed }, ConstValue::Int(int)) => {
            if int.is_sized() {
                if int.width() == width && int.is_signed() == signed {
                    Ok(value)
                } else {
                    Err(mismatch(&value))
                }
            } else if int.fits(width, signed) {
                let retyped = int.retyped(width, signed).map_err(|_| mismatch(&value))?;
                Ok(ConstValue::Int(retyped))
            } else {
                Err(mismatch(&value))
            }
        }
        _ => Err(mismatch(&value)),
    }
}

/// Bind call-site arguments to the parameters of a generic package
///
/// Arguments are evaluated with the caller's `evaluator` and `resolver`.
/// Declared parameter types may refer to earlier parameters.
pub fn bind_arguments<R>(
    decl: &PackageDecl,
    args: &[Expr],
    evaluator: &ConstEvaluator,
    resolver: &mut R,
    site: &SourceSpan,
) -> Result<ParameterValueSet, InstantiationError>
where
    R: ConstResolver<Error = ResolveFailure>,
{
    if args.len() != decl.generics.len() {
        return Err(InstantiationError::ArityMismatch {
            package: decl.name.clone(),
            expected: decl.generics.len(),
            found: args.len(),
            site: site.clone(),
        });
    }

    let mut type_env = ConstEvaluator::with_default_width(evaluator.default_width());
    let mut values = Vec::with_capacity(args.len());

    for (index, (param, arg)) in decl.generics.iter().zip(args).enumerate() {
        let what = format!(
            "argument {} ('{}') of package '{}'",
            index + 1,
            param.name,
            decl.name
        );
        let value = evaluator
            .eval(arg, resolver)
            .map_err(|e| e.into_error(&what, site))?;

        let value = match &param.param_type {
            ParamType::Const => value,
            ParamType::Typed(ty) => {
                let expected = value_type(ty, &type_env, &mut NoExternalConstants).map_err(|e| {
                    ResolveFailure::from(e)
                        .into_error(&format!("type of parameter '{}'", param.name), &param.span)
                })?;
                match expected {
                    Some(expected) => coerce(value, expected, &what, site)?,
                    None => value,
                }
            }
        };

        type_env.bind(param.name.clone(), value.clone());
        values.push(value);
    }

    Ok(ParameterValueSet(values))
}
