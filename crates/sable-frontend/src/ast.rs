//! AST for Sable source units
//!
//! This is the tree handed over by the parser. It keeps only what the
//! elaboration passes after parsing need: packages (generic or not), modules,
//! declarations inside them and constant/type expressions. Generic arguments
//! stay unevaluated expressions until generic instantiation binds them.

use crate::span::SourceSpan;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A compilation unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceUnit {
    /// Unit name (usually the project name)
    pub name: String,
    /// Top-level descriptions in source order
    pub descriptions: Vec<Description>,
}

/// Top-level description
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Description {
    Package(PackageDecl),
    Module(ModuleDecl),
}

impl Description {
    /// Declared name of the description
    pub fn name(&self) -> &str {
        match self {
            Description::Package(p) => &p.name,
            Description::Module(m) => &m.name,
        }
    }

    /// Source location of the declaration
    pub fn span(&self) -> &SourceSpan {
        match self {
            Description::Package(p) => &p.span,
            Description::Module(m) => &m.span,
        }
    }
}

/// Package declaration, generic when it declares parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageDecl {
    /// Package name (unique per compilation unit)
    pub name: String,
    /// Generic parameters in declaration order
    pub generics: Vec<GenericParam>,
    /// Package body
    pub items: Vec<PackageItem>,
    /// Declaration location
    pub span: SourceSpan,
}

impl PackageDecl {
    pub fn new(name: impl Into<String>, items: Vec<PackageItem>) -> Self {
        Self {
            name: name.into(),
            generics: Vec::new(),
            items,
            span: SourceSpan::default(),
        }
    }

    pub fn generic(
        name: impl Into<String>,
        generics: Vec<GenericParam>,
        items: Vec<PackageItem>,
    ) -> Self {
        Self {
            name: name.into(),
            generics,
            items,
            span: SourceSpan::default(),
        }
    }

    pub fn at(mut self, span: SourceSpan) -> Self {
        self.span = span;
        self
    }

    pub fn is_generic(&self) -> bool {
        !self.generics.is_empty()
    }

    /// Find a body item by name, with its position in the body
    pub fn find_item(&self, name: &str) -> Option<(usize, &PackageItem)> {
        self.items
            .iter()
            .enumerate()
            .find(|(_, item)| item.name() == name)
    }

    /// Find a constant declaration by name, with its position in the body
    pub fn find_const(&self, name: &str) -> Option<(usize, &ConstDecl)> {
        self.items
            .iter()
            .enumerate()
            .find_map(|(index, item)| match item {
                PackageItem::Const(c) if c.name == name => Some((index, c)),
                _ => None,
            })
    }
}

/// Generic parameter of a package
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenericParam {
    /// Parameter name
    pub name: String,
    /// Declared kind of the parameter
    pub param_type: ParamType,
    /// Declaration location
    pub span: SourceSpan,
}

impl GenericParam {
    /// Untyped constant parameter (`W: const`)
    pub fn constant(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            param_type: ParamType::Const,
            span: SourceSpan::default(),
        }
    }

    /// Constant parameter with a declared type (`W: u32`)
    pub fn typed(name: impl Into<String>, ty: TypeExpr) -> Self {
        Self {
            name: name.into(),
            param_type: ParamType::Typed(ty),
            span: SourceSpan::default(),
        }
    }
}

/// Declared kind of a generic parameter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParamType {
    /// Any constant; the argument keeps its own type
    Const,
    /// Constant of the given type
    Typed(TypeExpr),
}

/// Item inside a package body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PackageItem {
    Const(ConstDecl),
    TypeDef(TypeDefDecl),
    Struct(StructDecl),
    Enum(EnumDecl),
    Function(FunctionDecl),
}

impl PackageItem {
    pub fn name(&self) -> &str {
        match self {
            PackageItem::Const(c) => &c.name,
            PackageItem::TypeDef(t) => &t.name,
            PackageItem::Struct(s) => &s.name,
            PackageItem::Enum(e) => &e.name,
            PackageItem::Function(f) => &f.name,
        }
    }

    /// Whether the item declares a type
    pub fn is_type(&self) -> bool {
        matches!(
            self,
            PackageItem::TypeDef(_) | PackageItem::Struct(_) | PackageItem::Enum(_)
        )
    }
}

/// Constant declaration (`const NAME: ty = value;`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConstDecl {
    pub name: String,
    /// Declared type, if any
    pub ty: Option<TypeExpr>,
    /// Initializer
    pub value: Expr,
    pub span: SourceSpan,
}

impl ConstDecl {
    pub fn new(name: impl Into<String>, ty: Option<TypeExpr>, value: Expr) -> Self {
        Self {
            name: name.into(),
            ty,
            value,
            span: SourceSpan::default(),
        }
    }

    pub fn at(mut self, span: SourceSpan) -> Self {
        self.span = span;
        self
    }
}

/// Type alias (`type NAME = ty;`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeDefDecl {
    pub name: String,
    pub ty: TypeExpr,
}

/// Packed struct or union declaration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructDecl {
    pub name: String,
    pub kind: StructKind,
    /// Fields in declaration order
    pub fields: Vec<StructField>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StructKind {
    Struct,
    Union,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructField {
    pub name: String,
    pub ty: TypeExpr,
}

/// Enum declaration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnumDecl {
    pub name: String,
    /// Underlying type (`enum E: logic<W>`)
    pub base: Option<TypeExpr>,
    pub variants: Vec<EnumVariant>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnumVariant {
    pub name: String,
    /// Explicit encoding, if any
    pub value: Option<Expr>,
}

/// Function declared inside a package
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionDecl {
    pub name: String,
    pub params: Vec<FunctionParam>,
    pub ret: Option<TypeExpr>,
    pub body: Vec<Statement>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionParam {
    pub name: String,
    pub ty: TypeExpr,
}

/// Statement inside a function body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Statement {
    /// Local declaration (`let name: ty = value;`)
    Let {
        name: String,
        ty: TypeExpr,
        value: Expr,
    },
    /// Assignment to a local or parameter
    Assign { target: String, value: Expr },
    /// Return from the function
    Return(Expr),
    /// Conditional
    If {
        cond: Expr,
        then_body: Vec<Statement>,
        else_body: Vec<Statement>,
    },
}

/// Module declaration (a consumer of package members)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleDecl {
    pub name: String,
    pub items: Vec<ModuleItem>,
    pub span: SourceSpan,
}

impl ModuleDecl {
    pub fn new(name: impl Into<String>, items: Vec<ModuleItem>) -> Self {
        Self {
            name: name.into(),
            items,
            span: SourceSpan::default(),
        }
    }

    /// Find a constant declaration by name, with its position in the body
    pub fn find_const(&self, name: &str) -> Option<(usize, &ConstDecl)> {
        self.items
            .iter()
            .enumerate()
            .find_map(|(index, item)| match item {
                ModuleItem::Const(c) if c.name == name => Some((index, c)),
                _ => None,
            })
    }

    /// Whether the module declares any item with this name
    pub fn declares(&self, name: &str) -> bool {
        self.items.iter().any(|item| item.name() == name)
    }
}

/// Item inside a module body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModuleItem {
    Const(ConstDecl),
    /// Continuously assigned signal (`let name: ty = value;`)
    Let(LetDecl),
    /// Variable (`var name: ty;`)
    Var(VarDecl),
}

impl ModuleItem {
    pub fn name(&self) -> &str {
        match self {
            ModuleItem::Const(c) => &c.name,
            ModuleItem::Let(l) => &l.name,
            ModuleItem::Var(v) => &v.name,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LetDecl {
    pub name: String,
    pub ty: TypeExpr,
    pub value: Expr,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VarDecl {
    pub name: String,
    pub ty: TypeExpr,
}

/// Type expressions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TypeExpr {
    /// 4-state vector, one bit when no width is given
    Logic(Option<Box<Expr>>),
    /// 2-state vector, one bit when no width is given
    Bit(Option<Box<Expr>>),
    /// Fixed-width integer
    Int(IntKind),
    Bool,
    /// Type declared in the enclosing scope
    Named(String),
    /// Type exported by a package
    Path(QualifiedPath),
    /// Unpacked array
    Array { element: Box<TypeExpr>, len: Box<Expr> },
}

impl TypeExpr {
    pub fn logic(width: Expr) -> Self {
        TypeExpr::Logic(Some(Box::new(width)))
    }

    pub fn bit(width: Expr) -> Self {
        TypeExpr::Bit(Some(Box::new(width)))
    }
}

/// Fixed-width integer types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IntKind {
    U32,
    U64,
    I32,
    I64,
}

impl IntKind {
    pub fn width(self) -> u32 {
        match self {
            IntKind::U32 | IntKind::I32 => 32,
            IntKind::U64 | IntKind::I64 => 64,
        }
    }

    pub fn is_signed(self) -> bool {
        matches!(self, IntKind::I32 | IntKind::I64)
    }
}

/// Expressions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Expr {
    Literal(Literal),
    /// Parameter, constant, signal or variable in scope
    Ident(String),
    /// Package-qualified reference
    Path(QualifiedPath),
    Binary(BinaryExpr),
    Unary(UnaryExpr),
    Call(CallExpr),
    Ternary(TernaryExpr),
    /// Struct member access on a value (`value.field`)
    Field { base: Box<Expr>, field: String },
}

impl Expr {
    /// Unsized integer literal
    pub fn int(value: u128) -> Self {
        Expr::Literal(Literal::Int {
            value,
            width: None,
            signed: false,
        })
    }

    /// Sized unsigned integer literal (`8'd1`)
    pub fn sized(width: u32, value: u128) -> Self {
        Expr::Literal(Literal::Int {
            value,
            width: Some(width),
            signed: false,
        })
    }

    pub fn bool(value: bool) -> Self {
        Expr::Literal(Literal::Bool(value))
    }

    pub fn ident(name: impl Into<String>) -> Self {
        Expr::Ident(name.into())
    }

    pub fn path(path: QualifiedPath) -> Self {
        Expr::Path(path)
    }

    pub fn binary(op: BinaryOp, left: Expr, right: Expr) -> Self {
        Expr::Binary(BinaryExpr {
            op,
            left: Box::new(left),
            right: Box::new(right),
        })
    }

    pub fn unary(op: UnaryOp, operand: Expr) -> Self {
        Expr::Unary(UnaryExpr {
            op,
            operand: Box::new(operand),
        })
    }

    pub fn call(function: impl Into<String>, args: Vec<Expr>) -> Self {
        Expr::Call(CallExpr {
            function: function.into(),
            args,
        })
    }

    pub fn field(base: Expr, field: impl Into<String>) -> Self {
        Expr::Field {
            base: Box::new(base),
            field: field.into(),
        }
    }
}

/// Literal values
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Literal {
    /// Integer; `value` holds the raw bits when a width is given
    Int {
        value: u128,
        width: Option<u32>,
        signed: bool,
    },
    Bool(bool),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BinaryExpr {
    pub op: BinaryOp,
    pub left: Box<Expr>,
    pub right: Box<Expr>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Pow,
    Shl,
    Shr,
    BitAnd,
    BitOr,
    BitXor,
    LogicAnd,
    LogicOr,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
            BinaryOp::Pow => "**",
            BinaryOp::Shl => "<<",
            BinaryOp::Shr => ">>",
            BinaryOp::BitAnd => "&",
            BinaryOp::BitOr => "|",
            BinaryOp::BitXor => "^",
            BinaryOp::LogicAnd => "&&",
            BinaryOp::LogicOr => "||",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnaryExpr {
    pub op: UnaryOp,
    pub operand: Box<Expr>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    Neg,
    Not,
    BitNot,
}

impl UnaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            UnaryOp::Neg => "-",
            UnaryOp::Not => "!",
            UnaryOp::BitNot => "~",
        }
    }
}

/// Call of a constant builtin (`$clog2(N)`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallExpr {
    pub function: String,
    pub args: Vec<Expr>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TernaryExpr {
    pub cond: Box<Expr>,
    pub then_expr: Box<Expr>,
    pub else_expr: Box<Expr>,
}

/// Package-qualified reference (`Pkg::<1, 2>::Member::Sub`)
///
/// `generic_args` is empty for plain packages and for references that
/// generic instantiation has already rewritten to a specialized package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualifiedPath {
    /// Package name
    pub package: String,
    /// Generic arguments applied to the package
    pub generic_args: Vec<Expr>,
    /// Member path below the package (constant, type, variant)
    pub members: Vec<String>,
    /// Location of the reference
    pub span: SourceSpan,
}

impl QualifiedPath {
    /// Reference into a plain package (`Pkg::Member`)
    pub fn new(package: impl Into<String>, members: &[&str]) -> Self {
        Self::generic(package, Vec::new(), members)
    }

    /// Reference into a generic package instance (`Pkg::<args>::Member`)
    pub fn generic(package: impl Into<String>, generic_args: Vec<Expr>, members: &[&str]) -> Self {
        Self {
            package: package.into(),
            generic_args,
            members: members.iter().map(|m| m.to_string()).collect(),
            span: SourceSpan::default(),
        }
    }

    pub fn at(mut self, span: SourceSpan) -> Self {
        self.span = span;
        self
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Bool(b) => write!(f, "{}", b),
            Literal::Int {
                value,
                width: None,
                ..
            } => write!(f, "{}", value),
            Literal::Int {
                value,
                width: Some(width),
                signed: false,
            } => write!(f, "{}'d{}", width, value),
            Literal::Int {
                value,
                width: Some(width),
                signed: true,
            } => {
                let sign_bit = 1u128 << (width.saturating_sub(1)).min(127);
                if *width > 0 && value & sign_bit != 0 {
                    let magnitude = if *width >= 128 {
                        value.wrapping_neg()
                    } else {
                        (1u128 << width) - value
                    };
                    write!(f, "-{}'sd{}", width, magnitude)
                } else {
                    write!(f, "{}'sd{}", width, value)
                }
            }
        }
    }
}

impl fmt::Display for QualifiedPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.package)?;
        if !self.generic_args.is_empty() {
            write!(f, "::<")?;
            for (i, arg) in self.generic_args.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{}", arg)?;
            }
            write!(f, ">")?;
        }
        for member in &self.members {
            write!(f, "::{}", member)?;
        }
        Ok(())
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Literal(lit) => write!(f, "{}", lit),
            Expr::Ident(name) => write!(f, "{}", name),
            Expr::Path(path) => write!(f, "{}", path),
            Expr::Binary(bin) => write!(f, "({} {} {})", bin.left, bin.op.symbol(), bin.right),
            Expr::Unary(un) => write!(f, "{}{}", un.op.symbol(), un.operand),
            Expr::Call(call) => {
                write!(f, "{}(", call.function)?;
                for (i, arg) in call.args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                write!(f, ")")
            }
            Expr::Ternary(t) => write!(f, "({} ? {} : {})", t.cond, t.then_expr, t.else_expr),
            Expr::Field { base, field } => write!(f, "{}.{}", base, field),
        }
    }
}

impl fmt::Display for TypeExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeExpr::Logic(None) => write!(f, "logic"),
            TypeExpr::Logic(Some(w)) => write!(f, "logic<{}>", w),
            TypeExpr::Bit(None) => write!(f, "bit"),
            TypeExpr::Bit(Some(w)) => write!(f, "bit<{}>", w),
            TypeExpr::Int(kind) => {
                let name = match kind {
                    IntKind::U32 => "u32",
                    IntKind::U64 => "u64",
                    IntKind::I32 => "i32",
                    IntKind::I64 => "i64",
                };
                write!(f, "{}", name)
            }
            TypeExpr::Bool => write!(f, "bool"),
            TypeExpr::Named(name) => write!(f, "{}", name),
            TypeExpr::Path(path) => write!(f, "{}", path),
            TypeExpr::Array { element, len } => write!(f, "{}[{}]", element, len),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_display() {
        let path = QualifiedPath::generic(
            "Pkg",
            vec![Expr::int(1), Expr::sized(8, 2)],
            &["StructC"],
        );
        assert_eq!(path.to_string(), "Pkg::<1, 8'd2>::StructC");

        let plain = QualifiedPath::new("Defs", &["Command", "READ"]);
        assert_eq!(plain.to_string(), "Defs::Command::READ");
    }

    #[test]
    fn test_signed_literal_display() {
        let lit = Literal::Int {
            value: 0xFF,
            width: Some(8),
            signed: true,
        };
        assert_eq!(lit.to_string(), "-8'sd1");

        let lit = Literal::Int {
            value: 5,
            width: Some(8),
            signed: true,
        };
        assert_eq!(lit.to_string(), "8'sd5");
    }

    #[test]
    fn test_find_const_skips_types() {
        let pkg = PackageDecl::new(
            "Defs",
            vec![
                PackageItem::TypeDef(TypeDefDecl {
                    name: "word_t".to_string(),
                    ty: TypeExpr::logic(Expr::int(16)),
                }),
                PackageItem::Const(ConstDecl::new("WIDTH", None, Expr::int(16))),
            ],
        );
        assert_eq!(pkg.find_const("WIDTH").map(|(i, _)| i), Some(1));
        assert!(pkg.find_const("word_t").is_none());
        assert!(pkg.find_item("word_t").is_some_and(|(_, item)| item.is_type()));
    }
}
