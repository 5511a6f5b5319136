//! Reference Rewriter
//!
//! Rewrites every qualified reference `Pkg::<args>::Member` to
//! `__Pkg__<id>::Member`, instantiating the package on first use. Member
//! paths (constant, type, variant and field names) are never changed.
//!
//! Inside a specialized body the same walk also replaces generic parameters
//! with their bound values and folds widths to literals.

use crate::engine::{Instantiator, PackageTarget, ScopeKey, ScopeResolver};
use crate::error::InstantiationError;
use sable_frontend::ast::{
    ConstDecl, EnumDecl, EnumVariant, Expr, FunctionDecl, FunctionParam, LetDecl, ModuleDecl,
    ModuleItem, PackageDecl, PackageItem, QualifiedPath, Statement, StructDecl, StructField,
    TernaryExpr, TypeDefDecl, TypeExpr, VarDecl,
};
use sable_frontend::{ConstEvaluator, ConstValue, SourceSpan};
use std::collections::HashSet;

/// Where and how a piece of AST is rewritten
#[derive(Clone)]
pub(crate) struct RewriteContext<'c> {
    scope: &'c ScopeKey,
    /// Constants before this position are visible to bare identifiers
    position: usize,
    /// Evaluator holding the scope's parameter bindings
    evaluator: &'c ConstEvaluator,
    /// Location reported for errors without a closer span
    site: &'c SourceSpan,
    /// Replace generic parameters with their values
    substitute: bool,
    /// Fold widths, lengths and enum encodings to literals
    fold: bool,
    /// Function parameters and locals hiding generic parameters
    shadowed: HashSet<String>,
}

impl<'c> RewriteContext<'c> {
    /// Context for the body of a specialized instance
    pub(crate) fn instance(
        scope: &'c ScopeKey,
        position: usize,
        evaluator: &'c ConstEvaluator,
        site: &'c SourceSpan,
    ) -> Self {
        Self {
            scope,
            position,
            evaluator,
            site,
            substitute: true,
            fold: true,
            shadowed: HashSet::new(),
        }
    }

    /// Context for plain packages and modules, where only references change
    pub(crate) fn consumer(
        scope: &'c ScopeKey,
        position: usize,
        evaluator: &'c ConstEvaluator,
        site: &'c SourceSpan,
    ) -> Self {
        Self {
            substitute: false,
            fold: false,
            ..Self::instance(scope, position, evaluator, site)
        }
    }

    fn parameter(&self, name: &str) -> Option<&ConstValue> {
        if !self.substitute || self.shadowed.contains(name) {
            return None;
        }
        self.evaluator.binding(name)
    }

    fn folds(&self, expr: &Expr) -> bool {
        self.fold && (self.shadowed.is_empty() || !mentions_any(expr, &self.shadowed))
    }
}

/// Whether an expression uses any of the given identifiers
fn mentions_any(expr: &Expr, names: &HashSet<String>) -> bool {
    match expr {
        Expr::Literal(_) => false,
        Expr::Ident(name) => names.contains(name),
        Expr::Path(path) => path.generic_args.iter().any(|arg| mentions_any(arg, names)),
        Expr::Binary(bin) => mentions_any(&bin.left, names) || mentions_any(&bin.right, names),
        Expr::Unary(un) => mentions_any(&un.operand, names),
        Expr::Call(call) => call.args.iter().any(|arg| mentions_any(arg, names)),
        Expr::Ternary(t) => {
            mentions_any(&t.cond, names)
                || mentions_any(&t.then_expr, names)
                || mentions_any(&t.else_expr, names)
        }
        Expr::Field { base, .. } => mentions_any(base, names),
    }
}

/// First member of a reference must name an item of the package
fn check_member(decl: &PackageDecl, path: &QualifiedPath) -> Result<(), InstantiationError> {
    match path.members.first() {
        Some(member) if decl.find_item(member).is_none() => {
            Err(InstantiationError::UnresolvedDependency {
                name: path.to_string(),
                site: path.span.clone(),
            })
        }
        _ => Ok(()),
    }
}

impl<'a> Instantiator<'a> {
    /// Rewrite a plain package item by item, recording failures
    pub(crate) fn rewrite_plain_package(&mut self, package: &'a PackageDecl) -> PackageDecl {
        let scope = ScopeKey::Package(package.name.clone());
        let evaluator = ConstEvaluator::with_default_width(self.config.default_integer_width);
        let mut items = Vec::with_capacity(package.items.len());

        for (index, item) in package.items.iter().enumerate() {
            let (position, site) = match item {
                PackageItem::Const(constant) => (index, &constant.span),
                _ => (package.items.len(), &package.span),
            };
            let ctx = RewriteContext::consumer(&scope, position, &evaluator, site);
            match self.rewrite_package_item(item, &ctx) {
                Ok(item) => items.push(item),
                Err(error) => self.record(error),
            }
            self.specialize_queued();
        }

        PackageDecl::new(package.name.clone(), items).at(package.span.clone())
    }

    /// Rewrite a module item by item, recording failures
    pub(crate) fn rewrite_module(&mut self, module: &'a ModuleDecl) -> ModuleDecl {
        let scope = ScopeKey::Module(module.name.clone());
        let evaluator = ConstEvaluator::with_default_width(self.config.default_integer_width);
        let mut items = Vec::with_capacity(module.items.len());

        for (index, item) in module.items.iter().enumerate() {
            let (position, site) = match item {
                ModuleItem::Const(constant) => (index, &constant.span),
                _ => (module.items.len(), &module.span),
            };
            let ctx = RewriteContext::consumer(&scope, position, &evaluator, site);
            match self.rewrite_module_item(item, &ctx) {
                Ok(item) => items.push(item),
                Err(error) => self.record(error),
            }
            self.specialize_queued();
        }

        ModuleDecl {
            name: module.name.clone(),
            items,
            span: module.span.clone(),
        }
    }

    fn rewrite_module_item(
        &mut self,
        item: &ModuleItem,
        ctx: &RewriteContext<'_>,
    ) -> Result<ModuleItem, InstantiationError> {
        Ok(match item {
            ModuleItem::Const(constant) => ModuleItem::Const(self.rewrite_const(constant, ctx)?),
            ModuleItem::Let(decl) => ModuleItem::Let(LetDecl {
                name: decl.name.clone(),
                ty: self.rewrite_type(&decl.ty, ctx)?,
                value: self.rewrite_expr(&decl.value, ctx)?,
            }),
            ModuleItem::Var(decl) => ModuleItem::Var(VarDecl {
                name: decl.name.clone(),
                ty: self.rewrite_type(&decl.ty, ctx)?,
            }),
        })
    }

    pub(crate) fn rewrite_package_item(
        &mut self,
        item: &PackageItem,
        ctx: &RewriteContext<'_>,
    ) -> Result<PackageItem, InstantiationError> {
        Ok(match item {
            PackageItem::Const(constant) => PackageItem::Const(self.rewrite_const(constant, ctx)?),
            PackageItem::TypeDef(def) => PackageItem::TypeDef(TypeDefDecl {
                name: def.name.clone(),
                ty: self.rewrite_type(&def.ty, ctx)?,
            }),
            PackageItem::Struct(decl) => {
                let mut fields = Vec::with_capacity(decl.fields.len());
                for field in &decl.fields {
                    fields.push(StructField {
                        name: field.name.clone(),
                        ty: self.rewrite_type(&field.ty, ctx)?,
                    });
                }
                PackageItem::Struct(StructDecl {
                    name: decl.name.clone(),
                    kind: decl.kind,
                    fields,
                })
            }
            PackageItem::Enum(decl) => PackageItem::Enum(self.rewrite_enum(decl, ctx)?),
            PackageItem::Function(decl) => PackageItem::Function(self.rewrite_function(decl, ctx)?),
        })
    }

    fn rewrite_const(
        &mut self,
        constant: &ConstDecl,
        ctx: &RewriteContext<'_>,
    ) -> Result<ConstDecl, InstantiationError> {
        let ty = match &constant.ty {
            Some(ty) => Some(self.rewrite_type(ty, ctx)?),
            None => None,
        };
        Ok(ConstDecl {
            name: constant.name.clone(),
            ty,
            value: self.rewrite_expr(&constant.value, ctx)?,
            span: constant.span.clone(),
        })
    }

    fn rewrite_enum(
        &mut self,
        decl: &EnumDecl,
        ctx: &RewriteContext<'_>,
    ) -> Result<EnumDecl, InstantiationError> {
        let base = match &decl.base {
            Some(ty) => Some(self.rewrite_type(ty, ctx)?),
            None => None,
        };
        let mut variants = Vec::with_capacity(decl.variants.len());
        for variant in &decl.variants {
            let value = match &variant.value {
                Some(expr) if ctx.folds(expr) => {
                    let value = self.fold_value(expr, ctx)?;
                    Some(value.to_expr(ctx.evaluator.default_width()))
                }
                Some(expr) => Some(self.rewrite_expr(expr, ctx)?),
                None => None,
            };
            variants.push(EnumVariant {
                name: variant.name.clone(),
                value,
            });
        }
        Ok(EnumDecl {
            name: decl.name.clone(),
            base,
            variants,
        })
    }

    fn rewrite_function(
        &mut self,
        decl: &FunctionDecl,
        ctx: &RewriteContext<'_>,
    ) -> Result<FunctionDecl, InstantiationError> {
        let mut params = Vec::with_capacity(decl.params.len());
        for param in &decl.params {
            params.push(FunctionParam {
                name: param.name.clone(),
                ty: self.rewrite_type(&param.ty, ctx)?,
            });
        }
        let ret = match &decl.ret {
            Some(ty) => Some(self.rewrite_type(ty, ctx)?),
            None => None,
        };

        let mut body_ctx = ctx.clone();
        body_ctx
            .shadowed
            .extend(decl.params.iter().map(|param| param.name.clone()));
        let body = self.rewrite_statements(&decl.body, &body_ctx)?;

        Ok(FunctionDecl {
            name: decl.name.clone(),
            params,
            ret,
            body,
        })
    }

    /// Rewrite a statement list; each `let` hides parameters for the
    /// statements after it
    fn rewrite_statements(
        &mut self,
        statements: &[Statement],
        ctx: &RewriteContext<'_>,
    ) -> Result<Vec<Statement>, InstantiationError> {
        let mut ctx = ctx.clone();
        let mut rewritten = Vec::with_capacity(statements.len());

        for statement in statements {
            let statement = match statement {
                Statement::Let { name, ty, value } => {
                    let ty = self.rewrite_type(ty, &ctx)?;
                    let value = self.rewrite_expr(value, &ctx)?;
                    ctx.shadowed.insert(name.clone());
                    Statement::Let {
                        name: name.clone(),
                        ty,
                        value,
                    }
                }
                Statement::Assign { target, value } => Statement::Assign {
                    target: target.clone(),
                    value: self.rewrite_expr(value, &ctx)?,
                },
                Statement::Return(value) => Statement::Return(self.rewrite_expr(value, &ctx)?),
                Statement::If {
                    cond,
                    then_body,
                    else_body,
                } => Statement::If {
                    cond: self.rewrite_expr(cond, &ctx)?,
                    then_body: self.rewrite_statements(then_body, &ctx)?,
                    else_body: self.rewrite_statements(else_body, &ctx)?,
                },
            };
            rewritten.push(statement);
        }

        Ok(rewritten)
    }

    pub(crate) fn rewrite_type(
        &mut self,
        ty: &TypeExpr,
        ctx: &RewriteContext<'_>,
    ) -> Result<TypeExpr, InstantiationError> {
        Ok(match ty {
            TypeExpr::Logic(Some(width)) => {
                TypeExpr::Logic(Some(Box::new(self.rewrite_size(width, ctx)?)))
            }
            TypeExpr::Bit(Some(width)) => {
                TypeExpr::Bit(Some(Box::new(self.rewrite_size(width, ctx)?)))
            }
            TypeExpr::Array { element, len } => TypeExpr::Array {
                element: Box::new(self.rewrite_type(element, ctx)?),
                len: Box::new(self.rewrite_size(len, ctx)?),
            },
            TypeExpr::Path(path) => TypeExpr::Path(self.rewrite_path(path, ctx)?),
            TypeExpr::Logic(None)
            | TypeExpr::Bit(None)
            | TypeExpr::Int(_)
            | TypeExpr::Bool
            | TypeExpr::Named(_) => ty.clone(),
        })
    }

    /// Width or length, folded to a literal where the context folds
    fn rewrite_size(
        &mut self,
        expr: &Expr,
        ctx: &RewriteContext<'_>,
    ) -> Result<Expr, InstantiationError> {
        if !ctx.folds(expr) {
            return self.rewrite_expr(expr, ctx);
        }
        let mut resolver = ScopeResolver::new(self, ctx.scope, ctx.position, ctx.site);
        let size = ctx
            .evaluator
            .eval_size(expr, &mut resolver)
            .map_err(|e| e.into_error(&format!("size '{}'", expr), ctx.site))?;
        Ok(Expr::int(size as u128))
    }

    fn fold_value(
        &mut self,
        expr: &Expr,
        ctx: &RewriteContext<'_>,
    ) -> Result<ConstValue, InstantiationError> {
        let mut resolver = ScopeResolver::new(self, ctx.scope, ctx.position, ctx.site);
        ctx.evaluator
            .eval(expr, &mut resolver)
            .map_err(|e| e.into_error(&format!("value '{}'", expr), ctx.site))
    }

    pub(crate) fn rewrite_expr(
        &mut self,
        expr: &Expr,
        ctx: &RewriteContext<'_>,
    ) -> Result<Expr, InstantiationError> {
        Ok(match expr {
            Expr::Literal(_) => expr.clone(),
            Expr::Ident(name) => match ctx.parameter(name) {
                Some(value) => value.to_expr(ctx.evaluator.default_width()),
                None => expr.clone(),
            },
            Expr::Path(path) => Expr::Path(self.rewrite_path(path, ctx)?),
            Expr::Binary(bin) => Expr::binary(
                bin.op,
                self.rewrite_expr(&bin.left, ctx)?,
                self.rewrite_expr(&bin.right, ctx)?,
            ),
            Expr::Unary(un) => Expr::unary(un.op, self.rewrite_expr(&un.operand, ctx)?),
            Expr::Call(call) => {
                let mut args = Vec::with_capacity(call.args.len());
                for arg in &call.args {
                    args.push(self.rewrite_expr(arg, ctx)?);
                }
                Expr::call(call.function.clone(), args)
            }
            Expr::Ternary(t) => Expr::Ternary(TernaryExpr {
                cond: Box::new(self.rewrite_expr(&t.cond, ctx)?),
                then_expr: Box::new(self.rewrite_expr(&t.then_expr, ctx)?),
                else_expr: Box::new(self.rewrite_expr(&t.else_expr, ctx)?),
            }),
            Expr::Field { base, field } => {
                Expr::field(self.rewrite_expr(base, ctx)?, field.clone())
            }
        })
    }

    /// Point a reference at the mangled instance it resolves to
    ///
    /// References to packages the unit does not declare are kept as written.
    pub(crate) fn rewrite_path(
        &mut self,
        path: &QualifiedPath,
        ctx: &RewriteContext<'_>,
    ) -> Result<QualifiedPath, InstantiationError> {
        match self.resolve_package_ref(path, ctx.scope, ctx.position)? {
            PackageTarget::Instance { decl, name, .. } => {
                check_member(decl, path)?;
                Ok(QualifiedPath {
                    package: name.to_string(),
                    generic_args: Vec::new(),
                    members: path.members.clone(),
                    span: path.span.clone(),
                })
            }
            PackageTarget::Plain(decl) => {
                check_member(decl, path)?;
                Ok(path.clone())
            }
            PackageTarget::Unknown => Ok(path.clone()),
        }
    }
}
