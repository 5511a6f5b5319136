//! Package Specializer
//!
//! Produces the parameter-free body of one generic package instance.
//! Constants become literals of their evaluated value; widths, array lengths
//! and enum encodings are folded; every other use of a generic parameter is
//! replaced by its bound value. Declaration names and order are kept.

use crate::binder::ParameterValueSet;
use crate::engine::{InstanceState, Instantiator, QueuedInstance, ScopeKey};
use crate::error::InstantiationError;
use crate::mangle::MangledName;
use crate::registry::InstanceId;
use crate::rewriter::RewriteContext;
use indexmap::IndexMap;
use sable_frontend::ast::{ConstDecl, PackageDecl, PackageItem};
use sable_frontend::{ConstValue, SourceSpan};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Fully substituted copy of a generic package for one argument binding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecializedPackage {
    /// Name of the generic package
    pub base_name: String,
    /// Instance number within the base package
    pub id: InstanceId,
    /// Name the instance is emitted and referenced under
    pub name: MangledName,
    /// Bound parameter values in declaration order
    pub arguments: ParameterValueSet,
    /// Evaluated constants in declaration order
    pub constants: IndexMap<String, ConstValue>,
    /// Specialized body
    pub items: Vec<PackageItem>,
    /// Location of the generic declaration
    pub span: SourceSpan,
}

impl SpecializedPackage {
    /// Value of a constant of this instance
    pub fn constant(&self, name: &str) -> Option<&ConstValue> {
        self.constants.get(name)
    }

    /// Body item by name
    pub fn item(&self, name: &str) -> Option<&PackageItem> {
        self.items.iter().find(|item| item.name() == name)
    }

    /// Plain package declaration under the mangled name
    pub fn to_decl(&self) -> PackageDecl {
        PackageDecl::new(self.name.as_str(), self.items.clone()).at(self.span.clone())
    }
}

type SpecializedBody = (IndexMap<String, ConstValue>, Vec<PackageItem>);

impl<'a> Instantiator<'a> {
    /// Specialize every queued instance, recording failures
    pub(crate) fn specialize_queued(&mut self) {
        while !self.queue.is_empty() {
            let next = self.queue.remove(0);
            if let Err(error) = self.materialize(next) {
                self.record(error);
            }
        }
    }

    /// Specialize instances queued after position `mark`
    fn specialize_queued_from(&mut self, mark: usize) -> Result<(), InstantiationError> {
        while self.queue.len() > mark {
            let next = self.queue.remove(mark);
            self.materialize(next)?;
        }
        Ok(())
    }

    /// Specialize a queued instance
    ///
    /// Instances first reached from this body are specialized before it
    /// completes, so dependencies precede their dependents in the output.
    pub(crate) fn materialize(
        &mut self,
        instance: QueuedInstance<'a>,
    ) -> Result<(), InstantiationError> {
        let QueuedInstance { decl, id, name } = instance;
        let level = self.levels.get(&name).copied().unwrap_or(1);
        self.instances.insert(name.clone(), InstanceState::InProgress);

        let outer_depth = std::mem::replace(&mut self.depth, level);
        let mark = self.queue.len();
        let result = self
            .specialize_body(decl, id)
            .and_then(|body| self.specialize_queued_from(mark).map(|()| body))
            .and_then(|(constants, items)| {
                let arguments = self.registry.resolve(&decl.name, id)?.clone();
                Ok(SpecializedPackage {
                    base_name: decl.name.clone(),
                    id,
                    name: name.clone(),
                    arguments,
                    constants,
                    items,
                    span: decl.span.clone(),
                })
            });
        self.depth = outer_depth;

        match result {
            Ok(package) => {
                debug!(
                    instance = %name,
                    arguments = %package.arguments,
                    "specialized generic instance"
                );
                self.instances.insert(name, InstanceState::Done);
                self.specialized.push(package);
                Ok(())
            }
            Err(error) => {
                self.instances.insert(name, InstanceState::Failed(error.clone()));
                Err(error)
            }
        }
    }

    /// Build the body of an instance; the first error aborts it
    fn specialize_body(
        &mut self,
        decl: &'a PackageDecl,
        id: InstanceId,
    ) -> Result<SpecializedBody, InstantiationError> {
        let scope = ScopeKey::Instance {
            base: decl.name.clone(),
            id,
        };
        let evaluator = self.evaluator_for(&scope)?;
        let mut constants = IndexMap::new();
        let mut items = Vec::with_capacity(decl.items.len());

        for (position, item) in decl.items.iter().enumerate() {
            let ctx = RewriteContext::instance(&scope, position, &evaluator, &decl.span);
            let specialized = match item {
                PackageItem::Const(constant) => {
                    let value = self.eval_constant(&scope, &constant.name, &constant.span)?;
                    let ty = match &constant.ty {
                        Some(ty) => Some(self.rewrite_type(ty, &ctx)?),
                        None => None,
                    };
                    constants.insert(constant.name.clone(), value.clone());
                    PackageItem::Const(ConstDecl {
                        name: constant.name.clone(),
                        ty,
                        value: value.to_expr(evaluator.default_width()),
                        span: constant.span.clone(),
                    })
                }
                other => self.rewrite_package_item(other, &ctx)?,
            };
            items.push(specialized);
        }

        Ok((constants, items))
    }
}
