//! Generic Instantiation Engine
//!
//! Drives the pass over one source unit. Descriptions are walked in source
//! order; every qualified reference to a generic package binds its arguments
//! and looks up or allocates an instance. New instances are queued. Reading a
//! constant of an instance evaluates that constant alone, so a cycle is only
//! reported when constant evaluation itself loops. Queued bodies are
//! specialized once the current item is done, and an instance reached from
//! another instance's body completes before it.
//!
//! Example:
//! ```text
//! package B::<N: const> { const Y = N * 2; }
//! package A::<M: const> { const X = B::<M>::Y + 1; }
//! module Top { const C = A::<3>::X; }
//! ```
//! Rewriting `Top` queues `__A__1`. Specializing it evaluates `X`, which
//! queues `__B__1` and reads `Y` directly; `__B__1` is then specialized before
//! `__A__1` completes with `X = 7`.

use crate::binder::{bind_arguments, coerce, value_type, ParameterValueSet};
use crate::config::InstantiationConfig;
use crate::error::{InstantiationError, InstantiationFailure, ResolveFailure};
use crate::mangle::{is_reserved_identifier, mangle, MangledName};
use crate::registry::{InstanceId, InstanceRegistry};
use crate::specializer::SpecializedPackage;
use indexmap::IndexMap;
use sable_frontend::ast::{
    ConstDecl, Description, ModuleDecl, PackageDecl, QualifiedPath, SourceUnit,
};
use sable_frontend::{ConstEvaluator, ConstResolver, ConstValue, EvalError, SourceSpan};
use std::collections::HashMap;
use tracing::{debug, trace, warn};

/// Scope a constant is declared in
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum ScopeKey {
    /// Body of a specialized generic package
    Instance { base: String, id: InstanceId },
    /// Body of a plain package
    Package(String),
    /// Body of a module
    Module(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct ConstKey {
    scope: ScopeKey,
    name: String,
}

/// Evaluation state of one constant
#[derive(Debug, Clone)]
enum EvalState {
    InProgress,
    Done(ConstValue),
    Failed(InstantiationError),
}

/// Specialization state of one instance
#[derive(Debug, Clone)]
pub(crate) enum InstanceState {
    /// Allocated, body not yet specialized
    Queued,
    InProgress,
    Done,
    Failed(InstantiationError),
}

/// Allocated instance waiting for its body to be specialized
#[derive(Debug, Clone)]
pub(crate) struct QueuedInstance<'a> {
    pub(crate) decl: &'a PackageDecl,
    pub(crate) id: InstanceId,
    pub(crate) name: MangledName,
}

/// Package a qualified reference resolves to
#[derive(Debug, Clone)]
pub(crate) enum PackageTarget<'a> {
    /// Specialized instance of a generic package
    Instance {
        decl: &'a PackageDecl,
        id: InstanceId,
        name: MangledName,
    },
    /// Plain package declared in the unit
    Plain(&'a PackageDecl),
    /// Package the unit does not declare
    Unknown,
}

/// Generic instantiation pass over one source unit
pub struct Instantiator<'a> {
    pub(crate) config: InstantiationConfig,
    unit: &'a SourceUnit,
    /// Generic package declarations by name
    pub(crate) generic_packages: IndexMap<&'a str, &'a PackageDecl>,
    /// Plain package declarations by name
    pub(crate) plain_packages: IndexMap<&'a str, &'a PackageDecl>,
    /// Module declarations by name
    modules: IndexMap<&'a str, &'a ModuleDecl>,
    pub(crate) registry: InstanceRegistry,
    pub(crate) instances: HashMap<MangledName, InstanceState>,
    /// Instances awaiting specialization, in allocation order
    pub(crate) queue: Vec<QueuedInstance<'a>>,
    /// Nesting level of every instance; top-level references are level 1
    pub(crate) levels: HashMap<MangledName, usize>,
    /// Completed instances in completion order
    pub(crate) specialized: Vec<SpecializedPackage>,
    const_states: HashMap<ConstKey, EvalState>,
    /// Constants currently being evaluated, outermost first
    eval_stack: Vec<ConstKey>,
    /// Level of the instance currently being worked on, 0 outside instances
    pub(crate) depth: usize,
    errors: Vec<InstantiationError>,
}

impl<'a> Instantiator<'a> {
    /// Index the declarations of a unit
    ///
    /// Declaration problems (duplicate names, reserved identifiers) are
    /// recorded and reported by [`Instantiator::run`].
    pub fn new(unit: &'a SourceUnit, config: InstantiationConfig) -> Self {
        let mut engine = Self {
            config,
            unit,
            generic_packages: IndexMap::new(),
            plain_packages: IndexMap::new(),
            modules: IndexMap::new(),
            registry: InstanceRegistry::new(),
            instances: HashMap::new(),
            queue: Vec::new(),
            levels: HashMap::new(),
            specialized: Vec::new(),
            const_states: HashMap::new(),
            eval_stack: Vec::new(),
            depth: 0,
            errors: Vec::new(),
        };

        for description in &unit.descriptions {
            let name = description.name();
            engine.check_identifier(name, description.span());

            let known = engine.generic_packages.contains_key(name)
                || engine.plain_packages.contains_key(name)
                || engine.modules.contains_key(name);
            if known {
                warn!(declaration = name, "duplicate top-level declaration ignored");
                engine.record(InstantiationError::DuplicateDeclaration {
                    name: name.to_string(),
                    site: description.span().clone(),
                });
                continue;
            }

            match description {
                Description::Package(package) => {
                    for param in &package.generics {
                        engine.check_identifier(&param.name, &param.span);
                    }
                    for item in &package.items {
                        engine.check_identifier(item.name(), &package.span);
                    }
                    if package.is_generic() {
                        engine.generic_packages.insert(name, package);
                    } else {
                        engine.plain_packages.insert(name, package);
                    }
                }
                Description::Module(module) => {
                    for item in &module.items {
                        engine.check_identifier(item.name(), &module.span);
                    }
                    engine.modules.insert(name, module);
                }
            }
        }

        engine
    }

    /// Rewrite the unit and specialize every instance it references
    pub fn run(mut self) -> Result<InstantiatedUnit, InstantiationFailure> {
        let unit = self.unit;
        let mut descriptions = Vec::with_capacity(unit.descriptions.len());

        for description in &unit.descriptions {
            match description {
                Description::Package(package) if package.is_generic() => {}
                Description::Package(package) => {
                    let first = self
                        .plain_packages
                        .get(package.name.as_str())
                        .is_some_and(|decl| std::ptr::eq(*decl, package));
                    if first {
                        let rewritten = self.rewrite_plain_package(package);
                        descriptions.push(Description::Package(rewritten));
                    }
                }
                Description::Module(module) => {
                    let first = self
                        .modules
                        .get(module.name.as_str())
                        .is_some_and(|decl| std::ptr::eq(*decl, module));
                    if first {
                        let rewritten = self.rewrite_module(module);
                        descriptions.push(Description::Module(rewritten));
                    }
                }
            }
        }

        self.specialize_queued();

        if !self.errors.is_empty() {
            return Err(InstantiationFailure {
                errors: self.errors,
                packages: self.specialized,
            });
        }

        Ok(InstantiatedUnit {
            name: unit.name.clone(),
            descriptions,
            packages: self.specialized,
            registry: self.registry,
        })
    }

    /// Record an error, ignoring exact repeats
    pub(crate) fn record(&mut self, error: InstantiationError) {
        if !self.errors.contains(&error) {
            self.errors.push(error);
        }
    }

    fn check_identifier(&mut self, name: &str, site: &SourceSpan) {
        if is_reserved_identifier(name) {
            self.record(InstantiationError::ReservedIdentifier {
                name: name.to_string(),
                site: site.clone(),
            });
        }
    }

    // ------------------------------------------------------------------
    // Scopes
    // ------------------------------------------------------------------

    /// Constant declared in a scope, with its position in the body
    pub(crate) fn lookup_const(
        &self,
        scope: &ScopeKey,
        name: &str,
    ) -> Option<(usize, &'a ConstDecl)> {
        match scope {
            ScopeKey::Instance { base, .. } => {
                let decl: &'a PackageDecl = *self.generic_packages.get(base.as_str())?;
                decl.find_const(name)
            }
            ScopeKey::Package(package) => {
                let decl: &'a PackageDecl = *self.plain_packages.get(package.as_str())?;
                decl.find_const(name)
            }
            ScopeKey::Module(module) => {
                let decl: &'a ModuleDecl = *self.modules.get(module.as_str())?;
                decl.find_const(name)
            }
        }
    }

    /// Whether a scope declares anything under this name
    fn scope_declares(&self, scope: &ScopeKey, name: &str) -> bool {
        match scope {
            ScopeKey::Instance { base, .. } => self
                .generic_packages
                .get(base.as_str())
                .is_some_and(|decl| decl.find_item(name).is_some()),
            ScopeKey::Package(package) => self
                .plain_packages
                .get(package.as_str())
                .is_some_and(|decl| decl.find_item(name).is_some()),
            ScopeKey::Module(module) => self
                .modules
                .get(module.as_str())
                .is_some_and(|decl| decl.declares(name)),
        }
    }

    /// Evaluator with the parameters of an instance scope bound
    pub(crate) fn evaluator_for(
        &self,
        scope: &ScopeKey,
    ) -> Result<ConstEvaluator, InstantiationError> {
        let mut evaluator = ConstEvaluator::with_default_width(self.config.default_integer_width);
        if let ScopeKey::Instance { base, id } = scope {
            let values = self.registry.resolve(base, *id)?;
            if let Some(decl) = self.generic_packages.get(base.as_str()) {
                evaluator.bind_all(
                    decl.generics
                        .iter()
                        .zip(values.iter())
                        .map(|(param, value)| (param.name.clone(), value.clone())),
                );
            }
        }
        Ok(evaluator)
    }

    /// Source-syntax label of a scope, used in cycle chains
    fn scope_label(&self, scope: &ScopeKey) -> String {
        match scope {
            ScopeKey::Instance { base, id } => match self.registry.resolve(base, *id) {
                Ok(values) => format!("{}::<{}>", base, values),
                Err(_) => mangle(base, *id).to_string(),
            },
            ScopeKey::Package(name) | ScopeKey::Module(name) => name.clone(),
        }
    }

    fn const_label(&self, key: &ConstKey) -> String {
        format!("{}::{}", self.scope_label(&key.scope), key.name)
    }

    // ------------------------------------------------------------------
    // Constant evaluation
    // ------------------------------------------------------------------

    /// Value of a constant declared in `scope`, evaluating it on first use
    ///
    /// `site` is the reference that asked for the value.
    pub(crate) fn eval_constant(
        &mut self,
        scope: &ScopeKey,
        name: &str,
        site: &SourceSpan,
    ) -> Result<ConstValue, InstantiationError> {
        let key = ConstKey {
            scope: scope.clone(),
            name: name.to_string(),
        };

        match self.const_states.get(&key) {
            Some(EvalState::Done(value)) => return Ok(value.clone()),
            Some(EvalState::Failed(error)) => return Err(error.clone()),
            Some(EvalState::InProgress) => {
                let start = self
                    .eval_stack
                    .iter()
                    .position(|k| *k == key)
                    .unwrap_or(0);
                let chain = self.eval_stack[start..]
                    .iter()
                    .chain(std::iter::once(&key))
                    .map(|k| self.const_label(k))
                    .collect();
                return Err(InstantiationError::CyclicConstantDependency {
                    chain,
                    site: site.clone(),
                });
            }
            None => {}
        }

        let (position, decl) = self.lookup_const(scope, name).ok_or_else(|| {
            InstantiationError::UnresolvedDependency {
                name: format!("{}::{}", self.scope_label(scope), name),
                site: site.clone(),
            }
        })?;

        trace!(constant = %self.const_label(&key), "evaluating constant");
        self.const_states.insert(key.clone(), EvalState::InProgress);
        self.eval_stack.push(key.clone());
        let outer_depth = self.depth;
        if let ScopeKey::Instance { base, id } = scope {
            if let Some(&level) = self.levels.get(&mangle(base, *id)) {
                self.depth = level;
            }
        }
        let result = self.evaluate_const_decl(scope, position, decl);
        self.depth = outer_depth;
        self.eval_stack.pop();

        let state = match &result {
            Ok(value) => EvalState::Done(value.clone()),
            Err(error) => EvalState::Failed(error.clone()),
        };
        self.const_states.insert(key, state);
        result
    }

    fn evaluate_const_decl(
        &mut self,
        scope: &ScopeKey,
        position: usize,
        decl: &'a ConstDecl,
    ) -> Result<ConstValue, InstantiationError> {
        let evaluator = self.evaluator_for(scope)?;
        let what = format!("constant '{}'", decl.name);

        let value = {
            let mut resolver = ScopeResolver::new(self, scope, position, &decl.span);
            evaluator
                .eval(&decl.value, &mut resolver)
                .map_err(|e| e.into_error(&what, &decl.span))?
        };

        let Some(ty) = &decl.ty else {
            return Ok(value);
        };
        let expected = {
            let mut resolver = ScopeResolver::new(self, scope, position, &decl.span);
            value_type(ty, &evaluator, &mut resolver).map_err(|e| {
                e.into_error(&format!("type of constant '{}'", decl.name), &decl.span)
            })?
        };
        match expected {
            Some(expected) => coerce(value, expected, &what, &decl.span),
            None => Ok(value),
        }
    }

    /// Value of a package-qualified constant (`Pkg::<args>::NAME`)
    fn resolve_constant_path(
        &mut self,
        path: &QualifiedPath,
        scope: &ScopeKey,
        position: usize,
    ) -> Result<ConstValue, InstantiationError> {
        let target_scope = match self.resolve_package_ref(path, scope, position)? {
            PackageTarget::Instance { decl, id, .. } => ScopeKey::Instance {
                base: decl.name.clone(),
                id,
            },
            PackageTarget::Plain(decl) => ScopeKey::Package(decl.name.clone()),
            PackageTarget::Unknown => {
                return Err(InstantiationError::UnresolvedDependency {
                    name: path.to_string(),
                    site: path.span.clone(),
                })
            }
        };

        let member = match path.members.as_slice() {
            [member] => member,
            _ => {
                return Err(InstantiationError::NotConstant {
                    what: format!("'{}'", path),
                    reason: "reference does not name a package constant".to_string(),
                    site: path.span.clone(),
                })
            }
        };

        if self.lookup_const(&target_scope, member).is_none() {
            if self.scope_declares(&target_scope, member) {
                return Err(InstantiationError::NotConstant {
                    what: format!("'{}'", path),
                    reason: format!("'{}' is not a constant", member),
                    site: path.span.clone(),
                });
            }
            return Err(InstantiationError::UnresolvedDependency {
                name: path.to_string(),
                site: path.span.clone(),
            });
        }

        self.eval_constant(&target_scope, member, &path.span)
    }

    /// Resolve the package part of a qualified reference
    ///
    /// Generic arguments are bound in `scope`, seeing constants declared
    /// before `position`. A generic package is instantiated as needed.
    pub(crate) fn resolve_package_ref(
        &mut self,
        path: &QualifiedPath,
        scope: &ScopeKey,
        position: usize,
    ) -> Result<PackageTarget<'a>, InstantiationError> {
        if let Some(decl) = self.generic_packages.get(path.package.as_str()).copied() {
            let evaluator = self.evaluator_for(scope)?;
            let values = {
                let mut resolver = ScopeResolver::new(self, scope, position, &path.span);
                bind_arguments(decl, &path.generic_args, &evaluator, &mut resolver, &path.span)?
            };
            let id = self.instantiate(decl, values, &path.span)?;
            return Ok(PackageTarget::Instance {
                decl,
                id,
                name: mangle(&decl.name, id),
            });
        }

        let plain = self.plain_packages.get(path.package.as_str()).copied();
        if !path.generic_args.is_empty() {
            return Err(match plain {
                Some(decl) => InstantiationError::ArityMismatch {
                    package: decl.name.clone(),
                    expected: 0,
                    found: path.generic_args.len(),
                    site: path.span.clone(),
                },
                None => InstantiationError::UnresolvedDependency {
                    name: path.package.clone(),
                    site: path.span.clone(),
                },
            });
        }

        Ok(match plain {
            Some(decl) => PackageTarget::Plain(decl),
            None => PackageTarget::Unknown,
        })
    }

    /// Instance id for a bound value set
    ///
    /// A new instance is queued for specialization one level below the
    /// current one. Its constants can be read before its body is built.
    pub(crate) fn instantiate(
        &mut self,
        decl: &'a PackageDecl,
        values: ParameterValueSet,
        site: &SourceSpan,
    ) -> Result<InstanceId, InstantiationError> {
        let allocation = self.registry.lookup_or_allocate(&decl.name, values)?;
        let id = allocation.id();
        let name = mangle(&decl.name, id);

        if !allocation.is_new() {
            return match self.instances.get(&name) {
                Some(InstanceState::Failed(error)) => Err(error.clone()),
                _ => {
                    trace!(instance = %name, "reusing generic instance");
                    Ok(id)
                }
            };
        }

        debug!(package = %decl.name, instance = %name, "allocated generic instance");
        let level = self.depth + 1;
        if level > self.config.max_instantiation_depth {
            let error = InstantiationError::RecursionLimit {
                package: decl.name.clone(),
                limit: self.config.max_instantiation_depth,
                site: site.clone(),
            };
            self.instances.insert(name, InstanceState::Failed(error.clone()));
            return Err(error);
        }

        self.levels.insert(name.clone(), level);
        self.instances.insert(name.clone(), InstanceState::Queued);
        self.queue.push(QueuedInstance { decl, id, name });
        Ok(id)
    }
}

/// Resolves names for the evaluator inside one scope
///
/// Bare identifiers may name constants declared before `position`;
/// qualified paths may name any constant of another package.
pub(crate) struct ScopeResolver<'e, 'a> {
    engine: &'e mut Instantiator<'a>,
    scope: ScopeKey,
    position: usize,
    site: SourceSpan,
}

impl<'e, 'a> ScopeResolver<'e, 'a> {
    pub(crate) fn new(
        engine: &'e mut Instantiator<'a>,
        scope: &ScopeKey,
        position: usize,
        site: &SourceSpan,
    ) -> Self {
        Self {
            engine,
            scope: scope.clone(),
            position,
            site: site.clone(),
        }
    }
}

impl ConstResolver for ScopeResolver<'_, '_> {
    type Error = ResolveFailure;

    fn resolve_ident(&mut self, name: &str) -> Result<ConstValue, ResolveFailure> {
        match self.engine.lookup_const(&self.scope, name) {
            Some((index, _)) if index < self.position => {
                Ok(self.engine.eval_constant(&self.scope, name, &self.site)?)
            }
            None if self.engine.scope_declares(&self.scope, name) => Err(EvalError::NotConstant(
                format!("'{}' is not a constant", name),
            )
            .into()),
            _ => Err(EvalError::UndefinedSymbol(name.to_string()).into()),
        }
    }

    fn resolve_path(&mut self, path: &QualifiedPath) -> Result<ConstValue, ResolveFailure> {
        Ok(self
            .engine
            .resolve_constant_path(path, &self.scope, self.position)?)
    }
}

/// Output of a successful pass
#[derive(Debug, Clone)]
pub struct InstantiatedUnit {
    /// Unit name
    pub name: String,
    /// Plain packages and modules with every generic reference rewritten
    pub descriptions: Vec<Description>,
    /// Specialized instances, dependencies before dependents
    pub packages: Vec<SpecializedPackage>,
    /// Every allocated instance
    pub registry: InstanceRegistry,
}

impl InstantiatedUnit {
    /// Specialized package by mangled name
    pub fn package(&self, name: &str) -> Option<&SpecializedPackage> {
        self.packages.iter().find(|p| p.name.as_str() == name)
    }

    /// Instances of one base package in id order
    pub fn instances_of(&self, base: &str) -> Vec<&SpecializedPackage> {
        let mut instances: Vec<_> = self
            .packages
            .iter()
            .filter(|p| p.base_name == base)
            .collect();
        instances.sort_by_key(|p| p.id);
        instances
    }

    /// Flatten into a generic-free unit: specialized packages first, then
    /// the rewritten descriptions
    pub fn into_source_unit(self) -> SourceUnit {
        let mut descriptions: Vec<Description> = self
            .packages
            .iter()
            .map(|p| Description::Package(p.to_decl()))
            .collect();
        descriptions.extend(self.descriptions);
        SourceUnit {
            name: self.name,
            descriptions,
        }
    }
}

/// Run generic instantiation over a source unit
pub fn instantiate(
    unit: &SourceUnit,
    config: &InstantiationConfig,
) -> Result<InstantiatedUnit, InstantiationFailure> {
    Instantiator::new(unit, config.clone()).run()
}
