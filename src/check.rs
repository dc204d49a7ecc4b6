//! Bidirectional type and effect checking
//!
//! Canonical programs carry annotations everywhere a type could be needed,
//! so checking needs no unification and no inference state. `synthesize`
//! computes a type bottom-up; `check_expr` pushes an expected type down into
//! positions that cannot stand alone, which is where the empty list literal
//! and the branch-agreement rules live.
//!
//! Effects are checked by a separate structural walk after a body has type
//! checked. The walk sums the declared effect sets of every applied callee;
//! the enclosing declaration must declare a superset of that sum.
//!
//! `Any` enters the algebra at exactly two seams, FFI externs and module
//! imports, and compares equal to everything from there out.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::rc::Rc;

use thiserror::Error;

use crate::ast::{
    BinOp, Decl, Effect, Expr, ExprKind, FunctionDecl, Literal, Pattern, PatternKind, PipeOp,
    Program, Span, TypeDef, TypeExpr, TypeExprKind, UnaryOp,
};
use crate::errors::find_similar;
use crate::types::{types_equal, Binding, EffectSet, Type, TypeEntry, TypeEnv, TypeRegistry};

// ============================================================================
// Errors
// ============================================================================

/// Where a mismatch happened, threaded into the message
#[derive(Debug, Clone)]
pub enum MismatchContext {
    Argument { index: usize, function: String },
    Condition,
    IfBranches,
    MatchArm { index: usize },
    ListElement,
    Operands { op: &'static str },
    Return { function: String },
    Binding { name: String },
    RecordField { name: String },
    FoldInit,
    Composition,
    PatternLiteral,
}

impl fmt::Display for MismatchContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MismatchContext::Argument { index, function } => {
                write!(f, "in argument {index} of `{function}`")
            }
            MismatchContext::Condition => write!(f, "in a condition"),
            MismatchContext::IfBranches => {
                write!(f, "in the branches of an if-expression")
            }
            MismatchContext::MatchArm { index } => write!(f, "in match arm {index}"),
            MismatchContext::ListElement => write!(f, "in a list element"),
            MismatchContext::Operands { op } => write!(f, "in the operands of `{op}`"),
            MismatchContext::Return { function } => {
                write!(f, "in the body of `{function}`")
            }
            MismatchContext::Binding { name } => write!(f, "in the binding of `{name}`"),
            MismatchContext::RecordField { name } => write!(f, "in record field `{name}`"),
            MismatchContext::FoldInit => write!(f, "in the initial value of a fold"),
            MismatchContext::Composition => write!(f, "in a function composition"),
            MismatchContext::PatternLiteral => write!(f, "in a literal pattern"),
        }
    }
}

fn fmt_context(context: &Option<MismatchContext>) -> String {
    match context {
        Some(c) => format!(" {c}"),
        None => String::new(),
    }
}

fn fmt_suggestions(suggestions: &[String]) -> String {
    match suggestions {
        [] => String::new(),
        [only] => format!("; did you mean `{only}`?"),
        many => {
            let quoted: Vec<String> = many.iter().map(|s| format!("`{s}`")).collect();
            format!("; did you mean one of {}?", quoted.join(", "))
        }
    }
}

#[derive(Error, Debug)]
pub enum TypeError {
    #[error("unknown name `{name}`{}", fmt_suggestions(.suggestions))]
    UnknownName {
        name: String,
        span: Span,
        suggestions: Vec<String>,
    },

    #[error("unknown type `{name}`{}", fmt_suggestions(.suggestions))]
    UnknownType {
        name: String,
        span: Span,
        suggestions: Vec<String>,
    },

    #[error("unknown constructor `{name}`{}", fmt_suggestions(.suggestions))]
    UnknownConstructor {
        name: String,
        span: Span,
        suggestions: Vec<String>,
    },

    #[error("type mismatch{}: expected `{expected}`, found `{found}`", fmt_context(.context))]
    Mismatch {
        expected: Type,
        found: Type,
        context: Option<MismatchContext>,
        span: Span,
    },

    #[error("expected a function, found `{found}`")]
    NotAFunction { found: Type, span: Span },

    #[error("`{function}` expects {expected} argument(s), found {found}")]
    WrongArity {
        function: String,
        expected: usize,
        found: usize,
        span: Span,
    },

    #[error("constructor `{name}` expects {expected} field(s), found {found}")]
    CtorArity {
        name: String,
        expected: usize,
        found: usize,
        span: Span,
    },

    #[error("no field `{field}` on `{record}`")]
    UnknownField {
        field: String,
        record: Type,
        span: Span,
    },

    #[error("expected a record, found `{found}`")]
    NotARecord { found: Type, span: Span },

    #[error("expected a list, found `{found}`")]
    NotAList { found: Type, span: Span },

    #[error("`{name}` is not a module namespace")]
    NotANamespace { name: String, span: Span },

    #[error("operator `{op}` cannot be applied to `{found}`")]
    BadOperand {
        op: &'static str,
        found: Type,
        span: Span,
    },

    #[error("cannot determine the element type of an empty list here; give the surrounding binding a type")]
    EmptyListNeedsContext { span: Span },

    #[error("match expression has no arms")]
    EmptyMatch { span: Span },

    #[error("type alias cycle involving `{name}`")]
    AliasCycle { name: String, span: Span },

    #[error("EffectMismatch: {} (`{function}` must declare every effect it performs)", .missing.join(", "))]
    EffectMismatch {
        function: String,
        missing: Vec<&'static str>,
        span: Span,
    },
}

impl TypeError {
    /// Stable diagnostic code for the external reporting layer
    pub fn code(&self) -> &'static str {
        match self {
            TypeError::UnknownName { .. } => "SLATE-TYPE-UNKNOWN-NAME",
            TypeError::UnknownType { .. } => "SLATE-TYPE-UNKNOWN-TYPE",
            TypeError::UnknownConstructor { .. } => "SLATE-TYPE-UNKNOWN-CONSTRUCTOR",
            TypeError::Mismatch { .. } => "SLATE-TYPE-MISMATCH",
            TypeError::NotAFunction { .. } => "SLATE-TYPE-NOT-A-FUNCTION",
            TypeError::WrongArity { .. } => "SLATE-TYPE-ARITY",
            TypeError::CtorArity { .. } => "SLATE-TYPE-CONSTRUCTOR-ARITY",
            TypeError::UnknownField { .. } => "SLATE-TYPE-UNKNOWN-FIELD",
            TypeError::NotARecord { .. } => "SLATE-TYPE-NOT-A-RECORD",
            TypeError::NotAList { .. } => "SLATE-TYPE-NOT-A-LIST",
            TypeError::NotANamespace { .. } => "SLATE-TYPE-NOT-A-NAMESPACE",
            TypeError::BadOperand { .. } => "SLATE-TYPE-BAD-OPERAND",
            TypeError::EmptyListNeedsContext { .. } => "SLATE-TYPE-EMPTY-LIST",
            TypeError::EmptyMatch { .. } => "SLATE-TYPE-EMPTY-MATCH",
            TypeError::AliasCycle { .. } => "SLATE-TYPE-ALIAS-CYCLE",
            TypeError::EffectMismatch { .. } => "SLATE-TYPE-EFFECT-MISMATCH",
        }
    }

    pub fn span(&self) -> &Span {
        match self {
            TypeError::UnknownName { span, .. }
            | TypeError::UnknownType { span, .. }
            | TypeError::UnknownConstructor { span, .. }
            | TypeError::Mismatch { span, .. }
            | TypeError::NotAFunction { span, .. }
            | TypeError::WrongArity { span, .. }
            | TypeError::CtorArity { span, .. }
            | TypeError::UnknownField { span, .. }
            | TypeError::NotARecord { span, .. }
            | TypeError::NotAList { span, .. }
            | TypeError::NotANamespace { span, .. }
            | TypeError::BadOperand { span, .. }
            | TypeError::EmptyListNeedsContext { span }
            | TypeError::EmptyMatch { span }
            | TypeError::AliasCycle { span, .. }
            | TypeError::EffectMismatch { span, .. } => span,
        }
    }

    /// Attach context to a bare mismatch; anything else passes through
    fn with_context(self, context: MismatchContext) -> TypeError {
        match self {
            TypeError::Mismatch {
                expected,
                found,
                context: None,
                span,
            } => TypeError::Mismatch {
                expected,
                found,
                context: Some(context),
                span,
            },
            other => other,
        }
    }
}

// ============================================================================
// Surface type resolution
// ============================================================================

const MAX_ALIAS_DEPTH: u32 = 64;

fn resolve_type(
    registry: &TypeRegistry,
    ty: &TypeExpr,
    type_params: &HashSet<String>,
) -> Result<Type, TypeError> {
    resolve_type_depth(registry, ty, type_params, 0)
}

fn resolve_type_depth(
    registry: &TypeRegistry,
    ty: &TypeExpr,
    type_params: &HashSet<String>,
    depth: u32,
) -> Result<Type, TypeError> {
    match &ty.node {
        TypeExprKind::Prim(p) => Ok(Type::from_prim(*p)),

        TypeExprKind::List(inner) => Ok(Type::list(resolve_type_depth(
            registry,
            inner,
            type_params,
            depth,
        )?)),

        TypeExprKind::Tuple(items) => {
            let resolved = items
                .iter()
                .map(|t| resolve_type_depth(registry, t, type_params, depth))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Type::Tuple(resolved))
        }

        TypeExprKind::Fn {
            params,
            effects,
            ret,
        } => {
            let resolved = params
                .iter()
                .map(|t| resolve_type_depth(registry, t, type_params, depth))
                .collect::<Result<Vec<_>, _>>()?;
            let ret = resolve_type_depth(registry, ret, type_params, depth)?;
            Ok(Type::Function {
                params: resolved,
                ret: Rc::new(ret),
                effects: effects.iter().copied().collect(),
            })
        }

        TypeExprKind::Record(fields) => {
            let resolved = fields
                .iter()
                .map(|(name, t)| {
                    Ok((
                        name.clone(),
                        resolve_type_depth(registry, t, type_params, depth)?,
                    ))
                })
                .collect::<Result<Vec<_>, TypeError>>()?;
            Ok(Type::record(resolved))
        }

        TypeExprKind::Named { name, args } => {
            // In-scope type parameters erase to Any: checking is monomorphic
            // over an annotated surface, and Any is the declared escape hatch.
            if type_params.contains(name) {
                return Ok(Type::Any);
            }
            match registry.get(name) {
                Some(TypeEntry::Alias { params, target }) => {
                    if depth >= MAX_ALIAS_DEPTH {
                        return Err(TypeError::AliasCycle {
                            name: name.clone(),
                            span: ty.span.clone(),
                        });
                    }
                    let scope: HashSet<String> = params.iter().cloned().collect();
                    resolve_type_depth(registry, target, &scope, depth + 1)
                }
                Some(_) => {
                    let resolved_args = args
                        .iter()
                        .map(|a| resolve_type_depth(registry, a, type_params, depth))
                        .collect::<Result<Vec<_>, _>>()?;
                    Ok(Type::Ctor {
                        name: name.clone(),
                        args: resolved_args,
                    })
                }
                None => {
                    // A lone capital letter reads as a type variable
                    let mut chars = name.chars();
                    if let (Some(c), None) = (chars.next(), chars.next()) {
                        if c.is_uppercase() {
                            return Ok(Type::Any);
                        }
                    }
                    let suggestions = find_similar(name, registry.names(), 2);
                    Err(TypeError::UnknownType {
                        name: name.clone(),
                        span: ty.span.clone(),
                        suggestions,
                    })
                }
            }
        }
    }
}

// ============================================================================
// Checker
// ============================================================================

#[derive(Debug, Clone)]
struct CtorInfo {
    type_name: String,
    fields: Vec<Type>,
}

/// The program-wide checking context, built by pass 1.
///
/// Pass 1 records every declared type, constructor, signature, const,
/// extern, and import before any body is looked at, so declaration order
/// within a category never affects what a body can see.
pub struct Checker {
    env: TypeEnv,
    constructors: HashMap<String, CtorInfo>,
    extern_members: HashMap<String, HashMap<String, Type>>,
    signatures: HashMap<String, Type>,
}

/// Check a full program: pass 1 registers signatures, pass 2 checks bodies
/// and effect declarations. Returns the name→type map of top-level
/// functions, consts, and sum-type constructors.
pub fn check_program(program: &Program) -> Result<HashMap<String, Type>, TypeError> {
    let checker = Checker::new(program)?;
    checker.check_bodies(program)?;
    Ok(checker.signatures)
}

impl Checker {
    pub fn new(program: &Program) -> Result<Checker, TypeError> {
        // Every declared type name lands in the registry before anything is
        // resolved, so mutually recursive types work without forward decls.
        let mut registry = TypeRegistry::new();
        for decl in &program.decls {
            if let Decl::Type(t) = decl {
                let entry = match &t.def {
                    TypeDef::Sum(variants) => TypeEntry::Sum {
                        params: t.params.clone(),
                        variants: variants
                            .iter()
                            .map(|v| (v.name.clone(), v.fields.clone()))
                            .collect(),
                    },
                    TypeDef::Record(fields) => TypeEntry::Record {
                        params: t.params.clone(),
                        fields: fields.iter().map(|f| (f.name.clone(), f.ty.clone())).collect(),
                    },
                    TypeDef::Alias(target) => TypeEntry::Alias {
                        params: t.params.clone(),
                        target: target.clone(),
                    },
                };
                registry.insert(t.name.clone(), entry);
            }
        }

        let mut env = TypeEnv::new(registry);
        let mut constructors = HashMap::new();
        let mut extern_members = HashMap::new();
        let mut signatures = HashMap::new();

        for decl in &program.decls {
            match decl {
                Decl::Type(t) => {
                    if let TypeDef::Sum(variants) = &t.def {
                        let scope: HashSet<String> = t.params.iter().cloned().collect();
                        for v in variants {
                            let fields = v
                                .fields
                                .iter()
                                .map(|f| resolve_type(env.registry(), f, &scope))
                                .collect::<Result<Vec<_>, _>>()?;
                            let result = Type::Ctor {
                                name: t.name.clone(),
                                args: vec![],
                            };
                            let ty = if fields.is_empty() {
                                result
                            } else {
                                Type::function(fields.clone(), result, EffectSet::new())
                            };
                            constructors.insert(
                                v.name.clone(),
                                CtorInfo {
                                    type_name: t.name.clone(),
                                    fields,
                                },
                            );
                            signatures.insert(v.name.clone(), ty.clone());
                            env.bind(v.name.clone(), Binding::value(ty));
                        }
                    }
                }

                Decl::Function(f) => {
                    let none = HashSet::new();
                    let params = f
                        .params
                        .iter()
                        .map(|p| match &p.ty {
                            Some(t) => resolve_type(env.registry(), t, &none),
                            None => Ok(Type::Any),
                        })
                        .collect::<Result<Vec<_>, _>>()?;
                    let ret = match &f.return_type {
                        Some(t) => resolve_type(env.registry(), t, &none)?,
                        None => Type::Any,
                    };
                    let effects: EffectSet = f.effects.iter().copied().collect();
                    let ty = Type::function(params, ret, effects);
                    signatures.insert(f.name.clone(), ty.clone());
                    env.bind(f.name.clone(), Binding::value(ty));
                }

                Decl::Const(c) => {
                    let none = HashSet::new();
                    let ty = match &c.ty {
                        Some(t) => resolve_type(env.registry(), t, &none)?,
                        None => Type::Any,
                    };
                    signatures.insert(c.name.clone(), ty.clone());
                    env.bind(c.name.clone(), Binding::value(ty));
                }

                Decl::Extern(e) => {
                    if let Some(decl_members) = &e.members {
                        let none = HashSet::new();
                        let mut members = HashMap::new();
                        for m in decl_members {
                            members
                                .insert(m.name.clone(), resolve_type(env.registry(), &m.ty, &none)?);
                        }
                        extern_members.insert(e.path.join("⋅"), members);
                    }
                    if let Some(head) = e.path.first() {
                        env.bind(head.clone(), Binding::namespace());
                    }
                }

                Decl::Import(i) => {
                    if let Some(last) = i.path.last() {
                        env.bind(last.clone(), Binding::namespace());
                    }
                }

                Decl::Test(_) => {}
            }
        }

        Ok(Checker {
            env,
            constructors,
            extern_members,
            signatures,
        })
    }

    pub fn check_bodies(&self, program: &Program) -> Result<(), TypeError> {
        for decl in &program.decls {
            match decl {
                Decl::Function(f) => self.check_function(f)?,
                Decl::Const(c) => match &c.ty {
                    Some(t) => {
                        let ty = self.resolve(t)?;
                        self.check_expr(&c.value, &ty, &self.env).map_err(|e| {
                            e.with_context(MismatchContext::Binding {
                                name: c.name.clone(),
                            })
                        })?;
                    }
                    None => {
                        self.synthesize(&c.value, &self.env)?;
                    }
                },
                Decl::Test(t) => {
                    self.synthesize(&t.body, &self.env)?;
                    let declared: EffectSet = t.effects.iter().copied().collect();
                    let label = format!("test \"{}\"", t.description);
                    self.enforce_effects(&label, &t.body, &self.env, &declared)?;
                }
                Decl::Type(_) | Decl::Import(_) | Decl::Extern(_) => {}
            }
        }
        Ok(())
    }

    fn check_function(&self, f: &FunctionDecl) -> Result<(), TypeError> {
        let mut env = self.env.extend();
        for p in &f.params {
            let ty = match &p.ty {
                Some(t) => self.resolve(t)?,
                None => Type::Any,
            };
            env.bind(p.name.clone(), Binding::value(ty));
        }
        let ret = match &f.return_type {
            Some(t) => self.resolve(t)?,
            None => Type::Any,
        };

        self.check_expr(&f.body, &ret, &env).map_err(|e| {
            e.with_context(MismatchContext::Return {
                function: f.name.clone(),
            })
        })?;

        let declared: EffectSet = f.effects.iter().copied().collect();
        self.enforce_effects(&f.name, &f.body, &env, &declared)
    }

    fn resolve(&self, ty: &TypeExpr) -> Result<Type, TypeError> {
        resolve_type(self.env.registry(), ty, &HashSet::new())
    }

    // ------------------------------------------------------------------
    // Synthesis: compute a type bottom-up
    // ------------------------------------------------------------------

    fn synthesize(&self, expr: &Expr, env: &TypeEnv) -> Result<Type, TypeError> {
        match &expr.node {
            ExprKind::Lit(lit) => Ok(literal_type(lit)),

            ExprKind::Var(name) => match env.lookup(name) {
                Some(binding) => Ok(binding.ty.clone()),
                None => {
                    let names = env.visible_names();
                    let suggestions =
                        find_similar(name, names.iter().map(|s| s.as_str()), 2);
                    Err(TypeError::UnknownName {
                        name: name.clone(),
                        span: expr.span.clone(),
                        suggestions,
                    })
                }
            },

            ExprKind::Lambda {
                params,
                effects,
                return_type,
                body,
            } => {
                let mut inner = env.extend();
                let mut param_tys = Vec::new();
                for p in params {
                    let ty = match &p.ty {
                        Some(t) => self.resolve(t)?,
                        None => Type::Any,
                    };
                    inner.bind(p.name.clone(), Binding::value(ty.clone()));
                    param_tys.push(ty);
                }
                let ret = self.resolve(return_type)?;
                // The annotated return type makes the body a checked position
                self.check_expr(body, &ret, &inner)?;
                let declared: EffectSet = effects.iter().copied().collect();
                self.enforce_effects("lambda", body, &inner, &declared)?;
                Ok(Type::Function {
                    params: param_tys,
                    ret: Rc::new(ret),
                    effects: declared,
                })
            }

            ExprKind::App { func, args } => {
                let func_ty = self.synthesize(func, env)?;
                match func_ty {
                    Type::Function { params, ret, .. } => {
                        if params.len() != args.len() {
                            return Err(TypeError::WrongArity {
                                function: callee_name(func),
                                expected: params.len(),
                                found: args.len(),
                                span: expr.span.clone(),
                            });
                        }
                        for (i, (arg, param_ty)) in args.iter().zip(params.iter()).enumerate() {
                            self.check_expr(arg, param_ty, env).map_err(|e| {
                                e.with_context(MismatchContext::Argument {
                                    index: i + 1,
                                    function: callee_name(func),
                                })
                            })?;
                        }
                        Ok((*ret).clone())
                    }
                    // Application of Any synthesizes Any: the trust seam
                    Type::Any => {
                        for arg in args {
                            self.synthesize(arg, env)?;
                        }
                        Ok(Type::Any)
                    }
                    other => Err(TypeError::NotAFunction {
                        found: other,
                        span: func.span.clone(),
                    }),
                }
            }

            ExprKind::BinOp { op, left, right } => self.synthesize_binop(*op, left, right, env),

            ExprKind::UnaryOp { op, operand } => {
                let ty = self.synthesize(operand, env)?;
                match op {
                    UnaryOp::Neg => match ty {
                        Type::Int | Type::Float | Type::Any => Ok(ty),
                        other => Err(TypeError::BadOperand {
                            op: op.symbol(),
                            found: other,
                            span: operand.span.clone(),
                        }),
                    },
                    UnaryOp::Not => match ty {
                        Type::Bool | Type::Any => Ok(Type::Bool),
                        other => Err(TypeError::BadOperand {
                            op: op.symbol(),
                            found: other,
                            span: operand.span.clone(),
                        }),
                    },
                    UnaryOp::Len => match ty {
                        Type::List(_) | Type::String | Type::Any => Ok(Type::Int),
                        other => Err(TypeError::BadOperand {
                            op: op.symbol(),
                            found: other,
                            span: operand.span.clone(),
                        }),
                    },
                }
            }

            ExprKind::If {
                cond,
                then_branch,
                else_branch,
            } => {
                self.check_expr(cond, &Type::Bool, env)
                    .map_err(|e| e.with_context(MismatchContext::Condition))?;
                let then_ty = self.synthesize(then_branch, env)?;
                self.check_expr(else_branch, &then_ty, env)
                    .map_err(|e| e.with_context(MismatchContext::IfBranches))?;
                Ok(then_ty)
            }

            ExprKind::Match { scrutinee, arms } => {
                let scrut_ty = self.synthesize(scrutinee, env)?;
                let mut result: Option<Type> = None;
                for (i, arm) in arms.iter().enumerate() {
                    let arm_env = self.check_pattern(&arm.pattern, &scrut_ty, env)?;
                    if let Some(guard) = &arm.guard {
                        self.check_expr(guard, &Type::Bool, &arm_env)
                            .map_err(|e| e.with_context(MismatchContext::Condition))?;
                    }
                    match &result {
                        // The first arm sets the type of the whole match
                        None => result = Some(self.synthesize(&arm.body, &arm_env)?),
                        Some(expected) => {
                            self.check_expr(&arm.body, expected, &arm_env).map_err(|e| {
                                e.with_context(MismatchContext::MatchArm { index: i + 1 })
                            })?;
                        }
                    }
                }
                result.ok_or(TypeError::EmptyMatch {
                    span: expr.span.clone(),
                })
            }

            ExprKind::Let {
                pattern,
                ty,
                value,
                body,
            } => {
                let bound_ty = self.let_bound_type(pattern, ty, value, env)?;
                let body_env = self.check_pattern(pattern, &bound_ty, env)?;
                self.synthesize(body, &body_env)
            }

            ExprKind::List(items) => match items.first() {
                // In synthesis position nothing names the element type of []
                None => Err(TypeError::EmptyListNeedsContext {
                    span: expr.span.clone(),
                }),
                Some(first) => {
                    let elem = self.synthesize(first, env)?;
                    for item in &items[1..] {
                        self.check_expr(item, &elem, env)
                            .map_err(|e| e.with_context(MismatchContext::ListElement))?;
                    }
                    Ok(Type::list(elem))
                }
            },

            ExprKind::Tuple(items) => {
                let tys = items
                    .iter()
                    .map(|item| self.synthesize(item, env))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Type::Tuple(tys))
            }

            ExprKind::Record { fields } => {
                let mut resolved = Vec::new();
                for (name, value) in fields {
                    resolved.push((name.clone(), self.synthesize(value, env)?));
                }
                Ok(Type::record(resolved))
            }

            ExprKind::FieldAccess { record, field } => {
                let record_ty = self.synthesize(record, env)?;
                match &record_ty {
                    Type::Record { fields } => match fields.get(field) {
                        Some(ty) => Ok(ty.clone()),
                        None => Err(TypeError::UnknownField {
                            field: field.clone(),
                            record: record_ty.clone(),
                            span: expr.span.clone(),
                        }),
                    },
                    Type::Ctor { name, .. } => match self.env.registry().get(name) {
                        Some(TypeEntry::Record { params, fields }) => {
                            let scope: HashSet<String> = params.iter().cloned().collect();
                            match fields.iter().find(|(n, _)| n == field) {
                                Some((_, field_ty)) => {
                                    resolve_type(self.env.registry(), field_ty, &scope)
                                }
                                None => Err(TypeError::UnknownField {
                                    field: field.clone(),
                                    record: record_ty.clone(),
                                    span: expr.span.clone(),
                                }),
                            }
                        }
                        _ => Err(TypeError::NotARecord {
                            found: record_ty.clone(),
                            span: record.span.clone(),
                        }),
                    },
                    Type::Any => Ok(Type::Any),
                    other => Err(TypeError::NotARecord {
                        found: other.clone(),
                        span: record.span.clone(),
                    }),
                }
            }

            ExprKind::MemberAccess { namespace, member } => {
                self.synthesize_member_access(namespace, member, &expr.span, env)
            }

            ExprKind::Pipeline { op, left, right } => match op {
                // x |> f is application of f to x
                PipeOp::Pipe => {
                    let func_ty = self.synthesize(right, env)?;
                    match func_ty {
                        Type::Function { params, ret, .. } => {
                            if params.len() != 1 {
                                return Err(TypeError::WrongArity {
                                    function: callee_name(right),
                                    expected: params.len(),
                                    found: 1,
                                    span: expr.span.clone(),
                                });
                            }
                            self.check_expr(left, &params[0], env).map_err(|e| {
                                e.with_context(MismatchContext::Argument {
                                    index: 1,
                                    function: callee_name(right),
                                })
                            })?;
                            Ok((*ret).clone())
                        }
                        Type::Any => {
                            self.synthesize(left, env)?;
                            Ok(Type::Any)
                        }
                        other => Err(TypeError::NotAFunction {
                            found: other,
                            span: right.span.clone(),
                        }),
                    }
                }
                // f >> g composes; the seam type must line up
                PipeOp::Compose => {
                    let left_ty = self.synthesize(left, env)?;
                    let right_ty = self.synthesize(right, env)?;
                    match (left_ty, right_ty) {
                        (
                            Type::Function {
                                params,
                                ret,
                                effects: left_effects,
                            },
                            Type::Function {
                                params: right_params,
                                ret: right_ret,
                                effects: right_effects,
                            },
                        ) => {
                            if right_params.len() != 1 {
                                return Err(TypeError::WrongArity {
                                    function: callee_name(right),
                                    expected: right_params.len(),
                                    found: 1,
                                    span: right.span.clone(),
                                });
                            }
                            if !types_equal(&ret, &right_params[0]) {
                                return Err(TypeError::Mismatch {
                                    expected: right_params[0].clone(),
                                    found: (*ret).clone(),
                                    context: Some(MismatchContext::Composition),
                                    span: right.span.clone(),
                                });
                            }
                            Ok(Type::Function {
                                params,
                                ret: right_ret,
                                effects: left_effects.union(&right_effects),
                            })
                        }
                        (Type::Any, _) | (_, Type::Any) => Ok(Type::Any),
                        (other, Type::Function { .. }) => Err(TypeError::NotAFunction {
                            found: other,
                            span: left.span.clone(),
                        }),
                        (_, other) => Err(TypeError::NotAFunction {
                            found: other,
                            span: right.span.clone(),
                        }),
                    }
                }
            },

            ExprKind::Map { list, func } => {
                let elem = self.expect_list_elem(list, env)?;
                let func_ty = self.synthesize(func, env)?;
                match func_ty {
                    Type::Function { params, ret, .. } => {
                        if params.len() != 1 {
                            return Err(TypeError::WrongArity {
                                function: "map".to_string(),
                                expected: 1,
                                found: params.len(),
                                span: func.span.clone(),
                            });
                        }
                        if !types_equal(&params[0], &elem) {
                            return Err(TypeError::Mismatch {
                                expected: params[0].clone(),
                                found: elem,
                                context: Some(MismatchContext::Argument {
                                    index: 1,
                                    function: "map".to_string(),
                                }),
                                span: list.span.clone(),
                            });
                        }
                        Ok(Type::list((*ret).clone()))
                    }
                    Type::Any => Ok(Type::list(Type::Any)),
                    other => Err(TypeError::NotAFunction {
                        found: other,
                        span: func.span.clone(),
                    }),
                }
            }

            ExprKind::Filter { list, predicate } => {
                let elem = self.expect_list_elem(list, env)?;
                let pred_ty = self.synthesize(predicate, env)?;
                match pred_ty {
                    Type::Function { params, ret, .. } => {
                        if params.len() != 1 {
                            return Err(TypeError::WrongArity {
                                function: "filter".to_string(),
                                expected: 1,
                                found: params.len(),
                                span: predicate.span.clone(),
                            });
                        }
                        if !types_equal(&params[0], &elem) {
                            return Err(TypeError::Mismatch {
                                expected: params[0].clone(),
                                found: elem,
                                context: Some(MismatchContext::Argument {
                                    index: 1,
                                    function: "filter".to_string(),
                                }),
                                span: list.span.clone(),
                            });
                        }
                        if !types_equal(&ret, &Type::Bool) {
                            return Err(TypeError::Mismatch {
                                expected: Type::Bool,
                                found: (*ret).clone(),
                                context: None,
                                span: predicate.span.clone(),
                            });
                        }
                        Ok(Type::list(elem))
                    }
                    Type::Any => Ok(Type::list(elem)),
                    other => Err(TypeError::NotAFunction {
                        found: other,
                        span: predicate.span.clone(),
                    }),
                }
            }

            ExprKind::Fold { list, func, init } => {
                let elem = self.expect_list_elem(list, env)?;
                let func_ty = self.synthesize(func, env)?;
                match func_ty {
                    Type::Function { params, ret, .. } => {
                        if params.len() != 2 {
                            return Err(TypeError::WrongArity {
                                function: "fold".to_string(),
                                expected: 2,
                                found: params.len(),
                                span: func.span.clone(),
                            });
                        }
                        if !types_equal(&params[1], &elem) {
                            return Err(TypeError::Mismatch {
                                expected: params[1].clone(),
                                found: elem,
                                context: Some(MismatchContext::Argument {
                                    index: 2,
                                    function: "fold".to_string(),
                                }),
                                span: list.span.clone(),
                            });
                        }
                        // The folding function must return its own
                        // accumulator type
                        if !types_equal(&ret, &params[0]) {
                            return Err(TypeError::Mismatch {
                                expected: params[0].clone(),
                                found: (*ret).clone(),
                                context: None,
                                span: func.span.clone(),
                            });
                        }
                        self.check_expr(init, &params[0], env)
                            .map_err(|e| e.with_context(MismatchContext::FoldInit))?;
                        Ok((*ret).clone())
                    }
                    Type::Any => {
                        self.synthesize(init, env)?;
                        Ok(Type::Any)
                    }
                    other => Err(TypeError::NotAFunction {
                        found: other,
                        span: func.span.clone(),
                    }),
                }
            }
        }
    }

    fn synthesize_binop(
        &self,
        op: BinOp,
        left: &Expr,
        right: &Expr,
        env: &TypeEnv,
    ) -> Result<Type, TypeError> {
        match op {
            BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div | BinOp::Mod => {
                let left_ty = self.synthesize(left, env)?;
                let right_ty = self.synthesize(right, env)?;
                // + doubles as string append when either side is a string
                if matches!(op, BinOp::Add)
                    && (matches!(left_ty, Type::String) || matches!(right_ty, Type::String))
                {
                    let (found, at) = if matches!(left_ty, Type::String) {
                        (right_ty, &right.span)
                    } else {
                        (left_ty, &left.span)
                    };
                    if !types_equal(&found, &Type::String) {
                        return Err(TypeError::Mismatch {
                            expected: Type::String,
                            found,
                            context: Some(MismatchContext::Operands { op: op.symbol() }),
                            span: at.clone(),
                        });
                    }
                    return Ok(Type::String);
                }
                numeric_operand(op, &left_ty, &left.span)?;
                numeric_operand(op, &right_ty, &right.span)?;
                if !types_equal(&left_ty, &right_ty) {
                    return Err(TypeError::Mismatch {
                        expected: left_ty,
                        found: right_ty,
                        context: Some(MismatchContext::Operands { op: op.symbol() }),
                        span: right.span.clone(),
                    });
                }
                Ok(if left_ty.is_any() { right_ty } else { left_ty })
            }

            BinOp::Eq | BinOp::NotEq => {
                let left_ty = self.synthesize(left, env)?;
                let right_ty = self.synthesize(right, env)?;
                if !types_equal(&left_ty, &right_ty) {
                    return Err(TypeError::Mismatch {
                        expected: left_ty,
                        found: right_ty,
                        context: Some(MismatchContext::Operands { op: op.symbol() }),
                        span: right.span.clone(),
                    });
                }
                Ok(Type::Bool)
            }

            BinOp::Lt | BinOp::Gt | BinOp::LtEq | BinOp::GtEq => {
                let left_ty = self.synthesize(left, env)?;
                let right_ty = self.synthesize(right, env)?;
                ordered_operand(op, &left_ty, &left.span)?;
                ordered_operand(op, &right_ty, &right.span)?;
                if !types_equal(&left_ty, &right_ty) {
                    return Err(TypeError::Mismatch {
                        expected: left_ty,
                        found: right_ty,
                        context: Some(MismatchContext::Operands { op: op.symbol() }),
                        span: right.span.clone(),
                    });
                }
                Ok(Type::Bool)
            }

            BinOp::And | BinOp::Or => {
                self.check_expr(left, &Type::Bool, env)
                    .map_err(|e| e.with_context(MismatchContext::Operands { op: op.symbol() }))?;
                self.check_expr(right, &Type::Bool, env)
                    .map_err(|e| e.with_context(MismatchContext::Operands { op: op.symbol() }))?;
                Ok(Type::Bool)
            }

            BinOp::Concat => {
                self.check_expr(left, &Type::String, env)
                    .map_err(|e| e.with_context(MismatchContext::Operands { op: op.symbol() }))?;
                self.check_expr(right, &Type::String, env)
                    .map_err(|e| e.with_context(MismatchContext::Operands { op: op.symbol() }))?;
                Ok(Type::String)
            }

            BinOp::ListConcat => {
                // Lean on whichever side names the element type, so an empty
                // list literal on either side stays in checked position.
                if is_empty_list_literal(left) {
                    let right_ty = self.synthesize(right, env)?;
                    match &right_ty {
                        Type::List(_) | Type::Any => {
                            self.check_expr(left, &right_ty, env)?;
                            Ok(right_ty)
                        }
                        other => Err(TypeError::NotAList {
                            found: other.clone(),
                            span: right.span.clone(),
                        }),
                    }
                } else {
                    let left_ty = self.synthesize(left, env)?;
                    match &left_ty {
                        Type::List(_) => {
                            self.check_expr(right, &left_ty, env).map_err(|e| {
                                e.with_context(MismatchContext::Operands { op: op.symbol() })
                            })?;
                            Ok(left_ty)
                        }
                        Type::Any => {
                            let right_ty = self.synthesize(right, env)?;
                            match right_ty {
                                Type::List(_) | Type::Any => Ok(right_ty),
                                other => Err(TypeError::NotAList {
                                    found: other,
                                    span: right.span.clone(),
                                }),
                            }
                        }
                        other => Err(TypeError::NotAList {
                            found: other.clone(),
                            span: left.span.clone(),
                        }),
                    }
                }
            }
        }
    }

    fn synthesize_member_access(
        &self,
        namespace: &[String],
        member: &str,
        span: &Span,
        env: &TypeEnv,
    ) -> Result<Type, TypeError> {
        let Some(head) = namespace.first() else {
            return Err(TypeError::UnknownName {
                name: member.to_string(),
                span: span.clone(),
                suggestions: vec![],
            });
        };

        // A typed extern closes its member surface; anything else known is
        // an opaque namespace and synthesizes Any.
        let key = namespace.join("⋅");
        if let Some(members) = self.extern_members.get(&key) {
            return match members.get(member) {
                Some(ty) => Ok(ty.clone()),
                None => {
                    let suggestions =
                        find_similar(member, members.keys().map(|s| s.as_str()), 2);
                    Err(TypeError::UnknownName {
                        name: format!("{key}⋅{member}"),
                        span: span.clone(),
                        suggestions,
                    })
                }
            };
        }

        match env.lookup(head) {
            Some(binding) if binding.extern_namespace => Ok(Type::Any),
            Some(_) => Err(TypeError::NotANamespace {
                name: head.clone(),
                span: span.clone(),
            }),
            None => {
                let names = env.visible_names();
                let suggestions = find_similar(head, names.iter().map(|s| s.as_str()), 2);
                Err(TypeError::UnknownName {
                    name: head.clone(),
                    span: span.clone(),
                    suggestions,
                })
            }
        }
    }

    fn expect_list_elem(&self, list: &Expr, env: &TypeEnv) -> Result<Type, TypeError> {
        match self.synthesize(list, env)? {
            Type::List(elem) => Ok((*elem).clone()),
            Type::Any => Ok(Type::Any),
            other => Err(TypeError::NotAList {
                found: other,
                span: list.span.clone(),
            }),
        }
    }

    fn let_bound_type(
        &self,
        pattern: &Pattern,
        ty: &Option<TypeExpr>,
        value: &Expr,
        env: &TypeEnv,
    ) -> Result<Type, TypeError> {
        match ty {
            Some(ascription) => {
                let bound = self.resolve(ascription)?;
                self.check_expr(value, &bound, env).map_err(|e| {
                    e.with_context(MismatchContext::Binding {
                        name: binding_label(pattern),
                    })
                })?;
                Ok(bound)
            }
            None => self.synthesize(value, env),
        }
    }

    // ------------------------------------------------------------------
    // Checking: push an expected type down
    // ------------------------------------------------------------------

    fn check_expr(&self, expr: &Expr, expected: &Type, env: &TypeEnv) -> Result<(), TypeError> {
        match &expr.node {
            ExprKind::List(items) => match expected {
                Type::List(elem) => {
                    for item in items {
                        self.check_expr(item, elem, env)
                            .map_err(|e| e.with_context(MismatchContext::ListElement))?;
                    }
                    Ok(())
                }
                Type::Any => {
                    for item in items {
                        self.check_expr(item, &Type::Any, env)?;
                    }
                    Ok(())
                }
                other => {
                    let found = match items.first() {
                        Some(first) => Type::list(self.synthesize(first, env)?),
                        None => Type::list(Type::Any),
                    };
                    Err(TypeError::Mismatch {
                        expected: other.clone(),
                        found,
                        context: None,
                        span: expr.span.clone(),
                    })
                }
            },

            ExprKind::If {
                cond,
                then_branch,
                else_branch,
            } => {
                self.check_expr(cond, &Type::Bool, env)
                    .map_err(|e| e.with_context(MismatchContext::Condition))?;
                self.check_expr(then_branch, expected, env)?;
                self.check_expr(else_branch, expected, env)
            }

            ExprKind::Match { scrutinee, arms } => {
                let scrut_ty = self.synthesize(scrutinee, env)?;
                for (i, arm) in arms.iter().enumerate() {
                    let arm_env = self.check_pattern(&arm.pattern, &scrut_ty, env)?;
                    if let Some(guard) = &arm.guard {
                        self.check_expr(guard, &Type::Bool, &arm_env)
                            .map_err(|e| e.with_context(MismatchContext::Condition))?;
                    }
                    self.check_expr(&arm.body, expected, &arm_env)
                        .map_err(|e| e.with_context(MismatchContext::MatchArm { index: i + 1 }))?;
                }
                Ok(())
            }

            ExprKind::Let {
                pattern,
                ty,
                value,
                body,
            } => {
                let bound_ty = self.let_bound_type(pattern, ty, value, env)?;
                let body_env = self.check_pattern(pattern, &bound_ty, env)?;
                self.check_expr(body, expected, &body_env)
            }

            ExprKind::Tuple(items) => match expected {
                Type::Tuple(expected_items) if expected_items.len() == items.len() => {
                    for (item, expected_item) in items.iter().zip(expected_items) {
                        self.check_expr(item, expected_item, env)?;
                    }
                    Ok(())
                }
                _ => self.check_via_synthesis(expr, expected, env),
            },

            ExprKind::Record { fields } => match expected {
                Type::Record {
                    fields: expected_fields,
                } if expected_fields.len() == fields.len()
                    && fields.iter().all(|(n, _)| expected_fields.contains_key(n)) =>
                {
                    for (name, value) in fields {
                        match expected_fields.get(name) {
                            Some(field_ty) => {
                                self.check_expr(value, field_ty, env).map_err(|e| {
                                    e.with_context(MismatchContext::RecordField {
                                        name: name.clone(),
                                    })
                                })?;
                            }
                            None => return self.check_via_synthesis(expr, expected, env),
                        }
                    }
                    Ok(())
                }
                _ => self.check_via_synthesis(expr, expected, env),
            },

            // A lambda's declared signature must line up with the expected
            // function type before its body is looked at
            ExprKind::Lambda {
                params,
                effects,
                return_type,
                body,
            } => match expected {
                Type::Function {
                    params: expected_params,
                    ret: expected_ret,
                    ..
                } if expected_params.len() == params.len() => {
                    let mut inner = env.extend();
                    for (p, expected_ty) in params.iter().zip(expected_params) {
                        let declared = match &p.ty {
                            Some(t) => self.resolve(t)?,
                            None => Type::Any,
                        };
                        if !types_equal(&declared, expected_ty) {
                            return Err(TypeError::Mismatch {
                                expected: expected_ty.clone(),
                                found: declared,
                                context: Some(MismatchContext::Binding {
                                    name: p.name.clone(),
                                }),
                                span: p.span.clone(),
                            });
                        }
                        inner.bind(p.name.clone(), Binding::value(declared));
                    }
                    let ret = self.resolve(return_type)?;
                    if !types_equal(&ret, expected_ret) {
                        return Err(TypeError::Mismatch {
                            expected: (**expected_ret).clone(),
                            found: ret,
                            context: None,
                            span: expr.span.clone(),
                        });
                    }
                    self.check_expr(body, &ret, &inner)?;
                    let declared_effects: EffectSet = effects.iter().copied().collect();
                    self.enforce_effects("lambda", body, &inner, &declared_effects)
                }
                _ => self.check_via_synthesis(expr, expected, env),
            },

            _ => self.check_via_synthesis(expr, expected, env),
        }
    }

    fn check_via_synthesis(
        &self,
        expr: &Expr,
        expected: &Type,
        env: &TypeEnv,
    ) -> Result<(), TypeError> {
        let found = self.synthesize(expr, env)?;
        if types_equal(&found, expected) {
            Ok(())
        } else {
            Err(TypeError::Mismatch {
                expected: expected.clone(),
                found,
                context: None,
                span: expr.span.clone(),
            })
        }
    }

    // ------------------------------------------------------------------
    // Patterns
    // ------------------------------------------------------------------

    /// Check a pattern against the scrutinee type; the returned scope has
    /// the pattern's bindings layered over `env`.
    fn check_pattern(
        &self,
        pattern: &Pattern,
        ty: &Type,
        env: &TypeEnv,
    ) -> Result<TypeEnv, TypeError> {
        let mut scope = env.extend();
        self.bind_pattern(pattern, ty, &mut scope)?;
        Ok(scope)
    }

    fn bind_pattern(
        &self,
        pattern: &Pattern,
        ty: &Type,
        scope: &mut TypeEnv,
    ) -> Result<(), TypeError> {
        match &pattern.node {
            PatternKind::Wildcard => Ok(()),

            PatternKind::Var(name) => {
                scope.bind(name.clone(), Binding::value(ty.clone()));
                Ok(())
            }

            PatternKind::Lit(lit) => {
                let lit_ty = literal_type(lit);
                if types_equal(&lit_ty, ty) {
                    Ok(())
                } else {
                    Err(TypeError::Mismatch {
                        expected: ty.clone(),
                        found: lit_ty,
                        context: Some(MismatchContext::PatternLiteral),
                        span: pattern.span.clone(),
                    })
                }
            }

            PatternKind::Tuple(parts) => match ty {
                Type::Tuple(items) if items.len() == parts.len() => {
                    for (part, item_ty) in parts.iter().zip(items) {
                        self.bind_pattern(part, item_ty, scope)?;
                    }
                    Ok(())
                }
                Type::Any => {
                    for part in parts {
                        self.bind_pattern(part, &Type::Any, scope)?;
                    }
                    Ok(())
                }
                other => Err(TypeError::Mismatch {
                    expected: Type::Tuple(vec![Type::Any; parts.len()]),
                    found: other.clone(),
                    context: None,
                    span: pattern.span.clone(),
                }),
            },

            PatternKind::List { elements, rest } => match ty {
                Type::List(elem) => {
                    for element in elements {
                        self.bind_pattern(element, elem, scope)?;
                    }
                    if let Some(name) = rest {
                        scope.bind(name.clone(), Binding::value(ty.clone()));
                    }
                    Ok(())
                }
                Type::Any => {
                    for element in elements {
                        self.bind_pattern(element, &Type::Any, scope)?;
                    }
                    if let Some(name) = rest {
                        scope.bind(name.clone(), Binding::value(Type::Any));
                    }
                    Ok(())
                }
                other => Err(TypeError::Mismatch {
                    expected: Type::list(Type::Any),
                    found: other.clone(),
                    context: None,
                    span: pattern.span.clone(),
                }),
            },

            PatternKind::Ctor { name, args } => {
                let Some(info) = self.constructors.get(name) else {
                    let suggestions =
                        find_similar(name, self.constructors.keys().map(|s| s.as_str()), 2);
                    return Err(TypeError::UnknownConstructor {
                        name: name.clone(),
                        span: pattern.span.clone(),
                        suggestions,
                    });
                };
                match ty {
                    Type::Ctor { name: ty_name, .. } if *ty_name == info.type_name => {}
                    Type::Any => {}
                    other => {
                        return Err(TypeError::Mismatch {
                            expected: Type::Ctor {
                                name: info.type_name.clone(),
                                args: vec![],
                            },
                            found: other.clone(),
                            context: None,
                            span: pattern.span.clone(),
                        });
                    }
                }
                if args.len() != info.fields.len() {
                    return Err(TypeError::CtorArity {
                        name: name.clone(),
                        expected: info.fields.len(),
                        found: args.len(),
                        span: pattern.span.clone(),
                    });
                }
                for (arg, field_ty) in args.iter().zip(&info.fields) {
                    self.bind_pattern(arg, field_ty, scope)?;
                }
                Ok(())
            }
        }
    }

    // ------------------------------------------------------------------
    // Effect inference
    // ------------------------------------------------------------------

    fn enforce_effects(
        &self,
        name: &str,
        body: &Expr,
        env: &TypeEnv,
        declared: &EffectSet,
    ) -> Result<(), TypeError> {
        let mut performed = Vec::new();
        self.infer_effects(body, env, &mut performed)?;

        let mut missing = EffectSet::new();
        let mut first_span: Option<Span> = None;
        for (effect, span) in &performed {
            if !declared.contains(*effect) {
                if first_span.is_none() {
                    first_span = Some(span.clone());
                }
                missing.insert(*effect);
            }
        }

        match first_span {
            Some(span) => Err(TypeError::EffectMismatch {
                function: name.to_string(),
                missing: missing.names(),
                span,
            }),
            None => Ok(()),
        }
    }

    /// Structural walk collecting (effect, span) for everything the
    /// expression performs when evaluated. Runs only on bodies that have
    /// already type checked, so the synthesize calls here cannot fail for
    /// reasons the caller has not already seen.
    fn infer_effects(
        &self,
        expr: &Expr,
        env: &TypeEnv,
        out: &mut Vec<(Effect, Span)>,
    ) -> Result<(), TypeError> {
        match &expr.node {
            ExprKind::Lit(_) | ExprKind::Var(_) | ExprKind::MemberAccess { .. } => Ok(()),

            // Defining a lambda performs nothing; its effects surface where
            // it is applied.
            ExprKind::Lambda { .. } => Ok(()),

            ExprKind::App { func, args } => {
                self.infer_effects(func, env, out)?;
                for arg in args {
                    self.infer_effects(arg, env, out)?;
                }
                self.applied_function_effects(func, env, out, &expr.span)
            }

            ExprKind::BinOp { left, right, .. } => {
                self.infer_effects(left, env, out)?;
                self.infer_effects(right, env, out)
            }

            ExprKind::UnaryOp { operand, .. } => self.infer_effects(operand, env, out),

            ExprKind::If {
                cond,
                then_branch,
                else_branch,
            } => {
                self.infer_effects(cond, env, out)?;
                self.infer_effects(then_branch, env, out)?;
                self.infer_effects(else_branch, env, out)
            }

            ExprKind::Match { scrutinee, arms } => {
                self.infer_effects(scrutinee, env, out)?;
                let scrut_ty = self.synthesize(scrutinee, env)?;
                for arm in arms {
                    let arm_env = self.check_pattern(&arm.pattern, &scrut_ty, env)?;
                    if let Some(guard) = &arm.guard {
                        self.infer_effects(guard, &arm_env, out)?;
                    }
                    self.infer_effects(&arm.body, &arm_env, out)?;
                }
                Ok(())
            }

            ExprKind::Let {
                pattern,
                ty,
                value,
                body,
            } => {
                self.infer_effects(value, env, out)?;
                let bound_ty = match ty {
                    Some(ascription) => self.resolve(ascription)?,
                    None => self.synthesize(value, env)?,
                };
                let body_env = self.check_pattern(pattern, &bound_ty, env)?;
                self.infer_effects(body, &body_env, out)
            }

            ExprKind::List(items) | ExprKind::Tuple(items) => {
                for item in items {
                    self.infer_effects(item, env, out)?;
                }
                Ok(())
            }

            ExprKind::Record { fields } => {
                for (_, value) in fields {
                    self.infer_effects(value, env, out)?;
                }
                Ok(())
            }

            ExprKind::FieldAccess { record, .. } => self.infer_effects(record, env, out),

            ExprKind::Pipeline { op, left, right } => {
                self.infer_effects(left, env, out)?;
                self.infer_effects(right, env, out)?;
                if *op == PipeOp::Pipe {
                    self.applied_function_effects(right, env, out, &expr.span)?;
                }
                Ok(())
            }

            ExprKind::Map { list, func } => {
                self.infer_effects(list, env, out)?;
                self.infer_effects(func, env, out)?;
                self.applied_function_effects(func, env, out, &expr.span)
            }

            ExprKind::Filter { list, predicate } => {
                self.infer_effects(list, env, out)?;
                self.infer_effects(predicate, env, out)?;
                self.applied_function_effects(predicate, env, out, &expr.span)
            }

            ExprKind::Fold { list, func, init } => {
                self.infer_effects(list, env, out)?;
                self.infer_effects(func, env, out)?;
                self.infer_effects(init, env, out)?;
                self.applied_function_effects(func, env, out, &expr.span)
            }
        }
    }

    /// The builtins that run a function argument charge its declared
    /// effects to the caller.
    fn applied_function_effects(
        &self,
        func: &Expr,
        env: &TypeEnv,
        out: &mut Vec<(Effect, Span)>,
        span: &Span,
    ) -> Result<(), TypeError> {
        if let Type::Function { effects, .. } = self.synthesize(func, env)? {
            for effect in effects.iter() {
                out.push((effect, span.clone()));
            }
        }
        Ok(())
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn literal_type(lit: &Literal) -> Type {
    match lit {
        Literal::Int(_) => Type::Int,
        Literal::Float(_) => Type::Float,
        Literal::Bool(_) => Type::Bool,
        Literal::String(_) => Type::String,
        Literal::Char(_) => Type::Char,
        Literal::Unit => Type::Unit,
    }
}

fn numeric_operand(op: BinOp, ty: &Type, span: &Span) -> Result<(), TypeError> {
    match ty {
        Type::Int | Type::Float | Type::Any => Ok(()),
        other => Err(TypeError::BadOperand {
            op: op.symbol(),
            found: other.clone(),
            span: span.clone(),
        }),
    }
}

fn ordered_operand(op: BinOp, ty: &Type, span: &Span) -> Result<(), TypeError> {
    match ty {
        Type::Int | Type::Float | Type::String | Type::Char | Type::Any => Ok(()),
        other => Err(TypeError::BadOperand {
            op: op.symbol(),
            found: other.clone(),
            span: span.clone(),
        }),
    }
}

fn is_empty_list_literal(expr: &Expr) -> bool {
    matches!(&expr.node, ExprKind::List(items) if items.is_empty())
}

fn callee_name(expr: &Expr) -> String {
    match &expr.node {
        ExprKind::Var(name) => name.clone(),
        ExprKind::MemberAccess { namespace, member } => {
            let mut path = namespace.join("⋅");
            path.push('⋅');
            path.push_str(member);
            path
        }
        ExprKind::FieldAccess { field, .. } => field.clone(),
        _ => "function".to_string(),
    }
}

fn binding_label(pattern: &Pattern) -> String {
    match &pattern.node {
        PatternKind::Var(name) => name.clone(),
        PatternKind::Wildcard => "_".to_string(),
        _ => "binding".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Effect;
    use crate::test_support::*;

    fn synth(expr: &Expr) -> Result<Type, TypeError> {
        let checker = Checker::new(&program(vec![])).unwrap();
        let env = checker.env.extend();
        checker.synthesize(expr, &env)
    }

    #[test]
    fn test_literal_synthesis() {
        assert!(matches!(synth(&lit_int(3)), Ok(Type::Int)));
        assert!(matches!(synth(&lit_bool(true)), Ok(Type::Bool)));
        assert!(matches!(synth(&lit_str("hi")), Ok(Type::String)));
    }

    #[test]
    fn test_arithmetic_operand_rules() {
        let ok = binop(BinOp::Add, lit_int(1), lit_int(2));
        assert!(matches!(synth(&ok), Ok(Type::Int)));

        // + appends strings, but only strings on both sides
        let joined = binop(BinOp::Add, lit_str("a"), lit_str("b"));
        assert!(matches!(synth(&joined), Ok(Type::String)));
        let bad = binop(BinOp::Add, lit_int(1), lit_str("x"));
        assert!(matches!(synth(&bad), Err(TypeError::Mismatch { .. })));

        // The other arithmetic operators have no string form
        let bad_sub = binop(BinOp::Sub, lit_int(1), lit_str("x"));
        assert!(matches!(synth(&bad_sub), Err(TypeError::BadOperand { .. })));
    }

    #[test]
    fn test_unknown_name_suggests_similar() {
        let func = fn_decl(
            "double",
            vec![param("n", t_int())],
            t_int(),
            binop(BinOp::Mul, var("n"), lit_int(2)),
        );
        let prog = program(vec![
            Decl::Function(func),
            Decl::Function(fn_decl(
                "quadruple",
                vec![param("n", t_int())],
                t_int(),
                call_named("doubel", vec![call_named("double", vec![var("n")])]),
            )),
        ]);
        // Declaration order rule aside, the checker sees both signatures
        let err = check_program(&prog).unwrap_err();
        match err {
            TypeError::UnknownName { name, suggestions, .. } => {
                assert_eq!(name, "doubel");
                assert_eq!(suggestions, vec!["double".to_string()]);
            }
            other => panic!("expected unknown name, got {other:?}"),
        }
    }

    #[test]
    fn test_empty_list_fatal_in_synthesis_position() {
        assert!(matches!(
            synth(&list(vec![])),
            Err(TypeError::EmptyListNeedsContext { .. })
        ));
    }

    #[test]
    fn test_empty_list_valid_in_checked_return() {
        // emptied(xs: [ℤ]): [ℤ] = []
        let func = fn_decl(
            "emptied",
            vec![param("xs", t_list(t_int()))],
            t_list(t_int()),
            list(vec![]),
        );
        let prog = program(vec![Decl::Function(func)]);
        assert!(check_program(&prog).is_ok());
    }

    #[test]
    fn test_list_elements_must_agree() {
        let mixed = list(vec![lit_int(1), lit_str("two")]);
        assert!(matches!(synth(&mixed), Err(TypeError::Mismatch { .. })));
    }

    #[test]
    fn test_if_branches_agree_with_first() {
        let bad = if_expr(lit_bool(true), lit_int(1), lit_str("no"));
        match synth(&bad) {
            Err(TypeError::Mismatch {
                context: Some(MismatchContext::IfBranches),
                ..
            }) => {}
            other => panic!("expected branch mismatch, got {other:?}"),
        }
    }

    #[test]
    fn test_match_first_arm_sets_type() {
        // In synthesis position the first arm fixes the result type and
        // every later arm is checked against it.
        let bad = match_expr(
            lit_int(0),
            vec![arm(p_int(0), lit_int(1)), arm(p_wild(), lit_str("no"))],
        );
        match synth(&bad) {
            Err(TypeError::Mismatch {
                context: Some(MismatchContext::MatchArm { index }),
                ..
            }) => assert_eq!(index, 2),
            other => panic!("expected arm mismatch, got {other:?}"),
        }
    }

    #[test]
    fn test_gcd_checks_clean() {
        let body = match_expr(
            var("b"),
            vec![
                arm(p_int(0), var("a")),
                arm(
                    p_var("b"),
                    call_named("gcd", vec![var("b"), binop(BinOp::Mod, var("a"), var("b"))]),
                ),
            ],
        );
        let func = fn_decl(
            "gcd",
            vec![param("a", t_int()), param("b", t_int())],
            t_int(),
            body,
        );
        let prog = program(vec![Decl::Function(func)]);
        let types = check_program(&prog).unwrap();
        match types.get("gcd") {
            Some(Type::Function { params, ret, .. }) => {
                assert_eq!(params.len(), 2);
                assert!(types_equal(ret, &Type::Int));
            }
            other => panic!("expected function type for gcd, got {other:?}"),
        }
    }

    #[test]
    fn test_constructor_pattern_binds_fields() {
        // type Shape = Circle(ℝ) | Square(ℝ); area uses the bound field
        let shape = type_sum(
            "Shape",
            vec![("Circle", vec![t_float()]), ("Square", vec![t_float()])],
        );
        let body = match_expr(
            var("shape"),
            vec![
                arm(
                    p_ctor("Circle", vec![p_var("r")]),
                    binop(BinOp::Mul, var("r"), var("r")),
                ),
                arm(
                    p_ctor("Square", vec![p_var("side")]),
                    binop(BinOp::Mul, var("side"), var("side")),
                ),
            ],
        );
        let func = fn_decl(
            "area",
            vec![param("shape", t_named("Shape"))],
            t_float(),
            body,
        );
        let prog = program(vec![Decl::Type(shape), Decl::Function(func)]);
        assert!(check_program(&prog).is_ok());
    }

    #[test]
    fn test_undeclared_io_effect_rejected() {
        // extern console { log: (𝕊) →!IO 𝕌 }; a wrapper without !IO
        let console = extern_decl(
            &["console"],
            Some(vec![(
                "log",
                t_fn_eff(vec![t_str()], vec![Effect::Io], t_unit()),
            )]),
        );
        let wrapper = fn_decl(
            "emit",
            vec![param("message", t_str())],
            t_unit(),
            call(member(&["console"], "log"), vec![var("message")]),
        );
        let prog = program(vec![Decl::Extern(console), Decl::Function(wrapper)]);
        let err = check_program(&prog).unwrap_err();
        match err {
            TypeError::EffectMismatch { function, missing, .. } => {
                assert_eq!(function, "emit");
                assert_eq!(missing, vec!["IO"]);
            }
            other => panic!("expected effect mismatch, got {other:?}"),
        }
        // The message itself carries the effect name
        let console = extern_decl(
            &["console"],
            Some(vec![(
                "log",
                t_fn_eff(vec![t_str()], vec![Effect::Io], t_unit()),
            )]),
        );
        let wrapper = fn_decl(
            "emit",
            vec![param("message", t_str())],
            t_unit(),
            call(member(&["console"], "log"), vec![var("message")]),
        );
        let prog = program(vec![Decl::Extern(console), Decl::Function(wrapper)]);
        let message = check_program(&prog).unwrap_err().to_string();
        assert!(message.contains("EffectMismatch: IO"), "message: {message}");
    }

    #[test]
    fn test_declared_io_effect_accepted() {
        let console = extern_decl(
            &["console"],
            Some(vec![(
                "log",
                t_fn_eff(vec![t_str()], vec![Effect::Io], t_unit()),
            )]),
        );
        let wrapper = fn_decl_eff(
            "emit",
            vec![param("message", t_str())],
            vec![Effect::Io],
            t_unit(),
            call(member(&["console"], "log"), vec![var("message")]),
        );
        let prog = program(vec![Decl::Extern(console), Decl::Function(wrapper)]);
        assert!(check_program(&prog).is_ok());
    }

    #[test]
    fn test_imported_member_access_synthesizes_any() {
        // i geometry; probe(x: ℤ): ℤ = geometry⋅overlap(x)
        let import = import_decl(&["geometry"]);
        let func = fn_decl(
            "probe",
            vec![param("x", t_int())],
            t_int(),
            call(member(&["geometry"], "overlap"), vec![var("x")]),
        );
        let prog = program(vec![Decl::Import(import), Decl::Function(func)]);
        // Any flows through application and satisfies the ℤ return
        assert!(check_program(&prog).is_ok());
    }

    #[test]
    fn test_effect_through_map_lambda() {
        // mapping an !IO lambda without declaring !IO
        let console = extern_decl(
            &["console"],
            Some(vec![(
                "log",
                t_fn_eff(vec![t_str()], vec![Effect::Io], t_unit()),
            )]),
        );
        let body = map_expr(
            var("messages"),
            lambda(
                vec![param("m", t_str())],
                vec![Effect::Io],
                t_unit(),
                call(member(&["console"], "log"), vec![var("m")]),
            ),
        );
        let func = fn_decl(
            "emit_all",
            vec![param("messages", t_list(t_str()))],
            t_list(t_unit()),
            body,
        );
        let prog = program(vec![Decl::Extern(console), Decl::Function(func)]);
        let err = check_program(&prog).unwrap_err();
        assert!(matches!(err, TypeError::EffectMismatch { .. }));
    }

    #[test]
    fn test_alias_resolves_to_target() {
        let alias = type_alias("Name", t_str());
        let func = fn_decl(
            "greet",
            vec![param("who", t_named("Name"))],
            t_str(),
            binop(BinOp::Concat, lit_str("hi "), var("who")),
        );
        let prog = program(vec![Decl::Type(alias), Decl::Function(func)]);
        assert!(check_program(&prog).is_ok());
    }

    #[test]
    fn test_alias_cycle_detected() {
        let a = type_alias("A", t_named("B"));
        let b = type_alias("B", t_named("A"));
        let func = fn_decl("use_a", vec![param("x", t_named("A"))], t_int(), lit_int(0));
        let prog = program(vec![Decl::Type(a), Decl::Type(b), Decl::Function(func)]);
        let err = check_program(&prog).unwrap_err();
        assert!(matches!(err, TypeError::AliasCycle { .. }));
    }

    #[test]
    fn test_record_field_access() {
        let point = type_record("Point", vec![("x", t_int()), ("y", t_int())]);
        let func = fn_decl(
            "abscissa",
            vec![param("p", t_named("Point"))],
            t_int(),
            field(var("p"), "x"),
        );
        let prog = program(vec![Decl::Type(point), Decl::Function(func)]);
        assert!(check_program(&prog).is_ok());

        let point = type_record("Point", vec![("x", t_int()), ("y", t_int())]);
        let bad = fn_decl(
            "missing",
            vec![param("p", t_named("Point"))],
            t_int(),
            field(var("p"), "z"),
        );
        let prog = program(vec![Decl::Type(point), Decl::Function(bad)]);
        assert!(matches!(
            check_program(&prog).unwrap_err(),
            TypeError::UnknownField { .. }
        ));
    }

    #[test]
    fn test_fold_accumulator_type() {
        // fold((acc: ℤ, x: ℤ) → acc + x, 0, xs)
        let body = fold_expr(
            var("xs"),
            lambda(
                vec![param("acc", t_int()), param("x", t_int())],
                vec![],
                t_int(),
                binop(BinOp::Add, var("acc"), var("x")),
            ),
            lit_int(0),
        );
        let func = fn_decl("total", vec![param("xs", t_list(t_int()))], t_int(), body);
        let prog = program(vec![Decl::Function(func)]);
        assert!(check_program(&prog).is_ok());
    }

    #[test]
    fn test_wrong_argument_reports_context() {
        let double = fn_decl(
            "double",
            vec![param("n", t_int())],
            t_int(),
            binop(BinOp::Mul, var("n"), lit_int(2)),
        );
        let bad = fn_decl(
            "oops",
            vec![param("s", t_str())],
            t_int(),
            call_named("double", vec![var("s")]),
        );
        let prog = program(vec![Decl::Function(double), Decl::Function(bad)]);
        match check_program(&prog).unwrap_err() {
            TypeError::Mismatch {
                context: Some(MismatchContext::Argument { index, function }),
                ..
            } => {
                assert_eq!(index, 1);
                assert_eq!(function, "double");
            }
            other => panic!("expected argument mismatch, got {other:?}"),
        }
    }
}
