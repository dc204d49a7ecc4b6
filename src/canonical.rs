//! Canonical-form validation
//!
//! Slate accepts exactly one encoding of any algorithm. This pass rejects
//! every alternative encoding before type checking runs: accumulator-passing
//! recursion, CPS, boolean-shaped matches, unordered declarations, missing
//! annotations. Every violation is a fatal error, never a warning.
//!
//! The core algorithm classifies each parameter of a self-recursive function
//! by comparing it against its argument expression at every recursive call
//! site. A parameter passed unchanged is a query; a parameter that provably
//! shrinks (decrement, division, modulo, destructuring-derived binding,
//! field extraction, sibling swap) is structural; everything else is an
//! accumulator. Classification is fail-closed: an argument that cannot be
//! proven shrinking votes accumulator even if it happens to shrink.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use thiserror::Error;

use crate::ast::{
    BinOp, ConstDecl, Decl, Expr, ExprKind, ExternDecl, FunctionDecl, Literal, MatchArm, Pattern,
    PatternKind, Program, Span, TypeExpr, TypeExprKind, UnaryOp,
};

/// Options for path-dependent rules; with no path those rules are skipped
#[derive(Debug, Clone, Default)]
pub struct ValidateOptions {
    pub file_path: Option<String>,
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Error, Debug)]
pub enum CanonError {
    #[error("duplicate {category} declaration `{name}`; one canonical declaration per name")]
    Duplicate {
        category: &'static str,
        name: String,
        span: Span,
        first: Span,
    },

    #[error("accumulator-passing recursion in `{function}`: parameter(s) {} grow across recursive calls; use simple recursion on a shrinking argument", .params.join(", "))]
    RecursionAccumulator {
        function: String,
        params: Vec<String>,
        span: Span,
    },

    #[error("recursive function `{function}` returns a function type; continuation-passing style encodes an accumulator in the returned function")]
    RecursionCps { function: String, span: Span },

    #[error("recursive function `{function}` never destructures its list parameter `{param}`; recurse structurally with a list pattern")]
    RecursionCollection {
        function: String,
        param: String,
        span: Span,
    },

    #[error("match on a boolean expression; use an if-expression instead")]
    MatchBoolean { span: Span },

    #[error("match on a tuple of boolean expressions; match discriminates structure, not truth values")]
    MatchTupleBoolean { span: Span },

    #[error("redundant match pattern; an earlier arm already covers it")]
    PatternRedundant { span: Span },

    #[error("unreachable match arm; an earlier pattern matches everything")]
    PatternUnreachable { span: Span },

    #[error("function `{function}` is missing its return type annotation")]
    MissingReturnType { function: String, span: Span },

    #[error("parameter `{param}` is missing its type annotation")]
    MissingParamType { param: String, span: Span },

    #[error("let binding `{name}` has no type ascription; write `{name} = (value: Type)`")]
    LetUntyped { name: String, span: Span },

    #[error("const `{name}` has no type annotation")]
    ConstUntyped { name: String, span: Span },

    #[error("parameter `{param}` of `{function}` out of alphabetical order; expected before `{prev}`")]
    ParamOrder {
        function: String,
        param: String,
        prev: String,
        span: Span,
    },

    #[error("effect !{effect} out of canonical order; expected before !{prev}")]
    EffectOrder {
        effect: &'static str,
        prev: &'static str,
        span: Span,
    },

    #[error("extern member `{member}` out of alphabetical order; expected before `{prev}`")]
    ExternMemberOrder {
        member: String,
        prev: String,
        span: Span,
    },

    #[error("declaration category out of order: {found} after {prev}; required order is types, externs, imports, consts, functions, tests")]
    DeclCategoryOrder {
        found: &'static str,
        prev: &'static str,
        span: Span,
    },

    #[error("declaration `{name}` out of alphabetical order; expected before `{prev}`")]
    DeclAlphabetical {
        name: String,
        prev: String,
        span: Span,
    },

    #[error("exported declaration `{name}` must come before private declaration `{prev}`")]
    DeclExportOrder {
        name: String,
        prev: String,
        span: Span,
    },

    #[error("file has neither a `main` function nor exported declarations; it must be an executable or a library")]
    FilePurposeNone { span: Span },

    #[error("file defines `main` and also exports declarations; it cannot be both executable and library")]
    FilePurposeBoth { span: Span },

    #[error("test declarations are only allowed under a tests/ directory: {path}")]
    TestPath { path: String, span: Span },

    #[error("file name must be lowercase: {path}")]
    FilenameCase { path: String },

    #[error("file name must use hyphens for word separation, not `{found}`: {path}")]
    FilenameChar { found: char, path: String },
}

impl CanonError {
    /// Stable diagnostic code for the external reporting layer
    pub fn code(&self) -> &'static str {
        match self {
            CanonError::Duplicate { category, .. } => match *category {
                "function" => "SLATE-CANON-DUPLICATE-FUNCTION",
                "type" => "SLATE-CANON-DUPLICATE-TYPE",
                "constructor" => "SLATE-CANON-DUPLICATE-CONSTRUCTOR",
                "const" => "SLATE-CANON-DUPLICATE-CONST",
                "extern" => "SLATE-CANON-DUPLICATE-EXTERN",
                "import" => "SLATE-CANON-DUPLICATE-IMPORT",
                "test" => "SLATE-CANON-DUPLICATE-TEST",
                "parameter" => "SLATE-CANON-DUPLICATE-PARAM",
                "effect" => "SLATE-CANON-DUPLICATE-EFFECT",
                "extern member" => "SLATE-CANON-DUPLICATE-EXTERN-MEMBER",
                "record field" => "SLATE-CANON-DUPLICATE-RECORD-FIELD",
                _ => "SLATE-CANON-DUPLICATE",
            },
            CanonError::RecursionAccumulator { .. } => "SLATE-CANON-RECURSION-ACCUMULATOR",
            CanonError::RecursionCps { .. } => "SLATE-CANON-RECURSION-CPS",
            CanonError::RecursionCollection { .. } => "SLATE-CANON-RECURSION-COLLECTION",
            CanonError::MatchBoolean { .. } => "SLATE-CANON-MATCH-BOOLEAN",
            CanonError::MatchTupleBoolean { .. } => "SLATE-CANON-MATCH-TUPLE-BOOLEAN",
            CanonError::PatternRedundant { .. } => "SLATE-CANON-PATTERN-REDUNDANT",
            CanonError::PatternUnreachable { .. } => "SLATE-CANON-PATTERN-UNREACHABLE",
            CanonError::MissingReturnType { .. } => "SLATE-SURFACE-MISSING-RETURN-TYPE",
            CanonError::MissingParamType { .. } => "SLATE-SURFACE-MISSING-PARAM-TYPE",
            CanonError::LetUntyped { .. } => "SLATE-CANON-LET-UNTYPED",
            CanonError::ConstUntyped { .. } => "SLATE-CANON-CONST-UNTYPED",
            CanonError::ParamOrder { .. } => "SLATE-CANON-PARAM-ORDER",
            CanonError::EffectOrder { .. } => "SLATE-CANON-EFFECT-ORDER",
            CanonError::ExternMemberOrder { .. } => "SLATE-CANON-EXTERN-MEMBER-ORDER",
            CanonError::DeclCategoryOrder { .. } => "SLATE-CANON-DECL-CATEGORY-ORDER",
            CanonError::DeclAlphabetical { .. } => "SLATE-CANON-DECL-ALPHABETICAL",
            CanonError::DeclExportOrder { .. } => "SLATE-CANON-DECL-EXPORT-ORDER",
            CanonError::FilePurposeNone { .. } => "SLATE-CANON-FILE-PURPOSE-NONE",
            CanonError::FilePurposeBoth { .. } => "SLATE-CANON-FILE-PURPOSE-BOTH",
            CanonError::TestPath { .. } => "SLATE-CANON-TEST-PATH",
            CanonError::FilenameCase { .. } => "SLATE-CANON-FILENAME-CASE",
            CanonError::FilenameChar { .. } => "SLATE-CANON-FILENAME-CHAR",
        }
    }

    pub fn span(&self) -> Option<&Span> {
        match self {
            CanonError::Duplicate { span, .. }
            | CanonError::RecursionAccumulator { span, .. }
            | CanonError::RecursionCps { span, .. }
            | CanonError::RecursionCollection { span, .. }
            | CanonError::MatchBoolean { span }
            | CanonError::MatchTupleBoolean { span }
            | CanonError::PatternRedundant { span }
            | CanonError::PatternUnreachable { span }
            | CanonError::MissingReturnType { span, .. }
            | CanonError::MissingParamType { span, .. }
            | CanonError::LetUntyped { span, .. }
            | CanonError::ConstUntyped { span, .. }
            | CanonError::ParamOrder { span, .. }
            | CanonError::EffectOrder { span, .. }
            | CanonError::ExternMemberOrder { span, .. }
            | CanonError::DeclCategoryOrder { span, .. }
            | CanonError::DeclAlphabetical { span, .. }
            | CanonError::DeclExportOrder { span, .. }
            | CanonError::FilePurposeNone { span }
            | CanonError::FilePurposeBoth { span }
            | CanonError::TestPath { span, .. } => Some(span),
            CanonError::FilenameCase { .. } | CanonError::FilenameChar { .. } => None,
        }
    }
}

// ============================================================================
// Parameter roles
// ============================================================================

/// How a parameter evolves across the recursive call sites of its function.
///
/// Ordering is dominance: any accumulator vote dominates, then structural,
/// then query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Role {
    Query,
    Structural,
    Accumulator,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Query => write!(f, "query"),
            Role::Structural => write!(f, "structural"),
            Role::Accumulator => write!(f, "accumulator"),
        }
    }
}

/// Where a bound name came from, relative to the enclosing function's
/// parameters. `shrank` is true once the name was produced by destructuring,
/// so passing it back recursively is a structural step.
#[derive(Debug, Clone)]
struct Derivation {
    root: String,
    shrank: bool,
}

type Scope = HashMap<String, Derivation>;

/// A self-recursive call site: its argument list and the bindings in scope
struct CallSite<'a> {
    args: &'a [Expr],
    scope: Scope,
}

// ============================================================================
// Entry point
// ============================================================================

/// Validate a whole program. Returns the first violation found; a program
/// that returns `Ok` is in canonical form and may be type checked.
pub fn validate_program(program: &Program, options: &ValidateOptions) -> Result<(), CanonError> {
    if let Some(path) = &options.file_path {
        validate_file_name(path)?;
    }
    validate_no_duplicates(program)?;
    validate_decl_order(program)?;
    validate_file_purpose(program)?;
    if let Some(path) = &options.file_path {
        validate_test_location(program, path)?;
    }

    let record_types = record_type_names(program);
    for decl in &program.decls {
        match decl {
            Decl::Function(func) => validate_function(func, &record_types)?,
            Decl::Const(c) => validate_const(c)?,
            Decl::Test(t) => {
                validate_effect_order(&t.effects, &t.span)?;
                validate_expr(&t.body)?;
            }
            Decl::Extern(e) => validate_extern_members(e)?,
            Decl::Type(_) | Decl::Import(_) => {}
        }
    }
    Ok(())
}

/// Classify every parameter of a function against its self-recursive call
/// sites. A function with no such sites classifies everything as query.
pub fn classify_parameters(func: &FunctionDecl, program: &Program) -> Vec<(String, Role)> {
    let record_types = record_type_names(program);
    classify_all(func, &record_types)
        .into_iter()
        .enumerate()
        .map(|(i, role)| (func.params[i].name.clone(), role))
        .collect()
}

// ============================================================================
// Program-level rules
// ============================================================================

fn validate_file_name(path: &str) -> Result<(), CanonError> {
    let basename = Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    for c in basename.chars() {
        if c.is_uppercase() {
            return Err(CanonError::FilenameCase {
                path: path.to_string(),
            });
        }
        if c == '_' || c == ' ' {
            return Err(CanonError::FilenameChar {
                found: c,
                path: path.to_string(),
            });
        }
    }
    Ok(())
}

fn validate_test_location(program: &Program, path: &str) -> Result<(), CanonError> {
    let in_tests_dir = Path::new(path)
        .components()
        .any(|c| c.as_os_str() == "tests");
    if in_tests_dir {
        return Ok(());
    }
    for decl in &program.decls {
        if let Decl::Test(t) = decl {
            return Err(CanonError::TestPath {
                path: path.to_string(),
                span: t.span.clone(),
            });
        }
    }
    Ok(())
}

fn validate_no_duplicates(program: &Program) -> Result<(), CanonError> {
    let mut seen: HashMap<&'static str, HashMap<String, Span>> = HashMap::new();

    let mut record = |category: &'static str, name: String, span: &Span| {
        let entries = seen.entry(category).or_default();
        match entries.get(&name) {
            Some(first) => Err(CanonError::Duplicate {
                category,
                name,
                span: span.clone(),
                first: first.clone(),
            }),
            None => {
                entries.insert(name, span.clone());
                Ok(())
            }
        }
    };

    for decl in &program.decls {
        match decl {
            Decl::Function(d) => record("function", d.name.clone(), &d.span)?,
            Decl::Type(d) => {
                record("type", d.name.clone(), &d.span)?;
                if let crate::ast::TypeDef::Sum(variants) = &d.def {
                    for v in variants {
                        record("constructor", v.name.clone(), &v.span)?;
                    }
                }
            }
            Decl::Const(d) => record("const", d.name.clone(), &d.span)?,
            Decl::Import(d) => record("import", d.path.join("⋅"), &d.span)?,
            Decl::Extern(d) => record("extern", d.path.join("⋅"), &d.span)?,
            Decl::Test(d) => record("test", d.description.clone(), &d.span)?,
        }
    }
    Ok(())
}

fn decl_category(decl: &Decl) -> (u8, &'static str) {
    match decl {
        Decl::Type(_) => (0, "types"),
        Decl::Extern(_) => (1, "externs"),
        Decl::Import(_) => (2, "imports"),
        Decl::Const(_) => (3, "consts"),
        Decl::Function(_) => (4, "functions"),
        Decl::Test(_) => (5, "tests"),
    }
}

fn decl_order_name(decl: &Decl) -> String {
    match decl {
        Decl::Function(d) => d.name.clone(),
        Decl::Type(d) => d.name.clone(),
        Decl::Const(d) => d.name.clone(),
        Decl::Import(d) => d.path.join("⋅"),
        Decl::Extern(d) => d.path.join("⋅"),
        Decl::Test(d) => d.description.clone(),
    }
}

fn validate_decl_order(program: &Program) -> Result<(), CanonError> {
    for pair in program.decls.windows(2) {
        let (prev, cur) = (&pair[0], &pair[1]);
        let (prev_rank, prev_cat) = decl_category(prev);
        let (cur_rank, cur_cat) = decl_category(cur);

        if cur_rank < prev_rank {
            return Err(CanonError::DeclCategoryOrder {
                found: cur_cat,
                prev: prev_cat,
                span: cur.span().clone(),
            });
        }
        if cur_rank == prev_rank {
            let prev_name = decl_order_name(prev);
            let cur_name = decl_order_name(cur);
            if cur.exported() && !prev.exported() {
                return Err(CanonError::DeclExportOrder {
                    name: cur_name,
                    prev: prev_name,
                    span: cur.span().clone(),
                });
            }
            if cur.exported() == prev.exported() && cur_name < prev_name {
                return Err(CanonError::DeclAlphabetical {
                    name: cur_name,
                    prev: prev_name,
                    span: cur.span().clone(),
                });
            }
        }
    }
    Ok(())
}

fn validate_file_purpose(program: &Program) -> Result<(), CanonError> {
    let mut has_main = false;
    let mut main_span = Span::default();
    let mut has_exports = false;
    let mut has_tests = false;

    for decl in &program.decls {
        if let Decl::Function(f) = decl {
            if f.name == "main" {
                has_main = true;
                main_span = f.span.clone();
            }
        }
        if let Decl::Test(_) = decl {
            has_tests = true;
        }
        if decl.exported() {
            has_exports = true;
        }
    }

    if has_main && has_exports {
        return Err(CanonError::FilePurposeBoth { span: main_span });
    }
    if !has_main && !has_exports && !has_tests {
        return Err(CanonError::FilePurposeNone {
            span: Span::default(),
        });
    }
    Ok(())
}

// ============================================================================
// Declaration-level rules
// ============================================================================

fn validate_function(
    func: &FunctionDecl,
    record_types: &HashSet<String>,
) -> Result<(), CanonError> {
    if func.return_type.is_none() {
        return Err(CanonError::MissingReturnType {
            function: func.name.clone(),
            span: func.span.clone(),
        });
    }
    for p in &func.params {
        if p.ty.is_none() {
            return Err(CanonError::MissingParamType {
                param: p.name.clone(),
                span: p.span.clone(),
            });
        }
    }

    // Recursion shape comes before the lexical ordering rules so an
    // accumulator encoding is reported as such, not as a name-order slip.
    validate_recursion(func, record_types)?;

    validate_param_order(func)?;
    validate_effect_order(&func.effects, &func.span)?;
    validate_expr(&func.body)
}

fn validate_const(c: &ConstDecl) -> Result<(), CanonError> {
    if c.ty.is_none() {
        return Err(CanonError::ConstUntyped {
            name: c.name.clone(),
            span: c.span.clone(),
        });
    }
    validate_expr(&c.value)
}

fn validate_param_order(func: &FunctionDecl) -> Result<(), CanonError> {
    for pair in func.params.windows(2) {
        let (prev, cur) = (&pair[0], &pair[1]);
        if cur.name == prev.name {
            return Err(CanonError::Duplicate {
                category: "parameter",
                name: cur.name.clone(),
                span: cur.span.clone(),
                first: prev.span.clone(),
            });
        }
        if cur.name < prev.name {
            return Err(CanonError::ParamOrder {
                function: func.name.clone(),
                param: cur.name.clone(),
                prev: prev.name.clone(),
                span: cur.span.clone(),
            });
        }
    }
    Ok(())
}

fn validate_effect_order(effects: &[crate::ast::Effect], span: &Span) -> Result<(), CanonError> {
    for pair in effects.windows(2) {
        let (prev, cur) = (pair[0], pair[1]);
        if cur == prev {
            return Err(CanonError::Duplicate {
                category: "effect",
                name: cur.name().to_string(),
                span: span.clone(),
                first: span.clone(),
            });
        }
        if cur < prev {
            return Err(CanonError::EffectOrder {
                effect: cur.name(),
                prev: prev.name(),
                span: span.clone(),
            });
        }
    }
    Ok(())
}

fn validate_extern_members(decl: &ExternDecl) -> Result<(), CanonError> {
    let Some(members) = &decl.members else {
        return Ok(());
    };
    for pair in members.windows(2) {
        let (prev, cur) = (&pair[0], &pair[1]);
        if cur.name == prev.name {
            return Err(CanonError::Duplicate {
                category: "extern member",
                name: cur.name.clone(),
                span: cur.span.clone(),
                first: prev.span.clone(),
            });
        }
        if cur.name < prev.name {
            return Err(CanonError::ExternMemberOrder {
                member: cur.name.clone(),
                prev: prev.name.clone(),
                span: cur.span.clone(),
            });
        }
    }
    Ok(())
}

// ============================================================================
// Expression-level rules
// ============================================================================

fn validate_expr(expr: &Expr) -> Result<(), CanonError> {
    match &expr.node {
        ExprKind::Lit(_) | ExprKind::Var(_) | ExprKind::MemberAccess { .. } => Ok(()),

        ExprKind::Lambda { params, body, .. } => {
            for p in params {
                if p.ty.is_none() {
                    return Err(CanonError::MissingParamType {
                        param: p.name.clone(),
                        span: p.span.clone(),
                    });
                }
            }
            validate_expr(body)
        }

        ExprKind::App { func, args } => {
            validate_expr(func)?;
            for a in args {
                validate_expr(a)?;
            }
            Ok(())
        }

        ExprKind::BinOp { left, right, .. } | ExprKind::Pipeline { left, right, .. } => {
            validate_expr(left)?;
            validate_expr(right)
        }

        ExprKind::UnaryOp { operand, .. } => validate_expr(operand),

        ExprKind::If {
            cond,
            then_branch,
            else_branch,
        } => {
            validate_expr(cond)?;
            validate_expr(then_branch)?;
            validate_expr(else_branch)
        }

        ExprKind::Match { scrutinee, arms } => {
            validate_match(scrutinee, arms)?;
            validate_expr(scrutinee)?;
            for arm in arms {
                if let Some(guard) = &arm.guard {
                    validate_expr(guard)?;
                }
                validate_expr(&arm.body)?;
            }
            Ok(())
        }

        ExprKind::Let {
            pattern,
            ty,
            value,
            body,
        } => {
            if ty.is_none() {
                return Err(CanonError::LetUntyped {
                    name: pattern_display_name(pattern),
                    span: pattern.span.clone(),
                });
            }
            validate_expr(value)?;
            validate_expr(body)
        }

        ExprKind::List(items) | ExprKind::Tuple(items) => {
            for item in items {
                validate_expr(item)?;
            }
            Ok(())
        }

        ExprKind::Record { fields } => {
            let mut seen: HashMap<&str, &Span> = HashMap::new();
            for (name, value) in fields {
                if let Some(first) = seen.insert(name.as_str(), &value.span) {
                    return Err(CanonError::Duplicate {
                        category: "record field",
                        name: name.clone(),
                        span: value.span.clone(),
                        first: first.clone(),
                    });
                }
                validate_expr(value)?;
            }
            Ok(())
        }

        ExprKind::FieldAccess { record, .. } => validate_expr(record),

        ExprKind::Map { list, func } => {
            validate_expr(list)?;
            validate_expr(func)
        }
        ExprKind::Filter { list, predicate } => {
            validate_expr(list)?;
            validate_expr(predicate)
        }
        ExprKind::Fold { list, func, init } => {
            validate_expr(list)?;
            validate_expr(func)?;
            validate_expr(init)
        }
    }
}

fn validate_match(scrutinee: &Expr, arms: &[MatchArm]) -> Result<(), CanonError> {
    if is_boolean_shaped(scrutinee) {
        return Err(CanonError::MatchBoolean {
            span: scrutinee.span.clone(),
        });
    }
    if let ExprKind::Tuple(items) = &scrutinee.node {
        if items.iter().any(is_boolean_shaped) {
            return Err(CanonError::MatchTupleBoolean {
                span: scrutinee.span.clone(),
            });
        }
    }

    for (i, arm) in arms.iter().enumerate() {
        for prev in &arms[..i] {
            if prev.guard.is_none() && prev.pattern.node.is_irrefutable() {
                return Err(CanonError::PatternUnreachable {
                    span: arm.pattern.span.clone(),
                });
            }
            if prev.guard.is_none()
                && arm.guard.is_none()
                && patterns_equal(&prev.pattern, &arm.pattern)
            {
                return Err(CanonError::PatternRedundant {
                    span: arm.pattern.span.clone(),
                });
            }
        }
    }
    Ok(())
}

/// An expression whose value is a truth value by its very shape, which a
/// match would discriminate where an if-expression is the canonical form
fn is_boolean_shaped(expr: &Expr) -> bool {
    match &expr.node {
        ExprKind::Lit(Literal::Bool(_)) => true,
        ExprKind::UnaryOp {
            op: UnaryOp::Not, ..
        } => true,
        ExprKind::BinOp { op, .. } => matches!(
            op,
            BinOp::Eq
                | BinOp::NotEq
                | BinOp::Lt
                | BinOp::Gt
                | BinOp::LtEq
                | BinOp::GtEq
                | BinOp::And
                | BinOp::Or
        ),
        _ => false,
    }
}

fn literals_equal(a: &Literal, b: &Literal) -> bool {
    match (a, b) {
        (Literal::Int(x), Literal::Int(y)) => x == y,
        (Literal::Float(x), Literal::Float(y)) => x == y,
        (Literal::Bool(x), Literal::Bool(y)) => x == y,
        (Literal::String(x), Literal::String(y)) => x == y,
        (Literal::Char(x), Literal::Char(y)) => x == y,
        (Literal::Unit, Literal::Unit) => true,
        _ => false,
    }
}

fn patterns_equal(a: &Pattern, b: &Pattern) -> bool {
    match (&a.node, &b.node) {
        (PatternKind::Wildcard, PatternKind::Wildcard) => true,
        (PatternKind::Var(x), PatternKind::Var(y)) => x == y,
        (PatternKind::Lit(x), PatternKind::Lit(y)) => literals_equal(x, y),
        (PatternKind::Tuple(xs), PatternKind::Tuple(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| patterns_equal(x, y))
        }
        (
            PatternKind::List {
                elements: xs,
                rest: rx,
            },
            PatternKind::List {
                elements: ys,
                rest: ry,
            },
        ) => {
            xs.len() == ys.len()
                && rx == ry
                && xs.iter().zip(ys).all(|(x, y)| patterns_equal(x, y))
        }
        (
            PatternKind::Ctor { name: nx, args: xs },
            PatternKind::Ctor { name: ny, args: ys },
        ) => nx == ny && xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| patterns_equal(x, y)),
        _ => false,
    }
}

fn pattern_display_name(pattern: &Pattern) -> String {
    match &pattern.node {
        PatternKind::Var(name) => name.clone(),
        PatternKind::Wildcard => "_".to_string(),
        PatternKind::Lit(_) => "literal".to_string(),
        PatternKind::Tuple(_) => "tuple binding".to_string(),
        PatternKind::List { .. } => "list binding".to_string(),
        PatternKind::Ctor { name, .. } => name.clone(),
    }
}

// ============================================================================
// Recursion analysis
// ============================================================================

fn record_type_names(program: &Program) -> HashSet<String> {
    program
        .decls
        .iter()
        .filter_map(|d| match d {
            Decl::Type(t) => match t.def {
                crate::ast::TypeDef::Record(_) => Some(t.name.clone()),
                _ => None,
            },
            _ => None,
        })
        .collect()
}

fn validate_recursion(
    func: &FunctionDecl,
    record_types: &HashSet<String>,
) -> Result<(), CanonError> {
    let scope = initial_scope(func);
    let mut sites = Vec::new();
    collect_call_sites(&func.name, &func.body, &scope, &mut sites);
    if sites.is_empty() {
        return Ok(());
    }

    if let Some(ret) = &func.return_type {
        if matches!(ret.node, TypeExprKind::Fn { .. }) {
            return Err(CanonError::RecursionCps {
                function: func.name.clone(),
                span: func.span.clone(),
            });
        }
    }

    let roles = classify_against_sites(func, &sites, record_types);
    let accumulators: Vec<String> = func
        .params
        .iter()
        .zip(&roles)
        .filter(|(_, role)| **role == Role::Accumulator)
        .map(|(p, _)| p.name.clone())
        .collect();
    if !accumulators.is_empty() {
        return Err(CanonError::RecursionAccumulator {
            function: func.name.clone(),
            params: accumulators,
            span: func.span.clone(),
        });
    }

    // A lone list parameter must actually be taken apart; anything else is
    // iteration wearing recursion's clothes.
    if func.params.len() == 1 {
        let p = &func.params[0];
        if is_list_annotation(p.ty.as_ref()) && !destructures_list(&func.body, &p.name) {
            return Err(CanonError::RecursionCollection {
                function: func.name.clone(),
                param: p.name.clone(),
                span: func.span.clone(),
            });
        }
    }

    Ok(())
}

fn classify_all(func: &FunctionDecl, record_types: &HashSet<String>) -> Vec<Role> {
    let scope = initial_scope(func);
    let mut sites = Vec::new();
    collect_call_sites(&func.name, &func.body, &scope, &mut sites);
    classify_against_sites(func, &sites, record_types)
}

fn classify_against_sites(
    func: &FunctionDecl,
    sites: &[CallSite<'_>],
    record_types: &HashSet<String>,
) -> Vec<Role> {
    (0..func.params.len())
        .map(|i| {
            let param = &func.params[i];
            let mut role = Role::Query;
            for site in sites {
                let vote = match site.args.get(i) {
                    Some(arg) => classify_arg(
                        &param.name,
                        arg,
                        &site.scope,
                        func,
                        param.ty.as_ref(),
                        record_types,
                    ),
                    // Misaligned arity: nothing provable about this parameter
                    None => Role::Accumulator,
                };
                role = role.max(vote);
            }
            role
        })
        .collect()
}

fn initial_scope(func: &FunctionDecl) -> Scope {
    func.params
        .iter()
        .map(|p| {
            (
                p.name.clone(),
                Derivation {
                    root: p.name.clone(),
                    shrank: false,
                },
            )
        })
        .collect()
}

/// Walk the body collecting every `f(...)` where `f` is the function's own
/// name, together with the derivation scope live at that point.
fn collect_call_sites<'a>(
    fname: &str,
    expr: &'a Expr,
    scope: &Scope,
    out: &mut Vec<CallSite<'a>>,
) {
    match &expr.node {
        ExprKind::Lit(_) | ExprKind::Var(_) | ExprKind::MemberAccess { .. } => {}

        ExprKind::App { func, args } => {
            if let ExprKind::Var(name) = &func.node {
                if name == fname {
                    out.push(CallSite {
                        args,
                        scope: scope.clone(),
                    });
                }
            }
            collect_call_sites(fname, func, scope, out);
            for a in args {
                collect_call_sites(fname, a, scope, out);
            }
        }

        ExprKind::Lambda { params, body, .. } => {
            let mut inner = scope.clone();
            for p in params {
                inner.remove(&p.name);
            }
            collect_call_sites(fname, body, &inner, out);
        }

        ExprKind::BinOp { left, right, .. } | ExprKind::Pipeline { left, right, .. } => {
            collect_call_sites(fname, left, scope, out);
            collect_call_sites(fname, right, scope, out);
        }

        ExprKind::UnaryOp { operand, .. } => collect_call_sites(fname, operand, scope, out),

        ExprKind::If {
            cond,
            then_branch,
            else_branch,
        } => {
            collect_call_sites(fname, cond, scope, out);
            collect_call_sites(fname, then_branch, scope, out);
            collect_call_sites(fname, else_branch, scope, out);
        }

        ExprKind::Match { scrutinee, arms } => {
            collect_call_sites(fname, scrutinee, scope, out);
            let source = derivation_of(scrutinee, scope);
            for arm in arms {
                let mut inner = scope.clone();
                bind_pattern(&arm.pattern, &source, &mut inner);
                if let Some(guard) = &arm.guard {
                    collect_call_sites(fname, guard, &inner, out);
                }
                collect_call_sites(fname, &arm.body, &inner, out);
            }
        }

        ExprKind::Let {
            pattern,
            value,
            body,
            ..
        } => {
            collect_call_sites(fname, value, scope, out);
            let source = derivation_of(value, scope);
            let mut inner = scope.clone();
            bind_pattern(pattern, &source, &mut inner);
            collect_call_sites(fname, body, &inner, out);
        }

        ExprKind::List(items) | ExprKind::Tuple(items) => {
            for item in items {
                collect_call_sites(fname, item, scope, out);
            }
        }

        ExprKind::Record { fields } => {
            for (_, value) in fields {
                collect_call_sites(fname, value, scope, out);
            }
        }

        ExprKind::FieldAccess { record, .. } => collect_call_sites(fname, record, scope, out),

        ExprKind::Map { list, func } => {
            collect_call_sites(fname, list, scope, out);
            collect_call_sites(fname, func, scope, out);
        }
        ExprKind::Filter { list, predicate } => {
            collect_call_sites(fname, list, scope, out);
            collect_call_sites(fname, predicate, scope, out);
        }
        ExprKind::Fold { list, func, init } => {
            collect_call_sites(fname, list, scope, out);
            collect_call_sites(fname, func, scope, out);
            collect_call_sites(fname, init, scope, out);
        }
    }
}

/// What a scrutinee/let value is, in terms of the enclosing parameters
fn derivation_of(expr: &Expr, scope: &Scope) -> Option<Derivation> {
    match &expr.node {
        ExprKind::Var(name) => scope.get(name).cloned(),
        ExprKind::FieldAccess { record, .. } => {
            derivation_of(record, scope).map(|d| Derivation {
                root: d.root,
                shrank: true,
            })
        }
        _ => None,
    }
}

/// Record what a pattern's bindings are derived from. A top-level variable
/// pattern aliases the source unchanged; bindings inside structure are
/// shrunk parts. A binding whose source is unknown shadows any outer
/// derivation of the same name.
fn bind_pattern(pattern: &Pattern, source: &Option<Derivation>, scope: &mut Scope) {
    match &pattern.node {
        PatternKind::Wildcard | PatternKind::Lit(_) => {}

        PatternKind::Var(name) => match source {
            Some(d) => {
                scope.insert(name.clone(), d.clone());
            }
            None => {
                scope.remove(name);
            }
        },

        PatternKind::Tuple(parts) | PatternKind::Ctor { args: parts, .. } => {
            let part = shrunk(source);
            for p in parts {
                bind_pattern(p, &part, scope);
            }
        }

        PatternKind::List { elements, rest } => {
            let part = shrunk(source);
            for p in elements {
                bind_pattern(p, &part, scope);
            }
            if let Some(name) = rest {
                match &part {
                    Some(d) => {
                        scope.insert(name.clone(), d.clone());
                    }
                    None => {
                        scope.remove(name);
                    }
                }
            }
        }
    }
}

fn shrunk(source: &Option<Derivation>) -> Option<Derivation> {
    source.as_ref().map(|d| Derivation {
        root: d.root.clone(),
        shrank: true,
    })
}

/// The classifier core: one parameter against one argument expression.
///
/// Fail-closed. The only accepted shrinking forms are the ones that can be
/// read off the syntax; everything else votes accumulator even when it
/// happens to shrink at runtime.
fn classify_arg(
    param: &str,
    arg: &Expr,
    scope: &Scope,
    func: &FunctionDecl,
    param_ty: Option<&TypeExpr>,
    record_types: &HashSet<String>,
) -> Role {
    match &arg.node {
        ExprKind::Var(name) => match scope.get(name) {
            Some(d) if d.root == param => {
                if d.shrank {
                    Role::Structural
                } else {
                    Role::Query
                }
            }
            // Unchanged sibling parameter: the swap form
            Some(d) if !d.shrank && is_param_of(func, &d.root) => Role::Structural,
            _ => Role::Accumulator,
        },

        // Decrement by a positive step: n - 1
        ExprKind::BinOp {
            op: BinOp::Sub,
            left,
            right,
        } if refers_to_param(left, param, scope) && int_literal_at_least(right, 1) => {
            Role::Structural
        }

        // Halving and friends: n / 2
        ExprKind::BinOp {
            op: BinOp::Div,
            left,
            right,
        } if refers_to_param(left, param, scope) && int_literal_at_least(right, 2) => {
            Role::Structural
        }

        // Modulo with the parameter as divisor: a % b shrinks b strictly.
        // The dividend position is not provable (a % b can equal a), so it
        // falls through to accumulator.
        ExprKind::BinOp {
            op: BinOp::Mod,
            right,
            ..
        } if refers_to_param(right, param, scope) => Role::Structural,

        // Field extraction: p.field is a part of p
        ExprKind::FieldAccess { record, .. } if refers_to_param(record, param, scope) => {
            Role::Structural
        }

        // Rebuilt aggregate for an aggregate-typed parameter: inspect each
        // component as if it were a flat parameter, so an accumulator
        // smuggled in one field still dominates.
        ExprKind::Tuple(items) if is_tuple_annotation(param_ty) => items
            .iter()
            .map(|item| classify_arg(param, item, scope, func, None, record_types))
            .max()
            .unwrap_or(Role::Query),

        ExprKind::Record { fields } if is_record_annotation(param_ty, record_types) => fields
            .iter()
            .map(|(_, value)| classify_arg(param, value, scope, func, None, record_types))
            .max()
            .unwrap_or(Role::Query),

        _ => Role::Accumulator,
    }
}

fn is_param_of(func: &FunctionDecl, name: &str) -> bool {
    func.params.iter().any(|p| p.name == name)
}

/// The parameter itself, an alias of it, or a destructured part of it
fn refers_to_param(expr: &Expr, param: &str, scope: &Scope) -> bool {
    match &expr.node {
        ExprKind::Var(name) => scope.get(name).is_some_and(|d| d.root == param),
        ExprKind::FieldAccess { record, .. } => refers_to_param(record, param, scope),
        _ => false,
    }
}

fn int_literal_at_least(expr: &Expr, min: i64) -> bool {
    matches!(&expr.node, ExprKind::Lit(Literal::Int(n)) if *n >= min)
}

fn is_list_annotation(ty: Option<&TypeExpr>) -> bool {
    matches!(ty.map(|t| &t.node), Some(TypeExprKind::List(_)))
}

fn is_tuple_annotation(ty: Option<&TypeExpr>) -> bool {
    matches!(ty.map(|t| &t.node), Some(TypeExprKind::Tuple(_)))
}

fn is_record_annotation(ty: Option<&TypeExpr>, record_types: &HashSet<String>) -> bool {
    match ty.map(|t| &t.node) {
        Some(TypeExprKind::Record(_)) => true,
        Some(TypeExprKind::Named { name, .. }) => record_types.contains(name),
        _ => false,
    }
}

/// Does the body ever take this list parameter apart with a list pattern?
fn destructures_list(expr: &Expr, param: &str) -> bool {
    let matches_param = |scrutinee: &Expr| matches!(&scrutinee.node, ExprKind::Var(n) if n == param);
    match &expr.node {
        ExprKind::Lit(_) | ExprKind::Var(_) | ExprKind::MemberAccess { .. } => false,

        ExprKind::Match { scrutinee, arms } => {
            if matches_param(scrutinee)
                && arms
                    .iter()
                    .any(|arm| matches!(arm.pattern.node, PatternKind::List { .. }))
            {
                return true;
            }
            destructures_list(scrutinee, param)
                || arms.iter().any(|arm| {
                    arm.guard
                        .as_ref()
                        .is_some_and(|g| destructures_list(g, param))
                        || destructures_list(&arm.body, param)
                })
        }

        ExprKind::Let {
            pattern,
            value,
            body,
            ..
        } => {
            (matches_param(value) && matches!(pattern.node, PatternKind::List { .. }))
                || destructures_list(value, param)
                || destructures_list(body, param)
        }

        ExprKind::Lambda { body, .. } => destructures_list(body, param),
        ExprKind::App { func, args } => {
            destructures_list(func, param) || args.iter().any(|a| destructures_list(a, param))
        }
        ExprKind::BinOp { left, right, .. } | ExprKind::Pipeline { left, right, .. } => {
            destructures_list(left, param) || destructures_list(right, param)
        }
        ExprKind::UnaryOp { operand, .. } => destructures_list(operand, param),
        ExprKind::If {
            cond,
            then_branch,
            else_branch,
        } => {
            destructures_list(cond, param)
                || destructures_list(then_branch, param)
                || destructures_list(else_branch, param)
        }
        ExprKind::List(items) | ExprKind::Tuple(items) => {
            items.iter().any(|i| destructures_list(i, param))
        }
        ExprKind::Record { fields } => fields.iter().any(|(_, v)| destructures_list(v, param)),
        ExprKind::FieldAccess { record, .. } => destructures_list(record, param),
        ExprKind::Map { list, func } => {
            destructures_list(list, param) || destructures_list(func, param)
        }
        ExprKind::Filter { list, predicate } => {
            destructures_list(list, param) || destructures_list(predicate, param)
        }
        ExprKind::Fold { list, func, init } => {
            destructures_list(list, param)
                || destructures_list(func, param)
                || destructures_list(init, param)
        }
    }
}
