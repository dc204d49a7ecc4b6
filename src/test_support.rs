//! Construction helpers for tests
//!
//! Slate's semantic core consumes ASTs, so tests build programs directly
//! with these constructors instead of going through source text. All nodes
//! carry zeroed spans; tests that care about locations build spans with
//! `sp` explicitly.

use std::rc::Rc;

use crate::ast::{
    BinOp, ConstDecl, Effect, Expr, ExprKind, ExternDecl, ExternMember, FunctionDecl, ImportDecl,
    Literal, MatchArm, Param, Pattern, PatternKind, PipeOp, PrimType, Program, RecordField, Span,
    Spanned, TestDecl, TypeDecl, TypeDef, TypeExpr, TypeExprKind, UnaryOp, Variant,
};

pub fn sp(start: usize, end: usize) -> Span {
    Span::new(start, end)
}

fn expr(kind: ExprKind) -> Expr {
    Spanned::new(kind, Span::default())
}

fn pat(kind: PatternKind) -> Pattern {
    Spanned::new(kind, Span::default())
}

fn ty(kind: TypeExprKind) -> TypeExpr {
    Spanned::new(kind, Span::default())
}

// ============================================================================
// Expressions
// ============================================================================

pub fn lit_int(value: i64) -> Expr {
    expr(ExprKind::Lit(Literal::Int(value)))
}

pub fn lit_float(value: f64) -> Expr {
    expr(ExprKind::Lit(Literal::Float(value)))
}

pub fn lit_bool(value: bool) -> Expr {
    expr(ExprKind::Lit(Literal::Bool(value)))
}

pub fn lit_str(value: &str) -> Expr {
    expr(ExprKind::Lit(Literal::String(value.to_string())))
}

pub fn lit_char(value: char) -> Expr {
    expr(ExprKind::Lit(Literal::Char(value)))
}

pub fn lit_unit() -> Expr {
    expr(ExprKind::Lit(Literal::Unit))
}

pub fn var(name: &str) -> Expr {
    expr(ExprKind::Var(name.to_string()))
}

pub fn call(func: Expr, args: Vec<Expr>) -> Expr {
    expr(ExprKind::App {
        func: Rc::new(func),
        args,
    })
}

/// Application of a named function: `f(args…)`
pub fn call_named(name: &str, args: Vec<Expr>) -> Expr {
    call(var(name), args)
}

pub fn binop(op: BinOp, left: Expr, right: Expr) -> Expr {
    expr(ExprKind::BinOp {
        op,
        left: Rc::new(left),
        right: Rc::new(right),
    })
}

pub fn unary(op: UnaryOp, operand: Expr) -> Expr {
    expr(ExprKind::UnaryOp {
        op,
        operand: Rc::new(operand),
    })
}

pub fn if_expr(cond: Expr, then_branch: Expr, else_branch: Expr) -> Expr {
    expr(ExprKind::If {
        cond: Rc::new(cond),
        then_branch: Rc::new(then_branch),
        else_branch: Rc::new(else_branch),
    })
}

pub fn match_expr(scrutinee: Expr, arms: Vec<MatchArm>) -> Expr {
    expr(ExprKind::Match {
        scrutinee: Rc::new(scrutinee),
        arms,
    })
}

pub fn arm(pattern: Pattern, body: Expr) -> MatchArm {
    MatchArm {
        pattern,
        guard: None,
        body,
    }
}

pub fn arm_guarded(pattern: Pattern, guard: Expr, body: Expr) -> MatchArm {
    MatchArm {
        pattern,
        guard: Some(guard),
        body,
    }
}

/// Ascribed let: `l name = (value: T) { body }`
pub fn let_expr(name: &str, ascription: TypeExpr, value: Expr, body: Expr) -> Expr {
    expr(ExprKind::Let {
        pattern: p_var(name),
        ty: Some(ascription),
        value: Rc::new(value),
        body: Rc::new(body),
    })
}

/// A let with no ascription, for exercising the validator
pub fn let_untyped(name: &str, value: Expr, body: Expr) -> Expr {
    expr(ExprKind::Let {
        pattern: p_var(name),
        ty: None,
        value: Rc::new(value),
        body: Rc::new(body),
    })
}

/// A destructuring let: `l (a, b) = (value: T) { body }`
pub fn let_pattern(pattern: Pattern, ascription: TypeExpr, value: Expr, body: Expr) -> Expr {
    expr(ExprKind::Let {
        pattern,
        ty: Some(ascription),
        value: Rc::new(value),
        body: Rc::new(body),
    })
}

pub fn list(items: Vec<Expr>) -> Expr {
    expr(ExprKind::List(items))
}

pub fn tuple(items: Vec<Expr>) -> Expr {
    expr(ExprKind::Tuple(items))
}

pub fn record_lit(fields: Vec<(&str, Expr)>) -> Expr {
    expr(ExprKind::Record {
        fields: fields
            .into_iter()
            .map(|(name, value)| (name.to_string(), value))
            .collect(),
    })
}

pub fn field(record: Expr, name: &str) -> Expr {
    expr(ExprKind::FieldAccess {
        record: Rc::new(record),
        field: name.to_string(),
    })
}

/// Namespace member access: `fs⋅promises⋅readFile`
pub fn member(namespace: &[&str], name: &str) -> Expr {
    expr(ExprKind::MemberAccess {
        namespace: namespace.iter().map(|s| s.to_string()).collect(),
        member: name.to_string(),
    })
}

pub fn lambda(params: Vec<Param>, effects: Vec<Effect>, return_type: TypeExpr, body: Expr) -> Expr {
    expr(ExprKind::Lambda {
        params,
        effects,
        return_type,
        body: Rc::new(body),
    })
}

pub fn pipe(left: Expr, right: Expr) -> Expr {
    expr(ExprKind::Pipeline {
        op: PipeOp::Pipe,
        left: Rc::new(left),
        right: Rc::new(right),
    })
}

pub fn compose(left: Expr, right: Expr) -> Expr {
    expr(ExprKind::Pipeline {
        op: PipeOp::Compose,
        left: Rc::new(left),
        right: Rc::new(right),
    })
}

pub fn map_expr(list: Expr, func: Expr) -> Expr {
    expr(ExprKind::Map {
        list: Rc::new(list),
        func: Rc::new(func),
    })
}

pub fn filter_expr(list: Expr, predicate: Expr) -> Expr {
    expr(ExprKind::Filter {
        list: Rc::new(list),
        predicate: Rc::new(predicate),
    })
}

pub fn fold_expr(list: Expr, func: Expr, init: Expr) -> Expr {
    expr(ExprKind::Fold {
        list: Rc::new(list),
        func: Rc::new(func),
        init: Rc::new(init),
    })
}

// ============================================================================
// Patterns
// ============================================================================

pub fn p_wild() -> Pattern {
    pat(PatternKind::Wildcard)
}

pub fn p_var(name: &str) -> Pattern {
    pat(PatternKind::Var(name.to_string()))
}

pub fn p_int(value: i64) -> Pattern {
    pat(PatternKind::Lit(Literal::Int(value)))
}

pub fn p_bool(value: bool) -> Pattern {
    pat(PatternKind::Lit(Literal::Bool(value)))
}

pub fn p_str(value: &str) -> Pattern {
    pat(PatternKind::Lit(Literal::String(value.to_string())))
}

pub fn p_tuple(parts: Vec<Pattern>) -> Pattern {
    pat(PatternKind::Tuple(parts))
}

/// Exact list pattern: `[]`, `[x, y]`
pub fn p_list(elements: Vec<Pattern>) -> Pattern {
    pat(PatternKind::List {
        elements,
        rest: None,
    })
}

/// List pattern with a rest binding: `[x, .rest]`
pub fn p_list_rest(elements: Vec<Pattern>, rest: &str) -> Pattern {
    pat(PatternKind::List {
        elements,
        rest: Some(rest.to_string()),
    })
}

pub fn p_ctor(name: &str, args: Vec<Pattern>) -> Pattern {
    pat(PatternKind::Ctor {
        name: name.to_string(),
        args,
    })
}

// ============================================================================
// Type expressions
// ============================================================================

pub fn t_int() -> TypeExpr {
    ty(TypeExprKind::Prim(PrimType::Int))
}

pub fn t_float() -> TypeExpr {
    ty(TypeExprKind::Prim(PrimType::Float))
}

pub fn t_bool() -> TypeExpr {
    ty(TypeExprKind::Prim(PrimType::Bool))
}

pub fn t_str() -> TypeExpr {
    ty(TypeExprKind::Prim(PrimType::String))
}

pub fn t_char() -> TypeExpr {
    ty(TypeExprKind::Prim(PrimType::Char))
}

pub fn t_unit() -> TypeExpr {
    ty(TypeExprKind::Prim(PrimType::Unit))
}

pub fn t_list(elem: TypeExpr) -> TypeExpr {
    ty(TypeExprKind::List(Rc::new(elem)))
}

pub fn t_tuple(items: Vec<TypeExpr>) -> TypeExpr {
    ty(TypeExprKind::Tuple(items))
}

pub fn t_fn(params: Vec<TypeExpr>, ret: TypeExpr) -> TypeExpr {
    t_fn_eff(params, vec![], ret)
}

pub fn t_fn_eff(params: Vec<TypeExpr>, effects: Vec<Effect>, ret: TypeExpr) -> TypeExpr {
    ty(TypeExprKind::Fn {
        params,
        effects,
        ret: Rc::new(ret),
    })
}

pub fn t_named(name: &str) -> TypeExpr {
    t_named_args(name, vec![])
}

pub fn t_named_args(name: &str, args: Vec<TypeExpr>) -> TypeExpr {
    ty(TypeExprKind::Named {
        name: name.to_string(),
        args,
    })
}

pub fn t_record(fields: Vec<(&str, TypeExpr)>) -> TypeExpr {
    ty(TypeExprKind::Record(
        fields
            .into_iter()
            .map(|(name, t)| (name.to_string(), t))
            .collect(),
    ))
}

// ============================================================================
// Declarations
// ============================================================================

pub fn param(name: &str, ty: TypeExpr) -> Param {
    Param {
        name: name.to_string(),
        ty: Some(ty),
        span: Span::default(),
    }
}

pub fn param_untyped(name: &str) -> Param {
    Param {
        name: name.to_string(),
        ty: None,
        span: Span::default(),
    }
}

/// An exported, effect-free function with all annotations present
pub fn fn_decl(name: &str, params: Vec<Param>, return_type: TypeExpr, body: Expr) -> FunctionDecl {
    FunctionDecl {
        name: name.to_string(),
        exported: true,
        params,
        effects: vec![],
        return_type: Some(return_type),
        body,
        span: Span::default(),
    }
}

pub fn fn_decl_eff(
    name: &str,
    params: Vec<Param>,
    effects: Vec<Effect>,
    return_type: TypeExpr,
    body: Expr,
) -> FunctionDecl {
    FunctionDecl {
        effects,
        ..fn_decl(name, params, return_type, body)
    }
}

pub fn fn_decl_private(
    name: &str,
    params: Vec<Param>,
    return_type: TypeExpr,
    body: Expr,
) -> FunctionDecl {
    FunctionDecl {
        exported: false,
        ..fn_decl(name, params, return_type, body)
    }
}

pub fn const_decl(name: &str, ty: TypeExpr, value: Expr) -> ConstDecl {
    ConstDecl {
        name: name.to_string(),
        exported: true,
        ty: Some(ty),
        value,
        span: Span::default(),
    }
}

pub fn const_untyped(name: &str, value: Expr) -> ConstDecl {
    ConstDecl {
        ty: None,
        ..const_decl(name, t_unit(), value)
    }
}

pub fn type_sum(name: &str, variants: Vec<(&str, Vec<TypeExpr>)>) -> TypeDecl {
    type_sum_generic(name, vec![], variants)
}

pub fn type_sum_generic(
    name: &str,
    params: Vec<&str>,
    variants: Vec<(&str, Vec<TypeExpr>)>,
) -> TypeDecl {
    TypeDecl {
        name: name.to_string(),
        exported: true,
        params: params.into_iter().map(|p| p.to_string()).collect(),
        def: TypeDef::Sum(
            variants
                .into_iter()
                .map(|(vname, fields)| Variant {
                    name: vname.to_string(),
                    fields,
                    span: Span::default(),
                })
                .collect(),
        ),
        span: Span::default(),
    }
}

pub fn type_record(name: &str, fields: Vec<(&str, TypeExpr)>) -> TypeDecl {
    TypeDecl {
        name: name.to_string(),
        exported: true,
        params: vec![],
        def: TypeDef::Record(
            fields
                .into_iter()
                .map(|(fname, t)| RecordField {
                    name: fname.to_string(),
                    ty: t,
                })
                .collect(),
        ),
        span: Span::default(),
    }
}

pub fn type_alias(name: &str, target: TypeExpr) -> TypeDecl {
    TypeDecl {
        name: name.to_string(),
        exported: true,
        params: vec![],
        def: TypeDef::Alias(target),
        span: Span::default(),
    }
}

/// FFI declaration, optionally with typed members
pub fn extern_decl(path: &[&str], members: Option<Vec<(&str, TypeExpr)>>) -> ExternDecl {
    ExternDecl {
        path: path.iter().map(|s| s.to_string()).collect(),
        members: members.map(|list| {
            list.into_iter()
                .map(|(name, t)| ExternMember {
                    name: name.to_string(),
                    ty: t,
                    span: Span::default(),
                })
                .collect()
        }),
        span: Span::default(),
    }
}

pub fn import_decl(path: &[&str]) -> ImportDecl {
    ImportDecl {
        path: path.iter().map(|s| s.to_string()).collect(),
        span: Span::default(),
    }
}

pub fn test_decl(description: &str, body: Expr) -> TestDecl {
    TestDecl {
        description: description.to_string(),
        effects: vec![],
        body,
        span: Span::default(),
    }
}

pub fn test_decl_eff(description: &str, effects: Vec<Effect>, body: Expr) -> TestDecl {
    TestDecl {
        effects,
        ..test_decl(description, body)
    }
}

pub fn program(decls: Vec<crate::ast::Decl>) -> Program {
    Program { decls }
}
