//! Property-based tests for the Slate analysis pipeline
//!
//! These verify invariants that hold over generated inputs rather than
//! hand-picked programs:
//! - Structural type equality is reflexive and symmetric, with Any absorbing
//! - Parameter classification is deterministic and matches the role each
//!   generated argument shape was built to have
//! - Aggregate arguments take the most severe role of their components
//! - The first match arm fixes the type of a match in synthesis position
//! - Declared effects must cover performed effects, exactly

use proptest::prelude::*;

use slate::ast::{BinOp, Decl, Effect, Expr, FunctionDecl};
use slate::test_support::*;
use slate::{
    check_program, classify_parameters, types_equal, validate_program, Role, Type, TypeError,
    ValidateOptions,
};

// ============================================================================
// Generators
// ============================================================================

/// Generate a ground type with no Any inside
fn arb_ground_type(depth: usize) -> BoxedStrategy<Type> {
    if depth == 0 {
        prop_oneof![
            Just(Type::Int),
            Just(Type::Float),
            Just(Type::Bool),
            Just(Type::String),
            Just(Type::Char),
            Just(Type::Unit),
        ]
        .boxed()
    } else {
        prop_oneof![
            4 => arb_ground_type(0),
            1 => arb_ground_type(depth - 1).prop_map(Type::list),
            1 => prop::collection::vec(arb_ground_type(depth - 1), 2..=3).prop_map(Type::Tuple),
        ]
        .boxed()
    }
}

/// Generate a literal together with the type it synthesizes to
fn arb_typed_literal(depth: usize) -> BoxedStrategy<(Type, Expr)> {
    if depth == 0 {
        prop_oneof![
            any::<i64>().prop_map(|n| (Type::Int, lit_int(n))),
            any::<i32>().prop_map(|n| (Type::Float, lit_float(n as f64))),
            any::<bool>().prop_map(|b| (Type::Bool, lit_bool(b))),
            "[a-z]{0,8}".prop_map(|s| (Type::String, lit_str(&s))),
            Just((Type::Unit, lit_unit())),
        ]
        .boxed()
    } else {
        prop_oneof![
            3 => arb_typed_literal(0),
            1 => arb_typed_literal(depth - 1)
                .prop_map(|(t, e)| (Type::list(t), list(vec![e]))),
            1 => (arb_typed_literal(depth - 1), arb_typed_literal(depth - 1))
                .prop_map(|((t1, e1), (t2, e2))| {
                    (Type::Tuple(vec![t1, t2]), tuple(vec![e1, e2]))
                }),
        ]
        .boxed()
    }
}

/// The shape of one argument at a self-recursive call site, built so its
/// role under classification is known by construction.
#[derive(Debug, Clone, Copy)]
enum ArgKind {
    /// The parameter itself, unchanged
    Same,
    /// The sibling parameter, unchanged
    Swap,
    /// `p - k` with k >= 1
    Sub(i64),
    /// `p / k` with k >= 2
    Div(i64),
    /// `sibling % p`: the parameter bounds the result as divisor
    ModDivisor,
    /// `p + k`: grows, so it aggregates
    Add(i64),
    /// A fresh literal
    Lit(i64),
}

impl ArgKind {
    fn build(self, param: &str, sibling: &str) -> Expr {
        match self {
            ArgKind::Same => var(param),
            ArgKind::Swap => var(sibling),
            ArgKind::Sub(k) => binop(BinOp::Sub, var(param), lit_int(k)),
            ArgKind::Div(k) => binop(BinOp::Div, var(param), lit_int(k)),
            ArgKind::ModDivisor => binop(BinOp::Mod, var(sibling), var(param)),
            ArgKind::Add(k) => binop(BinOp::Add, var(param), lit_int(k)),
            ArgKind::Lit(k) => lit_int(k),
        }
    }

    fn expected(self) -> Role {
        match self {
            ArgKind::Same => Role::Query,
            ArgKind::Swap | ArgKind::Sub(_) | ArgKind::Div(_) | ArgKind::ModDivisor => {
                Role::Structural
            }
            ArgKind::Add(_) | ArgKind::Lit(_) => Role::Accumulator,
        }
    }
}

fn arb_arg_kind() -> BoxedStrategy<ArgKind> {
    prop_oneof![
        Just(ArgKind::Same),
        Just(ArgKind::Swap),
        (1i64..5).prop_map(ArgKind::Sub),
        (2i64..5).prop_map(ArgKind::Div),
        Just(ArgKind::ModDivisor),
        (1i64..5).prop_map(ArgKind::Add),
        (0i64..100).prop_map(ArgKind::Lit),
    ]
    .boxed()
}

/// f(a, b) with one self-recursive call whose argument shapes are given
fn two_param_recursive_fn(arg_a: ArgKind, arg_b: ArgKind) -> FunctionDecl {
    let body = if_expr(
        binop(BinOp::Eq, var("a"), lit_int(0)),
        lit_int(0),
        call_named("f", vec![arg_a.build("a", "b"), arg_b.build("b", "a")]),
    );
    fn_decl(
        "f",
        vec![param("a", t_int()), param("b", t_int())],
        t_int(),
        body,
    )
}

/// A component of a tuple argument, over a binding destructured from the
/// aggregate parameter (already one structural step down).
#[derive(Debug, Clone, Copy)]
enum ComponentKind {
    /// The destructured binding, passed back as-is
    Derived,
    /// `m - k`
    Sub(i64),
    /// `m + k`: aggregates
    Add(i64),
    /// A fresh literal: aggregates
    Lit(i64),
}

impl ComponentKind {
    fn build(self, binding: &str) -> Expr {
        match self {
            ComponentKind::Derived => var(binding),
            ComponentKind::Sub(k) => binop(BinOp::Sub, var(binding), lit_int(k)),
            ComponentKind::Add(k) => binop(BinOp::Add, var(binding), lit_int(k)),
            ComponentKind::Lit(k) => lit_int(k),
        }
    }

    fn expected(self) -> Role {
        match self {
            ComponentKind::Derived | ComponentKind::Sub(_) => Role::Structural,
            ComponentKind::Add(_) | ComponentKind::Lit(_) => Role::Accumulator,
        }
    }
}

fn arb_component_kind() -> BoxedStrategy<ComponentKind> {
    prop_oneof![
        Just(ComponentKind::Derived),
        (1i64..5).prop_map(ComponentKind::Sub),
        (1i64..5).prop_map(ComponentKind::Add),
        (0i64..100).prop_map(ComponentKind::Lit),
    ]
    .boxed()
}

fn effects_from(mask: [bool; 5]) -> Vec<Effect> {
    Effect::ALL
        .iter()
        .copied()
        .zip(mask)
        .filter(|(_, on)| *on)
        .map(|(effect, _)| effect)
        .collect()
}

// ============================================================================
// Structural equality
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    #[test]
    fn types_equal_is_reflexive(t in arb_ground_type(2)) {
        prop_assert!(types_equal(&t, &t));
    }

    #[test]
    fn types_equal_is_symmetric(t1 in arb_ground_type(2), t2 in arb_ground_type(2)) {
        prop_assert_eq!(types_equal(&t1, &t2), types_equal(&t2, &t1));
    }

    #[test]
    fn any_absorbs_every_type(t in arb_ground_type(2)) {
        prop_assert!(types_equal(&Type::Any, &t));
        prop_assert!(types_equal(&t, &Type::Any));
    }
}

// ============================================================================
// Parameter classification
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    /// The classifier assigns exactly the role each argument shape was
    /// constructed to have.
    #[test]
    fn classification_matches_construction(a in arb_arg_kind(), b in arb_arg_kind()) {
        let func = two_param_recursive_fn(a, b);
        let prog = program(vec![Decl::Function(func.clone())]);
        let roles = classify_parameters(&func, &prog);

        prop_assert_eq!(roles.len(), 2);
        prop_assert_eq!(roles[0].1, a.expected(), "for argument shape {:?}", a);
        prop_assert_eq!(roles[1].1, b.expected(), "for argument shape {:?}", b);
    }

    /// Classification is a pure function of the program
    #[test]
    fn classification_is_deterministic(a in arb_arg_kind(), b in arb_arg_kind()) {
        let func = two_param_recursive_fn(a, b);
        let prog = program(vec![Decl::Function(func.clone())]);
        prop_assert_eq!(
            classify_parameters(&func, &prog),
            classify_parameters(&func, &prog)
        );
    }

    /// So is the whole validator: running it twice gives the same verdict
    #[test]
    fn validation_verdict_is_stable(a in arb_arg_kind(), b in arb_arg_kind()) {
        let prog = program(vec![Decl::Function(two_param_recursive_fn(a, b))]);
        let options = ValidateOptions::default();
        let first = validate_program(&prog, &options);
        let second = validate_program(&prog, &options);
        match (&first, &second) {
            (Ok(()), Ok(())) => {}
            (Err(e1), Err(e2)) => prop_assert_eq!(e1.code(), e2.code()),
            _ => prop_assert!(false, "verdict changed: {:?} then {:?}", first, second),
        }
    }

    /// A tuple argument takes the most severe role among its components
    #[test]
    fn aggregate_role_is_component_maximum(
        c1 in arb_component_kind(),
        c2 in arb_component_kind(),
    ) {
        let body = match_expr(
            var("pair"),
            vec![arm(
                p_tuple(vec![p_var("m"), p_var("n")]),
                call_named("f", vec![tuple(vec![c1.build("m"), c2.build("n")])]),
            )],
        );
        let func = fn_decl(
            "f",
            vec![param("pair", t_tuple(vec![t_int(), t_int()]))],
            t_int(),
            body,
        );
        let prog = program(vec![Decl::Function(func.clone())]);
        let roles = classify_parameters(&func, &prog);

        prop_assert_eq!(roles[0].1, c1.expected().max(c2.expected()));
    }
}

// ============================================================================
// Bidirectional checking
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// In synthesis position the first arm fixes the match's type, and the
    /// program checks exactly when the second arm agrees with it.
    #[test]
    fn first_arm_fixes_match_type(
        (t1, e1) in arb_typed_literal(2),
        (t2, e2) in arb_typed_literal(2),
    ) {
        let body = let_untyped(
            "witness",
            match_expr(lit_int(0), vec![arm(p_wild(), e1), arm(p_wild(), e2)]),
            var("witness"),
        );
        let func = fn_decl("probe", vec![], t_named("A"), body);
        let result = check_program(&program(vec![Decl::Function(func)]));

        prop_assert_eq!(result.is_ok(), types_equal(&t1, &t2));
    }

    /// Declared effects must cover performed effects; the error names the
    /// missing ones exactly, in canonical order.
    #[test]
    fn declared_effects_must_cover_performed(
        performed in any::<[bool; 5]>(),
        declared in any::<[bool; 5]>(),
    ) {
        let sys = extern_decl(
            &["sys"],
            Some(vec![(
                "op",
                t_fn_eff(vec![t_int()], effects_from(performed), t_int()),
            )]),
        );
        let func = fn_decl_eff(
            "pull",
            vec![param("x", t_int())],
            effects_from(declared),
            t_int(),
            call(member(&["sys"], "op"), vec![var("x")]),
        );
        let result = check_program(&program(vec![Decl::Extern(sys), Decl::Function(func)]));

        let expected_missing: Vec<&'static str> = Effect::ALL
            .iter()
            .copied()
            .zip(performed)
            .zip(declared)
            .filter(|((_, p), d)| *p && !*d)
            .map(|((effect, _), _)| effect.name())
            .collect();

        match result {
            Ok(_) => prop_assert!(
                expected_missing.is_empty(),
                "missing {:?} went undetected",
                expected_missing
            ),
            Err(TypeError::EffectMismatch { missing, .. }) => {
                prop_assert_eq!(missing, expected_missing);
            }
            Err(other) => prop_assert!(false, "unexpected error: {other:?}"),
        }
    }
}
