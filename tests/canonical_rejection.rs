//! Canonical-form rejection tests
//!
//! Every rule the validator enforces gets a program that violates exactly
//! that rule, with the surrounding program otherwise canonical so nothing
//! earlier in the validation order masks the verdict. Categories:
//! 1. Duplicate names across every declaration kind
//! 2. Declaration ordering (category, export, alphabetical)
//! 3. File purpose and file-level rules
//! 4. Mandatory annotations
//! 5. Effect and extern-member ordering
//! 6. Recursion shape, end to end through the diagnostic layer

use slate::ast::{BinOp, Decl, Effect, FunctionDecl};
use slate::test_support::*;
use slate::{analyze_program, validate_program, CanonError, Phase, ValidateOptions};

fn validate(decls: Vec<Decl>) -> Result<(), CanonError> {
    validate_program(&program(decls), &ValidateOptions::default())
}

fn identity_fn(name: &str) -> FunctionDecl {
    fn_decl(name, vec![param("x", t_int())], t_int(), var("x"))
}

// ============================================================================
// Duplicates
// ============================================================================

mod duplicates {
    use super::*;

    #[test]
    fn function_names_must_be_unique() {
        let err = validate(vec![
            Decl::Function(identity_fn("dup")),
            Decl::Function(identity_fn("dup")),
        ])
        .unwrap_err();
        assert_eq!(err.code(), "SLATE-CANON-DUPLICATE-FUNCTION");
    }

    #[test]
    fn type_names_must_be_unique() {
        let err = validate(vec![
            Decl::Type(type_alias("Name", t_str())),
            Decl::Type(type_alias("Name", t_int())),
            Decl::Function(identity_fn("use_name")),
        ])
        .unwrap_err();
        assert_eq!(err.code(), "SLATE-CANON-DUPLICATE-TYPE");
    }

    #[test]
    fn constructor_names_shared_across_types_rejected() {
        let err = validate(vec![
            Decl::Type(type_sum("Auth", vec![("Denied", vec![]), ("Granted", vec![])])),
            Decl::Type(type_sum("Gate", vec![("Closed", vec![]), ("Denied", vec![])])),
            Decl::Function(identity_fn("probe")),
        ])
        .unwrap_err();
        match err {
            CanonError::Duplicate { category, ref name, .. } => {
                assert_eq!(category, "constructor");
                assert_eq!(name, "Denied");
            }
            other => panic!("expected duplicate constructor, got {other:?}"),
        }
    }

    #[test]
    fn import_paths_must_be_unique() {
        let err = validate(vec![
            Decl::Import(import_decl(&["geometry"])),
            Decl::Import(import_decl(&["geometry"])),
            Decl::Function(identity_fn("probe")),
        ])
        .unwrap_err();
        assert_eq!(err.code(), "SLATE-CANON-DUPLICATE-IMPORT");
    }

    #[test]
    fn test_descriptions_must_be_unique() {
        let err = validate(vec![
            Decl::Test(test_decl("covers the base case", lit_unit())),
            Decl::Test(test_decl("covers the base case", lit_unit())),
        ])
        .unwrap_err();
        assert_eq!(err.code(), "SLATE-CANON-DUPLICATE-TEST");
    }
}

// ============================================================================
// Declaration order
// ============================================================================

mod decl_order {
    use super::*;

    #[test]
    fn types_come_before_functions() {
        let err = validate(vec![
            Decl::Function(identity_fn("probe")),
            Decl::Type(type_alias("Name", t_str())),
        ])
        .unwrap_err();
        match err {
            CanonError::DeclCategoryOrder { found, prev, .. } => {
                assert_eq!(found, "types");
                assert_eq!(prev, "functions");
            }
            other => panic!("expected category order, got {other:?}"),
        }
    }

    #[test]
    fn functions_sorted_alphabetically() {
        let err = validate(vec![
            Decl::Function(identity_fn("beta")),
            Decl::Function(identity_fn("alpha")),
        ])
        .unwrap_err();
        match err {
            CanonError::DeclAlphabetical { name, prev, .. } => {
                assert_eq!(name, "alpha");
                assert_eq!(prev, "beta");
            }
            other => panic!("expected alphabetical order, got {other:?}"),
        }
    }

    #[test]
    fn exported_declarations_precede_private_ones() {
        let err = validate(vec![
            Decl::Function(fn_decl_private(
                "alpha",
                vec![param("x", t_int())],
                t_int(),
                var("x"),
            )),
            Decl::Function(identity_fn("beta")),
        ])
        .unwrap_err();
        match err {
            CanonError::DeclExportOrder { name, prev, .. } => {
                assert_eq!(name, "beta");
                assert_eq!(prev, "alpha");
            }
            other => panic!("expected export order, got {other:?}"),
        }
    }

    #[test]
    fn full_canonical_file_accepted() {
        let gcd_body = match_expr(
            var("b"),
            vec![
                arm(p_int(0), var("a")),
                arm(
                    p_var("b"),
                    call_named("gcd", vec![var("b"), binop(BinOp::Mod, var("a"), var("b"))]),
                ),
            ],
        );
        let result = validate(vec![
            Decl::Type(type_sum("Shape", vec![("Circle", vec![t_float()])])),
            Decl::Extern(extern_decl(
                &["console"],
                Some(vec![("log", t_fn_eff(vec![t_str()], vec![Effect::Io], t_unit()))]),
            )),
            Decl::Import(import_decl(&["geometry"])),
            Decl::Const(const_decl("zero", t_int(), lit_int(0))),
            Decl::Function(fn_decl(
                "gcd",
                vec![param("a", t_int()), param("b", t_int())],
                t_int(),
                gcd_body,
            )),
        ]);
        assert!(result.is_ok(), "canonical file rejected: {result:?}");
    }
}

// ============================================================================
// File purpose and file-level rules
// ============================================================================

mod file_rules {
    use super::*;

    #[test]
    fn file_with_no_purpose_rejected() {
        let err = validate(vec![Decl::Function(fn_decl_private(
            "helper",
            vec![param("x", t_int())],
            t_int(),
            var("x"),
        ))])
        .unwrap_err();
        assert!(matches!(err, CanonError::FilePurposeNone { .. }));
    }

    #[test]
    fn executable_and_library_at_once_rejected() {
        let err = validate(vec![
            Decl::Function(identity_fn("helper")),
            Decl::Function(fn_decl_private("main", vec![], t_unit(), lit_unit())),
        ])
        .unwrap_err();
        assert!(matches!(err, CanonError::FilePurposeBoth { .. }));
    }

    #[test]
    fn pure_executable_accepted() {
        let result = validate(vec![Decl::Function(fn_decl_private(
            "main",
            vec![],
            t_unit(),
            lit_unit(),
        ))]);
        assert!(result.is_ok());
    }

    #[test]
    fn tests_only_allowed_under_tests_directory() {
        let options = ValidateOptions {
            file_path: Some("src/geometry.slate".to_string()),
        };
        let prog = program(vec![Decl::Test(test_decl("rejects overlap", lit_unit()))]);
        let err = validate_program(&prog, &options).unwrap_err();
        assert_eq!(err.code(), "SLATE-CANON-TEST-PATH");

        let options = ValidateOptions {
            file_path: Some("tests/geometry.slate".to_string()),
        };
        assert!(validate_program(&prog, &options).is_ok());
    }

    #[test]
    fn uppercase_file_names_rejected() {
        let options = ValidateOptions {
            file_path: Some("src/Geometry.slate".to_string()),
        };
        let prog = program(vec![Decl::Function(identity_fn("probe"))]);
        let err = validate_program(&prog, &options).unwrap_err();
        assert!(matches!(err, CanonError::FilenameCase { .. }));
        assert!(err.span().is_none());
    }

    #[test]
    fn underscored_file_names_rejected() {
        let options = ValidateOptions {
            file_path: Some("src/convex_hull.slate".to_string()),
        };
        let prog = program(vec![Decl::Function(identity_fn("probe"))]);
        let err = validate_program(&prog, &options).unwrap_err();
        match err {
            CanonError::FilenameChar { found, .. } => assert_eq!(found, '_'),
            other => panic!("expected filename char, got {other:?}"),
        }
    }
}

// ============================================================================
// Mandatory annotations
// ============================================================================

mod annotations {
    use super::*;

    #[test]
    fn missing_return_type_rejected() {
        let func = FunctionDecl {
            return_type: None,
            ..identity_fn("probe")
        };
        let err = validate(vec![Decl::Function(func)]).unwrap_err();
        assert_eq!(err.code(), "SLATE-SURFACE-MISSING-RETURN-TYPE");
    }

    #[test]
    fn missing_parameter_type_rejected() {
        let func = fn_decl("probe", vec![param_untyped("x")], t_int(), var("x"));
        let err = validate(vec![Decl::Function(func)]).unwrap_err();
        match err {
            CanonError::MissingParamType { ref param, .. } => assert_eq!(param, "x"),
            other => panic!("expected missing param type, got {other:?}"),
        }
        assert_eq!(err.code(), "SLATE-SURFACE-MISSING-PARAM-TYPE");
    }

    #[test]
    fn lambda_parameters_need_annotations_too() {
        let body = call(
            lambda(vec![param_untyped("y")], vec![], t_int(), var("y")),
            vec![var("x")],
        );
        let func = fn_decl("probe", vec![param("x", t_int())], t_int(), body);
        let err = validate(vec![Decl::Function(func)]).unwrap_err();
        assert!(matches!(err, CanonError::MissingParamType { .. }));
    }

    #[test]
    fn let_without_ascription_rejected() {
        let body = let_untyped("doubled", binop(BinOp::Mul, var("x"), lit_int(2)), var("doubled"));
        let func = fn_decl("probe", vec![param("x", t_int())], t_int(), body);
        let err = validate(vec![Decl::Function(func)]).unwrap_err();
        match err {
            CanonError::LetUntyped { ref name, .. } => assert_eq!(name, "doubled"),
            other => panic!("expected untyped let, got {other:?}"),
        }
    }

    #[test]
    fn const_without_annotation_rejected() {
        let err = validate(vec![Decl::Const(const_untyped("answer", lit_int(42)))]).unwrap_err();
        assert!(matches!(err, CanonError::ConstUntyped { .. }));
    }
}

// ============================================================================
// Effect and extern-member order
// ============================================================================

mod lexical_order {
    use super::*;

    #[test]
    fn effects_in_canonical_order() {
        let func = fn_decl_eff(
            "emit",
            vec![param("x", t_int())],
            vec![Effect::Io, Effect::Error],
            t_int(),
            var("x"),
        );
        let err = validate(vec![Decl::Function(func)]).unwrap_err();
        match err {
            CanonError::EffectOrder { effect, prev, .. } => {
                assert_eq!(effect, "Error");
                assert_eq!(prev, "IO");
            }
            other => panic!("expected effect order, got {other:?}"),
        }
    }

    #[test]
    fn repeated_effects_rejected() {
        let func = fn_decl_eff(
            "emit",
            vec![param("x", t_int())],
            vec![Effect::Io, Effect::Io],
            t_int(),
            var("x"),
        );
        let err = validate(vec![Decl::Function(func)]).unwrap_err();
        assert_eq!(err.code(), "SLATE-CANON-DUPLICATE-EFFECT");
    }

    #[test]
    fn extern_members_sorted_alphabetically() {
        let decl = extern_decl(
            &["fs"],
            Some(vec![
                ("write", t_fn(vec![t_str()], t_unit())),
                ("read", t_fn(vec![t_str()], t_str())),
            ]),
        );
        let err = validate(vec![
            Decl::Extern(decl),
            Decl::Function(identity_fn("probe")),
        ])
        .unwrap_err();
        match err {
            CanonError::ExternMemberOrder { member, prev, .. } => {
                assert_eq!(member, "read");
                assert_eq!(prev, "write");
            }
            other => panic!("expected extern member order, got {other:?}"),
        }
    }
}

// ============================================================================
// Recursion shape through the diagnostic layer
// ============================================================================

mod recursion {
    use super::*;

    #[test]
    fn accumulator_recursion_reported_with_parameter_name() {
        // factorial(n, acc) multiplies into acc across the recursive call
        let body = match_expr(
            var("n"),
            vec![
                arm(p_int(0), var("acc")),
                arm(
                    p_var("n"),
                    call_named(
                        "factorial",
                        vec![
                            binop(BinOp::Sub, var("n"), lit_int(1)),
                            binop(BinOp::Mul, var("n"), var("acc")),
                        ],
                    ),
                ),
            ],
        );
        let func = fn_decl(
            "factorial",
            vec![param("n", t_int()), param("acc", t_int())],
            t_int(),
            body,
        );
        let diag = analyze_program(&program(vec![Decl::Function(func)]), &ValidateOptions::default())
            .unwrap_err();
        assert_eq!(diag.phase, Phase::Canonical);
        assert_eq!(diag.code, "SLATE-CANON-RECURSION-ACCUMULATOR");
        assert!(diag.message.contains("factorial"), "message: {}", diag.message);
        assert!(diag.message.contains("acc"), "message: {}", diag.message);
    }

    #[test]
    fn boolean_match_reported_as_canonical_error() {
        // isZero matches on (n = 0) instead of using an if-expression
        let body = match_expr(
            binop(BinOp::Eq, var("n"), lit_int(0)),
            vec![
                arm(p_bool(true), lit_bool(true)),
                arm(p_bool(false), lit_bool(false)),
            ],
        );
        let func = fn_decl("isZero", vec![param("n", t_int())], t_bool(), body);
        let diag = analyze_program(&program(vec![Decl::Function(func)]), &ValidateOptions::default())
            .unwrap_err();
        assert_eq!(diag.phase, Phase::Canonical);
        assert_eq!(diag.code, "SLATE-CANON-MATCH-BOOLEAN");
    }

    #[test]
    fn continuation_passing_reported_by_code() {
        let body = call_named("build", vec![binop(BinOp::Sub, var("n"), lit_int(1))]);
        let func = fn_decl(
            "build",
            vec![param("n", t_int())],
            t_fn(vec![t_int()], t_int()),
            body,
        );
        let err = validate(vec![Decl::Function(func)]).unwrap_err();
        assert_eq!(err.code(), "SLATE-CANON-RECURSION-CPS");
    }

    #[test]
    fn undestructured_list_parameter_reported_by_code() {
        let body = call_named("walk", vec![var("xs")]);
        let func = fn_decl("walk", vec![param("xs", t_list(t_int()))], t_list(t_int()), body);
        let err = validate(vec![Decl::Function(func)]).unwrap_err();
        assert_eq!(err.code(), "SLATE-CANON-RECURSION-COLLECTION");
    }
}
