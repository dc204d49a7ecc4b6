//! Slate - the canonical-form validator and type/effect checker for a
//! statically-typed functional language with one valid encoding per algorithm

use std::collections::HashMap;

pub mod ast;
pub mod canonical;
pub mod check;
pub mod errors;
pub mod test_support;
pub mod types;

pub use ast::{Effect, LocatedSpan, Position, Program, SourceMap, Span};
pub use canonical::{classify_parameters, validate_program, CanonError, Role, ValidateOptions};
pub use check::{check_program, Checker, TypeError};
pub use errors::{find_similar, levenshtein_distance, Diagnostic, Phase};
pub use types::{types_equal, EffectSet, Type, TypeEnv};

/// Run the full analysis pipeline on a program: canonical-form validation
/// first, then type and effect checking. Each phase stops at its first
/// error. On success, returns the types of the program's top-level
/// functions and consts.
pub fn analyze_program(
    program: &Program,
    options: &ValidateOptions,
) -> Result<HashMap<String, Type>, Diagnostic> {
    validate_program(program, options)?;
    let types = check_program(program)?;
    Ok(types)
}
