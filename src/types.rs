//! Semantic type algebra for the Slate checker
//!
//! Types here are fully concrete: Slate has no unification and no type
//! variables. Generic positions in declarations resolve to [`Type::Any`],
//! the single deliberate trust-mode hole in the algebra.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::rc::Rc;

use crate::ast::{Effect, PrimType, TypeExpr};

// ============================================================================
// Effect sets
// ============================================================================

/// A set of declared or inferred effects, ordered canonically.
///
/// Backed by a `BTreeSet` so iteration order is the canonical effect order
/// and error messages listing effects are deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EffectSet {
    effects: BTreeSet<Effect>,
}

impl EffectSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, effect: Effect) {
        self.effects.insert(effect);
    }

    pub fn contains(&self, effect: Effect) -> bool {
        self.effects.contains(&effect)
    }

    pub fn is_empty(&self) -> bool {
        self.effects.is_empty()
    }

    pub fn len(&self) -> usize {
        self.effects.len()
    }

    pub fn union(&self, other: &EffectSet) -> EffectSet {
        EffectSet {
            effects: self.effects.union(&other.effects).copied().collect(),
        }
    }

    pub fn extend_with(&mut self, other: &EffectSet) {
        self.effects.extend(other.effects.iter().copied());
    }

    /// Effects in `self` that are missing from `other`
    pub fn difference(&self, other: &EffectSet) -> EffectSet {
        EffectSet {
            effects: self.effects.difference(&other.effects).copied().collect(),
        }
    }

    pub fn is_subset(&self, other: &EffectSet) -> bool {
        self.effects.is_subset(&other.effects)
    }

    pub fn iter(&self) -> impl Iterator<Item = Effect> + '_ {
        self.effects.iter().copied()
    }

    /// Effect names in canonical order, for error messages
    pub fn names(&self) -> Vec<&'static str> {
        self.effects.iter().map(|e| e.name()).collect()
    }
}

impl FromIterator<Effect> for EffectSet {
    fn from_iter<I: IntoIterator<Item = Effect>>(iter: I) -> Self {
        EffectSet {
            effects: iter.into_iter().collect(),
        }
    }
}

impl fmt::Display for EffectSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.effects.len() {
            0 => Ok(()),
            1 => {
                // Iterator is non-empty here
                for e in &self.effects {
                    write!(f, "!{}", e)?;
                }
                Ok(())
            }
            _ => write!(f, "!{{{}}}", self.names().join(", ")),
        }
    }
}

// ============================================================================
// Types
// ============================================================================

/// The closed semantic type algebra
#[derive(Debug, Clone)]
pub enum Type {
    // Primitives
    Int,
    Float,
    Bool,
    String,
    Char,
    Unit,

    /// Function type with declared effects
    Function {
        params: Vec<Type>,
        ret: Rc<Type>,
        effects: EffectSet,
    },

    /// Homogeneous list: [T]
    List(Rc<Type>),

    /// Tuple: (A, B, C)
    Tuple(Vec<Type>),

    /// Record with named fields; field order is not significant
    Record {
        fields: HashMap<String, Type>,
    },

    /// A declared sum type, by name: Shape, Option[ℤ]
    Ctor {
        name: String,
        args: Vec<Type>,
    },

    /// FFI trust mode: equal to every type, checked nowhere
    Any,
}

impl Type {
    pub fn list(elem: Type) -> Type {
        Type::List(Rc::new(elem))
    }

    pub fn function(params: Vec<Type>, ret: Type, effects: EffectSet) -> Type {
        Type::Function {
            params,
            ret: Rc::new(ret),
            effects,
        }
    }

    pub fn pure_function(params: Vec<Type>, ret: Type) -> Type {
        Type::function(params, ret, EffectSet::new())
    }

    pub fn record(fields: Vec<(String, Type)>) -> Type {
        Type::Record {
            fields: fields.into_iter().collect(),
        }
    }

    pub fn from_prim(prim: PrimType) -> Type {
        match prim {
            PrimType::Int => Type::Int,
            PrimType::Float => Type::Float,
            PrimType::Bool => Type::Bool,
            PrimType::String => Type::String,
            PrimType::Char => Type::Char,
            PrimType::Unit => Type::Unit,
        }
    }

    pub fn is_any(&self) -> bool {
        matches!(self, Type::Any)
    }
}

/// Structural type equality.
///
/// `Any` equals everything. Records compare field count then per-name.
/// Function effects do NOT participate: effect conformance is enforced by
/// the effect pass, not by type shape.
pub fn types_equal(t1: &Type, t2: &Type) -> bool {
    match (t1, t2) {
        (Type::Any, _) | (_, Type::Any) => true,

        (Type::Int, Type::Int)
        | (Type::Float, Type::Float)
        | (Type::Bool, Type::Bool)
        | (Type::String, Type::String)
        | (Type::Char, Type::Char)
        | (Type::Unit, Type::Unit) => true,

        (
            Type::Function {
                params: p1,
                ret: r1,
                ..
            },
            Type::Function {
                params: p2,
                ret: r2,
                ..
            },
        ) => {
            p1.len() == p2.len()
                && p1.iter().zip(p2).all(|(a, b)| types_equal(a, b))
                && types_equal(r1, r2)
        }

        (Type::List(e1), Type::List(e2)) => types_equal(e1, e2),

        (Type::Tuple(t1), Type::Tuple(t2)) => {
            t1.len() == t2.len() && t1.iter().zip(t2).all(|(a, b)| types_equal(a, b))
        }

        (Type::Record { fields: f1 }, Type::Record { fields: f2 }) => {
            f1.len() == f2.len()
                && f1
                    .iter()
                    .all(|(name, a)| f2.get(name).is_some_and(|b| types_equal(a, b)))
        }

        (
            Type::Ctor { name: n1, args: a1 },
            Type::Ctor { name: n2, args: a2 },
        ) => {
            n1 == n2
                && a1.len() == a2.len()
                && a1.iter().zip(a2).all(|(a, b)| types_equal(a, b))
        }

        _ => false,
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Int => write!(f, "ℤ"),
            Type::Float => write!(f, "ℝ"),
            Type::Bool => write!(f, "𝔹"),
            Type::String => write!(f, "𝕊"),
            Type::Char => write!(f, "ℂ"),
            Type::Unit => write!(f, "𝕌"),
            Type::Function {
                params,
                ret,
                effects,
            } => {
                let params: Vec<String> = params.iter().map(|p| p.to_string()).collect();
                if effects.is_empty() {
                    write!(f, "({}) → {}", params.join(", "), ret)
                } else {
                    write!(f, "({}) →{} {}", params.join(", "), effects, ret)
                }
            }
            Type::List(elem) => write!(f, "[{}]", elem),
            Type::Tuple(types) => {
                let parts: Vec<String> = types.iter().map(|t| t.to_string()).collect();
                write!(f, "({})", parts.join(", "))
            }
            Type::Record { fields } => {
                // Sorted so the rendering is stable regardless of map order
                let mut names: Vec<&String> = fields.keys().collect();
                names.sort();
                let parts: Vec<String> = names
                    .into_iter()
                    .map(|n| format!("{}: {}", n, fields[n]))
                    .collect();
                write!(f, "{{{}}}", parts.join(", "))
            }
            Type::Ctor { name, args } => {
                if args.is_empty() {
                    write!(f, "{}", name)
                } else {
                    let parts: Vec<String> = args.iter().map(|a| a.to_string()).collect();
                    write!(f, "{}[{}]", name, parts.join(", "))
                }
            }
            Type::Any => write!(f, "Any"),
        }
    }
}

// ============================================================================
// User type registry
// ============================================================================

/// An entry for a declared type, kept in surface form.
///
/// Definitions stay as `TypeExpr` so mutually recursive types resolve
/// lazily at use sites; the checker's pass 1 records every declared name
/// before any definition body is resolved.
#[derive(Debug, Clone)]
pub enum TypeEntry {
    Sum {
        params: Vec<String>,
        variants: Vec<(String, Vec<TypeExpr>)>,
    },
    Record {
        params: Vec<String>,
        fields: Vec<(String, TypeExpr)>,
    },
    Alias {
        params: Vec<String>,
        target: TypeExpr,
    },
}

impl TypeEntry {
    pub fn params(&self) -> &[String] {
        match self {
            TypeEntry::Sum { params, .. }
            | TypeEntry::Record { params, .. }
            | TypeEntry::Alias { params, .. } => params,
        }
    }
}

/// Declared user types, built once in checker pass 1 and read-only after
#[derive(Debug, Clone, Default)]
pub struct TypeRegistry {
    entries: HashMap<String, TypeEntry>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: String, entry: TypeEntry) {
        self.entries.insert(name, entry);
    }

    pub fn get(&self, name: &str) -> Option<&TypeEntry> {
        self.entries.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(|s| s.as_str())
    }
}

// ============================================================================
// Type environment
// ============================================================================

/// A bound name: its type, plus whether it is an opaque FFI/import namespace
#[derive(Debug, Clone)]
pub struct Binding {
    pub ty: Type,
    pub extern_namespace: bool,
}

impl Binding {
    pub fn value(ty: Type) -> Binding {
        Binding {
            ty,
            extern_namespace: false,
        }
    }

    pub fn namespace() -> Binding {
        Binding {
            ty: Type::Any,
            extern_namespace: true,
        }
    }
}

/// Persistent name→binding environment.
///
/// `extend` produces a child overlay and never touches the parent, so
/// sibling scopes (match arms, lambda bodies) cannot observe each other's
/// bindings. The user type registry rides along on every frame.
#[derive(Debug, Clone)]
pub struct TypeEnv {
    frame: im::HashMap<String, Binding>,
    parent: Option<Rc<TypeEnv>>,
    types: Rc<TypeRegistry>,
}

impl TypeEnv {
    pub fn new(types: TypeRegistry) -> Self {
        TypeEnv {
            frame: im::HashMap::new(),
            parent: None,
            types: Rc::new(types),
        }
    }

    /// Bind a name in the current frame only
    pub fn bind(&mut self, name: impl Into<String>, binding: Binding) {
        self.frame.insert(name.into(), binding);
    }

    /// A fresh child scope overlaying this one
    pub fn extend(&self) -> TypeEnv {
        TypeEnv {
            frame: im::HashMap::new(),
            parent: Some(Rc::new(self.clone())),
            types: Rc::clone(&self.types),
        }
    }

    /// Walk outward through parent frames
    pub fn lookup(&self, name: &str) -> Option<&Binding> {
        match self.frame.get(name) {
            Some(binding) => Some(binding),
            None => self.parent.as_deref().and_then(|p| p.lookup(name)),
        }
    }

    pub fn registry(&self) -> &TypeRegistry {
        &self.types
    }

    /// All names visible from this scope, for did-you-mean suggestions
    pub fn visible_names(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        let mut env = Some(self);
        while let Some(e) = env {
            names.extend(e.frame.keys().cloned());
            env = e.parent.as_deref();
        }
        names.sort();
        names.dedup();
        names
    }
}
