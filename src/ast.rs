//! Abstract Syntax Tree for Slate
//!
//! The parser is an external producer; this module is the input contract for
//! the validator and the checker. Every node carries a byte span into the
//! original source, convertible to line:column positions via [`SourceMap`].

use std::fmt;
use std::rc::Rc;

pub type Ident = String;

/// Source location for error reporting
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn merge(&self, other: &Span) -> Span {
        Span {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }
}

/// Human-readable source position (1-indexed line and column)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    /// 1-indexed line number
    pub line: usize,
    /// 1-indexed column number (in characters, not bytes)
    pub column: usize,
}

impl Position {
    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// A span with start and end positions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocatedSpan {
    pub start: Position,
    pub end: Position,
}

impl fmt::Display for LocatedSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start.line == self.end.line {
            write!(
                f,
                "{}:{}-{}",
                self.start.line, self.start.column, self.end.column
            )
        } else {
            write!(f, "{}-{}", self.start, self.end)
        }
    }
}

/// Maps byte offsets to line:column positions.
///
/// Pre-computes line boundaries from source text so position lookup is a
/// binary search.
#[derive(Debug, Clone)]
pub struct SourceMap {
    source: String,
    /// Byte offset of the start of each line (0-indexed)
    line_starts: Vec<usize>,
}

impl SourceMap {
    pub fn new(source: &str) -> Self {
        let mut line_starts = vec![0];
        for (i, c) in source.char_indices() {
            if c == '\n' {
                line_starts.push(i + 1);
            }
        }
        Self {
            source: source.to_string(),
            line_starts,
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }

    /// Convert a byte offset to a Position (1-indexed line and column)
    pub fn position(&self, byte_offset: usize) -> Position {
        let line_idx = match self.line_starts.binary_search(&byte_offset) {
            Ok(idx) => idx,
            Err(idx) => idx - 1,
        };
        let line_start = self.line_starts[line_idx];

        // Count characters, not bytes: Slate source leans on non-ASCII
        // glyphs, so columns must be character-based.
        let column = self.source[line_start..byte_offset].chars().count() + 1;

        Position {
            line: line_idx + 1,
            column,
        }
    }

    /// Convert a Span to a LocatedSpan with line:column positions
    pub fn locate(&self, span: &Span) -> LocatedSpan {
        LocatedSpan {
            start: self.position(span.start),
            end: self.position(span.end),
        }
    }

    /// Get the text content of a line (1-indexed), without the trailing newline
    pub fn line(&self, line_num: usize) -> Option<&str> {
        if line_num == 0 || line_num > self.line_starts.len() {
            return None;
        }
        let line_idx = line_num - 1;
        let start = self.line_starts[line_idx];
        let end = if line_idx + 1 < self.line_starts.len() {
            self.line_starts[line_idx + 1] - 1
        } else {
            self.source.len()
        };
        Some(self.source[start..end].trim_end_matches('\r'))
    }

    /// Get the text content of a span
    pub fn span_text(&self, span: &Span) -> &str {
        &self.source[span.start..span.end.min(self.source.len())]
    }
}

/// A spanned AST node
#[derive(Debug, Clone)]
pub struct Spanned<T> {
    pub node: T,
    pub span: Span,
}

impl<T> Spanned<T> {
    pub fn new(node: T, span: Span) -> Self {
        Self { node, span }
    }
}

// ============================================================================
// Effects
// ============================================================================

/// The closed set of declarable side effects.
///
/// Variant order is the canonical (alphabetical) source order, so deriving
/// `Ord` gives the ordering the validator enforces on effect annotations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Effect {
    Async,
    Error,
    Io,
    Mut,
    Network,
}

impl Effect {
    pub const ALL: [Effect; 5] = [
        Effect::Async,
        Effect::Error,
        Effect::Io,
        Effect::Mut,
        Effect::Network,
    ];

    /// The effect's name as written in source: `!IO`, `!Mut`, ...
    pub fn name(&self) -> &'static str {
        match self {
            Effect::Async => "Async",
            Effect::Error => "Error",
            Effect::Io => "IO",
            Effect::Mut => "Mut",
            Effect::Network => "Network",
        }
    }
}

impl fmt::Display for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

// ============================================================================
// Expressions
// ============================================================================

pub type Expr = Spanned<ExprKind>;

#[derive(Debug, Clone)]
pub enum ExprKind {
    // Literals
    Lit(Literal),

    // Variable reference
    Var(Ident),

    // Lambda: λ(x: ℤ) →!IO ℤ { body }
    // Parameter and return annotations are mandatory in canonical form.
    Lambda {
        params: Vec<Param>,
        effects: Vec<Effect>,
        return_type: TypeExpr,
        body: Rc<Expr>,
    },

    // Application: f(x, y), always saturated; arity is checked exactly
    App {
        func: Rc<Expr>,
        args: Vec<Expr>,
    },

    // Binary operator: a % b, s ++ t
    BinOp {
        op: BinOp,
        left: Rc<Expr>,
        right: Rc<Expr>,
    },

    // Unary operator: -n, !b, #xs
    UnaryOp {
        op: UnaryOp,
        operand: Rc<Expr>,
    },

    // If expression: (cond) → then | else
    If {
        cond: Rc<Expr>,
        then_branch: Rc<Expr>,
        else_branch: Rc<Expr>,
    },

    // Match expression: scrutinee { pat → body | ... }
    Match {
        scrutinee: Rc<Expr>,
        arms: Vec<MatchArm>,
    },

    // Let binding with mandatory ascription: l x = (value: T) { body }
    Let {
        pattern: Pattern,
        ty: Option<TypeExpr>,
        value: Rc<Expr>,
        body: Rc<Expr>,
    },

    // List literal: [a, b, c]
    List(Vec<Expr>),

    // Tuple literal: (a, b, c)
    Tuple(Vec<Expr>),

    // Record literal: {method: "GET", path: "/"}
    Record {
        fields: Vec<(Ident, Expr)>,
    },

    // Field access on a record: r.field
    FieldAccess {
        record: Rc<Expr>,
        field: Ident,
    },

    // Namespace member access (FFI/imports): fs⋅promises.readFile
    MemberAccess {
        namespace: Vec<Ident>,
        member: Ident,
    },

    // Pipeline: x |> f, or composition f >> g
    Pipeline {
        op: PipeOp,
        left: Rc<Expr>,
        right: Rc<Expr>,
    },

    // Built-in map: list ∥ fn
    Map {
        list: Rc<Expr>,
        func: Rc<Expr>,
    },

    // Built-in filter: list ⊳ predicate
    Filter {
        list: Rc<Expr>,
        predicate: Rc<Expr>,
    },

    // Built-in fold: list ⊕ fn init
    Fold {
        list: Rc<Expr>,
        func: Rc<Expr>,
        init: Rc<Expr>,
    },
}

/// Match arm: pattern → body, or pattern when guard → body
#[derive(Debug, Clone)]
pub struct MatchArm {
    pub pattern: Pattern,
    pub guard: Option<Expr>,
    pub body: Expr,
}

#[derive(Debug, Clone)]
pub enum Literal {
    Int(i64),
    Float(f64),
    Bool(bool),
    String(String),
    Char(char),
    Unit,
}

/// Binary operators (fixed set; Slate has no user-defined operators)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    // Arithmetic
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    // Comparison
    Eq,
    NotEq,
    Lt,
    Gt,
    LtEq,
    GtEq,
    // Boolean
    And,
    Or,
    // String concatenation: ++
    Concat,
    // List concatenation: ⧺
    ListConcat,
}

impl BinOp {
    /// The operator symbol as written in source
    pub fn symbol(&self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Mod => "%",
            BinOp::Eq => "=",
            BinOp::NotEq => "≠",
            BinOp::Lt => "<",
            BinOp::Gt => ">",
            BinOp::LtEq => "≤",
            BinOp::GtEq => "≥",
            BinOp::And => "&&",
            BinOp::Or => "||",
            BinOp::Concat => "++",
            BinOp::ListConcat => "⧺",
        }
    }
}

impl fmt::Display for BinOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
    /// Length: #xs
    Len,
}

impl UnaryOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            UnaryOp::Neg => "-",
            UnaryOp::Not => "!",
            UnaryOp::Len => "#",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipeOp {
    /// Value pipe: x |> f
    Pipe,
    /// Forward composition: f >> g
    Compose,
}

impl PipeOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            PipeOp::Pipe => "|>",
            PipeOp::Compose => ">>",
        }
    }
}

// ============================================================================
// Patterns
// ============================================================================

pub type Pattern = Spanned<PatternKind>;

#[derive(Debug, Clone)]
pub enum PatternKind {
    // Wildcard: _
    Wildcard,

    // Variable binding: x
    Var(Ident),

    // Literal pattern: 42, "hello", true
    Lit(Literal),

    // Tuple pattern: (x, y)
    Tuple(Vec<Pattern>),

    // List pattern with optional rest binding: [], [x], [x, .rest]
    List {
        elements: Vec<Pattern>,
        rest: Option<Ident>,
    },

    // Constructor pattern: Some(x), None
    Ctor {
        name: Ident,
        args: Vec<Pattern>,
    },
}

impl PatternKind {
    /// True when the pattern matches every scrutinee unconditionally
    pub fn is_irrefutable(&self) -> bool {
        match self {
            PatternKind::Wildcard | PatternKind::Var(_) => true,
            PatternKind::Lit(_)
            | PatternKind::Tuple(_)
            | PatternKind::List { .. }
            | PatternKind::Ctor { .. } => false,
        }
    }
}

// ============================================================================
// Type expressions (surface syntax)
// ============================================================================

pub type TypeExpr = Spanned<TypeExprKind>;

/// Primitive type names as written in source (ℤ ℝ 𝔹 𝕊 ℂ 𝕌)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimType {
    Int,
    Float,
    Bool,
    String,
    Char,
    Unit,
}

#[derive(Debug, Clone)]
pub enum TypeExprKind {
    Prim(PrimType),

    // List type: [T]
    List(Rc<TypeExpr>),

    // Tuple type: (A, B)
    Tuple(Vec<TypeExpr>),

    // Function type: (A, B) →!IO C
    Fn {
        params: Vec<TypeExpr>,
        effects: Vec<Effect>,
        ret: Rc<TypeExpr>,
    },

    // Named type, possibly applied: Shape, Option[T].
    // Also covers in-scope type parameters, which resolve to Any.
    Named {
        name: Ident,
        args: Vec<TypeExpr>,
    },

    // Anonymous record type: {x: ℤ, y: ℤ}
    Record(Vec<(Ident, TypeExpr)>),
}

// ============================================================================
// Declarations
// ============================================================================

/// Function or lambda parameter
#[derive(Debug, Clone)]
pub struct Param {
    pub name: Ident,
    /// Mandatory in canonical form; the validator rejects `None`
    pub ty: Option<TypeExpr>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub enum Decl {
    Function(FunctionDecl),
    Type(TypeDecl),
    Import(ImportDecl),
    Const(ConstDecl),
    Test(TestDecl),
    Extern(ExternDecl),
}

#[derive(Debug, Clone)]
pub struct FunctionDecl {
    pub name: Ident,
    pub exported: bool,
    pub params: Vec<Param>,
    pub effects: Vec<Effect>,
    /// Mandatory in canonical form; the validator rejects `None`
    pub return_type: Option<TypeExpr>,
    pub body: Expr,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct TypeDecl {
    pub name: Ident,
    pub exported: bool,
    /// Type parameter names: the T in Option[T]
    pub params: Vec<Ident>,
    pub def: TypeDef,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub enum TypeDef {
    Sum(Vec<Variant>),
    Record(Vec<RecordField>),
    Alias(TypeExpr),
}

/// A sum-type variant: Circle(ℝ)
#[derive(Debug, Clone)]
pub struct Variant {
    pub name: Ident,
    pub fields: Vec<TypeExpr>,
    pub span: Span,
}

/// A field in a record type declaration
#[derive(Debug, Clone)]
pub struct RecordField {
    pub name: Ident,
    pub ty: TypeExpr,
}

#[derive(Debug, Clone)]
pub struct ConstDecl {
    pub name: Ident,
    pub exported: bool,
    /// Mandatory in canonical form; the validator rejects `None`
    pub ty: Option<TypeExpr>,
    pub value: Expr,
    pub span: Span,
}

/// Module import: i geometry⋅area, bound as an opaque namespace
#[derive(Debug, Clone)]
pub struct ImportDecl {
    pub path: Vec<Ident>,
    pub span: Span,
}

/// External FFI declaration: e console { log: (𝕊) → 𝕌 }
#[derive(Debug, Clone)]
pub struct ExternDecl {
    pub path: Vec<Ident>,
    /// Optional typed members; an untyped extern is fully trust-mode
    pub members: Option<Vec<ExternMember>>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct ExternMember {
    pub name: Ident,
    pub ty: TypeExpr,
    pub span: Span,
}

/// Test block: t "reverses a list" { ... }
#[derive(Debug, Clone)]
pub struct TestDecl {
    pub description: String,
    pub effects: Vec<Effect>,
    pub body: Expr,
    pub span: Span,
}

impl Decl {
    pub fn span(&self) -> &Span {
        match self {
            Decl::Function(d) => &d.span,
            Decl::Type(d) => &d.span,
            Decl::Import(d) => &d.span,
            Decl::Const(d) => &d.span,
            Decl::Test(d) => &d.span,
            Decl::Extern(d) => &d.span,
        }
    }

    pub fn exported(&self) -> bool {
        match self {
            Decl::Function(d) => d.exported,
            Decl::Type(d) => d.exported,
            Decl::Const(d) => d.exported,
            Decl::Import(_) | Decl::Test(_) | Decl::Extern(_) => false,
        }
    }
}

// ============================================================================
// Program
// ============================================================================

/// A parsed source file: an ordered list of declarations
#[derive(Debug, Clone)]
pub struct Program {
    pub decls: Vec<Decl>,
}
