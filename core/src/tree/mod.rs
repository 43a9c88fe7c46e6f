//! The parsed source tree consumed by the backend.
//!
//! The parser is an external collaborator: it hands over a tree of [`Node`]s,
//! allocated in a `bumpalo` arena, and the backend only ever reads it. Each
//! node exposes its kind, its ordered children, its source span and the
//! source text it was parsed from (the last two are used for diagnostics).
//!
//! Child layout per kind (`[..]` marks a repeated group, `?` an optional child):
//!
//! | Kind                   | Children                                      |
//! |------------------------|-----------------------------------------------|
//! | `Interpolation`        | `[part]`                                      |
//! | `Array`                | `[element]`                                   |
//! | `Struct`               | `[key, value]`                                |
//! | `Binary`               | `left, right`                                 |
//! | `Unary`                | `operand`                                     |
//! | `Ternary`              | `condition, then, else`                       |
//! | `Assignment`           | `target, value`                               |
//! | `DotAccess`            | `object`                                      |
//! | `IndexAccess`          | `object, index`                               |
//! | `FunctionCall`         | `[Argument]`                                  |
//! | `MethodCall`           | `object, [Argument]`                          |
//! | `Argument`             | `value`                                       |
//! | `New`                  | `[Argument]`                                  |
//! | `Closure`, `Lambda`    | `[ArgumentDeclaration], body`                 |
//! | `FunctionDeclaration`  | `[ArgumentDeclaration], Block`                |
//! | `ArgumentDeclaration`  | `default?`                                    |
//! | `ExpressionStatement`  | `expression`                                  |
//! | `Block`, `Script`, `Class` | `[statement]`                             |
//! | `If`                   | `condition, then, else?`                      |
//! | `While`                | `condition, body`                             |
//! | `ForIn`                | `collection, body`                            |
//! | `Return`               | `value?`                                      |
//! | `Throw`                | `value`                                       |
//! | `Try`                  | `Block, catch Block?, finally Block?`         |

mod builder;
mod syntax;

pub use builder::TreeBuilder;
pub use syntax::{BinaryOp, Span, UnaryOp};

use core::fmt;

/// A node of the parsed tree.
#[derive(Debug, Clone, PartialEq)]
pub struct Node<'a> {
    pub kind: NodeKind<'a>,
    pub span: Span,
    /// Original source text of this node.
    pub text: &'a str,
    pub children: &'a [Node<'a>],
}

impl<'a> Node<'a> {
    pub fn tag(&self) -> NodeTag {
        self.kind.tag()
    }

    pub fn child(&self, index: usize) -> Option<&'a Node<'a>> {
        self.children.get(index)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind<'a> {
    // === Expressions ===
    Null,
    Boolean(bool),
    Integer(i64),
    Decimal(f64),
    String(&'a str),
    Interpolation,
    Array,
    Struct,
    Identifier(&'a str),
    Binary(BinaryOp),
    Unary(UnaryOp),
    Ternary,
    Assignment,
    DotAccess { name: &'a str, safe: bool },
    IndexAccess { safe: bool },
    FunctionCall { name: &'a str },
    MethodCall { name: &'a str, safe: bool },
    Argument { name: Option<&'a str> },
    New { class: &'a str },
    Closure,
    Lambda,

    // === Statements ===
    ExpressionStatement,
    Block,
    If,
    While { label: Option<&'a str> },
    ForIn { var: &'a str, label: Option<&'a str> },
    Break { label: Option<&'a str> },
    Continue { label: Option<&'a str> },
    Return,
    Throw,
    Try { catch_var: Option<&'a str> },
    FunctionDeclaration { name: &'a str },
    ArgumentDeclaration { name: &'a str, required: bool },
    /// Template component invocation (e.g. `<bx:output>`).
    Component { name: &'a str },

    // === Roots ===
    Script,
    Class { name: &'a str },
}

/// Fieldless discriminant of [`NodeKind`], used to key the transformer registry.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NodeTag {
    Null,
    Boolean,
    Integer,
    Decimal,
    String,
    Interpolation,
    Array,
    Struct,
    Identifier,
    Binary,
    Unary,
    Ternary,
    Assignment,
    DotAccess,
    IndexAccess,
    FunctionCall,
    MethodCall,
    Argument,
    New,
    Closure,
    Lambda,
    ExpressionStatement,
    Block,
    If,
    While,
    ForIn,
    Break,
    Continue,
    Return,
    Throw,
    Try,
    FunctionDeclaration,
    ArgumentDeclaration,
    Component,
    Script,
    Class,
}

impl NodeKind<'_> {
    pub fn tag(&self) -> NodeTag {
        match self {
            NodeKind::Null => NodeTag::Null,
            NodeKind::Boolean(_) => NodeTag::Boolean,
            NodeKind::Integer(_) => NodeTag::Integer,
            NodeKind::Decimal(_) => NodeTag::Decimal,
            NodeKind::String(_) => NodeTag::String,
            NodeKind::Interpolation => NodeTag::Interpolation,
            NodeKind::Array => NodeTag::Array,
            NodeKind::Struct => NodeTag::Struct,
            NodeKind::Identifier(_) => NodeTag::Identifier,
            NodeKind::Binary(_) => NodeTag::Binary,
            NodeKind::Unary(_) => NodeTag::Unary,
            NodeKind::Ternary => NodeTag::Ternary,
            NodeKind::Assignment => NodeTag::Assignment,
            NodeKind::DotAccess { .. } => NodeTag::DotAccess,
            NodeKind::IndexAccess { .. } => NodeTag::IndexAccess,
            NodeKind::FunctionCall { .. } => NodeTag::FunctionCall,
            NodeKind::MethodCall { .. } => NodeTag::MethodCall,
            NodeKind::Argument { .. } => NodeTag::Argument,
            NodeKind::New { .. } => NodeTag::New,
            NodeKind::Closure => NodeTag::Closure,
            NodeKind::Lambda => NodeTag::Lambda,
            NodeKind::ExpressionStatement => NodeTag::ExpressionStatement,
            NodeKind::Block => NodeTag::Block,
            NodeKind::If => NodeTag::If,
            NodeKind::While { .. } => NodeTag::While,
            NodeKind::ForIn { .. } => NodeTag::ForIn,
            NodeKind::Break { .. } => NodeTag::Break,
            NodeKind::Continue { .. } => NodeTag::Continue,
            NodeKind::Return => NodeTag::Return,
            NodeKind::Throw => NodeTag::Throw,
            NodeKind::Try { .. } => NodeTag::Try,
            NodeKind::FunctionDeclaration { .. } => NodeTag::FunctionDeclaration,
            NodeKind::ArgumentDeclaration { .. } => NodeTag::ArgumentDeclaration,
            NodeKind::Component { .. } => NodeTag::Component,
            NodeKind::Script => NodeTag::Script,
            NodeKind::Class { .. } => NodeTag::Class,
        }
    }
}

impl NodeTag {
    /// Kind name used in diagnostics.
    pub fn name(self) -> &'static str {
        match self {
            NodeTag::Null => "NullLiteral",
            NodeTag::Boolean => "BooleanLiteral",
            NodeTag::Integer => "IntegerLiteral",
            NodeTag::Decimal => "DecimalLiteral",
            NodeTag::String => "StringLiteral",
            NodeTag::Interpolation => "StringInterpolation",
            NodeTag::Array => "ArrayLiteral",
            NodeTag::Struct => "StructLiteral",
            NodeTag::Identifier => "Identifier",
            NodeTag::Binary => "BinaryOperation",
            NodeTag::Unary => "UnaryOperation",
            NodeTag::Ternary => "TernaryOperation",
            NodeTag::Assignment => "Assignment",
            NodeTag::DotAccess => "DotAccess",
            NodeTag::IndexAccess => "IndexAccess",
            NodeTag::FunctionCall => "FunctionInvocation",
            NodeTag::MethodCall => "MethodInvocation",
            NodeTag::Argument => "Argument",
            NodeTag::New => "NewOperation",
            NodeTag::Closure => "Closure",
            NodeTag::Lambda => "Lambda",
            NodeTag::ExpressionStatement => "ExpressionStatement",
            NodeTag::Block => "StatementBlock",
            NodeTag::If => "IfElse",
            NodeTag::While => "WhileLoop",
            NodeTag::ForIn => "ForIn",
            NodeTag::Break => "Break",
            NodeTag::Continue => "Continue",
            NodeTag::Return => "Return",
            NodeTag::Throw => "Throw",
            NodeTag::Try => "Try",
            NodeTag::FunctionDeclaration => "FunctionDeclaration",
            NodeTag::ArgumentDeclaration => "ArgumentDeclaration",
            NodeTag::Component => "Component",
            NodeTag::Script => "Script",
            NodeTag::Class => "Class",
        }
    }
}

impl fmt::Display for NodeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
