//! Intermediate representation produced by the detector for one source file.

use std::fmt;

use crate::diagnostics::{Diagnostic, Span};
use crate::parser::host_ast::LambdaBody;
use crate::registry::{LibraryClassDescriptor, OperationKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionType {
    Parallel,
    Sequential,
}

impl fmt::Display for ExecutionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionType::Parallel => write!(f, "parallel"),
            ExecutionType::Sequential => write!(f, "sequential"),
        }
    }
}

/// A host variable referenced by an IR node.
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub name: String,
    pub type_name: String,
    pub type_parameter: Option<String>,
    pub is_final: bool,
    /// Id of the declaring symbol; stable for the whole file.
    pub symbol_id: usize,
}

/// Where a node sits in the host source and what its rewrite replaces.
#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    /// Range replaced by the host call site.
    pub span: Span,
    pub line: usize,
    /// The statement sits directly in a `{ }` block.
    pub in_block: bool,
    /// Offset of the closing `}` of that block.
    pub block_end: Option<usize>,
    /// Binary name of the enclosing named class (`Outer$Inner`).
    pub class_name: String,
}

/// The library-typed variable a node operates on.
#[derive(Debug, Clone, PartialEq)]
pub struct LibraryVariable {
    pub variable: Variable,
    pub class: &'static LibraryClassDescriptor,
    /// Element type; the type argument for arrays, `Pixel` for images.
    pub element: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ArgumentKind {
    Literal,
    Variable,
    ClassLiteral,
    Expression,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BindArgument {
    pub kind: ArgumentKind,
    /// Source text of the argument.
    pub text: String,
    /// Declared type for variable references.
    pub type_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InputBind {
    pub id: usize,
    pub target: LibraryVariable,
    pub arguments: Vec<BindArgument>,
    /// The bind also declares `target` (`Array<Int32> a = new ...`).
    pub declares_target: bool,
    pub position: Position,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindShape {
    /// `var.toJavaArray(dest)`
    None,
    /// `dest = var.toJavaArray()` or `dest = (T) var.toJavaArray()`
    Assignment,
    /// `T dest = var.toJavaArray()`
    DeclarativeAssignment,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OutputBind {
    pub id: usize,
    pub source: LibraryVariable,
    pub destination: Variable,
    pub shape: BindShape,
    /// Type named by a cast on the bind, if any.
    pub cast: Option<String>,
    pub position: Position,
}

/// The lambda handed to an operation.
#[derive(Debug, Clone, PartialEq)]
pub struct UserFunction {
    /// Formal argument names in order.
    pub params: Vec<String>,
    pub body: LambdaBody,
    pub text: String,
    pub line: usize,
    /// Byte offset of `text` in the source file.
    pub offset: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Operation {
    pub id: usize,
    pub kind: OperationKind,
    pub source: LibraryVariable,
    /// Library variable for map/filter, element-typed variable for reduce.
    pub destination: Option<Variable>,
    /// Element type of the produced values.
    pub output_element: String,
    pub declares_destination: bool,
    pub function: UserFunction,
    pub captures: Vec<Variable>,
    pub execution: ExecutionType,
    pub position: Position,
}

impl Operation {
    pub fn non_final_captures(&self) -> impl Iterator<Item = &Variable> {
        self.captures.iter().filter(|c| !c.is_final)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MethodCall {
    pub id: usize,
    pub variable: LibraryVariable,
    pub method: String,
    pub return_type: String,
    pub position: Position,
}

/// A library variable declared without initializer, replaced by device storage.
#[derive(Debug, Clone, PartialEq)]
pub struct LibraryDeclaration {
    pub variable: LibraryVariable,
    pub is_field: bool,
    pub modifiers: Vec<String>,
    /// From the declared type to the terminating `;`.
    pub span: Span,
    pub line: usize,
    pub class_name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum IrNode {
    InputBind(InputBind),
    OutputBind(OutputBind),
    Operation(Operation),
    MethodCall(MethodCall),
}

impl IrNode {
    pub fn id(&self) -> usize {
        match self {
            IrNode::InputBind(n) => n.id,
            IrNode::OutputBind(n) => n.id,
            IrNode::Operation(n) => n.id,
            IrNode::MethodCall(n) => n.id,
        }
    }

    pub fn position(&self) -> &Position {
        match self {
            IrNode::InputBind(n) => &n.position,
            IrNode::OutputBind(n) => &n.position,
            IrNode::Operation(n) => &n.position,
            IrNode::MethodCall(n) => &n.position,
        }
    }

    pub fn describe(&self) -> String {
        match self {
            IrNode::InputBind(n) => format!(
                "#{} line {}: input bind {} <- new {}({})",
                n.id,
                n.position.line,
                n.target.variable.name,
                n.target.class.name,
                n.arguments
                    .iter()
                    .map(|a| a.text.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
            IrNode::OutputBind(n) => format!(
                "#{} line {}: output bind {} -> {} ({:?})",
                n.id, n.position.line, n.source.variable.name, n.destination.name, n.shape
            ),
            IrNode::Operation(n) => {
                let captures = n
                    .captures
                    .iter()
                    .map(|c| {
                        if c.is_final {
                            format!("final {}", c.name)
                        } else {
                            c.name.clone()
                        }
                    })
                    .collect::<Vec<_>>()
                    .join(", ");
                format!(
                    "#{} line {}: {} {}{} [{}] captures [{}]",
                    n.id,
                    n.position.line,
                    n.kind,
                    n.source.variable.name,
                    n.destination
                        .as_ref()
                        .map(|d| format!(" -> {}", d.name))
                        .unwrap_or_default(),
                    n.execution,
                    captures
                )
            }
            IrNode::MethodCall(n) => format!(
                "#{} line {}: method call {}.{}()",
                n.id, n.position.line, n.variable.variable.name, n.method
            ),
        }
    }
}

/// A class body the host rewriter may insert one-time declarations into.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassBody {
    pub binary_name: String,
    pub simple_name: String,
    /// Offset just past the opening `{`.
    pub insert_at: usize,
    pub is_top_level: bool,
    pub is_static: bool,
}

/// Everything the backends need from one compiled file.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FileIr {
    pub package: Option<String>,
    /// Offset just past the package declaration.
    pub package_end: Option<usize>,
    /// Offset of the first import declaration.
    pub first_import: Option<usize>,
    /// Top-level class named after the file.
    pub class_name: String,
    pub removed_imports: Vec<Span>,
    pub classes: Vec<ClassBody>,
    pub declarations: Vec<LibraryDeclaration>,
    /// Ordered by sequential id.
    pub nodes: Vec<IrNode>,
    pub diagnostics: Vec<Diagnostic>,
}

impl FileIr {
    pub fn operations(&self) -> impl Iterator<Item = &Operation> {
        self.nodes.iter().filter_map(|node| match node {
            IrNode::Operation(op) => Some(op),
            _ => None,
        })
    }

    pub fn class(&self, binary_name: &str) -> Option<&ClassBody> {
        self.classes.iter().find(|c| c.binary_name == binary_name)
    }

    /// Classes that own at least one node or library declaration.
    pub fn classes_in_use(&self) -> Vec<&ClassBody> {
        self.classes
            .iter()
            .filter(|class| {
                self.nodes
                    .iter()
                    .any(|n| n.position().class_name == class.binary_name)
                    || self
                        .declarations
                        .iter()
                        .any(|d| d.class_name == class.binary_name)
            })
            .collect()
    }

    pub fn has_dsl_usage(&self) -> bool {
        !self.nodes.is_empty() || !self.declarations.is_empty()
    }
}
