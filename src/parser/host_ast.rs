use std::fmt;

pub use self::operators::{BinaryOp, UnaryOp};
pub use crate::diagnostics::Span;

mod operators {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum BinaryOp {
        Mul,
        Div,
        Rem,
        Add,
        Sub,
        Shl,
        Shr,
        UShr,
        Lt,
        Gt,
        Le,
        Ge,
        Eq,
        Ne,
        BitAnd,
        BitXor,
        BitOr,
        And,
        Or,
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum UnaryOp {
        Neg,
        Plus,
        Not,
        BitNot,
        PreInc,
        PreDec,
        PostInc,
        PostDec,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompilationUnit {
    pub package: Option<PackageDecl>,
    pub imports: Vec<ImportDecl>,
    pub types: Vec<ClassDecl>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PackageDecl {
    pub name: String,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImportDecl {
    pub path: String,
    pub is_static: bool,
    pub wildcard: bool,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassKind {
    Class,
    Interface,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassDecl {
    pub name: String,
    pub kind: ClassKind,
    pub modifiers: Modifiers,
    pub members: Vec<Member>,
    pub span: Span,
    /// Range of `{ ... }`, braces included.
    pub body_span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Member {
    Field(FieldDecl),
    Method(MethodDecl),
    Constructor(MethodDecl),
    Initializer { is_static: bool, body: Block },
    Class(ClassDecl),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Modifiers {
    pub keywords: Vec<String>,
}

impl Modifiers {
    pub fn is_final(&self) -> bool {
        self.has("final")
    }

    pub fn is_static(&self) -> bool {
        self.has("static")
    }

    pub fn has(&self, keyword: &str) -> bool {
        self.keywords.iter().any(|k| k == keyword)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldDecl {
    pub modifiers: Modifiers,
    pub ty: TypeRef,
    pub declarators: Vec<Declarator>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Declarator {
    pub name: String,
    pub dims: usize,
    pub init: Option<Expr>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MethodDecl {
    pub modifiers: Modifiers,
    /// `None` for `void` methods and constructors.
    pub return_type: Option<TypeRef>,
    pub name: String,
    pub params: Vec<Param>,
    pub body: Option<Block>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub modifiers: Modifiers,
    pub ty: TypeRef,
    pub name: String,
    pub varargs: bool,
    pub span: Span,
}

/// A (possibly generic, possibly array) type as written in the source.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeRef {
    /// Possibly qualified name, e.g. `Array` or `org.parallelme.userlibrary.Array`.
    pub name: String,
    /// `None` when no type arguments were written, `Some(vec![])` for the diamond `<>`.
    pub args: Option<Vec<TypeRef>>,
    pub dims: usize,
    pub span: Span,
}

impl TypeRef {
    pub fn simple_name(&self) -> &str {
        self.name.rsplit('.').next().unwrap_or(&self.name)
    }

    pub fn is_diamond(&self) -> bool {
        matches!(&self.args, Some(args) if args.is_empty())
    }

    /// The single generic argument, if exactly one was written.
    pub fn single_argument(&self) -> Option<&TypeRef> {
        match &self.args {
            Some(args) if args.len() == 1 => args.first(),
            _ => None,
        }
    }

    pub fn is_primitive(&self) -> bool {
        self.dims == 0 && is_primitive_name(&self.name)
    }
}

pub fn is_primitive_name(name: &str) -> bool {
    matches!(
        name,
        "boolean" | "byte" | "char" | "short" | "int" | "long" | "float" | "double"
    )
}

#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub stmts: Vec<Stmt>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub kind: StmtKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    LocalVar(LocalVarDecl),
    Expr(Expr),
    If {
        condition: Expr,
        then_branch: Box<Stmt>,
        else_branch: Option<Box<Stmt>>,
    },
    While {
        condition: Expr,
        body: Box<Stmt>,
    },
    DoWhile {
        body: Box<Stmt>,
        condition: Expr,
    },
    For {
        init: Option<ForInit>,
        condition: Option<Expr>,
        update: Vec<Expr>,
        body: Box<Stmt>,
    },
    ForEach {
        variable: LocalVarDecl,
        iterable: Expr,
        body: Box<Stmt>,
    },
    Return(Option<Expr>),
    Break,
    Continue,
    Throw(Expr),
    Block(Block),
    Try {
        body: Block,
        catches: Vec<CatchClause>,
        finally: Option<Block>,
    },
    Empty,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ForInit {
    Decl(LocalVarDecl),
    Exprs(Vec<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct LocalVarDecl {
    pub modifiers: Modifiers,
    pub ty: TypeRef,
    pub declarators: Vec<Declarator>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CatchClause {
    pub param: Param,
    pub body: Block,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
}

impl Expr {
    pub fn new(kind: ExprKind, start: usize, end: usize) -> Self {
        Self {
            kind,
            span: Span::new(start, end),
        }
    }

    /// Strips redundant parentheses.
    pub fn unparenthesized(&self) -> &Expr {
        match &self.kind {
            ExprKind::Paren(inner) => inner.unparenthesized(),
            _ => self,
        }
    }

    pub fn as_name(&self) -> Option<&str> {
        match &self.unparenthesized().kind {
            ExprKind::Name(name) => Some(name),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Literal(Literal),
    Name(String),
    This,
    Super,
    FieldAccess {
        target: Box<Expr>,
        name: String,
    },
    MethodCall {
        target: Option<Box<Expr>>,
        name: String,
        args: Vec<Expr>,
    },
    New {
        ty: TypeRef,
        args: Vec<Expr>,
        body: Option<Vec<Member>>,
    },
    NewArray {
        ty: TypeRef,
        dims: Vec<Expr>,
        init: Option<Vec<Expr>>,
    },
    ArrayInit(Vec<Expr>),
    Index {
        target: Box<Expr>,
        index: Box<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Assign {
        op: Option<BinaryOp>,
        target: Box<Expr>,
        value: Box<Expr>,
    },
    Conditional {
        condition: Box<Expr>,
        then_value: Box<Expr>,
        else_value: Box<Expr>,
    },
    Cast {
        ty: TypeRef,
        operand: Box<Expr>,
    },
    Lambda(Lambda),
    ClassLiteral(TypeRef),
    Paren(Box<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Lambda {
    pub params: Vec<LambdaParam>,
    pub body: LambdaBody,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LambdaParam {
    pub name: String,
    pub ty: Option<TypeRef>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LambdaBody {
    Block(Block),
    Expr(Box<Expr>),
}

impl LambdaBody {
    pub fn span(&self) -> Span {
        match self {
            LambdaBody::Block(block) => block.span,
            LambdaBody::Expr(expr) => expr.span,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Int(i64),
    Long(i64),
    Float(f64),
    Double(f64),
    Char(char),
    String(String),
    Bool(bool),
    Null,
}

impl Literal {
    /// The Java type name of the literal.
    pub fn type_name(&self) -> &'static str {
        match self {
            Literal::Int(_) => "int",
            Literal::Long(_) => "long",
            Literal::Float(_) => "float",
            Literal::Double(_) => "double",
            Literal::Char(_) => "char",
            Literal::String(_) => "String",
            Literal::Bool(_) => "boolean",
            Literal::Null => "null",
        }
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        if let Some(args) = &self.args {
            write!(f, "<")?;
            for (i, arg) in args.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{}", arg)?;
            }
            write!(f, ">")?;
        }
        for _ in 0..self.dims {
            write!(f, "[]")?;
        }
        Ok(())
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Shl => "<<",
            BinaryOp::Shr => ">>",
            BinaryOp::UShr => ">>>",
            BinaryOp::Lt => "<",
            BinaryOp::Gt => ">",
            BinaryOp::Le => "<=",
            BinaryOp::Ge => ">=",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::BitAnd => "&",
            BinaryOp::BitXor => "^",
            BinaryOp::BitOr => "|",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
        };
        write!(f, "{}", symbol)
    }
}

/// Pre-order walk over every expression nested in `expr`.
pub fn walk_expr<'a>(expr: &'a Expr, f: &mut dyn FnMut(&'a Expr)) {
    f(expr);
    match &expr.kind {
        ExprKind::FieldAccess { target, .. } => walk_expr(target, f),
        ExprKind::MethodCall { target, args, .. } => {
            if let Some(target) = target {
                walk_expr(target, f);
            }
            for arg in args {
                walk_expr(arg, f);
            }
        }
        ExprKind::New { args, .. } => {
            for arg in args {
                walk_expr(arg, f);
            }
        }
        ExprKind::NewArray { dims, init, .. } => {
            for item in dims.iter().chain(init.iter().flatten()) {
                walk_expr(item, f);
            }
        }
        ExprKind::ArrayInit(items) => {
            for item in items {
                walk_expr(item, f);
            }
        }
        ExprKind::Index { target, index } => {
            walk_expr(target, f);
            walk_expr(index, f);
        }
        ExprKind::Unary { operand, .. } | ExprKind::Cast { operand, .. } => walk_expr(operand, f),
        ExprKind::Binary { lhs, rhs, .. } => {
            walk_expr(lhs, f);
            walk_expr(rhs, f);
        }
        ExprKind::Assign { target, value, .. } => {
            walk_expr(target, f);
            walk_expr(value, f);
        }
        ExprKind::Conditional {
            condition,
            then_value,
            else_value,
        } => {
            walk_expr(condition, f);
            walk_expr(then_value, f);
            walk_expr(else_value, f);
        }
        ExprKind::Lambda(lambda) => walk_lambda_body(&lambda.body, f),
        ExprKind::Paren(inner) => walk_expr(inner, f),
        ExprKind::Literal(_)
        | ExprKind::Name(_)
        | ExprKind::This
        | ExprKind::Super
        | ExprKind::ClassLiteral(_) => {}
    }
}

pub fn walk_lambda_body<'a>(body: &'a LambdaBody, f: &mut dyn FnMut(&'a Expr)) {
    match body {
        LambdaBody::Block(block) => walk_block(block, f),
        LambdaBody::Expr(expr) => walk_expr(expr, f),
    }
}

pub fn walk_block<'a>(block: &'a Block, f: &mut dyn FnMut(&'a Expr)) {
    for stmt in &block.stmts {
        walk_stmt(stmt, f);
    }
}

pub fn walk_stmt<'a>(stmt: &'a Stmt, f: &mut dyn FnMut(&'a Expr)) {
    match &stmt.kind {
        StmtKind::LocalVar(decl) => walk_local(decl, f),
        StmtKind::Expr(expr) | StmtKind::Throw(expr) | StmtKind::Return(Some(expr)) => {
            walk_expr(expr, f)
        }
        StmtKind::If {
            condition,
            then_branch,
            else_branch,
        } => {
            walk_expr(condition, f);
            walk_stmt(then_branch, f);
            if let Some(else_branch) = else_branch {
                walk_stmt(else_branch, f);
            }
        }
        StmtKind::While { condition, body } | StmtKind::DoWhile { body, condition } => {
            walk_expr(condition, f);
            walk_stmt(body, f);
        }
        StmtKind::For {
            init,
            condition,
            update,
            body,
        } => {
            match init {
                Some(ForInit::Decl(decl)) => walk_local(decl, f),
                Some(ForInit::Exprs(exprs)) => {
                    for expr in exprs {
                        walk_expr(expr, f);
                    }
                }
                None => {}
            }
            if let Some(condition) = condition {
                walk_expr(condition, f);
            }
            for expr in update {
                walk_expr(expr, f);
            }
            walk_stmt(body, f);
        }
        StmtKind::ForEach {
            variable,
            iterable,
            body,
        } => {
            walk_local(variable, f);
            walk_expr(iterable, f);
            walk_stmt(body, f);
        }
        StmtKind::Block(block) => walk_block(block, f),
        StmtKind::Try {
            body,
            catches,
            finally,
        } => {
            walk_block(body, f);
            for clause in catches {
                walk_block(&clause.body, f);
            }
            if let Some(finally) = finally {
                walk_block(finally, f);
            }
        }
        StmtKind::Return(None) | StmtKind::Break | StmtKind::Continue | StmtKind::Empty => {}
    }
}

fn walk_local<'a>(decl: &'a LocalVarDecl, f: &mut dyn FnMut(&'a Expr)) {
    for declarator in &decl.declarators {
        if let Some(init) = &declarator.init {
            walk_expr(init, f);
        }
    }
}
