//! Typed kernel-language AST shared by the RenderScript and OpenCL dialects.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarType {
    Bool,
    Char,
    UChar,
    Short,
    Int,
    UInt,
    Long,
    Float,
    Double,
}

impl ScalarType {
    /// Kernel type for a Java primitive.
    pub fn from_java(name: &str) -> Option<Self> {
        Some(match name {
            "boolean" => ScalarType::Bool,
            "byte" => ScalarType::Char,
            "char" => ScalarType::UChar,
            "short" => ScalarType::Short,
            "int" => ScalarType::Int,
            "long" => ScalarType::Long,
            "float" => ScalarType::Float,
            "double" => ScalarType::Double,
            _ => return None,
        })
    }

    pub fn is_float(&self) -> bool {
        matches!(self, ScalarType::Float | ScalarType::Double)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressSpace {
    Private,
    Global,
    Constant,
}

#[derive(Debug, Clone, PartialEq)]
pub enum KType {
    Void,
    Scalar(ScalarType),
    Vector(ScalarType, u8),
    /// Opaque RenderScript allocation handle.
    Allocation,
    Pointer {
        space: AddressSpace,
        pointee: Box<KType>,
    },
}

impl KType {
    pub fn int() -> Self {
        KType::Scalar(ScalarType::Int)
    }

    pub fn float4() -> Self {
        KType::Vector(ScalarType::Float, 4)
    }

    pub fn global_ptr(pointee: KType) -> Self {
        KType::Pointer {
            space: AddressSpace::Global,
            pointee: Box::new(pointee),
        }
    }

    pub fn private_ptr(pointee: KType) -> Self {
        KType::Pointer {
            space: AddressSpace::Private,
            pointee: Box::new(pointee),
        }
    }

    pub fn is_float(&self) -> bool {
        match self {
            KType::Scalar(s) | KType::Vector(s, _) => s.is_float(),
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum KExpr {
    Ident(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Unary {
        op: &'static str,
        operand: Box<KExpr>,
        postfix: bool,
    },
    Binary {
        op: String,
        lhs: Box<KExpr>,
        rhs: Box<KExpr>,
    },
    Assign {
        op: Option<String>,
        target: Box<KExpr>,
        value: Box<KExpr>,
    },
    Ternary {
        condition: Box<KExpr>,
        then_value: Box<KExpr>,
        else_value: Box<KExpr>,
    },
    Call {
        name: String,
        args: Vec<KExpr>,
    },
    Index {
        target: Box<KExpr>,
        index: Box<KExpr>,
    },
    Member {
        target: Box<KExpr>,
        field: String,
    },
    Cast {
        ty: KType,
        operand: Box<KExpr>,
    },
    Deref(Box<KExpr>),
    AddressOf(Box<KExpr>),
    /// `(float4)(a, b, c, d)` style vector literal.
    Vector {
        ty: KType,
        items: Vec<KExpr>,
    },
}

impl KExpr {
    pub fn ident(name: impl Into<String>) -> Self {
        KExpr::Ident(name.into())
    }

    pub fn call(name: impl Into<String>, args: Vec<KExpr>) -> Self {
        KExpr::Call {
            name: name.into(),
            args,
        }
    }

    pub fn binary(lhs: KExpr, op: impl Into<String>, rhs: KExpr) -> Self {
        KExpr::Binary {
            op: op.into(),
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    pub fn assign(target: KExpr, value: KExpr) -> Self {
        KExpr::Assign {
            op: None,
            target: Box::new(target),
            value: Box::new(value),
        }
    }

    pub fn compound(target: KExpr, op: impl Into<String>, value: KExpr) -> Self {
        KExpr::Assign {
            op: Some(op.into()),
            target: Box::new(target),
            value: Box::new(value),
        }
    }

    pub fn index(target: KExpr, index: KExpr) -> Self {
        KExpr::Index {
            target: Box::new(target),
            index: Box::new(index),
        }
    }

    pub fn member(target: KExpr, field: impl Into<String>) -> Self {
        KExpr::Member {
            target: Box::new(target),
            field: field.into(),
        }
    }

    pub fn cast(ty: KType, operand: KExpr) -> Self {
        KExpr::Cast {
            ty,
            operand: Box::new(operand),
        }
    }

    pub fn deref(operand: KExpr) -> Self {
        KExpr::Deref(Box::new(operand))
    }

    pub fn address_of(operand: KExpr) -> Self {
        KExpr::AddressOf(Box::new(operand))
    }

    pub fn post_inc(operand: KExpr) -> Self {
        KExpr::Unary {
            op: "++",
            operand: Box::new(operand),
            postfix: true,
        }
    }

    pub fn ternary(condition: KExpr, then_value: KExpr, else_value: KExpr) -> Self {
        KExpr::Ternary {
            condition: Box::new(condition),
            then_value: Box::new(then_value),
            else_value: Box::new(else_value),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum KStmt {
    Decl {
        ty: KType,
        name: String,
        init: Option<KExpr>,
    },
    Expr(KExpr),
    If {
        condition: KExpr,
        then_body: Vec<KStmt>,
        else_body: Option<Vec<KStmt>>,
    },
    For {
        init: Option<Box<KStmt>>,
        condition: Option<KExpr>,
        update: Vec<KExpr>,
        body: Vec<KStmt>,
    },
    While {
        condition: KExpr,
        body: Vec<KStmt>,
    },
    DoWhile {
        body: Vec<KStmt>,
        condition: KExpr,
    },
    Return(Option<KExpr>),
    Break,
    Continue,
    Block(Vec<KStmt>),
}

impl KStmt {
    pub fn decl(ty: KType, name: impl Into<String>, init: KExpr) -> Self {
        KStmt::Decl {
            ty,
            name: name.into(),
            init: Some(init),
        }
    }

    pub fn expr(expr: KExpr) -> Self {
        KStmt::Expr(expr)
    }

    /// `for (int <var> = <from>; <var> < <to>; <var>++)`
    pub fn counted_for(var: &str, from: KExpr, to: KExpr, body: Vec<KStmt>) -> Self {
        KStmt::For {
            init: Some(Box::new(KStmt::decl(KType::int(), var, from))),
            condition: Some(KExpr::binary(KExpr::ident(var), "<", to)),
            update: vec![KExpr::post_inc(KExpr::ident(var))],
            body,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionKind {
    /// Device-side helper called from kernels.
    Helper,
    /// One work item per element.
    Kernel,
    /// Single-worker entry point launched by the host.
    Invokable,
}

#[derive(Debug, Clone, PartialEq)]
pub struct KParam {
    pub ty: KType,
    pub name: String,
}

impl KParam {
    pub fn new(ty: KType, name: impl Into<String>) -> Self {
        Self {
            ty,
            name: name.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct KFunction {
    pub kind: FunctionKind,
    pub name: String,
    pub return_type: KType,
    pub params: Vec<KParam>,
    pub body: Vec<KStmt>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum KItem {
    Pragma(String),
    Include(String),
    Comment(String),
    Global {
        ty: KType,
        name: String,
        volatile: bool,
    },
    Function(KFunction),
}

/// One generated kernel source file.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct KernelModule {
    pub items: Vec<KItem>,
}

impl KernelModule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, item: KItem) {
        self.items.push(item);
    }

    pub fn function(&mut self, function: KFunction) {
        self.items.push(KItem::Function(function));
    }

    pub fn global(&mut self, ty: KType, name: impl Into<String>) {
        self.items.push(KItem::Global {
            ty,
            name: name.into(),
            volatile: false,
        });
    }

    pub fn functions(&self) -> impl Iterator<Item = &KFunction> {
        self.items.iter().filter_map(|item| match item {
            KItem::Function(f) => Some(f),
            _ => None,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
