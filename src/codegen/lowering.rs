//! Lowers the lambda of an operation into a typed kernel helper function.

use std::collections::HashMap;

use crate::codegen::kernel_ast::*;
use crate::codegen::naming::NamingScheme;
use crate::diagnostics::Span;
use crate::error::{CompileError, CompileResult};
use crate::ir::{Operation, UserFunction, Variable};
use crate::parser::host_ast::*;
use crate::registry::{ElementDescriptor, LibraryRegistry, OperationKind};

/// Kernel language a helper is lowered for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelLanguage {
    RenderScript,
    OpenCl,
}

impl KernelLanguage {
    fn scalar(&self, java: &str) -> Option<ScalarType> {
        match ScalarType::from_java(java)? {
            ScalarType::Double if *self == KernelLanguage::OpenCl => Some(ScalarType::Float),
            other => Some(other),
        }
    }

    /// Address space of pointers to non-final captures.
    fn capture_space(&self) -> AddressSpace {
        match self {
            KernelLanguage::RenderScript => AddressSpace::Private,
            KernelLanguage::OpenCl => AddressSpace::Global,
        }
    }
}

/// Identifiers valid in Java but reserved in C99, RenderScript or OpenCL C.
const RESERVED: &[&str] = &[
    "auto", "bool", "complex", "constant", "extern", "global", "half", "image2d_t",
    "image3d_t", "imaginary", "inline", "kernel", "local", "read_only", "read_write",
    "register", "restrict", "rs_allocation", "sampler_t", "signed", "sizeof", "struct",
    "typedef", "uchar", "uchar4", "uint", "uint32_t", "ulong", "union", "unsigned",
    "ushort", "float2", "float3", "float4", "int2", "int3", "int4", "write_only",
    "__global", "__kernel", "__local", "__private", "__constant",
];

/// Kernel type of an element as seen by user functions.
pub fn element_type(element: &ElementDescriptor) -> KType {
    match element.primitive.and_then(ScalarType::from_java) {
        Some(scalar) => KType::Scalar(scalar),
        None => KType::float4(),
    }
}

/// Kernel value type of a captured host variable, if it has one.
pub fn capture_type(
    variable: &Variable,
    registry: &LibraryRegistry,
    language: KernelLanguage,
) -> Option<KType> {
    if let Some(scalar) = language.scalar(&variable.type_name) {
        return Some(KType::Scalar(scalar));
    }
    registry
        .element(&variable.type_name)
        .and_then(|e| e.primitive)
        .and_then(|p| language.scalar(p))
        .map(KType::Scalar)
}

/// A captured variable as it reaches the helper function.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureBinding {
    pub variable: Variable,
    /// Value type; non-final captures are passed by pointer to it.
    pub ty: KType,
    pub by_pointer: bool,
}

/// The lowered user function and how to call it.
#[derive(Debug, Clone, PartialEq)]
pub struct LoweredFunction {
    pub function: KFunction,
    pub captures: Vec<CaptureBinding>,
    pub input: KType,
    pub output: KType,
    /// The helper takes the pixel coordinates after the element.
    pub takes_coordinates: bool,
}

impl LoweredFunction {
    /// Call expression with the element arguments followed by the captures.
    pub fn call(&self, mut elements: Vec<KExpr>, captures: Vec<KExpr>) -> KExpr {
        elements.extend(captures);
        KExpr::call(self.function.name.clone(), elements)
    }
}

#[derive(Debug, Clone)]
struct Binding {
    name: String,
    ty: KType,
    element: bool,
    pointer: bool,
}

impl Binding {
    fn value(&self) -> KExpr {
        if self.pointer {
            KExpr::deref(KExpr::ident(self.name.clone()))
        } else {
            KExpr::ident(self.name.clone())
        }
    }
}

struct Typed {
    expr: KExpr,
    ty: KType,
}

impl Typed {
    fn new(expr: KExpr, ty: KType) -> Self {
        Self { expr, ty }
    }
}

/// Lowers `op`'s lambda into `<prefix>function<id>`.
pub fn lower_operation(
    op: &Operation,
    registry: &LibraryRegistry,
    naming: &NamingScheme,
    language: KernelLanguage,
) -> CompileResult<LoweredFunction> {
    let line = op.position.line;
    let input = registry
        .element(&op.source.element)
        .ok_or_else(|| CompileError::unsupported(line, &op.source.element, "unknown element type"))?;
    let output = registry.element(&op.output_element).ok_or_else(|| {
        CompileError::unsupported(line, &op.output_element, "unknown element type")
    })?;
    let input_ty = element_type(input);
    let output_ty = match op.kind {
        OperationKind::Filter => KType::Scalar(ScalarType::Bool),
        OperationKind::Map => element_type(output),
        OperationKind::Foreach | OperationKind::Reduce => input_ty.clone(),
    };

    let mut lowerer = Lowerer::new(registry, &op.function, naming.prefix(), language);
    let mut params = Vec::new();
    for name in &op.function.params {
        let lowered = lowerer.escape(name);
        params.push(KParam::new(input_ty.clone(), lowered.clone()));
        lowerer.bind(name, lowered, input_ty.clone(), true, false);
    }
    let takes_coordinates = op.kind == OperationKind::Foreach && input.is_pixel();
    if takes_coordinates {
        let (x, y) = (naming.fixed("x"), naming.fixed("y"));
        params.push(KParam::new(KType::int(), x.clone()));
        params.push(KParam::new(KType::int(), y.clone()));
        lowerer.coordinates = Some((x, y));
        lowerer.pixel_param = op.function.params.first().cloned();
    }

    let mut captures = Vec::new();
    for capture in &op.captures {
        let ty = capture_type(capture, registry, language).ok_or_else(|| {
            CompileError::unsupported(
                line,
                &capture.type_name,
                format!("captured variable `{}` has no kernel equivalent", capture.name),
            )
        })?;
        let by_pointer = !capture.is_final;
        let lowered = lowerer.escape(&capture.name);
        let param_ty = if by_pointer {
            KType::Pointer {
                space: language.capture_space(),
                pointee: Box::new(ty.clone()),
            }
        } else {
            ty.clone()
        };
        params.push(KParam::new(param_ty, lowered.clone()));
        let element = registry.element(&capture.type_name).is_some();
        lowerer.bind(&capture.name, lowered, ty.clone(), element, by_pointer);
        captures.push(CaptureBinding {
            variable: capture.clone(),
            ty,
            by_pointer,
        });
    }

    if op.kind == OperationKind::Foreach {
        let result = op.function.params.first().map(|p| lowerer.escape(p));
        lowerer.foreach_result = result;
    }
    let body = lowerer.lower_body(&op.function.body)?;
    log::trace!("lowered user function of operation {}", op.id);

    Ok(LoweredFunction {
        function: KFunction {
            kind: FunctionKind::Helper,
            name: naming.function(op.id),
            return_type: output_ty.clone(),
            params,
            body,
        },
        captures,
        input: input_ty,
        output: output_ty,
        takes_coordinates,
    })
}

struct Lowerer<'a> {
    registry: &'a LibraryRegistry,
    function: &'a UserFunction,
    prefix: &'a str,
    language: KernelLanguage,
    scopes: Vec<HashMap<String, Binding>>,
    coordinates: Option<(String, String)>,
    pixel_param: Option<String>,
    /// Foreach helpers return their (possibly modified) element.
    foreach_result: Option<String>,
}

impl<'a> Lowerer<'a> {
    fn new(
        registry: &'a LibraryRegistry,
        function: &'a UserFunction,
        prefix: &'a str,
        language: KernelLanguage,
    ) -> Self {
        Self {
            registry,
            function,
            prefix,
            language,
            scopes: vec![HashMap::new()],
            coordinates: None,
            pixel_param: None,
            foreach_result: None,
        }
    }

    fn escape(&self, name: &str) -> String {
        if RESERVED.contains(&name) || (!self.prefix.is_empty() && name.starts_with(self.prefix)) {
            format!("{}_", name)
        } else {
            name.to_string()
        }
    }

    fn bind(&mut self, source: &str, name: String, ty: KType, element: bool, pointer: bool) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(
                source.to_string(),
                Binding {
                    name,
                    ty,
                    element,
                    pointer,
                },
            );
        }
    }

    fn lookup(&self, name: &str) -> Option<&Binding> {
        self.scopes.iter().rev().find_map(|scope| scope.get(name))
    }

    fn error(&self, span: Span, expected: &str) -> CompileError {
        let text = &self.function.text;
        let start = span.start.saturating_sub(self.function.offset).min(text.len());
        let end = span.end.saturating_sub(self.function.offset).clamp(start, text.len());
        let line = self.function.line + text.get(..start).map_or(0, |t| t.matches('\n').count());
        let statement = text.get(start..end).unwrap_or(text.as_str());
        CompileError::structural(line, statement, expected)
    }

    fn lower_body(&mut self, body: &LambdaBody) -> CompileResult<Vec<KStmt>> {
        let mut stmts = match body {
            LambdaBody::Block(block) => self.lower_block(&block.stmts)?,
            LambdaBody::Expr(expr) => {
                let value = self.lower_expr(expr)?;
                if self.foreach_result.is_some() {
                    vec![KStmt::Expr(value.expr)]
                } else {
                    vec![KStmt::Return(Some(value.expr))]
                }
            }
        };
        if let Some(result) = &self.foreach_result {
            if !matches!(stmts.last(), Some(KStmt::Return(_))) {
                stmts.push(KStmt::Return(Some(KExpr::ident(result.clone()))));
            }
        }
        Ok(stmts)
    }

    fn lower_block(&mut self, stmts: &[Stmt]) -> CompileResult<Vec<KStmt>> {
        self.scopes.push(HashMap::new());
        let mut out = Vec::new();
        for stmt in stmts {
            match self.lower_stmt(stmt) {
                Ok(lowered) => out.extend(lowered),
                Err(err) => {
                    self.scopes.pop();
                    return Err(err);
                }
            }
        }
        self.scopes.pop();
        Ok(out)
    }

    /// A branch or loop body, always lowered into its own scope.
    fn lower_branch(&mut self, stmt: &Stmt) -> CompileResult<Vec<KStmt>> {
        match &stmt.kind {
            StmtKind::Block(block) => self.lower_block(&block.stmts),
            _ => self.lower_block(std::slice::from_ref(stmt)),
        }
    }

    fn local_type(&self, ty: &TypeRef) -> Option<(KType, bool)> {
        if ty.dims > 0 || ty.args.is_some() {
            return None;
        }
        if let Some(scalar) = self.language.scalar(&ty.name) {
            return Some((KType::Scalar(scalar), false));
        }
        let element = self.registry.element(ty.simple_name())?;
        let scalar = self.language.scalar(element.primitive?)?;
        Some((KType::Scalar(scalar), true))
    }

    fn lower_local(&mut self, decl: &LocalVarDecl) -> CompileResult<Vec<KStmt>> {
        let (ty, element) = self
            .local_type(&decl.ty)
            .ok_or_else(|| self.error(decl.span, "a primitive or scalar element local"))?;
        let mut out = Vec::new();
        for declarator in &decl.declarators {
            if declarator.dims > 0 {
                return Err(self.error(declarator.span, "a scalar local"));
            }
            let init = match &declarator.init {
                Some(init) => Some(self.lower_expr(init)?.expr),
                None => None,
            };
            let name = self.escape(&declarator.name);
            self.bind(&declarator.name, name.clone(), ty.clone(), element, false);
            out.push(KStmt::Decl {
                ty: ty.clone(),
                name,
                init,
            });
        }
        Ok(out)
    }

    fn lower_stmt(&mut self, stmt: &Stmt) -> CompileResult<Vec<KStmt>> {
        let lowered = match &stmt.kind {
            StmtKind::LocalVar(decl) => return self.lower_local(decl),
            StmtKind::Expr(expr) => KStmt::Expr(self.lower_expr(expr)?.expr),
            StmtKind::If {
                condition,
                then_branch,
                else_branch,
            } => KStmt::If {
                condition: self.lower_expr(condition)?.expr,
                then_body: self.lower_branch(then_branch)?,
                else_body: match else_branch {
                    Some(branch) => Some(self.lower_branch(branch)?),
                    None => None,
                },
            },
            StmtKind::While { condition, body } => KStmt::While {
                condition: self.lower_expr(condition)?.expr,
                body: self.lower_branch(body)?,
            },
            StmtKind::DoWhile { body, condition } => KStmt::DoWhile {
                body: self.lower_branch(body)?,
                condition: self.lower_expr(condition)?.expr,
            },
            StmtKind::For {
                init,
                condition,
                update,
                body,
            } => {
                self.scopes.push(HashMap::new());
                let lowered = self.lower_for(stmt.span, init.as_ref(), condition.as_ref(), update, body);
                self.scopes.pop();
                lowered?
            }
            StmtKind::Return(None) => match &self.foreach_result {
                Some(result) => KStmt::Return(Some(KExpr::ident(result.clone()))),
                None => return Err(self.error(stmt.span, "`return <value>;`")),
            },
            StmtKind::Return(Some(value)) => {
                if self.foreach_result.is_some() {
                    return Err(self.error(stmt.span, "`return;` in a foreach function"));
                }
                KStmt::Return(Some(self.lower_expr(value)?.expr))
            }
            StmtKind::Break => KStmt::Break,
            StmtKind::Continue => KStmt::Continue,
            StmtKind::Block(block) => KStmt::Block(self.lower_block(&block.stmts)?),
            StmtKind::Empty => return Ok(Vec::new()),
            StmtKind::ForEach { .. } | StmtKind::Throw(_) | StmtKind::Try { .. } => {
                return Err(self.error(stmt.span, "a statement supported in kernel code"))
            }
        };
        Ok(vec![lowered])
    }

    fn lower_for(
        &mut self,
        span: Span,
        init: Option<&ForInit>,
        condition: Option<&Expr>,
        update: &[Expr],
        body: &Stmt,
    ) -> CompileResult<KStmt> {
        let init = match init {
            None => None,
            Some(ForInit::Decl(decl)) => {
                let mut decls = self.lower_local(decl)?;
                if decls.len() != 1 {
                    return Err(self.error(span, "a single loop variable"));
                }
                decls.pop().map(Box::new)
            }
            Some(ForInit::Exprs(exprs)) => match exprs.as_slice() {
                [] => None,
                [expr] => Some(Box::new(KStmt::Expr(self.lower_expr(expr)?.expr))),
                _ => return Err(self.error(span, "a single loop initializer")),
            },
        };
        let condition = match condition {
            Some(condition) => Some(self.lower_expr(condition)?.expr),
            None => None,
        };
        let update = update
            .iter()
            .map(|u| self.lower_expr(u).map(|t| t.expr))
            .collect::<CompileResult<Vec<_>>>()?;
        Ok(KStmt::For {
            init,
            condition,
            update,
            body: self.lower_branch(body)?,
        })
    }

    fn lower_expr(&mut self, expr: &Expr) -> CompileResult<Typed> {
        match &expr.kind {
            ExprKind::Literal(literal) => self.lower_literal(expr.span, literal),
            ExprKind::Name(name) => match self.lookup(name) {
                Some(binding) => Ok(Typed::new(binding.value(), binding.ty.clone())),
                None => Err(self.error(expr.span, "a parameter, local or captured variable")),
            },
            ExprKind::Paren(inner) => self.lower_expr(inner),
            ExprKind::FieldAccess { target, name } => self.lower_field(expr.span, target, name),
            ExprKind::MethodCall { target, name, args } => match target {
                Some(target) if target.as_name() == Some("Math") && self.lookup("Math").is_none() => {
                    self.lower_math(expr.span, name, args)
                }
                _ => Err(self.error(expr.span, "a `Math` function call")),
            },
            ExprKind::New { ty, args, body: None } => self.lower_element_creation(expr.span, ty, args),
            ExprKind::Unary { op, operand } => {
                let operand = self.lower_expr(operand)?;
                let (symbol, postfix) = match op {
                    UnaryOp::Neg => ("-", false),
                    UnaryOp::Plus => ("+", false),
                    UnaryOp::Not => ("!", false),
                    UnaryOp::BitNot => ("~", false),
                    UnaryOp::PreInc => ("++", false),
                    UnaryOp::PreDec => ("--", false),
                    UnaryOp::PostInc => ("++", true),
                    UnaryOp::PostDec => ("--", true),
                };
                let ty = if *op == UnaryOp::Not {
                    KType::Scalar(ScalarType::Bool)
                } else {
                    operand.ty
                };
                Ok(Typed::new(
                    KExpr::Unary {
                        op: symbol,
                        operand: Box::new(operand.expr),
                        postfix,
                    },
                    ty,
                ))
            }
            ExprKind::Binary { op, lhs, rhs } => {
                let lhs = self.lower_expr(lhs)?;
                let rhs = self.lower_expr(rhs)?;
                self.lower_binary(expr.span, *op, lhs, rhs)
            }
            ExprKind::Assign { op, target, value } => {
                let target = self.lower_expr(target)?;
                let value = self.lower_expr(value)?;
                let lowered = match op {
                    None => KExpr::assign(target.expr, value.expr),
                    Some(BinaryOp::UShr) => {
                        return Err(self.error(expr.span, "a compound assignment other than `>>>=`"))
                    }
                    Some(op) => KExpr::compound(target.expr, binary_symbol(*op), value.expr),
                };
                Ok(Typed::new(lowered, target.ty))
            }
            ExprKind::Conditional {
                condition,
                then_value,
                else_value,
            } => {
                let condition = self.lower_expr(condition)?;
                let then_value = self.lower_expr(then_value)?;
                let else_value = self.lower_expr(else_value)?;
                Ok(Typed::new(
                    KExpr::ternary(condition.expr, then_value.expr, else_value.expr),
                    then_value.ty,
                ))
            }
            ExprKind::Cast { ty, operand } => {
                let target = match self.local_type(ty) {
                    Some((target, false)) => target,
                    _ => return Err(self.error(expr.span, "a cast to a primitive type")),
                };
                let operand = self.lower_expr(operand)?;
                Ok(Typed::new(KExpr::cast(target.clone(), operand.expr), target))
            }
            _ => Err(self.error(expr.span, "an expression supported in kernel code")),
        }
    }

    fn lower_literal(&self, span: Span, literal: &Literal) -> CompileResult<Typed> {
        Ok(match literal {
            Literal::Int(v) => Typed::new(KExpr::Int(*v), KType::int()),
            Literal::Long(v) => Typed::new(KExpr::Int(*v), KType::Scalar(ScalarType::Long)),
            Literal::Float(v) | Literal::Double(v) => {
                Typed::new(KExpr::Float(*v), KType::Scalar(ScalarType::Float))
            }
            Literal::Char(c) => Typed::new(KExpr::Int(i64::from(u32::from(*c))), KType::int()),
            Literal::Bool(b) => Typed::new(KExpr::Bool(*b), KType::Scalar(ScalarType::Bool)),
            Literal::String(_) | Literal::Null => {
                return Err(self.error(span, "a numeric or boolean literal"))
            }
        })
    }

    fn lower_field(&mut self, span: Span, target: &Expr, name: &str) -> CompileResult<Typed> {
        if target.as_name() == Some("Math") && self.lookup("Math").is_none() {
            let value = match name {
                "PI" => std::f64::consts::PI,
                "E" => std::f64::consts::E,
                _ => return Err(self.error(span, "`Math.PI` or `Math.E`")),
            };
            return Ok(Typed::new(KExpr::Float(value), KType::Scalar(ScalarType::Float)));
        }

        // p.rgba.<channel>
        if let ExprKind::FieldAccess {
            target: pixel,
            name: rgba,
        } = &target.unparenthesized().kind
        {
            if rgba == "rgba" {
                let binding = pixel
                    .as_name()
                    .and_then(|p| self.lookup(p))
                    .filter(|b| b.element && b.ty == KType::float4())
                    .cloned()
                    .ok_or_else(|| self.error(span, "`<pixel>.rgba.<channel>`"))?;
                let lane = match name {
                    "red" => "x",
                    "green" => "y",
                    "blue" => "z",
                    "alpha" => "w",
                    _ => return Err(self.error(span, "one of `red`, `green`, `blue`, `alpha`")),
                };
                return Ok(Typed::new(
                    KExpr::member(binding.value(), lane),
                    KType::Scalar(ScalarType::Float),
                ));
            }
        }

        let base = target.as_name();
        let binding = base.and_then(|b| self.lookup(b)).filter(|b| b.element).cloned();
        match binding {
            Some(binding) if binding.ty == KType::float4() => {
                let is_param = base.is_some() && base == self.pixel_param.as_deref();
                match (&self.coordinates, name) {
                    (Some((x, _)), "x") if is_param => Ok(Typed::new(KExpr::ident(x.clone()), KType::int())),
                    (Some((_, y)), "y") if is_param => Ok(Typed::new(KExpr::ident(y.clone()), KType::int())),
                    _ => Err(self.error(span, "`<pixel>.x` or `<pixel>.y` of the foreach pixel")),
                }
            }
            Some(binding) if name == "value" => Ok(Typed::new(binding.value(), binding.ty)),
            _ => Err(self.error(span, "element access through `.value`")),
        }
    }

    fn lower_element_creation(&mut self, span: Span, ty: &TypeRef, args: &[Expr]) -> CompileResult<Typed> {
        let target = match self.local_type(ty) {
            Some((target, true)) => target,
            _ => return Err(self.error(span, "a scalar element constructor")),
        };
        match args {
            [] => {
                let zero = if target.is_float() {
                    KExpr::Float(0.0)
                } else {
                    KExpr::Int(0)
                };
                Ok(Typed::new(zero, target))
            }
            [value] => {
                let value = self.lower_expr(value)?;
                let expr = if value.ty == target {
                    value.expr
                } else {
                    KExpr::cast(target.clone(), value.expr)
                };
                Ok(Typed::new(expr, target))
            }
            _ => Err(self.error(span, "an element constructor with one value")),
        }
    }

    fn lower_binary(&self, span: Span, op: BinaryOp, lhs: Typed, rhs: Typed) -> CompileResult<Typed> {
        let ty = match op {
            BinaryOp::Lt
            | BinaryOp::Gt
            | BinaryOp::Le
            | BinaryOp::Ge
            | BinaryOp::Eq
            | BinaryOp::Ne
            | BinaryOp::And
            | BinaryOp::Or => KType::Scalar(ScalarType::Bool),
            BinaryOp::Shl | BinaryOp::Shr | BinaryOp::UShr => lhs.ty.clone(),
            _ => promote(&lhs.ty, &rhs.ty),
        };
        if op == BinaryOp::UShr {
            if lhs.ty != KType::int() {
                return Err(self.error(span, "`>>>` on an `int` operand"));
            }
            let shifted = KExpr::binary(
                KExpr::cast(KType::Scalar(ScalarType::UInt), lhs.expr),
                ">>",
                rhs.expr,
            );
            return Ok(Typed::new(KExpr::cast(KType::int(), shifted), ty));
        }
        Ok(Typed::new(KExpr::binary(lhs.expr, binary_symbol(op), rhs.expr), ty))
    }

    fn lower_math(&mut self, span: Span, name: &str, args: &[Expr]) -> CompileResult<Typed> {
        let args = args
            .iter()
            .map(|a| self.lower_expr(a))
            .collect::<CompileResult<Vec<_>>>()?;
        let any_float = args.iter().any(|a| a.ty.is_float());
        let types: Vec<KType> = args.iter().map(|a| a.ty.clone()).collect();
        let exprs: Vec<KExpr> = args.into_iter().map(|a| a.expr).collect();
        let float = KType::Scalar(ScalarType::Float);

        let function = match (name, exprs.len()) {
            ("abs", 1) if !any_float => return Ok(Typed::new(KExpr::call("abs", exprs), types[0].clone())),
            ("abs", 1) => "fabs",
            ("min" | "max", 2) if !any_float => {
                let ty = promote(&types[0], &types[1]);
                return Ok(Typed::new(KExpr::call(name, exprs), ty));
            }
            ("min", 2) => "fmin",
            ("max", 2) => "fmax",
            ("round", 1) => {
                let call = KExpr::call("round", to_float(exprs, &types));
                return Ok(Typed::new(KExpr::cast(KType::int(), call), KType::int()));
            }
            ("signum", 1) => "sign",
            ("toRadians", 1) => "radians",
            ("toDegrees", 1) => "degrees",
            (
                "sqrt" | "cbrt" | "exp" | "log" | "log10" | "sin" | "cos" | "tan" | "asin" | "acos"
                | "atan" | "sinh" | "cosh" | "tanh" | "floor" | "ceil" | "rint",
                1,
            ) => name,
            ("pow" | "atan2" | "hypot", 2) => name,
            _ => return Err(self.error(span, "a `Math` function with a kernel equivalent")),
        };
        let exprs = to_float(exprs, &types);
        Ok(Typed::new(KExpr::call(function, exprs), float))
    }
}

/// Casts integral arguments of float-only builtins to `float`.
fn to_float(exprs: Vec<KExpr>, types: &[KType]) -> Vec<KExpr> {
    exprs
        .into_iter()
        .zip(types)
        .map(|(expr, ty)| {
            if ty.is_float() {
                expr
            } else {
                KExpr::cast(KType::Scalar(ScalarType::Float), expr)
            }
        })
        .collect()
}

fn promote(lhs: &KType, rhs: &KType) -> KType {
    let rank = |ty: &KType| match ty {
        KType::Vector(..) => 4,
        KType::Scalar(ScalarType::Double) => 3,
        KType::Scalar(ScalarType::Float) => 2,
        KType::Scalar(ScalarType::Long) => 1,
        _ => 0,
    };
    match rank(lhs).max(rank(rhs)) {
        0 => KType::int(),
        _ if rank(lhs) >= rank(rhs) => lhs.clone(),
        _ => rhs.clone(),
    }
}

pub fn binary_symbol(op: BinaryOp) -> &'static str {
    match op {
        BinaryOp::Mul => "*",
        BinaryOp::Div => "/",
        BinaryOp::Rem => "%",
        BinaryOp::Add => "+",
        BinaryOp::Sub => "-",
        BinaryOp::Shl => "<<",
        BinaryOp::Shr | BinaryOp::UShr => ">>",
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
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::{SequenceCounter, SourceAnalyzer};
    use crate::codegen::render::{KernelDialect, KernelRenderer};

    struct C;

    impl KernelDialect for C {
        fn scalar_name(&self, scalar: ScalarType) -> &'static str {
            match scalar {
                ScalarType::Bool => "bool",
                ScalarType::Float => "float",
                ScalarType::UInt => "uint",
                ScalarType::Long => "long",
                _ => "int",
            }
        }

        fn allocation_name(&self) -> &'static str {
            "rs_allocation"
        }

        fn address_space(&self, space: AddressSpace) -> &'static str {
            match space {
                AddressSpace::Global => "__global",
                _ => "",
            }
        }

        fn function_prefix(&self, _function: &KFunction, return_type: &str) -> String {
            format!("static {}", return_type)
        }

        fn vector_literal(&self, ty: &str, items: &[String]) -> String {
            format!("({})({})", ty, items.join(", "))
        }
    }

    fn operation(body: &str, element: &str) -> Operation {
        let source = format!(
            "import org.parallelme.userlibrary.Array;\nimport org.parallelme.userlibrary.image.BitmapImage;\nimport org.parallelme.userlibrary.datatype.*;\n\nclass K {{\n    final int limit = 3;\n    void run(final {e}[] data, android.graphics.Bitmap bmp) {{\n        final float scale = 2.0f;\n        int total = 0;\n        Array<{t}> a = new Array<{t}>(data, {t}.class);\n        BitmapImage img = new BitmapImage(bmp);\n        {body}\n    }}\n}}\n",
            e = if element == "Float32" { "float" } else { "int" },
            t = element,
            body = body
        );
        let ir = SourceAnalyzer::default()
            .analyze(&source, "K", &mut SequenceCounter::new())
            .unwrap();
        let op = ir.operations().next().cloned().unwrap();
        op
    }

    fn lower(body: &str, element: &str, language: KernelLanguage) -> CompileResult<LoweredFunction> {
        lower_operation(
            &operation(body, element),
            &LibraryRegistry::new(),
            &NamingScheme::default(),
            language,
        )
    }

    fn render(lowered: &LoweredFunction) -> String {
        let mut module = KernelModule::new();
        module.function(lowered.function.clone());
        KernelRenderer::new(&C).render(&module)
    }

    #[test]
    fn test_foreach_returns_element() {
        let lowered = lower(
            "a.par().foreach(x -> { x.value = x.value * 2 + 1; });",
            "Int32",
            KernelLanguage::RenderScript,
        )
        .unwrap();
        let text = render(&lowered);
        pretty_assertions::assert_eq!(
            text,
            "\nstatic int PM_function3(int x) {\n    x = (x * 2) + 1;\n    return x;\n}\n"
        );
        assert_eq!(lowered.output, KType::int());
    }

    #[test]
    fn test_mutable_capture_is_dereferenced() {
        let lowered = lower(
            "a.par().foreach(x -> { total += x.value; x.value = total; });",
            "Int32",
            KernelLanguage::OpenCl,
        )
        .unwrap();
        let text = render(&lowered);
        assert!(text.contains("int PM_function3(int x, __global int *total)"), "{}", text);
        assert!(text.contains("(*total) += x;"), "{}", text);
        assert!(lowered.captures[0].by_pointer);
    }

    #[test]
    fn test_reduce_and_final_capture() {
        let lowered = lower(
            "Int32 r = a.par().reduce((x, y) -> new Int32(x.value + y.value * (int) scale));",
            "Int32",
            KernelLanguage::RenderScript,
        )
        .unwrap();
        let text = render(&lowered);
        assert!(text.contains("int PM_function3(int x, int y, float scale)"), "{}", text);
        assert!(text.contains("return x + (y * ((int) scale));"), "{}", text);
    }

    #[test]
    fn test_filter_returns_bool() {
        let lowered = lower(
            "Array<Int32> b = a.par().filter(x -> x.value > limit);",
            "Int32",
            KernelLanguage::OpenCl,
        )
        .unwrap();
        assert_eq!(lowered.output, KType::Scalar(ScalarType::Bool));
        assert!(render(&lowered).contains("return x > limit;"));
    }

    #[test]
    fn test_pixel_channels_and_coordinates() {
        let lowered = lower(
            "img.par().foreach(p -> { p.rgba.red = Math.sqrt(p.rgba.red) + p.x; });",
            "Int32",
            KernelLanguage::OpenCl,
        )
        .unwrap();
        assert!(lowered.takes_coordinates);
        let text = render(&lowered);
        assert!(text.contains("int PM_x, int PM_y"), "{}", text);
        assert!(text.contains("p.x = sqrt(p.x) + PM_x;"), "{}", text);
    }

    #[test]
    fn test_math_on_integers() {
        let lowered = lower(
            "a.par().foreach(x -> { x.value = Math.max(Math.abs(x.value), 4); });",
            "Int32",
            KernelLanguage::RenderScript,
        )
        .unwrap();
        assert!(render(&lowered).contains("x = max(abs(x), 4);"));
    }

    #[test]
    fn test_double_becomes_float_in_opencl() {
        let lowered = lower(
            "a.par().foreach(x -> { double d = 1.5; x.value = d * 2.0; });",
            "Float32",
            KernelLanguage::OpenCl,
        )
        .unwrap();
        assert!(render(&lowered).contains("float d = 1.5f;"));
    }

    #[test]
    fn test_reserved_identifier_is_escaped() {
        let lowered = lower(
            "a.par().foreach(x -> { int kernel = 2; x.value = kernel; });",
            "Int32",
            KernelLanguage::OpenCl,
        )
        .unwrap();
        assert!(render(&lowered).contains("int kernel_ = 2;"));
    }

    #[test]
    fn test_unsupported_statement_names_its_line() {
        let err = lower(
            "a.par().foreach(x -> {\n            x.value = 1;\n            String s = \"no\";\n        });",
            "Int32",
            KernelLanguage::RenderScript,
        )
        .unwrap_err();
        match err {
            CompileError::Structural { line, statement, .. } => {
                assert_eq!(line, 14);
                assert!(statement.contains("String s"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_value_return_in_foreach_is_rejected() {
        let err = lower(
            "a.par().foreach(x -> { return x; });",
            "Int32",
            KernelLanguage::RenderScript,
        )
        .unwrap_err();
        assert!(matches!(err, CompileError::Structural { .. }));
    }
}
