use crate::codegen::kernel_ast::*;

/// Target-specific spelling of the C-like kernel languages.
pub trait KernelDialect {
    fn scalar_name(&self, scalar: ScalarType) -> &'static str;

    fn allocation_name(&self) -> &'static str;

    fn address_space(&self, space: AddressSpace) -> &'static str;

    /// Everything before the function name, e.g. `__kernel void`.
    fn function_prefix(&self, function: &KFunction, return_type: &str) -> String;

    /// Text between the parameter list and the body, if any.
    fn function_suffix(&self, _function: &KFunction) -> &'static str {
        ""
    }

    fn vector_literal(&self, ty: &str, items: &[String]) -> String;

    fn type_name(&self, ty: &KType) -> String {
        match ty {
            KType::Void => "void".to_string(),
            KType::Scalar(s) => self.scalar_name(*s).to_string(),
            KType::Vector(s, n) => format!("{}{}", self.scalar_name(*s), n),
            KType::Allocation => self.allocation_name().to_string(),
            KType::Pointer { space, pointee } => {
                let space = self.address_space(*space);
                if space.is_empty() {
                    format!("{} *", self.type_name(pointee))
                } else {
                    format!("{} {} *", space, self.type_name(pointee))
                }
            }
        }
    }
}

/// Renders a [`KernelModule`] as source text for one dialect.
pub struct KernelRenderer<'d, D: KernelDialect + ?Sized> {
    dialect: &'d D,
    out: String,
    indent: usize,
}

impl<'d, D: KernelDialect + ?Sized> KernelRenderer<'d, D> {
    pub fn new(dialect: &'d D) -> Self {
        Self {
            dialect,
            out: String::new(),
            indent: 0,
        }
    }

    pub fn render(mut self, module: &KernelModule) -> String {
        let mut previous: Option<&KItem> = None;
        for item in &module.items {
            let is_function = matches!(item, KItem::Function(_));
            let ends_directives = previous.map_or(false, is_directive) && !is_directive(item);
            if is_function || ends_directives || matches!(previous, Some(KItem::Function(_))) {
                self.out.push('\n');
            }
            self.render_item(item);
            previous = Some(item);
        }
        self.out
    }

    fn line(&mut self, text: &str) {
        for _ in 0..self.indent {
            self.out.push_str("    ");
        }
        self.out.push_str(text);
        self.out.push('\n');
    }

    fn render_item(&mut self, item: &KItem) {
        match item {
            KItem::Pragma(text) => self.line(&format!("#pragma {}", text)),
            KItem::Include(path) => self.line(&format!("#include \"{}\"", path)),
            KItem::Comment(text) => self.line(&format!("// {}", text)),
            KItem::Global { ty, name, volatile } => {
                let qualifier = if *volatile { "volatile " } else { "" };
                let decl = format!("{}{} {};", qualifier, self.dialect.type_name(ty), name);
                self.line(&decl)
            }
            KItem::Function(function) => self.render_function(function),
        }
    }

    fn render_function(&mut self, function: &KFunction) {
        let return_type = self.dialect.type_name(&function.return_type);
        let params = function
            .params
            .iter()
            .map(|p| self.declaration(&p.ty, &p.name))
            .collect::<Vec<_>>()
            .join(", ");
        let header = format!(
            "{} {}({}){} {{",
            self.dialect.function_prefix(function, &return_type),
            function.name,
            if params.is_empty() { "void".to_string() } else { params },
            self.dialect.function_suffix(function)
        );
        self.line(&header);
        self.indent += 1;
        for stmt in &function.body {
            self.render_stmt(stmt);
        }
        self.indent -= 1;
        self.line("}");
    }

    fn declaration(&self, ty: &KType, name: &str) -> String {
        let ty = self.dialect.type_name(ty);
        if ty.ends_with('*') {
            format!("{}{}", ty, name)
        } else {
            format!("{} {}", ty, name)
        }
    }

    fn render_block(&mut self, header: &str, body: &[KStmt], footer: &str) {
        if header.is_empty() {
            self.line("{");
        } else {
            self.line(&format!("{} {{", header));
        }
        self.indent += 1;
        for stmt in body {
            self.render_stmt(stmt);
        }
        self.indent -= 1;
        self.line(&format!("}}{}", footer));
    }

    fn render_stmt(&mut self, stmt: &KStmt) {
        match stmt {
            KStmt::Decl { ty, name, init } => {
                let decl = self.declaration(ty, name);
                match init {
                    Some(init) => {
                        let text = format!("{} = {};", decl, self.bare(init));
                        self.line(&text)
                    }
                    None => self.line(&format!("{};", decl)),
                }
            }
            KStmt::Expr(expr) => {
                let text = format!("{};", self.statement_expr(expr));
                self.line(&text)
            }
            KStmt::If {
                condition,
                then_body,
                else_body,
            } => {
                let header = format!("if ({})", self.bare(condition));
                match else_body {
                    None => self.render_block(&header, then_body, ""),
                    Some(else_body) => {
                        self.line(&format!("{} {{", header));
                        self.indent += 1;
                        for stmt in then_body {
                            self.render_stmt(stmt);
                        }
                        self.indent -= 1;
                        self.render_block("} else", else_body, "");
                    }
                }
            }
            KStmt::For {
                init,
                condition,
                update,
                body,
            } => {
                let init = match init.as_deref() {
                    Some(KStmt::Decl { ty, name, init }) => {
                        let decl = self.declaration(ty, name);
                        match init {
                            Some(value) => format!("{} = {}", decl, self.bare(value)),
                            None => decl,
                        }
                    }
                    Some(KStmt::Expr(expr)) => self.statement_expr(expr),
                    _ => String::new(),
                };
                let condition = condition
                    .as_ref()
                    .map(|c| self.bare(c))
                    .unwrap_or_default();
                let update = update
                    .iter()
                    .map(|u| self.statement_expr(u))
                    .collect::<Vec<_>>()
                    .join(", ");
                let header = format!("for ({}; {}; {})", init, condition, update);
                self.render_block(&header, body, "");
            }
            KStmt::While { condition, body } => {
                let header = format!("while ({})", self.bare(condition));
                self.render_block(&header, body, "");
            }
            KStmt::DoWhile { body, condition } => {
                let footer = format!(" while ({});", self.bare(condition));
                self.render_block("do", body, &footer);
            }
            KStmt::Return(None) => self.line("return;"),
            KStmt::Return(Some(value)) => {
                let text = format!("return {};", self.bare(value));
                self.line(&text)
            }
            KStmt::Break => self.line("break;"),
            KStmt::Continue => self.line("continue;"),
            KStmt::Block(body) => self.render_block("", body, ""),
        }
    }

    /// Assignments and increments at statement level need no parentheses.
    fn statement_expr(&self, expr: &KExpr) -> String {
        match expr {
            KExpr::Assign { op, target, value } => format!(
                "{} {}= {}",
                self.expr(target),
                op.as_deref().unwrap_or(""),
                self.bare(value)
            ),
            _ => self.bare(expr),
        }
    }

    /// Drops the outermost parentheses of a binary expression.
    fn bare(&self, expr: &KExpr) -> String {
        match expr {
            KExpr::Binary { op, lhs, rhs } => {
                format!("{} {} {}", self.expr(lhs), op, self.expr(rhs))
            }
            _ => self.expr(expr),
        }
    }

    pub fn expr(&self, expr: &KExpr) -> String {
        match expr {
            KExpr::Ident(name) => name.clone(),
            KExpr::Int(value) => value.to_string(),
            KExpr::Float(value) => float_literal(*value),
            KExpr::Bool(value) => (if *value { "true" } else { "false" }).to_string(),
            KExpr::Unary {
                op,
                operand,
                postfix,
            } => {
                if *postfix {
                    format!("{}{}", self.expr(operand), op)
                } else {
                    format!("{}{}", op, self.expr(operand))
                }
            }
            KExpr::Binary { op, lhs, rhs } => {
                format!("({} {} {})", self.expr(lhs), op, self.expr(rhs))
            }
            KExpr::Assign { .. } => format!("({})", self.statement_expr(expr)),
            KExpr::Ternary {
                condition,
                then_value,
                else_value,
            } => format!(
                "({} ? {} : {})",
                self.bare(condition),
                self.expr(then_value),
                self.expr(else_value)
            ),
            KExpr::Call { name, args } => format!(
                "{}({})",
                name,
                args.iter()
                    .map(|a| self.bare(a))
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
            KExpr::Index { target, index } => {
                format!("{}[{}]", self.expr(target), self.bare(index))
            }
            KExpr::Member { target, field } => format!("{}.{}", self.expr(target), field),
            KExpr::Cast { ty, operand } => {
                format!("(({}) {})", self.dialect.type_name(ty), self.expr(operand))
            }
            KExpr::Deref(operand) => format!("(*{})", self.expr(operand)),
            KExpr::AddressOf(operand) => match operand.as_ref() {
                KExpr::Ident(name) => format!("&{}", name),
                other => format!("(&{})", self.expr(other)),
            },
            KExpr::Vector { ty, items } => {
                let items: Vec<_> = items.iter().map(|i| self.bare(i)).collect();
                self.dialect
                    .vector_literal(&self.dialect.type_name(ty), &items)
            }
        }
    }
}

fn is_directive(item: &KItem) -> bool {
    matches!(item, KItem::Pragma(_) | KItem::Include(_))
}

fn float_literal(value: f64) -> String {
    let text = format!("{}", value);
    if text.contains('.') || text.contains('e') || text.contains("inf") || text.contains("NaN") {
        format!("{}f", text)
    } else {
        format!("{}.0f", text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Plain;

    impl KernelDialect for Plain {
        fn scalar_name(&self, scalar: ScalarType) -> &'static str {
            match scalar {
                ScalarType::Float => "float",
                _ => "int",
            }
        }

        fn allocation_name(&self) -> &'static str {
            "handle"
        }

        fn address_space(&self, space: AddressSpace) -> &'static str {
            match space {
                AddressSpace::Global => "__global",
                _ => "",
            }
        }

        fn function_prefix(&self, _function: &KFunction, return_type: &str) -> String {
            return_type.to_string()
        }

        fn vector_literal(&self, ty: &str, items: &[String]) -> String {
            format!("({})({})", ty, items.join(", "))
        }
    }

    #[test]
    fn test_render_function_with_loop() {
        let function = KFunction {
            kind: FunctionKind::Helper,
            name: "sum".to_string(),
            return_type: KType::int(),
            params: vec![
                KParam::new(KType::global_ptr(KType::int()), "data"),
                KParam::new(KType::int(), "n"),
            ],
            body: vec![
                KStmt::decl(KType::int(), "acc", KExpr::Int(0)),
                KStmt::counted_for(
                    "i",
                    KExpr::Int(0),
                    KExpr::ident("n"),
                    vec![KStmt::expr(KExpr::compound(
                        KExpr::ident("acc"),
                        "+",
                        KExpr::index(KExpr::ident("data"), KExpr::ident("i")),
                    ))],
                ),
                KStmt::Return(Some(KExpr::ident("acc"))),
            ],
        };
        let mut module = KernelModule::new();
        module.function(function);
        let text = KernelRenderer::new(&Plain).render(&module);
        let expected = "\nint sum(__global int *data, int n) {\n    int acc = 0;\n    for (int i = 0; i < n; i++) {\n        acc += data[i];\n    }\n    return acc;\n}\n";
        pretty_assertions::assert_eq!(text, expected);
    }

    #[test]
    fn test_directives_are_set_apart_from_globals() {
        let mut module = KernelModule::new();
        module.push(KItem::Pragma("version(1)".to_string()));
        module.push(KItem::Pragma("rs_fp_relaxed".to_string()));
        module.push(KItem::Global {
            ty: KType::int(),
            name: "count".to_string(),
            volatile: false,
        });
        module.push(KItem::Global {
            ty: KType::int(),
            name: "total".to_string(),
            volatile: true,
        });
        let text = KernelRenderer::new(&Plain).render(&module);
        let expected = "#pragma version(1)\n#pragma rs_fp_relaxed\n\nint count;\nvolatile int total;\n";
        pretty_assertions::assert_eq!(text, expected);
    }

    #[test]
    fn test_nested_binary_is_parenthesized() {
        let renderer = KernelRenderer::new(&Plain);
        let expr = KExpr::binary(
            KExpr::binary(KExpr::ident("a"), "+", KExpr::ident("b")),
            "*",
            KExpr::Float(2.0),
        );
        assert_eq!(renderer.expr(&expr), "((a + b) * 2.0f)");
        let cast = KExpr::cast(KType::Scalar(ScalarType::Float), KExpr::ident("x"));
        assert_eq!(renderer.expr(&cast), "((float) x)");
    }
}
