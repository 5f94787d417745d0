use crate::analyzer::symbol::{ScopeTree, SymbolId, SymbolKind};
use crate::diagnostics::{LineIndex, Span};
use crate::error::{CompileError, CompileResult};
use crate::parser::host_ast::*;
use crate::registry::LibraryRegistry;

/// Builds the persistent scope tree for one compilation unit and rejects
/// malformed library declarations on the way.
pub struct ScopeResolver<'a> {
    registry: &'a LibraryRegistry,
    source: &'a str,
    lines: &'a LineIndex,
    tree: ScopeTree,
}

impl<'a> ScopeResolver<'a> {
    pub fn new(registry: &'a LibraryRegistry, source: &'a str, lines: &'a LineIndex) -> Self {
        Self {
            registry,
            source,
            lines,
            tree: ScopeTree::new(),
        }
    }

    pub fn resolve(mut self, unit: &CompilationUnit) -> CompileResult<ScopeTree> {
        for class in &unit.types {
            self.visit_class(None, class)?;
        }
        log::debug!("resolved {} symbols", self.tree.len());
        Ok(self.tree)
    }

    fn visit_class(&mut self, parent: Option<SymbolId>, class: &ClassDecl) -> CompileResult<()> {
        let id = self.tree.add(parent, SymbolKind::Class, &class.name, class.span);
        let symbol = self.tree.get_mut(id);
        symbol.type_name = class.name.clone();
        symbol.modifiers = class.modifiers.keywords.clone();
        self.visit_members(id, &class.members)
    }

    fn visit_members(&mut self, scope: SymbolId, members: &[Member]) -> CompileResult<()> {
        for member in members {
            match member {
                Member::Field(field) => self.visit_field(scope, field)?,
                Member::Method(method) | Member::Constructor(method) => {
                    self.visit_method(scope, method)?
                }
                Member::Initializer { body, .. } => {
                    let id = self
                        .tree
                        .add(Some(scope), SymbolKind::MethodBody, "<init>", body.span);
                    self.visit_statements(id, &body.stmts)?;
                }
                Member::Class(class) => self.visit_class(Some(scope), class)?,
            }
        }
        Ok(())
    }

    fn visit_field(&mut self, scope: SymbolId, field: &FieldDecl) -> CompileResult<()> {
        let element = self.check_library_declaration(&field.ty, &field.declarators, field.span, true)?;
        for declarator in &field.declarators {
            let id = self.declare(scope, &field.modifiers, &field.ty, declarator, field.span, &element);
            if let Some(init) = &declarator.init {
                self.visit_expr(scope, init, Some(id))?;
            }
        }
        Ok(())
    }

    fn visit_method(&mut self, scope: SymbolId, method: &MethodDecl) -> CompileResult<()> {
        if let Some(ty) = &method.return_type {
            self.reject_library_type(ty, method.span, "library types cannot be returned from methods")?;
        }
        let id = self.tree.add(Some(scope), SymbolKind::Method, &method.name, method.span);
        {
            let symbol = self.tree.get_mut(id);
            symbol.type_name = method
                .return_type
                .as_ref()
                .map(|t| t.to_string())
                .unwrap_or_else(|| "void".to_string());
            symbol.modifiers = method.modifiers.keywords.clone();
        }
        for param in &method.params {
            self.reject_library_type(&param.ty, param.span, "library types cannot be passed as parameters")?;
            self.declare_param(id, param);
        }
        if let Some(body) = &method.body {
            let body_id = self
                .tree
                .add(Some(id), SymbolKind::MethodBody, "<body>", body.span);
            self.visit_statements(body_id, &body.stmts)?;
        }
        Ok(())
    }

    fn declare_param(&mut self, scope: SymbolId, param: &Param) -> SymbolId {
        let id = self
            .tree
            .add(Some(scope), SymbolKind::Variable, &param.name, param.span);
        let symbol = self.tree.get_mut(id);
        symbol.type_name = param.ty.to_string();
        symbol.type_parameter = param.ty.single_argument().map(|a| a.simple_name().to_string());
        symbol.modifiers = param.modifiers.keywords.clone();
        id
    }

    fn visit_block(&mut self, scope: SymbolId, block: &Block) -> CompileResult<()> {
        let id = self
            .tree
            .add(Some(scope), SymbolKind::MethodBody, "<block>", block.span);
        self.visit_statements(id, &block.stmts)
    }

    fn visit_statements(&mut self, scope: SymbolId, stmts: &[Stmt]) -> CompileResult<()> {
        for stmt in stmts {
            self.visit_stmt(scope, stmt)?;
        }
        Ok(())
    }

    fn visit_stmt(&mut self, scope: SymbolId, stmt: &Stmt) -> CompileResult<()> {
        match &stmt.kind {
            StmtKind::LocalVar(decl) => self.visit_local(scope, decl, stmt.span),
            StmtKind::Expr(expr) => self.visit_expr(scope, expr, None),
            StmtKind::If {
                condition,
                then_branch,
                else_branch,
            } => {
                self.visit_expr(scope, condition, None)?;
                self.visit_stmt(scope, then_branch)?;
                if let Some(else_branch) = else_branch {
                    self.visit_stmt(scope, else_branch)?;
                }
                Ok(())
            }
            StmtKind::While { condition, body } | StmtKind::DoWhile { body, condition } => {
                self.visit_expr(scope, condition, None)?;
                self.visit_stmt(scope, body)
            }
            StmtKind::For {
                init,
                condition,
                update,
                body,
            } => {
                let id = self
                    .tree
                    .add(Some(scope), SymbolKind::MethodBody, "<for>", stmt.span);
                match init {
                    Some(ForInit::Decl(decl)) => self.visit_local(id, decl, decl.span)?,
                    Some(ForInit::Exprs(exprs)) => {
                        for expr in exprs {
                            self.visit_expr(id, expr, None)?;
                        }
                    }
                    None => {}
                }
                if let Some(condition) = condition {
                    self.visit_expr(id, condition, None)?;
                }
                for expr in update {
                    self.visit_expr(id, expr, None)?;
                }
                self.visit_stmt(id, body)
            }
            StmtKind::ForEach {
                variable,
                iterable,
                body,
            } => {
                self.visit_expr(scope, iterable, None)?;
                let id = self
                    .tree
                    .add(Some(scope), SymbolKind::MethodBody, "<for>", stmt.span);
                self.visit_local(id, variable, variable.span)?;
                self.visit_stmt(id, body)
            }
            StmtKind::Return(Some(expr)) | StmtKind::Throw(expr) => {
                self.visit_expr(scope, expr, None)
            }
            StmtKind::Block(block) => self.visit_block(scope, block),
            StmtKind::Try {
                body,
                catches,
                finally,
            } => {
                self.visit_block(scope, body)?;
                for clause in catches {
                    let span = Span::new(clause.param.span.start, clause.body.span.end);
                    let id = self
                        .tree
                        .add(Some(scope), SymbolKind::MethodBody, "<catch>", span);
                    self.declare_param(id, &clause.param);
                    self.visit_statements(id, &clause.body.stmts)?;
                }
                if let Some(finally) = finally {
                    self.visit_block(scope, finally)?;
                }
                Ok(())
            }
            StmtKind::Return(None) | StmtKind::Break | StmtKind::Continue | StmtKind::Empty => {
                Ok(())
            }
        }
    }

    fn visit_local(&mut self, scope: SymbolId, decl: &LocalVarDecl, span: Span) -> CompileResult<()> {
        let element = self.check_library_declaration(&decl.ty, &decl.declarators, span, false)?;
        for declarator in &decl.declarators {
            let id = self.declare(scope, &decl.modifiers, &decl.ty, declarator, span, &element);
            if let Some(init) = &declarator.init {
                self.visit_expr(scope, init, Some(id))?;
            }
        }
        Ok(())
    }

    fn declare(
        &mut self,
        scope: SymbolId,
        modifiers: &Modifiers,
        ty: &TypeRef,
        declarator: &Declarator,
        span: Span,
        element: &Option<String>,
    ) -> SymbolId {
        let kind = if element.is_some() {
            SymbolKind::LibraryVariable
        } else {
            SymbolKind::Variable
        };
        let id = self.tree.add(Some(scope), kind, &declarator.name, span);
        let symbol = self.tree.get_mut(id);
        symbol.modifiers = modifiers.keywords.clone();
        match element {
            Some(element) => {
                symbol.type_name = ty.simple_name().to_string();
                symbol.type_parameter = Some(element.clone());
            }
            None => {
                symbol.type_name = format!("{}{}", ty, "[]".repeat(declarator.dims));
                symbol.type_parameter = ty.single_argument().map(|a| a.simple_name().to_string());
            }
        }
        id
    }

    fn visit_expr(&mut self, scope: SymbolId, expr: &Expr, owner: Option<SymbolId>) -> CompileResult<()> {
        match &expr.kind {
            ExprKind::New { ty, args, body } => {
                self.visit_creator(scope, expr, ty, args, body.as_deref(), owner)
            }
            ExprKind::Assign {
                op: None,
                target,
                value,
            } => {
                self.visit_expr(scope, target, None)?;
                let owner = target
                    .as_name()
                    .and_then(|name| self.tree.resolve(scope, name, expr.span.start));
                self.visit_expr(scope, value, owner)
            }
            ExprKind::Assign { target, value, .. } => {
                self.visit_expr(scope, target, None)?;
                self.visit_expr(scope, value, None)
            }
            ExprKind::Paren(inner) => self.visit_expr(scope, inner, owner),
            ExprKind::Cast { operand, .. } => self.visit_expr(scope, operand, None),
            ExprKind::Lambda(lambda) => self.visit_lambda(scope, expr, lambda),
            ExprKind::FieldAccess { target, .. } => self.visit_expr(scope, target, None),
            ExprKind::MethodCall { target, args, .. } => {
                if let Some(target) = target {
                    self.visit_expr(scope, target, None)?;
                }
                for arg in args {
                    self.visit_expr(scope, arg, None)?;
                }
                Ok(())
            }
            ExprKind::NewArray { dims, init, .. } => {
                for dim in dims {
                    self.visit_expr(scope, dim, None)?;
                }
                for item in init.iter().flatten() {
                    self.visit_expr(scope, item, None)?;
                }
                Ok(())
            }
            ExprKind::ArrayInit(items) => {
                for item in items {
                    self.visit_expr(scope, item, None)?;
                }
                Ok(())
            }
            ExprKind::Index { target, index } => {
                self.visit_expr(scope, target, None)?;
                self.visit_expr(scope, index, None)
            }
            ExprKind::Unary { operand, .. } => self.visit_expr(scope, operand, None),
            ExprKind::Binary { lhs, rhs, .. } => {
                self.visit_expr(scope, lhs, None)?;
                self.visit_expr(scope, rhs, None)
            }
            ExprKind::Conditional {
                condition,
                then_value,
                else_value,
            } => {
                self.visit_expr(scope, condition, None)?;
                self.visit_expr(scope, then_value, None)?;
                self.visit_expr(scope, else_value, None)
            }
            ExprKind::Literal(_)
            | ExprKind::Name(_)
            | ExprKind::This
            | ExprKind::Super
            | ExprKind::ClassLiteral(_) => Ok(()),
        }
    }

    fn visit_creator(
        &mut self,
        scope: SymbolId,
        expr: &Expr,
        ty: &TypeRef,
        args: &[Expr],
        body: Option<&[Member]>,
        owner: Option<SymbolId>,
    ) -> CompileResult<()> {
        let id = self
            .tree
            .add(Some(scope), SymbolKind::Creator, ty.simple_name(), expr.span);
        let inherited = owner.and_then(|o| self.tree.get(o).type_parameter.clone());
        let type_parameter = if ty.is_diamond() {
            inherited
        } else {
            ty.single_argument().map(|a| a.simple_name().to_string())
        };
        if let Some(class) = self.registry.class(&ty.name) {
            let element = type_parameter.clone().or_else(|| class.fixed_element().map(str::to_string));
            if let Some(element) = element {
                if !class.accepts_element(&element) {
                    return Err(CompileError::unsupported(
                        self.lines.line_of(expr.span.start),
                        format!("{}<{}>", class.name, element),
                        "element type is not registered for this library class",
                    ));
                }
            }
        }
        {
            let symbol = self.tree.get_mut(id);
            symbol.type_name = ty.name.clone();
            symbol.type_parameter = type_parameter;
            symbol.owner = owner;
        }
        for arg in args {
            let kind = match arg.unparenthesized().kind {
                ExprKind::Literal(_) | ExprKind::ClassLiteral(_) => SymbolKind::Literal,
                _ => SymbolKind::Expression,
            };
            self.tree
                .add(Some(id), kind, arg.span.slice(self.source), arg.span);
            self.visit_expr(id, arg, None)?;
        }
        if let Some(members) = body {
            self.visit_members(id, members)?;
        }
        Ok(())
    }

    fn visit_lambda(&mut self, scope: SymbolId, expr: &Expr, lambda: &Lambda) -> CompileResult<()> {
        let id = self
            .tree
            .add(Some(scope), SymbolKind::MethodBody, "<lambda>", expr.span);
        self.tree.register_lambda(expr.span.start, id);
        for param in &lambda.params {
            let param_id = self
                .tree
                .add(Some(id), SymbolKind::Variable, &param.name, param.span);
            if let Some(ty) = &param.ty {
                self.tree.get_mut(param_id).type_name = ty.to_string();
            }
        }
        match &lambda.body {
            LambdaBody::Block(block) => self.visit_statements(id, &block.stmts),
            LambdaBody::Expr(body) => self.visit_expr(id, body, None),
        }
    }

    /// Validates a declaration of a library type and returns its element type.
    /// Non-library declarations yield `None`.
    fn check_library_declaration(
        &self,
        ty: &TypeRef,
        declarators: &[Declarator],
        span: Span,
        is_field: bool,
    ) -> CompileResult<Option<String>> {
        let Some(class) = self.registry.class(&ty.name) else {
            return Ok(None);
        };
        let line = self.lines.line_of(span.start);
        let text = span.slice(self.source);
        if declarators.len() > 1 {
            return Err(CompileError::structural(
                line,
                text,
                "a single library variable per declaration",
            ));
        }
        if ty.dims > 0 || declarators.iter().any(|d| d.dims > 0) {
            return Err(CompileError::structural(
                line,
                text,
                format!("a plain `{}` variable; arrays of library types are not supported", class.name),
            ));
        }
        let element = if class.generic_arity == 0 {
            if ty.args.is_some() {
                return Err(CompileError::structural(
                    line,
                    text,
                    format!("`{}` without type arguments", class.name),
                ));
            }
            class.fixed_element().unwrap_or_default().to_string()
        } else {
            match &ty.args {
                Some(args) if args.len() == class.generic_arity => {
                    let arg = &args[0];
                    if arg.dims > 0 || arg.args.is_some() {
                        return Err(CompileError::unsupported(
                            line,
                            arg.to_string(),
                            "element types must be plain library data types",
                        ));
                    }
                    arg.simple_name().to_string()
                }
                _ => {
                    return Err(CompileError::structural(
                        line,
                        text,
                        format!("`{}<ElementType>` with an explicit element type", class.name),
                    ))
                }
            }
        };
        if !class.accepts_element(&element) {
            return Err(CompileError::unsupported(
                line,
                format!("{}<{}>", class.name, element),
                "element type is not registered for this library class",
            ));
        }
        if is_field && declarators.iter().any(|d| d.init.is_some()) {
            return Err(CompileError::structural(
                line,
                text,
                "a library field without initializer, bound inside a method",
            ));
        }
        Ok(Some(element))
    }

    fn reject_library_type(&self, ty: &TypeRef, span: Span, expected: &str) -> CompileResult<()> {
        if self.registry.is_library_type(&ty.name) {
            return Err(CompileError::structural(
                self.lines.line_of(span.start),
                span.slice(self.source),
                expected,
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_source;

    fn resolve(source: &str) -> CompileResult<ScopeTree> {
        let unit = parse_source(source).expect("fixture should parse");
        let registry = LibraryRegistry::new();
        let lines = LineIndex::new(source);
        ScopeResolver::new(&registry, source, &lines).resolve(&unit)
    }

    fn body(stmts: &str) -> String {
        format!("class A {{\n  void run(int[] data) {{\n{}\n  }}\n}}\n", stmts)
    }

    #[test]
    fn test_library_variable_and_creator_owner() {
        let source = body("    Array<Int32> a = new Array<>(data, Int32.class);");
        let tree = resolve(&source).unwrap();
        let var = tree
            .iter()
            .find(|s| s.kind == SymbolKind::LibraryVariable)
            .unwrap();
        assert_eq!(var.name, "a");
        assert_eq!(var.type_parameter.as_deref(), Some("Int32"));
        let creator = tree.creators_of(var.id).next().unwrap();
        assert_eq!(creator.type_parameter.as_deref(), Some("Int32"));
        let args: Vec<_> = creator.children.iter().map(|&c| tree.get(c).kind).collect();
        assert_eq!(args, vec![SymbolKind::Expression, SymbolKind::Literal]);
    }

    #[test]
    fn test_assignment_creator_links_existing_variable() {
        let source = body("    Array<Int32> a;\n    a = new Array<Int32>(data, Int32.class);\n    foo(new Array<Int32>(data, Int32.class));");
        let tree = resolve(&source).unwrap();
        let var = tree.iter().find(|s| s.name == "a").unwrap().id;
        assert_eq!(tree.creators_of(var).count(), 1);
        let anonymous = tree
            .iter()
            .filter(|s| s.kind == SymbolKind::Creator && s.owner.is_none())
            .count();
        assert_eq!(anonymous, 1);
    }

    #[test]
    fn test_malformed_library_declarations() {
        for stmts in [
            "    Array<Int32> a, b;",
            "    Array a;",
            "    Array<> a;",
            "    Array<Int32>[] a;",
        ] {
            let err = resolve(&body(stmts)).unwrap_err();
            assert!(matches!(err, CompileError::Structural { line: 3, .. }), "{}: {:?}", stmts, err);
        }
    }

    #[test]
    fn test_library_params_returns_and_field_initializers() {
        let err = resolve("class A { void f(Array<Int32> a) {} }").unwrap_err();
        assert!(matches!(err, CompileError::Structural { .. }));
        let err = resolve("class A { Array<Int32> f() { return null; } }").unwrap_err();
        assert!(matches!(err, CompileError::Structural { .. }));
        let err = resolve("class A { Array<Int32> a = new Array<Int32>(d, Int32.class); }").unwrap_err();
        assert!(matches!(err, CompileError::Structural { .. }));
    }

    #[test]
    fn test_unregistered_element_type() {
        let err = resolve(&body("    Array<Double> a;")).unwrap_err();
        assert!(matches!(err, CompileError::UnsupportedType { .. }));
    }

    #[test]
    fn test_lambda_scope_is_registered() {
        let source = body("    int t = 3;\n    Runnable r = () -> { int u = t; };");
        let tree = resolve(&source).unwrap();
        let start = source.find("()").unwrap();
        let lambda = tree.lambda_scope(start).unwrap();
        let u = tree.iter().find(|s| s.name == "u").unwrap();
        let t = tree.iter().find(|s| s.name == "t").unwrap();
        assert!(tree.is_within(u.id, lambda));
        assert!(!tree.is_within(t.id, lambda));
        let use_site = source.find("= t;").unwrap() + 2;
        assert_eq!(tree.resolve_at("t", use_site), Some(t.id));
    }
}
