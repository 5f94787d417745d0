use std::collections::HashSet;

use crate::analyzer::symbol::{ScopeTree, SymbolId, SymbolKind};
use crate::analyzer::SequenceCounter;
use crate::diagnostics::{LineIndex, Span};
use crate::error::{CompileError, CompileResult};
use crate::ir::*;
use crate::parser::host_ast::*;
use crate::registry::{LibraryRegistry, OperationKind};

/// `<var>.par().<method>(<args>)`
struct ParCall<'e> {
    source: LibraryVariable,
    method: &'e str,
    args: &'e [Expr],
}

/// Recognizes DSL usages in a resolved compilation unit and turns them into IR.
pub struct PatternDetector<'a> {
    registry: &'a LibraryRegistry,
    tree: &'a ScopeTree,
    source: &'a str,
    lines: &'a LineIndex,
    counter: &'a mut SequenceCounter,
    ir: FileIr,
    class_stack: Vec<String>,
    /// Offsets of the closing `}` of the blocks being visited.
    block_ends: Vec<usize>,
}

impl<'a> PatternDetector<'a> {
    pub fn new(
        registry: &'a LibraryRegistry,
        tree: &'a ScopeTree,
        source: &'a str,
        lines: &'a LineIndex,
        counter: &'a mut SequenceCounter,
    ) -> Self {
        Self {
            registry,
            tree,
            source,
            lines,
            counter,
            ir: FileIr::default(),
            class_stack: Vec::new(),
            block_ends: Vec::new(),
        }
    }

    pub fn detect(mut self, unit: &CompilationUnit, class_name: &str) -> CompileResult<FileIr> {
        self.ir.package = unit.package.as_ref().map(|p| p.name.clone());
        self.ir.package_end = unit.package.as_ref().map(|p| p.span.end);
        self.ir.first_import = unit.imports.first().map(|i| i.span.start);
        self.ir.class_name = if class_name.is_empty() {
            unit.types.first().map(|c| c.name.clone()).unwrap_or_default()
        } else {
            class_name.to_string()
        };
        for import in &unit.imports {
            if self.registry.is_removable_import(&import.path) {
                log::debug!("dropping import {}", import.path);
                self.ir.removed_imports.push(import.span);
            }
        }
        for class in &unit.types {
            self.visit_class(class, true)?;
        }
        self.ir.nodes.sort_by_key(|node| node.id());
        log::debug!(
            "detected {} nodes and {} library declarations",
            self.ir.nodes.len(),
            self.ir.declarations.len()
        );
        Ok(self.ir)
    }

    fn visit_class(&mut self, class: &ClassDecl, is_top_level: bool) -> CompileResult<()> {
        let binary_name = match self.class_stack.last() {
            Some(outer) => format!("{}${}", outer, class.name),
            None => class.name.clone(),
        };
        self.ir.classes.push(ClassBody {
            binary_name: binary_name.clone(),
            simple_name: class.name.clone(),
            insert_at: class.body_span.start + 1,
            is_top_level,
            is_static: is_top_level || class.modifiers.is_static(),
        });
        self.class_stack.push(binary_name);
        self.visit_members(&class.members)?;
        self.class_stack.pop();
        Ok(())
    }

    fn visit_members(&mut self, members: &[Member]) -> CompileResult<()> {
        for member in members {
            match member {
                Member::Field(field) => self.visit_field(field)?,
                Member::Method(method) | Member::Constructor(method) => {
                    if let Some(body) = &method.body {
                        self.visit_block(body)?;
                    }
                }
                Member::Initializer { body, .. } => self.visit_block(body)?,
                Member::Class(class) => self.visit_class(class, false)?,
            }
        }
        Ok(())
    }

    fn visit_field(&mut self, field: &FieldDecl) -> CompileResult<()> {
        if self.registry.is_library_type(&field.ty.name) {
            for declarator in &field.declarators {
                let variable = self.declared_library_variable(&declarator.name, field.span)?;
                self.ir.declarations.push(LibraryDeclaration {
                    variable,
                    is_field: true,
                    modifiers: field.modifiers.keywords.clone(),
                    span: Span::new(field.ty.span.start, field.span.end),
                    line: self.line(field.span),
                    class_name: self.current_class(),
                });
            }
            return Ok(());
        }
        for declarator in &field.declarators {
            if let Some(init) = &declarator.init {
                self.scan_expr(field.span, init)?;
            }
        }
        Ok(())
    }

    fn visit_block(&mut self, block: &Block) -> CompileResult<()> {
        self.block_ends.push(block.span.end.saturating_sub(1));
        for stmt in &block.stmts {
            self.visit_stmt(stmt, true)?;
        }
        self.block_ends.pop();
        Ok(())
    }

    fn visit_stmt(&mut self, stmt: &Stmt, in_block: bool) -> CompileResult<()> {
        match &stmt.kind {
            StmtKind::LocalVar(decl) => self.visit_local(stmt, decl, in_block),
            StmtKind::Expr(expr) => self.visit_expression_statement(stmt, expr, in_block),
            StmtKind::If {
                condition,
                then_branch,
                else_branch,
            } => {
                self.scan_expr(stmt.span, condition)?;
                self.visit_stmt(then_branch, false)?;
                if let Some(else_branch) = else_branch {
                    self.visit_stmt(else_branch, false)?;
                }
                Ok(())
            }
            StmtKind::While { condition, body } | StmtKind::DoWhile { body, condition } => {
                self.scan_expr(stmt.span, condition)?;
                self.visit_stmt(body, false)
            }
            StmtKind::For {
                init,
                condition,
                update,
                body,
            } => {
                match init {
                    Some(ForInit::Decl(decl)) => {
                        if self.registry.is_library_type(&decl.ty.name) {
                            return Err(self.structural(
                                stmt.span,
                                "library variables declared outside loop headers",
                            ));
                        }
                        for declarator in &decl.declarators {
                            if let Some(init) = &declarator.init {
                                self.scan_expr(stmt.span, init)?;
                            }
                        }
                    }
                    Some(ForInit::Exprs(exprs)) => {
                        for expr in exprs {
                            self.scan_expr(stmt.span, expr)?;
                        }
                    }
                    None => {}
                }
                if let Some(condition) = condition {
                    self.scan_expr(stmt.span, condition)?;
                }
                for expr in update {
                    self.scan_expr(stmt.span, expr)?;
                }
                self.visit_stmt(body, false)
            }
            StmtKind::ForEach { iterable, body, .. } => {
                self.scan_expr(stmt.span, iterable)?;
                self.visit_stmt(body, false)
            }
            StmtKind::Return(Some(expr)) | StmtKind::Throw(expr) => self.scan_expr(stmt.span, expr),
            StmtKind::Block(block) => self.visit_block(block),
            StmtKind::Try {
                body,
                catches,
                finally,
            } => {
                self.visit_block(body)?;
                for clause in catches {
                    self.visit_block(&clause.body)?;
                }
                if let Some(finally) = finally {
                    self.visit_block(finally)?;
                }
                Ok(())
            }
            StmtKind::Return(None) | StmtKind::Break | StmtKind::Continue | StmtKind::Empty => {
                Ok(())
            }
        }
    }

    fn visit_local(&mut self, stmt: &Stmt, decl: &LocalVarDecl, in_block: bool) -> CompileResult<()> {
        let position = self.position(stmt.span, in_block);
        if self.registry.is_library_type(&decl.ty.name) {
            let Some(declarator) = decl.declarators.first() else {
                return Ok(());
            };
            let target = self.declared_library_variable(&declarator.name, stmt.span)?;
            let Some(init) = &declarator.init else {
                self.ir.declarations.push(LibraryDeclaration {
                    variable: target,
                    is_field: false,
                    modifiers: decl.modifiers.keywords.clone(),
                    span: Span::new(decl.ty.span.start, stmt.span.end),
                    line: position.line,
                    class_name: position.class_name,
                });
                return Ok(());
            };
            let init = init.unparenthesized();
            if let ExprKind::New {
                ty,
                args,
                body: None,
            } = &init.kind
            {
                return self.push_input_bind(stmt, target, ty, args, true, position);
            }
            if let Some(call) = self.match_par_call(init) {
                let destination = target.variable.symbol_id;
                return self.push_operation(stmt, call, Some((destination, true)), position);
            }
            return Err(self.structural(
                stmt.span,
                "`new <LibraryClass>(...)` or `<var>.par().<operation>(...)` as initializer",
            ));
        }

        if let [declarator] = decl.declarators.as_slice() {
            if let Some(init) = &declarator.init {
                if let Some((source, cast)) = self.match_output_bind(init) {
                    let destination = self.declared_variable(&declarator.name, stmt.span)?;
                    return self.push_output_bind(
                        source,
                        destination,
                        BindShape::DeclarativeAssignment,
                        cast,
                        position,
                    );
                }
                if let Some(call) = self.match_par_call(init.unparenthesized()) {
                    let destination = self.declared_symbol(&declarator.name, stmt.span)?;
                    return self.push_operation(stmt, call, Some((destination, true)), position);
                }
            }
        }
        for declarator in &decl.declarators {
            if let Some(init) = &declarator.init {
                self.scan_expr(stmt.span, init)?;
            }
        }
        Ok(())
    }

    fn visit_expression_statement(&mut self, stmt: &Stmt, expr: &Expr, in_block: bool) -> CompileResult<()> {
        let position = self.position(stmt.span, in_block);
        let expr = expr.unparenthesized();
        match &expr.kind {
            ExprKind::Assign {
                op: None,
                target,
                value,
            } => {
                if let Some(name) = target.as_name() {
                    let value = value.unparenthesized();
                    if let ExprKind::New {
                        ty,
                        args,
                        body: None,
                    } = &value.kind
                    {
                        if self.registry.is_library_type(&ty.name) {
                            let Some(target) = self.library_variable(name, target.span.start) else {
                                return Err(self.structural(
                                    stmt.span,
                                    "a library creator assigned to a library variable",
                                ));
                            };
                            return self.push_input_bind(stmt, target, ty, args, false, position);
                        }
                    }
                    if let Some(call) = self.match_par_call(value) {
                        let Some(destination) = self.tree.resolve_at(name, target.span.start) else {
                            return Err(self.structural(stmt.span, "a declared destination variable"));
                        };
                        return self.push_operation(stmt, call, Some((destination, false)), position);
                    }
                    if let Some((source, cast)) = self.match_output_bind(value) {
                        let Some(destination) = self.resolve_variable(name, target.span.start) else {
                            return Err(self.structural(stmt.span, "a declared destination variable"));
                        };
                        return self.push_output_bind(source, destination, BindShape::Assignment, cast, position);
                    }
                }
                self.scan_expr(stmt.span, expr)
            }
            ExprKind::MethodCall {
                target: Some(target),
                name,
                args,
            } => {
                if let Some(call) = self.match_par_call(expr) {
                    return self.push_operation(stmt, call, None, position);
                }
                if let Some(source) = target
                    .as_name()
                    .and_then(|n| self.library_variable(n, target.span.start))
                {
                    if name == source.class.output_bind {
                        if let [argument] = args.as_slice() {
                            if let Some(destination) = argument
                                .as_name()
                                .and_then(|n| self.resolve_variable(n, argument.span.start))
                            {
                                return self.push_output_bind(source, destination, BindShape::None, None, position);
                            }
                        }
                    }
                }
                self.scan_expr(stmt.span, expr)
            }
            _ => self.scan_expr(stmt.span, expr),
        }
    }

    /// Looks for library references outside the recognized statement shapes.
    /// Valid non-DSL methods become `MethodCall` nodes, anything else is rejected.
    fn scan_expr(&mut self, stmt_span: Span, expr: &Expr) -> CompileResult<()> {
        match &expr.kind {
            ExprKind::MethodCall { target, name, args } => {
                if let Some(target) = target {
                    let variable = target
                        .as_name()
                        .and_then(|n| self.library_variable(n, target.span.start));
                    if let Some(variable) = variable {
                        let method = variable.class.method(name).copied();
                        match method {
                            Some(method) if args.is_empty() => {
                                let id = self.counter.next_id();
                                let mut position = self.position(expr.span, true);
                                position.line = self.line(stmt_span);
                                log::debug!("method call {}.{}() -> #{}", variable.variable.name, name, id);
                                self.ir.nodes.push(IrNode::MethodCall(MethodCall {
                                    id,
                                    variable,
                                    method: name.clone(),
                                    return_type: method.return_type.to_string(),
                                    position,
                                }));
                                return Ok(());
                            }
                            _ => {
                                let expected = self.expected_shapes(&variable);
                                return Err(self.structural(stmt_span, &expected));
                            }
                        }
                    }
                    self.scan_expr(stmt_span, target)?;
                }
                for arg in args {
                    self.scan_expr(stmt_span, arg)?;
                }
                Ok(())
            }
            ExprKind::Name(name) => {
                if let Some(variable) = self.library_variable(name, expr.span.start) {
                    let expected = self.expected_shapes(&variable);
                    return Err(self.structural(stmt_span, &expected));
                }
                Ok(())
            }
            ExprKind::New { ty, args, body } => {
                if self.registry.is_library_type(&ty.name) {
                    return Err(self.structural(
                        stmt_span,
                        "a library creator assigned directly to a library variable",
                    ));
                }
                for arg in args {
                    self.scan_expr(stmt_span, arg)?;
                }
                if let Some(members) = body {
                    self.visit_members(members)?;
                }
                Ok(())
            }
            ExprKind::Lambda(lambda) => match &lambda.body {
                LambdaBody::Block(block) => self.visit_block(block),
                LambdaBody::Expr(body) => self.scan_expr(stmt_span, body),
            },
            ExprKind::FieldAccess { target, .. } => self.scan_expr(stmt_span, target),
            ExprKind::NewArray { dims, init, .. } => {
                for item in dims.iter().chain(init.iter().flatten()) {
                    self.scan_expr(stmt_span, item)?;
                }
                Ok(())
            }
            ExprKind::ArrayInit(items) => {
                for item in items {
                    self.scan_expr(stmt_span, item)?;
                }
                Ok(())
            }
            ExprKind::Index { target, index } => {
                self.scan_expr(stmt_span, target)?;
                self.scan_expr(stmt_span, index)
            }
            ExprKind::Unary { operand, .. } | ExprKind::Cast { operand, .. } => {
                self.scan_expr(stmt_span, operand)
            }
            ExprKind::Binary { lhs, rhs, .. } => {
                self.scan_expr(stmt_span, lhs)?;
                self.scan_expr(stmt_span, rhs)
            }
            ExprKind::Assign { target, value, .. } => {
                self.scan_expr(stmt_span, target)?;
                self.scan_expr(stmt_span, value)
            }
            ExprKind::Conditional {
                condition,
                then_value,
                else_value,
            } => {
                self.scan_expr(stmt_span, condition)?;
                self.scan_expr(stmt_span, then_value)?;
                self.scan_expr(stmt_span, else_value)
            }
            ExprKind::Paren(inner) => self.scan_expr(stmt_span, inner),
            ExprKind::Literal(_) | ExprKind::This | ExprKind::Super | ExprKind::ClassLiteral(_) => {
                Ok(())
            }
        }
    }

    fn match_par_call<'e>(&self, expr: &'e Expr) -> Option<ParCall<'e>> {
        let ExprKind::MethodCall {
            target: Some(par),
            name,
            args,
        } = &expr.kind
        else {
            return None;
        };
        let ExprKind::MethodCall {
            target: Some(receiver),
            name: par_name,
            args: par_args,
        } = &par.unparenthesized().kind
        else {
            return None;
        };
        if par_name != "par" || !par_args.is_empty() {
            return None;
        }
        let source = receiver
            .as_name()
            .and_then(|n| self.library_variable(n, receiver.span.start))?;
        Some(ParCall {
            source,
            method: name,
            args,
        })
    }

    /// `var.<outputBind>()`, possibly under a cast.
    fn match_output_bind(&self, expr: &Expr) -> Option<(LibraryVariable, Option<String>)> {
        let expr = expr.unparenthesized();
        if let ExprKind::Cast { ty, operand } = &expr.kind {
            let (source, _) = self.match_output_bind(operand)?;
            return Some((source, Some(ty.to_string())));
        }
        let ExprKind::MethodCall {
            target: Some(target),
            name,
            args,
        } = &expr.kind
        else {
            return None;
        };
        let source = target
            .as_name()
            .and_then(|n| self.library_variable(n, target.span.start))?;
        if *name == source.class.output_bind && args.is_empty() {
            Some((source, None))
        } else {
            None
        }
    }

    fn push_input_bind(
        &mut self,
        stmt: &Stmt,
        target: LibraryVariable,
        ty: &TypeRef,
        args: &[Expr],
        declares_target: bool,
        position: Position,
    ) -> CompileResult<()> {
        let Some(class) = self.registry.class(&ty.name) else {
            return Err(self.structural(stmt.span, "a library creator"));
        };
        if class.name != target.class.name {
            return Err(self.structural(
                stmt.span,
                &format!("`new {}(...)` matching the declared type", target.class.name),
            ));
        }
        if args.len() != class.constructor.len() {
            return Err(self.structural(
                stmt.span,
                &format!("`new {}({})`", class.name, class.constructor.join(", ")),
            ));
        }
        if let Some(arg) = ty.single_argument() {
            if arg.simple_name() != target.element {
                return Err(self.structural(
                    stmt.span,
                    &format!("a creator for `{}<{}>`", class.name, target.element),
                ));
            }
        }
        for arg in args {
            if let ExprKind::ClassLiteral(literal) = &arg.unparenthesized().kind {
                if literal.simple_name() != target.element {
                    return Err(self.structural(
                        stmt.span,
                        &format!("the element class literal `{}.class`", target.element),
                    ));
                }
            }
        }
        let arguments = args.iter().map(|arg| self.bind_argument(arg)).collect();
        let id = self.counter.next_id();
        log::debug!("input bind {} -> #{}", target.variable.name, id);
        self.ir.nodes.push(IrNode::InputBind(InputBind {
            id,
            target,
            arguments,
            declares_target,
            position,
        }));
        Ok(())
    }

    fn bind_argument(&self, arg: &Expr) -> BindArgument {
        let text = arg.span.slice(self.source).to_string();
        let inner = arg.unparenthesized();
        match &inner.kind {
            ExprKind::Literal(literal) => BindArgument {
                kind: ArgumentKind::Literal,
                text,
                type_name: Some(literal.type_name().to_string()),
            },
            ExprKind::ClassLiteral(_) => BindArgument {
                kind: ArgumentKind::ClassLiteral,
                text,
                type_name: Some("Class".to_string()),
            },
            ExprKind::Name(name) => match self.resolve_variable(name, inner.span.start) {
                Some(variable) => BindArgument {
                    kind: ArgumentKind::Variable,
                    text,
                    type_name: Some(variable.type_name),
                },
                None => BindArgument {
                    kind: ArgumentKind::Expression,
                    text,
                    type_name: None,
                },
            },
            _ => BindArgument {
                kind: ArgumentKind::Expression,
                text,
                type_name: None,
            },
        }
    }

    fn push_output_bind(
        &mut self,
        source: LibraryVariable,
        destination: Variable,
        shape: BindShape,
        cast: Option<String>,
        position: Position,
    ) -> CompileResult<()> {
        let id = self.counter.next_id();
        log::debug!(
            "output bind {} -> {} ({:?}) -> #{}",
            source.variable.name,
            destination.name,
            shape,
            id
        );
        self.ir.nodes.push(IrNode::OutputBind(OutputBind {
            id,
            source,
            destination,
            shape,
            cast,
            position,
        }));
        Ok(())
    }

    fn push_operation(
        &mut self,
        stmt: &Stmt,
        call: ParCall<'_>,
        destination: Option<(SymbolId, bool)>,
        position: Position,
    ) -> CompileResult<()> {
        let source = call.source;
        let Some(shape) = source.class.operation(call.method) else {
            let known: Vec<_> = source.class.operations.iter().map(|op| op.method).collect();
            return Err(self.structural(
                stmt.span,
                &format!("`{}.par().<op>(...)` with <op> one of {}", source.variable.name, known.join(", ")),
            ));
        };

        let (class_literal, lambda_expr) = match call.args {
            [lambda] => (None, lambda),
            [first, lambda] if shape.accepts_class_literal => match &first.unparenthesized().kind {
                ExprKind::ClassLiteral(ty) => (Some(ty.simple_name().to_string()), lambda),
                _ => return Err(self.structural(stmt.span, "`map(Element.class, x -> ...)`")),
            },
            _ => {
                return Err(self.structural(
                    stmt.span,
                    &format!("a single lambda argument to `{}`", call.method),
                ))
            }
        };
        let lambda_expr = lambda_expr.unparenthesized();
        let ExprKind::Lambda(lambda) = &lambda_expr.kind else {
            return Err(self.structural(
                stmt.span,
                &format!("a lambda argument to `{}`", call.method),
            ));
        };
        if lambda.params.len() != shape.lambda_arity {
            return Err(self.structural(
                stmt.span,
                &format!(
                    "a lambda taking {} argument{} for `{}`",
                    shape.lambda_arity,
                    if shape.lambda_arity == 1 { "" } else { "s" },
                    call.method
                ),
            ));
        }

        let (destination, declares_destination, output_element) = match (shape.kind, destination) {
            (OperationKind::Foreach, None) => (None, false, source.element.clone()),
            (OperationKind::Foreach, Some(_)) => {
                return Err(self.structural(
                    stmt.span,
                    "`var.par().foreach(...)` as a standalone statement",
                ))
            }
            (kind, None) => {
                return Err(self.structural(
                    stmt.span,
                    &format!("`dest = {}.par().{}(...)`", source.variable.name, kind),
                ))
            }
            (kind, Some((id, declares))) => {
                let symbol = self.tree.get(id);
                let element = match kind {
                    OperationKind::Reduce => {
                        let type_name = symbol.type_name.rsplit('.').next().unwrap_or_default();
                        if symbol.kind != SymbolKind::Variable || type_name != source.element {
                            return Err(self.structural(
                                stmt.span,
                                &format!("a `{}` destination for reduce", source.element),
                            ));
                        }
                        source.element.clone()
                    }
                    _ => {
                        let element = symbol.type_parameter.clone().unwrap_or_default();
                        if symbol.kind != SymbolKind::LibraryVariable
                            || symbol.type_name != source.class.name
                        {
                            return Err(self.structural(
                                stmt.span,
                                &format!("a `{}` destination for {}", source.class.name, kind),
                            ));
                        }
                        if kind == OperationKind::Filter && element != source.element {
                            return Err(self.structural(
                                stmt.span,
                                &format!("a destination with element type `{}`", source.element),
                            ));
                        }
                        if let Some(literal) = &class_literal {
                            if *literal != element {
                                return Err(self.structural(
                                    stmt.span,
                                    &format!("`{}.class` matching the destination element", element),
                                ));
                            }
                        }
                        element
                    }
                };
                (Some(self.variable(id)), declares, element)
            }
        };

        let captures = self.collect_captures(stmt, lambda_expr, lambda)?;
        let id = self.counter.next_id();
        log::debug!(
            "{} over {} with {} capture(s) -> #{}",
            shape.kind,
            source.variable.name,
            captures.len(),
            id
        );
        self.ir.nodes.push(IrNode::Operation(Operation {
            id,
            kind: shape.kind,
            source,
            destination,
            output_element,
            declares_destination,
            function: UserFunction {
                params: lambda.params.iter().map(|p| p.name.clone()).collect(),
                body: lambda.body.clone(),
                text: lambda_expr.span.slice(self.source).to_string(),
                line: self.line(lambda_expr.span),
                offset: lambda_expr.span.start,
            },
            captures,
            execution: ExecutionType::Parallel,
            position,
        }));
        Ok(())
    }

    /// Variables the lambda reads from enclosing scopes, in order of first use.
    fn collect_captures(&self, stmt: &Stmt, lambda_expr: &Expr, lambda: &Lambda) -> CompileResult<Vec<Variable>> {
        let Some(scope) = self.tree.lambda_scope(lambda_expr.span.start) else {
            return Err(self.structural(stmt.span, "a lambda the resolver has seen"));
        };
        let mut uses = Vec::new();
        let mut library_creator = false;
        walk_lambda_body(&lambda.body, &mut |expr| match &expr.kind {
            ExprKind::Name(name) => uses.push((name.clone(), expr.span.start)),
            ExprKind::New { ty, .. } if self.registry.is_library_type(&ty.name) => {
                library_creator = true
            }
            _ => {}
        });
        if library_creator {
            return Err(self.structural(stmt.span, "no library creators inside an operation body"));
        }

        let mut seen = HashSet::new();
        let mut captures = Vec::new();
        for (name, at) in uses {
            let Some(id) = self.tree.resolve_at(&name, at) else {
                continue;
            };
            let symbol = self.tree.get(id);
            if symbol.kind == SymbolKind::LibraryVariable {
                return Err(self.structural(
                    stmt.span,
                    &format!("no library variables (`{}`) inside an operation body", name),
                ));
            }
            let declared_inside = symbol
                .parent
                .map_or(false, |parent| self.tree.is_within(parent, scope));
            if !declared_inside && seen.insert(id) {
                captures.push(self.variable(id));
            }
        }
        Ok(captures)
    }

    fn expected_shapes(&self, variable: &LibraryVariable) -> String {
        let methods: Vec<_> = variable
            .class
            .methods
            .iter()
            .map(|m| format!("`{}.{}()`", variable.variable.name, m.name))
            .collect();
        format!(
            "`{name}.par().<op>(...)`, `dest = {name}.{bind}()`, `{name}.{bind}(dest)` or {methods}",
            name = variable.variable.name,
            bind = variable.class.output_bind,
            methods = methods.join(", ")
        )
    }

    fn library_variable(&self, name: &str, at: usize) -> Option<LibraryVariable> {
        let id = self.tree.resolve_at(name, at)?;
        self.as_library_variable(id)
    }

    fn as_library_variable(&self, id: SymbolId) -> Option<LibraryVariable> {
        let symbol = self.tree.get(id);
        if symbol.kind != SymbolKind::LibraryVariable {
            return None;
        }
        let class = self.registry.class(&symbol.type_name)?;
        Some(LibraryVariable {
            variable: self.variable(id),
            class,
            element: symbol.type_parameter.clone().unwrap_or_default(),
        })
    }

    fn resolve_variable(&self, name: &str, at: usize) -> Option<Variable> {
        self.tree.resolve_at(name, at).map(|id| self.variable(id))
    }

    fn variable(&self, id: SymbolId) -> Variable {
        let symbol = self.tree.get(id);
        Variable {
            name: symbol.name.clone(),
            type_name: symbol.type_name.clone(),
            type_parameter: symbol.type_parameter.clone(),
            is_final: symbol.is_final(),
            symbol_id: id,
        }
    }

    /// Symbol declared by the statement at `span`, looked up in its own scope only.
    fn declared_symbol(&self, name: &str, span: Span) -> CompileResult<SymbolId> {
        self.tree
            .scope_at(span.start)
            .and_then(|scope| self.tree.lookup_local(scope, name))
            .filter(|&id| self.tree.get(id).span == span)
            .ok_or_else(|| self.structural(span, "a resolvable declaration"))
    }

    fn declared_variable(&self, name: &str, span: Span) -> CompileResult<Variable> {
        self.declared_symbol(name, span).map(|id| self.variable(id))
    }

    fn declared_library_variable(&self, name: &str, span: Span) -> CompileResult<LibraryVariable> {
        let id = self.declared_symbol(name, span)?;
        self.as_library_variable(id)
            .ok_or_else(|| self.structural(span, "a registered library type"))
    }

    fn position(&self, span: Span, in_block: bool) -> Position {
        Position {
            span,
            line: self.line(span),
            in_block,
            block_end: if in_block { self.block_ends.last().copied() } else { None },
            class_name: self.current_class(),
        }
    }

    fn current_class(&self) -> String {
        self.class_stack.last().cloned().unwrap_or_default()
    }

    fn line(&self, span: Span) -> usize {
        self.lines.line_of(span.start)
    }

    fn structural(&self, span: Span, expected: &str) -> CompileError {
        CompileError::structural(self.line(span), span.slice(self.source), expected)
    }
}
