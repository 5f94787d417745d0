use crate::parser::host_ast::*;

const RESERVED: &[&str] = &[
    "abstract", "assert", "boolean", "break", "byte", "case", "catch", "char", "class", "const",
    "continue", "default", "do", "double", "else", "enum", "extends", "final", "finally", "float",
    "for", "goto", "if", "implements", "import", "instanceof", "int", "interface", "long",
    "native", "new", "package", "private", "protected", "public", "return", "short", "static",
    "strictfp", "super", "switch", "synchronized", "this", "throw", "throws", "transient", "try",
    "void", "volatile", "while", "true", "false", "null",
];

const MODIFIER_KEYWORDS: &[&str] = &[
    "public", "protected", "private", "static", "abstract", "final", "native", "synchronized",
    "transient", "volatile", "strictfp", "default",
];

fn is_reserved(word: &str) -> bool {
    RESERVED.contains(&word)
}

/// Trailing member accesses, calls and indexing, folded onto a primary.
enum PostfixOp {
    Call { name: String, args: Vec<Expr>, end: usize },
    Field { name: String, end: usize },
    Index { index: Expr, end: usize },
    Increment(usize),
    Decrement(usize),
}

fn apply_postfix(base: Expr, op: PostfixOp) -> Expr {
    let start = base.span.start;
    match op {
        PostfixOp::Call { name, args, end } => Expr::new(
            ExprKind::MethodCall {
                target: Some(Box::new(base)),
                name,
                args,
            },
            start,
            end,
        ),
        PostfixOp::Field { name, end } => Expr::new(
            ExprKind::FieldAccess {
                target: Box::new(base),
                name,
            },
            start,
            end,
        ),
        PostfixOp::Index { index, end } => Expr::new(
            ExprKind::Index {
                target: Box::new(base),
                index: Box::new(index),
            },
            start,
            end,
        ),
        PostfixOp::Increment(end) => unary_expr(UnaryOp::PostInc, base, start, end),
        PostfixOp::Decrement(end) => unary_expr(UnaryOp::PostDec, base, start, end),
    }
}

fn unary_expr(op: UnaryOp, operand: Expr, start: usize, end: usize) -> Expr {
    Expr::new(
        ExprKind::Unary {
            op,
            operand: Box::new(operand),
        },
        start,
        end,
    )
}

fn prefix(op: UnaryOp, start: usize, operand: Expr) -> Expr {
    let end = operand.span.end;
    unary_expr(op, operand, start, end)
}

fn binary(lhs: Expr, op: BinaryOp, rhs: Expr) -> Expr {
    let (start, end) = (lhs.span.start, rhs.span.end);
    Expr::new(
        ExprKind::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        },
        start,
        end,
    )
}

fn cast_expr(ty: TypeRef, start: usize, operand: Expr) -> Expr {
    let end = operand.span.end;
    Expr::new(
        ExprKind::Cast {
            ty,
            operand: Box::new(operand),
        },
        start,
        end,
    )
}

fn floating_literal(text: &str) -> Result<Literal, &'static str> {
    let cleaned: String = text.chars().filter(|c| *c != '_').collect();
    let (digits, is_float) = match cleaned.chars().last() {
        Some('f') | Some('F') => (&cleaned[..cleaned.len() - 1], true),
        Some('d') | Some('D') => (&cleaned[..cleaned.len() - 1], false),
        _ => (&cleaned[..], false),
    };
    let value: f64 = digits.parse().map_err(|_| "floating point literal")?;
    Ok(if is_float {
        Literal::Float(value)
    } else {
        Literal::Double(value)
    })
}

fn integer_literal(text: &str) -> Result<Literal, &'static str> {
    let cleaned: String = text.chars().filter(|c| *c != '_').collect();
    let (digits, is_long) = match cleaned.strip_suffix(['l', 'L']) {
        Some(digits) => (digits.to_string(), true),
        None => (cleaned, false),
    };
    let value = if let Some(hex) = digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
    {
        u64::from_str_radix(hex, 16).map_err(|_| "hexadecimal literal")? as i64
    } else {
        digits.parse::<i64>().map_err(|_| "integer literal")?
    };
    Ok(if is_long {
        Literal::Long(value)
    } else {
        Literal::Int(value)
    })
}

fn char_literal(body: &str) -> Result<Literal, &'static str> {
    let mut chars = body.chars();
    let c = match (chars.next(), chars.next()) {
        (Some('\\'), Some('n')) => '\n',
        (Some('\\'), Some('t')) => '\t',
        (Some('\\'), Some('r')) => '\r',
        (Some('\\'), Some('0')) => '\0',
        (Some('\\'), Some('u')) => {
            let code = u32::from_str_radix(&body[2..], 16).map_err(|_| "unicode escape")?;
            char::from_u32(code).ok_or("unicode escape")?
        }
        (Some('\\'), Some(other)) => other,
        (Some(c), None) => c,
        _ => return Err("character literal"),
    };
    Ok(Literal::Char(c))
}

peg::parser! {
    pub grammar java_parser() for str {
        rule _() = quiet!{([' ' | '\t' | '\n' | '\r' | '\u{000C}'] / comment())*}

        rule comment() = block_comment() / line_comment()
        rule block_comment() = "/*" (!"*/" [_])* "*/"
        rule line_comment() = "//" (!"\n" [_])* ("\n" / ![_])

        rule ident_start() = ['a'..='z' | 'A'..='Z' | '_' | '$']
        rule ident_char() = ['a'..='z' | 'A'..='Z' | '0'..='9' | '_' | '$']
        rule word() -> &'input str = $(ident_start() ident_char()*)

        rule kw(k: &'static str) = w:word() {? if w == k { Ok(()) } else { Err(k) } }

        rule identifier() -> String
            = quiet!{ w:word() {? if is_reserved(w) { Err("identifier") } else { Ok(w.to_string()) } } }
            / expected!("identifier")

        rule qualified_name() -> String
            = first:identifier() rest:(_ "." _ part:identifier() { part })* {
                let mut name = first;
                for part in rest {
                    name.push('.');
                    name.push_str(&part);
                }
                name
            }

        pub rule compilation_unit() -> CompilationUnit
            = _ package:package_decl()? _ imports:(import_decl() ** _) _ types:(type_decl() ** _) _ ![_] {
                CompilationUnit { package, imports, types }
            }

        rule package_decl() -> PackageDecl
            = s:position!() kw("package") _ name:qualified_name() _ ";" e:position!() {
                PackageDecl { name, span: Span::new(s, e) }
            }

        rule import_decl() -> ImportDecl
            = s:position!() kw("import") _ st:(kw("static") _)? path:qualified_name() wild:(_ "." _ "*")? _ ";" e:position!() {
                ImportDecl { path, is_static: st.is_some(), wildcard: wild.is_some(), span: Span::new(s, e) }
            }

        rule type_decl() -> ClassDecl
            = s:position!() modifiers:modifiers() kind:class_kind() _ name:identifier() _
              (type_parameters() _)?
              (kw("extends") _ type_list() _)?
              (kw("implements") _ type_list() _)?
              bs:position!() members:class_body() e:position!() {
                ClassDecl { name, kind, modifiers, members, span: Span::new(s, e), body_span: Span::new(bs, e) }
            }

        rule class_kind() -> ClassKind
            = kw("class") { ClassKind::Class }
            / kw("interface") { ClassKind::Interface }

        rule type_list() = type_ref() ++ (_ "," _)

        rule type_parameters() = "<" (type_parameters() / !['<' | '>'] [_])* ">"

        rule class_body() -> Vec<Member>
            = "{" _ members:(member() ** _) _ "}" { members }

        rule modifiers() -> Modifiers
            = items:(m:modifier() _ { m })* {
                Modifiers { keywords: items.into_iter().flatten().collect() }
            }

        rule modifier() -> Option<String>
            = annotation() { None }
            / w:word() {? if MODIFIER_KEYWORDS.contains(&w) { Ok(Some(w.to_string())) } else { Err("modifier") } }

        rule annotation() = "@" !kw("interface") _ qualified_name() (_ "(" balanced_parens() ")")?

        rule balanced_parens() = ("(" balanced_parens() ")" / string_token() / !['(' | ')'] [_])*

        rule string_token() = "\"" ("\\" [_] / !['"' | '\\'] [_])* "\""

        rule member() -> Member
            = c:type_decl() { Member::Class(c) }
            / st:(kw("static") _)? body:block() { Member::Initializer { is_static: st.is_some(), body } }
            / c:constructor() { Member::Constructor(c) }
            / m:method() { Member::Method(m) }
            / f:field() { Member::Field(f) }

        rule constructor() -> MethodDecl
            = s:position!() modifiers:modifiers() (type_parameters() _)? name:identifier() _
              "(" _ params:params() _ ")" _ throws_clause()? body:block() e:position!() {
                MethodDecl { modifiers, return_type: None, name, params, body: Some(body), span: Span::new(s, e) }
            }

        rule method() -> MethodDecl
            = s:position!() modifiers:modifiers() (type_parameters() _)? return_type:result_type() _ name:identifier() _
              "(" _ params:params() _ ")" _ ("[" _ "]" _)* throws_clause()?
              body:(b:block() { Some(b) } / ";" { None }) e:position!() {
                MethodDecl { modifiers, return_type, name, params, body, span: Span::new(s, e) }
            }

        rule result_type() -> Option<TypeRef>
            = kw("void") { None }
            / t:type_ref() { Some(t) }

        rule throws_clause() = kw("throws") _ type_list() _

        rule params() -> Vec<Param> = param() ** (_ "," _)

        rule param() -> Param
            = s:position!() modifiers:modifiers() ty:type_ref() _ varargs:("..." _)? name:identifier() dims:(_ "[" _ "]")* e:position!() {
                let mut ty = ty;
                ty.dims += dims.len();
                Param { modifiers, ty, name, varargs: varargs.is_some(), span: Span::new(s, e) }
            }

        rule field() -> FieldDecl
            = s:position!() modifiers:modifiers() ty:type_ref() _ declarators:(declarator() ++ (_ "," _)) _ ";" e:position!() {
                FieldDecl { modifiers, ty, declarators, span: Span::new(s, e) }
            }

        rule declarator() -> Declarator
            = s:position!() name:identifier() dims:(_ "[" _ "]")* init:(_ "=" _ v:variable_initializer() { v })? e:position!() {
                Declarator { name, dims: dims.len(), init, span: Span::new(s, e) }
            }

        rule variable_initializer() -> Expr
            = s:position!() items:array_initializer() e:position!() { Expr::new(ExprKind::ArrayInit(items), s, e) }
            / expression()

        rule array_initializer() -> Vec<Expr>
            = "{" _ items:(variable_initializer() ** (_ "," _)) _ ("," _)? "}" { items }

        pub rule type_ref() -> TypeRef
            = s:position!() name:type_name() args:(_ a:type_arguments() { a })? dims:(_ "[" _ "]")* e:position!() {
                TypeRef { name, args, dims: dims.len(), span: Span::new(s, e) }
            }

        rule type_name() -> String
            = w:word() {? if is_primitive_name(w) { Ok(w.to_string()) } else { Err("type") } }
            / qualified_name()

        rule type_arguments() -> Vec<TypeRef>
            = "<" _ ">" { Vec::new() }
            / "<" _ args:(type_argument() ++ (_ "," _)) _ ">" { args }

        rule type_argument() -> TypeRef
            = s:position!() "?" bound:(_ (kw("extends") / kw("super")) _ t:type_ref() { t })? e:position!() {
                bound.unwrap_or(TypeRef { name: "?".to_string(), args: None, dims: 0, span: Span::new(s, e) })
            }
            / type_ref()

        pub rule block() -> Block
            = s:position!() "{" _ stmts:(statement() ** _) _ "}" e:position!() {
                Block { stmts, span: Span::new(s, e) }
            }

        rule statement() -> Stmt
            = s:position!() kind:statement_kind() e:position!() { Stmt { kind, span: Span::new(s, e) } }

        rule statement_kind() -> StmtKind
            = b:block() { StmtKind::Block(b) }
            / ";" { StmtKind::Empty }
            / kw("if") _ "(" _ condition:expression() _ ")" _ then_branch:statement()
              else_branch:(_ kw("else") _ s:statement() { s })? {
                StmtKind::If { condition, then_branch: Box::new(then_branch), else_branch: else_branch.map(Box::new) }
            }
            / kw("while") _ "(" _ condition:expression() _ ")" _ body:statement() {
                StmtKind::While { condition, body: Box::new(body) }
            }
            / kw("do") _ body:statement() _ kw("while") _ "(" _ condition:expression() _ ")" _ ";" {
                StmtKind::DoWhile { body: Box::new(body), condition }
            }
            / kw("for") _ "(" _ variable:foreach_variable() _ ":" _ iterable:expression() _ ")" _ body:statement() {
                StmtKind::ForEach { variable, iterable, body: Box::new(body) }
            }
            / kw("for") _ "(" _ init:for_init()? _ ";" _ condition:expression()? _ ";" _
              update:(expression() ** (_ "," _)) _ ")" _ body:statement() {
                StmtKind::For { init, condition, update, body: Box::new(body) }
            }
            / kw("return") value:(_ v:expression() { v })? _ ";" { StmtKind::Return(value) }
            / kw("break") (_ identifier())? _ ";" { StmtKind::Break }
            / kw("continue") (_ identifier())? _ ";" { StmtKind::Continue }
            / kw("throw") _ value:expression() _ ";" { StmtKind::Throw(value) }
            / kw("try") _ body:block() catches:(_ c:catch_clause() { c })* finally:(_ kw("finally") _ b:block() { b })? {
                StmtKind::Try { body, catches, finally }
            }
            / decl:local_var_decl() _ ";" { StmtKind::LocalVar(decl) }
            / e:expression() _ ";" { StmtKind::Expr(e) }

        rule foreach_variable() -> LocalVarDecl
            = s:position!() modifiers:modifiers() ty:type_ref() _ ds:position!() name:identifier() e:position!() {
                LocalVarDecl {
                    modifiers,
                    ty,
                    declarators: vec![Declarator { name, dims: 0, init: None, span: Span::new(ds, e) }],
                    span: Span::new(s, e),
                }
            }

        rule for_init() -> ForInit
            = d:local_var_decl() { ForInit::Decl(d) }
            / es:(expression() ++ (_ "," _)) { ForInit::Exprs(es) }

        rule local_var_decl() -> LocalVarDecl
            = s:position!() modifiers:modifiers() ty:type_ref() _ declarators:(declarator() ++ (_ "," _)) e:position!() {
                LocalVarDecl { modifiers, ty, declarators, span: Span::new(s, e) }
            }

        rule catch_clause() -> CatchClause
            = kw("catch") _ "(" _ ps:position!() modifiers:modifiers() ty:type_ref() (_ "|" _ type_ref())* _
              name:identifier() pe:position!() _ ")" _ body:block() {
                CatchClause { param: Param { modifiers, ty, name, varargs: false, span: Span::new(ps, pe) }, body }
            }

        pub rule expression() -> Expr
            = lambda()
            / target:conditional() assignment:(_ op:assignment_operator() _ value:expression() { (op, value) })? {
                match assignment {
                    Some((op, value)) => {
                        let (start, end) = (target.span.start, value.span.end);
                        Expr::new(ExprKind::Assign { op, target: Box::new(target), value: Box::new(value) }, start, end)
                    }
                    None => target,
                }
            }

        rule assignment_operator() -> Option<BinaryOp>
            = "=" !"=" { None }
            / "+=" { Some(BinaryOp::Add) }
            / "-=" { Some(BinaryOp::Sub) }
            / "*=" { Some(BinaryOp::Mul) }
            / "/=" { Some(BinaryOp::Div) }
            / "%=" { Some(BinaryOp::Rem) }
            / "&=" { Some(BinaryOp::BitAnd) }
            / "|=" { Some(BinaryOp::BitOr) }
            / "^=" { Some(BinaryOp::BitXor) }
            / "<<=" { Some(BinaryOp::Shl) }
            / ">>>=" { Some(BinaryOp::UShr) }
            / ">>=" { Some(BinaryOp::Shr) }

        rule lambda() -> Expr
            = s:position!() params:lambda_parameters() _ "->" _ body:lambda_body() e:position!() {
                Expr::new(ExprKind::Lambda(Lambda { params, body }), s, e)
            }

        rule lambda_parameters() -> Vec<LambdaParam>
            = p:untyped_lambda_parameter() { vec![p] }
            / "(" _ params:(lambda_parameter() ** (_ "," _)) _ ")" { params }

        rule lambda_parameter() -> LambdaParam
            = s:position!() modifiers() ty:type_ref() _ name:identifier() e:position!() {
                LambdaParam { name, ty: Some(ty), span: Span::new(s, e) }
            }
            / untyped_lambda_parameter()

        rule untyped_lambda_parameter() -> LambdaParam
            = s:position!() name:identifier() e:position!() {
                LambdaParam { name, ty: None, span: Span::new(s, e) }
            }

        rule lambda_body() -> LambdaBody
            = b:block() { LambdaBody::Block(b) }
            / e:expression() { LambdaBody::Expr(Box::new(e)) }

        rule conditional() -> Expr
            = condition:binary_expr() branches:(_ "?" _ t:expression() _ ":" _ f:conditional_branch() { (t, f) })? {
                match branches {
                    Some((then_value, else_value)) => {
                        let (start, end) = (condition.span.start, else_value.span.end);
                        Expr::new(ExprKind::Conditional {
                            condition: Box::new(condition),
                            then_value: Box::new(then_value),
                            else_value: Box::new(else_value),
                        }, start, end)
                    }
                    None => condition,
                }
            }

        rule conditional_branch() -> Expr = lambda() / conditional()

        rule binary_expr() -> Expr = precedence!{
            x:(@) _ "||" _ y:@ { binary(x, BinaryOp::Or, y) }
            --
            x:(@) _ "&&" _ y:@ { binary(x, BinaryOp::And, y) }
            --
            x:(@) _ "|" !['|' | '='] _ y:@ { binary(x, BinaryOp::BitOr, y) }
            --
            x:(@) _ "^" !"=" _ y:@ { binary(x, BinaryOp::BitXor, y) }
            --
            x:(@) _ "&" !['&' | '='] _ y:@ { binary(x, BinaryOp::BitAnd, y) }
            --
            x:(@) _ "==" _ y:@ { binary(x, BinaryOp::Eq, y) }
            x:(@) _ "!=" _ y:@ { binary(x, BinaryOp::Ne, y) }
            --
            x:(@) _ "<=" _ y:@ { binary(x, BinaryOp::Le, y) }
            x:(@) _ ">=" _ y:@ { binary(x, BinaryOp::Ge, y) }
            x:(@) _ "<" !['<' | '='] _ y:@ { binary(x, BinaryOp::Lt, y) }
            x:(@) _ ">" !['>' | '='] _ y:@ { binary(x, BinaryOp::Gt, y) }
            --
            x:(@) _ "<<" !"=" _ y:@ { binary(x, BinaryOp::Shl, y) }
            x:(@) _ ">>>" !"=" _ y:@ { binary(x, BinaryOp::UShr, y) }
            x:(@) _ ">>" !['>' | '='] _ y:@ { binary(x, BinaryOp::Shr, y) }
            --
            x:(@) _ "+" !['+' | '='] _ y:@ { binary(x, BinaryOp::Add, y) }
            x:(@) _ "-" !['-' | '=' | '>'] _ y:@ { binary(x, BinaryOp::Sub, y) }
            --
            x:(@) _ "*" !"=" _ y:@ { binary(x, BinaryOp::Mul, y) }
            x:(@) _ "/" !"=" _ y:@ { binary(x, BinaryOp::Div, y) }
            x:(@) _ "%" !"=" _ y:@ { binary(x, BinaryOp::Rem, y) }
            --
            u:unary() { u }
        }

        rule unary() -> Expr
            = s:position!() "++" _ operand:unary() { prefix(UnaryOp::PreInc, s, operand) }
            / s:position!() "--" _ operand:unary() { prefix(UnaryOp::PreDec, s, operand) }
            / s:position!() "-" _ operand:unary() { prefix(UnaryOp::Neg, s, operand) }
            / s:position!() "+" _ operand:unary() { prefix(UnaryOp::Plus, s, operand) }
            / s:position!() "!" _ operand:unary() { prefix(UnaryOp::Not, s, operand) }
            / s:position!() "~" _ operand:unary() { prefix(UnaryOp::BitNot, s, operand) }
            / cast()
            / postfix()

        rule cast() -> Expr
            = s:position!() "(" _ ty:type_ref() _ ")" _ operand:unary() {?
                if ty.is_primitive() { Ok(cast_expr(ty, s, operand)) } else { Err("primitive cast") }
            }
            / s:position!() "(" _ ty:type_ref() _ ")" _ !['+' | '-'] operand:unary() { cast_expr(ty, s, operand) }

        rule postfix() -> Expr
            = base:primary() ops:(_ op:postfix_op() { op })* {
                ops.into_iter().fold(base, apply_postfix)
            }

        rule postfix_op() -> PostfixOp
            = "." _ (type_arguments() _)? name:identifier() _ "(" _ args:arguments() _ ")" e:position!() {
                PostfixOp::Call { name, args, end: e }
            }
            / "." _ name:identifier() e:position!() { PostfixOp::Field { name, end: e } }
            / "[" _ index:expression() _ "]" e:position!() { PostfixOp::Index { index, end: e } }
            / "++" e:position!() { PostfixOp::Increment(e) }
            / "--" e:position!() { PostfixOp::Decrement(e) }

        rule primary() -> Expr
            = literal()
            / s:position!() "(" _ inner:expression() _ ")" e:position!() { Expr::new(ExprKind::Paren(Box::new(inner)), s, e) }
            / s:position!() name:$(kw("this") / kw("super")) _ "(" _ args:arguments() _ ")" e:position!() {
                Expr::new(ExprKind::MethodCall { target: None, name: name.to_string(), args }, s, e)
            }
            / s:position!() kw("this") e:position!() { Expr::new(ExprKind::This, s, e) }
            / s:position!() kw("super") e:position!() { Expr::new(ExprKind::Super, s, e) }
            / creator()
            / s:position!() ty:type_ref() _ "." _ kw("class") e:position!() { Expr::new(ExprKind::ClassLiteral(ty), s, e) }
            / s:position!() name:identifier() _ "(" _ args:arguments() _ ")" e:position!() {
                Expr::new(ExprKind::MethodCall { target: None, name, args }, s, e)
            }
            / s:position!() name:identifier() e:position!() { Expr::new(ExprKind::Name(name), s, e) }

        rule arguments() -> Vec<Expr> = expression() ** (_ "," _)

        rule creator() -> Expr
            = s:position!() kw("new") _ ty:creator_type() _ "(" _ args:arguments() _ ")" body:(_ b:class_body() { b })? e:position!() {
                Expr::new(ExprKind::New { ty, args, body }, s, e)
            }
            / s:position!() kw("new") _ ty:creator_type() dims:(_ "[" _ d:expression() _ "]" { d })+ extra:(_ "[" _ "]")* e:position!() {
                let mut ty = ty;
                ty.dims = dims.len() + extra.len();
                Expr::new(ExprKind::NewArray { ty, dims, init: None }, s, e)
            }
            / s:position!() kw("new") _ ty:creator_type() extra:(_ "[" _ "]")+ _ init:array_initializer() e:position!() {
                let mut ty = ty;
                ty.dims = extra.len();
                Expr::new(ExprKind::NewArray { ty, dims: Vec::new(), init: Some(init) }, s, e)
            }

        rule creator_type() -> TypeRef
            = s:position!() name:type_name() args:(_ a:type_arguments() { a })? e:position!() {
                TypeRef { name, args, dims: 0, span: Span::new(s, e) }
            }

        rule literal() -> Expr
            = s:position!() value:literal_value() e:position!() { Expr::new(ExprKind::Literal(value), s, e) }

        rule literal_value() -> Literal
            = text:$(digits() "." ['0'..='9']* exponent()? float_suffix()?) {? floating_literal(text) }
            / text:$("." ['0'..='9']+ exponent()? float_suffix()?) {? floating_literal(text) }
            / text:$(digits() exponent() float_suffix()?) {? floating_literal(text) }
            / text:$(digits() float_suffix()) {? floating_literal(text) }
            / text:$("0" ['x' | 'X'] ['0'..='9' | 'a'..='f' | 'A'..='F' | '_']+ ['l' | 'L']?) {? integer_literal(text) }
            / text:$(digits() ['l' | 'L']?) {? integer_literal(text) }
            / "'" body:$("\\" [_] ['0'..='9' | 'a'..='f' | 'A'..='F']* / [_]) "'" {? char_literal(body) }
            / "\"" body:$(("\\" [_] / !['"' | '\\' | '\n'] [_])*) "\"" { Literal::String(body.to_string()) }
            / kw("true") { Literal::Bool(true) }
            / kw("false") { Literal::Bool(false) }
            / kw("null") { Literal::Null }

        rule digits() = ['0'..='9'] ['0'..='9' | '_']*
        rule exponent() = ['e' | 'E'] ['+' | '-']? ['0'..='9']+
        rule float_suffix() = ['f' | 'F' | 'd' | 'D']
    }
}

#[cfg(test)]
mod tests {
    use super::java_parser;
    use super::*;

    fn expr(source: &str) -> Expr {
        java_parser::expression(source).expect("expression should parse")
    }

    #[test]
    fn test_par_chain_is_nested_method_calls() {
        let e = expr("a.par().foreach(x -> { x.value = x.value + 1; })");
        let ExprKind::MethodCall { target, name, args } = &e.kind else {
            panic!("expected call, got {:?}", e.kind);
        };
        assert_eq!(name, "foreach");
        assert_eq!(args.len(), 1);
        assert!(matches!(args[0].kind, ExprKind::Lambda(_)));
        let inner = target.as_ref().unwrap();
        assert!(matches!(&inner.kind, ExprKind::MethodCall { name, .. } if name == "par"));
        assert_eq!(e.span.start, 0);
    }

    #[test]
    fn test_precedence_and_spans() {
        let source = "a + b * c";
        let e = expr(source);
        let ExprKind::Binary { op, rhs, .. } = &e.kind else {
            panic!("expected binary");
        };
        assert_eq!(*op, BinaryOp::Add);
        assert!(matches!(rhs.kind, ExprKind::Binary { op: BinaryOp::Mul, .. }));
        assert_eq!(rhs.span.slice(source), "b * c");
    }

    #[test]
    fn test_casts_and_parentheses() {
        let e = expr("(int[]) a.toJavaArray()");
        assert!(matches!(&e.kind, ExprKind::Cast { ty, .. } if ty.dims == 1 && ty.name == "int"));
        let e = expr("(a) - b");
        assert!(matches!(e.kind, ExprKind::Binary { op: BinaryOp::Sub, .. }));
        let e = expr("(float) -x");
        assert!(matches!(e.kind, ExprKind::Cast { .. }));
    }

    #[test]
    fn test_two_parameter_lambda_with_expression_body() {
        let e = expr("(x, y) -> x");
        let ExprKind::Lambda(lambda) = &e.kind else {
            panic!("expected lambda");
        };
        assert_eq!(lambda.params.len(), 2);
        assert!(matches!(lambda.body, LambdaBody::Expr(_)));
    }

    #[test]
    fn test_literals() {
        assert!(matches!(expr("1.5f").kind, ExprKind::Literal(Literal::Float(v)) if v == 1.5));
        assert!(matches!(expr("2.0").kind, ExprKind::Literal(Literal::Double(v)) if v == 2.0));
        assert!(matches!(expr("10L").kind, ExprKind::Literal(Literal::Long(10))));
        assert!(matches!(expr("0xFF").kind, ExprKind::Literal(Literal::Int(255))));
        assert!(matches!(expr("'\\n'").kind, ExprKind::Literal(Literal::Char('\n'))));
        assert!(matches!(expr("\"a\\\"b\"").kind, ExprKind::Literal(Literal::String(_))));
    }

    #[test]
    fn test_class_literal_and_diamond_creator() {
        let e = expr("new Array<>(data, Int32.class)");
        let ExprKind::New { ty, args, body } = &e.kind else {
            panic!("expected creator");
        };
        assert!(ty.is_diamond());
        assert!(body.is_none());
        assert!(matches!(&args[1].kind, ExprKind::ClassLiteral(t) if t.name == "Int32"));
    }

    #[test]
    fn test_compound_assignment() {
        let e = expr("t.value += 2");
        assert!(matches!(e.kind, ExprKind::Assign { op: Some(BinaryOp::Add), .. }));
    }

    #[test]
    fn test_block_with_declarations_and_loops() {
        let block = java_parser::block(
            "{ int s = 0; for (int i = 0; i < n; i++) { s += i; } if (s > 3) return; else s--; }",
        )
        .expect("block should parse");
        assert_eq!(block.stmts.len(), 3);
        assert!(matches!(block.stmts[0].kind, StmtKind::LocalVar(_)));
        assert!(matches!(block.stmts[1].kind, StmtKind::For { .. }));
        assert!(matches!(block.stmts[2].kind, StmtKind::If { .. }));
    }

    #[test]
    fn test_generic_type_refs() {
        let ty = java_parser::type_ref("Map<String, List<Int32>>").unwrap();
        assert_eq!(ty.args.as_ref().unwrap().len(), 2);
        assert_eq!(ty.to_string(), "Map<String, List<Int32>>");
    }

    #[test]
    fn test_reserved_words_are_not_identifiers() {
        assert!(java_parser::expression("class").is_err());
    }
}
