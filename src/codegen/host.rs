//! Host source rewriting: span-based edits over the original text plus a small
//! indented line writer for generated members and native sources.

use crate::diagnostics::{LineIndex, Span};
use crate::error::{CompileError, CompileResult};
use crate::ir::Position;

const INDENT: &str = "    ";

/// Accumulates indented lines of generated code.
#[derive(Debug, Clone, Default)]
pub struct CodeWriter {
    lines: Vec<String>,
    depth: usize,
}

impl CodeWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn line(&mut self, text: impl AsRef<str>) -> &mut Self {
        let text = text.as_ref();
        if text.is_empty() {
            self.lines.push(String::new());
        } else {
            self.lines.push(format!("{}{}", INDENT.repeat(self.depth), text));
        }
        self
    }

    pub fn blank(&mut self) -> &mut Self {
        self.lines.push(String::new());
        self
    }

    /// `<header> {` and one level deeper.
    pub fn open(&mut self, header: impl AsRef<str>) -> &mut Self {
        self.line(format!("{} {{", header.as_ref()));
        self.depth += 1;
        self
    }

    pub fn close(&mut self) -> &mut Self {
        self.close_with("")
    }

    /// `}<suffix>` one level shallower, e.g. `} else {` or `};`.
    pub fn close_with(&mut self, suffix: &str) -> &mut Self {
        self.depth = self.depth.saturating_sub(1);
        self.line(format!("}}{}", suffix))
    }

    /// Appends pre-rendered text, re-indenting every non-empty line.
    pub fn text(&mut self, text: &str) -> &mut Self {
        for line in text.lines() {
            self.line(line);
        }
        self
    }

    pub fn extend<I, S>(&mut self, lines: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for line in lines {
            self.line(line);
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn into_lines(self) -> Vec<String> {
        self.lines
    }

    pub fn finish(self) -> String {
        let mut out = self.lines.join("\n");
        out.push('\n');
        out
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Edit {
    span: Span,
    text: String,
    line: usize,
    /// Levels added on top of the guards enclosing `span.start`.
    depth: usize,
}

/// A cleanup statement that must run when the block holding a statement is
/// left, however it is left.
#[derive(Debug, Clone, PartialEq)]
struct Guard {
    after: usize,
    block_end: usize,
    indent: String,
    cleanup: String,
}

/// Applies non-overlapping replacements to a host source file.
pub struct SourceRewriter<'s> {
    source: &'s str,
    lines: LineIndex,
    edits: Vec<Edit>,
    guards: Vec<Guard>,
}

impl<'s> SourceRewriter<'s> {
    pub fn new(source: &'s str) -> Self {
        Self {
            source,
            lines: LineIndex::new(source),
            edits: Vec::new(),
            guards: Vec::new(),
        }
    }

    pub fn replace(&mut self, span: Span, text: impl Into<String>) {
        self.edits.push(Edit {
            span,
            text: text.into(),
            line: self.lines.line_of(span.start),
            depth: 0,
        });
    }

    pub fn insert(&mut self, at: usize, text: impl Into<String>) {
        self.replace(Span::new(at, at), text);
    }

    /// Removes `span` together with the rest of its line.
    pub fn remove_line(&mut self, span: Span) {
        let rest = &self.source[span.end..];
        let end = match rest.find('\n') {
            Some(newline) if rest[..newline].trim().is_empty() => span.end + newline + 1,
            _ => span.end,
        };
        self.replace(Span::new(span.start, end), "");
    }

    /// Replaces the statement at `position` with `statements`, one per line,
    /// indented like the original. Statements that are the unbraced body of
    /// an `if` or loop are wrapped in a block.
    pub fn replace_statement(&mut self, position: &Position, statements: &[String]) {
        let indent = self.lines.indentation(self.source, position.span.start).to_string();
        let text = if position.in_block {
            join_indented(statements, &indent)
        } else {
            let inner = format!("{}{}", indent, INDENT);
            let mut text = String::from("{");
            for statement in statements {
                text.push('\n');
                text.push_str(&indent_line(statement, &inner));
            }
            text.push('\n');
            text.push_str(&indent);
            text.push('}');
            text
        };
        self.replace(position.span, text);
    }

    /// Inserts class members right after the `{` at `at`.
    pub fn insert_members(&mut self, at: usize, members: &[String]) {
        if members.is_empty() {
            return;
        }
        let indent = format!(
            "{}{}",
            self.lines.indentation(self.source, at.saturating_sub(1)),
            INDENT
        );
        let mut text = String::new();
        for member in members {
            text.push('\n');
            text.push_str(&indent_line(member, &indent));
        }
        self.insert(at, text);
    }

    pub fn indentation(&self, offset: usize) -> &'s str {
        self.lines.indentation(self.source, offset)
    }

    /// Runs `cleanup` when control leaves the block holding the statement at
    /// `position`: the rest of the block moves into a `try` whose `finally`
    /// holds `cleanup`. Returns false when the statement is not directly in a
    /// block whose `}` sits on a line of its own.
    pub fn guard(&mut self, position: &Position, cleanup: impl Into<String>) -> bool {
        let Some(block_end) = position.block_end.filter(|_| position.in_block) else {
            return false;
        };
        let after = position.span.end;
        let closing_line = match self.source.get(..block_end).and_then(|head| head.rfind('\n')) {
            Some(newline) if self.source[newline + 1..block_end].trim().is_empty() => newline,
            _ => return false,
        };
        if after >= closing_line {
            return false;
        }
        let indent = self.indentation(position.span.start).to_string();
        self.guards.push(Guard {
            after,
            block_end,
            indent,
            cleanup: cleanup.into(),
        });
        true
    }

    /// Turns guards into `try`/`finally` edits and returns the reindented
    /// regions they wrap.
    fn expand_guards(&mut self) -> Vec<(usize, usize)> {
        let mut guards = std::mem::take(&mut self.guards);
        guards.sort_by_key(|guard| (guard.block_end, guard.after));
        let mut regions = Vec::with_capacity(guards.len());
        let mut finals = Vec::new();
        for (i, guard) in guards.iter().enumerate() {
            let nesting = guards[..i]
                .iter()
                .filter(|other| other.block_end == guard.block_end)
                .count();
            let closing_line = self.source[..guard.block_end].rfind('\n').unwrap_or(guard.after);
            regions.push((guard.after, closing_line));
            self.edits.push(Edit {
                span: Span::new(guard.after, guard.after),
                text: format!("\n{}try {{", guard.indent),
                line: self.lines.line_of(guard.after),
                depth: 0,
            });
            finals.push(Edit {
                span: Span::new(closing_line, closing_line),
                text: format!(
                    "\n{i}}} finally {{\n{i}{}{}\n{i}}}",
                    INDENT,
                    guard.cleanup,
                    i = guard.indent
                ),
                line: self.lines.line_of(closing_line),
                depth: nesting,
            });
        }
        // Inner `finally` first, so each closes the innermost open `try`.
        self.edits.extend(finals.into_iter().rev());
        regions
    }

    pub fn finish(mut self) -> CompileResult<String> {
        let regions = self.expand_guards();
        self.edits
            .sort_by_key(|edit| (edit.span.start, edit.span.end));
        let mut out = String::with_capacity(self.source.len());
        let mut cursor = 0;
        for edit in &self.edits {
            if edit.span.start < cursor {
                return Err(CompileError::structural(
                    edit.line,
                    edit.span.slice(self.source),
                    "one DSL construct per statement",
                ));
            }
            push_source(&mut out, self.source, cursor, edit.span.start, &regions);
            let depth = edit.depth
                + regions
                    .iter()
                    .filter(|(start, end)| *start < edit.span.start && edit.span.start < *end)
                    .count();
            push_indented(&mut out, &edit.text, depth);
            cursor = edit.span.end;
        }
        push_source(&mut out, self.source, cursor, self.source.len(), &regions);
        log::debug!(
            "applied {} host edits, {} guarded regions",
            self.edits.len(),
            regions.len()
        );
        Ok(out)
    }
}

/// Copies `source[from..to]`, indenting the lines that start inside a
/// guarded region by one level per region.
fn push_source(out: &mut String, source: &str, from: usize, to: usize, regions: &[(usize, usize)]) {
    if regions.is_empty() {
        out.push_str(&source[from..to]);
        return;
    }
    let mut last = from;
    for (offset, _) in source[from..to].match_indices('\n') {
        let newline = from + offset;
        out.push_str(&source[last..=newline]);
        last = newline + 1;
        if starts_blank_line(&source[last..]) {
            continue;
        }
        let depth = regions
            .iter()
            .filter(|(start, end)| *start <= newline && newline < *end)
            .count();
        for _ in 0..depth {
            out.push_str(INDENT);
        }
    }
    out.push_str(&source[last..to]);
}

fn push_indented(out: &mut String, text: &str, depth: usize) {
    if depth == 0 {
        out.push_str(text);
        return;
    }
    let mut lines = text.split('\n');
    if let Some(first) = lines.next() {
        out.push_str(first);
    }
    for line in lines {
        out.push('\n');
        if !line.is_empty() {
            for _ in 0..depth {
                out.push_str(INDENT);
            }
        }
        out.push_str(line);
    }
}

fn starts_blank_line(rest: &str) -> bool {
    rest.is_empty() || rest.starts_with('\n') || rest.starts_with("\r\n")
}

fn indent_line(line: &str, indent: &str) -> String {
    if line.is_empty() {
        String::new()
    } else {
        format!("{}{}", indent, line)
    }
}

/// First line stays at the original position; the rest get `indent`.
fn join_indented(statements: &[String], indent: &str) -> String {
    let mut text = String::new();
    for (i, statement) in statements.iter().enumerate() {
        if i > 0 {
            text.push('\n');
            text.push_str(&indent_line(statement, indent));
        } else {
            text.push_str(statement);
        }
    }
    text
}

/// Java string literal for `text`.
pub fn java_string(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('"');
    for c in text.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            _ => out.push(c),
        }
    }
    out.push('"');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn position(source: &str, needle: &str, in_block: bool) -> Position {
        let start = source.find(needle).unwrap();
        Position {
            span: Span::new(start, start + needle.len()),
            line: LineIndex::new(source).line_of(start),
            in_block,
            block_end: None,
            class_name: "A".to_string(),
        }
    }

    #[test]
    fn test_code_writer_nesting() {
        let mut w = CodeWriter::new();
        w.open("void f()").line("int a = 1;").open("if (a > 0)").line("a--;").close().close();
        assert_eq!(
            w.finish(),
            "void f() {\n    int a = 1;\n    if (a > 0) {\n        a--;\n    }\n}\n"
        );
    }

    #[test]
    fn test_replace_statement_keeps_indentation() {
        let source = "class A {\n    void f() {\n        x.par().foreach(v -> {});\n    }\n}\n";
        let mut rewriter = SourceRewriter::new(source);
        rewriter.replace_statement(
            &position(source, "x.par().foreach(v -> {});", true),
            &["first();".to_string(), "second();".to_string()],
        );
        assert_eq!(
            rewriter.finish().unwrap(),
            "class A {\n    void f() {\n        first();\n        second();\n    }\n}\n"
        );
    }

    #[test]
    fn test_unbraced_body_gets_braces() {
        let source = "class A {\n    void f() {\n        if (c)\n            go();\n    }\n}\n";
        let mut rewriter = SourceRewriter::new(source);
        rewriter.replace_statement(
            &position(source, "go();", false),
            &["a();".to_string(), "b();".to_string()],
        );
        assert_eq!(
            rewriter.finish().unwrap(),
            "class A {\n    void f() {\n        if (c)\n            {\n                a();\n                b();\n            }\n    }\n}\n"
        );
    }

    #[test]
    fn test_remove_line_and_insert_members() {
        let source = "import a.B;\nimport c.D;\n\nclass A {\n    int x;\n}\n";
        let mut rewriter = SourceRewriter::new(source);
        let start = source.find("import a.B;").unwrap();
        rewriter.remove_line(Span::new(start, start + "import a.B;".len()));
        let brace = source.find('{').unwrap() + 1;
        rewriter.insert_members(brace, &["private int y;".to_string(), String::new()]);
        assert_eq!(
            rewriter.finish().unwrap(),
            "import c.D;\n\nclass A {\n    private int y;\n\n    int x;\n}\n"
        );
    }

    #[test]
    fn test_guard_wraps_rest_of_block() {
        let source = "class A {\n    int f() {\n        Handle h = open();\n        use(h);\n\n        return 1;\n    }\n}\n";
        let mut rewriter = SourceRewriter::new(source);
        let mut declared = position(source, "Handle h = open();", true);
        declared.block_end = Some(source.rfind("    }").unwrap() + 4);
        rewriter.replace_statement(&declared, &["long h = open();".to_string()]);
        assert!(rewriter.guard(&declared, "close(h);"));
        assert_eq!(
            rewriter.finish().unwrap(),
            "class A {\n    int f() {\n        long h = open();\n        try {\n            use(h);\n\n            return 1;\n        } finally {\n            close(h);\n        }\n    }\n}\n"
        );
    }

    #[test]
    fn test_guard_needs_a_block_closing_on_its_own_line() {
        let source = "class A { void f() { Handle h = open(); use(h); } }";
        let mut rewriter = SourceRewriter::new(source);
        let mut declared = position(source, "Handle h = open();", true);
        declared.block_end = Some(source.rfind("} }").unwrap());
        assert!(!rewriter.guard(&declared, "close(h);"));
        assert!(!rewriter.guard(&position(source, "use(h);", false), "close(h);"));
        assert_eq!(rewriter.finish().unwrap(), source);
    }

    #[test]
    fn test_overlapping_edits_are_rejected() {
        let source = "class A { int x; }";
        let mut rewriter = SourceRewriter::new(source);
        rewriter.replace(Span::new(10, 16), "a");
        rewriter.replace(Span::new(12, 14), "b");
        assert!(rewriter.finish().is_err());
    }

    #[test]
    fn test_java_string() {
        assert_eq!(java_string("a\"b\\c"), "\"a\\\"b\\\\c\"");
    }
}
