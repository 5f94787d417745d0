pub mod host_ast;
pub mod host_parser;

pub use host_ast::*;

use crate::error::{CompileError, CompileResult};

/// Parse a whole Java source file into a compilation unit.
pub fn parse_source(source: &str) -> CompileResult<CompilationUnit> {
    host_parser::java_parser::compilation_unit(source).map_err(|e| {
        log::debug!("parse failed at {}: {}", e.location, e.expected);
        CompileError::Parse {
            line: e.location.line,
            column: e.location.column,
            expected: e.expected.to_string(),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_class() {
        let source = r#"
package org.example;

import org.parallelme.userlibrary.Array;
import org.parallelme.userlibrary.datatype.*;

public class Sample {
    private Array<Int32> values;

    public void run(int[] data) {
        values = new Array<Int32>(data, Int32.class);
        values.par().foreach(x -> {
            x.value = x.value * 2;
        });
    }
}
"#;
        let unit = parse_source(source).expect("source should parse");
        assert_eq!(unit.package.as_ref().unwrap().name, "org.example");
        assert_eq!(unit.imports.len(), 2);
        assert!(unit.imports[1].wildcard);
        let class = &unit.types[0];
        assert_eq!(class.name, "Sample");
        assert_eq!(class.members.len(), 2);
        assert_eq!(&source[class.body_span.start..class.body_span.start + 1], "{");
    }

    #[test]
    fn test_parse_error_reports_position() {
        let err = parse_source("class A {\n  void f() { int x = ; }\n}").unwrap_err();
        match err {
            CompileError::Parse { line, .. } => assert_eq!(line, 2),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_annotations_and_nested_classes() {
        let source = r#"
@SuppressWarnings("unchecked")
class Outer {
    @Override
    public String toString() { return "x"; }
    static class Inner {
        Inner() { super(); }
    }
    static { int a = 1; }
}
"#;
        let unit = parse_source(source).expect("source should parse");
        let outer = &unit.types[0];
        assert!(matches!(outer.members[1], Member::Class(_)));
        assert!(matches!(outer.members[2], Member::Initializer { is_static: true, .. }));
    }
}
