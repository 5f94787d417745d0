pub mod classifier;
pub mod detector;
pub mod scope;
pub mod symbol;

pub use classifier::OperationClassifier;
pub use detector::PatternDetector;
pub use scope::ScopeResolver;
pub use symbol::{ScopeTree, Symbol, SymbolId, SymbolKind};

use crate::diagnostics::LineIndex;
use crate::error::CompileResult;
use crate::ir::FileIr;
use crate::parser::{self, CompilationUnit};
use crate::registry::LibraryRegistry;

/// Sequential ids shared by every file compiled in one run.
#[derive(Debug, Default, Clone)]
pub struct SequenceCounter {
    last: usize,
}

impl SequenceCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&mut self) -> usize {
        self.last += 1;
        self.last
    }

    /// The most recently issued id, 0 before the first.
    pub fn current(&self) -> usize {
        self.last
    }
}

/// Front half of the pipeline: parse, resolve scopes, detect DSL usage and
/// classify operations.
#[derive(Debug, Clone, Copy, Default)]
pub struct SourceAnalyzer {
    registry: LibraryRegistry,
}

impl SourceAnalyzer {
    pub fn new(registry: LibraryRegistry) -> Self {
        Self { registry }
    }

    pub fn analyze(&self, source: &str, class_name: &str, counter: &mut SequenceCounter) -> CompileResult<FileIr> {
        let unit = parser::parse_source(source)?;
        self.analyze_unit(&unit, source, class_name, counter)
    }

    pub fn analyze_unit(
        &self,
        unit: &CompilationUnit,
        source: &str,
        class_name: &str,
        counter: &mut SequenceCounter,
    ) -> CompileResult<FileIr> {
        let lines = LineIndex::new(source);
        let tree = ScopeResolver::new(&self.registry, source, &lines).resolve(unit)?;
        let mut ir = PatternDetector::new(&self.registry, &tree, source, &lines, counter)
            .detect(unit, class_name)?;
        OperationClassifier::apply(&mut ir);
        log::info!(
            "analyzed {}: {} operation(s), {} bind(s)",
            ir.class_name,
            ir.operations().count(),
            ir.nodes.len() - ir.operations().count()
        );
        Ok(ir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::Severity;
    use crate::error::CompileError;
    use crate::ir::*;
    use crate::registry::OperationKind;

    fn wrap(body: &str) -> String {
        format!(
            "package org.example;\n\nimport org.parallelme.userlibrary.Array;\nimport org.parallelme.userlibrary.datatype.Int32;\n\npublic class Sample {{\n    public void run(final int[] data) {{\n{}\n    }}\n}}\n",
            body
        )
    }

    fn analyze(source: &str) -> CompileResult<FileIr> {
        SourceAnalyzer::default().analyze(source, "Sample", &mut SequenceCounter::new())
    }

    fn operation(ir: &FileIr) -> &Operation {
        ir.operations().next().expect("an operation")
    }

    #[test]
    fn test_immutable_input_gives_bind_then_parallel_foreach() {
        let source = wrap(
            "        Array<Int32> a = new Array<>(data, Int32.class);\n        a.par().foreach(x -> { x.value = x.value + 1; });",
        );
        let ir = analyze(&source).unwrap();
        assert_eq!(ir.nodes.len(), 2);
        let IrNode::InputBind(bind) = &ir.nodes[0] else {
            panic!("expected input bind first");
        };
        assert_eq!(bind.id, 1);
        assert!(bind.declares_target);
        assert_eq!(bind.arguments[0].kind, ArgumentKind::Variable);
        assert_eq!(bind.arguments[0].type_name.as_deref(), Some("int[]"));
        assert_eq!(bind.arguments[1].kind, ArgumentKind::ClassLiteral);
        let op = operation(&ir);
        assert_eq!(op.id, 2);
        assert_eq!(op.kind, OperationKind::Foreach);
        assert_eq!(op.execution, ExecutionType::Parallel);
        assert!(op.captures.is_empty());
        assert!(ir.diagnostics.is_empty());
        assert_eq!(ir.removed_imports.len(), 1);
    }

    #[test]
    fn test_mutable_capture_makes_operation_sequential() {
        let source = wrap(
            "        int threshold = 3;\n        Array<Int32> a = new Array<>(data, Int32.class);\n        a.par().foreach(x -> {\n            if (x.value > threshold) x.value = threshold;\n        });",
        );
        let ir = analyze(&source).unwrap();
        let op = operation(&ir);
        assert_eq!(op.execution, ExecutionType::Sequential);
        assert_eq!(op.captures.len(), 1);
        assert_eq!(op.captures[0].name, "threshold");
        let warning = &ir.diagnostics[0];
        assert_eq!(warning.severity, Severity::Warning);
        assert_eq!(warning.line, 10);
        assert_eq!(op.position.line, 10);
    }

    #[test]
    fn test_captures_are_deduplicated_in_first_use_order() {
        let source = wrap(
            "        final int b = 1;\n        final int c = 2;\n        Array<Int32> a = new Array<>(data, Int32.class);\n        a.par().foreach(x -> { int tmp = c; x.value = b + c + tmp + b; });",
        );
        let ir = analyze(&source).unwrap();
        let names: Vec<_> = operation(&ir).captures.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["c", "b"]);
        assert_eq!(operation(&ir).execution, ExecutionType::Parallel);
    }

    #[test]
    fn test_reduce_map_filter_and_output_binds() {
        let source = wrap(
            "        Array<Int32> a = new Array<>(data, Int32.class);\n        Array<Int32> b;\n        b = a.par().filter(x -> x.value > 0);\n        Array<Int32> m = b.par().map(Int32.class, x -> { return new Int32(x.value * 2); });\n        Int32 sum = m.par().reduce((x, y) -> new Int32(x.value + y.value));\n        int[] out = m.toJavaArray();\n        out = (int[]) m.toJavaArray();\n        m.toJavaArray(out);\n        int n = a.length();",
        );
        let ir = analyze(&source).unwrap();
        let ids: Vec<_> = ir.nodes.iter().map(|n| n.id()).collect();
        assert_eq!(ids, (1..=8).collect::<Vec<_>>());
        let kinds: Vec<_> = ir.operations().map(|o| o.kind).collect();
        assert_eq!(
            kinds,
            vec![OperationKind::Filter, OperationKind::Map, OperationKind::Reduce]
        );
        let shapes: Vec<_> = ir
            .nodes
            .iter()
            .filter_map(|n| match n {
                IrNode::OutputBind(b) => Some((b.shape, b.cast.clone())),
                _ => None,
            })
            .collect();
        assert_eq!(
            shapes,
            vec![
                (BindShape::DeclarativeAssignment, None),
                (BindShape::Assignment, Some("int[]".to_string())),
                (BindShape::None, None),
            ]
        );
        assert!(matches!(ir.nodes.last(), Some(IrNode::MethodCall(call)) if call.method == "length"));
        assert_eq!(ir.declarations.len(), 1);
    }

    #[test]
    fn test_unknown_operation_and_wrong_arity_are_structural() {
        for body in [
            "        Array<Int32> a = new Array<>(data, Int32.class);\n        a.par().sort(x -> x);",
            "        Array<Int32> a = new Array<>(data, Int32.class);\n        Int32 r = a.par().reduce(x -> x);",
            "        Array<Int32> a = new Array<>(data, Int32.class);\n        a.par();",
            "        Array<Int32> a = new Array<>(data, Int32.class);\n        Object o = a;",
            "        Array<Int32> a = new Array<>(data, Float32.class);",
        ] {
            let err = analyze(&wrap(body)).unwrap_err();
            assert!(matches!(err, CompileError::Structural { .. }), "{:?}", err);
        }
    }

    #[test]
    fn test_library_variable_inside_body_is_rejected() {
        let source = wrap(
            "        Array<Int32> a = new Array<>(data, Int32.class);\n        Array<Int32> b = new Array<>(data, Int32.class);\n        a.par().foreach(x -> { x.value = b.length(); });",
        );
        assert!(matches!(analyze(&source), Err(CompileError::Structural { line: 10, .. })));
    }

    #[test]
    fn test_unbraced_statement_position() {
        let source = wrap(
            "        Array<Int32> a = new Array<>(data, Int32.class);\n        if (data.length > 0)\n            a.par().foreach(x -> { x.value = 0; });",
        );
        let ir = analyze(&source).unwrap();
        assert!(!operation(&ir).position.in_block);
        assert!(matches!(&ir.nodes[0], IrNode::InputBind(b) if b.position.in_block));
    }

    #[test]
    fn test_sequence_counter_continues_across_files() {
        let analyzer = SourceAnalyzer::default();
        let mut counter = SequenceCounter::new();
        let source = wrap(
            "        Array<Int32> a = new Array<>(data, Int32.class);\n        a.par().foreach(x -> { x.value = 1; });",
        );
        analyzer.analyze(&source, "Sample", &mut counter).unwrap();
        let second = analyzer.analyze(&source, "Sample", &mut counter).unwrap();
        let ids: Vec<_> = second.nodes.iter().map(|n| n.id()).collect();
        assert_eq!(ids, vec![3, 4]);
        assert_eq!(counter.current(), 4);
    }
}
