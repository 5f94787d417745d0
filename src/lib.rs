pub mod analyzer;
pub mod backend;
pub mod codegen;
pub mod diagnostics;
pub mod driver;
pub mod error;
pub mod ir;
pub mod parser;
pub mod registry;

pub use analyzer::{SequenceCounter, SourceAnalyzer};
pub use backend::TargetBackend;
pub use codegen::{FileKind, GeneratedFile};
pub use diagnostics::{Diagnostic, Severity};
pub use error::{CompileError, CompileResult};
pub use ir::FileIr;

use codegen::naming::{NamingScheme, DEFAULT_PREFIX};
use codegen::BackendTranslator;
use registry::{LibraryRegistry, DSL_PACKAGE};

/// High-level interface: compiles DSL sources one at a time, sharing the
/// sequence counter across every file of a run.
pub struct ParallelCompiler {
    config: CompilerConfig,
    analyzer: SourceAnalyzer,
    registry: LibraryRegistry,
    naming: NamingScheme,
    translator: Box<dyn BackendTranslator>,
    counter: SequenceCounter,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompilerConfig {
    pub target: TargetBackend,
    /// Prefix of every generated identifier.
    pub identifier_prefix: String,
    /// Sources that never mention this package are passed through untouched.
    pub dsl_package: String,
    pub emit_support_files: bool,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            target: TargetBackend::default(),
            identifier_prefix: DEFAULT_PREFIX.to_string(),
            dsl_package: DSL_PACKAGE.to_string(),
            emit_support_files: true,
        }
    }
}

/// Output of one compiled source file.
#[derive(Debug, Clone)]
pub struct CompiledFile {
    pub class_name: String,
    /// `None` when the file was passed through without analysis.
    pub ir: Option<FileIr>,
    pub files: Vec<GeneratedFile>,
}

impl CompiledFile {
    pub fn host(&self) -> Option<&GeneratedFile> {
        self.files.iter().find(|f| f.kind == FileKind::Host)
    }

    pub fn device_files(&self) -> impl Iterator<Item = &GeneratedFile> {
        self.files.iter().filter(|f| f.kind != FileKind::Host)
    }

    pub fn uses_dsl(&self) -> bool {
        self.ir.as_ref().map_or(false, FileIr::has_dsl_usage)
    }
}

impl ParallelCompiler {
    pub fn new() -> Self {
        Self::with_config(CompilerConfig::default())
    }

    pub fn with_config(config: CompilerConfig) -> Self {
        let registry = LibraryRegistry::new();
        Self {
            analyzer: SourceAnalyzer::new(registry),
            registry,
            naming: NamingScheme::new(config.identifier_prefix.clone()),
            translator: config.target.translator(),
            counter: SequenceCounter::new(),
            config,
        }
    }

    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    /// Analyzes and translates one source whose public class is `class_name`.
    pub fn compile_source(&mut self, source: &str, class_name: &str) -> CompileResult<CompiledFile> {
        if !source.contains(self.config.dsl_package.as_str()) {
            log::debug!("{} does not use {}, passing through", class_name, self.config.dsl_package);
            let mut path: std::path::PathBuf = declared_package(source)
                .map(|p| p.split('.').collect())
                .unwrap_or_default();
            path.push(format!("{}.java", class_name));
            return Ok(CompiledFile {
                class_name: class_name.to_string(),
                ir: None,
                files: vec![GeneratedFile::new(path, FileKind::Host, source)],
            });
        }

        let ir = self.analyzer.analyze(source, class_name, &mut self.counter)?;
        for diagnostic in &ir.diagnostics {
            log::debug!("{}: {}", class_name, diagnostic);
        }
        let files = codegen::translate_file(
            self.translator.as_ref(),
            &ir,
            source,
            &self.naming,
            &self.registry,
        )?;
        log::info!(
            "translated {} with the {} backend into {} file(s)",
            class_name,
            self.translator.name(),
            files.len()
        );
        Ok(CompiledFile {
            class_name: class_name.to_string(),
            ir: Some(ir),
            files,
        })
    }

    /// Runtime and build files of the selected backend, when enabled.
    pub fn support_files(&self) -> Vec<GeneratedFile> {
        if self.config.emit_support_files {
            self.translator.support_files()
        } else {
            Vec::new()
        }
    }
}

impl Default for ParallelCompiler {
    fn default() -> Self {
        Self::new()
    }
}

/// `package a.b;` of a source, without parsing it.
fn declared_package(source: &str) -> Option<&str> {
    source.lines().map(str::trim).find_map(|line| {
        line.strip_prefix("package ")
            .and_then(|rest| rest.strip_suffix(';'))
            .map(str::trim)
    })
}

/// Convenience function for compiling a single source with `config`.
pub fn compile_source(source: &str, class_name: &str, config: CompilerConfig) -> CompileResult<CompiledFile> {
    ParallelCompiler::with_config(config).compile_source(source, class_name)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "package org.example;\n\nimport org.parallelme.userlibrary.Array;\nimport org.parallelme.userlibrary.datatype.Int32;\n\npublic class Sample {\n    public void run(final int[] data) {\n        Array<Int32> a = new Array<Int32>(data, Int32.class);\n        a.par().foreach(x -> { x.value = x.value + 1; });\n    }\n}\n";

    #[test]
    fn test_source_without_dsl_passes_through() {
        let source = "package org.example.util;\n\npublic class Plain {\n    int f() { return 1; }\n}\n";
        let compiled = compile_source(source, "Plain", CompilerConfig::default()).unwrap();
        assert!(compiled.ir.is_none());
        assert!(!compiled.uses_dsl());
        let host = compiled.host().unwrap();
        assert_eq!(host.path, std::path::PathBuf::from("org/example/util/Plain.java"));
        assert_eq!(host.contents, source);
    }

    #[test]
    fn test_ids_continue_across_files() {
        let mut compiler = ParallelCompiler::new();
        let first = compiler.compile_source(SAMPLE, "Sample").unwrap();
        let second = compiler.compile_source(SAMPLE, "Sample").unwrap();
        let ids = |c: &CompiledFile| -> Vec<usize> {
            c.ir.as_ref().unwrap().nodes.iter().map(|n| n.id()).collect()
        };
        assert_eq!(ids(&first), [1, 2]);
        assert_eq!(ids(&second), [3, 4]);
    }

    #[test]
    fn test_prefix_and_target_come_from_config() {
        let config = CompilerConfig {
            target: TargetBackend::Native,
            identifier_prefix: "GEN_".to_string(),
            ..CompilerConfig::default()
        };
        let compiled = compile_source(SAMPLE, "Sample", config).unwrap();
        let host = compiled.host().unwrap();
        assert!(host.contents.contains("GEN_foreach2(GEN_runtime, a);"), "{}", host.contents);
        assert_eq!(compiled.device_files().count(), 2);
    }

    #[test]
    fn test_support_files_can_be_disabled() {
        let config = CompilerConfig {
            target: TargetBackend::Native,
            emit_support_files: false,
            ..CompilerConfig::default()
        };
        assert!(ParallelCompiler::with_config(config).support_files().is_empty());
        let native = CompilerConfig {
            target: TargetBackend::Native,
            ..CompilerConfig::default()
        };
        assert_eq!(ParallelCompiler::with_config(native).support_files().len(), 3);
    }

    #[test]
    fn test_bind_then_output_leaves_no_library_types() {
        let source = "package org.example;\n\nimport org.parallelme.userlibrary.Array;\nimport org.parallelme.userlibrary.datatype.Float32;\n\npublic class Copy {\n    public float[] run(final float[] data) {\n        Array<Float32> a = new Array<Float32>(data, Float32.class);\n        float[] out = a.toJavaArray();\n        return out;\n    }\n}\n";
        for target in [TargetBackend::RenderScript, TargetBackend::Native] {
            let config = CompilerConfig {
                target,
                ..CompilerConfig::default()
            };
            let compiled = compile_source(source, "Copy", config).unwrap();
            let nodes = &compiled.ir.as_ref().unwrap().nodes;
            assert!(matches!(nodes[..], [ir::IrNode::InputBind(_), ir::IrNode::OutputBind(_)]));
            let host = &compiled.host().unwrap().contents;
            assert!(!host.contains("Array<"), "{:?}: {}", target, host);
            assert!(!host.contains("new Array"), "{:?}: {}", target, host);
            assert!(!host.contains("userlibrary.Array"), "{:?}: {}", target, host);
            assert!(!host.contains("toJavaArray"), "{:?}: {}", target, host);
            assert!(host.contains("float[] out = new float["), "{:?}: {}", target, host);
        }
    }

    #[test]
    fn test_declared_package() {
        assert_eq!(declared_package("// x\npackage a.b;\nclass C {}"), Some("a.b"));
        assert_eq!(declared_package("class C {}"), None);
    }
}
