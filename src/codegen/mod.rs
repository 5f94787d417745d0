//! Backend-independent code generation: kernel AST, rendering, naming, user
//! function lowering, work decomposition and the host rewrite driver.

pub mod host;
pub mod kernel_ast;
pub mod lowering;
pub mod naming;
pub mod render;
pub mod tiling;

use std::collections::HashSet;
use std::path::PathBuf;

use crate::error::CompileResult;
use crate::ir::*;
use crate::registry::{LibraryRegistry, OperationKind};

use self::host::{CodeWriter, SourceRewriter};
use self::kernel_ast::KernelModule;
use self::naming::NamingScheme;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileKind {
    /// Rewritten host source.
    Host,
    /// Kernel script or kernel source header.
    Kernel,
    /// JNI glue.
    Native,
    /// Shared runtime and build files, written once per run.
    Support,
}

/// A generated file, relative to the output directory.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedFile {
    pub path: PathBuf,
    pub kind: FileKind,
    pub contents: String,
}

impl GeneratedFile {
    pub fn new(path: impl Into<PathBuf>, kind: FileKind, contents: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind,
            contents: contents.into(),
        }
    }
}

/// Per-file state shared between the translator hooks.
pub struct TranslationUnit<'a> {
    pub ir: &'a FileIr,
    pub naming: &'a NamingScheme,
    pub registry: &'a LibraryRegistry,
    /// Device code accumulated for the whole file.
    pub kernels: KernelModule,
    /// Native glue accumulated for the whole file.
    pub native: CodeWriter,
    /// Additional host members keyed by class binary name.
    members: Vec<(String, Vec<String>)>,
    /// Symbols that may hold an empty filter result.
    maybe_empty: HashSet<usize>,
}

impl<'a> TranslationUnit<'a> {
    pub fn new(ir: &'a FileIr, naming: &'a NamingScheme, registry: &'a LibraryRegistry) -> Self {
        Self {
            ir,
            naming,
            registry,
            kernels: KernelModule::new(),
            native: CodeWriter::new(),
            members: Vec::new(),
            maybe_empty: HashSet::new(),
        }
    }

    pub fn class_name(&self) -> &str {
        &self.ir.class_name
    }

    /// Directory of the file's package, relative to the output root.
    pub fn package_dir(&self) -> PathBuf {
        self.ir
            .package
            .as_deref()
            .map(|p| p.split('.').collect())
            .unwrap_or_default()
    }

    pub fn add_member(&mut self, class: &str, lines: Vec<String>) {
        match self.members.iter_mut().find(|(name, _)| name == class) {
            Some((_, members)) => {
                members.push(String::new());
                members.extend(lines);
            }
            None => self.members.push((class.to_string(), lines)),
        }
    }

    pub fn members(&self, class: &str) -> &[String] {
        self.members
            .iter()
            .find(|(name, _)| name == class)
            .map(|(_, members)| members.as_slice())
            .unwrap_or(&[])
    }

    pub fn mark_maybe_empty(&mut self, variable: &Variable) {
        self.maybe_empty.insert(variable.symbol_id);
    }

    pub fn is_maybe_empty(&self, variable: &Variable) -> bool {
        self.maybe_empty.contains(&variable.symbol_id)
    }
}

/// One code generation target. Hooks are called in sequential-id order and
/// return host statements (one per line) or expressions replacing the
/// original DSL construct.
pub trait BackendTranslator {
    fn name(&self) -> &'static str;

    /// Imports added to every rewritten host file that uses the DSL.
    fn host_imports(&self) -> &'static [&'static str] {
        &[]
    }

    /// Replacement for a library declaration without initializer, starting at
    /// its declared type.
    fn declaration(&self, unit: &mut TranslationUnit, decl: &LibraryDeclaration) -> CompileResult<String>;

    fn input_bind(&self, unit: &mut TranslationUnit, bind: &InputBind) -> CompileResult<Vec<String>>;

    fn output_bind(&self, unit: &mut TranslationUnit, bind: &OutputBind) -> CompileResult<Vec<String>>;

    fn operation(&self, unit: &mut TranslationUnit, op: &Operation) -> CompileResult<Vec<String>>;

    /// Expression replacing the library method call.
    fn method_call(&self, unit: &mut TranslationUnit, call: &MethodCall) -> CompileResult<String>;

    /// Statement freeing the handle held by a local library variable when its
    /// block is left. Targets whose handles are garbage collected have none.
    fn release(&self, _unit: &TranslationUnit, _variable: &Variable) -> Option<String> {
        None
    }

    /// One-time members inserted at the top of `class`.
    fn class_members(&self, unit: &TranslationUnit, class: &ClassBody) -> Vec<String>;

    /// Kernel and native sources for the whole file.
    fn device_files(&self, unit: TranslationUnit) -> CompileResult<Vec<GeneratedFile>>;

    /// Files shared by every compiled source, written once per run.
    fn support_files(&self) -> Vec<GeneratedFile> {
        Vec::new()
    }
}

/// Rewrites `source` and generates the device files for its IR.
pub fn translate_file(
    backend: &dyn BackendTranslator,
    ir: &FileIr,
    source: &str,
    naming: &NamingScheme,
    registry: &LibraryRegistry,
) -> CompileResult<Vec<GeneratedFile>> {
    let mut unit = TranslationUnit::new(ir, naming, registry);
    let mut rewriter = SourceRewriter::new(source);

    for import in &ir.removed_imports {
        rewriter.remove_line(*import);
    }
    if ir.has_dsl_usage() {
        add_imports(&mut rewriter, ir, backend.host_imports());
    }
    for decl in &ir.declarations {
        let text = backend.declaration(&mut unit, decl)?;
        rewriter.replace(decl.span, text);
    }
    for node in &ir.nodes {
        log::debug!("{}: {}", backend.name(), node.describe());
        match node {
            IrNode::InputBind(bind) => {
                let lines = backend.input_bind(&mut unit, bind)?;
                rewriter.replace_statement(&bind.position, &lines);
                if bind.declares_target {
                    guard_handle(backend, &unit, &mut rewriter, &bind.position, &bind.target.variable);
                }
            }
            IrNode::OutputBind(bind) => {
                let lines = backend.output_bind(&mut unit, bind)?;
                rewriter.replace_statement(&bind.position, &lines);
            }
            IrNode::Operation(op) => {
                let lines = backend.operation(&mut unit, op)?;
                rewriter.replace_statement(&op.position, &lines);
                match (&op.destination, op.kind) {
                    (Some(destination), OperationKind::Map | OperationKind::Filter) if op.declares_destination => {
                        guard_handle(backend, &unit, &mut rewriter, &op.position, destination);
                    }
                    _ => {}
                }
            }
            IrNode::MethodCall(call) => {
                let text = backend.method_call(&mut unit, call)?;
                rewriter.replace(call.position.span, text);
            }
        }
    }
    for class in &ir.classes {
        let members = backend.class_members(&unit, class);
        rewriter.insert_members(class.insert_at, &members);
    }

    let host = rewriter.finish()?;
    let host_path = unit.package_dir().join(format!("{}.java", ir.class_name));
    let mut files = vec![GeneratedFile::new(host_path, FileKind::Host, host)];
    if ir.has_dsl_usage() {
        files.extend(backend.device_files(unit)?);
    }
    Ok(files)
}

/// Frees the handle `variable` declares at `position` when its block is left.
fn guard_handle(
    backend: &dyn BackendTranslator,
    unit: &TranslationUnit,
    rewriter: &mut SourceRewriter,
    position: &Position,
    variable: &Variable,
) {
    let Some(release) = backend.release(unit, variable) else {
        return;
    };
    if !rewriter.guard(position, release) {
        log::warn!(
            "line {}: `{}` is not released by the generated code",
            position.line,
            variable.name
        );
    }
}

fn add_imports(rewriter: &mut SourceRewriter, ir: &FileIr, imports: &[&str]) {
    if imports.is_empty() {
        return;
    }
    let lines: String = imports.iter().map(|i| format!("import {};\n", i)).collect();
    match (ir.first_import, ir.package_end) {
        (Some(at), _) => rewriter.insert(at, lines),
        (None, Some(at)) => rewriter.insert(at, format!("\n\n{}", lines.trim_end())),
        (None, None) => rewriter.insert(0, format!("{}\n", lines)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_members_accumulate_per_class() {
        let ir = FileIr::default();
        let naming = NamingScheme::default();
        let registry = LibraryRegistry::new();
        let mut unit = TranslationUnit::new(&ir, &naming, &registry);
        unit.add_member("A", vec!["int a;".to_string()]);
        unit.add_member("A$B", vec!["int b;".to_string()]);
        unit.add_member("A", vec!["int c;".to_string()]);
        assert_eq!(unit.members("A"), ["int a;", "", "int c;"]);
        assert_eq!(unit.members("A$B"), ["int b;"]);
        assert!(unit.members("C").is_empty());
    }

    #[test]
    fn test_package_dir() {
        let ir = FileIr {
            package: Some("org.example.app".to_string()),
            ..FileIr::default()
        };
        let naming = NamingScheme::default();
        let registry = LibraryRegistry::new();
        let unit = TranslationUnit::new(&ir, &naming, &registry);
        assert_eq!(unit.package_dir(), PathBuf::from("org/example/app"));
    }
}
