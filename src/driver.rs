//! Batch driver: expands the input list, compiles every source with one
//! compiler and writes the generated tree. A failing file is reported and
//! skipped; files written before it stay on disk.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

use crate::{CompiledFile, GeneratedFile, ParallelCompiler};

/// Everything one run produced.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub compiled: Vec<CompiledFile>,
    pub written: Vec<PathBuf>,
    pub failed: Vec<(PathBuf, anyhow::Error)>,
}

impl BatchReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Splits a `-f` value on `;`, dropping empty entries.
pub fn split_inputs(list: &str) -> Vec<PathBuf> {
    list.split(';')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(PathBuf::from)
        .collect()
}

/// Expands directories into the `.java` files below them, in name order.
pub fn collect_sources(inputs: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut sources = Vec::new();
    for input in inputs {
        if !input.exists() {
            bail!("input does not exist: {:?}", input);
        }
        if input.is_dir() {
            walk(input, &mut sources)?;
        } else {
            sources.push(input.clone());
        }
    }
    Ok(sources)
}

fn walk(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    let mut entries = fs::read_dir(dir)
        .with_context(|| format!("Failed to read directory {:?}", dir))?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<std::io::Result<Vec<_>>>()
        .with_context(|| format!("Failed to list directory {:?}", dir))?;
    entries.sort();
    for path in entries {
        if path.is_dir() {
            walk(&path, out)?;
        } else if path.extension().map_or(false, |ext| ext == "java") {
            out.push(path);
        }
    }
    Ok(())
}

/// The output directory may be neither an input nor the parent of inputs
/// it would overwrite.
pub fn check_output(inputs: &[PathBuf], output: &Path) -> Result<()> {
    let resolve = |path: &Path| path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    let output = resolve(output);
    if output.is_file() {
        bail!("output path exists but is not a directory: {:?}", output);
    }
    for input in inputs {
        if resolve(input) == output {
            bail!("output directory {:?} is also an input", output);
        }
    }
    Ok(())
}

fn write_file(root: &Path, file: &GeneratedFile) -> Result<PathBuf> {
    let path = root.join(&file.path);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {:?}", parent))?;
    }
    fs::write(&path, &file.contents).with_context(|| format!("Failed to write {:?}", path))?;
    log::debug!("wrote {:?}", path);
    Ok(path)
}

fn compile_one(compiler: &mut ParallelCompiler, path: &Path, output: &Path) -> Result<(CompiledFile, Vec<PathBuf>)> {
    let source = fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))?;
    let class_name = path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .with_context(|| format!("Source file has no usable name: {:?}", path))?;
    let compiled = compiler
        .compile_source(&source, class_name)
        .with_context(|| format!("Failed to compile {:?}", path))?;
    let written = compiled
        .files
        .iter()
        .map(|file| write_file(output, file))
        .collect::<Result<Vec<_>>>()?;
    Ok((compiled, written))
}

/// Compiles `sources` into `output`. Support files are written once, after
/// the first source that uses the DSL.
pub fn run(compiler: &mut ParallelCompiler, sources: &[PathBuf], output: &Path) -> Result<BatchReport> {
    fs::create_dir_all(output)
        .with_context(|| format!("Failed to create output directory {:?}", output))?;
    let mut report = BatchReport::default();
    let mut support_written = false;
    for path in sources {
        log::info!("compiling {:?}", path);
        match compile_one(compiler, path, output) {
            Ok((compiled, written)) => {
                report.written.extend(written);
                if compiled.uses_dsl() && !support_written {
                    for file in compiler.support_files() {
                        match write_file(output, &file) {
                            Ok(written) => report.written.push(written),
                            Err(err) => {
                                log::error!("{:#}", err);
                                report.failed.push((output.join(&file.path), err));
                            }
                        }
                    }
                    support_written = true;
                }
                report.compiled.push(compiled);
            }
            Err(err) => {
                log::error!("{:#}", err);
                report.failed.push((path.clone(), err));
            }
        }
    }
    log::info!(
        "{} file(s) compiled, {} failed, {} written",
        report.compiled.len(),
        report.failed.len(),
        report.written.len()
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CompilerConfig, TargetBackend};

    const GOOD: &str = "package org.example;\n\nimport org.parallelme.userlibrary.Array;\nimport org.parallelme.userlibrary.datatype.Int32;\n\npublic class Good {\n    public void run(final int[] data) {\n        Array<Int32> a = new Array<Int32>(data, Int32.class);\n        a.par().foreach(x -> { x.value = x.value + 1; });\n    }\n}\n";

    const BAD: &str = "package org.example;\n\nimport org.parallelme.userlibrary.Array;\n\npublic class Bad {\n    void run( {\n}\n";

    #[test]
    fn test_split_inputs() {
        assert_eq!(
            split_inputs("a.java; dir ;;b.java"),
            [PathBuf::from("a.java"), PathBuf::from("dir"), PathBuf::from("b.java")]
        );
    }

    #[test]
    fn test_collect_sources_recurses_in_name_order() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("pkg");
        fs::create_dir_all(&nested).unwrap();
        fs::write(nested.join("B.java"), "").unwrap();
        fs::write(dir.path().join("A.java"), "").unwrap();
        fs::write(dir.path().join("notes.txt"), "").unwrap();
        let sources = collect_sources(&[dir.path().to_path_buf()]).unwrap();
        assert_eq!(sources, [dir.path().join("A.java"), nested.join("B.java")]);
        assert!(collect_sources(&[dir.path().join("missing")]).is_err());
    }

    #[test]
    fn test_output_must_not_be_an_input() {
        let dir = tempfile::tempdir().unwrap();
        let inputs = [dir.path().to_path_buf()];
        assert!(check_output(&inputs, dir.path()).is_err());
        assert!(check_output(&inputs, &dir.path().join("out")).is_ok());
    }

    #[test]
    fn test_unwritable_support_file_is_reported_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let (input, output) = (dir.path().join("in"), dir.path().join("out"));
        fs::create_dir_all(&input).unwrap();
        fs::write(input.join("Good.java"), GOOD).unwrap();
        fs::write(input.join("Other.java"), GOOD.replace("class Good", "class Other")).unwrap();
        // A directory where the runtime header should go makes that write fail.
        fs::create_dir_all(output.join("jni/PMRuntime.hpp")).unwrap();

        let mut compiler = ParallelCompiler::with_config(CompilerConfig {
            target: TargetBackend::Native,
            ..CompilerConfig::default()
        });
        let sources = collect_sources(&[input]).unwrap();
        let report = run(&mut compiler, &sources, &output).unwrap();

        assert_eq!(report.failed.len(), 1);
        assert!(report.failed[0].0.ends_with("jni/PMRuntime.hpp"));
        assert_eq!(report.compiled.len(), 2);
        assert!(output.join("jni/Android.mk").is_file());
        assert!(output.join("org/example/Other.java").is_file());
    }

    #[test]
    fn test_failure_is_isolated_to_its_file() {
        let dir = tempfile::tempdir().unwrap();
        let (input, output) = (dir.path().join("in"), dir.path().join("out"));
        fs::create_dir_all(&input).unwrap();
        fs::write(input.join("Bad.java"), BAD).unwrap();
        fs::write(input.join("Good.java"), GOOD).unwrap();

        let mut compiler = ParallelCompiler::with_config(CompilerConfig {
            target: TargetBackend::Native,
            ..CompilerConfig::default()
        });
        let sources = collect_sources(&[input]).unwrap();
        let report = run(&mut compiler, &sources, &output).unwrap();

        assert!(!report.is_success());
        assert_eq!(report.failed.len(), 1);
        assert!(report.failed[0].0.ends_with("Bad.java"));
        assert_eq!(report.compiled.len(), 1);
        assert!(output.join("org/example/Good.java").is_file());
        assert!(output.join("jni/Good.cpp").is_file());
        assert!(output.join("jni/PMRuntime.hpp").is_file());
        assert!(!output.join("org/example/Bad.java").exists());
    }
}
