use anyhow::{Context, Result};
use clap::error::ErrorKind;
use clap::{ArgAction, CommandFactory, Parser, ValueEnum};

use std::path::PathBuf;

use parallelme::codegen::FileKind;
use parallelme::driver;
use parallelme::ir::IrNode;
use parallelme::{CompilerConfig, ParallelCompiler, TargetBackend};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Java sources or directories to compile, separated by `;`
    #[arg(short, long)]
    files: String,

    /// Output directory for the rewritten and generated sources
    #[arg(short, long)]
    output: PathBuf,

    /// Code generation target
    #[arg(short, long, value_enum, default_value_t = Target::Renderscript)]
    target: Target,

    // verbose mode (-v, -vv, -vvv)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    /// Prefix of every generated identifier
    #[arg(long, default_value = "PM_")]
    prefix: String,

    /// Do not write the backend's runtime and build files
    #[arg(long)]
    no_support_files: bool,

    /// Print the IR of every compiled file to stdout
    #[arg(long)]
    print_ir: bool,

    /// List the operations found in every compiled file
    #[arg(long)]
    list_operations: bool,

    /// Print the rewritten host sources to stdout
    #[arg(long)]
    emit_host: bool,

    /// Print the generated kernel and native sources to stdout
    #[arg(long)]
    emit_kernels: bool,
}

/// Target backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Target {
    /// RenderScript kernels driven from Java
    #[value(alias = "rs")]
    Renderscript,
    /// OpenCL kernels behind JNI
    #[value(alias = "opencl")]
    Native,
}

impl From<Target> for TargetBackend {
    fn from(target: Target) -> Self {
        match target {
            Target::Renderscript => TargetBackend::RenderScript,
            Target::Native => TargetBackend::Native,
        }
    }
}

fn print_section_header(title: &str) {
    println!("\n\x1b[1;35m=== {} ===\x1b[0m", title);
}

fn validate_identifier_prefix(prefix: &str) -> bool {
    let mut chars = prefix.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn main() -> Result<()> {
    let args = Args::parse();

    env_logger::Builder::new()
        .filter_level(match args.verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            2 => log::LevelFilter::Debug,
            _ => log::LevelFilter::Trace,
        })
        .format(|buf, record| {
            use std::io::Write;
            let level_color = match record.level() {
                log::Level::Error => "\x1b[1;31m",
                log::Level::Warn => "\x1b[1;33m",
                log::Level::Info => "\x1b[1;32m",
                log::Level::Debug => "\x1b[1;36m",
                log::Level::Trace => "\x1b[1;37m",
            };
            writeln!(
                buf,
                "{}{:<5}\x1b[0m {}",
                level_color,
                record.level(),
                record.args()
            )
        })
        .init();

    let inputs = driver::split_inputs(&args.files);
    if inputs.is_empty() {
        Args::command()
            .error(ErrorKind::ValueValidation, "--files lists no input")
            .exit();
    }
    if !validate_identifier_prefix(&args.prefix) {
        Args::command()
            .error(
                ErrorKind::ValueValidation,
                format!("--prefix `{}` is not a valid identifier", args.prefix),
            )
            .exit();
    }
    let sources = match driver::collect_sources(&inputs) {
        Ok(sources) => sources,
        Err(err) => Args::command()
            .error(ErrorKind::ValueValidation, format!("{:#}", err))
            .exit(),
    };
    if let Err(err) = driver::check_output(&inputs, &args.output) {
        Args::command()
            .error(ErrorKind::ArgumentConflict, format!("{:#}", err))
            .exit();
    }
    log::info!("{} source file(s) to compile", sources.len());

    let config = CompilerConfig {
        target: args.target.into(),
        identifier_prefix: args.prefix.clone(),
        emit_support_files: !args.no_support_files,
        ..CompilerConfig::default()
    };
    let mut compiler = ParallelCompiler::with_config(config);
    let report = driver::run(&mut compiler, &sources, &args.output)
        .context("Failed to compile the input files")?;

    for compiled in &report.compiled {
        let Some(ir) = &compiled.ir else { continue };
        if args.print_ir {
            print_section_header(&format!("IR: {}", compiled.class_name));
            for node in &ir.nodes {
                println!("{}", node.describe());
            }
            for diagnostic in &ir.diagnostics {
                println!("{}", diagnostic);
            }
        }
        if args.list_operations {
            print_section_header(&format!("Operations: {}", compiled.class_name));
            for node in &ir.nodes {
                if let IrNode::Operation(op) = node {
                    println!(
                        "{}\t{}\t{}\tline {}",
                        op.id, op.kind, op.execution, op.position.line
                    );
                }
            }
        }
    }
    for compiled in &report.compiled {
        for file in &compiled.files {
            let wanted = match file.kind {
                FileKind::Host => args.emit_host,
                FileKind::Kernel | FileKind::Native => args.emit_kernels,
                FileKind::Support => false,
            };
            if wanted {
                print_section_header(&file.path.display().to_string());
                print!("{}", file.contents);
            }
        }
    }

    if !report.is_success() {
        for (path, err) in &report.failed {
            eprintln!("{}: {:#}", path.display(), err);
        }
        anyhow::bail!(
            "{} of {} file(s) failed to compile",
            report.failed.len(),
            sources.len()
        );
    }
    log::info!("wrote {} file(s) to {:?}", report.written.len(), args.output);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_parse() {
        let args = Args::try_parse_from([
            "parallelme", "-f", "A.java;src", "-o", "out", "-t", "native", "-vv",
        ])
        .unwrap();
        assert_eq!(args.target, Target::Native);
        assert_eq!(args.verbose, 2);
        assert_eq!(args.prefix, "PM_");
        assert!(Args::try_parse_from(["parallelme", "-o", "out"]).is_err());
        assert!(Args::try_parse_from(["parallelme", "-f", "a", "-o", "o", "-t", "metal"]).is_err());
    }

    #[test]
    fn test_identifier_prefix() {
        assert!(validate_identifier_prefix("PM_"));
        assert!(validate_identifier_prefix("_x1"));
        assert!(!validate_identifier_prefix("1x"));
        assert!(!validate_identifier_prefix("a-b"));
        assert!(!validate_identifier_prefix(""));
    }

    #[test]
    fn test_command_is_well_formed() {
        Args::command().debug_assert();
    }
}
