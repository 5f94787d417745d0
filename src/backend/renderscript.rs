//! RenderScript backend: library variables become `Allocation`s, user
//! functions and kernels go to a `ScriptC_<Class>` script.

use super::{host_value, java_primitive, rgbe_decode};
use crate::codegen::host::CodeWriter;
use crate::codegen::kernel_ast::*;
use crate::codegen::lowering::{lower_operation, KernelLanguage, LoweredFunction};
use crate::codegen::naming::Role;
use crate::codegen::render::{KernelDialect, KernelRenderer};
use crate::codegen::tiling;
use crate::codegen::{BackendTranslator, FileKind, GeneratedFile, TranslationUnit};
use crate::error::{CompileError, CompileResult};
use crate::ir::*;
use crate::registry::{ContainerKind, OperationKind};

pub struct RenderScriptDialect;

impl KernelDialect for RenderScriptDialect {
    fn scalar_name(&self, scalar: ScalarType) -> &'static str {
        match scalar {
            ScalarType::Bool => "bool",
            ScalarType::Char => "char",
            ScalarType::UChar => "uchar",
            ScalarType::Short => "short",
            ScalarType::Int => "int",
            ScalarType::UInt => "uint32_t",
            ScalarType::Long => "long",
            ScalarType::Float => "float",
            ScalarType::Double => "double",
        }
    }

    fn allocation_name(&self) -> &'static str {
        "rs_allocation"
    }

    fn address_space(&self, _space: AddressSpace) -> &'static str {
        ""
    }

    fn function_prefix(&self, function: &KFunction, return_type: &str) -> String {
        match function.kind {
            FunctionKind::Helper => format!("static {}", return_type),
            FunctionKind::Kernel => format!("{} __attribute__((kernel))", return_type),
            FunctionKind::Invokable => "void".to_string(),
        }
    }

    fn vector_literal(&self, ty: &str, items: &[String]) -> String {
        format!("({}){{{}}}", ty, items.join(", "))
    }
}

/// `rsGetElementAt_<t>` / `rsSetElementAt_<t>` suffix for a value type.
fn accessor(ty: &KType) -> String {
    RenderScriptDialect.type_name(ty)
}

fn get_element(ty: &KType, allocation: &str, index: Vec<KExpr>) -> KExpr {
    let mut args = vec![KExpr::ident(allocation)];
    args.extend(index);
    KExpr::call(format!("rsGetElementAt_{}", accessor(ty)), args)
}

fn set_element(ty: &KType, allocation: &str, value: KExpr, index: Vec<KExpr>) -> KStmt {
    let mut args = vec![KExpr::ident(allocation), value];
    args.extend(index);
    KStmt::expr(KExpr::call(format!("rsSetElementAt_{}", accessor(ty)), args))
}

fn dim(allocation: &str, axis: char) -> KExpr {
    KExpr::call(
        format!("rsAllocationGetDim{}", axis),
        vec![KExpr::ident(allocation)],
    )
}

/// Java `Element` factory for a value type.
fn element_factory(ty: &KType) -> Option<&'static str> {
    Some(match ty {
        KType::Scalar(ScalarType::Char) => "I8",
        KType::Scalar(ScalarType::Short) => "I16",
        KType::Scalar(ScalarType::Int) => "I32",
        KType::Scalar(ScalarType::Long) => "I64",
        KType::Scalar(ScalarType::Float) => "F32",
        KType::Scalar(ScalarType::Double) => "F64",
        KType::Vector(ScalarType::Float, 4) => "F32_4",
        KType::Vector(ScalarType::UChar, 4) => "U8_4",
        _ => return None,
    })
}

/// Host and device code moving captured variables into the script.
#[derive(Default)]
struct CaptureCode {
    /// Arguments passed to the helper after the element.
    args: Vec<KExpr>,
    /// Invokable prologue loading mutable captures.
    load: Vec<KStmt>,
    /// Invokable epilogue storing mutable captures.
    store: Vec<KStmt>,
    /// Host lines before the launch.
    setup: Vec<String>,
    /// Host lines after the launch.
    copy_back: Vec<String>,
}

/// Where the launch statements of one operation go.
struct Launch<'u, 'a> {
    unit: &'u mut TranslationUnit<'a>,
    op: &'u Operation,
    lowered: LoweredFunction,
    host: CodeWriter,
}

impl<'u, 'a> Launch<'u, 'a> {
    fn name(&self, role: Role) -> String {
        self.unit
            .naming
            .name(role, &self.op.source.variable.name, self.op.id)
    }

    fn kernel(&self, stage: &str) -> String {
        self.unit.naming.kernel(stage, self.op.id)
    }

    fn script(&self) -> String {
        self.unit.naming.fixed("mScript")
    }

    fn rs(&self) -> String {
        self.unit.naming.fixed("mRS")
    }

    fn set(&mut self, global: &str, value: &str) {
        let line = format!("{}.set_{}({});", self.script(), global, value);
        self.host.line(line);
    }

    fn for_each<S: AsRef<str>>(&mut self, kernel: &str, args: &[S]) {
        let args: Vec<&str> = args.iter().map(|a| a.as_ref()).collect();
        let line = format!("{}.forEach_{}({});", self.script(), kernel, args.join(", "));
        self.host.line(line);
    }

    fn invoke(&mut self, kernel: &str) {
        let line = format!("{}.invoke_{}();", self.script(), kernel);
        self.host.line(line);
    }

    /// `Allocation.createSized(...)` for `count` values of `ty`.
    fn sized(&self, ty: &KType, count: &str) -> CompileResult<String> {
        let factory = element_factory(ty).ok_or_else(|| {
            CompileError::unsupported(self.op.position.line, RenderScriptDialect.type_name(ty), "no RenderScript element")
        })?;
        Ok(format!(
            "Allocation.createSized({rs}, Element.{f}({rs}), {n})",
            rs = self.rs(),
            f = factory,
            n = count
        ))
    }

    fn global(&mut self, ty: KType, name: &str) {
        self.unit.kernels.global(ty, name);
    }

    fn kernel_params(&self, input: KType) -> Vec<KParam> {
        let mut params = vec![
            KParam::new(input, self.unit.naming.fixed("in")),
            KParam::new(KType::Scalar(ScalarType::UInt), "x"),
        ];
        if self.lowered.takes_coordinates {
            params.push(KParam::new(KType::Scalar(ScalarType::UInt), "y"));
        }
        params
    }

    fn element_args(&self) -> Vec<KExpr> {
        let mut args = vec![KExpr::ident(self.unit.naming.fixed("in"))];
        if self.lowered.takes_coordinates {
            args.push(KExpr::cast(KType::int(), KExpr::ident("x")));
            args.push(KExpr::cast(KType::int(), KExpr::ident("y")));
        }
        args
    }

    fn captures(&mut self) -> CompileResult<CaptureCode> {
        let mut code = CaptureCode::default();
        let bindings = self.lowered.captures.clone();
        for binding in &bindings {
            let variable = &binding.variable;
            let global = self.unit.naming.capture(&variable.name, self.op.id);
            let value = host_value(self.unit.registry, variable);
            if !binding.by_pointer {
                self.global(binding.ty.clone(), &global);
                code.setup
                    .push(format!("{}.set_{}({});", self.script(), global, value));
                code.args.push(KExpr::ident(global));
                continue;
            }
            let primitive = java_primitive(&binding.ty).ok_or_else(|| {
                CompileError::unsupported(
                    self.op.position.line,
                    &variable.type_name,
                    format!("mutable capture `{}` cannot be copied back", variable.name),
                )
            })?;
            let local = format!("{}Value", global);
            self.global(KType::Allocation, &global);
            code.setup
                .push(format!("Allocation {} = {};", global, self.sized(&binding.ty, "1")?));
            code.setup.push(format!(
                "{}.copyFrom(new {}[] {{ {} }});",
                global, primitive, value
            ));
            code.setup
                .push(format!("{}.set_{}({});", self.script(), global, global));
            code.load.push(KStmt::decl(
                binding.ty.clone(),
                local.clone(),
                get_element(&binding.ty, &global, vec![KExpr::Int(0)]),
            ));
            code.store.push(set_element(
                &binding.ty,
                &global,
                KExpr::ident(local.clone()),
                vec![KExpr::Int(0)],
            ));
            code.args.push(KExpr::address_of(KExpr::ident(local.clone())));
            code.copy_back
                .push(format!("{}[] {} = new {}[1];", primitive, local, primitive));
            code.copy_back.push(format!("{}.copyTo({});", global, local));
            code.copy_back.push(format!("{} = {}[0];", value, local));
        }
        Ok(code)
    }

    /// Loop over every element of `allocation`, in both dimensions for images.
    fn element_loop(&self, allocation: &str, body: impl Fn(Vec<KExpr>) -> Vec<KStmt>) -> KStmt {
        if self.op.source.class.kind.is_image() {
            KStmt::counted_for(
                "x",
                KExpr::Int(0),
                dim(allocation, 'X'),
                vec![KStmt::counted_for(
                    "y",
                    KExpr::Int(0),
                    dim(allocation, 'Y'),
                    body(vec![KExpr::ident("x"), KExpr::ident("y")]),
                )],
            )
        } else {
            KStmt::counted_for("i", KExpr::Int(0), dim(allocation, 'X'), body(vec![KExpr::ident("i")]))
        }
    }

    fn invokable(&mut self, name: String, body: Vec<KStmt>) {
        self.unit.kernels.function(KFunction {
            kind: FunctionKind::Invokable,
            name,
            return_type: KType::Void,
            params: Vec::new(),
            body,
        });
    }

    fn element_kernel(&mut self, name: String, input: KType, output: KType, body: Vec<KStmt>) {
        let params = self.kernel_params(input);
        self.unit.kernels.function(KFunction {
            kind: FunctionKind::Kernel,
            name,
            return_type: output,
            params,
            body,
        });
    }
}

/// Generates Java + RenderScript for the `renderscript` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct RenderScriptTranslator;

impl RenderScriptTranslator {
    pub fn new() -> Self {
        Self
    }

    fn length(unit: &TranslationUnit, variable: &Variable) -> String {
        if unit.is_maybe_empty(variable) {
            format!("({v} == null ? 0 : {v}.getType().getX())", v = variable.name)
        } else {
            format!("{}.getType().getX()", variable.name)
        }
    }

    fn foreach(launch: &mut Launch, captures: CaptureCode) {
        let source = launch.op.source.variable.name.clone();
        let input = launch.lowered.input.clone();
        let kernel = launch.kernel("foreach");
        launch.host.extend(&captures.setup);
        if launch.op.execution == ExecutionType::Parallel {
            let call = launch.lowered.call(launch.element_args(), captures.args);
            launch.element_kernel(kernel.clone(), input.clone(), input, vec![KStmt::Return(Some(call))]);
            launch.for_each(&kernel, &[&source, &source]);
        } else {
            let allocation = launch.name(Role::Input);
            launch.global(KType::Allocation, &allocation);
            let lowered = launch.lowered.clone();
            let args = captures.args.clone();
            let takes_coordinates = lowered.takes_coordinates;
            let walk = launch.element_loop(&allocation, |index| {
                let mut elements = vec![get_element(&input, &allocation, index.clone())];
                if takes_coordinates {
                    elements.extend(index.iter().cloned());
                }
                vec![set_element(&input, &allocation, lowered.call(elements, args.clone()), index)]
            });
            let mut body = captures.load;
            body.push(walk);
            body.extend(captures.store);
            launch.invokable(kernel.clone(), body);
            launch.set(&allocation, &source);
            launch.invoke(&kernel);
        }
        launch.host.extend(&captures.copy_back);
    }

    fn map(launch: &mut Launch, captures: CaptureCode, destination: &Variable, declare: bool) -> CompileResult<()> {
        let source = launch.op.source.variable.name.clone();
        let (input, output) = (launch.lowered.input.clone(), launch.lowered.output.clone());
        let kernel = launch.kernel("map");
        let length = RenderScriptTranslator::length(launch.unit, &launch.op.source.variable);
        let create = launch.sized(&output, &length)?;
        launch.host.line(format!(
            "{}{} = {};",
            if declare { "Allocation " } else { "" },
            destination.name,
            create
        ));
        launch.host.extend(&captures.setup);
        if launch.op.execution == ExecutionType::Parallel {
            let call = launch.lowered.call(launch.element_args(), captures.args);
            launch.element_kernel(kernel.clone(), input, output, vec![KStmt::Return(Some(call))]);
            launch.for_each(&kernel, &[&source, &destination.name]);
        } else {
            let (input_alloc, output_alloc) = (launch.name(Role::Input), launch.name(Role::Output));
            launch.global(KType::Allocation, &input_alloc);
            launch.global(KType::Allocation, &output_alloc);
            let lowered = launch.lowered.clone();
            let args = captures.args.clone();
            let walk = launch.element_loop(&input_alloc, |index| {
                let value = lowered.call(vec![get_element(&input, &input_alloc, index.clone())], args.clone());
                vec![set_element(&output, &output_alloc, value, index)]
            });
            let mut body = captures.load;
            body.push(walk);
            body.extend(captures.store);
            launch.invokable(kernel.clone(), body);
            launch.set(&input_alloc, &source);
            launch.set(&output_alloc, &destination.name);
            launch.invoke(&kernel);
        }
        launch.host.extend(&captures.copy_back);
        Ok(())
    }

    fn filter(launch: &mut Launch, captures: CaptureCode, destination: &Variable, declare: bool) -> CompileResult<()> {
        let source = launch.op.source.variable.name.clone();
        let input = launch.lowered.input.clone();
        let int = KType::int();
        let (count, index, size) = (
            launch.name(Role::Count),
            launch.name(Role::Index),
            launch.name(Role::SizeAllocation),
        );
        let (input_alloc, output_alloc, result) = (
            launch.name(Role::Input),
            launch.name(Role::Output),
            launch.name(Role::Result),
        );
        let (mark, count_kernel, compact) = (
            launch.kernel("filterMark"),
            launch.kernel("filterCount"),
            launch.kernel("filterCompact"),
        );
        launch.unit.kernels.push(KItem::Global {
            ty: int.clone(),
            name: count.clone(),
            volatile: true,
        });
        for allocation in [&input_alloc, &output_alloc, &index, &size] {
            launch.global(KType::Allocation, allocation);
        }

        // Phase 1: index or -1 per element, counting matches.
        let increment = KStmt::expr(KExpr::call(
            "rsAtomicInc",
            vec![KExpr::address_of(KExpr::ident(count.clone()))],
        ));
        let length = RenderScriptTranslator::length(launch.unit, &launch.op.source.variable);
        let index_create = launch.sized(&int, &length)?;
        launch.host.line(format!("Allocation {} = {};", index, index_create));
        let size_create = launch.sized(&int, "1")?;
        launch.host.line(format!("Allocation {} = {};", size, size_create));
        launch.set(&count, "0");
        launch.host.extend(&captures.setup);
        if launch.op.execution == ExecutionType::Parallel {
            let predicate = launch.lowered.call(launch.element_args(), captures.args);
            let position = KExpr::cast(int.clone(), KExpr::ident("x"));
            let body = tiling::mark_matches(predicate, position, increment, &|value| KStmt::Return(Some(value)));
            launch.element_kernel(mark.clone(), input.clone(), int.clone(), body);
            launch.for_each(&mark, &[&source, &index]);
        } else {
            let lowered = launch.lowered.clone();
            let args = captures.args.clone();
            let walk = launch.element_loop(&input_alloc, |position| {
                let predicate = lowered.call(vec![get_element(&input, &input_alloc, position.clone())], args.clone());
                let target = position.clone();
                tiling::mark_matches(
                    predicate,
                    position[0].clone(),
                    increment.clone(),
                    &|value| set_element(&KType::int(), &index, value, target.clone()),
                )
            });
            let mut body = captures.load;
            body.push(walk);
            body.extend(captures.store);
            launch.invokable(mark.clone(), body);
            launch.set(&input_alloc, &source);
            launch.set(&index, &index);
            launch.invoke(&mark);
        }
        launch.host.extend(&captures.copy_back);

        // Phase 1b: publish the count.
        let publish = set_element(&int, &size, KExpr::ident(count.clone()), vec![KExpr::Int(0)]);
        launch.invokable(count_kernel.clone(), vec![publish]);
        launch.set(&size, &size);
        launch.invoke(&count_kernel);
        launch.host.line(format!("int[] {} = new int[1];", result));
        launch.host.line(format!("{}.copyTo({});", size, result));

        // Phase 2: compact only when something matched.
        let body = tiling::compact_matches(
            dim(&input_alloc, 'X'),
            &|i| get_element(&KType::int(), &index, vec![i]),
            &|k, i| set_element(&input, &output_alloc, get_element(&input, &input_alloc, vec![i]), vec![k]),
        );
        launch.invokable(compact.clone(), body);
        launch.host.line(format!(
            "{}{} = null;",
            if declare { "Allocation " } else { "" },
            destination.name
        ));
        let create = launch.sized(&input, &format!("{}[0]", result))?;
        launch.host.open(format!("if ({}[0] > 0)", result));
        launch.host.line(format!("{} = {};", destination.name, create));
        launch.set(&input_alloc, &source);
        launch.set(&output_alloc, &destination.name);
        launch.set(&index, &index);
        launch.invoke(&compact);
        launch.host.close();
        launch.unit.mark_maybe_empty(destination);
        Ok(())
    }

    fn reduce(launch: &mut Launch, captures: CaptureCode, destination: &Variable, declare: bool) -> CompileResult<()> {
        let source = launch.op.source.variable.name.clone();
        let ty = launch.lowered.input.clone();
        let primitive = java_primitive(&ty).ok_or_else(|| {
            CompileError::unsupported(launch.op.position.line, &launch.op.source.element, "reduce result has no host type")
        })?;
        let (length, input_alloc, output_alloc, result) = (
            launch.name(Role::Length),
            launch.name(Role::Input),
            launch.name(Role::Output),
            launch.name(Role::Result),
        );
        let length_value = RenderScriptTranslator::length(launch.unit, &launch.op.source.variable);
        launch.host.line(format!("int {} = {};", length, length_value));
        launch.host.line(format!(
            "if ({} == 0) throw new java.util.NoSuchElementException(\"reduce over an empty collection\");",
            length
        ));
        launch.global(KType::Allocation, &input_alloc);
        launch.global(KType::Allocation, &output_alloc);
        let output_create = launch.sized(&ty, "1")?;
        launch.host.line(format!("Allocation {} = {};", output_alloc, output_create));
        launch.host.extend(&captures.setup);
        launch.set(&input_alloc, &source);
        launch.set(&output_alloc, &output_alloc);

        let lowered = launch.lowered.clone();
        let args = captures.args.clone();
        let combine = |a: KExpr, b: KExpr| lowered.call(vec![a, b], args.clone());
        let read = |i: KExpr| get_element(&ty, &input_alloc, vec![i]);
        let finish = |acc: KExpr| set_element(&ty, &output_alloc, acc, vec![KExpr::Int(0)]);
        let kernel = launch.kernel("reduce");

        if launch.op.execution == ExecutionType::Parallel {
            let (tile, tile_size) = (launch.name(Role::Tile), launch.name(Role::TileSize));
            launch.global(KType::Allocation, &tile);
            launch.global(KType::int(), &tile_size);
            let tile_kernel = launch.kernel("tile");
            let stage_one = tiling::tile_fold(
                &ty,
                KExpr::cast(KType::int(), KExpr::ident("x")),
                KExpr::ident(tile_size.clone()),
                &read,
                &combine,
                &|acc| KStmt::Return(Some(acc)),
            );
            launch.unit.kernels.function(KFunction {
                kind: FunctionKind::Kernel,
                name: tile_kernel.clone(),
                return_type: ty.clone(),
                params: vec![KParam::new(KType::Scalar(ScalarType::UInt), "x")],
                body: stage_one,
            });
            let stage_two = tiling::partials_fold(
                &ty,
                KExpr::ident(tile_size.clone()),
                KExpr::ident(tile_size.clone()),
                dim(&input_alloc, 'X'),
                &|i| get_element(&ty, &tile, vec![i]),
                &read,
                &combine,
                &finish,
            );
            launch.invokable(kernel.clone(), stage_two);

            launch.host.line(format!(
                "int {} = (int) Math.floor(Math.sqrt({}));",
                tile_size, length
            ));
            let tile_create = launch.sized(&ty, &tile_size)?;
            launch.host.line(format!("Allocation {} = {};", tile, tile_create));
            launch.set(&tile, &tile);
            launch.set(&tile_size, &tile_size);
            launch.for_each(&tile_kernel, &[&tile]);
            launch.invoke(&kernel);
        } else {
            let mut body = captures.load.clone();
            body.extend(tiling::linear_fold(&ty, dim(&input_alloc, 'X'), &read, &combine, &finish));
            body.extend(captures.store.clone());
            launch.invokable(kernel.clone(), body);
            launch.invoke(&kernel);
        }
        launch.host.extend(&captures.copy_back);
        launch.host.line(format!("{}[] {} = new {}[1];", primitive, result, primitive));
        launch.host.line(format!("{}.copyTo({});", output_alloc, result));
        launch.host.line(format!(
            "{}{} = new {}({}[0]);",
            if declare {
                format!("{} ", destination.type_name)
            } else {
                String::new()
            },
            destination.name,
            launch.op.source.element,
            result
        ));
        Ok(())
    }

    /// Unpack kernel turning the bound image into a `float4` allocation.
    fn image_input(unit: &mut TranslationUnit, bind: &InputBind, target: &str) -> CompileResult<Vec<String>> {
        let naming = unit.naming;
        let rs = naming.fixed("mRS");
        let script = naming.fixed("mScript");
        let staging = naming.name(Role::InputBind, &bind.target.variable.name, bind.id);
        let kernel = naming.kernel("toFloat", bind.id);
        let input = naming.fixed("in");
        let uchar4 = KType::Vector(ScalarType::UChar, 4);
        let pixel = KExpr::ident(input.clone());
        let args: Vec<&str> = bind.arguments.iter().map(|a| a.text.as_str()).collect();

        let mut host = CodeWriter::new();
        let (width, height, body) = match bind.target.class.kind {
            ContainerKind::HdrImage => {
                let (bytes, width, height) = match args.as_slice() {
                    [bytes, width, height] => (*bytes, *width, *height),
                    _ => {
                        return Err(CompileError::structural(
                            bind.position.line,
                            &args.join(", "),
                            "`new HDRImage(rgbeBytes, width, height)`",
                        ))
                    }
                };
                host.line(format!(
                    "Allocation {s} = Allocation.createTyped({rs}, new Type.Builder({rs}, Element.U8_4({rs})).setX({w}).setY({h}).create());",
                    s = staging, rs = rs, w = width, h = height
                ));
                host.line(format!("{}.copyFrom({});", staging, bytes));
                (
                    width.to_string(),
                    height.to_string(),
                    rgbe_decode(pixel, &|color| KStmt::Return(Some(color))),
                )
            }
            _ => {
                let bitmap = args.first().copied().unwrap_or_default();
                host.line(format!(
                    "Allocation {} = Allocation.createFromBitmap({}, {}, Allocation.MipmapControl.MIPMAP_NONE, Allocation.USAGE_SCRIPT);",
                    staging, rs, bitmap
                ));
                (
                    format!("{}.getType().getX()", staging),
                    format!("{}.getType().getY()", staging),
                    vec![KStmt::Return(Some(KExpr::call("rsUnpackColor8888", vec![pixel])))],
                )
            }
        };
        host.line(format!(
            "{} = Allocation.createTyped({rs}, new Type.Builder({rs}, Element.F32_4({rs})).setX({w}).setY({h}).create());",
            target, rs = rs, w = width, h = height
        ));
        host.line(format!("{}.forEach_{}({}, {});", script, kernel, staging, bind.target.variable.name));
        unit.kernels.function(KFunction {
            kind: FunctionKind::Kernel,
            name: kernel,
            return_type: KType::float4(),
            params: vec![
                KParam::new(uchar4, input),
                KParam::new(KType::Scalar(ScalarType::UInt), "x"),
                KParam::new(KType::Scalar(ScalarType::UInt), "y"),
            ],
            body,
        });
        Ok(host.into_lines())
    }
}

impl BackendTranslator for RenderScriptTranslator {
    fn name(&self) -> &'static str {
        "renderscript"
    }

    fn host_imports(&self) -> &'static [&'static str] {
        &[
            "android.renderscript.Allocation",
            "android.renderscript.Element",
            "android.renderscript.RenderScript",
            "android.renderscript.Type",
        ]
    }

    fn declaration(&self, _unit: &mut TranslationUnit, decl: &LibraryDeclaration) -> CompileResult<String> {
        Ok(format!("Allocation {};", decl.variable.variable.name))
    }

    fn input_bind(&self, unit: &mut TranslationUnit, bind: &InputBind) -> CompileResult<Vec<String>> {
        let variable = &bind.target.variable;
        let target = if bind.declares_target {
            format!("Allocation {}", variable.name)
        } else {
            variable.name.clone()
        };
        if bind.target.class.kind.is_image() {
            return RenderScriptTranslator::image_input(unit, bind, &target);
        }
        let element = unit.registry.element(&bind.target.element).ok_or_else(|| {
            CompileError::unsupported(bind.position.line, &bind.target.element, "unknown element type")
        })?;
        let ty = crate::codegen::lowering::element_type(element);
        let factory = element_factory(&ty).ok_or_else(|| {
            CompileError::unsupported(bind.position.line, element.name, "no RenderScript element")
        })?;
        let array = bind.arguments.first().ok_or_else(|| {
            CompileError::structural(bind.position.line, &variable.name, "`new Array<T>(javaArray, T.class)`")
        })?;
        let rs = unit.naming.fixed("mRS");
        let mut host = CodeWriter::new();
        let source = if array.kind == ArgumentKind::Expression {
            let temp = unit.naming.name(Role::InputBind, &variable.name, bind.id);
            host.line(format!("{} {} = {};", element.host_array, temp, array.text));
            temp
        } else {
            array.text.clone()
        };
        host.line(format!(
            "{} = Allocation.createSized({rs}, Element.{f}({rs}), {s}.length);",
            target,
            rs = rs,
            f = factory,
            s = source
        ));
        host.line(format!("{}.copyFrom({});", variable.name, source));
        Ok(host.into_lines())
    }

    fn output_bind(&self, unit: &mut TranslationUnit, bind: &OutputBind) -> CompileResult<Vec<String>> {
        let source = &bind.source.variable;
        let destination = &bind.destination;
        let declared = || match bind.shape {
            BindShape::DeclarativeAssignment => format!("{} {}", destination.type_name, destination.name),
            _ => destination.name.clone(),
        };
        let mut host = CodeWriter::new();
        if bind.source.class.kind.is_image() {
            let naming = unit.naming;
            let rs = naming.fixed("mRS");
            let staging = naming.name(Role::OutputBind, &source.name, bind.id);
            let kernel = naming.kernel("toBitmap", bind.id);
            if bind.shape != BindShape::None {
                host.line(format!(
                    "{} = android.graphics.Bitmap.createBitmap({s}.getType().getX(), {s}.getType().getY(), android.graphics.Bitmap.Config.ARGB_8888);",
                    declared(),
                    s = source.name
                ));
            }
            host.line(format!(
                "Allocation {} = Allocation.createFromBitmap({}, {}, Allocation.MipmapControl.MIPMAP_NONE, Allocation.USAGE_SCRIPT);",
                staging, rs, destination.name
            ));
            host.line(format!("{}.forEach_{}({}, {});", naming.fixed("mScript"), kernel, source.name, staging));
            host.line(format!("{}.copyTo({});", staging, destination.name));
            let input = naming.fixed("in");
            unit.kernels.function(KFunction {
                kind: FunctionKind::Kernel,
                name: kernel,
                return_type: KType::Vector(ScalarType::UChar, 4),
                params: vec![
                    KParam::new(KType::float4(), input.clone()),
                    KParam::new(KType::Scalar(ScalarType::UInt), "x"),
                    KParam::new(KType::Scalar(ScalarType::UInt), "y"),
                ],
                body: vec![KStmt::Return(Some(KExpr::call(
                    "rsPackColorTo8888",
                    vec![KExpr::ident(input)],
                )))],
            });
            return Ok(host.into_lines());
        }

        let element = unit.registry.element(&bind.source.element).ok_or_else(|| {
            CompileError::unsupported(bind.position.line, &bind.source.element, "unknown element type")
        })?;
        let primitive = element.host_array.trim_end_matches("[]");
        if bind.shape != BindShape::None {
            host.line(format!(
                "{} = new {}[{}];",
                declared(),
                primitive,
                RenderScriptTranslator::length(unit, source)
            ));
        }
        if unit.is_maybe_empty(source) {
            host.line(format!(
                "if ({s} != null) {s}.copyTo({d});",
                s = source.name,
                d = destination.name
            ));
        } else {
            host.line(format!("{}.copyTo({});", source.name, destination.name));
        }
        Ok(host.into_lines())
    }

    fn operation(&self, unit: &mut TranslationUnit, op: &Operation) -> CompileResult<Vec<String>> {
        if op.source.class.kind.is_image() && op.kind != OperationKind::Foreach {
            return Err(CompileError::unsupported(
                op.position.line,
                op.source.class.name,
                format!("`{}` over images has no {} translation", op.kind, self.name()),
            ));
        }
        let lowered = lower_operation(op, unit.registry, unit.naming, KernelLanguage::RenderScript)?;
        unit.kernels.function(lowered.function.clone());

        let guarded = unit.is_maybe_empty(&op.source.variable) && op.kind != OperationKind::Reduce;
        let declare = op.declares_destination && !guarded;
        let mut launch = Launch {
            unit,
            op,
            lowered,
            host: CodeWriter::new(),
        };
        let captures = launch.captures()?;
        match (op.kind, &op.destination) {
            (OperationKind::Foreach, _) => RenderScriptTranslator::foreach(&mut launch, captures),
            (OperationKind::Map, Some(destination)) => {
                RenderScriptTranslator::map(&mut launch, captures, destination, declare)?
            }
            (OperationKind::Filter, Some(destination)) => {
                RenderScriptTranslator::filter(&mut launch, captures, destination, declare)?
            }
            (OperationKind::Reduce, Some(destination)) => {
                RenderScriptTranslator::reduce(&mut launch, captures, destination, op.declares_destination)?
            }
            (kind, None) => {
                return Err(CompileError::structural(
                    op.position.line,
                    &op.function.text,
                    format!("a destination for `{}`", kind),
                ))
            }
        }
        let lines = launch.host.into_lines();
        if !guarded {
            return Ok(lines);
        }

        // The source may be an empty filter result, stored as `null`.
        let mut host = CodeWriter::new();
        if let Some(destination) = &op.destination {
            if op.declares_destination {
                host.line(format!("Allocation {} = null;", destination.name));
            }
            unit.mark_maybe_empty(destination);
        }
        host.open(format!("if ({} != null)", op.source.variable.name));
        host.extend(lines);
        host.close();
        Ok(host.into_lines())
    }

    fn method_call(&self, unit: &mut TranslationUnit, call: &MethodCall) -> CompileResult<String> {
        let name = &call.variable.variable.name;
        match call.method.as_str() {
            "length" => Ok(RenderScriptTranslator::length(unit, &call.variable.variable)),
            "getWidth" => Ok(format!("{}.getType().getX()", name)),
            "getHeight" => Ok(format!("{}.getType().getY()", name)),
            other => Err(CompileError::unsupported(
                call.position.line,
                format!("{}.{}", call.variable.class.name, other),
                format!("no {} translation", self.name()),
            )),
        }
    }

    fn class_members(&self, unit: &TranslationUnit, class: &ClassBody) -> Vec<String> {
        let in_use = unit
            .ir
            .classes_in_use()
            .iter()
            .any(|c| c.binary_name == class.binary_name);
        if !in_use {
            return Vec::new();
        }
        let naming = unit.naming;
        let qualifier = if class.is_static { "static " } else { "" };
        let (rs, script) = (naming.fixed("mRS"), naming.fixed("mScript"));
        let parameter = naming.fixed("renderScript");
        let mut members = CodeWriter::new();
        members.line(format!("private {}RenderScript {};", qualifier, rs));
        members.line(format!("private {}ScriptC_{} {};", qualifier, unit.class_name(), script));
        members.blank();
        members.open(format!(
            "public {}void {}(RenderScript {})",
            qualifier,
            naming.fixed("initialize"),
            parameter
        ));
        members.line(format!("{} = {};", rs, parameter));
        members.line(format!("{} = new ScriptC_{}({});", script, unit.class_name(), rs));
        members.close();
        members.extend(unit.members(&class.binary_name));
        members.blank();
        members.into_lines()
    }

    fn device_files(&self, unit: TranslationUnit) -> CompileResult<Vec<GeneratedFile>> {
        let mut module = KernelModule::new();
        module.push(KItem::Pragma("version(1)".to_string()));
        if let Some(package) = &unit.ir.package {
            module.push(KItem::Pragma(format!("rs java_package_name({})", package)));
        }
        module.push(KItem::Pragma("rs_fp_relaxed".to_string()));
        let path = unit.package_dir().join(format!("{}.rs", unit.class_name()));
        // Globals must be declared before any function that touches them.
        let (globals, functions): (Vec<KItem>, Vec<KItem>) = unit
            .kernels
            .items
            .into_iter()
            .partition(|item| matches!(item, KItem::Global { .. }));
        module.items.extend(globals);
        module.items.extend(functions);
        let script = KernelRenderer::new(&RenderScriptDialect).render(&module);
        log::info!("generated script {}", path.display());
        Ok(vec![GeneratedFile::new(path, FileKind::Kernel, script)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::{SequenceCounter, SourceAnalyzer};
    use crate::codegen::naming::NamingScheme;
    use crate::codegen::translate_file;
    use crate::registry::LibraryRegistry;

    const HEADER: &str = "package org.example;\n\nimport org.parallelme.userlibrary.Array;\nimport org.parallelme.userlibrary.image.BitmapImage;\nimport org.parallelme.userlibrary.datatype.Int32;\nimport android.graphics.Bitmap;\n\n";

    fn compile(body: &str) -> CompileResult<Vec<GeneratedFile>> {
        let source = format!(
            "{}public class Sample {{\n    public int[] run(final int[] data, Bitmap bmp) {{\n{}\n    }}\n}}\n",
            HEADER, body
        );
        compile_source(&source)
    }

    fn compile_source(source: &str) -> CompileResult<Vec<GeneratedFile>> {
        let ir = SourceAnalyzer::default()
            .analyze(source, "Sample", &mut SequenceCounter::new())?;
        translate_file(
            &RenderScriptTranslator::new(),
            &ir,
            source,
            &NamingScheme::default(),
            &LibraryRegistry::new(),
        )
    }

    fn files(body: &str) -> (String, String) {
        let files = compile(body).unwrap();
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].path, std::path::PathBuf::from("org/example/Sample.java"));
        assert_eq!(files[1].path, std::path::PathBuf::from("org/example/Sample.rs"));
        (files[0].contents.clone(), files[1].contents.clone())
    }

    #[test]
    fn test_foreach_round_trip_leaves_no_library_types() {
        let (host, script) = files(
            "        Array<Int32> a = new Array<Int32>(data, Int32.class);\n        a.par().foreach(x -> { x.value = x.value + 1; });\n        int[] out = a.toJavaArray();\n        return out;",
        );
        assert!(!host.contains("Array<"), "{}", host);
        assert!(!host.contains("userlibrary.Array"), "{}", host);
        assert!(host.contains("import org.parallelme.userlibrary.datatype.Int32;"));
        assert!(host.contains("import android.renderscript.Allocation;"));
        assert!(host.contains(
            "        Allocation a = Allocation.createSized(PM_mRS, Element.I32(PM_mRS), data.length);\n        a.copyFrom(data);"
        ), "{}", host);
        assert!(host.contains("PM_mScript.forEach_PM_kernelForeach2(a, a);"));
        assert!(host.contains("int[] out = new int[a.getType().getX()];\n        a.copyTo(out);"), "{}", host);
        assert!(host.contains("private static ScriptC_Sample PM_mScript;"), "{}", host);
        assert!(host.contains("public static void PM_initialize(RenderScript PM_renderScript) {"));

        assert!(script.starts_with("#pragma version(1)\n#pragma rs java_package_name(org.example)\n#pragma rs_fp_relaxed\n"));
        assert!(script.contains("static int PM_function2(int x) {"), "{}", script);
        assert!(script.contains("int __attribute__((kernel)) PM_kernelForeach2(int PM_in, uint32_t x) {\n    return PM_function2(PM_in);\n}"), "{}", script);
    }

    #[test]
    fn test_inner_class_gets_instance_members() {
        let source = format!(
            "{}public class Sample {{\n    class Worker {{\n        int[] run(final int[] data) {{\n            Array<Int32> a = new Array<Int32>(data, Int32.class);\n            a.par().foreach(x -> {{ x.value = x.value + 1; }});\n            int[] out = a.toJavaArray();\n            return out;\n        }}\n    }}\n}}\n",
            HEADER
        );
        let files = compile_source(&source).unwrap();
        let host = &files[0].contents;
        assert!(host.contains("private RenderScript PM_mRS;"), "{}", host);
        assert!(host.contains("private ScriptC_Sample PM_mScript;"), "{}", host);
        assert!(host.contains("public void PM_initialize(RenderScript PM_renderScript) {"), "{}", host);
        assert!(!host.contains("static ScriptC_Sample"), "{}", host);
    }

    #[test]
    fn test_sequential_foreach_copies_capture_back() {
        let (host, script) = files(
            "        int total = 0;\n        Array<Int32> a = new Array<Int32>(data, Int32.class);\n        a.par().foreach(x -> { total += x.value; });\n        return null;",
        );
        assert!(host.contains("PM_captureTotal2.copyFrom(new int[] { total });"), "{}", host);
        assert!(host.contains("PM_mScript.invoke_PM_kernelForeach2();"));
        assert!(host.contains("total = PM_captureTotal2Value[0];"));
        assert!(script.contains("#pragma rs_fp_relaxed\n\nrs_allocation "), "{}", script);
        assert!(script.contains("rs_allocation PM_captureTotal2;"));
        assert!(script.contains("int PM_captureTotal2Value = rsGetElementAt_int(PM_captureTotal2, 0);"), "{}", script);
        assert!(script.contains("rsSetElementAt_int(PM_inputA2, PM_function2(rsGetElementAt_int(PM_inputA2, i), &PM_captureTotal2Value), i);"), "{}", script);
        assert!(script.contains("rsSetElementAt_int(PM_captureTotal2, PM_captureTotal2Value, 0);"));
    }

    #[test]
    fn test_reduce_is_tiled() {
        let (host, script) = files(
            "        Array<Int32> a = new Array<Int32>(data, Int32.class);\n        Int32 sum = a.par().reduce((x, y) -> new Int32(x.value + y.value));\n        return null;",
        );
        assert!(host.contains("if (PM_lengthA2 == 0) throw new java.util.NoSuchElementException"), "{}", host);
        assert!(host.contains("int PM_tileSizeA2 = (int) Math.floor(Math.sqrt(PM_lengthA2));"));
        assert!(host.contains("PM_mScript.forEach_PM_kernelTile2(PM_tileA2);"));
        assert!(host.contains("Int32 sum = new Int32(PM_resultA2[0]);"), "{}", host);
        assert!(script.contains("int __attribute__((kernel)) PM_kernelTile2(uint32_t x) {"), "{}", script);
        assert!(script.contains("for (int j = PM_tileSizeA2 * PM_tileSizeA2; j < rsAllocationGetDimX(PM_inputA2); j++) {"), "{}", script);
    }

    #[test]
    fn test_filter_runs_phase_two_only_on_matches() {
        let (host, script) = files(
            "        Array<Int32> a = new Array<Int32>(data, Int32.class);\n        Array<Int32> b = a.par().filter(x -> x.value > 2);\n        int[] out = b.toJavaArray();\n        return out;",
        );
        assert!(script.contains("volatile int PM_countA2;"), "{}", script);
        assert!(script.contains("rsAtomicInc(&PM_countA2);"));
        assert!(script.contains("void PM_kernelFilterCount2(void) {"), "{}", script);
        assert!(host.contains("PM_mScript.set_PM_countA2(0);"));
        assert!(host.contains("Allocation b = null;\n        if (PM_resultA2[0] > 0) {"), "{}", host);
        assert!(host.contains("PM_mScript.invoke_PM_kernelFilterCompact2();"));
        assert!(host.contains("int[] out = new int[(b == null ? 0 : b.getType().getX())];"), "{}", host);
        assert!(host.contains("if (b != null) b.copyTo(out);"));
    }

    #[test]
    fn test_bitmap_foreach_and_output() {
        let (host, script) = files(
            "        BitmapImage img = new BitmapImage(bmp);\n        img.par().foreach(p -> { p.rgba.red = 1.0f - p.rgba.red; });\n        img.toBitmap(bmp);\n        return null;",
        );
        assert!(host.contains("Allocation.createFromBitmap(PM_mRS, bmp,"), "{}", host);
        assert!(host.contains("PM_mScript.forEach_PM_kernelToFloat1(PM_inputBindImg1, img);"));
        assert!(host.contains("PM_mScript.forEach_PM_kernelToBitmap3(img, PM_outputBindImg3);"), "{}", host);
        assert!(script.contains("return rsUnpackColor8888(PM_in);"));
        assert!(script.contains("return rsPackColorTo8888(PM_in);"));
        assert!(script.contains("float4 __attribute__((kernel)) PM_kernelForeach2(float4 PM_in, uint32_t x, uint32_t y) {"), "{}", script);
        assert!(script.contains("return PM_function2(PM_in, ((int) x), ((int) y));"), "{}", script);
    }

    #[test]
    fn test_image_map_is_unsupported() {
        let err = compile(
            "        BitmapImage img = new BitmapImage(bmp);\n        BitmapImage out = img.par().map(p -> p);\n        return null;",
        )
        .unwrap_err();
        assert!(matches!(err, CompileError::UnsupportedType { line: 11, .. }), "{:?}", err);
    }
}
