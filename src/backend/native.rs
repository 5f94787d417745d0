//! Native backend: library variables become `long` handles to device
//! collections owned by a small OpenCL runtime reached through JNI.

use super::{host_primitive, host_value, java_primitive, rgbe_decode};
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

/// Shared library every generated class loads.
pub const LIBRARY_NAME: &str = "ParallelMEGenerated";

const RUNTIME_HEADER: &str = include_str!("support/PMRuntime.hpp");
const ANDROID_MK: &str = include_str!("support/Android.mk");
const APPLICATION_MK: &str = include_str!("support/Application.mk");

pub struct OpenClDialect;

impl KernelDialect for OpenClDialect {
    fn scalar_name(&self, scalar: ScalarType) -> &'static str {
        match scalar {
            ScalarType::Bool => "bool",
            ScalarType::Char => "char",
            ScalarType::UChar => "uchar",
            ScalarType::Short => "short",
            ScalarType::Int => "int",
            ScalarType::UInt => "uint",
            ScalarType::Long => "long",
            ScalarType::Float => "float",
            ScalarType::Double => "double",
        }
    }

    fn allocation_name(&self) -> &'static str {
        "__global void *"
    }

    fn address_space(&self, space: AddressSpace) -> &'static str {
        match space {
            AddressSpace::Private => "",
            AddressSpace::Global => "__global",
            AddressSpace::Constant => "__constant",
        }
    }

    fn function_prefix(&self, function: &KFunction, return_type: &str) -> String {
        match function.kind {
            FunctionKind::Helper => return_type.to_string(),
            FunctionKind::Kernel | FunctionKind::Invokable => "__kernel void".to_string(),
        }
    }

    fn vector_literal(&self, ty: &str, items: &[String]) -> String {
        format!("({})({})", ty, items.join(", "))
    }
}

/// Escapes a Java name for use in a JNI symbol.
pub fn jni_mangle(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.chars() {
        match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' => out.push(c),
            '.' | '/' => out.push('_'),
            '_' => out.push_str("_1"),
            ';' => out.push_str("_2"),
            '[' => out.push_str("_3"),
            other => {
                let mut units = [0u16; 2];
                for unit in other.encode_utf16(&mut units) {
                    out.push_str(&format!("_0{:04x}", unit));
                }
            }
        }
    }
    out
}

/// `Java_<package>_<Class>_<method>` for a native method of `class`.
pub fn jni_symbol(package: Option<&str>, class: &str, method: &str) -> String {
    let qualified = match package {
        Some(package) => format!("{}.{}", package, class),
        None => class.to_string(),
    };
    format!("Java_{}_{}", jni_mangle(&qualified), jni_mangle(method))
}

fn is_primitive(java: &str) -> bool {
    matches!(
        java,
        "boolean" | "byte" | "char" | "short" | "int" | "long" | "float" | "double"
    )
}

fn jni_type(java: &str) -> String {
    if java == "void" {
        return java.to_string();
    }
    if is_primitive(java) {
        return format!("j{}", java);
    }
    match java.strip_suffix("[]") {
        Some(element) if is_primitive(element) => format!("j{}Array", element),
        _ => "jobject".to_string(),
    }
}

/// `Int` in `GetIntArrayRegion`.
fn jni_region(primitive: &str) -> String {
    let mut chars = primitive.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// OpenCL host type of a kernel value type.
fn cl_type(ty: &KType) -> &'static str {
    match ty {
        KType::Scalar(ScalarType::Bool) | KType::Scalar(ScalarType::Int) => "cl_int",
        KType::Scalar(ScalarType::Char) => "cl_char",
        KType::Scalar(ScalarType::UChar) => "cl_uchar",
        KType::Scalar(ScalarType::Short) => "cl_short",
        KType::Scalar(ScalarType::UInt) => "cl_uint",
        KType::Scalar(ScalarType::Long) => "cl_long",
        KType::Scalar(ScalarType::Double) => "cl_double",
        KType::Vector(ScalarType::UChar, 4) => "cl_uchar4",
        KType::Vector(..) => "cl_float4",
        _ => "cl_float",
    }
}

fn ptr(ty: &KType) -> KType {
    KType::global_ptr(ty.clone())
}

fn at(buffer: &str, index: KExpr) -> KExpr {
    KExpr::index(KExpr::ident(buffer), index)
}

fn store(buffer: &str, index: KExpr, value: KExpr) -> KStmt {
    KStmt::expr(KExpr::assign(at(buffer, index), value))
}

fn global_id() -> KStmt {
    KStmt::decl(
        KType::int(),
        "gid",
        KExpr::cast(KType::int(), KExpr::call("get_global_id", vec![KExpr::Int(0)])),
    )
}

fn kernel(name: String, params: Vec<KParam>, body: Vec<KStmt>) -> KFunction {
    KFunction {
        kind: FunctionKind::Kernel,
        name,
        return_type: KType::Void,
        params,
        body,
    }
}

fn launch(kernel: &str, global: &str, args: &[String]) -> String {
    let mut all = vec![format!("\"{}\"", kernel), global.to_string()];
    all.extend(args.iter().cloned());
    format!("runtime->launch({});", all.join(", "))
}

const RUNTIME: &str = "pm::Runtime *runtime = pm::Runtime::from(runtimeHandle);";
const SOURCE: &str = "pm::Collection *source = pm::Collection::from(sourceHandle);";

/// One `private native` method and its C++ definition.
struct JniFunction {
    method: String,
    returns: String,
    params: Vec<(String, String)>,
    body: CodeWriter,
}

impl JniFunction {
    fn new(method: String, returns: impl Into<String>) -> Self {
        Self {
            method,
            returns: returns.into(),
            params: Vec::new(),
            body: CodeWriter::new(),
        }
    }

    fn param(&mut self, java_type: impl Into<String>, name: impl Into<String>) -> &mut Self {
        self.params.push((java_type.into(), name.into()));
        self
    }

    fn declaration(&self, is_static: bool) -> String {
        let params: Vec<String> = self
            .params
            .iter()
            .map(|(ty, name)| format!("{} {}", ty, name))
            .collect();
        format!(
            "private {}native {} {}({});",
            if is_static { "static " } else { "" },
            self.returns,
            self.method,
            params.join(", ")
        )
    }

    fn definition(self, symbol: &str) -> Vec<String> {
        let mut params = vec!["JNIEnv *env".to_string(), "jobject self".to_string()];
        params.extend(
            self.params
                .iter()
                .map(|(ty, name)| format!("{} {}", jni_type(ty), name)),
        );
        let mut out = CodeWriter::new();
        out.open(format!(
            "JNIEXPORT {} JNICALL {}({})",
            jni_type(&self.returns),
            symbol,
            params.join(", ")
        ));
        out.extend(self.body.into_lines());
        out.close();
        out.into_lines()
    }
}

/// Native methods live on static contexts unless the class is an inner class.
fn static_context(unit: &TranslationUnit, class: &str) -> bool {
    unit.ir
        .class(class)
        .map(|c| c.is_top_level || c.is_static)
        .unwrap_or(true)
}

fn emit(unit: &mut TranslationUnit, class: &str, function: JniFunction) {
    let declaration = function.declaration(static_context(unit, class));
    unit.add_member(class, vec![declaration]);
    let symbol = jni_symbol(unit.ir.package.as_deref(), class, &function.method);
    let definition = function.definition(&symbol);
    unit.native.blank();
    unit.native.extend(definition);
}

/// A captured variable crossing Java, JNI and the kernel.
struct NativeCapture {
    name: String,
    ty: KType,
    primitive: &'static str,
    by_pointer: bool,
    host: String,
    cast: bool,
}

impl NativeCapture {
    fn host_value(&self) -> String {
        if self.cast {
            format!("({}) {}", self.primitive, self.host)
        } else {
            self.host.clone()
        }
    }

    fn java_type(&self) -> String {
        if self.by_pointer {
            format!("{}[]", self.primitive)
        } else {
            self.primitive.to_string()
        }
    }

    fn java_arg(&self) -> String {
        if self.by_pointer {
            self.name.clone()
        } else {
            self.host_value()
        }
    }

    fn kernel_param(&self) -> KParam {
        if self.by_pointer {
            KParam::new(ptr(&self.ty), self.name.clone())
        } else if self.ty == KType::Scalar(ScalarType::Bool) {
            KParam::new(KType::int(), self.name.clone())
        } else {
            KParam::new(self.ty.clone(), self.name.clone())
        }
    }

    fn launch_arg(&self) -> String {
        if self.by_pointer {
            format!("{}Buffer", self.name)
        } else {
            format!("static_cast<{}>({})", cl_type(&self.ty), self.name)
        }
    }
}

fn native_captures(
    unit: &TranslationUnit,
    op: &Operation,
    lowered: &LoweredFunction,
) -> CompileResult<Vec<NativeCapture>> {
    lowered
        .captures
        .iter()
        .map(|binding| {
            let variable = &binding.variable;
            let primitive = java_primitive(&binding.ty)
                .filter(|p| !(binding.by_pointer && *p == "boolean"))
                .ok_or_else(|| {
                    CompileError::unsupported(
                        op.position.line,
                        &variable.type_name,
                        format!("capture `{}` has no native representation", variable.name),
                    )
                })?;
            Ok(NativeCapture {
                name: unit.naming.capture(&variable.name, op.id),
                ty: binding.ty.clone(),
                primitive,
                by_pointer: binding.by_pointer,
                host: host_value(unit.registry, variable),
                cast: host_primitive(unit.registry, variable) != primitive,
            })
        })
        .collect()
}

/// Kernels of one operation, sharing its helper and captures.
struct KernelPlan<'p> {
    lowered: &'p LoweredFunction,
    captures: &'p [NativeCapture],
    parallel: bool,
}

impl<'p> KernelPlan<'p> {
    fn call(&self, elements: Vec<KExpr>) -> KExpr {
        let captures = self
            .captures
            .iter()
            .map(|c| KExpr::ident(c.name.clone()))
            .collect();
        self.lowered.call(elements, captures)
    }

    fn with_captures(&self, mut params: Vec<KParam>) -> Vec<KParam> {
        params.extend(self.captures.iter().map(NativeCapture::kernel_param));
        params
    }

    /// One work item per element, or a single worker looping over `length`.
    fn per_element(
        &self,
        name: String,
        mut params: Vec<KParam>,
        per: impl Fn(KExpr) -> Vec<KStmt>,
    ) -> KFunction {
        let body = if self.parallel {
            let mut body = vec![global_id()];
            body.extend(per(KExpr::ident("gid")));
            body
        } else {
            params.push(KParam::new(KType::int(), "length"));
            vec![KStmt::counted_for(
                "i",
                KExpr::Int(0),
                KExpr::ident("length"),
                per(KExpr::ident("i")),
            )]
        };
        kernel(name, self.with_captures(params), body)
    }

    /// Element arguments of the helper at `position`, with pixel coordinates.
    fn elements(&self, data: &str, position: KExpr, prelude: &mut Vec<KStmt>) -> Vec<KExpr> {
        let mut elements = vec![at(data, position.clone())];
        if self.lowered.takes_coordinates {
            prelude.push(KStmt::decl(
                KType::int(),
                "x",
                KExpr::binary(position.clone(), "%", KExpr::ident("width")),
            ));
            prelude.push(KStmt::decl(
                KType::int(),
                "y",
                KExpr::binary(position, "/", KExpr::ident("width")),
            ));
            elements.push(KExpr::ident("x"));
            elements.push(KExpr::ident("y"));
        }
        elements
    }

    /// C++ launch arguments after the buffers.
    fn launch_args(&self, mut args: Vec<String>) -> Vec<String> {
        if !self.parallel {
            args.push("static_cast<cl_int>(source->length)".to_string());
        }
        args.extend(self.captures.iter().map(NativeCapture::launch_arg));
        args
    }

    fn global(&self) -> &'static str {
        if self.parallel {
            "source->length"
        } else {
            "1"
        }
    }
}

/// C++ moving mutable captures into one-element buffers and back.
fn capture_prologue(body: &mut CodeWriter, captures: &[NativeCapture]) {
    for capture in captures.iter().filter(|c| c.by_pointer) {
        let jni = jni_type(capture.primitive);
        body.line(format!("{} {}Value[1];", jni, capture.name));
        body.line(format!(
            "env->Get{}ArrayRegion({n}, 0, 1, {n}Value);",
            jni_region(capture.primitive),
            n = capture.name
        ));
        body.line(format!(
            "cl_mem {n}Buffer = runtime->buffer(sizeof({}), 1, {n}Value);",
            jni,
            n = capture.name
        ));
    }
}

fn capture_epilogue(body: &mut CodeWriter, captures: &[NativeCapture]) {
    for capture in captures.iter().filter(|c| c.by_pointer) {
        body.line(format!(
            "runtime->read({n}Buffer, sizeof({}), {n}Value);",
            jni_type(capture.primitive),
            n = capture.name
        ));
        body.line(format!(
            "env->Set{}ArrayRegion({n}, 0, 1, {n}Value);",
            jni_region(capture.primitive),
            n = capture.name
        ));
        body.line(format!("runtime->release({}Buffer);", capture.name));
    }
}

/// Generates Java + JNI + OpenCL for the `native` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeTranslator;

impl NativeTranslator {
    pub fn new() -> Self {
        Self
    }

    fn foreach(unit: &mut TranslationUnit, op: &Operation, plan: &KernelPlan, function: &mut JniFunction) {
        let name = unit.naming.kernel("foreach", op.id);
        let ty = plan.lowered.input.clone();
        let mut params = vec![KParam::new(ptr(&ty), "data")];
        let mut args = vec!["source->buffer".to_string()];
        if plan.lowered.takes_coordinates {
            params.push(KParam::new(KType::int(), "width"));
            args.push("static_cast<cl_int>(source->width)".to_string());
        }
        let f = plan.per_element(name.clone(), params, |p| {
            let mut stmts = Vec::new();
            let elements = plan.elements("data", p.clone(), &mut stmts);
            stmts.push(store("data", p, plan.call(elements)));
            stmts
        });
        unit.kernels.function(f);

        let body = &mut function.body;
        body.open("if (source->length == 0)").line("return;").close();
        capture_prologue(body, plan.captures);
        body.line(launch(&name, plan.global(), &plan.launch_args(args)));
        capture_epilogue(body, plan.captures);
    }

    fn map(unit: &mut TranslationUnit, op: &Operation, plan: &KernelPlan, function: &mut JniFunction) {
        let name = unit.naming.kernel("map", op.id);
        let (input, output) = (plan.lowered.input.clone(), plan.lowered.output.clone());
        let params = vec![
            KParam::new(ptr(&input), "data"),
            KParam::new(ptr(&output), "output"),
        ];
        let f = plan.per_element(name.clone(), params, |p| {
            vec![store("output", p.clone(), plan.call(vec![at("data", p)]))]
        });
        unit.kernels.function(f);

        let body = &mut function.body;
        body.line(format!(
            "pm::Collection *output = runtime->collection(sizeof({}), source->width, source->height);",
            cl_type(&output)
        ));
        body.open("if (source->length == 0)")
            .line("return pm::handle(output);")
            .close();
        capture_prologue(body, plan.captures);
        let args = plan.launch_args(vec!["source->buffer".to_string(), "output->buffer".to_string()]);
        body.line(launch(&name, plan.global(), &args));
        capture_epilogue(body, plan.captures);
        body.line("return pm::handle(output);");
    }

    fn filter(unit: &mut TranslationUnit, op: &Operation, plan: &KernelPlan, function: &mut JniFunction) {
        let (mark, compact) = (
            unit.naming.kernel("filterMark", op.id),
            unit.naming.kernel("filterCompact", op.id),
        );
        let ty = plan.lowered.input.clone();
        let int = KType::int();

        // Phase 1: index or -1 per element, counting matches.
        let params = vec![
            KParam::new(ptr(&ty), "data"),
            KParam::new(ptr(&int), "index"),
            KParam::new(ptr(&int), "count"),
        ];
        let f = plan.per_element(mark.clone(), params, |p| {
            let increment = KStmt::expr(KExpr::call("atomic_inc", vec![KExpr::ident("count")]));
            let target = p.clone();
            tiling::mark_matches(
                plan.call(vec![at("data", p.clone())]),
                p,
                increment,
                &|value| store("index", target.clone(), value),
            )
        });
        unit.kernels.function(f);

        // Phase 2: single worker compaction in element order.
        let body = tiling::compact_matches(
            KExpr::ident("length"),
            &|i| at("index", i),
            &|k, i| store("output", k, at("data", i)),
        );
        unit.kernels.function(kernel(
            compact.clone(),
            vec![
                KParam::new(ptr(&ty), "data"),
                KParam::new(ptr(&int), "index"),
                KParam::new(ptr(&ty), "output"),
                KParam::new(KType::int(), "length"),
            ],
            body,
        ));

        let size = format!("sizeof({})", cl_type(&ty));
        let body = &mut function.body;
        body.open("if (source->length == 0)")
            .line(format!("return pm::handle(runtime->collection({}, 0));", size))
            .close();
        body.line("cl_mem index = runtime->buffer(sizeof(cl_int), source->length, nullptr);");
        body.line("cl_int count = 0;");
        body.line("cl_mem countBuffer = runtime->buffer(sizeof(cl_int), 1, &count);");
        capture_prologue(body, plan.captures);
        let args = plan.launch_args(vec![
            "source->buffer".to_string(),
            "index".to_string(),
            "countBuffer".to_string(),
        ]);
        body.line(launch(&mark, plan.global(), &args));
        capture_epilogue(body, plan.captures);
        body.line("runtime->read(countBuffer, sizeof(cl_int), &count);");
        body.line(format!(
            "pm::Collection *output = runtime->collection({}, static_cast<size_t>(count));",
            size
        ));
        body.open("if (count > 0)");
        body.line(launch(
            &compact,
            "1",
            &[
                "source->buffer".to_string(),
                "index".to_string(),
                "output->buffer".to_string(),
                "static_cast<cl_int>(source->length)".to_string(),
            ],
        ));
        body.close();
        body.line("runtime->release(index);");
        body.line("runtime->release(countBuffer);");
        body.line("return pm::handle(output);");
    }

    fn reduce(unit: &mut TranslationUnit, op: &Operation, plan: &KernelPlan, function: &mut JniFunction) {
        let (tile, fold) = (
            unit.naming.kernel("tile", op.id),
            unit.naming.kernel("reduce", op.id),
        );
        let ty = plan.lowered.input.clone();
        let read = |i: KExpr| at("data", i);
        let combine = |a: KExpr, b: KExpr| plan.call(vec![a, b]);
        let finish = |acc: KExpr| store("output", KExpr::Int(0), acc);

        if plan.parallel {
            let stage_one = {
                let mut body = vec![global_id()];
                body.extend(tiling::tile_fold(
                    &ty,
                    KExpr::ident("gid"),
                    KExpr::ident("tileSize"),
                    &read,
                    &combine,
                    &|acc| store("tile", KExpr::ident("gid"), acc),
                ));
                body
            };
            unit.kernels.function(kernel(
                tile.clone(),
                plan.with_captures(vec![
                    KParam::new(ptr(&ty), "data"),
                    KParam::new(ptr(&ty), "tile"),
                    KParam::new(KType::int(), "tileSize"),
                ]),
                stage_one,
            ));
            let stage_two = tiling::partials_fold(
                &ty,
                KExpr::ident("tileSize"),
                KExpr::ident("tileSize"),
                KExpr::ident("length"),
                &|i| at("tile", i),
                &read,
                &combine,
                &finish,
            );
            unit.kernels.function(kernel(
                fold.clone(),
                plan.with_captures(vec![
                    KParam::new(ptr(&ty), "data"),
                    KParam::new(ptr(&ty), "tile"),
                    KParam::new(ptr(&ty), "output"),
                    KParam::new(KType::int(), "tileSize"),
                    KParam::new(KType::int(), "length"),
                ]),
                stage_two,
            ));
        } else {
            unit.kernels.function(kernel(
                fold.clone(),
                plan.with_captures(vec![
                    KParam::new(ptr(&ty), "data"),
                    KParam::new(ptr(&ty), "output"),
                    KParam::new(KType::int(), "length"),
                ]),
                tiling::linear_fold(&ty, KExpr::ident("length"), &read, &combine, &finish),
            ));
        }

        let cl = cl_type(&ty);
        let captures: Vec<String> = plan.captures.iter().map(NativeCapture::launch_arg).collect();
        let body = &mut function.body;
        body.open("if (source->length == 0)")
            .line("env->ThrowNew(env->FindClass(\"java/util/NoSuchElementException\"), \"reduce over an empty collection\");")
            .line("return 0;")
            .close();
        body.line("cl_int length = static_cast<cl_int>(source->length);");
        body.line(format!("cl_mem output = runtime->buffer(sizeof({}), 1, nullptr);", cl));
        capture_prologue(body, plan.captures);
        if plan.parallel {
            body.line("cl_int tileSize = static_cast<cl_int>(pm::isqrt(source->length));");
            body.line(format!("cl_mem tile = runtime->buffer(sizeof({}), tileSize, nullptr);", cl));
            let mut args = vec!["source->buffer".to_string(), "tile".to_string(), "tileSize".to_string()];
            args.extend(captures.iter().cloned());
            body.line(launch(&tile, "static_cast<size_t>(tileSize)", &args));
            let mut args = vec![
                "source->buffer".to_string(),
                "tile".to_string(),
                "output".to_string(),
                "tileSize".to_string(),
                "length".to_string(),
            ];
            args.extend(captures);
            body.line(launch(&fold, "1", &args));
            body.line("runtime->release(tile);");
        } else {
            let mut args = vec!["source->buffer".to_string(), "output".to_string(), "length".to_string()];
            args.extend(captures);
            body.line(launch(&fold, "1", &args));
        }
        capture_epilogue(body, plan.captures);
        body.line(format!("{} result = 0;", cl));
        body.line(format!("runtime->read(output, sizeof({}), &result);", cl));
        body.line("runtime->release(output);");
        body.line("return result;");
    }

    /// Image to `float4` collection through a conversion kernel.
    fn image_input(unit: &mut TranslationUnit, bind: &InputBind, target: &str) -> CompileResult<Vec<String>> {
        let variable = &bind.target.variable;
        let method = unit.naming.name(Role::InputBind, &variable.name, bind.id);
        let name = unit.naming.kernel("toFloat", bind.id);
        let args: Vec<&str> = bind.arguments.iter().map(|a| a.text.as_str()).collect();
        let mut function = JniFunction::new(method.clone(), "long");
        function.param("long", "runtimeHandle");
        let body_kernel;
        {
            let body = &mut function.body;
            body.line(RUNTIME);
            match bind.target.class.kind {
                ContainerKind::HdrImage => {
                    if args.len() != 3 {
                        return Err(CompileError::structural(
                            bind.position.line,
                            &args.join(", "),
                            "`new HDRImage(rgbeBytes, width, height)`",
                        ));
                    }
                    body.line("jbyte *bytes = env->GetByteArrayElements(rgbe, nullptr);");
                    body.line("cl_mem staging = runtime->buffer(sizeof(cl_uchar4), static_cast<size_t>(width) * height, bytes);");
                    body.line("env->ReleaseByteArrayElements(rgbe, bytes, JNI_ABORT);");
                    body.line("pm::Collection *image = runtime->collection(sizeof(cl_float4), width, height);");
                    body_kernel = rgbe_decode(at("pixels", KExpr::ident("gid")), &|color| {
                        store("image", KExpr::ident("gid"), color)
                    });
                }
                _ => {
                    body.line("AndroidBitmapInfo info;");
                    body.line("void *pixels = nullptr;");
                    body.open("if (AndroidBitmap_getInfo(env, bitmap, &info) < 0 || AndroidBitmap_lockPixels(env, bitmap, &pixels) < 0)")
                        .line("env->ThrowNew(env->FindClass(\"java/lang/IllegalStateException\"), \"cannot lock bitmap pixels\");")
                        .line("return 0;")
                        .close();
                    body.line("cl_mem staging = runtime->buffer(sizeof(cl_uchar4), info.width * info.height, pixels);");
                    body.line("AndroidBitmap_unlockPixels(env, bitmap);");
                    body.line("pm::Collection *image = runtime->collection(sizeof(cl_float4), info.width, info.height);");
                    let unpacked = KExpr::binary(
                        KExpr::call("convert_float4", vec![at("pixels", KExpr::ident("gid"))]),
                        "/",
                        KExpr::Float(255.0),
                    );
                    body_kernel = vec![store("image", KExpr::ident("gid"), unpacked)];
                }
            }
            body.open("if (image->length > 0)")
                .line(launch(
                    &name,
                    "image->length",
                    &["staging".to_string(), "image->buffer".to_string()],
                ))
                .close();
            body.line("runtime->release(staging);");
            body.line("return pm::handle(image);");
        }
        match bind.target.class.kind {
            ContainerKind::HdrImage => {
                function.param("byte[]", "rgbe").param("int", "width").param("int", "height");
            }
            _ => {
                function.param("android.graphics.Bitmap", "bitmap");
            }
        }
        let mut kernel_body = vec![global_id()];
        kernel_body.extend(body_kernel);
        unit.kernels.function(kernel(
            name,
            vec![
                KParam::new(ptr(&KType::Vector(ScalarType::UChar, 4)), "pixels"),
                KParam::new(ptr(&KType::float4()), "image"),
            ],
            kernel_body,
        ));
        emit(unit, &bind.position.class_name, function);
        Ok(vec![format!(
            "{} = {}({}, {});",
            target,
            method,
            unit.naming.fixed("runtime"),
            args.join(", ")
        )])
    }
}

impl BackendTranslator for NativeTranslator {
    fn name(&self) -> &'static str {
        "native"
    }

    fn declaration(&self, _unit: &mut TranslationUnit, decl: &LibraryDeclaration) -> CompileResult<String> {
        Ok(format!("long {};", decl.variable.variable.name))
    }

    fn input_bind(&self, unit: &mut TranslationUnit, bind: &InputBind) -> CompileResult<Vec<String>> {
        let variable = &bind.target.variable;
        let target = if bind.declares_target {
            format!("long {}", variable.name)
        } else {
            variable.name.clone()
        };
        if bind.target.class.kind.is_image() {
            return NativeTranslator::image_input(unit, bind, &target);
        }
        let element = unit.registry.element(&bind.target.element).ok_or_else(|| {
            CompileError::unsupported(bind.position.line, &bind.target.element, "unknown element type")
        })?;
        let primitive = element.primitive.ok_or_else(|| {
            CompileError::unsupported(bind.position.line, element.name, "not a scalar element")
        })?;
        let array = bind.arguments.first().ok_or_else(|| {
            CompileError::structural(bind.position.line, &variable.name, "`new Array<T>(javaArray, T.class)`")
        })?;
        let method = unit.naming.name(Role::InputBind, &variable.name, bind.id);
        let (jni, region) = (jni_type(primitive), jni_region(primitive));
        let mut function = JniFunction::new(method.clone(), "long");
        function
            .param("long", "runtimeHandle")
            .param(element.host_array, "array");
        function
            .body
            .line(RUNTIME)
            .line("jsize length = env->GetArrayLength(array);")
            .line(format!("{} *data = env->Get{}ArrayElements(array, nullptr);", jni, region))
            .line(format!(
                "pm::Collection *collection = runtime->collection(sizeof({}), length, 1, data);",
                jni
            ))
            .line(format!("env->Release{}ArrayElements(array, data, JNI_ABORT);", region))
            .line("return pm::handle(collection);");
        emit(unit, &bind.position.class_name, function);
        Ok(vec![format!(
            "{} = {}({}, {});",
            target,
            method,
            unit.naming.fixed("runtime"),
            array.text
        )])
    }

    fn output_bind(&self, unit: &mut TranslationUnit, bind: &OutputBind) -> CompileResult<Vec<String>> {
        let source = &bind.source.variable;
        let destination = &bind.destination;
        let declared = match bind.shape {
            BindShape::DeclarativeAssignment => format!("{} {}", destination.type_name, destination.name),
            _ => destination.name.clone(),
        };
        let naming = unit.naming;
        let method = naming.name(Role::OutputBind, &source.name, bind.id);
        let mut function = JniFunction::new(method.clone(), "void");
        function
            .param("long", "runtimeHandle")
            .param("long", "sourceHandle");
        function.body.line(RUNTIME).line(SOURCE);
        let mut host = CodeWriter::new();

        if bind.source.class.kind.is_image() {
            let name = naming.kernel("toBitmap", bind.id);
            function.param("android.graphics.Bitmap", "bitmap");
            function
                .body
                .line("void *pixels = nullptr;")
                .open("if (source->length == 0 || AndroidBitmap_lockPixels(env, bitmap, &pixels) < 0)")
                .line("return;")
                .close()
                .line("cl_mem staging = runtime->buffer(sizeof(cl_uchar4), source->length, nullptr);")
                .line(launch(
                    &name,
                    "source->length",
                    &["source->buffer".to_string(), "staging".to_string()],
                ))
                .line("runtime->read(staging, source->length * sizeof(cl_uchar4), pixels);")
                .line("AndroidBitmap_unlockPixels(env, bitmap);")
                .line("runtime->release(staging);");
            let packed = KExpr::call(
                "convert_uchar4_sat",
                vec![KExpr::binary(
                    at("image", KExpr::ident("gid")),
                    "*",
                    KExpr::Float(255.0),
                )],
            );
            unit.kernels.function(kernel(
                name,
                vec![
                    KParam::new(ptr(&KType::float4()), "image"),
                    KParam::new(ptr(&KType::Vector(ScalarType::UChar, 4)), "pixels"),
                ],
                vec![global_id(), store("pixels", KExpr::ident("gid"), packed)],
            ));
            if bind.shape != BindShape::None {
                host.line(format!(
                    "{} = android.graphics.Bitmap.createBitmap({}({s}), {}({s}), android.graphics.Bitmap.Config.ARGB_8888);",
                    declared,
                    naming.fixed("width"),
                    naming.fixed("height"),
                    s = source.name
                ));
            }
        } else {
            let element = unit.registry.element(&bind.source.element).ok_or_else(|| {
                CompileError::unsupported(bind.position.line, &bind.source.element, "unknown element type")
            })?;
            let primitive = element.primitive.unwrap_or("float");
            let (jni, region) = (jni_type(primitive), jni_region(primitive));
            function.param(element.host_array, "array");
            function
                .body
                .open("if (source->length == 0)")
                .line("return;")
                .close()
                .line(format!("{} *data = env->Get{}ArrayElements(array, nullptr);", jni, region))
                .line(format!(
                    "runtime->read(source->buffer, source->length * sizeof({}), data);",
                    jni
                ))
                .line(format!("env->Release{}ArrayElements(array, data, 0);", region));
            if bind.shape != BindShape::None {
                host.line(format!(
                    "{} = new {}[{}({})];",
                    declared,
                    primitive,
                    naming.fixed("length"),
                    source.name
                ));
            }
        }
        host.line(format!(
            "{}({}, {}, {});",
            method,
            naming.fixed("runtime"),
            source.name,
            destination.name
        ));
        emit(unit, &bind.position.class_name, function);
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
        let lowered = lower_operation(op, unit.registry, unit.naming, KernelLanguage::OpenCl)?;
        unit.kernels.function(lowered.function.clone());
        let captures = native_captures(unit, op, &lowered)?;
        let plan = KernelPlan {
            lowered: &lowered,
            captures: &captures,
            parallel: op.execution == ExecutionType::Parallel,
        };

        let method = unit.naming.fixed(&format!("{}{}", op.kind, op.id));
        let returns = match op.kind {
            OperationKind::Foreach => "void",
            OperationKind::Map | OperationKind::Filter => "long",
            OperationKind::Reduce => java_primitive(&lowered.input).ok_or_else(|| {
                CompileError::unsupported(op.position.line, &op.source.element, "reduce result has no host type")
            })?,
        };
        let mut function = JniFunction::new(method.clone(), returns);
        function
            .param("long", "runtimeHandle")
            .param("long", "sourceHandle");
        for capture in &captures {
            function.param(capture.java_type(), capture.name.clone());
        }
        function.body.line(RUNTIME).line(SOURCE);
        match op.kind {
            OperationKind::Foreach => NativeTranslator::foreach(unit, op, &plan, &mut function),
            OperationKind::Map => NativeTranslator::map(unit, op, &plan, &mut function),
            OperationKind::Filter => NativeTranslator::filter(unit, op, &plan, &mut function),
            OperationKind::Reduce => NativeTranslator::reduce(unit, op, &plan, &mut function),
        }
        emit(unit, &op.position.class_name, function);

        let mut host = CodeWriter::new();
        for capture in captures.iter().filter(|c| c.by_pointer) {
            host.line(format!(
                "{p}[] {} = new {p}[] {{ {} }};",
                capture.name,
                capture.host_value(),
                p = capture.primitive
            ));
        }
        let mut args = vec![unit.naming.fixed("runtime"), op.source.variable.name.clone()];
        args.extend(captures.iter().map(NativeCapture::java_arg));
        let call = format!("{}({})", method, args.join(", "));
        match (&op.destination, op.kind) {
            (_, OperationKind::Foreach) => {
                host.line(format!("{};", call));
            }
            (Some(destination), OperationKind::Reduce) => {
                let declared = if op.declares_destination {
                    format!("{} {}", destination.type_name, destination.name)
                } else {
                    destination.name.clone()
                };
                host.line(format!("{} = new {}({});", declared, op.source.element, call));
            }
            (Some(destination), _) => {
                let declared = if op.declares_destination {
                    format!("long {}", destination.name)
                } else {
                    destination.name.clone()
                };
                host.line(format!("{} = {};", declared, call));
            }
            (None, kind) => {
                return Err(CompileError::structural(
                    op.position.line,
                    &op.function.text,
                    format!("a destination for `{}`", kind),
                ))
            }
        }
        for capture in captures.iter().filter(|c| c.by_pointer) {
            host.line(format!("{} = {}[0];", capture.host, capture.name));
        }
        Ok(host.into_lines())
    }

    fn method_call(&self, unit: &mut TranslationUnit, call: &MethodCall) -> CompileResult<String> {
        let accessor = match call.method.as_str() {
            "length" => "length",
            "getWidth" => "width",
            "getHeight" => "height",
            other => {
                return Err(CompileError::unsupported(
                    call.position.line,
                    format!("{}.{}", call.variable.class.name, other),
                    format!("no {} translation", self.name()),
                ))
            }
        };
        Ok(format!(
            "{}({})",
            unit.naming.fixed(accessor),
            call.variable.variable.name
        ))
    }

    fn release(&self, unit: &TranslationUnit, variable: &Variable) -> Option<String> {
        Some(format!(
            "{}({}, {});",
            unit.naming.fixed("release"),
            unit.naming.fixed("runtime"),
            variable.name
        ))
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
        let is_static = static_context(unit, &class.binary_name);
        let qualifier = if is_static { "static " } else { "" };
        let mut members = CodeWriter::new();
        if is_static {
            members
                .open("static")
                .line(format!("System.loadLibrary(\"{}\");", LIBRARY_NAME))
                .close()
                .blank();
        }
        members.line(format!(
            "private {}final long {} = {}();",
            qualifier,
            naming.fixed("runtime"),
            naming.fixed("createRuntime")
        ));
        members.blank();
        members.line(format!("private {}native long {}();", qualifier, naming.fixed("createRuntime")));
        for accessor in ["length", "width", "height"] {
            members.line(format!(
                "private {}native int {}(long handle);",
                qualifier,
                naming.fixed(accessor)
            ));
        }
        members.line(format!(
            "private {}native void {}(long runtimeHandle, long handle);",
            qualifier,
            naming.fixed("release")
        ));
        members.blank();
        members.extend(unit.members(&class.binary_name));
        members.blank();
        members.into_lines()
    }

    fn device_files(&self, unit: TranslationUnit) -> CompileResult<Vec<GeneratedFile>> {
        let class_name = unit.class_name().to_string();
        let naming = unit.naming;
        let source = naming.fixed("kernelSource");
        let package = unit.ir.package.as_deref();

        let mut cpp = CodeWriter::new();
        cpp.line("#include <jni.h>");
        cpp.line("#include <android/bitmap.h>");
        cpp.blank();
        cpp.line("#include \"PMRuntime.hpp\"");
        cpp.line(format!("#include \"{}_kernels.h\"", class_name));
        cpp.blank();
        cpp.line("extern \"C\" {");
        for class in unit.ir.classes_in_use() {
            let symbol = |method: &str| jni_symbol(package, &class.binary_name, &naming.fixed(method));
            let mut create = JniFunction::new(naming.fixed("createRuntime"), "long");
            create
                .body
                .line(format!("return pm::handle(new pm::Runtime({}));", source));
            cpp.blank();
            cpp.extend(create.definition(&symbol("createRuntime")));
            for (accessor, field) in [("length", "length"), ("width", "width"), ("height", "height")] {
                let mut function = JniFunction::new(naming.fixed(accessor), "int");
                function.param("long", "handle");
                function.body.line(format!(
                    "return static_cast<jint>(pm::Collection::from(handle)->{});",
                    field
                ));
                cpp.blank();
                cpp.extend(function.definition(&symbol(accessor)));
            }
            let mut release = JniFunction::new(naming.fixed("release"), "void");
            release.param("long", "runtimeHandle").param("long", "handle");
            release
                .body
                .line(RUNTIME)
                .line("runtime->free(pm::Collection::from(handle));");
            cpp.blank();
            cpp.extend(release.definition(&symbol("release")));
        }
        cpp.extend(unit.native.into_lines());
        cpp.blank();
        cpp.line("}");

        let kernels = KernelRenderer::new(&OpenClDialect).render(&unit.kernels);
        let guard = format!("PM_{}_KERNELS_H", class_name.to_ascii_uppercase());
        let header = format!(
            "#ifndef {guard}\n#define {guard}\n\nstatic const char {source}[] = R\"PM_CL({kernels})PM_CL\";\n\n#endif\n",
            guard = guard,
            source = source,
            kernels = kernels
        );
        log::info!("generated JNI glue for {}", class_name);
        Ok(vec![
            GeneratedFile::new(format!("jni/{}.cpp", class_name), FileKind::Native, cpp.finish()),
            GeneratedFile::new(format!("jni/{}_kernels.h", class_name), FileKind::Kernel, header),
        ])
    }

    fn support_files(&self) -> Vec<GeneratedFile> {
        vec![
            GeneratedFile::new("jni/PMRuntime.hpp", FileKind::Support, RUNTIME_HEADER),
            GeneratedFile::new("jni/Android.mk", FileKind::Support, ANDROID_MK),
            GeneratedFile::new("jni/Application.mk", FileKind::Support, APPLICATION_MK),
        ]
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

    fn compile(body: &str) -> (String, String, String) {
        let source = format!(
            "{}public class Sample {{\n    public int[] run(final int[] data, Bitmap bmp) {{\n{}\n    }}\n}}\n",
            HEADER, body
        );
        let ir = SourceAnalyzer::default()
            .analyze(&source, "Sample", &mut SequenceCounter::new())
            .unwrap();
        let files = translate_file(
            &NativeTranslator::new(),
            &ir,
            &source,
            &NamingScheme::default(),
            &LibraryRegistry::new(),
        )
        .unwrap();
        let paths: Vec<_> = files.iter().map(|f| f.path.to_string_lossy().into_owned()).collect();
        assert_eq!(paths, ["org/example/Sample.java", "jni/Sample.cpp", "jni/Sample_kernels.h"]);
        (
            files[0].contents.clone(),
            files[1].contents.clone(),
            files[2].contents.clone(),
        )
    }

    #[test]
    fn test_jni_mangling() {
        assert_eq!(jni_mangle("org.example.Sample$Inner"), "org_example_Sample_00024Inner");
        assert_eq!(jni_mangle("PM_foreach2"), "PM_1foreach2");
        assert_eq!(jni_mangle("caf\u{e9}"), "caf_000e9");
        assert_eq!(
            jni_symbol(Some("a.b"), "C", "PM_length"),
            "Java_a_b_C_PM_1length"
        );
        assert_eq!(jni_symbol(None, "C", "m"), "Java_C_m");
    }

    #[test]
    fn test_jni_types() {
        assert_eq!(jni_type("int"), "jint");
        assert_eq!(jni_type("float[]"), "jfloatArray");
        assert_eq!(jni_type("android.graphics.Bitmap"), "jobject");
        assert_eq!(jni_type("void"), "void");
        assert_eq!(jni_region("short"), "Short");
    }

    #[test]
    fn test_parallel_foreach() {
        let (host, cpp, kernels) = compile(
            "        Array<Int32> a = new Array<Int32>(data, Int32.class);\n        a.par().foreach(x -> { x.value = x.value * 2; });\n        int[] out = a.toJavaArray();\n        return out;",
        );
        assert!(!host.contains("Array<"), "{}", host);
        assert!(host.contains("long a = PM_inputBindA1(PM_runtime, data);"), "{}", host);
        assert!(host.contains("        PM_foreach2(PM_runtime, a);\n"), "{}", host);
        assert!(host.contains("int[] out = new int[PM_length(a)];\n            PM_outputBindA3(PM_runtime, a, out);"), "{}", host);
        assert!(host.contains("System.loadLibrary(\"ParallelMEGenerated\");"));
        assert!(host.contains("private static final long PM_runtime = PM_createRuntime();"));
        assert!(host.contains("private static native void PM_foreach2(long runtimeHandle, long sourceHandle);"), "{}", host);

        assert!(cpp.contains("JNIEXPORT void JNICALL Java_org_example_Sample_PM_1foreach2(JNIEnv *env, jobject self, jlong runtimeHandle, jlong sourceHandle) {"), "{}", cpp);
        assert!(cpp.contains("runtime->launch(\"PM_kernelForeach2\", source->length, source->buffer);"), "{}", cpp);
        assert!(cpp.contains("Java_org_example_Sample_PM_1createRuntime(JNIEnv *env, jobject self)"));

        assert!(kernels.contains("R\"PM_CL("));
        assert!(kernels.contains("__kernel void PM_kernelForeach2(__global int *data) {"), "{}", kernels);
        assert!(kernels.contains("data[gid] = PM_function2(data[gid]);"), "{}", kernels);
    }

    #[test]
    fn test_sequential_foreach_passes_capture_buffers() {
        let (host, cpp, kernels) = compile(
            "        int total = 0;\n        Array<Int32> a = new Array<Int32>(data, Int32.class);\n        a.par().foreach(x -> { total += x.value; });\n        return null;",
        );
        assert!(host.contains("int[] PM_captureTotal2 = new int[] { total };\n            PM_foreach2(PM_runtime, a, PM_captureTotal2);\n            total = PM_captureTotal2[0];"), "{}", host);
        assert!(cpp.contains("env->GetIntArrayRegion(PM_captureTotal2, 0, 1, PM_captureTotal2Value);"));
        assert!(cpp.contains("runtime->launch(\"PM_kernelForeach2\", 1, source->buffer, static_cast<cl_int>(source->length), PM_captureTotal2Buffer);"), "{}", cpp);
        assert!(kernels.contains("__kernel void PM_kernelForeach2(__global int *data, int length, __global int *PM_captureTotal2) {"), "{}", kernels);
    }

    #[test]
    fn test_reduce_and_filter() {
        let (host, cpp, kernels) = compile(
            "        Array<Int32> a = new Array<Int32>(data, Int32.class);\n        Array<Int32> b = a.par().filter(x -> x.value > 1);\n        Int32 sum = b.par().reduce((x, y) -> new Int32(x.value + y.value));\n        return null;",
        );
        assert!(host.contains("long b = PM_filter2(PM_runtime, a);"), "{}", host);
        assert!(host.contains("Int32 sum = new Int32(PM_reduce3(PM_runtime, b));"), "{}", host);
        assert!(cpp.contains("env->ThrowNew(env->FindClass(\"java/util/NoSuchElementException\")"));
        assert!(cpp.contains("cl_int tileSize = static_cast<cl_int>(pm::isqrt(source->length));"));
        assert!(cpp.contains("if (count > 0) {"));
        assert!(kernels.contains("atomic_inc(count);"), "{}", kernels);
        assert!(kernels.contains("__kernel void PM_kernelTile3(__global int *data, __global int *tile, int tileSize) {"), "{}", kernels);
    }

    #[test]
    fn test_local_handles_are_released_when_block_is_left() {
        let (host, cpp, _) = compile(
            "        Array<Int32> a = new Array<Int32>(data, Int32.class);\n        Array<Int32> b = a.par().filter(x -> x.value > 1);\n        return null;",
        );
        let body = "        long a = PM_inputBindA1(PM_runtime, data);
        try {
            long b = PM_filter2(PM_runtime, a);
            try {
                return null;
            } finally {
                PM_release(PM_runtime, b);
            }
        } finally {
            PM_release(PM_runtime, a);
        }
    }
";
        assert!(host.contains(body), "{}", host);
        assert!(host.contains("private static native void PM_release(long runtimeHandle, long handle);"), "{}", host);
        assert!(cpp.contains("JNIEXPORT void JNICALL Java_org_example_Sample_PM_1release(JNIEnv *env, jobject self, jlong runtimeHandle, jlong handle) {"), "{}", cpp);
        assert!(cpp.contains("runtime->free(pm::Collection::from(handle));"));
    }

    #[test]
    fn test_handle_in_nested_block_is_released_there() {
        let (host, _, _) = compile(
            "        if (data.length > 0) {\n            Array<Int32> a = new Array<Int32>(data, Int32.class);\n            a.par().foreach(x -> { x.value = 0; });\n\n            a.toJavaArray(data);\n        }\n        return data;",
        );
        let block = "        if (data.length > 0) {
            long a = PM_inputBindA1(PM_runtime, data);
            try {
                PM_foreach2(PM_runtime, a);

                PM_outputBindA3(PM_runtime, a, data);
            } finally {
                PM_release(PM_runtime, a);
            }
        }
        return data;
";
        assert!(host.contains(block), "{}", host);
    }

    #[test]
    fn test_bitmap_foreach_goes_through_float_pixels() {
        let (host, cpp, kernels) = compile(
            "        BitmapImage img = new BitmapImage(bmp);\n        img.par().foreach(p -> { p.rgba.red = 1.0f - p.rgba.red; });\n        img.toBitmap(bmp);\n        return null;",
        );
        assert!(host.contains("long img = PM_inputBindImg1(PM_runtime, bmp);"), "{}", host);
        assert!(host.contains("PM_foreach2(PM_runtime, img);"));
        assert!(host.contains("PM_outputBindImg3(PM_runtime, img, bmp);"), "{}", host);
        assert!(host.contains("private static native long PM_inputBindImg1(long runtimeHandle, android.graphics.Bitmap bitmap);"), "{}", host);
        assert!(cpp.contains("AndroidBitmap_lockPixels(env, bitmap, &pixels)"));
        assert!(cpp.contains("runtime->launch(\"PM_kernelForeach2\", source->length, source->buffer, static_cast<cl_int>(source->width));"), "{}", cpp);
        assert!(kernels.contains("image[gid] = convert_float4(pixels[gid]) / 255.0f;"), "{}", kernels);
        assert!(kernels.contains("__kernel void PM_kernelForeach2(__global float4 *data, int width) {"), "{}", kernels);
        assert!(kernels.contains("data[gid] = PM_function2(data[gid], x, y);"), "{}", kernels);
        assert!(kernels.contains("pixels[gid] = convert_uchar4_sat(image[gid] * 255.0f);"), "{}", kernels);
    }

    #[test]
    fn test_support_files() {
        let files = NativeTranslator::new().support_files();
        let paths: Vec<_> = files.iter().map(|f| f.path.to_string_lossy().into_owned()).collect();
        assert_eq!(paths, ["jni/PMRuntime.hpp", "jni/Android.mk", "jni/Application.mk"]);
        assert!(files[1].contents.contains(LIBRARY_NAME));
        assert!(files.iter().all(|f| f.kind == FileKind::Support));
        assert!(files[0].contents.contains("void free(Collection *collection) {"));
        assert!(files[0].contents.contains("collections_.insert(collection);"));
    }
}
