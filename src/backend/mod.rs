//! Code generation targets.

pub mod native;
pub mod renderscript;

use std::fmt;
use std::str::FromStr;

use crate::codegen::kernel_ast::{KExpr, KStmt, KType, ScalarType};
use crate::codegen::BackendTranslator;
use crate::ir::Variable;
use crate::registry::LibraryRegistry;

pub use native::NativeTranslator;
pub use renderscript::RenderScriptTranslator;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TargetBackend {
    #[default]
    RenderScript,
    Native,
}

impl TargetBackend {
    pub fn translator(&self) -> Box<dyn BackendTranslator> {
        match self {
            TargetBackend::RenderScript => Box::new(RenderScriptTranslator::new()),
            TargetBackend::Native => Box::new(NativeTranslator::new()),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TargetBackend::RenderScript => "renderscript",
            TargetBackend::Native => "native",
        }
    }
}

impl fmt::Display for TargetBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TargetBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "renderscript" | "rs" => Ok(TargetBackend::RenderScript),
            "native" | "opencl" => Ok(TargetBackend::Native),
            other => Err(format!(
                "unknown target `{}`, expected `renderscript` or `native`",
                other
            )),
        }
    }
}

/// Java primitive carrying a kernel scalar on the host.
pub(crate) fn java_primitive(ty: &KType) -> Option<&'static str> {
    Some(match ty {
        KType::Scalar(ScalarType::Bool) => "boolean",
        KType::Scalar(ScalarType::Char) => "byte",
        KType::Scalar(ScalarType::Short) => "short",
        KType::Scalar(ScalarType::Int) => "int",
        KType::Scalar(ScalarType::Long) => "long",
        KType::Scalar(ScalarType::Float) => "float",
        KType::Scalar(ScalarType::Double) => "double",
        _ => return None,
    })
}

/// Host expression holding a captured value; element wrappers expose `value`.
pub(crate) fn host_value(registry: &LibraryRegistry, variable: &Variable) -> String {
    if registry.element(&variable.type_name).is_some() {
        format!("{}.value", variable.name)
    } else {
        variable.name.clone()
    }
}

/// Java primitive type of a captured variable as declared on the host.
pub(crate) fn host_primitive(registry: &LibraryRegistry, variable: &Variable) -> String {
    registry
        .element(&variable.type_name)
        .and_then(|e| e.primitive)
        .map(str::to_string)
        .unwrap_or_else(|| variable.type_name.clone())
}

/// RGBE to linear `float4`: `(channel + 0.5) * 2^(e - 136)`, black when `e == 0`.
pub(crate) fn rgbe_decode(pixel: KExpr, finish: &dyn Fn(KExpr) -> KStmt) -> Vec<KStmt> {
    let float = KType::Scalar(ScalarType::Float);
    let exponent = KExpr::member(pixel.clone(), "w");
    let scale = KExpr::call(
        "ldexp",
        vec![
            KExpr::Float(1.0),
            KExpr::binary(
                KExpr::cast(KType::int(), exponent.clone()),
                "-",
                KExpr::Int(136),
            ),
        ],
    );
    let channel = |lane: &str| {
        KExpr::binary(
            KExpr::binary(
                KExpr::cast(float.clone(), KExpr::member(pixel.clone(), lane)),
                "+",
                KExpr::Float(0.5),
            ),
            "*",
            KExpr::ident("f"),
        )
    };
    let lane = |name: &str| KExpr::member(KExpr::ident("color"), name);
    vec![
        KStmt::decl(
            KType::float4(),
            "color",
            KExpr::Vector {
                ty: KType::float4(),
                items: vec![
                    KExpr::Float(0.0),
                    KExpr::Float(0.0),
                    KExpr::Float(0.0),
                    KExpr::Float(1.0),
                ],
            },
        ),
        KStmt::If {
            condition: KExpr::binary(exponent, "!=", KExpr::Int(0)),
            then_body: vec![
                KStmt::decl(float.clone(), "f", scale),
                KStmt::expr(KExpr::assign(lane("x"), channel("x"))),
                KStmt::expr(KExpr::assign(lane("y"), channel("y"))),
                KStmt::expr(KExpr::assign(lane("z"), channel("z"))),
            ],
            else_body: None,
        },
        finish(KExpr::ident("color")),
    ]
}
