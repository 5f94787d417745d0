use std::fmt;

pub const DEFAULT_PREFIX: &str = "PM_";

/// What a generated identifier stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Input,
    Output,
    Storage,
    Tile,
    TileSize,
    SizeAllocation,
    Index,
    Count,
    Capture,
    Function,
    Kernel,
    InputBind,
    OutputBind,
    Length,
    Width,
    Height,
    Result,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Input => "input",
            Role::Output => "output",
            Role::Storage => "storage",
            Role::Tile => "tile",
            Role::TileSize => "tileSize",
            Role::SizeAllocation => "sizeAllocation",
            Role::Index => "index",
            Role::Count => "count",
            Role::Capture => "capture",
            Role::Function => "function",
            Role::Kernel => "kernel",
            Role::InputBind => "inputBind",
            Role::OutputBind => "outputBind",
            Role::Length => "length",
            Role::Width => "width",
            Role::Height => "height",
            Role::Result => "result",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Deterministic identifiers: `<prefix><role><UpperCamel(base)><id>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamingScheme {
    prefix: String,
}

impl Default for NamingScheme {
    fn default() -> Self {
        Self::new(DEFAULT_PREFIX)
    }
}

impl NamingScheme {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn name(&self, role: Role, base: &str, id: usize) -> String {
        let base = upper_camel(base);
        let separator = if base.ends_with(|c: char| c.is_ascii_digit()) {
            "_"
        } else {
            ""
        };
        format!("{}{}{}{}{}", self.prefix, role.as_str(), base, separator, id)
    }

    /// A per-class name with no id, e.g. `PM_mScript`.
    pub fn fixed(&self, name: &str) -> String {
        format!("{}{}", self.prefix, name)
    }

    pub fn function(&self, id: usize) -> String {
        self.name(Role::Function, "", id)
    }

    pub fn kernel(&self, stage: &str, id: usize) -> String {
        self.name(Role::Kernel, stage, id)
    }

    /// Device storage standing in for a library variable.
    pub fn storage(&self, variable: &str, symbol_id: usize) -> String {
        self.name(Role::Storage, variable, symbol_id)
    }

    pub fn capture(&self, variable: &str, id: usize) -> String {
        self.name(Role::Capture, variable, id)
    }
}

/// Uppercases a leading lowercase letter and escapes everything else that
/// could make two bases collide: `__` is `_`, `_1` is `$`, `_0` marks a first
/// character kept as written, and `_x<hex>_` is any other character. Letters
/// and digits pass through.
pub fn upper_camel(base: &str) -> String {
    let mut out = String::with_capacity(base.len());
    for (i, c) in base.chars().enumerate() {
        match c {
            'a'..='z' if i == 0 => out.push(c.to_ascii_uppercase()),
            'A'..='Z' if i == 0 => {
                out.push_str("_0");
                out.push(c);
            }
            'a'..='z' | 'A'..='Z' | '0'..='9' => out.push(c),
            '_' => out.push_str("__"),
            '$' => out.push_str("_1"),
            other => out.push_str(&format!("_x{:x}_", u32::from(other))),
        }
    }
    out
}
