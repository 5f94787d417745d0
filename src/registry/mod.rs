//! Static catalog of the user-library classes the compiler understands.

use std::fmt;

pub const DSL_PACKAGE: &str = "org.parallelme.userlibrary";
pub const DATATYPE_PACKAGE: &str = "org.parallelme.userlibrary.datatype";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Foreach,
    Map,
    Filter,
    Reduce,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Foreach => "foreach",
            OperationKind::Map => "map",
            OperationKind::Filter => "filter",
            OperationKind::Reduce => "reduce",
        }
    }

    pub fn requires_destination(&self) -> bool {
        !matches!(self, OperationKind::Foreach)
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How a method name chained after `.par()` is recognized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperationShape {
    pub method: &'static str,
    pub kind: OperationKind,
    pub lambda_arity: usize,
    /// `map` may take the destination element class before the lambda.
    pub accepts_class_literal: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MethodDescriptor {
    pub name: &'static str,
    pub return_type: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerKind {
    Array,
    BitmapImage,
    HdrImage,
}

impl ContainerKind {
    pub fn is_image(&self) -> bool {
        !matches!(self, ContainerKind::Array)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LibraryClassDescriptor {
    pub name: &'static str,
    pub package: &'static str,
    pub kind: ContainerKind,
    /// Number of type arguments a declaration must carry (0 or 1).
    pub generic_arity: usize,
    /// Admissible element types; the only entry for non-generic classes.
    pub element_types: &'static [&'static str],
    /// Host-side types of the constructor arguments.
    pub constructor: &'static [&'static str],
    pub output_bind: &'static str,
    pub methods: &'static [MethodDescriptor],
    pub operations: &'static [OperationShape],
}

impl LibraryClassDescriptor {
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.package, self.name)
    }

    pub fn operation(&self, method: &str) -> Option<&OperationShape> {
        self.operations.iter().find(|op| op.method == method)
    }

    pub fn method(&self, name: &str) -> Option<&MethodDescriptor> {
        self.methods.iter().find(|m| m.name == name)
    }

    pub fn accepts_element(&self, element: &str) -> bool {
        self.element_types.contains(&element)
    }

    /// Element type of a non-generic class.
    pub fn fixed_element(&self) -> Option<&'static str> {
        if self.generic_arity == 0 {
            self.element_types.first().copied()
        } else {
            None
        }
    }
}

/// Scalar element wrapper or pixel exposed to user functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElementDescriptor {
    pub name: &'static str,
    /// Java primitive held in `value`, `None` for pixels.
    pub primitive: Option<&'static str>,
    /// Host-side Java array type used to carry a collection of this element.
    pub host_array: &'static str,
}

impl ElementDescriptor {
    pub fn is_pixel(&self) -> bool {
        self.primitive.is_none()
    }
}

const OPERATIONS: &[OperationShape] = &[
    OperationShape {
        method: "foreach",
        kind: OperationKind::Foreach,
        lambda_arity: 1,
        accepts_class_literal: false,
    },
    OperationShape {
        method: "forEach",
        kind: OperationKind::Foreach,
        lambda_arity: 1,
        accepts_class_literal: false,
    },
    OperationShape {
        method: "map",
        kind: OperationKind::Map,
        lambda_arity: 1,
        accepts_class_literal: true,
    },
    OperationShape {
        method: "filter",
        kind: OperationKind::Filter,
        lambda_arity: 1,
        accepts_class_literal: false,
    },
    OperationShape {
        method: "reduce",
        kind: OperationKind::Reduce,
        lambda_arity: 2,
        accepts_class_literal: false,
    },
];

const IMAGE_METHODS: &[MethodDescriptor] = &[
    MethodDescriptor {
        name: "getWidth",
        return_type: "int",
    },
    MethodDescriptor {
        name: "getHeight",
        return_type: "int",
    },
];

static CLASSES: [LibraryClassDescriptor; 3] = [
    LibraryClassDescriptor {
        name: "Array",
        package: DSL_PACKAGE,
        kind: ContainerKind::Array,
        generic_arity: 1,
        element_types: &["Int16", "Int32", "Float32"],
        constructor: &["javaArray", "Class"],
        output_bind: "toJavaArray",
        methods: &[MethodDescriptor {
            name: "length",
            return_type: "int",
        }],
        operations: OPERATIONS,
    },
    LibraryClassDescriptor {
        name: "BitmapImage",
        package: "org.parallelme.userlibrary.image",
        kind: ContainerKind::BitmapImage,
        generic_arity: 0,
        element_types: &["Pixel"],
        constructor: &["Bitmap"],
        output_bind: "toBitmap",
        methods: IMAGE_METHODS,
        operations: OPERATIONS,
    },
    LibraryClassDescriptor {
        name: "HDRImage",
        package: "org.parallelme.userlibrary.image",
        kind: ContainerKind::HdrImage,
        generic_arity: 0,
        element_types: &["Pixel"],
        constructor: &["byte[]", "int", "int"],
        output_bind: "toBitmap",
        methods: IMAGE_METHODS,
        operations: OPERATIONS,
    },
];

static ELEMENTS: [ElementDescriptor; 4] = [
    ElementDescriptor {
        name: "Int16",
        primitive: Some("short"),
        host_array: "short[]",
    },
    ElementDescriptor {
        name: "Int32",
        primitive: Some("int"),
        host_array: "int[]",
    },
    ElementDescriptor {
        name: "Float32",
        primitive: Some("float"),
        host_array: "float[]",
    },
    ElementDescriptor {
        name: "Pixel",
        primitive: None,
        host_array: "float[]",
    },
];

/// Read-only view over the library catalog.
#[derive(Debug, Clone, Copy)]
pub struct LibraryRegistry {
    classes: &'static [LibraryClassDescriptor],
    elements: &'static [ElementDescriptor],
}

impl Default for LibraryRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl LibraryRegistry {
    pub fn new() -> Self {
        Self {
            classes: &CLASSES,
            elements: &ELEMENTS,
        }
    }

    /// Looks a class up by simple or fully qualified name.
    pub fn class(&self, name: &str) -> Option<&'static LibraryClassDescriptor> {
        let simple = name.rsplit('.').next().unwrap_or(name);
        self.classes.iter().find(|class| {
            class.name == simple && (simple == name || class.qualified_name() == name)
        })
    }

    pub fn is_library_type(&self, name: &str) -> bool {
        self.class(name).is_some()
    }

    pub fn element(&self, name: &str) -> Option<&'static ElementDescriptor> {
        let simple = name.rsplit('.').next().unwrap_or(name);
        self.elements.iter().find(|e| e.name == simple)
    }

    pub fn classes(&self) -> impl Iterator<Item = &'static LibraryClassDescriptor> {
        self.classes.iter()
    }

    /// Imports that disappear from the rewritten host file. Element types
    /// stay visible to the host, so the datatype package is kept.
    pub fn is_removable_import(&self, path: &str) -> bool {
        let in_dsl = path == DSL_PACKAGE || path.starts_with(&format!("{}.", DSL_PACKAGE));
        let in_datatype =
            path == DATATYPE_PACKAGE || path.starts_with(&format!("{}.", DATATYPE_PACKAGE));
        in_dsl && !in_datatype
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_by_simple_and_qualified_name() {
        let registry = LibraryRegistry::new();
        assert_eq!(registry.class("Array").unwrap().kind, ContainerKind::Array);
        assert!(registry.class("org.parallelme.userlibrary.Array").is_some());
        assert!(registry.class("java.util.Array").is_none());
        assert_eq!(
            registry.class("BitmapImage").unwrap().fixed_element(),
            Some("Pixel")
        );
    }

    #[test]
    fn test_operation_shapes() {
        let array = LibraryRegistry::new().class("Array").unwrap();
        assert_eq!(array.operation("reduce").unwrap().lambda_arity, 2);
        assert_eq!(array.operation("forEach").unwrap().kind, OperationKind::Foreach);
        assert!(array.operation("map").unwrap().accepts_class_literal);
        assert!(array.operation("sort").is_none());
        assert!(array.method("length").is_some());
        assert!(array.accepts_element("Float32"));
        assert!(!array.accepts_element("Pixel"));
    }

    #[test]
    fn test_removable_imports_keep_datatypes() {
        let registry = LibraryRegistry::new();
        assert!(registry.is_removable_import("org.parallelme.userlibrary.Array"));
        assert!(registry.is_removable_import("org.parallelme.userlibrary.image"));
        assert!(!registry.is_removable_import("org.parallelme.userlibrary.datatype.Int32"));
        assert!(!registry.is_removable_import("org.parallelme.userlibrary.datatype"));
        assert!(!registry.is_removable_import("java.util.List"));
    }
}
