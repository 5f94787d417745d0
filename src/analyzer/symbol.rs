use std::collections::HashMap;

use crate::diagnostics::Span;

pub type SymbolId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    Class,
    Method,
    /// Method bodies, blocks, `for` headers, lambdas and initializers.
    MethodBody,
    Variable,
    LibraryVariable,
    Creator,
    Literal,
    Expression,
}

impl SymbolKind {
    pub fn is_scope(&self) -> bool {
        matches!(
            self,
            SymbolKind::Class | SymbolKind::Method | SymbolKind::MethodBody | SymbolKind::Creator
        )
    }

    pub fn is_variable(&self) -> bool {
        matches!(self, SymbolKind::Variable | SymbolKind::LibraryVariable)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Symbol {
    pub id: SymbolId,
    pub kind: SymbolKind,
    pub name: String,
    pub type_name: String,
    pub type_parameter: Option<String>,
    pub modifiers: Vec<String>,
    pub parent: Option<SymbolId>,
    /// For variables, the whole declaring statement.
    pub span: Span,
    pub children: Vec<SymbolId>,
    /// Variable a creator initializes, if any.
    pub owner: Option<SymbolId>,
}

impl Symbol {
    pub fn is_final(&self) -> bool {
        self.modifiers.iter().any(|m| m == "final")
    }
}

/// Arena of symbols. Scopes own their children by index.
#[derive(Debug, Clone, Default)]
pub struct ScopeTree {
    symbols: Vec<Symbol>,
    roots: Vec<SymbolId>,
    lambda_scopes: HashMap<usize, SymbolId>,
}

impl ScopeTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(
        &mut self,
        parent: Option<SymbolId>,
        kind: SymbolKind,
        name: impl Into<String>,
        span: Span,
    ) -> SymbolId {
        let id = self.symbols.len();
        self.symbols.push(Symbol {
            id,
            kind,
            name: name.into(),
            type_name: String::new(),
            type_parameter: None,
            modifiers: Vec::new(),
            parent,
            span,
            children: Vec::new(),
            owner: None,
        });
        match parent {
            Some(parent) => self.symbols[parent].children.push(id),
            None => self.roots.push(id),
        }
        id
    }

    pub fn get(&self, id: SymbolId) -> &Symbol {
        &self.symbols[id]
    }

    pub fn get_mut(&mut self, id: SymbolId) -> &mut Symbol {
        &mut self.symbols[id]
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Symbol> {
        self.symbols.iter()
    }

    pub fn roots(&self) -> &[SymbolId] {
        &self.roots
    }

    pub fn register_lambda(&mut self, lambda_start: usize, scope: SymbolId) {
        self.lambda_scopes.insert(lambda_start, scope);
    }

    pub fn lambda_scope(&self, lambda_start: usize) -> Option<SymbolId> {
        self.lambda_scopes.get(&lambda_start).copied()
    }

    /// Innermost scope whose range contains `pos`.
    pub fn scope_at(&self, pos: usize) -> Option<SymbolId> {
        let mut current = self
            .roots
            .iter()
            .copied()
            .find(|&id| self.symbols[id].kind.is_scope() && self.symbols[id].span.contains(pos))?;
        'descend: loop {
            for &child in &self.symbols[current].children {
                let symbol = &self.symbols[child];
                if symbol.kind.is_scope() && symbol.span.contains(pos) {
                    current = child;
                    continue 'descend;
                }
            }
            return Some(current);
        }
    }

    /// Variable named `name` declared directly in `scope`.
    pub fn lookup_local(&self, scope: SymbolId, name: &str) -> Option<SymbolId> {
        self.symbols[scope]
            .children
            .iter()
            .rev()
            .copied()
            .find(|&id| self.symbols[id].kind.is_variable() && self.symbols[id].name == name)
    }

    /// Variable visible as `name` at offset `at`, searching enclosing scopes.
    /// Class members are visible everywhere in the class; locals only after
    /// their declaration starts.
    pub fn resolve(&self, scope: SymbolId, name: &str, at: usize) -> Option<SymbolId> {
        let mut current = Some(scope);
        while let Some(id) = current {
            let scope = &self.symbols[id];
            let class_scope = scope.kind == SymbolKind::Class;
            let found = scope.children.iter().rev().copied().find(|&child| {
                let symbol = &self.symbols[child];
                symbol.kind.is_variable()
                    && symbol.name == name
                    && (class_scope || symbol.span.start <= at)
            });
            if found.is_some() {
                return found;
            }
            current = scope.parent;
        }
        None
    }

    /// Resolve from the innermost scope at `at`.
    pub fn resolve_at(&self, name: &str, at: usize) -> Option<SymbolId> {
        self.resolve(self.scope_at(at)?, name, at)
    }

    /// True when `id` is `ancestor` or nested below it.
    pub fn is_within(&self, id: SymbolId, ancestor: SymbolId) -> bool {
        let mut current = Some(id);
        while let Some(node) = current {
            if node == ancestor {
                return true;
            }
            current = self.symbols[node].parent;
        }
        false
    }

    pub fn enclosing_class(&self, id: SymbolId) -> Option<SymbolId> {
        let mut current = self.symbols[id].parent;
        while let Some(node) = current {
            if self.symbols[node].kind == SymbolKind::Class {
                return Some(node);
            }
            current = self.symbols[node].parent;
        }
        None
    }

    /// Binary name of a class symbol, `Outer$Inner` for nested classes.
    pub fn binary_name(&self, class: SymbolId) -> String {
        match self.enclosing_class(class) {
            Some(outer) => format!("{}${}", self.binary_name(outer), self.symbols[class].name),
            None => self.symbols[class].name.clone(),
        }
    }

    /// Creators registered for `variable`.
    pub fn creators_of(&self, variable: SymbolId) -> impl Iterator<Item = &Symbol> {
        self.symbols
            .iter()
            .filter(move |s| s.kind == SymbolKind::Creator && s.owner == Some(variable))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> (ScopeTree, SymbolId, SymbolId, SymbolId) {
        let mut tree = ScopeTree::new();
        let class = tree.add(None, SymbolKind::Class, "A", Span::new(0, 100));
        let field = tree.add(Some(class), SymbolKind::Variable, "f", Span::new(80, 90));
        let method = tree.add(Some(class), SymbolKind::Method, "run", Span::new(10, 70));
        let body = tree.add(Some(method), SymbolKind::MethodBody, "<body>", Span::new(20, 70));
        let local = tree.add(Some(body), SymbolKind::Variable, "x", Span::new(30, 40));
        let _ = field;
        (tree, class, body, local)
    }

    #[test]
    fn test_scope_at_finds_innermost() {
        let (tree, class, body, _) = sample();
        assert_eq!(tree.scope_at(25), Some(body));
        assert_eq!(tree.scope_at(5), Some(class));
        assert_eq!(tree.scope_at(150), None);
    }

    #[test]
    fn test_resolve_respects_declaration_order_for_locals_only() {
        let (tree, _, body, local) = sample();
        assert_eq!(tree.resolve(body, "x", 25), None);
        assert_eq!(tree.resolve(body, "x", 45), Some(local));
        // fields are visible before their textual declaration
        assert!(tree.resolve(body, "f", 25).is_some());
    }

    #[test]
    fn test_local_lookup_does_not_climb() {
        let (tree, class, body, local) = sample();
        assert_eq!(tree.lookup_local(body, "x"), Some(local));
        assert_eq!(tree.lookup_local(body, "f"), None);
        assert!(tree.lookup_local(class, "f").is_some());
    }

    #[test]
    fn test_ids_increase_in_declaration_order() {
        let (tree, ..) = sample();
        let ids: Vec<_> = tree.iter().map(|s| s.id).collect();
        assert!(ids.windows(2).all(|w| w[0] < w[1]));
        assert!(tree.iter().skip(1).all(|s| s.parent.is_some()));
    }
}
