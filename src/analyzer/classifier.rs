use crate::diagnostics::Diagnostic;
use crate::ir::{ExecutionType, FileIr, IrNode, Variable};

/// Decides whether an operation can run in parallel.
pub struct OperationClassifier;

impl OperationClassifier {
    /// Parallel iff every captured variable is final.
    pub fn classify(captures: &[Variable]) -> ExecutionType {
        if captures.iter().all(|c| c.is_final) {
            ExecutionType::Parallel
        } else {
            ExecutionType::Sequential
        }
    }

    /// Classifies every operation in `ir` and records a warning for each
    /// one that has to run sequentially.
    pub fn apply(ir: &mut FileIr) {
        let mut warnings = Vec::new();
        for node in &mut ir.nodes {
            let IrNode::Operation(op) = node else {
                continue;
            };
            op.execution = Self::classify(&op.captures);
            if op.execution == ExecutionType::Sequential {
                let mutable: Vec<_> = op
                    .non_final_captures()
                    .map(|c| format!("`{}`", c.name))
                    .collect();
                log::warn!(
                    "line {}: {} over `{}` runs sequentially; captured non-final variable(s) {}",
                    op.position.line,
                    op.kind,
                    op.source.variable.name,
                    mutable.join(", ")
                );
                warnings.push(
                    Diagnostic::warning(
                        op.position.line,
                        format!("{} over `{}` will run sequentially", op.kind, op.source.variable.name),
                    )
                    .with_note(format!("captured non-final variable(s): {}", mutable.join(", ")))
                    .with_note("declare them `final` to allow parallel execution"),
                );
            }
        }
        ir.diagnostics.extend(warnings);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn capture(name: &str, is_final: bool) -> Variable {
        Variable {
            name: name.to_string(),
            type_name: "int".to_string(),
            type_parameter: None,
            is_final,
            symbol_id: 0,
        }
    }

    #[test]
    fn test_sequential_iff_some_capture_is_mutable() {
        let cases: Vec<Vec<Variable>> = vec![
            vec![],
            vec![capture("a", true)],
            vec![capture("a", true), capture("b", false)],
            vec![capture("a", false)],
            vec![capture("a", true), capture("b", true), capture("c", true)],
        ];
        for captures in cases {
            let expected = if captures.iter().any(|c| !c.is_final) {
                ExecutionType::Sequential
            } else {
                ExecutionType::Parallel
            };
            assert_eq!(OperationClassifier::classify(&captures), expected);
        }
    }
}
