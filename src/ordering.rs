//! Dependency-aware ordering of consolidated stacks

use crate::model::{Stack, StackType};
use std::collections::{BTreeMap, BTreeSet};

/// Stacks sorted so that every stack follows the stacks it depends on
#[derive(Debug, Clone, Default)]
pub struct StackOrder {
    pub stacks: Vec<Stack>,
    /// Stack types left unresolved by a dependency cycle; empty when the order is valid
    pub cycle: Vec<StackType>,
    /// `(dependent, dependency)` pairs whose dependency has no stack in the result
    pub missing: Vec<(StackType, StackType)>,
}

impl StackOrder {
    pub fn has_cycle(&self) -> bool {
        !self.cycle.is_empty()
    }

    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.has_cycle() {
            let members: Vec<&str> = self.cycle.iter().map(|t| t.as_str()).collect();
            warnings.push(format!(
                "dependency cycle between stacks [{}]; kept input order",
                members.join(", ")
            ));
        }
        for (dependent, dependency) in &self.missing {
            warnings.push(format!(
                "{} stack depends on {}, which is not part of the result",
                dependent, dependency
            ));
        }
        warnings
    }
}

/// Kahn's algorithm over declared stack dependencies, ties broken by stack type.
///
/// On a cycle the input order is returned unchanged and the unresolved members are reported.
pub fn order_stacks(stacks: Vec<Stack>) -> StackOrder {
    let present: BTreeMap<StackType, usize> = stacks
        .iter()
        .enumerate()
        .map(|(index, stack)| (stack.stack_type, index))
        .collect();

    let mut missing = Vec::new();
    let mut in_degree = vec![0usize; stacks.len()];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); stacks.len()];

    for (index, stack) in stacks.iter().enumerate() {
        for dependency in &stack.depends_on {
            if *dependency == stack.stack_type {
                continue;
            }
            match present.get(dependency) {
                Some(&dep_index) => {
                    in_degree[index] += 1;
                    dependents[dep_index].push(index);
                }
                None => missing.push((stack.stack_type, *dependency)),
            }
        }
    }

    let mut ready: BTreeSet<(StackType, usize)> = in_degree
        .iter()
        .enumerate()
        .filter(|(_, &degree)| degree == 0)
        .map(|(index, _)| (stacks[index].stack_type, index))
        .collect();

    let mut order = Vec::with_capacity(stacks.len());
    while let Some(next) = ready.pop_first() {
        let (_, index) = next;
        order.push(index);
        for &dependent in &dependents[index] {
            in_degree[dependent] -= 1;
            if in_degree[dependent] == 0 {
                ready.insert((stacks[dependent].stack_type, dependent));
            }
        }
    }

    if order.len() < stacks.len() {
        let visited: BTreeSet<usize> = order.iter().copied().collect();
        let mut cycle: Vec<StackType> = (0..stacks.len())
            .filter(|index| !visited.contains(index))
            .map(|index| stacks[index].stack_type)
            .collect();
        cycle.sort();
        return StackOrder {
            stacks,
            cycle,
            missing,
        };
    }

    let mut slots: Vec<Option<Stack>> = stacks.into_iter().map(Some).collect();
    let ordered = order
        .into_iter()
        .filter_map(|index| slots[index].take())
        .collect();

    StackOrder {
        stacks: ordered,
        cycle: Vec::new(),
        missing,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stack(stack_type: StackType, deps: &[StackType]) -> Stack {
        let mut stack = Stack::new(stack_type, stack_type.as_str());
        for dep in deps {
            stack.add_dependency(*dep);
        }
        stack
    }

    fn types(order: &StackOrder) -> Vec<StackType> {
        order.stacks.iter().map(|s| s.stack_type).collect()
    }

    #[test]
    fn test_dependency_precedes_dependent() {
        let order = order_stacks(vec![
            stack(StackType::Auth, &[StackType::Database]),
            stack(StackType::Database, &[]),
        ]);
        assert!(!order.has_cycle());
        assert_eq!(types(&order), vec![StackType::Database, StackType::Auth]);
    }

    #[test]
    fn test_ties_follow_stack_type_order() {
        let order = order_stacks(vec![
            stack(StackType::Observability, &[]),
            stack(StackType::Storage, &[]),
            stack(StackType::Cache, &[]),
        ]);
        assert_eq!(
            types(&order),
            vec![StackType::Cache, StackType::Storage, StackType::Observability]
        );
    }

    #[test]
    fn test_diamond() {
        let order = order_stacks(vec![
            stack(StackType::Compute, &[StackType::Messaging, StackType::Storage]),
            stack(StackType::Messaging, &[StackType::Database]),
            stack(StackType::Storage, &[StackType::Database]),
            stack(StackType::Database, &[]),
        ]);
        assert_eq!(
            types(&order),
            vec![
                StackType::Database,
                StackType::Messaging,
                StackType::Storage,
                StackType::Compute
            ]
        );
    }

    #[test]
    fn test_cycle_keeps_input_order_and_warns() {
        let order = order_stacks(vec![
            stack(StackType::Cache, &[]),
            stack(StackType::Database, &[StackType::Auth]),
            stack(StackType::Auth, &[StackType::Database]),
        ]);
        assert!(order.has_cycle());
        assert_eq!(order.cycle, vec![StackType::Database, StackType::Auth]);
        assert_eq!(
            types(&order),
            vec![StackType::Cache, StackType::Database, StackType::Auth]
        );
        assert!(order.warnings()[0].contains("[database, auth]"));
    }

    #[test]
    fn test_missing_dependency_reported() {
        let order = order_stacks(vec![stack(StackType::Auth, &[StackType::Database])]);
        assert!(!order.has_cycle());
        assert_eq!(order.missing, vec![(StackType::Auth, StackType::Database)]);
        assert_eq!(order.stacks.len(), 1);
    }
}
