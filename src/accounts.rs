//! Account-code hierarchy inference.
//!
//! The regulator's unified chart of accounts encodes depth in the code
//! length itself: `1` → `14` → `1404` → `140405`. The hierarchy is built
//! per load from whatever (code, label) pairs the consolidated table holds
//! and exists for navigation and filtering only, so codes with no parent in
//! the table are dropped rather than invented.

use log::warn;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// Hierarchical level implied by a code's length.
///
/// 1 digit → 1, 2 digits → 2, up to 4 → 3, up to 6 → 4, longer → 5.
/// Empty codes sit at level 0 and never enter the hierarchy.
pub fn account_level(code: &str) -> u8 {
    match code.trim().len() {
        0 => 0,
        1 => 1,
        2 => 2,
        3 | 4 => 3,
        5 | 6 => 4,
        _ => 5,
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct GroupNode {
    pub label: String,
    /// 4-digit children keyed by code.
    pub children: BTreeMap<String, SubgroupNode>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SubgroupNode {
    pub label: String,
    /// 6-digit leaf labels keyed by code.
    pub leaves: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RootNode {
    pub label: String,
    /// 2-digit children keyed by code.
    pub children: BTreeMap<String, GroupNode>,
}

/// Four-level account tree keyed by 1-, 2-, 4- and 6-digit codes.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AccountHierarchy {
    pub roots: BTreeMap<String, RootNode>,
    /// Codes that were dropped because their parent prefix was absent or
    /// their root was outside the valid set. Kept observable so data-quality
    /// regressions show up in tests.
    pub orphans: Vec<String>,
}

impl AccountHierarchy {
    /// Builds the tree from distinct (code, label) pairs.
    ///
    /// Pairs are attached strictly by level, shortest codes first, so a
    /// child can never precede its parent. Level-1 codes outside
    /// `valid_roots` are rejected along with their whole subtree.
    pub fn build<'a, I>(pairs: I, valid_roots: &BTreeSet<String>) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut sorted: Vec<(&str, &str)> = pairs
            .into_iter()
            .map(|(code, label)| (code.trim(), label))
            .collect();
        sorted.sort_by_key(|(code, _)| (code.len(), *code));
        sorted.dedup_by_key(|(code, _)| *code);

        let mut hierarchy = Self::default();

        for (code, label) in sorted {
            match code.len() {
                1 => {
                    if !valid_roots.contains(code) {
                        hierarchy.orphans.push(code.to_string());
                        continue;
                    }
                    hierarchy.roots.insert(
                        code.to_string(),
                        RootNode {
                            label: label.to_string(),
                            children: BTreeMap::new(),
                        },
                    );
                }
                2 => {
                    let parent = &code[..1];
                    match hierarchy.roots.get_mut(parent) {
                        Some(root) => {
                            root.children.insert(
                                code.to_string(),
                                GroupNode {
                                    label: label.to_string(),
                                    children: BTreeMap::new(),
                                },
                            );
                        }
                        None => hierarchy.orphans.push(code.to_string()),
                    }
                }
                4 => {
                    let parent = &code[..2];
                    match hierarchy
                        .roots
                        .get_mut(&code[..1])
                        .and_then(|root| root.children.get_mut(parent))
                    {
                        Some(group) => {
                            group.children.insert(
                                code.to_string(),
                                SubgroupNode {
                                    label: label.to_string(),
                                    leaves: BTreeMap::new(),
                                },
                            );
                        }
                        None => hierarchy.orphans.push(code.to_string()),
                    }
                }
                6 => {
                    let parent = &code[..4];
                    match hierarchy
                        .roots
                        .get_mut(&code[..1])
                        .and_then(|root| root.children.get_mut(&code[..2]))
                        .and_then(|group| group.children.get_mut(parent))
                    {
                        Some(subgroup) => {
                            subgroup
                                .leaves
                                .insert(code.to_string(), label.to_string());
                        }
                        None => hierarchy.orphans.push(code.to_string()),
                    }
                }
                _ => hierarchy.orphans.push(code.to_string()),
            }
        }

        if !hierarchy.orphans.is_empty() {
            warn!(
                "account hierarchy dropped {} orphan code(s)",
                hierarchy.orphans.len()
            );
        }

        hierarchy
    }

    /// Total number of attached nodes across all four levels.
    pub fn node_count(&self) -> usize {
        self.roots
            .values()
            .map(|root| {
                1 + root
                    .children
                    .values()
                    .map(|group| {
                        1 + group
                            .children
                            .values()
                            .map(|subgroup| 1 + subgroup.leaves.len())
                            .sum::<usize>()
                    })
                    .sum::<usize>()
            })
            .sum()
    }

    pub fn contains(&self, code: &str) -> bool {
        let code = code.trim();
        match code.len() {
            1 => self.roots.contains_key(code),
            2 => self
                .roots
                .get(&code[..1])
                .is_some_and(|root| root.children.contains_key(code)),
            4 => self
                .roots
                .get(&code[..1])
                .and_then(|root| root.children.get(&code[..2]))
                .is_some_and(|group| group.children.contains_key(code)),
            6 => self
                .roots
                .get(&code[..1])
                .and_then(|root| root.children.get(&code[..2]))
                .and_then(|group| group.children.get(&code[..4]))
                .is_some_and(|subgroup| subgroup.leaves.contains_key(code)),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_roots() -> BTreeSet<String> {
        ["1", "2", "3", "4", "5", "6", "7"]
            .into_iter()
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn test_account_level_ranges() {
        assert_eq!(account_level(""), 0);
        assert_eq!(account_level("1"), 1);
        assert_eq!(account_level("14"), 2);
        assert_eq!(account_level("1404"), 3);
        assert_eq!(account_level("140405"), 4);
        assert_eq!(account_level("14040510"), 5);
        assert_eq!(account_level("  14 "), 2);
    }

    #[test]
    fn test_builds_four_levels() {
        let pairs = vec![
            ("1", "ACTIVOS"),
            ("14", "CARTERA DE CREDITOS"),
            ("1404", "CARTERA MICROCREDITO"),
            ("140405", "DE 31 A 90 DIAS"),
        ];
        let hierarchy = AccountHierarchy::build(pairs, &valid_roots());

        assert!(hierarchy.contains("1"));
        assert!(hierarchy.contains("14"));
        assert!(hierarchy.contains("1404"));
        assert!(hierarchy.contains("140405"));
        assert_eq!(hierarchy.node_count(), 4);
        assert!(hierarchy.orphans.is_empty());
    }

    #[test]
    fn test_orphan_codes_never_attach() {
        // "25" has no "2" root in the input; "1404" has no "14" group.
        let pairs = vec![("1", "ACTIVOS"), ("25", "CUENTAS POR PAGAR"), ("1404", "MICRO")];
        let hierarchy = AccountHierarchy::build(pairs, &valid_roots());

        assert!(hierarchy.contains("1"));
        assert!(!hierarchy.contains("25"));
        assert!(!hierarchy.contains("1404"));
        assert_eq!(hierarchy.orphans, vec!["25".to_string(), "1404".to_string()]);
    }

    #[test]
    fn test_roots_outside_valid_set_are_rejected() {
        let pairs = vec![("8", "NO EXISTE"), ("81", "TAMPOCO")];
        let hierarchy = AccountHierarchy::build(pairs, &valid_roots());
        assert!(hierarchy.roots.is_empty());
        assert_eq!(hierarchy.orphans.len(), 2);
    }

    #[test]
    fn test_input_order_does_not_matter() {
        let forward = vec![("1", "A"), ("14", "B"), ("1404", "C")];
        let reversed = vec![("1404", "C"), ("14", "B"), ("1", "A")];
        let a = AccountHierarchy::build(forward, &valid_roots());
        let b = AccountHierarchy::build(reversed, &valid_roots());
        assert_eq!(a.node_count(), b.node_count());
        assert!(b.contains("1404"));
    }
}
