//! Recursive evaluation of a match specification tree.
//!
//! A node whose keys are all reserved is a leaf match; anything else is a
//! group of named children. Reserved keys set on a group apply to every
//! descendant leaf unless overridden closer to it. The walk is pure with
//! respect to presentation: it returns an evaluated tree for the display,
//! report, and update layers to consume.

use crate::compare::Mismatch;
use crate::error::HarnessError;
use crate::matchers::{MatchEval, evaluate_match};
use crate::params::{ParamSet, broadcast, is_leaf, is_reserved, scalar_to_string};
use serde_yaml::{Mapping, Value};
use std::path::Path;

/// One evaluated parameter set of a leaf match.
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluatedMatch {
    /// Position within the leaf's broadcast group.
    pub index: usize,
    /// The name this evaluation reports under.
    pub display_name: String,
    /// The fully resolved parameters it ran with.
    pub params: ParamSet,
    pub success: bool,
    pub calculated: Option<String>,
    pub mismatch: Option<Mismatch>,
}

/// A node of the evaluated tree, mirroring the specification's shape.
#[derive(Debug, Clone, PartialEq)]
pub enum MatchNode {
    Group {
        name: String,
        children: Vec<MatchNode>,
    },
    Leaf {
        name: String,
        /// Node names from the match root down to this leaf, for locating
        /// its mapping in the original document.
        path: Vec<String>,
        sets: Vec<EvaluatedMatch>,
    },
}

/// The fully evaluated match tree of one input, with its counters.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct WalkOutcome {
    pub nodes: Vec<MatchNode>,
    pub total: usize,
    pub failed: usize,
}

impl WalkOutcome {
    /// Every leaf of the tree, in document order.
    pub fn leaves(&self) -> Vec<&MatchNode> {
        fn collect<'a>(nodes: &'a [MatchNode], out: &mut Vec<&'a MatchNode>) {
            for node in nodes {
                match node {
                    MatchNode::Leaf { .. } => out.push(node),
                    MatchNode::Group { children, .. } => collect(children, out),
                }
            }
        }
        let mut out = Vec::new();
        collect(&self.nodes, &mut out);
        out
    }
}

/// Evaluate a whole `Matches` subtree against `work_dir`.
pub fn walk_matches(scope: &Mapping, work_dir: &Path) -> Result<WalkOutcome, HarnessError> {
    let mut outcome = WalkOutcome::default();
    let mut path = Vec::new();
    outcome.nodes = walk_level(
        scope,
        &ParamSet::default(),
        work_dir,
        &mut path,
        &mut outcome.total,
        &mut outcome.failed,
    )?;
    Ok(outcome)
}

fn walk_level(
    scope: &Mapping,
    parent: &ParamSet,
    work_dir: &Path,
    path: &mut Vec<String>,
    total: &mut usize,
    failed: &mut usize,
) -> Result<Vec<MatchNode>, HarnessError> {
    let inherited = ParamSet::resolve(scope, parent);
    let mut nodes = Vec::new();

    for (key, child) in scope {
        let name = match key.as_str() {
            Some(name) if is_reserved(name) => continue,
            Some(name) => name.to_string(),
            None => scalar_to_string(key),
        };
        let Value::Mapping(child_map) = child else {
            return Err(HarnessError::Usage(format!(
                "Match node '{name}' must be a mapping"
            )));
        };

        if is_leaf(child_map) {
            let merged = ParamSet::resolve(child_map, &inherited);
            let sets = broadcast(&merged)?;
            let multi = sets.len() > 1;
            let mut evaluated = Vec::with_capacity(sets.len());
            for (index, params) in sets.into_iter().enumerate() {
                *total += 1;
                let MatchEval {
                    success,
                    calculated,
                    mismatch,
                } = evaluate_match(&params, work_dir)?;
                if !success {
                    *failed += 1;
                }
                let display_name = if multi {
                    params.display_name(&name)
                } else {
                    name.clone()
                };
                evaluated.push(EvaluatedMatch {
                    index,
                    display_name,
                    params,
                    success,
                    calculated,
                    mismatch,
                });
            }
            path.push(name.clone());
            let leaf_path = path.clone();
            path.pop();
            nodes.push(MatchNode::Leaf {
                name,
                path: leaf_path,
                sets: evaluated,
            });
        } else {
            path.push(name.clone());
            let children = walk_level(child_map, &inherited, work_dir, path, total, failed)?;
            path.pop();
            nodes.push(MatchNode::Group { name, children });
        }
    }
    Ok(nodes)
}
