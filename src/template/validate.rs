//! Registration-time checks on a template's step tree

use indexmap::IndexMap;

use crate::expr::Expr;

use super::registry::{Template, TemplateError};
use super::step::ConstructionStep;

/// Names a predicate may use besides the template's parameters
const CONSTANTS: &[&str] = &["pi", "true", "false"];

/// Position of a step inside nested conditionals: (conditional feature id, arm index)
type ArmPath<'a> = Vec<(&'a str, usize)>;

struct Access<'a> {
    selection: &'a str,
    feature: &'a str,
    path: ArmPath<'a>,
}

#[derive(Default)]
struct Walk<'a> {
    reads: Vec<Access<'a>>,
    writes: Vec<Access<'a>>,
    predicates: Vec<(&'a str, &'a Expr)>,
    empty: Vec<&'a str>,
}

impl<'a> Walk<'a> {
    fn visit(&mut self, steps: &'a [ConstructionStep], path: &mut ArmPath<'a>) {
        for step in steps {
            let feature = step.feature_id();
            for selection in step.reads() {
                self.reads.push(Access {
                    selection,
                    feature,
                    path: path.clone(),
                });
            }
            if let Some(selection) = step.writes() {
                self.writes.push(Access {
                    selection,
                    feature,
                    path: path.clone(),
                });
            }
            if let ConstructionStep::Conditional(conditional) = step {
                if conditional.branches.is_empty() {
                    self.empty.push(feature);
                }
                for branch in &conditional.branches {
                    self.predicates.push((feature, &branch.predicate));
                }
                for (arm, steps) in conditional.arms().enumerate() {
                    path.push((feature, arm));
                    self.visit(steps, path);
                    path.pop();
                }
            }
        }
    }
}

fn common_prefix<'a>(paths: &[ArmPath<'a>]) -> ArmPath<'a> {
    let Some((first, rest)) = paths.split_first() else {
        return Vec::new();
    };
    let mut len = first.len();
    for path in rest {
        len = len.min(
            first
                .iter()
                .zip(path.iter())
                .take_while(|(a, b)| a == b)
                .count(),
        );
    }
    first[..len].to_vec()
}

impl Template {
    pub(super) fn validate(&self) -> Result<(), TemplateError> {
        let mut walk = Walk::default();
        walk.visit(&self.steps, &mut Vec::new());

        if let Some(feature) = walk.empty.first() {
            return Err(TemplateError::EmptyConditional {
                template: self.name.clone(),
                feature: feature.to_string(),
            });
        }

        for access in walk.reads.iter().chain(walk.writes.iter()) {
            if !self.selections.contains_key(access.selection) {
                return Err(TemplateError::UndeclaredSelection {
                    template: self.name.clone(),
                    selection: access.selection.to_string(),
                    feature: access.feature.to_string(),
                });
            }
        }

        for (feature, predicate) in &walk.predicates {
            for name in predicate.identifiers() {
                if !self.params.contains_key(name) && !CONSTANTS.contains(&name) {
                    return Err(TemplateError::UnknownParameter {
                        template: self.name.clone(),
                        name: name.to_string(),
                        feature: feature.to_string(),
                    });
                }
            }
        }

        // A selection whose every contribution sits inside one arm may only
        // be read from within that arm.
        let mut producers: IndexMap<&str, Vec<ArmPath>> = IndexMap::new();
        for write in &walk.writes {
            producers
                .entry(write.selection)
                .or_default()
                .push(write.path.clone());
        }
        for (selection, paths) in &producers {
            let home = common_prefix(paths);
            if home.is_empty() {
                continue;
            }
            if let Some(leak) = walk
                .reads
                .iter()
                .find(|read| read.selection == *selection && !read.path.starts_with(&home))
            {
                return Err(TemplateError::BranchLeak {
                    template: self.name.clone(),
                    selection: selection.to_string(),
                    feature: leak.feature.to_string(),
                });
            }
        }

        Ok(())
    }
}
