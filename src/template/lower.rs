//! Lowering of parsed template declarations

use crate::parser::ast::{SelectionDecl, Spanned, StepDecl, TemplateDecl, TemplateItem};

use super::registry::{ParamDecl, SelectionSpec, Template, TemplateError};
use super::step::{BooleanStep, Conditional, ConstructionStep, DeleteStep, PrimitiveStep};

impl Template {
    /// Create a template from a parsed declaration
    pub fn from_decl(decl: &TemplateDecl) -> Result<Self, TemplateError> {
        let name = decl.name.node.as_str();
        let params = decl
            .parameters
            .iter()
            .map(|p| ParamDecl::new(p.name.node.as_str(), p.default_value.node.clone()))
            .collect();

        let mut selections = Vec::new();
        let mut steps = Vec::new();
        for item in &decl.body {
            match item {
                TemplateItem::Selection(s) => selections.push(lower_selection(name, &s.node)?),
                TemplateItem::Step(s) => steps.push(lower_step(&s.node)),
            }
        }

        Template::new(name, params, selections, steps)
    }
}

fn lower_selection(template: &str, decl: &SelectionDecl) -> Result<SelectionSpec, TemplateError> {
    let mut spec = SelectionSpec::new(decl.name.node.as_str());
    if let Some(display) = &decl.display {
        spec = spec.display(display.node.as_str());
    }
    for flag in &decl.flags {
        spec = match flag.node.as_str() {
            "keep" => spec.keep(),
            "source" => spec.source(),
            other => {
                return Err(TemplateError::UnknownFlag {
                    template: template.to_string(),
                    selection: spec.label,
                    flag: other.to_string(),
                })
            }
        };
    }
    Ok(spec)
}

fn lower_block(steps: &[Spanned<StepDecl>]) -> Vec<ConstructionStep> {
    steps.iter().map(|s| lower_step(&s.node)).collect()
}

fn lower_step(decl: &StepDecl) -> ConstructionStep {
    let label = |l: &Option<Spanned<String>>| l.as_ref().map(|s| s.node.clone());
    match decl {
        StepDecl::Primitive {
            shape,
            label: step_label,
            inputs,
            target,
            geometry,
        } => ConstructionStep::Primitive(PrimitiveStep {
            feature_id: String::new(),
            label: label(step_label),
            shape: shape.node.as_str().to_string(),
            inputs: inputs.iter().map(|i| i.node.as_str().to_string()).collect(),
            target: target.as_ref().map(|t| t.node.as_str().to_string()),
            geometry: geometry
                .iter()
                .map(|arg| (arg.key.node.as_str().to_string(), arg.value.node.clone()))
                .collect(),
        }),
        StepDecl::Union {
            label: step_label,
            inputs,
            target,
        } => with_label(
            BooleanStep::union(inputs.iter().map(|i| i.node.as_str()), target.node.as_str()),
            label(step_label),
        ),
        StepDecl::Difference {
            label: step_label,
            primary,
            subtract,
            target,
        } => with_label(
            BooleanStep::difference(
                primary.node.as_str(),
                subtract.node.as_str(),
                target.node.as_str(),
            ),
            label(step_label),
        ),
        StepDecl::Partition {
            label: step_label,
            domain,
            tool,
            target,
        } => with_label(
            BooleanStep::partition(domain.node.as_str(), tool.node.as_str(), target.node.as_str()),
            label(step_label),
        ),
        StepDecl::Delete {
            label: step_label,
            remove,
            target,
        } => {
            let mut step = DeleteStep::new(remove.node.as_str(), target.node.as_str());
            step.label = label(step_label);
            ConstructionStep::Delete(step)
        }
        StepDecl::Conditional {
            branches,
            otherwise,
        } => {
            let mut conditional = Conditional::new();
            for branch in branches {
                conditional = conditional.branch(branch.predicate.node.clone(), lower_block(&branch.body));
            }
            if let Some(otherwise) = otherwise {
                conditional = conditional.otherwise(lower_block(otherwise));
            }
            ConstructionStep::Conditional(conditional)
        }
    }
}

fn with_label(mut step: BooleanStep, label: Option<String>) -> ConstructionStep {
    step.label = label;
    ConstructionStep::Boolean(step)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::BooleanKind;

    fn lower(src: &str) -> Result<Template, TemplateError> {
        let doc = crate::parser::parse(src).expect("Should parse");
        Template::from_decl(&doc.templates[0].node)
    }

    #[test]
    fn test_lower_flags_and_steps() {
        let t = lower(
            r#"template Ribbon (Recess: 0.1 [mm]) {
                selection RECESS_FINAL "RECESS FINAL" [keep]
                selection SRC [keep, source]
                selection CROSS
                if Recess > 0 {
                    workplane "Recess Cross Section" -> CROSS
                    revolve "Make Recess" CROSS -> RECESS_FINAL
                } else {}
                point "Src" -> SRC
            }"#,
        )
        .unwrap();

        let src = t.selection("SRC").unwrap();
        assert!(src.keep && src.source);
        assert_eq!(
            t.selection("RECESS_FINAL").unwrap().display.as_deref(),
            Some("RECESS FINAL")
        );
        match &t.steps()[0] {
            ConstructionStep::Conditional(c) => {
                assert_eq!(c.feature_id(), "if1");
                assert_eq!(c.branches[0].steps[0].feature_id(), "wp1");
                assert_eq!(c.otherwise.as_ref().map(Vec::len), Some(0));
            }
            other => panic!("Expected conditional, got {other:?}"),
        }
        assert_eq!(t.steps()[1].feature_id(), "pt1");
    }

    #[test]
    fn test_lower_boolean_kinds() {
        let t = lower(
            r#"template T {
                selection A
                selection B
                selection C
                cylinder -> A
                cylinder -> B
                union "Join" A, B -> C
                partition A by B -> C
            }"#,
        )
        .unwrap();
        match &t.steps()[2] {
            ConstructionStep::Boolean(b) => {
                assert_eq!(b.label.as_deref(), Some("Join"));
                assert!(matches!(&b.kind, BooleanKind::Union { inputs } if inputs.len() == 2));
            }
            other => panic!("Expected union, got {other:?}"),
        }
        assert_eq!(t.steps()[3].feature_id(), "pard1");
    }

    #[test]
    fn test_unknown_flag_rejected() {
        let err = lower("template T { selection A [visible] }").unwrap_err();
        assert!(matches!(err, TemplateError::UnknownFlag { ref flag, .. } if flag == "visible"));
    }
}
