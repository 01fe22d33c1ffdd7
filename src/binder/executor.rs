//! Replays a template's construction steps for one instance

use indexmap::{IndexMap, IndexSet};
use tracing::debug;

use crate::expr::{Evaluator, Value};
use crate::kernel::{FeatureCall, FeatureKind, GeometryKernel, KernelError};
use crate::selection::{Contribution, EntityRef, SelectionError, SelectionRegistry};
use crate::template::{
    BooleanKind, BooleanStep, Conditional, ConstructionStep, DeleteStep, PrimitiveStep, Template,
};

use super::instance::{Arm, BranchChoice};
use super::BindError;

pub(super) struct Executor<'a> {
    pub(super) template: &'a Template,
    pub(super) instance_id: &'a str,
    pub(super) params: &'a IndexMap<String, Value>,
    pub(super) tolerance: f64,
    pub(super) registry: &'a mut SelectionRegistry,
    pub(super) kernel: &'a mut dyn GeometryKernel,
    /// Entities created by this instance and still alive
    pub(super) produced: IndexSet<EntityRef>,
    pub(super) executed: Vec<String>,
    pub(super) branches: Vec<BranchChoice>,
}

impl<'a> Executor<'a> {
    pub(super) fn new(
        template: &'a Template,
        instance_id: &'a str,
        params: &'a IndexMap<String, Value>,
        tolerance: f64,
        registry: &'a mut SelectionRegistry,
        kernel: &'a mut dyn GeometryKernel,
    ) -> Self {
        Self {
            template,
            instance_id,
            params,
            tolerance,
            registry,
            kernel,
            produced: IndexSet::new(),
            executed: Vec::new(),
            branches: Vec::new(),
        }
    }

    pub(super) fn run(&mut self, steps: &'a [ConstructionStep]) -> Result<(), BindError> {
        for step in steps {
            let tag = self.tag(step.feature_id());
            debug!(instance = %self.instance_id, feature = %tag, label = ?step.label(), "executing step");
            self.executed.push(tag);
            match step {
                ConstructionStep::Primitive(s) => self.primitive(s)?,
                ConstructionStep::Boolean(s) => self.boolean(s)?,
                ConstructionStep::Delete(s) => self.delete(s)?,
                ConstructionStep::Conditional(s) => self.conditional(s)?,
            }
        }
        Ok(())
    }

    /// Namespaced feature tag, `{instance}_{feature}`
    fn tag(&self, feature_id: &str) -> String {
        format!("{}_{}", self.instance_id, feature_id)
    }

    /// Template-local selection id for a label
    fn local(&self, label: &str) -> Result<&'a str, BindError> {
        let template: &'a Template = self.template;
        template
            .selection(label)
            .map(|spec| spec.local_id())
            .ok_or_else(|| {
                self.selection_error(SelectionError::UnknownSelection {
                    selection: label.to_string(),
                })
            })
    }

    /// Handle and current members of an input selection
    fn input(&self, label: &str) -> Result<(String, Vec<EntityRef>), BindError> {
        let local = self.local(label)?;
        let members = self
            .registry
            .resolve(local)
            .map_err(|e| self.selection_error(e))?;
        Ok((self.registry.handle(local), members.iter().cloned().collect()))
    }

    fn target_handle(&self, target: Option<&str>) -> Result<Option<String>, BindError> {
        target
            .map(|label| self.local(label).map(|local| self.registry.handle(local)))
            .transpose()
    }

    fn call(
        &self,
        feature_id: &str,
        label: Option<&'a str>,
        kind: FeatureKind<'a>,
        inputs: Vec<(String, Vec<EntityRef>)>,
        target: Option<String>,
        geometry: &'a [(String, crate::template::GeomValue)],
    ) -> FeatureCall<'a> {
        FeatureCall {
            feature_id: self.tag(feature_id),
            label,
            kind,
            inputs,
            target,
            geometry,
            params: self.params,
        }
    }

    fn primitive(&mut self, step: &'a PrimitiveStep) -> Result<(), BindError> {
        let inputs = step
            .inputs
            .iter()
            .map(|label| self.input(label))
            .collect::<Result<Vec<_>, _>>()?;
        let target = self.target_handle(step.target.as_deref())?;
        let call = self.call(
            step.feature_id(),
            step.label.as_deref(),
            FeatureKind::Shape(&step.shape),
            inputs,
            target,
            &step.geometry,
        );
        let entities = self
            .kernel
            .create(&call)
            .map_err(|e| self.kernel_error(e))?;

        if let Some(label) = step.target.as_deref() {
            let local = self.local(label)?;
            self.produced.extend(entities.iter().cloned());
            self.registry
                .contribute(local, Contribution::Entities(entities))
                .map(drop)
                .map_err(|e| self.selection_error(e))?;
        }
        Ok(())
    }

    fn boolean(&mut self, step: &'a BooleanStep) -> Result<(), BindError> {
        let inputs = step
            .kind
            .inputs()
            .into_iter()
            .map(|label| self.input(label))
            .collect::<Result<Vec<_>, _>>()?;
        let target = self.local(&step.target)?;
        let kind = match step.kind {
            BooleanKind::Union { .. } => FeatureKind::Union,
            BooleanKind::Difference { .. } => FeatureKind::Difference,
            BooleanKind::Partition { .. } => FeatureKind::Partition,
        };
        let call = self.call(
            step.feature_id(),
            step.label.as_deref(),
            kind,
            inputs,
            Some(self.registry.handle(target)),
            &[],
        );

        let contribution = match &step.kind {
            BooleanKind::Union { inputs } => {
                self.kernel.boolean(&call).map_err(|e| self.kernel_error(e))?;
                Contribution::Union(
                    inputs
                        .iter()
                        .map(|label| self.local(label).map(str::to_string))
                        .collect::<Result<_, _>>()?,
                )
            }
            BooleanKind::Difference { primary, subtract } => {
                self.kernel.boolean(&call).map_err(|e| self.kernel_error(e))?;
                Contribution::Difference {
                    primary: self.local(primary)?.to_string(),
                    subtract: self.local(subtract)?.to_string(),
                }
            }
            BooleanKind::Partition { domain, .. } => {
                let (domain_members, tool_members) = match call.inputs.as_slice() {
                    [(_, d), (_, t)] => (d.as_slice(), t.as_slice()),
                    _ => (&[][..], &[][..]),
                };
                let splits = self
                    .kernel
                    .partition(&call, domain_members, tool_members)
                    .map_err(|e| self.kernel_error(e))?;
                for (original, parts) in &splits {
                    self.produced.shift_remove(original);
                    self.produced.extend(parts.iter().cloned());
                }
                Contribution::Partition {
                    domain: self.local(domain)?.to_string(),
                    splits,
                }
            }
        };

        self.registry
            .contribute(target, contribution)
            .map(drop)
            .map_err(|e| self.selection_error(e))?;
        Ok(())
    }

    fn delete(&mut self, step: &'a DeleteStep) -> Result<(), BindError> {
        let removed = self.input(&step.remove)?;
        let target = self.input(&step.target)?;
        let call = self.call(
            step.feature_id(),
            step.label.as_deref(),
            FeatureKind::Delete,
            vec![removed.clone(), target.clone()],
            Some(target.0),
            &[],
        );
        self.kernel
            .delete(&call, &removed.1)
            .map_err(|e| self.kernel_error(e))?;

        let remove_local = self.local(&step.remove)?;
        let target_local = self.local(&step.target)?;
        let count = self
            .registry
            .delete(target_local, remove_local)
            .map_err(|e| self.selection_error(e))?;
        for entity in &removed.1 {
            self.produced.shift_remove(entity);
        }
        debug!(feature = %call.feature_id, count, "deleted entities");
        Ok(())
    }

    fn conditional(&mut self, step: &'a Conditional) -> Result<(), BindError> {
        let tag = self.tag(step.feature_id());
        let evaluator = Evaluator::new(self.tolerance).with_scope(self.params);

        let mut chosen = None;
        for (index, branch) in step.branches.iter().enumerate() {
            let holds = evaluator
                .eval_predicate(&branch.predicate)
                .map_err(|source| BindError::Predicate {
                    template: self.template.name().to_string(),
                    instance: self.instance_id.to_string(),
                    feature: tag.clone(),
                    source,
                })?;
            if holds {
                chosen = Some((Arm::Branch(index), branch.steps.as_slice()));
                break;
            }
        }
        let (arm, steps) = match (chosen, step.otherwise.as_deref()) {
            (Some(chosen), _) => chosen,
            (None, Some(otherwise)) => (Arm::Else, otherwise),
            (None, None) => {
                return Err(BindError::NonExhaustiveConditional {
                    template: self.template.name().to_string(),
                    instance: self.instance_id.to_string(),
                    feature: tag,
                })
            }
        };

        debug!(feature = %tag, ?arm, "branch taken");
        self.branches.push(BranchChoice { feature: tag, arm });
        self.run(steps)
    }

    fn selection_error(&self, source: SelectionError) -> BindError {
        BindError::Selection {
            template: self.template.name().to_string(),
            instance: self.instance_id.to_string(),
            source,
        }
    }

    fn kernel_error(&self, source: KernelError) -> BindError {
        BindError::Kernel {
            template: self.template.name().to_string(),
            instance: self.instance_id.to_string(),
            source,
        }
    }
}
