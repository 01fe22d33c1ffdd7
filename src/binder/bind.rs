//! The instance binder

use indexmap::{IndexMap, IndexSet};
use tracing::{debug, info};

use crate::config::AssemblyConfig;
use crate::expr::{Evaluator, Expr, Scope};
use crate::ident::{CurrentSource, IdSource};
use crate::kernel::GeometryKernel;
use crate::selection::{EntityRef, SelectionRegistry};
use crate::template::TemplateRegistry;

use super::executor::Executor;
use super::instance::{NamespacedSelection, PartInstance};
use super::request::InstanceRequest;
use super::BindError;

/// Stamps out part instances from the templates of a registry
pub struct InstanceBinder<'r> {
    registry: &'r TemplateRegistry,
    config: AssemblyConfig,
}

impl<'r> InstanceBinder<'r> {
    pub fn new(registry: &'r TemplateRegistry) -> Self {
        Self {
            registry,
            config: AssemblyConfig::default(),
        }
    }

    pub fn with_config(mut self, config: AssemblyConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &AssemblyConfig {
        &self.config
    }

    /// Instantiate the template named by `request`.
    ///
    /// Binding expressions (and defaults filled in for missing parameters)
    /// are evaluated against `design`. Nothing is allocated unless the
    /// bindings are valid; once the instance identifier has been allocated
    /// it stays consumed even if construction fails.
    pub fn instantiate(
        &self,
        ids: &mut dyn IdSource,
        kernel: &mut dyn GeometryKernel,
        design: Option<&dyn Scope>,
        request: &InstanceRequest,
    ) -> Result<PartInstance, BindError> {
        let template = self.registry.lookup(&request.template)?;
        let name = template.name().to_string();

        let missing: Vec<String> = template
            .parameter_names()
            .into_iter()
            .filter(|param| !request.bindings.contains_key(*param))
            .map(str::to_string)
            .collect();
        let extra: Vec<String> = request
            .bindings
            .keys()
            .filter(|param| !template.has_parameter(param))
            .cloned()
            .collect();
        if !extra.is_empty() || (!missing.is_empty() && !self.config.fill_defaults) {
            return Err(BindError::ParameterMismatch {
                template: name,
                missing,
                extra,
            });
        }

        if let Some(label) = request
            .keep
            .keys()
            .find(|label| template.selection(label).is_none())
        {
            return Err(BindError::UnknownKeepFlag {
                template: name,
                label: label.clone(),
            });
        }

        let mut evaluator = Evaluator::new(self.config.tolerance);
        if let Some(design) = design {
            evaluator = evaluator.with_scope(design);
        }
        let mut bindings = IndexMap::new();
        let mut values = IndexMap::new();
        for (param, decl) in template.params() {
            let binding_error = |source| BindError::Binding {
                template: name.clone(),
                param: param.clone(),
                source,
            };
            let expr = match request.bindings.get(param) {
                Some(source) => source.parse::<Expr>().map_err(binding_error)?,
                None => {
                    debug!(template = %name, param = %param, default = %decl.default, "filling default");
                    decl.default.clone()
                }
            };
            let value = evaluator.eval(&expr).map_err(binding_error)?;
            bindings.insert(param.clone(), expr);
            values.insert(param.clone(), value);
        }

        let allocation_error = |source| BindError::Allocation {
            template: name.clone(),
            source,
        };
        let instance_id = match &request.reuse {
            Some(id) => {
                ids.reuse(&self.config.instance_category, id, request.pseudonym.as_deref())
                    .map_err(allocation_error)?;
                debug!(template = %name, instance = %id, "rebuilding instance");
                id.clone()
            }
            None => ids
                .allocate(&self.config.instance_category, request.pseudonym.as_deref())
                .map_err(allocation_error)?,
        };

        let mut registry = SelectionRegistry::namespaced(instance_id.clone());
        for spec in template.selections().values() {
            registry
                .create_labelled(spec.local_id(), &spec.label)
                .map_err(|source| BindError::Selection {
                    template: name.clone(),
                    instance: instance_id.clone(),
                    source,
                })?;
        }

        let mut executor = Executor::new(
            &template,
            &instance_id,
            &values,
            self.config.tolerance,
            &mut registry,
            kernel,
        );
        executor.run(template.steps())?;
        let Executor {
            produced,
            executed,
            branches,
            ..
        } = executor;

        let selections: Vec<NamespacedSelection> = template
            .selections()
            .values()
            .map(|spec| NamespacedSelection {
                label: spec.label.clone(),
                local_id: spec.local_id().to_string(),
                handle: registry.handle(spec.local_id()),
                keep: request.keep.get(&spec.label).copied().unwrap_or(spec.keep),
                materialized: registry
                    .get(spec.local_id())
                    .is_some_and(|s| s.is_materialized()),
            })
            .collect();

        let kept: IndexSet<&EntityRef> = selections
            .iter()
            .filter(|s| s.keep && s.materialized)
            .filter_map(|s| registry.get(&s.local_id))
            .flat_map(|s| s.members().iter())
            .collect();
        let prunable: IndexSet<EntityRef> = produced
            .iter()
            .filter(|entity| !kept.contains(entity))
            .cloned()
            .collect();

        let owner = request.pseudonym.as_deref().unwrap_or(&instance_id);
        let mut sources = Vec::new();
        for spec in template.selections().values() {
            let materialized = selections
                .iter()
                .any(|s| s.local_id == spec.local_id() && s.materialized);
            if !spec.source || !materialized {
                continue;
            }
            let source_name = format!("{owner}_{}", spec.label);
            // A rebuilt instance keeps the sources registered by its first build
            if request.reuse.is_some() {
                if let Some(pcs) = ids.bound(&source_name) {
                    sources.push(pcs);
                    continue;
                }
            }
            let pcs = ids
                .allocate(&self.config.source_category, Some(source_name.as_str()))
                .map_err(allocation_error)?;
            let index = ids.record_current_source(CurrentSource {
                pcs: pcs.clone(),
                name: source_name,
                cuff_index: request.cuff_index,
            });
            debug!(instance = %instance_id, pcs = %pcs, index, "registered current source");
            sources.push(pcs);
        }

        info!(
            template = %name,
            instance = %instance_id,
            pseudonym = ?request.pseudonym,
            steps = executed.len(),
            prunable = prunable.len(),
            "instantiated template"
        );

        Ok(PartInstance {
            instance_id,
            pseudonym: request.pseudonym.clone(),
            template,
            bindings,
            values,
            selections,
            registry,
            prunable,
            executed,
            branches,
            sources,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binder::Arm;
    use crate::expr::Value;
    use crate::ident::{IdentError, IdentifierAllocator};
    use crate::kernel::SymbolicKernel;
    use crate::selection::SelectionError;
    use pretty_assertions::assert_eq;

    const CUFF: &str = r#"
        template Cuff (Theta: 340 [deg], R_in: 1 [mm], R_out: 2 [mm], N_holes: 0) {
            selection INNER
            selection OUTER
            selection HOLES
            selection CUFF_FINAL [keep]
            selection SRC [source]

            cylinder -> INNER [r: R_in]
            cylinder -> OUTER [r: R_out]
            if N_holes > 0 {
                econe -> HOLES
            } else {}
            if Theta == 360 {
                difference OUTER - INNER -> CUFF_FINAL
            } elif Theta < 360 {
                difference "Cut" OUTER - INNER -> CUFF_FINAL
                rotate CUFF_FINAL [rot: Theta]
            }
            point -> SRC
        }
    "#;

    fn registry() -> TemplateRegistry {
        let mut registry = TemplateRegistry::new();
        registry.load_str(CUFF, "cuff").unwrap();
        registry
    }

    fn request(theta: &str) -> InstanceRequest {
        InstanceRequest::new("Cuff")
            .bind("Theta", theta)
            .bind("R_in", "1 [mm]")
            .bind("R_out", "2 [mm]")
            .bind("N_holes", "0")
    }

    #[test]
    fn test_instantiate_partial_cuff() {
        let registry = registry();
        let binder = InstanceBinder::new(&registry);
        let mut ids = IdentifierAllocator::new();
        let mut kernel = SymbolicKernel::new();

        let instance = binder
            .instantiate(&mut ids, &mut kernel, None, &request("340 [deg]"))
            .unwrap();

        assert_eq!(instance.instance_id(), "pi1");
        assert_eq!(instance.handle("CUFF_FINAL"), Some("pi1_csel4"));
        assert_eq!(
            instance.resolve("CUFF_FINAL").unwrap().iter().collect::<Vec<_>>(),
            vec![&EntityRef::domain("pi1_cyl2")]
        );
        assert_eq!(instance.value("R_in"), Some(Value::Number(0.001)));
        assert_eq!(
            instance.branches().iter().map(|b| b.arm).collect::<Vec<_>>(),
            vec![Arm::Else, Arm::Branch(1)]
        );
        assert!(instance.executed().iter().any(|f| f == "pi1_rot1"));
        assert!(!instance.executed().iter().any(|f| f == "pi1_dif1"));
        assert!(!instance.executed().iter().any(|f| f == "pi1_econ1"));
    }

    #[test]
    fn test_untaken_branch_selection_never_materializes() {
        let registry = registry();
        let binder = InstanceBinder::new(&registry);
        let mut ids = IdentifierAllocator::new();
        let instance = binder
            .instantiate(&mut ids, &mut SymbolicKernel::new(), None, &request("340 [deg]"))
            .unwrap();
        assert!(matches!(
            instance.resolve("HOLES"),
            Err(SelectionError::SelectionNeverMaterialized { ref selection }) if selection == "pi1_csel3"
        ));
        assert!(!instance.selection("HOLES").unwrap().materialized);
    }

    #[test]
    fn test_prunable_and_sources() {
        let registry = registry();
        let binder = InstanceBinder::new(&registry);
        let mut ids = IdentifierAllocator::new();
        let instance = binder
            .instantiate(
                &mut ids,
                &mut SymbolicKernel::new(),
                None,
                &request("340 [deg]").with_pseudonym("Cuff 0_Tube").with_cuff_index(0),
            )
            .unwrap();

        let prunable: Vec<_> = instance.prunable().iter().map(|e| e.id.as_str()).collect();
        assert_eq!(prunable, vec!["pi1_cyl1", "pi1_pt1"]);
        assert_eq!(instance.sources(), ["pcs1"]);
        assert_eq!(ids.get("Cuff 0_Tube_SRC"), Some("pcs1"));
        let (index, source) = ids.current_sources().next().unwrap();
        assert_eq!(index, 1);
        assert_eq!(source.name, "Cuff 0_Tube_SRC");
    }

    #[test]
    fn test_keep_override() {
        let registry = registry();
        let binder = InstanceBinder::new(&registry);
        let mut ids = IdentifierAllocator::new();
        let instance = binder
            .instantiate(
                &mut ids,
                &mut SymbolicKernel::new(),
                None,
                &request("340 [deg]").keep("SRC", true).keep("CUFF_FINAL", false),
            )
            .unwrap();
        let prunable: Vec<_> = instance.prunable().iter().map(|e| e.id.as_str()).collect();
        assert_eq!(prunable, vec!["pi1_cyl1", "pi1_cyl2"]);

        let err = binder
            .instantiate(
                &mut ids,
                &mut SymbolicKernel::new(),
                None,
                &request("340 [deg]").keep("NOPE", true),
            )
            .unwrap_err();
        assert!(matches!(err, BindError::UnknownKeepFlag { ref label, .. } if label == "NOPE"));
    }

    #[test]
    fn test_parameter_mismatch() {
        let registry = registry();
        let binder = InstanceBinder::new(&registry);
        let mut ids = IdentifierAllocator::new();
        let req = InstanceRequest::new("Cuff")
            .bind("Theta", "340 [deg]")
            .bind("Thickness", "1 [mm]");
        match binder
            .instantiate(&mut ids, &mut SymbolicKernel::new(), None, &req)
            .unwrap_err()
        {
            BindError::ParameterMismatch { missing, extra, .. } => {
                assert_eq!(missing, vec!["R_in", "R_out", "N_holes"]);
                assert_eq!(extra, vec!["Thickness"]);
            }
            other => panic!("Expected ParameterMismatch, got {other:?}"),
        }
        assert_eq!(ids.counter("pi"), 0);
    }

    #[test]
    fn test_fill_defaults() {
        let registry = registry();
        let binder =
            InstanceBinder::new(&registry).with_config(AssemblyConfig::new().with_fill_defaults(true));
        let mut ids = IdentifierAllocator::new();
        let instance = binder
            .instantiate(
                &mut ids,
                &mut SymbolicKernel::new(),
                None,
                &InstanceRequest::new("Cuff").bind("Theta", "360"),
            )
            .unwrap();
        assert_eq!(instance.value("R_out"), Some(Value::Number(0.002)));
        assert_eq!(instance.bindings()["N_holes"].to_string(), "0");
        assert_eq!(instance.branches()[1].arm, Arm::Branch(0));
    }

    #[test]
    fn test_bindings_evaluated_against_design() {
        let registry = registry();
        let binder = InstanceBinder::new(&registry);
        let mut design: IndexMap<String, Expr> = IndexMap::new();
        design.insert("Theta_cuff".into(), "360 [deg]".parse().unwrap());
        design.insert("R_nerve".into(), "0.5 [mm]".parse().unwrap());

        let req = InstanceRequest::new("Cuff")
            .bind("Theta", "Theta_cuff")
            .bind("R_in", "R_nerve + 50 [um]")
            .bind("R_out", "R_nerve * 2")
            .bind("N_holes", "0");
        let mut ids = IdentifierAllocator::new();
        let instance = binder
            .instantiate(&mut ids, &mut SymbolicKernel::new(), Some(&design as &dyn Scope), &req)
            .unwrap();
        assert_eq!(instance.branches()[1].arm, Arm::Branch(0));
        assert!((instance.value("R_in").unwrap().as_number().unwrap() - 0.00055).abs() < 1e-12);
        assert_eq!(instance.bindings()["Theta"].to_string(), "Theta_cuff");

        let err = binder
            .instantiate(&mut ids, &mut SymbolicKernel::new(), None, &req)
            .unwrap_err();
        assert!(matches!(err, BindError::Binding { ref param, .. } if param == "Theta"));
    }

    #[test]
    fn test_non_exhaustive_conditional() {
        let registry = registry();
        let binder = InstanceBinder::new(&registry);
        let mut ids = IdentifierAllocator::new();
        let err = binder
            .instantiate(&mut ids, &mut SymbolicKernel::new(), None, &request("400 [deg]"))
            .unwrap_err();
        assert!(matches!(
            err,
            BindError::NonExhaustiveConditional { ref feature, ref instance, .. }
                if feature == "pi1_if2" && instance == "pi1"
        ));
        assert_eq!(ids.counter("pi"), 1);
    }

    #[test]
    fn test_reinstantiation_does_not_collide() {
        let registry = registry();
        let binder = InstanceBinder::new(&registry);
        let mut ids = IdentifierAllocator::new();
        let mut kernel = SymbolicKernel::new();
        let a = binder
            .instantiate(&mut ids, &mut kernel, None, &request("340 [deg]"))
            .unwrap();
        let b = binder
            .instantiate(&mut ids, &mut kernel, None, &request("360 [deg]"))
            .unwrap();
        assert_eq!(a.handle("CUFF_FINAL"), Some("pi1_csel4"));
        assert_eq!(b.handle("CUFF_FINAL"), Some("pi2_csel4"));
        assert_eq!(
            b.resolve("CUFF_FINAL").unwrap().first(),
            Some(&EntityRef::domain("pi2_cyl2"))
        );
    }

    #[test]
    fn test_rebuild_reuses_instance_and_source_ids() {
        let registry = registry();
        let binder = InstanceBinder::new(&registry);
        let mut ids = IdentifierAllocator::new();
        let first = request("340 [deg]").with_pseudonym("Cuff 0_Tube");
        binder
            .instantiate(&mut ids, &mut SymbolicKernel::new(), None, &first)
            .unwrap();

        let rebuilt = binder
            .instantiate(
                &mut ids,
                &mut SymbolicKernel::new(),
                None,
                &request("360 [deg]").with_pseudonym("Cuff 0_Tube").reusing("pi1"),
            )
            .unwrap();
        assert_eq!(rebuilt.instance_id(), "pi1");
        assert_eq!(rebuilt.handle("CUFF_FINAL"), Some("pi1_csel4"));
        assert_eq!(rebuilt.branches()[1].arm, Arm::Branch(0));
        assert_eq!(rebuilt.sources(), ["pcs1"]);
        assert_eq!(ids.counter("pi"), 1);
        assert_eq!(ids.counter("pcs"), 1);
        assert_eq!(ids.current_sources().count(), 1);

        let err = binder
            .instantiate(
                &mut ids,
                &mut SymbolicKernel::new(),
                None,
                &request("340 [deg]").reusing("pi2"),
            )
            .unwrap_err();
        assert!(matches!(
            err,
            BindError::Allocation { source: IdentError::NotIssued { .. }, .. }
        ));
    }

    #[test]
    fn test_duplicate_pseudonym_rejected() {
        let registry = registry();
        let binder = InstanceBinder::new(&registry);
        let mut ids = IdentifierAllocator::new();
        let req = request("340 [deg]").with_pseudonym("Cuff 0_Tube");
        binder
            .instantiate(&mut ids, &mut SymbolicKernel::new(), None, &req)
            .unwrap();
        let err = binder
            .instantiate(&mut ids, &mut SymbolicKernel::new(), None, &req)
            .unwrap_err();
        assert!(matches!(
            err,
            BindError::Allocation {
                source: IdentError::DuplicatePseudonym { .. },
                ..
            }
        ));
        assert_eq!(ids.get("Cuff 0_Tube"), Some("pi1"));
    }
}
