//! Build sessions
//!
//! A [`Session`] owns everything one model build needs: the template
//! registry, the global identifier allocator, the geometry kernel and the
//! part instances built so far. [`Session::run`] drives a list of designs,
//! recording a failure for a design and moving on to the next one.

use indexmap::IndexMap;
use tracing::{error, info};

use crate::binder::{InstanceBinder, InstanceRequest, PartInstance};
use crate::config::AssemblyConfig;
use crate::design::{Design, DesignTable};
use crate::expr::Scope;
use crate::ident::IdentifierAllocator;
use crate::kernel::{GeometryKernel, SymbolicKernel};
use crate::selection::{Members, SelectionError};
use crate::template::TemplateRegistry;
use crate::AssemblyError;

/// A registered design table and its parameter group identifier
#[derive(Debug, Clone)]
struct RegisteredDesign {
    parameter_group: String,
    table: DesignTable,
}

/// What happened to one design during [`Session::run`]
#[derive(Debug)]
pub struct DesignOutcome {
    pub design: String,
    /// Parameter group identifier ("par1"), if the design got that far
    pub parameter_group: Option<String>,
    /// Identifiers of the instances built for the design
    pub instances: Vec<String>,
    pub error: Option<AssemblyError>,
}

impl DesignOutcome {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Debug, Default)]
pub struct DriverReport {
    pub outcomes: Vec<DesignOutcome>,
}

impl DriverReport {
    pub fn is_success(&self) -> bool {
        self.outcomes.iter().all(DesignOutcome::is_success)
    }

    pub fn failures(&self) -> impl Iterator<Item = &DesignOutcome> {
        self.outcomes.iter().filter(|o| !o.is_success())
    }
}

pub struct Session<K: GeometryKernel = SymbolicKernel> {
    registry: TemplateRegistry,
    ids: IdentifierAllocator,
    kernel: K,
    config: AssemblyConfig,
    designs: IndexMap<String, RegisteredDesign>,
    instances: IndexMap<String, PartInstance>,
}

impl Session<SymbolicKernel> {
    /// Session over the symbolic kernel
    pub fn new(registry: TemplateRegistry) -> Self {
        Self::with_kernel(registry, SymbolicKernel::new())
    }
}

impl<K: GeometryKernel> Session<K> {
    pub fn with_kernel(registry: TemplateRegistry, kernel: K) -> Self {
        Self {
            registry,
            ids: IdentifierAllocator::new(),
            kernel,
            config: AssemblyConfig::default(),
            designs: IndexMap::new(),
            instances: IndexMap::new(),
        }
    }

    pub fn with_config(mut self, config: AssemblyConfig) -> Self {
        self.config = config;
        self
    }

    /// Continue numbering from a previously saved allocator
    pub fn with_allocator(mut self, ids: IdentifierAllocator) -> Self {
        self.ids = ids;
        self
    }

    pub fn registry(&self) -> &TemplateRegistry {
        &self.registry
    }

    pub fn allocator(&self) -> &IdentifierAllocator {
        &self.ids
    }

    pub fn kernel(&self) -> &K {
        &self.kernel
    }

    pub fn config(&self) -> &AssemblyConfig {
        &self.config
    }

    /// Register a design table.
    ///
    /// Every parameter must evaluate. The design gets a parameter group
    /// identifier with the design name as pseudonym, which is returned.
    /// When a resumed allocator already binds the name to a parameter group
    /// that this session has not registered, the design is re-attached to
    /// that group.
    pub fn add_design(&mut self, table: DesignTable) -> Result<String, AssemblyError> {
        table.evaluate(self.config.tolerance)?;
        let category = &self.config.parameter_category;
        let resumed = self
            .ids
            .bound(table.name())
            .filter(|id| self.ids.is_issued(category, id))
            .filter(|_| !self.designs.contains_key(table.name()))
            .map(str::to_string);
        let parameter_group = match resumed {
            Some(group) => {
                info!(design = %table.name(), group = %group, "re-attached design");
                group
            }
            None => self.ids.next_with_pseudonym(category, table.name())?,
        };
        info!(design = %table.name(), group = %parameter_group, params = table.len(), "registered design");
        self.designs.insert(
            table.name().to_string(),
            RegisteredDesign {
                parameter_group: parameter_group.clone(),
                table,
            },
        );
        Ok(parameter_group)
    }

    pub fn design(&self, name: &str) -> Option<&DesignTable> {
        self.designs.get(name).map(|d| &d.table)
    }

    /// Instantiate without a design table; bindings may only use literals
    pub fn instantiate(&mut self, request: &InstanceRequest) -> Result<&PartInstance, AssemblyError> {
        self.build(None, request)
    }

    /// Instantiate with bindings evaluated against a registered design
    pub fn instantiate_in(
        &mut self,
        design: &str,
        request: &InstanceRequest,
    ) -> Result<&PartInstance, AssemblyError> {
        if !self.designs.contains_key(design) {
            return Err(AssemblyError::UnknownDesign {
                name: design.to_string(),
            });
        }
        self.build(Some(design), request)
    }

    /// Re-run a template under an instance identifier issued earlier,
    /// replacing the stored instance
    pub fn rebuild(
        &mut self,
        instance_id: &str,
        request: &InstanceRequest,
    ) -> Result<&PartInstance, AssemblyError> {
        self.build(None, &request.clone().reusing(instance_id))
    }

    /// [`Session::rebuild`] with bindings evaluated against a registered design
    pub fn rebuild_in(
        &mut self,
        design: &str,
        instance_id: &str,
        request: &InstanceRequest,
    ) -> Result<&PartInstance, AssemblyError> {
        if !self.designs.contains_key(design) {
            return Err(AssemblyError::UnknownDesign {
                name: design.to_string(),
            });
        }
        self.build(Some(design), &request.clone().reusing(instance_id))
    }

    fn build(
        &mut self,
        design: Option<&str>,
        request: &InstanceRequest,
    ) -> Result<&PartInstance, AssemblyError> {
        let scope = design
            .and_then(|name| self.designs.get(name))
            .map(|d| &d.table as &dyn Scope);
        let binder = InstanceBinder::new(&self.registry).with_config(self.config.clone());
        let instance = binder.instantiate(&mut self.ids, &mut self.kernel, scope, request)?;
        let id = instance.instance_id().to_string();
        let index = self.instances.insert_full(id, instance).0;
        Ok(&self.instances[index])
    }

    pub fn instance(&self, id: &str) -> Option<&PartInstance> {
        self.instances.get(id)
    }

    /// Look up an instance by the pseudonym it was created with
    pub fn instance_by_pseudonym(&self, pseudonym: &str) -> Option<&PartInstance> {
        self.ids.get(pseudonym).and_then(|id| self.instances.get(id))
    }

    /// Instances in creation order
    pub fn instances(&self) -> impl Iterator<Item = &PartInstance> {
        self.instances.values()
    }

    /// Resolve a global selection handle ("pi3_csel2").
    ///
    /// The owner is the instance with the longest identifier that prefixes
    /// the handle, so categories may themselves contain `_`.
    pub fn resolve(&self, handle: &str) -> Result<&Members, AssemblyError> {
        let instance = self
            .instances
            .iter()
            .filter(|(id, _)| {
                handle
                    .strip_prefix(id.as_str())
                    .is_some_and(|rest| rest.starts_with('_'))
            })
            .max_by_key(|(id, _)| id.len())
            .map(|(_, instance)| instance)
            .ok_or_else(|| SelectionError::UnknownSelection {
                selection: handle.to_string(),
            })?;
        Ok(instance.resolve_handle(handle)?)
    }

    /// Build every design in order.
    ///
    /// A design's instances are built in order; the first failure is
    /// recorded, the rest of that design is skipped and the run continues
    /// with the next design.
    pub fn run(&mut self, designs: &[Design]) -> DriverReport {
        let mut report = DriverReport::default();
        for (index, design) in designs.iter().enumerate() {
            let cuff_index = u32::try_from(index).unwrap_or(u32::MAX);
            let mut outcome = DesignOutcome {
                design: design.name().to_string(),
                parameter_group: None,
                instances: Vec::new(),
                error: None,
            };

            match self.add_design(design.table.clone()) {
                Ok(group) => outcome.parameter_group = Some(group),
                Err(e) => outcome.error = Some(e),
            }

            if outcome.error.is_none() {
                for spec in &design.instances {
                    let request = spec.request(cuff_index);
                    // Instances bound by a resumed snapshot are rebuilt in place
                    let resumed = request
                        .pseudonym
                        .as_deref()
                        .and_then(|alias| self.ids.bound(alias))
                        .filter(|id| !self.instances.contains_key(*id))
                        .map(str::to_string);
                    let built = match resumed {
                        Some(id) => self.rebuild_in(design.name(), &id, &request),
                        None => self.instantiate_in(design.name(), &request),
                    };
                    match built {
                        Ok(instance) => outcome.instances.push(instance.instance_id().to_string()),
                        Err(e) => {
                            outcome.error = Some(e);
                            break;
                        }
                    }
                }
            }

            match &outcome.error {
                Some(e) => error!(design = %outcome.design, error = %e, "design failed"),
                None => info!(
                    design = %outcome.design,
                    instances = outcome.instances.len(),
                    "design built"
                ),
            }
            report.outcomes.push(outcome);
        }
        report
    }
}
