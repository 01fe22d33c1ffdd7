//! Template registry for storing and retrieving part templates

use std::path::{Path, PathBuf};
use std::sync::Arc;

use indexmap::IndexMap;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::expr::Expr;
use crate::ident::{IdentError, IdentifierAllocator};
use crate::selection::{SelectionError, SelectionRegistry};
use crate::ParseError;

use super::step::ConstructionStep;

/// Category of template-local selection identifiers ("csel1", "csel2", ...)
pub const SELECTION_CATEGORY: &str = "csel";

/// The bundled cuff catalog
const BUILTIN_CATALOG: &str = include_str!("../../catalog/cuffs.cuff");

/// Errors that can occur during template operations
#[derive(Debug, Error)]
pub enum TemplateError {
    /// Template not found in registry
    #[error("template not found: {name}")]
    NotFound { name: String },

    /// Two parameters with the same name
    #[error("duplicate parameter {param} in template {template}")]
    DuplicateParameter { template: String, param: String },

    /// Selection declaration rejected by the registry
    #[error("template {template}: {source}")]
    Selection {
        template: String,
        #[source]
        source: SelectionError,
    },

    /// A label used twice among the template's selections and steps
    #[error("duplicate label '{label}' in template {template}")]
    DuplicateLabel { template: String, label: String },

    /// A step references a selection the template never declared
    #[error("step {feature} of template {template} references undeclared selection {selection}")]
    UndeclaredSelection {
        template: String,
        selection: String,
        feature: String,
    },

    /// A predicate references something that is not a parameter
    #[error("predicate of {feature} in template {template} references unknown parameter {name}")]
    UnknownParameter {
        template: String,
        name: String,
        feature: String,
    },

    /// A selection produced only inside one arm is read outside it
    #[error("step {feature} of template {template} reads {selection}, which only exists inside another branch")]
    BranchLeak {
        template: String,
        selection: String,
        feature: String,
    },

    /// A conditional with no arms at all
    #[error("conditional {feature} in template {template} has no branches")]
    EmptyConditional { template: String, feature: String },

    /// Unsupported selection flag
    #[error("unknown flag '{flag}' on selection {selection} in template {template}")]
    UnknownFlag {
        template: String,
        selection: String,
        flag: String,
    },

    /// Template source failed to parse
    #[error("invalid template source {origin}: {}", errors.iter().map(ToString::to_string).collect::<Vec<_>>().join("; "))]
    Parse {
        origin: String,
        text: String,
        errors: Vec<ParseError>,
    },

    /// Error reading template file
    #[error("error reading template file {path}: {message}")]
    FileReadError { path: PathBuf, message: String },
}

impl TemplateError {
    /// Human-readable report; parse errors are rendered against their source
    pub fn render(&self) -> String {
        match self {
            TemplateError::Parse {
                origin,
                text,
                errors,
            } => errors
                .iter()
                .map(|e| e.format(text, origin))
                .collect::<Vec<_>>()
                .join("\n"),
            other => other.to_string(),
        }
    }
}

/// A declared template parameter
#[derive(Debug, Clone, PartialEq)]
pub struct ParamDecl {
    pub name: String,
    pub default: Expr,
    /// Unit of the default literal, if it carries one
    pub unit: Option<String>,
}

impl ParamDecl {
    pub fn new(name: impl Into<String>, default: Expr) -> Self {
        let unit = default.unit().map(str::to_string);
        Self {
            name: name.into(),
            default,
            unit,
        }
    }
}

/// A declared selection of a template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionSpec {
    /// Name steps use to refer to the selection
    pub label: String,
    /// Optional human-readable name shown by the host engine
    pub display: Option<String>,
    /// Whether instances keep the selection's entities by default
    pub keep: bool,
    /// Whether the selection is registered as a current source
    pub source: bool,
    pub(crate) local_id: String,
}

impl SelectionSpec {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            display: None,
            keep: false,
            source: false,
            local_id: String::new(),
        }
    }

    pub fn display(mut self, display: impl Into<String>) -> Self {
        self.display = Some(display.into());
        self
    }

    pub fn keep(mut self) -> Self {
        self.keep = true;
        self
    }

    pub fn source(mut self) -> Self {
        self.source = true;
        self
    }

    /// Template-local identifier ("csel3")
    pub fn local_id(&self) -> &str {
        &self.local_id
    }
}

/// A validated, immutable part template
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    pub(super) name: String,
    pub(super) params: IndexMap<String, ParamDecl>,
    pub(super) selections: IndexMap<String, SelectionSpec>,
    pub(super) steps: Vec<ConstructionStep>,
    ids: IdentifierAllocator,
}

impl Template {
    /// Build and validate a template.
    ///
    /// Selections get local ids "csel1".. in declaration order and steps get
    /// feature ids per category ("cyl1", "dif1", "if1") in pre-order. Labels
    /// of selections and steps share one pseudonym namespace.
    pub fn new(
        name: impl Into<String>,
        params: Vec<ParamDecl>,
        selections: Vec<SelectionSpec>,
        mut steps: Vec<ConstructionStep>,
    ) -> Result<Self, TemplateError> {
        let name = name.into();

        let mut param_map = IndexMap::new();
        for param in params {
            if param_map.contains_key(&param.name) {
                return Err(TemplateError::DuplicateParameter {
                    template: name,
                    param: param.name,
                });
            }
            param_map.insert(param.name.clone(), param);
        }

        let duplicate_label = |err: IdentError, template: &str| match err {
            IdentError::DuplicatePseudonym { pseudonym, .. } => TemplateError::DuplicateLabel {
                template: template.to_string(),
                label: pseudonym,
            },
            // The scratch allocator only calls `next`/`next_with_pseudonym`
            IdentError::NotIssued { .. } | IdentError::PseudonymMismatch { .. } => {
                unreachable!("template allocator never reuses identifiers: {err}")
            }
        };

        let mut ids = IdentifierAllocator::new();
        let mut scratch = SelectionRegistry::new();
        let mut selection_map = IndexMap::new();
        for mut spec in selections {
            scratch
                .create_selection(&spec.label)
                .map_err(|source| TemplateError::Selection {
                    template: name.clone(),
                    source,
                })?;
            spec.local_id = ids
                .next_with_pseudonym(SELECTION_CATEGORY, &spec.label)
                .map_err(|e| duplicate_label(e, &name))?;
            ids.push_label(spec.label.clone());
            selection_map.insert(spec.label.clone(), spec);
        }

        assign_feature_ids(&mut steps, &mut ids).map_err(|e| duplicate_label(e, &name))?;

        let template = Self {
            name,
            params: param_map,
            selections: selection_map,
            steps,
            ids,
        };
        template.validate()?;
        Ok(template)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn params(&self) -> &IndexMap<String, ParamDecl> {
        &self.params
    }

    /// Check if this template has a parameter
    pub fn has_parameter(&self, name: &str) -> bool {
        self.params.contains_key(name)
    }

    /// Get all parameter names
    pub fn parameter_names(&self) -> Vec<&str> {
        self.params.keys().map(String::as_str).collect()
    }

    pub fn selections(&self) -> &IndexMap<String, SelectionSpec> {
        &self.selections
    }

    /// Look up a declared selection by label
    pub fn selection(&self, label: &str) -> Option<&SelectionSpec> {
        self.selections.get(label)
    }

    pub fn steps(&self) -> &[ConstructionStep] {
        &self.steps
    }

    /// Template-local identifier table (selections and features)
    pub fn identifiers(&self) -> &IdentifierAllocator {
        &self.ids
    }
}

/// Assign feature ids in pre-order, conditionals before their arms
fn assign_feature_ids(
    steps: &mut [ConstructionStep],
    ids: &mut IdentifierAllocator,
) -> Result<(), IdentError> {
    for step in steps {
        let category = step.category();
        let id = match step.label() {
            Some(label) => {
                let label = label.to_string();
                ids.next_with_pseudonym(&category, &label)?
            }
            None => ids.next(&category),
        };
        step.set_feature_id(id);

        if let ConstructionStep::Conditional(conditional) = step {
            for branch in &mut conditional.branches {
                assign_feature_ids(&mut branch.steps, ids)?;
            }
            if let Some(otherwise) = &mut conditional.otherwise {
                assign_feature_ids(otherwise, ids)?;
            }
        }
    }
    Ok(())
}

/// Registry for storing templates
#[derive(Debug, Clone, Default)]
pub struct TemplateRegistry {
    templates: IndexMap<String, Arc<Template>>,
}

impl TemplateRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry preloaded with the bundled cuff catalog
    pub fn builtin() -> Result<Self, TemplateError> {
        let mut registry = Self::new();
        registry.load_str(BUILTIN_CATALOG, "<builtin>")?;
        Ok(registry)
    }

    /// Register a template, replacing any template of the same name.
    ///
    /// Instances already bound to the replaced template keep their `Arc`.
    pub fn register(&mut self, template: Template) -> Option<Arc<Template>> {
        let name = template.name().to_string();
        debug!(
            template = %name,
            params = template.params.len(),
            selections = template.selections.len(),
            "registering template"
        );
        let previous = self.templates.insert(name.clone(), Arc::new(template));
        if previous.is_some() {
            warn!(template = %name, "replaced existing template definition");
        }
        previous
    }

    /// Get a template by name
    pub fn get(&self, name: &str) -> Option<&Arc<Template>> {
        self.templates.get(name)
    }

    /// Get a template by name, failing with [`TemplateError::NotFound`]
    pub fn lookup(&self, name: &str) -> Result<Arc<Template>, TemplateError> {
        self.templates
            .get(name)
            .cloned()
            .ok_or_else(|| TemplateError::NotFound {
                name: name.to_string(),
            })
    }

    /// Check if a template exists
    pub fn contains(&self, name: &str) -> bool {
        self.templates.contains_key(name)
    }

    /// Get all template names, in registration order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.templates.keys().map(|s| s.as_str())
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    /// Parse, validate and register every template in `source`.
    ///
    /// Nothing is registered unless the whole source is valid. Returns the
    /// names of the registered templates.
    pub fn load_str(&mut self, source: &str, origin: &str) -> Result<Vec<String>, TemplateError> {
        let document = crate::parser::parse(source).map_err(|errors| TemplateError::Parse {
            origin: origin.to_string(),
            text: source.to_string(),
            errors,
        })?;

        let templates = document
            .templates
            .iter()
            .map(|decl| Template::from_decl(&decl.node))
            .collect::<Result<Vec<_>, _>>()?;

        let names: Vec<String> = templates.iter().map(|t| t.name().to_string()).collect();
        for template in templates {
            self.register(template);
        }
        info!(origin, count = names.len(), "loaded templates");
        Ok(names)
    }

    /// Load templates from a file
    pub fn load_file(&mut self, path: impl AsRef<Path>) -> Result<Vec<String>, TemplateError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|e| TemplateError::FileReadError {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        self.load_str(&source, &path.display().to_string())
    }
}
