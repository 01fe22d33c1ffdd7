//! Construction steps of a part template

use std::fmt;

use crate::expr::Expr;

/// A geometry argument handed to the host engine
#[derive(Debug, Clone, PartialEq)]
pub enum GeomValue {
    /// A single expression, e.g. `r: R_in`
    Scalar(Expr),
    /// A coordinate tuple, e.g. `pos: {0, 0, Center - L/2}`
    Vector(Vec<Expr>),
    /// A keyword the host understands, e.g. `quickplane: "xz"`
    Text(String),
}

impl fmt::Display for GeomValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GeomValue::Scalar(expr) => write!(f, "{expr}"),
            GeomValue::Vector(items) => {
                f.write_str("{")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("}")
            }
            GeomValue::Text(text) => f.write_str(text),
        }
    }
}

/// Identifier category of a primitive feature in the host engine
fn shape_category(shape: &str) -> String {
    let category = match shape.to_ascii_lowercase().as_str() {
        "cylinder" => "cyl",
        "workplane" => "wp",
        "revolve" => "rev",
        "extrude" => "ext",
        "rotate" => "rot",
        "move" => "mov",
        "econe" => "econ",
        "block" => "blk",
        "sphere" => "sph",
        "torus" => "tor",
        "helix" => "hel",
        "point" => "pt",
        "ballselection" => "ballsel",
        "boxselection" => "boxsel",
        "ellipse" => "e",
        "parametriccurve" => "pc",
        "sweep" => "swe",
        other => return other.to_string(),
    };
    category.to_string()
}

/// A primitive feature: creates geometry and/or transforms existing selections
#[derive(Debug, Clone, PartialEq)]
pub struct PrimitiveStep {
    pub(crate) feature_id: String,
    pub label: Option<String>,
    pub shape: String,
    pub inputs: Vec<String>,
    pub target: Option<String>,
    pub geometry: Vec<(String, GeomValue)>,
}

impl PrimitiveStep {
    pub fn new(shape: impl Into<String>) -> Self {
        Self {
            feature_id: String::new(),
            label: None,
            shape: shape.into(),
            inputs: Vec::new(),
            target: None,
            geometry: Vec::new(),
        }
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn input(mut self, selection: impl Into<String>) -> Self {
        self.inputs.push(selection.into());
        self
    }

    pub fn target(mut self, selection: impl Into<String>) -> Self {
        self.target = Some(selection.into());
        self
    }

    pub fn geom(mut self, key: impl Into<String>, value: GeomValue) -> Self {
        self.geometry.push((key.into(), value));
        self
    }

    pub fn feature_id(&self) -> &str {
        &self.feature_id
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum BooleanKind {
    Union { inputs: Vec<String> },
    Difference { primary: String, subtract: String },
    Partition { domain: String, tool: String },
}

impl BooleanKind {
    fn category(&self) -> &'static str {
        match self {
            BooleanKind::Union { .. } => "uni",
            BooleanKind::Difference { .. } => "dif",
            BooleanKind::Partition { .. } => "pard",
        }
    }

    /// Selections read by the operation
    pub fn inputs(&self) -> Vec<&str> {
        match self {
            BooleanKind::Union { inputs } => inputs.iter().map(String::as_str).collect(),
            BooleanKind::Difference { primary, subtract } => vec![primary.as_str(), subtract.as_str()],
            BooleanKind::Partition { domain, tool } => vec![domain.as_str(), tool.as_str()],
        }
    }
}

/// A boolean combination whose result is contributed to `target`
#[derive(Debug, Clone, PartialEq)]
pub struct BooleanStep {
    pub(crate) feature_id: String,
    pub label: Option<String>,
    pub kind: BooleanKind,
    pub target: String,
}

impl BooleanStep {
    fn with_kind(kind: BooleanKind, target: impl Into<String>) -> Self {
        Self {
            feature_id: String::new(),
            label: None,
            kind,
            target: target.into(),
        }
    }

    pub fn union<S: Into<String>>(
        inputs: impl IntoIterator<Item = S>,
        target: impl Into<String>,
    ) -> Self {
        Self::with_kind(
            BooleanKind::Union {
                inputs: inputs.into_iter().map(Into::into).collect(),
            },
            target,
        )
    }

    pub fn difference(
        primary: impl Into<String>,
        subtract: impl Into<String>,
        target: impl Into<String>,
    ) -> Self {
        Self::with_kind(
            BooleanKind::Difference {
                primary: primary.into(),
                subtract: subtract.into(),
            },
            target,
        )
    }

    pub fn partition(
        domain: impl Into<String>,
        tool: impl Into<String>,
        target: impl Into<String>,
    ) -> Self {
        Self::with_kind(
            BooleanKind::Partition {
                domain: domain.into(),
                tool: tool.into(),
            },
            target,
        )
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn feature_id(&self) -> &str {
        &self.feature_id
    }
}

/// Removes the members of `remove` from `target`
#[derive(Debug, Clone, PartialEq)]
pub struct DeleteStep {
    pub(crate) feature_id: String,
    pub label: Option<String>,
    pub target: String,
    pub remove: String,
}

impl DeleteStep {
    pub fn new(remove: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            feature_id: String::new(),
            label: None,
            target: target.into(),
            remove: remove.into(),
        }
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn feature_id(&self) -> &str {
        &self.feature_id
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Branch {
    pub predicate: Expr,
    pub steps: Vec<ConstructionStep>,
}

/// Ordered predicate arms; the first arm whose predicate holds runs.
///
/// Without an `otherwise` arm, a conditional in which no predicate holds
/// is an error at instantiation time.
#[derive(Debug, Clone, PartialEq)]
pub struct Conditional {
    pub(crate) feature_id: String,
    pub branches: Vec<Branch>,
    pub otherwise: Option<Vec<ConstructionStep>>,
}

impl Conditional {
    pub fn new() -> Self {
        Self {
            feature_id: String::new(),
            branches: Vec::new(),
            otherwise: None,
        }
    }

    pub fn branch(mut self, predicate: Expr, steps: Vec<ConstructionStep>) -> Self {
        self.branches.push(Branch { predicate, steps });
        self
    }

    pub fn otherwise(mut self, steps: Vec<ConstructionStep>) -> Self {
        self.otherwise = Some(steps);
        self
    }

    pub fn feature_id(&self) -> &str {
        &self.feature_id
    }

    /// Every arm's steps, `otherwise` last
    pub fn arms(&self) -> impl Iterator<Item = &[ConstructionStep]> {
        self.branches
            .iter()
            .map(|b| b.steps.as_slice())
            .chain(self.otherwise.as_deref())
    }
}

impl Default for Conditional {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConstructionStep {
    Primitive(PrimitiveStep),
    Boolean(BooleanStep),
    Delete(DeleteStep),
    Conditional(Conditional),
}

impl ConstructionStep {
    /// Template-local feature identifier (e.g. "cyl1", "dif2", "if1")
    pub fn feature_id(&self) -> &str {
        match self {
            ConstructionStep::Primitive(s) => &s.feature_id,
            ConstructionStep::Boolean(s) => &s.feature_id,
            ConstructionStep::Delete(s) => &s.feature_id,
            ConstructionStep::Conditional(s) => &s.feature_id,
        }
    }

    pub fn label(&self) -> Option<&str> {
        match self {
            ConstructionStep::Primitive(s) => s.label.as_deref(),
            ConstructionStep::Boolean(s) => s.label.as_deref(),
            ConstructionStep::Delete(s) => s.label.as_deref(),
            ConstructionStep::Conditional(_) => None,
        }
    }

    pub(crate) fn category(&self) -> String {
        match self {
            ConstructionStep::Primitive(s) => shape_category(&s.shape),
            ConstructionStep::Boolean(s) => s.kind.category().to_string(),
            ConstructionStep::Delete(_) => "del".to_string(),
            ConstructionStep::Conditional(_) => "if".to_string(),
        }
    }

    pub(crate) fn set_feature_id(&mut self, id: String) {
        match self {
            ConstructionStep::Primitive(s) => s.feature_id = id,
            ConstructionStep::Boolean(s) => s.feature_id = id,
            ConstructionStep::Delete(s) => s.feature_id = id,
            ConstructionStep::Conditional(s) => s.feature_id = id,
        }
    }

    /// Selections this step reads
    pub fn reads(&self) -> Vec<&str> {
        match self {
            ConstructionStep::Primitive(s) => s.inputs.iter().map(String::as_str).collect(),
            ConstructionStep::Boolean(s) => s.kind.inputs(),
            ConstructionStep::Delete(s) => vec![s.remove.as_str(), s.target.as_str()],
            ConstructionStep::Conditional(_) => Vec::new(),
        }
    }

    /// Selection this step contributes to
    pub fn writes(&self) -> Option<&str> {
        match self {
            ConstructionStep::Primitive(s) => s.target.as_deref(),
            ConstructionStep::Boolean(s) => Some(&s.target),
            ConstructionStep::Delete(_) | ConstructionStep::Conditional(_) => None,
        }
    }
}

impl From<PrimitiveStep> for ConstructionStep {
    fn from(step: PrimitiveStep) -> Self {
        ConstructionStep::Primitive(step)
    }
}

impl From<BooleanStep> for ConstructionStep {
    fn from(step: BooleanStep) -> Self {
        ConstructionStep::Boolean(step)
    }
}

impl From<DeleteStep> for ConstructionStep {
    fn from(step: DeleteStep) -> Self {
        ConstructionStep::Delete(step)
    }
}

impl From<Conditional> for ConstructionStep {
    fn from(step: Conditional) -> Self {
        ConstructionStep::Conditional(step)
    }
}
