// Reverse-mode AD over an arena of operator nodes
//
// The optimization driver owns one Graph per iteration: it wraps the current
// weight vector in a Variable, composes the objective on top, evaluates,
// derives, and discards the graph. Children are addressed by NodeId index,
// so nodes carry no lifetimes and gradient accumulators always start at zero
// in a freshly built graph.

use folio_core::domain::errors::{FolioError, Result};
use ndarray::Array2;

use crate::value::Value;

/// Index of a node inside its [`Graph`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeId(usize);

/// Shape of a node's result, fixed when the node is constructed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    Scalar,
    Vector,
}

#[derive(Debug)]
enum Node {
    /// Leaf holding an externally supplied value; gradients accumulate in
    /// `partial` across every path that reaches it.
    Variable { partial: Value },
    /// Dot product of the operand with a fixed coefficient vector.
    LinearProduct { input: NodeId, coeffs: Vec<f64> },
    /// x' * A * x for a fixed square matrix A.
    QuadraticForm { input: NodeId, matrix: Array2<f64> },
    /// Elementwise (or scalar) power with a fixed exponent.
    Power { input: NodeId, exponent: f64 },
    /// Elementwise / broadcast product of two operands.
    Product { lhs: NodeId, rhs: NodeId },
    /// Subtraction of a fixed constant.
    SubtractConstant { input: NodeId, constant: f64 },
    /// Elementwise / broadcast quotient. Near-zero denominators are not
    /// guarded; NaN and inf propagate.
    Divide { numer: NodeId, denom: NodeId },
}

struct Slot {
    node: Node,
    shape: Shape,
    value: Value,
}

/// Expression arena for a single evaluate + derive cycle.
pub struct Graph {
    slots: Vec<Slot>,
    evaluated: bool,
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}

impl Graph {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            evaluated: false,
        }
    }

    fn push(&mut self, node: Node, shape: Shape) -> NodeId {
        let value = match shape {
            Shape::Scalar => Value::Scalar(0.0),
            Shape::Vector => Value::Vector(Vec::new()),
        };
        self.slots.push(Slot { node, shape, value });
        NodeId(self.slots.len() - 1)
    }

    pub fn shape(&self, id: NodeId) -> Shape {
        self.slots[id.0].shape
    }

    /// Value cached by the last `evaluate`.
    pub fn value(&self, id: NodeId) -> &Value {
        &self.slots[id.0].value
    }

    /// Gradient accumulated at a Variable by `derive`.
    pub fn partial(&self, id: NodeId) -> Result<&Value> {
        match &self.slots[id.0].node {
            Node::Variable { partial } => Ok(partial),
            _ => Err(FolioError::PreconditionViolated(
                "partial requested on a non-variable node".to_string(),
            )),
        }
    }

    // ------------------------------------------------------------------
    // Constructors. Each fixes the node's shape flag from its kind and its
    // children's flags; dimension checks run during evaluate, where operand
    // lengths are known.
    // ------------------------------------------------------------------

    pub fn variable(&mut self, value: Value) -> NodeId {
        let shape = if value.is_vector() {
            Shape::Vector
        } else {
            Shape::Scalar
        };
        let partial = value.zeros_like();
        let id = self.push(Node::Variable { partial }, shape);
        self.slots[id.0].value = value;
        id
    }

    pub fn linear_product(&mut self, input: NodeId, coeffs: Vec<f64>) -> NodeId {
        self.push(Node::LinearProduct { input, coeffs }, Shape::Scalar)
    }

    pub fn quadratic_form(&mut self, input: NodeId, matrix: Array2<f64>) -> NodeId {
        self.push(Node::QuadraticForm { input, matrix }, Shape::Scalar)
    }

    pub fn power(&mut self, input: NodeId, exponent: f64) -> NodeId {
        let shape = self.shape(input);
        self.push(Node::Power { input, exponent }, shape)
    }

    pub fn product(&mut self, lhs: NodeId, rhs: NodeId) -> NodeId {
        let shape = match (self.shape(lhs), self.shape(rhs)) {
            (Shape::Scalar, Shape::Scalar) => Shape::Scalar,
            _ => Shape::Vector,
        };
        self.push(Node::Product { lhs, rhs }, shape)
    }

    pub fn subtract_constant(&mut self, input: NodeId, constant: f64) -> NodeId {
        let shape = self.shape(input);
        self.push(Node::SubtractConstant { input, constant }, shape)
    }

    pub fn divide(&mut self, numer: NodeId, denom: NodeId) -> NodeId {
        let shape = self.shape(numer);
        self.push(Node::Divide { numer, denom }, shape)
    }

    // ------------------------------------------------------------------
    // Forward pass
    // ------------------------------------------------------------------

    /// Evaluate the subgraph rooted at `id` bottom-up and return the root
    /// value. Idempotent on an unmutated graph.
    pub fn evaluate(&mut self, id: NodeId) -> Result<Value> {
        self.eval_node(id)?;
        self.evaluated = true;
        Ok(self.slots[id.0].value.clone())
    }

    fn eval_node(&mut self, id: NodeId) -> Result<()> {
        let (first, second) = self.children(id);
        if let Some(child) = first {
            self.eval_node(child)?;
        }
        if let Some(child) = second {
            self.eval_node(child)?;
        }

        let value = self.forward(id)?;
        let slot = &mut self.slots[id.0];
        if value.is_vector() != (slot.shape == Shape::Vector) {
            return Err(FolioError::ShapeMismatch(format!(
                "node constructed as {:?} produced a {} value",
                slot.shape,
                if value.is_vector() { "vector" } else { "scalar" }
            )));
        }
        slot.value = value;
        Ok(())
    }

    fn children(&self, id: NodeId) -> (Option<NodeId>, Option<NodeId>) {
        match &self.slots[id.0].node {
            Node::Variable { .. } => (None, None),
            Node::LinearProduct { input, .. }
            | Node::QuadraticForm { input, .. }
            | Node::Power { input, .. }
            | Node::SubtractConstant { input, .. } => (Some(*input), None),
            Node::Product { lhs, rhs } => (Some(*lhs), Some(*rhs)),
            Node::Divide { numer, denom } => (Some(*numer), Some(*denom)),
        }
    }

    fn forward(&self, id: NodeId) -> Result<Value> {
        match &self.slots[id.0].node {
            Node::Variable { .. } => Ok(self.slots[id.0].value.clone()),

            Node::LinearProduct { input, coeffs } => match self.value(*input) {
                Value::Vector(x) => {
                    if x.len() != coeffs.len() {
                        return Err(FolioError::ShapeMismatch(format!(
                            "linear product of operand length {} with {} coefficients",
                            x.len(),
                            coeffs.len()
                        )));
                    }
                    Ok(Value::Scalar(
                        x.iter().zip(coeffs).map(|(a, b)| a * b).sum(),
                    ))
                }
                // Scalar operand broadcasts across the coefficient vector.
                Value::Scalar(e) => Ok(Value::Scalar(e * coeffs.iter().sum::<f64>())),
            },

            Node::QuadraticForm { input, matrix } => {
                let (rows, cols) = matrix.dim();
                if rows != cols {
                    return Err(FolioError::ShapeMismatch(format!(
                        "quadratic form matrix is {}x{}, expected square",
                        rows, cols
                    )));
                }
                match self.value(*input) {
                    Value::Vector(x) => {
                        if x.len() != rows {
                            return Err(FolioError::ShapeMismatch(format!(
                                "quadratic form of operand length {} with {}x{} matrix",
                                x.len(),
                                rows,
                                cols
                            )));
                        }
                        let mut acc = 0.0;
                        for i in 0..rows {
                            for j in 0..cols {
                                acc += x[i] * matrix[[i, j]] * x[j];
                            }
                        }
                        Ok(Value::Scalar(acc))
                    }
                    Value::Scalar(e) => Ok(Value::Scalar(e * e * matrix.sum())),
                }
            }

            Node::Power { input, exponent } => Ok(self.value(*input).powf(*exponent)),

            Node::Product { lhs, rhs } => self.value(*lhs).broadcast_mul(self.value(*rhs)),

            Node::SubtractConstant { input, constant } => {
                Ok(self.value(*input).sub_constant(*constant))
            }

            Node::Divide { numer, denom } => self.value(*numer).broadcast_div(self.value(*denom)),
        }
    }

    // ------------------------------------------------------------------
    // Backward pass
    // ------------------------------------------------------------------

    /// Push `seed` down from `id`, accumulating gradients at every Variable
    /// it reaches. Requires a prior `evaluate` so that node values are
    /// populated.
    pub fn derive(&mut self, id: NodeId, seed: &Value) -> Result<()> {
        if !self.evaluated {
            return Err(FolioError::PreconditionViolated(
                "derive called before evaluate".to_string(),
            ));
        }
        self.derive_node(id, seed)
    }

    fn derive_node(&mut self, id: NodeId, seed: &Value) -> Result<()> {
        // The accumulator sum-reduces a vector seed arriving at a scalar
        // variable.
        if let Node::Variable { partial } = &mut self.slots[id.0].node {
            return partial.accumulate(seed);
        }

        let pushes = self.backward(id, seed)?;
        for (child, child_seed) in pushes {
            self.derive_node(child, &child_seed)?;
        }
        Ok(())
    }

    /// Local chain rule: reshape `seed` into one gradient per child.
    fn backward(&self, id: NodeId, seed: &Value) -> Result<Vec<(NodeId, Value)>> {
        match &self.slots[id.0].node {
            Node::Variable { .. } => Ok(Vec::new()),

            Node::LinearProduct { input, coeffs } => {
                let child_seed = match self.value(*input) {
                    Value::Vector(_) => Value::Vector(coeffs.clone()).broadcast_mul(seed)?,
                    Value::Scalar(_) => seed.scale(coeffs.iter().sum()),
                };
                Ok(vec![(*input, child_seed)])
            }

            Node::QuadraticForm { input, matrix } => {
                let child_seed = match self.value(*input) {
                    Value::Vector(x) => {
                        // d(x'Ax)/dx = 2*A*x for symmetric A.
                        let n = x.len();
                        let mut grad = vec![0.0; n];
                        for i in 0..n {
                            for j in 0..n {
                                grad[i] += 2.0 * matrix[[i, j]] * x[j];
                            }
                        }
                        Value::Vector(grad).broadcast_mul(seed)?
                    }
                    Value::Scalar(e) => seed.scale(2.0 * e * matrix.sum()),
                };
                Ok(vec![(*input, child_seed)])
            }

            Node::Power { input, exponent } => {
                let local = self.value(*input).powf(exponent - 1.0).scale(*exponent);
                Ok(vec![(*input, local.broadcast_mul(seed)?)])
            }

            Node::Product { lhs, rhs } => {
                let to_lhs = self.value(*rhs).broadcast_mul(seed)?;
                let to_rhs = self.value(*lhs).broadcast_mul(seed)?;
                Ok(vec![(*lhs, to_lhs), (*rhs, to_rhs)])
            }

            Node::SubtractConstant { input, .. } => Ok(vec![(*input, seed.clone())]),

            Node::Divide { numer, denom } => {
                let denom_val = self.value(*denom);
                let to_numer = seed.broadcast_div(denom_val)?;
                let denom_sq = denom_val.broadcast_mul(denom_val)?;
                let to_denom = seed
                    .broadcast_mul(self.value(*numer))?
                    .broadcast_div(&denom_sq)?
                    .neg();
                Ok(vec![(*numer, to_numer), (*denom, to_denom)])
            }
        }
    }
}
