// Scalar-or-vector numeric container shared by every graph node

use folio_core::domain::errors::{FolioError, Result};

/// A node's numeric payload: a single double or a row vector of doubles.
/// The variant tag doubles as the shape flag consulted by the broadcast
/// rules below.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Scalar(f64),
    Vector(Vec<f64>),
}

impl Value {
    pub fn is_vector(&self) -> bool {
        matches!(self, Value::Vector(_))
    }

    /// Vector length; a scalar reports 1.
    pub fn len(&self) -> usize {
        match self {
            Value::Scalar(_) => 1,
            Value::Vector(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Value::Vector(v) if v.is_empty())
    }

    pub fn as_scalar(&self) -> Result<f64> {
        match self {
            Value::Scalar(s) => Ok(*s),
            Value::Vector(v) => Err(FolioError::ShapeMismatch(format!(
                "expected scalar, found vector of length {}",
                v.len()
            ))),
        }
    }

    pub fn as_slice(&self) -> Result<&[f64]> {
        match self {
            Value::Vector(v) => Ok(v),
            Value::Scalar(_) => Err(FolioError::ShapeMismatch(
                "expected vector, found scalar".to_string(),
            )),
        }
    }

    /// Sum of all components (identity on a scalar).
    pub fn sum(&self) -> f64 {
        match self {
            Value::Scalar(s) => *s,
            Value::Vector(v) => v.iter().sum(),
        }
    }

    /// A zero value of the same shape, used to seed gradient accumulators.
    pub fn zeros_like(&self) -> Value {
        match self {
            Value::Scalar(_) => Value::Scalar(0.0),
            Value::Vector(v) => Value::Vector(vec![0.0; v.len()]),
        }
    }

    /// Broadcast product:
    /// vector * vector -> elementwise (lengths must agree),
    /// scalar * vector or vector * scalar -> uniform scaling,
    /// scalar * scalar -> scalar.
    pub fn broadcast_mul(&self, other: &Value) -> Result<Value> {
        match (self, other) {
            (Value::Scalar(a), Value::Scalar(b)) => Ok(Value::Scalar(a * b)),
            (Value::Scalar(a), Value::Vector(b)) => {
                Ok(Value::Vector(b.iter().map(|x| a * x).collect()))
            }
            (Value::Vector(a), Value::Scalar(b)) => {
                Ok(Value::Vector(a.iter().map(|x| x * b).collect()))
            }
            (Value::Vector(a), Value::Vector(b)) => {
                if a.len() != b.len() {
                    return Err(FolioError::ShapeMismatch(format!(
                        "elementwise product of vectors of length {} and {}",
                        a.len(),
                        b.len()
                    )));
                }
                Ok(Value::Vector(a.iter().zip(b).map(|(x, y)| x * y).collect()))
            }
        }
    }

    /// Broadcast quotient, same shape table as `broadcast_mul`. Division by
    /// zero or near-zero is not guarded; NaN/inf propagate.
    pub fn broadcast_div(&self, other: &Value) -> Result<Value> {
        match (self, other) {
            (Value::Scalar(a), Value::Scalar(b)) => Ok(Value::Scalar(a / b)),
            (Value::Scalar(a), Value::Vector(b)) => {
                Ok(Value::Vector(b.iter().map(|x| a / x).collect()))
            }
            (Value::Vector(a), Value::Scalar(b)) => {
                Ok(Value::Vector(a.iter().map(|x| x / b).collect()))
            }
            (Value::Vector(a), Value::Vector(b)) => {
                if a.len() != b.len() {
                    return Err(FolioError::ShapeMismatch(format!(
                        "elementwise quotient of vectors of length {} and {}",
                        a.len(),
                        b.len()
                    )));
                }
                Ok(Value::Vector(a.iter().zip(b).map(|(x, y)| x / y).collect()))
            }
        }
    }

    pub fn sub_constant(&self, c: f64) -> Value {
        match self {
            Value::Scalar(s) => Value::Scalar(s - c),
            Value::Vector(v) => Value::Vector(v.iter().map(|x| x - c).collect()),
        }
    }

    /// Elementwise (or scalar) power.
    pub fn powf(&self, exponent: f64) -> Value {
        match self {
            Value::Scalar(s) => Value::Scalar(s.powf(exponent)),
            Value::Vector(v) => Value::Vector(v.iter().map(|x| x.powf(exponent)).collect()),
        }
    }

    pub fn scale(&self, k: f64) -> Value {
        match self {
            Value::Scalar(s) => Value::Scalar(s * k),
            Value::Vector(v) => Value::Vector(v.iter().map(|x| x * k).collect()),
        }
    }

    pub fn neg(&self) -> Value {
        self.scale(-1.0)
    }

    /// Additive gradient accumulation. A vector contribution arriving at a
    /// scalar accumulator is sum-reduced first; vector contributions must
    /// match the accumulator's length.
    pub fn accumulate(&mut self, contribution: &Value) -> Result<()> {
        match (self, contribution) {
            (Value::Scalar(acc), c) => {
                *acc += c.sum();
                Ok(())
            }
            (Value::Vector(acc), Value::Scalar(c)) => {
                for slot in acc.iter_mut() {
                    *slot += c;
                }
                Ok(())
            }
            (Value::Vector(acc), Value::Vector(c)) => {
                if acc.len() != c.len() {
                    return Err(FolioError::ShapeMismatch(format!(
                        "accumulating gradient of length {} into accumulator of length {}",
                        c.len(),
                        acc.len()
                    )));
                }
                for (slot, x) in acc.iter_mut().zip(c) {
                    *slot += x;
                }
                Ok(())
            }
        }
    }
}
