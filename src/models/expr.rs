//! Model expressions such as `PowerLaw` or `PowerLaw+LogParabola`.
//!
//! Validation accepts one or two known model names joined by `+` or `*`.
//! Only `+` can be built into a model; `*` is recognised so that it can be
//! rejected explicitly instead of being confused with a sum.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The closed set of spectral shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelKind {
    PowerLaw,
    PowerLawCutOff,
    BrokenPowerLaw,
    LogParabola,
    SmoothBrokenPowerLaw,
}

impl ModelKind {
    pub const ALL: [ModelKind; 5] = [
        ModelKind::PowerLaw,
        ModelKind::PowerLawCutOff,
        ModelKind::BrokenPowerLaw,
        ModelKind::LogParabola,
        ModelKind::SmoothBrokenPowerLaw,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ModelKind::PowerLaw => "PowerLaw",
            ModelKind::PowerLawCutOff => "PowerLawCutOff",
            ModelKind::BrokenPowerLaw => "BrokenPowerLaw",
            ModelKind::LogParabola => "LogParabola",
            ModelKind::SmoothBrokenPowerLaw => "SmoothBrokenPowerLaw",
        }
    }

    /// Parameter names, in evaluation order.
    pub fn schema(self) -> &'static [&'static str] {
        match self {
            ModelKind::PowerLaw => &["index", "amplitude", "reference"],
            ModelKind::PowerLawCutOff => &["index", "amplitude", "reference", "alpha", "lambda"],
            ModelKind::BrokenPowerLaw => &["index1", "index2", "amplitude", "energy_break"],
            ModelKind::LogParabola => &["amplitude", "reference", "alpha", "beta"],
            ModelKind::SmoothBrokenPowerLaw => {
                &["index1", "index2", "amplitude", "energy_break", "reference", "beta"]
            }
        }
    }

    pub fn parse(s: &str) -> Option<ModelKind> {
        ModelKind::ALL.into_iter().find(|k| k.name() == s)
    }

    fn allowed_list() -> String {
        ModelKind::ALL.map(|k| k.name()).join(", ")
    }
}

impl std::fmt::Display for ModelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Binary composition operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModelOp {
    Add,
    Multiply,
}

impl ModelOp {
    pub fn symbol(self) -> char {
        match self {
            ModelOp::Add => '+',
            ModelOp::Multiply => '*',
        }
    }
}

/// A validated model expression.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModelExpr {
    Single(ModelKind),
    Compound {
        left: ModelKind,
        op: ModelOp,
        right: ModelKind,
    },
}

impl ModelExpr {
    pub fn kinds(&self) -> Vec<ModelKind> {
        match self {
            ModelExpr::Single(k) => vec![*k],
            ModelExpr::Compound { left, right, .. } => vec![*left, *right],
        }
    }
}

impl std::fmt::Display for ModelExpr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelExpr::Single(k) => write!(f, "{k}"),
            ModelExpr::Compound { left, op, right } => write!(f, "{left}{}{right}", op.symbol()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelExprError {
    #[error("Empty spectral model expression.")]
    Empty,
    #[error("Unknown spectral model '{name}'. Allowed models: {allowed}.")]
    UnknownModel { name: String, allowed: String },
    #[error("Spectral model expression '{expr}' has {count} components; at most 2 are supported.")]
    TooManyComponents { expr: String, count: usize },
    #[error("Spectral model composition with '{op}' is not implemented; use '+'.")]
    Unimplemented { op: char },
}

/// Validate a model expression against the allow-list.
pub fn parse_model_expr(input: &str) -> Result<ModelExpr, ModelExprError> {
    let expr: String = input.chars().filter(|c| !c.is_whitespace()).collect();
    if expr.is_empty() {
        return Err(ModelExprError::Empty);
    }

    let ops: Vec<(usize, ModelOp)> = expr
        .char_indices()
        .filter_map(|(i, c)| match c {
            '+' => Some((i, ModelOp::Add)),
            '*' => Some((i, ModelOp::Multiply)),
            _ => None,
        })
        .collect();

    if ops.len() > 1 {
        return Err(ModelExprError::TooManyComponents {
            count: ops.len() + 1,
            expr,
        });
    }

    let kind = |name: &str| {
        ModelKind::parse(name).ok_or_else(|| ModelExprError::UnknownModel {
            name: name.to_string(),
            allowed: ModelKind::allowed_list(),
        })
    };

    match ops.first() {
        None => Ok(ModelExpr::Single(kind(&expr)?)),
        Some(&(pos, op)) => {
            let left = kind(&expr[..pos])?;
            let right = kind(&expr[pos + 1..])?;
            Ok(ModelExpr::Compound { left, op, right })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_single_and_compound() {
        assert_eq!(
            parse_model_expr("LogParabola").unwrap(),
            ModelExpr::Single(ModelKind::LogParabola)
        );
        assert_eq!(
            parse_model_expr(" PowerLaw + LogParabola ").unwrap(),
            ModelExpr::Compound {
                left: ModelKind::PowerLaw,
                op: ModelOp::Add,
                right: ModelKind::LogParabola
            }
        );
        // Multiplication validates; building it is a separate decision.
        assert!(matches!(
            parse_model_expr("PowerLaw*PowerLaw").unwrap(),
            ModelExpr::Compound { op: ModelOp::Multiply, .. }
        ));
    }

    #[test]
    fn rejects_unknown_names_and_long_expressions() {
        assert!(matches!(
            parse_model_expr("ExpCutoffPowerLaw"),
            Err(ModelExprError::UnknownModel { .. })
        ));
        assert!(matches!(
            parse_model_expr("PowerLaw-LogParabola"),
            Err(ModelExprError::UnknownModel { .. })
        ));
        assert!(matches!(
            parse_model_expr("PowerLaw+PowerLaw+PowerLaw"),
            Err(ModelExprError::TooManyComponents { count: 3, .. })
        ));
        assert!(matches!(parse_model_expr("PowerLaw+"), Err(ModelExprError::UnknownModel { .. })));
        assert_eq!(parse_model_expr("  "), Err(ModelExprError::Empty));
    }
}
