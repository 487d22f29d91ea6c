use strum_macros::{AsRefStr, Display, EnumString};

/// Built-in functions known to the optimizer.
#[derive(
    Copy, Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord, AsRefStr, Display, EnumString,
)]
#[strum(serialize_all = "snake_case")]
pub enum FunctionIdentifier {
    Eq,
    Neq,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    Not,
    IsNull,
    Plus,
    Minus,
    Multiply,
    Divide,
    Random,
    // Aggregates
    Count,
    Sum,
    Min,
    Max,
    Avg,
    Listify,
    // Unnesting
    ScanCollection,
    Range,
}

#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq)]
pub enum FunctionKind {
    Scalar,
    Aggregate,
    Unnest,
}

impl FunctionIdentifier {
    pub fn kind(&self) -> FunctionKind {
        use FunctionIdentifier::*;
        match self {
            Count | Sum | Min | Max | Avg | Listify => FunctionKind::Aggregate,
            ScanCollection | Range => FunctionKind::Unnest,
            _ => FunctionKind::Scalar,
        }
    }

    pub fn is_deterministic(&self) -> bool {
        !matches!(self, FunctionIdentifier::Random)
    }

    pub fn is_comparison(&self) -> bool {
        use FunctionIdentifier::*;
        matches!(self, Eq | Neq | Lt | Le | Gt | Ge)
    }
}
