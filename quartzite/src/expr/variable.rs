use derive_more::{Display, From};

/// A column of a plan, unique within the plan.
#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord, Display, From)]
#[display(fmt = "${}", _0)]
pub struct LogicalVariable(pub u32);

impl LogicalVariable {
    pub fn id(&self) -> u32 {
        self.0
    }
}
