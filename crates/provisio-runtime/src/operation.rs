use std::fmt;

/// Engine lifecycle operation requested by the operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Init,
    /// Preview changes. Never mutates remote state.
    Plan,
    Apply,
    Destroy,
    Refresh,
    /// Release a stuck state lock on a named stack.
    Cancel,
    /// Delete the stack's state record.
    Remove,
}

impl Operation {
    pub const ALL: [Operation; 7] = [
        Operation::Init,
        Operation::Plan,
        Operation::Apply,
        Operation::Destroy,
        Operation::Refresh,
        Operation::Cancel,
        Operation::Remove,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Operation::Init => "init",
            Operation::Plan => "plan",
            Operation::Apply => "apply",
            Operation::Destroy => "destroy",
            Operation::Refresh => "refresh",
            Operation::Cancel => "cancel",
            Operation::Remove => "remove",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
