// Collection on/off state and the remote open/closed directive

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollectionState {
    Enabled,
    Disabled,
}

/// Outcome of one configuration poll. `Unknown` (unreachable or malformed)
/// is applied the same way as `Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Directive {
    Open,
    Closed,
    Unknown,
}

impl Directive {
    pub fn wants_collection(self) -> bool {
        matches!(self, Directive::Open)
    }
}
