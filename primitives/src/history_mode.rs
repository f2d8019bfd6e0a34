use serde::{Deserialize, Serialize};

/// How much history a node retains.
///
/// Archive keeps every context since genesis, Full keeps all blocks but only
/// recent contexts, Rolling additionally prunes old block bodies.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum HistoryMode {
	Archive,
	Full,
	Rolling,
}

impl std::fmt::Display for HistoryMode {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			HistoryMode::Archive => write!(f, "archive"),
			HistoryMode::Full => write!(f, "full"),
			HistoryMode::Rolling => write!(f, "rolling"),
		}
	}
}
