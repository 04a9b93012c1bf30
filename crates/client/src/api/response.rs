//! InstaGo API response types.

use instago_core::Screenshot;
use serde::{Deserialize, Serialize};

/// One row of a search response: the matched screenshot plus its
/// relevance score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub screenshot: Screenshot,
    pub score: f32,
}
