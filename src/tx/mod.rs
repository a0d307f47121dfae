//! Bridge message submission and outcome verification

mod query_id;
mod trigger;
pub mod verifier;

pub use query_id::{QueryIdSource, QueryIdStrategy};
pub use trigger::BridgeTrigger;
