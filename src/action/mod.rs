pub mod model;
pub mod parser;
pub mod wire;

pub use model::{Action, ActionKind, GoalStatus, ScrollDirection, Target};
pub use parser::{parse_response, ParsedResponse};
pub use wire::{decode_action, encode_action};
