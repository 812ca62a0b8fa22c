//! Wire contract with the realtime middle tier: JSON frames tagged by `type`.

pub mod commands;
pub mod dispatch;
pub mod grounding;
pub mod messages;

pub use dispatch::{dispatch, parse, route, EventHandler, Inbound};
pub use grounding::{display_name, parse_tool_result, GroundingReference};
pub use messages::{ClientEvent, ServerEvent};
