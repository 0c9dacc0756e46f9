//! Input handling module
//!
//! Raw key state plus the key-to-action bindings of the viewer.

mod bindings;
mod state;

pub use bindings::{InputMapper, SceneAction};
pub use state::Input;
