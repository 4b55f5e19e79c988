//! Script composition: article text to an ordered two-role dialogue.

mod composer;
mod llm;
pub mod text;

pub use composer::ScriptComposer;
pub use llm::{compose_dialogue, parse_script, script_prompt};
