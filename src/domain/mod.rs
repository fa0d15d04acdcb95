//! Capability definitions and the content they produce
//!
//! Tools, prompts and resources are declared here as drafts, completed with a handler,
//! and then registered on a [`crate::registry::Version`].

pub mod content;
pub mod listing;
pub mod prompts;
pub mod resources;
pub mod tools;
pub mod utils;

pub use prompts::{prompt, Prompt, PromptPayload, PromptReply};
pub use resources::{resource, Resource, ResourceBody, ResourcePayload};
pub use tools::{tool, HandlerError, Tool, ToolPayload, ToolReturn};
