//! Project persistence: the `.mpai` container and its JSON payloads.

pub mod archive;
pub mod layout;
pub mod metadata;
