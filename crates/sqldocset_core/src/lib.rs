pub mod anchor;
pub mod catalogue;
pub mod config;
pub mod document;
pub mod dump;
pub mod entry;
pub mod error;
pub mod expand;
pub mod extract;
pub mod index;
pub mod pipeline;
pub mod rewrite;
pub mod runtime;
