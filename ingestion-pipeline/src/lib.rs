#![allow(clippy::missing_docs_in_private_items, clippy::result_large_err)]

pub mod chunking;
pub mod extract;
pub mod handler;
pub mod pipeline;
pub mod services;

pub use handler::{ProcessSourceHandler, NAMESPACE, PROCESS_SOURCE};
pub use pipeline::{ProcessSourceInput, SourcePipeline};
pub use services::{OpenAiServices, PipelineServices};
