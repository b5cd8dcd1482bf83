//! AI 分类与摘要

pub mod client;
pub mod types;

pub use client::{AiClient, AiConfig};
pub use types::{ChatMessage, ClassificationOutcome, GroupSummary};
