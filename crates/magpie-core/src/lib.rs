//! Core domain logic for magpie: OpenAPI endpoint classification, script
//! registry validation and caching, output mapping, workflow execution, and
//! the job queue.

pub mod cache;
pub mod classify;
pub mod convert;
pub mod mapping;
pub mod openapi;
pub mod queue;
pub mod registry;
pub mod workflow;
