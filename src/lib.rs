#![forbid(clippy::unwrap_used)]
#![forbid(clippy::expect_used)]
#![forbid(clippy::panic)]

//! # kubedbg
//!
//! Node agent that attaches debuggers to processes in cluster containers.
//!
//! Operators create `DebugAttachment` resources; the agent watches them,
//! locates the target process, starts a headless debug server and records its
//! address on the resource. Deleting goes through the same resource.
//!
//! The reconciliation machinery lives in `kubedbg-reconciler`, the resource
//! model and event loop in `kubedbg-api`, and the cluster bindings in
//! `kubedbg-kube`. This crate wires them into a binary.

pub mod bootstrap;
pub mod cli;
pub mod commands;
pub mod config;
pub mod debugger;
