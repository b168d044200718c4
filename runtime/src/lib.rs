// Copyright 2026 Gazette Contributors
// SPDX-License-Identifier: MIT

//! Gazette runtime library: catalog crawling, implicit-TLS transfers, stage
//! orchestration and the `gazette` CLI.
//!
//! This library crate exposes the runtime modules for the binary and for
//! integration testing.

pub mod cli;
pub mod config;
pub mod crawler;
pub mod ftps;
pub mod indexing;
pub mod ledger;
pub mod orchestrator;
pub mod progress;
pub mod renderer;
