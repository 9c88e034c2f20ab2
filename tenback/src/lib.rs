/*
 * tenback - per-tenant backup and restore for a Recbase record store
 *
 * SPDX-License-Identifier: Apache-2.0
 */
//! Per-tenant backup and restore.
//!
//! tenback partitions a flat multi-tenant record store into one archive per
//! owner, uploads archives to a remote rclone destination, and can list and
//! restore them later. See the `tenback` binary for the command surface.
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]
#![warn(clippy::default_trait_access)]
#![warn(clippy::doc_markdown)]
#![warn(clippy::explicit_iter_loop)]
#![warn(clippy::implicit_clone)]
#![warn(clippy::match_same_arms)]
#![warn(clippy::redundant_clone)]
#![warn(clippy::redundant_closure)]
#![warn(clippy::uninlined_format_args)]
#![warn(clippy::unnecessary_wraps)]
#![warn(clippy::unused_async)]

pub mod archive;
pub mod cli;
pub mod collections;
pub mod config;
pub mod notify;
pub mod orchestrator;
pub mod remote;
pub mod report;
pub mod restore;
pub mod tenant;
