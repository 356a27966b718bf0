// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! AEGIS CA request core
//!
//! Lifecycle engine for certificate-authority requests: the request
//! aggregate and its typed attribute store, the drive loop that sequences a
//! request through policy, approval and servicing, listing helpers, and
//! startup recovery of interrupted requests.
//!
//! # Architecture
//!
//! - **Layer:** Core System
//! - **Purpose:** Implements request processing for the certificate authority

pub mod domain;
pub mod application;
pub mod infrastructure;

pub use domain::*;
