// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Domain
//!
//! Request aggregate, attribute store and the collaborator contracts the
//! lifecycle engine depends on.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Implements the request data model and its ports

pub mod attributes;
pub mod auth_token;
pub mod certificate;
pub mod der;
pub mod events;
pub mod identity;
pub mod notifier;
pub mod policy;
pub mod queue_config;
pub mod repository;
pub mod request;
pub mod scheduler;
pub mod service;
