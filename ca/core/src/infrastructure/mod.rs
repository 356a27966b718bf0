// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod event_bus;
pub mod identity;
pub mod repositories;
pub mod scheduler;
pub mod telemetry;
