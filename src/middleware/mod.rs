// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Middleware modules (service authentication, security headers).

pub mod security;
pub mod tasks_auth;

pub use security::add_security_headers;
pub use tasks_auth::{require_scheduler_auth, require_service_auth};
