//! Domain services used by the HTTP routes.
//!
//! ARCHITECTURE
//! ============
//! Service modules own business logic and persistence concerns so route
//! handlers can stay focused on protocol translation.

pub mod ai;
pub mod compare;
pub mod course;
pub mod entitlement;
pub mod error_guide;
pub mod storage;
pub mod text;
pub mod upload;
pub mod verification;
