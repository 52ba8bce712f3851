// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - business logic layer.

pub mod conquest;
pub mod geodesy;
pub mod grid;
pub mod ingest;
pub mod path;
pub mod validator;

pub use conquest::{resolve_tile, ConquestPlan, TileResolution};
pub use ingest::{IngestResult, IngestSettings, RunIngestor};
pub use self::validator::{validate, validate_with, ValidationInputError, ValidationPolicy};
