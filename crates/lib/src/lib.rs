//! hpcstack-lib: container recipes for HPC software stacks
//!
//! This crate provides the pieces the `hpcstack` CLI assembles images from:
//! - `Config`: a machine's architecture, base images and network stack versions
//! - `BuildStep` / `BuildPlan`: ordered, per-stage steps with resolved placeholders
//! - `EnvOverlay`: the environment each step contributes to its stage
//! - `StageCopier`: what the runtime stage takes from the devel stage
//! - `Recipe`: the four container recipes and their shared building blocks
//! - `render`: Dockerfile, Singularity definition and JSON output

pub mod config;
pub mod env;
pub mod placeholder;
pub mod plan;
pub mod platform;
pub mod recipe;
pub mod render;
pub mod source;
pub mod stage;
pub mod step;
pub mod toolchain;
pub mod util;
