//! Step Executor (C5): assembles a self-contained [`Manifest`] for one
//! build-script step and runs it through a [`crate::backends::ContainerRuntime`].

mod manifest;
mod virtual_tools;

pub use manifest::{Manifest, ManifestBuilder, StepContext};
pub use virtual_tools::{write_virtual_bin, VirtualTool};
