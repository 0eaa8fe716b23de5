#![warn(missing_docs, missing_debug_implementations, rust_2018_idioms)]
//! Mode-setting state management for KMS-style display controllers.
//!
//! This crate tracks everything a display driver needs to reason about
//! mode configuration without touching hardware itself: which outputs
//! (connectors) exist and what they advertise, which crtcs (scan-out
//! controllers) can drive them, which framebuffers are bound where, and
//! the typed properties attached to each output. Hardware programming
//! stays behind the capability traits of [`backend`], implemented by
//! the driver and invoked at well-defined points of a configuration
//! transaction.
//!
//! ## Workflow
//!
//! A driver builds a [`device::Device`], registers its crtcs and
//! outputs with their hooks and asks for an initial configuration:
//!
//! - [`device::Device::probe_output`] re-detects a sink and rebuilds
//!   its usable mode list,
//! - [`device::Device::assign_crtcs`] computes a deterministic
//!   output-to-crtc assignment including clone detection,
//! - [`device::Device::set_config`] applies a caller-specified
//!   configuration transactionally, rolling the tracked state back if
//!   the driver rejects the mode,
//! - [`device::Device::hotplug`] reacts to connection changes.
//!
//! Entities are addressed by plain [`registry::ObjectId`] handles, so
//! snapshots handed out to callers never borrow the device.

pub mod backend;
pub mod config;
pub mod device;
pub mod error;
pub mod framebuffer;
pub mod mode;
pub mod output;
pub mod property;
pub mod registry;

mod assign;
mod crtc;
mod probe;

#[cfg(test)]
mod test_utils;
