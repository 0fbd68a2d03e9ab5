//! Core library for the vlan-tools command line application.
//!
//! The library turns per-VLAN host inventories into static DHCP lease files
//! and keeps a FreeRADIUS SQL store in step with them. Inventory parsing
//! lives in [`vlan::tools::validate`], file adapters under [`vlan::tools::io`],
//! the authentication store capability in [`vlan::tools::store`], the
//! membership diff in [`vlan::tools::reconcile`], and the per-VLAN driver in
//! [`vlan::tools::batch`].

pub mod vlan;

pub use vlan::tools::{
    Result, ToolError, accounting, batch, config, error, io, model, reconcile, store, validate,
};
