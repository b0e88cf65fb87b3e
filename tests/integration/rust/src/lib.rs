//! Integration test suite for the Ferrite virtual machine
//!
//! This crate provides cross-component tests that verify the VM's
//! pieces work together correctly across crate boundaries.

/// Re-export components for test convenience
pub mod components {
    pub use builtins;
    pub use core_types;
    pub use interpreter;
    pub use ir_system;
    pub use memory_manager;
    pub use vm_cli;
}
