//! Privilege escalation
//!
//! An ordered chain of escalation methods walked by one uniform loop.

pub mod executor;
pub mod methods;

pub use executor::{Attempt, PrivilegedExecutor};
pub use methods::{
    decide, AmbiguousPolicy, EscalationChain, EscalationMethod, MethodSpec, PrivilegeConfig, Step,
};
