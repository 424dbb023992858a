// ============================================================================
// Strict linting - Dangerous or non-idiomatic practices are forbidden
// ============================================================================

#![deny(warnings)]                    // All warnings are treated as errors
#![deny(unsafe_code)]                 // Unsafe code is forbidden
#![deny(missing_docs)]                // All public items must be documented
#![deny(dead_code)]                   // Unused code is forbidden
#![deny(non_camel_case_types)]        // Types must follow CamelCase convention

// Additional strictness - Leave nothing unchecked
#![deny(unused_imports)]              // Unused imports are forbidden
#![deny(unused_variables)]            // Unused variables are forbidden
#![deny(unused_must_use)]             // Must handle Result and Option explicitly
#![deny(non_snake_case)]              // Variables and functions must be snake_case
#![deny(non_upper_case_globals)]      // Constants must be UPPER_CASE
#![deny(nonstandard_style)]           // Non-standard code style is forbidden
#![forbid(unsafe_op_in_unsafe_fn)]    // Unsafe ops in unsafe fns are forbidden

// Clippy lints (warnings only)
#![warn(clippy::all)]                 // All standard Clippy lints
#![warn(clippy::pedantic)]            // Very strict Clippy lints
#![warn(clippy::nursery)]             // Experimental lints
#![warn(clippy::unwrap_used)]         // unwrap() warning
#![warn(clippy::expect_used)]         // expect() warning
#![warn(clippy::panic)]               // panic!() warning
#![warn(clippy::print_stdout)]        // println!() warning
#![warn(clippy::todo)]                // TODO warning
#![warn(clippy::unimplemented)]       // unimplemented!() warning
#![warn(clippy::missing_const_for_fn)] // Force const when possible
#![warn(clippy::unwrap_in_result)]    // unwrap() in Result warning
#![warn(clippy::module_inception)]    // Module with same name as crate warning
#![warn(clippy::redundant_clone)]     // Useless clones warning
#![warn(clippy::shadow_unrelated)]    // Shadowing unrelated variables warning
#![warn(clippy::too_many_arguments)]  // Limit function arguments
#![warn(clippy::cognitive_complexity)] // Limit cognitive complexity

// Safety and robustness lints
#![deny(overflowing_literals)]        // Overflowing literals are forbidden
#![deny(arithmetic_overflow)]         // Arithmetic overflow is forbidden

// ============================================================================
// Crate Documentation
// ============================================================================

//! # tenant-sync
//!
//! A declarative reconciliation engine that converges the applications and
//! roles of a remote tenant to the set declared in a YAML tenant file.
//!
//! ## Overview
//!
//! Each run, per resource kind:
//!
//! 1. **Desired State**: loaded from the tenant file (`tenant.yaml`)
//! 2. **Existing State**: listed from the tenant's management API
//! 3. **Plan**: resources are matched by name and classified into creates,
//!    updates (minimal field patches), deletes and conflicts
//! 4. **Execution**: creates, then updates, then deletes, each class on a
//!    bounded worker pool; individual failures never stop sibling operations
//! 5. **Report**: per-operation outcomes, used for the exit status
//!
//! Reconciliation is idempotent: once converged, a second run plans nothing.
//!
//! ## Modules
//!
//! - [`resource`]: Resource model shared by every component
//! - [`config`]: Tenant file parsing, validation and desired-state loading
//! - [`remote`]: Management API client and current-state fetching
//! - [`planner`]: Matching, differencing, plans, execution and reports
//! - [`reconciler`]: Orchestration of a reconciliation run
//! - [`state`]: Run lock and run history
//! - [`cli`]: Command-line interface
//!
//! ## Example
//!
//! ```yaml
//! tenant:
//!   domain: example.eu.auth0.com
//!   concurrency: 4
//!
//! apps:
//!   - name: web
//!     app_type: spa
//!     callbacks: ["https://example.com/callback"]
//!
//! roles:
//!   - name: admin
//!     description: Administrators
//! ```

// ============================================================================
// Modules
// ============================================================================

pub mod cli;
pub mod config;
pub mod error;
pub mod planner;
pub mod reconciler;
pub mod remote;
pub mod resource;
pub mod state;

// ============================================================================
// Re-exports
// ============================================================================

pub use cli::{Cli, Commands, OutputFormatter};
pub use config::{ConfigHasher, ConfigParser, ConfigValidator, DesiredStateLoader, TenantConfig};
pub use error::{ApiError, OperationError, Result, SyncError};
pub use planner::{Executor, Operation, ReconciliationPlan, ReconciliationReport};
pub use reconciler::{ApplyOptions, DriftReport, Reconciler};
pub use remote::{HttpResourceApi, InMemoryApi, ResourceApi, StateFetcher};
pub use resource::{FieldValue, Fields, Resource, ResourceKind};
pub use state::{LocalRunStore, RunHistory, RunRecord};
