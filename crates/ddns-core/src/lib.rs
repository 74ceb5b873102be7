// # ddns-core
//
// Core library for the template-driven DDNS updater.
//
// ## Architecture Overview
//
// - **Template**: `{{.name}}` text templates rendered from provider arguments
// - **CompiledProvider**: A provider definition file compiled into request shapes
// - **AddressSource**: Trait for resolving the current public address of a family
// - **net**: Lookup clients (local-address binding with unbound fallback) and
//   the shared push client
// - **Updater**: Runs update passes on a schedule and on demand, and drains
//   in-flight work on stop
//
// ## Pass Flow
//
// 1. Resolve IPv4 and IPv6 independently
// 2. Push every resolved family to every provider, one task per provider
// 3. Check each response body against the provider's accepted responses
//
// Failures are logged per provider and family; a pass never aborts early.

pub mod traits;
pub mod template;
pub mod provider;
pub mod net;
pub mod engine;
pub mod config;
pub mod error;

// Re-export core types for convenience
pub use traits::{AddressSource, IpVersion};
pub use template::{Template, TemplateArgs};
pub use provider::CompiledProvider;
pub use engine::{LifecycleState, PassReport, PushOutcome, PushStatus, Updater, UpdaterParts};
pub use config::DdnsConfig;
pub use error::{Error, Result};
