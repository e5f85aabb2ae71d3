//! The object-name/attribute protocol
//!
//! Resources are addressed by canonical `domain:key=value,...` names.
//! Patterns carry `*` wildcards in the domain or in property values, plus
//! an optional trailing `,*` property pattern. Two transports share the
//! driver logic: in-process against a local [`registry::ManagedRegistry`],
//! and a remote HTTP+JSON bridge. The transport is selected per endpoint by
//! whether connection data is present.

pub mod driver;
pub mod name;
pub mod registry;
pub mod resolver;

pub use driver::{InProcessDriver, ObjectNameDriverFactory, RemoteBridgeDriver};
pub use name::ObjectName;
pub use registry::{LocalRegistry, ManagedRegistry};
pub use resolver::ObjectNameResolver;
