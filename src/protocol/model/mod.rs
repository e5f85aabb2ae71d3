//! The hierarchical management-model protocol
//!
//! Resources are addressed by CLI-style segment paths such as
//! `/subsystem=datasources/data-source=ExampleDS`, with `*` as a wildcard
//! segment value. The driver talks to the endpoint's HTTP management
//! interface with JSON `read-resource` / `read-attribute` / operation
//! requests.

pub mod driver;
pub mod location;
pub mod resolver;

pub use driver::{ModelDriver, ModelDriverFactory};
pub use location::{ModelPath, ModelSegment};
pub use resolver::ModelPathResolver;
