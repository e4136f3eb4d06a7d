//! flow-api: Shared types for the declarative flow plugin host
//!
//! This crate defines the data exchanged between a plugin package, the
//! flow engine, and tooling. All types serialize to camelCase JSON, the
//! format plugin authors write flows in.

pub mod flow;
pub mod grants;
pub mod node_spec;
pub mod run;
pub mod value;

pub use flow::{FlowDefinition, Node, Trigger, TriggerType};
pub use grants::Grants;
pub use node_spec::{NodeSpec, ParamSpec, ParamType, SideEffect};
pub use run::{RunRecord, RunResult, TriggerContext};
pub use value::{parse_truthy, Item, Value};
