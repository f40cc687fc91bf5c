//! Declarative route trees and their compilation into flat dispatch entries.

pub mod compiler;
pub mod key;
pub mod spec;

pub use compiler::{CompiledRoute, RouteTable};
pub use spec::{RouteGroup, RouteSpec};
