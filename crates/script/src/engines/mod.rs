//! Engine back-ends
//!
//! One module per engine; both expose the same `execute` shape and the
//! same injected capabilities so transformations can move between
//! engines without touching the host.

pub(crate) mod javascript;
pub(crate) mod starlark;
