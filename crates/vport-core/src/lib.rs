// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

pub mod buffer;
pub mod content;
pub mod filter;
pub mod hooks;
pub mod ids;
pub mod options;
pub mod queue;
pub mod request;
pub mod scroller;
pub mod selection;
pub mod template;
pub mod value;
pub mod viewport;
pub mod wire;

pub use buffer::*;
pub use content::*;
pub use filter::*;
pub use hooks::*;
pub use ids::*;
pub use options::*;
pub use queue::*;
pub use request::*;
pub use scroller::*;
pub use selection::*;
pub use template::*;
pub use value::*;
pub use viewport::*;
pub use wire::*;
