//! Input side of the processor: where channel records come from

pub mod source;

pub use source::{ChannelSource, InMemorySource, SceneDescriptor};
