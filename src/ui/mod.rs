pub mod progress;

pub use progress::PipelineUI;
