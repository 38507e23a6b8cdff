pub mod browser;
pub mod error;
pub mod sampler;

//  Re-export commonly used items
pub use browser::chrome::{ChromeDriver, ConnectionMode};
pub use error::SamplerError;
pub use sampler::{capture, MetricSource, SampleRecord, SamplerConfig, METRIC_ELEMENT_IDS};
