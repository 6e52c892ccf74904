// Report export: marshalers and the streaming pipeline feeding them.

mod error;
mod marshal;
mod pipeline;

pub use error::*;
pub use marshal::*;
pub use pipeline::*;
