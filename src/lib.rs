pub mod aggregation;
pub mod config;
pub mod dataset;
pub mod error;
pub mod event;
pub mod hashing;
pub mod lookup;
pub mod pipeline;
pub mod recalculation;
pub mod schema;
pub mod transform;
pub mod value;

#[cfg(feature = "python")]
mod python;

pub use aggregation::{AggregateNode, NodeData, RawGroup, RawRow};
pub use config::{EngineConfig, GhgOption, RecalcMetadata, RecalculationSettings};
pub use dataset::{DataMode, Dataset, DatasetKind, DatasetRole, Layer};
pub use error::{RecalcError, Result};
pub use event::EventDirectory;
pub use lookup::{ReferenceLookup, StaticLookup};
pub use pipeline::{RecalculationJob, RecalculationReport};
pub use recalculation::{Operation, RawMatchStats, RecalculationFrame};
pub use value::{CellValue, Record};
