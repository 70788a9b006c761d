//! Parameter grammar, filter data codec, catalog lookup and region handling
//! for driving an external image filter engine from a host application.

pub mod catalog;
pub mod config;
pub mod error;
pub mod error_codes;
pub mod filter_data;
pub mod parameter;
pub mod parameter_set;
pub mod region;
pub mod session;

pub use catalog::{CatalogEntry, CatalogLookup, FilterDefinition, PreviewHint};
pub use error::FilterError;
pub use filter_data::{DecodedFilterData, EncodedFilterBuffer, FilterIdentity};
pub use parameter::{Parameter, ParameterKind, ParameterType};
pub use parameter_set::FilterParameterSet;
pub use region::{InputMode, InterleavedImage, LayerExtent, NormalizedRegion, PixelRect, PlanarImage};
pub use session::{CommandEngine, EngineFault, ExecutionReport, FilterSession, OutputMessageMode};
