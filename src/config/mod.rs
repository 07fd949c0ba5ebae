pub mod load;
pub mod types;

pub use load::SETTINGS_FILE;
pub use types::{
    AdmissionPolicy, Config, ExtractionSettings, JobSettings, SamplingSettings, ServerSettings,
    SourceSettings, StoreSettings,
};
