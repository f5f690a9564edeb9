pub mod config;
pub mod record;
pub mod report;
pub mod source;
pub mod upload;

pub use config::{Endpoint, ImportConfig};
pub use record::BeneficiaryRecord;
pub use upload::{UploadTotals, Uploader};
