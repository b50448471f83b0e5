#![allow(async_fn_in_trait)]
pub mod collection;
pub mod date_range;
pub mod download_plan;
pub mod downloader;
pub mod error;
pub mod handler;
pub mod image_url;
pub mod metadata;
pub mod result;
mod s3;
pub mod settings;
pub mod storage;

pub use collection::{Collection, ImageFormat};
pub use date_range::{DateInputs, DateRange, EnvDates};
pub use download_plan::DownloadPlan;
pub use metadata::{EpicClient, ImageRecord, MetadataSource};
pub use result::{DownloadResult, Summary};
pub use settings::{EnvDefaults, Settings, StorageOptions};
