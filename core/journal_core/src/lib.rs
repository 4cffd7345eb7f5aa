//! Local food journal: persistence, period reports and the facade the
//! HTTP service and the photo collector drive.

pub mod estimate;
pub mod journal;
pub mod labels;
pub mod model;
pub mod period;
pub mod report;
pub mod store;
pub mod thumbnail;

pub use estimate::{decode_estimate, Estimate};
pub use journal::{AddOutcome, Journal, JournalError, JournalStatus, Snapshot};
pub use model::{ChartDataPoint, Entry, FoodComponent, NutritionData, ReportPeriod, Summary};
pub use store::{EntryStore, KvStore, SqliteKv, StoreError};
pub use thumbnail::{ImageThumbnailer, ThumbnailError, Thumbnailer};
