pub mod analytics;
pub mod error;
pub mod geo_index;
pub mod heatmap;
pub mod lifecycle;
pub mod memory;
pub mod pg;
pub mod proximity;
pub mod query;
pub mod repository;
pub mod service;
pub mod upvote;
pub mod validate;

pub use analytics::Kpis;
pub use error::{StoreError, ValidationError};
pub use heatmap::HeatmapCell;
pub use memory::{InMemoryReportStore, InMemoryUserStore};
pub use pg::{PgReportStore, PgUserStore};
pub use proximity::{NearbyQuery, NearbyReport};
pub use query::{Page, PageRequest, ReportFilter};
pub use repository::{ReportRepository, UserRepository};
pub use service::{ReportService, StoreSettings, UserService};
pub use validate::{LocationInput, NewReport, StatusPatch, StatusUpdate};
