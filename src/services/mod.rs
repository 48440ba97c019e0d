pub mod maintenance;
pub mod ratings;
pub mod recommend;

pub use maintenance::MaintenanceService;
pub use ratings::RatingService;
pub use recommend::{ExplainRequest, RecommendService, RecRequest};
