//! Concrete `NewsSource` implementations.

pub mod paginated;
pub mod rest_json;
pub mod rss_feed;

pub use paginated::PaginatedSearchSource;
pub use rest_json::RestJsonSource;
pub use rss_feed::RssSource;
