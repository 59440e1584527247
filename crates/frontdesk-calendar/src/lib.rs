//! External-calendar capability: a provider trait with real and mock
//! implementations, plus the tenant-scoped busy-range cache.

pub mod cache;
pub mod external;
pub mod mock;
pub mod provider;

pub use cache::BusyRangeCache;
pub use external::ExternalCalendar;
pub use mock::MockCalendar;
pub use provider::{BusyRange, CalendarError, CalendarEvent, CalendarProvider};
