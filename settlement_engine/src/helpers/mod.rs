//! Pure building blocks of the settlement pipeline. Nothing in here touches the database; the backends feed these
//! functions with rows and persist what they return.
pub mod point_grants;
pub mod rate_resolver;
pub mod reservation_plan;

pub use point_grants::{plan_point_grants, PointRules};
pub use rate_resolver::{commission_amount, resolve_rate, resolve_rate_with_source, RateSource};
pub use reservation_plan::{consolidate_lines, plan_reservation_changes, ReservationChange};
