//! Route tasks and the scheduler driving them

pub mod route;
pub mod scheduler;

pub use route::RouteTask;
pub use scheduler::Scheduler;
