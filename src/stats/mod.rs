pub mod delta;
pub mod handlers;
pub mod ledger;
pub mod merger;
pub mod optimistic;
pub mod period;
pub mod repository;
pub mod service;
pub mod types;

mod errors;
pub mod models;

pub use delta::DeltaCalculator;
pub use errors::StatsError;
pub use ledger::{EventLedger, InMemoryEventLedger, PostgresEventLedger};
pub use merger::AggregateMerger;
pub use models::*;
pub use optimistic::{
    InMemoryVersionedBackend, OptimisticBucketStore, VersionedBucket, VersionedBucketBackend,
};
pub use period::{DailyPeriodKeyer, PeriodKeyer, WeeklyPeriodKeyer};
pub use repository::{BucketStore, InMemoryBucketStore, PostgresBucketStore};
pub use service::{StatsService, StatsServiceBuilder};
