//! Property-test harness.

mod bulk_rounds;
mod loop_completeness;
mod obim_order;
