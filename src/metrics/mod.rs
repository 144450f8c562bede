//! Metric names emitted by the pipeline. The binary installs a Prometheus
//! recorder; the library only emits through the `metrics` facade.

pub const METRIC_BLOCKS_SCANNED: &str = "tokenpipe_blocks_scanned_total";
pub const METRIC_CANDIDATES_FOUND: &str = "tokenpipe_candidates_found_total";
pub const METRIC_TOKENS_CREATED: &str = "tokenpipe_tokens_created_total";
pub const METRIC_CANDIDATES_REJECTED: &str = "tokenpipe_candidates_rejected_total";
pub const METRIC_QUOTES_ACCEPTED: &str = "tokenpipe_quotes_accepted_total";
pub const METRIC_SOURCE_FAILURES: &str = "tokenpipe_source_failures_total";
pub const METRIC_TOKENS_UPDATED: &str = "tokenpipe_tokens_updated_total";
pub const METRIC_UPDATE_FAILURES: &str = "tokenpipe_update_failures_total";
pub const METRIC_WATERMARK: &str = "tokenpipe_last_checked_block";
pub const METRIC_PASS_SECONDS: &str = "tokenpipe_scheduler_pass_seconds";
