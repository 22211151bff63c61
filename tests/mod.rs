mod support;

mod api_tests;
mod idempotency_tests;
mod pipeline_tests;
mod retry_tests;
