mod common;
mod pipeline_tests;
mod store_tests;
