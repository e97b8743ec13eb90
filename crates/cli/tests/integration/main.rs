mod common;
mod deliver_tests;
mod register_tests;
mod status_tests;
mod sync_tests;
