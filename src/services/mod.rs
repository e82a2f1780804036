pub mod billing_service;
pub mod timer_service;
