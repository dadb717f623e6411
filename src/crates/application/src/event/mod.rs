pub mod call_event_handler;
pub mod event_bus;
