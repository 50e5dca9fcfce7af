pub mod application_registry;
pub mod deployment_registry;
pub mod script_registry;
pub mod server_registry;
