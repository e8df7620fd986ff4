pub mod api_errors;
pub mod http;
pub mod notifier;
pub mod stripe;
pub mod stripe_client;
