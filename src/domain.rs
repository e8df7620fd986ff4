pub mod actor;
pub mod attachment;
pub mod audit;
pub mod error;
pub mod feedback;
pub mod gateway;
pub mod id;
pub mod ledger;
pub mod money;
pub mod notification;
pub mod payment;
pub mod request;

use std::{future::Future, pin::Pin};

/// Boxed future returned by the object-safe ports in this module.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
