pub mod batch;
pub mod content;
pub mod ledger;
pub mod models;

mod error;

pub use error::{Error, Result};

use std::{future::Future, pin::Pin};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
