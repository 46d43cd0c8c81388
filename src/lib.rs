#![doc = include_str!("../README.md")]
#![deny(missing_docs)]
#![forbid(unsafe_code)]

mod token_bucket;
pub use token_bucket::*;

mod context;
pub use context::*;

mod refill;

mod runtime;

mod error;
pub use error::*;

mod common;
pub use common::{Capacity, Rate, TokenBucketOptions};

#[doc(no_inline)]
pub use tokio_util::sync::CancellationToken;
