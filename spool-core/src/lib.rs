mod client;

pub use client::{ApiErrorClass, ObjectInfo, PutOutcome, StoreClient, StoreError};
