pub mod backoff;
pub mod checksum;
mod conflict;
pub mod dispatcher;
pub mod paths;
pub mod queue;
pub mod scanner;
